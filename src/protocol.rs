//! Wire records exchanged through the queue server.
//!
//! Everything that crosses a host boundary is one of these serde types,
//! framed as line-delimited JSON. Task and report records ride inside the
//! RPC frames as opaque payloads, so the queue layer never needs to know
//! what it is carrying.

use serde::{Deserialize, Serialize};

/// A unit of work on the task queue: a preterminal to crack, or the poison
/// pill that tells a worker to exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tag")]
pub enum Task {
    #[serde(rename = "TASK")]
    Task { preterminal: String },
    #[serde(rename = "TERM")]
    Term,
}

/// A message on the result queue: operator-facing status text, or the
/// outcome of one cracked preterminal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "tag")]
pub enum Report {
    #[serde(rename = "STATUS")]
    Status { text: String },
    #[serde(rename = "RESULT")]
    Result { result: TaskResult },
}

/// Outcome of one preterminal: how many candidates were hashed, and the
/// matching plaintext when one was found.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    pub attempts: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
}

/// Client-to-server RPC frame. The first frame on every connection must be
/// `hello`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    Hello { key: String },
    Put { queue: String, message: serde_json::Value },
    Get { queue: String },
}

/// Server-to-client RPC frame: exactly one per request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok,
    Message { message: serde_json::Value },
    Refused { reason: String },
}

/// Server-visible name of a run's task queue.
pub fn task_queue_name(queue_id: &str) -> String {
    format!("t{queue_id}")
}

/// Server-visible name of a run's result queue.
pub fn result_queue_name(queue_id: &str) -> String {
    format!("r{queue_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tasks_use_tagged_wire_form() {
        let task = Task::Task {
            preterminal: "|L4|123".to_string(),
        };
        let json = serde_json::to_string(&task).expect("serialize");
        assert_eq!(json, r#"{"tag":"TASK","preterminal":"|L4|123"}"#);
        assert_eq!(
            serde_json::to_string(&Task::Term).expect("serialize"),
            r#"{"tag":"TERM"}"#
        );
    }

    #[test]
    fn result_omits_absent_solution() {
        let report = Report::Result {
            result: TaskResult {
                attempts: 42,
                solution: None,
            },
        };
        let json = serde_json::to_string(&report).expect("serialize");
        assert!(!json.contains("solution"));
        let back: Report = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, report);
    }

    #[test]
    fn queue_names_derive_from_the_id() {
        assert_eq!(task_queue_name("AbCdEfGh"), "tAbCdEfGh");
        assert_eq!(result_queue_name("AbCdEfGh"), "rAbCdEfGh");
    }
}
