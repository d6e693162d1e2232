//! Worker loop: consume preterminals, expand and mangle them, drive the
//! hash check, and report outcomes.
//!
//! Workers are independent; the only coordination is the pair of queues.
//! A worker that dies simply stops consuming; the coordinator never
//! assumes every task produces a result.

use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use tokio::net::ToSocketAddrs;
use tracing::{debug, info, warn};

use crate::challenge::GuessCheck;
use crate::guesser::PreterminalGuesser;
use crate::mangle::ManglingEngine;
use crate::model::Glossary;
use crate::protocol::{result_queue_name, task_queue_name, Report, Task, TaskResult};
use crate::queue::QueueClient;
use crate::Error;

/// Candidates hashed per parallel batch.
const BATCH: usize = 1024;

fn check_batch(batch: &[String], check: &dyn GuessCheck, attempts: &AtomicU64) -> Option<String> {
    batch
        .par_iter()
        .find_any(|candidate| {
            attempts.fetch_add(1, Ordering::Relaxed);
            check.matches(candidate)
        })
        .cloned()
}

/// Crack one preterminal: every glossary fill times every rule subset,
/// hashed until a match or exhaustion.
///
/// A preterminal with an unfillable letter slot is skipped with zero
/// attempts. `attempts` counts candidates actually hashed, so a parallel
/// batch that short-circuits on a match reports the true number.
pub fn crack_preterminal(
    preterminal: &str,
    glossary: &Glossary,
    engine: &ManglingEngine,
    check: &dyn GuessCheck,
) -> TaskResult {
    let guesser = PreterminalGuesser::new(glossary, preterminal);
    if let Some(len) = guesser.empty_slot() {
        warn!(preterminal, len, "no glossary words for slot, skipping");
        return TaskResult::default();
    }

    let attempts = AtomicU64::new(0);
    let mut batch = Vec::with_capacity(BATCH);
    let mut solution = None;
    'terminals: for terminal in guesser {
        for candidate in engine.combinations(&terminal) {
            batch.push(candidate);
            if batch.len() == BATCH {
                if let Some(found) = check_batch(&batch, check, &attempts) {
                    solution = Some(found);
                    break 'terminals;
                }
                batch.clear();
            }
        }
    }
    if solution.is_none() && !batch.is_empty() {
        solution = check_batch(&batch, check, &attempts);
    }
    TaskResult {
        attempts: attempts.load(Ordering::Relaxed),
        solution,
    }
}

/// Connect to the queue server and process tasks until a `TERM` arrives.
///
/// Announces startup and termination on the result queue so the
/// coordinator can track the live worker count. Transport errors surface
/// to the caller; the convention is to exit quietly, since the coordinator
/// bounds its join with a timeout rather than relying on a farewell.
pub async fn run_worker<A: ToSocketAddrs>(
    addr: A,
    authkey: &str,
    queue_id: &str,
    label: &str,
    glossary: &Glossary,
    engine: &ManglingEngine,
    check: &dyn GuessCheck,
) -> Result<(), Error> {
    let mut client = QueueClient::connect(addr, authkey).await?;
    let tasks = task_queue_name(queue_id);
    let results = result_queue_name(queue_id);

    client
        .put(
            &results,
            &Report::Status {
                text: format!("{label}: worker started"),
            },
        )
        .await?;
    info!(label, queue_id, "worker started");

    loop {
        match client.get::<Task>(&tasks).await? {
            Task::Task { preterminal } => {
                debug!(%preterminal, "cracking preterminal");
                let result = crack_preterminal(&preterminal, glossary, engine, check);
                if let Some(solution) = &result.solution {
                    info!(label, %solution, "match found");
                }
                client.put(&results, &Report::Result { result }).await?;
            }
            Task::Term => {
                client
                    .put(
                        &results,
                        &Report::Status {
                            text: format!("{label}: TERM"),
                        },
                    )
                    .await?;
                info!(label, "TERM received, exiting");
                return Ok(());
            }
        }
    }
}
