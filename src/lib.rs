//! # passmill
//!
//! Distributed password-guess generator and cracker built around a
//! probabilistic context-free grammar (PCFG) model of human-chosen
//! passwords.
//!
//! A training corpus of plaintext passwords is classified into three
//! on-disk artifacts:
//!
//! - **base structures**: password "shapes" like `L4|D3|S1` with
//!   occurrence probabilities
//! - **grammar**: per non-letter token, the concrete fills observed and
//!   their probabilities
//! - **glossary**: the letter fragments of each length seen in the corpus
//!
//! At runtime a coordinator enumerates preterminals (partially expanded
//! shapes) in strictly non-increasing probability order and streams them
//! through an authenticated queue server to a pool of remote workers. Each
//! worker expands its preterminal against the glossary, applies every
//! combination of the configured mangling rules, hashes each candidate,
//! and reports matches back on a result queue.
//!
//! ## Example
//!
//! ```no_run
//! use passmill::classifier::Classifier;
//! use passmill::enumerator::PreterminalHeap;
//! use passmill::model::{BaseStructures, Grammar};
//!
//! # fn main() -> Result<(), passmill::Error> {
//! // Train the model from a wordlist.
//! let classifier = Classifier::classify_file("wordlist.txt")?;
//! classifier.write_artifacts("base_structs.txt", "prob_grammar.txt", "glossary.txt")?;
//!
//! // Enumerate the most likely preterminals first.
//! let bases = BaseStructures::from_file("base_structs.txt")?;
//! let grammar = Grammar::from_file("prob_grammar.txt")?;
//! for preterminal in PreterminalHeap::new(&bases, &grammar).take(10) {
//!     println!("{:.6} {}", preterminal.probability, preterminal.text);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! The `passmill` binary wraps the full pipeline (`train` / `crack`);
//! `passmill-worker` is the entry point the dispatcher starts on remote
//! hosts.

pub mod bullpen;
pub mod challenge;
pub mod classifier;
pub mod enumerator;
pub mod guesser;
pub mod invariants;
pub mod mangle;
pub mod model;
pub mod protocol;
pub mod queue;
pub mod tokenizer;
pub mod worker;

pub use bullpen::{Bullpen, DispatcherContext, LaunchOptions, ResultFeed, AUTHKEY_ENV};
pub use challenge::{ChallengeSpec, GuessCheck, Sha256Challenge};
pub use classifier::Classifier;
pub use enumerator::{Preterminal, PreterminalHeap};
pub use guesser::PreterminalGuesser;
pub use mangle::{MangleRule, ManglingEngine, MAX_RULES};
pub use model::{BaseStructures, Glossary, Grammar};
pub use protocol::{Report, Task, TaskResult};
pub use queue::{QueueClient, QueueServer};
pub use tokenizer::{base_structure, tokenize, BaseStructure, CharClass, Token};
pub use worker::{crack_preterminal, run_worker};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Corpus error: {0}")]
    Corpus(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("Mangling engine error: {0}")]
    Mangle(String),

    #[error("Challenge error: {0}")]
    Challenge(String),

    #[error("Authentication refused: {0}")]
    Auth(String),

    #[error("Queue protocol error: {0}")]
    Protocol(String),

    #[error("Bootstrap failed: {0}")]
    Bootstrap(String),

    #[error("Worker launch failed: {0}")]
    Launch(String),

    #[error("Join timed out after {0:?} with {1} workers still running")]
    JoinTimeout(std::time::Duration, i64),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}
