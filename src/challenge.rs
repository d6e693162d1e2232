//! The hash-check seam between guess generation and a concrete target.
//!
//! Workers drive every candidate through a [`GuessCheck`]; the shipped
//! implementation hashes `prefix + guess + suffix` with SHA-256 and
//! compares against a known digest. A [`ChallengeSpec`] file carries the
//! target and the mangling rules so the whole run configuration travels to
//! remote hosts as one document.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::mangle::{MangleRule, ManglingEngine};
use crate::Error;

/// Decides whether a candidate guess is the plaintext a run is hunting.
///
/// Implementations must be pure: the same guess always gets the same
/// answer.
pub trait GuessCheck: Send + Sync {
    fn matches(&self, guess: &str) -> bool;
}

/// On-disk description of a cracking target, consumed by the worker entry
/// point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeSpec {
    /// Text hashed before the candidate (salt, challenge nonce, ...).
    #[serde(default)]
    pub prefix: String,
    /// Text hashed after the candidate.
    #[serde(default)]
    pub suffix: String,
    /// Base64 encoding of the expected SHA-256 digest.
    pub expected_sha256: String,
    /// Mangling rules applied to every expanded guess, in order.
    #[serde(default)]
    pub rules: Vec<MangleRule>,
}

impl ChallengeSpec {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<ChallengeSpec, Error> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::Challenge(format!("{}: {e}", path.display())))?;
        let spec: ChallengeSpec = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::Challenge(format!("{}: {e}", path.display())))?;
        Ok(spec)
    }

    /// The mangling engine this spec describes.
    pub fn engine(&self) -> Result<ManglingEngine, Error> {
        ManglingEngine::new(self.rules.clone())
    }

    /// The hash check this spec describes.
    pub fn checker(&self) -> Result<Sha256Challenge, Error> {
        Sha256Challenge::new(&self.prefix, &self.suffix, &self.expected_sha256)
    }
}

/// SHA-256 comparison against a fixed digest.
#[derive(Debug, Clone)]
pub struct Sha256Challenge {
    prefix: String,
    suffix: String,
    expected: [u8; 32],
}

impl Sha256Challenge {
    pub fn new(prefix: &str, suffix: &str, expected_b64: &str) -> Result<Sha256Challenge, Error> {
        let bytes = BASE64
            .decode(expected_b64)
            .map_err(|e| Error::Challenge(format!("invalid base64 digest: {e}")))?;
        let expected: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| Error::Challenge(format!("digest is {} bytes, expected 32", bytes.len())))?;
        Ok(Sha256Challenge {
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
            expected,
        })
    }

    /// Base64 SHA-256 digest of `prefix + guess + suffix`; the inverse of
    /// what [`Sha256Challenge::matches`] checks, for building specs.
    pub fn digest_b64(prefix: &str, guess: &str, suffix: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(prefix.as_bytes());
        hasher.update(guess.as_bytes());
        hasher.update(suffix.as_bytes());
        BASE64.encode(hasher.finalize())
    }
}

impl GuessCheck for Sha256Challenge {
    fn matches(&self, guess: &str) -> bool {
        let mut hasher = Sha256::new();
        hasher.update(self.prefix.as_bytes());
        hasher.update(guess.as_bytes());
        hasher.update(self.suffix.as_bytes());
        hasher.finalize()[..] == self.expected[..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;

    #[test]
    fn matches_only_the_target_plaintext() {
        let expected = Sha256Challenge::digest_b64("salt:", "hunter2", ":tail");
        let challenge = Sha256Challenge::new("salt:", ":tail", &expected).expect("valid digest");
        assert!(challenge.matches("hunter2"));
        assert!(!challenge.matches("hunter3"));
        assert!(!challenge.matches(""));
    }

    #[test]
    fn rejects_malformed_digests() {
        assert!(Sha256Challenge::new("", "", "!!!not-base64!!!").is_err());
        let short = BASE64.encode(b"short");
        assert!(Sha256Challenge::new("", "", &short).is_err());
    }

    #[test]
    fn spec_round_trips_and_builds_both_halves() {
        let spec = ChallengeSpec {
            prefix: "team:12345:".to_string(),
            suffix: String::new(),
            expected_sha256: Sha256Challenge::digest_b64("team:12345:", "p4ss!", ""),
            rules: vec![
                MangleRule::Replace {
                    from: "a".to_string(),
                    to: "4".to_string(),
                },
                MangleRule::Append {
                    suffix: "!".to_string(),
                },
            ],
        };
        let json = serde_json::to_string(&spec).expect("serialize");
        let back: ChallengeSpec = serde_json::from_str(&json).expect("deserialize");
        let engine = back.engine().expect("engine");
        let checker = back.checker().expect("checker");
        assert!(engine.combinations("pass").any(|guess| checker.matches(&guess)));
    }
}
