//! Mangling rules and their power-set enumeration.
//!
//! An engine holds an ordered rule list; iterating a word's combinations
//! yields one transformed string per subset of the rules, applied in
//! registration order. Rules are plain data so a coordinator can ship them
//! to workers inside the challenge spec.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Upper bound on registered rules; the subset mask is a `u64`.
pub const MAX_RULES: usize = 32;

/// A deterministic, total rewrite of a guess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MangleRule {
    /// Replace every occurrence of `from` with `to`.
    Replace { from: String, to: String },
    /// Append `suffix`.
    Append { suffix: String },
    /// Prepend `prefix`.
    Prepend { prefix: String },
}

impl MangleRule {
    pub fn apply(&self, input: &str) -> String {
        match self {
            MangleRule::Replace { from, to } => input.replace(from.as_str(), to),
            MangleRule::Append { suffix } => format!("{input}{suffix}"),
            MangleRule::Prepend { prefix } => format!("{prefix}{input}"),
        }
    }
}

/// An ordered rule list with power-set enumeration.
#[derive(Debug, Clone, Default)]
pub struct ManglingEngine {
    rules: Vec<MangleRule>,
}

impl ManglingEngine {
    /// Build an engine from an ordered rule list. At most [`MAX_RULES`]
    /// rules are accepted.
    pub fn new(rules: Vec<MangleRule>) -> Result<ManglingEngine, Error> {
        if rules.len() > MAX_RULES {
            return Err(Error::Mangle(format!(
                "{} rules registered (max: {MAX_RULES})",
                rules.len()
            )));
        }
        Ok(ManglingEngine { rules })
    }

    /// The classic leet-speak set: a/e/i/o substitutions plus `!` and `?`
    /// suffixes.
    pub fn leet_speak() -> ManglingEngine {
        let substitute = |from: &str, to: &str| MangleRule::Replace {
            from: from.to_string(),
            to: to.to_string(),
        };
        ManglingEngine {
            rules: vec![
                substitute("a", "4"),
                substitute("e", "3"),
                substitute("i", "1"),
                substitute("o", "0"),
                MangleRule::Append {
                    suffix: "!".to_string(),
                },
                MangleRule::Append {
                    suffix: "?".to_string(),
                },
            ],
        }
    }

    pub fn rules(&self) -> &[MangleRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Iterate all `2^k` rule-subset applications of `word`.
    ///
    /// The counter is read as a big-endian bitmask over the rule list, so
    /// bit 0 of the mask controls the first registered rule. Duplicates are
    /// possible when different subsets produce the same string; the
    /// counterparty is a hash comparison, so deduplication is not needed.
    pub fn combinations(&self, word: &str) -> Combinations<'_> {
        Combinations {
            rules: &self.rules,
            word: word.to_string(),
            next_mask: 0,
            limit: 1u64 << self.rules.len(),
        }
    }
}

/// Iterator over the rule-subset transformations of one word.
pub struct Combinations<'a> {
    rules: &'a [MangleRule],
    word: String,
    next_mask: u64,
    limit: u64,
}

impl Iterator for Combinations<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.next_mask == self.limit {
            return None;
        }
        let k = self.rules.len();
        let mut guess = self.word.clone();
        for (i, rule) in self.rules.iter().enumerate() {
            if self.next_mask >> (k - 1 - i) & 1 == 1 {
                guess = rule.apply(&guess);
            }
        }
        self.next_mask += 1;
        Some(guess)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.limit - self.next_mask) as usize;
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn append(suffix: &str) -> MangleRule {
        MangleRule::Append {
            suffix: suffix.to_string(),
        }
    }

    #[test]
    fn enumerates_subsets_in_mask_order() {
        let engine = ManglingEngine::new(vec![append("!"), append("?")]).expect("two rules");
        let guesses: Vec<String> = engine.combinations("a").collect();
        assert_eq!(guesses, vec!["a", "a?", "a!", "a!?"]);
    }

    #[test]
    fn zero_rules_yield_the_input_unchanged() {
        let engine = ManglingEngine::new(Vec::new()).expect("no rules");
        let guesses: Vec<String> = engine.combinations("hunter2").collect();
        assert_eq!(guesses, vec!["hunter2"]);
    }

    #[test]
    fn applies_rules_in_registration_order() {
        let engine = ManglingEngine::new(vec![
            MangleRule::Replace {
                from: "a".to_string(),
                to: "b".to_string(),
            },
            MangleRule::Replace {
                from: "b".to_string(),
                to: "c".to_string(),
            },
        ])
        .expect("two rules");
        let all: Vec<String> = engine.combinations("a").collect();
        // Mask 11 rewrites a -> b, then b -> c.
        assert_eq!(all, vec!["a", "a", "b", "c"]);
    }

    #[test]
    fn leet_speak_covers_the_original_rules() {
        let engine = ManglingEngine::leet_speak();
        assert_eq!(engine.len(), 6);
        let guesses: Vec<String> = engine.combinations("passion").collect();
        assert_eq!(guesses.len(), 64);
        assert!(guesses.contains(&"p4ss10n!".to_string()));
    }

    #[test]
    fn rejects_oversized_rule_lists() {
        let rules = vec![append("!"); MAX_RULES + 1];
        assert!(ManglingEngine::new(rules).is_err());
    }

    #[test]
    fn rules_round_trip_through_json() {
        let rule = MangleRule::Replace {
            from: "a".to_string(),
            to: "4".to_string(),
        };
        let json = serde_json::to_string(&rule).expect("serialize");
        assert_eq!(json, r#"{"kind":"replace","from":"a","to":"4"}"#);
        let back: MangleRule = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, rule);
    }
}
