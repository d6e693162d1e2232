//! Terminal expansion: fill a preterminal's letter slots with glossary
//! words.
//!
//! The `|L<n>|` placeholders of a preterminal index glossary buckets by
//! length. The Cartesian product of those buckets is walked as a
//! mixed-radix counter, incremented little-endian from the last slot, so
//! the guess order is deterministic for a given glossary.

use std::sync::OnceLock;

use regex::Regex;

use crate::invariants;
use crate::model::Glossary;

fn slot_regex() -> &'static Regex {
    static SLOT: OnceLock<Regex> = OnceLock::new();
    SLOT.get_or_init(|| Regex::new(r"\|L(\d+)\|").expect("slot pattern is valid"))
}

#[derive(Debug, Clone)]
enum Part {
    /// Concrete text copied through to every guess.
    Literal(String),
    /// A letter slot to be filled from the glossary bucket for this length.
    Slot(usize),
}

/// Iterator over every assignment of glossary words to a preterminal's
/// letter slots.
///
/// A preterminal with no slots yields itself exactly once. A slot whose
/// glossary bucket is empty makes the whole preterminal unfillable: the
/// iterator yields nothing and [`PreterminalGuesser::empty_slot`] names the
/// offending length so the caller can report the skip.
pub struct PreterminalGuesser<'a> {
    glossary: &'a Glossary,
    parts: Vec<Part>,
    bucket_lens: Vec<usize>,
    indices: Vec<usize>,
    exhausted: bool,
}

impl<'a> PreterminalGuesser<'a> {
    pub fn new(glossary: &'a Glossary, preterminal: &str) -> PreterminalGuesser<'a> {
        let mut parts = Vec::new();
        let mut slot_lens = Vec::new();
        let mut last = 0;
        for caps in slot_regex().captures_iter(preterminal) {
            let (Some(whole), Some(digits)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if whole.start() > last {
                parts.push(Part::Literal(preterminal[last..whole.start()].to_string()));
            }
            match digits.as_str().parse::<usize>() {
                Ok(len) => {
                    parts.push(Part::Slot(len));
                    slot_lens.push(len);
                }
                // A length too large to represent cannot have a bucket;
                // keep the text as-is.
                Err(_) => parts.push(Part::Literal(whole.as_str().to_string())),
            }
            last = whole.end();
        }
        if last < preterminal.len() {
            parts.push(Part::Literal(preterminal[last..].to_string()));
        }

        let bucket_lens: Vec<usize> = slot_lens.iter().map(|&n| glossary.bucket(n).len()).collect();
        let exhausted = bucket_lens.iter().any(|&n| n == 0);
        let indices = vec![0; bucket_lens.len()];
        PreterminalGuesser {
            glossary,
            parts,
            bucket_lens,
            indices,
            exhausted,
        }
    }

    /// Number of letter slots in the preterminal.
    pub fn n_slots(&self) -> usize {
        self.bucket_lens.len()
    }

    /// The length of the first slot whose glossary bucket is empty, if any.
    pub fn empty_slot(&self) -> Option<usize> {
        let mut slots = self.parts.iter().filter_map(|p| match p {
            Part::Slot(len) => Some(*len),
            Part::Literal(_) => None,
        });
        slots.find(|&len| self.glossary.bucket(len).is_empty())
    }

    fn build(&self) -> Option<String> {
        let mut out = String::new();
        let mut slot = 0;
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Slot(len) => {
                    out.push_str(self.glossary.bucket(*len).get(*self.indices.get(slot)?)?);
                    slot += 1;
                }
            }
        }
        Some(out)
    }

    /// Little-endian increment from the last slot; flips `exhausted` when
    /// the counter wraps back to all zeros.
    fn advance(&mut self) {
        if self.indices.is_empty() {
            self.exhausted = true;
            return;
        }
        for slot in (0..self.indices.len()).rev() {
            self.indices[slot] += 1;
            if self.indices[slot] < self.bucket_lens[slot] {
                return;
            }
            self.indices[slot] = 0;
            if slot == 0 {
                self.exhausted = true;
            }
        }
    }
}

impl Iterator for PreterminalGuesser<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.exhausted {
            return None;
        }
        invariants::assert_counter_in_bounds(&self.indices, &self.bucket_lens);
        let guess = self.build()?;
        self.advance();
        Some(guess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn glossary(text: &str) -> Glossary {
        Glossary::from_reader(Cursor::new(text), "test").expect("glossary")
    }

    #[test]
    fn fills_slots_in_counter_order() {
        let g = glossary("2 ab\n2 cd\n3 xyz\n");
        let guesses: Vec<String> = PreterminalGuesser::new(&g, "|L2|X|L3|").collect();
        assert_eq!(guesses, vec!["abXxyz", "cdXxyz"]);
    }

    #[test]
    fn covers_the_whole_product() {
        let g = glossary("1 a\n1 b\n2 xx\n2 yy\n2 zz\n");
        let guesses: Vec<String> = PreterminalGuesser::new(&g, "|L1|-|L2|").collect();
        assert_eq!(guesses.len(), 6);
        let distinct: std::collections::HashSet<&String> = guesses.iter().collect();
        assert_eq!(distinct.len(), 6);
        assert_eq!(guesses[0], "a-xx");
        assert_eq!(guesses[1], "a-yy");
        assert_eq!(guesses[5], "b-zz");
    }

    #[test]
    fn zero_slot_preterminal_yields_itself_once() {
        let g = glossary("1 a\n");
        let guesses: Vec<String> = PreterminalGuesser::new(&g, "123!").collect();
        assert_eq!(guesses, vec!["123!"]);
    }

    #[test]
    fn empty_bucket_yields_nothing() {
        let g = glossary("2 ab\n");
        let guesser = PreterminalGuesser::new(&g, "|L2|9|L5|");
        assert_eq!(guesser.empty_slot(), Some(5));
        assert_eq!(guesser.count(), 0);
    }

    #[test]
    fn reports_slot_count() {
        let g = glossary("2 ab\n");
        assert_eq!(PreterminalGuesser::new(&g, "|L2|!|L2|").n_slots(), 2);
        assert_eq!(PreterminalGuesser::new(&g, "42").n_slots(), 0);
    }
}
