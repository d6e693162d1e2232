//! Probability-ordered enumeration of preterminals.
//!
//! A best-first search over the grammar: a max-heap is seeded with every
//! base structure at index vector (0, ..., 0), and popping an entry pushes
//! its next neighbor along each coordinate. Because every per-token
//! expansion list is sorted probability-descending, the pop order is
//! non-increasing in joint probability, and the exponential space is
//! explored lazily with memory proportional to the frontier.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::fmt::Write as _;

use tracing::warn;

use crate::invariants;
use crate::model::{BaseStructures, Grammar};

/// A partially expanded base structure: concrete grammar fills for the
/// non-letter tokens, `|L<n>|` placeholders for the letter slots.
#[derive(Debug, Clone, PartialEq)]
pub struct Preterminal {
    pub text: String,
    /// Joint probability `P(B) * prod P(t_j, i_j)`.
    pub probability: f64,
}

/// Heap entry: the probability plus the coordinates that produced it.
#[derive(Debug, Clone)]
struct Candidate {
    probability: f64,
    base: usize,
    indices: Vec<usize>,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        // Highest probability pops first; ties break toward the earlier
        // base structure and lexicographically smaller index vector so the
        // emission order is deterministic.
        self.probability
            .total_cmp(&other.probability)
            .then_with(|| other.base.cmp(&self.base))
            .then_with(|| other.indices.cmp(&self.indices))
    }
}

/// Iterator over preterminals in non-increasing probability order.
///
/// Each preterminal is emitted exactly once. The artifacts are borrowed and
/// must outlive the enumeration.
pub struct PreterminalHeap<'a> {
    bases: &'a BaseStructures,
    grammar: &'a Grammar,
    heap: BinaryHeap<Candidate>,
    visited: HashSet<(usize, Vec<usize>)>,
    max_frontier: Option<usize>,
    last_probability: f64,
}

impl<'a> PreterminalHeap<'a> {
    /// Seed the heap with every base structure at index vector (0, ..., 0).
    ///
    /// A base structure whose non-letter tokens are missing from the grammar
    /// cannot be expanded; it is skipped with a warning rather than aborting
    /// the run.
    pub fn new(bases: &'a BaseStructures, grammar: &'a Grammar) -> PreterminalHeap<'a> {
        let mut this = PreterminalHeap {
            bases,
            grammar,
            heap: BinaryHeap::with_capacity(bases.len()),
            visited: HashSet::new(),
            max_frontier: None,
            last_probability: f64::INFINITY,
        };
        for (base, entry) in bases.entries().iter().enumerate() {
            let indices = vec![0; entry.structure.nonletter_tokens().count()];
            match this.joint_probability(base, &indices) {
                Some(probability) => {
                    this.visited.insert((base, indices.clone()));
                    this.heap.push(Candidate {
                        probability,
                        base,
                        indices,
                    });
                }
                None => warn!(
                    structure = %entry.structure,
                    "base structure references tokens absent from the grammar, skipping"
                ),
            }
        }
        this
    }

    /// Cap the frontier at `cap` entries. When the heap grows past the cap
    /// the lowest-probability entries are dropped, trading completeness in
    /// the far tail for bounded memory.
    pub fn with_max_frontier(mut self, cap: usize) -> PreterminalHeap<'a> {
        self.max_frontier = Some(cap.max(1));
        self
    }

    /// Current frontier size.
    pub fn frontier_len(&self) -> usize {
        self.heap.len()
    }

    /// Joint probability of the preterminal at (base, indices), or `None`
    /// when the grammar cannot supply a referenced expansion.
    fn joint_probability(&self, base: usize, indices: &[usize]) -> Option<f64> {
        let entry = &self.bases.entries()[base];
        let mut probability = entry.probability;
        for (token, &idx) in entry.structure.nonletter_tokens().zip(indices) {
            probability *= self.grammar.expansions(token)?.get(idx)?.1;
        }
        Some(probability)
    }

    /// Render the preterminal text: letter tokens become `|L<n>|`
    /// placeholders, non-letter tokens are filled verbatim.
    fn render(&self, base: usize, indices: &[usize]) -> Option<String> {
        let entry = &self.bases.entries()[base];
        let mut out = String::new();
        let mut slot = 0;
        for token in entry.structure.tokens() {
            if token.is_letter() {
                let _ = write!(out, "|{token}|");
            } else {
                let fill = &self.grammar.expansions(token)?.get(*indices.get(slot)?)?.0;
                out.push_str(fill);
                slot += 1;
            }
        }
        Some(out)
    }

    /// Push the next neighbor along each coordinate, skipping out-of-bounds
    /// and already-seen index vectors.
    fn push_neighbors(&mut self, base: usize, indices: &[usize]) {
        for slot in 0..indices.len() {
            let mut next = indices.to_vec();
            next[slot] += 1;
            if self.visited.contains(&(base, next.clone())) {
                continue;
            }
            if let Some(probability) = self.joint_probability(base, &next) {
                self.visited.insert((base, next.clone()));
                self.heap.push(Candidate {
                    probability,
                    base,
                    indices: next,
                });
            }
        }
        if let Some(cap) = self.max_frontier {
            if self.heap.len() > cap {
                let mut entries = std::mem::take(&mut self.heap).into_vec();
                entries.sort_by(|a, b| b.cmp(a));
                entries.truncate(cap);
                self.heap = BinaryHeap::from(entries);
            }
        }
    }
}

impl Iterator for PreterminalHeap<'_> {
    type Item = Preterminal;

    fn next(&mut self) -> Option<Preterminal> {
        loop {
            let candidate = self.heap.pop()?;
            self.push_neighbors(candidate.base, &candidate.indices);
            let Some(text) = self.render(candidate.base, &candidate.indices) else {
                continue;
            };
            invariants::assert_monotonic_emission(self.last_probability, candidate.probability);
            self.last_probability = candidate.probability;
            return Some(Preterminal {
                text,
                probability: candidate.probability,
            });
        }
    }
}
