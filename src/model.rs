//! Loading of classifier artifacts.
//!
//! The three artifact files are plain UTF-8 text, one space-separated record
//! per line (see the classifier for the exact ordering contract). Readers
//! are whitespace-tolerant; every parse failure reports the offending file
//! and line. Loaded artifacts are immutable for the life of a run.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::tokenizer::{BaseStructure, Token};
use crate::Error;

fn parse_probability(field: &str, context: &str) -> Result<f64, Error> {
    let p: f64 = field
        .parse()
        .map_err(|_| Error::Artifact(format!("{context}: invalid probability '{field}'")))?;
    if !(p > 0.0 && p <= 1.0) {
        return Err(Error::Artifact(format!(
            "{context}: probability {p} outside (0, 1]"
        )));
    }
    Ok(p)
}

/// One base structure with its corpus probability.
#[derive(Debug, Clone)]
pub struct BaseEntry {
    pub structure: BaseStructure,
    pub probability: f64,
}

/// The base-structure distribution, in file (probability-descending) order.
#[derive(Debug, Clone)]
pub struct BaseStructures {
    entries: Vec<BaseEntry>,
}

impl BaseStructures {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<BaseStructures, Error> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::Artifact(format!("{}: {e}", path.display())))?;
        Self::from_reader(BufReader::new(file), &path.display().to_string())
    }

    pub fn from_reader<R: BufRead>(reader: R, source: &str) -> Result<BaseStructures, Error> {
        let mut entries = Vec::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let context = format!("{source}:{}", idx + 1);
            let mut fields = line.split_whitespace();
            let (Some(structure), Some(probability), None) =
                (fields.next(), fields.next(), fields.next())
            else {
                return Err(Error::Artifact(format!(
                    "{context}: expected '<structure> <probability>'"
                )));
            };
            entries.push(BaseEntry {
                structure: structure.parse()?,
                probability: parse_probability(probability, &context)?,
            });
        }
        if entries.is_empty() {
            return Err(Error::Artifact(format!("{source}: no base structures")));
        }
        Ok(BaseStructures { entries })
    }

    pub fn entries(&self) -> &[BaseEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Map from non-letter token to its expansion list, each list in file
/// (probability-descending) order and summing to one.
#[derive(Debug, Clone, Default)]
pub struct Grammar {
    table: HashMap<Token, Vec<(String, f64)>>,
}

impl Grammar {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Grammar, Error> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::Artifact(format!("{}: {e}", path.display())))?;
        Self::from_reader(BufReader::new(file), &path.display().to_string())
    }

    pub fn from_reader<R: BufRead>(reader: R, source: &str) -> Result<Grammar, Error> {
        let mut table: HashMap<Token, Vec<(String, f64)>> = HashMap::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let context = format!("{source}:{}", idx + 1);
            let mut fields = line.split_whitespace();
            let (Some(token), Some(substring), Some(probability), None) =
                (fields.next(), fields.next(), fields.next(), fields.next())
            else {
                return Err(Error::Artifact(format!(
                    "{context}: expected '<token> <substring> <probability>'"
                )));
            };
            let token: Token = token.parse()?;
            if token.is_letter() {
                return Err(Error::Artifact(format!(
                    "{context}: letter token {token} does not belong in the grammar"
                )));
            }
            table
                .entry(token)
                .or_default()
                .push((substring.to_string(), parse_probability(probability, &context)?));
        }
        Ok(Grammar { table })
    }

    /// Expansion list for a token, probability-descending, or `None` when
    /// the token never occurred in the training corpus.
    pub fn expansions(&self, token: &Token) -> Option<&[(String, f64)]> {
        self.table.get(token).map(Vec::as_slice)
    }

    /// Number of distinct non-letter tokens.
    pub fn n_tokens(&self) -> usize {
        self.table.len()
    }
}

/// Map from word length to the distinct letter fragments of that length,
/// each bucket in file (ascending) order.
#[derive(Debug, Clone, Default)]
pub struct Glossary {
    buckets: HashMap<usize, Vec<String>>,
}

impl Glossary {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Glossary, Error> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::Artifact(format!("{}: {e}", path.display())))?;
        Self::from_reader(BufReader::new(file), &path.display().to_string())
    }

    pub fn from_reader<R: BufRead>(reader: R, source: &str) -> Result<Glossary, Error> {
        let mut buckets: HashMap<usize, Vec<String>> = HashMap::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let context = format!("{source}:{}", idx + 1);
            let mut fields = line.split_whitespace();
            let (Some(len), Some(word), None) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(Error::Artifact(format!(
                    "{context}: expected '<length> <word>'"
                )));
            };
            let len: usize = len
                .parse()
                .map_err(|_| Error::Artifact(format!("{context}: invalid length '{len}'")))?;
            if word.chars().count() != len {
                return Err(Error::Artifact(format!(
                    "{context}: word '{word}' is not {len} characters"
                )));
            }
            buckets.entry(len).or_default().push(word.to_string());
        }
        Ok(Glossary { buckets })
    }

    /// Words of exactly `len` characters; empty when the corpus had none.
    pub fn bucket(&self, len: usize) -> &[String] {
        self.buckets.get(&len).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn n_words(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn loads_padded_base_structures() {
        let text = "L3                   0.6666666666666666\nL2|D1                0.3333333333333333\n";
        let bases =
            BaseStructures::from_reader(Cursor::new(text), "test").expect("parses");
        assert_eq!(bases.len(), 2);
        assert_eq!(bases.entries()[0].structure.to_string(), "L3");
        let mass: f64 = bases.entries().iter().map(|e| e.probability).sum();
        assert!((mass - 1.0).abs() < 1e-9);
    }

    #[test]
    fn empty_base_structures_are_fatal() {
        assert!(BaseStructures::from_reader(Cursor::new("\n\n"), "test").is_err());
    }

    #[test]
    fn rejects_out_of_range_probability() {
        assert!(BaseStructures::from_reader(Cursor::new("L3 1.5"), "test").is_err());
        assert!(BaseStructures::from_reader(Cursor::new("L3 0"), "test").is_err());
    }

    #[test]
    fn grammar_preserves_file_order() {
        let text = "D1  1          0.5\nD1  2          0.3\nD1  7          0.2\nS1  !          1\n";
        let grammar = Grammar::from_reader(Cursor::new(text), "test").expect("parses");
        let d1: Token = "D1".parse().expect("token");
        let fills: Vec<&str> = grammar.expansions(&d1).expect("present")
            .iter()
            .map(|(s, _)| s.as_str())
            .collect();
        assert_eq!(fills, vec!["1", "2", "7"]);
        assert_eq!(grammar.n_tokens(), 2);
    }

    #[test]
    fn grammar_rejects_letter_tokens() {
        assert!(Grammar::from_reader(Cursor::new("L4 word 1"), "test").is_err());
    }

    #[test]
    fn glossary_buckets_by_length() {
        let text = "  2 ab\n  2 cd\n  3 xyz\n";
        let glossary = Glossary::from_reader(Cursor::new(text), "test").expect("parses");
        assert_eq!(glossary.bucket(2), &["ab".to_string(), "cd".to_string()]);
        assert_eq!(glossary.bucket(3), &["xyz".to_string()]);
        assert!(glossary.bucket(9).is_empty());
        assert_eq!(glossary.n_words(), 3);
    }

    #[test]
    fn glossary_rejects_length_mismatch() {
        assert!(Glossary::from_reader(Cursor::new("3 ab"), "test").is_err());
    }
}
