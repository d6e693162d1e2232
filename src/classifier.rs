//! Corpus classification: a plaintext wordlist becomes the glossary, the
//! base-structure distribution, and the probabilistic grammar.
//!
//! Counts are kept exact until write time; probabilities only appear in the
//! emitted artifacts. Two runs over the same corpus produce byte-identical
//! files.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use tracing::warn;

use crate::tokenizer::{tokenize, BaseStructure, Token, TokenRun};
use crate::Error;

/// Accumulates per-password observations and writes the three artifacts.
#[derive(Debug, Default)]
pub struct Classifier {
    bases: HashMap<BaseStructure, u64>,
    glossary: BTreeMap<usize, BTreeSet<String>>,
    grammar: HashMap<Token, HashMap<String, u64>>,
    classified: u64,
    skipped: u64,
}

impl Classifier {
    pub fn new() -> Classifier {
        Classifier::default()
    }

    /// Classify every line of a wordlist file.
    ///
    /// Lines are trimmed of surrounding whitespace; empty lines contribute
    /// nothing. A line that is not valid UTF-8 is skipped and counted, not
    /// fatal. A corpus with zero usable lines is an error: there is no
    /// distribution to emit.
    pub fn classify_file<P: AsRef<Path>>(path: P) -> Result<Classifier, Error> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::Corpus(format!("{}: {e}", path.display())))?;
        let mut classifier = Classifier::new();
        classifier.classify_reader(BufReader::new(file))?;
        if classifier.skipped > 0 {
            warn!(
                skipped = classifier.skipped,
                "corpus lines were not valid UTF-8 and were ignored"
            );
        }
        if classifier.classified == 0 {
            return Err(Error::Corpus(format!(
                "{}: no usable input lines",
                path.display()
            )));
        }
        Ok(classifier)
    }

    /// Classify lines from any byte source. Invalid UTF-8 lines are counted
    /// in [`Classifier::skipped`] and otherwise ignored.
    pub fn classify_reader<R: BufRead>(&mut self, mut reader: R) -> Result<(), Error> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                return Ok(());
            }
            match std::str::from_utf8(&buf) {
                Ok(line) => self.observe(line.trim()),
                Err(_) => self.skipped += 1,
            }
        }
    }

    /// Record one password. Empty input contributes no counts.
    pub fn observe(&mut self, word: &str) {
        let runs = tokenize(word);
        let tokens: Vec<Token> = runs.iter().map(TokenRun::token).collect();
        let Some(structure) = BaseStructure::from_tokens(tokens) else {
            return;
        };

        for run in &runs {
            if run.token().is_letter() {
                self.glossary
                    .entry(run.len)
                    .or_default()
                    .insert(run.text.to_string());
            } else {
                *self
                    .grammar
                    .entry(run.token())
                    .or_default()
                    .entry(run.text.to_string())
                    .or_insert(0) += 1;
            }
        }

        *self.bases.entry(structure).or_insert(0) += 1;
        self.classified += 1;
    }

    /// Number of passwords that contributed counts.
    pub fn classified(&self) -> u64 {
        self.classified
    }

    /// Number of non-UTF-8 lines dropped while reading.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    /// Write all three artifacts. The classifier must have observed at
    /// least one password.
    pub fn write_artifacts<P: AsRef<Path>>(
        &self,
        bases_path: P,
        grammar_path: P,
        glossary_path: P,
    ) -> Result<(), Error> {
        let mut bases = BufWriter::new(File::create(bases_path)?);
        self.write_bases(&mut bases)?;
        bases.flush()?;

        let mut grammar = BufWriter::new(File::create(grammar_path)?);
        self.write_grammar(&mut grammar)?;
        grammar.flush()?;

        let mut glossary = BufWriter::new(File::create(glossary_path)?);
        self.write_glossary(&mut glossary)?;
        glossary.flush()?;
        Ok(())
    }

    /// Base structures with probabilities, ordered by probability descending
    /// and structure ascending on ties. Ties compare exact counts, never
    /// floats.
    pub fn write_bases<W: Write>(&self, w: &mut W) -> Result<(), Error> {
        if self.classified == 0 {
            return Err(Error::Corpus("no observations to write".to_string()));
        }
        let total = self.classified as f64;
        let mut entries: Vec<(String, u64)> = self
            .bases
            .iter()
            .map(|(s, &count)| (s.to_string(), count))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        for (structure, count) in entries {
            writeln!(w, "{:20} {}", structure, count as f64 / total)?;
        }
        Ok(())
    }

    /// Grammar records grouped by token ascending, then probability
    /// descending, then substring ascending.
    pub fn write_grammar<W: Write>(&self, w: &mut W) -> Result<(), Error> {
        let mut tokens: Vec<&Token> = self.grammar.keys().collect();
        tokens.sort();
        for token in tokens {
            let histogram = &self.grammar[token];
            let total: u64 = histogram.values().sum();
            let mut entries: Vec<(&String, u64)> =
                histogram.iter().map(|(s, &c)| (s, c)).collect();
            entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
            let label = token.to_string();
            for (substring, count) in entries {
                writeln!(
                    w,
                    "{:3} {:10} {}",
                    label,
                    substring,
                    count as f64 / total as f64
                )?;
            }
        }
        Ok(())
    }

    /// Glossary records ordered by length ascending, then word ascending.
    pub fn write_glossary<W: Write>(&self, w: &mut W) -> Result<(), Error> {
        for (len, words) in &self.glossary {
            for word in words {
                writeln!(w, "{:3} {}", len, word)?;
            }
        }
        Ok(())
    }
}
