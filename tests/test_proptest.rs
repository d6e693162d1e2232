// Property-based tests for the generation pipeline.
use std::io::Cursor;

use proptest::prelude::*;

use passmill::enumerator::PreterminalHeap;
use passmill::guesser::PreterminalGuesser;
use passmill::mangle::{MangleRule, ManglingEngine};
use passmill::model::{BaseStructures, Glossary, Grammar};
use passmill::tokenizer::tokenize;

proptest! {
    #[test]
    fn runs_reassemble_to_the_input(word in "\\PC{0,40}") {
        let runs = tokenize(&word);
        let rebuilt: String = runs.iter().map(|r| r.text).collect();
        prop_assert_eq!(rebuilt, word);
    }

    #[test]
    fn run_lengths_sum_to_the_char_count(word in ".{0,40}") {
        let total: usize = tokenize(&word).iter().map(|r| r.len).sum();
        prop_assert_eq!(total, word.chars().count());
    }

    #[test]
    fn adjacent_runs_never_share_a_class(word in ".{0,40}") {
        let runs = tokenize(&word);
        for pair in runs.windows(2) {
            prop_assert_ne!(pair[0].class, pair[1].class);
        }
    }

    #[test]
    fn mangling_always_yields_a_power_of_two(
        k in 0usize..6,
        word in "[a-z]{0,8}",
    ) {
        let rules = vec![
            MangleRule::Append { suffix: "!".to_string() };
            k
        ];
        let engine = ManglingEngine::new(rules).expect("small rule list");
        prop_assert_eq!(engine.combinations(&word).count(), 1usize << k);
    }

    #[test]
    fn guesser_covers_exactly_the_bucket_product(
        a in 1usize..5,
        b in 1usize..5,
    ) {
        let mut text = String::new();
        for i in 0..a {
            text.push_str(&format!("2 a{i}\n"));
        }
        for i in 0..b {
            text.push_str(&format!("3 bb{i}\n"));
        }
        let glossary = Glossary::from_reader(Cursor::new(text), "prop").expect("glossary");
        let guesses: Vec<String> =
            PreterminalGuesser::new(&glossary, "|L2|-|L3|").collect();
        prop_assert_eq!(guesses.len(), a * b);
        let distinct: std::collections::HashSet<&String> = guesses.iter().collect();
        prop_assert_eq!(distinct.len(), a * b);
    }

    #[test]
    fn enumeration_is_monotonic_unique_and_complete(
        base_probs in prop::collection::vec(0.01f64..=1.0, 1..4),
        d_probs in prop::collection::vec(0.01f64..=1.0, 1..5),
        s_probs in prop::collection::vec(0.01f64..=1.0, 1..5),
    ) {
        // Expansion lists must be probability-descending, as the
        // classifier writes them.
        let (mut d_probs, mut s_probs) = (d_probs, s_probs);
        d_probs.sort_by(|x, y| y.total_cmp(x));
        s_probs.sort_by(|x, y| y.total_cmp(x));

        let shapes = ["D1", "D1|S1", "L4|D1|S1"];
        let mut bases_text = String::new();
        for (shape, p) in shapes.iter().zip(&base_probs) {
            bases_text.push_str(&format!("{shape} {p}\n"));
        }
        let mut grammar_text = String::new();
        for (i, p) in d_probs.iter().enumerate() {
            grammar_text.push_str(&format!("D1 {i} {p}\n"));
        }
        let symbols = ["!", "?", "#", "%"];
        for (sym, p) in symbols.iter().zip(&s_probs) {
            grammar_text.push_str(&format!("S1 {sym} {p}\n"));
        }

        let bases = BaseStructures::from_reader(Cursor::new(bases_text), "prop")
            .expect("bases");
        let grammar = Grammar::from_reader(Cursor::new(grammar_text), "prop")
            .expect("grammar");

        let emitted: Vec<_> = PreterminalHeap::new(&bases, &grammar).collect();

        // Coverage: each shape contributes the product of its expansion
        // list sizes.
        let d = d_probs.len();
        let s = s_probs.len();
        let per_shape = [d, d * s, d * s];
        let expected: usize = per_shape.iter().take(base_probs.len()).sum();
        prop_assert_eq!(emitted.len(), expected);

        // Uniqueness: the shapes render to distinct texts by construction.
        let distinct: std::collections::HashSet<&str> =
            emitted.iter().map(|p| p.text.as_str()).collect();
        prop_assert_eq!(distinct.len(), expected);

        for pair in emitted.windows(2) {
            prop_assert!(pair[0].probability >= pair[1].probability);
        }
    }
}
