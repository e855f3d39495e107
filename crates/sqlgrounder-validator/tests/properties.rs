//! Property tests for tokenizer totality and tokenizer transparency.

use proptest::prelude::*;
use sqlgrounder_validator::tokenize;
use std::collections::BTreeSet;
use std::time::{Duration, Instant};

fn words_upper(sql: &str) -> BTreeSet<String> {
    tokenize(sql)
        .into_iter()
        .filter(|t| t.is_normal())
        .filter_map(|t| match t.kind {
            sqlgrounder_validator::TokenKind::Word(w) => Some(w.to_ascii_uppercase()),
            _ => None,
        })
        .collect()
}

proptest! {
    /// Tokenization terminates in time linear in length; no unbalanced quote
    /// drives it into an infinite loop. We bound real time generously since
    /// this is meant to catch quadratic/exponential blowups, not to be a
    /// tight perf assertion.
    #[test]
    fn tokenizer_totality_terminates_quickly(sql in "[\\PC]{0,400}") {
        let start = Instant::now();
        let _ = tokenize(&sql);
        prop_assert!(start.elapsed() < Duration::from_millis(500));
    }

    /// Wrapping a dangerous keyword in a string/comment hides it from the
    /// NORMAL-region word scan, identically to a keyword-free SQL of
    /// equivalent structure.
    #[test]
    fn dangerous_keyword_is_invisible_inside_any_hiding_construct(
        keyword in prop::sample::select(vec!["DROP", "DELETE", "GRANT", "EXECUTE"]),
    ) {
        let wrapped_single = format!("SELECT 'before {keyword} after' FROM t");
        let wrapped_double_comment = format!("SELECT 1 /* {keyword} */ FROM t");
        let wrapped_line_comment = format!("SELECT 1 -- {keyword}\nFROM t");
        let wrapped_dollar = format!("SELECT $$ {keyword} $$ FROM t");

        for wrapped in [wrapped_single, wrapped_double_comment, wrapped_line_comment, wrapped_dollar] {
            let words = words_upper(&wrapped);
            prop_assert!(!words.contains(keyword));
        }
    }
}
