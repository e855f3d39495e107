//! Keyphrase extraction: pull quoted literals out of a question
//! first, then tokenize the remainder into unigrams and consecutive
//! non-stopword bigrams, tagging each with `isNumber`/`isMetric`.

use regex::Regex;
use std::sync::LazyLock;

/// One extracted phrase from the question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyphrase {
    pub text: String,
    pub is_quoted_value: bool,
    pub is_number: bool,
    pub is_metric: bool,
}

impl Keyphrase {
    #[must_use]
    pub fn is_unigram_candidate(&self) -> bool {
        // "unsupported concepts" only considers unigrams, i.e. phrases
        // without an internal space (bigrams are never flagged unsupported).
        !self.is_quoted_value && !self.text.contains(' ')
    }
}

static QUOTED_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"'([^']*)'|"([^"]*)""#).expect("valid regex"));

static NUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+(\.\d+)?%?$").expect("valid regex"));

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "of", "in", "on", "for",
    "with", "by", "to", "from", "and", "or", "what", "which", "who", "whom", "how", "many",
    "much", "me", "show", "list", "give", "find", "get", "please", "do", "does", "did", "i",
    "we", "you", "it", "this", "that", "these", "those", "there", "all", "any", "per", "as",
    "at", "can", "could", "would", "should", "will", "shall", "has", "have", "had", "each",
];

const METRIC_WORDS: &[&str] = &[
    "total", "sum", "average", "avg", "mean", "max", "maximum", "min", "minimum", "count",
    "number", "top", "bottom", "highest", "lowest", "largest", "smallest", "most", "least",
    "rank", "ranking",
];

fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

fn is_metric(token: &str) -> bool {
    METRIC_WORDS.contains(&token)
}

fn is_number(token: &str) -> bool {
    NUMERIC.is_match(token)
}

fn strip_non_alphanumeric(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect()
}

/// Extract quoted literals, then unigram + bigram keyphrases from what
/// remains of `question`.
#[must_use]
pub fn extract_keyphrases(question: &str) -> Vec<Keyphrase> {
    let mut phrases = Vec::new();

    let mut remainder = String::with_capacity(question.len());
    let mut last_end = 0usize;
    for m in QUOTED_LITERAL.find_iter(question) {
        remainder.push_str(&question[last_end..m.start()]);
        remainder.push(' ');
        last_end = m.end();

        let captured = &question[m.start() + 1..m.end() - 1];
        if !captured.is_empty() {
            phrases.push(Keyphrase {
                text: captured.to_string(),
                is_quoted_value: true,
                is_number: is_number(&captured.to_lowercase()),
                is_metric: false,
            });
        }
    }
    remainder.push_str(&question[last_end..]);

    let cleaned = strip_non_alphanumeric(&remainder).to_lowercase();
    let tokens: Vec<&str> = cleaned.split_whitespace().collect();

    let kept: Vec<&str> = tokens.into_iter().filter(|t| !is_stopword(t)).collect();

    for token in &kept {
        phrases.push(Keyphrase {
            text: (*token).to_string(),
            is_quoted_value: false,
            is_number: is_number(token),
            is_metric: is_metric(token),
        });
    }

    for window in kept.windows(2) {
        let bigram = format!("{} {}", window[0], window[1]);
        phrases.push(Keyphrase {
            text: bigram,
            is_quoted_value: false,
            is_number: false,
            is_metric: false,
        });
    }

    phrases
}
