//! Result shape (signal 3): does the candidate's aggregation/grouping/
//! ordering structure match what the question seems to ask for.

use std::sync::LazyLock;

use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    List,
    Unknown,
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Aggregation the question's wording seems to call for.
#[must_use]
pub fn expected_aggregation(question: &str) -> Aggregation {
    let q = question.to_lowercase();
    if contains_any(&q, &["how many", "count", "number of"]) {
        Aggregation::Count
    } else if contains_any(&q, &["total", "sum"]) {
        Aggregation::Sum
    } else if contains_any(&q, &["average", "avg", "mean"]) {
        Aggregation::Avg
    } else if contains_any(&q, &["min", "lowest", "smallest", "least"]) {
        Aggregation::Min
    } else if contains_any(&q, &["max", "highest", "largest", "greatest", "most"]) {
        Aggregation::Max
    } else if contains_any(&q, &["list", "show", "display", "all"]) {
        Aggregation::List
    } else {
        Aggregation::Unknown
    }
}

static COUNT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bCOUNT\s*\(").expect("valid regex"));
static SUM_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bSUM\s*\(").expect("valid regex"));
static AVG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bAVG\s*\(").expect("valid regex"));
static MIN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bMIN\s*\(").expect("valid regex"));
static MAX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bMAX\s*\(").expect("valid regex"));
static GROUP_BY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bGROUP\s+BY\b").expect("valid regex"));
static ORDER_BY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bORDER\s+BY\b").expect("valid regex"));

/// Aggregation actually present in the candidate's `SELECT` list, by regex
/// presence; first match among COUNT/SUM/AVG/MIN/MAX wins, else `List`.
#[must_use]
pub fn actual_aggregation(sql: &str) -> Aggregation {
    if COUNT_RE.is_match(sql) {
        Aggregation::Count
    } else if SUM_RE.is_match(sql) {
        Aggregation::Sum
    } else if AVG_RE.is_match(sql) {
        Aggregation::Avg
    } else if MIN_RE.is_match(sql) {
        Aggregation::Min
    } else if MAX_RE.is_match(sql) {
        Aggregation::Max
    } else {
        Aggregation::List
    }
}

/// "by X" / "per X" phrasing suggests the question wants a breakdown.
#[must_use]
pub fn expects_group_by(question: &str) -> bool {
    let q = question.to_lowercase();
    contains_any(&q, &[" by ", " per "])
}

/// "top/bottom/rank/sort" phrasing suggests the question wants an order.
#[must_use]
pub fn expects_order_by(question: &str) -> bool {
    let q = question.to_lowercase();
    contains_any(&q, &["top", "bottom", "rank", "sort"])
}

/// Aggregation-mismatch baseline, before GROUP BY / ORDER BY adjustments.
///
/// `Unknown` expectations always score `0.5` regardless of what the
/// candidate does. On a direct match the score is `1.0`. Otherwise, if
/// exactly one side is `List` and the other a specific aggregate, the shapes
/// are fundamentally incompatible (one row vs many) and the candidate scores
/// `0.0`; if both sides are specific aggregates that merely differ (e.g.
/// expected sum, actual avg) the candidate still picked *an* aggregate and
/// scores `0.3`.
fn aggregation_baseline(expected: Aggregation, actual: Aggregation) -> f64 {
    if expected == Aggregation::Unknown {
        return 0.5;
    }
    if expected == actual {
        return 1.0;
    }
    if expected == Aggregation::List || actual == Aggregation::List {
        return 0.0;
    }
    0.3
}

#[must_use]
pub fn score(question: &str, sql: &str) -> f64 {
    let expected_agg = expected_aggregation(question);
    let actual_agg = actual_aggregation(sql);
    let mut score = aggregation_baseline(expected_agg, actual_agg);

    let expected_group = expects_group_by(question);
    let actual_group = GROUP_BY_RE.is_match(sql);
    if expected_group == actual_group {
        score += 0.1;
    } else if expected_group && !actual_group {
        score -= 0.2;
    }

    let expected_order = expects_order_by(question);
    let actual_order = ORDER_BY_RE.is_match(sql);
    if expected_order == actual_order {
        score += 0.1;
    }

    score.clamp(0.0, 1.0)
}
