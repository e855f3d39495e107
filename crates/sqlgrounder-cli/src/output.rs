//! CLI output utilities: tables, TTY detection, JSON mode.
//!
//! Provides structured output that automatically adapts:
//! - **JSON mode**: machine-readable JSON via `--json`
//! - **TTY mode**: styled table output with headers and borders
//! - **Pipe mode**: clean plain-text tables (no color, no decoration)

#![forbid(unsafe_code)]

use serde::Serialize;
use std::io::IsTerminal;

/// Detect whether stdout is a TTY.
#[must_use]
pub fn is_tty() -> bool {
    std::io::stdout().is_terminal()
}

// ── Simple table renderer ────────────────────────────────────────────────

/// A simple CLI table that auto-sizes columns and renders to text.
///
/// Usage:
/// ```ignore
/// let mut table = CliTable::new(vec!["ID", "NAME", "STATUS"]);
/// table.add_row(vec!["1", "Alice", "active"]);
/// table.add_row(vec!["2", "Bob", "inactive"]);
/// table.render();
/// ```
pub struct CliTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
    /// Minimum column widths (0 = auto).
    min_widths: Vec<usize>,
}

impl CliTable {
    /// Create a new table with the given column headers.
    pub fn new(headers: Vec<&str>) -> Self {
        let min_widths = vec![0; headers.len()];
        Self {
            headers: headers.into_iter().map(String::from).collect(),
            rows: Vec::new(),
            min_widths,
        }
    }

    /// Add a row of string values.
    pub fn add_row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    /// Set minimum widths for columns.
    pub fn set_min_widths(&mut self, widths: Vec<usize>) {
        self.min_widths = widths;
    }

    /// Compute column widths based on headers and data.
    fn column_widths(&self) -> Vec<usize> {
        let ncols = self.headers.len();
        let mut widths: Vec<usize> = self
            .headers
            .iter()
            .enumerate()
            .map(|(i, h)| {
                let min = self.min_widths.get(i).copied().unwrap_or(0);
                h.len().max(min)
            })
            .collect();

        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if i < ncols {
                    widths[i] = widths[i].max(cell.len());
                }
            }
        }
        widths
    }

    /// Render the table to stdout.
    pub fn render(&self) {
        let text = self.render_to_string(is_tty());
        for line in text.lines() {
            println!("{line}");
        }
    }

    /// Render the table to a `String`, with TTY-awareness controlled by the
    /// caller. This is the testable core of [`Self::render`].
    pub fn render_to_string(&self, tty: bool) -> String {
        if self.rows.is_empty() {
            return String::new();
        }
        let widths = self.column_widths();
        let mut out = String::new();

        // Header
        let header_line = self.format_row(&self.headers, &widths);
        if tty {
            out.push_str(&format!("\x1b[1m{header_line}\x1b[0m\n"));
        } else {
            out.push_str(&header_line);
            out.push('\n');
        }

        // Separator on TTY
        if tty {
            let sep: String = widths
                .iter()
                .map(|w| "─".repeat(*w))
                .collect::<Vec<_>>()
                .join("──");
            out.push_str(&sep);
            out.push('\n');
        }

        // Data rows
        for row in &self.rows {
            let line = self.format_row(row, &widths);
            out.push_str(&line);
            out.push('\n');
        }
        out
    }

    fn format_row(&self, cells: &[String], widths: &[usize]) -> String {
        let ncols = widths.len();
        let mut parts = Vec::with_capacity(ncols);
        for (i, width) in widths.iter().enumerate() {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            if i == ncols - 1 {
                // Last column: no padding
                parts.push(cell.to_string());
            } else {
                parts.push(format!("{:<width$}", cell, width = *width));
            }
        }
        parts.join("  ")
    }
}

// ── JSON or table output ─────────────────────────────────────────────────

/// Output data as JSON (pretty-printed) or as a table.
///
/// When `json_mode` is true, serializes `data` to JSON.
/// When false, uses the provided render closure for human output.
pub fn json_or_table<T: Serialize, F>(json_mode: bool, data: &T, render: F)
where
    F: FnOnce(),
{
    if json_mode {
        println!("{}", serde_json::to_string_pretty(data).unwrap_or_else(|_| "[]".to_string()));
    } else {
        render();
    }
}

/// Output an "empty" message or empty JSON array.
pub fn empty_result(json_mode: bool, message: &str) {
    if json_mode {
        println!("[]");
    } else {
        println!("{message}");
    }
}

// ── Status line helpers ──────────────────────────────────────────────────
//
// Each helper has a testable `*_line` core that builds the string without
// touching stdout/stderr, plus a thin printer that picks the TTY/non-TTY
// variant and writes it.

fn success_line(msg: &str, tty: bool) -> String {
    if tty {
        format!("\x1b[32m✓\x1b[0m {msg}")
    } else {
        msg.to_string()
    }
}

fn warn_line(msg: &str, tty: bool) -> String {
    if tty {
        format!("\x1b[33m!\x1b[0m {msg}")
    } else {
        msg.to_string()
    }
}

fn error_line(msg: &str, tty: bool) -> String {
    if tty {
        format!("\x1b[31merror:\x1b[0m {msg}")
    } else {
        format!("error: {msg}")
    }
}

fn section_line(title: &str, tty: bool) -> String {
    if tty {
        format!("\x1b[1m{title}\x1b[0m")
    } else {
        title.to_string()
    }
}

fn kv_line(key: &str, value: &str) -> String {
    format!("  {key:<20} {value}")
}

/// Print a success message with an optional checkmark on TTY.
pub fn success(msg: &str) {
    println!("{}", success_line(msg, is_tty()));
}

/// Print a warning message to stderr.
pub fn warn(msg: &str) {
    eprintln!("{}", warn_line(msg, is_tty()));
}

/// Print an error message to stderr.
pub fn error(msg: &str) {
    eprintln!("{}", error_line(msg, is_tty()));
}

/// Print a section header (bold on TTY).
pub fn section(title: &str) {
    println!("{}", section_line(title, is_tty()));
}

/// Print a key-value pair with aligned values.
pub fn kv(key: &str, value: &str) {
    println!("{}", kv_line(key, value));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_column_widths_from_headers() {
        let table = CliTable::new(vec!["ID", "NAME", "LONG_HEADER"]);
        let widths = table.column_widths();
        assert_eq!(widths, vec![2, 4, 11]);
    }

    #[test]
    fn table_column_widths_expand_for_data() {
        let mut table = CliTable::new(vec!["ID", "NAME"]);
        table.add_row(vec!["1".into(), "a-very-long-name".into()]);
        let widths = table.column_widths();
        assert_eq!(widths, vec![2, 16]);
    }

    #[test]
    fn json_or_table_json_mode_does_not_call_render() {
        let data = vec!["a", "b", "c"];
        json_or_table(true, &data, || {
            panic!("render should not be called in JSON mode");
        });
    }

    #[test]
    fn json_or_table_human_mode_calls_render() {
        let data = vec!["a"];
        let mut called = false;
        json_or_table(false, &data, || {
            called = true;
        });
        assert!(called, "render closure should be called in human mode");
    }

    #[test]
    fn success_non_tty_no_ansi() {
        let line = success_line("pipeline finished", false);
        assert!(!line.contains("\x1b["), "non-TTY should have no ANSI codes");
        assert!(line.contains("pipeline finished"));
    }

    #[test]
    fn warn_non_tty_no_ansi() {
        let line = warn_line("sidecar degraded", false);
        assert!(!line.contains("\x1b["));
        assert!(line.contains("sidecar degraded"));
    }

    #[test]
    fn error_non_tty_plain_prefix() {
        let line = error_line("bad input", false);
        assert!(!line.contains("\x1b["));
        assert!(line.contains("error:"));
        assert!(line.contains("bad input"));
    }

    #[test]
    fn section_non_tty_no_bold() {
        let line = section_line("Join Plan", false);
        assert!(!line.contains("\x1b["));
        assert!(line.contains("Join Plan"));
    }

    #[test]
    fn section_tty_is_bold() {
        let line = section_line("Join Plan", true);
        assert!(line.contains("\x1b[1m"));
        assert!(line.contains("\x1b[0m"));
    }

    #[test]
    fn kv_formatting() {
        let line = kv_line("sidecar", "healthy");
        assert!(line.contains("sidecar"));
        assert!(line.contains("healthy"));
        assert!(line.starts_with("  "));
    }

    #[test]
    fn table_render_non_tty_no_separator_line() {
        let mut table = CliTable::new(vec!["A", "B"]);
        table.add_row(vec!["1".into(), "hello".into()]);
        let output = table.render_to_string(false);
        assert!(!output.contains('─'), "non-TTY table should have no separator");
        assert!(output.contains('A'));
        assert!(output.contains("hello"));
    }

    #[test]
    fn table_render_non_tty_no_bold_header() {
        let mut table = CliTable::new(vec!["ID", "NAME"]);
        table.add_row(vec!["1".into(), "Alice".into()]);
        let output = table.render_to_string(false);
        assert!(!output.contains("\x1b[1m"), "non-TTY table should not bold header");
        assert!(!output.contains("\x1b[0m"), "non-TTY table should not have reset");
    }

    // ── render_to_string table fixtures ────────────────────────────────────

    fn sample_tables_table() -> CliTable {
        let mut t = CliTable::new(vec!["TABLE", "MODULE", "SOURCE"]);
        t.add_row(vec!["employees".into(), "hr".into(), "retrieval".into()]);
        t.add_row(vec!["departments".into(), "hr".into(), "fk_expansion".into()]);
        t
    }

    fn sample_candidates_table() -> CliTable {
        let mut t = CliTable::new(vec!["#", "SCORE", "VALID", "SQL"]);
        t.add_row(vec!["0".into(), "42.50".into(), "true".into(), "SELECT COUNT(*) FROM employees".into()]);
        t.add_row(vec!["1".into(), "18.00".into(), "true".into(), "SELECT SUM(salary) FROM employees".into()]);
        t
    }

    fn sample_issues_table() -> CliTable {
        let mut t = CliTable::new(vec!["SEVERITY", "CODE", "MESSAGE"]);
        t.add_row(vec!["Error".into(), "UNKNOWN_TABLE".into(), "table 'secrets' is not in the allowlist".into()]);
        t.add_row(vec!["Warning".into(), "TOO_MANY_JOINS".into(), "candidate has 7 joins".into()]);
        t
    }

    #[test]
    fn render_to_string_pipe_mode_tables() {
        let table = sample_tables_table();
        let output = table.render_to_string(false);
        assert!(!output.contains('\x1b'), "pipe mode should have no ANSI");
        assert!(!output.contains('─'), "pipe mode should have no separator");
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3, "header + 2 data rows");
        assert!(lines[0].contains("TABLE"));
        assert!(lines[0].contains("MODULE"));
        assert!(lines[1].contains("employees"));
        assert!(lines[2].contains("departments"));
    }

    #[test]
    fn render_to_string_tty_mode_tables() {
        let table = sample_tables_table();
        let output = table.render_to_string(true);
        assert!(output.contains("\x1b[1m"), "TTY mode should bold header");
        assert!(output.contains("\x1b[0m"), "TTY mode should reset after header");
        assert!(output.contains('─'), "TTY mode should have separator");
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 4, "header + separator + 2 data rows");
    }

    #[test]
    fn render_to_string_pipe_mode_candidates() {
        let table = sample_candidates_table();
        let output = table.render_to_string(false);
        assert!(!output.contains('\x1b'));
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("SCORE"));
        assert!(lines[1].contains("COUNT"));
        assert!(lines[2].contains("SUM"));
    }

    #[test]
    fn render_to_string_pipe_mode_issues() {
        let table = sample_issues_table();
        let output = table.render_to_string(false);
        assert!(!output.contains('\x1b'));
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("SEVERITY"));
        assert!(lines[1].contains("UNKNOWN_TABLE"));
        assert!(lines[2].contains("TOO_MANY_JOINS"));
    }

    #[test]
    fn render_to_string_empty_returns_empty() {
        let table = CliTable::new(vec!["A", "B"]);
        assert!(table.render_to_string(false).is_empty());
        assert!(table.render_to_string(true).is_empty());
    }

    #[test]
    fn render_to_string_columns_align_across_rows() {
        let mut t = CliTable::new(vec!["X", "Y"]);
        t.add_row(vec!["short".into(), "a".into()]);
        t.add_row(vec!["very-long-value".into(), "b".into()]);
        let output = t.render_to_string(false);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        // Column 0 is padded to 15 ("very-long-value"), + 2 spaces gap = col 17.
        let col1_start = "very-long-value".len() + 2;
        for line in &lines {
            if line.len() > col1_start {
                let ch = line.as_bytes()[col1_start];
                assert!(ch != b' ', "column 1 should start at offset {col1_start}: {line:?}");
            }
        }
    }

    #[test]
    fn pipe_mode_no_ansi_or_box_drawing() {
        let mut table = CliTable::new(vec!["ID", "STATUS", "MESSAGE"]);
        table.add_row(vec!["1".into(), "success".into(), "validated".into()]);
        table.add_row(vec!["2".into(), "error".into(), "rejected".into()]);
        let output = table.render_to_string(false);

        assert!(!output.contains("\x1b["), "pipe mode must not contain ANSI escape sequences");
        assert!(!output.contains("\x1b]"), "pipe mode must not contain OSC sequences");
        let box_drawing: Vec<char> = output
            .chars()
            .filter(|c| matches!(*c, '│' | '┌' | '┐' | '└' | '┘' | '├' | '┤' | '┬' | '┴' | '┼'))
            .collect();
        assert!(box_drawing.is_empty(), "pipe mode should not have box-drawing borders");
    }

    #[test]
    fn json_mode_valid_json_structure() {
        #[derive(serde::Serialize)]
        struct TestData {
            id: i64,
            name: String,
            active: bool,
            tags: Vec<String>,
        }

        let data = TestData {
            id: 42,
            name: "employees".to_string(),
            active: true,
            tags: vec!["hr".to_string(), "payroll".to_string()],
        };

        let json = serde_json::to_string_pretty(&data).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).expect("JSON output must be valid JSON");

        assert!(parsed.get("id").is_some());
        assert!(parsed.get("name").is_some());
        assert!(parsed.get("active").is_some());
        assert!(parsed.get("tags").is_some());
        assert!(parsed["id"].is_i64());
        assert!(parsed["name"].is_string());
        assert!(parsed["active"].is_boolean());
        assert!(parsed["tags"].is_array());
    }

    #[test]
    fn unicode_columns_alignment_preserved() {
        let mut table = CliTable::new(vec!["名前", "状態", "説明"]);
        table.add_row(vec!["テーブル".into(), "✓ 完了".into(), "テスト完了しました".into()]);
        table.add_row(vec!["カラム".into(), "⏳ 進行中".into(), "作業中です".into()]);

        let output = table.render_to_string(false);
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3, "header + 2 data rows");

        let lengths: Vec<usize> = lines.iter().map(|l| l.chars().count()).collect();
        let max_len = *lengths.iter().max().unwrap();
        let min_len = *lengths.iter().min().unwrap();
        assert!(max_len - min_len < 20, "line lengths should be reasonably aligned: {lengths:?}");
    }

    #[test]
    fn very_long_values_handled() {
        let long_value = "x".repeat(500);
        let mut table = CliTable::new(vec!["ID", "SQL"]);
        table.add_row(vec!["1".into(), long_value.clone()]);
        table.add_row(vec!["2".into(), "SELECT 1".into()]);

        let output = table.render_to_string(false);
        assert!(!output.is_empty());
        assert!(output.contains(&long_value), "long value should be present in output");

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3, "should have header + 2 rows");
    }

    #[test]
    fn mixed_empty_and_filled_cells() {
        let mut table = CliTable::new(vec!["A", "B", "C"]);
        table.add_row(vec!["1".into(), "".into(), "3".into()]);
        table.add_row(vec!["".into(), "2".into(), "".into()]);
        table.add_row(vec!["x".into(), "y".into(), "z".into()]);

        let output = table.render_to_string(false);
        let lines: Vec<&str> = output.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(lines[1].contains('1'));
        assert!(lines[1].contains('3'));
        assert!(lines[2].contains('2'));
    }

    #[test]
    fn special_characters_in_data() {
        let mut table = CliTable::new(vec!["PATH", "STATUS"]);
        table.add_row(vec!["/path/with spaces/file.txt".into(), "ok".into()]);
        table.add_row(vec!["file\"with'quotes".into(), "ok".into()]);
        table.add_row(vec!["path\\with\\backslashes".into(), "ok".into()]);
        table.add_row(vec!["tab\there".into(), "ok".into()]);

        let output = table.render_to_string(false);
        assert!(output.contains("/path/with spaces/file.txt"));
        assert!(output.contains("file\"with'quotes"));
        assert!(output.contains("path\\with\\backslashes"));
        assert!(output.contains("here"));
    }

    #[test]
    fn json_nested_objects() {
        #[derive(serde::Serialize)]
        struct Nested {
            outer: String,
            inner: Inner,
        }

        #[derive(serde::Serialize)]
        struct Inner {
            value: i32,
            list: Vec<String>,
        }

        let data = Nested {
            outer: "test".to_string(),
            inner: Inner { value: 42, list: vec!["a".to_string(), "b".to_string()] },
        };

        let json = serde_json::to_string_pretty(&data).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["outer"], "test");
        assert_eq!(parsed["inner"]["value"], 42);
        assert_eq!(parsed["inner"]["list"][0], "a");
        assert_eq!(parsed["inner"]["list"][1], "b");
    }
}
