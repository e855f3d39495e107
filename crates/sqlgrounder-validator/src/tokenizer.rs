//! Tokenizer state machine.
//!
//! States: `NORMAL`, `SINGLE_QUOTE` (`''` escape), `DOUBLE_QUOTE` (`""`
//! escape), `DOLLAR_QUOTE` (`$tag$…$tag$`, tag may be empty), `LINE_COMMENT`
//! (`--` to newline), `BLOCK_COMMENT` (`/* … */`, non-nesting). Only
//! `NORMAL`-region text is inspected by the keyword/function/statement rules;
//! every other state's content is skipped over (or, for `DOUBLE_QUOTE`,
//! surfaced as a quoted identifier for the table-allowlist rule only).
//!
//! The scan is a single linear pass over `chars`, so tokenization is O(n) in
//! input length for any input — including a string with an unbalanced quote,
//! which simply rides out the rest of the input in that quote's state rather
//! than looping.

/// Which tokenizer state produced a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenOrigin {
    Normal,
    SingleQuote,
    DoubleQuote,
    DollarQuote,
    LineComment,
    BlockComment,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// An identifier or keyword (ASCII alnum/underscore run starting with a
    /// letter or underscore), original case preserved.
    Word(String),
    /// A numeric literal.
    Number(String),
    Semicolon,
    LParen,
    RParen,
    Comma,
    Dot,
    Star,
    /// Any other single punctuation character in a NORMAL region.
    Punct(char),
    /// The unescaped content of a `"..."` quoted identifier.
    QuotedIdent(String),
    /// A `'...'` or `$tag$...$tag$` string literal (content discarded; only
    /// its presence/position matters to the rules).
    StringLiteral,
    /// A `--` or `/* */` comment (content discarded).
    Comment,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub origin: TokenOrigin,
    pub start: usize,
    pub end: usize,
}

impl Token {
    #[must_use]
    pub const fn is_normal(&self) -> bool {
        matches!(self.origin, TokenOrigin::Normal)
    }

    /// Case-insensitive whole-token match against a NORMAL-region word.
    #[must_use]
    pub fn is_word_ci(&self, expected: &str) -> bool {
        self.is_normal()
            && matches!(&self.kind, TokenKind::Word(w) if w.eq_ignore_ascii_case(expected))
    }
}

/// A contiguous byte range of the input that was scanned in the `NORMAL`
/// state. Exposed for the tokenizer-transparency property test: any byte
/// inside a non-normal span is invisible to the keyword/function scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalSpan {
    pub start: usize,
    pub end: usize,
}

fn is_word_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_word_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Attempt to read a dollar-quote opening tag starting at `chars[start]`
/// (which must be `$`). Returns `(tag, index_after_opening_delimiter)` on
/// success. A tag may be empty (`$$`) but, per Postgres identifier rules,
/// cannot start with a digit — this is what disambiguates a dollar-quote
/// delimiter from a `$1`-style bind parameter.
fn try_dollar_quote_open(chars: &[char], start: usize) -> Option<(String, usize)> {
    debug_assert_eq!(chars[start], '$');
    let mut j = start + 1;
    let mut tag = String::new();
    while j < chars.len() && (chars[j].is_ascii_alphanumeric() || chars[j] == '_') {
        if tag.is_empty() && chars[j].is_ascii_digit() {
            return None;
        }
        tag.push(chars[j]);
        j += 1;
    }
    if j < chars.len() && chars[j] == '$' {
        Some((tag, j + 1))
    } else {
        None
    }
}

/// Find the closing `$tag$` for a dollar-quoted body starting at `start`.
/// Returns the index just past the closing delimiter, or `chars.len()` if
/// unterminated (rides out to end of input).
fn find_dollar_quote_close(chars: &[char], start: usize, tag: &str) -> usize {
    let tag_chars: Vec<char> = tag.chars().collect();
    let delim_len = tag_chars.len() + 2;
    let mut i = start;
    while i + delim_len <= chars.len() {
        if chars[i] == '$' && chars[i + 1..i + 1 + tag_chars.len()] == tag_chars[..] && chars[i + 1 + tag_chars.len()] == '$'
        {
            return i + delim_len;
        }
        i += 1;
    }
    chars.len()
}

/// Tokenize `sql`, running the full state machine over it.
///
/// # Panics
/// Never panics; malformed/unterminated quotes and comments simply consume
/// the remainder of the input in that state.
#[must_use]
pub fn tokenize(sql: &str) -> Vec<Token> {
    let chars: Vec<char> = sql.chars().collect();
    let byte_offsets = char_byte_offsets(sql, &chars);
    let n = chars.len();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < n {
        let c = chars[i];

        // -- comment / quote openers (checked before generic punctuation) --
        if c == '-' && i + 1 < n && chars[i + 1] == '-' {
            let start = i;
            let mut j = i + 2;
            while j < n && chars[j] != '\n' {
                j += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Comment,
                origin: TokenOrigin::LineComment,
                start: byte_offsets[start],
                end: byte_offsets[j.min(n)],
            });
            i = j;
            continue;
        }

        if c == '/' && i + 1 < n && chars[i + 1] == '*' {
            let start = i;
            let mut j = i + 2;
            while j + 1 < n && !(chars[j] == '*' && chars[j + 1] == '/') {
                j += 1;
            }
            let end = if j + 1 < n { j + 2 } else { n };
            tokens.push(Token {
                kind: TokenKind::Comment,
                origin: TokenOrigin::BlockComment,
                start: byte_offsets[start],
                end: byte_offsets[end.min(n)],
            });
            i = end;
            continue;
        }

        if c == '\'' {
            let start = i;
            let mut j = i + 1;
            loop {
                if j >= n {
                    break;
                }
                if chars[j] == '\'' {
                    if j + 1 < n && chars[j + 1] == '\'' {
                        j += 2;
                        continue;
                    }
                    j += 1;
                    break;
                }
                j += 1;
            }
            tokens.push(Token {
                kind: TokenKind::StringLiteral,
                origin: TokenOrigin::SingleQuote,
                start: byte_offsets[start],
                end: byte_offsets[j.min(n)],
            });
            i = j;
            continue;
        }

        if c == '"' {
            let start = i;
            let mut j = i + 1;
            let mut content = String::new();
            loop {
                if j >= n {
                    break;
                }
                if chars[j] == '"' {
                    if j + 1 < n && chars[j + 1] == '"' {
                        content.push('"');
                        j += 2;
                        continue;
                    }
                    j += 1;
                    break;
                }
                content.push(chars[j]);
                j += 1;
            }
            tokens.push(Token {
                kind: TokenKind::QuotedIdent(content),
                origin: TokenOrigin::DoubleQuote,
                start: byte_offsets[start],
                end: byte_offsets[j.min(n)],
            });
            i = j;
            continue;
        }

        if c == '$' {
            if let Some((tag, after_open)) = try_dollar_quote_open(&chars, i) {
                let close = find_dollar_quote_close(&chars, after_open, &tag);
                tokens.push(Token {
                    kind: TokenKind::StringLiteral,
                    origin: TokenOrigin::DollarQuote,
                    start: byte_offsets[i],
                    end: byte_offsets[close.min(n)],
                });
                i = close;
                continue;
            }
            // Not a dollar-quote delimiter (e.g. a `$1` bind parameter) —
            // emit as ordinary NORMAL punctuation and let the digits that
            // follow tokenize as a Number.
            tokens.push(Token {
                kind: TokenKind::Punct('$'),
                origin: TokenOrigin::Normal,
                start: byte_offsets[i],
                end: byte_offsets[i + 1],
            });
            i += 1;
            continue;
        }

        // -- NORMAL-region tokens --
        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if is_word_start(c) {
            let start = i;
            let mut j = i + 1;
            while j < n && is_word_continue(chars[j]) {
                j += 1;
            }
            let word: String = chars[start..j].iter().collect();
            tokens.push(Token {
                kind: TokenKind::Word(word),
                origin: TokenOrigin::Normal,
                start: byte_offsets[start],
                end: byte_offsets[j],
            });
            i = j;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            let mut j = i + 1;
            while j < n && (chars[j].is_ascii_digit() || chars[j] == '.') {
                j += 1;
            }
            let num: String = chars[start..j].iter().collect();
            tokens.push(Token {
                kind: TokenKind::Number(num),
                origin: TokenOrigin::Normal,
                start: byte_offsets[start],
                end: byte_offsets[j],
            });
            i = j;
            continue;
        }

        let kind = match c {
            ';' => TokenKind::Semicolon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            ',' => TokenKind::Comma,
            '.' => TokenKind::Dot,
            '*' => TokenKind::Star,
            other => TokenKind::Punct(other),
        };
        tokens.push(Token {
            kind,
            origin: TokenOrigin::Normal,
            start: byte_offsets[i],
            end: byte_offsets[i + 1],
        });
        i += 1;
    }

    tokens
}

/// Byte offsets, one past `chars`, so `byte_offsets[i]` is the start byte of
/// `chars[i]` and `byte_offsets[chars.len()]` is `sql.len()`.
fn char_byte_offsets(sql: &str, chars: &[char]) -> Vec<usize> {
    let mut offsets = Vec::with_capacity(chars.len() + 1);
    let mut iter = sql.char_indices();
    for _ in chars {
        let (byte, _) = iter.next().expect("chars/char_indices length mismatch");
        offsets.push(byte);
    }
    offsets.push(sql.len());
    offsets
}

/// The byte ranges of `sql` that were scanned in the `NORMAL` state,
/// coalesced into contiguous spans.
#[must_use]
pub fn normal_spans(sql: &str, tokens: &[Token]) -> Vec<NormalSpan> {
    let mut spans: Vec<NormalSpan> = Vec::new();
    for t in tokens.iter().filter(|t| t.is_normal()) {
        if let Some(last) = spans.last_mut() {
            if last.end == t.start {
                last.end = t.end;
                continue;
            }
        }
        spans.push(NormalSpan {
            start: t.start,
            end: t.end,
        });
    }
    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(tokens: &[Token]) -> Vec<String> {
        tokens
            .iter()
            .filter_map(|t| match &t.kind {
                TokenKind::Word(w) if t.is_normal() => Some(w.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn single_quote_escape_is_one_token() {
        let tokens = tokenize("SELECT 'it''s fine' FROM t");
        let literal_count = tokens
            .iter()
            .filter(|t| t.origin == TokenOrigin::SingleQuote)
            .count();
        assert_eq!(literal_count, 1);
    }

    #[test]
    fn dollar_quote_with_tag_is_skipped() {
        let tokens = tokenize("SELECT $tag$DROP anything$tag$ FROM t");
        assert!(!words(&tokens).iter().any(|w| w.eq_ignore_ascii_case("drop")));
    }

    #[test]
    fn bind_parameter_is_not_mistaken_for_dollar_quote() {
        let tokens = tokenize("SELECT * FROM t WHERE id = $1");
        assert!(tokens.iter().any(|t| matches!(&t.kind, TokenKind::Number(n) if n == "1")));
    }

    #[test]
    fn line_comment_hides_dangerous_word() {
        let tokens = tokenize("SELECT 1 -- DROP TABLE t\nFROM t");
        assert!(!words(&tokens).iter().any(|w| w.eq_ignore_ascii_case("drop")));
    }

    #[test]
    fn block_comment_hides_dangerous_word() {
        let tokens = tokenize("SELECT 1 /* DROP TABLE t */ FROM t");
        assert!(!words(&tokens).iter().any(|w| w.eq_ignore_ascii_case("drop")));
    }

    #[test]
    fn double_quoted_identifier_is_visible_as_quoted_ident_not_word() {
        let tokens = tokenize("SELECT * FROM \"DROP\"");
        assert!(tokens
            .iter()
            .any(|t| matches!(&t.kind, TokenKind::QuotedIdent(s) if s == "DROP")));
        assert!(!words(&tokens).iter().any(|w| w.eq_ignore_ascii_case("drop")));
    }

    #[test]
    fn unterminated_quote_rides_to_end_without_looping() {
        let tokens = tokenize("SELECT 'never closes");
        assert!(tokens.iter().any(|t| t.origin == TokenOrigin::SingleQuote));
    }

    #[test]
    fn normal_spans_coalesce_adjacent_tokens() {
        let tokens = tokenize("SELECT 1");
        let spans = normal_spans("SELECT 1", &tokens);
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].start, 0);
        assert_eq!(spans[0].end, "SELECT 1".len());
    }
}
