//! BibTeX database parsing.
//!
//! A tolerant single-pass scanner over `.bib` text: entries are located by
//! `@`, bodies are brace-balanced, and anything between entries is ignored
//! (BibTeX treats it as commentary). Unknown entry types parse fine; the
//! type is just a string. Duplicate keys warn and the last definition
//! wins, matching how BibTeX implementations behave in practice.

use std::path::PathBuf;

use memchr::memchr;

use crate::diag::{DiagKind, Diagnostics};
use crate::error::Result;
use crate::ir::{BibEntry, CitationRegistry};
use crate::origin::Origin;

/// Parse every database in `paths` into one registry. Files are read in
/// order, so later databases can override earlier keys (with a warning).
pub fn parse_files(paths: &[PathBuf], diags: &mut Diagnostics) -> Result<CitationRegistry> {
    let mut registry = CitationRegistry::new();
    for path in paths {
        if !path.is_file() {
            diags.warn(
                DiagKind::MissingInclude,
                Origin::unknown(),
                format!("bibliography '{}' not found", path.display()),
            );
            continue;
        }
        let text = std::fs::read_to_string(path)?;
        parse_str(&text, &path.display().to_string(), &mut registry, diags);
    }
    tracing::debug!(entries = registry.len(), "bibliography loaded");
    Ok(registry)
}

/// Parse one database's text into `registry`.
pub fn parse_str(
    text: &str,
    source_name: &str,
    registry: &mut CitationRegistry,
    diags: &mut Diagnostics,
) {
    let mut scanner = Scanner {
        src: text,
        bytes: text.as_bytes(),
        pos: 0,
    };
    while let Some(entry) = scanner.next_entry() {
        if registry.insert(entry.clone()).is_some() {
            diags.warn(
                DiagKind::DuplicateCitationKey,
                Origin {
                    file: source_name.into(),
                    line: scanner.line_of(scanner.pos),
                    column: 1,
                },
                format!("citation key '{}' redefined; keeping the later entry", entry.key),
            );
        }
    }
}

struct Scanner<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl Scanner<'_> {
    fn next_entry(&mut self) -> Option<BibEntry> {
        loop {
            let off = memchr(b'@', &self.bytes[self.pos..])?;
            let start = self.pos + off;
            self.pos = start + 1;

            let entry_type = self.ident().to_ascii_lowercase();
            if entry_type.is_empty() {
                continue;
            }
            self.skip_ws();
            let open = *self.bytes.get(self.pos)?;
            if open != b'{' && open != b'(' {
                continue;
            }
            let close = if open == b'{' { b'}' } else { b')' };
            self.pos += 1;

            // Non-reference entry kinds have no citation key.
            if matches!(entry_type.as_str(), "comment" | "preamble" | "string") {
                self.skip_balanced(close);
                continue;
            }

            self.skip_ws();
            let key = self.until(&[b',', close]).trim().to_string();
            if key.is_empty() {
                self.skip_balanced(close);
                continue;
            }
            let mut fields = std::collections::HashMap::new();
            while self.peek() == Some(b',') {
                self.pos += 1;
                self.skip_ws();
                if self.peek() == Some(close) {
                    break;
                }
                let name = self.ident().to_ascii_lowercase();
                self.skip_ws();
                if self.peek() != Some(b'=') {
                    break;
                }
                self.pos += 1;
                let value = self.field_value(close);
                if !name.is_empty() {
                    fields.insert(name, value);
                }
                self.skip_ws();
            }
            if self.peek() == Some(close) {
                self.pos += 1;
            }
            let raw = self.src[start..self.pos].to_string();
            return Some(BibEntry {
                entry_type,
                key,
                fields,
                raw,
            });
        }
    }

    /// A field value: braced, quoted, or bare, possibly `#`-concatenated.
    fn field_value(&mut self, entry_close: u8) -> String {
        let mut out = String::new();
        loop {
            self.skip_ws();
            match self.peek() {
                Some(b'{') => {
                    self.pos += 1;
                    let inner = self.balanced_body();
                    out.push_str(&inner);
                }
                Some(b'"') => {
                    self.pos += 1;
                    let start = self.pos;
                    while self.pos < self.bytes.len() && self.bytes[self.pos] != b'"' {
                        if self.bytes[self.pos] == b'\\' {
                            self.pos += 1;
                        }
                        self.pos += 1;
                    }
                    out.push_str(&self.src[start..self.pos.min(self.src.len())]);
                    self.pos += 1;
                }
                _ => {
                    // Bare word or number.
                    let start = self.pos;
                    while self.pos < self.bytes.len() {
                        let b = self.bytes[self.pos];
                        if b == b',' || b == b'#' || b == entry_close || b.is_ascii_whitespace() {
                            break;
                        }
                        self.pos += 1;
                    }
                    out.push_str(&self.src[start..self.pos]);
                }
            }
            self.skip_ws();
            if self.peek() == Some(b'#') {
                self.pos += 1;
                continue;
            }
            break;
        }
        normalize_value(&out)
    }

    /// Body of a `{...}` group whose `{` was already consumed; leaves the
    /// cursor past the matching `}`. Inner braces are kept.
    fn balanced_body(&mut self) -> String {
        let start = self.pos;
        let mut depth = 1usize;
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        let body = self.src[start..self.pos].to_string();
                        self.pos += 1;
                        return body;
                    }
                }
                b'\\' => self.pos += 1,
                _ => {}
            }
            self.pos += 1;
        }
        self.src[start..].to_string()
    }

    /// Skip a balanced body terminated by `close` at depth zero.
    fn skip_balanced(&mut self, close: u8) {
        let mut depth = 1usize;
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            self.pos += 1;
            if b == b'{' && close == b'}' {
                depth += 1;
            } else if b == close {
                depth -= 1;
                if depth == 0 {
                    return;
                }
            }
        }
    }

    fn ident(&mut self) -> &str {
        self.skip_ws();
        let start = self.pos;
        while self.pos < self.bytes.len() {
            let b = self.bytes[self.pos];
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'-' {
                self.pos += 1;
            } else {
                break;
            }
        }
        &self.src[start..self.pos]
    }

    fn until(&mut self, stops: &[u8]) -> &str {
        let start = self.pos;
        while self.pos < self.bytes.len() && !stops.contains(&self.bytes[self.pos]) {
            self.pos += 1;
        }
        &self.src[start..self.pos]
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self
            .bytes
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    /// 1-based line of a byte offset, for duplicate-key warnings.
    fn line_of(&self, offset: usize) -> u32 {
        let upto = offset.min(self.bytes.len());
        (memchr::memchr_iter(b'\n', &self.bytes[..upto]).count() + 1) as u32
    }
}

/// Collapse runs of whitespace; multiline values become single-line.
fn normalize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut last_was_space = false;
    for ch in value.trim().chars() {
        if ch.is_whitespace() {
            if !last_was_space {
                out.push(' ');
            }
            last_was_space = true;
        } else {
            out.push(ch);
            last_was_space = false;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(text: &str) -> (CitationRegistry, Diagnostics) {
        let mut registry = CitationRegistry::new();
        let mut diags = Diagnostics::new();
        parse_str(text, "test.bib", &mut registry, &mut diags);
        (registry, diags)
    }

    #[test]
    fn parses_common_entry_shapes() {
        let (reg, diags) = parse_one(
            r#"
            Some stray commentary between entries.

            @article{knuth84,
              author  = {Donald E. Knuth},
              title   = {Literate Programming},
              journal = "The Computer Journal",
              year    = 1984,
            }

            @book(taocp,
              author = {Knuth, Donald E.},
              title  = {The Art of Computer Programming},
              year   = {1968}
            )
            "#,
        );
        assert!(diags.is_empty());
        assert_eq!(reg.len(), 2);

        let article = reg.get("knuth84").unwrap();
        assert_eq!(article.entry_type, "article");
        assert_eq!(article.author(), Some("Donald E. Knuth"));
        assert_eq!(article.venue(), Some("The Computer Journal"));
        assert_eq!(article.year(), Some("1984"));

        let book = reg.get("taocp").unwrap();
        assert_eq!(book.entry_type, "book");
        assert_eq!(book.year(), Some("1968"));
        assert_eq!(reg.position("knuth84"), Some(0));
        assert_eq!(reg.position("taocp"), Some(1));
    }

    #[test]
    fn nested_braces_stay_in_values() {
        let (reg, _) = parse_one(
            "@article{a, title = {The {BIG} Result on {F}ields} }",
        );
        assert_eq!(
            reg.get("a").unwrap().title(),
            Some("The {BIG} Result on {F}ields")
        );
    }

    #[test]
    fn multiline_values_collapse_whitespace() {
        let (reg, _) = parse_one(
            "@misc{m, note = {spread\n      over\n      lines} }",
        );
        assert_eq!(reg.get("m").unwrap().field("note"), Some("spread over lines"));
    }

    #[test]
    fn duplicate_key_warns_and_last_wins() {
        let (reg, diags) = parse_one(
            "@book{dup, year = {1990}}\n@article{dup, year = {2001}}",
        );
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("dup").unwrap().year(), Some("2001"));
        assert_eq!(reg.get("dup").unwrap().entry_type, "article");
        assert_eq!(diags.count(DiagKind::DuplicateCitationKey), 1);
    }

    #[test]
    fn comment_and_string_blocks_are_skipped() {
        let (reg, diags) = parse_one(
            "@comment{ not an entry }\n@string{jcj = {J. Comp.}}\n@misc{real, year = 2000}",
        );
        assert!(diags.is_empty());
        assert_eq!(reg.len(), 1);
        assert!(reg.get("real").is_some());
    }

    #[test]
    fn unknown_entry_types_parse() {
        let (reg, _) = parse_one("@software{tool, title = {texweave}}");
        assert_eq!(reg.get("tool").unwrap().entry_type, "software");
    }

    #[test]
    fn concatenated_values_join() {
        let (reg, _) = parse_one("@misc{c, note = {part } # \"one\"}");
        assert_eq!(reg.get("c").unwrap().field("note"), Some("part one"));
    }

    #[test]
    fn missing_file_warns() {
        let mut diags = Diagnostics::new();
        let reg = parse_files(&[PathBuf::from("/no/such/file.bib")], &mut diags).unwrap();
        assert!(reg.is_empty());
        assert_eq!(diags.count(DiagKind::MissingInclude), 1);
    }
}
