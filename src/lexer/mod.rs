//! LaTeX lexer: raw characters → lexical units.
//!
//! Single forward scan, not restartable. Brace depth is tracked with an
//! explicit stack of open positions rather than call recursion, so nesting
//! depth is limited by memory, not the host stack. Three scanning modes:
//!
//! - **Text**: commands, groups, column separators, paragraph breaks;
//!   comments stripped.
//! - **Math** (`$...$`, `$$...$$`, `\[...\]`, equation-family
//!   environments): braces are balance-checked but commands inside are
//!   passed through as opaque math source.
//! - **Verbatim** (`verbatim`, `lstlisting`, `minted`, `tikzpicture`,
//!   `tikzcd`): byte-exact copy terminated only by the exact matching
//!   `\end{name}` — matched by full name equality, never substring.

mod token;

pub use token::{Token, TokenKind};

use memchr::memchr;

use crate::error::{Error, Result};
use crate::origin::{OriginMap, Span};

/// Environments whose body is copied byte-for-byte.
const VERBATIM_ENVS: &[&str] = &["verbatim", "lstlisting", "minted", "tikzpicture", "tikzcd"];

/// Equation-family environments lexed as opaque display math.
const MATH_ENVS: &[&str] = &["equation", "align", "gather", "multline", "eqnarray"];

fn is_verbatim_env(name: &str) -> bool {
    VERBATIM_ENVS.contains(&name)
}

fn is_math_env(name: &str) -> bool {
    MATH_ENVS.contains(&name.trim_end_matches('*'))
}

/// Tokenize the flattened source stream.
pub fn lex(source: &str, origins: &OriginMap) -> Result<Vec<Token>> {
    Lexer::new(source, origins).run()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    origins: &'a OriginMap,
    tokens: Vec<Token>,
    /// Offsets of `{` still waiting for their `}`.
    open_groups: Vec<usize>,
    /// Pending text run.
    text: String,
    text_start: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str, origins: &'a OriginMap) -> Self {
        Self {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            origins,
            tokens: Vec::new(),
            open_groups: Vec::new(),
            text: String::new(),
            text_start: 0,
        }
    }

    fn run(mut self) -> Result<Vec<Token>> {
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'%' => self.skip_comment(),
                b'\n' => self.newline(),
                b'\\' => self.command()?,
                b'$' => self.dollar_math()?,
                b'{' => {
                    self.flush_text();
                    self.open_groups.push(self.pos);
                    self.push(TokenKind::GroupOpen, self.pos, self.pos + 1);
                    self.pos += 1;
                }
                b'}' => {
                    self.flush_text();
                    if self.open_groups.pop().is_none() {
                        return Err(Error::UnmatchedBrace {
                            origin: self.origins.resolve(self.pos),
                        });
                    }
                    self.push(TokenKind::GroupClose, self.pos, self.pos + 1);
                    self.pos += 1;
                }
                b'&' => {
                    self.flush_text();
                    self.push(TokenKind::ColumnSep, self.pos, self.pos + 1);
                    self.pos += 1;
                }
                b'~' => {
                    self.text_char('\u{a0}');
                    self.pos += 1;
                }
                _ => {
                    let ch = self.src[self.pos..].chars().next().unwrap_or('\0');
                    self.text_char(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
        self.flush_text();
        if let Some(&open) = self.open_groups.first() {
            return Err(Error::UnmatchedBrace {
                origin: self.origins.resolve(open),
            });
        }
        Ok(self.tokens)
    }

    // --- Token emission -----------------------------------------------

    fn push(&mut self, kind: TokenKind, start: usize, end: usize) {
        self.tokens.push(Token::new(kind, Span::new(start, end)));
    }

    fn text_char(&mut self, ch: char) {
        if self.text.is_empty() {
            self.text_start = self.pos;
        }
        self.text.push(ch);
    }

    fn flush_text(&mut self) {
        if self.text.is_empty() {
            return;
        }
        let text = std::mem::take(&mut self.text);
        if text.chars().all(char::is_whitespace) && self.tokens.is_empty() {
            return; // leading whitespace before any content
        }
        self.push(TokenKind::Text(text), self.text_start, self.pos);
    }

    fn par_break(&mut self, start: usize) {
        self.flush_text();
        if !matches!(self.tokens.last().map(|t| &t.kind), Some(TokenKind::ParBreak)) {
            self.push(TokenKind::ParBreak, start, self.pos);
        }
    }

    // --- Scanning helpers ---------------------------------------------

    fn skip_comment(&mut self) {
        // A comment does not break the surrounding text run. The newline is
        // kept so blank-line detection and line numbering stay intact.
        match memchr(b'\n', &self.bytes[self.pos..]) {
            Some(off) => self.pos += off,
            None => self.pos = self.bytes.len(),
        }
    }

    fn newline(&mut self) {
        // Look ahead: a second newline separated only by spaces/tabs is a
        // paragraph break; otherwise the newline is an ordinary space.
        let start = self.pos;
        let mut cursor = self.pos + 1;
        let mut newlines = 1;
        while cursor < self.bytes.len() {
            match self.bytes[cursor] {
                b'\n' => {
                    newlines += 1;
                    cursor += 1;
                }
                b' ' | b'\t' | b'\r' => cursor += 1,
                _ => break,
            }
        }
        if newlines >= 2 {
            self.pos = cursor;
            self.par_break(start);
        } else {
            self.text_char(' ');
            self.pos += 1;
        }
    }

    /// `\` dispatch: commands, escaped characters, `\[` display math, `\\`.
    fn command(&mut self) -> Result<()> {
        let start = self.pos;
        let next = *self.bytes.get(self.pos + 1).unwrap_or(&0);
        if !next.is_ascii_alphabetic() {
            return self.control_symbol(start, next);
        }

        self.flush_text();
        self.pos += 1;
        let name_start = self.pos;
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_alphabetic() {
            self.pos += 1;
        }
        let name = &self.src[name_start..self.pos];
        let starred = self.eat(b'*');

        match name {
            "begin" => self.begin_env(start),
            "end" => {
                let name = self.brace_group(start)?;
                self.push(TokenKind::EndEnv { name }, start, self.pos);
                Ok(())
            }
            "verb" => self.inline_verb(start),
            _ => {
                let name = name.to_string();
                let opt = self.bracket_group()?;
                self.push(TokenKind::Command { name, starred, opt }, start, self.pos);
                Ok(())
            }
        }
    }

    /// Backslash followed by a non-letter.
    fn control_symbol(&mut self, start: usize, next: u8) -> Result<()> {
        match next {
            b'[' => {
                self.flush_text();
                self.pos += 2;
                let body = self.take_until(start, "\\]", "\\[")?;
                self.push(
                    TokenKind::Math {
                        display: true,
                        source: body,
                        env: None,
                    },
                    start,
                    self.pos,
                );
            }
            b'\\' => {
                self.flush_text();
                self.pos += 2;
                let opt = self.bracket_group()?;
                self.push(
                    TokenKind::Command {
                        name: "\\".into(),
                        starred: false,
                        opt,
                    },
                    start,
                    self.pos,
                );
            }
            b'%' | b'&' | b'_' | b'#' | b'$' | b'{' | b'}' => {
                self.text_char(next as char);
                self.pos += 2;
            }
            b',' | b';' | b' ' => {
                self.text_char(' ');
                self.pos += 2;
            }
            0 => {
                // Trailing lone backslash; drop it.
                self.pos += 1;
            }
            _ => {
                // Unknown control symbol (\-, \] outside math, ...): keep
                // the character, drop the backslash. Decoded as a char so
                // multi-byte symbols stay intact.
                let ch = self.src[self.pos + 1..].chars().next().unwrap_or(' ');
                self.text_char(ch);
                self.pos += 1 + ch.len_utf8();
            }
        }
        Ok(())
    }

    fn begin_env(&mut self, start: usize) -> Result<()> {
        let name = self.brace_group(start)?;

        // Equation-family environments take no optional argument; a
        // leading bracket is math content.
        if is_math_env(&name) {
            let (body, _) = self.env_body(start, &name)?;
            self.push(
                TokenKind::Math {
                    display: true,
                    source: body,
                    env: Some(name),
                },
                start,
                self.pos,
            );
            return Ok(());
        }

        let opt = self.bracket_group()?;
        if is_verbatim_env(&name) {
            let lang = if name == "minted" {
                Some(self.brace_group(start)?)
            } else {
                None
            };
            let (body, _) = self.env_body(start, &name)?;
            self.push(
                TokenKind::Verbatim {
                    name,
                    opt,
                    lang,
                    body,
                },
                start,
                self.pos,
            );
            return Ok(());
        }

        self.push(TokenKind::BeginEnv { name, opt }, start, self.pos);
        Ok(())
    }

    /// `\verb<delim>...<delim>`: the delimiter is the first character after
    /// the command name.
    fn inline_verb(&mut self, start: usize) -> Result<()> {
        let Some(delim) = self.src[self.pos..].chars().next() else {
            return Err(Error::UnmatchedEnvironment {
                name: "verb".into(),
                origin: self.origins.resolve(start),
            });
        };
        self.pos += delim.len_utf8();
        let body_start = self.pos;
        match self.src[self.pos..].find(delim) {
            Some(off) => {
                let body = self.src[body_start..body_start + off].to_string();
                self.pos = body_start + off + delim.len_utf8();
                self.push(
                    TokenKind::Verbatim {
                        name: "verb".into(),
                        opt: None,
                        lang: None,
                        body,
                    },
                    start,
                    self.pos,
                );
                Ok(())
            }
            None => Err(Error::UnmatchedEnvironment {
                name: "verb".into(),
                origin: self.origins.resolve(start),
            }),
        }
    }

    fn dollar_math(&mut self) -> Result<()> {
        self.flush_text();
        let start = self.pos;
        let display = self.bytes.get(self.pos + 1) == Some(&b'$');
        self.pos += if display { 2 } else { 1 };

        let body_start = self.pos;
        // Scan for the closing delimiter, skipping escaped dollars.
        loop {
            let Some(off) = memchr(b'$', &self.bytes[self.pos..]) else {
                return Err(Error::UnmatchedEnvironment {
                    name: if display { "$$" } else { "$" }.into(),
                    origin: self.origins.resolve(start),
                });
            };
            let at = self.pos + off;
            if at > 0 && self.bytes[at - 1] == b'\\' {
                self.pos = at + 1;
                continue;
            }
            let source = self.src[body_start..at].to_string();
            if display {
                if self.bytes.get(at + 1) != Some(&b'$') {
                    // Lone '$' inside '$$...$$': keep scanning.
                    self.pos = at + 1;
                    continue;
                }
                self.pos = at + 2;
            } else {
                self.pos = at + 1;
            }
            self.push(
                TokenKind::Math {
                    display,
                    source,
                    env: None,
                },
                start,
                self.pos,
            );
            return Ok(());
        }
    }

    /// Read a `{...}` group with balanced nesting; returns the inner text.
    fn brace_group(&mut self, cmd_start: usize) -> Result<String> {
        self.skip_spaces();
        if self.bytes.get(self.pos) != Some(&b'{') {
            return Err(Error::UnmatchedBrace {
                origin: self.origins.resolve(cmd_start),
            });
        }
        let open = self.pos;
        self.pos += 1;
        let body_start = self.pos;
        let mut depth = 1usize;
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        let body = self.src[body_start..self.pos].to_string();
                        self.pos += 1;
                        return Ok(body);
                    }
                }
                b'\\' => self.pos += 1, // skip escaped char
                _ => {}
            }
            self.pos += 1;
        }
        Err(Error::UnmatchedBrace {
            origin: self.origins.resolve(open),
        })
    }

    /// Read a `[...]` group if one immediately follows (spaces allowed);
    /// braces inside are balance-tracked.
    fn bracket_group(&mut self) -> Result<Option<String>> {
        let save = self.pos;
        self.skip_spaces();
        if self.bytes.get(self.pos) != Some(&b'[') {
            self.pos = save;
            return Ok(None);
        }
        self.pos += 1;
        let body_start = self.pos;
        let mut brace_depth = 0usize;
        while self.pos < self.bytes.len() {
            match self.bytes[self.pos] {
                b'{' => brace_depth += 1,
                b'}' => brace_depth = brace_depth.saturating_sub(1),
                b']' if brace_depth == 0 => {
                    let body = self.src[body_start..self.pos].to_string();
                    self.pos += 1;
                    return Ok(Some(body));
                }
                b'\\' => self.pos += 1,
                _ => {}
            }
            self.pos += 1;
        }
        // Unterminated option: treat the '[' as ordinary text.
        self.pos = save;
        Ok(None)
    }

    /// Capture everything until the exact `\end{name}`, returning the body.
    fn env_body(&mut self, start: usize, name: &str) -> Result<(String, usize)> {
        let needle_head = "\\end{";
        let body_start = self.pos;
        let mut cursor = self.pos;
        while let Some(off) = memchr(b'\\', &self.bytes[cursor..]) {
            let at = cursor + off;
            let rest = &self.src[at..];
            if let Some(tail) = rest.strip_prefix(needle_head) {
                if let Some(after) = tail.strip_prefix(name) {
                    if after.starts_with('}') {
                        let body = self.src[body_start..at].to_string();
                        self.pos = at + needle_head.len() + name.len() + 1;
                        return Ok((body, at));
                    }
                }
            }
            cursor = at + 1;
        }
        Err(Error::UnmatchedEnvironment {
            name: name.to_string(),
            origin: self.origins.resolve(start),
        })
    }

    /// Scan for `close`, failing with an unmatched-environment error that
    /// names `what` if the stream ends first.
    fn take_until(&mut self, start: usize, close: &str, what: &str) -> Result<String> {
        let body_start = self.pos;
        let first = close.as_bytes()[0];
        let mut cursor = self.pos;
        while let Some(off) = memchr(first, &self.bytes[cursor..]) {
            let at = cursor + off;
            if self.src[at..].starts_with(close) {
                let body = self.src[body_start..at].to_string();
                self.pos = at + close.len();
                return Ok(body);
            }
            cursor = at + 1;
        }
        Err(Error::UnmatchedEnvironment {
            name: what.to_string(),
            origin: self.origins.resolve(start),
        })
    }

    fn skip_spaces(&mut self) {
        while matches!(self.bytes.get(self.pos), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, byte: u8) -> bool {
        if self.bytes.get(self.pos) == Some(&byte) {
            self.pos += 1;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::OriginMap;

    fn lex_str(src: &str) -> Vec<Token> {
        lex(src, &OriginMap::new()).expect("lex should succeed")
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        lex_str(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn commands_capture_star_and_options() {
        let toks = kinds("\\section*{Title}");
        assert_eq!(
            toks[0],
            TokenKind::Command {
                name: "section".into(),
                starred: true,
                opt: None
            }
        );
        assert_eq!(toks[1], TokenKind::GroupOpen);
        assert_eq!(toks[2], TokenKind::Text("Title".into()));
        assert_eq!(toks[3], TokenKind::GroupClose);
    }

    #[test]
    fn comments_are_stripped() {
        let toks = kinds("before % comment with \\section{junk}\nafter");
        assert_eq!(
            toks,
            vec![TokenKind::Text("before  after".into())],
        );
    }

    #[test]
    fn escaped_percent_is_literal() {
        let toks = kinds("50\\% done");
        assert_eq!(toks, vec![TokenKind::Text("50% done".into())]);
    }

    #[test]
    fn inline_and_display_math() {
        let toks = kinds("a $x^2$ b $$y_i$$ c \\[z\\]");
        let math: Vec<_> = toks
            .iter()
            .filter_map(|t| match t {
                TokenKind::Math {
                    display, source, ..
                } => Some((*display, source.clone())),
                _ => None,
            })
            .collect();
        assert_eq!(
            math,
            vec![
                (false, "x^2".into()),
                (true, "y_i".into()),
                (true, "z".into())
            ]
        );
    }

    #[test]
    fn math_environment_is_opaque() {
        let toks = kinds("\\begin{align}x &= y \\\\ z &= w\\end{align}");
        assert_eq!(toks.len(), 1);
        match &toks[0] {
            TokenKind::Math {
                display,
                source,
                env,
            } => {
                assert!(display);
                assert_eq!(env.as_deref(), Some("align"));
                // The & and \\ inside stay in the opaque source.
                assert!(source.contains("&= y"));
            }
            other => panic!("expected math token, got {other:?}"),
        }
    }

    #[test]
    fn equation_environments_keep_leading_brackets() {
        // equation/align take no optional argument: a bracket right after
        // \begin{equation} is part of the math.
        let toks = kinds("\\begin{equation}[a,b] = c\\end{equation}");
        assert_eq!(toks.len(), 1);
        match &toks[0] {
            TokenKind::Math { source, .. } => assert_eq!(source, "[a,b] = c"),
            other => panic!("expected math token, got {other:?}"),
        }
    }

    #[test]
    fn verbatim_is_byte_exact_and_name_matched() {
        // \end{verbatim}-looking text inside an lstlisting must not
        // terminate it: the match is by exact name.
        let src = "\\begin{lstlisting}[language=Rust]\nlet x = \"\\end{verbatim}\";\n\\end{lstlisting}";
        let toks = kinds(src);
        assert_eq!(toks.len(), 1);
        match &toks[0] {
            TokenKind::Verbatim {
                name, opt, body, ..
            } => {
                assert_eq!(name, "lstlisting");
                assert_eq!(opt.as_deref(), Some("language=Rust"));
                assert!(body.contains("\\end{verbatim}"));
            }
            other => panic!("expected verbatim token, got {other:?}"),
        }
    }

    #[test]
    fn paragraph_breaks_collapse() {
        let toks = kinds("one\n\n\n\ntwo");
        assert_eq!(
            toks,
            vec![
                TokenKind::Text("one".into()),
                TokenKind::ParBreak,
                TokenKind::Text("two".into()),
            ]
        );
    }

    #[test]
    fn unmatched_open_brace_is_fatal() {
        let err = lex("\\textbf{oops", &OriginMap::new()).unwrap_err();
        assert!(matches!(err, Error::UnmatchedBrace { .. }));
    }

    #[test]
    fn unterminated_math_is_fatal() {
        let err = lex("$x + y", &OriginMap::new()).unwrap_err();
        assert!(matches!(err, Error::UnmatchedEnvironment { .. }));
    }

    #[test]
    fn column_separator_and_row_break() {
        let toks = kinds("a & b \\\\ c & d");
        assert!(toks.iter().any(|t| *t == TokenKind::ColumnSep));
        assert!(toks.iter().any(|t| t.is_row_break()));
    }
}
