//! Lexical units produced by the scanner.

use crate::origin::Span;

/// A token with its byte range in the flattened source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Token variants.
///
/// Command and environment tokens carry their optional `[...]` argument as
/// a raw captured string; braced arguments are not consumed here, they flow
/// through as `GroupOpen`/`GroupClose` and are assembled by the parser.
/// Math and verbatim regions are captured whole because their interiors are
/// opaque to the structural grammar.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// `\name` or `\name*`, with a captured `[...]` option if present.
    Command {
        name: String,
        starred: bool,
        opt: Option<String>,
    },
    /// `\begin{name}` with a captured `[...]` option if present.
    BeginEnv { name: String, opt: Option<String> },
    /// `\end{name}`.
    EndEnv { name: String },
    /// `{`
    GroupOpen,
    /// `}`
    GroupClose,
    /// Opaque math span. `env` is the source environment name for the
    /// equation family (`equation`, `align`, ...), None for `$`/`$$`/`\[`.
    Math {
        display: bool,
        source: String,
        env: Option<String>,
    },
    /// Byte-exact region from a verbatim-class environment
    /// (`verbatim`, `lstlisting`, `minted`, `tikzpicture`, `tikzcd`)
    /// or inline `\verb|...|` (name = "verb").
    Verbatim {
        name: String,
        opt: Option<String>,
        /// Language group for `minted`.
        lang: Option<String>,
        body: String,
    },
    /// Run of ordinary characters.
    Text(String),
    /// Blank line: paragraph boundary.
    ParBreak,
    /// Unescaped `&` (table cell separator).
    ColumnSep,
}

impl TokenKind {
    /// True for `\\` (row separator / forced line break).
    pub fn is_row_break(&self) -> bool {
        matches!(self, TokenKind::Command { name, .. } if name == "\\")
    }
}
