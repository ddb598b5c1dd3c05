//! Structural parser: token stream → document tree.
//!
//! A single forward pass over the tokens with an explicit stack of open
//! scopes (document, sections, environments, list items, paragraphs,
//! groups, table rows and cells). Sectioning commands close every open
//! scope at their level or deeper before opening a new heading; `\end`
//! must name the innermost open environment exactly. Inline content opens
//! a paragraph on demand, and paragraph scopes close implicitly at any
//! block boundary.
//!
//! Environment behavior is dispatched through the configuration table:
//! the parser never branches on concrete theorem names, only on the
//! [`EnvKind`] the table maps them to. Unknown environments parse fine
//! and carry [`EnvKind::Unknown`].

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ir::{
    DocumentTree, EnvKind, InlineKind, LabelDecl, NodeId, NodeKind, RefKind, SectionLevel,
};
use crate::lexer::{Token, TokenKind};
use crate::origin::{OriginMap, Span};

/// Open-scope bound. Real documents nest a handful of levels; anything
/// past this is runaway input.
pub const MAX_NESTING: usize = 64;

/// Table-shaped environments.
const TABULAR_ENVS: &[&str] = &["tabular", "array", "longtable", "tabularx"];

/// Commands that take one braced argument the output has no use for.
const SKIP_WITH_ARG: &[&str] = &["vspace", "hspace", "phantom", "hphantom", "vphantom"];

/// Commands with no arguments that contribute nothing to the tree.
const IGNORED: &[&str] = &[
    "centering",
    "noindent",
    "indent",
    "clearpage",
    "cleardoublepage",
    "newpage",
    "pagebreak",
    "linebreak",
    "bigskip",
    "medskip",
    "smallskip",
    "hfill",
    "vfill",
    "tableofcontents",
    "listoffigures",
    "listoftables",
    "printbibliography",
    "maketitle",
    "frontmatter",
    "mainmatter",
    "backmatter",
    "appendix",
    "hline",
    "toprule",
    "midrule",
    "bottomrule",
    "par",
];

/// Parse a token stream into a document tree. Headings are accepted at
/// any level, as in article-class documents and fragments.
pub fn parse(tokens: &[Token], config: &Config, origins: &OriginMap) -> Result<DocumentTree> {
    parse_with_class(tokens, config, origins, "")
}

/// Parse with document-class strictness. Under the book class a
/// `\section` or `\subsection` with no coarser heading open is fatal;
/// other classes tolerate headings at any level.
pub fn parse_with_class(
    tokens: &[Token],
    config: &Config,
    origins: &OriginMap,
    docclass: &str,
) -> Result<DocumentTree> {
    Parser {
        tokens,
        pos: 0,
        tree: DocumentTree::new(),
        open: vec![Scope {
            node: NodeId::ROOT,
            closer: Closer::Document,
        }],
        config,
        origins,
        strict_levels: docclass == "book",
    }
    .run()
}

/// What pops an open scope.
#[derive(Debug, Clone, PartialEq)]
enum Closer {
    Document,
    Section(SectionLevel),
    Env(String),
    Item,
    Para,
    /// `{...}`. `owned` groups pop together with the node they opened
    /// (inline formatting); bare groups are transparent.
    Group { owned: bool },
    Row,
    Cell,
}

#[derive(Debug)]
struct Scope {
    /// Insertion parent while this scope is on top.
    node: NodeId,
    closer: Closer,
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    tree: DocumentTree,
    open: Vec<Scope>,
    config: &'a Config,
    origins: &'a OriginMap,
    strict_levels: bool,
}

impl Parser<'_> {
    fn run(mut self) -> Result<DocumentTree> {
        while self.pos < self.tokens.len() {
            let token = &self.tokens[self.pos];
            self.pos += 1;
            let span = token.span;
            match &token.kind {
                TokenKind::Text(text) => self.text(text, span)?,
                TokenKind::ParBreak => self.close_paras(),
                TokenKind::Command { name, starred, opt } => {
                    self.command(name, *starred, opt.as_deref(), span)?
                }
                TokenKind::BeginEnv { name, opt } => {
                    self.begin_env(name.clone(), opt.clone(), span)?
                }
                TokenKind::EndEnv { name } => self.end_env(name, span)?,
                TokenKind::GroupOpen => self.push_scope(
                    Scope {
                        node: self.cur(),
                        closer: Closer::Group { owned: false },
                    },
                    span,
                )?,
                TokenKind::GroupClose => self.group_close(),
                TokenKind::Math {
                    display,
                    source,
                    env,
                } => self.math(*display, source, env.as_deref(), span)?,
                TokenKind::Verbatim {
                    name,
                    opt,
                    lang,
                    body,
                } => self.verbatim(name, opt.as_deref(), lang.as_deref(), body, span)?,
                TokenKind::ColumnSep => self.column_sep(span)?,
            }
        }
        // Unclosed environments are fatal; sections close implicitly.
        for scope in &self.open {
            if let Closer::Env(name) = &scope.closer {
                return Err(Error::UnmatchedEnvironment {
                    name: name.clone(),
                    origin: self.origins.resolve_span(self.tree.node(scope.node).span),
                });
            }
        }
        Ok(self.tree)
    }

    // --- Scope management ----------------------------------------------

    fn cur(&self) -> NodeId {
        self.open.last().map(|s| s.node).unwrap_or(NodeId::ROOT)
    }

    fn push_scope(&mut self, scope: Scope, span: Span) -> Result<()> {
        if self.open.len() >= MAX_NESTING {
            return Err(Error::NestingTooDeep {
                max: MAX_NESTING,
                origin: self.origins.resolve_span(span),
            });
        }
        self.open.push(scope);
        Ok(())
    }

    fn close_paras(&mut self) {
        while matches!(self.open.last().map(|s| &s.closer), Some(Closer::Para)) {
            self.open.pop();
        }
    }

    /// Insertion parent for inline content, opening paragraphs and table
    /// cells on demand.
    fn inline_parent(&mut self, span: Span) -> Result<NodeId> {
        loop {
            let cur = self.cur();
            match &self.tree.node(cur).kind {
                NodeKind::Table { .. } => {
                    let row = self.tree.append(cur, NodeKind::TableRow, span);
                    self.push_scope(
                        Scope {
                            node: row,
                            closer: Closer::Row,
                        },
                        span,
                    )?;
                    let cell = self.tree.append(row, NodeKind::TableCell, span);
                    self.push_scope(
                        Scope {
                            node: cell,
                            closer: Closer::Cell,
                        },
                        span,
                    )?;
                }
                NodeKind::TableRow => {
                    let cell = self.tree.append(cur, NodeKind::TableCell, span);
                    self.push_scope(
                        Scope {
                            node: cell,
                            closer: Closer::Cell,
                        },
                        span,
                    )?;
                }
                NodeKind::Root
                | NodeKind::Heading { .. }
                | NodeKind::Environment { .. }
                | NodeKind::ListItem => {
                    let para = self.tree.append(cur, NodeKind::Paragraph, span);
                    self.push_scope(
                        Scope {
                            node: para,
                            closer: Closer::Para,
                        },
                        span,
                    )?;
                }
                _ => return Ok(cur),
            }
        }
    }

    /// Insertion parent for block content: paragraphs close first.
    fn block_parent(&mut self) -> NodeId {
        self.close_paras();
        self.cur()
    }

    // --- Token handlers --------------------------------------------------

    fn text(&mut self, text: &str, span: Span) -> Result<()> {
        // Whitespace between block elements does not open a paragraph.
        if text.chars().all(char::is_whitespace) && self.at_block_level() {
            return Ok(());
        }
        let parent = self.inline_parent(span)?;
        // Merge with a trailing text sibling to keep the tree small.
        if let Some(&last) = self.tree.children(parent).last() {
            if let NodeKind::Text(existing) = &mut self.tree.node_mut(last).kind {
                existing.push_str(text);
                let merged = self.tree.node(last).span.merge(span);
                self.tree.node_mut(last).span = merged;
                return Ok(());
            }
        }
        self.tree
            .append(parent, NodeKind::Text(text.to_string()), span);
        Ok(())
    }

    fn at_block_level(&self) -> bool {
        matches!(
            self.tree.node(self.cur()).kind,
            NodeKind::Root
                | NodeKind::Heading { .. }
                | NodeKind::Environment { .. }
                | NodeKind::ListItem
                | NodeKind::Figure { .. }
                | NodeKind::Table { .. }
                | NodeKind::TableRow
        )
    }

    fn command(
        &mut self,
        name: &str,
        starred: bool,
        opt: Option<&str>,
        span: Span,
    ) -> Result<()> {
        if let Some(level) = SectionLevel::from_command(name) {
            return self.heading(level, starred, span);
        }
        if let Some(kind) = InlineKind::from_command(name) {
            return self.inline(kind, span);
        }
        if let Some(kind) = ref_kind(name) {
            return self.cross_ref(kind, span);
        }
        match name {
            "label" => self.label(span),
            "item" => self.item(span),
            "caption" => self.caption(span),
            "includegraphics" => self.includegraphics(span),
            "url" => {
                let (url, _) = self.read_group_text();
                let parent = self.inline_parent(span)?;
                let link = self
                    .tree
                    .append(parent, NodeKind::Inline(InlineKind::Code), span);
                self.tree.append(link, NodeKind::Text(url), span);
                Ok(())
            }
            "href" => {
                // Drop the URL argument; the link text flows as content.
                let _ = self.read_group_text();
                Ok(())
            }
            "textcolor" => {
                let _ = self.read_group_text();
                Ok(())
            }
            "\\" => self.row_break(),
            _ if SKIP_WITH_ARG.contains(&name) => {
                let _ = self.read_group_text();
                Ok(())
            }
            _ if IGNORED.contains(&name) => Ok(()),
            _ => {
                // Unknown command: drop it, let any argument groups flow
                // through as transparent groups.
                let _ = opt;
                Ok(())
            }
        }
    }

    fn heading(&mut self, level: SectionLevel, starred: bool, span: Span) -> Result<()> {
        self.close_paras();
        // Sectioning is only legal at section nesting level: not inside an
        // environment, group, table or list item.
        for scope in self.open.iter().rev() {
            match &scope.closer {
                Closer::Document | Closer::Section(_) => break,
                _ => {
                    return Err(Error::UnexpectedSectioningAtDepth {
                        command: command_for(level).to_string(),
                        origin: self.origins.resolve_span(span),
                    });
                }
            }
        }
        while let Some(scope) = self.open.last() {
            match scope.closer {
                Closer::Section(open_level) if open_level >= level => {
                    self.open.pop();
                }
                _ => break,
            }
        }
        // Book class: a section or subsection needs a coarser heading open.
        if self.strict_levels
            && level >= SectionLevel::Section
            && !self
                .open
                .iter()
                .any(|s| matches!(s.closer, Closer::Section(_)))
        {
            return Err(Error::UnexpectedSectioningAtDepth {
                command: command_for(level).to_string(),
                origin: self.origins.resolve_span(span),
            });
        }
        let (title, _) = self.read_group_text();
        let parent = self.cur();
        let heading = self.tree.append(
            parent,
            NodeKind::Heading {
                level,
                title: title.trim().to_string(),
                starred,
            },
            span,
        );
        self.push_scope(
            Scope {
                node: heading,
                closer: Closer::Section(level),
            },
            span,
        )
    }

    fn inline(&mut self, kind: InlineKind, span: Span) -> Result<()> {
        // The formatting command owns its following group; without one it
        // is a no-op.
        if !self.peek_group_open() {
            return Ok(());
        }
        self.pos += 1; // consume GroupOpen
        let parent = self.inline_parent(span)?;
        let node = self.tree.append(parent, NodeKind::Inline(kind), span);
        self.push_scope(
            Scope {
                node,
                closer: Closer::Group { owned: true },
            },
            span,
        )
    }

    fn cross_ref(&mut self, kind: RefKind, span: Span) -> Result<()> {
        let (keys, _) = self.read_group_text();
        let parent = self.inline_parent(span)?;
        // \cite accepts a comma-separated key list.
        for key in keys.split(',') {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            self.tree.append(
                parent,
                NodeKind::CrossRef {
                    key: key.to_string(),
                    kind,
                },
                span,
            );
        }
        Ok(())
    }

    /// Attach a `\label` to the nearest open scope node that can own one.
    fn label(&mut self, span: Span) -> Result<()> {
        let (key, _) = self.read_group_text();
        let key = key.trim().to_string();
        if key.is_empty() {
            return Ok(());
        }
        let target = self
            .open
            .iter()
            .rev()
            .map(|s| s.node)
            .find(|&id| self.tree.node(id).label_kind().is_some())
            .unwrap_or(NodeId::ROOT);
        self.tree.node_mut(target).labels.push(LabelDecl {
            key,
            offset: span.start,
        });
        Ok(())
    }

    fn item(&mut self, span: Span) -> Result<()> {
        // Close the previous item (and its paragraphs) within the list.
        self.close_paras();
        if matches!(self.open.last().map(|s| &s.closer), Some(Closer::Item)) {
            self.open.pop();
        }
        let parent = self.cur();
        let item = self.tree.append(parent, NodeKind::ListItem, span);
        self.push_scope(
            Scope {
                node: item,
                closer: Closer::Item,
            },
            span,
        )
    }

    /// `\caption{...}`: a caption node under the nearest figure or table,
    /// with its argument parsed as ordinary inline content.
    fn caption(&mut self, span: Span) -> Result<()> {
        if !self.peek_group_open() {
            return Ok(());
        }
        self.pos += 1;
        let host = self
            .open
            .iter()
            .rev()
            .map(|s| s.node)
            .find(|&id| {
                matches!(
                    self.tree.node(id).kind,
                    NodeKind::Figure { .. } | NodeKind::Table { .. }
                )
            })
            .unwrap_or_else(|| self.cur());
        let caption = self.tree.append(host, NodeKind::Caption, span);
        self.push_scope(
            Scope {
                node: caption,
                closer: Closer::Group { owned: true },
            },
            span,
        )
    }

    fn includegraphics(&mut self, span: Span) -> Result<()> {
        let (path, _) = self.read_group_text();
        let path = path.trim().to_string();
        // Inside a figure the image attaches to it; bare \includegraphics
        // becomes an anonymous figure.
        let host = self.open.iter().rev().map(|s| s.node).find(|&id| {
            matches!(self.tree.node(id).kind, NodeKind::Figure { image: None })
        });
        match host {
            Some(id) => {
                if let NodeKind::Figure { image } = &mut self.tree.node_mut(id).kind {
                    *image = Some(path);
                }
            }
            None => {
                let parent = self.block_parent();
                self.tree
                    .append(parent, NodeKind::Figure { image: Some(path) }, span);
            }
        }
        Ok(())
    }

    fn row_break(&mut self) -> Result<()> {
        if self.in_table() {
            while let Some(scope) = self.open.last() {
                match scope.closer {
                    Closer::Para | Closer::Cell => {
                        self.open.pop();
                    }
                    Closer::Row => {
                        self.open.pop();
                        break;
                    }
                    _ => break,
                }
            }
        }
        // Outside tables a forced line break is presentation only.
        Ok(())
    }

    fn column_sep(&mut self, span: Span) -> Result<()> {
        if !self.in_table() {
            return Ok(());
        }
        while let Some(scope) = self.open.last() {
            match scope.closer {
                Closer::Para => {
                    self.open.pop();
                }
                Closer::Cell => {
                    self.open.pop();
                    break;
                }
                _ => break,
            }
        }
        // Open the next cell in the same row.
        if matches!(self.tree.node(self.cur()).kind, NodeKind::TableRow) {
            let row = self.cur();
            let cell = self.tree.append(row, NodeKind::TableCell, span);
            self.push_scope(
                Scope {
                    node: cell,
                    closer: Closer::Cell,
                },
                span,
            )?;
        }
        Ok(())
    }

    fn in_table(&self) -> bool {
        self.open.iter().rev().any(|s| {
            matches!(s.closer, Closer::Cell | Closer::Row)
                || matches!(self.tree.node(s.node).kind, NodeKind::Table { .. })
        })
    }

    fn begin_env(&mut self, name: String, opt: Option<String>, span: Span) -> Result<()> {
        let parent = self.block_parent();

        if TABULAR_ENVS.contains(&name.as_str()) {
            let column_count = self.consume_column_spec();
            // A tabular inside a rowless `table` float fills that float in
            // place instead of nesting a second table.
            let no_rows = !self
                .tree
                .children(parent)
                .iter()
                .any(|&c| matches!(self.tree.node(c).kind, NodeKind::TableRow));
            let table = match &self.tree.node(parent).kind {
                NodeKind::Table { column_count: 0 } if no_rows => {
                    if let NodeKind::Table { column_count: n } =
                        &mut self.tree.node_mut(parent).kind
                    {
                        *n = column_count;
                    }
                    parent
                }
                _ => self
                    .tree
                    .append(parent, NodeKind::Table { column_count }, span),
            };
            return self.push_scope(
                Scope {
                    node: table,
                    closer: Closer::Env(name),
                },
                span,
            );
        }

        let node = match name.as_str() {
            "table" => self
                .tree
                .append(parent, NodeKind::Table { column_count: 0 }, span),
            "figure" => self
                .tree
                .append(parent, NodeKind::Figure { image: None }, span),
            _ => {
                let kind: EnvKind = self.config.env_kind(&name);
                self.tree.append(
                    parent,
                    NodeKind::Environment {
                        name: name.clone(),
                        kind,
                        title: opt,
                    },
                    span,
                )
            }
        };
        self.push_scope(
            Scope {
                node,
                closer: Closer::Env(name),
            },
            span,
        )
    }

    fn end_env(&mut self, name: &str, span: Span) -> Result<()> {
        // Paragraphs, items, rows and cells close implicitly.
        while let Some(scope) = self.open.last() {
            match scope.closer {
                Closer::Para | Closer::Item | Closer::Row | Closer::Cell => {
                    self.open.pop();
                }
                _ => break,
            }
        }
        match self.open.last() {
            Some(Scope {
                closer: Closer::Env(open_name),
                ..
            }) => {
                if open_name != name {
                    return Err(Error::MismatchedEnvironment {
                        begin: open_name.clone(),
                        end: name.to_string(),
                        origin: self.origins.resolve_span(span),
                    });
                }
                self.open.pop();
                Ok(())
            }
            _ => Err(Error::UnexpectedEnd {
                name: name.to_string(),
                origin: self.origins.resolve_span(span),
            }),
        }
    }

    fn group_close(&mut self) {
        // Close paragraphs opened inside the group, then the group itself.
        while let Some(scope) = self.open.last() {
            match scope.closer {
                Closer::Para => {
                    self.open.pop();
                }
                Closer::Group { .. } => {
                    self.open.pop();
                    return;
                }
                // Stray close without an open group in this scope; the
                // lexer balance-checks, so this means a consumed group.
                _ => return,
            }
        }
    }

    fn math(
        &mut self,
        display: bool,
        source: &str,
        env: Option<&str>,
        span: Span,
    ) -> Result<()> {
        if !display {
            let parent = self.inline_parent(span)?;
            self.tree.append(
                parent,
                NodeKind::MathBlock {
                    display: false,
                    source: source.to_string(),
                    numbered: false,
                },
                span,
            );
            return Ok(());
        }

        let numbered = env.is_some_and(|e| !e.ends_with('*'));
        // The span starts at the opening delimiter; label offsets are
        // relative to the body, so skip past `\begin{env}`, `$$` or `\[`.
        let body_start = span.start
            + match env {
                Some(env) => "\\begin{}".len() + env.len(),
                None => 2,
            };
        let (clean, labels) = extract_math_labels(source, body_start);
        // Wrap equation-family environments back up so the typesetter sees
        // the alignment structure.
        let rendered_source = match env {
            Some(env) => format!("\\begin{{{env}}}{clean}\\end{{{env}}}"),
            None => clean,
        };
        let parent = self.block_parent();
        let node = self.tree.append(
            parent,
            NodeKind::MathBlock {
                display: true,
                source: rendered_source,
                numbered,
            },
            span,
        );
        self.tree.node_mut(node).labels = labels;
        Ok(())
    }

    fn verbatim(
        &mut self,
        name: &str,
        opt: Option<&str>,
        lang: Option<&str>,
        body: &str,
        span: Span,
    ) -> Result<()> {
        match name {
            "verb" => {
                let parent = self.inline_parent(span)?;
                let node = self
                    .tree
                    .append(parent, NodeKind::Inline(InlineKind::Code), span);
                self.tree.append(node, NodeKind::Text(body.to_string()), span);
                Ok(())
            }
            "tikzpicture" | "tikzcd" => {
                let opt_str = opt.map(|o| format!("[{o}]")).unwrap_or_default();
                let source = format!("\\begin{{{name}}}{opt_str}{body}\\end{{{name}}}");
                let parent = self.block_parent();
                self.tree.append(
                    parent,
                    NodeKind::DiagramBlock {
                        source,
                        image: None,
                        renderer_unavailable: false,
                    },
                    span,
                );
                Ok(())
            }
            _ => {
                let language = lang
                    .map(str::to_string)
                    .or_else(|| opt.and_then(listing_language));
                let parent = self.block_parent();
                self.tree.append(
                    parent,
                    NodeKind::CodeBlock {
                        language,
                        text: body.trim_matches('\n').to_string(),
                        numbered: opt.is_some_and(|o| o.contains("numbers=left")),
                    },
                    span,
                );
                Ok(())
            }
        }
    }

    // --- Token lookahead -------------------------------------------------

    fn peek_group_open(&self) -> bool {
        matches!(
            self.tokens.get(self.pos).map(|t| &t.kind),
            Some(TokenKind::GroupOpen)
        )
    }

    /// Consume a following `{...}` group, returning its flattened text.
    /// Math inside comes back as `$...$`; nested groups lose their braces.
    /// Returns empty text if no group follows.
    fn read_group_text(&mut self) -> (String, Span) {
        if !self.peek_group_open() {
            return (String::new(), Span::default());
        }
        let start_span = self.tokens[self.pos].span;
        self.pos += 1;
        let mut depth = 1usize;
        let mut out = String::new();
        let mut end_span = start_span;
        while self.pos < self.tokens.len() && depth > 0 {
            let token = &self.tokens[self.pos];
            self.pos += 1;
            end_span = token.span;
            match &token.kind {
                TokenKind::GroupOpen => depth += 1,
                TokenKind::GroupClose => depth -= 1,
                TokenKind::Text(t) => out.push_str(t),
                TokenKind::Math { source, .. } => {
                    out.push('$');
                    out.push_str(source);
                    out.push('$');
                }
                TokenKind::Verbatim { body, .. } => out.push_str(body),
                _ => {}
            }
        }
        (out, start_span.merge(end_span))
    }

    /// Consume a `{colspec}` group after `\begin{tabular}`, counting
    /// top-level column letters. `p{3cm}` counts once.
    fn consume_column_spec(&mut self) -> usize {
        if !self.peek_group_open() {
            return 0;
        }
        self.pos += 1;
        let mut depth = 1usize;
        let mut count = 0usize;
        while self.pos < self.tokens.len() && depth > 0 {
            let token = &self.tokens[self.pos];
            self.pos += 1;
            match &token.kind {
                TokenKind::GroupOpen => depth += 1,
                TokenKind::GroupClose => depth -= 1,
                TokenKind::Text(t) if depth == 1 => {
                    count += t
                        .chars()
                        .filter(|c| matches!(c, 'l' | 'c' | 'r' | 'p' | 'm' | 'b' | 'X'))
                        .count();
                }
                _ => {}
            }
        }
        count
    }
}

fn command_for(level: SectionLevel) -> &'static str {
    match level {
        SectionLevel::Part => "part",
        SectionLevel::Chapter => "chapter",
        SectionLevel::Section => "section",
        SectionLevel::Subsection => "subsection",
    }
}

/// Pull a `language=` key out of an lstlisting option string.
fn listing_language(opt: &str) -> Option<String> {
    opt.split(',').find_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        (key.trim() == "language").then(|| value.trim().to_string())
    })
}

fn ref_kind(name: &str) -> Option<RefKind> {
    match name {
        "ref" | "cref" | "Cref" | "autoref" | "nameref" => Some(RefKind::Ref),
        "eqref" => Some(RefKind::EqRef),
        "pageref" => Some(RefKind::PageRef),
        "cite" | "citep" | "citet" | "textcite" | "parencite" => Some(RefKind::Cite),
        _ => None,
    }
}

/// Strip `\label{...}` declarations out of opaque math source, returning
/// the cleaned source and the extracted labels with their byte offsets.
fn extract_math_labels(source: &str, base: usize) -> (String, Vec<LabelDecl>) {
    let mut clean = String::with_capacity(source.len());
    let mut labels = Vec::new();
    let mut rest = source;
    let mut consumed = 0usize;
    while let Some(idx) = rest.find("\\label{") {
        clean.push_str(&rest[..idx]);
        let after = &rest[idx + "\\label{".len()..];
        match after.find('}') {
            Some(close) => {
                labels.push(LabelDecl {
                    key: after[..close].trim().to_string(),
                    offset: base + consumed + idx,
                });
                let skip = idx + "\\label{".len() + close + 1;
                consumed += skip;
                rest = &rest[skip..];
            }
            None => {
                // Unterminated label; keep the raw text.
                clean.push_str(&rest[idx..]);
                rest = "";
            }
        }
    }
    clean.push_str(rest);
    (clean, labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::lex;

    fn parse_str(src: &str) -> DocumentTree {
        let origins = OriginMap::new();
        let tokens = lex(src, &origins).expect("lex");
        parse(&tokens, &Config::default(), &origins).expect("parse")
    }

    fn parse_err(src: &str) -> Error {
        let origins = OriginMap::new();
        let tokens = lex(src, &origins).expect("lex");
        parse(&tokens, &Config::default(), &origins).expect_err("should fail")
    }

    fn find_kind<'t>(
        tree: &'t DocumentTree,
        pred: impl Fn(&NodeKind) -> bool,
    ) -> Vec<&'t NodeKind> {
        tree.walk(tree.root())
            .map(|id| &tree.node(id).kind)
            .filter(|k| pred(k))
            .collect()
    }

    #[test]
    fn sections_nest_by_level() {
        let tree = parse_str(
            "\\chapter{One}\n\\section{A}\ntext a\n\\section{B}\ntext b\n\\chapter{Two}\n",
        );
        let root_children = tree.children(tree.root());
        assert_eq!(root_children.len(), 2, "two chapters at the root");
        let ch1 = root_children[0];
        let sections = tree
            .children(ch1)
            .iter()
            .filter(|&&id| matches!(tree.node(id).kind, NodeKind::Heading { .. }))
            .count();
        assert_eq!(sections, 2);
    }

    #[test]
    fn heading_titles_are_captured() {
        let tree = parse_str("\\section{The \\emph{Best} Title}");
        match &tree.node(tree.children(tree.root())[0]).kind {
            NodeKind::Heading { title, starred, .. } => {
                assert_eq!(title, "The Best Title");
                assert!(!starred);
            }
            other => panic!("expected heading, got {other:?}"),
        }
    }

    #[test]
    fn starred_sections_are_marked() {
        let tree = parse_str("\\section*{Preface}");
        match &tree.node(tree.children(tree.root())[0]).kind {
            NodeKind::Heading { starred, .. } => assert!(starred),
            other => panic!("expected heading, got {other:?}"),
        }
    }

    #[test]
    fn theorem_contains_its_proof() {
        let tree = parse_str(
            "\\begin{theorem}[Euclid]\\label{thm:euclid}\nStatement.\n\
             \\begin{proof}\nBecause.\n\\end{proof}\n\\end{theorem}",
        );
        let theorem = tree.children(tree.root())[0];
        match &tree.node(theorem).kind {
            NodeKind::Environment { name, kind, title } => {
                assert_eq!(name, "theorem");
                assert_eq!(*kind, EnvKind::TheoremLike);
                assert_eq!(title.as_deref(), Some("Euclid"));
            }
            other => panic!("expected environment, got {other:?}"),
        }
        assert_eq!(tree.node(theorem).labels[0].key, "thm:euclid");
        let proof = tree
            .walk(theorem)
            .find(|&id| {
                matches!(
                    &tree.node(id).kind,
                    NodeKind::Environment { kind: EnvKind::Proof, .. }
                )
            })
            .expect("proof nested inside theorem");
        assert!(tree
            .ancestor_where(proof, |n| matches!(
                n.kind,
                NodeKind::Environment { kind: EnvKind::TheoremLike, .. }
            ))
            .is_some());
    }

    #[test]
    fn mismatched_environment_is_fatal() {
        let err = parse_err("\\begin{theorem}\nx\n\\end{lemma}");
        assert!(matches!(err, Error::MismatchedEnvironment { .. }), "{err}");
    }

    #[test]
    fn unexpected_end_is_fatal() {
        let err = parse_err("text\n\\end{theorem}");
        assert!(matches!(err, Error::UnexpectedEnd { .. }), "{err}");
    }

    #[test]
    fn unclosed_environment_is_fatal() {
        let err = parse_err("\\begin{theorem}\nnever closed");
        assert!(matches!(err, Error::UnmatchedEnvironment { .. }), "{err}");
    }

    #[test]
    fn sectioning_inside_environment_is_fatal() {
        let err = parse_err("\\begin{theorem}\n\\section{Nope}\n\\end{theorem}");
        assert!(
            matches!(err, Error::UnexpectedSectioningAtDepth { .. }),
            "{err}"
        );
    }

    #[test]
    fn book_class_rejects_sectioning_without_a_chapter() {
        for src in ["\\subsection{Orphan}\ntext", "\\section{Orphan}\ntext"] {
            let origins = OriginMap::new();
            let tokens = lex(src, &origins).expect("lex");
            let err = parse_with_class(&tokens, &Config::default(), &origins, "book")
                .expect_err("should fail");
            assert!(
                matches!(err, Error::UnexpectedSectioningAtDepth { .. }),
                "{err}"
            );
        }
    }

    #[test]
    fn book_class_accepts_subsection_under_chapter() {
        let origins = OriginMap::new();
        let tokens =
            lex("\\chapter{C}\n\\subsection{S}\ntext", &origins).expect("lex");
        let tree = parse_with_class(&tokens, &Config::default(), &origins, "book")
            .expect("parse");
        assert_eq!(tree.children(tree.root()).len(), 1);
    }

    #[test]
    fn article_class_accepts_top_level_sections() {
        let tree = parse_str("\\subsection{Loose}\ntext");
        assert!(matches!(
            tree.node(tree.children(tree.root())[0]).kind,
            NodeKind::Heading { level: SectionLevel::Subsection, .. }
        ));
    }

    #[test]
    fn labels_attach_to_nearest_structural_node() {
        let tree = parse_str("\\section{S}\\label{sec:s}\ntext");
        let section = tree.children(tree.root())[0];
        assert_eq!(tree.node(section).labels[0].key, "sec:s");
    }

    #[test]
    fn refs_become_crossref_leaves() {
        let tree = parse_str("see \\ref{thm:a} and \\cite{knuth84, dijkstra68}");
        let refs = find_kind(&tree, |k| matches!(k, NodeKind::CrossRef { .. }));
        assert_eq!(refs.len(), 3);
        match refs[1] {
            NodeKind::CrossRef { key, kind } => {
                assert_eq!(key, "knuth84");
                assert_eq!(*kind, RefKind::Cite);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn lists_produce_items() {
        let tree = parse_str(
            "\\begin{enumerate}\n\\item first\n\\item second\n\\end{enumerate}",
        );
        let list = tree.children(tree.root())[0];
        assert!(matches!(
            tree.node(list).kind,
            NodeKind::Environment { kind: EnvKind::List(true), .. }
        ));
        let items = tree
            .children(list)
            .iter()
            .filter(|&&id| matches!(tree.node(id).kind, NodeKind::ListItem))
            .count();
        assert_eq!(items, 2);
    }

    #[test]
    fn tabular_builds_rows_and_cells() {
        let tree = parse_str(
            "\\begin{tabular}{|l|c|r|}\na & b & c \\\\\nd & e & f\n\\end{tabular}",
        );
        let table = tree.children(tree.root())[0];
        match tree.node(table).kind {
            NodeKind::Table { column_count } => assert_eq!(column_count, 3),
            ref other => panic!("expected table, got {other:?}"),
        }
        let rows: Vec<_> = tree
            .children(table)
            .iter()
            .filter(|&&id| matches!(tree.node(id).kind, NodeKind::TableRow))
            .copied()
            .collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(tree.children(rows[0]).len(), 3);
        assert_eq!(tree.children(rows[1]).len(), 3);
    }

    #[test]
    fn table_float_absorbs_inner_tabular() {
        let tree = parse_str(
            "\\begin{table}\n\\caption{Data}\\label{tab:d}\n\
             \\begin{tabular}{ll}\nx & y\n\\end{tabular}\n\\end{table}",
        );
        let tables = find_kind(&tree, |k| matches!(k, NodeKind::Table { .. }));
        assert_eq!(tables.len(), 1, "float and tabular merge into one table");
        let table = tree.children(tree.root())[0];
        assert_eq!(tree.node(table).labels[0].key, "tab:d");
        assert!(tree
            .children(table)
            .iter()
            .any(|&id| matches!(tree.node(id).kind, NodeKind::Caption)));
    }

    #[test]
    fn figure_collects_image_caption_and_label() {
        let tree = parse_str(
            "\\begin{figure}\n\\centering\n\\includegraphics[width=5cm]{plots/f1.png}\n\
             \\caption{A plot}\\label{fig:f1}\n\\end{figure}",
        );
        let figure = tree.children(tree.root())[0];
        match &tree.node(figure).kind {
            NodeKind::Figure { image } => assert_eq!(image.as_deref(), Some("plots/f1.png")),
            other => panic!("expected figure, got {other:?}"),
        }
        assert_eq!(tree.node(figure).labels[0].key, "fig:f1");
        let caption = tree
            .children(figure)
            .iter()
            .find(|&&id| matches!(tree.node(id).kind, NodeKind::Caption))
            .copied()
            .expect("caption node");
        assert_eq!(tree.text_content(caption), "A plot");
    }

    #[test]
    fn display_math_extracts_labels_and_numbering() {
        let tree = parse_str("\\begin{equation}\\label{eq:sum}\nx + y\n\\end{equation}");
        let math = tree.children(tree.root())[0];
        match &tree.node(math).kind {
            NodeKind::MathBlock {
                display,
                source,
                numbered,
            } => {
                assert!(*display && *numbered);
                assert!(!source.contains("\\label"));
                assert!(source.contains("x + y"));
            }
            other => panic!("expected math block, got {other:?}"),
        }
        assert_eq!(tree.node(math).labels[0].key, "eq:sum");
    }

    #[test]
    fn math_label_offsets_point_into_the_body() {
        let src = "\\begin{equation}\\label{eq:sum}x + y\\end{equation}";
        let tree = parse_str(src);
        let math = tree.children(tree.root())[0];
        assert_eq!(
            tree.node(math).labels[0].offset,
            src.find("\\label").unwrap()
        );
    }

    #[test]
    fn starred_equations_are_unnumbered() {
        let tree = parse_str("\\begin{align*}\nx &= y\n\\end{align*}");
        match &tree.node(tree.children(tree.root())[0]).kind {
            NodeKind::MathBlock { numbered, .. } => assert!(!numbered),
            other => panic!("expected math block, got {other:?}"),
        }
    }

    #[test]
    fn code_and_diagram_blocks() {
        let tree = parse_str(
            "\\begin{lstlisting}[language=Python]\nprint(1)\n\\end{lstlisting}\n\n\
             \\begin{tikzpicture}\n\\draw (0,0) -- (1,1);\n\\end{tikzpicture}",
        );
        match &tree.node(tree.children(tree.root())[0]).kind {
            NodeKind::CodeBlock { language, text, .. } => {
                assert_eq!(language.as_deref(), Some("Python"));
                assert_eq!(text, "print(1)");
            }
            other => panic!("expected code block, got {other:?}"),
        }
        match &tree.node(tree.children(tree.root())[1]).kind {
            NodeKind::DiagramBlock { source, image, .. } => {
                assert!(source.starts_with("\\begin{tikzpicture}"));
                assert!(source.ends_with("\\end{tikzpicture}"));
                assert!(image.is_none());
            }
            other => panic!("expected diagram block, got {other:?}"),
        }
    }

    #[test]
    fn inline_formatting_nests() {
        let tree = parse_str("\\textbf{bold \\emph{both}} plain");
        let bolds = find_kind(&tree, |k| {
            matches!(k, NodeKind::Inline(InlineKind::Bold))
        });
        let emphs = find_kind(&tree, |k| {
            matches!(k, NodeKind::Inline(InlineKind::Emph))
        });
        assert_eq!(bolds.len(), 1);
        assert_eq!(emphs.len(), 1);
    }

    #[test]
    fn paragraphs_split_on_blank_lines() {
        let tree = parse_str("first paragraph\n\nsecond paragraph");
        let paras = find_kind(&tree, |k| matches!(k, NodeKind::Paragraph));
        assert_eq!(paras.len(), 2);
    }

    #[test]
    fn inline_verb_is_code() {
        let tree = parse_str("run \\verb|cargo build| now");
        let code = find_kind(&tree, |k| {
            matches!(k, NodeKind::Inline(InlineKind::Code))
        });
        assert_eq!(code.len(), 1);
    }
}
