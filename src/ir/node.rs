//! Document tree node types.

use crate::origin::Span;

/// Unique identifier for a node within a [`DocumentTree`].
///
/// [`DocumentTree`]: super::DocumentTree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

impl NodeId {
    /// The root node ID (always 0).
    pub const ROOT: NodeId = NodeId(0);
}

/// Sectioning depth, ordered from outermost to innermost.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SectionLevel {
    Part,
    Chapter,
    Section,
    Subsection,
}

impl SectionLevel {
    /// Map a sectioning command name to its level.
    pub fn from_command(name: &str) -> Option<Self> {
        match name {
            "part" => Some(SectionLevel::Part),
            "chapter" => Some(SectionLevel::Chapter),
            "section" => Some(SectionLevel::Section),
            "subsection" => Some(SectionLevel::Subsection),
            _ => None,
        }
    }
}

/// Behavioral class of an environment, dispatched through the configuration
/// table rather than per-name branching. Unknown names fall back to
/// [`EnvKind::Unknown`] and render as a plain block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvKind {
    /// Numbered statement blocks: theorem, lemma, definition, example, ...
    TheoremLike,
    Proof,
    /// itemize/enumerate. `true` for ordered (enumerate).
    List(bool),
    /// Styled box without numbering (remark, note, custom tcolorboxes).
    Box,
    /// Not in the configuration table; rendered generically.
    #[default]
    Unknown,
}

/// What a cross-reference command asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    /// `\ref` / `\cref` / `\autoref`
    Ref,
    /// `\eqref` (number in parentheses)
    EqRef,
    /// `\pageref`
    PageRef,
    /// `\cite`
    Cite,
}

/// Inline formatting wrappers produced from `\textbf` and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineKind {
    Bold,
    Emph,
    Code,
    Underline,
    SmallCaps,
}

impl InlineKind {
    pub fn from_command(name: &str) -> Option<Self> {
        match name {
            "textbf" => Some(InlineKind::Bold),
            "textit" | "emph" => Some(InlineKind::Emph),
            "texttt" => Some(InlineKind::Code),
            "underline" => Some(InlineKind::Underline),
            "textsc" => Some(InlineKind::SmallCaps),
            _ => None,
        }
    }
}

/// Classification recorded for label targets, so `\ref` display text can
/// distinguish an equation from a figure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LabelKind {
    Part,
    Chapter,
    Section,
    Subsection,
    Environment,
    Equation,
    Table,
    Figure,
    CodeBlock,
    Other,
}

/// Tagged node variant.
///
/// Structural nodes carry their children in [`Node::children`]; the
/// variants here hold only per-kind payload.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Root,
    /// Sectioning node; title children live in `title` subtree rendered
    /// from the heading argument.
    Heading {
        level: SectionLevel,
        title: String,
        starred: bool,
    },
    /// Block-level run of inline content.
    Paragraph,
    /// Leaf text.
    Text(String),
    /// Inline formatting wrapper over its children.
    Inline(InlineKind),
    /// `\begin{name}...\end{name}` block.
    Environment {
        name: String,
        kind: EnvKind,
        /// Optional bracketed title: `\begin{theorem}[Euclid]`.
        title: Option<String>,
    },
    /// `\item` within a list environment.
    ListItem,
    /// Opaque math source, inline or display.
    MathBlock {
        display: bool,
        source: String,
        /// True for display math from an unstarred equation-family
        /// environment; such blocks draw from the equation counter.
        numbered: bool,
    },
    /// Table container; rows are `TableRow` children, caption a `Caption`
    /// child.
    Table {
        column_count: usize,
    },
    TableRow,
    TableCell,
    /// Figure block; `image` is the raw `\includegraphics` argument.
    Figure {
        image: Option<String>,
    },
    Caption,
    /// Verbatim code block, copied byte-for-byte.
    CodeBlock {
        language: Option<String>,
        text: String,
        numbered: bool,
    },
    /// Raw diagram source (tikzpicture/tikzcd). `image` is filled in by
    /// the external renderer when available.
    DiagramBlock {
        source: String,
        image: Option<String>,
        /// Set when rendering was attempted and failed, or no renderer
        /// tooling was found; the raw source is displayed instead.
        renderer_unavailable: bool,
    },
    /// Unresolved reference or citation, rewritten by the resolver.
    CrossRef {
        key: String,
        kind: RefKind,
    },
    /// Cross-reference resolved to a target node.
    ResolvedLink {
        key: String,
        /// Display number ("2.3") or citation marker ("[Knu84]").
        display: String,
        target: NodeId,
        kind: RefKind,
    },
    /// Cross-reference whose key was not found anywhere.
    UnresolvedPlaceholder {
        key: String,
        kind: RefKind,
    },
}

/// A `\label` declaration attached to a node.
///
/// `offset` is the flattened byte position of the `\label` command, kept so
/// duplicate declarations can be reported with both source locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelDecl {
    pub key: String,
    pub offset: usize,
}

/// A node in the document tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    /// Parent node (None only for root).
    pub parent: Option<NodeId>,
    /// Ordered children.
    pub children: Vec<NodeId>,
    /// Byte range in the flattened source this node was parsed from.
    pub span: Span,
    /// Number assigned by the numbering engine ("2.3"), if any.
    pub number: Option<String>,
    /// Labels declared against this node.
    pub labels: Vec<LabelDecl>,
}

impl Node {
    pub fn new(kind: NodeKind, span: Span) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            span,
            number: None,
            labels: Vec::new(),
        }
    }

    /// Label kind this node would register under, or None for nodes that
    /// cannot own a label meaningfully (text, inline markup).
    pub fn label_kind(&self) -> Option<LabelKind> {
        match &self.kind {
            NodeKind::Heading { level, .. } => Some(match level {
                SectionLevel::Part => LabelKind::Part,
                SectionLevel::Chapter => LabelKind::Chapter,
                SectionLevel::Section => LabelKind::Section,
                SectionLevel::Subsection => LabelKind::Subsection,
            }),
            NodeKind::Environment { .. } => Some(LabelKind::Environment),
            NodeKind::MathBlock { .. } => Some(LabelKind::Equation),
            NodeKind::Table { .. } => Some(LabelKind::Table),
            NodeKind::Figure { .. } => Some(LabelKind::Figure),
            NodeKind::CodeBlock { .. } => Some(LabelKind::CodeBlock),
            NodeKind::Root | NodeKind::Paragraph | NodeKind::ListItem => Some(LabelKind::Other),
            _ => None,
        }
    }
}
