//! Intermediate representation for converted books.
//!
//! The document tree uses an arena of nodes indexed by [`NodeId`], with the
//! root always at index 0. Parents own their children exclusively: every
//! non-root node has exactly one parent and the tree is acyclic. The tree
//! is mutable while the parser builds it, annotated in place by the
//! numbering engine and resolver, and frozen inside [`DocumentIr`] for the
//! renderer.

mod node;
mod registry;

pub use node::{
    EnvKind, InlineKind, LabelDecl, LabelKind, Node, NodeId, NodeKind, RefKind, SectionLevel,
};
pub use registry::{BibEntry, CitationRegistry, LabelEntry, LabelRegistry};

use crate::diag::Diagnostics;
use crate::origin::{OriginMap, Span};

/// The document content as an arena-backed tree.
#[derive(Debug, Clone)]
pub struct DocumentTree {
    nodes: Vec<Node>,
}

impl Default for DocumentTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentTree {
    /// Create a tree containing only the root node.
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new(NodeKind::Root, Span::default())],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0 as usize]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        // The root always exists.
        self.nodes.len() <= 1
    }

    /// Allocate a node and attach it as the last child of `parent`.
    pub fn append(&mut self, parent: NodeId, kind: NodeKind, span: Span) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        let mut node = Node::new(kind, span);
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes[parent.0 as usize].children.push(id);
        id
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.node(id).children
    }

    /// Depth-first preorder traversal from `start`.
    pub fn walk(&self, start: NodeId) -> Walk<'_> {
        Walk {
            tree: self,
            stack: vec![start],
        }
    }

    /// Nearest ancestor (including `id` itself) matching the predicate.
    pub fn ancestor_where(
        &self,
        id: NodeId,
        mut pred: impl FnMut(&Node) -> bool,
    ) -> Option<NodeId> {
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            if pred(self.node(current)) {
                return Some(current);
            }
            cursor = self.node(current).parent;
        }
        None
    }

    /// Concatenated text content of a subtree (captions, headings).
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        for node in self.walk(id) {
            if let NodeKind::Text(s) = &self.node(node).kind {
                out.push_str(s);
            }
        }
        out
    }
}

/// Preorder iterator over node ids.
pub struct Walk<'a> {
    tree: &'a DocumentTree,
    stack: Vec<NodeId>,
}

impl Iterator for Walk<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.stack.pop()?;
        let children = &self.tree.node(id).children;
        self.stack.extend(children.iter().rev().copied());
        Some(id)
    }
}

/// Book-level metadata detected from the preamble, overridable by config.
#[derive(Debug, Clone, Default)]
pub struct BookMeta {
    pub title: String,
    pub author: String,
    pub date: String,
    /// Document class ("book", "article", ...). Articles promote
    /// `\section` to the top structural level.
    pub docclass: String,
}

/// The finished, fully-resolved document handed to the renderer.
///
/// Immutable by construction: the pipeline moves its working state in here
/// and only hands out shared references afterwards.
#[derive(Debug)]
pub struct DocumentIr {
    pub meta: BookMeta,
    pub tree: DocumentTree,
    pub labels: LabelRegistry,
    pub citations: CitationRegistry,
    pub origins: OriginMap,
    pub diagnostics: Diagnostics,
}
