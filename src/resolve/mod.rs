//! Label and reference resolution.
//!
//! Two passes over the finished, numbered tree. The first collects every
//! `\label` declaration into a [`LabelRegistry`]; a duplicate key anywhere
//! in the project is fatal. The second rewrites every [`CrossRef`] node in
//! place: to a [`ResolvedLink`] when the key is known, or to an
//! [`UnresolvedPlaceholder`] plus exactly one warning when it is not.
//! Because declaration collection completes before any lookup, forward and
//! backward references behave identically.
//!
//! [`CrossRef`]: NodeKind::CrossRef
//! [`ResolvedLink`]: NodeKind::ResolvedLink
//! [`UnresolvedPlaceholder`]: NodeKind::UnresolvedPlaceholder

use crate::config::Config;
use crate::diag::{DiagKind, Diagnostics};
use crate::error::Result;
use crate::ir::{
    CitationRegistry, DocumentTree, LabelEntry, LabelKind, LabelRegistry, NodeId, NodeKind,
    RefKind,
};
use crate::origin::OriginMap;

/// Resolve all references in `tree`, returning the label registry for the
/// renderer's anchor generation.
pub fn resolve(
    tree: &mut DocumentTree,
    citations: &CitationRegistry,
    config: &Config,
    origins: &OriginMap,
    diags: &mut Diagnostics,
) -> Result<LabelRegistry> {
    let labels = collect_labels(tree, origins)?;
    rewrite_refs(tree, &labels, citations, config, origins, diags);
    Ok(labels)
}

/// Pass 1: every `\label` in document order.
fn collect_labels(tree: &DocumentTree, origins: &OriginMap) -> Result<LabelRegistry> {
    let mut registry = LabelRegistry::new();
    for id in tree.walk(tree.root()) {
        let node = tree.node(id);
        if node.labels.is_empty() {
            continue;
        }
        let kind = node.label_kind().unwrap_or(LabelKind::Other);
        for decl in &node.labels {
            registry.declare(
                &decl.key,
                LabelEntry {
                    node: id,
                    number: node.number.clone(),
                    kind,
                    origin: origins.resolve(decl.offset),
                },
            )?;
        }
    }
    tracing::debug!(labels = registry.len(), "labels collected");
    Ok(registry)
}

/// Pass 2: rewrite reference leaves in place.
fn rewrite_refs(
    tree: &mut DocumentTree,
    labels: &LabelRegistry,
    citations: &CitationRegistry,
    config: &Config,
    origins: &OriginMap,
    diags: &mut Diagnostics,
) {
    let ids: Vec<_> = tree.walk(tree.root()).collect();
    for id in ids {
        let (key, kind) = match &tree.node(id).kind {
            NodeKind::CrossRef { key, kind } => (key.clone(), *kind),
            _ => continue,
        };
        let replacement = match kind {
            RefKind::Cite => resolve_citation(&key, citations),
            _ => resolve_label(&key, kind, labels, config),
        };
        match replacement {
            Some(resolved) => tree.node_mut(id).kind = resolved,
            None => {
                let origin = origins.resolve_span(tree.node(id).span);
                let what = if kind == RefKind::Cite {
                    "citation key"
                } else {
                    "label"
                };
                diags.warn(
                    DiagKind::UnresolvedReference,
                    origin,
                    format!("{what} '{key}' is not defined"),
                );
                tree.node_mut(id).kind = NodeKind::UnresolvedPlaceholder { key, kind };
            }
        }
    }
}

fn resolve_citation(key: &str, citations: &CitationRegistry) -> Option<NodeKind> {
    let index = citations.position(key)?;
    Some(NodeKind::ResolvedLink {
        key: key.to_string(),
        display: format!("[{}]", index + 1),
        // Citations point into the references list, not the tree.
        target: NodeId::ROOT,
        kind: RefKind::Cite,
    })
}

fn resolve_label(
    key: &str,
    kind: RefKind,
    labels: &LabelRegistry,
    config: &Config,
) -> Option<NodeKind> {
    let entry = labels.get(key)?;
    let display = match (&entry.number, kind) {
        (Some(number), RefKind::EqRef) => format!("({number})"),
        (Some(number), _) => number.clone(),
        // Unnumbered target (starred section, plain paragraph): the link
        // still works, with generic text.
        (None, _) => config.cross_ref_text.clone(),
    };
    Some(NodeKind::ResolvedLink {
        key: key.to_string(),
        display,
        target: entry.node,
        kind,
    })
}
