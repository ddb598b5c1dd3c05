//! External diagram rendering.
//!
//! TikZ sources cannot be typeset in the browser, so diagram blocks are
//! compiled out of process: each one becomes a standalone LaTeX job in a
//! scratch directory, compiled with `xelatex` (or `pdflatex`), and the
//! resulting page is rasterized with `pdftoppm`. Every failure mode is
//! recoverable: the block keeps its raw source, is flagged so the
//! renderer shows it as code, and conversion continues.

use std::path::Path;
use std::process::Command;

use crate::diag::{DiagKind, Diagnostics};
use crate::error::Result;
use crate::ir::{DocumentTree, NodeId, NodeKind};
use crate::origin::{Origin, OriginMap};

/// Rasterization density for `pdftoppm`.
const RENDER_DPI: &str = "150";

/// Compile every diagram block to a PNG under `output_root`/diagrams.
///
/// With `enabled` false (the `--no-diagrams` path) blocks are marked
/// unavailable without touching any external tool.
pub fn render_diagrams(
    tree: &mut DocumentTree,
    origins: &OriginMap,
    output_root: &Path,
    enabled: bool,
    diags: &mut Diagnostics,
) -> Result<()> {
    let blocks: Vec<NodeId> = tree
        .walk(tree.root())
        .filter(|&id| matches!(tree.node(id).kind, NodeKind::DiagramBlock { .. }))
        .collect();
    if blocks.is_empty() {
        return Ok(());
    }
    if !enabled {
        for id in blocks {
            mark_unavailable(tree, id);
        }
        return Ok(());
    }

    let Some(engine) = find_tool(&["xelatex", "pdflatex"]) else {
        diags.warn(
            DiagKind::RendererUnavailable,
            Origin::unknown(),
            "no LaTeX engine found (tried xelatex, pdflatex); diagrams shown as source",
        );
        for id in blocks {
            mark_unavailable(tree, id);
        }
        return Ok(());
    };
    if find_tool(&["pdftoppm"]).is_none() {
        diags.warn(
            DiagKind::RendererUnavailable,
            Origin::unknown(),
            "pdftoppm not found; diagrams shown as source",
        );
        for id in blocks {
            mark_unavailable(tree, id);
        }
        return Ok(());
    }

    let diagram_dir = output_root.join("diagrams");
    std::fs::create_dir_all(&diagram_dir)?;
    let scratch = tempfile::tempdir()?;

    for (n, id) in blocks.into_iter().enumerate() {
        let source = match &tree.node(id).kind {
            NodeKind::DiagramBlock { source, .. } => source.clone(),
            _ => continue,
        };
        let name = format!("diagram-{n}");
        match compile_one(engine, scratch.path(), &diagram_dir, &name, &source) {
            Ok(()) => {
                if let NodeKind::DiagramBlock { image, .. } = &mut tree.node_mut(id).kind {
                    *image = Some(format!("diagrams/{name}.png"));
                }
            }
            Err(reason) => {
                let origin = origins.resolve_span(tree.node(id).span);
                diags.warn(
                    DiagKind::DiagramRenderFailed,
                    origin,
                    format!("diagram failed to render: {reason}"),
                );
                mark_unavailable(tree, id);
            }
        }
    }
    Ok(())
}

fn mark_unavailable(tree: &mut DocumentTree, id: NodeId) {
    if let NodeKind::DiagramBlock {
        renderer_unavailable,
        ..
    } = &mut tree.node_mut(id).kind
    {
        *renderer_unavailable = true;
    }
}

/// First tool from `candidates` that answers `--version`.
fn find_tool(candidates: &[&'static str]) -> Option<&'static str> {
    candidates.iter().copied().find(|tool| {
        Command::new(tool)
            .arg("--version")
            .output()
            .map(|out| out.status.success())
            .unwrap_or(false)
    })
}

/// Compile one source to `<diagram_dir>/<name>.png`. Errors are strings:
/// the caller downgrades them to warnings.
fn compile_one(
    engine: &str,
    scratch: &Path,
    diagram_dir: &Path,
    name: &str,
    source: &str,
) -> std::result::Result<(), String> {
    let tex_path = scratch.join(format!("{name}.tex"));
    let document = format!(
        "\\documentclass[tikz,border=2pt]{{standalone}}\n\
         \\usetikzlibrary{{arrows.meta,calc,positioning,decorations.pathmorphing}}\n\
         \\usepackage{{amsmath,amssymb}}\n\
         \\usepackage{{tikz-cd}}\n\
         \\begin{{document}}\n{source}\n\\end{{document}}\n"
    );
    std::fs::write(&tex_path, document).map_err(|e| e.to_string())?;

    let status = Command::new(engine)
        .arg("-interaction=nonstopmode")
        .arg("-halt-on-error")
        .arg("-output-directory")
        .arg(scratch)
        .arg(&tex_path)
        .current_dir(scratch)
        .output()
        .map_err(|e| format!("failed to run {engine}: {e}"))?;
    let pdf_path = scratch.join(format!("{name}.pdf"));
    if !status.status.success() || !pdf_path.is_file() {
        return Err(format!("{engine} exited with {}", status.status));
    }

    let target = diagram_dir.join(name);
    let status = Command::new("pdftoppm")
        .arg("-png")
        .arg("-r")
        .arg(RENDER_DPI)
        .arg("-singlefile")
        .arg(&pdf_path)
        .arg(&target)
        .output()
        .map_err(|e| format!("failed to run pdftoppm: {e}"))?;
    if !status.status.success() {
        return Err(format!("pdftoppm exited with {}", status.status));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::origin::Span;

    fn tree_with_diagram() -> DocumentTree {
        let mut tree = DocumentTree::new();
        tree.append(
            NodeId::ROOT,
            NodeKind::DiagramBlock {
                source: "\\begin{tikzpicture}\\draw (0,0);\\end{tikzpicture}".into(),
                image: None,
                renderer_unavailable: false,
            },
            Span::default(),
        );
        tree
    }

    #[test]
    fn disabled_rendering_marks_blocks_without_warnings() {
        let mut tree = tree_with_diagram();
        let mut diags = Diagnostics::new();
        let tmp = tempfile::tempdir().unwrap();
        render_diagrams(&mut tree, &OriginMap::new(), tmp.path(), false, &mut diags)
            .unwrap();
        assert!(diags.is_empty());
        let id = tree.children(NodeId::ROOT)[0];
        match &tree.node(id).kind {
            NodeKind::DiagramBlock {
                image,
                renderer_unavailable,
                ..
            } => {
                assert!(image.is_none());
                assert!(renderer_unavailable);
            }
            other => panic!("expected diagram block, got {other:?}"),
        }
    }

    #[test]
    fn no_diagrams_is_a_no_op() {
        let mut tree = DocumentTree::new();
        let mut diags = Diagnostics::new();
        let tmp = tempfile::tempdir().unwrap();
        render_diagrams(&mut tree, &OriginMap::new(), tmp.path(), true, &mut diags)
            .unwrap();
        assert!(diags.is_empty());
    }

    #[test]
    fn missing_tools_are_not_found() {
        assert_eq!(find_tool(&["definitely-not-a-latex-engine"]), None);
    }
}
