//! Output generation: HTML emission, image staging, diagram rendering.

pub mod diagram;
mod html;

pub use html::{escape, render_document};

use std::path::{Path, PathBuf};

use crate::diag::{DiagKind, Diagnostics};
use crate::error::Result;
use crate::ir::{DocumentTree, NodeKind};
use crate::origin::{Origin, OriginMap};

/// Image extensions tried when `\includegraphics` omits one, and accepted
/// for direct display.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "svg", "gif", "webp"];

/// Copy every referenced figure image into `output_root`/images and
/// rewrite the figure paths to the staged copies. Missing images warn and
/// degrade to a visible placeholder.
pub fn stage_images(
    tree: &mut DocumentTree,
    origins: &OriginMap,
    search_dirs: &[PathBuf],
    output_root: &Path,
    diags: &mut Diagnostics,
) -> Result<()> {
    let figures: Vec<_> = tree
        .walk(tree.root())
        .filter(|&id| matches!(tree.node(id).kind, NodeKind::Figure { image: Some(_) }))
        .collect();
    if figures.is_empty() {
        return Ok(());
    }
    let image_dir = output_root.join("images");
    std::fs::create_dir_all(&image_dir)?;

    for (n, id) in figures.into_iter().enumerate() {
        let requested = match &tree.node(id).kind {
            NodeKind::Figure { image: Some(path) } => path.clone(),
            _ => continue,
        };
        match locate_image(&requested, search_dirs) {
            Some(found) => {
                let file_name = found
                    .file_name()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_else(|| format!("image-{n}"));
                // Flat staging directory: disambiguate repeated names.
                let staged_name = format!("{n}-{file_name}");
                match std::fs::copy(&found, image_dir.join(&staged_name)) {
                    Ok(_) => {
                        if let NodeKind::Figure { image } = &mut tree.node_mut(id).kind {
                            *image = Some(format!("images/{staged_name}"));
                        }
                    }
                    // An unreadable or uncopyable image degrades like a
                    // missing one; the conversion itself keeps going.
                    Err(err) => {
                        let origin = node_origin(tree, origins, id);
                        diags.warn(
                            DiagKind::ImageNotFound,
                            origin,
                            format!("image '{requested}' could not be staged: {err}"),
                        );
                        if let NodeKind::Figure { image } = &mut tree.node_mut(id).kind {
                            *image = None;
                        }
                    }
                }
            }
            None => {
                let origin = node_origin(tree, origins, id);
                diags.warn(
                    DiagKind::ImageNotFound,
                    origin,
                    format!("image '{requested}' not found"),
                );
                if let NodeKind::Figure { image } = &mut tree.node_mut(id).kind {
                    *image = None;
                }
            }
        }
    }
    Ok(())
}

fn node_origin(tree: &DocumentTree, origins: &OriginMap, id: crate::ir::NodeId) -> Origin {
    origins.resolve_span(tree.node(id).span)
}

/// Search `dirs` for the image, trying the name as written and with each
/// known extension appended.
fn locate_image(requested: &str, dirs: &[PathBuf]) -> Option<PathBuf> {
    for dir in dirs {
        let as_written = dir.join(requested);
        if as_written.is_file() {
            return Some(as_written);
        }
        if Path::new(requested).extension().is_none() {
            for ext in IMAGE_EXTENSIONS {
                let candidate = dir.join(format!("{requested}.{ext}"));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::NodeId;
    use crate::origin::Span;

    fn figure_tree(path: &str) -> DocumentTree {
        let mut tree = DocumentTree::new();
        tree.append(
            NodeId::ROOT,
            NodeKind::Figure {
                image: Some(path.to_string()),
            },
            Span::default(),
        );
        tree
    }

    fn figure_image(tree: &DocumentTree) -> Option<String> {
        let id = tree.children(NodeId::ROOT)[0];
        match &tree.node(id).kind {
            NodeKind::Figure { image } => image.clone(),
            _ => None,
        }
    }

    #[test]
    fn found_images_are_staged_and_rewritten() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("figs")).unwrap();
        std::fs::write(src.path().join("figs/plot.png"), b"png").unwrap();

        let mut tree = figure_tree("figs/plot");
        let mut diags = Diagnostics::new();
        stage_images(
            &mut tree,
            &OriginMap::new(),
            &[src.path().to_path_buf()],
            out.path(),
            &mut diags,
        )
        .unwrap();

        assert!(diags.is_empty());
        let staged = figure_image(&tree).expect("image kept");
        assert!(staged.starts_with("images/"));
        assert!(staged.ends_with("plot.png"));
        assert!(out
            .path()
            .join(&staged)
            .is_file());
    }

    #[test]
    fn missing_images_warn_and_degrade() {
        let out = tempfile::tempdir().unwrap();
        let mut tree = figure_tree("nowhere/ghost.png");
        let mut diags = Diagnostics::new();
        stage_images(
            &mut tree,
            &OriginMap::new(),
            &[PathBuf::from("/definitely/absent")],
            out.path(),
            &mut diags,
        )
        .unwrap();
        assert_eq!(diags.count(DiagKind::ImageNotFound), 1);
        assert_eq!(figure_image(&tree), None);
    }

    #[test]
    fn uncopyable_images_warn_and_degrade() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(src.path().join("figs")).unwrap();
        std::fs::write(src.path().join("figs/plot.png"), b"png").unwrap();
        // A directory squatting on the staged path makes the copy fail.
        std::fs::create_dir_all(out.path().join("images/0-plot.png")).unwrap();

        let mut tree = figure_tree("figs/plot");
        let mut diags = Diagnostics::new();
        stage_images(
            &mut tree,
            &OriginMap::new(),
            &[src.path().to_path_buf()],
            out.path(),
            &mut diags,
        )
        .unwrap();
        assert_eq!(diags.count(DiagKind::ImageNotFound), 1);
        assert_eq!(figure_image(&tree), None);
    }
}
