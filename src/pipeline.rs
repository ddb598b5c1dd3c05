//! End-to-end conversion pipeline.
//!
//! Stages run in a fixed order: load and flatten the project, then lex
//! and parse the body while the bibliography parses on its own thread
//! (the two share no state until both finish), then number, then
//! resolve. The result is an immutable [`DocumentIr`] plus the effective
//! configuration after preamble detection, ready for output generation.

use std::path::{Path, PathBuf};

use crate::bib;
use crate::config::Config;
use crate::diag::Diagnostics;
use crate::error::Result;
use crate::ir::{CitationRegistry, DocumentIr};
use crate::lexer;
use crate::loader;
use crate::number;
use crate::parser;
use crate::render;
use crate::resolve;

/// A converted project: the IR plus everything output generation needs.
#[derive(Debug)]
pub struct Conversion {
    pub ir: DocumentIr,
    /// Effective configuration: user config layered over preamble
    /// detection over defaults.
    pub config: Config,
    pub root_dir: PathBuf,
    /// Image search directories from `\graphicspath`.
    pub graphics_paths: Vec<PathBuf>,
}

/// Run the document-understanding half of the pipeline.
pub fn convert(root: &Path, base_config: Config) -> Result<Conversion> {
    let mut diags = Diagnostics::new();

    tracing::info!(root = %root.display(), "loading project");
    let project = loader::load(root, &mut diags)?;

    let mut config = base_config;
    config.absorb_detected(
        project.preamble.environments.clone(),
        project.preamble.math_macros.clone(),
    );
    let mut meta = project.preamble.meta.clone();
    if let Some(title) = &config.title {
        meta.title = title.clone();
    }
    if let Some(author) = &config.author {
        meta.author = author.clone();
    }
    if let Some(date) = &config.date {
        meta.date = date.clone();
    }

    // The bibliography is independent of the body until resolution, so it
    // parses concurrently with lexing and parsing.
    let body = &project.body;
    let origins = &project.origins;
    let bib_files = &project.preamble.bib_files;
    let parse_config = &config;
    let docclass = project.preamble.meta.docclass.as_str();
    let (tree_result, (citations_result, bib_diags)) = std::thread::scope(|scope| {
        let bib_thread = scope.spawn(|| {
            let mut bib_diags = Diagnostics::new();
            let registry = bib::parse_files(bib_files, &mut bib_diags);
            (registry, bib_diags)
        });
        let tree = lexer::lex(body, origins)
            .and_then(|tokens| parser::parse_with_class(&tokens, parse_config, origins, docclass));
        let bib_output = match bib_thread.join() {
            Ok(output) => output,
            Err(panic) => std::panic::resume_unwind(panic),
        };
        (tree, bib_output)
    });
    let mut tree = tree_result?;
    diags.merge(bib_diags);
    let citations: CitationRegistry = citations_result?;

    tracing::info!(nodes = tree.len(), "document parsed");
    number::number(&mut tree, &config);
    let labels = resolve::resolve(&mut tree, &citations, &config, origins, &mut diags)?;
    tracing::info!(
        labels = labels.len(),
        citations = citations.len(),
        warnings = diags.len(),
        "resolution complete"
    );

    Ok(Conversion {
        ir: DocumentIr {
            meta,
            tree,
            labels,
            citations,
            origins: project.origins,
            diagnostics: diags,
        },
        config,
        root_dir: project.root_dir,
        graphics_paths: project.preamble.graphics_paths,
    })
}

/// Output generation options.
#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub output_dir: PathBuf,
    /// False skips the external diagram toolchain entirely.
    pub render_diagrams: bool,
}

/// Produce the site: staged images, rendered diagrams, `index.html`, and
/// a snapshot of the effective configuration. Returns the page path.
pub fn write_output(conversion: &mut Conversion, options: &OutputOptions) -> Result<PathBuf> {
    std::fs::create_dir_all(&options.output_dir)?;

    render::diagram::render_diagrams(
        &mut conversion.ir.tree,
        &conversion.ir.origins,
        &options.output_dir,
        options.render_diagrams,
        &mut conversion.ir.diagnostics,
    )?;

    let mut search_dirs = vec![conversion.root_dir.clone()];
    search_dirs.extend(conversion.graphics_paths.iter().cloned());
    render::stage_images(
        &mut conversion.ir.tree,
        &conversion.ir.origins,
        &search_dirs,
        &options.output_dir,
        &mut conversion.ir.diagnostics,
    )?;

    let html = render::render_document(&conversion.ir, &conversion.config);
    let index = options.output_dir.join("index.html");
    std::fs::write(&index, html)?;

    let snapshot = serde_json::to_string_pretty(&conversion.config)?;
    std::fs::write(options.output_dir.join("config.json"), snapshot)?;

    tracing::info!(page = %index.display(), "output written");
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diag::DiagKind;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    fn sample_project(dir: &Path) {
        write(
            dir,
            "main.tex",
            r#"\documentclass{book}
\title{Sample Book}
\author{A. Writer}
\addbibresource{refs.bib}
\newtheorem{theorem}{Theorem}[chapter]
\begin{document}
\chapter{Beginnings}\label{ch:begin}
\begin{theorem}\label{thm:one}
Every chapter starts somewhere, see \cite{knuth84}.
\end{theorem}
\input{chapters/two}
\end{document}
"#,
        );
        write(
            dir,
            "chapters/two.tex",
            "\\chapter{Continuations}\nBack to \\ref{thm:one} and on to \\ref{thm:ghost}.\n",
        );
        write(
            dir,
            "refs.bib",
            "@book{knuth84, author = {Donald E. Knuth}, title = {The TeXbook}, year = {1984}}",
        );
    }

    #[test]
    fn converts_a_multi_file_project() {
        let tmp = tempfile::tempdir().unwrap();
        sample_project(tmp.path());
        let conversion = convert(&tmp.path().join("main.tex"), Config::default()).unwrap();

        assert_eq!(conversion.ir.meta.title, "Sample Book");
        assert_eq!(conversion.ir.meta.docclass, "book");
        assert_eq!(
            conversion.ir.labels.get("thm:one").unwrap().number.as_deref(),
            Some("1.1")
        );
        assert!(conversion.ir.citations.get("knuth84").is_some());
        // Exactly one unresolved reference: thm:ghost.
        assert_eq!(
            conversion
                .ir
                .diagnostics
                .count(DiagKind::UnresolvedReference),
            1
        );
    }

    #[test]
    fn config_title_overrides_preamble() {
        let tmp = tempfile::tempdir().unwrap();
        sample_project(tmp.path());
        let config = Config::from_json_str(r#"{"title": "Renamed"}"#).unwrap();
        let conversion = convert(&tmp.path().join("main.tex"), config).unwrap();
        assert_eq!(conversion.ir.meta.title, "Renamed");
    }

    #[test]
    fn writes_a_complete_site() {
        let tmp = tempfile::tempdir().unwrap();
        sample_project(tmp.path());
        let out = tempfile::tempdir().unwrap();

        let mut conversion = convert(&tmp.path().join("main.tex"), Config::default()).unwrap();
        let index = write_output(
            &mut conversion,
            &OutputOptions {
                output_dir: out.path().to_path_buf(),
                render_diagrams: false,
            },
        )
        .unwrap();

        let html = fs::read_to_string(&index).unwrap();
        assert!(html.contains("Sample Book"));
        assert!(html.contains("Beginnings"));
        assert!(html.contains("[thm:ghost?]"));
        assert!(out.path().join("config.json").is_file());
    }
}
