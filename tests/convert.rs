//! End-to-end conversion of realistic multi-file projects.

use std::fs;
use std::path::Path;

use texweave::{pipeline, Config, DiagKind, Error, NodeKind};

fn write(dir: &Path, name: &str, content: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

fn book_project(dir: &Path) {
    write(
        dir,
        "main.tex",
        r#"\documentclass{book}
\title{Structures and Proofs}
\author{R. Author}
\date{2025}
\addbibresource{library.bib}
\newtheorem{theorem}{Theorem}[chapter]
\newtheorem{lemma}[theorem]{Lemma}[chapter]
\newcommand{\N}{\mathbb{N}}
\begin{document}
\input{chapters/one}
\include{chapters/two}
\end{document}
"#,
    );
    write(
        dir,
        "chapters/one.tex",
        r#"\chapter{Foundations}\label{ch:found}

\section{Numbers}\label{sec:numbers}
The set $\N$ is infinite; compare \ref{sec:orders} in chapter \ref{ch:next}.

\begin{theorem}\label{thm:infinite}
There is no largest natural number.
\begin{proof}
Add one.
\end{proof}
\end{theorem}

\begin{equation}\label{eq:succ}
s(n) = n + 1
\end{equation}

By \eqref{eq:succ} the successor is total.

\begin{align*}
a &= b \\
c &= d
\end{align*}

\section{Orders}\label{sec:orders}
Every chain has an upper bound~\cite{zorn35}.

\begin{lstlisting}[language=Rust]
fn succ(n: u64) -> u64 { n + 1 }
\end{lstlisting}

\begin{tikzpicture}
\draw (0,0) -- (1,1);
\end{tikzpicture}
"#,
    );
    write(
        dir,
        "chapters/two.tex",
        r#"\chapter{Continuations}\label{ch:next}

Back to \ref{thm:infinite} and \eqref{eq:succ}; both \cite{zorn35}
and \cite{knuth84} apply, but \ref{thm:missing} does not exist.

\begin{table}
\caption{Small cases}\label{tab:small}
\begin{tabular}{lr}
zero & 0 \\
one & 1
\end{tabular}
\end{table}

Run \verb|texweave main.tex| to rebuild, see Table \ref{tab:small}.
"#,
    );
    write(
        dir,
        "library.bib",
        r#"@article{zorn35,
  author  = {Max Zorn},
  title   = {A remark on method in transfinite algebra},
  journal = {Bull. Amer. Math. Soc.},
  year    = {1935},
}
@book{knuth84,
  author = {Donald E. Knuth},
  title  = {The TeXbook},
  year   = {1984},
}
"#,
    );
}

#[test]
fn full_book_converts_with_one_unresolved_reference() {
    let tmp = tempfile::tempdir().unwrap();
    book_project(tmp.path());

    let conversion =
        pipeline::convert(&tmp.path().join("main.tex"), Config::default()).unwrap();
    let ir = &conversion.ir;

    assert_eq!(ir.meta.title, "Structures and Proofs");
    assert_eq!(ir.meta.docclass, "book");

    // Numbers flow per chapter.
    let labels = &ir.labels;
    assert_eq!(labels.get("ch:found").unwrap().number.as_deref(), Some("1"));
    assert_eq!(
        labels.get("sec:orders").unwrap().number.as_deref(),
        Some("1.2")
    );
    assert_eq!(
        labels.get("thm:infinite").unwrap().number.as_deref(),
        Some("1.1")
    );
    assert_eq!(
        labels.get("eq:succ").unwrap().number.as_deref(),
        Some("1.1")
    );
    assert_eq!(
        labels.get("tab:small").unwrap().number.as_deref(),
        Some("2.1")
    );

    assert_eq!(ir.citations.len(), 2);
    assert!(ir.citations.get("zorn35").unwrap().author().is_some());

    // Only thm:missing fails to resolve, with exactly one warning.
    assert_eq!(ir.diagnostics.count(DiagKind::UnresolvedReference), 1);

    // The starred align block exists but is unnumbered.
    let unnumbered_math = ir
        .tree
        .walk(ir.tree.root())
        .filter(|&id| {
            matches!(
                ir.tree.node(id).kind,
                NodeKind::MathBlock {
                    display: true,
                    numbered: false,
                    ..
                }
            )
        })
        .count();
    assert_eq!(unnumbered_math, 1);
}

#[test]
fn site_output_is_complete_and_deterministic() {
    let tmp = tempfile::tempdir().unwrap();
    book_project(tmp.path());

    let render = |out: &Path| -> String {
        let mut conversion =
            pipeline::convert(&tmp.path().join("main.tex"), Config::default()).unwrap();
        let index = pipeline::write_output(
            &mut conversion,
            &pipeline::OutputOptions {
                output_dir: out.to_path_buf(),
                render_diagrams: false,
            },
        )
        .unwrap();
        fs::read_to_string(index).unwrap()
    };

    let out1 = tempfile::tempdir().unwrap();
    let out2 = tempfile::tempdir().unwrap();
    let html = render(out1.path());
    let again = render(out2.path());
    assert_eq!(html, again, "same input must produce identical pages");

    assert!(html.contains("Structures and Proofs"));
    assert!(html.contains("<strong>Theorem 1.1</strong>"));
    assert!(html.contains("href=\"#thm-infinite\""));
    assert!(html.contains("(1.1)"), "eqref renders in parentheses");
    assert!(html.contains("[thm:missing?]"));
    assert!(html.contains("language-Rust"));
    // Diagrams disabled: the TikZ source is shown instead.
    assert!(html.contains("no renderer available"));
    assert!(html.contains("Table 2.1"));
    assert!(html.contains("cite-zorn35"));
}

#[test]
fn duplicate_labels_across_files_are_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "main.tex",
        "\\begin{document}\n\\input{a}\n\\input{b}\n\\end{document}\n",
    );
    write(tmp.path(), "a.tex", "\\section{A}\\label{sec:dup}\n");
    write(tmp.path(), "b.tex", "\\section{B}\\label{sec:dup}\n");

    let err = pipeline::convert(&tmp.path().join("main.tex"), Config::default()).unwrap_err();
    match err {
        Error::DuplicateLabel { key, origin, first } => {
            assert_eq!(key, "sec:dup");
            // Both locations name their real file.
            assert!(origin.file.ends_with("b.tex"), "{origin}");
            assert!(first.file.ends_with("a.tex"), "{first}");
        }
        other => panic!("expected DuplicateLabel, got {other}"),
    }
}

#[test]
fn include_cycles_are_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    write(tmp.path(), "main.tex", "\\input{loop}\n");
    write(tmp.path(), "loop.tex", "\\input{main}\n");

    let err = pipeline::convert(&tmp.path().join("main.tex"), Config::default()).unwrap_err();
    assert!(matches!(err, Error::CyclicInclude { .. }), "{err}");
}

#[test]
fn mismatched_environments_across_includes_are_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "main.tex",
        "\\begin{document}\n\\begin{theorem}\n\\input{tail}\n\\end{document}\n",
    );
    write(tmp.path(), "tail.tex", "\\end{lemma}\n");

    let err = pipeline::convert(&tmp.path().join("main.tex"), Config::default()).unwrap_err();
    assert!(matches!(err, Error::MismatchedEnvironment { .. }), "{err}");
}

#[test]
fn book_class_rejects_subsection_without_a_chapter() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "main.tex",
        r#"\documentclass{book}
\begin{document}
\subsection{Orphan}
text
\end{document}
"#,
    );
    let err = pipeline::convert(&tmp.path().join("main.tex"), Config::default()).unwrap_err();
    assert!(
        matches!(err, Error::UnexpectedSectioningAtDepth { .. }),
        "{err}"
    );
}

#[test]
fn missing_include_degrades_to_a_warning() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "main.tex",
        "\\begin{document}\nbefore\n\\input{gone}\nafter\n\\end{document}\n",
    );
    let conversion =
        pipeline::convert(&tmp.path().join("main.tex"), Config::default()).unwrap();
    assert_eq!(conversion.ir.diagnostics.count(DiagKind::MissingInclude), 1);
}

#[test]
fn preamble_theorem_definitions_drive_numbering() {
    let tmp = tempfile::tempdir().unwrap();
    write(
        tmp.path(),
        "main.tex",
        r#"\documentclass{book}
\newtheorem{claim}{Claim}[chapter]
\begin{document}
\chapter{C}
\begin{claim}\label{cl:a}first\end{claim}
\begin{claim}\label{cl:b}second\end{claim}
\end{document}
"#,
    );
    let conversion =
        pipeline::convert(&tmp.path().join("main.tex"), Config::default()).unwrap();
    assert_eq!(
        conversion.ir.labels.get("cl:a").unwrap().number.as_deref(),
        Some("1.1")
    );
    assert_eq!(
        conversion.ir.labels.get("cl:b").unwrap().number.as_deref(),
        Some("1.2")
    );
}
