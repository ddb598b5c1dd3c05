//! texweave converts multi-file LaTeX book projects into navigable,
//! self-contained HTML.
//!
//! The pipeline mirrors how a reader understands a book rather than how
//! TeX typesets one:
//!
//! 1. [`loader`] flattens `\input`/`\include` trees into one stream,
//!    tracking per-line origins, and scans the preamble for metadata.
//! 2. [`lexer`] tokenizes the body, treating math and verbatim regions
//!    as opaque.
//! 3. [`parser`] builds an arena-backed document tree with an explicit
//!    open-scope stack; environment behavior comes from the
//!    [`config`] table.
//! 4. [`bib`] parses BibTeX databases (concurrently with parsing).
//! 5. [`number`] assigns deterministic display numbers.
//! 6. [`resolve`] collects labels and rewrites every reference to a
//!    link or a visible placeholder.
//! 7. [`render`] emits the HTML site, stages images, and shells out to
//!    a LaTeX engine for TikZ diagrams.
//!
//! Structural problems in the source (unbalanced braces, mismatched
//! environments, duplicate labels, include cycles) are fatal
//! [`Error`]s; everything about missing *content* (unknown references,
//! absent images, failed diagram renders) degrades to a placeholder
//! plus a [`diag::Diagnostic`] warning.
//!
//! ```no_run
//! use texweave::{pipeline, Config};
//!
//! # fn main() -> texweave::Result<()> {
//! let mut conversion = pipeline::convert("book/main.tex".as_ref(), Config::default())?;
//! let index = pipeline::write_output(
//!     &mut conversion,
//!     &pipeline::OutputOptions {
//!         output_dir: "site".into(),
//!         render_diagrams: true,
//!     },
//! )?;
//! println!("wrote {}", index.display());
//! # Ok(())
//! # }
//! ```

pub mod bib;
pub mod config;
pub mod diag;
pub mod error;
pub mod ir;
pub mod lexer;
pub mod loader;
pub mod number;
pub mod origin;
pub mod parser;
pub mod pipeline;
pub mod render;
pub mod resolve;

pub use config::Config;
pub use diag::{DiagKind, Diagnostic, Diagnostics};
pub use error::{Error, Result};
pub use ir::{DocumentIr, DocumentTree, NodeId, NodeKind};
pub use pipeline::{convert, write_output, Conversion, OutputOptions};
