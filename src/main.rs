//! Command-line interface for texweave.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use texweave::{pipeline, Config, DiagKind};

/// Convert a LaTeX book project into a navigable HTML site.
#[derive(Parser, Debug)]
#[command(name = "texweave", version, about)]
struct Cli {
    /// Root .tex file of the project.
    input: PathBuf,

    /// Output directory for the generated site.
    #[arg(short, long, default_value = "site")]
    output: PathBuf,

    /// JSON configuration file (layered over preamble detection).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Skip the external LaTeX/pdftoppm diagram toolchain; TikZ blocks
    /// are shown as source.
    #[arg(long)]
    no_diagrams: bool,

    /// Print document statistics instead of writing output.
    #[arg(long)]
    info: bool,

    /// Only log errors.
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = if cli.quiet { "error" } else { "texweave=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> texweave::Result<ExitCode> {
    let config = match &cli.config {
        Some(path) => Config::from_json_file(path)?,
        None => Config::default(),
    };

    let mut conversion = pipeline::convert(&cli.input, config)?;

    if cli.info {
        print_info(&conversion);
        return Ok(ExitCode::SUCCESS);
    }

    let index = pipeline::write_output(
        &mut conversion,
        &pipeline::OutputOptions {
            output_dir: cli.output.clone(),
            render_diagrams: !cli.no_diagrams,
        },
    )?;

    let diags = &conversion.ir.diagnostics;
    if !diags.is_empty() && !cli.quiet {
        eprintln!("{} warning(s):", diags.len());
        for diag in diags.iter() {
            eprintln!("  {diag}");
        }
    }
    println!("{}", index.display());
    Ok(ExitCode::SUCCESS)
}

fn print_info(conversion: &pipeline::Conversion) {
    let ir = &conversion.ir;
    let meta = &ir.meta;
    if !meta.title.is_empty() {
        println!("Title:      {}", meta.title);
    }
    if !meta.author.is_empty() {
        println!("Author:     {}", meta.author);
    }
    if !meta.docclass.is_empty() {
        println!("Class:      {}", meta.docclass);
    }
    let mut chapters = 0usize;
    let mut sections = 0usize;
    let mut environments = 0usize;
    let mut equations = 0usize;
    for id in ir.tree.walk(ir.tree.root()) {
        match &ir.tree.node(id).kind {
            texweave::NodeKind::Heading { level, .. } => {
                if *level == texweave::ir::SectionLevel::Chapter {
                    chapters += 1;
                } else {
                    sections += 1;
                }
            }
            texweave::NodeKind::Environment { .. } => environments += 1,
            texweave::NodeKind::MathBlock { display: true, .. } => equations += 1,
            _ => {}
        }
    }
    println!("Chapters:   {chapters}");
    println!("Sections:   {sections}");
    println!("Blocks:     {environments}");
    println!("Equations:  {equations}");
    println!("Labels:     {}", ir.labels.len());
    println!("Citations:  {}", ir.citations.len());
    println!(
        "Unresolved: {}",
        ir.diagnostics.count(DiagKind::UnresolvedReference)
    );
}
