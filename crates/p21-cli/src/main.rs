//! p21 CLI - inspect ISO 10303-21 files
//!
//! Reads a STEP physical file and reports diagnostics, statistics, the
//! parsed entity graph or the raw token stream.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use p21_reader::{has_structural_errors, Diagnostic, Graph, Reader, ReaderOptions};
use serde::Serialize;
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "p21")]
#[command(about = "Reader and checker for ISO 10303-21 (STEP) files", long_about = None)]
struct Cli {
    /// TOML file with reader options
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print diagnostics; fails if the file is structurally invalid
    Check {
        /// Path to the .step / .stp file
        file: PathBuf,
    },
    /// Show counts of entities, references and scopes
    Stats {
        /// Path to the .step / .stp file
        file: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print every entity of the file
    Dump {
        /// Path to the .step / .stp file
        file: PathBuf,
        /// Print the whole graph and diagnostics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the token stream
    Tokens {
        /// Path to the .step / .stp file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let reader = build_reader(cli.config.as_deref())?;

    match cli.command {
        Commands::Check { file } => check(&reader, &file)?,
        Commands::Stats { file, json } => show_stats(&reader, &file, json)?,
        Commands::Dump { file, json } => dump(&reader, &file, json)?,
        Commands::Tokens { file } => show_tokens(&reader, &file)?,
    }

    Ok(())
}

fn build_reader(config: Option<&Path>) -> Result<Reader> {
    let options = match config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            ReaderOptions::from_toml_str(&text)
                .with_context(|| format!("loading options from {}", path.display()))?
        }
        None => ReaderOptions::default(),
    };
    Ok(Reader::new(options)?)
}

fn read(reader: &Reader, file: &Path) -> Result<(Graph, Vec<Diagnostic>)> {
    reader
        .read_path(file)
        .with_context(|| format!("reading {}", file.display()))
}

fn print_diagnostics(file: &Path, diagnostics: &[Diagnostic]) {
    for d in diagnostics {
        eprintln!("{}:{}", file.display(), d);
    }
}

fn check(reader: &Reader, file: &Path) -> Result<()> {
    let (graph, diagnostics) = read(reader, file)?;
    print_diagnostics(file, &diagnostics);

    let errors = diagnostics.iter().filter(|d| d.is_error()).count();
    let warnings = diagnostics.len() - errors;
    println!(
        "{}: {} entities, {} error(s), {} warning(s)",
        file.display(),
        graph.len(),
        errors,
        warnings
    );

    if has_structural_errors(&diagnostics) {
        anyhow::bail!("{} is not a valid exchange structure", file.display());
    }
    Ok(())
}

fn show_stats(reader: &Reader, file: &Path, json: bool) -> Result<()> {
    let (graph, diagnostics) = read(reader, file)?;
    let stats = graph.stats();

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("STEP file: {}", file.display());
    let schemas = graph.schema_names();
    if !schemas.is_empty() {
        println!("  Schema: {}", schemas.join(", "));
    }
    println!("  Header records: {}", stats.header_entities);
    println!("  Data sections: {}", stats.sections);
    println!("  Entities: {}", stats.entities);
    println!("  Complex entities: {}", stats.complex_entities);
    println!("  Parameters: {}", stats.parameters);
    println!("  References: {}", stats.references);
    println!("  Dangling references: {}", stats.dangling_references);
    println!("  Scopes: {}", stats.scopes);
    println!("  Diagnostics: {}", diagnostics.len());

    // Most common types first
    let mut counts = std::collections::BTreeMap::<&str, usize>::new();
    for entity in graph.entities.values() {
        for name in &entity.type_names {
            *counts.entry(name.as_str()).or_default() += 1;
        }
    }
    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
    if !counts.is_empty() {
        println!("\nTypes:");
        for (name, count) in counts.iter().take(20) {
            println!("  {count:>8}  {name}");
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct DumpOutput<'a> {
    graph: &'a Graph,
    diagnostics: &'a [Diagnostic],
}

fn dump(reader: &Reader, file: &Path, json: bool) -> Result<()> {
    let (graph, diagnostics) = read(reader, file)?;

    if json {
        let output = DumpOutput {
            graph: &graph,
            diagnostics: &diagnostics,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    print_diagnostics(file, &diagnostics);
    for header in &graph.header {
        println!("{}{:?}", header.type_name, header.parameters);
    }
    for entity in graph.in_file_order() {
        println!(
            "#{} = {}{:?}",
            entity.id,
            entity.type_names.join(" "),
            entity.parameters
        );
    }
    Ok(())
}

fn show_tokens(reader: &Reader, file: &Path) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let (tokens, diagnostics) = reader.tokens(&data);
    for token in &tokens {
        println!("{:>6}:{:<4} {:?} {:?}", token.pos.line, token.pos.column, token.kind, token.lexeme);
    }
    print_diagnostics(file, &diagnostics);
    Ok(())
}
