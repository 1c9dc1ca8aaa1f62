use std::{
    collections::BTreeMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::Context as _;
use clap::{ArgAction, Parser, Subcommand};
use particle_composer::{
    Diagnostics, Document, EngineOpts, GenerateOpts, PreviewFrame, PreviewSession, Severity,
};
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "particle-composer", version)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Emit the Kotlin class for a document.
    Generate(GenerateArgs),
    /// Run the preview engine for a number of ticks.
    Preview(PreviewArgs),
    /// Validate structure and every script; fails on fatal diagnostics.
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
struct GenerateArgs {
    /// Input document JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output `.kt` path (stdout when omitted).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Kotlin package of the generated file.
    #[arg(long)]
    package: Option<String>,

    /// Class name (defaults to the document name + `Composition`).
    #[arg(long)]
    class_name: Option<String>,
}

#[derive(Parser, Debug)]
struct PreviewArgs {
    /// Input document JSON.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Number of ticks to simulate.
    #[arg(long)]
    ticks: u64,

    /// Output JSON path (stdout when omitted).
    #[arg(long)]
    out: Option<PathBuf>,

    /// Write full frames instead of per-card visible counts.
    #[arg(long)]
    frames: bool,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Input document JSON.
    #[arg(long = "in")]
    in_path: PathBuf,
}

#[derive(Serialize)]
struct TickSummary {
    tick: u64,
    visible: BTreeMap<String, usize>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::DEBUG,
        _ => tracing::Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.cmd {
        Command::Generate(args) => cmd_generate(args),
        Command::Preview(args) => cmd_preview(args),
        Command::Check(args) => cmd_check(args),
    }
}

fn read_doc_json(path: &Path) -> anyhow::Result<Document> {
    let f = File::open(path).with_context(|| format!("open document '{}'", path.display()))?;
    let r = BufReader::new(f);
    let doc: Document = serde_json::from_reader(r).with_context(|| "parse document JSON")?;
    Ok(doc)
}

fn write_output(out: Option<&Path>, text: &str) -> anyhow::Result<()> {
    let Some(path) = out else {
        print!("{text}");
        return Ok(());
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create output dir '{}'", parent.display()))?;
    }
    std::fs::write(path, text).with_context(|| format!("write '{}'", path.display()))?;
    eprintln!("wrote {}", path.display());
    Ok(())
}

fn print_diagnostics(diagnostics: &Diagnostics) {
    for d in diagnostics.items() {
        eprintln!("{d}");
    }
}

fn cmd_generate(args: GenerateArgs) -> anyhow::Result<()> {
    let doc = read_doc_json(&args.in_path)?;
    let mut opts = GenerateOpts {
        class_name: args.class_name,
        ..GenerateOpts::default()
    };
    if let Some(package) = args.package {
        opts.package = package;
    }
    let generated = particle_composer::generate(&doc, &opts);
    print_diagnostics(&generated.diagnostics);
    write_output(args.out.as_deref(), &generated.source)
}

fn cmd_preview(args: PreviewArgs) -> anyhow::Result<()> {
    let doc = read_doc_json(&args.in_path)?;
    let card_ids: Vec<String> = doc.cards.iter().map(|c| c.id.clone()).collect();
    let mut session = PreviewSession::new(doc, EngineOpts::default());
    let frames: Vec<PreviewFrame> = session.run(args.ticks);
    print_diagnostics(&session.take_diagnostics());

    let serialized = if args.frames {
        serde_json::to_string_pretty(&frames)
    } else {
        let summary: Vec<TickSummary> = frames
            .iter()
            .map(|f| TickSummary {
                tick: f.tick,
                visible: card_ids
                    .iter()
                    .filter_map(|id| Some((id.clone(), f.card_visible_count(id)?)))
                    .collect(),
            })
            .collect();
        serde_json::to_string_pretty(&summary)
    };
    let json = serialized.with_context(|| "serialize preview output")?;
    write_output(args.out.as_deref(), &format!("{json}\n"))
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<()> {
    let doc = read_doc_json(&args.in_path)?;
    let generated = particle_composer::generate(&doc, &GenerateOpts::default());
    let diagnostics = generated.diagnostics;
    print_diagnostics(&diagnostics);
    let fatal = diagnostics
        .items()
        .iter()
        .filter(|d| d.severity == Severity::Fatal)
        .count();
    if fatal > 0 {
        anyhow::bail!("{fatal} fatal diagnostic(s) in '{}'", args.in_path.display());
    }
    eprintln!(
        "ok: {} card(s), {} diagnostic(s)",
        doc.cards.len(),
        diagnostics.len()
    );
    Ok(())
}
