use chrono::Local;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

mod analysis;
mod config;
mod discovery;
mod duplicates;
mod error;
mod extract;
mod report;
mod rewrite;
mod score;
mod similarity;
mod staleness;
mod structure;

use analysis::{analyze, AnalysisContext, Severity};
use config::Config;
use discovery::{discover, load_documents, resolve_workspace, WorkspaceLayout};
use rewrite::{Operation, Optimizer, RewriteOptions};

/// memopt - Analyze and optimize agent memory markdown files
#[derive(Parser)]
#[command(name = "memopt")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path (default: <workspace>/.memopt.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Quiet mode - suppress non-essential output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Verbose diagnostics on stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Report duplicates, stale entries and structural issues
    Analyze {
        /// Workspace directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,

        /// Save the report to a file instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Fix reported issues (dry run unless --apply)
    Optimize {
        /// Workspace directory
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Write changes to disk
        #[arg(long)]
        apply: bool,

        /// Copy each file to <file>.bak before modifying it
        #[arg(long)]
        backup: bool,

        /// Only run one operation
        #[arg(long, value_enum)]
        only: Option<Operation>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Analyze { path, json, output } => {
            cmd_analyze(&path, cli.config.as_deref(), json, output.as_deref(), cli.quiet)
        }
        Commands::Optimize { path, apply, backup, only } => {
            cmd_optimize(&path, cli.config.as_deref(), apply, backup, only, cli.quiet)
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "error".red().bold(), e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { LevelFilter::DEBUG } else { LevelFilter::WARN };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

fn cmd_analyze(
    path: &Path,
    config_path: Option<&Path>,
    json: bool,
    output: Option<&Path>,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let start = Instant::now();
    let workspace = resolve_workspace(path)?;
    let config = Config::load(&workspace, config_path)?;

    // JSON output stays machine-readable on stdout
    let chatty = !quiet && !json;

    if chatty {
        println!("{} {}", "Scanning".cyan().bold(), workspace.display());
    }

    let candidates = discover(&workspace, &config)?;
    let loaded = load_documents(&candidates);
    for warning in &loaded.warnings {
        eprintln!("{}: {}", "warning".yellow().bold(), warning);
    }

    let layout = WorkspaceLayout::probe(&workspace, &config);
    let ctx = AnalysisContext::new(&config, layout, Local::now().naive_local());

    let Some(analysis) = analyze(&loaded, &ctx)? else {
        if !quiet {
            println!("{}", "No memory files found.".yellow());
        }
        return Ok(());
    };

    if chatty {
        println!(
            "Found {} memory files ({:.1} KB total)",
            analysis.stats.files_scanned.to_string().cyan(),
            analysis.stats.total_bytes as f64 / 1024.0
        );
        println!();
        let score_text = format!("{}/100", analysis.score);
        let score_text = match score::score_band(analysis.score) {
            "good" => score_text.green().bold(),
            "fair" => score_text.yellow().bold(),
            _ => score_text.red().bold(),
        };
        println!("Memory Efficiency Score: {}", score_text);
        println!();
        println!("Issues found:");
        println!("  {:<12}{}", "Critical:".red(), analysis.count(Severity::Critical));
        println!("  {:<12}{}", "Warning:".yellow(), analysis.count(Severity::Warning));
        println!("  {:<12}{}", "Suggestion:".green(), analysis.count(Severity::Suggestion));
        println!("  {:<12}{:.2?}", "Elapsed:".dimmed(), start.elapsed());
    }

    let rendered = if json {
        report::render_json(&analysis)?
    } else {
        let generated_at = Local::now().format("%Y-%m-%d %H:%M").to_string();
        report::render_markdown(&analysis, &workspace, &generated_at)
    };

    match output {
        Some(out) => {
            fs::write(out, &rendered).map_err(|source| error::MemoptError::Write {
                path: out.to_path_buf(),
                source,
            })?;
            if !quiet {
                println!();
                println!("{} {}", "Report saved to".green(), out.display().to_string().cyan());
                println!("Run `memopt optimize --apply` to fix issues.");
            }
        }
        None => {
            if chatty {
                println!();
                println!("{}", "=".repeat(60).dimmed());
            }
            println!("{}", rendered);
        }
    }

    Ok(())
}

fn cmd_optimize(
    path: &Path,
    config_path: Option<&Path>,
    apply: bool,
    backup: bool,
    only: Option<Operation>,
    quiet: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let workspace = resolve_workspace(path)?;
    let config = Config::load(&workspace, config_path)?;
    let dry_run = !apply;

    let candidates = discover(&workspace, &config)?;
    if candidates.is_empty() {
        if !quiet {
            println!("{}", "No memory files found.".yellow());
        }
        return Ok(());
    }

    if !quiet {
        println!("{} {}", "Workspace:".cyan().bold(), workspace.display());
        let mode = if dry_run { "DRY RUN".yellow() } else { "APPLYING CHANGES".red().bold() };
        println!("Mode:   {}", mode);
        println!("Backup: {}", if backup { "yes" } else { "no" });
        println!();
    }

    let options = RewriteOptions::new(&config, dry_run, backup, Local::now().naive_local());
    let mut optimizer = Optimizer::new(candidates, options);

    let operations: Vec<Operation> = match only {
        Some(op) => vec![op],
        None => Operation::ALL.to_vec(),
    };

    for op in operations {
        match optimizer.run(op) {
            Ok(count) => {
                if !quiet {
                    println!("{}", headline(op, count, dry_run));
                }
            }
            Err(e) => {
                eprintln!("{}: {} failed: {}", "error".red().bold(), op.name(), e);
            }
        }
    }

    tracing::debug!(records = optimizer.report().records.len(), "rewrite finished");
    let report = optimizer.into_report();

    if !quiet {
        println!();
        println!("{}", "Summary".green().bold());
        println!("  Files modified:   {}", report.files_modified.to_string().cyan());
        println!("  Bytes saved:      {}", report.bytes_saved.to_string().cyan());
        if !report.changes.is_empty() {
            println!("  Changes:");
            for change in &report.changes {
                println!("    {}", change);
            }
        }
        if !report.warnings.is_empty() {
            println!("  Skipped:");
            for warning in &report.warnings {
                println!("    {}", warning);
            }
        }
        if dry_run {
            println!();
            println!("{}", "This was a dry run. Use --apply to make changes.".dimmed());
        }
    }

    if !report.failures.is_empty() {
        return Err(format!("{} operation(s) failed: {}", report.failures.len(), report.failures.join("; ")).into());
    }

    Ok(())
}

fn headline(op: Operation, count: usize, dry_run: bool) -> String {
    let verb = |would: &'static str, did: &'static str| if dry_run { would } else { did };
    match (op, count) {
        (Operation::Dedup, 0) => format!("{} No duplicates to remove", "dedup:".cyan()),
        (Operation::Dedup, n) => format!("{} {} {} duplicate entries", "dedup:".cyan(), verb("Would remove", "Removed"), n),
        (Operation::Reindex, 0) => format!("{} No files need a table of contents", "reindex:".cyan()),
        (Operation::Reindex, n) => format!("{} {} a table of contents to {} files", "reindex:".cyan(), verb("Would add", "Added"), n),
        (Operation::Stale, 0) => format!("{} No stale entries to archive", "stale:".cyan()),
        (Operation::Stale, n) => format!("{} {} {} stale entries", "stale:".cyan(), verb("Would archive", "Archived"), n),
        (Operation::Structure, 0) => format!("{} No structure issues to fix", "structure:".cyan()),
        (Operation::Structure, n) => format!("{} {} {} files", "structure:".cyan(), verb("Would fix", "Fixed"), n),
    }
}
