mod cli;
mod logging;
mod reporter;

use std::process;

use anyhow::Context;
use clap::{CommandFactory, Parser};
use cli::{Cli, Commands, DedupArgs, HashArgs};
use colored::*;
use dotenv::dotenv;
use reporter::CliReporter;
use tracing::{error, info, warn};
use unduper::classify::GlobRule;
use unduper::{AppConfig, ContentHasher, DedupEngine, HashMode, Journal};

fn main() {
    dotenv().ok();

    let code = {
        let _guard = logging::init_logger();
        match run() {
            Ok(()) => 0,
            Err(err) => {
                error!("Error: {:#}", err);
                1
            }
        }
    };

    process::exit(code);
}

fn run() -> anyhow::Result<()> {
    let config = unduper::config::load_configuration().context("Error loading configuration")?;
    let args = Cli::parse();

    match args.command {
        Some(Commands::Dedup(args)) => run_dedup(config, args),
        Some(Commands::Hash(args)) => run_hash(&config, args),
        Some(Commands::Journal { path }) => run_journal(path),
        Some(Commands::PrintConfig) => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        None => {
            let _ = Cli::command().print_long_help();
            Ok(())
        }
    }
}

fn run_dedup(config: AppConfig, args: DedupArgs) -> anyhow::Result<()> {
    let mut engine = DedupEngine::new(&args.src, &args.dst)
        .with_config(config)
        .with_dry_run(!args.execute);
    if let Some(journal) = args.journal {
        engine = engine.with_journal(journal);
    }
    if let Some(plan_dir) = args.plan_dir {
        engine = engine.with_plan_dir(plan_dir);
    }
    if !args.delete_globs.is_empty() {
        let globs: Vec<&str> = args.delete_globs.iter().map(String::as_str).collect();
        engine = engine.with_classifier(GlobRule::delete(&globs)?);
    }
    if !args.xor_globs.is_empty() {
        let globs: Vec<&str> = args.xor_globs.iter().map(String::as_str).collect();
        engine = engine.with_classifier(GlobRule::xor(&globs)?);
    }
    if let Some(key) = args.xor_key {
        engine = engine.with_xor_key(key.into_bytes());
    }

    let reporter = CliReporter::new();
    let outcome = engine
        .run(&reporter)
        .with_context(|| format!("Dedup of {} failed", args.src.display()))?;

    eprintln!();
    info!(
        "Scan: {}, Hash: {}, Plan: {}, Apply: {}",
        format!("{:.2}s", outcome.scan_duration.as_secs_f64()).green(),
        format!("{:.2}s", outcome.hash_duration.as_secs_f64()).green(),
        format!("{:.2}s", outcome.plan_duration.as_secs_f64()).green(),
        format!("{:.2}s", outcome.apply_duration.as_secs_f64()).green(),
    );
    info!(
        "{} files scanned, {} retained ({} bytes), {} duplicates left in place",
        format!("{}", outcome.files_scanned).cyan(),
        format!("{}", outcome.actions.len()).cyan(),
        format!("{}", outcome.bytes_retained).cyan(),
        format!("{}", outcome.duplicates).red(),
    );
    if outcome.renamed > 0 {
        warn!(
            "{} files were renamed with a fingerprint prefix to avoid a collision",
            outcome.renamed
        );
    }
    if outcome.resumed > 0 {
        info!("{} files were already applied by an earlier run", outcome.resumed);
    }
    match &outcome.plan_file {
        Some(plan) => info!(
            "Dry run only. Review {} and rerun with {}",
            plan.display().to_string().yellow(),
            "--execute".bold()
        ),
        None if outcome.dry_run => info!("Nothing to plan"),
        None => {}
    }

    Ok(())
}

fn run_hash(config: &AppConfig, args: HashArgs) -> anyhow::Result<()> {
    let mode = match args.partial {
        Some(window) => HashMode::Partial { window },
        None => HashMode::Full,
    };
    let hasher = ContentHasher::new(config.hash_algorithm)
        .with_chunk_size(config.chunk_size)
        .with_mode(mode);

    for path in &args.paths {
        let identity = hasher
            .hash(path)
            .with_context(|| format!("Error hashing {}", path.display()))?;
        println!(
            "{}  {:>12}  {}",
            identity.hex().unwrap_or_default(),
            identity.size,
            path.display()
        );
    }
    Ok(())
}

fn run_journal(path: std::path::PathBuf) -> anyhow::Result<()> {
    let journal =
        Journal::open(&path).with_context(|| format!("Error opening journal {}", path.display()))?;
    let index = journal.replay()?;

    if index.is_empty() {
        info!("{} has no entries", path.display());
        return Ok(());
    }
    info!(
        "{}: {} planned, {} applied, {} distinct contents retained",
        path.display(),
        format!("{}", index.planned_count()).cyan(),
        format!("{}", index.applied_count()).green(),
        index.retained().count(),
    );
    if index.skipped_rows() > 0 {
        warn!("{} unreadable rows were skipped", index.skipped_rows());
    }
    Ok(())
}
