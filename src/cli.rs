use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)] // requires `derive` feature
#[command(name = "unduper")]
#[command(about = "Moves one copy of each distinct file into a mirror tree", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Plan (or with --execute, apply) a dedup of SRC into DST
    Dedup(DedupArgs),
    /// Print the content identity of each file
    Hash(HashArgs),
    /// Summarise an action journal
    Journal {
        /// Journal file to read
        path: PathBuf,
    },
    /// Print configuration values
    PrintConfig,
}

#[derive(Debug, Args)]
pub struct DedupArgs {
    /// Source directory to deduplicate
    pub src: PathBuf,
    /// Destination root for retained files
    pub dst: PathBuf,
    /// Apply the plan instead of writing it to a plan file
    #[arg(long)]
    pub execute: bool,
    /// Record actions in this journal and resume from it
    #[arg(long, value_name = "PATH")]
    pub journal: Option<PathBuf>,
    /// Directory for dry-run plan files
    #[arg(long, value_name = "DIR")]
    pub plan_dir: Option<PathBuf>,
    /// Delete source files matching this glob instead of moving them
    #[arg(long = "delete", value_name = "GLOB")]
    pub delete_globs: Vec<String>,
    /// Write an xor-transformed copy of files matching this glob
    #[arg(long = "xor", value_name = "GLOB", requires = "xor_key")]
    pub xor_globs: Vec<String>,
    /// Key for --xor
    #[arg(long, value_name = "KEY")]
    pub xor_key: Option<String>,
}

#[derive(Debug, Args)]
pub struct HashArgs {
    /// Files to hash
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,
    /// Hash only the first and last BYTES of each file
    #[arg(long, value_name = "BYTES")]
    pub partial: Option<u64>,
}
