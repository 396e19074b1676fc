use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "chainlog",
    about = "chainlog: hash-chained audit ledger",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Ledger configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Ledger segment file; overrides the configured storage path
    #[arg(long, global = true)]
    pub ledger: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Record a new entry
    Append(AppendArgs),
    /// Verify chain integrity from genesis
    Verify(VerifyArgs),
    /// Show a single entry
    Show(ShowArgs),
    /// List recent entries
    Log(LogArgs),
    /// Show ledger statistics
    Stats(StatsArgs),
}

#[derive(Args)]
pub struct AppendArgs {
    #[arg(long)]
    pub document: String,
    #[arg(long)]
    pub actor: String,
    /// SHA-256 of the evidence, as 64 hex characters
    #[arg(long, required_unless_present = "file", conflicts_with = "file")]
    pub payload_hash: Option<String>,
    /// Hash this file's contents as the payload
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Metadata pair, repeatable
    #[arg(long = "meta", value_name = "KEY=VALUE", value_parser = parse_meta)]
    pub meta: Vec<(String, String)>,
}

#[derive(Args)]
pub struct VerifyArgs {}

#[derive(Args)]
pub struct ShowArgs {
    pub entry_id: String,
}

#[derive(Args)]
pub struct LogArgs {
    #[arg(long, conflicts_with = "actor")]
    pub document: Option<String>,
    #[arg(long)]
    pub actor: Option<String>,
    #[arg(short = 'n', long, default_value = "20")]
    pub limit: usize,
}

#[derive(Args)]
pub struct StatsArgs {}

fn parse_meta(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}
