use std::collections::VecDeque;
use std::fs;
use std::process::ExitCode;

use anyhow::{bail, Context};
use chainlog_crypto::ChainHasher;
use chainlog_ledger::{
    AuditLedger, EntryStream, LedgerConfig, LedgerStatistics, StorageBackend, VerificationResult,
};
use chainlog_store::LedgerStore;
use chainlog_types::{Digest, EntryId, LedgerEntry, Metadata};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde_json::json;
use tracing::debug;

use crate::cli::*;

/// How a command finished, beyond plain success.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Ok,
    ChainBroken,
}

impl From<Status> for ExitCode {
    fn from(status: Status) -> Self {
        match status {
            Status::Ok => ExitCode::SUCCESS,
            Status::ChainBroken => ExitCode::from(2),
        }
    }
}

type Ledger = AuditLedger<Box<dyn LedgerStore>>;

pub fn run_command(cli: Cli) -> anyhow::Result<Status> {
    let mut config = load_config(&cli)?;
    // Read-only commands must work on a broken ledger; only writes insist on
    // a verified chain.
    if !matches!(cli.command, Command::Append(_)) {
        config.verification.verify_on_open = false;
    }
    debug!(
        backend = ?config.storage.backend,
        path = %config.storage.path.display(),
        "opening ledger"
    );
    let ledger = AuditLedger::open(&config).context("failed to open ledger")?;

    match cli.command {
        Command::Append(args) => cmd_append(&ledger, args, cli.format),
        Command::Verify(_) => cmd_verify(&ledger, cli.format),
        Command::Show(args) => cmd_show(&ledger, args, cli.format),
        Command::Log(args) => cmd_log(&ledger, args, cli.format),
        Command::Stats(_) => cmd_stats(&ledger, cli.format),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<LedgerConfig> {
    let mut config = match &cli.config {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };
    if let Some(path) = &cli.ledger {
        config.storage.backend = StorageBackend::File;
        config.storage.path = path.clone();
    }
    Ok(config)
}

fn cmd_append(ledger: &Ledger, args: AppendArgs, format: OutputFormat) -> anyhow::Result<Status> {
    let payload_hash = match (&args.payload_hash, &args.file) {
        (Some(hex), _) => {
            Digest::from_hex(hex).with_context(|| format!("invalid payload hash {hex:?}"))?
        }
        (None, Some(path)) => {
            let content =
                fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
            ChainHasher::sha256(&content)
        }
        (None, None) => bail!("one of --payload-hash or --file is required"),
    };
    let metadata: Metadata = args.meta.into_iter().collect();

    let entry = ledger.append(&args.document, &args.actor, payload_hash, metadata)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entry)?),
        OutputFormat::Text => {
            println!("{} Entry appended", "✓".green().bold());
            print_entry(&entry);
        }
    }
    Ok(Status::Ok)
}

fn cmd_verify(ledger: &Ledger, format: OutputFormat) -> anyhow::Result<Status> {
    let result = ledger.verify()?;
    match (&result, format) {
        (VerificationResult::Valid { entries_checked }, OutputFormat::Json) => {
            println!("{}", json!({ "status": "valid", "entries_checked": entries_checked }));
        }
        (
            VerificationResult::Broken {
                sequence_id,
                entry_id,
                reason,
            },
            OutputFormat::Json,
        ) => {
            println!(
                "{}",
                json!({
                    "status": "broken",
                    "sequence_id": sequence_id,
                    "entry_id": entry_id,
                    "reason": reason.as_str(),
                })
            );
        }
        (VerificationResult::Valid { entries_checked }, OutputFormat::Text) => {
            println!("{} Ledger chain intact", "✓".green().bold());
            println!("  Entries checked: {}", entries_checked.to_string().bold());
        }
        (
            VerificationResult::Broken {
                sequence_id,
                entry_id,
                reason,
            },
            OutputFormat::Text,
        ) => {
            println!("{} Ledger chain broken", "✗".red().bold());
            println!("  At seq:  {}", format!("#{sequence_id}").yellow());
            println!("  Entry:   {entry_id}");
            println!("  Reason:  {}", reason.as_str().red());
        }
    }

    Ok(if result.is_valid() {
        Status::Ok
    } else {
        Status::ChainBroken
    })
}

fn cmd_show(ledger: &Ledger, args: ShowArgs, format: OutputFormat) -> anyhow::Result<Status> {
    let entry_id: EntryId = args
        .entry_id
        .parse()
        .with_context(|| format!("invalid entry id {:?}", args.entry_id))?;
    let entry = ledger.get_entry(&entry_id)?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entry)?),
        OutputFormat::Text => print_entry(&entry),
    }
    Ok(Status::Ok)
}

fn cmd_log(ledger: &Ledger, args: LogArgs, format: OutputFormat) -> anyhow::Result<Status> {
    let stream: EntryStream<'_> = match (&args.document, &args.actor) {
        (Some(document_id), _) => ledger.query_by_document(document_id)?,
        (None, Some(actor_id)) => ledger.query_by_actor(actor_id)?,
        (None, None) => ledger.query_range(1, u64::MAX)?,
    };

    let recent = most_recent(stream, args.limit)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&recent)?),
        OutputFormat::Text if recent.is_empty() => println!("No entries."),
        OutputFormat::Text => {
            for entry in &recent {
                println!(
                    "{} {} {} doc={} actor={}",
                    format!("#{}", entry.sequence_id).yellow().bold(),
                    entry.chain_hash.short_hex().dimmed(),
                    entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                    entry.document_id.cyan(),
                    entry.actor_id,
                );
            }
        }
    }
    Ok(Status::Ok)
}

/// The last `limit` entries of `stream`, newest first.
fn most_recent(stream: EntryStream<'_>, limit: usize) -> anyhow::Result<Vec<LedgerEntry>> {
    if limit == 0 {
        return Ok(Vec::new());
    }
    let mut recent = VecDeque::with_capacity(limit);
    for entry in stream {
        if recent.len() == limit {
            recent.pop_front();
        }
        recent.push_back(entry?);
    }
    Ok(recent.into_iter().rev().collect())
}

fn cmd_stats(ledger: &Ledger, format: OutputFormat) -> anyhow::Result<Status> {
    let stats = ledger.statistics()?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => print_stats(&stats),
    }
    Ok(Status::Ok)
}

fn print_entry(entry: &LedgerEntry) {
    println!("  Seq:       {}", format!("#{}", entry.sequence_id).yellow().bold());
    println!("  Entry:     {}", entry.entry_id);
    println!("  Document:  {}", entry.document_id.cyan());
    println!("  Actor:     {}", entry.actor_id);
    println!("  Payload:   {}", entry.payload_hash);
    println!("  Previous:  {}", entry.previous_hash.to_string().dimmed());
    println!("  Chain:     {}", entry.chain_hash.to_string().green());
    println!("  Created:   {}", entry.created_at.to_rfc3339());
    for (key, value) in &entry.metadata {
        println!("  Meta:      {}={}", key.bold(), value);
    }
}

fn print_stats(stats: &LedgerStatistics) {
    let timestamp = |ts: Option<DateTime<Utc>>| {
        ts.map_or_else(|| "-".to_string(), |ts| ts.to_rfc3339())
    };
    println!("Entries:       {}", stats.total_entries.to_string().bold());
    println!("Chain length:  {}", stats.chain_length);
    println!("First entry:   {}", timestamp(stats.first_entry_timestamp));
    println!("Last entry:    {}", timestamp(stats.last_entry_timestamp));
}
