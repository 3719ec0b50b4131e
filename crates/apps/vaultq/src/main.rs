//! vaultq - query shell for a local mail archive
//!
//! Thin CLI over the vault query engines: list accounts, aggregate by a
//! dimension, list and search messages, show message detail, and rebuild
//! the columnar archive. Output is JSON, one document per invocation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use vault::{
    AggregateOptions, CancelToken, DuckDbEngine, MessageFilter, QueryEngine, SortDirection,
    SortField, SqliteEngine, StatsOptions, TimeGranularity, ViewType, parse_query,
};

#[derive(Parser)]
#[command(name = "vaultq", about = "Query a local mail archive", version)]
struct Cli {
    /// Row-store database path (defaults to the configured location)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Columnar archive directory (defaults to the configured location)
    #[arg(long, global = true)]
    archive_dir: Option<PathBuf>,

    /// Serve scans and aggregates from the columnar archive
    #[arg(long, global = true)]
    duckdb: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List accounts with message totals
    Accounts,
    /// Corpus totals, optionally restricted by a search query
    Stats {
        #[arg(long, default_value = "")]
        search: String,
        #[arg(long)]
        group_by: Option<String>,
    },
    /// Aggregate messages by a dimension
    Agg {
        /// senders, sender-names, recipients, recipient-names, domains,
        /// labels, or time
        view: String,
        #[arg(long, default_value = "count")]
        sort: String,
        #[arg(long, default_value = "desc")]
        dir: String,
        #[arg(long, default_value_t = 0)]
        limit: i64,
        #[arg(long, default_value = "month")]
        granularity: String,
        #[arg(long, default_value = "")]
        search: String,
        /// Drill-down: restrict to one sender address
        #[arg(long)]
        sender: Option<String>,
        /// Drill-down: restrict to one label
        #[arg(long)]
        label: Option<String>,
    },
    /// List message summaries
    Ls {
        #[arg(long)]
        sender: Option<String>,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        domain: Option<String>,
        /// Time bucket key: 2024, 2024-01, or 2024-01-15
        #[arg(long)]
        period: Option<String>,
        #[arg(long)]
        with_attachments: bool,
        #[arg(long)]
        hide_deleted: bool,
        #[arg(long, default_value_t = 0)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Gmail-style search (from:, label:, has:attachment, dates, text)
    Search {
        query: Vec<String>,
        #[arg(long, default_value_t = 0)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Show full message detail by source message id
    Show { gmail_id: String },
    /// Rebuild the columnar archive from the row store
    Archive {
        /// Accepted for symmetry; a rebuild always rewrites partitions
        #[arg(long)]
        rebuild: bool,
    },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    if let Err(e) = run() {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = config::VaultConfig::load()?;
    if let Some(db) = &cli.db {
        settings.db_path = db.clone();
    }
    if let Some(archive_dir) = &cli.archive_dir {
        settings.archive_dir = archive_dir.clone();
    }

    if let Command::Archive { .. } = &cli.command {
        let stats = vault::archive::build_archive(&settings.db_path, &settings.archive_dir)?;
        info!(
            "archive rebuilt: {} messages, {} partitions",
            stats.messages, stats.partitions
        );
        return Ok(());
    }

    let engine = open_engine(&cli, &settings)?;
    let cancel = CancelToken::new();

    match cli.command {
        Command::Accounts => {
            print_json(&engine.list_accounts(&cancel)?)?;
        }
        Command::Stats { search, group_by } => {
            let opts = StatsOptions {
                search_query: search,
                group_by: group_by.map(|s| s.parse::<ViewType>()).transpose()?,
                ..Default::default()
            };
            print_json(&engine.total_stats(&cancel, &opts)?)?;
        }
        Command::Agg {
            view,
            sort,
            dir,
            limit,
            granularity,
            search,
            sender,
            label,
        } => {
            let view: ViewType = view.parse()?;
            let opts = AggregateOptions {
                sort_by: sort.parse::<SortField>()?,
                sort_dir: dir.parse::<SortDirection>()?,
                limit,
                granularity: granularity.parse::<TimeGranularity>()?,
                search_query: search,
            };
            let filter = MessageFilter {
                sender,
                label,
                ..Default::default()
            };
            print_json(&engine.sub_aggregate(&cancel, &filter, view, &opts)?)?;
        }
        Command::Ls {
            sender,
            label,
            domain,
            period,
            with_attachments,
            hide_deleted,
            limit,
            offset,
        } => {
            let filter = MessageFilter {
                sender,
                label,
                domain,
                time_period: period,
                with_attachments_only: with_attachments,
                hide_deleted_from_source: hide_deleted,
                limit,
                offset,
                ..Default::default()
            };
            print_json(&engine.list_messages(&cancel, &filter)?)?;
        }
        Command::Search {
            query,
            limit,
            offset,
        } => {
            let parsed = parse_query(&query.join(" "));
            print_json(&engine.search(&cancel, &parsed, limit, offset)?)?;
        }
        Command::Show { gmail_id } => match engine.get_message_by_source_id(&cancel, &gmail_id)? {
            Some(detail) => print_json(&detail)?,
            None => anyhow::bail!("no message with id {gmail_id:?}"),
        },
        Command::Archive { .. } => unreachable!("handled above"),
    }

    Ok(())
}

fn open_engine(cli: &Cli, settings: &config::VaultConfig) -> Result<Box<dyn QueryEngine>> {
    let row = SqliteEngine::open(&settings.db_path)
        .with_context(|| format!("open row store at {}", settings.db_path.display()))?;

    if cli.duckdb {
        let columnar = DuckDbEngine::open(&settings.archive_dir, settings.threads)
            .with_context(|| format!("open archive at {}", settings.archive_dir.display()))?
            .with_row_store(Arc::new(row));
        return Ok(Box::new(columnar));
    }
    Ok(Box::new(row))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
