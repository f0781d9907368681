//! intercom-etl CLI - incremental Intercom conversation sync

use clap::{Parser, Subcommand};
use intercom_etl::config::{self, EtlConfig};
use intercom_etl::storage::schema;
use intercom_etl::ui::{self, Icons};
use intercom_etl::{conversation_pipeline, ConversationSync, IntercomClient, SqliteStore};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "intercom-etl")]
#[command(version = "0.0.1")]
#[command(about = "Incrementally copy Intercom conversations into SQLite")]
#[command(long_about = r#"
intercom-etl pulls every conversation updated since the last run from the
Intercom API and loads it, together with its parts, source, statistics,
rating and other nested objects, into a relational schema.

Example usage:
  intercom-etl init
  INTERCOM_API_TOKEN=... intercom-etl sync
  intercom-etl show 123456789
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a starter config file
    Init {
        /// Overwrite an existing config
        #[arg(long)]
        force: bool,
    },

    /// Print the SQL schema
    Schema,

    /// Drop and recreate every table
    Reset {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Load conversations updated since the last run
    Sync {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Intercom API base URL
        #[arg(long)]
        base_url: Option<String>,

        /// Attempts per request after the first failure
        #[arg(long)]
        retries: Option<usize>,

        /// Seconds to wait between attempts
        #[arg(long)]
        backoff: Option<u64>,
    },

    /// Show row counts per table
    Stats {
        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },

    /// Show a stored conversation and its parts
    Show {
        /// Intercom conversation id
        conversation_id: String,

        /// Path to the database file
        #[arg(short, long)]
        database: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let etl_config = config::load_config(Some(&config_path))?.unwrap_or_default();

    match cli.command {
        Commands::Init { force } => {
            config::write_config(&config_path, &EtlConfig::starter(), force)?;
            if cli.json {
                print_json(&json!({ "config": config_path.display().to_string() }))?;
            } else {
                ui::success(&format!("Wrote {}", config_path.display()));
            }
        }

        Commands::Schema => {
            for stmt in schema::all_schema_statements() {
                println!("{};\n", stmt.trim());
            }
        }

        Commands::Reset { database } => {
            let db_path = database.unwrap_or_else(|| etl_config.database_path());
            let store = open_store(&db_path)?;
            store.reset_schema()?;
            if cli.json {
                print_json(&json!({ "database": db_path.display().to_string(), "reset": true }))?;
            } else {
                ui::success(&format!("Recreated all tables in {}", db_path.display()));
            }
        }

        Commands::Sync { database, base_url, retries, backoff } => {
            let db_path = database.unwrap_or_else(|| etl_config.database_path());
            let mut retry = etl_config.retry_policy();
            if let Some(retries) = retries {
                retry.retries = retries;
            }
            if let Some(backoff) = backoff {
                retry.backoff = Duration::from_secs(backoff);
            }
            let base_url = base_url.unwrap_or_else(|| etl_config.base_url().to_string());

            let token = config::resolve_token(
                std::env::var(config::TOKEN_ENV).ok(),
                &etl_config.credentials_path(),
            )?;
            let client = IntercomClient::new(token)?
                .with_base_url(base_url)
                .with_retry(retry);
            let store = open_store(&db_path)?;

            if !cli.json {
                ui::header(&format!("Syncing Intercom conversations into {}", db_path.display()));
            }

            let started = Instant::now();
            let progress = if cli.json { indicatif::ProgressBar::hidden() } else { ui::sync_progress() };
            let mut ctx = ConversationSync::new(store, client).with_progress(progress);
            let summary = conversation_pipeline().execute(&mut ctx).await;
            let window = ctx.window();
            let store = ctx.into_store();

            let summary = match summary {
                Ok(summary) => summary,
                Err(err) => {
                    if !cli.json {
                        ui::error("Sync failed, no changes were written");
                    }
                    return Err(err.into());
                }
            };
            let watermark = store.max_conversation_updated_at()?;

            if cli.json {
                print_json(&json!({
                    "summary": summary,
                    "window": window,
                    "watermark": watermark,
                }))?;
            } else {
                ui::section(&format!("{} Sync summary", Icons::STATS));
                ui::summary_row("Conversations loaded:", &summary.processed.to_string());
                if summary.stopped_payloads > 0 {
                    ui::summary_row("Conversations skipped:", &summary.stopped_payloads.to_string());
                }
                if let Some(w) = window {
                    ui::summary_row("Window:", &format!("{} .. {}", w.start, w.end));
                }
                ui::summary_row("Watermark:", &watermark.to_string());
                ui::summary_row(
                    &format!("{} Elapsed:", Icons::CLOCK),
                    &format!("{:.1}s", started.elapsed().as_secs_f64()),
                );
                match summary.stopped_reason {
                    Some(reason) => ui::info("Stopped", &reason),
                    None => ui::success("Sync complete"),
                }
            }
        }

        Commands::Stats { database } => {
            let db_path = database.unwrap_or_else(|| etl_config.database_path());
            let store = open_store(&db_path)?;
            let stats = store.stats()?;

            if cli.json {
                print_json(&stats)?;
            } else {
                ui::header(&format!("{} {}", Icons::DATABASE, db_path.display()));
                println!("{}", ui::stats_table(&stats));
                ui::summary_row("Watermark:", &stats.watermark.to_string());
            }
        }

        Commands::Show { conversation_id, database } => {
            let db_path = database.unwrap_or_else(|| etl_config.database_path());
            let store = open_store(&db_path)?;

            let Some(conversation) = store.get_conversation(&conversation_id)? else {
                anyhow::bail!("conversation {} is not in {}", conversation_id, db_path.display());
            };
            let parts = store.conversation_parts(&conversation_id)?;

            if cli.json {
                print_json(&json!({ "conversation": conversation, "parts": parts }))?;
            } else {
                ui::header(&format!("{} Conversation {}", Icons::CHAT, conversation.id));
                if let Some(title) = &conversation.title {
                    ui::summary_row("Title:", title);
                }
                ui::summary_row("State:", conversation.state.as_deref().unwrap_or("-"));
                ui::summary_row("Updated at:", &conversation.updated_at.to_string());
                if let Some(admin) = &conversation.admin_assignee_id {
                    ui::summary_row("Admin assignee:", admin);
                }
                ui::section(&format!("Parts ({})", parts.len()));
                if parts.is_empty() {
                    ui::warn("No parts stored for this conversation");
                } else {
                    println!("{}", ui::parts_table(&parts));
                }
            }
        }
    }

    Ok(())
}

fn open_store(db_path: &Path) -> anyhow::Result<SqliteStore> {
    config::ensure_db_dir(db_path)?;
    tracing::debug!("Opening database {}", db_path.display());
    Ok(SqliteStore::open(db_path)?)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
