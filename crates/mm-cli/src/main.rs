// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
//! `mockmeshctl`: a thin client over the mock server's admin API and the
//! on-disk backup mirror, for operators who want to inspect or replay a
//! mockmesh deployment without going through the control surface's HTTP API.

mod commands;
mod format;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use format::OutputFormat;
use mm_backup::BackupStore;
use mm_config::{load_config, MockmeshConfig};
use mm_mockclient::{MockClient, MockClientConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Exit code used for command failures; clap itself exits with 2 on usage errors.
const EXIT_RUNTIME_ERROR: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "mockmeshctl", version, about = "Operate a mockmesh deployment")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a mockmesh TOML configuration file, for defaults this CLI
    /// should share with a running daemon (mock server URL, backup path).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Mock server admin API base URL. Overrides the loaded config.
    #[arg(long, global = true)]
    mock_server_url: Option<String>,

    /// Backup store root directory. Overrides the loaded config.
    #[arg(long, global = true)]
    backup_path: Option<PathBuf>,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormatArg::Table)]
    format: OutputFormatArg,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormatArg {
    Json,
    JsonPretty,
    Table,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(v: OutputFormatArg) -> Self {
        match v {
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::JsonPretty => OutputFormat::JsonPretty,
            OutputFormatArg::Table => OutputFormat::Table,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Operate on mock-server mappings.
    #[command(subcommand)]
    Mappings(MappingsCommand),

    /// Inspect the mock server's request journal.
    #[command(subcommand)]
    Requests(RequestsCommand),

    /// Operate on the on-disk backup mirror.
    #[command(subcommand)]
    Backups(BackupsCommand),
}

#[derive(Subcommand, Debug)]
enum MappingsCommand {
    /// Lists registered mappings.
    List {
        /// Max mappings to return.
        #[arg(long, default_value_t = 100)]
        limit: u32,
        /// Offset into the result set.
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Fetches one mapping by id.
    Get {
        /// Mapping id.
        id: String,
    },
    /// Registers a mapping read from a JSON file, bypassing the collector.
    Create {
        /// Path to a JSON file containing one stub.
        file: PathBuf,
    },
    /// Deletes one mapping by id.
    Delete {
        /// Mapping id.
        id: String,
    },
    /// Deletes every mapping.
    Reset,
}

#[derive(Subcommand, Debug)]
enum RequestsCommand {
    /// Lists recently served requests.
    Recent {
        /// Max requests to return.
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Lists requests the mock server couldn't match to any mapping.
    Unmatched,
}

#[derive(Subcommand, Debug)]
enum BackupsCommand {
    /// Lists backup records.
    List {
        /// Restrict to backups of one mapping id.
        #[arg(long)]
        mapping_id: Option<String>,
        /// Only include backups within this many days.
        #[arg(long, default_value_t = 30)]
        days: u32,
    },
    /// Restores a backup file and replays it onto the mock server.
    Restore {
        /// Path relative to the backup store's root.
        relative_path: String,
    },
    /// Deletes every backup older than the retention window.
    Cleanup,
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug { EnvFilter::new("mockmeshctl=debug") } else { EnvFilter::new("mockmeshctl=warn") };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let result = run(cli);
    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

fn run(cli: Cli) -> Result<()> {
    let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().context("building tokio runtime")?;
    rt.block_on(run_async(cli))
}

fn loaded_config(config: Option<&std::path::Path>) -> MockmeshConfig {
    match config {
        Some(path) => load_config(Some(path)).unwrap_or_else(|err| {
            tracing::warn!(error = %err, "falling back to default configuration");
            MockmeshConfig::default()
        }),
        None => MockmeshConfig::default(),
    }
}

fn build_mock_client(cli: &Cli, config: &MockmeshConfig) -> MockClient {
    let base_url = cli.mock_server_url.clone().unwrap_or_else(|| config.mock_server_url.clone());
    MockClient::new(MockClientConfig {
        base_url,
        timeout: Duration::from_secs(config.mock_server_timeout),
        max_attempts: config.mock_server_retry_attempts,
        max_concurrent_requests: config.max_concurrent_requests,
    })
}

fn build_backup_store(cli: &Cli, config: &MockmeshConfig) -> Result<BackupStore> {
    let root = cli.backup_path.clone().unwrap_or_else(|| PathBuf::from(&config.backup_path));
    if root.as_os_str().is_empty() {
        anyhow::bail!("backups are disabled (no backup_path configured); pass --backup-path to override");
    }
    Ok(BackupStore::new(root, config.compress_backups, config.backup_retention_days))
}

async fn run_async(cli: Cli) -> Result<()> {
    let config = loaded_config(cli.config.as_deref());
    let format: OutputFormat = cli.format.into();

    match &cli.command {
        Commands::Mappings(sub) => {
            let client = build_mock_client(&cli, &config);
            match sub {
                MappingsCommand::List { limit, offset } => {
                    let stubs = commands::list_mappings(&client, *limit, *offset).await?;
                    println!("{}", format::format_mappings(format, &stubs));
                }
                MappingsCommand::Get { id } => {
                    let stub = commands::get_mapping(&client, id).await?;
                    println!("{}", format::format_mapping(format, &stub));
                }
                MappingsCommand::Create { file } => {
                    commands::create_mapping(&client, file).await?;
                    println!("created");
                }
                MappingsCommand::Delete { id } => {
                    commands::delete_mapping(&client, id).await?;
                    println!("deleted");
                }
                MappingsCommand::Reset => {
                    commands::reset_mappings(&client).await?;
                    println!("reset");
                }
            }
        }
        Commands::Requests(sub) => {
            let client = build_mock_client(&cli, &config);
            match sub {
                RequestsCommand::Recent { limit } => {
                    let requests = commands::recent_requests(&client, *limit).await?;
                    println!("{}", serde_json::to_string_pretty(&requests)?);
                }
                RequestsCommand::Unmatched => {
                    let requests = commands::unmatched_requests(&client).await?;
                    println!("{}", serde_json::to_string_pretty(&requests)?);
                }
            }
        }
        Commands::Backups(sub) => {
            let store = build_backup_store(&cli, &config)?;
            match sub {
                BackupsCommand::List { mapping_id, days } => {
                    let records = commands::list_backups(&store, mapping_id.as_deref(), *days).await?;
                    println!("{}", format::format_backups(format, &records));
                }
                BackupsCommand::Restore { relative_path } => {
                    let client = build_mock_client(&cli, &config);
                    let result = commands::restore_backup(&store, &client, relative_path).await?;
                    println!("{}", serde_json::to_string_pretty(&result)?);
                }
                BackupsCommand::Cleanup => {
                    let removed = commands::cleanup_backups(&store).await?;
                    println!("removed {removed} expired backups");
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_backup_store_rejects_empty_path() {
        let cli = Cli::parse_from(["mockmeshctl", "backups", "list"]);
        let mut config = MockmeshConfig::default();
        config.backup_path.clear();
        assert!(build_backup_store(&cli, &config).is_err());
    }
}
