mod alert;
mod config;
mod logs;
mod monitoring;
mod store;
#[cfg(test)]
mod test_support;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use tracing::info;

use config::Config;
use logs::LogWriter;
use monitoring::validation::validate_check;
use monitoring::{HttpChecker, MonitoringExecutor, MonitoringScheduler, OutcomeProcessor, ScheduleConfig};
use store::{CHECKS, FileStore, RecordStore};

/// Background worker that probes users' checks and alerts on state changes
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Path to the worker config (defaults to ~/.config/uppe/worker.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the check and rotation loops until interrupted (default)
    Run,
    /// Run a single check cycle and a single rotation cycle, then exit
    Once,
    /// Manage stored checks
    Checks {
        #[command(subcommand)]
        action: ChecksCommand,
    },
    /// Inspect check logs
    Logs {
        #[command(subcommand)]
        action: LogsCommand,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Debug, Subcommand)]
enum ChecksCommand {
    /// List stored checks with their last known state
    List,
    /// Store a new check from a JSON file
    Add { path: PathBuf },
    /// Delete a stored check
    Remove { check_id: String },
}

#[derive(Debug, Subcommand)]
enum LogsCommand {
    /// List live log streams
    List {
        /// Include compressed archives
        #[arg(long)]
        archived: bool,
    },
    /// Print the content of a compressed archive
    Show { archive_id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_deref()).context("loading configuration")?;
    logger::init_with_level(&config.logging.level);

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&config).await,
        Command::Once => once(&config).await,
        Command::Checks { action } => {
            manage_checks(&FileStore::new(&config.storage.data_dir), action).await
        }
        Command::Logs { action } => inspect_logs(&config, action).await,
        Command::Config => {
            print!("{config}");
            Ok(())
        }
    }
}

fn build_scheduler(config: &Config) -> Result<Arc<MonitoringScheduler>> {
    let store: Arc<dyn RecordStore> = Arc::new(FileStore::new(&config.storage.data_dir));
    let logs = Arc::new(LogWriter::new(&config.storage.logs_dir));
    let dispatcher = alert::from_config(&config.alerts).context("building alert dispatcher")?;
    let checker = Arc::new(HttpChecker::new().context("building HTTP client")?);

    let processor = Arc::new(OutcomeProcessor::new(store.clone(), logs.clone(), dispatcher));
    let executor = Arc::new(MonitoringExecutor::new(store.clone(), checker, processor));

    Ok(Arc::new(MonitoringScheduler::new(
        store,
        executor,
        logs,
        ScheduleConfig {
            check_interval: config.worker.check_interval(),
            rotation_interval: config.worker.rotation_interval(),
        },
    )))
}

async fn prepare_logs_dir(config: &Config) -> Result<()> {
    LogWriter::new(&config.storage.logs_dir)
        .ensure_dir()
        .await
        .context("creating logs directory")
}

async fn run(config: &Config) -> Result<()> {
    prepare_logs_dir(config).await?;
    let scheduler = build_scheduler(config)?;

    info!(
        check_interval_secs = config.worker.check_interval_secs,
        rotation_interval_secs = config.worker.rotation_interval_secs,
        "background workers are running"
    );
    let handle = scheduler.start();

    tokio::signal::ctrl_c().await.context("waiting for shutdown signal")?;
    info!("shutting down, waiting for running cycles to finish");
    handle.stop().await;

    Ok(())
}

async fn once(config: &Config) -> Result<()> {
    prepare_logs_dir(config).await?;
    let scheduler = build_scheduler(config)?;

    let checks = scheduler.run_check_cycle().await;
    let rotation = scheduler.run_rotation_cycle().await;
    info!(?checks, ?rotation, "single run finished");

    Ok(())
}

async fn manage_checks(store: &FileStore, action: ChecksCommand) -> Result<()> {
    match action {
        ChecksCommand::List => {
            for id in store.list(CHECKS).await.context("listing checks")? {
                match describe_check(store, &id).await {
                    Ok(summary) => println!("{id}\t{summary}"),
                    Err(e) => println!("{id}\tinvalid: {e:#}"),
                }
            }
        }
        ChecksCommand::Add { path } => {
            let check_id = add_check(store, &path).await?;
            info!(check_id = %check_id, "check stored");
        }
        ChecksCommand::Remove { check_id } => {
            store
                .delete(CHECKS, &check_id)
                .await
                .with_context(|| format!("removing check {check_id}"))?;
            info!(check_id = %check_id, "check removed");
        }
    }

    Ok(())
}

async fn describe_check(store: &FileStore, check_id: &str) -> Result<String> {
    let check = validate_check(&store.read(CHECKS, check_id).await?)?;
    Ok(format!("{}\t{} {}://{}", check.state, check.method.as_str().to_uppercase(), check.protocol, check.url))
}

/// Validate the record in `path` and store it under its own id
async fn add_check(store: &FileStore, path: &Path) -> Result<String> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    let record: Value = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
    let check = validate_check(&record)?;

    store
        .create(CHECKS, &check.id, &record)
        .await
        .with_context(|| format!("storing check {}", check.id))?;
    Ok(check.id)
}

async fn inspect_logs(config: &Config, action: LogsCommand) -> Result<()> {
    let logs = LogWriter::new(&config.storage.logs_dir);

    match action {
        LogsCommand::List { archived } => {
            for id in logs.list(archived).await.context("listing logs")? {
                println!("{id}");
            }
        }
        LogsCommand::Show { archive_id } => {
            let content = logs
                .decompress(&archive_id)
                .await
                .with_context(|| format!("reading archive {archive_id}"))?;
            print!("{content}");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::store::StoreError;
    use tempfile::tempdir;

    const CHECK_ID: &str = "abcdefghij0123456789";

    fn write_record(dir: &Path, record: &Value) -> PathBuf {
        let path = dir.join("check.json");
        std::fs::write(&path, record.to_string()).unwrap();
        path
    }

    fn new_check() -> Value {
        json!({
            "id": CHECK_ID,
            "userPhone": "5551234567",
            "protocol": "https",
            "url": "example.com",
            "method": "get",
            "successCodes": [200],
            "timeoutSeconds": 3,
        })
    }

    #[test]
    fn test_checks_subcommands_parse() {
        let cli = Cli::try_parse_from(["uppe-worker", "checks", "add", "check.json"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Checks { action: ChecksCommand::Add { path } }) if path == Path::new("check.json")
        ));

        let cli = Cli::try_parse_from(["uppe-worker", "checks", "remove", CHECK_ID]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Command::Checks { action: ChecksCommand::Remove { check_id } }) if check_id == CHECK_ID
        ));
    }

    #[tokio::test]
    async fn test_add_then_remove_check() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join(".data"));
        let path = write_record(dir.path(), &new_check());

        assert_eq!(add_check(&store, &path).await.unwrap(), CHECK_ID);
        assert_eq!(store.read(CHECKS, CHECK_ID).await.unwrap(), new_check());
        assert!(describe_check(&store, CHECK_ID).await.unwrap().ends_with("GET https://example.com"));

        // Adding the same id again is refused
        let err = add_check(&store, &path).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<StoreError>(), Some(StoreError::AlreadyExists { .. })));

        manage_checks(&store, ChecksCommand::Remove { check_id: CHECK_ID.to_string() }).await.unwrap();
        assert!(store.list(CHECKS).await.unwrap().is_empty());
        assert!(manage_checks(&store, ChecksCommand::Remove { check_id: CHECK_ID.to_string() }).await.is_err());
    }

    #[tokio::test]
    async fn test_add_rejects_malformed_check() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path().join(".data"));

        let mut record = new_check();
        record["timeoutSeconds"] = json!(30);
        let path = write_record(dir.path(), &record);

        assert!(add_check(&store, &path).await.is_err());
        assert!(store.list(CHECKS).await.unwrap().is_empty());
    }
}
