use ch_backup_agent::backup::BackupPush;
use ch_backup_agent::config::{self, AppConfig};
use ch_backup_agent::database::create_source;
use ch_backup_agent::error::Result;
use ch_backup_agent::log;
use ch_backup_agent::upload::configure_uploader;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser)]
#[command(name = "ch-backup-agent", version, about = "ClickHouse backup tool")]
struct Cli {
    /// Config file (default is ~/.ch_backup/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Makes backup and uploads it to storage
    BackupPush,
    /// Connects to the database and reports what a backup would cover
    CheckConnection,
}

#[tokio::main]
async fn main() {
    log::init();
    let cli = Cli::parse();

    let token = CancellationToken::new();
    let ctrl_c_count = Arc::new(AtomicUsize::new(0));
    let handler_token = token.clone();

    let handler = ctrlc::set_handler(move || {
        let count = ctrl_c_count.fetch_add(1, Ordering::SeqCst);
        if count == 0 {
            eprintln!("\nShutdown signal received, cancelling uploads. Press Ctrl+C again to force exit...");
            handler_token.cancel();
        } else {
            eprintln!("\nForce exiting...");
            std::process::exit(130);
        }
    });
    if let Err(e) = handler {
        eprintln!("Error: could not install Ctrl+C handler: {}", e);
        std::process::exit(1);
    }

    let result = match load_config(cli.config.as_deref()) {
        Ok(config) => match cli.command {
            Command::BackupPush => backup_push(&config, token).await,
            Command::CheckConnection => check_connection(&config).await,
        },
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<AppConfig> {
    match path {
        Some(path) => config::load_from(path),
        None => config::load(),
    }
}

async fn backup_push(config: &AppConfig, token: CancellationToken) -> Result<()> {
    let uploader = configure_uploader(config, token)?;
    let source = create_source(&config.database);
    let report = BackupPush::new(source, uploader, config.backup.clone()).run().await?;
    info!(
        backup = %report.backup_name,
        tables = report.tables,
        "Backup finished in {} seconds",
        report.duration_secs
    );
    Ok(())
}

async fn check_connection(config: &AppConfig) -> Result<()> {
    let mut source = create_source(&config.database);
    source.connect().await?;
    let outcome: Result<()> = async {
        let data_root = source.data_root().await?;
        let tables = source.list_backup_targets().await?;
        info!(
            "{} data root {}, {} tables eligible for backup",
            source.engine_name(),
            data_root.display(),
            tables.len()
        );
        Ok(())
    }
    .await;
    source.close().await?;
    outcome
}
