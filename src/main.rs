//! QueryLog-DB: Main entry point

use clap::Parser;
use querylog_db::api::serve;
use querylog_db::cli::{Cli, Commands};
use querylog_db::config::{Config, LoggingConfig};
use querylog_db::db::QueryLogDB;
use querylog_db::error::{Error, Result};
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "querylog-db.log";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    // Initialize tracing; the guard flushes buffered log lines on exit
    let _guard = init_tracing(&config.logging);
    config.validate()?;

    match cli.command {
        Commands::Serve { .. } => {
            let addr = config.server.socket_addr()?;
            let db = Arc::new(open_db(config).await?);
            serve(db, addr, shutdown_signal()).await
        }
        Commands::Count { prefix, .. } => {
            let db = open_db(config).await?;
            println!("{}", serde_json::to_string_pretty(&db.distinct_queries(&prefix))?);
            Ok(())
        }
        Commands::Popular { prefix, size, .. } => {
            let db = open_db(config).await?;
            println!("{}", serde_json::to_string_pretty(&db.popular_queries(&prefix, size))?);
            Ok(())
        }
        Commands::Snapshot { output, .. } => {
            let log_file = config.index.log_file.clone().ok_or_else(|| {
                Error::Configuration("snapshot needs a log file (--log-file)".to_string())
            })?;
            let db =
                tokio::task::spawn_blocking(move || QueryLogDB::from_log_file(log_file, &config))
                    .await??;
            db.save_snapshot(&output)?;
            println!(
                "Wrote {} ({} nodes, {} events, k_max {})",
                output.display(),
                db.index().node_count(),
                db.index().event_count(),
                db.k_max()
            );
            Ok(())
        }
    }
}

/// Build or load the index off the async runtime
async fn open_db(config: Config) -> Result<QueryLogDB> {
    tokio::task::spawn_blocking(move || QueryLogDB::open(&config)).await?
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Received Ctrl-C, shutting down");
    }
}

fn init_tracing(logging: &LoggingConfig) -> WorkerGuard {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    let (writer, guard) = match &logging.directory {
        Some(dir) => {
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX))
        }
        None => tracing_appender::non_blocking(std::io::stdout()),
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(writer);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
    guard
}
