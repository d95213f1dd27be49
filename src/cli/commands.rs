//! CLI commands

use crate::config::Config;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// QueryLog-DB CLI
#[derive(Parser, Debug)]
#[command(name = "querylog-db")]
#[command(about = "Distinct-count and top-k lookups over search query logs")]
pub struct Cli {
    /// TOML configuration file (defaults to $QUERYLOG_CONFIG)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where the index comes from
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Tab-separated search log
    #[arg(short, long)]
    pub log_file: Option<PathBuf>,

    /// Snapshot to load if it exists, or to write after replaying the log
    #[arg(short, long)]
    pub snapshot: Option<PathBuf>,

    /// Queries retained per timestamp prefix
    #[arg(short = 'k', long)]
    pub k_max: Option<usize>,

    /// Build the index on all cores
    #[arg(long)]
    pub parallel: bool,

    /// Accept timestamps in any format
    #[arg(long)]
    pub no_validate: bool,
}

impl SourceArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(log_file) = &self.log_file {
            config.index.log_file = Some(log_file.clone());
        }
        if let Some(snapshot) = &self.snapshot {
            config.index.snapshot = Some(snapshot.clone());
        }
        if let Some(k_max) = self.k_max {
            config.index.k_max = k_max;
        }
        if self.parallel {
            config.index.parallel_build = true;
        }
        if self.no_validate {
            config.ingest.validate_timestamps = false;
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP query server
    Serve {
        #[command(flatten)]
        source: SourceArgs,
        /// Address to listen on
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Count distinct queries under a timestamp prefix
    Count {
        #[command(flatten)]
        source: SourceArgs,
        /// Timestamp prefix, e.g. "2015-08-01"
        #[arg(default_value = "")]
        prefix: String,
    },
    /// List the most popular queries under a timestamp prefix
    Popular {
        #[command(flatten)]
        source: SourceArgs,
        /// Timestamp prefix, e.g. "2015-08-01"
        #[arg(default_value = "")]
        prefix: String,
        /// Number of queries (capped to k_max)
        #[arg(short = 'n', long, default_value = "10")]
        size: usize,
    },
    /// Replay a log and write a snapshot of the index
    Snapshot {
        #[command(flatten)]
        source: SourceArgs,
        /// Snapshot file to write
        output: PathBuf,
    },
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration
    pub fn apply(&self, config: &mut Config) {
        if self.log_json {
            config.logging.json = true;
        }
        match &self.command {
            Commands::Serve { source, host, port } => {
                source.apply(config);
                if let Some(host) = host {
                    config.server.host = host.clone();
                }
                if let Some(port) = port {
                    config.server.port = *port;
                }
            }
            Commands::Count { source, .. }
            | Commands::Popular { source, .. }
            | Commands::Snapshot { source, .. } => source.apply(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_serve_overrides() {
        let cli = Cli::try_parse_from([
            "querylog-db",
            "serve",
            "--log-file",
            "hn_logs.tsv",
            "-k",
            "20",
            "--port",
            "9090",
            "--parallel",
        ])
        .unwrap();

        let mut config = Config::default();
        cli.apply(&mut config);

        assert_eq!(config.index.log_file, Some(PathBuf::from("hn_logs.tsv")));
        assert_eq!(config.index.k_max, 20);
        assert!(config.index.parallel_build);
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_popular_arguments() {
        let cli = Cli::try_parse_from([
            "querylog-db",
            "--log-json",
            "popular",
            "2015-08",
            "-n",
            "3",
            "--no-validate",
        ])
        .unwrap();

        let mut config = Config::default();
        cli.apply(&mut config);
        assert!(config.logging.json);
        assert!(!config.ingest.validate_timestamps);

        match cli.command {
            Commands::Popular { prefix, size, .. } => {
                assert_eq!(prefix, "2015-08");
                assert_eq!(size, 3);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
