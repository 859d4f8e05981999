use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use shelf_server::LogFormat;
use shelf_types::TimeUnit;

#[derive(Parser, Debug)]
#[command(name = "shelf", about = "Shelf, a library lending backend", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Default log filter when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Log output format; overrides the config file.
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP server and queue consumers
    Serve(ServeArgs),
    /// Quote the fine for a return without a running server
    Fine(FineArgs),
    /// Parse and validate a config file
    CheckConfig(CheckConfigArgs),
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Path to the TOML config file.
    #[arg(long, short = 'c', env = "SHELF_CONFIG")]
    pub config: Option<PathBuf>,

    /// Listen address; overrides `bind_addr` from the config.
    #[arg(long, env = "SHELF_BIND")]
    pub bind: Option<SocketAddr>,

    /// Queue WAL directory; overrides `data_dir` from the config.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct FineArgs {
    /// Due date (RFC 3339).
    #[arg(long)]
    pub due: DateTime<Utc>,

    /// Return time (RFC 3339). Defaults to now.
    #[arg(long)]
    pub returned: Option<DateTime<Utc>>,

    #[arg(long, default_value_t = 1000)]
    pub amount: i64,

    #[arg(long, default_value = "day")]
    pub unit: TimeUnit,

    #[arg(long, default_value_t = 1)]
    pub duration: i64,
}

#[derive(Args, Debug)]
pub struct CheckConfigArgs {
    #[arg(long, short = 'c', env = "SHELF_CONFIG")]
    pub config: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_serve_overrides() {
        let cli = Cli::try_parse_from([
            "shelf",
            "--log-format",
            "json",
            "serve",
            "--config",
            "shelf.toml",
            "--bind",
            "0.0.0.0:9000",
        ])
        .unwrap();
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.config, Some(PathBuf::from("shelf.toml")));
        assert_eq!(args.bind, Some("0.0.0.0:9000".parse().unwrap()));
    }

    #[test]
    fn parses_fine_quote() {
        let cli = Cli::try_parse_from([
            "shelf",
            "fine",
            "--due",
            "2024-01-01T00:00:00Z",
            "--returned",
            "2024-01-02T01:00:00Z",
            "--unit",
            "hour",
        ])
        .unwrap();
        let Command::Fine(args) = cli.command else {
            panic!("expected fine");
        };
        assert_eq!(args.unit, TimeUnit::Hour);
        assert_eq!(args.amount, 1000);
        assert!(args.returned.is_some());
    }

    #[test]
    fn rejects_unknown_unit() {
        assert!(Cli::try_parse_from(["shelf", "fine", "--due", "2024-01-01T00:00:00Z", "--unit", "week"]).is_err());
    }
}
