use anyhow::Context;
use chrono::{DateTime, Utc};
use colored::Colorize;
use shelf_lending::fine::units_late;
use shelf_lending::FinePolicy;
use shelf_server::{ServerConfig, ShelfServer};
use tokio::signal;
use tracing::{info, warn};

use crate::cli::*;
use crate::logging::init_logging;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Serve(args) => cmd_serve(args, &cli.log_level, cli.log_format),
        Command::Fine(args) => cmd_fine(args),
        Command::CheckConfig(args) => cmd_check_config(args),
    }
}

fn load_config(args: &ServeArgs) -> anyhow::Result<ServerConfig> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(dir) = &args.data_dir {
        config.data_dir = Some(dir.clone());
    }
    Ok(config)
}

fn cmd_serve(
    args: ServeArgs,
    log_level: &str,
    log_format: Option<shelf_server::LogFormat>,
) -> anyhow::Result<()> {
    let config = load_config(&args)?;
    init_logging(log_level, log_format.unwrap_or(config.log_format));

    if config.tokens.is_empty() {
        warn!("no bearer tokens configured; every authenticated route will answer 401");
    }

    let runtime = tokio::runtime::Runtime::new().context("failed to start tokio runtime")?;
    runtime.block_on(run_server(config))
}

async fn run_server(config: ServerConfig) -> anyhow::Result<()> {
    let server = ShelfServer::build(config).context("failed to wire server")?;
    server
        .serve(shutdown_signal())
        .await
        .context("server terminated with an error")
}

/// Resolves on Ctrl+C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("shutdown signal received");
}

/// Blocks owed and the fine for one return.
pub(crate) fn quote_fine(policy: FinePolicy, due: DateTime<Utc>, returned: DateTime<Utc>) -> (i64, i64) {
    (
        units_late(due, returned, policy.unit, policy.duration),
        policy.fine(due, returned),
    )
}

fn cmd_fine(args: FineArgs) -> anyhow::Result<()> {
    let policy = FinePolicy {
        amount: args.amount,
        unit: args.unit,
        duration: args.duration,
    };
    let returned = args.returned.unwrap_or_else(Utc::now);
    let (blocks, fine) = quote_fine(policy, args.due, returned);

    println!("Due:      {}", args.due.to_rfc3339().cyan());
    println!("Returned: {}", returned.to_rfc3339().cyan());
    println!(
        "Policy:   {} per {} {}",
        policy.amount.to_string().bold(),
        policy.duration,
        policy.unit
    );
    if fine == 0 {
        println!("{} On time, no fine.", "✓".green().bold());
    } else {
        println!(
            "{} {} late block(s), fine {}",
            "!".red().bold(),
            blocks.to_string().yellow(),
            fine.to_string().red().bold()
        );
    }
    Ok(())
}

fn cmd_check_config(args: CheckConfigArgs) -> anyhow::Result<()> {
    let config = ServerConfig::load(&args.config)
        .with_context(|| format!("invalid config {}", args.config.display()))?;

    println!("{} {} is valid", "✓".green().bold(), args.config.display());
    println!("  Bind:     {}", config.bind_addr.to_string().bold());
    match &config.data_dir {
        Some(dir) => println!("  Queue:    {} ({})", "durable".green(), dir.display()),
        None => println!("  Queue:    {}", "in-memory".yellow()),
    }
    println!("  Timeout:  {}ms", config.request_timeout_ms);
    println!("  Tokens:   {}", config.tokens.len());
    println!("  Books:    {}", config.books.len());
    for (key, value) in config.settings_seed() {
        println!("  {} = {}", key.bold(), value);
    }
    Ok(())
}
