mod cli;
mod config;
mod error;

use std::sync::Arc;

use clap::Parser;
use confsmith_engine::{run_startup, Backend, EngineConfig, PluginRegistry};
use confsmith_server::{serve, ServerState};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::error::{CliError, ExitCode};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    if let Err(e) = init_logging(&cli.log) {
        eprintln!("confsmith: {e}");
        std::process::exit(ExitCode::ConfigError as i32);
    }

    match run(cli).await {
        Ok(()) => std::process::exit(ExitCode::Success as i32),
        Err(e) => {
            for line in e.details() {
                tracing::error!("{line}");
            }
            std::process::exit(e.exit_code() as i32);
        }
    }
}

fn init_logging(destination: &str) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if destination == "stderr" {
        builder.with_writer(std::io::stderr).init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(destination)
            .map_err(|e| format!("cannot open log file {destination}: {e}"))?;
        builder.with_writer(Arc::new(file)).with_ansi(false).init();
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let file_config = config::load_config(cli.config.as_deref())?;
    let settings = config::resolve(file_config, &cli)?;
    tracing::info!(
        socket = %settings.socket_path,
        family = %settings.socket_family,
        startup_mode = %settings.startup_mode,
        "confsmith backend starting"
    );

    let schema = config::load_schema_dir(&settings.schema_dir)?;
    tracing::info!(
        modules = schema.modules().len(),
        fingerprint = %schema.fingerprint(),
        "schema loaded"
    );

    let engine_config = EngineConfig {
        startup_mode: settings.startup_mode,
        modstate_enabled: settings.modstate_enabled,
        pretty: settings.pretty,
    };
    let backend = Backend::new(
        engine_config,
        schema,
        &settings.db_dir,
        PluginRegistry::with_builtins(),
    )?;

    let report = run_startup(&backend, cli.extra_config.as_deref())?;
    tracing::info!(
        mode = %report.mode,
        outcome = ?report.outcome,
        extra_xml = report.extra_xml_merged,
        "startup pipeline finished"
    );

    let state = Arc::new(ServerState::new(
        backend,
        settings.stream_discovery_rfc8040,
        settings.stream_discovery_rfc5277,
    ));

    // Signal handling is confined to this narrow shutdown handle.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
        }
    });

    serve(
        state,
        settings.socket_family,
        &settings.socket_path,
        shutdown_rx,
    )
    .await?;
    Ok(())
}
