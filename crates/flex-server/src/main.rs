use anyhow::Context;
use clap::{value_parser, Arg, Command};
use flex_core::telemetry::{self, LogFormat};
use flex_core::FlexTables;
use flex_server::config::ServerConfig;
use std::path::PathBuf;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Command::new("flextable-server")
        .version(flex_core::VERSION)
        .about("Flexible table engine HTTP server")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_parser(value_parser!(PathBuf))
                .help("Path to a TOML configuration file"),
        )
        .arg(
            Arg::new("bind-host")
                .long("bind-host")
                .help("Override http.bind_host"),
        )
        .arg(
            Arg::new("bind-port")
                .long("bind-port")
                .value_parser(value_parser!(u16))
                .help("Override http.bind_port"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_parser(value_parser!(LogFormat))
                .help("Log output: text or json"),
        );

    let matches = cli.get_matches();

    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => ServerConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(host) = matches.get_one::<String>("bind-host") {
        config.http.bind_host = host.clone();
    }
    if let Some(port) = matches.get_one::<u16>("bind-port") {
        config.http.bind_port = *port;
    }
    if let Some(format) = matches.get_one::<LogFormat>("log-format") {
        config.logging.format = *format;
    }

    telemetry::init(config.logging.format, &config.logging.level)?;
    let addr = config.socket_addr()?;

    let engine = FlexTables::new(config.engine.clone())?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let purge = engine.purge_worker().spawn(shutdown_rx);

    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
        }
        tracing::info!("Shutting down");
        let _ = shutdown_tx.send(true);
    };
    flex_server::run_server(engine, addr, shutdown)
        .await
        .with_context(|| format!("binding {addr}"))?;

    purge.await.context("purge worker panicked")?;
    Ok(())
}
