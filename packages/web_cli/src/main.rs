use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Mutex;
use term_session::{KeyDecoder, ProtocolMode};
use tracing::info;

mod app;
mod config;
mod connection;
mod greeting;
mod terminal;

use crate::app::App;
use crate::config::{CliOverrides, ClientConfig};
use crate::terminal::RawMode;

#[derive(Parser)]
#[command(name = "web-cli")]
#[command(about = "Terminal client for a remote command-execution server")]
struct Cli {
    /// WebSocket endpoint (default: ws://localhost:8080/ws)
    #[arg(long)]
    url: Option<String>,

    /// Path to config.toml (defaults to the platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Server framing
    #[arg(long, value_enum)]
    protocol: Option<ProtocolMode>,

    /// Delay before each reconnect attempt, in milliseconds
    #[arg(long)]
    reconnect_delay_ms: Option<u64>,

    /// Skip the typewriter greeting
    #[arg(long)]
    no_greeting: bool,

    /// Write logs here instead of the default log file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Cli {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            url: self.url.clone(),
            reconnect_delay_ms: self.reconnect_delay_ms,
            greeting: self.no_greeting.then_some(false),
            protocol: self.protocol,
            log_file: self.log_file.clone(),
        }
    }
}

/// Route tracing to a file: stdout is the terminal surface, and raw mode
/// would garble anything interleaved on stderr.
fn init_logging(config: &ClientConfig, debug: bool) -> Result<()> {
    let default_directive = if debug {
        "web_cli=debug,term_session=debug"
    } else {
        "web_cli=info,term_session=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));

    let log_path = config.log_file.clone().or_else(config::default_log_path);
    let Some(path) = log_path else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        return Ok(());
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory: {:?}", parent))?;
    }
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file: {:?}", path))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().or_else(config::default_config_path);
    let config = ClientConfig::load(config_path.as_deref(), &cli.overrides())?;
    init_logging(&config, cli.debug)?;

    info!(url = %config.url, protocol = ?config.protocol, "starting web-cli");

    let raw_mode = RawMode::enable();
    let keys = if raw_mode.is_some() {
        KeyDecoder::new()
    } else {
        info!("stdin is not a terminal; reading newline-terminated lines");
        KeyDecoder::line_mode()
    };
    let (stdin_reader, stdin_rx) = terminal::spawn_stdin_reader();

    let result = App::new(config, std::io::stdout())
        .with_key_decoder(keys)
        .run(stdin_rx)
        .await;

    stdin_reader.stop();
    drop(raw_mode);
    result
}
