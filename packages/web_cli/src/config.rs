use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use term_session::ProtocolMode;

// =============================================================================
// Client config (figment-deserialized from defaults / config.toml / env / CLI)
// =============================================================================
//
// Equivalent ways to set a value:
//
//   config.toml:     reconnect_delay_ms = 1000
//
//   env var:         WEBCLI_RECONNECT_DELAY_MS=1000
//
//   flag:            --reconnect-delay-ms 1000

const ENV_PREFIX: &str = "WEBCLI_";

/// Tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FileConfig {
    /// WebSocket endpoint of the command server.
    #[serde(default = "default_url")]
    pub url: String,
    /// Flat delay between a close and the next connection attempt.
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// Play the typewriter greeting when a connection opens.
    #[serde(default = "default_greeting")]
    pub greeting: bool,
    /// Delay between greeting characters.
    #[serde(default = "default_greeting_delay_ms")]
    pub greeting_delay_ms: u64,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default)]
    pub protocol: ProtocolMode,
    /// Where tracing output goes. Stdout is the terminal, so logs never go there.
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            greeting: default_greeting(),
            greeting_delay_ms: default_greeting_delay_ms(),
            history_capacity: default_history_capacity(),
            protocol: ProtocolMode::default(),
            log_file: None,
        }
    }
}

fn default_url() -> String {
    "ws://localhost:8080/ws".to_string()
}
fn default_reconnect_delay_ms() -> u64 {
    3000
}
fn default_greeting() -> bool {
    true
}
fn default_greeting_delay_ms() -> u64 {
    30
}
fn default_history_capacity() -> usize {
    term_session::history::DEFAULT_CAPACITY
}

/// Values given on the command line. `None` leaves lower layers untouched.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CliOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reconnect_delay_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub greeting: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<ProtocolMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

/// Default location of `config.toml`, if the platform has a config directory.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("web-cli").join("config.toml"))
}

/// Default log file location, if the platform has a local data directory.
pub fn default_log_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|dir| dir.join("web-cli").join("client.log"))
}

/// Build a figment that layers: defaults → config.toml → WEBCLI_* env vars → CLI flags.
///
/// A missing config file is not an error; it simply contributes nothing.
pub fn load_config(config_path: Option<&Path>, overrides: &CliOverrides) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let mut figment = Figment::from(Serialized::defaults(FileConfig::default()));
    if let Some(path) = config_path {
        figment = figment.merge(Toml::file(path));
    }
    figment
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .merge(Serialized::defaults(overrides))
}

/// Resolved client configuration (runtime view).
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub url: String,
    pub reconnect_delay: Duration,
    /// Per-character greeting delay; `None` skips the animation.
    pub greeting_delay: Option<Duration>,
    pub history_capacity: usize,
    pub protocol: ProtocolMode,
    pub log_file: Option<PathBuf>,
}

impl ClientConfig {
    pub fn from_file(fc: &FileConfig) -> Self {
        Self {
            url: fc.url.clone(),
            reconnect_delay: Duration::from_millis(fc.reconnect_delay_ms),
            greeting_delay: fc
                .greeting
                .then(|| Duration::from_millis(fc.greeting_delay_ms)),
            history_capacity: fc.history_capacity,
            protocol: fc.protocol,
            log_file: fc.log_file.clone(),
        }
    }

    /// Load and resolve the configuration in one step.
    pub fn load(config_path: Option<&Path>, overrides: &CliOverrides) -> Result<Self> {
        let fc: FileConfig = load_config(config_path, overrides)
            .extract()
            .context("Failed to load configuration")?;
        if !fc.url.starts_with("ws://") && !fc.url.starts_with("wss://") {
            anyhow::bail!("url must use ws:// or wss://, got {}", fc.url);
        }
        Ok(Self::from_file(&fc))
    }
}
