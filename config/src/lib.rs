//! Driver configuration
//!
//! Settings are read from a TOML file, by default `<config dir>/editor-lldb/config.toml`. Every
//! key is optional and falls back to its default.
//!
//! ```toml
//! [driver]
//! startup_timeout_ms = 5000
//! source_init_files = false
//! unmatched_events = "discard"
//! ```
use std::{
    io::{ErrorKind, Read},
    path::{Path, PathBuf},
    time::Duration,
};

use eyre::Context;
use serde::Deserialize;

const APP_DIR: &str = "editor-lldb";
const FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub driver: DriverSettings,
}

/// Settings for the driver and its IO channel
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DriverSettings {
    /// How long to wait for the IO channel to report that it started
    pub startup_timeout_ms: u64,
    /// Poll timeout of the dispatch loop
    pub event_timeout_ms: u64,
    /// How long teardown waits for the IO channel to exit on its own
    pub teardown_timeout_ms: u64,
    /// Source the engine init files from the home and working directories
    pub source_init_files: bool,
    /// Echo the result of sourcing init files
    pub debug_mode: bool,
    pub add_to_history: bool,
    pub stdio_chunk_size: usize,
    pub unmatched_events: UnmatchedEvents,
    pub prompt: String,
    /// Prompt shown when another input reader is on top of the command reader
    pub nested_prompt: String,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            startup_timeout_ms: 5000,
            event_timeout_ms: 1000,
            teardown_timeout_ms: 500,
            source_init_files: true,
            debug_mode: false,
            add_to_history: true,
            stdio_chunk_size: 1024,
            unmatched_events: UnmatchedEvents::default(),
            prompt: "lldb (driver)".to_string(),
            nested_prompt: "?".to_string(),
        }
    }
}

impl DriverSettings {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn event_timeout(&self) -> Duration {
        Duration::from_millis(self.event_timeout_ms)
    }

    pub fn teardown_timeout(&self) -> Duration {
        Duration::from_millis(self.teardown_timeout_ms)
    }
}

/// What a filtered event wait does with events from other sources
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedEvents {
    #[default]
    Requeue,
    Discard,
}

impl Config {
    fn validate(self) -> eyre::Result<Self> {
        eyre::ensure!(
            self.driver.stdio_chunk_size > 0,
            "driver.stdio_chunk_size must be positive"
        );
        eyre::ensure!(
            self.driver.event_timeout_ms > 0,
            "driver.event_timeout_ms must be positive"
        );
        Ok(self)
    }
}

/// The location [`load_default`] reads from, if the platform has a configuration directory
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR).join(FILE_NAME))
}

pub fn load(mut reader: impl Read) -> eyre::Result<Config> {
    let mut contents = String::new();
    reader
        .read_to_string(&mut contents)
        .context("reading configuration")?;
    let config: Config = toml::from_str(&contents).context("parsing configuration")?;
    config.validate()
}

pub fn load_from(path: impl AsRef<Path>) -> eyre::Result<Config> {
    let path = path.as_ref();
    let f = std::fs::File::open(path)
        .with_context(|| format!("opening configuration file {}", path.display()))?;
    load(f).with_context(|| format!("loading configuration from {}", path.display()))
}

/// Load the configuration from [`default_path`]
///
/// A missing file is not an error and yields the defaults.
pub fn load_default() -> eyre::Result<Config> {
    let Some(path) = default_path() else {
        tracing::debug!("no configuration directory, using defaults");
        return Ok(Config::default());
    };

    match std::fs::File::open(&path) {
        Ok(f) => {
            tracing::debug!(config_path = %path.display(), "loading configuration");
            load(f).with_context(|| format!("loading configuration from {}", path.display()))
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            tracing::debug!(config_path = %path.display(), "no configuration file, using defaults");
            Ok(Config::default())
        }
        Err(e) => Err(eyre::Report::new(e)
            .wrap_err(format!("opening configuration file {}", path.display()))),
    }
}
