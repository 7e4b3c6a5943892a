use std::{fs, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

use crate::session::SessionSettings;

/// Command line options for the chat client.
#[derive(Parser, Debug, Default)]
#[command(name = "friendchat", about = "Friend chat client")]
pub struct Cli {
    /// Messages loaded when a chat is opened.
    #[arg(long)]
    pub history_limit: Option<usize>,
    /// Enable or disable logging (true/false).
    #[arg(long)]
    pub logging: Option<bool>,
    /// Document file of the local backend.
    #[arg(long)]
    pub data_file: Option<PathBuf>,
    /// Keep documents in memory only.
    #[arg(long)]
    pub ephemeral: bool,
    /// Path to configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Runtime configuration resolved from file, env and CLI.
#[derive(Clone, Debug)]
pub struct Config {
    pub history_limit: usize,
    /// `None` disables the recent conversation list.
    pub recent_limit: Option<usize>,
    pub min_password_len: usize,
    /// Whether verbose logging is enabled.
    pub logging_enabled: bool,
    /// Where the local backend keeps its documents; `None` keeps them in memory.
    pub data_file: Option<PathBuf>,
}

#[derive(Deserialize, Default)]
struct FileConfig {
    #[serde(default)]
    chat: FileChat,
    #[serde(default)]
    accounts: FileAccounts,
    #[serde(default)]
    logging: FileLogging,
    #[serde(default)]
    storage: FileStorage,
}

#[derive(Deserialize)]
struct FileChat {
    #[serde(default = "default_history_limit")]
    history_limit: usize,
    #[serde(default = "default_recent_limit")]
    recent_limit: usize,
}

#[derive(Deserialize)]
struct FileAccounts {
    #[serde(default = "default_min_password_len")]
    min_password_len: usize,
}

#[derive(Deserialize)]
struct FileLogging {
    #[serde(default = "default_logging")]
    enabled: bool,
}

#[derive(Deserialize, Default)]
struct FileStorage {
    #[serde(default)]
    data_file: Option<PathBuf>,
}

fn default_history_limit() -> usize {
    50
}

fn default_recent_limit() -> usize {
    20
}

fn default_min_password_len() -> usize {
    6
}

fn default_logging() -> bool {
    true
}

impl Default for FileChat {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            recent_limit: default_recent_limit(),
        }
    }
}

impl Default for FileAccounts {
    fn default() -> Self {
        Self {
            min_password_len: default_min_password_len(),
        }
    }
}

impl Default for FileLogging {
    fn default() -> Self {
        Self {
            enabled: default_logging(),
        }
    }
}

impl Config {
    /// Resolve configuration from CLI, environment variables, config file and defaults.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut history_limit = default_history_limit();
        let mut recent_limit = default_recent_limit();
        let mut min_password_len = default_min_password_len();
        let mut logging = default_logging();
        let mut data_file = memstore::default_data_file();

        // config file path precedence: CLI -> ENV -> default
        let config_path = cli
            .config
            .clone()
            .or_else(|| std::env::var("CHAT_CLIENT_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("config/chat_client.toml"));

        if let Ok(bytes) = fs::read(&config_path) {
            let contents = String::from_utf8_lossy(&bytes);
            let file_cfg: FileConfig = toml::from_str(&contents)
                .with_context(|| format!("invalid config file {}", config_path.display()))?;
            history_limit = file_cfg.chat.history_limit;
            recent_limit = file_cfg.chat.recent_limit;
            min_password_len = file_cfg.accounts.min_password_len;
            logging = file_cfg.logging.enabled;
            if let Some(path) = file_cfg.storage.data_file {
                data_file = Some(path);
            }
        }

        // environment overrides
        if let Ok(v) = std::env::var("CHAT_CLIENT_HISTORY_LIMIT") {
            if let Ok(v) = v.parse::<usize>() {
                history_limit = v;
            }
        }
        if let Ok(l) = std::env::var("CHAT_CLIENT_LOGGING") {
            if let Ok(l) = l.parse::<bool>() {
                logging = l;
            }
        }
        if let Ok(p) = std::env::var("CHAT_CLIENT_DATA_FILE") {
            data_file = Some(PathBuf::from(p));
        }

        // CLI overrides
        if let Some(v) = cli.history_limit {
            history_limit = v;
        }
        if let Some(l) = cli.logging {
            logging = l;
        }
        if let Some(p) = &cli.data_file {
            data_file = Some(p.clone());
        }
        if cli.ephemeral {
            data_file = None;
        }

        if !(1..=500).contains(&history_limit) {
            anyhow::bail!("invalid_history_limit");
        }
        if min_password_len == 0 {
            anyhow::bail!("invalid_min_password_len");
        }

        Ok(Self {
            history_limit,
            recent_limit: (recent_limit > 0).then_some(recent_limit),
            min_password_len,
            logging_enabled: logging,
            data_file,
        })
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            history_limit: self.history_limit,
            recent_limit: self.recent_limit,
        }
    }
}
