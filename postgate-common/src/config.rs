//! Configuration loading and root folder resolution
//!
//! Root folder resolution follows a 4-tier priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! Secrets (Discord bot token, LinkedIn access token, webhook URLs) come from
//! the TOML config file with environment variable overrides. Mutable runtime
//! knobs (poll interval, decision window, retry ceiling) live in the database
//! `settings` table instead; see `db::settings`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// TOML configuration file contents (`postgate.toml`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Data root folder override
    pub root_folder: Option<String>,

    #[serde(default)]
    pub discord: DiscordConfig,

    #[serde(default)]
    pub linkedin: LinkedInConfig,

    /// Webhook that receives intake form submissions for LLM draft generation
    pub generation_webhook_url: Option<String>,
}

/// Discord reviewer-surface credentials and channel routing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscordConfig {
    pub bot_token: Option<String>,
    /// Channel where pending drafts are surfaced for review
    pub approval_channel_id: Option<String>,
    /// Channel for publish success/failure announcements (optional)
    pub notification_channel_id: Option<String>,
}

/// LinkedIn publishing credentials
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LinkedInConfig {
    pub access_token: Option<String>,
    pub person_id: Option<String>,
}

impl TomlConfig {
    /// Load from an explicit path, or the default platform config path.
    ///
    /// A missing file is not an error; defaults are returned so environment
    /// overrides can still supply everything.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match default_config_path() {
                Some(p) => p,
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    /// Apply `POSTGATE_*` environment variable overrides on top of the file.
    pub fn apply_env(mut self) -> Self {
        if let Ok(v) = std::env::var("POSTGATE_DISCORD_BOT_TOKEN") {
            self.discord.bot_token = Some(v);
        }
        if let Ok(v) = std::env::var("POSTGATE_DISCORD_APPROVAL_CHANNEL_ID") {
            self.discord.approval_channel_id = Some(v);
        }
        if let Ok(v) = std::env::var("POSTGATE_DISCORD_NOTIFICATION_CHANNEL_ID") {
            self.discord.notification_channel_id = Some(v);
        }
        if let Ok(v) = std::env::var("POSTGATE_LINKEDIN_ACCESS_TOKEN") {
            self.linkedin.access_token = Some(v);
        }
        if let Ok(v) = std::env::var("POSTGATE_LINKEDIN_PERSON_ID") {
            self.linkedin.person_id = Some(v);
        }
        if let Ok(v) = std::env::var("POSTGATE_GENERATION_WEBHOOK_URL") {
            self.generation_webhook_url = Some(v);
        }
        self
    }

    /// Validate that the credentials required to run the review service are
    /// present. Reports every missing key at once.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();

        if !is_set(&self.discord.bot_token) {
            missing.push("discord.bot_token");
        }
        if !is_set(&self.discord.approval_channel_id) {
            missing.push("discord.approval_channel_id");
        }
        if !is_set(&self.linkedin.access_token) {
            missing.push("linkedin.access_token");
        }
        if !is_set(&self.linkedin.person_id) {
            missing.push("linkedin.person_id");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config(format!(
                "Missing required configuration: {}. Set them in postgate.toml or via POSTGATE_* environment variables.",
                missing.join(", ")
            )))
        }
    }
}

fn is_set(value: &Option<String>) -> bool {
    value.as_deref().is_some_and(|v| !v.trim().is_empty())
}

/// Default configuration file path for the platform
/// (`~/.config/postgate/postgate.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("postgate").join("postgate.toml"))
}

/// Resolve the data root folder following the 4-tier priority order.
pub fn resolve_root_folder(cli_arg: Option<&str>, env_var_name: &str) -> PathBuf {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return PathBuf::from(path);
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    // Priority 3: TOML config file
    match TomlConfig::load(None) {
        Ok(config) => {
            if let Some(root_folder) = config.root_folder {
                return PathBuf::from(root_folder);
            }
        }
        Err(e) => warn!("Ignoring unreadable config file: {}", e),
    }

    // Priority 4: OS-dependent compiled default
    default_root_folder()
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("postgate"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/postgate"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("postgate"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/postgate"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("postgate"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\postgate"))
    } else {
        PathBuf::from("./postgate_data")
    }
}
