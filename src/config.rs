//! previewsync settings: `config.json` plus `PREVIEWSYNC_*` overrides.
//!
//! Handles reading and writing the previewsync configuration file and
//! applying `PREVIEWSYNC_*` environment overrides on top of it.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};

use crate::constants;
use crate::sandbox::SandboxLimits;

/// Configuration for the previewsync CLI.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Directory under which per-session sandbox directories are created.
    pub sandbox_root: PathBuf,
    /// Dependency installation command (program followed by arguments).
    pub install_command: String,
    /// Development server command (program followed by arguments).
    pub dev_command: String,
    /// Project-relative file tried first when binding a selection.
    pub entry_file: String,
    /// Seconds allowed for booting the sandbox.
    pub boot_timeout_secs: u64,
    /// Seconds allowed for the install process.
    pub install_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sandbox_root: std::env::temp_dir().join(constants::SANDBOX_DIR_PREFIX),
            install_command: constants::DEFAULT_INSTALL_COMMAND.to_string(),
            dev_command: constants::DEFAULT_DEV_COMMAND.to_string(),
            entry_file: constants::DEFAULT_ENTRY_FILE.to_string(),
            boot_timeout_secs: constants::DEFAULT_BOOT_TIMEOUT.as_secs(),
            install_timeout_secs: constants::DEFAULT_INSTALL_TIMEOUT.as_secs(),
        }
    }
}

impl Config {
    /// Directory holding `config.json` and the log file. Created on demand.
    ///
    /// Resolution order:
    /// 1. `PREVIEWSYNC_CONFIG_DIR` env var: explicit override
    /// 2. `PREVIEWSYNC_ENV=test`: `<temp>/previewsync-test`
    /// 3. Default: platform config dir joined with `previewsync`
    pub fn config_dir() -> Result<PathBuf> {
        let dir = if let Ok(dir) = std::env::var("PREVIEWSYNC_CONFIG_DIR") {
            PathBuf::from(dir)
        } else if crate::env::is_test_mode() {
            std::env::temp_dir().join("previewsync-test")
        } else {
            dirs::config_dir()
                .context("Could not determine config directory")?
                .join("previewsync")
        };
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config dir {}", dir.display()))?;
        Ok(dir)
    }

    /// Effective configuration: the file (or defaults) with env overrides applied.
    ///
    /// A missing or unreadable file falls back to defaults.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from_file().unwrap_or_else(|e| {
            log::debug!("Using default config: {e}");
            Self::default()
        });
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.json"))
    }

    fn load_from_file() -> Result<Self> {
        let path = Self::path()?;
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("No readable config at {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("Malformed config at {}", path.display()))
    }

    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(root) = lookup("PREVIEWSYNC_SANDBOX_ROOT") {
            self.sandbox_root = PathBuf::from(root);
        }

        if let Some(command) = lookup("PREVIEWSYNC_INSTALL_COMMAND") {
            self.install_command = command;
        }

        if let Some(command) = lookup("PREVIEWSYNC_DEV_COMMAND") {
            self.dev_command = command;
        }

        if let Some(entry) = lookup("PREVIEWSYNC_ENTRY_FILE") {
            self.entry_file = entry;
        }

        if let Some(timeout) = lookup("PREVIEWSYNC_BOOT_TIMEOUT") {
            if let Ok(secs) = timeout.parse::<u64>() {
                self.boot_timeout_secs = secs;
            }
        }

        if let Some(timeout) = lookup("PREVIEWSYNC_INSTALL_TIMEOUT") {
            if let Ok(secs) = timeout.parse::<u64>() {
                self.install_timeout_secs = secs;
            }
        }
    }

    /// Write this configuration to `config.json`.
    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(&path, raw).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Splits the install command into program and arguments.
    pub fn install_invocation(&self) -> Result<(String, Vec<String>)> {
        split_command(&self.install_command).context("install_command is empty")
    }

    /// Splits the dev command into program and arguments.
    pub fn dev_invocation(&self) -> Result<(String, Vec<String>)> {
        split_command(&self.dev_command).context("dev_command is empty")
    }

    /// Sandbox limits derived from the configured timeouts.
    pub fn sandbox_limits(&self) -> Result<SandboxLimits> {
        let (install_program, install_args) = self.install_invocation()?;
        let (dev_program, dev_args) = self.dev_invocation()?;
        Ok(SandboxLimits {
            boot_timeout: Duration::from_secs(self.boot_timeout_secs),
            install_timeout: Duration::from_secs(self.install_timeout_secs),
            install_program,
            install_args,
            dev_program,
            dev_args,
        })
    }
}

/// Splits a whitespace-separated command line into program and arguments.
fn split_command(command: &str) -> Option<(String, Vec<String>)> {
    let mut parts = command.split_whitespace().map(String::from);
    let program = parts.next()?;
    Some((program, parts.collect()))
}
