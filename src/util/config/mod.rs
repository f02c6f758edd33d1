//! Bridge configuration
//!
//! # Configuration hierarchy
//!
//! ```text
//! Priority (high → low):
//! 1. Explicit file (`--config PATH`)
//! 2. Environment variables (OWNER_BRIDGE_*)
//! 3. User-level (~/.config/owner-bridge/config.toml)
//! 4. Default values
//! ```
//!
//! # Example
//!
//! ```toml
//! [scheduler]
//! poll_interval_ms = 10
//! thread_name = "bridge-scheduler"
//!
//! [proxy]
//! call_timeout_ms = 30000   # 0 waits forever
//! lookup = "caller"         # or "owner"
//! bypass_members = ["schedule", "register"]
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable overriding `scheduler.poll_interval_ms`.
pub const ENV_POLL_INTERVAL: &str = "OWNER_BRIDGE_POLL_INTERVAL_MS";
/// Environment variable overriding `proxy.call_timeout_ms`.
pub const ENV_CALL_TIMEOUT: &str = "OWNER_BRIDGE_CALL_TIMEOUT_MS";
/// Environment variable overriding `proxy.lookup`.
pub const ENV_LOOKUP: &str = "OWNER_BRIDGE_LOOKUP";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct BridgeConfig {
    /// Scheduler loop settings
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Proxy settings
    #[serde(default)]
    pub proxy: ProxyConfig,
}

/// Scheduler loop configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Idle interval between queue checks
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Name of the worker thread
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_thread_name() -> String {
    "bridge-scheduler".to_string()
}

impl SchedulerConfig {
    #[inline]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            thread_name: default_thread_name(),
        }
    }
}

/// Where member lookups of an object proxy run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LookupPolicy {
    /// On the calling thread; lookups must be side-effect free
    #[default]
    Caller,
    /// Marshaled to the owner thread like a zero-argument call
    Owner,
}

impl std::str::FromStr for LookupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "caller" => Ok(LookupPolicy::Caller),
            "owner" => Ok(LookupPolicy::Owner),
            other => Err(format!("unknown lookup policy `{}`", other)),
        }
    }
}

/// Proxy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// How long a foreign caller waits for the owner thread; 0 waits forever
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    /// Where member lookups run
    #[serde(default)]
    pub lookup: LookupPolicy,
    /// Members never proxied, even off the owner thread
    #[serde(default = "default_bypass_members")]
    pub bypass_members: Vec<String>,
}

fn default_call_timeout_ms() -> u64 {
    30_000
}

fn default_bypass_members() -> Vec<String> {
    vec!["schedule".to_string(), "register".to_string()]
}

impl ProxyConfig {
    /// The wait bound, or `None` to wait forever.
    pub fn call_timeout(&self) -> Option<Duration> {
        match self.call_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Whether `name` always bypasses proxying.
    pub fn is_bypassed(
        &self,
        name: &str,
    ) -> bool {
        self.bypass_members.iter().any(|member| member == name)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            lookup: LookupPolicy::default(),
            bypass_members: default_bypass_members(),
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("config serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("cannot determine config directory")]
    NoConfigDir,
    #[error("invalid value for {var}: {reason}")]
    InvalidEnv { var: &'static str, reason: String },
}

impl BridgeConfig {
    /// Parse from TOML text; missing keys take their defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Render as TOML text.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Read a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Apply `OWNER_BRIDGE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    pub fn apply_overrides<F>(
        &mut self,
        lookup: F,
    ) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_POLL_INTERVAL) {
            self.scheduler.poll_interval_ms = parse_millis(ENV_POLL_INTERVAL, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CALL_TIMEOUT) {
            self.proxy.call_timeout_ms = parse_millis(ENV_CALL_TIMEOUT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_LOOKUP) {
            self.proxy.lookup = raw
                .parse()
                .map_err(|reason| ConfigError::InvalidEnv {
                    var: ENV_LOOKUP,
                    reason,
                })?;
        }
        Ok(())
    }
}

fn parse_millis(
    var: &'static str,
    raw: &str,
) -> Result<u64, ConfigError> {
    raw.trim().parse().map_err(|err| ConfigError::InvalidEnv {
        var,
        reason: format!("{}", err),
    })
}

/// Get the user config directory
pub fn get_config_dir() -> Option<PathBuf> {
    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg_config).join("owner-bridge"));
    }

    if let Ok(home) = std::env::var("HOME") {
        return Some(PathBuf::from(home).join(".config").join("owner-bridge"));
    }

    if let Ok(appdata) = std::env::var("APPDATA") {
        return Some(PathBuf::from(appdata).join("owner-bridge"));
    }

    None
}

/// Get the user config file path (~/.config/owner-bridge/config.toml)
pub fn get_config_path() -> Option<PathBuf> {
    get_config_dir().map(|dir| dir.join("config.toml"))
}

/// Load user-level configuration.
/// Returns the default config if the file doesn't exist.
pub fn load_user_config() -> Result<BridgeConfig, ConfigError> {
    match get_config_path() {
        Some(path) if path.exists() => BridgeConfig::load(&path),
        _ => Ok(BridgeConfig::default()),
    }
}

/// Resolve the effective configuration: explicit file or user file, then
/// environment overrides.
pub fn resolve_config(explicit: Option<&Path>) -> Result<BridgeConfig, ConfigError> {
    let mut config = match explicit {
        Some(path) => BridgeConfig::load(path)?,
        None => load_user_config()?,
    };
    config.apply_env()?;
    Ok(config)
}

/// Save a configuration to `path`, creating parent directories.
pub fn save_config(
    config: &BridgeConfig,
    path: &Path,
) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() && !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }
    fs::write(path, config.to_toml()?)?;
    Ok(())
}

/// Save a configuration as the user-level config file.
pub fn save_user_config(config: &BridgeConfig) -> Result<PathBuf, ConfigError> {
    let path = get_config_path().ok_or(ConfigError::NoConfigDir)?;
    save_config(config, &path)?;
    Ok(path)
}
