//! Configuration loading and management
//!
//! Configuration is loaded from `~/.config/tokenscope/config.toml`
//!
//! This module follows the XDG Base Directory Specification:
//! - Config: `$XDG_CONFIG_HOME/tokenscope/` (~/.config/tokenscope/)
//! - State/Logs: `$XDG_STATE_HOME/tokenscope/` (~/.local/state/tokenscope/)

use crate::cost::PricingTier;
use crate::error::{Error, Result};
use crate::report::ReportLimits;
use serde::Deserialize;
use std::path::PathBuf;

/// Returns a best-effort home directory path.
fn home_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Returns XDG_CONFIG_HOME or ~/.config
fn xdg_config_home() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".config"))
}

/// Returns XDG_STATE_HOME or ~/.local/state
fn xdg_state_home() -> PathBuf {
    std::env::var("XDG_STATE_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| home_dir().join(".local/state"))
}

/// Main configuration struct
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    /// Scan configuration
    #[serde(default)]
    pub scan: ScanConfig,

    /// Pricing tiers and tier selection
    #[serde(default)]
    pub pricing: PricingConfig,

    /// Ranked-list limits for the report
    #[serde(default)]
    pub report: ReportLimits,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scan configuration
#[derive(Debug, Deserialize)]
pub struct ScanConfig {
    /// Override path for the Claude Code log directory
    pub claude_dir: Option<PathBuf>,

    /// Worker threads for file extraction; 0 picks automatically
    #[serde(default)]
    pub workers: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            claude_dir: None,
            workers: 0,
        }
    }
}

/// Pricing configuration
#[derive(Debug, Deserialize)]
pub struct PricingConfig {
    /// Tier used for per-session costs
    #[serde(default = "default_tier_name")]
    pub default_tier: String,

    /// Extra tiers, or overrides of the built-in ones by name
    #[serde(default)]
    pub tiers: Vec<PricingTier>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            default_tier: default_tier_name(),
            tiers: vec![],
        }
    }
}

fn default_tier_name() -> String {
    "sonnet".to_string()
}

impl PricingConfig {
    /// The effective tier table: built-ins with config entries layered on
    /// top (same name replaces, new name appends).
    pub fn resolve_tiers(&self) -> Vec<PricingTier> {
        let mut tiers = PricingTier::builtin();
        for tier in &self.tiers {
            match tiers.iter_mut().find(|t| t.name == tier.name) {
                Some(existing) => *existing = tier.clone(),
                None => tiers.push(tier.clone()),
            }
        }
        tiers
    }

    /// The tier per-session costs are computed at. Fails when
    /// `default_tier` names a tier that does not exist.
    pub fn default_tier(&self) -> Result<PricingTier> {
        let tiers = self.resolve_tiers();
        PricingTier::by_name(&tiers, &self.default_tier)
            .cloned()
            .ok_or_else(|| {
                Error::Config(format!(
                    "pricing.default_tier names unknown tier '{}'",
                    self.default_tier
                ))
            })
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if !config_path.exists() {
            tracing::info!("No config file found at {:?}, using defaults", config_path);
            return Ok(Config::default());
        }

        Self::load_from(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;

        Ok(config)
    }

    /// Returns the default config file path
    ///
    /// `$XDG_CONFIG_HOME/tokenscope/config.toml` (~/.config/tokenscope/config.toml)
    pub fn config_path() -> PathBuf {
        xdg_config_home().join("tokenscope").join("config.toml")
    }

    /// Returns the state directory path (for logs)
    ///
    /// `$XDG_STATE_HOME/tokenscope/` (~/.local/state/tokenscope/)
    pub fn state_dir() -> PathBuf {
        xdg_state_home().join("tokenscope")
    }

    /// Returns the log file path
    ///
    /// `$XDG_STATE_HOME/tokenscope/tokenscope.log`
    pub fn log_path() -> PathBuf {
        Self::state_dir().join("tokenscope.log")
    }

    /// Returns the Claude Code log directory: the configured override or
    /// `~/.claude`.
    pub fn claude_dir(&self) -> PathBuf {
        self.scan
            .claude_dir
            .clone()
            .unwrap_or_else(|| home_dir().join(".claude"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.scan.claude_dir.is_none());
        assert_eq!(config.scan.workers, 0);
        assert_eq!(config.pricing.default_tier, "sonnet");
        assert_eq!(config.report.tools, 20);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
[scan]
claude_dir = "/srv/claude"
workers = 4

[pricing]
default_tier = "opus"

[report]
sequences = 5

[logging]
level = "debug"
"#;
        let config: Config = toml::from_str(toml).unwrap();

        assert_eq!(config.scan.claude_dir.as_deref().unwrap().to_str(), Some("/srv/claude"));
        assert_eq!(config.scan.workers, 4);
        assert_eq!(config.pricing.default_tier, "opus");
        assert_eq!(config.report.sequences, 5);
        assert_eq!(config.report.tools, 20);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_tier_overrides_layer_over_builtins() {
        let toml = r#"
[pricing]
default_tier = "local"

[[pricing.tiers]]
name = "sonnet"
input_per_mtok = 2.5
output_per_mtok = 12.0

[[pricing.tiers]]
name = "local"
input_per_mtok = 0.0
output_per_mtok = 0.0
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let tiers = config.pricing.resolve_tiers();

        assert_eq!(tiers.len(), 4);
        let sonnet = PricingTier::by_name(&tiers, "sonnet").unwrap();
        assert_eq!(sonnet.input_per_mtok, 2.5);
        assert_eq!(config.pricing.default_tier().unwrap().name, "local");
    }

    #[test]
    fn test_unknown_default_tier_is_an_error() {
        let config = PricingConfig {
            default_tier: "nope".to_string(),
            tiers: vec![],
        };
        assert!(matches!(config.default_tier(), Err(Error::Config(_))));
    }
}
