use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::types::Viewport;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Parse(#[from] toml::de::Error),
}

/// Extractor settings, loaded from TOML. Every section and field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub limits: LimitsConfig,
    pub importance: ImportanceConfig,
    pub media: MediaConfig,
    pub fetch: FetchConfig,
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    /// Elements kept after ranking by visible area.
    pub max_elements: usize,
    /// Elements processed between cooperative yields.
    pub batch_size: usize,
    pub max_declarations_per_selector: usize,
    pub max_selector_alternatives: usize,
    pub max_selector_combinators: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_elements: 500,
            batch_size: 100,
            max_declarations_per_selector: 20,
            max_selector_alternatives: 2,
            max_selector_combinators: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ImportanceConfig {
    /// Direct text longer than this many characters marks an element important.
    pub text_length_threshold: usize,
    /// Added to the built-in structural `id`/`class` keywords.
    pub extra_keywords: Vec<String>,
    /// Added to the built-in semantic tags.
    pub extra_semantic_tags: Vec<String>,
}

impl Default for ImportanceConfig {
    fn default() -> Self {
        Self {
            text_length_threshold: 20,
            extra_keywords: Vec::new(),
            extra_semantic_tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MediaConfig {
    /// Only process `@media` rules whose condition mentions `screen`.
    pub screen_only: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchConfig {
    /// Fetch cross-origin stylesheets the page cannot read.
    pub enabled: bool,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub max_concurrent: usize,
    pub user_agent: String,
}

pub const DEFAULT_USER_AGENT: &str = concat!("pse/", env!("CARGO_PKG_VERSION"));

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_secs(10),
            max_concurrent: 4,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BrowserConfig {
    pub node_command: String,
    /// `WIDTHxHEIGHT`.
    pub viewport: String,
    #[serde(with = "humantime_serde")]
    pub navigation_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub network_idle_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub process_timeout: Duration,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            node_command: "node".to_string(),
            viewport: Viewport::default().to_string(),
            navigation_timeout: Duration::from_secs(30),
            network_idle_timeout: Duration::from_secs(10),
            process_timeout: Duration::from_secs(45),
        }
    }
}

impl BrowserConfig {
    pub fn viewport(&self) -> Result<Viewport, String> {
        self.viewport
            .parse::<Viewport>()
            .map_err(|e| format!("browser.viewport: {e}"))
    }
}

impl Config {
    /// `$XDG_CONFIG_HOME/pse/config.toml`, falling back to
    /// `~/.config/pse/config.toml`.
    pub fn central_config_path() -> Option<PathBuf> {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
        Some(base.join("pse").join("config.toml"))
    }

    /// Loads `path`, else the central config if it exists, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::central_config_path().filter(|p| p.is_file()) {
                Some(central) => central,
                None => return Ok(Self::default()),
            },
        };
        let text = std::fs::read_to_string(&path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), String> {
        let limits = &self.limits;
        for (name, value) in [
            ("limits.max_elements", limits.max_elements),
            ("limits.batch_size", limits.batch_size),
            (
                "limits.max_declarations_per_selector",
                limits.max_declarations_per_selector,
            ),
            ("limits.max_selector_alternatives", limits.max_selector_alternatives),
            ("fetch.max_concurrent", self.fetch.max_concurrent),
        ] {
            if value == 0 {
                return Err(format!("{name} must be greater than 0"));
            }
        }
        for (name, value) in [
            ("fetch.timeout", self.fetch.timeout),
            ("browser.navigation_timeout", self.browser.navigation_timeout),
            ("browser.network_idle_timeout", self.browser.network_idle_timeout),
            ("browser.process_timeout", self.browser.process_timeout),
        ] {
            if value.is_zero() {
                return Err(format!("{name} must be greater than 0"));
            }
        }
        if self.browser.node_command.trim().is_empty() {
            return Err("browser.node_command must not be empty".to_string());
        }
        self.browser.viewport()?;
        Ok(())
    }
}
