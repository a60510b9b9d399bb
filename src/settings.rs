use std::path::Path;
use std::time::Duration;

use pse_lib::{BrowserOptions, Config, ExtractError, Viewport};

use crate::cli::ExtractArgs;

/// Tracks which CLI flags were explicitly provided vs. defaulted.
#[derive(Debug, Default)]
pub struct ExtractFlagSources {
    pub viewport: bool,
    pub nav_timeout: bool,
    pub network_idle_timeout: bool,
    pub process_timeout: bool,
}

impl ExtractFlagSources {
    pub fn from_args(args: &[String]) -> Self {
        Self {
            viewport: flag_present(args, "--viewport"),
            nav_timeout: flag_present(args, "--nav-timeout"),
            network_idle_timeout: flag_present(args, "--network-idle-timeout"),
            process_timeout: flag_present(args, "--process-timeout"),
        }
    }
}

/// Checks if a flag was present in the command-line arguments.
pub fn flag_present(args: &[String], flag: &str) -> bool {
    args.iter()
        .any(|arg| arg == flag || arg.starts_with(&format!("{flag}=")))
}

/// Resolved settings after merging CLI args and config file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedExtractSettings {
    pub viewport: Viewport,
    pub nav_timeout: Duration,
    pub network_idle_timeout: Duration,
    pub process_timeout: Duration,
    pub fetch_enabled: bool,
}

impl ResolvedExtractSettings {
    /// Browser options for URL capture: config defaults with CLI overrides.
    pub fn browser_options(&self, config: &Config) -> BrowserOptions {
        BrowserOptions {
            viewport: self.viewport,
            navigation_timeout: self.nav_timeout,
            network_idle_timeout: self.network_idle_timeout,
            process_timeout: self.process_timeout,
            ..BrowserOptions::from_config(&config.browser)
        }
    }
}

/// Merge CLI arguments with config file, preferring CLI when flags are present.
pub fn resolve_extract_settings(
    args: &ExtractArgs,
    config: &Config,
    flags: &ExtractFlagSources,
) -> ResolvedExtractSettings {
    let browser = &config.browser;
    ResolvedExtractSettings {
        viewport: if flags.viewport {
            args.viewport
        } else {
            browser.viewport().unwrap_or(args.viewport)
        },
        nav_timeout: if flags.nav_timeout {
            Duration::from_secs(args.nav_timeout)
        } else {
            browser.navigation_timeout
        },
        network_idle_timeout: if flags.network_idle_timeout {
            Duration::from_secs(args.network_idle_timeout)
        } else {
            browser.network_idle_timeout
        },
        process_timeout: if flags.process_timeout {
            Duration::from_secs(args.process_timeout)
        } else {
            browser.process_timeout
        },
        fetch_enabled: config.fetch.enabled && !args.no_fetch,
    }
}

/// Load config from a TOML file, central config, or return defaults.
/// Priority: explicit path > ~/.config/pse/config.toml > defaults
pub fn load_config(path: Option<&Path>) -> Result<Config, ExtractError> {
    let cfg = Config::load(path).map_err(|e| {
        let loc = path
            .map(|p| p.display().to_string())
            .or_else(|| Config::central_config_path().map(|p| p.display().to_string()))
            .unwrap_or_else(|| "defaults".to_string());
        ExtractError::Config(format!("Failed to read config {}: {}", loc, e))
    })?;

    cfg.validate().map_err(|e| {
        let prefix = path
            .map(|p| format!("Invalid config ({}): {}", p.display(), e))
            .unwrap_or_else(|| format!("Invalid config: {}", e));
        ExtractError::Config(prefix)
    })?;
    Ok(cfg)
}

/// Format effective config as a single-line string.
pub fn format_effective_config(
    settings: &ResolvedExtractSettings,
    config: &Config,
    config_source: Option<&Path>,
) -> String {
    let source = config_source
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "defaults".to_string());
    let limits = &config.limits;
    format!(
        "Effective config [{source}]: viewport={}, timeouts: nav={}s, network-idle={}s, process={}s, fetch={} (max {} concurrent, {}s timeout), limits: elements={}, batch={}, declarations={}, screen_only={}",
        settings.viewport,
        settings.nav_timeout.as_secs(),
        settings.network_idle_timeout.as_secs(),
        settings.process_timeout.as_secs(),
        settings.fetch_enabled,
        config.fetch.max_concurrent,
        config.fetch.timeout.as_secs(),
        limits.max_elements,
        limits.batch_size,
        limits.max_declarations_per_selector,
        config.media.screen_only,
    )
}
