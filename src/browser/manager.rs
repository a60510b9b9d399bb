//! Browser manager for coordinating headless capture sessions.
//!
//! This module provides the `BrowserManager` struct, which runs the
//! Playwright capture script under a semaphore and turns its output into a
//! [`CapturedPage`].

use serde::Deserialize;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use url::Url;

use super::playwright::{
    ensure_node_available, ensure_playwright_available, map_playwright_error,
    map_playwright_status_error, map_spawn_error, CAPTURE_SCRIPT,
};
use crate::config::BrowserConfig;
use crate::page::CapturedPage;
use crate::progress::{log_progress, ProgressCallback};
use crate::{ExtractError, Result, Viewport};

/// Default timeout for page navigation.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default timeout for waiting for network idle state.
pub const DEFAULT_NETWORK_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for the entire Playwright process.
pub const DEFAULT_PROCESS_TIMEOUT: Duration = Duration::from_secs(45);

/// Configuration options for capture sessions.
#[derive(Clone)]
pub struct BrowserOptions {
    /// The Node.js command to use (default: "node").
    pub node_command: String,
    pub viewport: Viewport,
    pub headless: bool,
    pub navigation_timeout: Duration,
    pub network_idle_timeout: Duration,
    /// Timeout for the entire Playwright process.
    pub process_timeout: Duration,
    pub max_concurrent_sessions: usize,
    pub progress: Option<ProgressCallback>,
}

impl Default for BrowserOptions {
    fn default() -> Self {
        Self {
            node_command: "node".to_string(),
            viewport: Viewport::default(),
            headless: true,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            network_idle_timeout: DEFAULT_NETWORK_IDLE_TIMEOUT,
            process_timeout: DEFAULT_PROCESS_TIMEOUT,
            max_concurrent_sessions: 1,
            progress: None,
        }
    }
}

impl std::fmt::Debug for BrowserOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserOptions")
            .field("node_command", &self.node_command)
            .field("viewport", &self.viewport)
            .field("headless", &self.headless)
            .field("navigation_timeout", &self.navigation_timeout)
            .field("network_idle_timeout", &self.network_idle_timeout)
            .field("process_timeout", &self.process_timeout)
            .field("max_concurrent_sessions", &self.max_concurrent_sessions)
            .finish_non_exhaustive()
    }
}

impl BrowserOptions {
    /// Options from the `[browser]` config section. An unparsable viewport
    /// falls back to the default; `Config::validate` reports it earlier.
    pub fn from_config(config: &BrowserConfig) -> Self {
        Self {
            node_command: config.node_command.clone(),
            viewport: config.viewport().unwrap_or_default(),
            navigation_timeout: config.navigation_timeout,
            network_idle_timeout: config.network_idle_timeout,
            process_timeout: config.process_timeout,
            ..Self::default()
        }
    }
}

/// Output envelope printed by the capture script.
#[derive(Debug, Deserialize)]
struct CaptureEnvelope {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    capture: Option<CapturedPage>,
}

/// Manages concurrent capture sessions with semaphore-based limiting.
#[derive(Debug, Clone)]
pub struct BrowserManager {
    options: BrowserOptions,
    semaphore: Arc<Semaphore>,
}

impl BrowserManager {
    pub fn new(options: BrowserOptions) -> Self {
        let permits = options.max_concurrent_sessions.max(1);
        Self {
            options,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn options(&self) -> &BrowserOptions {
        &self.options
    }

    /// Renders `url` in headless Chromium and captures the element tree,
    /// resolved styles, per-tag default styles and stylesheets.
    pub async fn capture_page(&self, url: &str) -> Result<CapturedPage> {
        let parsed = Url::parse(url)?;
        if !matches!(parsed.scheme(), "http" | "https" | "file") {
            return Err(ExtractError::Config(format!(
                "Unsupported URL scheme '{}'; use http, https or file",
                parsed.scheme()
            )));
        }

        ensure_node_available(&self.options.node_command).await?;
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| ExtractError::capture("Browser manager unavailable"))?;

        self.run_capture(parsed.as_str()).await
    }

    async fn run_capture(&self, url: &str) -> Result<CapturedPage> {
        let options = &self.options;
        let progress = &options.progress;
        log_progress(
            progress,
            &format!(
                "Launching headless browser for {} ({}, nav {}s, idle {}s)…",
                url,
                options.viewport,
                options.navigation_timeout.as_secs(),
                options.network_idle_timeout.as_secs()
            ),
        );
        ensure_playwright_available(&options.node_command).await?;

        let mut cmd = Command::new(&options.node_command);
        cmd.arg("-e")
            .arg(CAPTURE_SCRIPT)
            .arg(url)
            .arg(options.viewport.width.to_string())
            .arg(options.viewport.height.to_string())
            .arg(options.navigation_timeout.as_millis().to_string())
            .arg(options.network_idle_timeout.as_millis().to_string())
            .arg(if options.headless { "1" } else { "0" })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        log_progress(progress, "Navigating and waiting for network idle (Playwright)…");
        let start = Instant::now();
        let mut child = cmd
            .spawn()
            .map_err(|err| map_spawn_error(err, &options.node_command))?;

        let stdout_pipe = child.stdout.take();
        let stderr_pipe = child.stderr.take();

        let stdout_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut out) = stdout_pipe {
                let _ = out.read_to_end(&mut buf).await;
            }
            buf
        });

        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            if let Some(mut err) = stderr_pipe {
                let _ = err.read_to_end(&mut buf).await;
            }
            buf
        });

        let status = match timeout(options.process_timeout, child.wait()).await {
            Ok(Ok(status)) => status,
            Ok(Err(err)) => return Err(ExtractError::Io(err)),
            Err(_) => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                log_progress(
                    progress,
                    "Playwright timed out; process killed after exceeding timeout.",
                );
                return Err(ExtractError::capture(format!(
                    "Playwright timed out after {:?}",
                    options.process_timeout
                )));
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let stderr = String::from_utf8_lossy(&stderr);
            return Err(map_playwright_error(status.to_string(), &stderr));
        }

        let stdout = String::from_utf8_lossy(&stdout);
        let page = parse_capture_output(&stdout)?;

        tracing::debug!(
            elements = page.elements.len(),
            stylesheets = page.stylesheets.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "page captured"
        );
        log_progress(
            progress,
            &format!("Capture finished in {:.1}s", start.elapsed().as_secs_f32()),
        );
        Ok(page)
    }
}

fn parse_capture_output(stdout: &str) -> Result<CapturedPage> {
    let envelope: CaptureEnvelope = serde_json::from_str(stdout.trim()).map_err(|e| {
        ExtractError::capture(format!(
            "Failed to parse Playwright output: {} - raw: {}",
            e,
            truncate(stdout.trim(), 200)
        ))
    })?;

    if envelope.status != "ok" {
        let message = envelope
            .message
            .unwrap_or_else(|| "no additional details".to_string());
        return Err(map_playwright_status_error(&envelope.status, message));
    }

    let page = envelope.capture.ok_or_else(|| {
        ExtractError::capture("Playwright returned ok status but no page capture")
    })?;
    page.check_structure()?;
    Ok(page)
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
