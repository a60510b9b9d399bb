//! Page Style Extractor (PSE) Library
//!
//! Reads a rendered page and produces a compact snapshot of the styles that
//! matter for reconstructing it: filtered computed styles of important
//! elements, important stylesheet rules, media queries, the animations
//! actually in use, and color/typography/layout summaries.
//!
//! # Module Overview
//!
//! - [`page`] - page access traits and the JSON-backed [`CapturedPage`]
//! - [`browser`] - Playwright capture of live URLs
//! - [`css`] - rule model, validation, selectors and media queries
//! - [`extract`] - the extraction pipeline and [`StyleExtractor`]
//! - [`fetch`] - cross-origin stylesheet fetching
//! - [`config`] - configuration file support
//! - [`types`] - snapshot and geometry types
//! - [`output`] - JSON output schemas
//!
//! # Example
//!
//! ```no_run
//! use pse_lib::{CapturedPage, StyleExtractor};
//! use std::path::Path;
//!
//! # async fn example() -> pse_lib::Result<()> {
//! let page = CapturedPage::load(Path::new("capture.json"))?;
//! let snapshot = StyleExtractor::default().extract_snapshot(&page).await?;
//! for issue in &snapshot.errors {
//!     eprintln!("{}: {}", issue.kind.as_str(), issue.message);
//! }
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod config;
pub mod css;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod output;
pub mod page;
pub mod progress;
pub mod types;

pub use browser::{
    BrowserManager, BrowserOptions, DEFAULT_NAVIGATION_TIMEOUT, DEFAULT_NETWORK_IDLE_TIMEOUT,
    DEFAULT_PROCESS_TIMEOUT,
};
pub use config::Config;
pub use error::{ErrorCategory, ErrorPayload, ExtractError, Result};
pub use extract::{ImportanceRules, RuleLimits, StyleExtractor};
pub use fetch::{FetchError, HttpFetcher, StylesheetFetcher};
pub use output::{ErrorOutput, ExtractOutput, PseOutput, PSE_OUTPUT_VERSION};
pub use page::{CapturedPage, Page, PageError, StyleSource, StylesheetSource};
pub use progress::ProgressCallback;
pub use types::{Snapshot, Viewport};
