//! Headless page capture.
//!
//! Renders a live URL with Playwright via Node.js and returns a
//! [`CapturedPage`](crate::page::CapturedPage) the extractor can run against.
//!
//! # Module Structure
//!
//! - [`manager`] - capture session management with concurrency control
//! - [`playwright`] - the capture script and availability checks
//!
//! # Example
//!
//! ```no_run
//! use pse_lib::{BrowserManager, BrowserOptions, StyleExtractor};
//!
//! # async fn example() -> pse_lib::Result<()> {
//! let manager = BrowserManager::new(BrowserOptions::default());
//! let page = manager.capture_page("https://example.com").await?;
//! let snapshot = StyleExtractor::default().extract_snapshot(&page).await?;
//! println!("{} elements kept", snapshot.computed_styles.len());
//! # Ok(())
//! # }
//! ```

mod manager;
mod playwright;

pub use manager::{
    BrowserManager, BrowserOptions, DEFAULT_NAVIGATION_TIMEOUT, DEFAULT_NETWORK_IDLE_TIMEOUT,
    DEFAULT_PROCESS_TIMEOUT,
};
