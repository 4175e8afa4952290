//! # Page Capture
//!
//! Full-page screenshot capture for browser automation. A browser can only
//! screenshot what its viewport shows, so capturing a whole page (or an element
//! taller than the viewport) means scrolling through it tile by tile and
//! stitching the tiles back together.
//!
//! The crate covers the three problems that come with doing this reliably:
//!
//! - **Viewport sizing**: bring the viewport to an exact size by resizing the
//!   outer window, compensating for browser chrome and zoom.
//! - **Tiled capture**: scroll, capture, crop, scale and place tiles in raster
//!   order, restoring the page's scroll state and scrollbars afterwards.
//! - **Lazy images**: screenshot buffers decode and encode at most once.
//!
//! Everything talks to the browser through the [`Driver`] trait. [`ChromeDriver`]
//! implements it over the Chrome DevTools protocol.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use page_capture::{
//!     CaptureOrchestrator, CaptureRequest, ChromeSession, Config, ScrollPositionProvider,
//!     ViewportSizer,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let session = ChromeSession::launch(&config).await?;
//!     let driver = session.open(&"https://example.com".parse()?).await?;
//!
//!     ViewportSizer::new(&driver, config.sizer.clone())
//!         .set_viewport_size(config.viewport.size())
//!         .await?;
//!
//!     let position = ScrollPositionProvider::new(&driver);
//!     let output = CaptureOrchestrator::new(&driver, &position)
//!         .capture(&CaptureRequest::default())
//!         .await?;
//!     std::fs::write("page.png", output.image.to_bytes()?)?;
//!
//!     session.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## CLI Usage
//!
//! ```bash
//! page-capture capture --url https://example.com --output page.png --full-page
//! page-capture validate --config capture.json
//! ```

/// Configuration and settings
pub mod config;

/// Error types and error handling utilities
pub mod error;

/// Points, sizes, regions and tiling
pub mod geometry;

/// Screenshot buffers with lazy decoding and encoding
pub mod image_buffer;

/// Browser automation seam and page measurement scripts
pub mod driver;

/// Chrome DevTools implementation of the driver
pub mod chrome;

/// Scroll and CSS-translate positioning
pub mod position;

/// Scale and cut providers applied to every raw screenshot
pub mod providers;

/// Window resizing until the viewport reaches a target size
pub mod viewport;

/// Tile placement onto the final canvas
pub mod stitch;

/// The capture state machine
pub mod capture;

/// Command-line interface implementation
pub mod cli;

/// Capture metrics
pub mod metrics;

/// Utility functions and helpers
pub mod utils;

#[cfg(test)]
mod tests;

#[cfg(test)]
pub(crate) mod test_support;

pub use capture::*;
pub use chrome::*;
pub use cli::*;
pub use config::*;
pub use driver::Driver;
pub use error::*;
pub use geometry::*;
pub use image_buffer::*;
pub use metrics::*;
pub use position::*;
pub use providers::*;
pub use stitch::*;
pub use utils::*;
pub use viewport::*;
