//! Configuration management with serde serialization/deserialization
//!
//! This module provides the configuration structures for the capture pipeline:
//! viewport sizing, per-tile capture behavior, image handling and the browser
//! used by the command-line tool.

use crate::{CaptureError, FixedCutProvider, ImageOptions, Size};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure for the capture tool
///
/// # Examples
///
/// ```rust
/// use page_capture::Config;
///
/// // Use default configuration
/// let config = Config::default();
///
/// // Tablet-sized capture without scrollbars
/// let config = Config {
///     viewport: page_capture::Viewport { width: 768, height: 1024 },
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Target viewport the browser is driven to before capture (default: 1024x768)
    pub viewport: Viewport,

    /// Full-page capture behavior
    pub capture: CaptureSettings,

    /// Viewport convergence tuning
    pub sizer: SizerSettings,

    /// Image decoding capabilities
    pub image: ImageOptions,

    /// How captured images are brought back to CSS pixels (default: Auto)
    pub scale: ScaleMethod,

    /// Borders trimmed off every raw screenshot (default: none)
    pub cut: FixedCutProvider,

    /// Path to Chrome/Chromium executable (default: auto-detect)
    ///
    /// If None, chromiumoxide locates the Chrome installation itself.
    pub chrome_path: Option<String>,

    /// Run the browser without a visible window (default: true)
    pub headless: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            capture: CaptureSettings::default(),
            sizer: SizerSettings::default(),
            image: ImageOptions::default(),
            scale: ScaleMethod::default(),
            cut: FixedCutProvider::default(),
            chrome_path: None,
            headless: true,
        }
    }
}

impl Config {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(CaptureError::InvalidArgument(
                "Viewport dimensions must be greater than 0".to_string(),
            ));
        }

        if self.sizer.max_resize_attempts == 0 {
            return Err(CaptureError::InvalidArgument(
                "Resize attempts must be greater than 0".to_string(),
            ));
        }

        if self.capture.min_tile_height == 0 {
            return Err(CaptureError::InvalidArgument(
                "Minimum tile height must be greater than 0".to_string(),
            ));
        }

        if let ScaleMethod::Fixed(ratio) = self.scale {
            if !ratio.is_finite() || ratio <= 0.0 {
                return Err(CaptureError::InvalidArgument(format!(
                    "Scale ratio must be positive, got {ratio}"
                )));
            }
        }

        Ok(())
    }
}

/// Requested browser viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct Viewport {
    /// Viewport width in CSS pixels (default: 1024)
    pub width: u32,

    /// Viewport height in CSS pixels (default: 768)
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
        }
    }
}

impl Viewport {
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// Per-capture settings for the full-page pipeline
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Delay before every raw screenshot (default: none)
    ///
    /// Gives lazy content and scroll animations time to settle.
    pub wait_before_screenshots: Duration,

    /// Hide document and body scrollbars during capture (default: true)
    pub hide_scrollbars: bool,

    /// Pixels trimmed off the bottom of each tile (default: 50)
    ///
    /// Keeps fixed footers and horizontal scrollbars from repeating in every tile.
    pub scrollbar_clearance: u32,

    /// Smallest tile height used when the viewport is very short (default: 10)
    pub min_tile_height: u32,

    /// The device is declared landscape (default: false)
    ///
    /// Portrait screenshots from a landscape device are rotated automatically.
    pub landscape: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            wait_before_screenshots: Duration::ZERO,
            hide_scrollbars: true,
            scrollbar_clearance: 50,
            min_tile_height: 10,
            landscape: false,
        }
    }
}

/// Viewport convergence settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SizerSettings {
    /// Wait after each window resize before measuring (default: 1 second)
    pub settle_delay: Duration,

    /// Attempts per window resize before giving up (default: 3)
    pub max_resize_attempts: usize,

    /// Largest per-axis discrepancy the pixel search will try to close (default: 3)
    pub max_search_diff: u32,
}

impl Default for SizerSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_secs(1),
            max_resize_attempts: 3,
            max_search_diff: 3,
        }
    }
}

/// How captured images are scaled back to CSS pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize, Serialize)]
pub enum ScaleMethod {
    /// Derive the ratio from the device pixel ratio and page measurements
    #[default]
    Auto,
    /// Always scale by this ratio
    Fixed(f64),
    /// Never scale
    None,
}
