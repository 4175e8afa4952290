//! Scale and cut providers applied to every captured viewport image

use crate::{CaptureError, ImageBuffer, Region, Size};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Allowed deviation, in pixels, when matching an image width to a known width
const ALLOWED_WIDTH_DEVIATION: u32 = 1;

/// Picks the ratio that brings a captured image back to CSS pixels
#[cfg_attr(test, mockall::automock)]
pub trait ScaleProviderFactory: Send + Sync {
    fn scale_ratio(&self, measured_width: u32) -> f64;
}

/// Never scales
#[derive(Debug, Clone, Copy, Default)]
pub struct NullScaleProviderFactory;

impl ScaleProviderFactory for NullScaleProviderFactory {
    fn scale_ratio(&self, _measured_width: u32) -> f64 {
        1.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedScaleProviderFactory {
    ratio: f64,
}

impl FixedScaleProviderFactory {
    pub fn new(ratio: f64) -> Result<Self, CaptureError> {
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(CaptureError::InvalidArgument(format!(
                "scale ratio must be positive, got {ratio}"
            )));
        }
        Ok(Self { ratio })
    }
}

impl ScaleProviderFactory for FixedScaleProviderFactory {
    fn scale_ratio(&self, _measured_width: u32) -> f64 {
        self.ratio
    }
}

/// Derives the ratio from page measurements taken before capture
///
/// An image as wide as the viewport or as the page is already in CSS pixels.
/// Anything else is assumed to be in device pixels.
#[derive(Debug, Clone, Copy)]
pub struct ContextBasedScaleProviderFactory {
    entire_size: Size,
    viewport_size: Size,
    device_pixel_ratio: f64,
}

impl ContextBasedScaleProviderFactory {
    pub fn new(entire_size: Size, viewport_size: Size, device_pixel_ratio: f64) -> Self {
        Self {
            entire_size,
            viewport_size,
            device_pixel_ratio,
        }
    }
}

impl ScaleProviderFactory for ContextBasedScaleProviderFactory {
    fn scale_ratio(&self, measured_width: u32) -> f64 {
        let matches = |width: u32| measured_width.abs_diff(width) <= ALLOWED_WIDTH_DEVIATION;
        if matches(self.viewport_size.width) || matches(self.entire_size.width) {
            return 1.0;
        }
        let ratio = 1.0 / self.device_pixel_ratio;
        debug!(
            "Image width {} differs from viewport {}, scaling by {}",
            measured_width, self.viewport_size.width, ratio
        );
        ratio
    }
}

/// Trims browser decorations off a raw screenshot
#[cfg_attr(test, mockall::automock)]
pub trait CutProvider: Send + Sync {
    fn cut(&self, image: ImageBuffer) -> Result<ImageBuffer, CaptureError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullCutProvider;

impl CutProvider for NullCutProvider {
    fn cut(&self, image: ImageBuffer) -> Result<ImageBuffer, CaptureError> {
        Ok(image)
    }
}

/// Removes fixed-size borders from each side
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct FixedCutProvider {
    pub header: u32,
    pub footer: u32,
    pub left: u32,
    pub right: u32,
}

impl CutProvider for FixedCutProvider {
    fn cut(&self, image: ImageBuffer) -> Result<ImageBuffer, CaptureError> {
        if *self == Self::default() {
            return Ok(image);
        }
        let size = image.size()?;
        let width = size.width.saturating_sub(self.left.saturating_add(self.right));
        let height = size.height.saturating_sub(self.header.saturating_add(self.footer));
        if width == 0 || height == 0 {
            return Err(CaptureError::InvalidArgument(format!(
                "cut {self:?} leaves nothing of a {size} image"
            )));
        }
        image.crop(Region::new(
            self.left as i32,
            self.header as i32,
            width,
            height,
        ))
    }
}
