//! Browser driver seam and the page measurements built on top of it
//!
//! The capture pipeline never talks to a browser directly. Everything it needs
//! goes through [`Driver`], which the Chrome adapter and the test browser both
//! implement.

use crate::{CaptureError, Point, Size};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

pub const VIEWPORT_SIZE_SCRIPT: &str = "var height = undefined; var width = undefined; \
if (window.innerHeight) { height = window.innerHeight; } \
else if (document.documentElement && document.documentElement.clientHeight) { height = document.documentElement.clientHeight; } \
else { var b = document.getElementsByTagName('body')[0]; if (b.clientHeight) { height = b.clientHeight; } } \
if (window.innerWidth) { width = window.innerWidth; } \
else if (document.documentElement && document.documentElement.clientWidth) { width = document.documentElement.clientWidth; } \
else { var b = document.getElementsByTagName('body')[0]; if (b.clientWidth) { width = b.clientWidth; } } \
return [width, height];";

pub const ENTIRE_SIZE_SCRIPT: &str = "var scrollWidth = document.documentElement.scrollWidth; \
var bodyScrollWidth = document.body.scrollWidth; \
var totalWidth = Math.max(scrollWidth, bodyScrollWidth); \
var clientHeight = document.documentElement.clientHeight; \
var bodyClientHeight = document.body.clientHeight; \
var scrollHeight = document.documentElement.scrollHeight; \
var bodyScrollHeight = document.body.scrollHeight; \
var maxDocElementHeight = Math.max(clientHeight, scrollHeight); \
var maxBodyHeight = Math.max(bodyClientHeight, bodyScrollHeight); \
var totalHeight = Math.max(maxDocElementHeight, maxBodyHeight); \
return [totalWidth, totalHeight];";

pub const DEVICE_PIXEL_RATIO_SCRIPT: &str = "return window.devicePixelRatio;";

/// Hides both scrollbars and returns the previous `[document, body]` overflow values
pub const HIDE_SCROLLBARS_SCRIPT: &str = "var d = document.documentElement.style.overflow; \
var b = document.body.style.overflow; \
document.documentElement.style.overflow = 'hidden'; \
document.body.style.overflow = 'hidden'; \
return [d, b];";

pub const RESTORE_DOCUMENT_OVERFLOW_PREFIX: &str = "document.documentElement.style.overflow = ";
pub const RESTORE_BODY_OVERFLOW_PREFIX: &str = "document.body.style.overflow = ";

/// Minimal set of browser operations the capture pipeline relies on
#[async_trait]
pub trait Driver: Send + Sync {
    /// Runs a script body (it may `return` a value) in the current page
    async fn execute_script(&self, script: &str) -> Result<Value, CaptureError>;

    /// Captures the visible viewport as encoded PNG bytes
    async fn take_screenshot(&self) -> Result<Vec<u8>, CaptureError>;

    /// Outer size of the browser window
    async fn window_size(&self) -> Result<Size, CaptureError>;

    async fn set_window_size(&self, size: Size) -> Result<(), CaptureError>;

    async fn set_window_position(&self, position: Point) -> Result<(), CaptureError>;

    /// Computed CSS value of `property` on the first element matching `selector`
    ///
    /// Falls back to the element's inline style when `getComputedStyle` is missing.
    async fn computed_style(&self, selector: &str, property: &str) -> Result<String, CaptureError> {
        let script = format!(
            "var el = document.querySelector({selector}); \
             if (!el) {{ return null; }} \
             if (window.getComputedStyle) {{ return window.getComputedStyle(el, null).getPropertyValue({property}); }} \
             return el.style[{property}];",
            selector = Value::from(selector),
            property = Value::from(property),
        );
        match self.execute_script(&script).await? {
            Value::String(value) => Ok(value),
            Value::Null => Err(CaptureError::Script(format!(
                "no element matches {selector}"
            ))),
            other => Ok(other.to_string()),
        }
    }
}

/// Overflow styles saved while scrollbars are hidden
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedOverflow {
    pub document: String,
    pub body: String,
}

pub(crate) fn parse_pair(value: &Value, what: &str) -> Result<(f64, f64), CaptureError> {
    let pair = value
        .as_array()
        .filter(|items| items.len() == 2)
        .ok_or_else(|| CaptureError::MeasurementUnavailable(format!("{what}: got {value}")))?;
    match (pair[0].as_f64(), pair[1].as_f64()) {
        (Some(first), Some(second)) => Ok((first, second)),
        _ => Err(CaptureError::MeasurementUnavailable(format!(
            "{what}: got {value}"
        ))),
    }
}

fn to_size(pair: (f64, f64)) -> Size {
    Size::new(pair.0.max(0.0).round() as u32, pair.1.max(0.0).round() as u32)
}

/// Size of the visible rendering area, excluding browser chrome
pub async fn viewport_size(driver: &dyn Driver) -> Result<Size, CaptureError> {
    let value = driver.execute_script(VIEWPORT_SIZE_SCRIPT).await?;
    let size = to_size(parse_pair(&value, "viewport size")?);
    debug!("Measured viewport size {}", size);
    Ok(size)
}

/// Full scrollable size of the current document
pub async fn entire_page_size(driver: &dyn Driver) -> Result<Size, CaptureError> {
    let value = driver.execute_script(ENTIRE_SIZE_SCRIPT).await?;
    Ok(to_size(parse_pair(&value, "entire page size")?))
}

pub async fn device_pixel_ratio(driver: &dyn Driver) -> Result<f64, CaptureError> {
    let value = driver.execute_script(DEVICE_PIXEL_RATIO_SCRIPT).await?;
    value
        .as_f64()
        .filter(|ratio| ratio.is_finite() && *ratio > 0.0)
        .ok_or_else(|| CaptureError::MeasurementUnavailable(format!("device pixel ratio: got {value}")))
}

/// Hides document and body scrollbars, returning what to restore afterwards
pub async fn hide_scrollbars(driver: &dyn Driver) -> Result<SavedOverflow, CaptureError> {
    let value = driver.execute_script(HIDE_SCROLLBARS_SCRIPT).await?;
    let saved = match value.as_array().map(Vec::as_slice) {
        Some([document, body]) => SavedOverflow {
            document: document.as_str().unwrap_or_default().to_string(),
            body: body.as_str().unwrap_or_default().to_string(),
        },
        _ => {
            warn!("Unexpected overflow reply {}, restoring to defaults", value);
            SavedOverflow::default()
        }
    };
    debug!("Scrollbars hidden, saved overflow {:?}", saved);
    Ok(saved)
}

pub async fn restore_document_overflow(driver: &dyn Driver, value: &str) -> Result<(), CaptureError> {
    let script = format!("{RESTORE_DOCUMENT_OVERFLOW_PREFIX}{};", Value::from(value));
    driver.execute_script(&script).await.map(|_| ())
}

pub async fn restore_body_overflow(driver: &dyn Driver, value: &str) -> Result<(), CaptureError> {
    let script = format!("{RESTORE_BODY_OVERFLOW_PREFIX}{};", Value::from(value));
    driver.execute_script(&script).await.map(|_| ())
}
