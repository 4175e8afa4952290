//! Drives the browser window until the page viewport has an exact size
//!
//! Browser chrome (toolbars, scrollbars, window borders) has an unknown size, so
//! the window is resized by the measured discrepancy and the viewport is measured
//! again. Two such passes cover most browsers; a short pixel-by-pixel search covers
//! zoomed pages where the viewport does not follow the window one-to-one.

use crate::driver::viewport_size;
use crate::{CaptureError, CaptureMetrics, Driver, Point, ResizeFailure, Size, SizerSettings};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Scratch state for one convergence run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewportTarget {
    pub required: Size,
    pub viewport: Size,
    pub window: Size,
}

impl ViewportTarget {
    pub fn is_reached(&self) -> bool {
        self.viewport == self.required
    }

    fn width_diff(&self) -> i64 {
        i64::from(self.viewport.width) - i64::from(self.required.width)
    }

    fn height_diff(&self) -> i64 {
        i64::from(self.viewport.height) - i64::from(self.required.height)
    }

    /// Current window grown by whatever the viewport is missing
    fn candidate_window(&self) -> Size {
        offset_size(self.window, -self.width_diff(), -self.height_diff())
    }
}

/// How a successful convergence went
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SizingReport {
    /// Viewport measurements taken, including the initial one
    pub measurements: usize,
    /// Window resize requests issued
    pub resize_requests: usize,
}

pub struct ViewportSizer<'a> {
    driver: &'a dyn Driver,
    settings: SizerSettings,
}

impl<'a> ViewportSizer<'a> {
    pub fn new(driver: &'a dyn Driver, settings: SizerSettings) -> Self {
        Self { driver, settings }
    }

    /// Makes the measured viewport equal `required`
    ///
    /// Fails with [`CaptureError::ResizeUnachievable`] when the window refuses to be
    /// resized or the search cannot close the gap. Callers may continue with the
    /// viewport that was achieved.
    pub async fn set_viewport_size(&self, required: Size) -> Result<SizingReport, CaptureError> {
        let mut report = SizingReport {
            measurements: 0,
            resize_requests: 0,
        };
        let mut target = ViewportTarget {
            required,
            viewport: self.measure(&mut report).await?,
            window: Size::default(),
        };
        if target.is_reached() {
            debug!("Viewport already {}", required);
            return self.succeed(report);
        }

        // The second pass absorbs border sizes that change once a maximized window is resized
        for pass in 1..=2 {
            target.window = self.driver.window_size().await?;
            let candidate = target.candidate_window();
            debug!(
                "Pass {}: viewport {}, window {}, requesting window {}",
                pass, target.viewport, target.window, candidate
            );

            self.move_to_origin().await;
            if !self.resize_window(candidate, &mut report).await? {
                return self.fail(&target, ResizeFailure::MechanismUnusable);
            }
            target.viewport = self.measure(&mut report).await?;
            if target.is_reached() {
                return self.succeed(report);
            }
        }

        let max_diff = i64::from(self.settings.max_search_diff);
        if target.width_diff().abs() > max_diff || target.height_diff().abs() > max_diff {
            warn!(
                "Viewport {} too far from {} for a pixel search",
                target.viewport, required
            );
            return self.fail(&target, ResizeFailure::SearchExhausted);
        }

        target.window = self.driver.window_size().await?;
        self.search(target, &mut report).await
    }

    /// Nudges the window a pixel at a time toward the required viewport
    async fn search(
        &self,
        mut target: ViewportTarget,
        report: &mut SizingReport,
    ) -> Result<SizingReport, CaptureError> {
        let width_diff = target.width_diff();
        let height_diff = target.height_diff();
        let width_step = if width_diff > 0 { -1 } else { 1 };
        let height_step = if height_diff > 0 { -1 } else { 1 };
        let base_window = target.window;

        // TODO: tune this budget against real zoom levels; it is kept as found, not derived
        let mut attempts_left = width_diff.abs().max(1) * height_diff.abs().max(1) * 2;
        let mut width_change = 0i64;
        let mut height_change = 0i64;
        let mut last_candidate: Option<Size> = None;

        loop {
            debug!("Pixel search, {} attempts left", attempts_left);
            if width_change.abs() <= width_diff.abs() && target.viewport.width != target.required.width {
                width_change += width_step;
            }
            if height_change.abs() <= height_diff.abs()
                && target.viewport.height != target.required.height
            {
                height_change += height_step;
            }

            let candidate = offset_size(base_window, width_change, height_change);
            if last_candidate == Some(candidate) {
                warn!("Window is {} but viewport is still {}", candidate, target.viewport);
                return self.fail(&target, ResizeFailure::SearchStalled);
            }

            if !self.resize_window(candidate, report).await? {
                debug!("Window did not settle at {}, measuring anyway", candidate);
            }
            last_candidate = Some(candidate);
            target.viewport = self.measure(report).await?;
            if target.is_reached() {
                return self.succeed(*report);
            }

            attempts_left -= 1;
            let in_range =
                width_change.abs() <= width_diff.abs() || height_change.abs() <= height_diff.abs();
            if !in_range || attempts_left <= 0 {
                return self.fail(&target, ResizeFailure::SearchExhausted);
            }
        }
    }

    /// Requests a window size, re-checking after a settle delay
    ///
    /// Returns false when the browser never reports the requested size.
    async fn resize_window(
        &self,
        size: Size,
        report: &mut SizingReport,
    ) -> Result<bool, CaptureError> {
        for attempt in 1..=self.settings.max_resize_attempts {
            report.resize_requests += 1;
            CaptureMetrics::record_resize_attempt();
            if let Err(e) = self.driver.set_window_size(size).await {
                warn!("Window resize to {} failed (attempt {}): {}", size, attempt, e);
            }
            sleep(self.settings.settle_delay).await;

            let actual = self.driver.window_size().await?;
            if actual == size {
                return Ok(true);
            }
            debug!(
                "Requested window {}, got {} (attempt {}/{})",
                size, actual, attempt, self.settings.max_resize_attempts
            );
        }
        Ok(false)
    }

    async fn move_to_origin(&self) {
        if let Err(e) = self.driver.set_window_position(Point::ZERO).await {
            warn!("Failed to move window to origin: {}", e);
        }
    }

    async fn measure(&self, report: &mut SizingReport) -> Result<Size, CaptureError> {
        report.measurements += 1;
        viewport_size(self.driver).await
    }

    fn succeed(&self, report: SizingReport) -> Result<SizingReport, CaptureError> {
        info!(
            "Viewport set after {} measurements and {} resize requests",
            report.measurements, report.resize_requests
        );
        CaptureMetrics::record_sizing(true);
        Ok(report)
    }

    fn fail(
        &self,
        target: &ViewportTarget,
        reason: ResizeFailure,
    ) -> Result<SizingReport, CaptureError> {
        warn!(
            "Could not set viewport to {} ({}), left at {}",
            target.required, reason, target.viewport
        );
        CaptureMetrics::record_sizing(false);
        Err(CaptureError::ResizeUnachievable {
            target: target.required,
            achieved: target.viewport,
            reason,
        })
    }
}

fn offset_size(size: Size, dx: i64, dy: i64) -> Size {
    let width = (i64::from(size.width) + dx).clamp(0, i64::from(u32::MAX));
    let height = (i64::from(size.height) + dy).clamp(0, i64::from(u32::MAX));
    Size::new(width as u32, height as u32)
}
