use metrics::{counter, histogram, increment_counter};
use std::time::Duration;

/// Capture pipeline metrics, reported through whatever `metrics` recorder is installed
pub struct CaptureMetrics;

impl CaptureMetrics {
    pub fn record_capture(duration: Duration, tiles: usize, success: bool) {
        if success {
            increment_counter!("page_capture_captures_total");
        } else {
            increment_counter!("page_capture_captures_failed_total");
        }
        counter!("page_capture_tiles_total", tiles as u64);
        histogram!("page_capture_duration_seconds", duration.as_secs_f64());
    }

    pub fn record_resize_attempt() {
        increment_counter!("page_capture_resize_attempts_total");
    }

    pub fn record_sizing(success: bool) {
        if success {
            increment_counter!("page_capture_viewport_converged_total");
        } else {
            increment_counter!("page_capture_viewport_unachievable_total");
        }
    }

    pub fn record_scroll_mismatch() {
        increment_counter!("page_capture_scroll_mismatches_total");
    }
}
