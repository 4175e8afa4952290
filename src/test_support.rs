//! In-memory browser used by the unit and scenario tests
//!
//! The page is a deterministic pattern so stitched output can be compared with
//! the page pixel for pixel.

use crate::driver::{
    DEVICE_PIXEL_RATIO_SCRIPT, ENTIRE_SIZE_SCRIPT, HIDE_SCROLLBARS_SCRIPT,
    RESTORE_BODY_OVERFLOW_PREFIX, RESTORE_DOCUMENT_OVERFLOW_PREFIX, VIEWPORT_SIZE_SCRIPT,
};
use crate::{CaptureError, Driver, Point, Size};
use async_trait::async_trait;
use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use serde_json::{json, Value};
use std::io::Cursor;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

type ViewportFn = Box<dyn Fn(Size) -> Size + Send + Sync>;

pub struct PageSetup {
    pub window: Size,
    pub chrome: Size,
    /// Chrome size once the window has been resized at least once
    pub chrome_after_resize: Option<Size>,
    /// Overrides the window-to-viewport mapping
    pub viewport_of: Option<ViewportFn>,
    pub window_locked: bool,
    pub window_position_fails: bool,
    pub page: Size,
    pub device_pixel_ratio: f64,
    pub measurements_fail: bool,
    pub scroll_fails: bool,
    pub screenshot_fails: bool,
    pub restore_document_fails: bool,
    /// Cancels the token on the n-th screenshot (1-based) and never returns
    pub cancel_on_screenshot: Option<(usize, CancellationToken)>,
    /// Cancels the token once scrollbars are hidden, then yields before returning
    pub cancel_after_hide: Option<CancellationToken>,
}

impl Default for PageSetup {
    fn default() -> Self {
        Self {
            window: Size::new(1074, 868),
            chrome: Size::new(50, 100),
            chrome_after_resize: None,
            viewport_of: None,
            window_locked: false,
            window_position_fails: false,
            page: Size::new(1024, 2500),
            device_pixel_ratio: 1.0,
            measurements_fail: false,
            scroll_fails: false,
            screenshot_fails: false,
            restore_document_fails: false,
            cancel_on_screenshot: None,
            cancel_after_hide: None,
        }
    }
}

#[derive(Debug, Default)]
struct BrowserState {
    window: Size,
    resized: bool,
    scroll: Point,
    document_overflow: String,
    body_overflow: String,
    window_requests: Vec<Size>,
    window_positions: Vec<Point>,
    scripts: Vec<String>,
    screenshots: usize,
}

pub struct FakeBrowser {
    setup: PageSetup,
    content: RgbaImage,
    state: Mutex<BrowserState>,
}

/// Color of page pixel `(x, y)`; unique for every pixel of pages up to 4096 px wide
pub fn page_pixel(x: u32, y: u32) -> Rgba<u8> {
    Rgba([(x % 256) as u8, (y % 256) as u8, ((x / 256) * 16 + (y / 256) % 16) as u8, 255])
}

pub fn page_image(size: Size) -> RgbaImage {
    RgbaImage::from_fn(size.width, size.height, page_pixel)
}

pub fn encode_png(image: &RgbaImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image.clone())
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

impl FakeBrowser {
    pub fn new(setup: PageSetup) -> Self {
        let state = BrowserState {
            window: setup.window,
            document_overflow: "auto".to_string(),
            body_overflow: String::new(),
            ..Default::default()
        };
        Self {
            content: page_image(setup.page),
            setup,
            state: Mutex::new(state),
        }
    }

    pub fn content(&self) -> &RgbaImage {
        &self.content
    }

    pub fn viewport(&self) -> Size {
        let state = self.state.lock().unwrap();
        self.viewport_for(&state)
    }

    fn viewport_for(&self, state: &BrowserState) -> Size {
        if let Some(viewport_of) = &self.setup.viewport_of {
            return viewport_of(state.window);
        }
        let chrome = match self.setup.chrome_after_resize {
            Some(chrome) if state.resized => chrome,
            _ => self.setup.chrome,
        };
        Size::new(
            state.window.width.saturating_sub(chrome.width),
            state.window.height.saturating_sub(chrome.height),
        )
    }

    pub fn window_requests(&self) -> Vec<Size> {
        self.state.lock().unwrap().window_requests.clone()
    }

    pub fn window_positions(&self) -> Vec<Point> {
        self.state.lock().unwrap().window_positions.clone()
    }

    pub fn screenshots(&self) -> usize {
        self.state.lock().unwrap().screenshots
    }

    pub fn scroll(&self) -> Point {
        self.state.lock().unwrap().scroll
    }

    pub fn scripts(&self) -> Vec<String> {
        self.state.lock().unwrap().scripts.clone()
    }

    pub fn last_script(&self) -> Option<String> {
        self.state.lock().unwrap().scripts.last().cloned()
    }

    /// Current `(document, body)` overflow styles
    pub fn overflow(&self) -> (String, String) {
        let state = self.state.lock().unwrap();
        (state.document_overflow.clone(), state.body_overflow.clone())
    }

    fn clamp_scroll(&self, state: &BrowserState, requested: Point) -> Point {
        let viewport = self.viewport_for(state);
        let max_x = self.setup.page.width.saturating_sub(viewport.width) as i32;
        let max_y = self.setup.page.height.saturating_sub(viewport.height) as i32;
        Point::new(requested.x.clamp(0, max_x), requested.y.clamp(0, max_y))
    }

    fn render(&self, state: &BrowserState) -> RgbaImage {
        let viewport = self.viewport_for(state);
        let mut frame = RgbaImage::from_pixel(viewport.width, viewport.height, Rgba([255; 4]));
        let visible = imageops::crop_imm(
            &self.content,
            state.scroll.x as u32,
            state.scroll.y as u32,
            viewport.width,
            viewport.height,
        )
        .to_image();
        imageops::replace(&mut frame, &visible, 0, 0);

        let ratio = self.setup.device_pixel_ratio;
        if (ratio - 1.0).abs() < f64::EPSILON {
            frame
        } else {
            imageops::resize(
                &frame,
                (f64::from(viewport.width) * ratio) as u32,
                (f64::from(viewport.height) * ratio) as u32,
                FilterType::Nearest,
            )
        }
    }

    fn run_script(&self, script: &str) -> Result<Value, CaptureError> {
        let mut state = self.state.lock().unwrap();
        state.scripts.push(script.to_string());

        if script == VIEWPORT_SIZE_SCRIPT {
            let viewport = self.viewport_for(&state);
            return Ok(json!([viewport.width, viewport.height]));
        }
        if script == ENTIRE_SIZE_SCRIPT {
            if self.setup.measurements_fail {
                return Err(CaptureError::Script("document.body is null".to_string()));
            }
            return Ok(json!([self.setup.page.width, self.setup.page.height]));
        }
        if script == DEVICE_PIXEL_RATIO_SCRIPT {
            if self.setup.measurements_fail {
                return Ok(Value::Null);
            }
            return Ok(json!(self.setup.device_pixel_ratio));
        }
        if script == HIDE_SCROLLBARS_SCRIPT {
            let previous = json!([state.document_overflow, state.body_overflow]);
            state.document_overflow = "hidden".to_string();
            state.body_overflow = "hidden".to_string();
            return Ok(previous);
        }
        if let Some(rest) = script.strip_prefix(RESTORE_DOCUMENT_OVERFLOW_PREFIX) {
            if self.setup.restore_document_fails {
                return Err(CaptureError::Script("document is gone".to_string()));
            }
            state.document_overflow = parse_assigned(rest);
            return Ok(Value::Null);
        }
        if let Some(rest) = script.strip_prefix(RESTORE_BODY_OVERFLOW_PREFIX) {
            state.body_overflow = parse_assigned(rest);
            return Ok(Value::Null);
        }
        if script.starts_with("return [window.scrollX") {
            return Ok(json!([state.scroll.x, state.scroll.y]));
        }
        if let Some(args) = script.strip_prefix("window.scrollTo(") {
            if self.setup.scroll_fails {
                return Err(CaptureError::Script("scrolling is blocked".to_string()));
            }
            let coords: Vec<i32> = args
                .trim_end_matches(");")
                .split(',')
                .map(|part| part.trim().parse().unwrap())
                .collect();
            state.scroll = self.clamp_scroll(&state, Point::new(coords[0], coords[1]));
            return Ok(Value::Null);
        }
        if script.contains("getComputedStyle") {
            return Ok(json!("none"));
        }
        if script.starts_with("document.documentElement.style.transform") {
            return Ok(Value::Null);
        }
        Err(CaptureError::Script(format!("unexpected script: {script}")))
    }
}

fn parse_assigned(rest: &str) -> String {
    serde_json::from_str(rest.trim_end_matches(';')).unwrap()
}

#[async_trait]
impl Driver for FakeBrowser {
    async fn execute_script(&self, script: &str) -> Result<Value, CaptureError> {
        let result = self.run_script(script);
        if let Some(token) = &self.setup.cancel_after_hide {
            if script == HIDE_SCROLLBARS_SCRIPT {
                token.cancel();
                tokio::task::yield_now().await;
            }
        }
        result
    }

    async fn take_screenshot(&self) -> Result<Vec<u8>, CaptureError> {
        let (count, frame) = {
            let mut state = self.state.lock().unwrap();
            state.screenshots += 1;
            (state.screenshots, self.render(&state))
        };
        if let Some((at, token)) = &self.setup.cancel_on_screenshot {
            if count == *at {
                token.cancel();
                futures::future::pending::<()>().await;
            }
        }
        if self.setup.screenshot_fails {
            return Err(CaptureError::Driver("renderer crashed".to_string()));
        }
        Ok(encode_png(&frame))
    }

    async fn window_size(&self) -> Result<Size, CaptureError> {
        Ok(self.state.lock().unwrap().window)
    }

    async fn set_window_size(&self, size: Size) -> Result<(), CaptureError> {
        let mut state = self.state.lock().unwrap();
        state.window_requests.push(size);
        if !self.setup.window_locked {
            state.window = size;
            state.resized = true;
        }
        Ok(())
    }

    async fn set_window_position(&self, position: Point) -> Result<(), CaptureError> {
        if self.setup.window_position_fails {
            return Err(CaptureError::Driver("window manager refused move".to_string()));
        }
        self.state.lock().unwrap().window_positions.push(position);
        Ok(())
    }
}
