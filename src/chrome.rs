//! Chrome DevTools backed [`Driver`]

use crate::{CaptureError, Config, Driver, Point, Size};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    Bounds, GetWindowForTargetParams, SetWindowBoundsParams, WindowId, WindowState,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use url::Url;

fn cdp_error(e: CdpError) -> CaptureError {
    CaptureError::Driver(e.to_string())
}

pub fn create_browser_config(config: &Config) -> Result<BrowserConfig, CaptureError> {
    let mut builder = BrowserConfig::builder()
        .window_size(config.viewport.width, config.viewport.height)
        .args(vec![
            "--no-sandbox",
            "--disable-gpu",
            "--disable-dev-shm-usage",
            "--no-first-run",
            "--no-default-browser-check",
        ]);

    if !config.headless {
        builder = builder.with_head();
    }
    if let Some(chrome_path) = &config.chrome_path {
        builder = builder.chrome_executable(chrome_path);
    }

    builder.build().map_err(CaptureError::Driver)
}

/// A launched browser and the task driving its DevTools connection
pub struct ChromeSession {
    browser: Browser,
    handler: JoinHandle<Result<(), CdpError>>,
}

impl ChromeSession {
    pub async fn launch(config: &Config) -> Result<Self, CaptureError> {
        let (browser, mut handler) = Browser::launch(create_browser_config(config)?)
            .await
            .map_err(cdp_error)?;

        // The handler is a stream and must be polled for any command to complete
        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("DevTools handler error: {}", e);
                    return Err(e);
                }
            }
            debug!("DevTools handler stream ended");
            Ok(())
        });

        info!("Browser launched");
        Ok(Self { browser, handler })
    }

    /// Opens `url` in a new tab and waits for it to load
    pub async fn open(&self, url: &Url) -> Result<ChromeDriver, CaptureError> {
        let page = self.browser.new_page(url.as_str()).await.map_err(cdp_error)?;
        page.wait_for_navigation().await.map_err(cdp_error)?;
        debug!("Loaded {}", url);
        Ok(ChromeDriver { page })
    }

    pub async fn close(mut self) -> Result<(), CaptureError> {
        let closed = self.browser.close().await.map(|_| ()).map_err(cdp_error);
        self.handler.abort();
        closed
    }
}

/// Drives one tab of a real browser
pub struct ChromeDriver {
    page: Page,
}

impl ChromeDriver {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    pub fn page(&self) -> &Page {
        &self.page
    }

    async fn window_bounds(&self) -> Result<(WindowId, Bounds), CaptureError> {
        let window = self
            .page
            .execute(GetWindowForTargetParams::default())
            .await
            .map_err(cdp_error)?;
        Ok((window.result.window_id.clone(), window.result.bounds.clone()))
    }

    async fn set_bounds(&self, bounds: Bounds) -> Result<(), CaptureError> {
        let (window_id, current) = self.window_bounds().await?;
        if matches!(
            current.window_state,
            Some(WindowState::Maximized | WindowState::Fullscreen | WindowState::Minimized)
        ) {
            // Bounds can only change in the normal state
            let mut normal = Bounds::default();
            normal.window_state = Some(WindowState::Normal);
            self.page
                .execute(SetWindowBoundsParams::new(window_id.clone(), normal))
                .await
                .map_err(cdp_error)?;
        }
        self.page
            .execute(SetWindowBoundsParams::new(window_id, bounds))
            .await
            .map_err(cdp_error)?;
        Ok(())
    }
}

#[async_trait]
impl Driver for ChromeDriver {
    async fn execute_script(&self, script: &str) -> Result<Value, CaptureError> {
        // Scripts are function bodies; wrap them so `return` is legal
        let expression = format!("(function() {{ {script} }})()");
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| CaptureError::Script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn take_screenshot(&self) -> Result<Vec<u8>, CaptureError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        self.page.screenshot(params).await.map_err(cdp_error)
    }

    async fn window_size(&self) -> Result<Size, CaptureError> {
        let (_, bounds) = self.window_bounds().await?;
        match (bounds.width, bounds.height) {
            (Some(width), Some(height)) => Ok(Size::new(
                width.max(0) as u32,
                height.max(0) as u32,
            )),
            _ => Err(CaptureError::MeasurementUnavailable(
                "window bounds without size".to_string(),
            )),
        }
    }

    async fn set_window_size(&self, size: Size) -> Result<(), CaptureError> {
        let mut bounds = Bounds::default();
        bounds.width = Some(i64::from(size.width));
        bounds.height = Some(i64::from(size.height));
        self.set_bounds(bounds).await
    }

    async fn set_window_position(&self, position: Point) -> Result<(), CaptureError> {
        let mut bounds = Bounds::default();
        bounds.left = Some(i64::from(position.x));
        bounds.top = Some(i64::from(position.y));
        self.set_bounds(bounds).await
    }
}
