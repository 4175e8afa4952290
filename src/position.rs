//! Logical scroll position of the page being captured

use crate::driver::{entire_page_size, parse_pair};
use crate::{CaptureError, Driver, Point, Size};
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

/// Snapshot taken by [`PositionProvider::state`] and handed back to `restore_state`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PositionMemento {
    pub position: Point,
    /// Original document transform, for providers that move the page with CSS
    pub transform: Option<String>,
}

#[async_trait]
pub trait PositionProvider: Send + Sync {
    async fn current_position(&self) -> Result<Point, CaptureError>;

    /// Moves to `position`; the page may clamp, so read back `current_position`
    async fn set_position(&self, position: Point) -> Result<(), CaptureError>;

    async fn entire_size(&self) -> Result<Size, CaptureError>;

    async fn state(&self) -> Result<PositionMemento, CaptureError>;

    async fn restore_state(&self, state: &PositionMemento) -> Result<(), CaptureError>;
}

/// Moves the page with `window.scrollTo`
pub struct ScrollPositionProvider<'a> {
    driver: &'a dyn Driver,
}

impl<'a> ScrollPositionProvider<'a> {
    pub fn new(driver: &'a dyn Driver) -> Self {
        Self { driver }
    }
}

#[async_trait]
impl PositionProvider for ScrollPositionProvider<'_> {
    async fn current_position(&self) -> Result<Point, CaptureError> {
        let value = self
            .driver
            .execute_script("return [window.scrollX || window.pageXOffset, window.scrollY || window.pageYOffset];")
            .await?;
        let (x, y) = parse_pair(&value, "scroll position")?;
        Ok(Point::new(x.round() as i32, y.round() as i32))
    }

    async fn set_position(&self, position: Point) -> Result<(), CaptureError> {
        debug!("Scrolling to {}", position);
        self.driver
            .execute_script(&format!("window.scrollTo({}, {});", position.x, position.y))
            .await
            .map(|_| ())
    }

    async fn entire_size(&self) -> Result<Size, CaptureError> {
        entire_page_size(self.driver).await
    }

    async fn state(&self) -> Result<PositionMemento, CaptureError> {
        Ok(PositionMemento {
            position: self.current_position().await?,
            transform: None,
        })
    }

    async fn restore_state(&self, state: &PositionMemento) -> Result<(), CaptureError> {
        self.set_position(state.position).await
    }
}

/// Moves the document element with a CSS translate instead of scrolling
///
/// Useful for pages that hijack scroll events. The position is whatever was last set,
/// since a transform cannot be clamped by the browser.
pub struct CssTranslatePositionProvider<'a> {
    driver: &'a dyn Driver,
    last_position: Mutex<Point>,
}

impl<'a> CssTranslatePositionProvider<'a> {
    pub fn new(driver: &'a dyn Driver) -> Self {
        Self {
            driver,
            last_position: Mutex::new(Point::ZERO),
        }
    }

    async fn set_transform(&self, transform: &str) -> Result<(), CaptureError> {
        let script = format!(
            "document.documentElement.style.transform = {0}; \
             document.documentElement.style.webkitTransform = {0};",
            Value::from(transform)
        );
        self.driver.execute_script(&script).await.map(|_| ())
    }
}

#[async_trait]
impl PositionProvider for CssTranslatePositionProvider<'_> {
    async fn current_position(&self) -> Result<Point, CaptureError> {
        Ok(*self.last_position.lock().await)
    }

    async fn set_position(&self, position: Point) -> Result<(), CaptureError> {
        debug!("Translating document to {}", position);
        self.set_transform(&format!(
            "translate({}px, {}px)",
            -position.x, -position.y
        ))
        .await?;
        *self.last_position.lock().await = position;
        Ok(())
    }

    async fn entire_size(&self) -> Result<Size, CaptureError> {
        entire_page_size(self.driver).await
    }

    async fn state(&self) -> Result<PositionMemento, CaptureError> {
        let transform = self.driver.computed_style("html", "transform").await?;
        Ok(PositionMemento {
            position: *self.last_position.lock().await,
            transform: Some(transform),
        })
    }

    async fn restore_state(&self, state: &PositionMemento) -> Result<(), CaptureError> {
        let transform = match state.transform.as_deref() {
            None | Some("none") => "",
            Some(other) => other,
        };
        self.set_transform(transform).await?;
        *self.last_position.lock().await = state.position;
        Ok(())
    }
}
