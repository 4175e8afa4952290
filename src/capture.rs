//! Full-page capture orchestration
//!
//! A capture walks through the states of [`CaptureState`]: it measures the page,
//! hides scrollbars, captures the origin tile, decides whether tiling is needed,
//! captures the remaining tiles in raster order and stitches them. Whatever was
//! changed in the page is restored on every exit path, including failure and
//! cancellation.
//!
//! All driver calls are strictly sequential; each step depends on the measured
//! effect of the previous one.

use crate::driver::{
    device_pixel_ratio, hide_scrollbars, restore_body_overflow, restore_document_overflow,
    viewport_size, SavedOverflow,
};
use crate::position::PositionMemento;
use crate::stitch::{Stitcher, Tile};
use crate::{
    CaptureError, CaptureMetrics, CaptureSettings, ContextBasedScaleProviderFactory,
    CoordinatesType, CutProvider, Driver, FixedScaleProviderFactory, ImageBuffer, ImageOptions,
    NullCutProvider, NullScaleProviderFactory, Point, PositionProvider, Region, ScaleMethod,
    ScaleProviderFactory, Size,
};
use std::future::Future;
use std::time::Instant;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    MeasuringPage,
    PreparingChrome,
    CapturingOrigin,
    TilingDecision,
    CapturingTiles,
    Stitching,
    RestoringChrome,
    Done,
    Failed,
}

/// What part of the page to capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Only what is currently visible
    Viewport,
    /// The whole scrollable page
    FullPage,
    /// A sub-region (element or frame) in page coordinates
    Region(Region),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub mode: CaptureMode,
    pub hide_scrollbars: bool,
}

impl Default for CaptureRequest {
    fn default() -> Self {
        Self {
            mode: CaptureMode::FullPage,
            hide_scrollbars: true,
        }
    }
}

/// A scroll that did not land where it was asked to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrollMismatch {
    pub requested: Point,
    pub achieved: Point,
}

#[derive(Debug)]
pub struct CaptureOutput {
    pub image: ImageBuffer,
    /// Page coordinates of the image's top-left pixel
    pub location: Point,
    /// Number of tiles placed, 1 when no tiling happened
    pub tiles: usize,
    pub page_size: Size,
    pub viewport: Size,
    pub device_pixel_ratio: f64,
    pub scroll_mismatches: Vec<ScrollMismatch>,
    /// Restoration steps that failed; the capture itself still succeeded
    pub restore_errors: Vec<CaptureError>,
    /// States visited, in order
    pub states: Vec<CaptureState>,
}

/// Everything to undo once the capture ends
#[derive(Debug, Default)]
struct RestorePoint {
    position: Option<PositionMemento>,
    overflow: Option<SavedOverflow>,
}

#[derive(Debug)]
struct CaptureRun {
    id: Uuid,
    states: Vec<CaptureState>,
    restore: RestorePoint,
    mismatches: Vec<ScrollMismatch>,
    page_size: Size,
    viewport: Size,
    device_pixel_ratio: f64,
}

impl CaptureRun {
    fn enter(&mut self, state: CaptureState) {
        debug!("Capture {}: {:?}", self.id, state);
        self.states.push(state);
    }
}

/// Measurements that may have failed; fallbacks are applied once a capture exists
#[derive(Debug, Clone, Copy)]
struct Measured {
    viewport: Option<Size>,
    page: Option<Size>,
}

struct Captured {
    image: ImageBuffer,
    location: Point,
    tiles: usize,
}

pub struct CaptureOrchestrator<'a> {
    driver: &'a dyn Driver,
    position: &'a dyn PositionProvider,
    cut: &'a dyn CutProvider,
    scale_factory: Option<&'a dyn ScaleProviderFactory>,
    scale: ScaleMethod,
    settings: CaptureSettings,
    image_options: ImageOptions,
    cancel: CancellationToken,
}

impl<'a> CaptureOrchestrator<'a> {
    pub fn new(driver: &'a dyn Driver, position: &'a dyn PositionProvider) -> Self {
        Self {
            driver,
            position,
            cut: &NullCutProvider,
            scale_factory: None,
            scale: ScaleMethod::Auto,
            settings: CaptureSettings::default(),
            image_options: ImageOptions::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_settings(mut self, settings: CaptureSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_image_options(mut self, options: ImageOptions) -> Self {
        self.image_options = options;
        self
    }

    pub fn with_cut_provider(mut self, cut: &'a dyn CutProvider) -> Self {
        self.cut = cut;
        self
    }

    pub fn with_scale_method(mut self, scale: ScaleMethod) -> Self {
        self.scale = scale;
        self
    }

    /// Overrides the scale method with an explicit factory
    pub fn with_scale_factory(mut self, factory: &'a dyn ScaleProviderFactory) -> Self {
        self.scale_factory = Some(factory);
        self
    }

    /// Aborts the capture at its next suspension point once `token` is cancelled
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub async fn capture(&self, request: &CaptureRequest) -> Result<CaptureOutput, CaptureError> {
        let started = Instant::now();
        let mut run = CaptureRun {
            id: Uuid::new_v4(),
            states: vec![CaptureState::Idle],
            restore: RestorePoint::default(),
            mismatches: Vec::new(),
            page_size: Size::default(),
            viewport: Size::default(),
            device_pixel_ratio: 1.0,
        };
        info!("Starting capture {} ({:?})", run.id, request.mode);

        let outcome = self.run(request, &mut run).await;

        run.enter(CaptureState::RestoringChrome);
        let restore_errors = self.restore(std::mem::take(&mut run.restore)).await;

        match outcome {
            Ok(captured) => {
                run.enter(CaptureState::Done);
                CaptureMetrics::record_capture(started.elapsed(), captured.tiles, true);
                info!(
                    "Capture {} finished: {} tile(s) in {:?}",
                    run.id,
                    captured.tiles,
                    started.elapsed()
                );
                Ok(CaptureOutput {
                    image: captured.image,
                    location: captured.location,
                    tiles: captured.tiles,
                    page_size: run.page_size,
                    viewport: run.viewport,
                    device_pixel_ratio: run.device_pixel_ratio,
                    scroll_mismatches: run.mismatches,
                    restore_errors,
                    states: run.states,
                })
            }
            Err(e) => {
                run.enter(CaptureState::Failed);
                CaptureMetrics::record_capture(started.elapsed(), 0, false);
                warn!("Capture {} failed: {}", run.id, e);
                Err(e)
            }
        }
    }

    /// Measures, prepares and captures
    ///
    /// Measuring and capturing stop at the first suspension point after cancellation.
    /// Preparation is never interrupted, so every page change it makes is in the
    /// restore point before cancellation is looked at again.
    async fn run(
        &self,
        request: &CaptureRequest,
        run: &mut CaptureRun,
    ) -> Result<Captured, CaptureError> {
        let measured = self.until_cancelled(self.measure(run)).await?;
        self.prepare(request, run).await;
        self.until_cancelled(self.capture_area(request, run, measured)).await
    }

    async fn until_cancelled<T>(
        &self,
        work: impl Future<Output = Result<T, CaptureError>>,
    ) -> Result<T, CaptureError> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(CaptureError::Cancelled),
            result = work => result,
        }
    }

    async fn measure(&self, run: &mut CaptureRun) -> Result<Measured, CaptureError> {
        run.enter(CaptureState::MeasuringPage);
        run.device_pixel_ratio = match device_pixel_ratio(self.driver).await {
            Ok(ratio) => ratio,
            Err(e) => {
                warn!("Device pixel ratio unavailable, assuming 1: {}", e);
                1.0
            }
        };
        let measured_viewport = match viewport_size(self.driver).await {
            Ok(size) => Some(size),
            Err(e) => {
                warn!("Viewport size unavailable, using first capture instead: {}", e);
                None
            }
        };
        let measured_page = match self.position.entire_size().await {
            Ok(size) => Some(size),
            Err(e) => {
                warn!("Page size unavailable, assuming viewport size: {}", e);
                None
            }
        };
        Ok(Measured {
            viewport: measured_viewport,
            page: measured_page,
        })
    }

    /// Saves the scroll state and hides scrollbars, recording both for restoration
    async fn prepare(&self, request: &CaptureRequest, run: &mut CaptureRun) {
        match self.position.state().await {
            Ok(state) => run.restore.position = Some(state),
            Err(e) => warn!("Could not save scroll state: {}", e),
        }

        if request.hide_scrollbars {
            run.enter(CaptureState::PreparingChrome);
            match hide_scrollbars(self.driver).await {
                Ok(saved) => run.restore.overflow = Some(saved),
                Err(e) => warn!("Could not hide scrollbars: {}", e),
            }
        }
    }

    async fn capture_area(
        &self,
        request: &CaptureRequest,
        run: &mut CaptureRun,
        measured: Measured,
    ) -> Result<Captured, CaptureError> {
        let Measured {
            viewport: measured_viewport,
            page: measured_page,
        } = measured;
        let provisional_viewport = measured_viewport
            .or(measured_page)
            .unwrap_or_default();
        let owned_factory: Box<dyn ScaleProviderFactory>;
        let scale_factory: &dyn ScaleProviderFactory = match self.scale_factory {
            Some(factory) => factory,
            None => {
                owned_factory = self.build_scale_factory(
                    measured_page.unwrap_or(provisional_viewport),
                    provisional_viewport,
                    run.device_pixel_ratio,
                )?;
                owned_factory.as_ref()
            }
        };

        run.enter(CaptureState::CapturingOrigin);
        if request.mode == CaptureMode::Viewport {
            let scroll = self.position.current_position().await.unwrap_or_default();
            let image = self
                .capture_viewport_image(scale_factory, None, scroll, measured_viewport)
                .await?;
            run.viewport = measured_viewport.map_or_else(|| image.size(), Ok)?;
            run.page_size = measured_page.unwrap_or(run.viewport);
            return Ok(Captured {
                location: image.position(),
                image,
                tiles: 1,
            });
        }

        // Origin tile, taken at the top-left of the target area
        let page_bounds_hint = measured_page.unwrap_or(provisional_viewport);
        let start = match request.mode {
            CaptureMode::Region(region) => region.location(),
            _ => Point::ZERO,
        };
        let origin_scroll = self.scroll_to(start, run).await?;
        let origin = self
            .capture_viewport_image(scale_factory, None, origin_scroll, measured_viewport)
            .await?;
        let origin_size = origin.size()?;
        run.viewport = measured_viewport.unwrap_or(origin_size);
        run.page_size = if measured_page.is_some() {
            page_bounds_hint
        } else {
            run.viewport
        };

        let page_bounds = Region::from_parts(Point::ZERO, run.page_size)
            .with_coordinates(CoordinatesType::ContextRelative);
        let area = match request.mode {
            CaptureMode::Region(region) => page_bounds.intersect(&region),
            _ => page_bounds,
        };
        if area.is_size_empty() {
            return Err(CaptureError::InvalidArgument(format!(
                "capture area {:?} lies outside the {} page",
                request.mode, run.page_size
            )));
        }

        run.enter(CaptureState::TilingDecision);
        // Target area as it appears in the origin screenshot
        let in_screenshot = area
            .offset(-origin_scroll.x, -origin_scroll.y)
            .with_coordinates(CoordinatesType::ScreenshotAsIs);
        let origin_bounds = Region::from_parts(Point::ZERO, origin_size);
        if origin_bounds.contains(&in_screenshot) {
            debug!("Origin capture covers {}, no tiling needed", area);
            let image = origin.crop(in_screenshot)?.with_position(area.location());
            return Ok(Captured {
                image,
                location: area.location(),
                tiles: 1,
            });
        }

        let tile_height = origin_size
            .height
            .saturating_sub(self.settings.scrollbar_clearance)
            .max(self.settings.min_tile_height);
        let tile_size = Size::new(origin_size.width, tile_height);
        let regions = area.sub_regions(tile_size, false)?;
        info!(
            "Tiling {} into {} tile(s) of {}",
            area,
            regions.len(),
            tile_size
        );

        let mut stitcher = Stitcher::new(area, self.image_options);
        let mut regions = regions.into_iter();
        if let Some(first) = regions.next() {
            // The origin capture was taken at the first tile's offset; reuse it
            let crop = first.offset(-origin_scroll.x, -origin_scroll.y);
            let image = origin.crop(crop)?;
            stitcher.place(Tile {
                region: first,
                position: origin_scroll.offset(crop.left.max(0), crop.top.max(0)),
                image,
            })?;
        }

        run.enter(CaptureState::CapturingTiles);
        for region in regions {
            let scroll = self.scroll_to(region.location(), run).await?;
            let crop = region
                .offset(-scroll.x, -scroll.y)
                .intersect(&Region::from_parts(Point::ZERO, run.viewport));
            if crop.is_size_empty() {
                warn!("Tile {} not visible from scroll position {}, skipping", region, scroll);
                continue;
            }
            let image = self
                .capture_viewport_image(scale_factory, Some(crop), scroll, Some(run.viewport))
                .await?;
            debug!("Captured tile {} from scroll position {}", region, scroll);
            stitcher.place(Tile {
                region,
                position: image.position(),
                image,
            })?;
        }

        run.enter(CaptureState::Stitching);
        let tiles = stitcher.placed();
        let image = stitcher.finish();
        Ok(Captured {
            image,
            location: area.location(),
            tiles,
        })
    }

    /// Scrolls to `requested` and returns where the page actually ended up
    async fn scroll_to(&self, requested: Point, run: &mut CaptureRun) -> Result<Point, CaptureError> {
        if let Err(e) = self.position.set_position(requested).await {
            warn!("Scroll to {} failed: {}", requested, e);
        }
        let achieved = self.position.current_position().await?;
        if achieved != requested {
            debug!(
                "{}",
                CaptureError::ScrollFailure {
                    requested,
                    achieved
                }
            );
            CaptureMetrics::record_scroll_mismatch();
            run.mismatches.push(ScrollMismatch {
                requested,
                achieved,
            });
        }
        Ok(achieved)
    }

    /// Takes one viewport screenshot and brings it into page (CSS pixel) space
    ///
    /// `crop` is in CSS pixels relative to the viewport; it is scaled to match the raw
    /// screenshot before cropping.
    async fn capture_viewport_image(
        &self,
        scale_factory: &dyn ScaleProviderFactory,
        crop: Option<Region>,
        scroll: Point,
        viewport: Option<Size>,
    ) -> Result<ImageBuffer, CaptureError> {
        if !self.settings.wait_before_screenshots.is_zero() {
            sleep(self.settings.wait_before_screenshots).await;
        }
        let bytes = self.driver.take_screenshot().await?;
        let mut image = self.cut.cut(ImageBuffer::from_bytes(bytes, self.image_options))?;

        let raw_size = image.size()?;
        let degrees = if self.settings.landscape && raw_size.height > raw_size.width {
            debug!("Landscape device captured portrait {}, rotating", raw_size);
            -90
        } else {
            0
        };
        let ratio = scale_factory.scale_ratio(raw_size.width);

        if let Some(region) = crop {
            image = image.crop(region.scale(1.0 / ratio))?;
        }
        let image = image.scale(ratio)?.rotate(degrees)?;

        let size = image.size()?;
        let smaller_than_viewport = viewport.is_some_and(|viewport| !size.covers(viewport));
        let location = match crop {
            Some(region) if smaller_than_viewport => scroll.offset(region.left, region.top),
            _ => scroll,
        };
        Ok(image.with_position(location))
    }

    fn build_scale_factory(
        &self,
        page: Size,
        viewport: Size,
        device_pixel_ratio: f64,
    ) -> Result<Box<dyn ScaleProviderFactory>, CaptureError> {
        Ok(match self.scale {
            ScaleMethod::Auto => Box::new(ContextBasedScaleProviderFactory::new(
                page,
                viewport,
                device_pixel_ratio,
            )),
            ScaleMethod::Fixed(ratio) => Box::new(FixedScaleProviderFactory::new(ratio)?),
            ScaleMethod::None => Box::new(NullScaleProviderFactory),
        })
    }

    /// Undoes page changes in reverse order; every step runs regardless of the others
    async fn restore(&self, point: RestorePoint) -> Vec<CaptureError> {
        let mut errors = Vec::new();
        if let Some(overflow) = &point.overflow {
            if let Err(e) = restore_body_overflow(self.driver, &overflow.body).await {
                warn!("Failed to restore body overflow: {}", e);
                errors.push(e);
            }
            if let Err(e) = restore_document_overflow(self.driver, &overflow.document).await {
                warn!("Failed to restore document overflow: {}", e);
                errors.push(e);
            }
        }
        if let Some(state) = &point.position {
            if let Err(e) = self.position.restore_state(state).await {
                warn!("Failed to restore scroll state: {}", e);
                errors.push(e);
            }
        }
        errors
    }
}
