//! Assembles captured tiles into one image

use crate::{CaptureError, ImageBuffer, ImageOptions, Point, Region};
use image::imageops;
use image::{DynamicImage, RgbaImage};
use tracing::debug;

/// One captured part of the page
#[derive(Debug)]
pub struct Tile {
    /// Part of the page this tile was meant to cover
    pub region: Region,
    pub image: ImageBuffer,
    /// Where the pixels actually landed on the page
    pub position: Point,
}

/// Canvas covering `area`; tiles are placed at their page position
///
/// Later tiles overwrite earlier ones where they overlap.
pub struct Stitcher {
    area: Region,
    canvas: RgbaImage,
    options: ImageOptions,
    placed: usize,
}

impl Stitcher {
    pub fn new(area: Region, options: ImageOptions) -> Self {
        Self {
            area,
            canvas: RgbaImage::new(area.width, area.height),
            options,
            placed: 0,
        }
    }

    pub fn placed(&self) -> usize {
        self.placed
    }

    pub fn place(&mut self, tile: Tile) -> Result<(), CaptureError> {
        let x = i64::from(tile.position.x) - i64::from(self.area.left);
        let y = i64::from(tile.position.y) - i64::from(self.area.top);
        let pixels = tile.image.into_image()?.into_rgba8();
        debug!(
            "Placing {}x{} tile for {} at ({}, {})",
            pixels.width(),
            pixels.height(),
            tile.region,
            x,
            y
        );
        imageops::replace(&mut self.canvas, &pixels, x, y);
        self.placed += 1;
        Ok(())
    }

    pub fn finish(self) -> ImageBuffer {
        ImageBuffer::from_image(DynamicImage::ImageRgba8(self.canvas), self.options)
            .with_position(self.area.location())
    }
}

/// Places `tiles` in order onto a canvas covering `area`
pub fn stitch(
    area: Region,
    tiles: Vec<Tile>,
    options: ImageOptions,
) -> Result<ImageBuffer, CaptureError> {
    let mut stitcher = Stitcher::new(area, options);
    for tile in tiles {
        stitcher.place(tile)?;
    }
    Ok(stitcher.finish())
}
