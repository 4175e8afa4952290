//! Pixel geometry: points, sizes and coordinate-tagged regions
//!
//! All arithmetic is exact integer arithmetic. Regions are plain values; every
//! operation returns a new region rather than mutating its receiver.

use crate::CaptureError;
use serde::{Deserialize, Serialize};

/// Integer pixel offset
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const ZERO: Point = Point { x: 0, y: 0 };

    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }
}

impl std::fmt::Display for Point {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Non-negative pixel dimensions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Whether both dimensions are at least those of `other`
    pub fn covers(&self, other: Size) -> bool {
        self.width >= other.width && self.height >= other.height
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Which coordinate space a region is expressed in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoordinatesType {
    /// Pixels as they appear in a raw screenshot
    #[default]
    ScreenshotAsIs,
    /// Relative to the visible part of the current context
    ContextAsIs,
    /// Relative to the full logical page of the current context
    ContextRelative,
}

/// A rectangle tagged with its coordinate space
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub coordinates: CoordinatesType,
}

impl Region {
    pub const EMPTY: Region = Region {
        left: 0,
        top: 0,
        width: 0,
        height: 0,
        coordinates: CoordinatesType::ScreenshotAsIs,
    };

    pub const fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
            coordinates: CoordinatesType::ScreenshotAsIs,
        }
    }

    pub fn from_parts(location: Point, size: Size) -> Self {
        Self::new(location.x, location.y, size.width, size.height)
    }

    pub fn with_coordinates(mut self, coordinates: CoordinatesType) -> Self {
        self.coordinates = coordinates;
        self
    }

    /// True for the canonical EMPTY region only
    pub fn is_empty(&self) -> bool {
        self.left == 0 && self.top == 0 && self.width == 0 && self.height == 0
    }

    pub fn is_size_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn right(&self) -> i32 {
        self.left + self.width as i32
    }

    pub fn bottom(&self) -> i32 {
        self.top + self.height as i32
    }

    pub fn location(&self) -> Point {
        Point::new(self.left, self.top)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Self {
        Self {
            left: self.left + dx,
            top: self.top + dy,
            ..*self
        }
    }

    /// Scales location and size; sizes round up so a scaled region never loses pixels
    pub fn scale(&self, ratio: f64) -> Self {
        if (ratio - 1.0).abs() < f64::EPSILON {
            return *self;
        }
        Self {
            left: (f64::from(self.left) * ratio).floor() as i32,
            top: (f64::from(self.top) * ratio).floor() as i32,
            width: (f64::from(self.width) * ratio).ceil() as u32,
            height: (f64::from(self.height) * ratio).ceil() as u32,
            coordinates: self.coordinates,
        }
    }

    /// Closed-interval containment, so points on the right/bottom edge count
    pub fn contains_point(&self, point: Point) -> bool {
        point.x >= self.left
            && point.x <= self.right()
            && point.y >= self.top
            && point.y <= self.bottom()
    }

    pub fn contains(&self, other: &Region) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right() <= self.right()
            && other.bottom() <= self.bottom()
    }

    pub fn intersects(&self, other: &Region) -> bool {
        self.left < other.right()
            && other.left < self.right()
            && self.top < other.bottom()
            && other.top < self.bottom()
    }

    /// Intersection of both regions, or EMPTY when they do not overlap
    ///
    /// The result keeps the coordinate space of `self`.
    pub fn intersect(&self, other: &Region) -> Region {
        if !self.intersects(other) {
            return Region::EMPTY;
        }
        let left = self.left.max(other.left);
        let top = self.top.max(other.top);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        Region::new(left, top, (right - left) as u32, (bottom - top) as u32)
            .with_coordinates(self.coordinates)
    }

    /// Splits the region into tiles of at most `tile` size, in raster order
    ///
    /// With `fixed` set, every tile has the (container-clamped) tile size and the last
    /// row/column is pulled back to end on the container edge, overlapping its neighbor.
    /// Without it, edge tiles shrink to the remaining space and tiles never overlap.
    pub fn sub_regions(&self, tile: Size, fixed: bool) -> Result<Vec<Region>, CaptureError> {
        if tile.is_empty() {
            return Err(CaptureError::InvalidArgument(format!(
                "tile size must be positive, got {tile}"
            )));
        }
        if self.is_size_empty() {
            return Ok(Vec::new());
        }
        if fixed {
            Ok(self.fixed_sub_regions(tile))
        } else {
            Ok(self.varying_sub_regions(tile))
        }
    }

    fn fixed_sub_regions(&self, tile: Size) -> Vec<Region> {
        if tile.covers(self.size()) {
            return vec![*self];
        }

        let tile_width = tile.width.min(self.width);
        let tile_height = tile.height.min(self.height);
        let mut tiles = Vec::new();

        let mut current_top = self.top;
        while current_top < self.bottom() {
            if current_top + tile_height as i32 > self.bottom() {
                current_top = self.bottom() - tile_height as i32;
            }
            let mut current_left = self.left;
            while current_left < self.right() {
                if current_left + tile_width as i32 > self.right() {
                    current_left = self.right() - tile_width as i32;
                }
                tiles.push(
                    Region::new(current_left, current_top, tile_width, tile_height)
                        .with_coordinates(self.coordinates),
                );
                current_left += tile_width as i32;
            }
            current_top += tile_height as i32;
        }
        tiles
    }

    fn varying_sub_regions(&self, tile: Size) -> Vec<Region> {
        let mut tiles = Vec::new();

        let mut current_top = self.top;
        while current_top < self.bottom() {
            let height = (self.bottom() - current_top).min(tile.height as i32) as u32;
            let mut current_left = self.left;
            while current_left < self.right() {
                let width = (self.right() - current_left).min(tile.width as i32) as u32;
                tiles.push(
                    Region::new(current_left, current_top, width, height)
                        .with_coordinates(self.coordinates),
                );
                current_left += width as i32;
            }
            current_top += height as i32;
        }
        tiles
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "({}, {}) {}x{} [{:?}]",
            self.left, self.top, self.width, self.height, self.coordinates
        )
    }
}
