//! Lazily decoded capture images
//!
//! An [`ImageBuffer`] starts either from encoded bytes (a screenshot) or from a
//! decoded pixel grid (a transform result or stitched canvas). The other form is
//! produced on demand and cached. Each cache slot is written at most once, so
//! concurrent callers share a single decode and a single encode.
//!
//! Transforms consume the buffer and hand back a new one. A buffer that has been
//! transformed is gone; only the returned value is authoritative.

use crate::{CaptureError, Point, Region, Size};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Capabilities handed to every image buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct ImageOptions {
    /// Allow pixel decoding (default: true)
    ///
    /// When false, transforms leave the buffer untouched and only header-level
    /// queries such as [`ImageBuffer::size`] are answered.
    pub decoding_enabled: bool,
}

impl Default for ImageOptions {
    fn default() -> Self {
        Self {
            decoding_enabled: true,
        }
    }
}

pub struct ImageBuffer {
    encoded: OnceCell<Vec<u8>>,
    decoded: OnceCell<DynamicImage>,
    position: Point,
    options: ImageOptions,
    decodes: AtomicUsize,
    encodes: AtomicUsize,
}

impl ImageBuffer {
    /// Wraps an encoded image (PNG from the driver); nothing is parsed yet
    pub fn from_bytes(bytes: Vec<u8>, options: ImageOptions) -> Self {
        Self {
            encoded: OnceCell::with_value(bytes),
            decoded: OnceCell::new(),
            position: Point::ZERO,
            options,
            decodes: AtomicUsize::new(0),
            encodes: AtomicUsize::new(0),
        }
    }

    pub fn from_image(image: DynamicImage, options: ImageOptions) -> Self {
        Self {
            encoded: OnceCell::new(),
            decoded: OnceCell::with_value(image),
            position: Point::ZERO,
            options,
            decodes: AtomicUsize::new(0),
            encodes: AtomicUsize::new(0),
        }
    }

    /// Transparent canvas of the given size
    pub fn blank(size: Size, options: ImageOptions) -> Self {
        Self::from_image(
            DynamicImage::ImageRgba8(RgbaImage::new(size.width, size.height)),
            options,
        )
    }

    pub fn options(&self) -> ImageOptions {
        self.options
    }

    /// Offset of this image within a larger logical canvas
    pub fn position(&self) -> Point {
        self.position
    }

    pub fn set_position(&mut self, position: Point) {
        self.position = position;
    }

    pub fn with_position(mut self, position: Point) -> Self {
        self.position = position;
        self
    }

    pub fn is_decoded(&self) -> bool {
        self.decoded.get().is_some()
    }

    /// Number of times this instance parsed its encoded bytes
    pub fn decode_count(&self) -> usize {
        self.decodes.load(Ordering::Relaxed)
    }

    /// Number of times this instance encoded its pixel grid
    pub fn encode_count(&self) -> usize {
        self.encodes.load(Ordering::Relaxed)
    }

    /// Parses the encoded bytes once and returns the cached pixel grid
    pub fn decode(&self) -> Result<&DynamicImage, CaptureError> {
        if let Some(image) = self.decoded.get() {
            return Ok(image);
        }
        if !self.options.decoding_enabled {
            return Err(CaptureError::DecodingDisabled);
        }
        self.decoded.get_or_try_init(|| -> Result<DynamicImage, CaptureError> {
            let bytes = self
                .encoded
                .get()
                .ok_or_else(|| CaptureError::Decode("no encoded payload".to_string()))?;
            self.decodes.fetch_add(1, Ordering::Relaxed);
            let image = image::load_from_memory(bytes)?;
            debug!(
                "Decoded {} bytes into {}x{} image",
                bytes.len(),
                image.width(),
                image.height()
            );
            Ok(image)
        })
    }

    /// Encodes the pixel grid as PNG once and returns the cached bytes
    pub fn encode(&self) -> Result<&[u8], CaptureError> {
        self.encoded
            .get_or_try_init(|| -> Result<Vec<u8>, CaptureError> {
                let image = self
                    .decoded
                    .get()
                    .ok_or_else(|| CaptureError::Encode("no pixel data".to_string()))?;
                self.encodes.fetch_add(1, Ordering::Relaxed);
                let mut bytes = Vec::new();
                image
                    .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
                    .map_err(|e| CaptureError::Encode(e.to_string()))?;
                Ok(bytes)
            })
            .map(Vec::as_slice)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CaptureError> {
        self.encode().map(<[u8]>::to_vec)
    }

    /// Image dimensions, read from the container header when not decoded yet
    pub fn size(&self) -> Result<Size, CaptureError> {
        if let Some(image) = self.decoded.get() {
            return Ok(Size::new(image.width(), image.height()));
        }
        if let Some(bytes) = self.encoded.get() {
            match read_header_size(bytes) {
                Ok(size) => return Ok(size),
                Err(e) => debug!("Header size unavailable, falling back to decode: {}", e),
            }
        }
        let image = self.decode()?;
        Ok(Size::new(image.width(), image.height()))
    }

    /// Hands over the decoded pixel grid
    pub fn into_image(self) -> Result<DynamicImage, CaptureError> {
        self.decode()?;
        self.decoded
            .into_inner()
            .ok_or_else(|| CaptureError::Decode("no pixel data".to_string()))
    }

    /// Crops to `region` clipped to the image bounds
    pub fn crop(self, region: Region) -> Result<Self, CaptureError> {
        if !self.options.decoding_enabled {
            debug!("Decoding disabled, skipping crop to {}", region);
            return Ok(self);
        }
        let bounds = Region::from_parts(Point::ZERO, self.size()?);
        let area = bounds.intersect(&region);
        if area.is_size_empty() {
            return Err(CaptureError::InvalidArgument(format!(
                "crop region {region} is outside image {}",
                bounds.size()
            )));
        }
        if area == bounds {
            return Ok(self);
        }

        let cropped = self.decode()?.crop_imm(
            area.left as u32,
            area.top as u32,
            area.width,
            area.height,
        );
        Ok(self.derive(cropped))
    }

    /// Resizes by `ratio`; a ratio of 1 returns the buffer untouched
    pub fn scale(self, ratio: f64) -> Result<Self, CaptureError> {
        if (ratio - 1.0).abs() < f64::EPSILON {
            return Ok(self);
        }
        if !ratio.is_finite() || ratio <= 0.0 {
            return Err(CaptureError::InvalidArgument(format!(
                "scale ratio must be positive, got {ratio}"
            )));
        }
        if !self.options.decoding_enabled {
            debug!("Decoding disabled, skipping scale by {}", ratio);
            return Ok(self);
        }

        let image = self.decode()?;
        let width = ((f64::from(image.width()) * ratio).ceil() as u32).max(1);
        let height = ((f64::from(image.height()) * ratio).ceil() as u32).max(1);
        let scaled = image.resize_exact(width, height, FilterType::CatmullRom);
        Ok(self.derive(scaled))
    }

    /// Rotates clockwise by a multiple of 90 degrees; 0 returns the buffer untouched
    pub fn rotate(self, degrees: i32) -> Result<Self, CaptureError> {
        let normalized = degrees.rem_euclid(360);
        if normalized == 0 {
            return Ok(self);
        }
        if normalized % 90 != 0 {
            return Err(CaptureError::InvalidArgument(format!(
                "rotation must be a multiple of 90 degrees, got {degrees}"
            )));
        }
        if !self.options.decoding_enabled {
            debug!("Decoding disabled, skipping rotation by {}", degrees);
            return Ok(self);
        }

        let image = self.decode()?;
        let rotated = match normalized {
            90 => image.rotate90(),
            180 => image.rotate180(),
            _ => image.rotate270(),
        };
        Ok(self.derive(rotated))
    }

    fn derive(&self, image: DynamicImage) -> Self {
        Self::from_image(image, self.options).with_position(self.position)
    }
}

fn read_header_size(bytes: &[u8]) -> Result<Size, CaptureError> {
    let (width, height) = image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()?;
    Ok(Size::new(width, height))
}

impl std::fmt::Debug for ImageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBuffer")
            .field("encoded_len", &self.encoded.get().map(Vec::len))
            .field("decoded", &self.is_decoded())
            .field("position", &self.position)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use std::sync::Arc;

    fn pattern(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_fn(width, height, |x, y| Rgba([x as u8, y as u8, 7, 255]))
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        DynamicImage::ImageRgba8(pattern(width, height))
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_size_from_header_without_decode() {
        let buffer = ImageBuffer::from_bytes(png(40, 30), ImageOptions::default());
        assert_eq!(buffer.size().unwrap(), Size::new(40, 30));
        assert_eq!(buffer.decode_count(), 0);
        assert!(!buffer.is_decoded());
    }

    #[test]
    fn test_crop_then_size() {
        let buffer = ImageBuffer::from_bytes(png(40, 30), ImageOptions::default());
        let cropped = buffer.crop(Region::new(5, 10, 20, 15)).unwrap();
        assert_eq!(cropped.size().unwrap(), Size::new(20, 15));

        let pixels = cropped.into_image().unwrap().to_rgba8();
        assert_eq!(pixels.get_pixel(0, 0), &Rgba([5, 10, 7, 255]));
        assert_eq!(pixels.get_pixel(19, 14), &Rgba([24, 24, 7, 255]));
    }

    #[test]
    fn test_crop_is_clipped_to_bounds() {
        let buffer = ImageBuffer::from_bytes(png(40, 30), ImageOptions::default());
        let cropped = buffer.crop(Region::new(30, 20, 50, 50)).unwrap();
        assert_eq!(cropped.size().unwrap(), Size::new(10, 10));

        let buffer = ImageBuffer::from_bytes(png(40, 30), ImageOptions::default());
        assert!(matches!(
            buffer.crop(Region::new(40, 0, 5, 5)),
            Err(CaptureError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_crop_and_restore_round_trip() {
        let original = pattern(40, 30);
        let buffer = ImageBuffer::from_image(
            DynamicImage::ImageRgba8(original.clone()),
            ImageOptions::default(),
        );
        let region = Region::new(8, 4, 16, 12);
        let cropped = buffer.crop(region).unwrap().into_image().unwrap().to_rgba8();

        let mut canvas = original.clone();
        image::imageops::replace(&mut canvas, &cropped, 8, 4);
        assert_eq!(canvas, original);
    }

    #[test]
    fn test_identity_transforms_skip_decode() {
        let bytes = png(16, 16);
        let buffer = ImageBuffer::from_bytes(bytes.clone(), ImageOptions::default());
        let buffer = buffer.scale(1.0).unwrap().rotate(0).unwrap().rotate(360).unwrap();

        assert_eq!(buffer.decode_count(), 0);
        assert_eq!(buffer.to_bytes().unwrap(), bytes);
        assert_eq!(buffer.encode_count(), 0);
    }

    #[test]
    fn test_rotate_quarter_turns() {
        let buffer = ImageBuffer::from_bytes(png(40, 30), ImageOptions::default());
        let rotated = buffer.rotate(90).unwrap();
        assert_eq!(rotated.size().unwrap(), Size::new(30, 40));

        let pixels = rotated.into_image().unwrap().to_rgba8();
        // (0, 29) in the source lands on (0, 0) after a clockwise turn
        assert_eq!(pixels.get_pixel(0, 0), &Rgba([0, 29, 7, 255]));

        let buffer = ImageBuffer::from_bytes(png(40, 30), ImageOptions::default());
        let back = buffer.rotate(-90).unwrap().rotate(90).unwrap();
        assert_eq!(back.into_image().unwrap().to_rgba8(), pattern(40, 30));
    }

    #[test]
    fn test_rotate_rejects_odd_angles() {
        let buffer = ImageBuffer::from_bytes(png(4, 4), ImageOptions::default());
        assert!(matches!(
            buffer.rotate(45),
            Err(CaptureError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_scale_rounds_up() {
        let buffer = ImageBuffer::from_bytes(png(41, 30), ImageOptions::default());
        let scaled = buffer.scale(0.5).unwrap();
        assert_eq!(scaled.size().unwrap(), Size::new(21, 15));
    }

    #[test]
    fn test_invalid_bytes_fail_to_decode() {
        let buffer = ImageBuffer::from_bytes(b"not an image".to_vec(), ImageOptions::default());
        assert!(matches!(buffer.decode(), Err(CaptureError::Decode(_))));
        assert!(matches!(buffer.size(), Err(CaptureError::Decode(_))));
        assert!(matches!(
            buffer.crop(Region::new(0, 0, 1, 1)),
            Err(CaptureError::Decode(_))
        ));
    }

    #[test]
    fn test_concurrent_decode_runs_once() {
        let buffer = Arc::new(ImageBuffer::from_bytes(png(64, 64), ImageOptions::default()));
        std::thread::scope(|scope| {
            for _ in 0..8 {
                let buffer = Arc::clone(&buffer);
                scope.spawn(move || {
                    let image = buffer.decode().unwrap();
                    assert_eq!(image.width(), 64);
                });
            }
        });
        assert_eq!(buffer.decode_count(), 1);
    }

    #[test]
    fn test_encode_is_cached() {
        let buffer = ImageBuffer::blank(Size::new(8, 8), ImageOptions::default());
        let first = buffer.to_bytes().unwrap();
        let second = buffer.to_bytes().unwrap();
        assert_eq!(first, second);
        assert_eq!(buffer.encode_count(), 1);
    }

    #[test]
    fn test_disabled_decoding_leaves_buffer_alone() {
        let options = ImageOptions {
            decoding_enabled: false,
        };
        let bytes = png(20, 20);
        let buffer = ImageBuffer::from_bytes(bytes.clone(), options);
        let buffer = buffer
            .crop(Region::new(0, 0, 5, 5))
            .unwrap()
            .scale(0.5)
            .unwrap()
            .rotate(90)
            .unwrap();

        assert_eq!(buffer.size().unwrap(), Size::new(20, 20));
        assert_eq!(buffer.to_bytes().unwrap(), bytes);
        assert!(matches!(buffer.decode(), Err(CaptureError::DecodingDisabled)));
    }

    #[test]
    fn test_position_survives_transforms() {
        let buffer = ImageBuffer::from_bytes(png(20, 20), ImageOptions::default())
            .with_position(Point::new(0, 340));
        let cropped = buffer.crop(Region::new(0, 0, 10, 10)).unwrap();
        assert_eq!(cropped.position(), Point::new(0, 340));
    }
}
