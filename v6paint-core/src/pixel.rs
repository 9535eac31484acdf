//! Pixel sampling from a decoded image.
//!
//! The sampler decodes the source image once, scales it to a fixed
//! width (height follows the aspect ratio) and produces one [`Pixel`]
//! per position. The sample order is shuffled so that the flood sweeps
//! the canvas randomly instead of column by column.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, RgbaImage};
use rand::Rng;
use rand::seq::SliceRandom;
use tracing::info;

use crate::error::PaintError;

// ── Pixel ────────────────────────────────────────────────────────

/// A single image sample: position plus RGBA channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pixel {
    pub x: u32,
    pub y: u32,
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Pixel {
    pub const fn new(x: u32, y: u32, [r, g, b, a]: [u8; 4]) -> Self {
        Self { x, y, r, g, b, a }
    }
}

// ── ImageSampler ─────────────────────────────────────────────────

/// Default width every image is scaled to before sampling.
pub const DEFAULT_TARGET_WIDTH: u32 = 500;

/// Loads an image from disk and turns it into pixel samples.
#[derive(Debug, Clone)]
pub struct ImageSampler {
    path: PathBuf,
    target_width: u32,
}

impl ImageSampler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            target_width: DEFAULT_TARGET_WIDTH,
        }
    }

    /// Override the width the image is scaled to (minimum 1).
    pub fn with_target_width(mut self, width: u32) -> Self {
        self.target_width = width.max(1);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn target_width(&self) -> u32 {
        self.target_width
    }

    /// Decode and scale the image, returning pixels in column-major order.
    pub fn load(&self) -> Result<Vec<Pixel>, PaintError> {
        let img = image::open(&self.path)?;
        let (w, h) = img.dimensions();
        info!(
            "loaded {} ({w}x{h}), scaling to width {}",
            self.path.display(),
            self.target_width
        );
        let scaled = scale_to_width(&img, self.target_width);
        Ok(pixels_from_rgba(&scaled))
    }

    /// [`load`](Self::load) followed by a uniform shuffle.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Vec<Pixel>, PaintError> {
        let mut pixels = self.load()?;
        pixels.shuffle(rng);
        Ok(pixels)
    }
}

/// Resize to `width`, keeping the aspect ratio, with a Lanczos3 filter.
pub fn scale_to_width(img: &DynamicImage, width: u32) -> RgbaImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return RgbaImage::new(0, 0);
    }
    let height = ((h as u64 * width as u64 + w as u64 / 2) / w as u64).max(1) as u32;
    img.resize_exact(width, height, FilterType::Lanczos3).to_rgba8()
}

/// Walk an RGBA buffer column by column and emit one sample per pixel.
pub fn pixels_from_rgba(img: &RgbaImage) -> Vec<Pixel> {
    let (w, h) = img.dimensions();
    let mut pixels = Vec::with_capacity(w as usize * h as usize);
    for x in 0..w {
        for y in 0..h {
            pixels.push(Pixel::new(x, y, img.get_pixel(x, y).0));
        }
    }
    pixels
}

// ── Tests ────────────────────────────────────────────────────────
