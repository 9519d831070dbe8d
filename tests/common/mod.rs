// tests/common/mod.rs
//
// Shared helpers for integration tests: a synthetic codec with a closed-form
// byte model, and small real-image builders.

#![allow(dead_code)]

use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use sizefit::engine::{Codec, EngineResult};
use sizefit::{EncodeFormat, SizeFitError};
use std::cell::Cell;
use std::io::Cursor;

/// `bytes = w * h * bytes_per_pixel * (0.08 + 0.92 * q^3)`
///
/// Monotone in both resolution and quality, so engine behaviour can be
/// checked exactly without depending on a real encoder.
pub struct ModelCodec {
    pub width: u32,
    pub height: u32,
    pub bytes_per_pixel: f64,
    pub format: EncodeFormat,
    pub fail_when: Option<fn(u32, u32, f32) -> bool>,
    pub draw_fails_when: Option<fn(u32, u32) -> bool>,
    pub draws: Cell<u32>,
    pub writes: Cell<u32>,
}

impl ModelCodec {
    pub fn new(width: u32, height: u32, bytes_per_pixel: f64) -> Self {
        Self {
            width,
            height,
            bytes_per_pixel,
            format: EncodeFormat::Jpeg,
            fail_when: None,
            draw_fails_when: None,
            draws: Cell::new(0),
            writes: Cell::new(0),
        }
    }

    /// Calibrated so the max-quality encode at full size is `baseline_bytes`.
    pub fn with_baseline(width: u32, height: u32, baseline_bytes: u64) -> Self {
        let bpp = baseline_bytes as f64 / (width as f64 * height as f64);
        Self::new(width, height, bpp)
    }

    pub fn lossless(mut self) -> Self {
        self.format = EncodeFormat::Png;
        self
    }

    pub fn failing(mut self, predicate: fn(u32, u32, f32) -> bool) -> Self {
        self.fail_when = Some(predicate);
        self
    }

    pub fn failing_draw(mut self, predicate: fn(u32, u32) -> bool) -> Self {
        self.draw_fails_when = Some(predicate);
        self
    }

    pub fn predicted_bytes(&self, width: u32, height: u32, quality: f32) -> u64 {
        let q = if self.format.is_lossless() {
            1.0
        } else {
            quality as f64
        };
        let bytes = width as f64 * height as f64 * self.bytes_per_pixel * (0.08 + 0.92 * q.powi(3));
        bytes.round().max(1.0) as u64
    }

    /// Parse a tiny `MODEL <w> <h> <baseline>` header; anything else fails
    /// the way a corrupt upload does.
    pub fn from_header(bytes: &[u8]) -> EngineResult<Self> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| SizeFitError::decode_failed("not a model image"))?;
        let mut parts = text.split_whitespace();
        if parts.next() != Some("MODEL") {
            return Err(SizeFitError::decode_failed("missing MODEL signature"));
        }
        let mut next = || -> EngineResult<u64> {
            parts
                .next()
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| SizeFitError::decode_failed("truncated model header"))
        };
        let (w, h, baseline) = (next()?, next()?, next()?);
        Ok(Self::with_baseline(w as u32, h as u32, baseline))
    }

    pub fn header(width: u32, height: u32, baseline: u64) -> Vec<u8> {
        format!("MODEL {width} {height} {baseline}").into_bytes()
    }
}

impl Codec for ModelCodec {
    type Surface = (u32, u32);

    fn source_dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn format(&self) -> EncodeFormat {
        self.format
    }

    fn draw(&self, width: u32, height: u32) -> EngineResult<(u32, u32)> {
        self.draws.set(self.draws.get() + 1);
        if self.draw_fails_when.is_some_and(|fail| fail(width, height)) {
            return Err(SizeFitError::resize_failed(
                (self.width, self.height),
                (width, height),
                "injected draw failure",
            ));
        }
        Ok((width, height))
    }

    fn surface_dimensions(&self, surface: &(u32, u32)) -> (u32, u32) {
        *surface
    }

    fn write(&self, surface: &(u32, u32), quality: f32) -> EngineResult<Vec<u8>> {
        self.writes.set(self.writes.get() + 1);
        if let Some(fail) = self.fail_when {
            if fail(surface.0, surface.1, quality) {
                return Err(SizeFitError::encode_failed(
                    self.format.as_str(),
                    "injected failure",
                ));
            }
        }
        Ok(vec![0u8; self.predicted_bytes(surface.0, surface.1, quality) as usize])
    }

    fn downscale(&self, width: u32, height: u32) -> EngineResult<Self> {
        Ok(Self {
            width,
            height,
            bytes_per_pixel: self.bytes_per_pixel,
            format: self.format,
            fail_when: self.fail_when,
            draw_fails_when: self.draw_fails_when,
            draws: Cell::new(0),
            writes: Cell::new(0),
        })
    }
}

/// Smooth gradients with deterministic texture; compresses like a photo.
pub fn create_photo_like_image(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        let noise = (x.wrapping_mul(2654435761) ^ y.wrapping_mul(40503)) % 23;
        let r = ((x * 255 / width.max(1)) + noise) % 256;
        let g = ((y * 255 / height.max(1)) + noise * 2) % 256;
        let b = (((x + y) * 127 / (width + height).max(1)) + 64 + noise) % 256;
        Rgb([r as u8, g as u8, b as u8])
    }))
}

pub fn encode_as(img: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format)
        .expect("encode test image");
    buf
}

/// Splice an APP1 Exif segment holding only an Orientation tag after SOI.
pub fn with_exif_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
    let mut tiff = b"MM\0\x2a\0\0\0\x08".to_vec();
    tiff.extend_from_slice(&1u16.to_be_bytes());
    // Orientation, SHORT, count 1, value left-justified
    tiff.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0, 0, 0, 1]);
    tiff.extend_from_slice(&orientation.to_be_bytes());
    tiff.extend_from_slice(&[0, 0, 0, 0, 0, 0]);

    let segment_len = (6 + tiff.len() + 2) as u16;
    let mut out = jpeg[..2].to_vec();
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&segment_len.to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);
    out
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
