// src/engine/surface.rs
//
// Drawing a source raster onto a surface of a given pixel size.
// Lanczos3 resampling through fast_image_resize; the image crate is the fallback.

use crate::engine::common::EngineResult;
use crate::error::SizeFitError;
use fast_image_resize::{self as fir, MulDiv, PixelType, ResizeOptions};
use image::{imageops::FilterType, DynamicImage, RgbImage, RgbaImage};
use std::ops::Deref;
use std::sync::Arc;

/// A raster at a fixed pixel size, ready to be serialized at any quality.
/// Drawing at the source size shares the source instead of resampling.
#[derive(Clone, Debug)]
pub enum RasterSurface {
    Source(Arc<DynamicImage>),
    Resized(DynamicImage),
}

impl RasterSurface {
    /// Draw `source` at `width`x`height`.
    pub fn draw(source: &Arc<DynamicImage>, width: u32, height: u32) -> EngineResult<Self> {
        if width == 0 || height == 0 {
            return Err(SizeFitError::resize_failed(
                (source.width(), source.height()),
                (width, height),
                "surface dimensions must be positive",
            ));
        }
        if source.width() == width && source.height() == height {
            return Ok(RasterSurface::Source(Arc::clone(source)));
        }
        fast_resize(source, width, height)
            .map(RasterSurface::Resized)
            .map_err(|reason| {
                SizeFitError::resize_failed(
                    (source.width(), source.height()),
                    (width, height),
                    reason,
                )
            })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width(), self.height())
    }

    pub fn into_image(self) -> DynamicImage {
        match self {
            RasterSurface::Source(img) => {
                Arc::try_unwrap(img).unwrap_or_else(|shared| (*shared).clone())
            }
            RasterSurface::Resized(img) => img,
        }
    }
}

impl Deref for RasterSurface {
    type Target = DynamicImage;

    fn deref(&self) -> &DynamicImage {
        match self {
            RasterSurface::Source(img) => img.as_ref(),
            RasterSurface::Resized(img) => img,
        }
    }
}

/// Calculate dimensions that preserve aspect ratio while fitting inside
/// `box_w`x`box_h` (fit = inside semantics). Never returns a zero side.
pub fn calc_inside_dimensions(orig_w: u32, orig_h: u32, box_w: u32, box_h: u32) -> (u32, u32) {
    if orig_w == 0 || orig_h == 0 {
        return (box_w.max(1), box_h.max(1));
    }
    let orig_ratio = orig_w as f64 / orig_h as f64;
    let box_ratio = box_w as f64 / box_h.max(1) as f64;

    if orig_ratio > box_ratio {
        // Original is wider -> fit to width
        let h = (box_w as f64 / orig_ratio).round() as u32;
        (box_w.max(1), h.max(1))
    } else {
        // Original is taller -> fit to height
        let w = (box_h as f64 * orig_ratio).round() as u32;
        (w.max(1), box_h.max(1))
    }
}

/// Channel layout a surface is resampled in. RGB stays RGB; anything else
/// (luma, 16-bit, float) is widened to RGBA8 first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Layout {
    Rgb,
    Rgba,
}

impl Layout {
    fn split(img: &DynamicImage) -> (Self, Vec<u8>) {
        match img {
            DynamicImage::ImageRgb8(rgb) => (Layout::Rgb, rgb.as_raw().clone()),
            DynamicImage::ImageRgba8(rgba) => (Layout::Rgba, rgba.as_raw().clone()),
            other => (Layout::Rgba, other.to_rgba8().into_raw()),
        }
    }

    fn pixel_type(self) -> PixelType {
        match self {
            Layout::Rgb => PixelType::U8x3,
            Layout::Rgba => PixelType::U8x4,
        }
    }

    fn join(self, width: u32, height: u32, pixels: Vec<u8>) -> Option<DynamicImage> {
        match self {
            Layout::Rgb => RgbImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgb8),
            Layout::Rgba => {
                RgbaImage::from_raw(width, height, pixels).map(DynamicImage::ImageRgba8)
            }
        }
    }
}

/// Resample `img` to exactly `width`x`height` with Lanczos3. Aspect ratio is
/// the caller's concern. Falls back to the image crate if fast_image_resize
/// rejects the buffers.
pub fn fast_resize(img: &DynamicImage, width: u32, height: u32) -> Result<DynamicImage, String> {
    if img.width() == 0 || img.height() == 0 || width == 0 || height == 0 {
        return Err("invalid dimensions".to_string());
    }
    let (layout, pixels) = Layout::split(img);
    resample(layout, img.width(), img.height(), pixels, width, height).or_else(|err| {
        tracing::warn!(%err, width, height, "fir resize failed, falling back to image crate");
        let fallback = match layout {
            Layout::Rgb => DynamicImage::ImageRgb8(img.to_rgb8()),
            Layout::Rgba => DynamicImage::ImageRgba8(img.to_rgba8()),
        };
        Ok(fallback.resize_exact(width, height, FilterType::Lanczos3))
    })
}

fn resample(
    layout: Layout,
    src_width: u32,
    src_height: u32,
    pixels: Vec<u8>,
    width: u32,
    height: u32,
) -> Result<DynamicImage, String> {
    let pixel_type = layout.pixel_type();
    let mut src = fir::images::Image::from_vec_u8(src_width, src_height, pixels, pixel_type)
        .map_err(|e| format!("fir source buffer rejected: {e:?}"))?;
    let mut dst = fir::images::Image::new(width, height, pixel_type);

    // Opaque RGBA resamples like RGB; only translucent edges need premultiplying.
    let premultiply = layout == Layout::Rgba
        && src.buffer().iter().skip(3).step_by(4).any(|&alpha| alpha != 255);
    let mul_div = MulDiv::default();
    if premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src)
            .map_err(|e| format!("premultiply failed: {e}"))?;
    }

    let options =
        ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3));
    fir::Resizer::new()
        .resize(&src, &mut dst, &options)
        .map_err(|e| format!("fir resize error: {e:?}"))?;

    if premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst)
            .map_err(|e| format!("unpremultiply failed: {e}"))?;
    }

    layout
        .join(width, height, dst.into_vec())
        .ok_or_else(|| "resized buffer does not match its dimensions".to_string())
}
