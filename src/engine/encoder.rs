// src/engine/encoder.rs
//
// Encoder operations: JPEG (mozjpeg), PNG (image + oxipng), WebP (libwebp)
// Quality is the normalized [0.0, 1.0] value used throughout the search.

use crate::engine::common::{run_with_panic_policy, EngineResult};
use crate::engine::MAX_DIMENSION;
use crate::error::SizeFitError;
use crate::ops::EncodeFormat;
use image::{DynamicImage, ImageFormat};
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::borrow::Cow;
use std::io::Cursor;

/// Lowest quality handed to a codec. Zero would make mozjpeg emit all-DC output.
pub const MIN_CODEC_QUALITY: f32 = 0.01;
pub const MAX_CODEC_QUALITY: f32 = 1.0;

/// oxipng preset for PNG candidates. The engine may serialize a PNG a dozen
/// times per request, so this trades a little ratio for speed.
const OXIPNG_PRESET: u8 = 2;

/// Clamp a requested quality into the codec range.
pub fn clamp_quality(quality: f32) -> f32 {
    if quality.is_nan() {
        return MAX_CODEC_QUALITY;
    }
    quality.clamp(MIN_CODEC_QUALITY, MAX_CODEC_QUALITY)
}

/// Single source of truth for per-codec knobs derived from one quality value.
/// Bands:
/// - High (>=85): visual quality first
/// - Balanced (70-84)
/// - Fast (50-69)
/// - Fastest (<50)
#[derive(Debug, Clone, Copy)]
pub struct QualitySettings {
    /// 0-100 scale as expected by mozjpeg/libwebp
    quality: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QualityBand {
    High,
    Balanced,
    Fast,
    Fastest,
}

impl QualitySettings {
    /// `quality` is normalized [0.0, 1.0].
    pub fn new(quality: f32) -> Self {
        Self {
            quality: clamp_quality(quality) * 100.0,
        }
    }

    pub fn codec_quality(&self) -> f32 {
        self.quality
    }

    fn band(&self) -> QualityBand {
        if self.quality >= 85.0 {
            QualityBand::High
        } else if self.quality >= 70.0 {
            QualityBand::Balanced
        } else if self.quality >= 50.0 {
            QualityBand::Fast
        } else {
            QualityBand::Fastest
        }
    }

    pub fn jpeg_smoothing(&self) -> u8 {
        if self.quality >= 90.0 {
            0
        } else if self.quality >= 70.0 {
            5
        } else if self.quality >= 60.0 {
            10
        } else {
            18
        }
    }

    pub fn webp_method(&self) -> i32 {
        4
    }

    pub fn webp_sns_strength(&self) -> i32 {
        match self.band() {
            QualityBand::High => 50,
            QualityBand::Balanced => 70,
            QualityBand::Fast | QualityBand::Fastest => 80,
        }
    }

    pub fn webp_filter_strength(&self) -> i32 {
        if self.quality >= 80.0 {
            20
        } else if self.quality >= 60.0 {
            30
        } else {
            40
        }
    }

    pub fn webp_filter_sharpness(&self) -> i32 {
        match self.band() {
            QualityBand::High => 2,
            QualityBand::Balanced | QualityBand::Fast | QualityBand::Fastest => 0,
        }
    }
}

/// Serialize a raster in the requested format. `quality` is ignored for PNG.
pub fn encode(img: &DynamicImage, format: EncodeFormat, quality: f32) -> EngineResult<Vec<u8>> {
    match format {
        EncodeFormat::Jpeg => encode_jpeg(img, quality),
        EncodeFormat::Png => encode_png(img),
        EncodeFormat::WebP => encode_webp(img, quality),
    }
}

/// Encode to JPEG using mozjpeg: 4:2:0, progressive, optimized Huffman tables.
pub fn encode_jpeg(img: &DynamicImage, quality: f32) -> EngineResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let settings = QualitySettings::new(quality);

        let rgb: Cow<'_, image::RgbImage> = match img {
            DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
            _ => Cow::Owned(img.to_rgb8()),
        };
        let (w, h) = rgb.dimensions();
        let pixels: &[u8] = rgb.as_raw();

        if w == 0 || h == 0 {
            return Err(SizeFitError::encode_failed(
                "jpeg",
                "width or height is zero",
            ));
        }
        if w > MAX_DIMENSION || h > MAX_DIMENSION {
            return Err(SizeFitError::dimension_exceeds_limit(
                w.max(h),
                MAX_DIMENSION,
            ));
        }
        let expected_len = (w as usize) * (h as usize) * 3;
        if pixels.len() != expected_len {
            return Err(SizeFitError::encode_failed(
                "jpeg",
                format!("pixel buffer is {} bytes, expected {expected_len}", pixels.len()),
            ));
        }

        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(settings.codec_quality());
        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_optimize_scans(true);
        comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);
        comp.set_smoothing_factor(settings.jpeg_smoothing());

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);

        {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                SizeFitError::encode_failed(
                    "jpeg",
                    format!("mozjpeg: failed to start compress: {e:?}"),
                )
            })?;

            let stride = w as usize * 3;
            for row in pixels.chunks(stride) {
                writer.write_scanlines(row).map_err(|e| {
                    SizeFitError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }

            writer.finish().map_err(|e| {
                SizeFitError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;
        }

        Ok(output)
    })
}

/// Encode to PNG using the image crate, then recompress losslessly with oxipng.
pub fn encode_png(img: &DynamicImage) -> EngineResult<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        if img.width() == 0 || img.height() == 0 {
            return Err(SizeFitError::encode_failed("png", "width or height is zero"));
        }

        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| SizeFitError::encode_failed("png", format!("PNG encode failed: {e}")))?;

        let mut options = oxipng::Options::from_preset(OXIPNG_PRESET);
        options.strip = oxipng::StripChunks::Safe;

        oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
            SizeFitError::encode_failed("png", format!("oxipng optimization failed: {e}"))
        })
    })
}

/// Encode to lossy WebP. Alpha is dropped, as with JPEG.
pub fn encode_webp(img: &DynamicImage, quality: f32) -> EngineResult<Vec<u8>> {
    run_with_panic_policy("encode:webp", || {
        let rgb: Cow<'_, image::RgbImage> = match img {
            DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
            _ => Cow::Owned(img.to_rgb8()),
        };
        let (w, h) = rgb.dimensions();
        if w == 0 || h == 0 {
            return Err(SizeFitError::encode_failed("webp", "width or height is zero"));
        }
        // libwebp hard limit
        if w > 16383 || h > 16383 {
            return Err(SizeFitError::dimension_exceeds_limit(w.max(h), 16383));
        }

        let encoder = webp::Encoder::from_rgb(&rgb, w, h);

        let mut config = webp::WebPConfig::new()
            .map_err(|_| SizeFitError::internal_panic("failed to create WebPConfig"))?;

        let settings = QualitySettings::new(quality);
        config.quality = settings.codec_quality();
        config.method = settings.webp_method();
        config.pass = 1;
        config.preprocessing = 0;
        config.sns_strength = settings.webp_sns_strength();
        config.autofilter = 1;
        config.filter_strength = settings.webp_filter_strength();
        config.filter_sharpness = settings.webp_filter_sharpness();

        let mem = encoder.encode_advanced(&config).map_err(|e| {
            SizeFitError::encode_failed("webp", format!("WebP encode failed: {e:?}"))
        })?;

        Ok(mem.to_vec())
    })
}
