// src/ops.rs
//
// Request vocabulary: what to hit (bytes, pixels, physical size) and how to encode.
// These are cheap to create and store - the expensive work happens in the engine.

use crate::error::SizeFitError;
use std::fmt;

/// Default print resolution used when a physical target carries no explicit DPI.
pub const DEFAULT_DPI: u32 = 200;

/// DPI values offered to users for physical targets.
pub const COMMON_DPI: [u32; 6] = [72, 96, 150, 200, 300, 600];

const BYTES_PER_KB: f64 = 1024.0;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Physical length unit for print-size targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhysicalUnit {
    Cm,
    Mm,
    Inch,
}

impl PhysicalUnit {
    /// How many of this unit make up one inch.
    pub fn per_inch(&self) -> f64 {
        match self {
            PhysicalUnit::Cm => 2.54,
            PhysicalUnit::Mm => 25.4,
            PhysicalUnit::Inch => 1.0,
        }
    }

    /// `pixels = round(value * dpi / per_inch)`
    pub fn to_pixels(&self, value: f64, dpi: u32) -> u32 {
        let px = (value * dpi as f64 / self.per_inch()).round();
        if px.is_finite() && px > 0.0 {
            px.min(u32::MAX as f64) as u32
        } else {
            0
        }
    }

    /// Inverse of [`to_pixels`](Self::to_pixels), for display.
    pub fn from_pixels(&self, pixels: u32, dpi: u32) -> f64 {
        if dpi == 0 {
            return 0.0;
        }
        pixels as f64 * self.per_inch() / dpi as f64
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PhysicalUnit::Cm => "cm",
            PhysicalUnit::Mm => "mm",
            PhysicalUnit::Inch => "inch",
        }
    }

    pub fn parse(unit: &str) -> Option<Self> {
        match unit.trim().to_lowercase().as_str() {
            "cm" => Some(PhysicalUnit::Cm),
            "mm" => Some(PhysicalUnit::Mm),
            "in" | "inch" | "inches" => Some(PhysicalUnit::Inch),
            _ => None,
        }
    }
}

/// What a request is aiming for. Exactly one variant is active per request.
#[derive(Clone, Debug, PartialEq)]
pub enum TargetSpec {
    /// Hit a byte budget (compress-to-size, enlarge-to-size).
    Bytes { target_bytes: u64 },
    /// Exact pixel dimensions, quality free.
    Pixels { width: u32, height: u32 },
    /// Print dimensions; converted to pixels before reaching the engine.
    Physical {
        width: f64,
        height: f64,
        unit: PhysicalUnit,
        dpi: u32,
    },
}

impl TargetSpec {
    pub fn bytes(target_bytes: u64) -> Self {
        Self::Bytes { target_bytes }
    }

    pub fn pixels(width: u32, height: u32) -> Self {
        Self::Pixels { width, height }
    }

    pub fn physical(width: f64, height: f64, unit: PhysicalUnit, dpi: u32) -> Self {
        Self::Physical {
            width,
            height,
            unit,
            dpi,
        }
    }

    /// Pixel dimensions for dimension targets; `None` for byte targets.
    pub fn to_pixels(&self) -> Option<(u32, u32)> {
        match self {
            TargetSpec::Bytes { .. } => None,
            TargetSpec::Pixels { width, height } => Some((*width, *height)),
            TargetSpec::Physical {
                width,
                height,
                unit,
                dpi,
            } => Some((unit.to_pixels(*width, *dpi), unit.to_pixels(*height, *dpi))),
        }
    }

    pub fn target_bytes(&self) -> Option<u64> {
        match self {
            TargetSpec::Bytes { target_bytes } => Some(*target_bytes),
            _ => None,
        }
    }
}

/// Collaborator-facing size unit. Internally everything is bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SizeUnit {
    Kb,
    Mb,
}

impl SizeUnit {
    fn multiplier(&self) -> f64 {
        match self {
            SizeUnit::Kb => BYTES_PER_KB,
            SizeUnit::Mb => BYTES_PER_MB,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SizeUnit::Kb => "KB",
            SizeUnit::Mb => "MB",
        }
    }
}

/// A KB/MB quantity as entered by a user, normalized to bytes at the boundary.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ByteSize {
    pub value: f64,
    pub unit: SizeUnit,
}

impl ByteSize {
    pub fn kb(value: f64) -> Self {
        Self {
            value,
            unit: SizeUnit::Kb,
        }
    }

    pub fn mb(value: f64) -> Self {
        Self {
            value,
            unit: SizeUnit::Mb,
        }
    }

    /// Pick the friendlier unit for display (MB from 1 MiB upward).
    pub fn from_bytes(bytes: u64) -> Self {
        let b = bytes as f64;
        if b >= BYTES_PER_MB {
            Self::mb(b / BYTES_PER_MB)
        } else {
            Self::kb(b / BYTES_PER_KB)
        }
    }

    pub fn to_bytes(&self) -> u64 {
        let bytes = (self.value * self.unit.multiplier()).round();
        if bytes.is_finite() && bytes > 0.0 {
            bytes as u64
        } else {
            0
        }
    }

    /// Parse strings such as `"100kb"`, `"1.5 MB"` or a bare `"250"` (KB).
    pub fn parse(input: &str) -> Result<Self, SizeFitError> {
        let trimmed = input.trim();
        let lower = trimmed.to_lowercase();
        let (number, unit) = if let Some(n) = lower.strip_suffix("mb") {
            (n, SizeUnit::Mb)
        } else if let Some(n) = lower.strip_suffix("kb") {
            (n, SizeUnit::Kb)
        } else {
            (lower.as_str(), SizeUnit::Kb)
        };
        let value: f64 = number.trim().parse().map_err(|_| {
            SizeFitError::invalid_argument("size", trimmed.to_string(), "expected e.g. 100kb or 1.5mb")
        })?;
        if !value.is_finite() || value <= 0.0 {
            return Err(SizeFitError::invalid_argument(
                "size",
                trimmed.to_string(),
                "must be a positive number",
            ));
        }
        Ok(Self { value, unit })
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.unit {
            SizeUnit::Kb => write!(f, "{:.1}{}", self.value, self.unit.as_str()),
            SizeUnit::Mb => write!(f, "{:.2}{}", self.value, self.unit.as_str()),
        }
    }
}

/// Concrete codec a candidate is serialized with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EncodeFormat {
    Jpeg,
    Png,
    WebP,
}

impl EncodeFormat {
    pub fn mime(&self) -> &'static str {
        match self {
            EncodeFormat::Jpeg => "image/jpeg",
            EncodeFormat::Png => "image/png",
            EncodeFormat::WebP => "image/webp",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EncodeFormat::Jpeg => "jpeg",
            EncodeFormat::Png => "png",
            EncodeFormat::WebP => "webp",
        }
    }

    /// Lossless formats have no quality axis.
    pub fn is_lossless(&self) -> bool {
        matches!(self, EncodeFormat::Png)
    }
}

/// Output format as chosen by the user.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    KeepOriginal,
    Jpeg,
    Png,
    WebP,
}

impl OutputFormat {
    pub fn from_str(format: &str) -> Result<Self, String> {
        match format.to_lowercase().as_str() {
            "original" | "keep" | "keep-original" => Ok(Self::KeepOriginal),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::WebP),
            other => Err(format!("unsupported format: {other}")),
        }
    }

    /// Resolve against the source's declared MIME type. Keep-original falls
    /// back to JPEG for sources we cannot re-encode in kind (BMP, GIF, ...).
    pub fn resolve(&self, source_mime: &str) -> EncodeFormat {
        match self {
            OutputFormat::Jpeg => EncodeFormat::Jpeg,
            OutputFormat::Png => EncodeFormat::Png,
            OutputFormat::WebP => EncodeFormat::WebP,
            OutputFormat::KeepOriginal => match source_mime.to_lowercase().as_str() {
                "image/png" => EncodeFormat::Png,
                "image/webp" => EncodeFormat::WebP,
                _ => EncodeFormat::Jpeg,
            },
        }
    }
}

/// Whether the engine may change resolution.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum ResolutionMode {
    #[default]
    Auto,
    /// Keep these dimensions; only quality varies.
    Fixed(TargetSpec),
}

/// How explicit pixel dimensions are applied.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Fit {
    /// Use the requested width and height as-is (aspect ratio may change).
    #[default]
    Exact,
    /// Preserve aspect ratio, fitting inside the requested box.
    Inside,
}

// =============================================================================
// PHYSICAL PRESETS - Common print and ID photo sizes
// =============================================================================

/// Named physical size.
#[derive(Clone, Debug, PartialEq)]
pub struct PhysicalPreset {
    pub name: &'static str,
    pub width: f64,
    pub height: f64,
    pub unit: PhysicalUnit,
}

impl PhysicalPreset {
    const fn new(name: &'static str, width: f64, height: f64, unit: PhysicalUnit) -> Self {
        Self {
            name,
            width,
            height,
            unit,
        }
    }

    /// All built-in presets.
    pub fn all() -> &'static [PhysicalPreset] {
        static PRESETS: [PhysicalPreset; 11] = [
            PhysicalPreset::new("1-inch", 2.5, 3.5, PhysicalUnit::Cm),
            PhysicalPreset::new("small-2-inch", 3.3, 4.8, PhysicalUnit::Cm),
            PhysicalPreset::new("2-inch", 3.5, 5.3, PhysicalUnit::Cm),
            PhysicalPreset::new("5-inch", 5.0, 3.5, PhysicalUnit::Inch),
            PhysicalPreset::new("6-inch", 6.0, 4.0, PhysicalUnit::Inch),
            PhysicalPreset::new("a4", 210.0, 297.0, PhysicalUnit::Mm),
            PhysicalPreset::new("a5", 148.0, 210.0, PhysicalUnit::Mm),
            PhysicalPreset::new("a6", 105.0, 148.0, PhysicalUnit::Mm),
            PhysicalPreset::new("letter", 8.5, 11.0, PhysicalUnit::Inch),
            PhysicalPreset::new("legal", 8.5, 14.0, PhysicalUnit::Inch),
            PhysicalPreset::new("passport", 35.0, 45.0, PhysicalUnit::Mm),
        ];
        &PRESETS
    }

    /// Look up a preset by name (case-insensitive).
    pub fn get(name: &str) -> Option<Self> {
        let wanted = name.trim().to_lowercase();
        Self::all().iter().find(|p| p.name == wanted).cloned()
    }

    /// Physical target at the given DPI.
    pub fn at_dpi(&self, dpi: u32) -> TargetSpec {
        TargetSpec::physical(self.width, self.height, self.unit, dpi)
    }
}
