// src/engine/io.rs
//
// I/O operations: Source enum, SourceImage ingestion and header probing

use crate::engine::common::EngineResult;
use crate::engine::decoder::{decode_image, detect_exif_orientation, detect_mime};
use crate::error::SizeFitError;
use image::{DynamicImage, ImageReader};
use memmap2::Mmap;
use std::fs::File;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

/// Owned image bytes - in memory or memory-mapped
#[derive(Clone, Debug)]
pub enum Source {
    /// In-memory image data
    Memory(Arc<Vec<u8>>),
    /// Memory-mapped file (zero-copy access)
    Mapped(Arc<Mmap>),
}

impl Source {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Source::Memory(data) => data.as_slice(),
            Source::Mapped(mmap) => mmap.as_ref(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Source::Memory(data) => data.len(),
            Source::Mapped(mmap) => mmap.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable description of an uploaded image: raw bytes, pixel size,
/// declared MIME type and byte length. Never mutated after creation.
#[derive(Clone, Debug)]
pub struct SourceImage {
    source: Source,
    width: u32,
    height: u32,
    mime: String,
}

impl SourceImage {
    /// Build from metadata the ingestion collaborator already knows.
    pub fn new(bytes: Vec<u8>, width: u32, height: u32, mime: impl Into<String>) -> Self {
        Self {
            source: Source::Memory(Arc::new(bytes)),
            width,
            height,
            mime: mime.into(),
        }
    }

    /// Probe the header for dimensions and sniff the MIME type from magic bytes.
    /// Does not decode pixels.
    pub fn from_bytes(bytes: Vec<u8>) -> EngineResult<Self> {
        Self::from_source(Source::Memory(Arc::new(bytes)))
    }

    /// Memory-map a file and probe its header.
    pub fn open(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let display = path.to_string_lossy().to_string();
        let file =
            File::open(path).map_err(|e| SizeFitError::file_read_failed(display.clone(), e))?;
        // SAFETY: the mapping is read-only and owned by the returned SourceImage.
        // Concurrent truncation of the file by another process is outside our control,
        // as with every mmap-based reader.
        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| SizeFitError::file_read_failed(display, e))?;
        Self::from_source(Source::Mapped(Arc::new(mmap)))
    }

    fn from_source(source: Source) -> EngineResult<Self> {
        let bytes = source.as_bytes();
        if bytes.is_empty() {
            return Err(SizeFitError::invalid_input("image buffer is empty"));
        }
        let mime = detect_mime(bytes)
            .ok_or_else(|| SizeFitError::unsupported_format("unrecognized image signature"))?;
        if mime == "image/heic" {
            return Err(SizeFitError::unsupported_format(
                "heic/heif must be converted before processing",
            ));
        }
        let (width, height) = probe_dimensions(bytes)?;
        // decode() rotates 5-8 by a quarter turn; report the upright size
        let (width, height) = match detect_exif_orientation(bytes) {
            Some(5..=8) => (height, width),
            _ => (width, height),
        };
        Ok(Self {
            source,
            width,
            height,
            mime: mime.to_string(),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        self.source.as_bytes()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn byte_len(&self) -> u64 {
        self.source.len() as u64
    }

    /// Decode into a drawable raster (EXIF orientation applied).
    pub fn decode(&self) -> EngineResult<DynamicImage> {
        if self.source.is_empty() {
            return Err(SizeFitError::invalid_input("image buffer is empty"));
        }
        let (img, _) = decode_image(self.bytes())?;
        Ok(img)
    }
}

fn probe_dimensions(bytes: &[u8]) -> EngineResult<(u32, u32)> {
    let reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| SizeFitError::decode_failed(format!("failed to read image header: {e}")))?;
    reader
        .into_dimensions()
        .map_err(|e| SizeFitError::decode_failed(format!("failed to read dimensions: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Write;

    fn encode(format: ImageFormat, width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 99]));
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut buf), format)
            .unwrap();
        buf
    }

    #[test]
    fn test_from_bytes_probes_header() {
        let png = encode(ImageFormat::Png, 40, 30);
        let len = png.len() as u64;
        let src = SourceImage::from_bytes(png).unwrap();
        assert_eq!(src.dimensions(), (40, 30));
        assert_eq!(src.mime(), "image/png");
        assert_eq!(src.byte_len(), len);
        assert_eq!(src.pixel_count(), 1200);
    }

    #[test]
    fn test_from_bytes_rejects_empty_and_garbage() {
        assert!(matches!(
            SourceImage::from_bytes(Vec::new()),
            Err(SizeFitError::InvalidInput { .. })
        ));
        assert!(matches!(
            SourceImage::from_bytes(b"definitely not an image".to_vec()),
            Err(SizeFitError::UnsupportedFormat { .. })
        ));
    }

    #[test]
    fn test_truncated_header_is_decode_failure() {
        let mut png = encode(ImageFormat::Png, 16, 16);
        png.truncate(12);
        let err = SourceImage::from_bytes(png).unwrap_err();
        assert!(err.is_decode_failure());
    }

    #[test]
    fn test_open_memory_maps_file() {
        let jpeg = encode(ImageFormat::Jpeg, 24, 12);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&jpeg).unwrap();
        file.flush().unwrap();

        let src = SourceImage::open(file.path()).unwrap();
        assert_eq!(src.dimensions(), (24, 12));
        assert_eq!(src.mime(), "image/jpeg");
        assert_eq!(src.bytes(), jpeg.as_slice());
        let decoded = src.decode().unwrap();
        assert_eq!((decoded.width(), decoded.height()), (24, 12));
    }

    /// Insert an APP1 Exif segment carrying only an Orientation tag right after SOI.
    fn with_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
        let mut tiff = b"MM\0\x2a\0\0\0\x08".to_vec();
        tiff.extend_from_slice(&1u16.to_be_bytes());
        tiff.extend_from_slice(&0x0112u16.to_be_bytes());
        tiff.extend_from_slice(&3u16.to_be_bytes());
        tiff.extend_from_slice(&1u32.to_be_bytes());
        tiff.extend_from_slice(&orientation.to_be_bytes());
        tiff.extend_from_slice(&[0, 0]);
        tiff.extend_from_slice(&0u32.to_be_bytes());

        let mut payload = b"Exif\0\0".to_vec();
        payload.extend_from_slice(&tiff);
        let mut out = jpeg[..2].to_vec();
        out.extend_from_slice(&[0xFF, 0xE1]);
        out.extend_from_slice(&(payload.len() as u16 + 2).to_be_bytes());
        out.extend_from_slice(&payload);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    #[test]
    fn test_rotated_jpeg_reports_upright_dimensions() {
        let jpeg = with_orientation(&encode(ImageFormat::Jpeg, 200, 100), 6);
        assert_eq!(detect_exif_orientation(&jpeg), Some(6));

        let src = SourceImage::from_bytes(jpeg).unwrap();
        assert_eq!(src.dimensions(), (100, 200));
        let decoded = src.decode().unwrap();
        assert_eq!((decoded.width(), decoded.height()), src.dimensions());
    }

    #[test]
    fn test_mirrored_jpeg_keeps_dimensions() {
        let jpeg = with_orientation(&encode(ImageFormat::Jpeg, 200, 100), 2);
        let src = SourceImage::from_bytes(jpeg).unwrap();
        assert_eq!(src.dimensions(), (200, 100));
    }

    #[test]
    fn test_open_missing_file() {
        let err = SourceImage::open("/nonexistent/sizefit/input.png").unwrap_err();
        assert!(matches!(err, SizeFitError::FileReadFailed { .. }));
    }

    #[test]
    fn test_new_keeps_declared_metadata() {
        let src = SourceImage::new(vec![1, 2, 3], 10, 20, "image/bmp");
        assert_eq!(src.dimensions(), (10, 20));
        assert_eq!(src.mime(), "image/bmp");
        assert_eq!(src.byte_len(), 3);
        assert!(src.decode().is_err());
    }
}
