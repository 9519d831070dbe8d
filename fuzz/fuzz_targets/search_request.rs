#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sizefit::engine::{
    Codec, EngineResult, SearchConfig, SearchRequest, SizeTargetingEngine,
};
use sizefit::{EncodeFormat, SizeFitError};

#[derive(Arbitrary, Debug)]
struct Input {
    width: u16,
    height: u16,
    bytes_per_pixel: u8,
    target: u32,
    fixed: Option<(u16, u16)>,
    enlarge: bool,
    lossless: bool,
    fail_below: u8,
}

/// Byte model driven by the fuzzer; fails encodes below a fuzzed quality.
struct FuzzCodec {
    width: u32,
    height: u32,
    bpp: f64,
    format: EncodeFormat,
    fail_below: f32,
}

impl Codec for FuzzCodec {
    type Surface = (u32, u32);

    fn source_dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn format(&self) -> EncodeFormat {
        self.format
    }

    fn draw(&self, width: u32, height: u32) -> EngineResult<(u32, u32)> {
        Ok((width, height))
    }

    fn surface_dimensions(&self, surface: &(u32, u32)) -> (u32, u32) {
        *surface
    }

    fn write(&self, surface: &(u32, u32), quality: f32) -> EngineResult<Vec<u8>> {
        if quality < self.fail_below {
            return Err(SizeFitError::encode_failed(self.format.as_str(), "fuzz"));
        }
        let q = quality as f64;
        let bytes = surface.0 as f64 * surface.1 as f64 * self.bpp * (0.1 + 0.9 * q * q);
        Ok(vec![0; (bytes as usize).clamp(1, 1 << 20)])
    }

    fn downscale(&self, width: u32, height: u32) -> EngineResult<Self> {
        Ok(Self {
            width,
            height,
            bpp: self.bpp,
            format: self.format,
            fail_below: self.fail_below,
        })
    }
}

fuzz_target!(|input: Input| {
    let codec = FuzzCodec {
        width: (input.width % 2048) as u32 + 1,
        height: (input.height % 2048) as u32 + 1,
        bpp: (input.bytes_per_pixel as f64 + 1.0) / 64.0,
        format: if input.lossless {
            EncodeFormat::Png
        } else {
            EncodeFormat::Jpeg
        },
        fail_below: input.fail_below as f32 / 255.0,
    };
    let mut request = if input.enlarge {
        SearchRequest::enlarge(input.target as u64)
    } else {
        SearchRequest::compress(input.target as u64)
    };
    if let Some((w, h)) = input.fixed {
        request = request.with_fixed_resolution(w as u32 % 4096, h as u32 % 4096);
    }

    let Ok(engine) = SizeTargetingEngine::new(SearchConfig::fast()) else {
        return;
    };
    if let Ok(report) = engine.run(&codec, &request) {
        let (w, h) = report.best.candidate.dimensions();
        assert!(w >= 1 && h >= 1);
        assert!(report.best.candidate.quality > 0.0 && report.best.candidate.quality <= 1.0);
        assert_eq!(report.best.candidate.achieved_bytes, report.best.candidate.bytes.len() as u64);
    }
});
