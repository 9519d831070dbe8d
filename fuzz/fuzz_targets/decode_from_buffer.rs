#![no_main]

use libfuzzer_sys::fuzz_target;
use sizefit::engine::SourceImage;

fuzz_target!(|data: &[u8]| {
    // Header probing and full decode must fail cleanly, never panic.
    if let Ok(source) = SourceImage::from_bytes(data.to_vec()) {
        if let Ok(img) = source.decode() {
            assert!(img.width() > 0 && img.height() > 0);
        }
    }
});
