// tests/codec_properties.rs
//
// Properties of the production codec (mozjpeg / libwebp / oxipng).

mod common;

use common::{create_photo_like_image, encode_as, init_tracing, with_exif_orientation};
use image::ImageFormat;
use sizefit::engine::{
    process_batch, Codec, CompressJob, EnlargeJob, Job, RasterCodec, ResizeJob, SearchConfig,
    SourceImage, GRID_QUALITIES,
};
use sizefit::{compress_to_size, enlarge_to_size, resize_by_dimensions, EncodeFormat, Fit, TargetSpec};

fn fraction_monotone(format: EncodeFormat) -> f64 {
    let codec = RasterCodec::new(create_photo_like_image(256, 192), format);
    let surface = codec.draw(256, 192).unwrap();
    let mut qualities = GRID_QUALITIES.to_vec();
    qualities.reverse();
    let sizes: Vec<u64> = qualities
        .iter()
        .map(|&q| codec.serialize(&surface, q).unwrap().achieved_bytes)
        .collect();
    let pairs = sizes.len() - 1;
    let ok = sizes
        .windows(2)
        // 1% noise margin
        .filter(|w| w[1] as f64 >= w[0] as f64 * 0.99)
        .count();
    ok as f64 / pairs as f64
}

mod encode_properties {
    use super::*;

    #[test]
    fn test_exact_dimensions_and_positive_size() {
        let codec = RasterCodec::new(create_photo_like_image(200, 150), EncodeFormat::Jpeg);
        for &(w, h, q) in &[(50, 50, 0.1), (199, 151, 0.55), (400, 30, 1.0), (64, 300, 0.9)] {
            let c = codec.encode(w, h, q).unwrap();
            assert_eq!(c.dimensions(), (w, h));
            assert!(c.achieved_bytes > 0);
        }
    }

    #[test]
    fn test_jpeg_quality_monotone_on_photo() {
        assert!(fraction_monotone(EncodeFormat::Jpeg) >= 0.9);
    }

    #[test]
    fn test_webp_quality_monotone_on_photo() {
        assert!(fraction_monotone(EncodeFormat::WebP) >= 0.9);
    }

    #[test]
    fn test_png_ignores_quality() {
        let codec = RasterCodec::new(create_photo_like_image(96, 64), EncodeFormat::Png);
        let surface = codec.draw(96, 64).unwrap();
        let a = codec.serialize(&surface, 0.1).unwrap();
        let b = codec.serialize(&surface, 0.9).unwrap();
        assert_eq!(a.achieved_bytes, b.achieved_bytes);
        assert_eq!(a.quality, 1.0);
    }
}

mod mode_properties {
    use super::*;

    fn jpeg_source(width: u32, height: u32) -> SourceImage {
        SourceImage::from_bytes(encode_as(&create_photo_like_image(width, height), ImageFormat::Jpeg))
            .unwrap()
    }

    #[test]
    fn test_compress_real_jpeg() {
        init_tracing();
        let src = jpeg_source(480, 360);
        let target = (src.byte_len() / 2).max(2048);
        let out = compress_to_size(&src, &CompressJob::from_bytes(target), &SearchConfig::default())
            .unwrap();
        assert_eq!(out.mime(), "image/jpeg");
        assert!(out.achieved_bytes() > 0);
        assert_eq!(out.bytes().len() as u64, out.achieved_bytes());
        let decoded = SourceImage::from_bytes(out.bytes().to_vec()).unwrap();
        assert_eq!(decoded.dimensions(), out.dimensions());
    }

    #[test]
    fn test_resize_inside_box_uses_upright_orientation() {
        // stored 200x100, displayed 100x200
        let jpeg = encode_as(&create_photo_like_image(200, 100), ImageFormat::Jpeg);
        let src = SourceImage::from_bytes(with_exif_orientation(&jpeg, 6)).unwrap();
        assert_eq!(src.dimensions(), (100, 200));

        let job = ResizeJob::new(TargetSpec::pixels(100, 100)).with_fit(Fit::Inside);
        let out = resize_by_dimensions(&src, &job, &SearchConfig::default()).unwrap();
        assert_eq!(out.dimensions(), (50, 100));
        let decoded = image::load_from_memory(out.bytes()).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (50, 100));
    }

    #[test]
    fn test_resize_real_png_keeps_format() {
        let src = SourceImage::from_bytes(encode_as(&create_photo_like_image(120, 80), ImageFormat::Png))
            .unwrap();
        let out = resize_by_dimensions(&src, &ResizeJob::new(TargetSpec::pixels(90, 60)), &SearchConfig::default())
            .unwrap();
        assert_eq!(out.mime(), "image/png");
        assert_eq!(out.dimensions(), (90, 60));
        assert_eq!(out.quality(), 1.0);
    }

    #[test]
    fn test_enlarge_real_jpeg_grows_output() {
        let src = jpeg_source(160, 120);
        let target = src.byte_len() * 2;
        let out = enlarge_to_size(&src, &EnlargeJob::from_bytes(target), &SearchConfig::fast()).unwrap();
        assert!(out.achieved_bytes() > src.byte_len());
    }

    #[test]
    fn test_batch_of_five_with_corrupt_third() {
        let good = encode_as(&create_photo_like_image(128, 96), ImageFormat::Jpeg);
        let mut corrupt = good.clone();
        corrupt.truncate(32);
        let inputs = vec![good.clone(), good.clone(), corrupt, good.clone(), good.clone()];
        let target = (good.len() as u64 * 2 / 3).max(1024);

        let report = process_batch(inputs, &Job::Compress(CompressJob::from_bytes(target)), &SearchConfig::fast());

        assert_eq!(report.len(), 5);
        assert_eq!(report.success_count(), 4);
        let failed: Vec<usize> = report.failed().map(|o| o.index).collect();
        assert_eq!(failed, vec![2]);
        assert!(report.outcomes[2].result.as_ref().unwrap_err().is_decode_failure());
    }
}
