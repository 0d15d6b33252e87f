//! Forward and inverse e-paper pipeline behaviour on whole frames.

use image::{DynamicImage, GrayImage, Luma};
use proptest::prelude::*;
use vudial_core::epaper::{self, ImageError, PackedFrame, THRESHOLD};
use vudial_core::protocol::display_constants::{BYTES_PER_COLUMN, PACKED_FRAME_LEN};

fn stripes(width: u32, height: u32, period: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        if ((x / period) + (y / period)) % 2 == 0 {
            Luma([220])
        } else {
            Luma([30])
        }
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Packing an unpacked frame gives back the same bytes.
    #[test]
    fn pack_unpack_round_trip(bytes in proptest::collection::vec(any::<u8>(), PACKED_FRAME_LEN)) {
        let gray = epaper::unpack(&bytes).unwrap();
        assert!(gray.as_bytes().iter().all(|&v| v == 0 || v == 255));
        let frame = epaper::pack(&gray);
        prop_assert_eq!(frame.as_bytes(), bytes.as_slice());
    }

    /// Any length other than a full frame is refused.
    #[test]
    fn unpack_rejects_other_lengths(len in 0usize..8000) {
        prop_assume!(len != PACKED_FRAME_LEN);
        let is_size_error = matches!(
            epaper::unpack(&vec![0u8; len]),
            Err(ImageError::InvalidFrameSize { .. })
        );
        prop_assert!(is_size_error);
    }

    /// Output is always a full frame whatever the source size.
    #[test]
    fn any_source_size_yields_full_frame(w in 1u32..400, h in 1u32..300) {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(w, h, Luma([200])));
        let frame = epaper::convert(&img).unwrap();
        prop_assert_eq!(frame.as_bytes().len(), PACKED_FRAME_LEN);
    }
}

#[test]
fn half_scale_source_is_centred_on_black() {
    let src = stripes(100, 72, 5);
    let frame = epaper::convert(&DynamicImage::ImageLuma8(src.clone())).unwrap();
    let gray = frame.to_grayscale();

    // The whole left border (columns 0..50) is padding.
    assert!(frame.as_bytes()[..50 * BYTES_PER_COLUMN].iter().all(|&b| b == 0));

    for y in 0..144usize {
        for x in 0..200usize {
            let inside = (50..150).contains(&x) && (36..108).contains(&y);
            let expected = if inside {
                let v = src.get_pixel(x as u32 - 50, y as u32 - 36).0[0];
                if v > THRESHOLD { 255 } else { 0 }
            } else {
                0
            };
            assert_eq!(gray.get(x, y), expected, "pixel ({x}, {y})");
        }
    }
}

#[test]
fn double_size_source_matches_half_scale_sampling() {
    let src = stripes(400, 288, 16);
    let frame = epaper::convert(&DynamicImage::ImageLuma8(src.clone())).unwrap();
    let gray = frame.to_grayscale();

    let mut mismatches = 0;
    for y in 0..144u32 {
        for x in 0..200u32 {
            let direct = src.get_pixel(x * 2, y * 2).0[0] > THRESHOLD;
            let packed = gray.get(x as usize, y as usize) == 255;
            if direct != packed {
                mismatches += 1;
            }
        }
    }
    // Only pixels on stripe edges may be resampled differently.
    assert!(mismatches < 200 * 144 / 20, "{mismatches} mismatched pixels");
}

#[test]
fn stored_frame_round_trips_through_bytes() {
    let frame = epaper::convert(&DynamicImage::ImageLuma8(stripes(200, 144, 8))).unwrap();
    let restored = PackedFrame::from_bytes(frame.as_bytes().to_vec()).unwrap();
    assert_eq!(restored, frame);
    assert_eq!(epaper::pack(&restored.to_grayscale()), frame);
}

#[test]
fn image_file_is_loaded() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("face.png");
    GrayImage::from_pixel(200, 144, Luma([255])).save(&path).unwrap();
    let img = epaper::open(&path).unwrap();
    let frame = epaper::convert(&img).unwrap();
    assert!(frame.as_bytes().iter().all(|&b| b == 0xFF));
    assert!(matches!(
        epaper::open(&dir.path().join("missing.png")),
        Err(ImageError::ConversionFailure(_))
    ));
}
