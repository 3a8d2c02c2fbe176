//! Pyramid assembly and metadata query tests.

use std::io::Cursor;

use wsi_jpeg::{FormatError, Fragment, JpegSlide, OpenError};

use super::test_utils::*;

fn multi_z_slide() -> JpegSlide<Cursor<Vec<u8>>> {
    // z = 0: two 512x512 JPEGs side by side; z = 1: one 512x512 JPEG
    JpegSlide::open(vec![
        Fragment::new("z0_a.jpg", 0, 0, 0, Cursor::new(encode_tiled_rgb(512, 512, 16, 1))),
        Fragment::new("z0_b.jpg", 0, 1, 0, Cursor::new(encode_tiled_rgb(512, 512, 16, 2))),
        Fragment::new("z1.jpg", 1, 0, 0, Cursor::new(encode_tiled_rgb(512, 512, 16, 3))),
    ])
    .unwrap()
}

// -----------------------------------------------------------------------------
// Level dimensions and ordering
// -----------------------------------------------------------------------------

#[test]
fn test_single_jpeg_yields_four_scaled_levels() {
    let slide = single_jpeg_slide(encode_tiled_rgb(512, 512, 16, 7));

    assert_eq!(slide.level_count(), 4);
    assert_eq!(slide.dimensions(0), (512, 512));
    assert_eq!(slide.dimensions(1), (256, 256));
    assert_eq!(slide.dimensions(2), (128, 128));
    assert_eq!(slide.dimensions(3), (64, 64));
}

#[test]
fn test_dimensions_out_of_range_is_zero() {
    let slide = single_jpeg_slide(encode_tiled_rgb(512, 512, 16, 7));
    assert_eq!(slide.dimensions(slide.level_count()), (0, 0));
    assert_eq!(slide.dimensions(100), (0, 0));
}

#[test]
fn test_two_fragment_grid_dimensions() {
    let slide = JpegSlide::open(vec![
        Fragment::new("a.jpg", 0, 0, 0, Cursor::new(encode_tiled_rgb(512, 512, 16, 1))),
        Fragment::new("b.jpg", 0, 1, 0, Cursor::new(encode_tiled_rgb(512, 512, 16, 2))),
    ])
    .unwrap();

    let level = &slide.levels()[0];
    assert_eq!(level.pixel_w, 1024);
    assert_eq!(level.pixel_h, 512);
    assert_eq!(level.jpegs_across, 2);
    assert_eq!(level.jpegs_down, 1);
    assert_eq!((level.image00_w, level.image00_h), (512, 512));
    assert_eq!(slide.dimensions(0), (1024, 512));
}

#[test]
fn test_multi_z_level_widths_sorted_with_ties() {
    let slide = multi_z_slide();

    let widths: Vec<u64> = slide
        .levels()
        .iter()
        .map(|l| l.effective_width())
        .collect();
    assert_eq!(widths, vec![1024, 512, 512, 256, 256, 128, 128, 64]);
    assert!(widths.windows(2).all(|w| w[0] >= w[1]));
}

#[test]
fn test_level_pixel_sums_match_constituents() {
    let slide = multi_z_slide();
    for level in slide.levels() {
        let row_width: u64 = (0..level.jpegs_across as usize)
            .map(|i| level.jpegs[i].width as u64)
            .sum();
        let col_height: u64 = (0..level.jpegs_down as usize)
            .map(|i| level.jpegs[i * level.jpegs_across as usize].height as u64)
            .sum();
        assert_eq!(level.pixel_w, row_width);
        assert_eq!(level.pixel_h, col_height);
    }
}

// -----------------------------------------------------------------------------
// Tile index invariants
// -----------------------------------------------------------------------------

#[test]
fn test_tile_starts_invariants() {
    let data = encode_tiled_rgb(512, 512, 16, 7);
    let slide = single_jpeg_slide(data.clone());
    let jpeg = &slide.levels()[0].jpegs[0];

    // 64x64 MCUs at interval 16 -> 4 tiles across, 64 down
    let starts = jpeg.tile_starts();
    assert_eq!(starts.len(), 256);
    assert!(starts.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(jpeg.tile_width, 128);
    assert_eq!(jpeg.tile_height, 8);

    // first entry is the first entropy byte after the SOS segment
    let sos = data.windows(2).position(|w| w == [0xFF, 0xDA]).unwrap();
    let seg_len = u16::from_be_bytes([data[sos + 2], data[sos + 3]]) as u64;
    assert_eq!(starts[0], sos as u64 + 2 + seg_len);
}

// -----------------------------------------------------------------------------
// Comment extraction
// -----------------------------------------------------------------------------

#[test]
fn test_comment_from_first_jpeg() {
    let data = with_comment(encode_tiled_rgb(64, 64, 8, 0), b"scanned at 20x\0trailing");
    let slide = single_jpeg_slide(data);
    assert_eq!(slide.comment(), Some("scanned at 20x"));
}

#[test]
fn test_no_comment() {
    let slide = single_jpeg_slide(encode_tiled_rgb(64, 64, 8, 0));
    assert_eq!(slide.comment(), None);
}

// -----------------------------------------------------------------------------
// Downsample queries
// -----------------------------------------------------------------------------

#[test]
fn test_level_downsamples() {
    let slide = multi_z_slide();
    let downsamples: Vec<f64> = (0..slide.level_count())
        .map(|i| slide.level_downsample(i).unwrap())
        .collect();
    assert_eq!(downsamples, vec![1.0, 2.0, 2.0, 4.0, 4.0, 8.0, 8.0, 16.0]);
    assert!(slide.level_downsample(8).is_none());
}

#[test]
fn test_best_level_for_downsample() {
    let slide = multi_z_slide();

    assert_eq!(slide.best_level_for_downsample(1.0), Some(0));
    assert_eq!(slide.best_level_for_downsample(2.0), Some(1));
    assert_eq!(slide.best_level_for_downsample(3.0), Some(3));
    assert_eq!(slide.best_level_for_downsample(16.0), Some(7));
    // past the smallest level: fall back to it
    assert_eq!(slide.best_level_for_downsample(64.0), Some(7));
    // below 1.0: highest resolution
    assert_eq!(slide.best_level_for_downsample(0.25), Some(0));
}

// -----------------------------------------------------------------------------
// Open-time validation
// -----------------------------------------------------------------------------

#[test]
fn test_bad_fragment_order() {
    let err = JpegSlide::open(vec![
        Fragment::new("a.jpg", 0, 0, 0, Cursor::new(encode_tiled_rgb(64, 64, 8, 0))),
        Fragment::new("b.jpg", 0, 1, 1, Cursor::new(encode_tiled_rgb(64, 64, 8, 1))),
    ])
    .unwrap_err();

    assert!(matches!(err, OpenError::BadFragmentOrder { index: 1, .. }));
}

#[test]
fn test_first_fragment_must_be_origin() {
    let err = JpegSlide::open(vec![Fragment::new(
        "a.jpg",
        0,
        1,
        0,
        Cursor::new(encode_tiled_rgb(64, 64, 8, 0)),
    )])
    .unwrap_err();

    assert!(matches!(err, OpenError::BadFragmentOrder { index: 0, .. }));
}

#[test]
fn test_incomplete_grid() {
    // valid successor order, ragged grid: row 0 has two columns, row 1 one
    let err = JpegSlide::open(vec![
        Fragment::new("00.jpg", 0, 0, 0, Cursor::new(encode_tiled_rgb(64, 64, 8, 0))),
        Fragment::new("10.jpg", 0, 1, 0, Cursor::new(encode_tiled_rgb(64, 64, 8, 1))),
        Fragment::new("01.jpg", 0, 0, 1, Cursor::new(encode_tiled_rgb(64, 64, 8, 2))),
    ])
    .unwrap_err();

    assert!(matches!(err, OpenError::IncompleteGrid { z: 0, .. }));
}

#[test]
fn test_jpeg_without_restart_markers_rejected() {
    let err = JpegSlide::open(vec![Fragment::new(
        "plain.jpg",
        0,
        0,
        0,
        Cursor::new(encode_plain_rgb(64, 64)),
    )])
    .unwrap_err();

    match err {
        OpenError::Format { id, source } => {
            assert_eq!(id, "plain.jpg");
            assert!(matches!(source, FormatError::InvalidFormat { .. }));
        }
        other => panic!("expected Format error, got {other:?}"),
    }
}

#[test]
fn test_empty_file_rejected() {
    let err = JpegSlide::open(vec![Fragment::new("e.jpg", 0, 0, 0, Cursor::new(Vec::new()))])
        .unwrap_err();

    match err {
        OpenError::Format { source, .. } => assert!(matches!(source, FormatError::InputEmpty)),
        other => panic!("expected Format error, got {other:?}"),
    }
}

#[test]
fn test_empty_slide() {
    let slide = JpegSlide::open(Vec::<Fragment<Cursor<Vec<u8>>>>::new()).unwrap();
    assert_eq!(slide.level_count(), 0);
    assert_eq!(slide.dimensions(0), (0, 0));
    assert_eq!(slide.comment(), None);
}
