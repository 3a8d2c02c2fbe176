//! Test utilities for integration tests.
//!
//! Fixtures are baseline JPEGs encoded in memory with a restart interval,
//! so every test is self-contained. Reference pixels come from whole-file
//! decodes through the same codec the engine uses; since JPEG is lossy,
//! all comparisons are engine-output against reference-decode of the same
//! bytes, which must match exactly.

use std::io::{Cursor, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use jpeg_encoder::{ColorType, Encoder, SamplingFactor};

use wsi_jpeg::{Fragment, JpegSlide};

/// Route engine logs to the test output; run with `RUST_LOG=wsi_jpeg=trace`
/// to watch the dispatcher at work when a test fails.
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Fixture encoding
// =============================================================================

/// Deterministic RGB gradient; `seed` shifts the pattern so fragments are
/// distinguishable.
pub fn gradient_rgb(width: u16, height: u16, seed: u8) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width as usize * height as usize * 3);
    for y in 0..height as u32 {
        for x in 0..width as u32 {
            pixels.push(((x / 4) as u8).wrapping_add(seed));
            pixels.push(((y / 4) as u8).wrapping_mul(3));
            pixels.push((((x + y) / 8) as u8) ^ seed);
        }
    }
    pixels
}

/// Encode a baseline 4:4:4 RGB JPEG with the given restart interval (in
/// MCUs). 4:4:4 keeps MCUs at 8x8 so tile geometry stays simple and no
/// chroma upsampling is involved.
pub fn encode_tiled_rgb(width: u16, height: u16, restart_mcus: u16, seed: u8) -> Vec<u8> {
    let pixels = gradient_rgb(width, height, seed);
    let mut buf = Vec::new();
    let mut encoder = Encoder::new(&mut buf, 90);
    encoder.set_sampling_factor(SamplingFactor::F_1_1);
    encoder.set_restart_interval(restart_mcus);
    encoder
        .encode(&pixels, width, height, ColorType::Rgb)
        .unwrap();
    buf
}

/// Encode a grayscale fixture.
pub fn encode_tiled_gray(width: u16, height: u16, restart_mcus: u16) -> Vec<u8> {
    let pixels: Vec<u8> = (0..height as u32)
        .flat_map(|y| (0..width as u32).map(move |x| ((x / 4 + y / 4) % 256) as u8))
        .collect();
    let mut buf = Vec::new();
    let mut encoder = Encoder::new(&mut buf, 90);
    encoder.set_restart_interval(restart_mcus);
    encoder
        .encode(&pixels, width, height, ColorType::Luma)
        .unwrap();
    buf
}

/// Encode a fixture without restart markers (invalid for the engine).
pub fn encode_plain_rgb(width: u16, height: u16) -> Vec<u8> {
    let pixels = gradient_rgb(width, height, 0);
    let mut buf = Vec::new();
    let mut encoder = Encoder::new(&mut buf, 90);
    encoder.set_sampling_factor(SamplingFactor::F_1_1);
    encoder
        .encode(&pixels, width, height, ColorType::Rgb)
        .unwrap();
    buf
}

/// Splice a COM segment right after SOI.
pub fn with_comment(mut jpeg: Vec<u8>, comment: &[u8]) -> Vec<u8> {
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    let mut segment = vec![0xFF, 0xFE];
    segment.extend(((comment.len() + 2) as u16).to_be_bytes());
    segment.extend(comment);
    jpeg.splice(2..2, segment);
    jpeg
}

// =============================================================================
// Reference decodes
// =============================================================================

/// Whole-file decode through the engine's codec.
pub fn decode_full(data: &[u8]) -> (Vec<u8>, usize, usize) {
    let mut decoder = jpeg::Decoder::new(Cursor::new(data));
    let pixels = decoder.decode().unwrap();
    let info = decoder.info().unwrap();
    (pixels, info.width as usize, info.height as usize)
}

/// Whole-file decode at the codec's DCT scaling.
pub fn decode_scaled(data: &[u8], req_w: u16, req_h: u16) -> (Vec<u8>, usize, usize) {
    let mut decoder = jpeg::Decoder::new(Cursor::new(data));
    let (w, h) = decoder.scale(req_w, req_h).unwrap();
    let pixels = decoder.decode().unwrap();
    (pixels, w as usize, h as usize)
}

/// Pack RGB bytes the way the engine packs pixels.
pub fn pack_rgb(pixels: &[u8]) -> Vec<u32> {
    pixels
        .chunks_exact(3)
        .map(|c| 0xFF00_0000 | (c[0] as u32) << 16 | (c[1] as u32) << 8 | c[2] as u32)
        .collect()
}

/// Pack grayscale bytes the way the engine packs pixels.
pub fn pack_luma(pixels: &[u8]) -> Vec<u32> {
    pixels
        .iter()
        .map(|&g| {
            let g = g as u32;
            0xFF00_0000 | g << 16 | g << 8 | g
        })
        .collect()
}

/// Crop a packed row-major raster.
pub fn crop(src: &[u32], src_w: usize, x: usize, y: usize, w: usize, h: usize) -> Vec<u32> {
    let mut out = Vec::with_capacity(w * h);
    for row in 0..h {
        let base = (y + row) * src_w + x;
        out.extend_from_slice(&src[base..base + w]);
    }
    out
}

// =============================================================================
// Slide helpers
// =============================================================================

/// Open a slide over one in-memory JPEG.
pub fn single_jpeg_slide(data: Vec<u8>) -> JpegSlide<Cursor<Vec<u8>>> {
    JpegSlide::open(vec![Fragment::new("fixture.jpg", 0, 0, 0, Cursor::new(data))]).unwrap()
}

/// Read a region into a fresh buffer.
pub fn read_region_vec<R: Read + Seek>(
    slide: &JpegSlide<R>,
    x: i64,
    y: i64,
    level: usize,
    w: u32,
    h: u32,
) -> Vec<u32> {
    let mut dest = vec![0u32; w as usize * h as usize];
    slide.read_region(&mut dest, x, y, level, w, h).unwrap();
    dest
}

// =============================================================================
// Byte-counting reader
// =============================================================================

/// A reader that counts every byte handed out, for verifying that windowed
/// reads touch only the spans they should.
pub struct CountingReader {
    inner: Cursor<Vec<u8>>,
    bytes_read: Arc<AtomicU64>,
}

impl CountingReader {
    pub fn new(data: Vec<u8>) -> (Self, Arc<AtomicU64>) {
        let bytes_read = Arc::new(AtomicU64::new(0));
        (
            Self {
                inner: Cursor::new(data),
                bytes_read: Arc::clone(&bytes_read),
            },
            bytes_read,
        )
    }
}

impl Read for CountingReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bytes_read.fetch_add(n as u64, Ordering::SeqCst);
        Ok(n)
    }
}

impl Seek for CountingReader {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}
