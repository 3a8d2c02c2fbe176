//! # wsi-jpeg
//!
//! A tiled-JPEG random access engine for Whole Slide Images.
//!
//! Gigapixel microscopy slides are commonly stored as grids of baseline
//! JPEG files replicated across several resolution levels. This library
//! exposes such a pyramid as a random-access raster region reader: given an
//! arbitrary pixel rectangle at an arbitrary level, it decodes only the
//! JPEG restart intervals ("tiles") that overlap it and assembles a
//! correctly cropped 32-bit raster.
//!
//! ## How it works
//!
//! - **Restart-marker indexing**: each JPEG is scanned once at open time to
//!   record the byte offset of every restart interval.
//! - **Windowed decoding**: a custom byte source splices the tile spans
//!   overlapping a request into one shortened scan, renumbering the restart
//!   markers and patching the frame dimensions on the fly, so a stock
//!   baseline decoder accepts it.
//! - **Native scaling**: the codec's built-in 1, 1/2, 1/4 and 1/8 scale
//!   factors turn every grid of JPEGs into four pyramid levels.
//!
//! ## Modules
//!
//! - [`mod@format`] - JPEG header parsing and restart-marker indexing
//! - [`io`] - the windowed, marker-renumbering byte source
//! - [`tile`] - per-JPEG windowed region decoding
//! - [`slide`] - fragment intake, level pyramid, region dispatch
//! - [`error`] - error types per concern
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::fs::File;
//! use std::io::BufReader;
//! use wsi_jpeg::{Fragment, JpegSlide};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let file = BufReader::new(File::open("slide_0_0_0.jpg")?);
//! let slide = JpegSlide::open(vec![Fragment::new("slide_0_0_0.jpg", 0, 0, 0, file)])?;
//!
//! let (w, h) = slide.dimensions(0);
//! println!("level 0: {w}x{h}, {} levels", slide.level_count());
//!
//! let mut region = vec![0u32; 512 * 512];
//! slide.read_region(&mut region, 1024, 2048, 0, 512, 512)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! A region read drives each involved JPEG's decoder start-to-teardown
//! while holding that JPEG's lock; concurrent requests against one slide
//! serialise per JPEG. For real parallelism, open one slide per worker with
//! independent readers.

pub mod error;
pub mod format;
pub mod io;
pub mod slide;
pub mod tile;

// Re-export commonly used types
pub use error::{FormatError, OpenError, ReadError};
pub use format::{parse_header, ScanHeader, TileGeometry};
pub use io::{WindowSource, WindowSpec};
pub use slide::{Fragment, JpegSlide, Level, SCALE_DENOMS};
pub use tile::TiledJpeg;
