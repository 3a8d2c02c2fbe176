//! The slide backend: fragment intake, level pyramid, region dispatch.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │             JpegSlide::read_region          │
//! │  (level lookup, per-JPEG sub-rectangles)    │
//! └──────────────────────┬──────────────────────┘
//!                        │ one call per intersecting JPEG
//!                        ▼
//! ┌─────────────────────────────────────────────┐
//! │           TiledJpeg::read_region            │
//! │  (tile window, codec scale, crop + pack)    │
//! └──────────────────────┬──────────────────────┘
//!                        │ one synthesized scan per decode
//!                        ▼
//! ┌─────────────────────────────────────────────┐
//! │                WindowSource                 │
//! │  (span seeking, SOF patch, RST renumbering) │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Data flows bottom-up at open time (restart index → per-JPEG metadata →
//! levels) and top-down at query time.

use std::io::{Read, Seek};
use std::sync::Arc;

use tracing::{debug, trace};

use crate::error::{OpenError, ReadError};
use crate::tile::TiledJpeg;

pub mod fragment;
pub mod level;

pub use fragment::Fragment;
pub use level::{Level, SCALE_DENOMS};

// =============================================================================
// JpegSlide
// =============================================================================

/// A pyramid of restart-tiled JPEGs exposed as a random-access region
/// reader.
///
/// Construction indexes every fragment once; reads decode only the restart
/// intervals overlapping the requested rectangle. Dropping the slide
/// releases the levels and closes every JPEG.
#[derive(Debug)]
pub struct JpegSlide<R> {
    jpegs: Vec<Arc<TiledJpeg<R>>>,
    levels: Vec<Level<R>>,
}

impl<R: Read + Seek> JpegSlide<R> {
    /// Build a slide from fragments sorted by `(z, x, y)` row-major.
    ///
    /// Consumes the fragments; on failure everything already opened is
    /// dropped, closing its readers. An empty fragment list yields an empty
    /// slide with zero levels.
    pub fn open(fragments: Vec<Fragment<R>>) -> Result<Self, OpenError> {
        let mut prev: Option<(u32, u32, u32)> = None;
        for (index, fragment) in fragments.iter().enumerate() {
            if !fragment::is_successor(prev, fragment.z, fragment.x, fragment.y) {
                let (prev_z, prev_x, prev_y) = match prev {
                    Some((z, x, y)) => (z as i64, x as i64, y as i64),
                    None => (-1, -1, -1),
                };
                return Err(OpenError::BadFragmentOrder {
                    index,
                    prev_z,
                    prev_x,
                    prev_y,
                    z: fragment.z,
                    x: fragment.x,
                    y: fragment.y,
                });
            }
            prev = Some((fragment.z, fragment.x, fragment.y));
        }

        let mut coords = Vec::with_capacity(fragments.len());
        let mut jpegs = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            coords.push((fragment.z, fragment.x, fragment.y));
            let jpeg = TiledJpeg::open(fragment.id.clone(), fragment.reader)
                .map_err(|source| OpenError::Format {
                    id: fragment.id,
                    source,
                })?;
            jpegs.push(Arc::new(jpeg));
        }

        let levels = level::build_levels(&coords, &jpegs)?;
        debug!(jpegs = jpegs.len(), levels = levels.len(), "opened slide");

        Ok(Self { jpegs, levels })
    }

    /// Read a region of `level` into `dest` as `0xAARRGGBB` words.
    ///
    /// `(x, y)` is the origin in the level's scaled pixel space; `dest`
    /// receives `w * h` pixels row-major with alpha forced to 0xFF. Parts of
    /// the rectangle outside the level are zero-filled.
    pub fn read_region(
        &self,
        dest: &mut [u32],
        x: i64,
        y: i64,
        level: usize,
        w: u32,
        h: u32,
    ) -> Result<(), ReadError> {
        let needed = w as usize * h as usize;
        if dest.len() < needed {
            return Err(ReadError::BufferTooSmall {
                needed,
                actual: dest.len(),
            });
        }
        dest[..needed].fill(0);

        let layer = self.levels.get(level).ok_or(ReadError::LevelOutOfRange {
            level,
            level_count: self.levels.len(),
        })?;
        if w == 0 || h == 0 {
            return Ok(());
        }

        debug!(level, x, y, w, h, scale_denom = layer.scale_denom, "read region");

        // A negative origin shifts the destination window; the skipped part
        // stays zero like any other out-of-bounds area.
        let stride = w as usize;
        let (x, dest_x0, w) = clamp_origin(x, w);
        let (y, dest_y0, h) = clamp_origin(y, h);
        if w == 0 || h == 0 {
            return Ok(());
        }

        let denom = layer.scale_denom as i64;

        // Map the origin into this z block's unscaled JPEG space. The
        // origin is addressed in the level's own scaled space, so the
        // mapping is a multiplication that lands on a scale_denom boundary
        // by construction; the codec's scaler applies without
        // fractional-pixel resampling. The codec accounts for scale_denom
        // everywhere else; only extents are premultiplied here.
        let mut src_y = y.saturating_mul(denom);
        let end_src_y = src_y
            .saturating_add(h as i64 * denom)
            .min(layer.pixel_h as i64);
        let mut dest_y = 0i64;

        while src_y < end_src_y {
            let file_y = src_y / layer.image00_h as i64;
            let seg_origin_y = file_y * layer.image00_h as i64;
            let end_in_seg_y = ((file_y + 1) * layer.image00_h as i64).min(end_src_y) - seg_origin_y;
            let start_in_seg_y = src_y - seg_origin_y;
            let dest_h = ((end_in_seg_y - start_in_seg_y) / denom).min(h as i64 - dest_y);

            let mut src_x = x.saturating_mul(denom);
            let end_src_x = src_x
                .saturating_add(w as i64 * denom)
                .min(layer.pixel_w as i64);
            let mut dest_x = 0i64;

            while src_x < end_src_x {
                let file_x = src_x / layer.image00_w as i64;
                let seg_origin_x = file_x * layer.image00_w as i64;
                let end_in_seg_x =
                    ((file_x + 1) * layer.image00_w as i64).min(end_src_x) - seg_origin_x;
                let start_in_seg_x = src_x - seg_origin_x;
                let dest_w = ((end_in_seg_x - start_in_seg_x) / denom).min(w as i64 - dest_x);

                if dest_w > 0 && dest_h > 0 {
                    let jpeg =
                        &layer.jpegs[(file_y * layer.jpegs_across as i64 + file_x) as usize];
                    trace!(
                        id = %jpeg.id,
                        src_x = start_in_seg_x,
                        src_y = start_in_seg_y,
                        dest_w,
                        dest_h,
                        "dispatch cell"
                    );

                    let offset = (dest_y0 + dest_y as usize) * stride + dest_x0 + dest_x as usize;
                    jpeg.read_region(
                        &mut dest[offset..],
                        stride,
                        start_in_seg_x as u32,
                        start_in_seg_y as u32,
                        layer.scale_denom,
                        dest_w as u32,
                        dest_h as u32,
                    )?;
                }

                dest_x += dest_w.max(0);
                src_x = seg_origin_x + end_in_seg_x;
            }

            dest_y += dest_h.max(0);
            src_y = seg_origin_y + end_in_seg_y;
        }

        Ok(())
    }
}

impl<R> JpegSlide<R> {
    /// Number of pyramid levels; level 0 is always the largest.
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// The levels, sorted by non-increasing effective width.
    pub fn levels(&self) -> &[Level<R>] {
        &self.levels
    }

    /// Scaled dimensions of a level, or `(0, 0)` if out of range.
    pub fn dimensions(&self, level: usize) -> (u64, u64) {
        match self.levels.get(level) {
            Some(l) => (l.effective_width(), l.effective_height()),
            None => (0, 0),
        }
    }

    /// Downsample factor of a level relative to level 0, or `None` if out
    /// of range.
    pub fn level_downsample(&self, level: usize) -> Option<f64> {
        self.levels.get(level).map(Level::downsample)
    }

    /// The level best suited for rendering at `downsample`: the first level
    /// at least as downsampled as requested, or the smallest level.
    pub fn best_level_for_downsample(&self, downsample: f64) -> Option<usize> {
        if self.levels.is_empty() {
            return None;
        }
        // levels are sorted by ascending downsample
        let found = self
            .levels
            .iter()
            .position(|l| l.downsample() >= downsample * 0.99);
        Some(found.unwrap_or(self.levels.len() - 1))
    }

    /// The comment from the first JPEG's first COM marker.
    pub fn comment(&self) -> Option<&str> {
        self.jpegs.first()?.comment.as_deref()
    }
}

/// Clamp one axis of a region origin at zero. Returns the clamped origin,
/// the destination offset covering the cut-off part, and the remaining
/// extent.
fn clamp_origin(origin: i64, extent: u32) -> (i64, usize, u32) {
    if origin >= 0 {
        return (origin, 0, extent);
    }
    let cut = origin.unsigned_abs();
    if cut >= extent as u64 {
        (0, 0, 0)
    } else {
        (0, cut as usize, extent - cut as u32)
    }
}
