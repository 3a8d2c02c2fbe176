//! Pyramid level assembly.
//!
//! Each z block of fragments yields four [`Level`]s, one per codec scale
//! denominator (1, 2, 4, 8), all sharing the same JPEG references. The
//! caller-visible pyramid is the flat list of all levels sorted by
//! descending effective width; two z blocks may legitimately produce levels
//! of the same effective width, and both are kept.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::OpenError;
use crate::tile::TiledJpeg;

/// The scale denominators a baseline JPEG codec can decode natively.
pub const SCALE_DENOMS: [u32; 4] = [1, 2, 4, 8];

// =============================================================================
// Level
// =============================================================================

/// One caller-visible pyramid level: a z block of JPEGs at one scale
/// denominator.
#[derive(Debug)]
pub struct Level<R> {
    /// JPEG references in row-major grid order, shared across the four
    /// levels of a z block
    pub jpegs: Vec<Arc<TiledJpeg<R>>>,

    /// Total width in unscaled pixels (sum of the y = 0 row's widths)
    pub pixel_w: u64,

    /// Total height in unscaled pixels (sum of the x = 0 column's heights)
    pub pixel_h: u64,

    /// Grid width in JPEGs
    pub jpegs_across: u32,

    /// Grid height in JPEGs
    pub jpegs_down: u32,

    /// Width of the (0, 0) JPEG; all non-edge JPEGs share its dimensions,
    /// which is what makes (x, y) -> JPEG lookup a division
    pub image00_w: u32,

    /// Height of the (0, 0) JPEG
    pub image00_h: u32,

    /// Codec scale denominator, one of 1, 2, 4, 8
    pub scale_denom: u32,

    /// Ratio of level 0's unscaled width to this level's unscaled width;
    /// maps level-0 pixel space into this z block's JPEG space
    pub rel_downsample: f64,
}

impl<R> Level<R> {
    /// Width in this level's scaled pixel space.
    pub fn effective_width(&self) -> u64 {
        self.pixel_w / self.scale_denom as u64
    }

    /// Height in this level's scaled pixel space.
    pub fn effective_height(&self) -> u64 {
        self.pixel_h / self.scale_denom as u64
    }

    /// Overall downsample factor relative to level 0's scaled space.
    pub fn downsample(&self) -> f64 {
        self.rel_downsample * self.scale_denom as f64
    }
}

// =============================================================================
// Builder
// =============================================================================

/// Assemble the sorted level pyramid from fragments already validated to be
/// in (z, x, y) successor order.
///
/// `coords` and `jpegs` run in parallel. Each z block must fill its
/// `(last_x + 1) x (last_y + 1)` grid exactly, else
/// [`OpenError::IncompleteGrid`].
pub(crate) fn build_levels<R>(
    coords: &[(u32, u32, u32)],
    jpegs: &[Arc<TiledJpeg<R>>],
) -> Result<Vec<Level<R>>, OpenError> {
    debug_assert_eq!(coords.len(), jpegs.len());

    // keyed by effective width; each key keeps its levels in insertion order
    let mut by_width: BTreeMap<u64, Vec<Level<R>>> = BTreeMap::new();

    let mut block_start = 0usize;
    let mut pixel_w = 0u64;
    let mut pixel_h = 0u64;
    let mut image00 = (0u32, 0u32);
    let mut layer0_w = 0u64;

    for (i, &(z, x, y)) in coords.iter().enumerate() {
        let jpeg = &jpegs[i];

        if x == 0 && y == 0 {
            image00 = (jpeg.width, jpeg.height);
        }
        if y == 0 {
            pixel_w += jpeg.width as u64;
        }
        if x == 0 {
            pixel_h += jpeg.height as u64;
        }

        let block_ends = i + 1 == coords.len() || coords[i + 1].0 != z;
        if !block_ends {
            continue;
        }

        let across = x + 1;
        let down = y + 1;
        let actual = i + 1 - block_start;
        if actual != (across as usize) * (down as usize) {
            return Err(OpenError::IncompleteGrid {
                z,
                across,
                down,
                actual,
            });
        }

        // the successor rule guarantees the first block is z = 0
        if z == 0 {
            layer0_w = pixel_w;
        }

        let block = &jpegs[block_start..=i];
        for scale_denom in SCALE_DENOMS {
            let level = Level {
                jpegs: block.to_vec(),
                pixel_w,
                pixel_h,
                jpegs_across: across,
                jpegs_down: down,
                image00_w: image00.0,
                image00_h: image00.1,
                scale_denom,
                rel_downsample: layer0_w as f64 / pixel_w as f64,
            };
            by_width
                .entry(level.effective_width())
                .or_default()
                .push(level);
        }

        block_start = i + 1;
        pixel_w = 0;
        pixel_h = 0;
        image00 = (0, 0);
    }

    // flatten in descending effective width, insertion order within ties
    let mut levels = Vec::new();
    for (_, group) in by_width.into_iter().rev() {
        levels.extend(group);
    }
    Ok(levels)
}

// =============================================================================
// Tests
// =============================================================================
