//! One restart-tiled JPEG file: metadata, index, and windowed region reads.

use std::io::{Read, Seek, SeekFrom};
use std::sync::Mutex;

use jpeg::PixelFormat;
use tracing::debug;

use crate::error::{FormatError, ReadError};
use crate::format::{index_restart_intervals, parse_header};
use crate::io::{WindowSource, WindowSpec};

// =============================================================================
// TiledJpeg
// =============================================================================

/// A baseline JPEG whose restart intervals have been indexed for random
/// access.
///
/// The reader sits behind a mutex because a decode seeks it around; one
/// region request drives one decode per involved JPEG from start to
/// teardown while holding that JPEG's lock, so concurrent requests
/// serialise per file.
#[derive(Debug)]
pub struct TiledJpeg<R> {
    reader: Mutex<R>,

    /// Identifier used in logs and decode errors (typically the file path)
    pub id: String,

    /// Decoded width in pixels
    pub width: u32,

    /// Decoded height in pixels
    pub height: u32,

    /// Width of one restart-interval tile in pixels
    pub tile_width: u32,

    /// Height of one restart-interval tile in pixels (one MCU row)
    pub tile_height: u32,

    /// Number of tiles per row
    pub tiles_across: u32,

    /// Number of tile rows
    pub tiles_down: u32,

    /// First COM marker payload, NUL-truncated
    pub comment: Option<String>,

    tile_starts: Vec<u64>,
    sof_dims_offset: u64,
}

impl<R: Read + Seek> TiledJpeg<R> {
    /// Parse and index a JPEG.
    ///
    /// Reads the marker headers, derives the tile grid from the restart
    /// structure, and scans the entropy stream once to record every tile's
    /// starting byte offset.
    pub fn open(id: impl Into<String>, mut reader: R) -> Result<Self, FormatError> {
        let id = id.into();

        reader.seek(SeekFrom::Start(0))?;
        let header = parse_header(&mut reader)?;
        let geometry = header.tile_geometry()?;
        let tile_starts = index_restart_intervals(&mut reader, &header, geometry.tile_count())?;

        debug!(
            id = %id,
            width = header.width,
            height = header.height,
            tile_width = geometry.tile_width,
            tile_height = geometry.tile_height,
            tiles = tile_starts.len(),
            "indexed JPEG"
        );

        Ok(Self {
            reader: Mutex::new(reader),
            id,
            width: header.width,
            height: header.height,
            tile_width: geometry.tile_width,
            tile_height: geometry.tile_height,
            tiles_across: geometry.tiles_across,
            tiles_down: geometry.tiles_down,
            comment: header.comment,
            tile_starts,
            sof_dims_offset: header.sof_dims_offset,
        })
    }

    /// The tile-start offset table, one entry per restart interval in
    /// row-major tile order.
    pub fn tile_starts(&self) -> &[u64] {
        &self.tile_starts
    }

    /// Decode a rectangle of this JPEG into `dest`.
    ///
    /// `(x, y)` is the origin in the JPEG's unscaled pixel space; `w` and
    /// `h` are the destination extent in scaled pixels; `dest_stride` is the
    /// destination row stride in pixels. `dest` must hold at least
    /// `(h - 1) * dest_stride + w` pixels; pixels are written as
    /// `0xAARRGGBB` with alpha forced to 0xFF.
    ///
    /// Only the restart intervals overlapping the rectangle are decoded:
    /// the window source splices their spans into a shortened scan whose
    /// SOF claims the window dimensions, the codec decodes that window at
    /// `scale_denom`, and the requested rectangle is cropped out of it.
    pub fn read_region(
        &self,
        dest: &mut [u32],
        dest_stride: usize,
        x: u32,
        y: u32,
        scale_denom: u32,
        w: u32,
        h: u32,
    ) -> Result<(), ReadError> {
        if w == 0 || h == 0 {
            return Ok(());
        }
        debug_assert!(matches!(scale_denom, 1 | 2 | 4 | 8));
        debug_assert!(x < self.width && y < self.height);

        let tw = self.tile_width;
        let th = self.tile_height;
        let tile_x = x / tw;
        let tile_y = y / th;

        // ceil of the unscaled extent, in tiles, then clamped to the grid
        let span_w = w as u64 * scale_denom as u64 + (x % tw) as u64;
        let span_h = h as u64 * scale_denom as u64 + (y % th) as u64;
        let width_in_tiles =
            (((span_w + tw as u64 - 1) / tw as u64) as u32).min(self.tiles_across - tile_x);
        let height_in_tiles =
            (((span_h + th as u64 - 1) / th as u64) as u32).min(self.tiles_down - tile_y);
        if width_in_tiles == 0 || height_in_tiles == 0 {
            return Ok(());
        }

        let window_w = width_in_tiles * tw;
        let window_h = height_in_tiles * th;
        let spec = WindowSpec {
            top_left: (tile_y * self.tiles_across + tile_x) as usize,
            tiles_across: width_in_tiles as usize,
            tiles_down: height_in_tiles as usize,
            row_stride: self.tiles_across as usize,
            patched_dims: (window_w as u16, window_h as u16),
        };

        let mut guard = match self.reader.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let source = WindowSource::new(&mut *guard, &self.tile_starts, self.sof_dims_offset, spec);
        let mut decoder = jpeg::Decoder::new(source);

        let decode_err = |source: jpeg::Error| ReadError::Decode {
            id: self.id.clone(),
            source,
        };

        let (out_w, out_h) = if scale_denom == 1 {
            decoder.read_info().map_err(decode_err)?;
            (window_w as usize, window_h as usize)
        } else {
            let (ow, oh) = decoder
                .scale(
                    (window_w / scale_denom) as u16,
                    (window_h / scale_denom) as u16,
                )
                .map_err(decode_err)?;
            (ow as usize, oh as usize)
        };

        let pixels = decoder.decode().map_err(decode_err)?;
        let info = decoder
            .info()
            .ok_or_else(|| decode_err(jpeg::Error::Format("decoder reported no info".into())))?;
        let components = match info.pixel_format {
            PixelFormat::RGB24 => 3,
            PixelFormat::L8 => 1,
            other => {
                return Err(decode_err(jpeg::Error::Format(format!(
                    "unsupported pixel format {other:?}"
                ))))
            }
        };

        // Crop the requested rectangle out of the decoded window. A short
        // decode (fewer rows or columns than the window promised) is
        // tolerated by clamping.
        let crop_x = ((x % tw) / scale_denom) as usize;
        let crop_y = ((y % th) / scale_denom) as usize;
        let rows_available = (pixels.len() / (out_w * components)).min(out_h);
        let copy_w = (w as usize).min(out_w.saturating_sub(crop_x));

        for row in 0..h as usize {
            let src_row = crop_y + row;
            if src_row >= rows_available {
                break;
            }
            let src_base = (src_row * out_w + crop_x) * components;
            let dest_row = &mut dest[row * dest_stride..row * dest_stride + copy_w];

            match components {
                3 => {
                    for (i, px) in dest_row.iter_mut().enumerate() {
                        let p = src_base + i * 3;
                        *px = 0xFF00_0000
                            | (pixels[p] as u32) << 16
                            | (pixels[p + 1] as u32) << 8
                            | pixels[p + 2] as u32;
                    }
                }
                _ => {
                    for (i, px) in dest_row.iter_mut().enumerate() {
                        let g = pixels[src_base + i] as u32;
                        *px = 0xFF00_0000 | g << 16 | g << 8 | g;
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
impl<R> TiledJpeg<R> {
    /// Construct a metadata-only instance for grid and level tests.
    pub(crate) fn stub(id: &str, reader: R, width: u32, height: u32) -> Self {
        Self {
            reader: Mutex::new(reader),
            id: id.to_string(),
            width,
            height,
            tile_width: width.min(128),
            tile_height: 8,
            tiles_across: width / width.min(128),
            tiles_down: height / 8,
            comment: None,
            tile_starts: vec![0],
            sof_dims_offset: 0,
        }
    }
}
