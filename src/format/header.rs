//! Baseline JPEG header parsing.
//!
//! One forward pass over the marker segments collects everything the engine
//! needs to know about a file before touching its entropy-coded data:
//!
//! - frame dimensions and per-component sampling factors (SOF), from which
//!   the MCU geometry is derived,
//! - the restart interval (DRI),
//! - the first comment (COM), kept for the slide-level comment query,
//! - the byte offset of the first entropy byte after SOS, where the
//!   restart-marker index starts,
//! - the byte offset of the SOF dimension fields, which the window source
//!   later rewrites to shrink the scan to a tile window.
//!
//! Progressive, arithmetic-coded and lossless frames are rejected: the
//! engine's tile model only holds for baseline sequential scans.

use std::io::Read;

use crate::error::FormatError;

use super::markers;

// =============================================================================
// Parsed header
// =============================================================================

/// Everything learned from a JPEG's marker segments, up to and including SOS.
#[derive(Debug, Clone)]
pub struct ScanHeader {
    /// Frame width in pixels
    pub width: u32,

    /// Frame height in pixels
    pub height: u32,

    /// MCU width in pixels (8 × max horizontal sampling factor)
    pub mcu_width: u32,

    /// MCU height in pixels (8 × max vertical sampling factor)
    pub mcu_height: u32,

    /// Number of MCUs per MCU row
    pub mcus_per_row: u32,

    /// Number of MCU rows in the scan
    pub mcu_rows: u32,

    /// Restart interval in MCUs; 0 when the file carries no DRI marker
    pub restart_interval: u32,

    /// File offset of the four SOF dimension bytes (height, then width)
    pub sof_dims_offset: u64,

    /// File offset of the first entropy byte after the SOS segment
    pub scan_start: u64,

    /// First COM marker payload, truncated at the first NUL
    pub comment: Option<String>,
}

/// The tile grid derived from a header's restart structure.
///
/// A "tile" is the pixel area covered by one restart interval: a run of
/// `restart_interval` MCUs within a single MCU row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGeometry {
    /// Tile width in pixels
    pub tile_width: u32,

    /// Tile height in pixels (one MCU row)
    pub tile_height: u32,

    /// Number of tiles per row
    pub tiles_across: u32,

    /// Number of tile rows
    pub tiles_down: u32,
}

impl TileGeometry {
    /// Total number of tiles in the grid.
    pub fn tile_count(&self) -> usize {
        self.tiles_across as usize * self.tiles_down as usize
    }
}

impl ScanHeader {
    /// Derive the tile grid, validating that the restart structure actually
    /// tiles the frame.
    ///
    /// Fails with [`FormatError::InvalidFormat`] when the restart interval is
    /// zero (or absent), when it does not divide the MCUs in a row (a tile
    /// would straddle MCU rows), or when the derived tile dimensions do not
    /// divide the frame evenly.
    pub fn tile_geometry(&self) -> Result<TileGeometry, FormatError> {
        if self.restart_interval == 0 {
            return Err(FormatError::invalid("restart interval is zero or missing"));
        }
        if self.mcus_per_row % self.restart_interval != 0 {
            return Err(FormatError::invalid(format!(
                "restart interval {} does not divide {} MCUs per row",
                self.restart_interval, self.mcus_per_row
            )));
        }

        let tiles_across = self.mcus_per_row / self.restart_interval;
        let tiles_down = self.mcu_rows;

        if self.width % tiles_across != 0 || self.height % tiles_down != 0 {
            return Err(FormatError::invalid(format!(
                "restart structure {}x{} does not tile a {}x{} frame evenly",
                tiles_across, tiles_down, self.width, self.height
            )));
        }

        Ok(TileGeometry {
            tile_width: self.width / tiles_across,
            tile_height: self.height / tiles_down,
            tiles_across,
            tiles_down,
        })
    }
}

// =============================================================================
// Parsing
// =============================================================================

/// Parse the marker segments of a baseline JPEG, stopping after SOS.
///
/// The reader must be positioned at the start of the file. On return it is
/// positioned at the first entropy byte ([`ScanHeader::scan_start`]).
pub fn parse_header<R: Read>(reader: &mut R) -> Result<ScanHeader, FormatError> {
    let mut r = CountingReader::new(reader);

    // SOI
    let mut soi = [0u8; 2];
    let n = r.read_some(&mut soi)?;
    if n == 0 {
        return Err(FormatError::InputEmpty);
    }
    if n < 2 || soi != [0xFF, markers::SOI] {
        return Err(FormatError::invalid("missing SOI marker"));
    }

    let mut sof: Option<SofInfo> = None;
    let mut restart_interval = 0u32;
    let mut comment: Option<String> = None;

    let scan_start = loop {
        // Scan forward to the next marker, tolerating fill bytes.
        let mut b = r.read_u8()?;
        while b != 0xFF {
            b = r.read_u8()?;
        }
        let mut code = r.read_u8()?;
        while code == 0xFF {
            code = r.read_u8()?;
        }

        if code == 0x00 || code == markers::SOI {
            continue;
        }
        if code == markers::EOI || markers::is_restart(code) {
            return Err(FormatError::invalid("no SOS marker before end of stream"));
        }

        let len = r.read_u16_be()? as usize;
        if len < 2 {
            return Err(FormatError::invalid("marker segment length below 2"));
        }
        let payload = len - 2;

        match code {
            markers::SOF0 | markers::SOF1 => {
                if sof.is_some() {
                    return Err(FormatError::invalid("multiple SOF markers"));
                }
                sof = Some(parse_sof(&mut r, payload)?);
            }
            markers::SOF2 => {
                return Err(FormatError::invalid("progressive JPEG is not supported"));
            }
            markers::DAC => {
                return Err(FormatError::invalid(
                    "arithmetic-coded JPEG is not supported",
                ));
            }
            0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                return Err(FormatError::invalid(format!(
                    "unsupported frame type 0x{code:02X}"
                )));
            }
            markers::DRI => {
                if payload != 2 {
                    return Err(FormatError::invalid("malformed DRI segment"));
                }
                restart_interval = r.read_u16_be()? as u32;
            }
            markers::COM => {
                let raw = r.read_vec(payload)?;
                if comment.is_none() {
                    comment = Some(comment_from_bytes(&raw));
                }
            }
            markers::SOS => {
                r.skip(payload)?;
                break r.position();
            }
            _ => r.skip(payload)?,
        }
    };

    let sof = sof.ok_or_else(|| FormatError::invalid("no SOF marker before SOS"))?;

    let mcu_width = 8 * sof.h_max;
    let mcu_height = 8 * sof.v_max;
    let mcus_per_row = (sof.width + mcu_width - 1) / mcu_width;
    let mcu_rows = (sof.height + mcu_height - 1) / mcu_height;

    Ok(ScanHeader {
        width: sof.width,
        height: sof.height,
        mcu_width,
        mcu_height,
        mcus_per_row,
        mcu_rows,
        restart_interval,
        sof_dims_offset: sof.dims_offset,
        scan_start,
        comment,
    })
}

struct SofInfo {
    width: u32,
    height: u32,
    h_max: u32,
    v_max: u32,
    dims_offset: u64,
}

fn parse_sof<R: Read>(r: &mut CountingReader<'_, R>, payload: usize) -> Result<SofInfo, FormatError> {
    if payload < 6 {
        return Err(FormatError::invalid("malformed SOF segment"));
    }

    let precision = r.read_u8()?;
    if precision != 8 {
        return Err(FormatError::invalid(format!(
            "unsupported sample precision {precision}"
        )));
    }

    let dims_offset = r.position();
    let height = r.read_u16_be()? as u32;
    let width = r.read_u16_be()? as u32;
    if width == 0 || height == 0 {
        return Err(FormatError::invalid("zero frame dimension"));
    }

    let component_count = r.read_u8()? as usize;
    if component_count == 0 || component_count > 4 {
        return Err(FormatError::invalid(format!(
            "unsupported component count {component_count}"
        )));
    }
    if payload != 6 + 3 * component_count {
        return Err(FormatError::invalid("malformed SOF segment"));
    }

    let mut h_max = 0u32;
    let mut v_max = 0u32;
    for _ in 0..component_count {
        let _id = r.read_u8()?;
        let sampling = r.read_u8()?;
        let _tq = r.read_u8()?;
        let h = (sampling >> 4) as u32;
        let v = (sampling & 0x0F) as u32;
        if !(1..=4).contains(&h) || !(1..=4).contains(&v) {
            return Err(FormatError::invalid(format!(
                "invalid sampling factors {h}x{v}"
            )));
        }
        h_max = h_max.max(h);
        v_max = v_max.max(v);
    }

    Ok(SofInfo {
        width,
        height,
        h_max,
        v_max,
        dims_offset,
    })
}

/// Turn a COM payload into the slide comment: truncate at the first NUL,
/// decode the rest leniently.
fn comment_from_bytes(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

// =============================================================================
// Position-tracking reader
// =============================================================================

/// Thin wrapper that counts consumed bytes, so segment offsets can be
/// recorded without seeking back and forth.
struct CountingReader<'a, R> {
    inner: &'a mut R,
    pos: u64,
}

impl<'a, R: Read> CountingReader<'a, R> {
    fn new(inner: &'a mut R) -> Self {
        Self { inner, pos: 0 }
    }

    fn position(&self) -> u64 {
        self.pos
    }

    /// Read up to `buf.len()` bytes, retrying only on interrupt.
    fn read_some(&mut self, buf: &mut [u8]) -> Result<usize, FormatError> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.inner.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        self.pos += filled as u64;
        Ok(filled)
    }

    fn read_u8(&mut self) -> Result<u8, FormatError> {
        let mut b = [0u8; 1];
        if self.read_some(&mut b)? < 1 {
            return Err(FormatError::invalid("unexpected end of header"));
        }
        Ok(b[0])
    }

    fn read_u16_be(&mut self) -> Result<u16, FormatError> {
        let mut b = [0u8; 2];
        if self.read_some(&mut b)? < 2 {
            return Err(FormatError::invalid("unexpected end of header"));
        }
        Ok(u16::from_be_bytes(b))
    }

    fn read_vec(&mut self, len: usize) -> Result<Vec<u8>, FormatError> {
        let mut v = vec![0u8; len];
        if self.read_some(&mut v)? < len {
            return Err(FormatError::invalid("unexpected end of header"));
        }
        Ok(v)
    }

    fn skip(&mut self, mut len: usize) -> Result<(), FormatError> {
        let mut scratch = [0u8; 256];
        while len > 0 {
            let chunk = len.min(scratch.len());
            if self.read_some(&mut scratch[..chunk])? < chunk {
                return Err(FormatError::invalid("unexpected end of header"));
            }
            len -= chunk;
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
