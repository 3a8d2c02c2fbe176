//! Restart-marker indexing.
//!
//! One buffered pass over a JPEG's entropy-coded data records the byte
//! offset at which every restart interval ("tile") begins. Offset 0 is the
//! first entropy byte after SOS; each subsequent entry is the byte
//! immediately following a `RST0..RST7` marker. The scan stops at EOI.
//!
//! Stuffed bytes (`0xFF 0x00`) are not markers and are skipped; a run of
//! `0xFF` fill bytes keeps the marker state alive, so `0xFF 0xFF 0xD3`
//! still indexes the restart marker.

use std::io::{Read, Seek, SeekFrom};

use crate::error::FormatError;

use super::header::ScanHeader;
use super::markers;

/// Buffer size for the index scan.
const SCAN_BUF_SIZE: usize = 4096;

/// Scan the entropy stream and return the tile-start offset table.
///
/// The table holds `expected` strictly increasing absolute file offsets,
/// one per restart interval in row-major tile order; a marker count that
/// does not match the header's restart structure is an
/// [`FormatError::InvalidFormat`].
pub fn index_restart_intervals<R: Read + Seek>(
    reader: &mut R,
    header: &ScanHeader,
    expected: usize,
) -> Result<Vec<u64>, FormatError> {
    reader.seek(SeekFrom::Start(header.scan_start))?;

    let mut starts = Vec::with_capacity(expected);
    starts.push(header.scan_start);

    let mut buf = [0u8; SCAN_BUF_SIZE];
    let mut pos = header.scan_start;
    let mut prev_was_ff = false;
    let mut saw_eoi = false;

    'scan: loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };

        for &b in &buf[..n] {
            pos += 1;
            if prev_was_ff {
                if b == markers::EOI {
                    saw_eoi = true;
                    break 'scan;
                }
                if markers::is_restart(b) {
                    starts.push(pos);
                }
            }
            prev_was_ff = b == 0xFF;
        }
    }

    if !saw_eoi {
        return Err(FormatError::invalid("no EOI marker in scan"));
    }
    if starts.len() != expected {
        return Err(FormatError::invalid(format!(
            "found {} restart intervals, restart structure implies {}",
            starts.len(),
            expected
        )));
    }

    debug_assert!(starts.windows(2).all(|w| w[0] < w[1]));
    Ok(starts)
}
