//! Seeking, marker-renumbering byte source for windowed JPEG decoding.
//!
//! [`WindowSource`] presents a JPEG decoder with what looks like a small,
//! contiguous baseline JPEG, while actually splicing together non-contiguous
//! tile spans of a much larger file:
//!
//! ```text
//! physical file:  [header][t0][t1][t2][t3][t4][t5][t6][t7][t8][EOI]
//!                                 ─┬─────┬─          ─┬─────┬─
//! window (2x2 at tile 1):          │     │            │     │
//! synthesized:    [header'][ t1 ][ t2 ][ t4 ][ t5 ][EOI]
//! ```
//!
//! Three tricks make the decoder accept the splice:
//!
//! 1. **SOF patching.** The frame dimensions inside the served header are
//!    overwritten with the window dimensions, so the decoder expects exactly
//!    the MCUs the data spans supply.
//! 2. **Restart-marker renumbering.** `RST0..RST7` cycle and the decoder
//!    verifies the sequence, so every marker inside a data span is rewritten
//!    from a counter that starts at 0 per decode.
//! 3. **Clean termination.** The final span is served without its trailing
//!    restart marker and followed by an EOI, synthetic if need be.
//!
//! The source never suspends: a read either supplies bytes, fakes an EOI on
//! premature end-of-file, or fails hard.

use std::io::{self, Read, Seek, SeekFrom};

use crate::format::markers;

/// Internal buffer size. The decoder consumes bytes a few at a time, which
/// would make the marker-rewrite scan far too slow without batching.
pub(crate) const INPUT_BUF_SIZE: usize = 4096;

// =============================================================================
// Window specification
// =============================================================================

/// Which tiles of a JPEG one decode covers, and what frame dimensions the
/// decoder should be told.
#[derive(Debug, Clone, Copy)]
pub struct WindowSpec {
    /// Row-major index of the window's top-left tile
    pub top_left: usize,

    /// Tiles per window row
    pub tiles_across: usize,

    /// Number of window rows
    pub tiles_down: usize,

    /// Tiles per full-image row (row-to-row stride in tile indices)
    pub row_stride: usize,

    /// `(width, height)` in pixels to write into the SOF dimension fields;
    /// must equal the window's tile extent times the tile dimensions
    pub patched_dims: (u16, u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Span {
    /// File start up to the first tile offset, with SOF patching
    Header,
    /// The n-th window row of tiles
    Row(usize),
    /// Synthetic EOI
    Eoi,
    /// End of stream
    Done,
}

// =============================================================================
// WindowSource
// =============================================================================

/// A [`Read`] implementation serving the synthesized window stream.
///
/// Borrows the JPEG's reader and tile-start table for the duration of one
/// decode; the decoder owns the source, the source owns nothing.
pub struct WindowSource<'a, R> {
    reader: &'a mut R,
    starts: &'a [u64],
    sof_dims_offset: u64,
    spec: WindowSpec,

    span: Span,
    span_entered: bool,
    /// Absolute file position of the next unread byte of the current span
    span_pos: u64,
    /// Absolute end of the current span; `u64::MAX` runs to end-of-file
    span_end: u64,
    /// Marker state carried across refills within a data span
    prev_was_ff: bool,
    /// Renumbering counter, `RST0` first
    next_restart: u8,
    served_any: bool,

    buf: Box<[u8]>,
    pos: usize,
    filled: usize,
}

impl<'a, R: Read + Seek> WindowSource<'a, R> {
    /// Create a source over `reader` serving the tiles selected by `spec`.
    ///
    /// `starts` is the tile-start offset table from indexing;
    /// `sof_dims_offset` the file offset of the SOF dimension fields.
    pub fn new(
        reader: &'a mut R,
        starts: &'a [u64],
        sof_dims_offset: u64,
        spec: WindowSpec,
    ) -> Self {
        debug_assert!(!starts.is_empty());
        debug_assert!(spec.tiles_across > 0 && spec.tiles_down > 0);
        debug_assert!(
            spec.top_left + (spec.tiles_down - 1) * spec.row_stride < starts.len(),
            "window exceeds tile grid"
        );

        Self {
            reader,
            starts,
            sof_dims_offset,
            spec,
            span: Span::Header,
            span_entered: false,
            span_pos: 0,
            span_end: 0,
            prev_was_ff: false,
            next_restart: 0,
            served_any: false,
            buf: vec![0u8; INPUT_BUF_SIZE].into_boxed_slice(),
            pos: 0,
            filled: 0,
        }
    }

    /// Whether the current span renumbers restart markers.
    fn in_data_span(&self) -> bool {
        matches!(self.span, Span::Row(_))
    }

    /// Seek to the current span's first byte and set its bounds.
    fn enter_span(&mut self) -> io::Result<()> {
        match self.span {
            Span::Header => {
                self.span_pos = 0;
                self.span_end = self.starts[0];
                self.reader.seek(SeekFrom::Start(0))?;
            }
            Span::Row(row) => {
                let cur = self.spec.top_left + row * self.spec.row_stride;
                let stop = cur + self.spec.tiles_across;

                self.span_pos = self.starts[cur];
                self.span_end = if stop < self.starts.len() {
                    let end = self.starts[stop];
                    if row + 1 == self.spec.tiles_down {
                        // The synthesized scan ends after this span; its
                        // trailing restart marker must not reach the decoder.
                        end.saturating_sub(2)
                    } else {
                        end
                    }
                } else {
                    u64::MAX
                };
                self.reader.seek(SeekFrom::Start(self.span_pos))?;
            }
            Span::Eoi | Span::Done => {}
        }
        self.prev_was_ff = false;
        Ok(())
    }

    fn advance_span(&mut self) -> io::Result<()> {
        self.span = match self.span {
            Span::Header => Span::Row(0),
            Span::Row(row) if row + 1 < self.spec.tiles_down => Span::Row(row + 1),
            Span::Row(_) | Span::Eoi => Span::Eoi,
            Span::Done => Span::Done,
        };
        if self.span == Span::Eoi || self.span == Span::Done {
            return Ok(());
        }
        self.enter_span()
    }

    /// Refill the internal buffer with the next chunk of the stream.
    ///
    /// Leaves `filled == 0` only at end-of-stream.
    fn refill(&mut self) -> io::Result<()> {
        self.pos = 0;
        self.filled = 0;

        if !self.span_entered {
            self.enter_span()?;
            self.span_entered = true;
        }

        loop {
            match self.span {
                Span::Done => return Ok(()),
                Span::Eoi => {
                    self.buf[0] = 0xFF;
                    self.buf[1] = markers::EOI;
                    self.filled = 2;
                    self.span = Span::Done;
                    return Ok(());
                }
                Span::Header | Span::Row(_) => {
                    if self.span_pos >= self.span_end {
                        self.advance_span()?;
                        continue;
                    }

                    let want = if self.span_end == u64::MAX {
                        INPUT_BUF_SIZE
                    } else {
                        ((self.span_end - self.span_pos) as usize).min(INPUT_BUF_SIZE)
                    };

                    let n = match self.reader.read(&mut self.buf[..want]) {
                        Ok(n) => n,
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => return Err(e),
                    };

                    if n == 0 {
                        if !self.served_any {
                            return Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "input is empty",
                            ));
                        }
                        // End of file, expected for a tail span and possible
                        // for a truncated one: fake an EOI so the decoder
                        // terminates cleanly instead of spinning.
                        self.span = Span::Eoi;
                        continue;
                    }

                    let n = self.process_chunk(n)?;
                    self.span_pos += n as u64;
                    self.filled = n;
                    self.served_any = true;
                    return Ok(());
                }
            }
        }
    }

    /// Apply SOF patching or marker renumbering to `buf[..n]`; returns the
    /// number of bytes kept (a trailing `0xFF` may be deferred).
    fn process_chunk(&mut self, n: usize) -> io::Result<usize> {
        if !self.in_data_span() {
            self.patch_sof_dims(n);
            return Ok(n);
        }

        let mut was_ff = self.prev_was_ff;
        for i in 0..n {
            let b = self.buf[i];
            if was_ff && markers::is_restart(b) {
                self.buf[i] = markers::restart_code(self.next_restart);
                self.next_restart = self.next_restart.wrapping_add(1);
            }
            was_ff = b == 0xFF;
        }

        // Never end a refill on 0xFF (unless it is the only byte): defer it
        // so a marker pair is rewritten atomically within one buffer.
        let mut kept = n;
        if was_ff && n > 1 {
            kept -= 1;
            self.reader.seek(SeekFrom::Current(-1))?;
        }
        self.prev_was_ff = self.buf[kept - 1] == 0xFF;
        Ok(kept)
    }

    /// Overwrite the SOF dimension bytes that fall inside `buf[..n]`.
    fn patch_sof_dims(&mut self, n: usize) {
        let (width, height) = self.spec.patched_dims;
        let patch = [
            height.to_be_bytes()[0],
            height.to_be_bytes()[1],
            width.to_be_bytes()[0],
            width.to_be_bytes()[1],
        ];

        let chunk_end = self.span_pos + n as u64;
        let lo = self.sof_dims_offset.max(self.span_pos);
        let hi = (self.sof_dims_offset + 4).min(chunk_end);
        for p in lo..hi {
            self.buf[(p - self.span_pos) as usize] = patch[(p - self.sof_dims_offset) as usize];
        }
    }
}

impl<R: Read + Seek> Read for WindowSource<'_, R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if self.pos == self.filled {
            self.refill()?;
            if self.filled == 0 {
                return Ok(0);
            }
        }
        let n = (self.filled - self.pos).min(out.len());
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

// =============================================================================
// Tests
// =============================================================================
