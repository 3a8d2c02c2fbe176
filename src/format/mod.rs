//! JPEG parsing: marker constants, header parsing, restart-marker indexing.
//!
//! Everything here runs once per file at open time. The hot path (the
//! window source and the tile reader) consumes the results: a
//! [`ScanHeader`], a [`TileGeometry`] and the tile-start offset table.

pub mod header;
pub mod index;
pub mod markers;

pub use header::{parse_header, ScanHeader, TileGeometry};
pub use index::index_restart_intervals;
