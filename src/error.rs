use thiserror::Error;

/// Errors that can occur while parsing or indexing a single JPEG file
#[derive(Debug, Error)]
pub enum FormatError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is empty or its first read produced no bytes
    #[error("input is empty")]
    InputEmpty,

    /// The JPEG is not a restart-interval-tiled baseline stream
    #[error("unsupported JPEG: {reason}")]
    InvalidFormat { reason: String },
}

impl FormatError {
    /// Shorthand for an [`FormatError::InvalidFormat`] with a formatted reason.
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        FormatError::InvalidFormat {
            reason: reason.into(),
        }
    }
}

/// Errors that can occur while assembling a slide from JPEG fragments
#[derive(Debug, Error)]
pub enum OpenError {
    /// Fragments are not in (z, x, y) row-major order
    #[error(
        "fragment {index} out of order: ({z}, {x}, {y}) does not follow ({prev_z}, {prev_x}, {prev_y})"
    )]
    BadFragmentOrder {
        index: usize,
        prev_z: i64,
        prev_x: i64,
        prev_y: i64,
        z: u32,
        x: u32,
        y: u32,
    },

    /// A pyramid level's fragments do not fill its grid
    #[error("level z={z} grid is {across}x{down} but has {actual} fragments")]
    IncompleteGrid {
        z: u32,
        across: u32,
        down: u32,
        actual: usize,
    },

    /// A fragment's JPEG failed to parse or index
    #[error("fragment {id}: {source}")]
    Format {
        id: String,
        #[source]
        source: FormatError,
    },
}

/// Errors that can occur during a region read
#[derive(Debug, Error)]
pub enum ReadError {
    /// Requested level does not exist
    #[error("level {level} out of range: slide has {level_count} levels")]
    LevelOutOfRange { level: usize, level_count: usize },

    /// Destination slice cannot hold the requested region
    #[error("destination too small: need {needed} pixels, got {actual}")]
    BufferTooSmall { needed: usize, actual: usize },

    /// Codec failure while decoding tiles from one JPEG.
    ///
    /// Aborts the current request only; the slide stays usable.
    #[error("decode error in {id}")]
    Decode {
        id: String,
        #[source]
        source: jpeg::Error,
    },
}
