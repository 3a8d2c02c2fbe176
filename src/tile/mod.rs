//! Per-JPEG tile access: indexing at open time, windowed decodes at read
//! time.

pub mod jpeg;

pub use jpeg::TiledJpeg;
