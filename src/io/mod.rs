//! I/O layer: the windowed, marker-renumbering JPEG byte source.

pub mod window_source;

pub use window_source::{WindowSource, WindowSpec};
