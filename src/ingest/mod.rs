//! Image ingestion.
//!
//! Frames come from a local directory of still images, visited in sorted
//! file-name order so repeated runs see the same sequence. Decoding happens
//! per entry; a file that fails to decode is reported to the caller and the
//! walk continues.

pub mod images;

pub use images::{ImageDirSource, ImageEntry, IngestStats, SUPPORTED_EXTENSIONS};
