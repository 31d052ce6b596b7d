//! Partial and sample file formats.
//!
//! - [`SdifFile`] - SDIF files of 1TRC frames (read and write)
//! - [`SpcFile`] - SDIF-framed partials with a MIDI note number
//! - [`AiffFile`] - AIFF sample output with markers and note metadata
//!
//! All formats are big-endian chunk streams. The I/O layer maps malformed
//! files and OS failures to [`Error::FileIo`](loris_model::Error) and
//! releases file handles on every path.

pub mod aiff;
pub mod sdif;
pub mod spc;

pub use aiff::AiffFile;
pub use sdif::SdifFile;
pub use spc::SpcFile;
