//! SPC import and export: partials with an associated MIDI note number.
//!
//! The track and marker data are identical to the SDIF 1TRC layout; a
//! private `SPCH` header frame carries the note number, which survives all
//! partial transforms and is written through to rendered audio metadata.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use loris_model::{Error, Marker, PartialList, Result};

use super::sdif::{
    add_rows_to_partials, read_frame_header, read_matrix, read_opening, skip_bytes,
    write_exact_tracks, write_frame_with_matrix, write_markers, write_opening, Matrix,
    SIG_MARKERS, SIG_TRACKS, TYPE_F64,
};

/// Frame and matrix signature for the SPC header.
const SIG_HEADER: [u8; 4] = *b"SPCH";

/// The default MIDI note number (middle C).
const DEFAULT_NOTE_NUMBER: f64 = 60.0;

/// An SPC file image: partials, markers, and a MIDI note number.
pub struct SpcFile {
    partials: PartialList,
    markers: Vec<Marker>,
    midi_note_number: f64,
}

impl Default for SpcFile {
    fn default() -> Self {
        Self::new()
    }
}

impl SpcFile {
    /// Creates an empty SPC file image at the default note number.
    pub fn new() -> Self {
        Self {
            partials: PartialList::new(),
            markers: Vec::new(),
            midi_note_number: DEFAULT_NOTE_NUMBER,
        }
    }

    /// Creates a file image holding the given partials and note number.
    pub fn from_partials(partials: PartialList, midi_note_number: f64) -> Self {
        Self {
            partials,
            markers: Vec::new(),
            midi_note_number,
        }
    }

    /// Reads partials, markers, and the note number from an SPC file.
    ///
    /// # Errors
    /// `FileIo` if the file cannot be opened or is malformed.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Error::file_io(format!(
                "could not open SPC file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::read_from(&mut BufReader::new(file))
    }

    /// Reads SPC data from any reader.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        read_opening(r)?;

        let mut midi_note_number = DEFAULT_NOTE_NUMBER;
        let mut by_index: std::collections::BTreeMap<u32, loris_model::Partial> =
            std::collections::BTreeMap::new();
        let mut markers = Vec::new();

        while let Some((header, body_size)) = read_frame_header(r)? {
            match header.signature {
                SIG_HEADER => {
                    for _ in 0..header.matrix_count {
                        let matrix = read_matrix(r)?;
                        if matrix.signature == SIG_HEADER && !matrix.data.is_empty() {
                            midi_note_number = matrix.data[0];
                        }
                    }
                }
                SIG_TRACKS => {
                    for _ in 0..header.matrix_count {
                        let matrix = read_matrix(r)?;
                        if matrix.signature == SIG_TRACKS {
                            add_rows_to_partials(&matrix, header.time, &mut by_index)?;
                        }
                    }
                }
                SIG_MARKERS => {
                    for _ in 0..header.matrix_count {
                        let matrix = read_matrix(r)?;
                        if matrix.signature == SIG_MARKERS {
                            let name = String::from_utf8_lossy(&matrix.text).into_owned();
                            markers.push(Marker::new(header.time, name));
                        }
                    }
                }
                _ => skip_bytes(r, u64::from(body_size))?,
            }
        }

        let partials: PartialList = by_index
            .into_values()
            .filter(|p| !p.is_empty())
            .collect();

        Ok(Self {
            partials,
            markers,
            midi_note_number,
        })
    }

    /// The partials.
    pub fn partials(&self) -> &PartialList {
        &self.partials
    }

    /// The partials (mutable).
    pub fn partials_mut(&mut self) -> &mut PartialList {
        &mut self.partials
    }

    /// Takes the partials out of the file image.
    pub fn take_partials(&mut self) -> PartialList {
        std::mem::take(&mut self.partials)
    }

    /// The markers.
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// The markers (mutable).
    pub fn markers_mut(&mut self) -> &mut Vec<Marker> {
        &mut self.markers
    }

    /// The MIDI note number associated with the partials.
    pub fn midi_note_number(&self) -> f64 {
        self.midi_note_number
    }

    /// Sets the MIDI note number.
    ///
    /// # Errors
    /// `InvalidArgument` if the note number is outside [0, 128].
    pub fn set_midi_note_number(&mut self, nn: f64) -> Result<()> {
        if !(0.0..=128.0).contains(&nn) {
            return Err(Error::invalid_argument(
                "MIDI note number must be between 0 and 128",
            ));
        }
        self.midi_note_number = nn;
        Ok(())
    }

    /// Writes the SPC data to a file on disk.
    ///
    /// # Errors
    /// `FileIo` on any I/O failure.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref()).map_err(|e| {
            Error::file_io(format!(
                "could not open SPC file {} for writing: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let mut w = BufWriter::new(file);
        self.write_to(&mut w)?;
        w.flush()?;
        Ok(())
    }

    /// Writes the SPC byte stream to any writer.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_opening(w)?;

        // the header frame leads, so readers see the note number first
        let header = Matrix {
            signature: SIG_HEADER,
            data_type: TYPE_F64,
            rows: 1,
            cols: 1,
            data: vec![self.midi_note_number],
            text: Vec::new(),
        };
        write_frame_with_matrix(w, SIG_HEADER, 0.0, 1, &header)?;

        write_markers(w, &self.markers)?;

        // track data is identical to exact-timing SDIF export
        write_exact_tracks(&self.partials, w)
    }
}
