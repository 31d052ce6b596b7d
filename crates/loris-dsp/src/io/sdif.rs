//! SDIF import and export in the 1TRC (sinusoidal tracks) format.
//!
//! Partials are stored as time-ordered frames of matrix rows, one row per
//! active partial. Two row layouts are used: a 6-column layout
//! `(index, frequency, phase, amplitude, bandwidth, label)` for envelopes
//! resampled at a regular hop, and an 8-column layout extending it with
//! `(time offset, discardable)` for exact breakpoint timing. Markers
//! travel in private `1MRK` frames alongside the track data.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use log::debug;
use loris_model::{Breakpoint, Error, Marker, Partial, PartialList, Result};

/// Frame and matrix signature for sinusoidal track data.
pub(crate) const SIG_TRACKS: [u8; 4] = *b"1TRC";
/// Frame and matrix signature for marker (name) data.
pub(crate) const SIG_MARKERS: [u8; 4] = *b"1MRK";

/// SDIF matrix data type codes.
pub(crate) const TYPE_F32: u32 = 0x0004;
pub(crate) const TYPE_F64: u32 = 0x0008;
pub(crate) const TYPE_UTF8: u32 = 0x0301;

// -- chunk-level framing --

pub(crate) struct FrameHeader {
    pub signature: [u8; 4],
    pub time: f64,
    pub stream_id: u32,
    pub matrix_count: u32,
}

pub(crate) struct Matrix {
    pub signature: [u8; 4],
    pub data_type: u32,
    pub rows: usize,
    pub cols: usize,
    /// Row-major numeric data (empty for text matrices).
    pub data: Vec<f64>,
    /// Raw bytes for text matrices.
    pub text: Vec<u8>,
}

/// Writes the SDIF opening chunk.
pub(crate) fn write_opening<W: Write>(w: &mut W) -> Result<()> {
    w.write_all(b"SDIF")?;
    w.write_u32::<BigEndian>(8)?; // chunk size
    w.write_u32::<BigEndian>(3)?; // specification version
    w.write_u32::<BigEndian>(0)?; // padding
    Ok(())
}

/// Reads and validates the SDIF opening chunk.
pub(crate) fn read_opening<R: Read>(r: &mut R) -> Result<()> {
    let mut magic = [0u8; 4];
    r.read_exact(&mut magic)?;
    if magic != *b"SDIF" {
        return Err(Error::file_io("not an SDIF file (bad opening chunk)"));
    }
    let size = r.read_u32::<BigEndian>()?;
    let mut rest = vec![0u8; size as usize];
    r.read_exact(&mut rest)?;
    Ok(())
}

/// Writes one frame carrying a single matrix.
pub(crate) fn write_frame_with_matrix<W: Write>(
    w: &mut W,
    signature: [u8; 4],
    time: f64,
    stream_id: u32,
    matrix: &Matrix,
) -> Result<()> {
    let data_bytes = match matrix.data_type {
        TYPE_F32 => matrix.rows * matrix.cols * 4,
        TYPE_F64 => matrix.rows * matrix.cols * 8,
        _ => matrix.text.len(),
    };
    let padding = (8 - data_bytes % 8) % 8;
    // frame size counts everything after the size field
    let frame_size = 8 + 4 + 4 + 16 + data_bytes + padding;

    w.write_all(&signature)?;
    w.write_u32::<BigEndian>(frame_size as u32)?;
    w.write_f64::<BigEndian>(time)?;
    w.write_u32::<BigEndian>(stream_id)?;
    w.write_u32::<BigEndian>(1)?; // matrix count

    w.write_all(&matrix.signature)?;
    w.write_u32::<BigEndian>(matrix.data_type)?;
    w.write_u32::<BigEndian>(matrix.rows as u32)?;
    w.write_u32::<BigEndian>(matrix.cols as u32)?;
    match matrix.data_type {
        TYPE_F32 => {
            for &v in &matrix.data {
                w.write_f32::<BigEndian>(v as f32)?;
            }
        }
        TYPE_F64 => {
            for &v in &matrix.data {
                w.write_f64::<BigEndian>(v)?;
            }
        }
        _ => w.write_all(&matrix.text)?,
    }
    w.write_all(&vec![0u8; padding])?;
    Ok(())
}

/// Reads the next frame header, or `None` at a clean end of file.
pub(crate) fn read_frame_header<R: Read>(r: &mut R) -> Result<Option<(FrameHeader, u32)>> {
    let mut signature = [0u8; 4];
    match r.read_exact(&mut signature) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let frame_size = r.read_u32::<BigEndian>()?;
    if frame_size < 16 {
        return Err(Error::file_io("malformed SDIF frame header"));
    }
    let time = r.read_f64::<BigEndian>()?;
    let stream_id = r.read_u32::<BigEndian>()?;
    let matrix_count = r.read_u32::<BigEndian>()?;
    Ok(Some((
        FrameHeader {
            signature,
            time,
            stream_id,
            matrix_count,
        },
        frame_size - 16,
    )))
}

/// Reads one matrix (header plus padded data).
pub(crate) fn read_matrix<R: Read>(r: &mut R) -> Result<Matrix> {
    let mut signature = [0u8; 4];
    r.read_exact(&mut signature)?;
    let data_type = r.read_u32::<BigEndian>()?;
    let rows = r.read_u32::<BigEndian>()? as usize;
    let cols = r.read_u32::<BigEndian>()? as usize;

    let count = rows.checked_mul(cols).ok_or_else(|| {
        Error::file_io("malformed SDIF matrix header (row/column overflow)")
    })?;

    let mut data = Vec::new();
    let mut text = Vec::new();
    let data_bytes = match data_type {
        TYPE_F32 => {
            data.reserve(count);
            for _ in 0..count {
                data.push(f64::from(r.read_f32::<BigEndian>()?));
            }
            count * 4
        }
        TYPE_F64 => {
            data.reserve(count);
            for _ in 0..count {
                data.push(r.read_f64::<BigEndian>()?);
            }
            count * 8
        }
        TYPE_UTF8 => {
            text = vec![0u8; count];
            r.read_exact(&mut text)?;
            count
        }
        other => {
            return Err(Error::file_io(format!(
                "unsupported SDIF matrix data type {:#06x}",
                other
            )))
        }
    };

    let padding = (8 - data_bytes % 8) % 8;
    let mut pad = vec![0u8; padding];
    r.read_exact(&mut pad)?;

    Ok(Matrix {
        signature,
        data_type,
        rows,
        cols,
        data,
        text,
    })
}

/// Skips `bytes` of frame data.
pub(crate) fn skip_bytes<R: Read>(r: &mut R, bytes: u64) -> Result<()> {
    std::io::copy(&mut r.take(bytes), &mut std::io::sink())?;
    Ok(())
}

// -- the 1TRC file --

/// An SDIF file of bandwidth-enhanced sinusoidal tracks.
///
/// Reading collects every 1TRC row into partials (indexed by the row's
/// track index) and every 1MRK frame into markers. Writing indexes the
/// partials densely from 0 and emits either hop-resampled 6-column frames
/// (when a hop is set) or exact-timing 8-column frames at
/// millisecond-rounded frame times.
pub struct SdifFile {
    partials: PartialList,
    markers: Vec<Marker>,
    hop: f64,
}

impl Default for SdifFile {
    fn default() -> Self {
        Self::new()
    }
}

impl SdifFile {
    /// Creates an empty SDIF file image.
    pub fn new() -> Self {
        Self {
            partials: PartialList::new(),
            markers: Vec::new(),
            hop: 0.0,
        }
    }

    /// Creates a file image holding the given partials.
    pub fn from_partials(partials: PartialList) -> Self {
        Self {
            partials,
            markers: Vec::new(),
            hop: 0.0,
        }
    }

    /// Reads partials and markers from an SDIF file on disk.
    ///
    /// # Errors
    /// `FileIo` if the file cannot be opened or is malformed.
    pub fn read(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref()).map_err(|e| {
            Error::file_io(format!(
                "could not open SDIF file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::read_from(&mut BufReader::new(file))
    }

    /// Reads partials and markers from any reader of SDIF bytes.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self> {
        read_opening(r)?;

        let mut by_index: BTreeMap<u32, Partial> = BTreeMap::new();
        let mut markers = Vec::new();

        while let Some((header, body_size)) = read_frame_header(r)? {
            match header.signature {
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
                _ => {
                    // not ours: skip the whole frame body
                    skip_bytes(r, u64::from(body_size))?;
                }
            }
        }

        let partials: PartialList = by_index
            .into_values()
            .filter(|p| !p.is_empty())
            .collect();
        debug!("read {} partials from SDIF data", partials.len());

        Ok(Self {
            partials,
            markers,
            hop: 0.0,
        })
    }

    /// The partials (immutable).
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

    /// The resampling hop in seconds (0 means exact-timing export).
    pub fn hop(&self) -> f64 {
        self.hop
    }

    /// Sets the resampling hop for writing. With a positive hop, 6-column
    /// frames are emitted at regular hop intervals; with 0 (the default),
    /// 8-column frames carry exact breakpoint times.
    ///
    /// # Errors
    /// `InvalidArgument` if `hop` is negative.
    pub fn set_hop(&mut self, hop: f64) -> Result<()> {
        if hop < 0.0 {
            return Err(Error::invalid_argument(
                "the SDIF resampling hop must be non-negative",
            ));
        }
        self.hop = hop;
        Ok(())
    }

    /// Writes the partials and markers to a file on disk.
    ///
    /// # Errors
    /// `FileIo` on any I/O failure.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref()).map_err(|e| {
            Error::file_io(format!(
                "could not open SDIF file {} for writing: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let mut w = BufWriter::new(file);
        self.write_to(&mut w)?;
        w.flush()?;
        Ok(())
    }

    /// Writes the SDIF byte stream to any writer.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        write_opening(w)?;
        write_markers(w, &self.markers)?;
        if self.hop > 0.0 {
            self.write_resampled(w)
        } else {
            self.write_exact(w)
        }
    }

    /// 6-column export: frames at regular hop intervals, each carrying
    /// every partial active within one hop of the frame time.
    fn write_resampled<W: Write>(&self, w: &mut W) -> Result<()> {
        let Some((span_start, span_end)) = loris_model::time_span(&self.partials) else {
            return Ok(());
        };
        let first_step = (span_start / self.hop).floor() as i64;
        let last_step = (span_end / self.hop).ceil() as i64;

        for step in first_step..=last_step {
            let time = step as f64 * self.hop;
            let mut data = Vec::new();
            let mut rows = 0usize;
            for (index, p) in self.partials.iter().enumerate() {
                if p.is_empty()
                    || time < p.start_time() - self.hop
                    || time > p.end_time() + self.hop
                {
                    continue;
                }
                let bp = p.parameters_at(time);
                data.extend_from_slice(&[
                    index as f64,
                    bp.frequency(),
                    bp.phase(),
                    bp.amplitude(),
                    bp.bandwidth(),
                    f64::from(p.label()),
                ]);
                rows += 1;
            }
            if rows > 0 {
                let matrix = Matrix {
                    signature: SIG_TRACKS,
                    data_type: TYPE_F32,
                    rows,
                    cols: 6,
                    data,
                    text: Vec::new(),
                };
                write_frame_with_matrix(w, SIG_TRACKS, time, 1, &matrix)?;
            }
        }
        Ok(())
    }

    /// 8-column export: breakpoints grouped into frames at their
    /// millisecond-rounded times, with per-row time offsets recovering the
    /// exact times.
    fn write_exact<W: Write>(&self, w: &mut W) -> Result<()> {
        write_exact_tracks(&self.partials, w)
    }
}

/// Writes a partial list as exact-timing 8-column 1TRC frames.
pub(crate) fn write_exact_tracks<W: Write>(partials: &PartialList, w: &mut W) -> Result<()> {
    // group rows by frame time (milliseconds, rounded down)
    let mut frames: BTreeMap<i64, Vec<[f64; 8]>> = BTreeMap::new();
    for (index, p) in partials.iter().enumerate() {
        for (t, bp) in p.iter() {
            let ms = (t * 1000.0).floor() as i64;
            let frame_time = ms as f64 / 1000.0;
            frames.entry(ms).or_default().push([
                index as f64,
                bp.frequency(),
                bp.phase(),
                bp.amplitude(),
                bp.bandwidth(),
                f64::from(p.label()),
                t - frame_time,
                0.0,
            ]);
        }
    }

    for (ms, rows) in frames {
        let matrix = Matrix {
            signature: SIG_TRACKS,
            data_type: TYPE_F32,
            rows: rows.len(),
            cols: 8,
            data: rows.iter().flatten().copied().collect(),
            text: Vec::new(),
        };
        write_frame_with_matrix(w, SIG_TRACKS, ms as f64 / 1000.0, 1, &matrix)?;
    }
    Ok(())
}

/// Writes one 1MRK frame per marker.
pub(crate) fn write_markers<W: Write>(w: &mut W, markers: &[Marker]) -> Result<()> {
    for marker in markers {
        let text = marker.name().as_bytes().to_vec();
        let matrix = Matrix {
            signature: SIG_MARKERS,
            data_type: TYPE_UTF8,
            rows: text.len(),
            cols: 1,
            data: Vec::new(),
            text,
        };
        write_frame_with_matrix(w, SIG_MARKERS, marker.time(), 1, &matrix)?;
    }
    Ok(())
}

/// Merges the rows of a 1TRC matrix into the partials under construction.
pub(crate) fn add_rows_to_partials(
    matrix: &Matrix,
    frame_time: f64,
    by_index: &mut BTreeMap<u32, Partial>,
) -> Result<()> {
    if matrix.cols != 6 && matrix.cols != 8 {
        return Err(Error::file_io(format!(
            "1TRC matrices must have 6 or 8 columns, found {}",
            matrix.cols
        )));
    }

    for row in matrix.data.chunks_exact(matrix.cols) {
        // 8-column rows flagged discardable are padding, not data
        if matrix.cols == 8 && row[7] != 0.0 {
            continue;
        }
        let index = row[0] as u32;
        let time_offset = if matrix.cols == 8 { row[6] } else { 0.0 };
        let time = frame_time + time_offset;

        let partial = by_index.entry(index).or_default();
        partial.set_label(row[5].round() as i32);

        // breakpoint times must strictly increase within a partial
        if !partial.is_empty() && time <= partial.end_time() {
            debug!("dropping out-of-order 1TRC row at time {}", time);
            continue;
        }
        partial.insert(
            time,
            Breakpoint::new(row[1], row[3], row[4], row[2]),
        );
    }
    Ok(())
}
