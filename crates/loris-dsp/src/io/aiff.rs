//! AIFF sample file output.
//!
//! Writes mono AIFF files: a `COMM` chunk with the sample rate encoded as
//! an 80-bit extended float, an optional `MARK` chunk carrying the
//! markers, an optional `INST` chunk carrying the MIDI note number, and
//! the sample data in `SSND`. All multi-byte values are big-endian and
//! chunks are padded to even lengths, per the AIFF specification.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{BigEndian, WriteBytesExt};
use loris_model::{Error, Marker, Result};

/// An AIFF file image: samples plus markers and note metadata.
pub struct AiffFile {
    samples: Vec<f64>,
    sample_rate: f64,
    bits_per_sample: u16,
    markers: Vec<Marker>,
    midi_note_number: Option<f64>,
}

impl AiffFile {
    /// Creates a 16-bit mono file image from samples (full scale is 1.0)
    /// at the given sample rate.
    ///
    /// # Errors
    /// `InvalidArgument` if the sample rate is not positive.
    pub fn new(samples: Vec<f64>, sample_rate: f64) -> Result<Self> {
        if sample_rate <= 0.0 {
            return Err(Error::invalid_argument("sample rate must be positive"));
        }
        Ok(Self {
            samples,
            sample_rate,
            bits_per_sample: 16,
            markers: Vec::new(),
            midi_note_number: None,
        })
    }

    /// The samples.
    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// The sample rate in Hz.
    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Sets the sample width in bits (8, 16, 24, or 32).
    ///
    /// # Errors
    /// `InvalidArgument` for any other width.
    pub fn set_bits_per_sample(&mut self, bits: u16) -> Result<()> {
        if !matches!(bits, 8 | 16 | 24 | 32) {
            return Err(Error::invalid_argument(
                "sample width must be 8, 16, 24, or 32 bits",
            ));
        }
        self.bits_per_sample = bits;
        Ok(())
    }

    /// The markers to be written.
    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// The markers (mutable).
    pub fn markers_mut(&mut self) -> &mut Vec<Marker> {
        &mut self.markers
    }

    /// Attaches a MIDI note number, written as instrument metadata.
    ///
    /// # Errors
    /// `InvalidArgument` if the note number is outside [0, 128].
    pub fn set_midi_note_number(&mut self, nn: f64) -> Result<()> {
        if !(0.0..=128.0).contains(&nn) {
            return Err(Error::invalid_argument(
                "MIDI note number must be between 0 and 128",
            ));
        }
        self.midi_note_number = Some(nn);
        Ok(())
    }

    /// Writes the AIFF file to disk.
    ///
    /// # Errors
    /// `FileIo` on any I/O failure. The file handle is released on every
    /// path.
    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref()).map_err(|e| {
            Error::file_io(format!(
                "could not open AIFF file {} for writing: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let mut w = BufWriter::new(file);
        self.write_to(&mut w)?;
        w.flush()?;
        Ok(())
    }

    /// Writes the AIFF byte stream to any writer.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let comm = self.comm_chunk();
        let mark = self.mark_chunk();
        let inst = self.inst_chunk();
        let ssnd = self.ssnd_chunk();

        let mut form_size = 4; // the "AIFF" type id
        for chunk in [&comm, &mark, &inst, &ssnd] {
            if !chunk.is_empty() {
                form_size += chunk.len();
            }
        }

        w.write_all(b"FORM")?;
        w.write_u32::<BigEndian>(form_size as u32)?;
        w.write_all(b"AIFF")?;
        w.write_all(&comm)?;
        w.write_all(&mark)?;
        w.write_all(&inst)?;
        w.write_all(&ssnd)?;
        Ok(())
    }

    fn comm_chunk(&self) -> Vec<u8> {
        let mut chunk = Vec::with_capacity(26);
        chunk.extend_from_slice(b"COMM");
        chunk.extend_from_slice(&18u32.to_be_bytes());
        chunk.extend_from_slice(&1u16.to_be_bytes()); // channels
        chunk.extend_from_slice(&(self.samples.len() as u32).to_be_bytes());
        chunk.extend_from_slice(&self.bits_per_sample.to_be_bytes());
        chunk.extend_from_slice(&extended80(self.sample_rate));
        chunk
    }

    fn mark_chunk(&self) -> Vec<u8> {
        if self.markers.is_empty() {
            return Vec::new();
        }

        let mut body = Vec::new();
        body.extend_from_slice(&(self.markers.len() as u16).to_be_bytes());
        for (id, marker) in self.markers.iter().enumerate() {
            let position = (marker.time() * self.sample_rate).round().max(0.0) as u32;
            body.extend_from_slice(&(id as u16 + 1).to_be_bytes());
            body.extend_from_slice(&position.to_be_bytes());
            // markers carry Pascal strings, padded to even total length
            let name = marker.name().as_bytes();
            let len = name.len().min(255);
            body.push(len as u8);
            body.extend_from_slice(&name[..len]);
            if (len + 1) % 2 != 0 {
                body.push(0);
            }
        }

        wrap_chunk(b"MARK", body)
    }

    fn inst_chunk(&self) -> Vec<u8> {
        let Some(nn) = self.midi_note_number else {
            return Vec::new();
        };

        let base_note = nn.round();
        let detune_cents = ((nn - base_note) * 100.0).round() as i8;

        let mut body = Vec::with_capacity(20);
        body.push(base_note as u8); // baseNote
        body.push(detune_cents as u8); // detune
        body.push(0); // lowNote
        body.push(127); // highNote
        body.push(1); // lowVelocity
        body.push(127); // highVelocity
        body.extend_from_slice(&0i16.to_be_bytes()); // gain
        for _ in 0..2 {
            // sustain and release loops, both off
            body.extend_from_slice(&0u16.to_be_bytes()); // playMode
            body.extend_from_slice(&0u16.to_be_bytes()); // beginLoop
            body.extend_from_slice(&0u16.to_be_bytes()); // endLoop
        }

        wrap_chunk(b"INST", body)
    }

    fn ssnd_chunk(&self) -> Vec<u8> {
        let bytes_per_sample = usize::from(self.bits_per_sample / 8);
        let mut body = Vec::with_capacity(8 + self.samples.len() * bytes_per_sample);
        body.extend_from_slice(&0u32.to_be_bytes()); // offset
        body.extend_from_slice(&0u32.to_be_bytes()); // block size

        let full_scale = f64::from(1u32 << (self.bits_per_sample - 1)) - 1.0;
        for &s in &self.samples {
            let value = (s.clamp(-1.0, 1.0) * full_scale).round() as i32;
            let be = value.to_be_bytes();
            body.extend_from_slice(&be[4 - bytes_per_sample..]);
        }

        wrap_chunk(b"SSND", body)
    }
}

/// Prefixes a chunk id and length, padding the body to an even length.
fn wrap_chunk(id: &[u8; 4], mut body: Vec<u8>) -> Vec<u8> {
    let size = body.len();
    if size % 2 != 0 {
        body.push(0);
    }
    let mut chunk = Vec::with_capacity(8 + body.len());
    chunk.extend_from_slice(id);
    chunk.extend_from_slice(&(size as u32).to_be_bytes());
    chunk.extend_from_slice(&body);
    chunk
}

/// Encodes a positive number as an 80-bit IEEE 754 extended float, the
/// sample rate representation AIFF requires.
fn extended80(value: f64) -> [u8; 10] {
    let mut out = [0u8; 10];
    if value <= 0.0 {
        return out;
    }

    let exponent = value.log2().floor() as i32;
    let biased = (exponent + 16383) as u16;
    // 64-bit mantissa with an explicit leading 1
    let mantissa = (value / 2f64.powi(exponent) * 2f64.powi(63)) as u64;

    out[0..2].copy_from_slice(&biased.to_be_bytes());
    out[2..10].copy_from_slice(&mantissa.to_be_bytes());
    out
}
