//! Conversion of partials into a dense time-by-voice frame matrix.

use log::debug;
use loris_model::{time_span, Breakpoint, Error, PartialList, Result};

use crate::resample::Resampler;

/// Prepares a [`PartialList`](loris_model::PartialList) for block
/// synthesis: each partial is resampled densely (with phase correction)
/// onto the block grid, padded with a one-block fade at each end, and its
/// breakpoints written into a `frames x voices` matrix of synthesis
/// targets.
///
/// The first frame is silent by construction (every partial's fade-in
/// null lands there, one block of onset latency), which lets the
/// synthesizer arm each oscillator's phase from a null breakpoint before
/// its voice first sounds.
pub struct BlockSynthReader {
    blocks_per_second: f64,
    frames: Vec<Vec<Breakpoint>>,
}

impl BlockSynthReader {
    /// Builds the frame matrix for `partials` at the given block interval
    /// (seconds per block).
    ///
    /// # Errors
    /// `InvalidArgument` if `block_interval` is not positive.
    pub fn new(partials: &PartialList, block_interval: f64) -> Result<Self> {
        if block_interval <= 0.0 {
            return Err(Error::invalid_argument(
                "the block interval must be positive",
            ));
        }

        let num_voices = partials.len();
        let duration = time_span(partials).map_or(0.0, |(_, end)| end);
        let num_frames = 3 + (duration / block_interval + 0.5) as usize;

        let mut resampler = Resampler::new(block_interval)?;
        resampler.set_dense(true);
        resampler.set_phase_correct(true);

        let mut frames = vec![vec![Breakpoint::default(); num_voices]; num_frames];
        for (voice, partial) in partials.iter().enumerate() {
            let mut p = partial.clone();

            // quantize the breakpoint times and correct the phases
            resampler.resample(&mut p);
            let _ = p.fade_in(block_interval);
            let _ = p.fade_out(block_interval);

            for (t, bp) in p.iter() {
                let frame = (t / block_interval + 0.5).floor() as i64 + 1;
                if (0..num_frames as i64).contains(&frame) {
                    frames[frame as usize][voice] = *bp;
                }
            }
        }
        debug!(
            "prepared {} frames of {} voices for block synthesis",
            num_frames, num_voices
        );

        Ok(Self {
            blocks_per_second: 1.0 / block_interval,
            frames,
        })
    }

    /// Number of frames (blocks).
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Number of voices (partials).
    pub fn num_voices(&self) -> usize {
        self.frames.first().map_or(0, Vec::len)
    }

    /// The synthesis targets for frame `n`.
    pub fn frame(&self, n: usize) -> &[Breakpoint] {
        &self.frames[n]
    }

    /// The frame covering time `t`, clamped to the valid range.
    pub fn frame_at_time(&self, t: f64) -> &[Breakpoint] {
        let n = (self.blocks_per_second * t).floor().max(0.0) as usize + 1;
        let n = n.min(self.frames.len() - 1);
        &self.frames[n]
    }
}
