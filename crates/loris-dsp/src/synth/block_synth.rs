//! The bandwidth-enhanced oscillator bank.

use loris_model::Breakpoint;

use super::noise::NoiseGenerator;
use super::oscillator::BlockOscillator;
use super::wavetables::TAB_SIZE;
use crate::rng::derive_component_seed;

/// Decimation factor for the shared modulator: a fresh filtered value is
/// produced once per this many samples, linearly interpolated between.
const NOISE_DECIMATION: u32 = 50;

/// Stride (in samples) between the noise-buffer windows read by adjacent
/// voices, decorrelating their modulators.
const VOICE_NOISE_STRIDE: usize = 173;

/// A bank of [`BlockOscillator`]s, one per partial, sharing a ring buffer
/// of band-limited modulator noise.
///
/// Each call to [`render`](BlockSynth::render) takes a *frame* (one target
/// breakpoint per voice) and accumulates one block of samples. Voices
/// whose current and target amplitudes are both zero are skipped entirely;
/// a silent voice re-arms its full oscillator state from the frame after
/// each block, so that onsets preserve the stored breakpoint phase.
///
/// The bank owns its noise generator state: two banks produce independent
/// streams only if constructed with different seeds.
pub struct BlockSynth {
    oscillators: Vec<BlockOscillator>,
    block_len: usize,
    noise: NoiseGenerator,
    noise_buffer: Vec<f64>,
    noise_cursor: usize,
    voice_scratch: Vec<f64>,
}

impl BlockSynth {
    /// Creates a bank of `num_voices` oscillators rendering blocks of
    /// `block_len` samples at `sample_rate` Hz, with all stochastic state
    /// derived from `seed`.
    pub fn new(block_len: usize, sample_rate: f64, num_voices: usize, seed: u64) -> Self {
        let proto = BlockOscillator::new(block_len, sample_rate, 0.0);
        let mut noise = NoiseGenerator::decimated(
            derive_component_seed(seed, "modulator"),
            NOISE_DECIMATION,
        );

        // pre-fill the shared modulator ring
        let buffer_len = TAB_SIZE.max(2 * block_len);
        let mut noise_buffer = vec![0.0; buffer_len];
        noise.fill(&mut noise_buffer);

        Self {
            oscillators: vec![proto; num_voices],
            block_len,
            noise,
            noise_buffer,
            noise_cursor: 0,
            voice_scratch: vec![0.0; block_len],
        }
    }

    /// Number of voices in the bank.
    pub fn num_voices(&self) -> usize {
        self.oscillators.len()
    }

    /// Samples rendered per call.
    pub fn block_len(&self) -> usize {
        self.block_len
    }

    /// Renders one block: every voice sweeps from its current state to its
    /// target breakpoint in `frame`, accumulating into `out` (which must
    /// hold one block of samples and may already contain audio).
    ///
    /// A frame shorter than the bank is padded with silent breakpoints;
    /// extra frame entries are ignored. Rendering never fails.
    pub fn render(&mut self, frame: &[Breakpoint], out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.block_len);

        // refresh one block of the modulator ring
        let end = self.noise_cursor + self.block_len;
        self.noise.fill(&mut self.noise_buffer[self.noise_cursor..end]);
        self.noise_cursor = end;
        if self.noise_buffer.len() < self.noise_cursor + self.block_len {
            self.noise_cursor = 0;
        }

        let silent = Breakpoint::default();
        let window = self.noise_buffer.len() - self.block_len;
        for (voice, osc) in self.oscillators.iter_mut().enumerate() {
            let target = frame.get(voice).unwrap_or(&silent);

            // skip voices that are silent throughout the block
            if target.amplitude() > 0.0 || osc.amplitude() > 0.0 {
                // each voice reads its own window of the shared ring
                let offset = (self.noise_cursor + voice * VOICE_NOISE_STRIDE) % window;
                self.voice_scratch
                    .copy_from_slice(&self.noise_buffer[offset..offset + self.block_len]);
                osc.oscillate_bwe(target, out, &self.voice_scratch);
            }

            // a voice that is (still) silent re-arms its state, phase
            // included, from the frame, preserving stored onset phases
            if osc.amplitude() == 0.0 {
                osc.set(target);
            }
        }
    }
}
