//! A single voice of the bandwidth-enhanced synthesizer bank.

use std::f64::consts::PI;

use loris_model::Breakpoint;

use super::wavetables::{carrier_amp_table, cosine_table, mod_index_table, TAB_SIZE};

/// A bandwidth-enhanced wavetable oscillator that renders a fixed-size
/// block of samples per call, interpolating its parameters linearly from
/// its current state to a target breakpoint.
///
/// No bounds or aliasing checks are performed on the target parameters;
/// the oscillator is intended to be fast and cheap. Samples accumulate
/// into the caller's buffer, so voices can be summed in any order.
#[derive(Debug, Clone)]
pub struct BlockOscillator {
    // phase is stored as a fractional wavetable index, frequency as a
    // per-sample phase increment
    phase_idx: f64,
    freq_phase_inc: f64,
    amplitude: f64,
    bandwidth: f64,

    block_len: usize,
    one_over_block_len: f64,
    phase_inc_over_f: f64,
}

/// Converts phase in radians to a fractional wavetable index in
/// `[0, TAB_SIZE)`.
fn phase_to_table_index(radians: f64) -> f64 {
    let n = TAB_SIZE as f64;
    let mut ph = radians * n / (2.0 * PI);
    ph %= n;
    if ph < 0.0 {
        ph += n;
    }
    ph
}

impl BlockOscillator {
    /// Creates a silent oscillator rendering `block_len` samples per call
    /// at the given sample rate, with initial phase `init_phase` radians.
    pub fn new(block_len: usize, sample_rate: f64, init_phase: f64) -> Self {
        Self {
            phase_idx: phase_to_table_index(init_phase),
            freq_phase_inc: 0.0,
            amplitude: 0.0,
            bandwidth: 0.0,
            block_len,
            one_over_block_len: 1.0 / block_len as f64,
            phase_inc_over_f: TAB_SIZE as f64 / sample_rate,
        }
    }

    /// Sets the instantaneous envelope parameters (frequency, amplitude,
    /// bandwidth, and phase). No checking is performed except that the
    /// phase is wrapped.
    pub fn set(&mut self, bp: &Breakpoint) {
        self.freq_phase_inc = bp.frequency() * self.phase_inc_over_f;
        self.amplitude = bp.amplitude();
        self.bandwidth = bp.bandwidth();
        self.phase_idx = phase_to_table_index(bp.phase());
    }

    /// Resets the phase. Done when a partial's amplitude reaches zero, so
    /// that onsets in distilled and collated partials keep their stored
    /// phase.
    pub fn set_phase(&mut self, radians: f64) {
        self.phase_idx = phase_to_table_index(radians);
    }

    /// The current amplitude (needed by the bank to decide whether a voice
    /// is silent and whether its phase should be re-armed).
    pub fn amplitude(&self) -> f64 {
        self.amplitude
    }

    /// Accumulates one block of pure sinusoidal samples into `out`,
    /// sweeping the oscillator state to the target breakpoint, which then
    /// becomes the new state.
    pub fn oscillate(&mut self, target: &Breakpoint, out: &mut [f64]) {
        debug_assert_eq!(out.len(), self.block_len);

        let cos_tab = cosine_table();
        let n = TAB_SIZE as f64;

        let target_freq = target.frequency() * self.phase_inc_over_f;
        let target_amp = target.amplitude();

        let d_freq = (target_freq - self.freq_phase_inc) * self.one_over_block_len;
        let d_amp = (target_amp - self.amplitude) * self.one_over_block_len;

        // advance the running frequency by half a step up front, so each
        // phase update uses the mean frequency between adjacent samples
        let mut freq = self.freq_phase_inc + 0.5 * d_freq;
        let mut ph = self.phase_idx;
        let mut amp = self.amplitude;

        for sample in out.iter_mut() {
            let idx = (ph + 0.5) as usize;
            *sample += amp * cos_tab[idx];

            ph += freq;
            if ph >= n {
                ph -= n;
            } else if ph < 0.0 {
                ph += n;
            }

            freq += d_freq;
            amp += d_amp;
        }

        self.freq_phase_inc = target_freq;
        self.amplitude = target_amp;
        self.phase_idx = ph;
    }

    /// Accumulates one block of bandwidth-enhanced samples into `out`,
    /// amplitude-modulating the carrier by the supplied noise samples in
    /// proportion to the (interpolated) bandwidth. `noise` must hold one
    /// modulator sample per output sample.
    pub fn oscillate_bwe(&mut self, target: &Breakpoint, out: &mut [f64], noise: &[f64]) {
        debug_assert_eq!(out.len(), self.block_len);
        debug_assert!(noise.len() >= out.len());

        let cos_tab = cosine_table();
        let car_tab = carrier_amp_table();
        let mod_tab = mod_index_table();
        let n = TAB_SIZE as f64;

        let target_freq = target.frequency() * self.phase_inc_over_f;
        let target_amp = target.amplitude();
        let target_bw = target.bandwidth();

        let d_freq = (target_freq - self.freq_phase_inc) * self.one_over_block_len;
        let d_amp = (target_amp - self.amplitude) * self.one_over_block_len;
        let d_bw = (target_bw - self.bandwidth) * self.one_over_block_len;

        let mut freq = self.freq_phase_inc + 0.5 * d_freq;
        let mut ph = self.phase_idx;
        let mut amp = self.amplitude;
        let mut bw = self.bandwidth;

        for (sample, &noise_sample) in out.iter_mut().zip(noise) {
            let bw_idx = (bw * n + 0.5) as usize;
            let am = car_tab[bw_idx] + noise_sample * mod_tab[bw_idx];

            let idx = (ph + 0.5) as usize;
            *sample += amp * am * cos_tab[idx];

            ph += freq;
            if ph >= n {
                ph -= n;
            } else if ph < 0.0 {
                ph += n;
            }

            freq += d_freq;
            amp += d_amp;
            bw += d_bw;
        }

        self.freq_phase_inc = target_freq;
        self.amplitude = target_amp;
        self.bandwidth = target_bw;
        self.phase_idx = ph;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn steady_breakpoint(freq: f64, amp: f64) -> Breakpoint {
        Breakpoint::new(freq, amp, 0.0, 0.0)
    }

    #[test]
    fn test_constant_state_matches_reference_cosine() {
        let sr = 44100.0;
        let bp = steady_breakpoint(441.0, 0.5);
        let mut osc = BlockOscillator::new(256, sr, 0.0);
        osc.set(&bp);

        let mut block = vec![0.0; 256];
        osc.oscillate(&bp, &mut block);

        for (i, &s) in block.iter().enumerate() {
            let expected = 0.5 * (2.0 * PI * 441.0 * i as f64 / sr).cos();
            // table lookup quantizes phase to 1/1024 of a cycle
            assert!(
                (s - expected).abs() < 0.01,
                "sample {} was {}, expected {}",
                i,
                s,
                expected
            );
        }
    }

    #[test]
    fn test_phase_continues_across_blocks() {
        let sr = 44100.0;
        let bp = steady_breakpoint(441.0, 0.5);
        let mut osc = BlockOscillator::new(128, sr, 0.0);
        osc.set(&bp);

        let mut first = vec![0.0; 128];
        let mut second = vec![0.0; 128];
        osc.oscillate(&bp, &mut first);
        osc.oscillate(&bp, &mut second);

        for (i, &s) in second.iter().enumerate() {
            let t = (128 + i) as f64 / sr;
            let expected = 0.5 * (2.0 * PI * 441.0 * t).cos();
            assert!((s - expected).abs() < 0.01);
        }
    }

    #[test]
    fn test_silent_sweep_is_exactly_zero() {
        let mut osc = BlockOscillator::new(64, 44100.0, 0.0);
        let null = Breakpoint::new(440.0, 0.0, 0.0, 0.0);
        osc.set(&null);
        let mut block = vec![0.0; 64];
        osc.oscillate(&null, &mut block);
        assert!(block.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_samples_accumulate() {
        let bp = steady_breakpoint(441.0, 0.25);
        let mut a = BlockOscillator::new(64, 44100.0, 0.0);
        let mut b = BlockOscillator::new(64, 44100.0, 0.0);
        a.set(&bp);
        b.set(&bp);

        let mut block = vec![0.0; 64];
        a.oscillate(&bp, &mut block);
        b.oscillate(&bp, &mut block);

        // two identical voices sum coherently
        assert!((block[0] - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_state_commits_to_target() {
        let sr = 44100.0;
        let mut osc = BlockOscillator::new(32, sr, 0.0);
        osc.set(&steady_breakpoint(100.0, 0.1));
        let tgt = Breakpoint::new(200.0, 0.8, 0.5, 0.0);
        let mut block = vec![0.0; 32];
        let mut noise = vec![0.0; 32];
        osc.oscillate_bwe(&tgt, &mut block, &mut noise);
        assert!((osc.amplitude() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_full_bandwidth_with_zero_noise_is_silent() {
        // at bandwidth 1 the carrier amplitude is zero, so without
        // modulator energy the voice vanishes
        let bp = Breakpoint::new(440.0, 1.0, 1.0, 0.0);
        let mut osc = BlockOscillator::new(64, 44100.0, 0.0);
        osc.set(&bp);
        let mut block = vec![0.0; 64];
        let noise = vec![0.0; 64];
        osc.oscillate_bwe(&bp, &mut block, &noise);
        assert!(block.iter().all(|&s| s.abs() < 1e-12));
    }
}
