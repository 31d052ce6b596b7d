//! Band-limited Gaussian noise for the stochastic modulator.

use rand::Rng;
use rand_pcg::Pcg32;

use crate::filter::Filter;
use crate::rng::create_rng;

// Chebyshev order 3, cutoff 500 Hz (at 44.1 kHz), 1 dB ripple.
const CHEBYSHEV_GAIN: f64 = 4.663939184e4;
const CHEBYSHEV_MA: [f64; 4] = [1.0, 3.0, 3.0, 1.0];
const CHEBYSHEV_AR: [f64; 4] = [1.0, -2.9258684252, 2.8580608586, -0.9320209046];

/// Output scaling for the modulator chain, chosen so that the delivered
/// noise has variance 1/2. The bandwidth-enhanced oscillator's carrier and
/// modulation-index tables assume exactly that: a modulator of variance
/// 1/2 keeps `E[(carrier + index * noise)^2] = 1` at every bandwidth, so
/// bandwidth redistributes energy instead of adding or removing it.
const MODULATOR_SCALE: f64 = 4.6027;

/// A deterministic generator of low-pass filtered Gaussian noise,
/// optionally decimated with linear interpolation between regenerated
/// samples.
///
/// Gaussian deviates come from the polar Box-Muller transformation over a
/// PCG32 stream, filtered through a fixed 3rd-order Chebyshev low-pass at
/// roughly 500 Hz to produce the band-limited modulator the
/// bandwidth-enhanced oscillator expects. Generator state belongs to the
/// owning synthesizer; two generators produce independent streams only if
/// seeded differently.
#[derive(Debug, Clone)]
pub struct NoiseGenerator {
    rng: Pcg32,
    saved_deviate: Option<f64>,
    filter: Filter,
    decimation: u32,
    step: u32,
    value: f64,
    dvalue: f64,
}

impl NoiseGenerator {
    /// Creates a full-rate generator (no decimation).
    pub fn new(seed: u64) -> Self {
        Self::decimated(seed, 1)
    }

    /// Creates a generator that regenerates a filtered sample every
    /// `decimation` output samples and interpolates linearly in between.
    pub fn decimated(seed: u64, decimation: u32) -> Self {
        Self {
            rng: create_rng(seed),
            saved_deviate: None,
            filter: Filter::new(
                &CHEBYSHEV_MA,
                &CHEBYSHEV_AR,
                MODULATOR_SCALE / CHEBYSHEV_GAIN,
            ),
            decimation: decimation.max(1),
            step: 0,
            value: 0.0,
            dvalue: 0.0,
        }
    }

    /// Reseeds the generator and clears the filter delay line.
    pub fn reset(&mut self, seed: u64) {
        self.rng = create_rng(seed);
        self.saved_deviate = None;
        self.filter.clear();
        self.step = 0;
        self.value = 0.0;
        self.dvalue = 0.0;
    }

    /// The next modulator sample.
    pub fn next_sample(&mut self) -> f64 {
        if self.decimation <= 1 {
            return self.filtered_gaussian();
        }
        if self.step == 0 {
            let target = self.filtered_gaussian();
            self.dvalue = (target - self.value) / f64::from(self.decimation);
            self.step = self.decimation;
        }
        self.value += self.dvalue;
        self.step -= 1;
        self.value
    }

    /// Fills a buffer with modulator samples.
    pub fn fill(&mut self, buf: &mut [f64]) {
        for sample in buf.iter_mut() {
            *sample = self.next_sample();
        }
    }

    fn filtered_gaussian(&mut self) -> f64 {
        let g = self.gaussian_normal();
        self.filter.apply(g)
    }

    /// A standard normal deviate via the polar Box-Muller transformation,
    /// keeping the spare deviate for the next call.
    fn gaussian_normal(&mut self) -> f64 {
        if let Some(saved) = self.saved_deviate.take() {
            return saved;
        }

        let mut v1: f64;
        let mut v2: f64;
        let mut r: f64;
        loop {
            v1 = 2.0 * self.rng.gen::<f64>() - 1.0;
            v2 = 2.0 * self.rng.gen::<f64>() - 1.0;
            r = v1 * v1 + v2 * v2;
            if r < 1.0 && r > 0.0 {
                break;
            }
        }

        let fac = (-2.0 * r.ln() / r).sqrt();
        self.saved_deviate = Some(v1 * fac);
        v2 * fac
    }
}
