//! Maximum-likelihood fundamental frequency estimation.
//!
//! The estimator evaluates a likelihood functional over candidate
//! fundamental frequencies: spectral peaks that are near-harmonics of a
//! candidate reinforce it in proportion to their energy. The iterative
//! search narrows the candidate range until it is below the requested
//! resolution. Because the functional is normalized by the total peak
//! energy, its value at the returned frequency measures confidence (1 means
//! every peak is an exact harmonic).

use std::f64::consts::PI;

use log::debug;
use loris_model::{time_span, Envelope, Error, LinearEnvelope, PartialList, Result};

use crate::collate::Collator;

/// A fundamental frequency estimate and the normalized likelihood value
/// backing it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct F0Estimate {
    frequency: f64,
    confidence: f64,
}

impl F0Estimate {
    /// The estimated fundamental frequency in Hz.
    pub fn frequency(&self) -> f64 {
        self.frequency
    }

    /// The normalized likelihood in [0, 1]; values above roughly 0.9
    /// indicate a trustworthy estimate.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }
}

/// Iteratively maximizes the likelihood functional over `[fmin, fmax]`,
/// narrowing the search range until it is smaller than `resolution` Hz.
///
/// `amps` and `freqs` describe the spectral peaks (parallel slices).
///
/// # Errors
/// `InvalidArgument` if the peaks are empty, the slices disagree in length,
/// or the frequency range is empty.
pub fn iterative_estimate(
    amps: &[f64],
    freqs: &[f64],
    fmin: f64,
    fmax: f64,
    resolution: f64,
) -> Result<F0Estimate> {
    if amps.is_empty() || amps.len() != freqs.len() {
        return Err(Error::invalid_argument(
            "fundamental estimation requires matching, non-empty peak \
             amplitude and frequency lists",
        ));
    }
    // never consider DC to be a valid fundamental
    let mut fmin = fmin.max(1.0);
    let mut fmax = fmax;
    if fmax <= fmin {
        return Err(Error::invalid_argument(
            "fundamental search range is empty",
        ));
    }
    if resolution <= 0.0 {
        return Err(Error::invalid_argument(
            "fundamental frequency resolution must be positive",
        ));
    }

    // Initially sample the likelihood function about every 2 Hz; a coarser
    // sampling can miss a peak entirely.
    let mut nsamps = (((fmax - fmin) * 0.5).ceil() as usize).max(8);

    let mut peak_freq;
    let mut peak_q;
    loop {
        let eval_freqs = compute_eval_freqs(fmin, fmax, nsamps);
        let q = evaluate_q(amps, freqs, &eval_freqs);

        let peak_idx = choose_peak(&q);
        peak_q = q[peak_idx];
        peak_freq = eval_freqs[peak_idx];

        fmin = eval_freqs[peak_idx.saturating_sub(1)];
        fmax = eval_freqs[(peak_idx + 1).min(nsamps - 1)];
        nsamps = (((fmax - fmin) * 0.05).ceil() as usize).max(8);

        if fmax - fmin <= resolution {
            break;
        }
    }

    Ok(F0Estimate {
        frequency: peak_freq,
        confidence: peak_q,
    })
}

/// Uniformly samples `[fmin, fmax]` at `n` frequencies (ends included).
fn compute_eval_freqs(fmin: f64, fmax: f64, n: usize) -> Vec<f64> {
    let delta = (fmax - fmin) / (n - 1) as f64;
    let mut freqs: Vec<f64> = (0..n).map(|i| fmin + i as f64 * delta).collect();
    freqs[n - 1] = fmax;
    freqs
}

/// Evaluates the normalized likelihood function at each candidate
/// frequency.
fn evaluate_q(amps: &[f64], freqs: &[f64], eval_freqs: &[f64]) -> Vec<f64> {
    // normalize by the total energy of the peaks so that the result
    // depends only on the quality of the estimate, not the signal level
    let etotal: f64 = amps.iter().map(|a| a * a).sum();
    let norm = 1.0 / etotal;

    eval_freqs
        .iter()
        .map(|&f0| {
            let q: f64 = amps
                .iter()
                .zip(freqs)
                .map(|(&a, &f)| a * a * (2.0 * PI * f / f0).cos())
                .sum();
            q * norm
        })
        .collect()
}

/// Picks the highest-frequency candidate that is locally maximal and whose
/// likelihood is at least 85% of the global maximum.
///
/// For strongly periodic signals the threshold could be nearly 1, but for
/// somewhat inharmonic material a high threshold gives octave errors.
fn choose_peak(q: &[f64]) -> usize {
    let qmax = q.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let threshold = 0.85 * qmax;
    let mut idx = q.len() - 1;
    while idx > 0 && (q[idx] < threshold || q[idx] < q[idx - 1]) {
        idx -= 1;
    }
    idx
}

/// A time-varying fundamental frequency estimate over a collection of
/// partials.
///
/// The collection is copied and collated on construction (labels cleared
/// first) so that per-time lookup stays cheap. Only partials whose
/// amplitude at the query time exceeds the amplitude threshold contribute,
/// each weighted by its sinusoidal share `amp * sqrt(1 - bandwidth)`.
///
/// Implements [`Envelope`], so an estimator can serve directly as the
/// reference envelope of a
/// [`Channelizer`](crate::channelize::Channelizer).
#[derive(Clone)]
pub struct FundamentalFromPartials {
    partials: PartialList,
    freq_min: f64,
    freq_max: f64,
    amp_threshold_db: f64,
    freq_resolution: f64,
}

impl FundamentalFromPartials {
    /// The default amplitude threshold in dB (relative to a full-scale
    /// sinusoid) below which partials are ignored.
    pub const DEFAULT_THRESHOLD_DB: f64 = -60.0;
    /// The default frequency resolution in Hz.
    pub const DEFAULT_RESOLUTION: f64 = 0.1;

    /// Creates an estimator for the given partials, searching for the
    /// fundamental between `f1` and `f2` Hz (a narrower range speeds up
    /// the search).
    ///
    /// # Errors
    /// `InvalidArgument` if `f1 == f2` or either frequency is negative.
    pub fn new(partials: &PartialList, f1: f64, f2: f64) -> Result<Self> {
        if f1 == f2 {
            return Err(Error::invalid_argument(
                "cannot estimate the fundamental over an empty frequency range",
            ));
        }
        if f1 < 0.0 || f2 < 0.0 {
            return Err(Error::invalid_argument(
                "cannot estimate the fundamental over a negative frequency range",
            ));
        }

        // collate a private copy of the partials (labels cleared first,
        // only collation is wanted) to make per-time lookup cheap
        let mut prepared = partials.clone();
        for p in prepared.iter_mut() {
            p.set_label(0);
        }
        Collator::default().collate(&mut prepared);

        Ok(Self {
            partials: prepared,
            freq_min: f1.min(f2),
            freq_max: f1.max(f2),
            amp_threshold_db: Self::DEFAULT_THRESHOLD_DB,
            freq_resolution: Self::DEFAULT_RESOLUTION,
        })
    }

    /// The amplitude threshold in dB.
    pub fn amp_threshold(&self) -> f64 {
        self.amp_threshold_db
    }

    /// Sets the amplitude threshold in dB; partials quieter than this are
    /// ignored when estimating.
    ///
    /// # Errors
    /// `InvalidArgument` if `db` is positive.
    pub fn set_amp_threshold(&mut self, db: f64) -> Result<()> {
        if db > 0.0 {
            return Err(Error::invalid_argument(
                "amplitude threshold must be expressed in (negative) dB \
                 relative to a full amplitude sine wave",
            ));
        }
        self.amp_threshold_db = db;
        Ok(())
    }

    /// The frequency resolution in Hz.
    pub fn freq_resolution(&self) -> f64 {
        self.freq_resolution
    }

    /// Sets the resolution: estimates are refined iteratively until within
    /// this many Hz of the local most likely value.
    ///
    /// # Errors
    /// `InvalidArgument` if `hz` is not positive.
    pub fn set_freq_resolution(&mut self, hz: f64) -> Result<()> {
        if hz <= 0.0 {
            return Err(Error::invalid_argument(
                "frequency resolution (Hz) must be positive",
            ));
        }
        self.freq_resolution = hz;
        Ok(())
    }

    /// Estimates the fundamental frequency at `time`.
    ///
    /// # Errors
    /// `InvalidArgument` if no partial has sufficient energy at `time`;
    /// `InvalidObject` if no likely estimate exists inside the search
    /// range.
    pub fn estimate_at(&self, time: f64) -> Result<f64> {
        let (amps, freqs) = self.collect_peaks(time);
        if amps.is_empty() {
            return Err(Error::invalid_argument(
                "no partials have significant energy at the specified time",
            ));
        }

        let est = iterative_estimate(
            &amps,
            &freqs,
            self.freq_min,
            self.freq_max,
            self.freq_resolution,
        )?;
        if est.frequency() <= self.freq_min || est.frequency() >= self.freq_max {
            return Err(Error::invalid_object(
                "cannot construct a reliable estimate on the specified \
                 range of frequencies",
            ));
        }
        Ok(est.frequency())
    }

    /// Builds a linear envelope approximating the fundamental frequency
    /// over `[t1, t2]`, sampled every `interval` seconds. Samples that land
    /// on the search boundaries are considered unreliable and skipped.
    ///
    /// # Errors
    /// `InvalidArgument` if no partial has energy anywhere in the range;
    /// `InvalidObject` if no reliable estimate was found.
    pub fn construct_envelope(&self, t1: f64, t2: f64, interval: f64) -> Result<LinearEnvelope> {
        let (mut t1, mut t2) = (t1, t2);
        if t1 > t2 {
            std::mem::swap(&mut t1, &mut t2);
        }
        if interval <= 0.0 {
            return Err(Error::invalid_argument(
                "envelope sampling interval must be positive",
            ));
        }

        let mut env = LinearEnvelope::new();
        let mut found_energy = false;
        let mut t = t1;
        while t <= t2 {
            let (amps, freqs) = self.collect_peaks(t);
            if !amps.is_empty() {
                found_energy = true;
                let est = iterative_estimate(
                    &amps,
                    &freqs,
                    self.freq_min,
                    self.freq_max,
                    self.freq_resolution,
                )?;
                // reject boundary frequencies
                if est.frequency() > self.freq_min && est.frequency() < self.freq_max {
                    env.insert(t, est.frequency());
                } else {
                    debug!("rejecting boundary estimate {} at {}", est.frequency(), t);
                }
            }
            t += interval;
        }

        if !found_energy {
            return Err(Error::invalid_argument(
                "no partials have sufficient energy to estimate the fundamental",
            ));
        }
        if env.is_empty() {
            return Err(Error::invalid_object(
                "cannot construct a reliable estimate on the specified \
                 range of frequencies",
            ));
        }
        Ok(env)
    }

    /// Builds the fundamental envelope over the whole span of the
    /// partials.
    pub fn construct_envelope_for_span(&self, interval: f64) -> Result<LinearEnvelope> {
        let (t1, t2) = time_span(&self.partials).ok_or_else(|| {
            Error::invalid_argument(
                "no partials have sufficient energy to estimate the fundamental",
            )
        })?;
        self.construct_envelope(t1, t2, interval)
    }

    /// Collects the sinusoidal amplitudes and frequencies of partials loud
    /// enough at `t` to contribute.
    fn collect_peaks(&self, t: f64) -> (Vec<f64>, Vec<f64>) {
        let abs_threshold = 10f64.powf(0.05 * self.amp_threshold_db);
        let mut amps = Vec::new();
        let mut freqs = Vec::new();
        for p in self.partials.iter() {
            let a = p.amplitude_at(t);
            if a > abs_threshold {
                amps.push((1.0 - p.bandwidth_at(t)).sqrt() * a);
                freqs.push(p.frequency_at(t));
            }
        }
        (amps, freqs)
    }
}

impl Envelope for FundamentalFromPartials {
    /// The fundamental estimate at `t`, or 0 where no estimate exists (an
    /// envelope cannot fail).
    fn value_at(&self, t: f64) -> f64 {
        self.estimate_at(t).unwrap_or(0.0)
    }

    fn clone_env(&self) -> Box<dyn Envelope> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loris_model::{Breakpoint, Partial};

    fn harmonic_partials(f0: f64, n: usize, amp: f64) -> PartialList {
        (1..=n)
            .map(|k| {
                let mut p = Partial::new();
                let f = f0 * k as f64;
                p.insert(0.0, Breakpoint::new(f, amp, 0.0, 0.0));
                p.insert(1.0, Breakpoint::new(f, amp, 0.0, 0.0));
                p
            })
            .collect()
    }

    #[test]
    fn test_iterative_estimate_exact_harmonics() {
        // equal-amplitude peaks at 100..400 Hz
        let amps = [1.0, 1.0, 1.0, 1.0];
        let freqs = [100.0, 200.0, 300.0, 400.0];
        let est = iterative_estimate(&amps, &freqs, 50.0, 500.0, 0.1).unwrap();
        assert!(
            (est.frequency() - 100.0).abs() <= 0.11,
            "estimate {}",
            est.frequency()
        );
        assert!(est.confidence() >= 0.99);
    }

    #[test]
    fn test_iterative_estimate_prefers_highest_strong_peak() {
        // 50 Hz explains the same peaks, but 100 Hz is the highest
        // strongly-likely candidate
        let amps = [1.0, 1.0];
        let freqs = [100.0, 200.0];
        let est = iterative_estimate(&amps, &freqs, 40.0, 300.0, 0.1).unwrap();
        assert!(
            (est.frequency() - 100.0).abs() <= 0.11,
            "estimate {}",
            est.frequency()
        );
        assert!(est.confidence() >= 0.99);
    }

    #[test]
    fn test_iterative_estimate_invalid_inputs() {
        assert!(iterative_estimate(&[], &[], 50.0, 500.0, 0.1).is_err());
        assert!(iterative_estimate(&[1.0], &[100.0], 500.0, 50.0, 0.1).is_err());
        assert!(iterative_estimate(&[1.0], &[100.0, 200.0], 50.0, 500.0, 0.1).is_err());
    }

    #[test]
    fn test_estimate_from_partials() {
        // synthetic partials at k * f0, k = 1..5
        let partials = harmonic_partials(220.0, 5, 0.5);
        let fundamental = FundamentalFromPartials::new(&partials, 100.0, 500.0).unwrap();
        let f0 = fundamental.estimate_at(0.5).unwrap();
        assert!((f0 - 220.0).abs() <= 0.11, "estimate {}", f0);
    }

    #[test]
    fn test_quiet_partials_ignored() {
        let partials = harmonic_partials(220.0, 5, 1e-5);
        let fundamental = FundamentalFromPartials::new(&partials, 100.0, 500.0).unwrap();
        assert!(matches!(
            fundamental.estimate_at(0.5),
            Err(Error::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_construct_envelope() {
        let partials = harmonic_partials(220.0, 5, 0.5);
        let fundamental = FundamentalFromPartials::new(&partials, 100.0, 500.0).unwrap();
        let env = fundamental.construct_envelope(0.0, 1.0, 0.1).unwrap();
        assert!(!env.is_empty());
        assert!((env.value_at(0.5) - 220.0).abs() <= 0.11);
    }

    #[test]
    fn test_invalid_range() {
        let partials = harmonic_partials(220.0, 2, 0.5);
        assert!(FundamentalFromPartials::new(&partials, 100.0, 100.0).is_err());
        assert!(FundamentalFromPartials::new(&partials, -10.0, 100.0).is_err());
    }
}
