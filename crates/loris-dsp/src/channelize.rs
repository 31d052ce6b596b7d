//! Harmonic-number labeling against a reference frequency envelope.

use log::debug;
use loris_model::{Envelope, Error, Partial, PartialList, Result};

/// Assigns each partial an integer label proportional to its harmonic number
/// relative to a reference frequency envelope.
///
/// The reference envelope traces channel `channel_number` (1 for an envelope
/// that follows the fundamental). Each partial is evaluated at the time of
/// its peak amplitude; its label is the nearest channel number at that
/// instant. Channelizing is idempotent: re-running with the same reference
/// and channel number reproduces the labels.
pub struct Channelizer {
    reference: Box<dyn Envelope>,
    channel_number: u32,
    stretch: f64,
}

impl Channelizer {
    /// Creates a channelizer from a reference envelope and the channel
    /// number it traces.
    ///
    /// # Errors
    /// `InvalidArgument` if `channel_number` is zero.
    pub fn new(reference: Box<dyn Envelope>, channel_number: u32) -> Result<Self> {
        if channel_number == 0 {
            return Err(Error::invalid_argument(
                "the reference envelope channel number must be positive",
            ));
        }
        Ok(Self {
            reference,
            channel_number,
            stretch: 0.0,
        })
    }

    /// The stretching factor describing the inharmonicity of the channels
    /// (0 for strictly harmonic channels).
    pub fn stretch(&self) -> f64 {
        self.stretch
    }

    /// Sets the stretching factor. Channel center frequencies follow
    /// `f_n = n * f_ref * sqrt(1 + stretch * n^2)`, the piano-style
    /// stretched harmonic series.
    ///
    /// # Errors
    /// `InvalidArgument` if `stretch` is negative.
    pub fn set_stretch(&mut self, stretch: f64) -> Result<()> {
        if stretch < 0.0 {
            return Err(Error::invalid_argument(
                "the channel stretching factor must be non-negative",
            ));
        }
        self.stretch = stretch;
        Ok(())
    }

    /// Labels a single partial. Dummy partials and partials whose computed
    /// channel number rounds to zero are left unlabeled (label 0).
    pub fn channelize(&self, partial: &mut Partial) {
        if partial.is_empty() {
            return;
        }

        // evaluate the reference at the partial's loudest instant
        let mut peak_time = partial.start_time();
        let mut peak_amp = 0.0;
        for (t, bp) in partial.iter() {
            if bp.amplitude() > peak_amp {
                peak_amp = bp.amplitude();
                peak_time = t;
            }
        }

        let ref_freq = self.reference.value_at(peak_time) / self.channel_number as f64;
        if ref_freq <= 0.0 {
            partial.set_label(0);
            return;
        }

        let freq = partial.frequency_at(peak_time);
        let label = self.nearest_channel(freq, ref_freq);
        debug!(
            "channelizing partial at {:.1} Hz near t={:.3}: label {}",
            freq, peak_time, label
        );
        partial.set_label(label);
    }

    /// Labels every partial in the list.
    pub fn channelize_all(&self, partials: &mut PartialList) {
        for p in partials.iter_mut() {
            self.channelize(p);
        }
    }

    /// The channel number whose center frequency is nearest `freq`.
    fn nearest_channel(&self, freq: f64, ref_freq: f64) -> i32 {
        if self.stretch == 0.0 {
            return ((freq / ref_freq) + 0.5).floor().max(0.0) as i32;
        }

        // with stretched channels, search around the unstretched guess
        let guess = ((freq / ref_freq) + 0.5).floor().max(1.0) as i64;
        let mut best = 0i64;
        let mut best_err = f64::INFINITY;
        for n in (guess - 2).max(1)..=(guess + 2) {
            let nf = n as f64;
            let center = nf * ref_freq * (1.0 + self.stretch * nf * nf).sqrt();
            let err = (freq - center).abs();
            if err < best_err {
                best_err = err;
                best = n;
            }
        }
        // reject frequencies nearer to zero than to the first channel
        if freq < 0.5 * ref_freq {
            0
        } else {
            best as i32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loris_model::{Breakpoint, LinearEnvelope};
    use pretty_assertions::assert_eq;

    fn partial_at(freq: f64) -> Partial {
        let mut p = Partial::new();
        p.insert(0.0, Breakpoint::new(freq, 0.5, 0.0, 0.0));
        p.insert(1.0, Breakpoint::new(freq, 0.5, 0.0, 0.0));
        p
    }

    #[test]
    fn test_harmonic_labels() {
        // 100, 200.5, 305, 398 Hz against a constant 100 Hz reference
        // yield labels 1..4
        let reference = LinearEnvelope::constant(100.0);
        let channelizer = Channelizer::new(Box::new(reference), 1).unwrap();

        let mut partials: PartialList = [100.0, 200.5, 305.0, 398.0]
            .iter()
            .map(|&f| partial_at(f))
            .collect();
        channelizer.channelize_all(&mut partials);

        let labels: Vec<i32> = partials.iter().map(Partial::label).collect();
        assert_eq!(labels, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_idempotent() {
        let channelizer =
            Channelizer::new(Box::new(LinearEnvelope::constant(100.0)), 1).unwrap();
        let mut p = partial_at(305.0);
        channelizer.channelize(&mut p);
        let first = p.label();
        channelizer.channelize(&mut p);
        assert_eq!(p.label(), first);
    }

    #[test]
    fn test_subharmonic_rounds_to_zero() {
        let channelizer =
            Channelizer::new(Box::new(LinearEnvelope::constant(100.0)), 1).unwrap();
        let mut p = partial_at(30.0);
        channelizer.channelize(&mut p);
        assert_eq!(p.label(), 0);
    }

    #[test]
    fn test_invalid_channel_number() {
        assert!(Channelizer::new(Box::new(LinearEnvelope::constant(100.0)), 0).is_err());
    }

    #[test]
    fn test_stretched_channels() {
        let mut channelizer =
            Channelizer::new(Box::new(LinearEnvelope::constant(100.0)), 1).unwrap();
        channelizer.set_stretch(0.01).unwrap();
        // channel 4 center is 400 * sqrt(1.16) ~ 430.8 Hz
        let mut p = partial_at(430.0);
        channelizer.channelize(&mut p);
        assert_eq!(p.label(), 4);
        assert!(channelizer.set_stretch(-1.0).is_err());
    }
}
