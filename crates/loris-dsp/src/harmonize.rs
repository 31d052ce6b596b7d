//! Harmonic frequency alignment for quiet breakpoints.

use loris_model::{Envelope, Error, LinearEnvelope, Partial, PartialList, Result};

/// Pulls the frequencies of quiet breakpoints toward the harmonic series of
/// a reference partial.
///
/// The reference (presumed the fundamental, labeled with its harmonic
/// number) is considered to have good frequency estimates throughout. For a
/// target partial labeled `h`, each breakpoint quieter than a fade range of
/// 10 dB above the threshold is blended toward `(h / ref_label) * f_ref(t)`;
/// at or below the threshold the harmonic frequency is used outright. Loud
/// breakpoints are unchanged. The blend is further scaled by a time-varying
/// weight envelope (constant 1 by default).
pub struct Harmonifier {
    reference: Partial,
    threshold_db: f64,
    weight: Box<dyn Envelope>,
}

impl Harmonifier {
    /// Breakpoints within this many dB above the threshold are partially
    /// corrected.
    const FADE_RANGE_DB: f64 = 10.0;

    /// Creates a harmonifier around the given reference partial, correcting
    /// breakpoints quieter than `threshold_db` (dB relative to a full-scale
    /// sinusoid; e.g. -90 to affect only the quietest breakpoints).
    ///
    /// An unlabeled reference is assumed to be the fundamental and is
    /// relabeled 1.
    ///
    /// # Errors
    /// `InvalidArgument` if the reference partial has no breakpoints.
    pub fn new(reference: &Partial, threshold_db: f64) -> Result<Self> {
        Self::with_envelope(reference, &LinearEnvelope::constant(1.0), threshold_db)
    }

    /// Creates a harmonifier with a time-varying weight envelope: where the
    /// envelope is 1, harmonic frequencies are used; where it is 0,
    /// breakpoint frequencies are unmodified.
    ///
    /// # Errors
    /// `InvalidArgument` if the reference partial has no breakpoints.
    pub fn with_envelope(
        reference: &Partial,
        weight: &dyn Envelope,
        threshold_db: f64,
    ) -> Result<Self> {
        if reference.is_empty() {
            return Err(Error::invalid_argument(
                "cannot use an empty reference partial in the harmonifier",
            ));
        }
        let mut reference = reference.clone();
        if reference.label() == 0 {
            reference.set_label(1);
        }
        Ok(Self {
            reference,
            threshold_db,
            weight: weight.clone_env(),
        })
    }

    /// Applies the reference to one partial. The partial must be labeled
    /// with its harmonic number.
    pub fn harmonify(&self, p: &mut Partial) {
        let begin_fade = 10f64.powf(0.05 * (self.threshold_db + Self::FADE_RANGE_DB));
        let threshold = 10f64.powf(0.05 * self.threshold_db);
        let one_over_fade_span = 1.0 / (begin_fade - threshold);

        let fscale = f64::from(p.label()) / f64::from(self.reference.label());

        for (t, bp) in p.iter_mut() {
            if bp.amplitude() < begin_fade {
                // alpha is the harmonic frequency weighting: 1 uses the
                // harmonic frequency, 0 leaves the breakpoint alone
                let mut alpha =
                    ((begin_fade - bp.amplitude()) * one_over_fade_span).min(1.0);
                alpha *= self.weight.value_at(t);

                let f_ref = self.reference.frequency_at(t);
                bp.set_frequency(alpha * (f_ref * fscale) + (1.0 - alpha) * bp.frequency());
            }
        }
    }

    /// Applies the reference to every partial in the list.
    pub fn harmonify_all(&self, partials: &mut PartialList) {
        for p in partials.iter_mut() {
            self.harmonify(p);
        }
    }
}
