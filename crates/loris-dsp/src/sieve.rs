//! Rejection of quiet unlabeled partials.

use log::debug;
use loris_model::{Error, PartialList, Result};

/// Drops unlabeled partials whose sinusoidal energy never rises above a
/// threshold.
///
/// A partial survives if at any breakpoint its sinusoidal amplitude,
/// `amp * sqrt(1 - bandwidth)`, exceeds the threshold. Labeled partials are
/// never dropped.
#[derive(Debug, Clone)]
pub struct Sieve {
    threshold: f64,
}

impl Default for Sieve {
    fn default() -> Self {
        // -90 dB relative to a full-scale sinusoid
        Self {
            threshold: 10f64.powf(0.05 * Self::DEFAULT_THRESHOLD_DB),
        }
    }
}

impl Sieve {
    /// Default rejection threshold in dB.
    pub const DEFAULT_THRESHOLD_DB: f64 = -90.0;

    /// Creates a sieve rejecting unlabeled partials quieter than
    /// `threshold_db` (dB relative to a full-scale sinusoid, so negative).
    ///
    /// # Errors
    /// `InvalidArgument` if `threshold_db` is positive.
    pub fn new(threshold_db: f64) -> Result<Self> {
        if threshold_db > 0.0 {
            return Err(Error::invalid_argument(
                "sieve threshold must be expressed in (negative) dB \
                 relative to a full amplitude sine wave",
            ));
        }
        Ok(Self {
            threshold: 10f64.powf(0.05 * threshold_db),
        })
    }

    /// Removes quiet unlabeled partials from the list in place. Returns the
    /// number of partials removed.
    pub fn sift(&self, partials: &mut PartialList) -> usize {
        let before = partials.len();
        partials.retain(|p| {
            p.label() != 0
                || p.iter().any(|(_, bp)| {
                    bp.amplitude() * (1.0 - bp.bandwidth()).sqrt() > self.threshold
                })
        });
        let removed = before - partials.len();
        debug!("sifted out {} quiet unlabeled partials", removed);
        removed
    }
}
