//! Shared oscillator lookup tables.
//!
//! Three tables serve every oscillator in the process: a single cosine
//! cycle, carrier amplitude as a function of bandwidth, and stochastic
//! modulation index as a function of bandwidth. Each is one sample longer
//! than its nominal length so that rounding a fractional index up is safe.
//! They are initialized once and immutable thereafter.

use std::sync::OnceLock;

/// Nominal length of the lookup tables.
pub const TAB_SIZE: usize = 1024;

static COSINE: OnceLock<Vec<f64>> = OnceLock::new();
static CARRIER_AMP: OnceLock<Vec<f64>> = OnceLock::new();
static MOD_INDEX: OnceLock<Vec<f64>> = OnceLock::new();

/// One cycle of a cosine, indexed by phase in table samples.
pub(super) fn cosine_table() -> &'static [f64] {
    COSINE.get_or_init(|| {
        let step = 2.0 * std::f64::consts::PI / TAB_SIZE as f64;
        (0..=TAB_SIZE).map(|i| (i as f64 * step).cos()).collect()
    })
}

/// Carrier amplitude `sqrt(1 - bw)`, indexed by `round(bw * TAB_SIZE)`.
pub(super) fn carrier_amp_table() -> &'static [f64] {
    CARRIER_AMP.get_or_init(|| {
        (0..=TAB_SIZE)
            .map(|i| (1.0 - i as f64 / TAB_SIZE as f64).max(0.0).sqrt())
            .collect()
    })
}

/// Stochastic modulation index `sqrt(2 * bw)`, indexed by
/// `round(bw * TAB_SIZE)`.
pub(super) fn mod_index_table() -> &'static [f64] {
    MOD_INDEX.get_or_init(|| {
        (0..=TAB_SIZE)
            .map(|i| (2.0 * i as f64 / TAB_SIZE as f64).sqrt())
            .collect()
    })
}
