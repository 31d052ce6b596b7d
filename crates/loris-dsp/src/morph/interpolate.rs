//! Morphed parameter interpolation.

use std::f64::consts::PI;

use loris_model::Breakpoint;

use crate::phasefix::{phase_travel, wrap_pi};

/// Below this magnitude an amplitude (or bandwidth) is treated as truly
/// zero, so that a pair of silent breakpoints morphs to silence.
const EPSILON: f64 = 1e-12;

/// Log-domain interpolation between two non-negative values.
///
/// Adding the shape parameter before exponentiating is essential: without
/// it an occasional zero amplitude forces the whole morph to zero (0^x is
/// 0 however small x is). A very small shape makes the curve so steep that
/// the step from silence to faint sound becomes audible, so the default is
/// a gentle 1e-5; subtracting it afterwards keeps the noise floor down.
pub(super) fn interpolate_log(v0: f64, v1: f64, alpha: f64, shape: f64) -> f64 {
    if v0 > EPSILON || v1 > EPSILON {
        let morphed = (v0 + shape).powf(1.0 - alpha) * (v1 + shape).powf(alpha) - shape;
        morphed.max(0.0)
    } else {
        0.0
    }
}

/// Interpolates all four breakpoint parameters.
///
/// Frequency is linear in the frequency weight. Amplitude and bandwidth
/// are log-morphed, independently, with the same shape parameter. Phase is
/// interpolated linearly in the frequency weight after re-branching the
/// source phase within pi of the target phase, so that the interpolation
/// is shift-invariant; if the interpolated phase matters at all (near the
/// morph boundaries) it provides a good target for the phase-travel fix,
/// and otherwise it is recomputed from frequency anyway.
pub(super) fn interpolate_parameters(
    src_bkpt: &Breakpoint,
    tgt_bkpt: &Breakpoint,
    fweight: f64,
    aweight: f64,
    ashape: f64,
    bweight: f64,
) -> Breakpoint {
    let freq = (1.0 - fweight) * src_bkpt.frequency() + fweight * tgt_bkpt.frequency();
    let amp = interpolate_log(src_bkpt.amplitude(), tgt_bkpt.amplitude(), aweight, ashape);
    let bw = interpolate_log(src_bkpt.bandwidth(), tgt_bkpt.bandwidth(), bweight, ashape);

    let mut src_phase = src_bkpt.phase();
    while src_phase - tgt_bkpt.phase() > PI {
        src_phase -= 2.0 * PI;
    }
    while tgt_bkpt.phase() - src_phase > PI {
        src_phase += 2.0 * PI;
    }
    let phase = ((1.0 - fweight) * src_phase + fweight * tgt_bkpt.phase()) % (2.0 * PI);

    Breakpoint::new(freq, amp, bw, phase)
}

/// Reconciles a newly morphed breakpoint with the phase travel from its
/// predecessor in the morphed partial.
///
/// Near the morph boundaries (the frequency weight within
/// `PHASE_MATCH_RANGE` of 0 or 1) the interpolated absolute phase is
/// meaningful, so the frequency of `bp1` is nudged (by at most
/// `MAX_FIX_PCT` percent, and correcting only half the error, to avoid
/// frequency oscillation) toward achieving it. Away from the boundaries
/// the frequencies alone determine the phase. Either way the phase of
/// `bp1` is finally recomputed from the frequencies, so the rendered
/// partial is always self-consistent.
pub(super) fn fix_phase_travel(bp0: &Breakpoint, bp1: &mut Breakpoint, dt: f64, alpha: f64) {
    debug_assert!(dt > 0.0);
    let alpha = alpha.clamp(0.0, 1.0);

    let mut travel = phase_travel(bp0, bp1, dt);

    const PHASE_MATCH_RANGE: f64 = 0.2;
    if (0.5 - alpha).abs() > 0.5 - PHASE_MATCH_RANGE {
        let error_weight = ((0.5 - alpha).abs() - (0.5 - PHASE_MATCH_RANGE)) / PHASE_MATCH_RANGE;

        let err = wrap_pi(bp1.phase() - (bp0.phase() + travel));
        travel += 0.5 * error_weight * err;

        let mut ftgt = (travel / (PI * dt)) - bp0.frequency();

        const MAX_FIX_PCT: f64 = 0.2;
        if bp1.amplitude() != 0.0 {
            ftgt = ftgt.min(bp1.frequency() * (1.0 + MAX_FIX_PCT * 0.01));
            ftgt = ftgt.max(bp1.frequency() * (1.0 - MAX_FIX_PCT * 0.01));
        }
        bp1.set_frequency(ftgt);
    }

    let travel = phase_travel(bp0, bp1, dt);
    bp1.set_phase(wrap_pi(bp0.phase() + travel));
}
