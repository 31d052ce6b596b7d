//! Phase correction.
//!
//! Perturbs the frequencies or phases of the breakpoints in a partial so
//! that the rendered partial achieves (or comes closer to) the stored
//! breakpoint phases. Stored phase is authoritative only at null
//! (zero-amplitude) breakpoints, which act as reset points, and at boundary
//! times that are externally anchored; elsewhere frequency integrates to
//! phase.

use std::f64::consts::PI;

use log::debug;
use loris_model::{Breakpoint, Partial};

/// The default limit on frequency alteration, as a percentage (0.2%).
pub const DEFAULT_MAX_FIX_PCT: f64 = 0.2;

/// The fraction of the detected phase error corrected per breakpoint.
///
/// Correcting more than half the error at a time produces frequency
/// oscillations for the remainder of the partial when a single bad
/// frequency occurs (as is common at tone onsets); 0.5 or less converges
/// without oscillating.
const DAMPING: f64 = 0.5;

/// Wraps an unwrapped phase value onto the range (-pi, pi].
pub fn wrap_pi(x: f64) -> f64 {
    let mut x = x % (2.0 * PI);
    if x > PI {
        x -= 2.0 * PI;
    } else if x < -PI {
        x += 2.0 * PI;
    }
    x
}

/// Total unwrapped sinusoidal phase travel between two breakpoints
/// separated by `dt` seconds: the mean frequency times the duration.
pub fn phase_travel(bp0: &Breakpoint, bp1: &Breakpoint, dt: f64) -> f64 {
    2.0 * PI * 0.5 * (bp0.frequency() + bp1.frequency()) * dt
}

/// Phase travel between the breakpoints at positions `i0` and `i1`.
fn travel_between(p: &Partial, i0: usize, i1: usize) -> f64 {
    phase_travel(
        p.breakpoint_at(i0),
        p.breakpoint_at(i1),
        p.time_at(i1) - p.time_at(i0),
    )
}

/// Adjusts the frequencies of the breakpoints in `partial` so that the
/// rendered partial matches the stored phases as nearly as possible within
/// the constraint of the maximum allowable frequency alteration,
/// `max_fix_pct` (a percentage of each breakpoint's frequency).
///
/// Where the frequency cannot legally be altered far enough, the phase is
/// updated instead, so frequencies and phases always agree afterwards.
pub fn fix_frequency(partial: &mut Partial, max_fix_pct: f64) {
    if partial.len() < 2 {
        return;
    }
    for pos in 1..partial.len() {
        let bp0 = *partial.breakpoint_at(pos - 1);
        let dt = partial.time_at(pos) - partial.time_at(pos - 1);
        let bp1 = partial.breakpoint_at_mut(pos);
        match_phase_fwd(&bp0, bp1, dt, DAMPING, max_fix_pct);
    }
}

/// Computes the target frequency that would achieve the phase travel
/// predicted by the stored phases of two consecutive breakpoints, and
/// assigns a damped, clamped version of it to the later breakpoint. The
/// later breakpoint's phase is then recomputed from the (possibly altered)
/// frequencies.
fn match_phase_fwd(bp0: &Breakpoint, bp1: &mut Breakpoint, dt: f64, damping: f64, max_fix_pct: f64) {
    let mut travel = phase_travel(bp0, bp1, dt);
    let err = wrap_pi(bp1.phase() - (bp0.phase() + travel));
    travel += damping * err;

    let mut ftgt = (travel / (PI * dt)) - bp0.frequency();

    // a null breakpoint is a reset point and may move freely; otherwise
    // clamp the frequency alteration
    if bp1.amplitude() != 0.0 {
        if ftgt > bp1.frequency() * (1.0 + max_fix_pct * 0.01) {
            ftgt = bp1.frequency() * (1.0 + max_fix_pct * 0.01);
        } else if ftgt < bp1.frequency() * (1.0 - max_fix_pct * 0.01) {
            ftgt = bp1.frequency() * (1.0 - max_fix_pct * 0.01);
        }
    }
    bp1.set_frequency(ftgt);

    let phi = wrap_pi(bp0.phase() + phase_travel(bp0, bp1, dt));
    bp1.set_phase(phi);
}

/// Recomputes the phases of all breakpoints earlier than `t` so that the
/// synthesized phase at `t` matches the stored phase there.
///
/// Backward fixing stops at a null breakpoint (a phase reset point); when
/// one is hit, the head of the partial is instead fixed forward from its
/// start up to the null.
pub fn fix_phase_before(p: &mut Partial, t: f64) {
    if p.len() < 2 {
        return;
    }
    let Some(mut pos) = p.find_nearest(t) else {
        return;
    };
    while pos > 0 && !p.breakpoint_at(pos).is_null() {
        let travel = travel_between(p, pos - 1, pos);
        let phase = wrap_pi(p.breakpoint_at(pos).phase() - travel);
        p.breakpoint_at_mut(pos - 1).set_phase(phase);
        pos -= 1;
    }

    // stopped at a null: fix the front of the partial forwards instead
    if pos > 0 {
        let tend = p.time_at(pos - 1);
        fix_phase_forward(p, p.start_time(), tend);
    }
}

/// Recomputes the phases of all breakpoints later than `t` from the stored
/// phase at (nearest) `t`.
pub fn fix_phase_after(p: &mut Partial, t: f64) {
    let end = p.end_time();
    fix_phase_forward(p, t, end);
}

/// Recomputes phases forward over the breakpoints between `tbeg` and
/// `tend` (swapped if reversed). Null breakpoints keep their stored phase
/// and future phases are recomputed from them.
pub fn fix_phase_forward(p: &mut Partial, mut tbeg: f64, mut tend: f64) {
    if tbeg > tend {
        std::mem::swap(&mut tbeg, &mut tend);
    }
    if p.len() < 2 {
        return;
    }
    let Some(mut pos) = p.find_nearest(tbeg) else {
        return;
    };
    let mut stop = p.find_after(tend);
    if pos != stop {
        stop -= 1;
    }
    while pos < stop {
        pos += 1;
        if !p.breakpoint_at(pos).is_null() {
            let travel = travel_between(p, pos - 1, pos);
            let phase = wrap_pi(p.breakpoint_at(pos - 1).phase() + travel);
            p.breakpoint_at_mut(pos).set_phase(phase);
        }
    }
}

/// Recomputes the phases of all breakpoints in a partial so that the
/// synthesized phases match the stored phases, anchored at the breakpoint
/// nearest `t` (whose stored phase is preserved).
pub fn fix_phase_at(p: &mut Partial, t: f64) {
    if p.len() < 2 {
        return;
    }
    fix_phase_before(p, t);
    fix_phase_after(p, t);
}

/// Fixes the phase travel between two times by adjusting the frequencies
/// and phases of the breakpoints between them.
///
/// The phases stored at `t1` and `t2` are trusted; nothing interesting is
/// assumed about the intervening phases, so their frequencies are altered
/// as little as possible (by a constant additive offset) to achieve the
/// correct total phase travel, and their phases are recomputed to match.
///
/// For partials that do not span the whole range, phases are simply
/// recomputed from the covered end of the range.
pub fn fix_phase_between(p: &mut Partial, mut tbeg: f64, mut tend: f64) {
    if tbeg > tend {
        std::mem::swap(&mut tbeg, &mut tend);
    }

    if p.end_time() < tend {
        fix_phase_after(p, tbeg);
    } else if p.start_time() > tbeg {
        fix_phase_before(p, tend);
    } else {
        let (Some(b), Some(e)) = (p.find_nearest(tbeg), p.find_nearest(tend)) else {
            return;
        };
        if e < b + 2 {
            debug!(
                "cannot fix phase between {} and {}, \
                 there are no breakpoints between those times",
                tbeg, tend
            );
            return;
        }

        // accumulate the actual phase travel over the span
        let mut travel = 0.0;
        for i in b..e {
            travel += travel_between(p, i, i + 1);
        }

        // the desired travel lands exactly on the stored phase at e
        let deviation =
            wrap_pi(p.breakpoint_at(e).phase() - (p.breakpoint_at(b).phase() + travel));
        let desired = travel + deviation;

        // The accumulated travel is the sum over segments of mean frequency
        // times duration. Perturbing every interior frequency additively by
        // delta changes that sum by delta * (tN + tN-1 - t1 - t0) / 2
        // (in radians, times 2 pi).
        let t0 = p.time_at(b);
        let t1 = p.time_at(b + 1);
        let tn = p.time_at(e);
        let tnm1 = p.time_at(e - 1);
        let delta = (2.0 * (desired - travel) / (tn + tnm1 - t1 - t0)) / (2.0 * PI);

        for i in (b + 1)..e {
            let f = p.breakpoint_at(i).frequency();
            p.breakpoint_at_mut(i).set_frequency(f + delta);
            let new_travel = travel_between(p, i - 1, i);
            let phase = wrap_pi(p.breakpoint_at(i - 1).phase() + new_travel);
            p.breakpoint_at_mut(i).set_phase(phase);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loris_model::Breakpoint;

    /// The wrapped phase error at each consecutive breakpoint pair.
    fn phase_errors(p: &Partial) -> Vec<f64> {
        (1..p.len())
            .map(|i| {
                let travel = phase_travel(
                    p.breakpoint_at(i - 1),
                    p.breakpoint_at(i),
                    p.time_at(i) - p.time_at(i - 1),
                );
                wrap_pi(p.breakpoint_at(i).phase() - (p.breakpoint_at(i - 1).phase() + travel))
            })
            .collect()
    }

    fn consistent_partial(freq: f64, n: usize, dt: f64) -> Partial {
        let mut p = Partial::new();
        let mut phase = 0.0;
        for i in 0..n {
            p.insert(i as f64 * dt, Breakpoint::new(freq, 0.5, 0.0, wrap_pi(phase)));
            phase += 2.0 * PI * freq * dt;
        }
        p
    }

    #[test]
    fn test_wrap_pi() {
        assert!((wrap_pi(3.0 * PI) - PI).abs() < 1e-12);
        assert!((wrap_pi(-3.0 * PI) - PI).abs() < 1e-12);
        assert!((wrap_pi(0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_consistent_partial_is_untouched_by_fix_frequency() {
        let mut p = consistent_partial(440.0, 10, 0.01);
        let before = p.clone();
        fix_frequency(&mut p, DEFAULT_MAX_FIX_PCT);
        for i in 0..p.len() {
            assert!(
                (p.breakpoint_at(i).frequency() - before.breakpoint_at(i).frequency()).abs()
                    < 1e-9
            );
        }
    }

    #[test]
    fn test_fix_frequency_reduces_phase_error() {
        let mut p = consistent_partial(440.0, 10, 0.01);
        // corrupt one phase by a small amount
        let bad = wrap_pi(p.breakpoint_at(5).phase() + 0.05);
        p.breakpoint_at_mut(5).set_phase(bad);
        fix_frequency(&mut p, DEFAULT_MAX_FIX_PCT);
        for err in phase_errors(&p) {
            assert!(err.abs() < 1e-9, "residual phase error {}", err);
        }
    }

    #[test]
    fn test_fix_frequency_clamps_large_errors() {
        let mut p = consistent_partial(440.0, 3, 0.001);
        // a phase error far too large to absorb within 0.2% of 440 Hz
        let new_phase = wrap_pi(p.breakpoint_at(1).phase() + 3.0);
        p.breakpoint_at_mut(1).set_phase(new_phase);
        fix_frequency(&mut p, DEFAULT_MAX_FIX_PCT);
        let f = p.breakpoint_at(1).frequency();
        assert!(f <= 440.0 * 1.002 + 1e-9 && f >= 440.0 * 0.998 - 1e-9);
        // phases were recomputed to agree with the clamped frequencies
        for err in phase_errors(&p) {
            assert!(err.abs() < 1e-9);
        }
    }

    #[test]
    fn test_fix_phase_after_recomputes_forward() {
        let mut p = consistent_partial(100.0, 5, 0.01);
        p.breakpoint_at_mut(2).set_phase(1.0);
        p.breakpoint_at_mut(3).set_phase(2.0);
        p.breakpoint_at_mut(4).set_phase(3.0);
        fix_phase_after(&mut p, 0.02);
        let errs = phase_errors(&p);
        assert!(errs[2].abs() < 1e-9);
        assert!(errs[3].abs() < 1e-9);
    }

    #[test]
    fn test_fix_phase_before_stops_at_null() {
        let mut p = Partial::new();
        p.insert(0.0, Breakpoint::new(100.0, 0.5, 0.0, 0.0));
        p.insert(0.1, Breakpoint::new(100.0, 0.0, 0.0, 0.5)); // null reset
        p.insert(0.2, Breakpoint::new(100.0, 0.5, 0.0, 0.1));
        p.insert(0.3, Breakpoint::new(100.0, 0.5, 0.0, 0.2));
        fix_phase_before(&mut p, 0.3);
        // the null and everything after it are mutually consistent
        let errs = phase_errors(&p);
        assert!(errs[1].abs() < 1e-9);
        // the anchor phase at t = 0.3 is untouched
        assert!((p.breakpoint_at(3).phase() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_fix_phase_between_distributes_offset() {
        let mut p = consistent_partial(200.0, 6, 0.01);
        // corrupt the interior phases, keeping the ends trusted
        for i in 1..5 {
            let ph = p.breakpoint_at(i).phase();
            p.breakpoint_at_mut(i).set_phase(wrap_pi(ph + 0.3));
        }
        let phase_b = p.breakpoint_at(0).phase();
        let phase_e = p.breakpoint_at(5).phase();
        fix_phase_between(&mut p, 0.0, 0.05);
        // end phases are preserved
        assert!((p.breakpoint_at(0).phase() - phase_b).abs() < 1e-12);
        assert!((p.breakpoint_at(5).phase() - phase_e).abs() < 1e-12);
        // interior breakpoints are consistent with their frequencies
        let errs = phase_errors(&p);
        for err in &errs[..errs.len() - 1] {
            assert!(err.abs() < 1e-9);
        }
        // and the final travel lands on the stored end phase
        assert!(errs[errs.len() - 1].abs() < 1e-9);
    }

    #[test]
    fn test_fix_phase_between_partial_not_spanning() {
        let mut p = consistent_partial(100.0, 4, 0.01);
        p.breakpoint_at_mut(2).set_phase(0.7);
        // the partial ends at 0.03, well before tend
        fix_phase_between(&mut p, 0.0, 1.0);
        let errs = phase_errors(&p);
        assert!(errs.iter().all(|e| e.abs() < 1e-9));
    }
}
