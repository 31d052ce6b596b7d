//! Scalar transforms over partial parameters.
//!
//! Each transform evaluates an envelope at every breakpoint time and edits
//! the breakpoint in place. Time-warping transforms (crop, shift, dilate)
//! rebuild the partial, preserving the strictly increasing time invariant.

use loris_model::{Envelope, Error, Marker, Partial, PartialList, Result};

/// Scales breakpoint amplitudes by a time-varying factor.
pub fn scale_amplitude(p: &mut Partial, env: &dyn Envelope) {
    for (t, bp) in p.iter_mut() {
        bp.set_amplitude(bp.amplitude() * env.value_at(t));
    }
}

/// Scales breakpoint bandwidths by a time-varying factor.
pub fn scale_bandwidth(p: &mut Partial, env: &dyn Envelope) {
    for (t, bp) in p.iter_mut() {
        bp.set_bandwidth(bp.bandwidth() * env.value_at(t));
    }
}

/// Scales breakpoint frequencies by a time-varying factor.
pub fn scale_frequency(p: &mut Partial, env: &dyn Envelope) {
    for (t, bp) in p.iter_mut() {
        bp.set_frequency(bp.frequency() * env.value_at(t));
    }
}

/// Scales the noise:sinusoid energy ratio by a time-varying factor.
///
/// Unlike [`scale_bandwidth`], this operates in ratio space, where values
/// greater than 1 are meaningful; a bandwidth of 1 (all noise) is a fixed
/// point.
pub fn scale_noise_ratio(p: &mut Partial, env: &dyn Envelope) {
    for (t, bp) in p.iter_mut() {
        let bw = bp.bandwidth();
        let new_bw = if bw < 1.0 {
            let ratio = bw / (1.0 - bw) * env.value_at(t);
            ratio / (1.0 + ratio)
        } else {
            1.0
        };
        bp.set_bandwidth(new_bw);
    }
}

/// Shifts breakpoint pitches by a time-varying offset in cents (1/100 of a
/// half step).
pub fn shift_pitch(p: &mut Partial, cents_env: &dyn Envelope) {
    for (t, bp) in p.iter_mut() {
        let scale = 2f64.powf(0.01 * cents_env.value_at(t) / 12.0);
        bp.set_frequency(bp.frequency() * scale);
    }
}

/// Shifts all breakpoint times by a constant offset (seconds).
pub fn shift_time(p: &mut Partial, offset: f64) {
    let mut result = Partial::new();
    result.set_label(p.label());
    for (t, bp) in p.iter() {
        result.insert(t + offset, *bp);
    }
    *p = result;
}

/// Trims a partial to the window `[min_time, max_time]`, inserting
/// interpolated breakpoints at the boundaries where cropping occurs.
pub fn crop(p: &mut Partial, min_time: f64, max_time: f64) {
    // crop the beginning
    let pos = p.find_after(min_time);
    if pos != 0 && !p.is_empty() {
        let bp = p.parameters_at(min_time);
        let at = p.insert(min_time, bp);
        p.erase_range(0, at);
    }

    // crop the end
    let pos = p.find_after(max_time);
    if pos != p.len() && !p.is_empty() {
        let bp = p.parameters_at(max_time);
        let at = p.insert(max_time, bp);
        p.erase_range(at + 1, p.len());
    }
}

/// Applies one of the scalar transforms to every partial in the list.
macro_rules! list_variant {
    ($(#[$doc:meta])* $name:ident, $single:ident) => {
        $(#[$doc])*
        pub fn $name(partials: &mut PartialList, env: &dyn Envelope) {
            for p in partials.iter_mut() {
                $single(p, env);
            }
        }
    };
}

list_variant!(
    /// Scales amplitudes of every partial in the list.
    scale_amplitude_all,
    scale_amplitude
);
list_variant!(
    /// Scales bandwidths of every partial in the list.
    scale_bandwidth_all,
    scale_bandwidth
);
list_variant!(
    /// Scales frequencies of every partial in the list.
    scale_frequency_all,
    scale_frequency
);
list_variant!(
    /// Scales noise ratios of every partial in the list.
    scale_noise_ratio_all,
    scale_noise_ratio
);
list_variant!(
    /// Shifts pitches of every partial in the list.
    shift_pitch_all,
    shift_pitch
);

/// Shifts all breakpoint times of every partial by a constant offset.
pub fn shift_time_all(partials: &mut PartialList, offset: f64) {
    for p in partials.iter_mut() {
        shift_time(p, offset);
    }
}

/// Crops every partial to the window, dropping partials that end up with
/// no breakpoints inside it.
pub fn crop_all(partials: &mut PartialList, min_time: f64, max_time: f64) {
    for p in partials.iter_mut() {
        if p.start_time() > max_time || p.end_time() < min_time {
            *p = Partial::new();
        } else {
            crop(p, min_time, max_time);
        }
    }
    partials.retain(|p| !p.is_empty());
}

/// A piecewise-linear time warp anchored at corresponding feature times.
///
/// Breakpoint times between consecutive initial feature times are mapped
/// linearly onto the corresponding target interval; outside the anchors,
/// times are shifted by the offset of the nearest anchor.
#[derive(Debug, Clone)]
pub struct Dilator {
    initial: Vec<f64>,
    target: Vec<f64>,
}

impl Dilator {
    /// Creates a dilator from corresponding initial and target feature
    /// time vectors.
    ///
    /// # Errors
    /// `InvalidArgument` if the vectors differ in length, are empty, or the
    /// initial times are not strictly increasing.
    pub fn new(initial: &[f64], target: &[f64]) -> Result<Self> {
        if initial.is_empty() || initial.len() != target.len() {
            return Err(Error::invalid_argument(
                "dilation requires matching, non-empty initial and target \
                 time vectors",
            ));
        }
        if initial.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::invalid_argument(
                "dilation initial times must be strictly increasing",
            ));
        }
        if target.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::invalid_argument(
                "dilation target times must be non-decreasing",
            ));
        }
        Ok(Self {
            initial: initial.to_vec(),
            target: target.to_vec(),
        })
    }

    /// Maps a single time through the warp.
    pub fn warp(&self, t: f64) -> f64 {
        let n = self.initial.len();
        if t <= self.initial[0] {
            return t + (self.target[0] - self.initial[0]);
        }
        if t >= self.initial[n - 1] {
            return t + (self.target[n - 1] - self.initial[n - 1]);
        }
        let seg = self.initial.partition_point(|&x| x <= t);
        let (i0, i1) = (self.initial[seg - 1], self.initial[seg]);
        let (t0, t1) = (self.target[seg - 1], self.target[seg]);
        let alpha = (t - i0) / (i1 - i0);
        t0 + alpha * (t1 - t0)
    }

    /// Warps the breakpoint times of a partial. Monotonicity of time is
    /// preserved; breakpoints collapsed onto the same instant by a
    /// zero-length target segment coalesce.
    pub fn dilate(&self, p: &mut Partial) {
        let mut result = Partial::new();
        result.set_label(p.label());
        for (t, bp) in p.iter() {
            result.insert(self.warp(t), *bp);
        }
        *p = result;
    }

    /// Warps every partial in the list.
    pub fn dilate_all(&self, partials: &mut PartialList) {
        for p in partials.iter_mut() {
            self.dilate(p);
        }
    }

    /// Warps marker times.
    pub fn dilate_markers(&self, markers: &mut [Marker]) {
        for m in markers.iter_mut() {
            m.set_time(self.warp(m.time()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loris_model::{Breakpoint, LinearEnvelope};
    use pretty_assertions::assert_eq;

    fn partial() -> Partial {
        let mut p = Partial::new();
        p.insert(0.0, Breakpoint::new(440.0, 0.5, 0.2, 0.0));
        p.insert(1.0, Breakpoint::new(440.0, 0.5, 0.2, 0.0));
        p.insert(2.0, Breakpoint::new(440.0, 0.5, 0.2, 0.0));
        p
    }

    #[test]
    fn test_amplitude_scale_round_trip() {
        let mut p = partial();
        scale_amplitude(&mut p, &LinearEnvelope::constant(2.0));
        assert_eq!(p.breakpoint_at(0).amplitude(), 1.0);
        scale_amplitude(&mut p, &LinearEnvelope::constant(0.5));
        assert!((p.breakpoint_at(0).amplitude() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_pitch_shift_round_trip() {
        let mut p = partial();
        shift_pitch(&mut p, &LinearEnvelope::constant(100.0));
        // 100 cents up is one equal-tempered half step
        assert!((p.breakpoint_at(0).frequency() - 440.0 * 2f64.powf(1.0 / 12.0)).abs() < 1e-9);
        shift_pitch(&mut p, &LinearEnvelope::constant(-100.0));
        assert!((p.breakpoint_at(0).frequency() - 440.0).abs() < 1e-9);
    }

    #[test]
    fn test_time_shift_round_trip() {
        let mut p = partial();
        shift_time(&mut p, 0.25);
        assert_eq!(p.start_time(), 0.25);
        shift_time(&mut p, -0.25);
        assert_eq!(p.start_time(), 0.0);
        assert_eq!(p.len(), 3);
    }

    #[test]
    fn test_noise_ratio_scaling() {
        let mut p = partial();
        // bandwidth 0.2 is ratio 0.25; doubled is 0.5, so bandwidth 1/3
        scale_noise_ratio(&mut p, &LinearEnvelope::constant(2.0));
        assert!((p.breakpoint_at(0).bandwidth() - 1.0 / 3.0).abs() < 1e-12);

        // all-noise stays all-noise
        let mut q = Partial::new();
        q.insert(0.0, Breakpoint::new(440.0, 0.5, 1.0, 0.0));
        scale_noise_ratio(&mut q, &LinearEnvelope::constant(0.5));
        assert_eq!(q.breakpoint_at(0).bandwidth(), 1.0);
    }

    #[test]
    fn test_crop_inserts_boundary_breakpoints() {
        let mut p = partial();
        crop(&mut p, 0.5, 1.5);
        assert_eq!(p.start_time(), 0.5);
        assert_eq!(p.end_time(), 1.5);
        assert_eq!(p.len(), 3);
        assert!((p.amplitude_at(1.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_crop_all_drops_outside_partials() {
        let mut outside = Partial::new();
        outside.insert(5.0, Breakpoint::new(100.0, 0.5, 0.0, 0.0));
        outside.insert(6.0, Breakpoint::new(100.0, 0.5, 0.0, 0.0));
        let mut partials: PartialList = vec![partial(), outside].into_iter().collect();
        crop_all(&mut partials, 0.0, 2.0);
        assert_eq!(partials.len(), 1);
    }

    #[test]
    fn test_dilate_piecewise() {
        let d = Dilator::new(&[1.0, 2.0], &[1.0, 4.0]).unwrap();
        assert_eq!(d.warp(1.5), 2.5);
        // outside the anchors times shift by the boundary offset
        assert_eq!(d.warp(0.5), 0.5);
        assert_eq!(d.warp(3.0), 5.0);

        let mut p = partial();
        d.dilate(&mut p);
        let times: Vec<f64> = p.iter().map(|(t, _)| t).collect();
        assert_eq!(times, vec![0.0, 1.0, 4.0]);
    }

    #[test]
    fn test_dilate_markers() {
        let d = Dilator::new(&[0.0, 1.0], &[0.0, 2.0]).unwrap();
        let mut markers = vec![Marker::new(0.5, "attack")];
        d.dilate_markers(&mut markers);
        assert_eq!(markers[0].time(), 1.0);
    }

    #[test]
    fn test_dilator_invalid_inputs() {
        assert!(Dilator::new(&[], &[]).is_err());
        assert!(Dilator::new(&[0.0, 1.0], &[0.0]).is_err());
        assert!(Dilator::new(&[1.0, 1.0], &[0.0, 2.0]).is_err());
    }
}
