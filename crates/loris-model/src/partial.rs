//! A labeled, time-ordered sequence of breakpoints.

use std::f64::consts::PI;

use crate::{Breakpoint, Error, Result};

/// A partial: a finite ordered mapping from strictly increasing time
/// (seconds) to [`Breakpoint`], plus an integer label (0 = unlabeled).
///
/// Between consecutive breakpoints, frequency, amplitude, and bandwidth are
/// linearly interpolated; phase is the earlier breakpoint's phase advanced by
/// the integral of the interpolated frequency. Before the first breakpoint
/// and after the last, the partial is null (zero amplitude) apart from a
/// short linear fade. A partial with no breakpoints is a *dummy*: it renders
/// nothing but is a valid morph operand.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Partial {
    label: i32,
    points: Vec<(f64, Breakpoint)>,
}

impl Partial {
    /// The default fade time (seconds) used when evaluating a partial's
    /// envelope outside the span of its breakpoints.
    pub const SHORTEST_SAFE_FADE_TIME: f64 = 0.001;

    /// Creates an empty (dummy) partial with label 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// This partial's label. 0 means unlabeled.
    pub fn label(&self) -> i32 {
        self.label
    }

    /// Sets this partial's label.
    pub fn set_label(&mut self, label: i32) {
        self.label = label;
    }

    /// Number of breakpoints.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Returns true if this partial is a dummy (no breakpoints).
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Time of the first breakpoint, or 0 for a dummy partial.
    pub fn start_time(&self) -> f64 {
        self.points.first().map_or(0.0, |(t, _)| *t)
    }

    /// Time of the last breakpoint, or 0 for a dummy partial.
    pub fn end_time(&self) -> f64 {
        self.points.last().map_or(0.0, |(t, _)| *t)
    }

    /// Duration in seconds (0 for dummies and single breakpoints).
    pub fn duration(&self) -> f64 {
        self.end_time() - self.start_time()
    }

    /// The first breakpoint, if any.
    pub fn first(&self) -> Option<&Breakpoint> {
        self.points.first().map(|(_, bp)| bp)
    }

    /// The last breakpoint, if any.
    pub fn last(&self) -> Option<&Breakpoint> {
        self.points.last().map(|(_, bp)| bp)
    }

    /// Time of the breakpoint at `index`.
    pub fn time_at(&self, index: usize) -> f64 {
        self.points[index].0
    }

    /// The breakpoint at `index`.
    pub fn breakpoint_at(&self, index: usize) -> &Breakpoint {
        &self.points[index].1
    }

    /// Mutable access to the breakpoint at `index`.
    ///
    /// Times are immutable through this path, so the ordering invariant
    /// cannot be broken.
    pub fn breakpoint_at_mut(&mut self, index: usize) -> &mut Breakpoint {
        &mut self.points[index].1
    }

    /// Iterates over `(time, breakpoint)` pairs in time order.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &Breakpoint)> {
        self.points.iter().map(|(t, bp)| (*t, bp))
    }

    /// Iterates mutably over `(time, breakpoint)` pairs in time order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (f64, &mut Breakpoint)> {
        self.points.iter_mut().map(|(t, bp)| (*t, bp))
    }

    /// Inserts a breakpoint at the given time, replacing any existing
    /// breakpoint at exactly that time. Returns the position of the
    /// inserted breakpoint.
    pub fn insert(&mut self, time: f64, breakpoint: Breakpoint) -> usize {
        match self
            .points
            .binary_search_by(|(t, _)| t.total_cmp(&time))
        {
            Ok(pos) => {
                self.points[pos].1 = breakpoint;
                pos
            }
            Err(pos) => {
                self.points.insert(pos, (time, breakpoint));
                pos
            }
        }
    }

    /// Removes the breakpoint at `index`.
    pub fn erase(&mut self, index: usize) {
        self.points.remove(index);
    }

    /// Removes the breakpoints in `[start, end)`.
    pub fn erase_range(&mut self, start: usize, end: usize) {
        self.points.drain(start..end);
    }

    /// Position of the first breakpoint with time strictly greater than `t`
    /// (== `len()` if there is none).
    pub fn find_after(&self, t: f64) -> usize {
        self.points.partition_point(|(pt, _)| *pt <= t)
    }

    /// Position of the breakpoint whose time is nearest to `t`, or `None`
    /// for a dummy partial.
    pub fn find_nearest(&self, t: f64) -> Option<usize> {
        if self.points.is_empty() {
            return None;
        }
        let after = self.find_after(t);
        if after == 0 {
            return Some(0);
        }
        if after == self.points.len() {
            return Some(self.points.len() - 1);
        }
        let before = after - 1;
        if t - self.points[before].0 <= self.points[after].0 - t {
            Some(before)
        } else {
            Some(after)
        }
    }

    /// Interpolated envelope parameters at time `t`, using the default
    /// fade time at the partial's ends.
    pub fn parameters_at(&self, t: f64) -> Breakpoint {
        self.parameters_at_faded(t, Self::SHORTEST_SAFE_FADE_TIME)
    }

    /// Interpolated envelope parameters at time `t`.
    ///
    /// Outside the span of the breakpoints, amplitude ramps linearly to zero
    /// over `fade_time` seconds while frequency and bandwidth hold the
    /// boundary values and phase is extrapolated at the boundary frequency.
    pub fn parameters_at_faded(&self, t: f64, fade_time: f64) -> Breakpoint {
        if self.points.is_empty() {
            return Breakpoint::default();
        }

        let after = self.find_after(t);
        if after == 0 {
            let (t0, bp0) = &self.points[0];
            let dt = t0 - t;
            let amp = if fade_time > 0.0 && dt < fade_time {
                bp0.amplitude() * (1.0 - dt / fade_time)
            } else {
                0.0
            };
            let mut bp = *bp0;
            bp.set_amplitude(amp);
            bp.set_phase(bp0.phase() - 2.0 * PI * bp0.frequency() * dt);
            bp
        } else if after == self.points.len() {
            let (tn, bpn) = &self.points[self.points.len() - 1];
            let dt = t - tn;
            let amp = if fade_time > 0.0 && dt < fade_time {
                bpn.amplitude() * (1.0 - dt / fade_time)
            } else {
                0.0
            };
            let mut bp = *bpn;
            bp.set_amplitude(amp);
            bp.set_phase(bpn.phase() + 2.0 * PI * bpn.frequency() * dt);
            bp
        } else {
            let (t0, bp0) = &self.points[after - 1];
            let (t1, bp1) = &self.points[after];
            let alpha = (t - t0) / (t1 - t0);
            let freq = (1.0 - alpha) * bp0.frequency() + alpha * bp1.frequency();
            let amp = (1.0 - alpha) * bp0.amplitude() + alpha * bp1.amplitude();
            let bw = (1.0 - alpha) * bp0.bandwidth() + alpha * bp1.bandwidth();
            // phase is the integral of the linearly interpolated frequency
            let phase = bp0.phase() + 2.0 * PI * (t - t0) * 0.5 * (bp0.frequency() + freq);
            Breakpoint::new(freq, amp, bw, phase)
        }
    }

    /// Interpolated frequency at time `t` in Hz.
    pub fn frequency_at(&self, t: f64) -> f64 {
        self.parameters_at(t).frequency()
    }

    /// Interpolated amplitude at time `t`.
    pub fn amplitude_at(&self, t: f64) -> f64 {
        self.parameters_at(t).amplitude()
    }

    /// Interpolated bandwidth at time `t`.
    pub fn bandwidth_at(&self, t: f64) -> f64 {
        self.parameters_at(t).bandwidth()
    }

    /// Interpolated phase at time `t` in radians.
    pub fn phase_at(&self, t: f64) -> f64 {
        self.parameters_at(t).phase()
    }

    /// Inserts a null breakpoint `dt` seconds before the first breakpoint,
    /// guaranteeing a clean onset under synthesis. No-op for dummies and
    /// partials that already begin with a null breakpoint.
    pub fn fade_in(&mut self, dt: f64) -> Result<()> {
        if dt <= 0.0 {
            return Err(Error::invalid_argument("fade time must be positive"));
        }
        if let Some((t0, bp0)) = self.points.first().copied() {
            if !bp0.is_null() {
                let mut null = bp0;
                null.set_amplitude(0.0);
                null.set_phase(bp0.phase() - 2.0 * PI * bp0.frequency() * dt);
                self.insert(t0 - dt, null);
            }
        }
        Ok(())
    }

    /// Inserts a null breakpoint `dt` seconds after the last breakpoint,
    /// guaranteeing a clean offset under synthesis. No-op for dummies and
    /// partials that already end with a null breakpoint.
    pub fn fade_out(&mut self, dt: f64) -> Result<()> {
        if dt <= 0.0 {
            return Err(Error::invalid_argument("fade time must be positive"));
        }
        if let Some((tn, bpn)) = self.points.last().copied() {
            if !bpn.is_null() {
                let mut null = bpn;
                null.set_amplitude(0.0);
                null.set_phase(bpn.phase() + 2.0 * PI * bpn.frequency() * dt);
                self.insert(tn + dt, null);
            }
        }
        Ok(())
    }

    /// Absorbs another partial's energy as noise, wherever the other
    /// partial has energy at this partial's breakpoint times.
    pub fn absorb(&mut self, other: &Partial) {
        for (t, bp) in self.points.iter_mut().map(|(t, bp)| (*t, bp)) {
            let amp = other.amplitude_at(t);
            if amp > 0.0 {
                bp.add_noise_energy(amp * amp);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ramp_partial() -> Partial {
        let mut p = Partial::new();
        p.insert(0.0, Breakpoint::new(100.0, 0.0, 0.0, 0.0));
        p.insert(1.0, Breakpoint::new(200.0, 1.0, 0.5, 0.0));
        p
    }

    #[test]
    fn test_insert_keeps_time_order() {
        let mut p = Partial::new();
        p.insert(1.0, Breakpoint::new(2.0, 0.2, 0.0, 0.0));
        p.insert(0.0, Breakpoint::new(1.0, 0.1, 0.0, 0.0));
        p.insert(2.0, Breakpoint::new(3.0, 0.3, 0.0, 0.0));
        let times: Vec<f64> = p.iter().map(|(t, _)| t).collect();
        assert_eq!(times, vec![0.0, 1.0, 2.0]);
        assert_eq!(p.start_time(), 0.0);
        assert_eq!(p.end_time(), 2.0);
        assert_eq!(p.duration(), 2.0);
    }

    #[test]
    fn test_insert_replaces_at_equal_time() {
        let mut p = Partial::new();
        p.insert(0.5, Breakpoint::new(100.0, 0.1, 0.0, 0.0));
        p.insert(0.5, Breakpoint::new(200.0, 0.2, 0.0, 0.0));
        assert_eq!(p.len(), 1);
        assert_eq!(p.breakpoint_at(0).frequency(), 200.0);
    }

    #[test]
    fn test_find_nearest() {
        let p = ramp_partial();
        assert_eq!(p.find_nearest(-1.0), Some(0));
        assert_eq!(p.find_nearest(0.4), Some(0));
        assert_eq!(p.find_nearest(0.6), Some(1));
        assert_eq!(p.find_nearest(5.0), Some(1));
        assert_eq!(Partial::new().find_nearest(0.0), None);
    }

    #[test]
    fn test_find_after() {
        let p = ramp_partial();
        assert_eq!(p.find_after(-0.5), 0);
        assert_eq!(p.find_after(0.0), 1);
        assert_eq!(p.find_after(0.5), 1);
        assert_eq!(p.find_after(1.0), 2);
    }

    #[test]
    fn test_interpolation_between_breakpoints() {
        let p = ramp_partial();
        let bp = p.parameters_at(0.5);
        assert!((bp.frequency() - 150.0).abs() < 1e-12);
        assert!((bp.amplitude() - 0.5).abs() < 1e-12);
        assert!((bp.bandwidth() - 0.25).abs() < 1e-12);
        // phase integrates the mean of 100 Hz and 125 Hz over half a second
        let expected = 2.0 * PI * 0.5 * 0.5 * (100.0 + 125.0);
        assert!((bp.phase() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_null_outside_span() {
        let p = ramp_partial();
        assert_eq!(p.amplitude_at(-1.0), 0.0);
        assert_eq!(p.amplitude_at(2.0), 0.0);
        // frequency holds the boundary value
        assert_eq!(p.frequency_at(-1.0), 100.0);
        assert_eq!(p.frequency_at(2.0), 200.0);
    }

    #[test]
    fn test_fade_at_ends() {
        let mut p = Partial::new();
        p.insert(1.0, Breakpoint::new(100.0, 0.8, 0.0, 0.0));
        // halfway into a 1 ms fade the amplitude is half the boundary value
        let amp = p
            .parameters_at_faded(1.0 + 0.0005, 0.001)
            .amplitude();
        assert!((amp - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_fade_in_out_insert_nulls() {
        let mut p = ramp_partial();
        // first breakpoint is already null, so fade_in leaves it alone
        p.fade_in(0.01).unwrap();
        assert_eq!(p.len(), 2);
        p.fade_out(0.01).unwrap();
        assert_eq!(p.len(), 3);
        assert_eq!(p.end_time(), 1.01);
        assert!(p.last().unwrap().is_null());
        assert!(p.fade_in(0.0).is_err());
    }

    #[test]
    fn test_absorb_adds_noise_energy() {
        let mut loud = Partial::new();
        loud.insert(0.0, Breakpoint::new(100.0, 1.0, 0.0, 0.0));
        loud.insert(1.0, Breakpoint::new(100.0, 1.0, 0.0, 0.0));
        let mut quiet = Partial::new();
        quiet.insert(0.0, Breakpoint::new(105.0, 0.5, 0.0, 0.0));
        quiet.insert(1.0, Breakpoint::new(105.0, 0.5, 0.0, 0.0));
        loud.absorb(&quiet);
        // total energy 1 + 0.25, one fifth of it noise
        let bp = loud.breakpoint_at(0);
        assert!((bp.amplitude() - 1.25_f64.sqrt()).abs() < 1e-12);
        assert!((bp.bandwidth() - 0.2).abs() < 1e-12);
    }
}
