//! Resampling of partial envelopes onto a uniform time grid.
//!
//! Converts reassigned partial envelopes into conventional additive
//! envelopes with data points at regular intervals. The benefits of
//! reassigned analysis are not lost: the elimination of unreliable data and
//! the reduction of temporal smearing are reflected in the resampled data.

use log::debug;
use loris_model::{Error, Partial, PartialList, Result};

use crate::phasefix::{fix_frequency, DEFAULT_MAX_FIX_PCT};

/// Imposes a uniform breakpoint time grid on partials.
///
/// In *sparse* mode (the default), breakpoint times are quantized to
/// multiples of the sampling interval, keeping only multiples near original
/// breakpoint times. In *dense* mode a breakpoint is produced at every
/// multiple of the interval across the partial's span. If phase correction
/// is enabled (the default), frequencies are altered slightly afterwards to
/// match the resampled phases as nearly as possible, and phases are updated
/// to agree with the frequencies.
#[derive(Debug, Clone)]
pub struct Resampler {
    interval: f64,
    dense: bool,
    phase_correct: bool,
}

impl Resampler {
    /// Creates a sparse, phase-correcting resampler with the given
    /// sampling interval in seconds.
    ///
    /// # Errors
    /// `InvalidArgument` if `interval` is not positive.
    pub fn new(interval: f64) -> Result<Self> {
        if interval <= 0.0 {
            return Err(Error::invalid_argument(
                "resampler sample interval must be positive",
            ));
        }
        Ok(Self {
            interval,
            dense: false,
            phase_correct: true,
        })
    }

    /// Selects dense (true) or sparse (false) resampling.
    pub fn set_dense(&mut self, dense: bool) {
        self.dense = dense;
    }

    /// Enables or disables frequency/phase correction after resampling.
    pub fn set_phase_correct(&mut self, phase_correct: bool) {
        self.phase_correct = phase_correct;
    }

    /// Resamples a partial in place.
    pub fn resample(&self, p: &mut Partial) {
        if p.is_empty() {
            return;
        }
        debug!(
            "resampling partial labeled {} having {} breakpoints",
            p.label(),
            p.len()
        );
        if self.dense {
            self.resample_dense(p);
        } else {
            self.resample_sparse(p);
        }
        debug!("resampled partial has {} breakpoints", p.len());

        if self.phase_correct {
            fix_frequency(p, DEFAULT_MAX_FIX_PCT);
        }
    }

    /// Resamples every partial in the list in place.
    pub fn resample_all(&self, partials: &mut PartialList) {
        for p in partials.iter_mut() {
            self.resample(p);
        }
    }

    /// Dense resampling: one breakpoint at every multiple of the interval
    /// from the multiple nearest the partial's start time through the
    /// multiple nearest its end time.
    fn resample_dense(&self, p: &mut Partial) {
        let mut newp = Partial::new();
        newp.set_label(p.label());

        let first_step = (0.5 + p.start_time() / self.interval).floor();
        let stop_time = p.end_time() + 0.5 * self.interval;

        let mut k = 0u64;
        loop {
            let t = (first_step + k as f64) * self.interval;
            if t >= stop_time {
                break;
            }
            insert_resampled_at(&mut newp, p, t, self.interval);
            k += 1;
        }

        *p = newp;
    }

    /// Sparse resampling: multiples of the interval are kept only when a
    /// source breakpoint lies within half an interval of them. Skipping
    /// steps can introduce interpolation error; when it does, the skipped
    /// steps adjacent to an insertion are inserted retroactively.
    fn resample_sparse(&self, p: &mut Partial) {
        let mut newp = Partial::new();
        newp.set_label(p.label());

        let halfstep = 0.5 * self.interval;
        let mut curtime = 0.0;
        let mut skipped_steps = 0u32;
        let mut prev_insert_time = 0.0;

        let mut pos = 0;
        while pos < p.len() {
            let bpt = p.time_at(pos);
            if bpt < curtime - halfstep {
                // breakpoint is behind the grid, move on
                pos += 1;
            } else if curtime < bpt - halfstep {
                // no breakpoint near this quantization step
                curtime += self.interval;
                skipped_steps += 1;
            } else {
                insert_resampled_at(&mut newp, p, curtime, self.interval);

                // repair errors introduced by skipping steps
                if skipped_steps > 0 && check_error_at(&newp, p, curtime - self.interval, self.interval)
                {
                    insert_resampled_at(&mut newp, p, curtime - self.interval, self.interval);
                }
                if skipped_steps > 1
                    && check_error_at(&newp, p, prev_insert_time + self.interval, self.interval)
                {
                    insert_resampled_at(&mut newp, p, prev_insert_time + self.interval, self.interval);
                }

                prev_insert_time = curtime;
                skipped_steps = 0;
                pos += 1;
                curtime += self.interval;
            }
        }

        *p = newp;
    }
}

/// Inserts a breakpoint resampled from `p` at `curtime` into `newp`.
fn insert_resampled_at(newp: &mut Partial, p: &Partial, curtime: f64, _interval: f64) {
    let mut newbp = p.parameters_at(curtime);

    // hold the boundary amplitude at end steps to reduce error at the ends
    if curtime < p.start_time() {
        newbp.set_amplitude(p.first().map_or(0.0, |bp| bp.amplitude()));
    } else if curtime > p.end_time() {
        newbp.set_amplitude(p.last().map_or(0.0, |bp| bp.amplitude()));
    }

    newp.insert(curtime, newbp);
}

/// Returns true if the resampled envelope deviates from the source by more
/// than the tolerances (amplitude 1%, frequency 1%, bandwidth 10%) at the
/// given time.
fn check_error_at(newp: &Partial, p: &Partial, time: f64, interval: f64) -> bool {
    // never insert extra breakpoints past the ends of the partial
    if time < p.start_time() || time > p.end_time() {
        return false;
    }

    const EPS: f64 = 1e-6;
    let original = p.parameters_at_faded(time, interval);
    let resampled = newp.parameters_at(time);

    let amp_err =
        (original.amplitude() - resampled.amplitude()).abs() / (original.amplitude() + EPS);
    if amp_err > 0.01 {
        return true;
    }

    let freq_err = (original.frequency() - resampled.frequency()).abs() / original.frequency();
    if freq_err > 0.01 {
        return true;
    }

    let bw_err =
        (original.bandwidth() - resampled.bandwidth()).abs() / (original.bandwidth() + EPS);
    bw_err > 0.1
}
