//! Distillation: one partial per non-zero label.

use std::collections::BTreeMap;

use log::debug;
use loris_model::{Error, Partial, PartialList, Result};

/// Collapses all partials sharing a non-zero label into a single
/// representative partial per label.
///
/// Where same-label partials overlap in time, the louder one carries the
/// representative envelope at each instant and the energy of the others is
/// absorbed as noise. Where they are disjoint, the representative fades out
/// and back in across the gap, leaving at least `silent_time` of true
/// silence. Unlabeled partials are preserved, unmodified, at the end of the
/// collection.
#[derive(Debug, Clone)]
pub struct Distiller {
    fade_time: f64,
    silent_time: f64,
}

impl Default for Distiller {
    fn default() -> Self {
        Self {
            fade_time: Self::DEFAULT_FADE_TIME,
            silent_time: Self::DEFAULT_SILENT_TIME,
        }
    }
}

impl Distiller {
    /// Default fade time: 1 ms.
    pub const DEFAULT_FADE_TIME: f64 = 0.001;
    /// Default minimum silence inside a gap: 0.1 ms.
    pub const DEFAULT_SILENT_TIME: f64 = 0.0001;

    /// Creates a distiller with the given fade and silent times (seconds).
    ///
    /// # Errors
    /// `InvalidArgument` if either time is not positive.
    pub fn new(fade_time: f64, silent_time: f64) -> Result<Self> {
        if fade_time <= 0.0 {
            return Err(Error::invalid_argument(
                "distiller fade time must be positive",
            ));
        }
        if silent_time <= 0.0 {
            return Err(Error::invalid_argument(
                "distiller silent time must be positive",
            ));
        }
        Ok(Self {
            fade_time,
            silent_time,
        })
    }

    /// Distills `partials` in place: afterwards the list holds one partial
    /// per non-zero label (in ascending label order) followed by the
    /// untouched unlabeled partials.
    ///
    /// Returns the index of the first unlabeled partial (== `partials.len()`
    /// if every partial was labeled).
    pub fn distill(&self, partials: &mut PartialList) -> usize {
        let mut groups: BTreeMap<i32, Vec<Partial>> = BTreeMap::new();
        let mut unlabeled: Vec<Partial> = Vec::new();
        for p in std::mem::take(partials) {
            if p.label() != 0 {
                groups.entry(p.label()).or_default().push(p);
            } else {
                unlabeled.push(p);
            }
        }

        for (label, group) in groups {
            debug!("distilling {} partials with label {}", group.len(), label);
            partials.push(self.distill_group(label, group));
        }

        let first_unlabeled = partials.len();
        for p in unlabeled {
            partials.push(p);
        }
        first_unlabeled
    }

    /// Merges one label group into a single partial.
    fn distill_group(&self, label: i32, mut group: Vec<Partial>) -> Partial {
        group.retain(|p| !p.is_empty());
        if group.len() <= 1 {
            let mut p = group.pop().unwrap_or_default();
            p.set_label(label);
            return p;
        }

        // merge the group's time spans into maximal covered intervals;
        // gaps too short to hold both fades and the silence are bridged
        let min_gap = 2.0 * self.fade_time + self.silent_time;
        let mut spans: Vec<(f64, f64)> = group
            .iter()
            .map(|p| (p.start_time(), p.end_time()))
            .collect();
        spans.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut intervals: Vec<(f64, f64)> = Vec::new();
        for (start, end) in spans {
            match intervals.last_mut() {
                Some((_, cur_end)) if start <= *cur_end + min_gap => {
                    *cur_end = cur_end.max(end);
                }
                _ => intervals.push((start, end)),
            }
        }

        // candidate breakpoint times: every breakpoint of every member
        let mut times: Vec<f64> = group
            .iter()
            .flat_map(|p| p.iter().map(|(t, _)| t))
            .collect();
        times.sort_by(f64::total_cmp);
        times.dedup_by(|a, b| (*a - *b).abs() < 1e-9);

        let num_intervals = intervals.len();
        let mut distilled = Partial::new();
        distilled.set_label(label);

        for (i, (start, end)) in intervals.into_iter().enumerate() {
            let mut segment = Partial::new();
            for &t in times.iter().filter(|&&t| t >= start && t <= end) {
                // the loudest partial at this instant is the representative
                let Some(winner) = group
                    .iter()
                    .max_by(|a, b| a.amplitude_at(t).total_cmp(&b.amplitude_at(t)))
                else {
                    continue;
                };
                let mut bp = winner.parameters_at(t);

                // everything else audible here is absorbed as noise
                let absorbed: f64 = group
                    .iter()
                    .filter(|p| !std::ptr::eq(*p, winner))
                    .map(|p| {
                        let a = p.amplitude_at(t);
                        a * a
                    })
                    .sum();
                if absorbed > 0.0 && !bp.is_null() {
                    bp.add_noise_energy(absorbed);
                }
                segment.insert(t, bp);
            }

            // fade across the gaps between segments
            if i > 0 {
                let _ = segment.fade_in(self.fade_time);
            }
            if i + 1 < num_intervals {
                let _ = segment.fade_out(self.fade_time);
            }
            for (t, bp) in segment.iter() {
                distilled.insert(t, *bp);
            }
        }
        distilled
    }
}
