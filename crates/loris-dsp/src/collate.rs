//! Fusion of unlabeled partials into the fewest non-overlapping partials.

use log::debug;
use loris_model::{max_label, Error, Partial, PartialList, Result};

/// Collates the unlabeled partials in a collection into the smallest number
/// of non-overlapping partials, by joining temporally disjoint partials end
/// to end.
///
/// Joined partials fade to zero at the end of the earlier partial and back
/// in at the onset of the later one; between the fades at least
/// `silent_time` of true silence remains. Collated partials are assigned
/// fresh labels above every pre-existing label and appear at the end of the
/// collection, so afterwards every partial is uniquely labeled.
///
/// The greedy placement over onset-sorted partials yields the minimum
/// possible number of collated partials.
#[derive(Debug, Clone)]
pub struct Collator {
    fade_time: f64,
    silent_time: f64,
}

impl Default for Collator {
    fn default() -> Self {
        Self {
            fade_time: Self::DEFAULT_FADE_TIME,
            silent_time: Self::DEFAULT_SILENT_TIME,
        }
    }
}

impl Collator {
    /// Default fade time: 1 ms.
    pub const DEFAULT_FADE_TIME: f64 = 0.001;
    /// Default minimum silence between joined partials: 0.1 ms.
    pub const DEFAULT_SILENT_TIME: f64 = 0.0001;

    /// Creates a collator with the given fade and silent times (seconds).
    ///
    /// # Errors
    /// `InvalidArgument` if either time is not positive.
    pub fn new(fade_time: f64, silent_time: f64) -> Result<Self> {
        if fade_time <= 0.0 {
            return Err(Error::invalid_argument("collator fade time must be positive"));
        }
        if silent_time <= 0.0 {
            return Err(Error::invalid_argument(
                "collator silent time must be positive",
            ));
        }
        Ok(Self {
            fade_time,
            silent_time,
        })
    }

    /// Collates the unlabeled partials in `partials` in place.
    ///
    /// Returns the index of the first collated partial (== `partials.len()`
    /// when there was nothing to collate).
    pub fn collate(&self, partials: &mut PartialList) -> usize {
        let start_label = max_label(partials) + 1;

        // keep the labeled partials in place, pull out the unlabeled ones
        let mut unlabeled: Vec<Partial> = Vec::new();
        let mut labeled = PartialList::new();
        for p in std::mem::take(partials) {
            if p.label() == 0 && !p.is_empty() {
                unlabeled.push(p);
            } else {
                labeled.push(p);
            }
        }
        *partials = labeled;
        let first_collated = partials.len();
        if unlabeled.is_empty() {
            return first_collated;
        }

        unlabeled.sort_by(|a, b| a.start_time().total_cmp(&b.start_time()));

        // greedy interval placement: each partial joins the first collated
        // partial that ended long enough ago, else opens a new one
        let min_gap = 2.0 * self.fade_time + self.silent_time;
        let mut collated: Vec<Partial> = Vec::new();
        for p in unlabeled {
            let slot = collated
                .iter()
                .position(|c| c.end_time() + min_gap < p.start_time());
            match slot {
                Some(i) => self.join(&mut collated[i], p),
                None => collated.push(p),
            }
        }
        debug!("collated unlabeled partials into {} partials", collated.len());

        for (i, mut c) in collated.into_iter().enumerate() {
            c.set_label(start_label.max(1) + i as i32);
            partials.push(c);
        }
        first_collated
    }

    /// Appends `late` to `early`, separated by a faded-out, silent gap.
    fn join(&self, early: &mut Partial, mut late: Partial) {
        // fades are no-ops when the boundary breakpoints are already null
        let _ = early.fade_out(self.fade_time);
        let _ = late.fade_in(self.fade_time);
        for (t, bp) in late.iter() {
            early.insert(t, *bp);
        }
    }
}
