//! Sound morphing between two collections of labeled partials.
//!
//! A morph interpolates the time-varying frequencies, amplitudes, and
//! bandwidths of two *distilled* (uniquely labeled) collections of
//! partials, under the control of three morphing envelopes with values in
//! [0, 1]: 0 renders only the source sound, 1 only the target. Partials in
//! the two sounds correspond when they carry the same non-zero label;
//! unlabeled partials have no correspondence and are simply crossfaded.

mod interpolate;

#[cfg(test)]
mod tests_morph;

use std::collections::BTreeMap;

use log::debug;
use loris_model::{Breakpoint, Envelope, Error, Partial, PartialList, Result};

use interpolate::{fix_phase_travel, interpolate_log, interpolate_parameters};

/// Morphs pairs of corresponding partials drawn from two sounds.
///
/// The morpher owns snapshots of its three morphing envelopes and
/// accumulates morphed partials in an internal list, retrievable with
/// [`take_partials`](Morpher::take_partials).
///
/// Optional *reference partials* (one per sound, labeled with their
/// harmonic number) serve two purposes: they are used to fabricate a
/// silent surrogate for a label present in only one sound, and to correct
/// the frequencies of very quiet breakpoints, whose frequency estimates
/// are unreliable, before interpolation.
pub struct Morpher {
    freq_function: Box<dyn Envelope>,
    amp_function: Box<dyn Envelope>,
    bw_function: Box<dyn Envelope>,
    src_ref_partial: Partial,
    tgt_ref_partial: Partial,
    freq_fix_threshold_db: f64,
    amp_morph_shape: f64,
    min_breakpoint_gap: f64,
    partials: PartialList,
}

impl Morpher {
    /// The default amplitude morphing shape. Smaller values make the
    /// log-amplitude morph more nonlinear; values of 1 or more approximate
    /// a linear morph.
    pub const DEFAULT_AMP_SHAPE: f64 = 1e-5;

    /// The default minimum time (seconds) between breakpoints in morphed
    /// partials.
    pub const DEFAULT_BREAKPOINT_GAP: f64 = 1e-4;

    /// The default amplitude threshold (dB) below which breakpoint
    /// frequencies are corrected from the reference partial.
    pub const DEFAULT_FIX_THRESHOLD_DB: f64 = -90.0;

    /// Creates a morpher using the same envelope for frequency, amplitude,
    /// and bandwidth.
    pub fn new(f: &dyn Envelope) -> Self {
        Self::with_envelopes(f, f, f)
    }

    /// Creates a morpher with distinct frequency, amplitude, and bandwidth
    /// morphing envelopes.
    pub fn with_envelopes(ff: &dyn Envelope, af: &dyn Envelope, bwf: &dyn Envelope) -> Self {
        Self {
            freq_function: ff.clone_env(),
            amp_function: af.clone_env(),
            bw_function: bwf.clone_env(),
            src_ref_partial: Partial::new(),
            tgt_ref_partial: Partial::new(),
            freq_fix_threshold_db: Self::DEFAULT_FIX_THRESHOLD_DB,
            amp_morph_shape: Self::DEFAULT_AMP_SHAPE,
            min_breakpoint_gap: Self::DEFAULT_BREAKPOINT_GAP,
            partials: PartialList::new(),
        }
    }

    // -- morphing --

    /// Morphs two sounds into a single labeled collection of partials,
    /// stored in this morpher's list.
    ///
    /// Labeled partials are morphed pairwise by label; a label present in
    /// only one sound is paired with a surrogate fabricated from that
    /// side's reference partial when one is set, and faded out otherwise.
    /// Unlabeled partials are crossfaded.
    ///
    /// # Errors
    /// `InvalidArgument` if either sound contains two partials with the
    /// same non-zero label (not distilled). The morpher's list is
    /// unmodified on error.
    pub fn morph(&mut self, src: &PartialList, tgt: &PartialList) -> Result<()> {
        let correspondence = build_correspondence(src, tgt)?;
        self.morph_aux(&correspondence, src, tgt)?;
        self.crossfade(src, tgt, 0);
        Ok(())
    }

    /// Morphs a pair of partials into a new partial carrying
    /// `assign_label`.
    ///
    /// Either operand (but not both) may be a dummy partial, in which case
    /// the other is faded. The morphed partial has breakpoints at the
    /// times of every breakpoint in both operands, except that no two
    /// output breakpoints are closer than the minimum breakpoint gap.
    ///
    /// # Errors
    /// `InvalidArgument` if both operands are dummies.
    pub fn morph_partial(&self, src: &Partial, tgt: &Partial, assign_label: i32) -> Result<Partial> {
        if src.is_empty() && tgt.is_empty() {
            return Err(Error::invalid_argument("cannot morph two empty partials"));
        }

        // the earliest time a breakpoint could be added to the morph
        let mut dont_add_before: f64 = 0.0;
        if !src.is_empty() {
            dont_add_before = dont_add_before.min(src.start_time());
        }
        if !tgt.is_empty() {
            dont_add_before = dont_add_before.min(tgt.start_time());
        }

        let mut newp = Partial::new();
        newp.set_label(assign_label);

        // merge breakpoints from the two partials in time order
        let mut src_pos = 0;
        let mut tgt_pos = 0;
        while src_pos < src.len() || tgt_pos < tgt.len() {
            let take_src = tgt_pos == tgt.len()
                || (src_pos < src.len() && src.time_at(src_pos) < tgt.time_at(tgt_pos));
            if take_src {
                let t = src.time_at(src_pos);
                if dont_add_before <= t {
                    self.append_morphed_src(*src.breakpoint_at(src_pos), tgt, t, &mut newp);
                }
                src_pos += 1;
            } else {
                let t = tgt.time_at(tgt_pos);
                if dont_add_before <= t {
                    self.append_morphed_tgt(*tgt.breakpoint_at(tgt_pos), src, t, &mut newp);
                }
                tgt_pos += 1;
            }

            if !newp.is_empty() {
                dont_add_before = newp.end_time() + self.min_breakpoint_gap;
            }
        }

        Ok(newp)
    }

    /// Crossfades the partials labeled `label` (normally 0, the unlabeled
    /// partials) from both sounds: source partials fade out as the
    /// amplitude morph envelope rises, target partials fade in. No
    /// parameters are interpolated across the two sounds.
    pub fn crossfade(&mut self, src: &PartialList, tgt: &PartialList, label: i32) {
        debug!("crossfading partials labeled {}", label);
        let mut kept = 0usize;
        for p in src.iter().filter(|p| p.label() == label && !p.is_empty()) {
            let mut newp = Partial::new();
            newp.set_label(label);
            let mut dont_add_before = p.start_time();
            for (t, bp) in p.iter() {
                if dont_add_before <= t {
                    newp.insert(t, self.fade_src_breakpoint(*bp, t));
                    dont_add_before = t + self.min_breakpoint_gap;
                }
            }
            if !newp.is_empty() && partial_is_nonnull(&newp) {
                kept += 1;
                self.partials.push(newp);
            }
        }
        debug!("kept {} crossfaded partials from the source sound", kept);

        kept = 0;
        for p in tgt.iter().filter(|p| p.label() == label && !p.is_empty()) {
            let mut newp = Partial::new();
            newp.set_label(label);
            let mut dont_add_before = p.start_time();
            for (t, bp) in p.iter() {
                if dont_add_before <= t {
                    newp.insert(t, self.fade_tgt_breakpoint(*bp, t));
                    dont_add_before = t + self.min_breakpoint_gap;
                }
            }
            if !newp.is_empty() && partial_is_nonnull(&newp) {
                kept += 1;
                self.partials.push(newp);
            }
        }
        debug!("kept {} crossfaded partials from the target sound", kept);
    }

    /// Computes morphed parameters at `time` from a pair of breakpoints
    /// assumed to correspond exactly to that time.
    pub fn morph_breakpoints(&self, src_bkpt: Breakpoint, tgt_bkpt: Breakpoint, time: f64) -> Breakpoint {
        let fweight = self.freq_function.value_at(time);
        let aweight = self.amp_function.value_at(time);
        let bweight = self.bw_function.value_at(time);
        interpolate_parameters(
            &src_bkpt,
            &tgt_bkpt,
            fweight,
            aweight,
            self.amp_morph_shape,
            bweight,
        )
    }

    /// Morphs a source breakpoint against the target partial's parameters
    /// at `time`.
    ///
    /// # Errors
    /// `InvalidArgument` if the target partial is a dummy.
    pub fn morph_src_breakpoint(
        &self,
        bp: Breakpoint,
        tgt_partial: &Partial,
        time: f64,
    ) -> Result<Breakpoint> {
        if tgt_partial.is_empty() {
            return Err(Error::invalid_argument(
                "cannot morph a breakpoint with an empty partial",
            ));
        }
        Ok(self.morph_breakpoints(bp, tgt_partial.parameters_at(time), time))
    }

    /// Morphs a target breakpoint against the source partial's parameters
    /// at `time`.
    ///
    /// # Errors
    /// `InvalidArgument` if the source partial is a dummy.
    pub fn morph_tgt_breakpoint(
        &self,
        bp: Breakpoint,
        src_partial: &Partial,
        time: f64,
    ) -> Result<Breakpoint> {
        if src_partial.is_empty() {
            return Err(Error::invalid_argument(
                "cannot morph a breakpoint with an empty partial",
            ));
        }
        Ok(self.morph_breakpoints(src_partial.parameters_at(time), bp, time))
    }

    /// Fades a source breakpoint that has no corresponding target: its
    /// amplitude is log-morphed toward zero by the amplitude envelope.
    pub fn fade_src_breakpoint(&self, mut bp: Breakpoint, time: f64) -> Breakpoint {
        let alpha = self.amp_function.value_at(time);
        bp.set_amplitude(interpolate_log(
            bp.amplitude(),
            0.0,
            alpha,
            self.amp_morph_shape,
        ));
        bp
    }

    /// Fades a target breakpoint that has no corresponding source.
    pub fn fade_tgt_breakpoint(&self, mut bp: Breakpoint, time: f64) -> Breakpoint {
        let alpha = self.amp_function.value_at(time);
        bp.set_amplitude(interpolate_log(
            0.0,
            bp.amplitude(),
            alpha,
            self.amp_morph_shape,
        ));
        bp
    }

    // -- morphing function access/mutation --

    /// Assigns a new frequency morphing envelope.
    pub fn set_frequency_function(&mut self, f: &dyn Envelope) {
        self.freq_function = f.clone_env();
    }

    /// Assigns a new amplitude morphing envelope.
    pub fn set_amplitude_function(&mut self, f: &dyn Envelope) {
        self.amp_function = f.clone_env();
    }

    /// Assigns a new bandwidth morphing envelope.
    pub fn set_bandwidth_function(&mut self, f: &dyn Envelope) {
        self.bw_function = f.clone_env();
    }

    /// The shaping parameter of the log-amplitude morph.
    pub fn amplitude_shape(&self) -> f64 {
        self.amp_morph_shape
    }

    /// Sets the shaping parameter of the log-amplitude (and bandwidth)
    /// morph. Values much less than 1 give a gently curved morph; very
    /// small values (like 1e-12) make the jump from silence to quiet
    /// partials audible.
    ///
    /// # Errors
    /// `InvalidArgument` if `shape` is not positive.
    pub fn set_amplitude_shape(&mut self, shape: f64) -> Result<()> {
        if shape <= 0.0 {
            return Err(Error::invalid_argument(
                "the amplitude morph shaping parameter must be positive",
            ));
        }
        self.amp_morph_shape = shape;
        Ok(())
    }

    /// The amplitude threshold (dB) below which morphed breakpoint
    /// frequencies are corrected from the reference partials.
    pub fn freq_fix_threshold(&self) -> f64 {
        self.freq_fix_threshold_db
    }

    /// Sets the reference-correction threshold in dB. Very low thresholds
    /// (the default is -90) restrict the correction to nearly silent
    /// breakpoints.
    pub fn set_freq_fix_threshold(&mut self, db: f64) {
        self.freq_fix_threshold_db = db;
    }

    /// The minimum time gap between breakpoints in morphed partials.
    pub fn min_breakpoint_gap(&self) -> f64 {
        self.min_breakpoint_gap
    }

    /// Sets the minimum time gap between morphed breakpoints. Morphing can
    /// otherwise generate breakpoints arbitrarily close together, making
    /// morphs huge.
    ///
    /// # Errors
    /// `InvalidArgument` if `gap` is not positive.
    pub fn set_min_breakpoint_gap(&mut self, gap: f64) -> Result<()> {
        if gap <= 0.0 {
            return Err(Error::invalid_argument(
                "the minimum breakpoint gap must be positive",
            ));
        }
        self.min_breakpoint_gap = gap;
        Ok(())
    }

    // -- reference partial access/mutation --

    /// The source-side reference partial (empty when none is set).
    pub fn source_reference_partial(&self) -> &Partial {
        &self.src_ref_partial
    }

    /// The target-side reference partial (empty when none is set).
    pub fn target_reference_partial(&self) -> &Partial {
        &self.tgt_ref_partial
    }

    /// Sets the source-side reference partial, which must be labeled with
    /// its harmonic number and have breakpoints.
    ///
    /// # Errors
    /// `InvalidArgument` if the partial is unlabeled or empty.
    pub fn set_source_reference_partial(&mut self, p: &Partial) -> Result<()> {
        validate_reference(p)?;
        self.src_ref_partial = p.clone();
        Ok(())
    }

    /// Sets the target-side reference partial, which must be labeled with
    /// its harmonic number and have breakpoints.
    ///
    /// # Errors
    /// `InvalidArgument` if the partial is unlabeled or empty.
    pub fn set_target_reference_partial(&mut self, p: &Partial) -> Result<()> {
        validate_reference(p)?;
        self.tgt_ref_partial = p.clone();
        Ok(())
    }

    /// Selects the source-side reference partial from a list by label
    /// (label 0 clears the reference).
    ///
    /// # Errors
    /// `InvalidArgument` if no partial in the list has the label.
    pub fn set_source_reference_from(
        &mut self,
        partials: &PartialList,
        label: i32,
    ) -> Result<()> {
        self.src_ref_partial = find_reference(partials, label)?;
        Ok(())
    }

    /// Selects the target-side reference partial from a list by label
    /// (label 0 clears the reference).
    ///
    /// # Errors
    /// `InvalidArgument` if no partial in the list has the label.
    pub fn set_target_reference_from(
        &mut self,
        partials: &PartialList,
        label: i32,
    ) -> Result<()> {
        self.tgt_ref_partial = find_reference(partials, label)?;
        Ok(())
    }

    // -- morphed partial access --

    /// The morphed partials accumulated so far.
    pub fn partials(&self) -> &PartialList {
        &self.partials
    }

    /// Takes the accumulated morphed partials, leaving the morpher's list
    /// empty.
    pub fn take_partials(&mut self) -> PartialList {
        std::mem::take(&mut self.partials)
    }

    // -- helpers --

    /// Morphs every corresponding pair in the label map, fabricating
    /// missing sides from the reference partials where possible.
    fn morph_aux(
        &mut self,
        correspondence: &BTreeMap<i32, (Option<usize>, Option<usize>)>,
        src_list: &PartialList,
        tgt_list: &PartialList,
    ) -> Result<()> {
        for (&label, &(src_idx, tgt_idx)) in correspondence {
            let mut src = match src_idx {
                Some(i) => src_list[i].clone(),
                None if !self.src_ref_partial.is_empty() => {
                    let fscale = f64::from(label) / f64::from(self.src_ref_partial.label());
                    make_partial_from_reference(&self.src_ref_partial, fscale)
                }
                None => Partial::new(),
            };
            let mut tgt = match tgt_idx {
                Some(i) => tgt_list[i].clone(),
                None if !self.tgt_ref_partial.is_empty() => {
                    let fscale = f64::from(label) / f64::from(self.tgt_ref_partial.label());
                    make_partial_from_reference(&self.tgt_ref_partial, fscale)
                }
                None => Partial::new(),
            };

            debug!(
                "morphing {} and {} partials with label {}",
                usize::from(!src.is_empty()),
                usize::from(!tgt.is_empty()),
                label
            );

            // pad the operands with null breakpoints so the morphed
            // partial cannot acquire a spurious non-zero segment at its
            // extremes
            self.pad_with_nulls(&mut src);
            self.pad_with_nulls(&mut tgt);

            let newp = self.morph_partial(&src, &tgt, label)?;
            if partial_is_nonnull(&newp) {
                self.partials.push(newp);
            }
        }
        Ok(())
    }

    /// Inserts a null breakpoint one gap before the first breakpoint and
    /// one gap after the last, wherever those are not already null.
    fn pad_with_nulls(&self, p: &mut Partial) {
        if p.is_empty() {
            return;
        }
        if p.first().is_some_and(|bp| !bp.is_null()) && p.start_time() > self.min_breakpoint_gap
        {
            let t = p.start_time() - self.min_breakpoint_gap;
            let mut null = p.parameters_at(t);
            null.set_amplitude(0.0);
            p.insert(t, null);
        }
        if p.last().is_some_and(|bp| !bp.is_null()) {
            let t = p.end_time() + self.min_breakpoint_gap;
            let mut null = p.parameters_at(t);
            null.set_amplitude(0.0);
            p.insert(t, null);
        }
    }

    /// Morphs a source breakpoint against the target partial and appends
    /// the result to the morphed partial under construction, unless all
    /// three morph functions are so close to 1 that the source no longer
    /// contributes breakpoints.
    fn append_morphed_src(
        &self,
        src_bkpt: Breakpoint,
        tgt_partial: &Partial,
        time: f64,
        newp: &mut Partial,
    ) {
        let fweight = self.freq_function.value_at(time);
        let aweight = self.amp_function.value_at(time);
        let bweight = self.bw_function.value_at(time);

        const MAX_MORPH_PARAM: f64 = 0.9;
        if fweight < MAX_MORPH_PARAM || aweight < MAX_MORPH_PARAM || bweight < MAX_MORPH_PARAM {
            if tgt_partial.is_empty() {
                // no corresponding target and no reference: just fade
                if self.tgt_ref_partial.is_empty() {
                    newp.insert(time, self.fade_src_breakpoint(src_bkpt, time));
                }
            } else {
                let mut src_bkpt = src_bkpt;
                let mut tgt_bkpt = tgt_partial.parameters_at(time);

                // quiet breakpoints get their frequencies from the
                // reference partials, when available
                adjust_frequency(
                    &mut src_bkpt,
                    &self.src_ref_partial,
                    newp.label(),
                    self.freq_fix_threshold_db,
                    time,
                );
                adjust_frequency(
                    &mut tgt_bkpt,
                    &self.tgt_ref_partial,
                    newp.label(),
                    self.freq_fix_threshold_db,
                    time,
                );

                let mut morphed = interpolate_parameters(
                    &src_bkpt,
                    &tgt_bkpt,
                    fweight,
                    aweight,
                    self.amp_morph_shape,
                    bweight,
                );

                if let Some(prev) = newp.last() {
                    let dt = time - newp.end_time();
                    fix_phase_travel(prev, &mut morphed, dt, fweight);
                }
                newp.insert(time, morphed);
            }
        }
    }

    /// Morphs a target breakpoint against the source partial and appends
    /// the result, unless all three morph functions are so close to 0
    /// that the target no longer contributes breakpoints.
    fn append_morphed_tgt(
        &self,
        tgt_bkpt: Breakpoint,
        src_partial: &Partial,
        time: f64,
        newp: &mut Partial,
    ) {
        let fweight = self.freq_function.value_at(time);
        let aweight = self.amp_function.value_at(time);
        let bweight = self.bw_function.value_at(time);

        const MIN_MORPH_PARAM: f64 = 0.1;
        if fweight > MIN_MORPH_PARAM || aweight > MIN_MORPH_PARAM || bweight > MIN_MORPH_PARAM {
            if src_partial.is_empty() {
                if self.src_ref_partial.is_empty() {
                    newp.insert(time, self.fade_tgt_breakpoint(tgt_bkpt, time));
                }
            } else {
                let mut tgt_bkpt = tgt_bkpt;
                let mut src_bkpt = src_partial.parameters_at(time);

                adjust_frequency(
                    &mut src_bkpt,
                    &self.src_ref_partial,
                    newp.label(),
                    self.freq_fix_threshold_db,
                    time,
                );
                adjust_frequency(
                    &mut tgt_bkpt,
                    &self.tgt_ref_partial,
                    newp.label(),
                    self.freq_fix_threshold_db,
                    time,
                );

                let mut morphed = interpolate_parameters(
                    &src_bkpt,
                    &tgt_bkpt,
                    fweight,
                    aweight,
                    self.amp_morph_shape,
                    bweight,
                );

                if let Some(prev) = newp.last() {
                    let dt = time - newp.end_time();
                    fix_phase_travel(prev, &mut morphed, dt, fweight);
                }
                newp.insert(time, morphed);
            }
        }
    }
}

/// Maps each non-zero label to the indices of the partials carrying it in
/// the source and target lists.
fn build_correspondence(
    src: &PartialList,
    tgt: &PartialList,
) -> Result<BTreeMap<i32, (Option<usize>, Option<usize>)>> {
    let mut correspondence: BTreeMap<i32, (Option<usize>, Option<usize>)> = BTreeMap::new();
    for (i, p) in src.iter().enumerate() {
        if p.label() != 0 {
            let entry = correspondence.entry(p.label()).or_default();
            if entry.0.is_some() {
                return Err(Error::invalid_argument(
                    "partials must be distilled before morphing",
                ));
            }
            entry.0 = Some(i);
        }
    }
    for (i, p) in tgt.iter().enumerate() {
        if p.label() != 0 {
            let entry = correspondence.entry(p.label()).or_default();
            if entry.1.is_some() {
                return Err(Error::invalid_argument(
                    "partials must be distilled before morphing",
                ));
            }
            entry.1 = Some(i);
        }
    }
    Ok(correspondence)
}

/// Builds a silent surrogate partial by scaling the reference partial's
/// frequencies, zeroing its amplitudes, and recomputing its phases by
/// integration.
fn make_partial_from_reference(reference: &Partial, fscale: f64) -> Partial {
    let mut p = reference.clone();
    for (_, bp) in p.iter_mut() {
        bp.set_amplitude(0.0);
        bp.set_frequency(bp.frequency() * fscale);
    }
    for i in 1..p.len() {
        let travel = crate::phasefix::phase_travel(
            p.breakpoint_at(i - 1),
            p.breakpoint_at(i),
            p.time_at(i) - p.time_at(i - 1),
        );
        let phase = crate::phasefix::wrap_pi(p.breakpoint_at(i - 1).phase() + travel);
        p.breakpoint_at_mut(i).set_phase(phase);
    }
    p
}

/// Blends a quiet breakpoint's frequency toward the harmonic of the
/// reference partial, exactly as the harmonifier does. Loud breakpoints
/// and breakpoints without a reference are unchanged. The phase is left
/// alone.
fn adjust_frequency(
    bp: &mut Breakpoint,
    reference: &Partial,
    harmonic_num: i32,
    threshold_db: f64,
    time: f64,
) {
    if reference.is_empty() {
        return;
    }

    const FADE_RANGE_DB: f64 = 10.0;
    let begin_fade = 10f64.powf(0.05 * (threshold_db + FADE_RANGE_DB));
    if bp.amplitude() < begin_fade {
        let threshold = 10f64.powf(0.05 * threshold_db);
        let one_over_fade_span = 1.0 / (begin_fade - threshold);
        let fscale = f64::from(harmonic_num) / f64::from(reference.label());

        let alpha = ((begin_fade - bp.amplitude()) * one_over_fade_span).min(1.0);
        let f_ref = reference.frequency_at(time);
        bp.set_frequency(alpha * (f_ref * fscale) + (1.0 - alpha) * bp.frequency());
    }
}

/// Returns true if the partial has any non-null breakpoint; all-null
/// morph products are not worth keeping.
fn partial_is_nonnull(p: &Partial) -> bool {
    p.iter().any(|(_, bp)| bp.amplitude() != 0.0)
}

fn validate_reference(p: &Partial) -> Result<()> {
    if p.label() == 0 {
        return Err(Error::invalid_argument(
            "a morphing reference partial must be labeled with its harmonic number",
        ));
    }
    if p.is_empty() {
        return Err(Error::invalid_argument(
            "a morphing reference partial must have breakpoints",
        ));
    }
    Ok(())
}

fn find_reference(partials: &PartialList, label: i32) -> Result<Partial> {
    if label == 0 {
        return Ok(Partial::new());
    }
    partials
        .iter()
        .find(|p| p.label() == label)
        .cloned()
        .ok_or_else(|| Error::invalid_argument("no partial has the specified reference label"))
}
