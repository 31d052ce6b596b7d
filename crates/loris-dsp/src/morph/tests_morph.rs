//! Morpher tests: boundary reproduction, halfway morphs, crossfades,
//! reference-partial surrogates, and argument validation.

use std::f64::consts::PI;

use loris_model::{Breakpoint, LinearEnvelope, Partial, PartialList};

use super::Morpher;
use crate::phasefix::wrap_pi;

fn steady_partial(label: i32, freq: f64, amp: f64, end: f64) -> Partial {
    let mut p = Partial::new();
    p.set_label(label);
    let n = 10;
    for i in 0..=n {
        let t = end * i as f64 / n as f64;
        p.insert(
            t,
            Breakpoint::new(freq, amp, 0.0, wrap_pi(2.0 * PI * freq * t)),
        );
    }
    p
}

fn single(p: Partial) -> PartialList {
    vec![p].into_iter().collect()
}

#[test]
fn test_morph_at_zero_reproduces_source() {
    let src = single(steady_partial(1, 440.0, 0.8, 1.0));
    let tgt = single(steady_partial(1, 880.0, 0.2, 1.0));

    let mut morpher = Morpher::new(&LinearEnvelope::constant(0.0));
    morpher.morph(&src, &tgt).unwrap();
    let result = morpher.take_partials();
    assert_eq!(result.len(), 1);

    let morphed = &result[0];
    assert_eq!(morphed.label(), 1);
    for t in [0.1, 0.5, 0.9] {
        // frequency may move by the phase-travel correction, 0.2% at most
        assert!((morphed.frequency_at(t) - 440.0).abs() <= 440.0 * 0.002 + 1e-9);
        assert!((morphed.amplitude_at(t) - 0.8).abs() < 1e-6);
        assert!(morphed.bandwidth_at(t).abs() < 1e-9);
    }
}

#[test]
fn test_morph_at_one_reproduces_target() {
    let src = single(steady_partial(1, 440.0, 0.8, 1.0));
    let tgt = single(steady_partial(1, 880.0, 0.2, 1.0));

    let mut morpher = Morpher::new(&LinearEnvelope::constant(1.0));
    morpher.morph(&src, &tgt).unwrap();
    let result = morpher.take_partials();
    assert_eq!(result.len(), 1);

    let morphed = &result[0];
    for t in [0.1, 0.5, 0.9] {
        assert!((morphed.frequency_at(t) - 880.0).abs() <= 880.0 * 0.002 + 1e-9);
        assert!((morphed.amplitude_at(t) - 0.2).abs() < 1e-6);
    }
}

#[test]
fn test_halfway_morph() {
    // frequencies interpolate linearly, equal amplitudes stay put, and
    // the bandwidth of two pure sinusoids stays zero
    let src = single(steady_partial(1, 440.0, 1.0, 1.0));
    let tgt = single(steady_partial(1, 880.0, 1.0, 1.0));

    let mut morpher = Morpher::new(&LinearEnvelope::constant(0.5));
    morpher.morph(&src, &tgt).unwrap();
    let result = morpher.take_partials();
    assert_eq!(result.len(), 1);

    let morphed = &result[0];
    for t in [0.25, 0.5, 0.75] {
        assert!(
            (morphed.frequency_at(t) - 660.0).abs() < 0.5,
            "frequency at {} was {}",
            t,
            morphed.frequency_at(t)
        );
        assert!((morphed.amplitude_at(t) - 1.0).abs() < 1e-4);
        assert!(morphed.bandwidth_at(t).abs() < 1e-9);
    }
}

#[test]
fn test_breakpoints_respect_minimum_gap() {
    let src = single(steady_partial(1, 440.0, 0.5, 1.0));
    // target breakpoints offset a hair from the source times
    let mut tgt_p = Partial::new();
    tgt_p.set_label(1);
    for i in 0..=10 {
        let t = i as f64 / 10.0 + 1e-5;
        tgt_p.insert(t, Breakpoint::new(660.0, 0.5, 0.0, 0.0));
    }
    let tgt = single(tgt_p);

    let mut morpher = Morpher::new(&LinearEnvelope::constant(0.5));
    morpher.morph(&src, &tgt).unwrap();
    let result = morpher.take_partials();

    let morphed = &result[0];
    let times: Vec<f64> = morphed.iter().map(|(t, _)| t).collect();
    for pair in times.windows(2) {
        assert!(pair[1] - pair[0] >= morpher.min_breakpoint_gap() - 1e-12);
    }
}

#[test]
fn test_morph_rejects_undistilled_input() {
    let mut src = PartialList::new();
    src.push(steady_partial(1, 440.0, 0.5, 1.0));
    src.push(steady_partial(1, 450.0, 0.5, 1.0));
    let tgt = single(steady_partial(1, 880.0, 0.5, 1.0));

    let mut morpher = Morpher::new(&LinearEnvelope::constant(0.5));
    assert!(morpher.morph(&src, &tgt).is_err());
    // failed morphs leave the morpher's list unmodified
    assert!(morpher.partials().is_empty());
}

#[test]
fn test_morph_partial_rejects_two_dummies() {
    let morpher = Morpher::new(&LinearEnvelope::constant(0.5));
    assert!(morpher
        .morph_partial(&Partial::new(), &Partial::new(), 1)
        .is_err());
}

#[test]
fn test_single_sided_label_fades_without_reference() {
    // label 2 exists only in the source; with no target reference it is
    // faded by the amplitude morph function
    let mut src = PartialList::new();
    src.push(steady_partial(1, 440.0, 0.5, 1.0));
    src.push(steady_partial(2, 885.0, 0.5, 1.0));
    let tgt = single(steady_partial(1, 660.0, 0.5, 1.0));

    let mut morpher = Morpher::new(&LinearEnvelope::constant(0.5));
    morpher.morph(&src, &tgt).unwrap();
    let result = morpher.take_partials();
    assert_eq!(result.len(), 2);

    let faded = result.iter().find(|p| p.label() == 2).unwrap();
    // the log-amplitude fade toward silence is strong at alpha = 0.5
    assert!(faded.amplitude_at(0.5) < 0.05);
    assert!((faded.frequency_at(0.5) - 885.0).abs() < 1e-9);
}

#[test]
fn test_single_sided_label_uses_reference_surrogate() {
    let mut src = PartialList::new();
    src.push(steady_partial(1, 440.0, 0.5, 1.0));
    src.push(steady_partial(2, 885.0, 0.5, 1.0));
    let tgt = single(steady_partial(1, 660.0, 0.5, 1.0));

    let mut morpher = Morpher::new(&LinearEnvelope::constant(0.5));
    morpher
        .set_target_reference_from(&tgt, 1)
        .expect("reference exists");
    morpher.morph(&src, &tgt).unwrap();
    let result = morpher.take_partials();

    // the label-2 morph pairs the source partial with a silent surrogate
    // at twice the reference frequency, so the morphed frequency is the
    // average of 885 and 1320
    let morphed = result.iter().find(|p| p.label() == 2).unwrap();
    let f = morphed.frequency_at(0.5);
    assert!(
        (f - 0.5 * (885.0 + 1320.0)).abs() < 1.0,
        "frequency was {}",
        f
    );
}

#[test]
fn test_crossfade_unlabeled_partials() {
    let mut src = PartialList::new();
    src.push(steady_partial(0, 300.0, 0.5, 1.0));
    let mut tgt = PartialList::new();
    tgt.push(steady_partial(0, 500.0, 0.5, 1.0));

    // at alpha 0.25 the source fade is gentler than the target fade
    let mut morpher = Morpher::new(&LinearEnvelope::constant(0.25));
    morpher.morph(&src, &tgt).unwrap();
    let result = morpher.take_partials();
    assert_eq!(result.len(), 2);

    let from_src = result.iter().find(|p| p.frequency_at(0.5) == 300.0).unwrap();
    let from_tgt = result.iter().find(|p| p.frequency_at(0.5) == 500.0).unwrap();
    assert!(from_src.amplitude_at(0.5) > from_tgt.amplitude_at(0.5));
    // no cross-collection interpolation happened
    assert_eq!(from_src.label(), 0);
    assert_eq!(from_tgt.label(), 0);
}

#[test]
fn test_parameter_validation() {
    let mut morpher = Morpher::new(&LinearEnvelope::constant(0.5));
    assert!(morpher.set_amplitude_shape(0.0).is_err());
    assert!(morpher.set_amplitude_shape(-1.0).is_err());
    assert!(morpher.set_min_breakpoint_gap(0.0).is_err());
    assert!(morpher.set_amplitude_shape(1.0).is_ok());
    assert!(morpher.set_min_breakpoint_gap(0.001).is_ok());
}

#[test]
fn test_reference_validation() {
    let mut morpher = Morpher::new(&LinearEnvelope::constant(0.5));
    // unlabeled reference
    let unlabeled = steady_partial(0, 440.0, 0.5, 1.0);
    assert!(morpher.set_source_reference_partial(&unlabeled).is_err());
    // empty reference
    let mut empty = Partial::new();
    empty.set_label(1);
    assert!(morpher.set_source_reference_partial(&empty).is_err());
    // missing label in the list
    let list = single(steady_partial(1, 440.0, 0.5, 1.0));
    assert!(morpher.set_target_reference_from(&list, 9).is_err());
    // label 0 clears the reference
    assert!(morpher.set_target_reference_from(&list, 0).is_ok());
    assert!(morpher.target_reference_partial().is_empty());
}

#[test]
fn test_morph_breakpoints_directly() {
    let morpher = Morpher::new(&LinearEnvelope::constant(0.5));
    let a = Breakpoint::new(400.0, 0.5, 0.0, 0.0);
    let b = Breakpoint::new(600.0, 0.5, 0.2, 0.0);
    let m = morpher.morph_breakpoints(a, b, 0.0);
    assert!((m.frequency() - 500.0).abs() < 1e-9);
    assert!((m.amplitude() - 0.5).abs() < 1e-4);
    assert!(m.bandwidth() > 0.0 && m.bandwidth() < 0.2);
}
