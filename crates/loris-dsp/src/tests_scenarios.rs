//! End-to-end synthesis scenarios: partials through the reader and the
//! oscillator bank, checked against analytic signal statistics.

use std::f64::consts::PI;

use loris_model::{Breakpoint, Partial, PartialList};

use crate::distill::Distiller;
use crate::phasefix::wrap_pi;
use crate::synth::{BlockSynth, BlockSynthReader};

const SAMPLE_RATE: f64 = 44100.0;
const BLOCK_LEN: usize = 128;

fn steady_partial(label: i32, freq: f64, amp: f64, end: f64) -> Partial {
    let mut p = Partial::new();
    p.set_label(label);
    p.insert(0.0, Breakpoint::new(freq, amp, 0.0, 0.0));
    p.insert(
        end,
        Breakpoint::new(freq, amp, 0.0, wrap_pi(2.0 * PI * freq * end)),
    );
    p
}

/// Renders every frame of the list block-sequentially into one buffer.
fn render(partials: &PartialList, seed: u64) -> Vec<f64> {
    let interval = BLOCK_LEN as f64 / SAMPLE_RATE;
    let reader = BlockSynthReader::new(partials, interval).expect("valid interval");
    let mut synth = BlockSynth::new(BLOCK_LEN, SAMPLE_RATE, reader.num_voices(), seed);

    let mut samples = vec![0.0; reader.num_frames() * BLOCK_LEN];
    for n in 0..reader.num_frames() {
        let out = &mut samples[n * BLOCK_LEN..(n + 1) * BLOCK_LEN];
        synth.render(reader.frame(n), out);
    }
    samples
}

fn rms(samples: &[f64]) -> f64 {
    (samples.iter().map(|s| s * s).sum::<f64>() / samples.len() as f64).sqrt()
}

#[test]
fn test_single_sinusoid_rms_and_peak() {
    // one partial, 440 Hz at amplitude 0.5 for one second
    let partials: PartialList = vec![steady_partial(1, 440.0, 0.5, 1.0)]
        .into_iter()
        .collect();
    let samples = render(&partials, 1);

    // steady-state region, away from the onset and release ramps
    let steady = &samples[4 * BLOCK_LEN..samples.len() - 6 * BLOCK_LEN];
    let measured = rms(steady);
    let expected = 0.5 / 2f64.sqrt();
    assert!(
        (measured - expected).abs() < expected * 0.01,
        "RMS was {}, expected {}",
        measured,
        expected
    );

    let peak = steady.iter().fold(0.0f64, |acc, s| acc.max(s.abs()));
    assert!((peak - 0.5).abs() < 0.005, "peak was {}", peak);
}

#[test]
fn test_two_partials_uncorrelated_sum() {
    // 440 Hz and 660 Hz partials at amplitude 0.25 each; distillation
    // leaves the already uniquely-labeled pair alone, and the rendered
    // power is the sum of the two partial powers
    let mut partials: PartialList =
        vec![steady_partial(1, 440.0, 0.25, 1.0), steady_partial(2, 660.0, 0.25, 1.0)]
            .into_iter()
            .collect();
    Distiller::default().distill(&mut partials);
    assert_eq!(partials.len(), 2);

    let samples = render(&partials, 1);
    let steady = &samples[4 * BLOCK_LEN..samples.len() - 6 * BLOCK_LEN];
    let measured = rms(steady);
    assert!(
        (measured - 0.25).abs() < 0.25 * 0.02,
        "RMS was {}, expected 0.25",
        measured
    );
}

#[test]
fn test_bandwidth_ramp_preserves_energy() {
    // bandwidth ramps 0 to 1 over one second at amplitude 1; the carrier
    // amplitude and the stochastic modulation depth are matched so that
    // the total energy stays put while it moves from sine to noise
    let mut p = Partial::new();
    p.set_label(1);
    p.insert(0.0, Breakpoint::new(440.0, 1.0, 0.0, 0.0));
    p.insert(
        1.0,
        Breakpoint::new(440.0, 1.0, 1.0, wrap_pi(2.0 * PI * 440.0)),
    );
    let partials: PartialList = vec![p].into_iter().collect();

    let samples = render(&partials, 7);
    let expected = 1.0 / 2f64.sqrt();

    // windows centered at bandwidth 0.2, 0.5, and 0.85
    for (lo, hi) in [(0.1, 0.3), (0.4, 0.6), (0.75, 0.95)] {
        let a = (lo * SAMPLE_RATE) as usize + BLOCK_LEN;
        let b = (hi * SAMPLE_RATE) as usize + BLOCK_LEN;
        let measured = rms(&samples[a..b]);
        assert!(
            (measured - expected).abs() < expected * 0.2,
            "RMS in [{}, {}] was {}, expected about {}",
            lo,
            hi,
            measured,
            expected
        );
    }
}

#[test]
fn test_rendering_is_deterministic() {
    let mut p = Partial::new();
    p.insert(0.0, Breakpoint::new(300.0, 0.5, 0.5, 0.0));
    p.insert(0.5, Breakpoint::new(300.0, 0.5, 0.5, 0.0));
    let partials: PartialList = vec![p].into_iter().collect();

    assert_eq!(render(&partials, 11), render(&partials, 11));
    assert_ne!(render(&partials, 11), render(&partials, 12));
}

#[test]
fn test_dummy_partials_render_nothing() {
    let partials: PartialList = vec![Partial::new(), Partial::new()].into_iter().collect();
    let samples = render(&partials, 1);
    assert!(samples.iter().all(|&s| s == 0.0));
}
