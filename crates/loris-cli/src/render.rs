//! The fastsynth rendering pipeline: read, dilate, scale, synthesize,
//! export.

use std::path::Path;

use anyhow::{bail, Context};
use log::info;

use loris_dsp::collate::Collator;
use loris_dsp::io::{AiffFile, SdifFile, SpcFile};
use loris_dsp::synth::{BlockSynth, BlockSynthReader};
use loris_dsp::transform::{
    crop_all, scale_amplitude_all, scale_bandwidth_all, scale_frequency_all, shift_time_all,
    Dilator,
};
use loris_model::{time_span, LinearEnvelope, Marker, PartialList};

/// Samples rendered per synthesis block.
const BLOCK_SIZE: usize = 128;

/// Everything read from an input partials file.
struct Input {
    partials: PartialList,
    markers: Vec<Marker>,
    midi_note_number: Option<f64>,
}

/// How command-line time points map onto the input's markers.
enum DilationPlan {
    None,
    /// One target time per marker.
    ByMarkers(Vec<f64>),
    /// A single overall duration.
    Uniform(f64),
}

/// Decides what the trailing command-line times mean, given the marker
/// count.
fn plan_dilation(times: &[f64], num_markers: usize) -> anyhow::Result<DilationPlan> {
    if times.is_empty() {
        return Ok(DilationPlan::None);
    }
    if times.len() == num_markers {
        return Ok(DilationPlan::ByMarkers(times.to_vec()));
    }
    if times.len() == 1 {
        return Ok(DilationPlan::Uniform(times[0]));
    }
    bail!(
        "{} time points do not correspond to the {} markers in the input file",
        times.len(),
        num_markers
    )
}

fn read_input(path: &Path) -> anyhow::Result<Input> {
    let suffix = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    match suffix.as_str() {
        "sdif" => {
            let mut file = SdifFile::read(path)
                .with_context(|| format!("reading partials from {}", path.display()))?;
            let markers = file.markers().to_vec();
            Ok(Input {
                partials: file.take_partials(),
                markers,
                midi_note_number: None,
            })
        }
        "spc" => {
            let mut file = SpcFile::read(path)
                .with_context(|| format!("reading partials from {}", path.display()))?;
            let markers = file.markers().to_vec();
            let nn = file.midi_note_number();
            Ok(Input {
                partials: file.take_partials(),
                markers,
                midi_note_number: Some(nn),
            })
        }
        other => bail!("unrecognized input suffix: {:?}", other),
    }
}

/// Runs the whole pipeline.
pub(crate) fn run(cli: &crate::cli_args::Cli) -> anyhow::Result<()> {
    let mut input = read_input(&cli.input)?;

    let span = time_span(&input.partials);
    let (span_start, span_end) = span.unwrap_or((0.0, 0.0));
    println!(
        "{}: {} partials spanning {:.3} to {:.3} seconds",
        cli.input.display(),
        input.partials.len(),
        span_start,
        span_end
    );
    if let Some(nn) = input.midi_note_number {
        println!("MIDI note number {}", nn);
    }

    // ----------- dilate ---------------
    match plan_dilation(&cli.times, input.markers.len())? {
        DilationPlan::None => {}
        DilationPlan::ByMarkers(targets) => {
            println!("dilating partials using {} marked features", targets.len());
            let marker_times: Vec<f64> = input.markers.iter().map(Marker::time).collect();
            let dilator = Dilator::new(&marker_times, &targets)
                .context("marker times do not admit dilation")?;
            dilator.dilate_all(&mut input.partials);
            dilator.dilate_markers(&mut input.markers);
        }
        DilationPlan::Uniform(duration) => {
            println!(
                "scaling duration from {:.3} to {:.3} seconds",
                span_end, duration
            );
            let dilator = Dilator::new(&[span_end], &[duration])
                .context("cannot dilate an empty sound")?;
            dilator.dilate_all(&mut input.partials);
            dilator.dilate_markers(&mut input.markers);
        }
    }

    // ----------- scale ---------------
    if cli.freq != 1.0 {
        println!("scaling partial frequencies by {}", cli.freq);
        scale_frequency_all(&mut input.partials, &LinearEnvelope::constant(cli.freq));
        if let Some(nn) = input.midi_note_number.as_mut() {
            let adjusted = *nn + 12.0 * cli.freq.log2();
            println!("adjusting MIDI note number from {} to {}", nn, adjusted);
            *nn = adjusted;
        }
    }
    if cli.amp != 1.0 {
        println!("scaling partial amplitudes by {}", cli.amp);
        scale_amplitude_all(&mut input.partials, &LinearEnvelope::constant(cli.amp));
    }
    if cli.bw != 1.0 {
        println!("scaling partial bandwidths by {}", cli.bw);
        scale_bandwidth_all(&mut input.partials, &LinearEnvelope::constant(cli.bw));
    }

    // ----------- prepare ---------------
    // remove dead time at the front, so rendering starts immediately
    if let Some((start, end)) = time_span(&input.partials) {
        crop_all(&mut input.partials, start, end);
        shift_time_all(&mut input.partials, -start);
        for m in input.markers.iter_mut() {
            m.set_time(m.time() - start);
        }
    }

    let fade_time = BLOCK_SIZE as f64 / cli.rate;
    let collator = Collator::new(fade_time, fade_time * 0.1)
        .context("the sample rate does not admit a collation fade")?;
    collator.collate(&mut input.partials);

    // ----------- render ---------------
    let block_interval = BLOCK_SIZE as f64 / cli.rate;
    let reader = BlockSynthReader::new(&input.partials, block_interval)?;
    let mut synth = BlockSynth::new(BLOCK_SIZE, cli.rate, reader.num_voices(), 1);

    println!(
        "rendering {} partials in {} frames at {} Hz",
        input.partials.len(),
        reader.num_frames(),
        cli.rate
    );
    let mut samples = vec![0.0; reader.num_frames() * BLOCK_SIZE];
    for n in 0..reader.num_frames() {
        let out = &mut samples[n * BLOCK_SIZE..(n + 1) * BLOCK_SIZE];
        synth.render(reader.frame(n), out);
    }
    info!("rendered {} samples", samples.len());

    // ----------- export ---------------
    let mut out = AiffFile::new(samples, cli.rate)?;
    out.markers_mut().extend(input.markers.iter().cloned());
    if let Some(nn) = input.midi_note_number {
        if nn != 0.0 {
            out.set_midi_note_number(nn)?;
        }
    }

    println!("exporting to {}", cli.output.display());
    out.write(&cli.output)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dilation_plan_by_markers() {
        assert!(matches!(
            plan_dilation(&[0.1, 0.5], 2),
            Ok(DilationPlan::ByMarkers(_))
        ));
    }

    #[test]
    fn test_dilation_plan_uniform() {
        assert!(matches!(
            plan_dilation(&[2.0], 3),
            Ok(DilationPlan::Uniform(_))
        ));
        // one time and one marker prefers the marker correspondence
        assert!(matches!(
            plan_dilation(&[2.0], 1),
            Ok(DilationPlan::ByMarkers(_))
        ));
    }

    #[test]
    fn test_dilation_plan_mismatch() {
        assert!(plan_dilation(&[1.0, 2.0], 3).is_err());
        assert!(matches!(plan_dilation(&[], 3), Ok(DilationPlan::None)));
    }

    #[test]
    fn test_end_to_end_render() {
        use loris_model::{Breakpoint, Partial};

        // write a small SDIF file, render it, and check the AIFF output
        let dir = tempfile::tempdir().unwrap();
        let sdif_path = dir.path().join("tone.sdif");
        let aiff_path = dir.path().join("tone.aiff");

        let mut p = Partial::new();
        p.set_label(1);
        p.insert(0.0, Breakpoint::new(440.0, 0.5, 0.0, 0.0));
        p.insert(0.25, Breakpoint::new(440.0, 0.5, 0.0, 0.0));
        let partials: PartialList = vec![p].into_iter().collect();
        SdifFile::from_partials(partials).write(&sdif_path).unwrap();

        let cli = crate::cli_args::Cli {
            input: sdif_path,
            rate: 44100.0,
            freq: 1.0,
            amp: 1.0,
            bw: 1.0,
            output: aiff_path.clone(),
            times: Vec::new(),
        };
        run(&cli).unwrap();

        let bytes = std::fs::read(&aiff_path).unwrap();
        assert_eq!(&bytes[0..4], b"FORM");
        assert!(bytes.len() > 44100 / 4);
    }
}
