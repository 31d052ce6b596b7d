//! Argument definitions for the fastsynth command line.

use std::path::PathBuf;

use clap::Parser;

/// fastsynth - render partials from an SDIF or SPC file to an AIFF file
#[derive(Parser)]
#[command(name = "fastsynth")]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// Input partials file (.sdif or .spc)
    pub input: PathBuf,

    /// Output sample rate in Hz
    #[arg(long, default_value_t = 44100.0)]
    pub rate: f64,

    /// Frequency scale factor
    #[arg(long, default_value_t = 1.0)]
    pub freq: f64,

    /// Amplitude scale factor
    #[arg(long, default_value_t = 1.0)]
    pub amp: f64,

    /// Bandwidth scale factor
    #[arg(long, default_value_t = 1.0)]
    pub bw: f64,

    /// Output AIFF file name
    #[arg(short, long, default_value = "synth.aiff")]
    pub output: PathBuf,

    /// Optional dilation times: if their count matches the number of
    /// markers in the input file they become the new marker times, and
    /// the partials are dilated between them; a single time with
    /// non-matching markers is the overall duration instead
    pub times: Vec<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cli = Cli::parse_from(["fastsynth", "horn.sdif"]);
        assert_eq!(cli.rate, 44100.0);
        assert_eq!(cli.freq, 1.0);
        assert_eq!(cli.output, PathBuf::from("synth.aiff"));
        assert!(cli.times.is_empty());
    }

    #[test]
    fn test_options_and_times() {
        let cli = Cli::parse_from([
            "fastsynth",
            "horn.spc",
            "--rate",
            "48000",
            "--freq",
            "0.5",
            "-o",
            "out.aiff",
            "0.1",
            "0.6",
            "2.0",
        ]);
        assert_eq!(cli.rate, 48000.0);
        assert_eq!(cli.freq, 0.5);
        assert_eq!(cli.output, PathBuf::from("out.aiff"));
        assert_eq!(cli.times, vec![0.1, 0.6, 2.0]);
    }
}
