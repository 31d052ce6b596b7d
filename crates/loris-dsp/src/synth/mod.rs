//! Bandwidth-enhanced block synthesis.
//!
//! Partials are rendered by a bank of wavetable oscillators that generate a
//! fixed-size block of samples per call, linearly interpolating their
//! parameters from the state left by the previous block to a target
//! breakpoint. Bandwidth-enhancement multiplies the carrier by a
//! stochastic amplitude modulation factor whose depth follows the
//! bandwidth parameter, preserving total energy.
//!
//! Synthesis is block-sequential (each oscillator's state at the end of
//! block `n` is its start for block `n + 1`) and never fails: frames with
//! missing or silent data render as silence for the affected voices.

mod block_synth;
mod noise;
mod oscillator;
mod reader;
mod wavetables;

pub use block_synth::BlockSynth;
pub use noise::NoiseGenerator;
pub use oscillator::BlockOscillator;
pub use reader::BlockSynthReader;
pub use wavetables::TAB_SIZE;
