//! Loris transforms and resynthesis
//!
//! This crate is the manipulation and resynthesis kernel of the Reassigned
//! Bandwidth-Enhanced Additive Sound Model: the transforms that edit
//! collections of partials, and the block-accurate oscillator bank that turns
//! them back into samples.
//!
//! # Pipeline
//!
//! An external analyzer produces a [`PartialList`](loris_model::PartialList);
//! zero or more transforms reshape it; the synthesizer renders it:
//!
//! - [`channelize`] - tag partials with harmonic-number labels
//! - [`distill`] / [`collate`] / [`sieve`] - collapse partials per label,
//!   fuse unlabeled partials, drop the quiet ones
//! - [`resample`] - impose a uniform breakpoint time grid
//! - [`phasefix`] - reconcile stored phases with frequencies
//! - [`morph`] - interpolate between two labeled collections
//! - [`harmonize`] - pull quiet breakpoints onto harmonic frequencies
//! - [`fundamental`] - maximum-likelihood F0 estimation from partials
//! - [`transform`] - amplitude/frequency/bandwidth/pitch/time edits
//! - [`synth`] - the bandwidth-enhanced block oscillator bank
//! - [`io`] - SDIF (1TRC), SPC, and AIFF file formats
//!
//! # Determinism
//!
//! Everything here is single-threaded and deterministic. Stochastic
//! modulation state belongs to the synthesizer instance; seeds for its
//! components are derived with BLAKE3 (see [`rng`]) so that two differently
//! seeded synthesizers produce independent, reproducible streams.

pub mod channelize;
pub mod collate;
pub mod distill;
pub mod filter;
pub mod fundamental;
pub mod harmonize;
pub mod io;
pub mod morph;
pub mod phasefix;
pub mod resample;
pub mod rng;
pub mod sieve;
pub mod synth;
pub mod transform;

#[cfg(test)]
mod tests_scenarios;
