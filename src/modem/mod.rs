//! Protocol demodulators
//!
//! One decoder per modulation family, all speaking the same trait so the
//! channel pipeline can drive any of them without knowing what it carries.

pub mod baudot;
pub mod encoder;
pub mod navradial;
pub mod psk;
pub mod rtty;
pub mod timecode;

use crate::domain::{ComplexSample, DecodedEvent};

/// A protocol decoder at the end of the channel chain.
///
/// The pipeline hands over one complex sample at a time, already resampled
/// to [`internal_rate`](Demodulator::internal_rate), mixed to baseband and,
/// for every protocol except the envelope-measuring radial decoder,
/// level-controlled. Decoders push whatever they produce onto `events`;
/// zero events per sample is the common case.
pub trait Demodulator {
    /// Consume one sample at the internal rate
    fn process(&mut self, sample: ComplexSample, events: &mut Vec<DecodedEvent>);

    /// Sample rate this decoder expects at its input
    fn internal_rate(&self) -> f64;

    /// Drop all acquisition state and start searching from scratch
    fn reset(&mut self);
}
