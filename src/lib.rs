//! Multi-protocol narrowband demodulator
//!
//! Turns channelized complex baseband into decoded traffic: RTTY text,
//! longwave time-station minute frames, VOR bearings and framed PSK
//! payloads, all behind one settings-driven channel pipeline.
//!
//! ## Architecture
//!
//! - `domain/` - Settings, events and errors; pure types, no I/O
//! - `dsp/` - Per-sample building blocks (NCO, resampler, AGC, loops)
//! - `modem/` - One decoder per protocol family, plus signal sources
//! - `channel/` - The shared pipeline and the threaded channel worker
//! - `ports/` - Trait seams for the embedding program (debug tap)

// Core domain (pure, no I/O)
pub mod domain;
pub mod dsp;
pub mod modem;
pub mod ports;

// Channel assembly on top of the core
pub mod channel;
