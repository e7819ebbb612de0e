//! Channel assembly
//!
//! The per-channel DSP chain ([`pipeline`]), its event-queue wrapper
//! ([`processor`]) and the worker thread that runs one channel end to end
//! ([`worker`]).

pub mod pipeline;
pub mod processor;
pub mod worker;

pub use pipeline::ChannelPipeline;
pub use processor::ChannelProcessor;
pub use worker::ChannelHandle;
