//! Digital Signal Processing
//!
//! Pure per-sample building blocks. No I/O dependencies.

pub mod agc;
pub mod costas;
pub mod equalizer;
pub mod fir;
pub mod nco;
pub mod resampler;
pub mod timing;

// Re-export commonly used items
pub use agc::Agc;
pub use costas::CostasLoop;
pub use equalizer::Equalizer;
pub use fir::{FirFilter, ToneFilter};
pub use nco::Nco;
pub use resampler::Resampler;
pub use timing::{BitClock, CycleHistogram, LockMonitor, PulseRun, PulseTimer, SymbolClock};
