//! Core domain types
//!
//! Pure types with no I/O dependencies. These represent the core concepts
//! of the demodulation pipeline.

pub mod error;
pub mod settings;
pub mod types;

pub use error::*;
pub use settings::*;
pub use types::*;
