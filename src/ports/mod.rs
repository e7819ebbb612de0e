//! Port traits (interfaces)
//!
//! Boundaries between the decode core and the embedding program. The core
//! never does I/O itself; whatever wants to watch it implements a port.

pub mod debug;

pub use debug::*;
