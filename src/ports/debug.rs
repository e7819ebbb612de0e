//! Debug tap port
//!
//! An optional secondary sink for oscilloscope-style inspection of the
//! channel chain. Strictly observational: the pipeline pushes values out,
//! nothing flows back into the decode path.

/// One snapshot of intermediate signals for a processed sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DebugFrame {
    /// Input magnitude before any processing
    pub raw: f32,
    /// Magnitude as handed to the decoder, after resampling, mixing and
    /// any level control the protocol takes
    pub leveled: f32,
    /// Decoder quality metric: carrier-loop or equalizer error where the
    /// protocol has one, zero otherwise
    pub quality: f32,
}

/// Trait for consumers of the debug tap
///
/// Implementations should return quickly; the pipeline calls this inside
/// its per-sample loop whenever a sink is attached.
pub trait DebugSink: Send {
    /// Receive one snapshot
    fn push(&mut self, frame: DebugFrame);
}

/// Sink that keeps the most recent snapshots in memory, mostly for tests
/// and simple level displays
pub struct MemorySink {
    frames: Vec<DebugFrame>,
    capacity: usize,
}

impl MemorySink {
    pub fn new(capacity: usize) -> Self {
        Self {
            frames: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn frames(&self) -> &[DebugFrame] {
        &self.frames
    }
}

impl DebugSink for MemorySink {
    fn push(&mut self, frame: DebugFrame) {
        if self.frames.len() == self.capacity {
            self.frames.remove(0);
        }
        self.frames.push(frame);
    }
}
