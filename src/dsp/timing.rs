//! Symbol-timing recovery primitives
//!
//! Three timing strategies live here. Data modes (RTTY) ride a free-running
//! [`BitClock`] that latches one bit per symbol cell at the cell midpoint,
//! resynced on each start-bit edge. Linear modulations (PSK) close an actual
//! timing loop: a [`SymbolClock`] steers a fractional strobe onto the
//! matched-filter peak with a Gardner detector. Time-code beacons instead
//! classify second-long pulses with a [`PulseTimer`] and keep a
//! [`LockMonitor`] watching how often the expected markers actually show up.
//! The [`CycleHistogram`] sits off to the side of the data path and produces
//! an independent baud estimate from observed transition spacing.

use crate::domain::ComplexSample;

/// Modulo counter over a (possibly fractional) samples-per-symbol period.
///
/// `tick()` fires exactly once per symbol period, at the midpoint of the
/// cell, which is where an FSK slicer output is most trustworthy.
pub struct BitClock {
    samples_per_symbol: f64,
    counter: f64,
    latched: bool,
}

impl BitClock {
    pub fn new(samples_per_symbol: f64) -> Self {
        Self {
            samples_per_symbol,
            counter: 0.0,
            latched: false,
        }
    }

    /// Advance by one sample; true when this sample is the symbol-center
    /// sampling instant.
    pub fn tick(&mut self) -> bool {
        self.counter += 1.0;
        if self.counter >= self.samples_per_symbol {
            self.counter -= self.samples_per_symbol;
            self.latched = false;
        }

        if !self.latched && self.counter >= self.samples_per_symbol / 2.0 {
            self.latched = true;
            true
        } else {
            false
        }
    }

    /// Align the cell boundary to "now" (called on a detected start edge)
    pub fn resync(&mut self) {
        self.counter = 0.0;
        self.latched = false;
    }

    pub fn samples_per_symbol(&self) -> f64 {
        self.samples_per_symbol
    }
}

/// The period estimate may wander this far from nominal, relative
const PERIOD_LIMIT: f32 = 0.02;

/// Interpolating symbol clock for linear modulations.
///
/// A Gardner detector measures whether the strobe fell before or after the
/// matched-filter peak, and a second-order loop slides the fractional
/// sampling instant onto it. The detector compares the current and previous
/// strobes against the sample half a period between them, so it needs no
/// carrier lock and no symbol decisions.
pub struct SymbolClock {
    nominal_period: f32,
    period: f32,
    alpha: f32,
    beta: f32,
    history: Vec<ComplexSample>,
    countdown: f32,
    previous: ComplexSample,
    error: f32,
}

impl SymbolClock {
    pub fn new(samples_per_symbol: f32, loop_bandwidth: f32) -> Self {
        // Critically damped gains, same derivation as the carrier loop
        let damping = std::f32::consts::FRAC_1_SQRT_2;
        let denom = 1.0 + 2.0 * damping * loop_bandwidth + loop_bandwidth * loop_bandwidth;
        let history_len = samples_per_symbol.ceil() as usize + 3;
        Self {
            nominal_period: samples_per_symbol,
            period: samples_per_symbol,
            alpha: 4.0 * damping * loop_bandwidth / denom,
            beta: 4.0 * loop_bandwidth * loop_bandwidth / denom,
            history: vec![ComplexSample::new(0.0, 0.0); history_len],
            countdown: samples_per_symbol,
            previous: ComplexSample::new(0.0, 0.0),
            error: 0.0,
        }
    }

    /// Advance by one input sample; returns the interpolated symbol when the
    /// strobe lands inside this sample interval.
    pub fn feed(&mut self, sample: ComplexSample) -> Option<ComplexSample> {
        self.history.rotate_left(1);
        let last = self.history.len() - 1;
        self.history[last] = sample;

        self.countdown -= 1.0;
        if self.countdown > 0.0 {
            return None;
        }

        // The strobe fell between the two newest samples
        let position = last as f32 + self.countdown;
        let strobe = self.interpolate(position);
        let midpoint = self.interpolate(position - self.period / 2.0);

        // Positive when the strobe ran late
        let raw = (midpoint * (strobe - self.previous).conj()).re;
        self.error = raw.clamp(-1.0, 1.0);
        self.previous = strobe;

        self.period = (self.period - self.beta * self.error).clamp(
            self.nominal_period * (1.0 - PERIOD_LIMIT),
            self.nominal_period * (1.0 + PERIOD_LIMIT),
        );
        self.countdown += self.period - self.alpha * self.error;

        Some(strobe)
    }

    fn interpolate(&self, position: f32) -> ComplexSample {
        let index = (position.floor() as usize).min(self.history.len() - 2);
        let frac = position - index as f32;
        self.history[index] * (1.0 - frac) + self.history[index + 1] * frac
    }

    /// Latest detector output, for lock inspection
    pub fn error(&self) -> f32 {
        self.error
    }

    /// Current period estimate in samples
    pub fn period(&self) -> f32 {
        self.period
    }

    pub fn reset(&mut self) {
        self.history.fill(ComplexSample::new(0.0, 0.0));
        self.period = self.nominal_period;
        self.countdown = self.nominal_period;
        self.previous = ComplexSample::new(0.0, 0.0);
        self.error = 0.0;
    }
}

/// A completed run of consecutive identical slicer decisions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PulseRun {
    /// Level the run held
    pub high: bool,
    /// Run length in samples
    pub length: u32,
}

/// Tracks consecutive high/low run lengths on a sliced binary signal.
///
/// Emits the finished run at each transition; time-code decoders turn those
/// runs into pulse classes (100 ms low, 200 ms low, missing second).
pub struct PulseTimer {
    current_level: bool,
    run_length: u32,
}

impl PulseTimer {
    pub fn new() -> Self {
        Self {
            current_level: false,
            run_length: 0,
        }
    }

    /// Feed one sliced sample; returns the run that just ended, if any
    pub fn feed(&mut self, level: bool) -> Option<PulseRun> {
        if level == self.current_level {
            self.run_length = self.run_length.saturating_add(1);
            return None;
        }

        let finished = PulseRun {
            high: self.current_level,
            length: self.run_length,
        };
        self.current_level = level;
        self.run_length = 1;

        // Suppress the empty pseudo-run before the very first sample
        if finished.length == 0 {
            None
        } else {
            Some(finished)
        }
    }

    /// Length of the run currently in progress
    pub fn current_run(&self) -> u32 {
        self.run_length
    }

    pub fn current_level(&self) -> bool {
        self.current_level
    }

    pub fn reset(&mut self) {
        self.current_level = false;
        self.run_length = 0;
    }
}

impl Default for PulseTimer {
    fn default() -> Self {
        Self::new()
    }
}

/// Rolling hit-ratio monitor for marker/zero-bit detections.
///
/// Stays optimistic until `min_count` observations have accumulated, then
/// declares loss of lock once the hit ratio over the window drops below the
/// threshold. The caller resets it when re-entering search.
pub struct LockMonitor {
    window: Vec<bool>,
    window_size: usize,
    next: usize,
    filled: usize,
    threshold: f32,
    min_count: usize,
}

impl LockMonitor {
    pub fn new(threshold: f32, min_count: usize, window_size: usize) -> Self {
        Self {
            window: vec![false; window_size],
            window_size,
            next: 0,
            filled: 0,
            threshold,
            min_count,
        }
    }

    /// Record one expected-detection outcome
    pub fn record(&mut self, hit: bool) {
        self.window[self.next] = hit;
        self.next = (self.next + 1) % self.window_size;
        self.filled = (self.filled + 1).min(self.window_size);
    }

    /// False once enough observations exist and too many of them missed
    pub fn is_locked(&self) -> bool {
        if self.filled < self.min_count {
            return true;
        }
        let hits = self.window[..self.filled].iter().filter(|&&h| h).count();
        hits as f32 / self.filled as f32 >= self.threshold
    }

    pub fn reset(&mut self) {
        self.window.fill(false);
        self.next = 0;
        self.filled = 0;
    }
}

/// Histogram of transition-to-transition spacing, in samples.
///
/// Collected beside the live decoder and reduced on demand: the estimate is
/// the count-weighted average of the three best-populated bins around the
/// histogram peak, which rides out single-bin jitter without letting
/// multi-bit runs at twice the cell length drag the answer upward.
pub struct CycleHistogram {
    bins: Vec<u32>,
    total: u32,
}

impl CycleHistogram {
    /// `max_cycle` bounds the run lengths worth counting; anything longer
    /// (idle line, lost signal) is discarded rather than clamped.
    pub fn new(max_cycle: usize) -> Self {
        Self {
            bins: vec![0; max_cycle + 1],
            total: 0,
        }
    }

    pub fn record(&mut self, cycle_len: usize) {
        if cycle_len == 0 || cycle_len >= self.bins.len() {
            return;
        }
        self.bins[cycle_len] += 1;
        self.total += 1;
    }

    /// Number of recorded cycles since the last reset
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Reduce the histogram to a fundamental cycle length in samples.
    ///
    /// Returns `None` until at least eight cycles have been recorded.
    pub fn estimate(&self) -> Option<f64> {
        if self.total < 8 {
            return None;
        }

        let peak = self
            .bins
            .iter()
            .enumerate()
            .max_by_key(|(_, &count)| count)
            .map(|(i, _)| i)?;
        if self.bins[peak] == 0 {
            return None;
        }

        // Rank the peak's neighborhood and keep the three busiest bins
        let lo = peak.saturating_sub(2);
        let hi = (peak + 2).min(self.bins.len() - 1);
        let mut neighborhood: Vec<(usize, u32)> = (lo..=hi)
            .map(|i| (i, self.bins[i]))
            .filter(|&(_, count)| count > 0)
            .collect();
        neighborhood.sort_by(|a, b| b.1.cmp(&a.1));
        neighborhood.truncate(3);

        let weight: u64 = neighborhood.iter().map(|&(_, c)| c as u64).sum();
        let weighted: u64 = neighborhood
            .iter()
            .map(|&(i, c)| i as u64 * c as u64)
            .sum();

        Some(weighted as f64 / weight as f64)
    }

    pub fn reset(&mut self) {
        self.bins.fill(0);
        self.total = 0;
    }
}
