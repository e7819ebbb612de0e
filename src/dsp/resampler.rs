//! Arbitrary-ratio polyphase resampler
//!
//! Converts the channel's delivered sample rate to the fixed internal rate a
//! demodulator runs at. The ratio is tracked as a running fractional
//! accumulator, so non-integer ratios (48 kHz to 6 kHz, 44.1 kHz to 1 kHz)
//! stay sample-exact over arbitrarily long runs.

use crate::domain::ComplexSample;
use crate::dsp::fir::lowpass_taps;

/// Number of fractional phases in the polyphase bank. 32 branches puts the
/// worst-case phase quantization error below the linear interpolation error
/// between adjacent branches.
const NUM_PHASES: usize = 32;

/// Polyphase fractional resampler.
///
/// Usage is a strict two-step loop: [`push`](Resampler::push) exactly one
/// input sample, then call [`next_output`](Resampler::next_output) until it
/// returns `None`, then push the next sample. Interpolation (ratio above one)
/// yields several outputs per push; decimation yields zero or one.
pub struct Resampler {
    /// One branch per fractional phase, plus a wrap branch for interpolating
    /// past the last phase
    branches: Vec<Vec<f32>>,
    delay_line: Vec<ComplexSample>,
    position: usize,
    taps_per_branch: usize,
    /// Input-sample periods advanced per output sample (input rate / output rate)
    step: f64,
    /// Fractional position of the next output within the current input period
    mu: f64,
}

impl Resampler {
    /// Build the polyphase bank and reset the fractional-phase state.
    ///
    /// `tap_count` is the per-branch tap count; the underlying prototype
    /// lowpass has `tap_count * 32` taps. `cutoff_hz` is the anti-alias
    /// cutoff in input-rate terms and must sit at or below half of
    /// `min(input_rate, output_rate)`.
    ///
    /// Call again (replacing the instance) whenever the sample rate or
    /// channel bandwidth changes. Never reconfigure mid-batch.
    pub fn new(tap_count: usize, input_rate: f64, output_rate: f64, cutoff_hz: f64) -> Self {
        // Prototype designed at the virtual rate NUM_PHASES * input_rate,
        // then scaled so each branch has ~unity DC gain.
        let mut prototype = lowpass_taps(
            tap_count * NUM_PHASES,
            input_rate * NUM_PHASES as f64,
            cutoff_hz,
        );
        for tap in &mut prototype {
            *tap *= NUM_PHASES as f32;
        }
        // Pad so the wrap branch below can read one branch past the end
        prototype.extend(std::iter::repeat(0.0).take(NUM_PHASES));

        let mut branches = Vec::with_capacity(NUM_PHASES + 1);
        for phase in 0..=NUM_PHASES {
            let branch: Vec<f32> = (0..tap_count)
                .map(|i| prototype[phase + i * NUM_PHASES])
                .collect();
            branches.push(branch);
        }

        Self {
            branches,
            delay_line: vec![ComplexSample::new(0.0, 0.0); tap_count],
            position: 0,
            taps_per_branch: tap_count,
            step: input_rate / output_rate,
            mu: 1.0,
        }
    }

    /// Output rate divided by input rate
    pub fn ratio(&self) -> f64 {
        1.0 / self.step
    }

    /// Accept the next input sample.
    ///
    /// Must only be called once the previous push has been fully drained
    /// with [`next_output`](Resampler::next_output).
    pub fn push(&mut self, sample: ComplexSample) {
        self.mu -= 1.0;
        self.delay_line[self.position] = sample;
        self.position = (self.position + 1) % self.taps_per_branch;
    }

    /// Produce the next output sample for the current input position, or
    /// `None` when the fractional accumulator has moved past this input.
    pub fn next_output(&mut self) -> Option<ComplexSample> {
        if self.mu >= 1.0 {
            return None;
        }

        // Clamp against FP rounding right at a branch boundary
        let scaled = self.mu.max(0.0) * NUM_PHASES as f64;
        let branch = (scaled as usize).min(NUM_PHASES - 1);
        let frac = (scaled - branch as f64) as f32;

        let low = self.branch_output(branch);
        let high = self.branch_output(branch + 1);
        let output = low * (1.0 - frac) + high * frac;

        self.mu += self.step;
        Some(output)
    }

    fn branch_output(&self, branch: usize) -> ComplexSample {
        let taps = &self.branches[branch];
        let len = self.taps_per_branch;
        let mut output = ComplexSample::new(0.0, 0.0);

        for (i, &tap) in taps.iter().enumerate() {
            // position points one past the newest sample
            let delay_idx = (self.position + len - 1 - i) % len;
            output += self.delay_line[delay_idx] * tap;
        }

        output
    }

    /// Clear the delay line and fractional phase
    pub fn reset(&mut self) {
        self.delay_line.fill(ComplexSample::new(0.0, 0.0));
        self.position = 0;
        self.mu = 1.0;
    }
}
