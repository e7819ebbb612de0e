//! Numerically Controlled Oscillator

use crate::domain::ComplexSample;
use std::f64::consts::PI;

/// Numerically Controlled Oscillator for carrier generation and mixing
pub struct Nco {
    phase: f64,
    phase_increment: f64,
    sample_rate: f64,
}

impl Nco {
    /// Create a new NCO with the given frequency and sample rate
    pub fn new(frequency: f64, sample_rate: f64) -> Self {
        let phase_increment = 2.0 * PI * frequency / sample_rate;
        Self {
            phase: 0.0,
            phase_increment,
            sample_rate,
        }
    }

    /// Set the oscillator frequency
    pub fn set_frequency(&mut self, frequency: f64) {
        self.phase_increment = 2.0 * PI * frequency / self.sample_rate;
    }

    /// Get the current frequency
    pub fn frequency(&self) -> f64 {
        self.phase_increment * self.sample_rate / (2.0 * PI)
    }

    /// Adjust phase by a delta (used by PLLs for phase correction)
    pub fn adjust_phase(&mut self, delta: f64) {
        self.phase += delta;
        self.wrap_phase();
    }

    /// Generate the next complex sample e^(j*phase)
    pub fn next_iq(&mut self) -> ComplexSample {
        let sample = ComplexSample::new(self.phase.cos() as f32, self.phase.sin() as f32);
        self.phase += self.phase_increment;
        self.wrap_phase();
        sample
    }

    /// Mix an input sample with the oscillator: out = input * e^(j*phase).
    ///
    /// A negative oscillator frequency shifts the input down in frequency,
    /// so tuning out a +200 Hz offset means an NCO at -200 Hz.
    pub fn rotate(&mut self, input: ComplexSample) -> ComplexSample {
        input * self.next_iq()
    }

    /// Reset phase to zero
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    fn wrap_phase(&mut self) {
        while self.phase >= 2.0 * PI {
            self.phase -= 2.0 * PI;
        }
        while self.phase < 0.0 {
            self.phase += 2.0 * PI;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nco_frequency() {
        let mut nco = Nco::new(1000.0, 48000.0);

        // Generate one full cycle worth of samples
        let samples_per_cycle = 48000.0 / 1000.0; // 48 samples
        let mut samples = Vec::new();

        for _ in 0..(samples_per_cycle as usize * 2) {
            samples.push(nco.next_iq().re);
        }

        // Check that we have roughly 2 complete cycles
        let zero_crossings: usize = samples
            .windows(2)
            .filter(|w| (w[0] >= 0.0 && w[1] < 0.0) || (w[0] < 0.0 && w[1] >= 0.0))
            .count();

        // 2 cycles = 4 zero crossings
        assert_eq!(zero_crossings, 4);
    }

    #[test]
    fn test_nco_unit_magnitude() {
        let mut nco = Nco::new(777.0, 48000.0);
        for _ in 0..1000 {
            let iq = nco.next_iq();
            assert!(
                (iq.norm() - 1.0).abs() < 1e-5,
                "oscillator output off the unit circle: {}",
                iq.norm()
            );
        }
    }

    #[test]
    fn test_rotate_cancels_offset() {
        // A tone at +300 Hz mixed with an NCO at -300 Hz lands at DC.
        let mut tone = Nco::new(300.0, 8000.0);
        let mut mixer = Nco::new(-300.0, 8000.0);

        let mut sum = ComplexSample::new(0.0, 0.0);
        let n = 8000;
        for _ in 0..n {
            sum += mixer.rotate(tone.next_iq());
        }
        let mean = sum / n as f32;
        assert!(
            mean.norm() > 0.99,
            "mixed-down tone should be a DC phasor, mean magnitude {}",
            mean.norm()
        );
    }
}
