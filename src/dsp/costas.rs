//! Costas loop for carrier phase and frequency tracking
//!
//! The loop rides on top of an already-downconverted complex baseband
//! stream and chases whatever residual phase and frequency error the front
//! end left behind. Think of it as the fine-tuning knob that never stops
//! turning: each sample is derotated by the current phase estimate, the
//! leftover rotation is measured with a modulation-order-specific detector,
//! and a second-order loop filter nudges phase and frequency toward zero
//! error.

use crate::domain::{ComplexSample, PskOrder};

/// Capture range of the frequency integrator in radians per sample. A wider
/// range lets the loop pull in bigger carrier offsets but also lets noise
/// walk it further off before the detector drags it back.
const MAX_FREQUENCY: f64 = 0.5;

/// Axis-blend factor for the 8PSK detector (√2 − 1)
const PSK8_BLEND: f32 = std::f32::consts::SQRT_2 - 1.0;

/// Second-order Costas loop, one instance per carrier
pub struct CostasLoop {
    order: PskOrder,
    phase: f64,
    freq: f64,
    alpha: f64,
    beta: f64,
    last_error: f32,
}

impl CostasLoop {
    /// Create a loop for the given modulation order.
    ///
    /// `loop_bandwidth` is normalized to the sample rate (radians per
    /// sample); values around 0.01 to 0.05 track well at four samples per
    /// symbol. Gains follow the critically-damped second-order derivation,
    /// so both come out strictly positive for any positive bandwidth.
    pub fn new(order: PskOrder, loop_bandwidth: f32) -> Self {
        let bw = loop_bandwidth as f64;
        let damping = std::f64::consts::FRAC_1_SQRT_2;
        let denom = 1.0 + 2.0 * damping * bw + bw * bw;
        let alpha = 4.0 * damping * bw / denom;
        let beta = 4.0 * bw * bw / denom;

        Self {
            order,
            phase: 0.0,
            freq: 0.0,
            alpha,
            beta,
            last_error: 0.0,
        }
    }

    /// Retune the loop filter without disturbing the tracked phase and
    /// frequency, so bandwidth changes on a live carrier keep lock.
    pub fn set_bandwidth(&mut self, loop_bandwidth: f32) {
        let retuned = Self::new(self.order, loop_bandwidth);
        self.alpha = retuned.alpha;
        self.beta = retuned.beta;
    }

    /// Process one sample: derotate by the current phase estimate, measure
    /// the residual error, advance the loop. Returns the derotated sample.
    pub fn process(&mut self, sample: ComplexSample) -> ComplexSample {
        let output = sample
            * ComplexSample::new(self.phase.cos() as f32, -(self.phase.sin() as f32));

        // Bounded error keeps a noise transient from slingshotting the loop
        let error = self.phase_detector(output).clamp(-1.0, 1.0);

        self.freq += self.beta * error as f64;
        self.phase += self.freq + self.alpha * error as f64;
        self.wrap_phase();
        self.freq = self.freq.clamp(-MAX_FREQUENCY, MAX_FREQUENCY);

        self.last_error = error;
        output
    }

    /// Phase error of the most recent sample. Persistent large values are
    /// the caller's cue to declare the carrier unlocked; the loop itself
    /// never errors out.
    pub fn error(&self) -> f32 {
        self.last_error
    }

    /// Current frequency estimate in radians per sample
    pub fn frequency(&self) -> f64 {
        self.freq
    }

    /// Return the loop to its initial searching state
    pub fn reset(&mut self) {
        self.phase = 0.0;
        self.freq = 0.0;
        self.last_error = 0.0;
    }

    fn phase_detector(&self, sample: ComplexSample) -> f32 {
        match self.order {
            // When locked the data lives on the real axis and Q hovers
            // around zero, so I*Q measures the rotation still present.
            PskOrder::Bpsk => sample.re * sample.im,
            PskOrder::Qpsk => {
                sample.im * sample.re.signum() - sample.re * sample.im.signum()
            }
            // 8PSK points alternate between on-axis and diagonal, so blend
            // the QPSK detector depending on which axis dominates.
            PskOrder::Psk8 => {
                if sample.re.abs() >= sample.im.abs() {
                    sample.im * sample.re.signum() - sample.re * sample.im.signum() * PSK8_BLEND
                } else {
                    sample.im * sample.re.signum() * PSK8_BLEND - sample.re * sample.im.signum()
                }
            }
        }
    }

    fn wrap_phase(&mut self) {
        const TWO_PI: f64 = 2.0 * std::f64::consts::PI;
        while self.phase > TWO_PI {
            self.phase -= TWO_PI;
        }
        while self.phase <= -TWO_PI {
            self.phase += TWO_PI;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    /// Generate baseband BPSK symbols with a residual carrier error applied
    fn generate_offset_bpsk(
        bits: &[bool],
        samples_per_symbol: usize,
        freq_offset: f64,
        phase_offset: f64,
    ) -> Vec<ComplexSample> {
        let mut samples = Vec::new();
        let mut n = 0u64;
        for &bit in bits {
            let symbol = if bit { 1.0f32 } else { -1.0f32 };
            for _ in 0..samples_per_symbol {
                let angle = freq_offset * n as f64 + phase_offset;
                samples.push(
                    ComplexSample::new(angle.cos() as f32, angle.sin() as f32) * symbol,
                );
                n += 1;
            }
        }
        samples
    }

    #[test]
    fn test_gains_positive_across_bandwidths() {
        for bw in [0.001f32, 0.005, 0.02, 0.05, 0.1] {
            let costas = CostasLoop::new(PskOrder::Qpsk, bw);
            assert!(
                costas.alpha > 0.0 && costas.beta > 0.0,
                "loop gains must be positive at bw {}: alpha {} beta {}",
                bw,
                costas.alpha,
                costas.beta
            );
            assert!(
                costas.alpha < 1.0 && costas.beta < 1.0,
                "loop gains should stay below unity at bw {}",
                bw
            );
        }
    }

    #[test]
    fn test_bpsk_converges_on_static_phase_offset() {
        let bits: Vec<bool> = (0..200).map(|i| i % 3 == 0).collect();
        let signal = generate_offset_bpsk(&bits, 4, 0.0, 0.8);

        let mut costas = CostasLoop::new(PskOrder::Bpsk, 0.02);
        let mut tail = Vec::new();
        for (i, &sample) in signal.iter().enumerate() {
            let out = costas.process(sample);
            if i > signal.len() / 2 {
                tail.push(out);
            }
        }

        // Once locked the constellation collapses onto the real axis
        let worst_tilt = tail
            .iter()
            .map(|s| s.im.abs() / s.norm().max(1e-6))
            .fold(0.0f32, f32::max);
        assert!(
            worst_tilt < 0.25,
            "locked BPSK should sit near the real axis, worst tilt {}",
            worst_tilt
        );
    }

    #[test]
    fn test_bpsk_tracks_frequency_offset() {
        // 0.002 rad/sample is ~1.5 Hz at a 4.8 kHz symbol stream
        let bits: Vec<bool> = (0..400).map(|i| (i / 5) % 2 == 0).collect();
        let signal = generate_offset_bpsk(&bits, 4, 0.002, 0.3);

        let mut costas = CostasLoop::new(PskOrder::Bpsk, 0.02);
        for &sample in &signal {
            costas.process(sample);
        }

        assert!(
            (costas.frequency() - 0.002).abs() < 5e-4,
            "loop should have pulled its frequency estimate to the offset, got {}",
            costas.frequency()
        );
    }

    #[test]
    fn test_qpsk_detector_zero_at_ideal_points() {
        let costas = CostasLoop::new(PskOrder::Qpsk, 0.02);
        for k in 0..4 {
            let angle = PI / 4.0 + k as f64 * PI / 2.0;
            let point = ComplexSample::new(angle.cos() as f32, angle.sin() as f32);
            let error = costas.phase_detector(point);
            assert!(
                error.abs() < 1e-6,
                "ideal QPSK point {} should produce zero error, got {}",
                k,
                error
            );
        }
    }

    #[test]
    fn test_error_is_clipped() {
        let mut costas = CostasLoop::new(PskOrder::Bpsk, 0.02);
        // Absurdly large sample would give raw error 5000 without the clip
        costas.process(ComplexSample::new(100.0, 50.0));
        assert!(
            costas.error().abs() <= 1.0,
            "detector output must be clipped, got {}",
            costas.error()
        );
    }

    #[test]
    fn test_reset_clears_state() {
        let bits: Vec<bool> = vec![true; 100];
        let signal = generate_offset_bpsk(&bits, 4, 0.01, 1.0);

        let mut costas = CostasLoop::new(PskOrder::Bpsk, 0.05);
        for &sample in &signal {
            costas.process(sample);
        }

        costas.reset();
        assert_eq!(costas.phase, 0.0);
        assert_eq!(costas.freq, 0.0);
        assert_eq!(costas.error(), 0.0);
    }
}
