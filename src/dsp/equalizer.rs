//! Adaptive equalizer for residual inter-symbol interference
//!
//! One symbol-spaced FIR whose taps chase a per-mode error signal. The
//! constant-modulus variant adapts blind, using only the fact that PSK
//! symbols live on the unit circle; the least-mean-square variant needs a
//! reference symbol, either a known training sequence or the demodulator's
//! own hard decision. Both share the same tap-update form, so the variant
//! is a tag picked when settings are applied, not a per-sample branch into
//! different machinery.

use crate::domain::{ComplexSample, EqualizerMode, PskOrder};

/// Smoothing factor for the running error-power readout
const ERROR_SMOOTHING: f32 = 0.01;

enum Adaptation {
    ConstantModulus,
    LeastMeanSquare { order: PskOrder },
}

/// Symbol-spaced adaptive equalizer
pub struct Equalizer {
    kind: Adaptation,
    taps: Vec<ComplexSample>,
    delay_line: Vec<ComplexSample>,
    position: usize,
    step: f32,
    last_error: f32,
    error_power: f32,
}

impl Equalizer {
    /// Build an equalizer for the selected mode, or `None` for
    /// [`EqualizerMode::Off`].
    ///
    /// Taps start as an identity response (unit center tap) so the chain is
    /// transparent until adaptation has something to correct. `order` is
    /// only consulted by the LMS decision fallback.
    pub fn new(mode: EqualizerMode, num_taps: usize, step: f32, order: PskOrder) -> Option<Self> {
        let kind = match mode {
            EqualizerMode::Off => return None,
            EqualizerMode::Cma => Adaptation::ConstantModulus,
            EqualizerMode::Lms => Adaptation::LeastMeanSquare { order },
        };

        let mut taps = vec![ComplexSample::new(0.0, 0.0); num_taps];
        taps[num_taps / 2] = ComplexSample::new(1.0, 0.0);

        Some(Self {
            kind,
            taps,
            delay_line: vec![ComplexSample::new(0.0, 0.0); num_taps],
            position: 0,
            step,
            last_error: 0.0,
            error_power: 0.0,
        })
    }

    /// Equalize one symbol.
    ///
    /// `update = false` freezes the taps (used once converged, or across
    /// intervals known to carry no data). `training` substitutes a known
    /// reference for the internal decision; it only matters in LMS mode.
    pub fn process(
        &mut self,
        sample: ComplexSample,
        update: bool,
        training: Option<ComplexSample>,
    ) -> ComplexSample {
        let len = self.taps.len();
        self.delay_line[self.position] = sample;

        let mut output = ComplexSample::new(0.0, 0.0);
        for i in 0..len {
            let delay_idx = (self.position + len - i) % len;
            output += self.taps[i] * self.delay_line[delay_idx];
        }

        let error = match &self.kind {
            // Deviation of the output modulus from the unit circle,
            // steered along the output phase
            Adaptation::ConstantModulus => output * (output.norm_sqr() - 1.0),
            Adaptation::LeastMeanSquare { order } => {
                let reference = training.unwrap_or_else(|| order.demap(output).1);
                output - reference
            }
        };

        if update {
            for i in 0..len {
                let delay_idx = (self.position + len - i) % len;
                self.taps[i] -= error * self.delay_line[delay_idx].conj() * self.step;
            }
        }

        self.position = (self.position + 1) % len;
        self.last_error = error.norm();
        self.error_power += ERROR_SMOOTHING * (error.norm_sqr() - self.error_power);
        output
    }

    /// Error magnitude of the most recent symbol
    pub fn error(&self) -> f32 {
        self.last_error
    }

    /// Smoothed error power, a convergence readout for the caller
    pub fn error_power(&self) -> f32 {
        self.error_power
    }

    /// Return to the identity response and forget the delay line
    pub fn reset(&mut self) {
        let len = self.taps.len();
        self.taps.fill(ComplexSample::new(0.0, 0.0));
        self.taps[len / 2] = ComplexSample::new(1.0, 0.0);
        self.delay_line.fill(ComplexSample::new(0.0, 0.0));
        self.position = 0;
        self.last_error = 0.0;
        self.error_power = 0.0;
    }
}
