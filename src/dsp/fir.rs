//! FIR filtering over complex baseband

use crate::domain::ComplexSample;
use std::f32::consts::PI;

/// Windowed-sinc lowpass prototype, normalized for unity DC gain.
///
/// Shared by [`FirFilter::lowpass`] and the resampler's polyphase bank so
/// both see the same passband shape.
pub fn lowpass_taps(tap_count: usize, sample_rate: f64, cutoff_hz: f64) -> Vec<f32> {
    let normalized_cutoff = (cutoff_hz / sample_rate) as f32;
    let mut coefficients = vec![0.0; tap_count];
    let middle = tap_count / 2;

    for i in 0..tap_count {
        let n = i as f32 - middle as f32;
        if n == 0.0 {
            coefficients[i] = 2.0 * normalized_cutoff;
        } else {
            coefficients[i] = (2.0 * PI * normalized_cutoff * n).sin() / (PI * n);
        }

        // Apply Hanning window
        let window = 0.5 * (1.0 - (2.0 * PI * i as f32 / tap_count as f32).cos());
        coefficients[i] *= window;
    }

    // Normalize
    let sum: f32 = coefficients.iter().sum();
    for c in &mut coefficients {
        *c /= sum;
    }

    coefficients
}

/// Root-raised-cosine taps for the suppressed-carrier symbol filter.
///
/// One of these at each end of the link cascades to a raised cosine, which
/// is where the zero-ISI property actually lives. Taps are normalized for
/// unity DC gain like the lowpass prototype.
pub fn root_raised_cosine_taps(tap_count: usize, samples_per_symbol: f32, rolloff: f32) -> Vec<f32> {
    let mut coefficients = vec![0.0; tap_count];
    let middle = tap_count as f32 / 2.0 - 0.5;

    for (i, c) in coefficients.iter_mut().enumerate() {
        // Symbol-relative time of this tap
        let t = (i as f32 - middle) / samples_per_symbol;
        let four_bt = 4.0 * rolloff * t;

        *c = if t.abs() < 1e-6 {
            1.0 + rolloff * (4.0 / PI - 1.0)
        } else if (four_bt.abs() - 1.0).abs() < 1e-4 {
            // Singular point at t = ±T/(4β)
            let a = (PI / (4.0 * rolloff)).sin() * (1.0 + 2.0 / PI);
            let b = (PI / (4.0 * rolloff)).cos() * (1.0 - 2.0 / PI);
            rolloff / std::f32::consts::SQRT_2 * (a + b)
        } else {
            let numer = (PI * t * (1.0 - rolloff)).sin() + four_bt * (PI * t * (1.0 + rolloff)).cos();
            let denom = PI * t * (1.0 - four_bt * four_bt);
            numer / denom
        };
    }

    let sum: f32 = coefficients.iter().sum();
    for c in &mut coefficients {
        *c /= sum;
    }

    coefficients
}

/// FIR filter with real taps over complex samples
pub struct FirFilter {
    coefficients: Vec<f32>,
    delay_line: Vec<ComplexSample>,
    position: usize,
}

impl FirFilter {
    /// Create a new FIR filter with the given coefficients
    pub fn new(coefficients: Vec<f32>) -> Self {
        let len = coefficients.len();
        Self {
            coefficients,
            delay_line: vec![ComplexSample::new(0.0, 0.0); len],
            position: 0,
        }
    }

    /// Windowed-sinc lowpass with unity DC gain
    pub fn lowpass(tap_count: usize, sample_rate: f64, cutoff_hz: f64) -> Self {
        Self::new(lowpass_taps(tap_count, sample_rate, cutoff_hz))
    }

    /// Root-raised-cosine symbol filter
    pub fn root_raised_cosine(tap_count: usize, samples_per_symbol: f32, rolloff: f32) -> Self {
        Self::new(root_raised_cosine_taps(tap_count, samples_per_symbol, rolloff))
    }

    /// Process a single sample through the filter
    pub fn process(&mut self, sample: ComplexSample) -> ComplexSample {
        self.delay_line[self.position] = sample;

        let mut output = ComplexSample::new(0.0, 0.0);
        let len = self.coefficients.len();

        for i in 0..len {
            let delay_idx = (self.position + len - i) % len;
            output += self.delay_line[delay_idx] * self.coefficients[i];
        }

        self.position = (self.position + 1) % len;
        output
    }

    /// Reset the filter state
    pub fn reset(&mut self) {
        self.delay_line.fill(ComplexSample::new(0.0, 0.0));
        self.position = 0;
    }

    /// Tap count, which is also the group delay times two plus one for
    /// odd-length filters
    pub fn len(&self) -> usize {
        self.coefficients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coefficients.is_empty()
    }
}

/// Complex matched filter centered on a single tone.
///
/// The taps are a windowed complex exponential at the tone frequency, so the
/// output magnitude measures how much of that tone is present right now. Two
/// of these, one on mark and one on space, make an FSK discriminator.
pub struct ToneFilter {
    coefficients: Vec<ComplexSample>,
    delay_line: Vec<ComplexSample>,
    position: usize,
}

impl ToneFilter {
    /// Build a matched filter at `tone_hz` relative to baseband center
    pub fn new(tone_hz: f64, sample_rate: f64, tap_count: usize) -> Self {
        let mut coefficients = vec![ComplexSample::new(0.0, 0.0); tap_count];
        let mut window_sum = 0.0f32;

        for (i, c) in coefficients.iter_mut().enumerate() {
            let window = 0.5 * (1.0 - (2.0 * PI * i as f32 / tap_count as f32).cos());
            let angle = 2.0 * std::f64::consts::PI * tone_hz * i as f64 / sample_rate;
            *c = ComplexSample::new(angle.cos() as f32, angle.sin() as f32) * window;
            window_sum += window;
        }

        // Unity gain for the tone the filter is matched to
        for c in &mut coefficients {
            *c /= window_sum;
        }

        Self {
            coefficients,
            delay_line: vec![ComplexSample::new(0.0, 0.0); tap_count],
            position: 0,
        }
    }

    /// Process a single sample, returning the correlation against the tone
    pub fn process(&mut self, sample: ComplexSample) -> ComplexSample {
        self.delay_line[self.position] = sample;

        let mut output = ComplexSample::new(0.0, 0.0);
        let len = self.coefficients.len();

        for i in 0..len {
            let delay_idx = (self.position + len - i) % len;
            output += self.delay_line[delay_idx] * self.coefficients[i];
        }

        self.position = (self.position + 1) % len;
        output
    }

    pub fn reset(&mut self) {
        self.delay_line.fill(ComplexSample::new(0.0, 0.0));
        self.position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::nco::Nco;

    #[test]
    fn test_lowpass_passes_dc() {
        let mut filter = FirFilter::lowpass(63, 48000.0, 1000.0);

        // Feed DC (constant 1.0) through the filter; should converge to ~1.0
        let mut output = ComplexSample::new(0.0, 0.0);
        for _ in 0..200 {
            output = filter.process(ComplexSample::new(1.0, 0.0));
        }

        assert!(
            (output.re - 1.0).abs() < 0.01,
            "DC signal should pass through lowpass unchanged, got {}",
            output.re
        );
    }

    #[test]
    fn test_lowpass_attenuates_high_frequency() {
        // Lowpass at 100 Hz, feed a 10 kHz complex tone; should be heavily attenuated
        let mut filter = FirFilter::lowpass(63, 48000.0, 100.0);
        let mut tone = Nco::new(10_000.0, 48000.0);

        let mut max_output = 0.0f32;
        for i in 0..1000 {
            let out = filter.process(tone.next_iq());
            if i > 100 {
                // Skip transient
                max_output = max_output.max(out.norm());
            }
        }

        assert!(
            max_output < 0.05,
            "10 kHz tone should be attenuated by lowpass at 100 Hz, got {}",
            max_output
        );
    }

    #[test]
    fn test_lowpass_coefficients_normalized() {
        let taps = lowpass_taps(63, 48000.0, 1000.0);
        // Coefficients should sum to ~1.0 (unity DC gain)
        let sum: f32 = taps.iter().sum();
        assert!(
            (sum - 1.0).abs() < 0.01,
            "Coefficients should sum to ~1.0, got {}",
            sum
        );
    }

    #[test]
    fn test_rrc_taps_symmetric() {
        let taps = root_raised_cosine_taps(65, 8.0, 0.35);
        for i in 0..taps.len() / 2 {
            let mirror = taps.len() - 1 - i;
            assert!(
                (taps[i] - taps[mirror]).abs() < 1e-5,
                "RRC taps should be symmetric: taps[{}]={} taps[{}]={}",
                i,
                taps[i],
                mirror,
                taps[mirror]
            );
        }
    }

    #[test]
    fn test_rrc_peak_at_center() {
        let taps = root_raised_cosine_taps(65, 8.0, 0.35);
        let center = taps.len() / 2;
        let peak = taps
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, center, "main lobe should sit at the center tap");
    }

    #[test]
    fn test_tone_filter_passes_matched_tone() {
        let mut filter = ToneFilter::new(200.0, 6000.0, 64);
        let mut tone = Nco::new(200.0, 6000.0);

        let mut out = ComplexSample::new(0.0, 0.0);
        for _ in 0..500 {
            out = filter.process(tone.next_iq());
        }

        assert!(
            out.norm() > 0.9,
            "matched tone should pass with ~unity gain, got {}",
            out.norm()
        );
    }

    #[test]
    fn test_tone_filter_rejects_opposite_tone() {
        // Mark filter at +85 Hz should barely respond to the space tone at -85 Hz
        let mut filter = ToneFilter::new(85.0, 6000.0, 128);
        let mut tone = Nco::new(-85.0, 6000.0);

        let mut max_output = 0.0f32;
        for i in 0..2000 {
            let out = filter.process(tone.next_iq());
            if i > 200 {
                max_output = max_output.max(out.norm());
            }
        }

        assert!(
            max_output < 0.2,
            "opposite tone should be rejected, got {}",
            max_output
        );
    }

    #[test]
    fn test_reset_clears_state() {
        let mut filter = FirFilter::lowpass(63, 48000.0, 1000.0);

        // Feed some samples
        for _ in 0..100 {
            filter.process(ComplexSample::new(1.0, 0.0));
        }

        filter.reset();

        // After reset, processing 0.0 should give 0.0
        let out = filter.process(ComplexSample::new(0.0, 0.0));
        assert_eq!(out.norm(), 0.0);
    }
}
