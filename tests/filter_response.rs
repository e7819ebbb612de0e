//! Frequency-domain checks on the filter designers
//!
//! FFT the impulse responses and inspect passband and stopband directly,
//! instead of inferring filter shape from decode behavior alone.

use baudwalk::dsp::fir::{lowpass_taps, root_raised_cosine_taps};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

const FFT_SIZE: usize = 8192;
const SAMPLE_RATE: f64 = 48_000.0;

fn spectrum(taps: &[f32]) -> Vec<Complex<f32>> {
    let mut buffer: Vec<Complex<f32>> = taps
        .iter()
        .map(|&t| Complex::new(t, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(FFT_SIZE)
        .collect();
    let mut planner = FftPlanner::<f32>::new();
    planner.plan_fft_forward(FFT_SIZE).process(&mut buffer);
    buffer
}

fn magnitude_at(spectrum: &[Complex<f32>], freq_hz: f64) -> f32 {
    let bin = (freq_hz / SAMPLE_RATE * FFT_SIZE as f64).round() as usize;
    spectrum[bin].norm()
}

#[test]
fn test_lowpass_passband_flat() {
    let response = spectrum(&lowpass_taps(63, SAMPLE_RATE, 3000.0));

    for &freq in &[0.0, 500.0, 1000.0, 1500.0, 2000.0] {
        let magnitude = magnitude_at(&response, freq);
        assert!(
            (0.89..=1.12).contains(&magnitude),
            "passband should be flat within 1 dB, |H({freq})| = {magnitude}"
        );
    }
}

#[test]
fn test_lowpass_half_power_at_cutoff() {
    let response = spectrum(&lowpass_taps(63, SAMPLE_RATE, 3000.0));
    let magnitude = magnitude_at(&response, 3000.0);
    assert!(
        (0.4..=0.6).contains(&magnitude),
        "windowed sinc should cross ~0.5 at the cutoff, got {magnitude}"
    );
}

#[test]
fn test_lowpass_stopband_rejection() {
    let response = spectrum(&lowpass_taps(63, SAMPLE_RATE, 3000.0));

    let edge = magnitude_at(&response, 4800.0);
    assert!(edge < 0.06, "1.6x cutoff should be well down, got {edge}");

    for &freq in &[6000.0, 10_000.0, 20_000.0] {
        let magnitude = magnitude_at(&response, freq);
        assert!(
            magnitude < 0.02,
            "deep stopband expected at {freq} Hz, got {magnitude}"
        );
    }
}

#[test]
fn test_rrc_band_edge_half_power() {
    // Four samples per symbol at 48 kHz puts the symbol rate at 12 kHz;
    // the root spectrum crosses 1/sqrt(2) at half the symbol rate
    let response = spectrum(&root_raised_cosine_taps(33, 4.0, 0.35));

    let center = magnitude_at(&response, 0.0);
    let edge = magnitude_at(&response, 6000.0);
    let ratio = edge / center;
    assert!(
        (0.62..=0.79).contains(&ratio),
        "band edge should sit near -3 dB, got ratio {ratio}"
    );
}

#[test]
fn test_rrc_excess_band_limited_by_rolloff() {
    let response = spectrum(&root_raised_cosine_taps(33, 4.0, 0.35));
    let center = magnitude_at(&response, 0.0);

    // Occupied band ends at (1 + 0.35) * 6 kHz = 8.1 kHz
    for &freq in &[10_000.0, 14_000.0, 18_000.0] {
        let magnitude = magnitude_at(&response, freq) / center;
        assert!(
            magnitude < 0.05,
            "energy beyond the rolloff edge at {freq} Hz: {magnitude}"
        );
    }
}

#[test]
fn test_rrc_narrower_rolloff_narrower_spectrum() {
    let tight = spectrum(&root_raised_cosine_taps(65, 4.0, 0.2));
    let loose = spectrum(&root_raised_cosine_taps(65, 4.0, 0.8));

    // Between the two rolloff edges the wide filter still passes energy
    // where the narrow one has already fallen away
    let freq = 8500.0;
    let tight_mag = magnitude_at(&tight, freq);
    let loose_mag = magnitude_at(&loose, freq);
    assert!(
        loose_mag > 2.0 * tight_mag,
        "rolloff 0.8 should be wider than 0.2 at {freq} Hz: {loose_mag} vs {tight_mag}"
    );
}
