//! VOR-style navigation radial decoder
//!
//! A VOR carrier is amplitude modulated twice: directly by a 30 Hz tone
//! whose phase varies with the bearing from the station, and by a 9960 Hz
//! subcarrier frequency modulated ±480 Hz at the same 30 Hz, whose phase
//! is the bearing-independent reference. The radial is the phase of the
//! variable tone measured against the reference tone.
//!
//! Both phases come from quadrature correlation against a shared 30 Hz
//! oscillator over one-second windows, which at the fixed working rate
//! holds an exact whole number of tone cycles, so DC and the subcarrier
//! region integrate out of the variable correlation without extra
//! filtering.

use crate::domain::{ComplexSample, DecodedEvent};
use crate::dsp::FirFilter;
use crate::modem::Demodulator;

/// Fixed internal processing rate. Wide enough to hold the 9960 Hz
/// subcarrier and its FM sidebands.
pub const RADIAL_RATE: f64 = 25_000.0;

const TONE_HZ: f64 = 30.0;
const SUBCARRIER_HZ: f64 = 9960.0;

/// Lowpass applied after mixing the subcarrier to baseband; passes the
/// ±480 Hz deviation with margin.
const SUBCARRIER_CUTOFF_HZ: f64 = 700.0;
const SUBCARRIER_TAPS: usize = 65;

type Accumulator = num_complex::Complex<f64>;

/// Bearing decoder: one radial estimate per one-second window
pub struct RadialDecoder {
    window: usize,
    position: usize,
    tone_phase: f64,
    mix_phase: f64,
    var_corr: Accumulator,
    ref_corr: Accumulator,
    env_sum: f64,
    env_sq: f64,
    ref_sq: f64,
    subcarrier_filter: FirFilter,
    prev_subcarrier: ComplexSample,
    /// 30 Hz phase the subcarrier path loses to filter group delay,
    /// added back to the measured bearing
    delay_correction: f64,
}

impl RadialDecoder {
    pub fn new() -> Self {
        let tone_step = 2.0 * std::f64::consts::PI * TONE_HZ / RADIAL_RATE;
        // Filter group delay plus the discriminator's half-sample
        let path_delay = (SUBCARRIER_TAPS - 1) as f64 / 2.0 + 0.5;

        Self {
            window: RADIAL_RATE as usize,
            position: 0,
            tone_phase: 0.0,
            mix_phase: 0.0,
            var_corr: Accumulator::new(0.0, 0.0),
            ref_corr: Accumulator::new(0.0, 0.0),
            env_sum: 0.0,
            env_sq: 0.0,
            ref_sq: 0.0,
            subcarrier_filter: FirFilter::lowpass(
                SUBCARRIER_TAPS,
                RADIAL_RATE,
                SUBCARRIER_CUTOFF_HZ,
            ),
            prev_subcarrier: ComplexSample::new(0.0, 0.0),
            delay_correction: tone_step * path_delay,
        }
    }

    fn clear_window(&mut self) {
        self.position = 0;
        self.var_corr = Accumulator::new(0.0, 0.0);
        self.ref_corr = Accumulator::new(0.0, 0.0);
        self.env_sum = 0.0;
        self.env_sq = 0.0;
        self.ref_sq = 0.0;
    }

    fn emit(&mut self, events: &mut Vec<DecodedEvent>) {
        let n = self.window as f64;

        // Normalized correlation magnitudes: 1.0 for a pure tone, less as
        // other components share the power
        let env_variance = (self.env_sq - self.env_sum * self.env_sum / n).max(0.0);
        let var_quality = if env_variance > 0.0 {
            self.var_corr.norm() / (n / 2.0 * env_variance).sqrt()
        } else {
            0.0
        };
        let ref_quality = if self.ref_sq > 0.0 {
            self.ref_corr.norm() / (n / 2.0 * self.ref_sq).sqrt()
        } else {
            0.0
        };

        let bearing = (self.ref_corr * self.var_corr.conj()).arg() + self.delay_correction;
        let bearing_deg = bearing.to_degrees().rem_euclid(360.0);

        events.push(DecodedEvent::Radial {
            bearing_deg: bearing_deg as f32,
            confidence: var_quality.min(ref_quality).clamp(0.0, 1.0) as f32,
        });
        self.clear_window();
    }
}

impl Default for RadialDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Demodulator for RadialDecoder {
    fn process(&mut self, sample: ComplexSample, events: &mut Vec<DecodedEvent>) {
        const TWO_PI: f64 = 2.0 * std::f64::consts::PI;
        let tone_step = TWO_PI * TONE_HZ / RADIAL_RATE;
        let mix_step = TWO_PI * SUBCARRIER_HZ / RADIAL_RATE;

        let envelope = sample.norm() as f64;
        let tone = Accumulator::new(self.tone_phase.cos(), -self.tone_phase.sin());

        // Variable phase: 30 Hz component of the envelope
        self.var_corr += tone * envelope;
        self.env_sum += envelope;
        self.env_sq += envelope * envelope;

        // Reference phase: discriminate the FM subcarrier, then correlate
        // the recovered 30 Hz modulation against the same oscillator
        let mixed = ComplexSample::new(
            (envelope * self.mix_phase.cos()) as f32,
            -(envelope * self.mix_phase.sin()) as f32,
        );
        let subcarrier = self.subcarrier_filter.process(mixed);
        let deviation = (subcarrier * self.prev_subcarrier.conj()).arg() as f64;
        self.prev_subcarrier = subcarrier;

        self.ref_corr += tone * deviation;
        self.ref_sq += deviation * deviation;

        self.tone_phase = (self.tone_phase + tone_step) % TWO_PI;
        self.mix_phase = (self.mix_phase + mix_step) % TWO_PI;

        self.position += 1;
        if self.position == self.window {
            self.emit(events);
        }
    }

    fn internal_rate(&self) -> f64 {
        RADIAL_RATE
    }

    fn reset(&mut self) {
        self.clear_window();
        self.tone_phase = 0.0;
        self.mix_phase = 0.0;
        self.subcarrier_filter.reset();
        self.prev_subcarrier = ComplexSample::new(0.0, 0.0);
    }
}
