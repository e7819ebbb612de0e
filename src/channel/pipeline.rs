//! Per-channel processing pipeline
//!
//! One pipeline owns everything a channel needs: level metering, the
//! rate-matching resampler, the mixing NCO, AGC, and the protocol decoder
//! selected by the settings. All protocols share this skeleton; only the
//! decoder at the end differs. The radial decoder alone bypasses the AGC,
//! which would otherwise flatten the envelope it measures.
//!
//! Settings changes are applied between feed batches. A change names the
//! keys that moved: parameter keys tweak the running stages in place,
//! structural keys (and `force`) rebuild the pipeline into a clean
//! searching state. Invalid settings are rejected up front and leave the
//! previous configuration running.

use crate::domain::{
    ChannelSettings, ComplexSample, DecodedEvent, DemodError, DemodResult, LevelReport,
    ProtocolSettings, SettingKey,
};
use crate::dsp::{Agc, Nco, Resampler};
use crate::modem::navradial::{RadialDecoder, RADIAL_RATE};
use crate::modem::psk::{PskDemod, PSK_SAMPLES_PER_SYMBOL};
use crate::modem::rtty::{RttyDemod, RTTY_RATE};
use crate::modem::timecode::{TimeCodeDemod, TIMECODE_RATE};
use crate::modem::Demodulator;
use crate::ports::debug::{DebugFrame, DebugSink};

/// Per-branch filter length of the rate converter
const RESAMPLER_TAPS: usize = 48;

/// AGC drives the decoder input toward unit magnitude
const AGC_TARGET: f32 = 1.0;

/// Magnitude-squared accumulators behind `getLevels`: read-and-clear
struct LevelMeter {
    sum: f64,
    peak: f32,
    count: u64,
}

impl LevelMeter {
    fn new() -> Self {
        Self {
            sum: 0.0,
            peak: 0.0,
            count: 0,
        }
    }

    fn record(&mut self, magnitude_squared: f32) {
        self.sum += magnitude_squared as f64;
        self.peak = self.peak.max(magnitude_squared);
        self.count += 1;
    }

    fn take(&mut self) -> LevelReport {
        let avg = if self.count > 0 {
            (self.sum / self.count as f64) as f32
        } else {
            0.0
        };
        let report = LevelReport {
            avg,
            peak: self.peak,
            count: self.count,
        };
        *self = Self::new();
        report
    }
}

/// The protocol decoder stage, selected once at settings-apply time
pub enum ProtocolDemod {
    Rtty(RttyDemod),
    TimeCode(TimeCodeDemod),
    Psk(PskDemod),
    NavRadial(RadialDecoder),
}

impl ProtocolDemod {
    fn build(protocol: &ProtocolSettings) -> Self {
        match protocol {
            ProtocolSettings::Rtty {
                baud,
                shift_hz,
                filter,
                squelch_db,
                msb_first,
                stop_bits: _,
            } => ProtocolDemod::Rtty(RttyDemod::new(
                *baud, *shift_hz, *filter, *squelch_db, *msb_first,
            )),
            ProtocolSettings::TimeCode { station, threshold } => {
                ProtocolDemod::TimeCode(TimeCodeDemod::new(*station, *threshold))
            }
            ProtocolSettings::Psk {
                order,
                symbol_rate,
                loop_bandwidth,
                rolloff,
                equalizer,
                unique_word,
                frame_bytes,
                msb_first,
            } => ProtocolDemod::Psk(PskDemod::new(
                *order,
                *symbol_rate,
                *loop_bandwidth,
                *rolloff,
                *equalizer,
                *unique_word,
                *frame_bytes,
                *msb_first,
            )),
            ProtocolSettings::NavRadial => ProtocolDemod::NavRadial(RadialDecoder::new()),
        }
    }

    /// Decoder quality metric for the debug tap: equalizer error power when
    /// one is running, else the carrier-loop error, zero for loop-free
    /// protocols
    fn quality(&self) -> f32 {
        match self {
            ProtocolDemod::Psk(psk) => {
                psk.equalizer_error().unwrap_or_else(|| psk.loop_error())
            }
            _ => 0.0,
        }
    }

    /// The radial decoder measures bearing from the shape of the AM
    /// envelope, so the pipeline must hand it unleveled samples
    fn skips_leveling(&self) -> bool {
        matches!(self, ProtocolDemod::NavRadial(_))
    }
}

impl Demodulator for ProtocolDemod {
    fn process(&mut self, sample: ComplexSample, events: &mut Vec<DecodedEvent>) {
        match self {
            ProtocolDemod::Rtty(d) => d.process(sample, events),
            ProtocolDemod::TimeCode(d) => d.process(sample, events),
            ProtocolDemod::Psk(d) => d.process(sample, events),
            ProtocolDemod::NavRadial(d) => d.process(sample, events),
        }
    }

    fn internal_rate(&self) -> f64 {
        match self {
            ProtocolDemod::Rtty(d) => d.internal_rate(),
            ProtocolDemod::TimeCode(d) => d.internal_rate(),
            ProtocolDemod::Psk(d) => d.internal_rate(),
            ProtocolDemod::NavRadial(d) => d.internal_rate(),
        }
    }

    fn reset(&mut self) {
        match self {
            ProtocolDemod::Rtty(d) => d.reset(),
            ProtocolDemod::TimeCode(d) => d.reset(),
            ProtocolDemod::Psk(d) => d.reset(),
            ProtocolDemod::NavRadial(d) => d.reset(),
        }
    }
}

/// Complete per-channel chain from channel-rate samples to decoded events
pub struct ChannelPipeline {
    settings: ChannelSettings,
    internal_rate: f64,
    meter: LevelMeter,
    resampler: Resampler,
    nco: Nco,
    agc: Agc,
    demod: ProtocolDemod,
    debug: Option<Box<dyn DebugSink>>,
}

impl ChannelPipeline {
    pub fn new(settings: ChannelSettings) -> DemodResult<Self> {
        validate(&settings)?;

        let internal_rate = internal_rate_for(&settings.protocol);
        Ok(Self {
            resampler: build_resampler(&settings, internal_rate),
            nco: build_nco(&settings, internal_rate),
            agc: Agc::new(AGC_TARGET),
            demod: ProtocolDemod::build(&settings.protocol),
            meter: LevelMeter::new(),
            internal_rate,
            settings,
            debug: None,
        })
    }

    /// Process a batch: meter, resample to the decoder's rate, mix the
    /// tuning offset to baseband, level (unless the decoder wants the raw
    /// envelope), decode.
    pub fn feed(&mut self, samples: &[ComplexSample], events: &mut Vec<DecodedEvent>) {
        for &sample in samples {
            let raw = sample.norm_sqr();
            self.meter.record(raw);

            self.resampler.push(sample);
            while let Some(resampled) = self.resampler.next_output() {
                let mixed = self.nco.rotate(resampled);
                let leveled = if self.demod.skips_leveling() {
                    mixed
                } else {
                    self.agc.process(mixed)
                };
                self.demod.process(leveled, events);

                if let Some(sink) = &mut self.debug {
                    sink.push(DebugFrame {
                        raw: raw.sqrt(),
                        leveled: leveled.norm(),
                        quality: self.demod.quality(),
                    });
                }
            }
        }
    }

    /// Apply a settings snapshot.
    ///
    /// `changed` names the keys that differ from the running settings;
    /// `force` (or any structural key, or a protocol family change)
    /// rebuilds the whole chain into a clean searching state. Validation
    /// failures leave the previous settings running.
    pub fn apply_settings(
        &mut self,
        settings: &ChannelSettings,
        changed: &[SettingKey],
        force: bool,
    ) -> DemodResult<()> {
        validate(settings)?;

        let family_changed = std::mem::discriminant(&settings.protocol)
            != std::mem::discriminant(&self.settings.protocol);
        let structural = changed
            .iter()
            .any(|&key| ChannelSettings::is_structural(key));

        if force || family_changed || structural {
            let debug = self.debug.take();
            let mut fresh = Self::new(settings.clone())?;
            fresh.debug = debug;
            *self = fresh;
            return Ok(());
        }

        let mut retune_front = false;
        for &key in changed {
            match key {
                SettingKey::FrequencyOffset | SettingKey::Bandwidth => retune_front = true,
                SettingKey::Baud => {
                    if let (
                        ProtocolDemod::Rtty(demod),
                        ProtocolSettings::Rtty { baud, .. },
                    ) = (&mut self.demod, &settings.protocol)
                    {
                        demod.set_baud(*baud);
                    }
                }
                SettingKey::ShiftHz => {
                    if let (
                        ProtocolDemod::Rtty(demod),
                        ProtocolSettings::Rtty { shift_hz, .. },
                    ) = (&mut self.demod, &settings.protocol)
                    {
                        demod.set_shift(*shift_hz);
                    }
                }
                SettingKey::SquelchDb => {
                    if let (
                        ProtocolDemod::Rtty(demod),
                        ProtocolSettings::Rtty { squelch_db, .. },
                    ) = (&mut self.demod, &settings.protocol)
                    {
                        demod.set_squelch_db(*squelch_db);
                    }
                }
                SettingKey::BitOrder => match (&mut self.demod, &settings.protocol) {
                    (ProtocolDemod::Rtty(demod), ProtocolSettings::Rtty { msb_first, .. }) => {
                        demod.set_bit_order(*msb_first)
                    }
                    (ProtocolDemod::Psk(demod), ProtocolSettings::Psk { msb_first, .. }) => {
                        demod.set_bit_order(*msb_first)
                    }
                    _ => {}
                },
                // Stop bits shape transmitted frames; reception latches the
                // first stop position either way
                SettingKey::StopBits => {}
                SettingKey::Threshold => {
                    if let (
                        ProtocolDemod::TimeCode(demod),
                        ProtocolSettings::TimeCode { threshold, .. },
                    ) = (&mut self.demod, &settings.protocol)
                    {
                        demod.set_threshold(*threshold);
                    }
                }
                SettingKey::LoopBandwidth => {
                    if let (
                        ProtocolDemod::Psk(demod),
                        ProtocolSettings::Psk { loop_bandwidth, .. },
                    ) = (&mut self.demod, &settings.protocol)
                    {
                        demod.set_loop_bandwidth(*loop_bandwidth);
                    }
                }
                SettingKey::UniqueWord => {
                    if let (
                        ProtocolDemod::Psk(demod),
                        ProtocolSettings::Psk { unique_word, .. },
                    ) = (&mut self.demod, &settings.protocol)
                    {
                        demod.set_unique_word(*unique_word);
                    }
                }
                SettingKey::FrameBytes => {
                    if let (
                        ProtocolDemod::Psk(demod),
                        ProtocolSettings::Psk { frame_bytes, .. },
                    ) = (&mut self.demod, &settings.protocol)
                    {
                        demod.set_frame_bytes(*frame_bytes);
                    }
                }
                // Structural keys were handled by the rebuild branch
                _ => {}
            }
        }

        if retune_front {
            self.resampler = build_resampler(settings, self.internal_rate);
            self.nco = build_nco(settings, self.internal_rate);
        }

        self.settings = settings.clone();
        Ok(())
    }

    /// Drain the level accumulators; each call reads and clears
    pub fn levels(&mut self) -> LevelReport {
        self.meter.take()
    }

    pub fn settings(&self) -> &ChannelSettings {
        &self.settings
    }

    pub fn internal_rate(&self) -> f64 {
        self.internal_rate
    }

    /// Attach an observational tap; replaces any existing sink
    pub fn set_debug_sink(&mut self, sink: Box<dyn DebugSink>) {
        self.debug = Some(sink);
    }

    pub fn clear_debug_sink(&mut self) {
        self.debug = None;
    }
}

/// Decoder working rate for each protocol family
fn internal_rate_for(protocol: &ProtocolSettings) -> f64 {
    match protocol {
        ProtocolSettings::Rtty { .. } => RTTY_RATE,
        ProtocolSettings::TimeCode { .. } => TIMECODE_RATE,
        ProtocolSettings::Psk { symbol_rate, .. } => {
            symbol_rate * PSK_SAMPLES_PER_SYMBOL as f64
        }
        ProtocolSettings::NavRadial => RADIAL_RATE,
    }
}

/// Two-sided signal bandwidth assumed when the settings leave it at zero
fn default_bandwidth(protocol: &ProtocolSettings) -> f64 {
    match protocol {
        ProtocolSettings::Rtty { baud, shift_hz, .. } => shift_hz + 8.0 * baud,
        ProtocolSettings::TimeCode { .. } => 600.0,
        ProtocolSettings::Psk {
            symbol_rate,
            rolloff,
            ..
        } => symbol_rate * (1.0 + *rolloff as f64) * 1.1,
        ProtocolSettings::NavRadial => 21_600.0,
    }
}

fn build_resampler(settings: &ChannelSettings, internal_rate: f64) -> Resampler {
    let bandwidth = if settings.bandwidth > 0.0 {
        settings.bandwidth
    } else {
        default_bandwidth(&settings.protocol)
    };
    // The tuned-to band has to survive into the decimated stream, so the
    // anti-alias cutoff covers the offset plus half the signal bandwidth
    let limit = 0.45 * internal_rate.min(settings.channel_rate);
    let cutoff = (settings.frequency_offset.abs() + bandwidth / 2.0).clamp(50.0, limit);

    Resampler::new(RESAMPLER_TAPS, settings.channel_rate, internal_rate, cutoff)
}

fn build_nco(settings: &ChannelSettings, internal_rate: f64) -> Nco {
    // Negative frequency mixes a positive offset down to baseband
    Nco::new(-settings.frequency_offset, internal_rate)
}

fn validate(settings: &ChannelSettings) -> DemodResult<()> {
    let invalid = |message: String| Err(DemodError::InvalidSettings(message));

    if !settings.channel_rate.is_finite() || settings.channel_rate <= 0.0 {
        return invalid(format!(
            "channel rate must be positive, got {}",
            settings.channel_rate
        ));
    }
    if settings.frequency_offset.abs() >= settings.channel_rate / 2.0 {
        return invalid(format!(
            "frequency offset {} Hz falls outside the channel",
            settings.frequency_offset
        ));
    }
    // The offset must also survive decimation to the decoder's rate
    let internal_rate = internal_rate_for(&settings.protocol);
    if settings.frequency_offset.abs() >= internal_rate / 2.0 {
        return invalid(format!(
            "frequency offset {} Hz exceeds the {internal_rate} Hz decoder band",
            settings.frequency_offset
        ));
    }
    if settings.bandwidth < 0.0 {
        return invalid(format!("bandwidth must not be negative, got {}", settings.bandwidth));
    }

    match &settings.protocol {
        ProtocolSettings::Rtty {
            baud,
            shift_hz,
            stop_bits,
            ..
        } => {
            if !baud.is_finite() || !(1.0..=600.0).contains(baud) {
                return invalid(format!("baud rate {baud} out of range"));
            }
            if !(1.0..RTTY_RATE / 2.0).contains(shift_hz) {
                return invalid(format!("frequency shift {shift_hz} Hz out of range"));
            }
            if !(1.0..=2.0).contains(stop_bits) {
                return invalid(format!("stop bits {stop_bits} out of range"));
            }
        }
        ProtocolSettings::TimeCode { threshold, .. } => {
            if !(0.0..1.0).contains(threshold) || *threshold == 0.0 {
                return invalid(format!("pulse threshold {threshold} out of range"));
            }
        }
        ProtocolSettings::Psk {
            symbol_rate,
            loop_bandwidth,
            rolloff,
            frame_bytes,
            ..
        } => {
            if !symbol_rate.is_finite() || *symbol_rate <= 0.0 {
                return invalid(format!("symbol rate {symbol_rate} out of range"));
            }
            if !(0.0..0.5).contains(loop_bandwidth) || *loop_bandwidth == 0.0 {
                return invalid(format!("loop bandwidth {loop_bandwidth} out of range"));
            }
            if !(0.0..=1.0).contains(rolloff) {
                return invalid(format!("rolloff {rolloff} out of range"));
            }
            if *frame_bytes == 0 || *frame_bytes > 4096 {
                return invalid(format!("frame length {frame_bytes} out of range"));
            }
        }
        ProtocolSettings::NavRadial => {
            if settings.channel_rate < 21_000.0 {
                return invalid(format!(
                    "channel rate {} Hz is too low for the radial subcarrier",
                    settings.channel_rate
                ));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RttyFilter;
    use crate::modem::encoder::RttyEncoder;

    fn rtty_settings() -> ChannelSettings {
        ChannelSettings {
            channel_rate: 48_000.0,
            frequency_offset: 0.0,
            bandwidth: 0.0,
            protocol: ProtocolSettings::Rtty {
                baud: 45.45,
                shift_hz: 170.0,
                filter: RttyFilter::DualTone,
                squelch_db: -30.0,
                msb_first: false,
                stop_bits: 1.5,
            },
        }
    }

    fn characters(events: &[DecodedEvent]) -> String {
        events
            .iter()
            .filter_map(|e| match e {
                DecodedEvent::Character(c) => Some(*c),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_rtty_through_full_chain() {
        let settings = rtty_settings();
        let signal = RttyEncoder::new(48_000.0, 45.45, 170.0, 1.5, false).encode("CQ");

        let mut pipeline = ChannelPipeline::new(settings).unwrap();
        let mut events = Vec::new();
        pipeline.feed(&signal, &mut events);

        assert_eq!(characters(&events), "CQ");
    }

    #[test]
    fn test_frequency_offset_is_mixed_out() {
        let mut settings = rtty_settings();
        settings.frequency_offset = 800.0;

        let baseband = RttyEncoder::new(48_000.0, 45.45, 170.0, 1.5, false).encode("DE");
        let shifted: Vec<ComplexSample> = baseband
            .iter()
            .enumerate()
            .map(|(n, &s)| {
                let angle = 2.0 * std::f64::consts::PI * 800.0 * n as f64 / 48_000.0;
                s * ComplexSample::new(angle.cos() as f32, angle.sin() as f32)
            })
            .collect();

        let mut pipeline = ChannelPipeline::new(settings).unwrap();
        let mut events = Vec::new();
        pipeline.feed(&shifted, &mut events);

        assert_eq!(characters(&events), "DE");
    }

    #[test]
    fn test_force_apply_is_idempotent() {
        let settings = rtty_settings();
        let signal = RttyEncoder::new(48_000.0, 45.45, 170.0, 1.5, false).encode("OK");

        let mut fresh = ChannelPipeline::new(settings.clone()).unwrap();
        let mut once = ChannelPipeline::new(settings.clone()).unwrap();
        once.apply_settings(&settings, ChannelSettings::all_keys(), true)
            .unwrap();
        let mut twice = ChannelPipeline::new(settings.clone()).unwrap();
        twice
            .apply_settings(&settings, ChannelSettings::all_keys(), true)
            .unwrap();
        twice
            .apply_settings(&settings, ChannelSettings::all_keys(), true)
            .unwrap();

        let mut events_fresh = Vec::new();
        let mut events_once = Vec::new();
        let mut events_twice = Vec::new();
        fresh.feed(&signal, &mut events_fresh);
        once.feed(&signal, &mut events_once);
        twice.feed(&signal, &mut events_twice);

        assert_eq!(
            events_fresh, events_once,
            "a forced apply must reproduce the freshly built state"
        );
        assert_eq!(events_once, events_twice);
    }

    #[test]
    fn test_invalid_settings_leave_channel_running() {
        let settings = rtty_settings();
        let mut pipeline = ChannelPipeline::new(settings.clone()).unwrap();

        let mut broken = settings.clone();
        if let ProtocolSettings::Rtty { baud, .. } = &mut broken.protocol {
            *baud = 0.0;
        }
        let result = pipeline.apply_settings(&broken, &[SettingKey::Baud], false);
        assert!(result.is_err());
        assert_eq!(pipeline.settings(), &settings);

        // Old configuration still decodes
        let signal = RttyEncoder::new(48_000.0, 45.45, 170.0, 1.5, false).encode("R");
        let mut events = Vec::new();
        pipeline.feed(&signal, &mut events);
        assert_eq!(characters(&events), "R");
    }

    #[test]
    fn test_parameter_tweak_preserves_decode_state() {
        let settings = rtty_settings();
        let signal = RttyEncoder::new(48_000.0, 45.45, 170.0, 1.5, false).encode("Y");

        let mut pipeline = ChannelPipeline::new(settings.clone()).unwrap();
        let mut events = Vec::new();

        // Split mid-character, nudge a non-structural key, then continue
        let split = signal.len() / 2;
        pipeline.feed(&signal[..split], &mut events);

        let mut adjusted = settings.clone();
        if let ProtocolSettings::Rtty { squelch_db, .. } = &mut adjusted.protocol {
            *squelch_db = -40.0;
        }
        pipeline
            .apply_settings(&adjusted, &[SettingKey::SquelchDb], false)
            .unwrap();

        pipeline.feed(&signal[split..], &mut events);
        assert_eq!(characters(&events), "Y");
    }

    #[test]
    fn test_levels_read_and_clear() {
        let settings = rtty_settings();
        let mut pipeline = ChannelPipeline::new(settings).unwrap();

        let samples = vec![ComplexSample::new(0.5, 0.0); 1000];
        let mut events = Vec::new();
        pipeline.feed(&samples, &mut events);

        let report = pipeline.levels();
        assert_eq!(report.count, 1000);
        assert!((report.avg - 0.25).abs() < 1e-3, "avg {}", report.avg);
        assert!((report.peak - 0.25).abs() < 1e-3, "peak {}", report.peak);

        let drained = pipeline.levels();
        assert_eq!(drained.count, 0);
        assert_eq!(drained.avg, 0.0);
    }

    #[test]
    fn test_navradial_requires_wide_channel() {
        let settings = ChannelSettings {
            channel_rate: 8_000.0,
            frequency_offset: 0.0,
            bandwidth: 0.0,
            protocol: ProtocolSettings::NavRadial,
        };
        assert!(ChannelPipeline::new(settings).is_err());
    }

    #[test]
    fn test_debug_tap_sees_leveled_samples() {
        use crate::ports::debug::MemorySink;

        let settings = rtty_settings();
        let mut pipeline = ChannelPipeline::new(settings).unwrap();
        pipeline.set_debug_sink(Box::new(MemorySink::new(64)));

        let signal = RttyEncoder::new(48_000.0, 45.45, 170.0, 1.5, false).encode("T");
        let mut events = Vec::new();
        pipeline.feed(&signal, &mut events);
        // The sink is owned by the pipeline; reaching it again is the
        // embedder's concern, here we only prove the tap does not disturb
        // the decode path
        assert_eq!(characters(&events), "T");
    }
}
