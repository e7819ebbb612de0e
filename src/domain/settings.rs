//! Channel settings: everything a running channel can be reconfigured with

use crate::domain::types::ComplexSample;
use serde::{Deserialize, Serialize};

fn default_channel_rate() -> f64 {
    48_000.0
}

fn default_rtty_baud() -> f64 {
    45.45
}

fn default_rtty_shift() -> f64 {
    170.0
}

fn default_squelch_db() -> f32 {
    -30.0
}

fn default_stop_bits() -> f32 {
    1.5
}

fn default_psk_symbol_rate() -> f64 {
    1200.0
}

fn default_loop_bandwidth() -> f32 {
    0.02
}

fn default_rolloff() -> f32 {
    0.35
}

fn default_unique_word() -> u32 {
    0x1ACF_FC1D
}

fn default_frame_bytes() -> usize {
    64
}

fn default_pulse_threshold() -> f32 {
    0.5
}

/// Phase modulation order for the suppressed-carrier packet demodulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PskOrder {
    Bpsk,
    Qpsk,
    Psk8,
}

impl PskOrder {
    /// Bits carried per symbol
    pub fn bits_per_symbol(&self) -> u32 {
        match self {
            PskOrder::Bpsk => 1,
            PskOrder::Qpsk => 2,
            PskOrder::Psk8 => 3,
        }
    }

    /// Number of constellation points
    pub fn points(&self) -> u32 {
        1 << self.bits_per_symbol()
    }

    /// Angle of constellation point zero.
    ///
    /// BPSK sits on the real axis; QPSK and 8PSK are offset by half a point
    /// spacing, which is where the matching Costas detectors have their
    /// stable zeros.
    pub fn angle_offset(&self) -> f32 {
        match self {
            PskOrder::Bpsk => 0.0,
            PskOrder::Qpsk => std::f32::consts::FRAC_PI_4,
            PskOrder::Psk8 => std::f32::consts::PI / 8.0,
        }
    }

    /// Hard decision: nearest ideal constellation point and its index.
    ///
    /// Index k corresponds to the point at `angle_offset + k * 2π/M`,
    /// counterclockwise from the positive real axis.
    pub fn demap(&self, sample: ComplexSample) -> (u32, ComplexSample) {
        let points = self.points() as i32;
        let step = 2.0 * std::f32::consts::PI / points as f32;
        let offset = self.angle_offset();

        let k = (((sample.arg() - offset) / step).round() as i32).rem_euclid(points);
        let angle = offset + k as f32 * step;
        (k as u32, ComplexSample::new(angle.cos(), angle.sin()))
    }
}

/// Adaptive equalizer operating mode.
///
/// `Cma` converges blind on modulus error and is the right choice for an
/// unattended link; `Lms` needs the decision-directed reference the
/// demodulator feeds it but settles faster once the carrier is locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EqualizerMode {
    Off,
    Cma,
    Lms,
}

/// Which matched-filter bank the RTTY discriminator runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RttyFilter {
    /// Complex tone filters at mark and space, magnitude difference
    DualTone,
    /// Plain FM discriminator, no per-tone filtering
    Discriminator,
}

/// Longwave time-code station to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeStation {
    /// DCF77, Mainflingen 77.5 kHz, amplitude keyed
    Dcf77,
    /// MSF, Anthorn 60 kHz, amplitude keyed
    Msf,
    /// WWVB, Fort Collins 60 kHz, pulse-width keyed
    Wwvb,
    /// TDF, Allouis 162 kHz, phase modulated with DCF77 bit layout
    Tdf,
}

/// Per-protocol settings, tagged by decoder family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum ProtocolSettings {
    Rtty {
        #[serde(default = "default_rtty_baud")]
        baud: f64,
        #[serde(default = "default_rtty_shift")]
        shift_hz: f64,
        filter: RttyFilter,
        /// Decoder gate: below this level the slicer output is discarded
        #[serde(default = "default_squelch_db")]
        squelch_db: f32,
        /// True when the station sends data bits MSB first
        #[serde(default)]
        msb_first: bool,
        #[serde(default = "default_stop_bits")]
        stop_bits: f32,
    },
    TimeCode {
        station: TimeStation,
        /// Envelope slice point as a fraction of the tracked carrier level
        #[serde(default = "default_pulse_threshold")]
        threshold: f32,
    },
    Psk {
        order: PskOrder,
        #[serde(default = "default_psk_symbol_rate")]
        symbol_rate: f64,
        #[serde(default = "default_loop_bandwidth")]
        loop_bandwidth: f32,
        #[serde(default = "default_rolloff")]
        rolloff: f32,
        equalizer: EqualizerMode,
        #[serde(default = "default_unique_word")]
        unique_word: u32,
        #[serde(default = "default_frame_bytes")]
        frame_bytes: usize,
        #[serde(default)]
        msb_first: bool,
    },
    NavRadial,
}

/// Complete configuration of one demodulation channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSettings {
    /// Input sample rate in Hz
    #[serde(default = "default_channel_rate")]
    pub channel_rate: f64,
    /// Tuning offset from the channel center in Hz, mixed out before decoding
    #[serde(default)]
    pub frequency_offset: f64,
    /// Pre-decimation filter bandwidth in Hz (0.0 selects a per-protocol default)
    #[serde(default)]
    pub bandwidth: f64,
    pub protocol: ProtocolSettings,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            channel_rate: default_channel_rate(),
            frequency_offset: 0.0,
            bandwidth: 0.0,
            protocol: ProtocolSettings::Rtty {
                baud: default_rtty_baud(),
                shift_hz: default_rtty_shift(),
                filter: RttyFilter::DualTone,
                squelch_db: default_squelch_db(),
                msb_first: false,
                stop_bits: default_stop_bits(),
            },
        }
    }
}

/// Keys for selective reconfiguration.
///
/// An apply call names the keys that changed; the channel rebuilds only the
/// stages those keys touch and leaves the rest of its state (loop phase,
/// symbol clock, decoded shift state) running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SettingKey {
    ChannelRate,
    FrequencyOffset,
    Bandwidth,
    Baud,
    ShiftHz,
    Filter,
    SquelchDb,
    BitOrder,
    StopBits,
    Station,
    Threshold,
    Order,
    SymbolRate,
    LoopBandwidth,
    Rolloff,
    Equalizer,
    UniqueWord,
    FrameBytes,
}

impl ChannelSettings {
    /// Keys whose change forces a full pipeline rebuild rather than a
    /// parameter tweak on the running stages.
    pub fn is_structural(key: SettingKey) -> bool {
        matches!(
            key,
            SettingKey::ChannelRate
                | SettingKey::Filter
                | SettingKey::Station
                | SettingKey::Order
                | SettingKey::SymbolRate
                | SettingKey::Rolloff
                | SettingKey::Equalizer
        )
    }

    /// Every key, for force-apply paths that rebuild everything
    pub fn all_keys() -> &'static [SettingKey] {
        &[
            SettingKey::ChannelRate,
            SettingKey::FrequencyOffset,
            SettingKey::Bandwidth,
            SettingKey::Baud,
            SettingKey::ShiftHz,
            SettingKey::Filter,
            SettingKey::SquelchDb,
            SettingKey::BitOrder,
            SettingKey::StopBits,
            SettingKey::Station,
            SettingKey::Threshold,
            SettingKey::Order,
            SettingKey::SymbolRate,
            SettingKey::LoopBandwidth,
            SettingKey::Rolloff,
            SettingKey::Equalizer,
            SettingKey::UniqueWord,
            SettingKey::FrameBytes,
        ]
    }
}
