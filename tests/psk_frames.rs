//! Integration tests: PSK frame encoder → channel pipeline loopback
//!
//! Shape complete frames at channel rate, run them through decimation,
//! carrier recovery and the unique-word hunt, and check the payload
//! bytes come back intact, with and without a tuning offset.

use baudwalk::channel::ChannelPipeline;
use baudwalk::domain::{
    ChannelSettings, ComplexSample, DecodedEvent, EqualizerMode, ProtocolSettings, PskOrder,
};
use baudwalk::modem::encoder::PskEncoder;

const CHANNEL_RATE: f64 = 48_000.0;
const SYMBOL_RATE: f64 = 1200.0;

fn psk_settings(order: PskOrder, frame_bytes: usize) -> ChannelSettings {
    ChannelSettings {
        channel_rate: CHANNEL_RATE,
        frequency_offset: 0.0,
        bandwidth: 0.0,
        protocol: ProtocolSettings::Psk {
            order,
            symbol_rate: SYMBOL_RATE,
            loop_bandwidth: 0.05,
            rolloff: 0.35,
            equalizer: EqualizerMode::Off,
            unique_word: 0x1ACF_FC1D,
            frame_bytes,
            msb_first: false,
        },
    }
}

fn encoder_for(settings: &ChannelSettings) -> PskEncoder {
    match settings.protocol {
        ProtocolSettings::Psk {
            order,
            symbol_rate,
            rolloff,
            unique_word,
            frame_bytes,
            msb_first,
            ..
        } => PskEncoder::new(
            settings.channel_rate,
            order,
            symbol_rate,
            rolloff,
            unique_word,
            frame_bytes,
            msb_first,
        ),
        _ => unreachable!(),
    }
}

fn mix(baseband: Vec<ComplexSample>, offset: f64) -> Vec<ComplexSample> {
    if offset == 0.0 {
        return baseband;
    }
    baseband
        .iter()
        .enumerate()
        .map(|(n, &s)| {
            let angle = 2.0 * std::f64::consts::PI * offset * n as f64 / CHANNEL_RATE;
            s * ComplexSample::new(angle.cos() as f32, angle.sin() as f32)
        })
        .collect()
}

fn frames(events: &[DecodedEvent]) -> Vec<Vec<u8>> {
    events
        .iter()
        .filter_map(|e| match e {
            DecodedEvent::Frame(bytes) => Some(bytes.clone()),
            _ => None,
        })
        .collect()
}

/// Helper: shape one frame at channel rate, mix in the settings'
/// frequency offset, run the channel chain, return the decoded frames
fn loopback(payload: &[u8], settings: ChannelSettings) -> Vec<Vec<u8>> {
    let baseband = encoder_for(&settings).encode_frame(payload);
    let samples = mix(baseband, settings.frequency_offset);

    let mut pipeline = ChannelPipeline::new(settings).expect("settings should validate");
    let mut events = Vec::new();
    pipeline.feed(&samples, &mut events);

    frames(&events)
}

#[test]
fn test_qpsk_frame_through_channel() {
    let payload = b"BEACON TELEMETRY";
    let decoded = loopback(payload, psk_settings(PskOrder::Qpsk, payload.len()));

    assert_eq!(decoded.len(), 1, "expected one frame, got {}", decoded.len());
    assert_eq!(decoded[0], payload);
}

#[test]
fn test_bpsk_frame_with_tuning_offset() {
    let payload = b"PACKET ACROSS IF";
    let mut settings = psk_settings(PskOrder::Bpsk, payload.len());
    settings.frequency_offset = 600.0;
    settings.bandwidth = 2400.0;

    let decoded = loopback(payload, settings);
    assert_eq!(
        decoded.len(),
        1,
        "expected one frame across the offset, got {}",
        decoded.len()
    );
    assert_eq!(decoded[0], payload);
}

#[test]
fn test_back_to_back_frames_decode_independently() {
    let payload = b"REPEATED";
    let settings = psk_settings(PskOrder::Qpsk, payload.len());

    let frame = encoder_for(&settings).encode_frame(payload);
    let mut samples = frame.clone();
    samples.extend_from_slice(&frame);

    let mut pipeline = ChannelPipeline::new(settings).expect("settings should validate");
    let mut events = Vec::new();
    pipeline.feed(&samples, &mut events);

    let decoded = frames(&events);
    assert_eq!(decoded.len(), 2, "expected both frames, got {}", decoded.len());
    for frame in &decoded {
        assert_eq!(frame.as_slice(), payload.as_slice());
    }
}
