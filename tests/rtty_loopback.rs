//! Integration tests: RTTY encoder → channel pipeline loopback
//!
//! Encode Baudot FSK at channel rate, run it through the complete channel
//! chain, and check the text comes back at every common baud/shift
//! pairing, with both slicer banks, and across a tuning offset.

use baudwalk::channel::ChannelPipeline;
use baudwalk::domain::{
    ChannelSettings, ComplexSample, DecodedEvent, ProtocolSettings, RttyFilter,
};
use baudwalk::modem::encoder::RttyEncoder;

const CHANNEL_RATE: f64 = 48_000.0;

fn rtty_settings(baud: f64, shift_hz: f64, filter: RttyFilter) -> ChannelSettings {
    ChannelSettings {
        channel_rate: CHANNEL_RATE,
        frequency_offset: 0.0,
        bandwidth: 0.0,
        protocol: ProtocolSettings::Rtty {
            baud,
            shift_hz,
            filter,
            squelch_db: -60.0,
            msb_first: false,
            stop_bits: 1.5,
        },
    }
}

/// Helper: encode text at channel rate, mix in the settings' frequency
/// offset, run the channel chain, return the decoded characters
fn loopback(text: &str, settings: ChannelSettings) -> String {
    let (baud, shift_hz, msb_first) = match settings.protocol {
        ProtocolSettings::Rtty {
            baud,
            shift_hz,
            msb_first,
            ..
        } => (baud, shift_hz, msb_first),
        _ => unreachable!(),
    };

    let baseband = RttyEncoder::new(CHANNEL_RATE, baud, shift_hz, 1.5, msb_first).encode(text);
    let offset = settings.frequency_offset;
    let samples: Vec<ComplexSample> = if offset == 0.0 {
        baseband
    } else {
        baseband
            .iter()
            .enumerate()
            .map(|(n, &s)| {
                let angle = 2.0 * std::f64::consts::PI * offset * n as f64 / CHANNEL_RATE;
                s * ComplexSample::new(angle.cos() as f32, angle.sin() as f32)
            })
            .collect()
    };

    let mut pipeline = ChannelPipeline::new(settings).expect("settings should validate");
    let mut events = Vec::new();
    pipeline.feed(&samples, &mut events);

    events
        .iter()
        .filter_map(|e| match e {
            DecodedEvent::Character(c) => Some(*c),
            _ => None,
        })
        .collect()
}

#[test]
fn test_loopback_standard_pairings() {
    for &baud in &[45.45, 50.0, 75.0] {
        for &shift in &[170.0, 425.0, 850.0] {
            let decoded = loopback(
                "RYRY DE TEST",
                rtty_settings(baud, shift, RttyFilter::DualTone),
            );
            assert!(
                decoded.contains("RYRY DE TEST"),
                "failed at {baud} Bd / {shift} Hz, got: '{decoded}'"
            );
        }
    }
}

#[test]
fn test_loopback_discriminator_slicer() {
    for &baud in &[45.45, 75.0] {
        let decoded = loopback(
            "THE QUICK BROWN FOX",
            rtty_settings(baud, 425.0, RttyFilter::Discriminator),
        );
        assert!(
            decoded.contains("THE QUICK BROWN FOX"),
            "failed at {baud} Bd, got: '{decoded}'"
        );
    }
}

#[test]
fn test_loopback_with_tuning_offset() {
    let mut settings = rtty_settings(45.45, 170.0, RttyFilter::DualTone);
    settings.frequency_offset = -1200.0;

    let decoded = loopback("CQ CQ CQ", settings);
    assert!(
        decoded.contains("CQ CQ CQ"),
        "Expected message across a -1.2 kHz offset, got: '{decoded}'"
    );
}

#[test]
fn test_loopback_figures_and_letters() {
    let decoded = loopback(
        "QTH 59 73",
        rtty_settings(45.45, 170.0, RttyFilter::DualTone),
    );
    assert!(
        decoded.contains("QTH 59 73"),
        "Expected shift codes to survive the chain, got: '{decoded}'"
    );
}

#[test]
fn test_loopback_msb_first_bit_order() {
    let mut settings = rtty_settings(50.0, 425.0, RttyFilter::DualTone);
    if let ProtocolSettings::Rtty { msb_first, .. } = &mut settings.protocol {
        *msb_first = true;
    }

    let decoded = loopback("REVERSED", settings);
    assert!(
        decoded.contains("REVERSED"),
        "Expected matching bit order on both ends, got: '{decoded}'"
    );
}

#[test]
fn test_loopback_survives_additive_noise() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    // Uniform wideband noise at roughly 16 dB below the tone power; the
    // channel filter narrows it to a small fraction of that
    let mut rng = StdRng::seed_from_u64(0x5EED);
    let noisy: Vec<ComplexSample> = RttyEncoder::new(CHANNEL_RATE, 45.45, 170.0, 1.5, false)
        .encode("VVV KILO")
        .iter()
        .map(|&s| s + ComplexSample::new(rng.gen_range(-0.2..0.2), rng.gen_range(-0.2..0.2)))
        .collect();

    let settings = rtty_settings(45.45, 170.0, RttyFilter::DualTone);
    let mut pipeline = ChannelPipeline::new(settings).expect("settings should validate");
    let mut events = Vec::new();
    pipeline.feed(&noisy, &mut events);

    let decoded: String = events
        .iter()
        .filter_map(|e| match e {
            DecodedEvent::Character(c) => Some(*c),
            _ => None,
        })
        .collect();
    assert!(
        decoded.contains("VVV KILO"),
        "Expected clean copy through the noise, got: '{decoded}'"
    );
}
