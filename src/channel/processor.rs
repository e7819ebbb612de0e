//! Decoder side of a running channel
//!
//! `ChannelProcessor` couples a [`ChannelPipeline`] to the event queue its
//! consumer reads from. Decoded events leave through an unbounded channel
//! so the sample path never blocks on a slow reader, and a rejected
//! settings snapshot is reported on the same queue as status text in
//! addition to the returned error.

use crossbeam_channel::Sender;

use crate::channel::pipeline::ChannelPipeline;
use crate::domain::{
    ChannelSettings, ComplexSample, DecodedEvent, DemodResult, LevelReport, SettingKey,
};
use crate::ports::debug::DebugSink;

pub struct ChannelProcessor {
    pipeline: ChannelPipeline,
    events: Sender<DecodedEvent>,
    scratch: Vec<DecodedEvent>,
}

impl ChannelProcessor {
    pub fn new(settings: ChannelSettings, events: Sender<DecodedEvent>) -> DemodResult<Self> {
        Ok(Self {
            pipeline: ChannelPipeline::new(settings)?,
            events,
            scratch: Vec::new(),
        })
    }

    /// Run one batch through the pipeline and forward everything it
    /// decoded. Send failures mean the receiver is gone, which only
    /// happens during shutdown.
    pub fn feed(&mut self, samples: &[ComplexSample]) {
        self.pipeline.feed(samples, &mut self.scratch);
        for event in self.scratch.drain(..) {
            let _ = self.events.send(event);
        }
    }

    /// Apply a settings snapshot between batches. A rejection leaves the
    /// previous configuration running and reports the reason both on the
    /// event queue and in the returned error.
    pub fn apply_settings(
        &mut self,
        settings: &ChannelSettings,
        changed: &[SettingKey],
        force: bool,
    ) -> DemodResult<()> {
        match self.pipeline.apply_settings(settings, changed, force) {
            Ok(()) => {
                log::debug!("channel settings applied, {} key(s) changed", changed.len());
                Ok(())
            }
            Err(error) => {
                log::warn!("channel settings rejected: {error}");
                let _ = self
                    .events
                    .send(DecodedEvent::Status(format!("Settings rejected: {error}")));
                Err(error)
            }
        }
    }

    /// Read and clear the pipeline's level accumulators
    pub fn levels(&mut self) -> LevelReport {
        self.pipeline.levels()
    }

    pub fn settings(&self) -> &ChannelSettings {
        self.pipeline.settings()
    }

    pub fn set_debug_sink(&mut self, sink: Box<dyn DebugSink>) {
        self.pipeline.set_debug_sink(sink);
    }

    pub fn clear_debug_sink(&mut self) {
        self.pipeline.clear_debug_sink();
    }

    /// Push a status line onto the event queue
    pub fn status(&self, text: impl Into<String>) {
        let _ = self.events.send(DecodedEvent::Status(text.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ProtocolSettings, RttyFilter};
    use crate::modem::encoder::RttyEncoder;
    use crossbeam_channel::unbounded;

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

    #[test]
    fn test_events_forwarded_to_queue() {
        let (tx, rx) = unbounded();
        let mut processor = ChannelProcessor::new(rtty_settings(), tx).unwrap();

        let signal = RttyEncoder::new(48_000.0, 45.45, 170.0, 1.5, false).encode("HI");
        processor.feed(&signal);

        let text: String = rx
            .try_iter()
            .filter_map(|e| match e {
                DecodedEvent::Character(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(text, "HI");
    }

    #[test]
    fn test_rejection_reported_as_status() {
        let (tx, rx) = unbounded();
        let mut processor = ChannelProcessor::new(rtty_settings(), tx).unwrap();

        let mut broken = rtty_settings();
        if let ProtocolSettings::Rtty { baud, .. } = &mut broken.protocol {
            *baud = -5.0;
        }
        assert!(processor
            .apply_settings(&broken, &[SettingKey::Baud], false)
            .is_err());

        let saw_status = rx
            .try_iter()
            .any(|e| matches!(e, DecodedEvent::Status(s) if s.contains("rejected")));
        assert!(saw_status, "rejection should surface on the event queue");
    }
}
