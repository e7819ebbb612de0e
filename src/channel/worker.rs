//! Threaded channel worker
//!
//! Each channel runs on its own thread, which owns the processor outright;
//! the rest of the program talks to it through a [`ChannelHandle`]. Samples
//! travel through a lock-free ring buffer, control messages and decoded
//! events through crossbeam channels. Control is handled strictly between
//! sample batches, so every batch runs under one consistent configuration.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::channel::processor::ChannelProcessor;
use crate::domain::{
    ChannelSettings, ComplexSample, DecodedEvent, DemodError, DemodResult, LevelReport, SettingKey,
};
use crate::ports::debug::DebugSink;

/// Sample FIFO between the feeding thread and the worker. 65536 complex
/// samples hold about 1.4 s at a 48 kHz channel rate.
const FIFO_CAPACITY: usize = 65_536;

/// Largest slice handed to the processor per loop turn
const BATCH_SAMPLES: usize = 4096;

/// Idle sleep when the FIFO runs dry
const POLL_INTERVAL: Duration = Duration::from_millis(5);

enum Control {
    Apply {
        settings: ChannelSettings,
        changed: Vec<SettingKey>,
        force: bool,
    },
    QueryLevels(Sender<LevelReport>),
    SetDebugSink(Box<dyn DebugSink>),
    ClearDebugSink,
    Stop,
}

/// Caller-side grip on a running channel thread
pub struct ChannelHandle {
    producer: HeapProd<ComplexSample>,
    control: Sender<Control>,
    events: Receiver<DecodedEvent>,
    worker: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    /// Validate the settings and start the worker thread. Construction
    /// fails synchronously on bad settings; later snapshots report
    /// asynchronously through the event queue instead.
    pub fn spawn(settings: ChannelSettings) -> DemodResult<Self> {
        let (event_tx, event_rx) = unbounded();
        let processor = ChannelProcessor::new(settings, event_tx)?;
        let (control_tx, control_rx) = unbounded();
        let (producer, consumer) = HeapRb::<ComplexSample>::new(FIFO_CAPACITY).split();

        let worker = thread::Builder::new()
            .name("chan-demod".into())
            .spawn(move || run_worker(processor, consumer, control_rx))
            .map_err(|e| DemodError::Worker(format!("failed to spawn worker thread: {e}")))?;

        Ok(Self {
            producer,
            control: control_tx,
            events: event_rx,
            worker: Some(worker),
        })
    }

    /// Push samples into the worker's FIFO without blocking. Returns how
    /// many were accepted; the remainder is dropped when the worker has
    /// fallen behind, and the caller may retry it later.
    pub fn feed(&mut self, samples: &[ComplexSample]) -> usize {
        self.producer.push_slice(samples)
    }

    /// Queue a settings snapshot for the worker to apply between batches.
    /// A rejected snapshot surfaces as a status event.
    pub fn apply_settings(
        &self,
        settings: ChannelSettings,
        changed: Vec<SettingKey>,
        force: bool,
    ) -> DemodResult<()> {
        self.send(Control::Apply {
            settings,
            changed,
            force,
        })
    }

    /// Read and clear the worker's level accumulators. Blocks until the
    /// worker finishes the batch it is on.
    pub fn levels(&self) -> DemodResult<LevelReport> {
        let (reply_tx, reply_rx) = bounded(1);
        self.send(Control::QueryLevels(reply_tx))?;
        reply_rx
            .recv()
            .map_err(|_| DemodError::Control("channel worker is gone".to_string()))
    }

    /// Decoded-event queue fed by the worker
    pub fn events(&self) -> &Receiver<DecodedEvent> {
        &self.events
    }

    /// Attach an observational tap to the worker's pipeline
    pub fn set_debug_sink(&self, sink: Box<dyn DebugSink>) -> DemodResult<()> {
        self.send(Control::SetDebugSink(sink))
    }

    pub fn clear_debug_sink(&self) -> DemodResult<()> {
        self.send(Control::ClearDebugSink)
    }

    /// Ask the worker to exit after its current batch, then join it.
    /// Samples still queued in the FIFO are dropped.
    pub fn stop(mut self) -> DemodResult<()> {
        self.shutdown()
    }

    fn send(&self, message: Control) -> DemodResult<()> {
        self.control
            .send(message)
            .map_err(|_| DemodError::Control("channel worker is gone".to_string()))
    }

    fn shutdown(&mut self) -> DemodResult<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };
        let _ = self.control.send(Control::Stop);
        worker
            .join()
            .map_err(|_| DemodError::Worker("channel worker panicked".to_string()))
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        let _ = self.shutdown();
    }
}

/// Worker loop: drain control, then drain one batch of samples into the
/// processor, sleeping briefly when the FIFO is empty. A disconnected
/// control channel counts as a stop request.
fn run_worker(
    mut processor: ChannelProcessor,
    mut samples: HeapCons<ComplexSample>,
    control: Receiver<Control>,
) {
    let mut batch = vec![ComplexSample::new(0.0, 0.0); BATCH_SAMPLES];

    'run: loop {
        loop {
            match control.try_recv() {
                Ok(Control::Apply {
                    settings,
                    changed,
                    force,
                }) => {
                    // Rejections already went out on the event queue
                    let _ = processor.apply_settings(&settings, &changed, force);
                }
                Ok(Control::QueryLevels(reply)) => {
                    let _ = reply.send(processor.levels());
                }
                Ok(Control::SetDebugSink(sink)) => processor.set_debug_sink(sink),
                Ok(Control::ClearDebugSink) => processor.clear_debug_sink(),
                Ok(Control::Stop) | Err(TryRecvError::Disconnected) => break 'run,
                Err(TryRecvError::Empty) => break,
            }
        }

        let got = samples.pop_slice(&mut batch);
        if got == 0 {
            thread::sleep(POLL_INTERVAL);
        } else {
            processor.feed(&batch[..got]);
        }
    }

    log::debug!("channel worker exiting");
    processor.status("Channel stopped");
}
