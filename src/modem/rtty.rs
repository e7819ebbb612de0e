//! RTTY demodulator
//!
//! Classic five-bit FSK: a start bit (space), five data bits, and a stop
//! bit (mark), sliced from the difference of two tone-matched filters or a
//! plain discriminator. The bit clock free-runs at the configured baud rate
//! and resyncs on every start edge, so a few percent of baud error costs
//! nothing within a character.
//!
//! A cycle histogram rides along beside the decoder and periodically turns
//! observed transition spacing into an independent baud/shift estimate.
//! That estimate is reported upstream and never touches the live sampling
//! instant; retuning is the operator's call.

use crate::domain::{ComplexSample, DecodedEvent, RttyFilter};
use crate::dsp::{BitClock, CycleHistogram, PulseTimer, ToneFilter};
use crate::modem::baudot::BaudotDecoder;
use crate::modem::Demodulator;

/// Fixed internal processing rate for RTTY
pub const RTTY_RATE: f64 = 6000.0;

/// Slicer transitions accumulated between mode estimates
const MODE_ESTIMATE_CYCLES: u32 = 64;

/// Longest transition spacing worth histogramming, in samples. Anything
/// slower than ~10 baud is idle line, not data.
const MAX_CYCLE: usize = 600;

/// Smoothing for the per-tone frequency means behind the shift estimate
const FREQ_SMOOTHING: f32 = 0.01;

enum FrameState {
    /// Line idling at mark, hunting for a start edge
    Idle,
    /// Collecting one character; `index` counts latched bits, 0 = start bit
    Receiving { index: u8, code: u8 },
}

/// FSK demodulator and Baudot framer
pub struct RttyDemod {
    baud: f64,
    shift_hz: f64,
    filter: RttyFilter,
    squelch_db: f32,
    msb_first: bool,
    mark_filter: ToneFilter,
    space_filter: ToneFilter,
    clock: BitClock,
    baudot: BaudotDecoder,
    state: FrameState,
    prev_sample: ComplexSample,
    prev_decision: bool,
    transitions: PulseTimer,
    histogram: CycleHistogram,
    mark_freq: f32,
    space_freq: f32,
    power_acc: f64,
    power_count: u64,
}

impl RttyDemod {
    pub fn new(
        baud: f64,
        shift_hz: f64,
        filter: RttyFilter,
        squelch_db: f32,
        msb_first: bool,
    ) -> Self {
        let (mark_filter, space_filter) = Self::build_tone_filters(baud, shift_hz);
        Self {
            baud,
            shift_hz,
            filter,
            squelch_db,
            msb_first,
            mark_filter,
            space_filter,
            clock: BitClock::new(RTTY_RATE / baud),
            baudot: BaudotDecoder::new(),
            state: FrameState::Idle,
            prev_sample: ComplexSample::new(0.0, 0.0),
            prev_decision: true,
            transitions: PulseTimer::new(),
            histogram: CycleHistogram::new(MAX_CYCLE),
            mark_freq: 0.0,
            space_freq: 0.0,
            power_acc: 0.0,
            power_count: 0,
        }
    }

    /// Matched filters, one bit period long, centered on each tone.
    /// Mark sits above center, space below, following the usual
    /// upper-sideband convention.
    fn build_tone_filters(baud: f64, shift_hz: f64) -> (ToneFilter, ToneFilter) {
        let taps = (RTTY_RATE / baud).round() as usize;
        let mark = ToneFilter::new(shift_hz / 2.0, RTTY_RATE, taps);
        let space = ToneFilter::new(-shift_hz / 2.0, RTTY_RATE, taps);
        (mark, space)
    }

    /// Retune the bit clock; the histogram restarts since its sample unit
    /// did not change but its interpretation cadence does
    pub fn set_baud(&mut self, baud: f64) {
        self.baud = baud;
        self.clock = BitClock::new(RTTY_RATE / baud);
        let (mark, space) = Self::build_tone_filters(baud, self.shift_hz);
        self.mark_filter = mark;
        self.space_filter = space;
        self.histogram.reset();
        self.state = FrameState::Idle;
    }

    pub fn set_shift(&mut self, shift_hz: f64) {
        self.shift_hz = shift_hz;
        let (mark, space) = Self::build_tone_filters(self.baud, shift_hz);
        self.mark_filter = mark;
        self.space_filter = space;
    }

    pub fn set_squelch_db(&mut self, squelch_db: f32) {
        self.squelch_db = squelch_db;
    }

    pub fn set_bit_order(&mut self, msb_first: bool) {
        self.msb_first = msb_first;
    }

    /// Slice one sample into a mark/space decision
    fn decide(&mut self, sample: ComplexSample, inst_freq: f32) -> bool {
        let soft = match self.filter {
            RttyFilter::DualTone => {
                self.mark_filter.process(sample).norm() - self.space_filter.process(sample).norm()
            }
            RttyFilter::Discriminator => inst_freq,
        };
        soft > 0.0
    }

    fn latch_bit(&mut self, decision: bool, events: &mut Vec<DecodedEvent>) {
        let FrameState::Receiving { index, code } = &mut self.state else {
            return;
        };

        match *index {
            0 => {
                // Confirm the start bit is still space at its midpoint
                if decision {
                    self.state = FrameState::Idle;
                } else {
                    *index = 1;
                }
            }
            1..=5 => {
                let bit = decision as u8;
                if self.msb_first {
                    *code = (*code << 1) | bit;
                } else {
                    *code |= bit << (*index - 1);
                }
                *index += 1;
            }
            _ => {
                // Stop bit must be mark; anything else is a framing error
                // and the character is discarded without comment
                let code = *code;
                self.state = FrameState::Idle;
                if decision && self.squelch_open() {
                    if let Some(ch) = self.baudot.decode(code) {
                        events.push(DecodedEvent::Character(ch));
                    }
                }
            }
        }
    }

    fn squelch_open(&self) -> bool {
        if self.power_count == 0 {
            return false;
        }
        let avg = self.power_acc / self.power_count as f64;
        let db = 10.0 * avg.max(1e-12).log10();
        db as f32 >= self.squelch_db
    }

    fn update_mode_estimate(&mut self, events: &mut Vec<DecodedEvent>) {
        if self.histogram.total() < MODE_ESTIMATE_CYCLES {
            return;
        }
        if let Some(cycle) = self.histogram.estimate() {
            let baud = RTTY_RATE / cycle;
            let shift =
                (self.mark_freq - self.space_freq) as f64 * RTTY_RATE / (2.0 * std::f64::consts::PI);
            events.push(DecodedEvent::ModeEstimate {
                baud: baud as f32,
                shift_hz: shift as f32,
            });
        }
        self.histogram.reset();
    }
}

impl Demodulator for RttyDemod {
    fn process(&mut self, sample: ComplexSample, events: &mut Vec<DecodedEvent>) {
        // Instantaneous frequency feeds the discriminator slicer and the
        // shift estimator in either filter mode
        let inst_freq = (sample * self.prev_sample.conj()).arg();
        self.prev_sample = sample;

        let decision = self.decide(sample, inst_freq);

        // Bucket by the raw frequency sign, not the slicer decision: the
        // tone filters delay the decision by their group delay, which would
        // smear each tone's mean across the transition.
        if inst_freq > 0.0 {
            self.mark_freq += FREQ_SMOOTHING * (inst_freq - self.mark_freq);
        } else {
            self.space_freq += FREQ_SMOOTHING * (inst_freq - self.space_freq);
        }

        if let Some(run) = self.transitions.feed(decision) {
            self.histogram.record(run.length as usize);
            self.update_mode_estimate(events);
        }

        match self.state {
            FrameState::Idle => {
                if self.prev_decision && !decision {
                    // Mark-to-space edge: candidate start bit
                    self.state = FrameState::Receiving { index: 0, code: 0 };
                    self.clock.resync();
                    self.power_acc = 0.0;
                    self.power_count = 0;
                }
            }
            FrameState::Receiving { .. } => {
                self.power_acc += sample.norm_sqr() as f64;
                self.power_count += 1;
                if self.clock.tick() {
                    self.latch_bit(decision, events);
                }
            }
        }

        self.prev_decision = decision;
    }

    fn internal_rate(&self) -> f64 {
        RTTY_RATE
    }

    fn reset(&mut self) {
        self.mark_filter.reset();
        self.space_filter.reset();
        self.clock.resync();
        self.baudot.reset();
        self.state = FrameState::Idle;
        self.prev_sample = ComplexSample::new(0.0, 0.0);
        self.prev_decision = true;
        self.transitions.reset();
        self.histogram.reset();
        self.mark_freq = 0.0;
        self.space_freq = 0.0;
        self.power_acc = 0.0;
        self.power_count = 0;
    }
}
