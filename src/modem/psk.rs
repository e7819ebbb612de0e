//! Suppressed-carrier PSK packet demodulator
//!
//! Chain per sample: root-raised-cosine matched filter, Gardner symbol
//! clock interpolating the strobe onto the filter peak, Costas derotation
//! at symbol rate, optional adaptive equalizer, hard decision. Decided
//! symbols feed a unique-word hunter that resolves the loop's ambiguity:
//! an M-point constellation locks at any of M rotations, so one bit shift
//! register per rotation hypothesis watches for the sync word, and the
//! register that matches fixes the derotation for the rest of the frame.
//!
//! Completed frames are handed up as byte payloads; packet parsing beyond
//! the frame boundary belongs to whoever drains the event queue.

use crate::domain::{ComplexSample, DecodedEvent, EqualizerMode, PskOrder};
use crate::dsp::{CostasLoop, Equalizer, FirFilter, SymbolClock};
use crate::modem::Demodulator;

/// The channel pipeline resamples PSK work to exactly this many samples
/// per symbol.
pub const PSK_SAMPLES_PER_SYMBOL: usize = 4;

/// Matched-filter span in symbols on each side of the peak
const RRC_SYMBOL_SPAN: usize = 8;

/// Equalizer geometry and adaptation step
const EQUALIZER_TAPS: usize = 7;
const EQUALIZER_STEP: f32 = 0.01;

/// Unique-word correlation accepts up to this many bit errors
const UW_MAX_ERRORS: u32 = 2;

/// Gardner timing-loop bandwidth; only channel delay and rate skew to
/// absorb, so it needs no settings knob
const TIMING_BANDWIDTH: f32 = 0.045;

/// PSK packet demodulator for one configured link
pub struct PskDemod {
    order: PskOrder,
    symbol_rate: f64,
    unique_word: u32,
    frame_bytes: usize,
    msb_first: bool,
    matched: FirFilter,
    clock: SymbolClock,
    costas: CostasLoop,
    equalizer: Option<Equalizer>,
    /// One shift register per rotation hypothesis
    registers: Vec<u64>,
    hunting: bool,
    fill_rotation: usize,
    fill_bits: Vec<bool>,
}

impl PskDemod {
    pub fn new(
        order: PskOrder,
        symbol_rate: f64,
        loop_bandwidth: f32,
        rolloff: f32,
        equalizer_mode: EqualizerMode,
        unique_word: u32,
        frame_bytes: usize,
        msb_first: bool,
    ) -> Self {
        let tap_count = 2 * RRC_SYMBOL_SPAN * PSK_SAMPLES_PER_SYMBOL + 1;
        Self {
            order,
            symbol_rate,
            unique_word,
            frame_bytes,
            msb_first,
            matched: FirFilter::root_raised_cosine(
                tap_count,
                PSK_SAMPLES_PER_SYMBOL as f32,
                rolloff,
            ),
            clock: SymbolClock::new(PSK_SAMPLES_PER_SYMBOL as f32, TIMING_BANDWIDTH),
            costas: CostasLoop::new(order, loop_bandwidth),
            equalizer: Equalizer::new(equalizer_mode, EQUALIZER_TAPS, EQUALIZER_STEP, order),
            registers: vec![0; order.points() as usize],
            hunting: true,
            fill_rotation: 0,
            fill_bits: Vec::new(),
        }
    }

    pub fn set_loop_bandwidth(&mut self, loop_bandwidth: f32) {
        self.costas.set_bandwidth(loop_bandwidth);
    }

    pub fn set_unique_word(&mut self, unique_word: u32) {
        self.unique_word = unique_word;
        self.hunting = true;
        self.fill_bits.clear();
    }

    pub fn set_frame_bytes(&mut self, frame_bytes: usize) {
        self.frame_bytes = frame_bytes;
        self.hunting = true;
        self.fill_bits.clear();
    }

    pub fn set_bit_order(&mut self, msb_first: bool) {
        self.msb_first = msb_first;
    }

    /// Carrier-loop phase error of the latest symbol, for the debug tap
    pub fn loop_error(&self) -> f32 {
        self.costas.error()
    }

    /// Smoothed equalizer error power, when an equalizer is running
    pub fn equalizer_error(&self) -> Option<f32> {
        self.equalizer.as_ref().map(|eq| eq.error_power())
    }

    fn on_symbol(&mut self, symbol: ComplexSample, events: &mut Vec<DecodedEvent>) {
        let derotated = self.costas.process(symbol);
        let decided_input = match &mut self.equalizer {
            Some(eq) => eq.process(derotated, true, None),
            None => derotated,
        };
        let (index, _) = self.order.demap(decided_input);

        let points = self.order.points();
        let bits_per_symbol = self.order.bits_per_symbol();
        for rotation in 0..points as usize {
            // A loop locked `rotation` points off reads index k as k+r
            let corrected = (index + points - rotation as u32) % points;
            for shift in (0..bits_per_symbol).rev() {
                self.push_bit(rotation, corrected >> shift & 1 == 1, events);
            }
        }
    }

    fn push_bit(&mut self, rotation: usize, bit: bool, events: &mut Vec<DecodedEvent>) {
        self.registers[rotation] = self.registers[rotation] << 1 | bit as u64;

        if self.hunting {
            let window = self.registers[rotation] as u32;
            if (window ^ self.unique_word).count_ones() <= UW_MAX_ERRORS {
                self.hunting = false;
                self.fill_rotation = rotation;
                self.fill_bits.clear();
            }
        } else if rotation == self.fill_rotation {
            self.fill_bits.push(bit);
            if self.fill_bits.len() == self.frame_bytes * 8 {
                let payload = assemble_bytes(&self.fill_bits, self.msb_first);
                events.push(DecodedEvent::Frame(payload));
                self.hunting = true;
                self.fill_bits.clear();
            }
        }
    }
}

impl Demodulator for PskDemod {
    fn process(&mut self, sample: ComplexSample, events: &mut Vec<DecodedEvent>) {
        let filtered = self.matched.process(sample);
        if let Some(symbol) = self.clock.feed(filtered) {
            self.on_symbol(symbol, events);
        }
    }

    fn internal_rate(&self) -> f64 {
        self.symbol_rate * PSK_SAMPLES_PER_SYMBOL as f64
    }

    fn reset(&mut self) {
        self.matched.reset();
        self.clock.reset();
        self.costas.reset();
        if let Some(eq) = &mut self.equalizer {
            eq.reset();
        }
        self.registers.iter_mut().for_each(|r| *r = 0);
        self.hunting = true;
        self.fill_bits.clear();
    }
}

fn assemble_bytes(bits: &[bool], msb_first: bool) -> Vec<u8> {
    bits.chunks(8)
        .map(|chunk| {
            let mut byte = 0u8;
            for (i, &bit) in chunk.iter().enumerate() {
                if bit {
                    byte |= if msb_first { 1 << (7 - i) } else { 1 << i };
                }
            }
            byte
        })
        .collect()
}
