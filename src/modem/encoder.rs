//! Baseband signal sources for the supported links
//!
//! Each encoder produces complex baseband at a caller-chosen sample rate,
//! which is what the matching demodulator expects after channel mixing.
//! They exist for loopback testing and beacon simulation: feed the output
//! straight into a demodulator, or through the channel pipeline with a
//! frequency offset to exercise the full receive path.

use crate::domain::{ComplexSample, DstStatus, PskOrder, TimeRecord, TimeStation};
use crate::dsp::fir::{root_raised_cosine_taps, FirFilter};
use crate::modem::baudot;

/// Mark idle sent before the first start bit, in bit periods
const RTTY_LEADER_BITS: f64 = 16.0;

/// Mark idle after the last stop bit
const RTTY_TAIL_BITS: f64 = 8.0;

/// Symbols of constellation-cycling preamble ahead of each PSK frame
const PSK_PREAMBLE_SYMBOLS: usize = 64;

/// Flush symbols after the last data symbol
const PSK_POSTAMBLE_SYMBOLS: usize = 8;

/// Keyed carrier amplitude for the amplitude-modulated beacons. DCF77
/// drops to about 15% during a pulse; WWVB's 17 dB power reduction lands
/// at nearly the same amplitude.
const REDUCED_CARRIER: f32 = 0.15;

/// Peak phase deviation of a TDF pulse, radians
const TDF_SWING: f32 = 1.0;

/// Phase-continuous FSK synthesizer with fractional bit timing, so long
/// transmissions stay on the bit grid at any rate/baud combination.
struct ToneSynth {
    phase: f64,
    carry: f64,
    samples_per_bit: f64,
    sample_rate: f64,
    out: Vec<ComplexSample>,
}

impl ToneSynth {
    fn tone(&mut self, freq_hz: f64, bit_periods: f64) {
        self.carry += bit_periods * self.samples_per_bit;
        let count = self.carry as usize;
        self.carry -= count as f64;

        let increment = 2.0 * std::f64::consts::PI * freq_hz / self.sample_rate;
        for _ in 0..count {
            self.out
                .push(ComplexSample::new(self.phase.cos() as f32, self.phase.sin() as f32));
            self.phase += increment;
            if self.phase > std::f64::consts::PI {
                self.phase -= 2.0 * std::f64::consts::PI;
            } else if self.phase < -std::f64::consts::PI {
                self.phase += 2.0 * std::f64::consts::PI;
            }
        }
    }
}

/// Baudot FSK source: text in, mark/space keyed baseband out
pub struct RttyEncoder {
    sample_rate: f64,
    baud: f64,
    shift_hz: f64,
    stop_bits: f32,
    msb_first: bool,
}

impl RttyEncoder {
    pub fn new(sample_rate: f64, baud: f64, shift_hz: f64, stop_bits: f32, msb_first: bool) -> Self {
        Self {
            sample_rate,
            baud,
            shift_hz,
            stop_bits,
            msb_first,
        }
    }

    /// Encode text as start/data/stop framed Baudot FSK, with mark idle on
    /// both ends. Mark sits at +shift/2, space at -shift/2.
    pub fn encode(&self, text: &str) -> Vec<ComplexSample> {
        let codes = baudot::encode_str(text);
        let mark = self.shift_hz / 2.0;
        let space = -self.shift_hz / 2.0;

        let mut synth = ToneSynth {
            phase: 0.0,
            carry: 0.0,
            samples_per_bit: self.sample_rate / self.baud,
            sample_rate: self.sample_rate,
            out: Vec::new(),
        };

        synth.tone(mark, RTTY_LEADER_BITS);
        for &code in &codes {
            synth.tone(space, 1.0);
            for i in 0..5 {
                let bit = if self.msb_first {
                    code >> (4 - i) & 1
                } else {
                    code >> i & 1
                };
                synth.tone(if bit == 1 { mark } else { space }, 1.0);
            }
            synth.tone(mark, self.stop_bits as f64);
        }
        synth.tone(mark, RTTY_TAIL_BITS);

        synth.out
    }
}

/// Framed PSK source: payload bytes in, root-raised-cosine shaped
/// symbols out.
///
/// Frame layout: constellation-cycling preamble, the 32-bit unique word
/// sent most significant bit first, then the payload. Bits map onto
/// constellation indices most significant bit first within each symbol;
/// `msb_first` controls only the bit order within payload bytes.
pub struct PskEncoder {
    sample_rate: f64,
    order: PskOrder,
    symbol_rate: f64,
    rolloff: f32,
    unique_word: u32,
    frame_bytes: usize,
    msb_first: bool,
}

impl PskEncoder {
    pub fn new(
        sample_rate: f64,
        order: PskOrder,
        symbol_rate: f64,
        rolloff: f32,
        unique_word: u32,
        frame_bytes: usize,
        msb_first: bool,
    ) -> Self {
        Self {
            sample_rate,
            order,
            symbol_rate,
            rolloff,
            unique_word,
            frame_bytes,
            msb_first,
        }
    }

    /// Modulate one frame. The payload is zero-padded or truncated to the
    /// configured frame length.
    pub fn encode_frame(&self, payload: &[u8]) -> Vec<ComplexSample> {
        let points = self.order.points();
        let bits_per_symbol = self.order.bits_per_symbol() as usize;

        let mut bits: Vec<bool> = Vec::new();
        for i in (0..32).rev() {
            bits.push(self.unique_word >> i & 1 == 1);
        }
        for index in 0..self.frame_bytes {
            let byte = payload.get(index).copied().unwrap_or(0);
            if self.msb_first {
                for i in (0..8).rev() {
                    bits.push(byte >> i & 1 == 1);
                }
            } else {
                for i in 0..8 {
                    bits.push(byte >> i & 1 == 1);
                }
            }
        }

        let mut indices: Vec<u32> = (0..PSK_PREAMBLE_SYMBOLS)
            .map(|i| i as u32 % points)
            .collect();
        for chunk in bits.chunks(bits_per_symbol) {
            let mut k = 0u32;
            for (i, &bit) in chunk.iter().enumerate() {
                if bit {
                    k |= 1 << (bits_per_symbol - 1 - i);
                }
            }
            indices.push(k);
        }
        indices.extend(std::iter::repeat(0).take(PSK_POSTAMBLE_SYMBOLS));

        self.shape(&indices)
    }

    /// Impulse-train pulse shaping through the root-raised-cosine filter
    fn shape(&self, indices: &[u32]) -> Vec<ComplexSample> {
        let samples_per_symbol = (self.sample_rate / self.symbol_rate).round() as usize;
        let tap_count = 8 * samples_per_symbol + 1;
        let taps = root_raised_cosine_taps(tap_count, samples_per_symbol as f32, self.rolloff);
        // Normalize so symbol peaks come out near unit amplitude
        let scale = 1.0 / taps[tap_count / 2];
        let mut shaper = FirFilter::new(taps);

        let step = 2.0 * std::f32::consts::PI / self.order.points() as f32;
        let offset = self.order.angle_offset();
        let zero = ComplexSample::new(0.0, 0.0);

        let mut out = Vec::with_capacity((indices.len() + 8) * samples_per_symbol);
        for &k in indices {
            let angle = offset + k as f32 * step;
            let point = ComplexSample::new(angle.cos(), angle.sin());
            for i in 0..samples_per_symbol {
                let input = if i == 0 { point } else { zero };
                out.push(shaper.process(input) * scale);
            }
        }
        // Flush the filter's group delay
        for _ in 0..tap_count {
            out.push(shaper.process(zero) * scale);
        }

        out
    }
}

/// Minute-frame source for the longwave time stations, at the decoder's
/// 1 kHz working rate. One call appends exactly one 60 second frame.
pub struct TimeBeaconEncoder {
    station: TimeStation,
}

impl TimeBeaconEncoder {
    pub fn new(station: TimeStation) -> Self {
        Self { station }
    }

    /// Frame bit array for the record. For MSF this is the primary (A)
    /// stream only; use [`msf_frame_bits`](Self::msf_frame_bits) when the
    /// parity stream is needed too.
    pub fn frame_bits(&self, record: &TimeRecord) -> [bool; 60] {
        match self.station {
            TimeStation::Dcf77 | TimeStation::Tdf => dcf77_frame(record),
            TimeStation::Wwvb => wwvb_frame(record),
            TimeStation::Msf => msf_frame(record).0,
        }
    }

    /// MSF primary and secondary bit streams
    pub fn msf_frame_bits(&self, record: &TimeRecord) -> ([bool; 60], [bool; 60]) {
        msf_frame(record)
    }

    /// Unmodulated carrier, for the quiet run-in before the first frame
    pub fn modulate_idle(&self, seconds: usize, out: &mut Vec<ComplexSample>) {
        push_level(out, 1.0, seconds * 1000);
    }

    /// Append one full minute of modulated carrier for the record
    pub fn modulate_frame(&self, record: &TimeRecord, out: &mut Vec<ComplexSample>) {
        match self.station {
            TimeStation::Dcf77 => {
                let bits = dcf77_frame(record);
                for second in 0..59 {
                    let low_ms = if bits[second] { 200 } else { 100 };
                    push_level(out, REDUCED_CARRIER, low_ms);
                    push_level(out, 1.0, 1000 - low_ms);
                }
                // Second 59 carries no pulse; that silence is the marker
                push_level(out, 1.0, 1000);
            }
            TimeStation::Tdf => {
                let bits = dcf77_frame(record);
                for second in 0..59 {
                    let swing_ms = if bits[second] { 200 } else { 100 };
                    push_phase(out, TDF_SWING, swing_ms);
                    push_phase(out, 0.0, 1000 - swing_ms);
                }
                push_phase(out, 0.0, 1000);
            }
            TimeStation::Msf => {
                let (a, b) = msf_frame(record);
                // Second 0 is the 500 ms minute marker
                push_level(out, 0.0, 500);
                push_level(out, 1.0, 500);
                for second in 1..60 {
                    push_level(out, 0.0, 100);
                    push_level(out, if a[second] { 0.0 } else { 1.0 }, 100);
                    push_level(out, if b[second] { 0.0 } else { 1.0 }, 100);
                    push_level(out, 1.0, 700);
                }
            }
            TimeStation::Wwvb => {
                let bits = wwvb_frame(record);
                for second in 0..60 {
                    let marker = matches!(second, 0 | 9 | 19 | 29 | 39 | 49 | 59);
                    let low_ms = if marker {
                        800
                    } else if bits[second] {
                        500
                    } else {
                        200
                    };
                    push_level(out, REDUCED_CARRIER, low_ms);
                    push_level(out, 1.0, 1000 - low_ms);
                }
            }
        }
    }
}

fn push_level(out: &mut Vec<ComplexSample>, level: f32, ms: usize) {
    out.extend(std::iter::repeat(ComplexSample::new(level, 0.0)).take(ms));
}

fn push_phase(out: &mut Vec<ComplexSample>, radians: f32, ms: usize) {
    out.extend(std::iter::repeat(ComplexSample::from_polar(1.0, radians)).take(ms));
}

/// BCD LSB-first: units in the first four slots, tens above
fn write_bcd_lsb(bits: &mut [bool], value: u8) {
    let units = value % 10;
    let tens = value / 10;
    for (i, slot) in bits.iter_mut().enumerate() {
        *slot = if i < 4 {
            units >> i & 1 == 1
        } else {
            tens >> (i - 4) & 1 == 1
        };
    }
}

/// Plain binary, most significant bit in the first slot
fn write_bin_msb(bits: &mut [bool], value: u8) {
    let n = bits.len();
    for (i, slot) in bits.iter_mut().enumerate() {
        *slot = value >> (n - 1 - i) & 1 == 1;
    }
}

/// BCD MSB-first: tens nibble then units nibble, leading zeros trimmed to
/// the slice width
fn write_bcd_msb(bits: &mut [bool], value: u8) {
    write_bin_msb(bits, (value / 10) << 4 | value % 10);
}

fn ones(bits: &[bool]) -> usize {
    bits.iter().filter(|&&b| b).count()
}

fn is_leap_year(year: u16) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

fn day_of_year(record: &TimeRecord) -> u16 {
    const DAYS: [u16; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    let mut total = record.day as u16;
    for month in 0..record.month.saturating_sub(1) as usize {
        total += DAYS[month];
        if month == 1 && is_leap_year(record.year) {
            total += 1;
        }
    }
    total
}

fn dcf77_frame(record: &TimeRecord) -> [bool; 60] {
    let mut a = [false; 60];

    match record.dst {
        DstStatus::Daylight => a[17] = true,
        DstStatus::Standard => a[18] = true,
        DstStatus::ChangePending => {
            a[16] = true;
            a[18] = true;
        }
        DstStatus::Unknown => {}
    }
    a[20] = true;

    write_bcd_lsb(&mut a[21..=27], record.minute);
    a[28] = ones(&a[21..=27]) % 2 == 1;
    write_bcd_lsb(&mut a[29..=34], record.hour);
    a[35] = ones(&a[29..=34]) % 2 == 1;
    write_bcd_lsb(&mut a[36..=41], record.day);
    write_bcd_lsb(&mut a[42..=44], record.weekday.unwrap_or(1));
    write_bcd_lsb(&mut a[45..=49], record.month);
    write_bcd_lsb(&mut a[50..=57], (record.year % 100) as u8);
    a[58] = ones(&a[36..=57]) % 2 == 1;

    a
}

fn msf_frame(record: &TimeRecord) -> ([bool; 60], [bool; 60]) {
    let mut a = [false; 60];
    let mut b = [false; 60];

    write_bcd_msb(&mut a[17..=24], (record.year % 100) as u8);
    write_bcd_msb(&mut a[25..=29], record.month);
    write_bcd_msb(&mut a[30..=35], record.day);
    // On-air weekday counts 0 = Sunday
    let weekday = record.weekday.unwrap_or(1);
    write_bin_msb(&mut a[36..=38], if weekday == 7 { 0 } else { weekday });
    write_bcd_msb(&mut a[39..=44], record.hour);
    write_bcd_msb(&mut a[45..=51], record.minute);
    // Fixed 01111110 end-of-minute sequence
    for slot in &mut a[53..=58] {
        *slot = true;
    }

    b[54] = ones(&a[17..=24]) % 2 == 0;
    b[55] = ones(&a[25..=35]) % 2 == 0;
    b[56] = ones(&a[36..=38]) % 2 == 0;
    b[57] = ones(&a[39..=51]) % 2 == 0;
    match record.dst {
        DstStatus::Daylight => b[58] = true,
        DstStatus::ChangePending => b[53] = true,
        DstStatus::Standard | DstStatus::Unknown => {}
    }

    (a, b)
}

fn wwvb_frame(record: &TimeRecord) -> [bool; 60] {
    let mut a = [false; 60];

    write_bin_msb(&mut a[1..=3], record.minute / 10);
    write_bin_msb(&mut a[5..=8], record.minute % 10);
    write_bin_msb(&mut a[12..=13], record.hour / 10);
    write_bin_msb(&mut a[15..=18], record.hour % 10);

    let doy = day_of_year(record);
    write_bin_msb(&mut a[22..=23], (doy / 100) as u8);
    write_bin_msb(&mut a[25..=28], (doy / 10 % 10) as u8);
    write_bin_msb(&mut a[30..=33], (doy % 10) as u8);

    write_bin_msb(&mut a[45..=48], (record.year / 10 % 10) as u8);
    write_bin_msb(&mut a[50..=53], (record.year % 10) as u8);
    a[55] = is_leap_year(record.year);

    match record.dst {
        DstStatus::Daylight => {
            a[57] = true;
            a[58] = true;
        }
        DstStatus::ChangePending => a[57] = true,
        DstStatus::Standard | DstStatus::Unknown => {}
    }

    a
}
