//! Longwave time-code beacon decoders
//!
//! DCF77, MSF, WWVB and TDF all broadcast one frame per minute, one coded
//! symbol per second, but agree on almost nothing else: DCF77 and TDF are
//! LSB-first with even parity, MSF is MSB-first with odd parity and a
//! second bit stream, WWVB is pulse-width keyed with no parity at all, and
//! TDF replaces amplitude keying with phase swings. The common machinery
//! here slices the carrier into per-second pulses, classifies pulse widths,
//! and hands completed 60-second frames to per-station field decoders.
//!
//! Sync is histogram-free: a minute boundary is a pulse pattern (a missing
//! second on DCF77/TDF, a 500 ms drop on MSF, back-to-back markers on
//! WWVB). A rolling hit-ratio monitor declares loss of lock when expected
//! pulses stop classifying, after which the decoder hunts for the next
//! minute boundary and says so on the event queue.

use crate::domain::{ComplexSample, DecodedEvent, DstStatus, TimeRecord, TimeStation};
use crate::dsp::{LockMonitor, PulseTimer};
use crate::modem::Demodulator;

/// Fixed internal processing rate for time-code work: one sample per
/// millisecond, so pulse lengths in samples read as milliseconds.
pub const TIMECODE_RATE: f64 = 1000.0;

/// Lock-monitor tuning: ratio threshold, minimum observations before the
/// monitor may trip, and rolling window length.
const LOCK_RATIO: f32 = 0.7;
const LOCK_MIN_COUNT: usize = 10;
const LOCK_WINDOW: usize = 20;

/// A quiet stretch this long without any classified pulse counts as a
/// missed second. Longer than the legitimate 1.9 s silence spanning a
/// DCF77 minute boundary, shorter than two of them.
const PULSE_WATCHDOG_MS: u32 = 2500;

/// High-side run length that marks a DCF77/TDF minute boundary (the
/// missing 59th-second pulse)
const MINUTE_GAP_MS: u32 = 1500;

/// Status line emitted while hunting for a minute boundary
const SEARCHING_STATUS: &str = "Looking for minute marker";

#[derive(Clone, Copy)]
enum SyncState {
    Searching,
    /// `second` is the index the next classified pulse will land on
    Synced { second: usize },
}

/// Carrier activity detector: per-station physical layer
enum Detector {
    /// Amplitude keying: active while the envelope sits below a fraction
    /// of the tracked full-carrier level
    Amplitude { level: f32 },
    /// Phase keying (TDF): active while the smoothed deviation from the
    /// tracked carrier phasor exceeds the threshold (radians)
    Phase {
        carrier: ComplexSample,
        deviation: f32,
    },
}

/// MSF second classification: primary and secondary bit
#[derive(Clone, Copy)]
struct MsfSecond {
    a: bool,
    b: bool,
}

/// Time-code demodulator for one configured station
pub struct TimeCodeDemod {
    station: TimeStation,
    threshold: f32,
    detector: Detector,
    timer: PulseTimer,
    monitor: LockMonitor,
    state: SyncState,
    a_bits: [bool; 60],
    b_bits: [bool; 60],
    valid: [bool; 60],
    /// MSF only: low runs collected inside the current second
    group_lows: Vec<u32>,
    /// WWVB only: whether the previous pulse classified as a marker
    prev_was_marker: bool,
    /// Samples since the last classified pulse, for the silence watchdog
    since_pulse: u32,
}

impl TimeCodeDemod {
    pub fn new(station: TimeStation, threshold: f32) -> Self {
        let detector = match station {
            TimeStation::Tdf => Detector::Phase {
                carrier: ComplexSample::new(0.0, 0.0),
                deviation: 0.0,
            },
            _ => Detector::Amplitude { level: 0.0 },
        };

        Self {
            station,
            threshold,
            detector,
            timer: PulseTimer::new(),
            monitor: LockMonitor::new(LOCK_RATIO, LOCK_MIN_COUNT, LOCK_WINDOW),
            state: SyncState::Searching,
            a_bits: [false; 60],
            b_bits: [false; 60],
            valid: [false; 60],
            group_lows: Vec::new(),
            prev_was_marker: false,
            since_pulse: 0,
        }
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    /// Physical-layer slice: is the per-second modulation currently active?
    fn detect_active(&mut self, sample: ComplexSample) -> bool {
        let threshold = self.threshold;
        match &mut self.detector {
            Detector::Amplitude { level } => {
                let envelope = sample.norm();
                // Fast rise, slow fall: tracks the full-carrier level
                // straight through the keyed dips
                if envelope > *level {
                    *level += 0.01 * (envelope - *level);
                } else {
                    *level += 0.0001 * (envelope - *level);
                }
                envelope < threshold * *level
            }
            Detector::Phase { carrier, deviation } => {
                *carrier += (sample - *carrier) * 0.002;
                let dev = if carrier.norm_sqr() > 1e-12 {
                    (sample * carrier.conj()).arg().abs()
                } else {
                    0.0
                };
                // Smoothing bridges the brief zero crossings between
                // back-to-back phase swings
                *deviation += 0.05 * (dev - *deviation);
                *deviation > threshold
            }
        }
    }

    fn record_outcome(&mut self, hit: bool, events: &mut Vec<DecodedEvent>) {
        self.monitor.record(hit);
        if matches!(self.state, SyncState::Synced { .. }) && !self.monitor.is_locked() {
            self.enter_search(events);
        }
    }

    fn enter_search(&mut self, events: &mut Vec<DecodedEvent>) {
        self.state = SyncState::Searching;
        self.monitor.reset();
        self.valid = [false; 60];
        self.group_lows.clear();
        self.prev_was_marker = false;
        events.push(DecodedEvent::Status(SEARCHING_STATUS.to_string()));
    }

    fn acquire(&mut self, first_second: usize, events: &mut Vec<DecodedEvent>) {
        self.state = SyncState::Synced {
            second: first_second,
        };
        self.monitor.reset();
        self.valid = [false; 60];
        self.since_pulse = 0;
        events.push(DecodedEvent::Status("Minute marker found".to_string()));
    }

    fn store_bit(&mut self, second: usize, a: bool, b: bool) {
        if second < 60 {
            self.a_bits[second] = a;
            self.b_bits[second] = b;
            self.valid[second] = true;
        }
    }

    /// Decode attempt shared by every station: check the frame is whole,
    /// run the per-station field decoder, emit record or status.
    fn finish_frame(&mut self, data_range: std::ops::RangeInclusive<usize>, events: &mut Vec<DecodedEvent>) {
        let complete = self.valid[data_range].iter().all(|&v| v);
        if !complete {
            events.push(DecodedEvent::Status("Incomplete minute frame".to_string()));
        } else {
            let result = match self.station {
                TimeStation::Dcf77 | TimeStation::Tdf => decode_dcf77(&self.a_bits),
                TimeStation::Msf => decode_msf(&self.a_bits, &self.b_bits),
                TimeStation::Wwvb => decode_wwvb(&self.a_bits),
            };
            match result {
                Ok(record) => events.push(DecodedEvent::Time(record)),
                Err(status) => events.push(DecodedEvent::Status(status)),
            }
        }
        self.valid = [false; 60];
    }

    /// DCF77/TDF pulse grammar: one low pulse per second, 100 ms for zero
    /// and 200 ms for one; the minute boundary is a missing pulse.
    fn on_run_dcf(&mut self, high: bool, length: u32, events: &mut Vec<DecodedEvent>) {
        if high {
            if length < MINUTE_GAP_MS {
                return;
            }
            // Minute boundary
            match self.state {
                SyncState::Searching => self.acquire(0, events),
                SyncState::Synced { second } => {
                    let on_time = second == 59;
                    if on_time {
                        self.finish_frame(0..=58, events);
                    }
                    self.state = SyncState::Synced { second: 0 };
                    self.record_outcome(on_time, events);
                }
            }
            return;
        }

        let SyncState::Synced { second } = self.state else {
            return;
        };
        self.since_pulse = 0;

        let bit = match length {
            50..=150 => Some(false),
            151..=280 => Some(true),
            _ => None,
        };
        match bit {
            Some(value) if second <= 58 => {
                self.store_bit(second, value, false);
                self.state = SyncState::Synced { second: second + 1 };
                self.record_outcome(true, events);
            }
            _ => {
                self.state = SyncState::Synced {
                    second: (second + 1).min(60),
                };
                self.record_outcome(false, events);
            }
        }
    }

    /// MSF pulse grammar: every second starts low. 100 ms = A0B0,
    /// 200 ms = A1B0, 300 ms = A1B1, a split 100+100 = A0B1, and 500 ms is
    /// the minute marker occupying second zero.
    fn on_run_msf(&mut self, high: bool, length: u32, events: &mut Vec<DecodedEvent>) {
        enum Group {
            Marker,
            Second(MsfSecond),
            Invalid,
        }

        if !high {
            self.group_lows.push(length);
            return;
        }
        // A short gap joins the two halves of an A0B1 second; anything
        // longer ends the second's active region.
        if length < 150 || self.group_lows.is_empty() {
            return;
        }

        let group = match self.group_lows.as_slice() {
            [l] if (400..=600).contains(l) => Group::Marker,
            [l] if (50..=150).contains(l) => Group::Second(MsfSecond { a: false, b: false }),
            [l] if (151..=250).contains(l) => Group::Second(MsfSecond { a: true, b: false }),
            [l] if (251..=350).contains(l) => Group::Second(MsfSecond { a: true, b: true }),
            [l1, l2] if (50..=150).contains(l1) && (50..=150).contains(l2) => {
                Group::Second(MsfSecond { a: false, b: true })
            }
            _ => Group::Invalid,
        };
        self.group_lows.clear();

        if let Group::Marker = group {
            match self.state {
                SyncState::Searching => self.acquire(1, events),
                SyncState::Synced { second } => {
                    let on_time = second == 60;
                    if on_time {
                        self.finish_frame(1..=59, events);
                    }
                    self.state = SyncState::Synced { second: 1 };
                    self.since_pulse = 0;
                    self.record_outcome(on_time, events);
                }
            }
            return;
        }

        let SyncState::Synced { second } = self.state else {
            return;
        };
        self.since_pulse = 0;

        match group {
            Group::Second(MsfSecond { a, b }) if (1..=59).contains(&second) => {
                self.store_bit(second, a, b);
                self.state = SyncState::Synced { second: second + 1 };
                self.record_outcome(true, events);
            }
            _ => {
                self.state = SyncState::Synced {
                    second: (second + 1).min(61),
                };
                self.record_outcome(false, events);
            }
        }
    }

    /// WWVB pulse grammar: pulse-width keying, 200 ms = zero, 500 ms = one,
    /// 800 ms = marker; back-to-back markers straddle the minute boundary.
    fn on_run_wwvb(&mut self, high: bool, length: u32, events: &mut Vec<DecodedEvent>) {
        if high {
            return;
        }

        #[derive(PartialEq, Clone, Copy)]
        enum Class {
            Zero,
            One,
            Marker,
        }
        let class = match length {
            100..=349 => Some(Class::Zero),
            350..=649 => Some(Class::One),
            650..=950 => Some(Class::Marker),
            _ => None,
        };

        let was_marker = self.prev_was_marker;
        self.prev_was_marker = class == Some(Class::Marker);

        match self.state {
            SyncState::Searching => {
                if was_marker && class == Some(Class::Marker) {
                    // Seconds 59 and 0: the next pulse is second one
                    self.acquire(1, events);
                }
            }
            SyncState::Synced { second } => {
                self.since_pulse = 0;
                let expected_marker = matches!(second, 0 | 9 | 19 | 29 | 39 | 49 | 59);
                let hit = match class {
                    Some(Class::Marker) if expected_marker => {
                        // Marker seconds carry no data but still count
                        // toward a complete frame
                        self.store_bit(second, false, false);
                        true
                    }
                    Some(Class::Zero) | Some(Class::One) if !expected_marker => {
                        self.store_bit(second, class == Some(Class::One), false);
                        true
                    }
                    _ => false,
                };
                if hit && second == 59 {
                    self.finish_frame(1..=58, events);
                }
                self.state = SyncState::Synced {
                    second: (second + 1) % 60,
                };
                self.record_outcome(hit, events);
            }
        }
    }
}

impl Demodulator for TimeCodeDemod {
    fn process(&mut self, sample: ComplexSample, events: &mut Vec<DecodedEvent>) {
        let active = self.detect_active(sample);

        if matches!(self.state, SyncState::Synced { .. }) {
            self.since_pulse += 1;
            if self.since_pulse > PULSE_WATCHDOG_MS {
                // Dead air: count a missed second and keep watching
                self.since_pulse -= 1000;
                self.record_outcome(false, events);
            }
        }

        // The timer runs on carrier level: high between pulses, low while
        // the per-second keying is active.
        if let Some(run) = self.timer.feed(!active) {
            match self.station {
                TimeStation::Dcf77 | TimeStation::Tdf => {
                    self.on_run_dcf(run.high, run.length, events)
                }
                TimeStation::Msf => self.on_run_msf(run.high, run.length, events),
                TimeStation::Wwvb => self.on_run_wwvb(run.high, run.length, events),
            }
        }
    }

    fn internal_rate(&self) -> f64 {
        TIMECODE_RATE
    }

    fn reset(&mut self) {
        self.detector = match self.station {
            TimeStation::Tdf => Detector::Phase {
                carrier: ComplexSample::new(0.0, 0.0),
                deviation: 0.0,
            },
            _ => Detector::Amplitude { level: 0.0 },
        };
        self.timer.reset();
        self.monitor.reset();
        self.state = SyncState::Searching;
        self.valid = [false; 60];
        self.group_lows.clear();
        self.prev_was_marker = false;
        self.since_pulse = 0;
    }
}

/// LSB-first BCD: bit weights 1, 2, 4, 8, 10, 20, 40, 80 in slice order
fn bcd_lsb(bits: &[bool]) -> u8 {
    const WEIGHTS: [u8; 8] = [1, 2, 4, 8, 10, 20, 40, 80];
    bits.iter()
        .zip(WEIGHTS.iter())
        .map(|(&bit, &weight)| if bit { weight } else { 0 })
        .sum()
}

/// MSB-first BCD: highest weight first, same weight ladder reversed
fn bcd_msb(bits: &[bool]) -> u8 {
    const WEIGHTS: [u8; 8] = [1, 2, 4, 8, 10, 20, 40, 80];
    bits.iter()
        .rev()
        .zip(WEIGHTS.iter())
        .map(|(&bit, &weight)| if bit { weight } else { 0 })
        .sum()
}

/// Even parity over a range that includes its parity bit
fn parity_even(bits: &[bool]) -> bool {
    bits.iter().filter(|&&b| b).count() % 2 == 0
}

/// Odd parity over a data range plus a separate parity bit
fn parity_odd(data: &[bool], parity_bit: bool) -> bool {
    (data.iter().filter(|&&b| b).count() + parity_bit as usize) % 2 == 1
}

fn check_range(value: u8, lo: u8, hi: u8, field: &str) -> Result<u8, String> {
    if (lo..=hi).contains(&value) {
        Ok(value)
    } else {
        Err(format!("Field out of range: {field}"))
    }
}

/// DCF77 frame fields (also TDF, which uses the same layout on a phase
/// carrier): LSB-first BCD, even parity over minute, hour and date.
fn decode_dcf77(a: &[bool; 60]) -> Result<TimeRecord, String> {
    if a[0] {
        return Err("Frame start bit is not zero".to_string());
    }
    if !a[20] {
        return Err("Time start bit missing".to_string());
    }
    if !parity_even(&a[21..=28]) {
        return Err("Parity check failed: minute".to_string());
    }
    if !parity_even(&a[29..=35]) {
        return Err("Parity check failed: hour".to_string());
    }
    if !parity_even(&a[36..=58]) {
        return Err("Parity check failed: date".to_string());
    }

    let minute = check_range(bcd_lsb(&a[21..=27]), 0, 59, "minute")?;
    let hour = check_range(bcd_lsb(&a[29..=34]), 0, 23, "hour")?;
    let day = check_range(bcd_lsb(&a[36..=41]), 1, 31, "day")?;
    let weekday = check_range(bcd_lsb(&a[42..=44]), 1, 7, "weekday")?;
    let month = check_range(bcd_lsb(&a[45..=49]), 1, 12, "month")?;
    let year = 2000 + bcd_lsb(&a[50..=57]) as u16;

    // Z1/Z2 keying, with the announcement bit taking precedence during
    // the hour before a changeover
    let dst = if a[16] {
        DstStatus::ChangePending
    } else {
        match (a[17], a[18]) {
            (true, false) => DstStatus::Daylight,
            (false, true) => DstStatus::Standard,
            _ => DstStatus::Unknown,
        }
    };

    Ok(TimeRecord {
        year,
        month,
        day,
        weekday: Some(weekday),
        hour,
        minute,
        dst,
        parity_ok: true,
    })
}

/// MSF frame fields: MSB-first BCD in the A stream, odd parity carried in
/// the B stream.
fn decode_msf(a: &[bool; 60], b: &[bool; 60]) -> Result<TimeRecord, String> {
    if !parity_odd(&a[17..=24], b[54]) {
        return Err("Parity check failed: year".to_string());
    }
    if !parity_odd(&a[25..=35], b[55]) {
        return Err("Parity check failed: date".to_string());
    }
    if !parity_odd(&a[36..=38], b[56]) {
        return Err("Parity check failed: weekday".to_string());
    }
    if !parity_odd(&a[39..=51], b[57]) {
        return Err("Parity check failed: time".to_string());
    }

    let year = 2000 + bcd_msb(&a[17..=24]) as u16;
    let month = check_range(bcd_msb(&a[25..=29]), 1, 12, "month")?;
    let day = check_range(bcd_msb(&a[30..=35]), 1, 31, "day")?;
    // 0 is Sunday on the air; fold to ISO 1 = Monday .. 7 = Sunday
    let raw_weekday = bcd_msb(&a[36..=38]);
    let weekday = if raw_weekday == 0 { 7 } else { raw_weekday };
    let hour = check_range(bcd_msb(&a[39..=44]), 0, 23, "hour")?;
    let minute = check_range(bcd_msb(&a[45..=51]), 0, 59, "minute")?;

    let dst = if b[53] {
        DstStatus::ChangePending
    } else if b[58] {
        DstStatus::Daylight
    } else {
        DstStatus::Standard
    };

    Ok(TimeRecord {
        year,
        month,
        day,
        weekday: Some(weekday),
        hour,
        minute,
        dst,
        parity_ok: true,
    })
}

/// WWVB frame fields: pulse-width BCD with fixed zero bits between groups,
/// day-of-year dating, no parity anywhere.
fn decode_wwvb(a: &[bool; 60]) -> Result<TimeRecord, String> {
    let minute = 40 * a[1] as u8
        + 20 * a[2] as u8
        + 10 * a[3] as u8
        + 8 * a[5] as u8
        + 4 * a[6] as u8
        + 2 * a[7] as u8
        + a[8] as u8;
    let hour = 20 * a[12] as u8
        + 10 * a[13] as u8
        + 8 * a[15] as u8
        + 4 * a[16] as u8
        + 2 * a[17] as u8
        + a[18] as u8;
    let day_of_year = 200 * a[22] as u16
        + 100 * a[23] as u16
        + 80 * a[25] as u16
        + 40 * a[26] as u16
        + 20 * a[27] as u16
        + 10 * a[28] as u16
        + 8 * a[30] as u16
        + 4 * a[31] as u16
        + 2 * a[32] as u16
        + a[33] as u16;
    let year = 2000
        + 80 * a[45] as u16
        + 40 * a[46] as u16
        + 20 * a[47] as u16
        + 10 * a[48] as u16
        + 8 * a[50] as u16
        + 4 * a[51] as u16
        + 2 * a[52] as u16
        + a[53] as u16;
    let leap_year = a[55];

    let minute = check_range(minute, 0, 59, "minute")?;
    let hour = check_range(hour, 0, 23, "hour")?;
    let (month, day) = month_day_from_day_of_year(day_of_year, leap_year)
        .ok_or_else(|| "Field out of range: day of year".to_string())?;

    let dst = match (a[57], a[58]) {
        (true, true) => DstStatus::Daylight,
        (false, false) => DstStatus::Standard,
        _ => DstStatus::ChangePending,
    };

    Ok(TimeRecord {
        year,
        month,
        day,
        weekday: None,
        hour,
        minute,
        dst,
        parity_ok: true,
    })
}

/// Convert an ordinal date to month and day-of-month
fn month_day_from_day_of_year(day_of_year: u16, leap: bool) -> Option<(u8, u8)> {
    const DAYS: [u16; 12] = [31, 28, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31];
    if day_of_year == 0 {
        return None;
    }
    let mut remaining = day_of_year;
    for (index, &days) in DAYS.iter().enumerate() {
        let days = if index == 1 && leap { 29 } else { days };
        if remaining <= days {
            return Some((index as u8 + 1, remaining as u8));
        }
        remaining -= days;
    }
    None
}
