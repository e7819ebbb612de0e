//! Core domain types

use serde::{Deserialize, Serialize};

/// Scalar sample type used throughout the signal path
pub type Sample = f32;

/// Complex baseband sample, the unit of all internal signal flow.
///
/// Sequences are produced once and consumed once; nothing in the chain
/// reads a sample back after forwarding it.
pub type ComplexSample = num_complex::Complex<Sample>;

/// Daylight-saving-time status decoded from a time-code broadcast
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DstStatus {
    /// Standard (winter) time in effect
    Standard,
    /// Daylight-saving (summer) time in effect
    Daylight,
    /// A change is announced for the upcoming hour
    ChangePending,
    /// The broadcast carries no usable DST information
    Unknown,
}

/// One decoded minute of a time-code broadcast.
///
/// Emitted only when every parity check the station defines has passed;
/// failed checks produce a [`DecodedEvent::Status`] naming the field instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRecord {
    /// Full year (broadcast years are two-digit, interpreted as 2000-2099)
    pub year: u16,
    pub month: u8,
    pub day: u8,
    /// ISO weekday 1 = Monday .. 7 = Sunday, when the station transmits one
    pub weekday: Option<u8>,
    pub hour: u8,
    pub minute: u8,
    pub dst: DstStatus,
    /// True when all station-defined parity ranges checked out
    /// (stations without parity bits report true)
    pub parity_ok: bool,
}

/// A decoded unit pushed onto the channel's outbound event queue.
///
/// Produced at most once per completed decode unit: one character, one
/// 60-bit time frame, one packet, one bearing estimate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DecodedEvent {
    /// One decoded text character (RTTY)
    Character(char),
    /// One decoded minute frame from a time-code beacon
    Time(TimeRecord),
    /// One navigation bearing estimate
    Radial { bearing_deg: f32, confidence: f32 },
    /// Independent baud/shift estimate from the live RTTY signal
    ModeEstimate { baud: f32, shift_hz: f32 },
    /// Demodulated packet bytes after unique-word alignment, destined for
    /// the external byte/packet parser
    Frame(Vec<u8>),
    /// Human-readable channel status (sync search, parity failure, ...)
    Status(String),
}

/// Snapshot of the channel's level meter, returned by a read-and-clear poll.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LevelReport {
    /// Mean magnitude-squared over the polling interval (0.0 when no samples)
    pub avg: f32,
    /// Peak magnitude-squared over the polling interval
    pub peak: f32,
    /// Number of samples accumulated since the last poll
    pub count: u64,
}

impl LevelReport {
    /// Average power in dB relative to full scale, floored for empty reports
    pub fn avg_db(&self) -> f32 {
        10.0 * self.avg.max(1e-12).log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoded_event_serializes_to_json() {
        let event = DecodedEvent::Radial {
            bearing_deg: 135.0,
            confidence: 0.9,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("Radial"), "got: {json}");
    }

    #[test]
    fn time_record_round_trips_through_json() {
        let record = TimeRecord {
            year: 2024,
            month: 6,
            day: 15,
            weekday: Some(6),
            hour: 14,
            minute: 30,
            dst: DstStatus::Daylight,
            parity_ok: true,
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: TimeRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn empty_level_report_has_finite_db() {
        let report = LevelReport {
            avg: 0.0,
            peak: 0.0,
            count: 0,
        };
        assert!(report.avg_db().is_finite());
    }
}
