//! Translated record types
//!
//! These are the normalized records handed to the target container writer.
//! A record is immutable once built; its [`RunInfo`] is shared between all
//! reads of the same acquisition within one input file.

use crate::codec::CompressedSignal;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Reason a read ended, in the target enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EndReasonKind {
    Unknown = 0,
    MuxChange = 1,
    UnblockMuxChange = 2,
    DataServiceUnblockMuxChange = 3,
    SignalPositive = 4,
    SignalNegative = 5,
    ApiRequest = 6,
    DeviceDataError = 7,
    AnalysisConfigChange = 8,
    Paused = 9,
}

impl EndReasonKind {
    /// Convert from the target enumeration value
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(EndReasonKind::Unknown),
            1 => Some(EndReasonKind::MuxChange),
            2 => Some(EndReasonKind::UnblockMuxChange),
            3 => Some(EndReasonKind::DataServiceUnblockMuxChange),
            4 => Some(EndReasonKind::SignalPositive),
            5 => Some(EndReasonKind::SignalNegative),
            6 => Some(EndReasonKind::ApiRequest),
            7 => Some(EndReasonKind::DeviceDataError),
            8 => Some(EndReasonKind::AnalysisConfigChange),
            9 => Some(EndReasonKind::Paused),
            _ => None,
        }
    }

    /// Get the stored integer representation
    pub fn as_db_int(&self) -> i64 {
        *self as u8 as i64
    }

    /// Name used in the output container
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReasonKind::Unknown => "unknown",
            EndReasonKind::MuxChange => "mux_change",
            EndReasonKind::UnblockMuxChange => "unblock_mux_change",
            EndReasonKind::DataServiceUnblockMuxChange => "data_service_unblock_mux_change",
            EndReasonKind::SignalPositive => "signal_positive",
            EndReasonKind::SignalNegative => "signal_negative",
            EndReasonKind::ApiRequest => "api_request",
            EndReasonKind::DeviceDataError => "device_data_error",
            EndReasonKind::AnalysisConfigChange => "analysis_config_change",
            EndReasonKind::Paused => "paused",
        }
    }

    /// Whether a read ending this way was forced by the instrument
    pub fn default_forced(&self) -> bool {
        matches!(
            self,
            EndReasonKind::MuxChange
                | EndReasonKind::UnblockMuxChange
                | EndReasonKind::DataServiceUnblockMuxChange
        )
    }
}

/// End reason with its forced flag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndReason {
    pub kind: EndReasonKind,
    pub forced: bool,
}

impl EndReason {
    /// Build an end reason carrying the kind's default forced flag
    pub fn with_default_forced(kind: EndReasonKind) -> Self {
        Self {
            kind,
            forced: kind.default_forced(),
        }
    }
}

/// Pore the read was sequenced through
#[derive(Debug, Clone, PartialEq)]
pub struct Pore {
    /// Channel number on the flow cell
    pub channel: u16,

    /// Well (mux) within the channel
    pub well: u8,

    /// Pore type label
    pub pore_type: String,
}

/// ADC to picoampere calibration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Calibration {
    pub offset: f32,
    pub scale: f32,
}

impl Calibration {
    /// Build from the legacy offset / range / digitisation triple
    pub fn from_range(offset: f32, adc_range: f32, digitisation: f32) -> Self {
        Self {
            offset,
            scale: adc_range / digitisation,
        }
    }
}

/// Shift and scale estimate for a read
#[derive(Debug, Clone, Copy)]
pub struct ShiftScalePair {
    pub shift: f32,
    pub scale: f32,
}

impl ShiftScalePair {
    /// Pair used when no estimate was recorded
    pub fn nan() -> Self {
        Self {
            shift: f32::NAN,
            scale: f32::NAN,
        }
    }

    /// Check if both values are missing
    pub fn is_nan(&self) -> bool {
        self.shift.is_nan() && self.scale.is_nan()
    }
}

/// Run metadata shared by every read of one acquisition
#[derive(Debug, Clone, PartialEq)]
pub struct RunInfo {
    pub acquisition_id: String,
    pub acquisition_start_time: DateTime<Utc>,
    pub adc_max: i16,
    pub adc_min: i16,
    pub context_tags: BTreeMap<String, String>,
    pub experiment_name: String,
    pub flow_cell_id: String,
    pub flow_cell_product_code: String,
    pub protocol_name: String,
    pub protocol_run_id: String,
    pub protocol_start_time: DateTime<Utc>,
    pub sample_id: String,
    pub sample_rate: u16,
    pub sequencing_kit: String,
    pub sequencer_position: String,
    pub sequencer_position_type: String,
    pub software: String,
    pub system_name: String,
    pub system_type: String,
    pub tracking_id: BTreeMap<String, String>,
}

/// A fully translated read ready for the target container
#[derive(Debug, Clone)]
pub struct TranslatedRecord {
    pub read_id: Uuid,
    pub pore: Pore,
    pub calibration: Calibration,
    pub read_number: u32,
    pub start_sample: u64,
    pub median_before: f32,
    pub num_minknow_events: u64,
    pub tracked_scaling: ShiftScalePair,
    pub predicted_scaling: ShiftScalePair,
    pub num_reads_since_mux_change: u32,
    pub time_since_mux_change: f32,
    pub end_reason: EndReason,
    pub run_info: Arc<RunInfo>,
    pub signal: CompressedSignal,
}

impl TranslatedRecord {
    /// Number of raw samples in the read
    pub fn sample_count(&self) -> u64 {
        self.signal.sample_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_reason_default_forced() {
        assert!(!EndReason::with_default_forced(EndReasonKind::Unknown).forced);
        assert!(EndReason::with_default_forced(EndReasonKind::MuxChange).forced);
        assert!(EndReason::with_default_forced(EndReasonKind::UnblockMuxChange).forced);
        assert!(!EndReason::with_default_forced(EndReasonKind::SignalPositive).forced);
        assert!(!EndReason::with_default_forced(EndReasonKind::SignalNegative).forced);
    }

    #[test]
    fn test_end_reason_from_u8() {
        assert_eq!(EndReasonKind::from_u8(4), Some(EndReasonKind::SignalPositive));
        assert_eq!(EndReasonKind::from_u8(10), None);
        assert_eq!(EndReasonKind::Paused.as_db_int(), 9);
    }

    #[test]
    fn test_calibration_from_range() {
        let cal = Calibration::from_range(4.0, 1400.0, 8192.0);
        assert_eq!(cal.offset, 4.0);
        assert!((cal.scale - 0.170_898_44).abs() < 1e-6);
    }
}
