//! Legacy read to target record translation
//!
//! Reconciles the two schemas:
//! - acquisition metadata is built once per acquisition id per input file
//!   ([`RunInfoCache`]) and shared by every read of that acquisition
//! - the legacy end-reason enumeration carries an extra `partial` value that
//!   the target drops, so values past it shift down by one
//! - optional legacy attributes fall back to fixed defaults, never errors
//! - the ADC range and device type are inferred from the digitisation when
//!   the legacy file does not record them

use crate::codec::SignalCodec;
use crate::error::{LegacyError, TranslateError, TranslateResult};
use crate::legacy::{AttrValue, Group};
use crate::model::{
    Calibration, EndReason, EndReasonKind, Pore, RunInfo, ShiftScalePair, TranslatedRecord,
};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Software label recorded in every run info
pub const SOFTWARE_NAME: &str = "pod5-convert";

/// Digitisation reported by MinION-class devices
const MINION_DIGITISATION: f64 = 8192.0;

/// Per-file cache of run metadata keyed by acquisition id
///
/// Owned by a single worker for the duration of one input file.
#[derive(Debug, Default)]
pub struct RunInfoCache {
    entries: HashMap<String, Arc<RunInfo>>,
    builds: usize,
}

impl RunInfoCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cached run info for `acquisition_id`, building it on first use
    pub fn get_or_build<F>(&mut self, acquisition_id: &str, build: F) -> TranslateResult<Arc<RunInfo>>
    where
        F: FnOnce() -> TranslateResult<RunInfo>,
    {
        if let Some(info) = self.entries.get(acquisition_id) {
            return Ok(Arc::clone(info));
        }

        let info = Arc::new(build()?);
        self.builds += 1;
        self.entries
            .insert(acquisition_id.to_string(), Arc::clone(&info));
        Ok(info)
    }

    /// Number of distinct acquisitions seen
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of times run info was constructed
    pub fn builds(&self) -> usize {
        self.builds
    }
}

/// Translates legacy read groups using a codec and chunk size
pub struct Translator<'a> {
    codec: &'a dyn SignalCodec,
    chunk_size: usize,
}

impl<'a> Translator<'a> {
    pub fn new(codec: &'a dyn SignalCodec, chunk_size: usize) -> Self {
        Self { codec, chunk_size }
    }

    /// Translate the read stored in group `name`
    pub fn translate(
        &self,
        name: &str,
        read: &Group,
        cache: &mut RunInfoCache,
    ) -> TranslateResult<TranslatedRecord> {
        let channel_id = child(read, "channel_id")?;
        let raw = child(read, "Raw")?;

        let acquisition_id = match read.attr("run_id") {
            Some(value) => value.to_text(),
            None => required(child(read, "tracking_id")?, "tracking_id", "run_id")?.to_text(),
        };

        let run_info =
            cache.get_or_build(&acquisition_id, || build_run_info(&acquisition_id, read, channel_id))?;

        let read_id_text = required(raw, "Raw", "read_id")?.to_text();
        let read_id = Uuid::parse_str(&read_id_text).map_err(|e| TranslateError::InvalidReadId {
            value: read_id_text.clone(),
            reason: e.to_string(),
        })?;

        let pore = Pore {
            channel: required_int(channel_id, "channel_id", "channel_number")?,
            well: required_int(raw, "Raw", "start_mux")?,
            pore_type: read
                .attr("pore_type")
                .map(AttrValue::to_text)
                .unwrap_or_else(|| "not_set".to_string()),
        };

        let calibration = Calibration::from_range(
            required_float(channel_id, "channel_id", "offset")? as f32,
            required_float(channel_id, "channel_id", "range")? as f32,
            required_float(channel_id, "channel_id", "digitisation")? as f32,
        );

        let end_reason = convert_end_reason(optional_int(raw, "end_reason", 0))?;

        let samples = raw.signal.as_deref().ok_or_else(|| LegacyError::NoSignal {
            name: format!("{}/Raw", name),
        })?;
        let signal = self.codec.compress(samples, self.chunk_size)?;

        Ok(TranslatedRecord {
            read_id,
            pore,
            calibration,
            read_number: required_int(raw, "Raw", "read_number")?,
            start_sample: required_int(raw, "Raw", "start_time")?,
            median_before: required_float(raw, "Raw", "median_before")? as f32,
            num_minknow_events: optional_int(raw, "num_minknow_events", 0).max(0) as u64,
            tracked_scaling: scaling_pair(raw, "tracked_scaling"),
            predicted_scaling: scaling_pair(raw, "predicted_scaling"),
            num_reads_since_mux_change: optional_int(raw, "num_reads_since_mux_change", 0).max(0)
                as u32,
            time_since_mux_change: optional_float(raw, "time_since_mux_change", 0.0) as f32,
            end_reason,
            run_info,
            signal,
        })
    }
}

/// Map a legacy end-reason value onto the target enumeration
///
/// Legacy `unknown` (0) and `partial` (1) both become `unknown`; every later
/// value moves down by one. The forced flag is the target kind's default.
pub fn convert_end_reason(legacy: i64) -> TranslateResult<EndReason> {
    if legacy < 2 {
        return Ok(EndReason::with_default_forced(EndReasonKind::Unknown));
    }

    u8::try_from(legacy - 1)
        .ok()
        .and_then(EndReasonKind::from_u8)
        .map(EndReason::with_default_forced)
        .ok_or(TranslateError::UnknownEndReason(legacy))
}

/// Parse a legacy timestamp, falling back to the Unix epoch
pub fn parse_timestamp(value: Option<&str>) -> DateTime<Utc> {
    let Some(text) = value.map(str::trim) else {
        return DateTime::<Utc>::default();
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return parsed.with_timezone(&Utc);
    }

    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
        .unwrap_or_default()
}

/// ADC range and device type guessed from the channel digitisation
pub fn infer_adc(digitisation: f64) -> (i16, i16, &'static str) {
    if digitisation == MINION_DIGITISATION {
        (-4096, 4095, "minion")
    } else {
        (0, 2047, "promethion")
    }
}

fn build_run_info(acquisition_id: &str, read: &Group, channel_id: &Group) -> TranslateResult<RunInfo> {
    let tracking = child(read, "tracking_id")?;
    let context = child(read, "context_tags")?;

    let (adc_min, adc_max, device_guess) =
        infer_adc(required_float(channel_id, "channel_id", "digitisation")?);

    let tracking_id = tracking.attrs_as_text();
    let context_tags = context.attrs_as_text();
    let text = |map: &std::collections::BTreeMap<String, String>, key: &str| {
        map.get(key).cloned().unwrap_or_default()
    };

    Ok(RunInfo {
        acquisition_id: acquisition_id.to_string(),
        acquisition_start_time: parse_timestamp(tracking_id.get("exp_start_time").map(String::as_str)),
        adc_max,
        adc_min,
        experiment_name: String::new(),
        flow_cell_id: text(&tracking_id, "flow_cell_id"),
        flow_cell_product_code: text(&tracking_id, "flow_cell_product_code"),
        protocol_name: required(tracking, "tracking_id", "exp_script_name")?.to_text(),
        protocol_run_id: required(tracking, "tracking_id", "protocol_run_id")?.to_text(),
        protocol_start_time: parse_timestamp(
            tracking_id.get("protocol_start_time").map(String::as_str),
        ),
        sample_id: required(tracking, "tracking_id", "sample_id")?.to_text(),
        sample_rate: required_int(channel_id, "channel_id", "sampling_rate")?,
        sequencing_kit: text(&context_tags, "sequencing_kit"),
        sequencer_position: text(&tracking_id, "device_id"),
        sequencer_position_type: tracking_id
            .get("device_type")
            .cloned()
            .unwrap_or_else(|| device_guess.to_string()),
        software: SOFTWARE_NAME.to_string(),
        system_name: text(&tracking_id, "host_product_serial_number"),
        system_type: text(&tracking_id, "host_product_code"),
        context_tags,
        tracking_id,
    })
}

fn child<'g>(group: &'g Group, name: &str) -> TranslateResult<&'g Group> {
    group.group(name).ok_or_else(|| {
        LegacyError::GroupNotFound {
            name: name.to_string(),
        }
        .into()
    })
}

fn required<'g>(group: &'g Group, group_name: &str, key: &str) -> TranslateResult<&'g AttrValue> {
    group.attr(key).ok_or_else(|| TranslateError::MissingAttribute {
        group: group_name.to_string(),
        key: key.to_string(),
    })
}

/// Integer attribute; legacy files sometimes store integers as strings
fn required_int<T: TryFrom<i64>>(group: &Group, group_name: &str, key: &str) -> TranslateResult<T> {
    let value = required(group, group_name, key)?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<i64>().ok()))
        .and_then(|v| T::try_from(v).ok())
        .ok_or_else(|| TranslateError::WrongType {
            group: group_name.to_string(),
            key: key.to_string(),
            expected: "an integer in range",
        })
}

fn required_float(group: &Group, group_name: &str, key: &str) -> TranslateResult<f64> {
    let value = required(group, group_name, key)?;
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse::<f64>().ok()))
        .ok_or_else(|| TranslateError::WrongType {
            group: group_name.to_string(),
            key: key.to_string(),
            expected: "a number",
        })
}

fn optional_int(group: &Group, key: &str, default: i64) -> i64 {
    group.attr(key).and_then(AttrValue::as_i64).unwrap_or(default)
}

fn optional_float(group: &Group, key: &str, default: f64) -> f64 {
    group.attr(key).and_then(AttrValue::as_f64).unwrap_or(default)
}

fn scaling_pair(raw: &Group, prefix: &str) -> ShiftScalePair {
    let shift = raw.attr(&format!("{}_shift", prefix)).and_then(AttrValue::as_f64);
    let scale = raw.attr(&format!("{}_scale", prefix)).and_then(AttrValue::as_f64);
    ShiftScalePair {
        shift: shift.map_or(f32::NAN, |v| v as f32),
        scale: scale.map_or(f32::NAN, |v| v as f32),
    }
}
