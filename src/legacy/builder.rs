//! Builders for legacy read groups
//!
//! Produces groups laid out the way multi-read fast5 files store a read:
//!
//! ```text
//! read_<uuid>/            attrs: run_id, pore_type
//!   channel_id/           attrs: channel_number, digitisation, offset, range, sampling_rate
//!   Raw/                  attrs: read_id, start_mux, read_number, start_time, median_before, ...
//!                         signal
//!   context_tags/         attrs: sequencing_kit, ...
//!   tracking_id/          attrs: run_id, exp_start_time, exp_script_name, ...
//! ```

use super::Group;
use uuid::Uuid;

/// Builder for one legacy read group
#[derive(Debug, Clone)]
pub struct ReadBuilder {
    read_id: String,
    run_id: Option<String>,
    tracking_run_id: String,
    digitisation: f64,
    channel: String,
    start_mux: i64,
    read_number: i64,
    signal: Vec<i16>,
    end_reason: Option<i64>,
    tracked_scaling: Option<(f64, f64)>,
    device_type: Option<String>,
    exp_start_time: Option<String>,
}

impl ReadBuilder {
    /// Start a read with a fresh random read id
    pub fn new() -> Self {
        Self::with_read_id(&Uuid::new_v4().to_string())
    }

    /// Start a read with the given read id
    pub fn with_read_id(read_id: &str) -> Self {
        Self {
            read_id: read_id.to_string(),
            run_id: Some("run-0".into()),
            tracking_run_id: "run-0".into(),
            digitisation: 8192.0,
            channel: "1".into(),
            start_mux: 1,
            read_number: 1,
            signal: vec![480, 482, 479, 481, 490, 500],
            end_reason: None,
            tracked_scaling: None,
            device_type: None,
            exp_start_time: Some("2022-03-01T10:00:00Z".into()),
        }
    }

    /// Acquisition id on the read itself; `None` leaves only the tracking id
    pub fn run_id(mut self, run_id: Option<&str>) -> Self {
        self.run_id = run_id.map(str::to_string);
        self
    }

    /// Acquisition id recorded in the nested tracking group
    pub fn tracking_run_id(mut self, run_id: &str) -> Self {
        self.tracking_run_id = run_id.to_string();
        self
    }

    pub fn digitisation(mut self, digitisation: f64) -> Self {
        self.digitisation = digitisation;
        self
    }

    pub fn channel(mut self, channel: u16) -> Self {
        self.channel = channel.to_string();
        self
    }

    pub fn read_number(mut self, read_number: i64) -> Self {
        self.read_number = read_number;
        self
    }

    pub fn signal(mut self, signal: Vec<i16>) -> Self {
        self.signal = signal;
        self
    }

    pub fn end_reason(mut self, end_reason: i64) -> Self {
        self.end_reason = Some(end_reason);
        self
    }

    pub fn tracked_scaling(mut self, shift: f64, scale: f64) -> Self {
        self.tracked_scaling = Some((shift, scale));
        self
    }

    pub fn device_type(mut self, device_type: &str) -> Self {
        self.device_type = Some(device_type.to_string());
        self
    }

    pub fn exp_start_time(mut self, time: Option<&str>) -> Self {
        self.exp_start_time = time.map(str::to_string);
        self
    }

    /// Group name under the container root
    pub fn name(&self) -> String {
        format!("read_{}", self.read_id)
    }

    /// Build the read group
    pub fn build(self) -> Group {
        let channel_id = Group::new()
            .with_attr("channel_number", self.channel)
            .with_attr("digitisation", self.digitisation)
            .with_attr("offset", 4.0)
            .with_attr("range", 1400.0)
            .with_attr("sampling_rate", 4000.0);

        let mut raw = Group::new()
            .with_attr("read_id", self.read_id)
            .with_attr("start_mux", self.start_mux)
            .with_attr("read_number", self.read_number)
            .with_attr("start_time", 1_000 * self.read_number)
            .with_attr("median_before", 210.5)
            .with_signal(self.signal);
        if let Some(end_reason) = self.end_reason {
            raw = raw.with_attr("end_reason", end_reason);
        }
        if let Some((shift, scale)) = self.tracked_scaling {
            raw = raw
                .with_attr("tracked_scaling_shift", shift)
                .with_attr("tracked_scaling_scale", scale);
        }

        let context_tags = Group::new()
            .with_attr("sequencing_kit", "sqk-lsk109")
            .with_attr("experiment_type", "genomic_dna");

        let mut tracking_id = Group::new()
            .with_attr("run_id", self.tracking_run_id)
            .with_attr("exp_script_name", "sequencing/sequencing_MIN106_DNA")
            .with_attr("protocol_run_id", "protocol-0")
            .with_attr("sample_id", "sample-0")
            .with_attr("flow_cell_id", "FAK00000")
            .with_attr("device_id", "MN00000");
        if let Some(device_type) = self.device_type {
            tracking_id = tracking_id.with_attr("device_type", device_type);
        }
        if let Some(time) = self.exp_start_time {
            tracking_id = tracking_id.with_attr("exp_start_time", time);
        }

        let mut read = Group::new()
            .with_group("channel_id", channel_id)
            .with_group("Raw", raw)
            .with_group("context_tags", context_tags)
            .with_group("tracking_id", tracking_id);
        if let Some(run_id) = self.run_id {
            read = read.with_attr("run_id", run_id);
        }
        read
    }
}

impl Default for ReadBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a multi-read container root holding the given reads
pub fn multi_read_container(reads: impl IntoIterator<Item = ReadBuilder>) -> Group {
    reads.into_iter().fold(
        Group::new().with_attr("file_type", "multi-read"),
        |root, read| {
            let name = read.name();
            root.with_group(&name, read.build())
        },
    )
}
