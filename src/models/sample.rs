// Raw counter/gauge samples as returned by the sample store, and their 1-bucket reductions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::EntityId;

/// Resource family a sample belongs to. Each kind is fetched and rated independently.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    Cpu,
    Memory,
    Disk,
    Network,
}

impl MetricKind {
    pub const ALL: [MetricKind; 4] = [
        MetricKind::Cpu,
        MetricKind::Memory,
        MetricKind::Disk,
        MetricKind::Network,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Cpu => "cpu",
            MetricKind::Memory => "memory",
            MetricKind::Disk => "disk",
            MetricKind::Network => "network",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(MetricKind::Cpu),
            "memory" => Ok(MetricKind::Memory),
            "disk" => Ok(MetricKind::Disk),
            "network" => Ok(MetricKind::Network),
            other => Err(format!("unknown metric kind: {other}")),
        }
    }
}

/// Cumulative CPU seconds per mode (counters) plus the core count (gauge).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CpuFields {
    pub user_seconds: f64,
    pub system_seconds: f64,
    pub iowait_seconds: f64,
    pub steal_seconds: f64,
    pub cores: f64,
}

/// Memory gauges in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MemoryFields {
    pub total_bytes: f64,
    pub available_bytes: f64,
}

/// Filesystem gauges in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DiskFields {
    pub total_bytes: f64,
    pub available_bytes: f64,
}

/// Cumulative interface byte counters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkFields {
    pub rx_bytes: f64,
    pub tx_bytes: f64,
}

/// Field payload of a sample; the variant determines the metric kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SampleFields {
    Cpu(CpuFields),
    Memory(MemoryFields),
    Disk(DiskFields),
    Network(NetworkFields),
}

impl SampleFields {
    pub fn kind(&self) -> MetricKind {
        match self {
            SampleFields::Cpu(_) => MetricKind::Cpu,
            SampleFields::Memory(_) => MetricKind::Memory,
            SampleFields::Disk(_) => MetricKind::Disk,
            SampleFields::Network(_) => MetricKind::Network,
        }
    }
}

/// One row from the sample store. `timestamp` is unix epoch milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub entity_id: EntityId,
    pub timestamp: i64,
    pub fields: SampleFields,
}

impl RawSample {
    pub fn metric_kind(&self) -> MetricKind {
        self.fields.kind()
    }
}

/// Fixed-width reduction of the raw samples of one (entity, kind) falling into one interval.
/// `timestamp` is the aligned interval start; counters hold the max, gauges the mean.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub entity_id: EntityId,
    pub timestamp: i64,
    pub fields: SampleFields,
    pub sample_count: usize,
}
