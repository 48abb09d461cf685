// Derived rate points and the aligned multi-entity timeline response

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::EntityId;

/// Named output series. Ordering is stable so serialized rows are byte-identical across runs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MetricName {
    CpuPercent,
    MemoryUsedMb,
    MemoryTotalMb,
    MemoryPercent,
    DiskUsedGb,
    DiskTotalGb,
    DiskPercent,
    NetworkRxMbps,
    NetworkTxMbps,
}

impl MetricName {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricName::CpuPercent => "cpu_percent",
            MetricName::MemoryUsedMb => "memory_used_mb",
            MetricName::MemoryTotalMb => "memory_total_mb",
            MetricName::MemoryPercent => "memory_percent",
            MetricName::DiskUsedGb => "disk_used_gb",
            MetricName::DiskTotalGb => "disk_total_gb",
            MetricName::DiskPercent => "disk_percent",
            MetricName::NetworkRxMbps => "network_rx_mbps",
            MetricName::NetworkTxMbps => "network_tx_mbps",
        }
    }
}

impl fmt::Display for MetricName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One derived value for one entity at one bucket timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatePoint {
    pub entity_id: EntityId,
    pub timestamp: i64,
    pub metric: MetricName,
    pub value: f64,
}

/// One row of the global grid. A row with no values is a placeholder: the entity
/// reported nothing at a timestamp some other entity did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedDataPoint {
    pub timestamp: i64,
    #[serde(flatten)]
    pub values: BTreeMap<MetricName, f64>,
}

impl UnifiedDataPoint {
    pub fn placeholder(timestamp: i64) -> Self {
        Self {
            timestamp,
            values: BTreeMap::new(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, metric: MetricName) -> Option<f64> {
        self.values.get(&metric).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityTimeline {
    pub entity_id: EntityId,
    pub display_name: String,
    /// Most recent first; same length for every entity of a response.
    pub data_points: Vec<UnifiedDataPoint>,
}

/// Echoed query window (epoch milliseconds).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
    pub hours: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineResponse {
    pub metrics: Vec<EntityTimeline>,
    pub time_range: TimeRange,
}
