// Per-process samples and top-K ranking rows

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::EntityId;

/// One process-group sample. `cpu_seconds_total` is a counter; memory and count are gauges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSample {
    pub entity_id: EntityId,
    pub timestamp: i64,
    pub process_name: String,
    pub cpu_seconds_total: f64,
    pub memory_bytes: f64,
    pub num_procs: f64,
}

/// Ranking criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RankMetric {
    Cpu,
    Memory,
}

impl RankMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            RankMetric::Cpu => "cpu",
            RankMetric::Memory => "memory",
        }
    }
}

impl fmt::Display for RankMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RankMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpu" => Ok(RankMetric::Cpu),
            "memory" => Ok(RankMetric::Memory),
            other => Err(format!("unknown ranking metric: {other}")),
        }
    }
}

/// One (entity, process) aggregate.
///
/// `avg_metric` is the value ranked on: average CPU percent (of one core) when ranking by
/// CPU, average resident memory in MB when ranking by memory. `avg_cpu_percent` is `None`
/// when no consecutive sample pair produced a valid CPU delta; such rows only ever appear
/// in memory rankings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessRankRow {
    pub entity_id: EntityId,
    pub label: String,
    pub process_name: String,
    pub avg_metric: f64,
    pub avg_cpu_percent: Option<f64>,
    pub avg_memory_mb: f64,
    pub peak_memory_mb: f64,
    pub avg_num_procs: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingResponse {
    pub metric: RankMetric,
    pub time_range_hours: u32,
    pub processes: Vec<ProcessRankRow>,
}
