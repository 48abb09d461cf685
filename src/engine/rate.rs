// Counter/gauge series -> sparse rate series.
//
// Raw samples are reduced into fixed-width buckets per entity (counters by max, gauges by
// mean), then consecutive buckets of the same entity are paired. A pair only yields a point
// when its gap is inside [min_pair_secs, max_pair_secs], no counter went backwards and the
// normalizer is positive. Everything else is dropped without a trace in the output.

use std::collections::{BTreeMap, HashMap};

use crate::config::EngineConfig;
use crate::models::{
    Bucket, CpuFields, DiskFields, EntityId, MemoryFields, MetricKind, MetricName, NetworkFields,
    RatePoint, RawSample, SampleFields,
};

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
pub const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;
const BITS_PER_BYTE: f64 = 8.0;
const BITS_PER_MEGABIT: f64 = 1_000_000.0;

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Counter delta; `None` on regression (the source restarted and its counter reset).
fn counter_delta(cur: f64, prev: f64) -> Option<f64> {
    (cur >= prev).then_some(cur - prev)
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 { 0.0 } else { sum / n as f64 }
}

fn max(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(f64::NEG_INFINITY, f64::max)
}

/// Aligned start of the bucket containing `timestamp`.
pub fn bucket_start(timestamp: i64, bucket_ms: i64) -> i64 {
    timestamp.div_euclid(bucket_ms) * bucket_ms
}

/// Reduces the fields of one bucket. All entries must be of `kind`.
fn reduce(kind: MetricKind, fields: &[SampleFields]) -> SampleFields {
    match kind {
        MetricKind::Cpu => {
            let cpu: Vec<&CpuFields> = fields
                .iter()
                .filter_map(|f| match f {
                    SampleFields::Cpu(c) => Some(c),
                    _ => None,
                })
                .collect();
            SampleFields::Cpu(CpuFields {
                user_seconds: max(cpu.iter().map(|c| c.user_seconds)),
                system_seconds: max(cpu.iter().map(|c| c.system_seconds)),
                iowait_seconds: max(cpu.iter().map(|c| c.iowait_seconds)),
                steal_seconds: max(cpu.iter().map(|c| c.steal_seconds)),
                cores: mean(cpu.iter().map(|c| c.cores)),
            })
        }
        MetricKind::Memory => {
            let mem: Vec<&MemoryFields> = fields
                .iter()
                .filter_map(|f| match f {
                    SampleFields::Memory(m) => Some(m),
                    _ => None,
                })
                .collect();
            SampleFields::Memory(MemoryFields {
                total_bytes: mean(mem.iter().map(|m| m.total_bytes)),
                available_bytes: mean(mem.iter().map(|m| m.available_bytes)),
            })
        }
        MetricKind::Disk => {
            let disk: Vec<&DiskFields> = fields
                .iter()
                .filter_map(|f| match f {
                    SampleFields::Disk(d) => Some(d),
                    _ => None,
                })
                .collect();
            SampleFields::Disk(DiskFields {
                total_bytes: mean(disk.iter().map(|d| d.total_bytes)),
                available_bytes: mean(disk.iter().map(|d| d.available_bytes)),
            })
        }
        MetricKind::Network => {
            let net: Vec<&NetworkFields> = fields
                .iter()
                .filter_map(|f| match f {
                    SampleFields::Network(n) => Some(n),
                    _ => None,
                })
                .collect();
            SampleFields::Network(NetworkFields {
                rx_bytes: max(net.iter().map(|n| n.rx_bytes)),
                tx_bytes: max(net.iter().map(|n| n.tx_bytes)),
            })
        }
    }
}

/// Groups samples of `kind` into aligned buckets. Output is ordered by entity, then bucket
/// start ascending. Buckets without samples do not exist; samples of another kind are ignored.
pub fn bucketize(samples: &[RawSample], kind: MetricKind, bucket_ms: i64) -> Vec<Bucket> {
    let mut grouped: BTreeMap<(&EntityId, i64), Vec<SampleFields>> = BTreeMap::new();
    for s in samples.iter().filter(|s| s.metric_kind() == kind) {
        grouped
            .entry((&s.entity_id, bucket_start(s.timestamp, bucket_ms)))
            .or_default()
            .push(s.fields);
    }
    grouped
        .into_iter()
        .map(|((entity_id, timestamp), fields)| Bucket {
            entity_id: entity_id.clone(),
            timestamp,
            sample_count: fields.len(),
            fields: reduce(kind, &fields),
        })
        .collect()
}

/// Why a bucket pair produced no point.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Exclusions {
    pub out_of_window: usize,
    pub counter_reset: usize,
    pub no_normalizer: usize,
}

impl Exclusions {
    pub fn total(&self) -> usize {
        self.out_of_window + self.counter_reset + self.no_normalizer
    }
}

/// Rate calculation over buckets, parameterised by the engine configuration.
pub struct RateCalculator<'a> {
    config: &'a EngineConfig,
}

impl<'a> RateCalculator<'a> {
    pub fn new(config: &'a EngineConfig) -> Self {
        Self { config }
    }

    /// Raw samples of one metric kind -> sparse rate points.
    pub fn compute(&self, samples: &[RawSample], kind: MetricKind) -> Vec<RatePoint> {
        let buckets = bucketize(samples, kind, self.config.bucket_ms());
        let (points, excluded) = self.from_buckets(&buckets, kind);
        if excluded.total() > 0 {
            tracing::debug!(
                kind = %kind,
                buckets = buckets.len(),
                out_of_window = excluded.out_of_window,
                counter_reset = excluded.counter_reset,
                no_normalizer = excluded.no_normalizer,
                "bucket pairs excluded from rate series"
            );
        }
        points
    }

    /// Buckets must be ascending by timestamp within each entity; entities may interleave.
    pub fn from_buckets(&self, buckets: &[Bucket], kind: MetricKind) -> (Vec<RatePoint>, Exclusions) {
        let mut out = Vec::new();
        let mut excluded = Exclusions::default();

        match kind {
            MetricKind::Memory | MetricKind::Disk => {
                for b in buckets {
                    match self.gauge_points(b) {
                        Some(points) => out.extend(points),
                        None => excluded.no_normalizer += 1,
                    }
                }
            }
            MetricKind::Cpu | MetricKind::Network => {
                let mut last_seen: HashMap<&EntityId, &Bucket> = HashMap::new();
                for cur in buckets.iter().filter(|b| b.fields.kind() == kind) {
                    let Some(prev) = last_seen.insert(&cur.entity_id, cur) else {
                        continue;
                    };
                    match self.pair_points(prev, cur) {
                        Ok(points) => out.extend(points),
                        Err(Exclusion::OutOfWindow) => excluded.out_of_window += 1,
                        Err(Exclusion::CounterReset) => excluded.counter_reset += 1,
                        Err(Exclusion::NoNormalizer) => excluded.no_normalizer += 1,
                    }
                }
            }
        }
        (out, excluded)
    }

    /// Whether a gap of `seconds` between two buckets is short and long enough to rate.
    pub fn within_window(&self, seconds: f64) -> bool {
        seconds >= f64::from(self.config.min_pair_secs)
            && seconds <= f64::from(self.config.max_pair_secs)
    }

    fn pair_points(&self, prev: &Bucket, cur: &Bucket) -> Result<Vec<RatePoint>, Exclusion> {
        let seconds = (cur.timestamp - prev.timestamp) as f64 / 1000.0;
        if !self.within_window(seconds) {
            return Err(Exclusion::OutOfWindow);
        }
        let point = |metric, value| RatePoint {
            entity_id: cur.entity_id.clone(),
            timestamp: cur.timestamp,
            metric,
            value,
        };

        match (&prev.fields, &cur.fields) {
            (SampleFields::Cpu(p), SampleFields::Cpu(c)) => {
                let busy = [
                    counter_delta(c.user_seconds, p.user_seconds),
                    counter_delta(c.system_seconds, p.system_seconds),
                    counter_delta(c.iowait_seconds, p.iowait_seconds),
                    counter_delta(c.steal_seconds, p.steal_seconds),
                ]
                .into_iter()
                .sum::<Option<f64>>()
                .ok_or(Exclusion::CounterReset)?;
                if c.cores <= 0.0 {
                    return Err(Exclusion::NoNormalizer);
                }
                let percent = (busy / c.cores / seconds * 100.0).min(100.0);
                Ok(vec![point(
                    MetricName::CpuPercent,
                    round_to(percent, self.config.decimals),
                )])
            }
            (SampleFields::Network(p), SampleFields::Network(c)) => {
                let (Some(rx), Some(tx)) = (
                    counter_delta(c.rx_bytes, p.rx_bytes),
                    counter_delta(c.tx_bytes, p.tx_bytes),
                ) else {
                    return Err(Exclusion::CounterReset);
                };
                let mbps = |bytes: f64| {
                    round_to(
                        bytes / seconds * BITS_PER_BYTE / BITS_PER_MEGABIT,
                        self.config.throughput_decimals,
                    )
                };
                Ok(vec![
                    point(MetricName::NetworkRxMbps, mbps(rx)),
                    point(MetricName::NetworkTxMbps, mbps(tx)),
                ])
            }
            _ => Err(Exclusion::NoNormalizer),
        }
    }

    fn gauge_points(&self, b: &Bucket) -> Option<Vec<RatePoint>> {
        let (total, available, unit, [used_name, total_name, percent_name]) = match b.fields {
            SampleFields::Memory(m) => (
                m.total_bytes,
                m.available_bytes,
                BYTES_PER_MB,
                [
                    MetricName::MemoryUsedMb,
                    MetricName::MemoryTotalMb,
                    MetricName::MemoryPercent,
                ],
            ),
            SampleFields::Disk(d) => (
                d.total_bytes,
                d.available_bytes,
                BYTES_PER_GB,
                [
                    MetricName::DiskUsedGb,
                    MetricName::DiskTotalGb,
                    MetricName::DiskPercent,
                ],
            ),
            _ => return None,
        };
        if total <= 0.0 {
            return None;
        }
        let used = (total - available).max(0.0);
        let decimals = self.config.decimals;
        let point = |metric, value| RatePoint {
            entity_id: b.entity_id.clone(),
            timestamp: b.timestamp,
            metric,
            value,
        };
        Some(vec![
            point(used_name, round_to(used / unit, decimals)),
            point(total_name, round_to(total / unit, decimals)),
            point(
                percent_name,
                round_to((used / total * 100.0).min(100.0), decimals),
            ),
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exclusion {
    OutOfWindow,
    CounterReset,
    NoNormalizer,
}
