// Top-K process ranking over a window of per-process samples.
//
// Samples are walked in timestamp order with a last-seen map keyed by (entity, process);
// each consecutive pair contributes one CPU rate (capped at one full core) unless the counter
// went backwards.
// Memory and process counts are gauges and are averaged over every sample.
//
// Ranking by CPU drops processes that never produced a valid pair. Ranking by memory keeps
// them with `avg_cpu_percent = None`. Both behaviours are intentional and covered by tests.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use super::rate::{BYTES_PER_MB, round_to};
use crate::config::EngineConfig;
use crate::models::{EntityId, ProcessRankRow, ProcessSample, RankMetric};

/// Hard cap on rows returned by one ranking.
pub const MAX_RANK_LIMIT: usize = 50;

/// Denominator floor for the sample gap, so equal or out-of-order timestamps never divide by zero.
const MIN_PAIR_SECS: f64 = 1.0;

#[derive(Debug, Default)]
struct ProcessAccumulator {
    cpu_rate_sum: f64,
    cpu_rate_count: usize,
    memory_sum: f64,
    memory_peak: f64,
    procs_sum: f64,
    samples: usize,
}

impl ProcessAccumulator {
    fn add_gauges(&mut self, s: &ProcessSample) {
        self.memory_sum += s.memory_bytes;
        self.memory_peak = self.memory_peak.max(s.memory_bytes);
        self.procs_sum += s.num_procs;
        self.samples += 1;
    }

    fn avg_cpu(&self) -> Option<f64> {
        (self.cpu_rate_count > 0).then(|| self.cpu_rate_sum / self.cpu_rate_count as f64)
    }
}

/// Ceiling for one per-pair CPU rate: one full core.
const MAX_CPU_PERCENT: f64 = 100.0;

/// CPU percent (of one core) between two samples of the same process group, in [0, 100].
fn cpu_rate(prev: &ProcessSample, cur: &ProcessSample) -> Option<f64> {
    let delta = cur.cpu_seconds_total - prev.cpu_seconds_total;
    if delta < 0.0 {
        return None;
    }
    let seconds = ((cur.timestamp - prev.timestamp) as f64 / 1000.0).max(MIN_PAIR_SECS);
    Some((delta / seconds * 100.0).min(MAX_CPU_PERCENT))
}

/// Ranks (entity, process) groups by `metric` descending and keeps the first `limit`
/// (capped at [`MAX_RANK_LIMIT`]). Ties are broken by process name, then entity id, ascending.
/// `labels` maps entity ids to display names; missing entries fall back to the id.
pub fn rank(
    samples: &[ProcessSample],
    labels: &HashMap<EntityId, String>,
    metric: RankMetric,
    limit: usize,
    config: &EngineConfig,
) -> Vec<ProcessRankRow> {
    let mut ordered: Vec<&ProcessSample> = samples.iter().collect();
    ordered.sort_by_key(|s| s.timestamp);

    let mut groups: BTreeMap<(&EntityId, &str), ProcessAccumulator> = BTreeMap::new();
    let mut last_seen: HashMap<(&EntityId, &str), &ProcessSample> = HashMap::new();
    let mut resets = 0usize;

    for s in ordered {
        let key = (&s.entity_id, s.process_name.as_str());
        let acc = groups.entry(key).or_default();
        acc.add_gauges(s);
        if let Some(prev) = last_seen.insert(key, s) {
            match cpu_rate(prev, s) {
                Some(rate) => {
                    acc.cpu_rate_sum += rate;
                    acc.cpu_rate_count += 1;
                }
                None => resets += 1,
            }
        }
    }
    if resets > 0 {
        tracing::debug!(resets, "process cpu counter resets excluded from ranking");
    }

    let decimals = config.decimals;
    let mut rows: Vec<ProcessRankRow> = groups
        .into_iter()
        .filter_map(|((entity_id, process_name), acc)| {
            let avg_cpu = acc.avg_cpu().map(|v| round_to(v, decimals));
            let avg_memory_mb = round_to(acc.memory_sum / acc.samples as f64 / BYTES_PER_MB, decimals);
            let avg_metric = match metric {
                RankMetric::Cpu => avg_cpu?,
                RankMetric::Memory => avg_memory_mb,
            };
            Some(ProcessRankRow {
                entity_id: entity_id.clone(),
                label: labels
                    .get(entity_id)
                    .cloned()
                    .unwrap_or_else(|| entity_id.to_string()),
                process_name: process_name.to_string(),
                avg_metric,
                avg_cpu_percent: avg_cpu,
                avg_memory_mb,
                peak_memory_mb: round_to(acc.memory_peak / BYTES_PER_MB, decimals),
                avg_num_procs: (acc.procs_sum / acc.samples as f64).round() as i64,
            })
        })
        .collect();

    rows.sort_by(compare_rows);
    rows.truncate(limit.min(MAX_RANK_LIMIT));
    rows
}

fn compare_rows(a: &ProcessRankRow, b: &ProcessRankRow) -> Ordering {
    b.avg_metric
        .total_cmp(&a.avg_metric)
        .then_with(|| a.process_name.cmp(&b.process_name))
        .then_with(|| a.entity_id.cmp(&b.entity_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(entity: &str, name: &str, secs: i64, cpu: f64, mem_mb: f64) -> ProcessSample {
        ProcessSample {
            entity_id: EntityId::from(entity),
            timestamp: secs * 1000,
            process_name: name.to_string(),
            cpu_seconds_total: cpu,
            memory_bytes: mem_mb * BYTES_PER_MB,
            num_procs: 1.0,
        }
    }

    #[test]
    fn cpu_rate_uses_one_second_floor() {
        let a = sample("h", "p", 10, 0.0, 1.0);
        let b = sample("h", "p", 10, 0.5, 1.0);
        assert_eq!(cpu_rate(&a, &b), Some(50.0));
    }

    #[test]
    fn cpu_rate_is_capped_for_sub_second_pairs() {
        let a = ProcessSample {
            timestamp: 10_000,
            ..sample("h", "p", 0, 0.0, 1.0)
        };
        let b = ProcessSample {
            timestamp: 10_200,
            ..sample("h", "p", 0, 5.0, 1.0)
        };
        assert_eq!(cpu_rate(&a, &b), Some(100.0));
    }

    #[test]
    fn cpu_rate_rejects_reset() {
        let a = sample("h", "p", 0, 500.0, 1.0);
        let b = sample("h", "p", 60, 100.0, 1.0);
        assert_eq!(cpu_rate(&a, &b), None);
    }

    #[test]
    fn cpu_ranking_drops_single_sample_processes() {
        let samples = vec![
            sample("h", "busy", 0, 0.0, 10.0),
            sample("h", "busy", 60, 30.0, 10.0),
            sample("h", "once", 0, 0.0, 500.0),
        ];
        let rows = rank(
            &samples,
            &HashMap::new(),
            RankMetric::Cpu,
            10,
            &EngineConfig::default(),
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].process_name, "busy");
        assert_eq!(rows[0].avg_metric, 50.0);
        assert_eq!(rows[0].label, "h");
    }

    #[test]
    fn memory_ranking_keeps_processes_without_cpu_delta() {
        let samples = vec![
            sample("h", "busy", 0, 0.0, 10.0),
            sample("h", "busy", 60, 30.0, 30.0),
            sample("h", "once", 0, 0.0, 500.0),
        ];
        let rows = rank(
            &samples,
            &HashMap::new(),
            RankMetric::Memory,
            10,
            &EngineConfig::default(),
        );
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].process_name, "once");
        assert_eq!(rows[0].avg_cpu_percent, None);
        assert_eq!(rows[0].avg_metric, 500.0);
        assert_eq!(rows[1].avg_memory_mb, 20.0);
        assert_eq!(rows[1].peak_memory_mb, 30.0);
        assert_eq!(rows[1].avg_cpu_percent, Some(50.0));
    }

    #[test]
    fn ties_break_on_process_name_then_entity() {
        let samples = vec![
            sample("h2", "b", 0, 0.0, 10.0),
            sample("h1", "b", 0, 0.0, 10.0),
            sample("h1", "a", 0, 0.0, 10.0),
        ];
        let rows = rank(
            &samples,
            &HashMap::new(),
            RankMetric::Memory,
            10,
            &EngineConfig::default(),
        );
        let order: Vec<(&str, &str)> = rows
            .iter()
            .map(|r| (r.process_name.as_str(), r.entity_id.as_str()))
            .collect();
        assert_eq!(order, vec![("a", "h1"), ("b", "h1"), ("b", "h2")]);
    }

    #[test]
    fn limit_is_capped() {
        let samples: Vec<ProcessSample> = (0..80)
            .map(|i| sample("h", &format!("p{i:02}"), 0, 0.0, i as f64))
            .collect();
        let rows = rank(
            &samples,
            &HashMap::new(),
            RankMetric::Memory,
            500,
            &EngineConfig::default(),
        );
        assert_eq!(rows.len(), MAX_RANK_LIMIT);
        assert_eq!(rows[0].process_name, "p79");
    }
}
