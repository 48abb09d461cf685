// Query orchestration: validate, resolve entities, fan out one fetch+rate pipeline per
// metric kind, join, then merge into the aligned timeline (or rank processes).

pub mod ranking;
pub mod rate;
pub mod timeline;

use serde::Deserialize;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::models::{
    Entity, EntityId, MetricKind, RankMetric, RankingResponse, TimeRange, TimelineResponse,
};
use crate::store::{EntityDirectory, SampleStore};

pub use ranking::MAX_RANK_LIMIT;
pub use rate::RateCalculator;

/// Longest window a query may cover (one week).
pub const MAX_HOURS: u32 = 168;

const MS_PER_HOUR: i64 = 3_600_000;

/// Timeline request as received from callers. Validated by the engine before any store access.
#[derive(Debug, Clone, Deserialize)]
pub struct TimelineQuery {
    pub entity_ids: Vec<String>,
    pub hours: i64,
    /// Subset of cpu, memory, disk, network. Empty means all four.
    #[serde(default)]
    pub metric_kinds: Vec<String>,
}

/// Top-K process request.
#[derive(Debug, Clone, Deserialize)]
pub struct RankingQuery {
    pub entity_ids: Vec<String>,
    pub metric: String,
    pub limit: i64,
    pub hours: i64,
}

fn validate_hours(hours: i64) -> Result<u32, EngineError> {
    if !(1..=i64::from(MAX_HOURS)).contains(&hours) {
        return Err(EngineError::Validation(format!(
            "hours must be between 1 and {MAX_HOURS}, got {hours}"
        )));
    }
    Ok(hours as u32)
}

/// Trims ids and drops duplicates, keeping first-seen order. Blank ids are rejected.
fn validate_entity_ids(ids: &[String]) -> Result<Vec<EntityId>, EngineError> {
    let mut seen = HashSet::with_capacity(ids.len());
    let mut out = Vec::with_capacity(ids.len());
    for raw in ids {
        let id = raw.trim();
        if id.is_empty() {
            return Err(EngineError::Validation(
                "entity_ids must not contain blank ids".into(),
            ));
        }
        if seen.insert(id) {
            out.push(EntityId::new(id));
        }
    }
    Ok(out)
}

#[derive(Debug)]
struct ValidTimeline {
    entity_ids: Vec<EntityId>,
    hours: u32,
    kinds: Vec<MetricKind>,
}

impl TimelineQuery {
    fn validate(&self) -> Result<ValidTimeline, EngineError> {
        let hours = validate_hours(self.hours)?;
        let kinds: BTreeSet<MetricKind> = self
            .metric_kinds
            .iter()
            .map(|k| k.parse::<MetricKind>())
            .collect::<Result<_, _>>()
            .map_err(EngineError::Validation)?;
        let kinds = if kinds.is_empty() {
            MetricKind::ALL.to_vec()
        } else {
            kinds.into_iter().collect()
        };
        Ok(ValidTimeline {
            entity_ids: validate_entity_ids(&self.entity_ids)?,
            hours,
            kinds,
        })
    }
}

#[derive(Debug)]
struct ValidRanking {
    entity_ids: Vec<EntityId>,
    metric: RankMetric,
    limit: usize,
    hours: u32,
}

impl RankingQuery {
    fn validate(&self) -> Result<ValidRanking, EngineError> {
        let metric = self
            .metric
            .parse::<RankMetric>()
            .map_err(EngineError::Validation)?;
        if !(1..=MAX_RANK_LIMIT as i64).contains(&self.limit) {
            return Err(EngineError::Validation(format!(
                "limit must be between 1 and {MAX_RANK_LIMIT}, got {}",
                self.limit
            )));
        }
        Ok(ValidRanking {
            entity_ids: validate_entity_ids(&self.entity_ids)?,
            metric,
            limit: self.limit as usize,
            hours: validate_hours(self.hours)?,
        })
    }
}

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Entry point for timeline and ranking queries. Holds no per-query state; concurrent
/// queries share only the immutable configuration and the collaborators.
pub struct QueryEngine<S, D> {
    store: Arc<S>,
    directory: Arc<D>,
    config: EngineConfig,
}

impl<S: SampleStore, D: EntityDirectory> QueryEngine<S, D> {
    pub fn new(store: Arc<S>, directory: Arc<D>, config: EngineConfig) -> Self {
        Self {
            store,
            directory,
            config,
        }
    }

    /// Timeline for the window ending now.
    pub async fn timeline(
        &self,
        query: &TimelineQuery,
        cancel: &CancellationToken,
    ) -> Result<TimelineResponse, EngineError> {
        self.timeline_at(query, now_ms(), cancel).await
    }

    /// Timeline for the window of `query.hours` ending at `end_ms`. Samples stamped after
    /// `end_ms` are ignored, so a historical window always yields the same result.
    #[instrument(skip(self, query, cancel), fields(operation = "timeline", hours = query.hours, entities_count = query.entity_ids.len()))]
    pub async fn timeline_at(
        &self,
        query: &TimelineQuery,
        end_ms: i64,
        cancel: &CancellationToken,
    ) -> Result<TimelineResponse, EngineError> {
        let valid = query.validate()?;
        let time_range = TimeRange {
            start: end_ms - i64::from(valid.hours) * MS_PER_HOUR,
            end: end_ms,
            hours: valid.hours,
        };
        if valid.entity_ids.is_empty() {
            return Ok(TimelineResponse {
                metrics: Vec::new(),
                time_range,
            });
        }

        let metrics = self
            .guarded(cancel, async {
                let entities = self.resolve_entities(&valid.entity_ids).await?;
                let ids: Arc<[EntityId]> = Arc::from(valid.entity_ids.as_slice());

                let mut pipelines = JoinSet::new();
                for kind in valid.kinds.iter().copied() {
                    let store = Arc::clone(&self.store);
                    let ids = Arc::clone(&ids);
                    let config = self.config.clone();
                    let TimeRange { start, end, .. } = time_range;
                    pipelines.spawn(async move {
                        let mut samples = store
                            .fetch(&ids, kind, start)
                            .await
                            .map_err(EngineError::StoreUnavailable)?;
                        samples.retain(|s| s.timestamp <= end);
                        let points = RateCalculator::new(&config).compute(&samples, kind);
                        tracing::debug!(
                            kind = %kind,
                            samples = samples.len(),
                            points = points.len(),
                            "rate pipeline finished"
                        );
                        Ok::<_, EngineError>(points)
                    });
                }

                // Returning early drops the set, which aborts the remaining pipelines.
                let mut points = Vec::new();
                while let Some(joined) = pipelines.join_next().await {
                    let series = joined
                        .map_err(|e| EngineError::Internal(format!("rate pipeline failed: {e}")))??;
                    points.extend(series);
                }

                timeline::merge(&entities, points, self.config.max_timeline_rows)
            })
            .await?;

        tracing::info!(
            entities = metrics.len(),
            timestamps = metrics.first().map_or(0, |m| m.data_points.len()),
            "timeline computed"
        );
        Ok(TimelineResponse {
            metrics,
            time_range,
        })
    }

    /// Top processes for the window ending now.
    pub async fn top_processes(
        &self,
        query: &RankingQuery,
        cancel: &CancellationToken,
    ) -> Result<RankingResponse, EngineError> {
        self.top_processes_at(query, now_ms(), cancel).await
    }

    #[instrument(skip(self, query, cancel), fields(operation = "top_processes", metric = %query.metric, limit = query.limit, hours = query.hours))]
    pub async fn top_processes_at(
        &self,
        query: &RankingQuery,
        end_ms: i64,
        cancel: &CancellationToken,
    ) -> Result<RankingResponse, EngineError> {
        let valid = query.validate()?;
        if valid.entity_ids.is_empty() {
            return Ok(RankingResponse {
                metric: valid.metric,
                time_range_hours: valid.hours,
                processes: Vec::new(),
            });
        }
        let since = end_ms - i64::from(valid.hours) * MS_PER_HOUR;

        let processes = self
            .guarded(cancel, async {
                let (labels, samples) = tokio::try_join!(
                    async {
                        self.directory
                            .resolve(&valid.entity_ids)
                            .await
                            .map_err(EngineError::DirectoryUnavailable)
                    },
                    async {
                        let mut samples = self
                            .store
                            .fetch_process_samples(&valid.entity_ids, since)
                            .await
                            .map_err(EngineError::StoreUnavailable)?;
                        samples.retain(|s| s.timestamp <= end_ms);
                        Ok::<_, EngineError>(samples)
                    },
                )?;
                Ok(ranking::rank(
                    &samples,
                    &labels,
                    valid.metric,
                    valid.limit,
                    &self.config,
                ))
            })
            .await?;

        tracing::info!(rows = processes.len(), "process ranking computed");
        Ok(RankingResponse {
            metric: valid.metric,
            time_range_hours: valid.hours,
            processes,
        })
    }

    /// Display names for `ids`, in the same order; unknown ids keep the id as their name.
    async fn resolve_entities(&self, ids: &[EntityId]) -> Result<Vec<Entity>, EngineError> {
        let mut names: HashMap<EntityId, String> = self
            .directory
            .resolve(ids)
            .await
            .map_err(EngineError::DirectoryUnavailable)?;
        Ok(ids
            .iter()
            .map(|id| Entity {
                display_name: names.remove(id).unwrap_or_else(|| id.to_string()),
                id: id.clone(),
            })
            .collect())
    }

    /// Runs `work` under the caller's cancellation token and the configured deadline.
    /// Whichever fires first drops `work` and everything it spawned.
    async fn guarded<T>(
        &self,
        cancel: &CancellationToken,
        work: impl Future<Output = Result<T, EngineError>>,
    ) -> Result<T, EngineError> {
        let deadline = Duration::from_secs(self.config.query_timeout_secs);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            r = tokio::time::timeout(deadline, work) => r.unwrap_or(Err(EngineError::DeadlineExceeded)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timeline_query(hours: i64, kinds: &[&str]) -> TimelineQuery {
        TimelineQuery {
            entity_ids: vec!["h1".into()],
            hours,
            metric_kinds: kinds.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[test]
    fn hours_bounds() {
        assert!(timeline_query(0, &[]).validate().is_err());
        assert!(timeline_query(1, &[]).validate().is_ok());
        assert!(timeline_query(168, &[]).validate().is_ok());
        assert!(timeline_query(169, &[]).validate().is_err());
    }

    #[test]
    fn empty_kinds_mean_all_and_duplicates_collapse() {
        let all = timeline_query(1, &[]).validate().unwrap();
        assert_eq!(all.kinds, MetricKind::ALL.to_vec());
        let some = timeline_query(1, &["network", "cpu", "CPU"]).validate().unwrap();
        assert_eq!(some.kinds, vec![MetricKind::Cpu, MetricKind::Network]);
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = timeline_query(1, &["gpu"]).validate().unwrap_err();
        assert!(err.to_string().contains("gpu"));
    }

    #[test]
    fn entity_ids_are_trimmed_and_deduplicated() {
        let ids = validate_entity_ids(&[" a ".into(), "b".into(), "a".into()]).unwrap();
        assert_eq!(ids, vec![EntityId::from("a"), EntityId::from("b")]);
        assert!(validate_entity_ids(&["  ".into()]).is_err());
    }

    #[test]
    fn ranking_limit_and_metric_bounds() {
        let q = |metric: &str, limit| RankingQuery {
            entity_ids: vec![],
            metric: metric.into(),
            limit,
            hours: 24,
        };
        assert!(q("cpu", 0).validate().is_err());
        assert!(q("cpu", 1).validate().is_ok());
        assert!(q("memory", 50).validate().is_ok());
        assert!(q("memory", 51).validate().is_err());
        assert!(q("disk", 10).validate().is_err());
    }
}
