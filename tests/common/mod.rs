// Shared test helpers: in-memory collaborators and sample builders

#![allow(dead_code)]

use fleetrate::config::EngineConfig;
use fleetrate::engine::QueryEngine;
use fleetrate::error::StoreError;
use fleetrate::models::*;
use fleetrate::store::{EntityDirectory, SampleStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Minute-aligned base instant (epoch ms).
pub const T0: i64 = 1_699_999_200_000;
/// Query end one hour after `T0`.
pub const END: i64 = T0 + 3_600_000;

pub fn at(minute: i64, offset_secs: i64) -> i64 {
    T0 + minute * 60_000 + offset_secs * 1000
}

pub fn cpu(entity: &str, ts: i64, user: f64, cores: f64) -> RawSample {
    RawSample {
        entity_id: EntityId::from(entity),
        timestamp: ts,
        fields: SampleFields::Cpu(CpuFields {
            user_seconds: user,
            cores,
            ..Default::default()
        }),
    }
}

pub fn memory(entity: &str, ts: i64, total: f64, available: f64) -> RawSample {
    RawSample {
        entity_id: EntityId::from(entity),
        timestamp: ts,
        fields: SampleFields::Memory(MemoryFields {
            total_bytes: total,
            available_bytes: available,
        }),
    }
}

pub fn disk(entity: &str, ts: i64, total: f64, available: f64) -> RawSample {
    RawSample {
        entity_id: EntityId::from(entity),
        timestamp: ts,
        fields: SampleFields::Disk(DiskFields {
            total_bytes: total,
            available_bytes: available,
        }),
    }
}

pub fn network(entity: &str, ts: i64, rx: f64, tx: f64) -> RawSample {
    RawSample {
        entity_id: EntityId::from(entity),
        timestamp: ts,
        fields: SampleFields::Network(NetworkFields {
            rx_bytes: rx,
            tx_bytes: tx,
        }),
    }
}

pub fn process(entity: &str, name: &str, ts: i64, cpu_secs: f64, mem_mb: f64) -> ProcessSample {
    ProcessSample {
        entity_id: EntityId::from(entity),
        timestamp: ts,
        process_name: name.to_string(),
        cpu_seconds_total: cpu_secs,
        memory_bytes: mem_mb * 1024.0 * 1024.0,
        num_procs: 2.0,
    }
}

/// In-memory sample store + directory with failure and latency injection.
#[derive(Default)]
pub struct MemoryStore {
    pub samples: Vec<RawSample>,
    pub process_samples: Vec<ProcessSample>,
    pub names: HashMap<EntityId, String>,
    pub fail_kind: Option<MetricKind>,
    pub fail_directory: bool,
    pub delay: Option<Duration>,
    pub fetches: AtomicUsize,
    /// Fetches that ran past the injected delay; aborted fetches never get here.
    pub completed: AtomicUsize,
}

impl MemoryStore {
    pub fn with_samples(samples: Vec<RawSample>) -> Self {
        Self {
            samples,
            ..Default::default()
        }
    }

    pub fn named(mut self, id: &str, name: &str) -> Self {
        self.names.insert(EntityId::from(id), name.to_string());
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl SampleStore for MemoryStore {
    async fn fetch(
        &self,
        entity_ids: &[EntityId],
        kind: MetricKind,
        since: i64,
    ) -> Result<Vec<RawSample>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        if self.fail_kind == Some(kind) {
            return Err(StoreError::Unavailable(format!("{kind} backend down")));
        }
        let mut out: Vec<RawSample> = self
            .samples
            .iter()
            .filter(|s| {
                s.metric_kind() == kind && s.timestamp >= since && entity_ids.contains(&s.entity_id)
            })
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.entity_id
                .cmp(&b.entity_id)
                .then(a.timestamp.cmp(&b.timestamp))
        });
        Ok(out)
    }

    async fn fetch_process_samples(
        &self,
        entity_ids: &[EntityId],
        since: i64,
    ) -> Result<Vec<ProcessSample>, StoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        if self.fail_kind.is_some() {
            return Err(StoreError::Unavailable("process backend down".into()));
        }
        let mut out: Vec<ProcessSample> = self
            .process_samples
            .iter()
            .filter(|s| s.timestamp >= since && entity_ids.contains(&s.entity_id))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.entity_id
                .cmp(&b.entity_id)
                .then(a.timestamp.cmp(&b.timestamp))
        });
        Ok(out)
    }
}

impl EntityDirectory for MemoryStore {
    async fn resolve(&self, ids: &[EntityId]) -> Result<HashMap<EntityId, String>, StoreError> {
        if self.fail_directory {
            return Err(StoreError::Unavailable("directory down".into()));
        }
        Ok(ids
            .iter()
            .filter_map(|id| self.names.get(id).map(|n| (id.clone(), n.clone())))
            .collect())
    }
}

pub fn query_engine(store: MemoryStore) -> (Arc<MemoryStore>, QueryEngine<MemoryStore, MemoryStore>) {
    query_engine_with_config(store, EngineConfig::default())
}

pub fn query_engine_with_config(
    store: MemoryStore,
    config: EngineConfig,
) -> (Arc<MemoryStore>, QueryEngine<MemoryStore, MemoryStore>) {
    let store = Arc::new(store);
    let engine = QueryEngine::new(store.clone(), store.clone(), config);
    (store, engine)
}
