// Collaborators consumed by the engine: raw sample store and entity directory.

mod sqlite;

pub use sqlite::SqliteStore;

use std::collections::HashMap;
use std::future::Future;

use crate::error::StoreError;
use crate::models::{EntityId, MetricKind, ProcessSample, RawSample};

/// Read side of the raw sample store.
///
/// Results are ordered by entity id, then timestamp ascending, and cover every sample with
/// `timestamp >= since`. An error means the whole read failed; implementations never
/// return a truncated list.
pub trait SampleStore: Send + Sync + 'static {
    fn fetch(
        &self,
        entity_ids: &[EntityId],
        kind: MetricKind,
        since: i64,
    ) -> impl Future<Output = Result<Vec<RawSample>, StoreError>> + Send;

    fn fetch_process_samples(
        &self,
        entity_ids: &[EntityId],
        since: i64,
    ) -> impl Future<Output = Result<Vec<ProcessSample>, StoreError>> + Send;
}

/// Resolves opaque host ids to display names. Unknown ids are simply absent from the map.
pub trait EntityDirectory: Send + Sync + 'static {
    fn resolve(
        &self,
        ids: &[EntityId],
    ) -> impl Future<Output = Result<HashMap<EntityId, String>, StoreError>> + Send;
}
