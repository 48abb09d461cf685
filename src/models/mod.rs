// Domain models: raw samples in, rate series / timelines / rankings out

mod entity;
mod process;
mod sample;
mod timeline;

pub use entity::{Entity, EntityId};
pub use process::{ProcessRankRow, ProcessSample, RankMetric, RankingResponse};
pub use sample::{
    Bucket, CpuFields, DiskFields, MetricKind, MemoryFields, NetworkFields, RawSample,
    SampleFields,
};
pub use timeline::{
    EntityTimeline, MetricName, RatePoint, TimeRange, TimelineResponse, UnifiedDataPoint,
};
