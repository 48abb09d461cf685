// Sparse per-entity rate series -> one global, descending, gap-filled grid.
//
// The grid is the union of every timestamp any entity reported for any requested kind, so
// all entities in a response share the same x-axis. Entities that were silent at a grid
// timestamp get a placeholder row carrying only the timestamp.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::EngineError;
use crate::models::{Entity, EntityId, EntityTimeline, MetricName, RatePoint, UnifiedDataPoint};

/// Merges rate points into one aligned timeline per entity, in the order `entities` are given.
///
/// Fails with [`EngineError::ResultTooLarge`] when `entities x grid timestamps` exceeds
/// `max_rows`. Points for entities not listed are ignored.
pub fn merge(
    entities: &[Entity],
    points: impl IntoIterator<Item = RatePoint>,
    max_rows: usize,
) -> Result<Vec<EntityTimeline>, EngineError> {
    let mut grid: BTreeSet<i64> = BTreeSet::new();
    let mut by_entity: HashMap<EntityId, BTreeMap<i64, BTreeMap<MetricName, f64>>> = entities
        .iter()
        .map(|e| (e.id.clone(), BTreeMap::new()))
        .collect();

    for p in points {
        let Some(rows) = by_entity.get_mut(&p.entity_id) else {
            continue;
        };
        grid.insert(p.timestamp);
        rows.entry(p.timestamp)
            .or_default()
            .insert(p.metric, p.value);
    }

    let rows = entities.len().saturating_mul(grid.len());
    if rows > max_rows {
        tracing::warn!(
            entities = entities.len(),
            timestamps = grid.len(),
            rows,
            max_rows,
            "timeline exceeds row ceiling"
        );
        return Err(EngineError::ResultTooLarge {
            rows,
            limit: max_rows,
        });
    }

    let timelines = entities
        .iter()
        .map(|entity| {
            let mut recorded = by_entity.remove(&entity.id).unwrap_or_default();
            let data_points = grid
                .iter()
                .rev()
                .map(|&ts| match recorded.remove(&ts) {
                    Some(values) => UnifiedDataPoint {
                        timestamp: ts,
                        values,
                    },
                    None => UnifiedDataPoint::placeholder(ts),
                })
                .collect();
            EntityTimeline {
                entity_id: entity.id.clone(),
                display_name: entity.display_name.clone(),
                data_points,
            }
        })
        .collect();
    Ok(timelines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entity(id: &str) -> Entity {
        Entity {
            id: EntityId::from(id),
            display_name: id.to_uppercase(),
        }
    }

    fn point(entity: &str, ts: i64, metric: MetricName, value: f64) -> RatePoint {
        RatePoint {
            entity_id: EntityId::from(entity),
            timestamp: ts,
            metric,
            value,
        }
    }

    #[test]
    fn grid_is_global_and_descending() {
        let entities = vec![entity("a"), entity("b")];
        let points = vec![
            point("a", 60_000, MetricName::CpuPercent, 10.0),
            point("a", 120_000, MetricName::CpuPercent, 20.0),
            point("b", 180_000, MetricName::CpuPercent, 30.0),
        ];
        let out = merge(&entities, points, 100).unwrap();
        assert_eq!(out.len(), 2);
        for timeline in &out {
            let ts: Vec<i64> = timeline.data_points.iter().map(|p| p.timestamp).collect();
            assert_eq!(ts, vec![180_000, 120_000, 60_000]);
        }
        assert!(out[0].data_points[0].is_placeholder());
        assert_eq!(out[0].data_points[1].get(MetricName::CpuPercent), Some(20.0));
        assert_eq!(out[1].data_points[0].get(MetricName::CpuPercent), Some(30.0));
        assert!(out[1].data_points[1].is_placeholder());
        assert!(out[1].data_points[2].is_placeholder());
    }

    #[test]
    fn metrics_of_different_kinds_share_a_row() {
        let entities = vec![entity("a")];
        let points = vec![
            point("a", 60_000, MetricName::CpuPercent, 10.0),
            point("a", 60_000, MetricName::NetworkRxMbps, 1.5),
            point("a", 60_000, MetricName::NetworkTxMbps, 0.5),
        ];
        let out = merge(&entities, points, 100).unwrap();
        let row = &out[0].data_points[0];
        assert_eq!(row.values.len(), 3);
        assert_eq!(row.get(MetricName::NetworkRxMbps), Some(1.5));
    }

    #[test]
    fn entity_without_points_gets_full_placeholder_column() {
        let entities = vec![entity("a"), entity("silent")];
        let points = vec![
            point("a", 60_000, MetricName::CpuPercent, 10.0),
            point("a", 120_000, MetricName::CpuPercent, 11.0),
        ];
        let out = merge(&entities, points, 100).unwrap();
        assert_eq!(out[1].display_name, "SILENT");
        assert_eq!(out[1].data_points.len(), 2);
        assert!(out[1].data_points.iter().all(UnifiedDataPoint::is_placeholder));
    }

    #[test]
    fn placeholder_serializes_as_timestamp_only() {
        let json = serde_json::to_string(&UnifiedDataPoint::placeholder(42)).unwrap();
        assert_eq!(json, r#"{"timestamp":42}"#);
    }

    #[test]
    fn row_ceiling_is_enforced() {
        let entities = vec![entity("a"), entity("b")];
        let points = vec![
            point("a", 60_000, MetricName::CpuPercent, 10.0),
            point("b", 120_000, MetricName::CpuPercent, 10.0),
        ];
        let err = merge(&entities, points, 3).unwrap_err();
        assert!(matches!(err, EngineError::ResultTooLarge { rows: 4, limit: 3 }));
    }

    #[test]
    fn points_for_unknown_entities_are_ignored() {
        let entities = vec![entity("a")];
        let points = vec![point("zzz", 60_000, MetricName::CpuPercent, 10.0)];
        let out = merge(&entities, points, 100).unwrap();
        assert!(out[0].data_points.is_empty());
    }
}
