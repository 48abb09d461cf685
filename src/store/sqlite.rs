// SQLite-backed sample store and entity directory.
// One table per metric kind; every table is keyed by (entity_id, ts) with ts in epoch ms.
// Write helpers exist only to seed the store; the engine itself never writes.

use futures_util::TryStreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

use super::{EntityDirectory, SampleStore};
use crate::error::StoreError;
use crate::models::{
    CpuFields, DiskFields, EntityId, MemoryFields, MetricKind, NetworkFields, ProcessSample,
    RawSample, SampleFields,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

fn table_for(kind: MetricKind) -> &'static str {
    match kind {
        MetricKind::Cpu => "cpu_samples",
        MetricKind::Memory => "memory_samples",
        MetricKind::Disk => "disk_samples",
        MetricKind::Network => "network_samples",
    }
}

fn columns_for(kind: MetricKind) -> &'static str {
    match kind {
        MetricKind::Cpu => "user_seconds, system_seconds, iowait_seconds, steal_seconds, cores",
        MetricKind::Memory | MetricKind::Disk => "total_bytes, available_bytes",
        MetricKind::Network => "rx_bytes, tx_bytes",
    }
}

impl SqliteStore {
    pub async fn connect(path: &str, max_pool_size: u32) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS entities (id TEXT PRIMARY KEY, display_name TEXT NOT NULL)",
        )
        .execute(&self.pool)
        .await?;

        for kind in MetricKind::ALL {
            let table = table_for(kind);
            let columns = columns_for(kind)
                .split(", ")
                .map(|c| format!("{c} REAL NOT NULL"))
                .collect::<Vec<_>>()
                .join(", ");
            sqlx::query(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    entity_id TEXT NOT NULL,
                    ts INTEGER NOT NULL,
                    {columns}
                )"
            ))
            .execute(&self.pool)
            .await?;
            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_entity_ts ON {table}(entity_id, ts)"
            ))
            .execute(&self.pool)
            .await?;
        }

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS process_samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_id TEXT NOT NULL,
                ts INTEGER NOT NULL,
                process_name TEXT NOT NULL,
                cpu_seconds_total REAL NOT NULL,
                memory_bytes REAL NOT NULL,
                num_procs REAL NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_process_samples_entity_ts ON process_samples(entity_id, ts)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self, entities), fields(repo = "directory", operation = "upsert_entities", entities_count = entities.len()))]
    pub async fn upsert_entities(&self, entities: &[(EntityId, String)]) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        for (id, name) in entities {
            sqlx::query("INSERT OR REPLACE INTO entities (id, display_name) VALUES ($1, $2)")
                .bind(id.as_str())
                .bind(name)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, samples), fields(repo = "samples", operation = "save_samples", samples_count = samples.len()))]
    pub async fn save_samples(&self, samples: &[RawSample]) -> anyhow::Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for s in samples {
            let entity_id = s.entity_id.as_str();
            match s.fields {
                SampleFields::Cpu(f) => {
                    sqlx::query(
                        "INSERT INTO cpu_samples (entity_id, ts, user_seconds, system_seconds, iowait_seconds, steal_seconds, cores) VALUES ($1, $2, $3, $4, $5, $6, $7)",
                    )
                    .bind(entity_id)
                    .bind(s.timestamp)
                    .bind(f.user_seconds)
                    .bind(f.system_seconds)
                    .bind(f.iowait_seconds)
                    .bind(f.steal_seconds)
                    .bind(f.cores)
                    .execute(&mut *tx)
                    .await?;
                }
                SampleFields::Memory(MemoryFields {
                    total_bytes,
                    available_bytes,
                })
                | SampleFields::Disk(DiskFields {
                    total_bytes,
                    available_bytes,
                }) => {
                    let table = table_for(s.metric_kind());
                    sqlx::query(&format!(
                        "INSERT INTO {table} (entity_id, ts, total_bytes, available_bytes) VALUES ($1, $2, $3, $4)"
                    ))
                    .bind(entity_id)
                    .bind(s.timestamp)
                    .bind(total_bytes)
                    .bind(available_bytes)
                    .execute(&mut *tx)
                    .await?;
                }
                SampleFields::Network(f) => {
                    sqlx::query(
                        "INSERT INTO network_samples (entity_id, ts, rx_bytes, tx_bytes) VALUES ($1, $2, $3, $4)",
                    )
                    .bind(entity_id)
                    .bind(s.timestamp)
                    .bind(f.rx_bytes)
                    .bind(f.tx_bytes)
                    .execute(&mut *tx)
                    .await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, samples), fields(repo = "samples", operation = "save_process_samples", samples_count = samples.len()))]
    pub async fn save_process_samples(&self, samples: &[ProcessSample]) -> anyhow::Result<()> {
        if samples.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for s in samples {
            sqlx::query(
                "INSERT INTO process_samples (entity_id, ts, process_name, cpu_seconds_total, memory_bytes, num_procs) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(s.entity_id.as_str())
            .bind(s.timestamp)
            .bind(&s.process_name)
            .bind(s.cpu_seconds_total)
            .bind(s.memory_bytes)
            .bind(s.num_procs)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Closes the pool; subsequent reads fail with `StoreError::Database`.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn parse_sample_row(kind: MetricKind, row: &SqliteRow) -> Result<RawSample, sqlx::Error> {
        let entity_id: String = row.try_get("entity_id")?;
        let timestamp: i64 = row.try_get("ts")?;
        let fields = match kind {
            MetricKind::Cpu => SampleFields::Cpu(CpuFields {
                user_seconds: row.try_get("user_seconds")?,
                system_seconds: row.try_get("system_seconds")?,
                iowait_seconds: row.try_get("iowait_seconds")?,
                steal_seconds: row.try_get("steal_seconds")?,
                cores: row.try_get("cores")?,
            }),
            MetricKind::Memory => SampleFields::Memory(MemoryFields {
                total_bytes: row.try_get("total_bytes")?,
                available_bytes: row.try_get("available_bytes")?,
            }),
            MetricKind::Disk => SampleFields::Disk(DiskFields {
                total_bytes: row.try_get("total_bytes")?,
                available_bytes: row.try_get("available_bytes")?,
            }),
            MetricKind::Network => SampleFields::Network(NetworkFields {
                rx_bytes: row.try_get("rx_bytes")?,
                tx_bytes: row.try_get("tx_bytes")?,
            }),
        };
        Ok(RawSample {
            entity_id: EntityId(entity_id),
            timestamp,
            fields,
        })
    }

    fn parse_process_row(row: &SqliteRow) -> Result<ProcessSample, sqlx::Error> {
        let entity_id: String = row.try_get("entity_id")?;
        Ok(ProcessSample {
            entity_id: EntityId(entity_id),
            timestamp: row.try_get("ts")?,
            process_name: row.try_get("process_name")?,
            cpu_seconds_total: row.try_get("cpu_seconds_total")?,
            memory_bytes: row.try_get("memory_bytes")?,
            num_procs: row.try_get("num_procs")?,
        })
    }
}

/// Appends `IN (...)` with one bound parameter per id.
fn push_id_list<'a>(qb: &mut QueryBuilder<'a, Sqlite>, ids: &'a [EntityId]) {
    qb.push(" IN (");
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(id.as_str());
    }
    separated.push_unseparated(")");
}

impl SampleStore for SqliteStore {
    #[instrument(skip(self, entity_ids), fields(repo = "samples", operation = "fetch", kind = %kind, entities_count = entity_ids.len()))]
    async fn fetch(
        &self,
        entity_ids: &[EntityId],
        kind: MetricKind,
        since: i64,
    ) -> Result<Vec<RawSample>, StoreError> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(format!(
            "SELECT entity_id, ts, {} FROM {} WHERE ts >= ",
            columns_for(kind),
            table_for(kind)
        ));
        qb.push_bind(since);
        qb.push(" AND entity_id");
        push_id_list(&mut qb, entity_ids);
        qb.push(" ORDER BY entity_id ASC, ts ASC, id ASC");

        let mut out = Vec::new();
        let mut rows = qb.build().fetch(&self.pool);
        while let Some(row) = rows.try_next().await? {
            out.push(Self::parse_sample_row(kind, &row)?);
        }
        tracing::debug!(rows = out.len(), "samples fetched");
        Ok(out)
    }

    #[instrument(skip(self, entity_ids), fields(repo = "samples", operation = "fetch_process_samples", entities_count = entity_ids.len()))]
    async fn fetch_process_samples(
        &self,
        entity_ids: &[EntityId],
        since: i64,
    ) -> Result<Vec<ProcessSample>, StoreError> {
        if entity_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT entity_id, ts, process_name, cpu_seconds_total, memory_bytes, num_procs FROM process_samples WHERE ts >= ",
        );
        qb.push_bind(since);
        qb.push(" AND entity_id");
        push_id_list(&mut qb, entity_ids);
        qb.push(" ORDER BY entity_id ASC, ts ASC, id ASC");

        let mut out = Vec::new();
        let mut rows = qb.build().fetch(&self.pool);
        while let Some(row) = rows.try_next().await? {
            out.push(Self::parse_process_row(&row)?);
        }
        tracing::debug!(rows = out.len(), "process samples fetched");
        Ok(out)
    }
}

impl EntityDirectory for SqliteStore {
    #[instrument(skip(self, ids), fields(repo = "directory", operation = "resolve", entities_count = ids.len()))]
    async fn resolve(&self, ids: &[EntityId]) -> Result<HashMap<EntityId, String>, StoreError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT id, display_name FROM entities WHERE id");
        push_id_list(&mut qb, ids);
        let rows = qb.build().fetch_all(&self.pool).await?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let name: String = row.try_get("display_name")?;
            out.insert(EntityId(id), name);
        }
        Ok(out)
    }
}
