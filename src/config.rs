use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
}

/// Immutable tuning passed into the engine. Every query is a pure function of this,
/// its inputs and the sample store contents.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Width of the aggregation buckets raw samples are reduced into.
    pub bucket_secs: u32,
    /// Shortest bucket gap (seconds) a counter delta is rated over.
    pub min_pair_secs: u32,
    /// Longest bucket gap (seconds) a counter delta is rated over.
    pub max_pair_secs: u32,
    /// Rounding for percentages and memory/disk sizes.
    pub decimals: u32,
    /// Rounding for network throughput (Mbps).
    pub throughput_decimals: u32,
    /// Upper bound on entities x global timestamps in one timeline response.
    pub max_timeline_rows: usize,
    pub query_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bucket_secs: 60,
            min_pair_secs: 30,
            max_pair_secs: 120,
            decimals: 2,
            throughput_decimals: 3,
            max_timeline_rows: 2_000_000,
            query_timeout_secs: 30,
        }
    }
}

impl EngineConfig {
    pub fn bucket_ms(&self) -> i64 {
        i64::from(self.bucket_secs) * 1000
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.bucket_secs > 0,
            "engine.bucket_secs must be > 0, got {}",
            self.bucket_secs
        );
        anyhow::ensure!(
            self.min_pair_secs >= 1,
            "engine.min_pair_secs must be >= 1, got {}",
            self.min_pair_secs
        );
        anyhow::ensure!(
            self.min_pair_secs <= self.max_pair_secs,
            "engine.min_pair_secs ({}) must be <= engine.max_pair_secs ({})",
            self.min_pair_secs,
            self.max_pair_secs
        );
        anyhow::ensure!(
            self.decimals <= 6,
            "engine.decimals must be <= 6, got {}",
            self.decimals
        );
        anyhow::ensure!(
            self.throughput_decimals <= 6,
            "engine.throughput_decimals must be <= 6, got {}",
            self.throughput_decimals
        );
        anyhow::ensure!(
            self.max_timeline_rows > 0,
            "engine.max_timeline_rows must be > 0, got {}",
            self.max_timeline_rows
        );
        anyhow::ensure!(
            self.query_timeout_secs > 0,
            "engine.query_timeout_secs must be > 0, got {}",
            self.query_timeout_secs
        );
        Ok(())
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        self.engine.validate()
    }
}
