use std::time::Duration;

/// Connection settings for the SQLite-backed ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// sqlx connection string, e.g. `sqlite:ledger.db`
    pub database_url: String,
    pub max_connections: u32,
    /// How long a writer waits for the database lock before failing
    pub busy_timeout: Duration,
    pub create_if_missing: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:ledger.db".to_string(),
            max_connections: 5,
            busy_timeout: Duration::from_secs(5),
            create_if_missing: true,
        }
    }
}

impl StoreConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            ..Self::default()
        }
    }

    /// Config for a database file on disk, created if missing.
    pub fn for_path(path: &str) -> Self {
        Self::new(format!("sqlite:{}", path))
    }

    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections.max(1);
        self
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn with_create_if_missing(mut self, create_if_missing: bool) -> Self {
        self.create_if_missing = create_if_missing;
        self
    }
}
