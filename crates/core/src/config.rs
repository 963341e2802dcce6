//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum accepted request body for a single chunk upload, in bytes.
    #[serde(default = "default_max_chunk_body_bytes")]
    pub max_chunk_body_bytes: u64,
    /// Trace every HTTP request (default: true).
    #[serde(default = "default_enable_tracing")]
    pub enable_tracing: bool,
    /// Enable the /metrics endpoint for Prometheus scraping (default: true).
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_chunk_body_bytes() -> u64 {
    64 * 1024 * 1024 // 64 MiB
}

fn default_enable_tracing() -> bool {
    true
}

fn default_metrics_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_chunk_body_bytes: default_max_chunk_body_bytes(),
            enable_tracing: default_enable_tracing(),
            metrics_enabled: default_metrics_enabled(),
        }
    }
}

/// Storage backend configuration.
///
/// Used for both the temp disk (chunk files) and the destination disk
/// (merged files).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageConfig {
    /// Local filesystem storage.
    Filesystem {
        /// Root directory for storage.
        path: PathBuf,
    },
}

impl StorageConfig {
    /// Default temp disk holding chunk files.
    pub fn default_temp() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/temp"),
        }
    }

    /// Validate storage configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            StorageConfig::Filesystem { path } if path.as_os_str().is_empty() => {
                Err("filesystem storage requires a non-empty 'path'".to_string())
            }
            StorageConfig::Filesystem { .. } => Ok(()),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::Filesystem {
            path: PathBuf::from("./data/storage"),
        }
    }
}

fn default_temp_storage() -> StorageConfig {
    StorageConfig::default_temp()
}

/// PostgreSQL SSL mode configuration.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PgSslMode {
    /// Disable SSL/TLS entirely.
    Disable,
    /// Prefer SSL/TLS but allow unencrypted connections (default).
    #[default]
    Prefer,
    /// Require SSL/TLS for all connections.
    Require,
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MetadataConfig {
    /// SQLite database (single writer, suited to small deployments and tests).
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// How long a writer waits for the database lock, in seconds.
        #[serde(default = "default_sqlite_busy_timeout_secs")]
        busy_timeout_secs: u64,
    },
    /// PostgreSQL database.
    Postgres {
        /// Connection URL. Takes precedence over individual fields.
        url: Option<String>,
        /// Database host.
        host: Option<String>,
        /// Database port (default: 5432).
        #[serde(default = "default_pg_port")]
        port: Option<u16>,
        /// Database username.
        username: Option<String>,
        /// Database password.
        /// WARNING: Prefer MOSAIC_METADATA__PASSWORD over storing it in config.
        password: Option<String>,
        /// Database name.
        database: Option<String>,
        /// SSL mode for connections.
        ssl_mode: Option<PgSslMode>,
        /// Maximum connections in the pool.
        #[serde(default = "default_max_connections")]
        max_connections: u32,
        /// Statement timeout in milliseconds.
        #[serde(default = "default_statement_timeout_ms")]
        statement_timeout_ms: Option<u64>,
    },
}

fn default_max_connections() -> u32 {
    10
}

fn default_pg_port() -> Option<u16> {
    Some(5432)
}

fn default_statement_timeout_ms() -> Option<u64> {
    Some(60_000)
}

fn default_sqlite_busy_timeout_secs() -> u64 {
    30
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/metadata.db"),
            busy_timeout_secs: default_sqlite_busy_timeout_secs(),
        }
    }
}

impl MetadataConfig {
    /// Validate metadata configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            MetadataConfig::Sqlite { .. } => Ok(()),
            MetadataConfig::Postgres {
                url,
                host,
                database,
                ..
            } => match (url.as_ref(), host.as_ref(), database.as_ref()) {
                (Some(_), _, _) => Ok(()),
                (None, Some(_), Some(_)) => Ok(()),
                (None, None, _) => Err(
                    "postgres config requires either 'url' or 'host' + 'database'".to_string(),
                ),
                (None, Some(_), None) => Err(
                    "postgres config requires 'database' when using individual fields".to_string(),
                ),
            },
        }
    }
}

/// Upload pipeline configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Highest accepted chunk sequence number.
    #[serde(default = "default_max_chunk_number")]
    pub max_chunk_number: u32,
    /// Lease after which a merge claim counts as abandoned, in seconds.
    /// Unset disables the stuck-merge reaper.
    #[serde(default)]
    pub merge_lease_secs: Option<u64>,
    /// How often the reaper scans for abandoned claims, in seconds.
    #[serde(default = "default_reaper_interval_secs")]
    pub reaper_interval_secs: u64,
}

fn default_max_chunk_number() -> u32 {
    crate::DEFAULT_MAX_CHUNK_NUMBER
}

fn default_reaper_interval_secs() -> u64 {
    60
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_chunk_number: default_max_chunk_number(),
            merge_lease_secs: None,
            reaper_interval_secs: default_reaper_interval_secs(),
        }
    }
}

impl UploadConfig {
    /// Merge lease, if the reaper is enabled.
    pub fn merge_lease(&self) -> Option<Duration> {
        self.merge_lease_secs.map(Duration::from_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs.max(1))
    }

    /// Validate upload configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_chunk_number == 0 {
            return Err("uploads.max_chunk_number must be at least 1".to_string());
        }
        if self.merge_lease_secs == Some(0) {
            return Err("uploads.merge_lease_secs must be positive when set".to_string());
        }
        if self.reaper_interval_secs == 0 {
            return Err("uploads.reaper_interval_secs must be positive".to_string());
        }
        Ok(())
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Temp disk holding chunk files.
    #[serde(default = "default_temp_storage")]
    pub temp_storage: StorageConfig,
    /// Destination disk receiving merged files.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Upload pipeline configuration.
    #[serde(default)]
    pub uploads: UploadConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            temp_storage: default_temp_storage(),
            storage: StorageConfig::default(),
            metadata: MetadataConfig::default(),
            uploads: UploadConfig::default(),
        }
    }
}

impl AppConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        self.temp_storage
            .validate()
            .map_err(|e| format!("temp_storage: {e}"))?;
        self.storage
            .validate()
            .map_err(|e| format!("storage: {e}"))?;
        self.metadata.validate()?;
        self.uploads.validate()
    }

    /// Create a test configuration rooted in `dir`.
    ///
    /// **For testing only.** Uses filesystem disks and a SQLite database
    /// underneath the given directory.
    pub fn for_testing(dir: &std::path::Path) -> Self {
        Self {
            server: ServerConfig::default(),
            temp_storage: StorageConfig::Filesystem {
                path: dir.join("temp"),
            },
            storage: StorageConfig::Filesystem {
                path: dir.join("storage"),
            },
            metadata: MetadataConfig::Sqlite {
                path: dir.join("metadata.db"),
                busy_timeout_secs: default_sqlite_busy_timeout_secs(),
            },
            uploads: UploadConfig::default(),
        }
    }
}
