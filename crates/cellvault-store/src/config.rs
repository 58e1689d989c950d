use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Default location of the backing database
pub const DEFAULT_DATABASE_PATH: &str = "cellvault.sqlite3";
/// Busy timeout used for store connections
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Store configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// SQLite database file
    pub database_path: PathBuf,
    /// How long a connection waits on a locked database before failing
    pub busy_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from(DEFAULT_DATABASE_PATH),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

impl StoreConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let database_path = env::var("CELLVAULT_DATABASE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DATABASE_PATH));
        let busy_timeout = match env::var("CELLVAULT_BUSY_TIMEOUT_MS") {
            Ok(ms) => Duration::from_millis(ms.parse()?),
            Err(_) => DEFAULT_BUSY_TIMEOUT,
        };

        Ok(Self {
            database_path,
            busy_timeout,
        })
    }
}
