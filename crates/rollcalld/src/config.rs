use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Address the HTTP interface listens on.
    pub bind: SocketAddr,
    /// Remote mirror endpoint. `None` disables sync and the catch-up sweep.
    pub mirror_url: Option<String>,
    /// Per-request timeout for mirror pushes.
    pub sync_timeout: Duration,
    /// Capacity of the pending-push queue; pushes beyond it are dropped.
    pub sync_queue_capacity: usize,
    /// Whether to replay yesterday's rows to the mirror at startup and daily.
    pub catchup_enabled: bool,
    /// Delete yesterday's rows once the mirror has accepted them.
    pub purge_after_sync: bool,
    /// How long shutdown waits for queued pushes before abandoning them.
    pub shutdown_grace: Duration,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = std::env::var("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("attendance.db"));

        let bind = std::env::var("ROLLCALL_BIND")
            .ok()
            .and_then(|v| match v.parse() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    tracing::warn!(value = %v, error = %e, "ignoring bad ROLLCALL_BIND");
                    None
                }
            })
            .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 5000)));

        Self {
            db_path,
            bind,
            mirror_url: std::env::var("ROLLCALL_MIRROR_URL")
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            sync_timeout: Duration::from_secs(env_u64("ROLLCALL_SYNC_TIMEOUT_SECS", 10)),
            sync_queue_capacity: env_usize("ROLLCALL_SYNC_QUEUE", 64).max(1),
            catchup_enabled: std::env::var("ROLLCALL_CATCHUP_ENABLED")
                .map(|v| v != "0")
                .unwrap_or(true),
            purge_after_sync: std::env::var("ROLLCALL_PURGE_AFTER_SYNC")
                .map(|v| v == "1")
                .unwrap_or(false),
            shutdown_grace: Duration::from_secs(env_u64("ROLLCALL_SHUTDOWN_GRACE_SECS", 2)),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
