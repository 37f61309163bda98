use chrono_tz::Tz;

use crate::timeparse;

/// Runtime configuration, loaded once at startup and threaded through the
/// webhook state and the dispatcher. No ambient globals.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub line_channel_secret: String,
    pub line_channel_access_token: String,
    pub default_timezone: Tz,
    pub max_retry: i32,
    pub dispatch_batch_size: i64,
    pub dispatch_interval_secs: u64,
    pub stale_sending_secs: i64,
    pub allowed_groups: Vec<String>,
    pub bind_addr: String,
    pub migrate_on_startup: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL is missing"))?;
        let db_max_connections = env_parsed("DB_MAX_CONNECTIONS").unwrap_or(4).clamp(1, 32);
        let db_acquire_timeout_secs =
            env_parsed("DB_ACQUIRE_TIMEOUT_SECS").unwrap_or(10).clamp(1, 60);

        let line_channel_secret = std::env::var("LINE_CHANNEL_SECRET")
            .map_err(|_| anyhow::anyhow!("LINE_CHANNEL_SECRET is missing"))?;
        let line_channel_access_token = std::env::var("LINE_CHANNEL_ACCESS_TOKEN")
            .map_err(|_| anyhow::anyhow!("LINE_CHANNEL_ACCESS_TOKEN is missing"))?;

        let tz_name =
            std::env::var("DEFAULT_TIMEZONE").unwrap_or_else(|_| "Asia/Taipei".to_string());
        let default_timezone = timeparse::parse_zone(&tz_name)
            .ok_or_else(|| anyhow::anyhow!("DEFAULT_TIMEZONE is not a valid IANA zone: {tz_name}"))?;

        let max_retry: i32 = env_parsed("MAX_RETRY").unwrap_or(3);
        anyhow::ensure!(max_retry >= 1, "MAX_RETRY must be a positive integer");

        let dispatch_batch_size: i64 = env_parsed("DISPATCH_BATCH_SIZE").unwrap_or(100);
        anyhow::ensure!(
            dispatch_batch_size >= 1,
            "DISPATCH_BATCH_SIZE must be a positive integer"
        );

        let dispatch_interval_secs: u64 = env_parsed("DISPATCH_INTERVAL_SECS").unwrap_or(60);
        anyhow::ensure!(
            dispatch_interval_secs >= 1,
            "DISPATCH_INTERVAL_SECS must be a positive integer"
        );

        let stale_sending_secs: i64 = env_parsed("STALE_SENDING_SECS").unwrap_or(600);
        anyhow::ensure!(
            stale_sending_secs >= 1,
            "STALE_SENDING_SECS must be a positive integer"
        );

        let allowed_groups = std::env::var("ALLOWED_GROUPS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();

        let bind_addr =
            std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let migrate_on_startup = std::env::var("MIGRATE_ON_STARTUP")
            .ok()
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        Ok(Self {
            database_url,
            db_max_connections,
            db_acquire_timeout_secs,
            line_channel_secret,
            line_channel_access_token,
            default_timezone,
            max_retry,
            dispatch_batch_size,
            dispatch_interval_secs,
            stale_sending_secs,
            allowed_groups,
            bind_addr,
            migrate_on_startup,
        })
    }
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}
