use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::warn;

use murmur_gateway::GatewayConfig;

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Server settings, read from `MURMUR_*` environment variables (a `.env`
/// file is loaded first by main).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub gateway: GatewayConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; unset keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = GatewayConfig::default();

        let jwt_secret = lookup("MURMUR_JWT_SECRET").unwrap_or_else(|| {
            warn!("MURMUR_JWT_SECRET not set, using the development secret");
            DEV_JWT_SECRET.to_string()
        });

        Ok(Self {
            host: lookup("MURMUR_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "MURMUR_PORT", 3000)?,
            db_path: lookup("MURMUR_DB_PATH").unwrap_or_else(|| "murmur.db".into()),
            jwt_secret,
            token_ttl_days: parse_or(&lookup, "MURMUR_TOKEN_TTL_DAYS", 30)?,
            gateway: GatewayConfig {
                history_limit: parse_or(&lookup, "MURMUR_HISTORY_LIMIT", defaults.history_limit)?,
                default_page_size: parse_or(&lookup, "MURMUR_PAGE_SIZE", defaults.default_page_size)?,
                max_page_size: parse_or(&lookup, "MURMUR_MAX_PAGE_SIZE", defaults.max_page_size)?,
                max_message_len: parse_or(&lookup, "MURMUR_MAX_MESSAGE_LEN", defaults.max_message_len)?,
                heartbeat_interval: Duration::from_secs(parse_or(
                    &lookup,
                    "MURMUR_HEARTBEAT_SECS",
                    defaults.heartbeat_interval.as_secs(),
                )?),
            },
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw:?}")),
        None => Ok(default),
    }
}
