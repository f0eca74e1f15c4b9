use std::{env, fmt::Display, fs::read_to_string, str::FromStr};

use anyhow::{Context, Result, anyhow};
use chrono_tz::Tz;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Redis,
    Memory,
}

impl FromStr for StoreKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(StoreKind::Redis),
            "memory" => Ok(StoreKind::Memory),
            other => Err(format!("expected redis or memory, got {other:?}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub store: StoreKind,
    pub redis_url: String,
    pub time_zone: Tz,
    pub allowed_origins: Vec<String>,
    pub token_secret: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        Ok(Self {
            port: try_load("RUST_PORT", "5000")?,
            store: try_load("LEDGER_STORE", "redis")?,
            redis_url: try_load("REDIS_URL", "redis://redis:6379")?,
            time_zone: try_load("DAY_KEY_TIMEZONE", "Asia/Kolkata")?,
            allowed_origins: parse_origins(&try_load::<String>(
                "CORS_ORIGINS",
                "http://127.0.0.1:5500,http://localhost:5500",
            )?),
            token_secret: read_secret("AUTH_TOKEN_SECRET")?,
        })
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
            anyhow!("Environment misconfigured! {key}: {e}")
        })
}

/// Docker secret first, then an environment variable of the same name.
fn read_secret(secret_name: &str) -> Result<String> {
    let path = format!("/run/secrets/{secret_name}");

    match read_to_string(&path) {
        Ok(secret) => Ok(secret.trim().to_string()),
        Err(e) => {
            warn!("Failed to read {secret_name} from file: {e}");

            var(secret_name)
                .filter(|secret| !secret.is_empty())
                .with_context(|| format!("Secrets misconfigured! {secret_name} missing"))
        }
    }
}

pub fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
