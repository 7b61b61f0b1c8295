use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use crate::guard::limiter::GuardLimits;

#[derive(Clone)]
pub struct Config {
    pub bind_addr: String,
    pub tokens_path: PathBuf,
    pub admin: AdminConfig,
    pub limits: GuardLimits,
    pub pacing: PacingConfig,
}

#[derive(Clone)]
pub struct AdminConfig {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct PacingConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

fn env_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value: {}", name, e)),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let admin_id = std::env::var("LOGINGUARD_ADMIN_ID")
            .map_err(|_| anyhow::anyhow!("LOGINGUARD_ADMIN_ID environment variable is required"))?;
        let admin_password = std::env::var("LOGINGUARD_ADMIN_PASSWORD").map_err(|_| {
            anyhow::anyhow!("LOGINGUARD_ADMIN_PASSWORD environment variable is required")
        })?;

        let defaults = GuardLimits::default();
        let limits = GuardLimits {
            max_requests_per_minute: env_or(
                "LOGINGUARD_MAX_REQUESTS_PER_MINUTE",
                defaults.max_requests_per_minute,
            )?,
            max_requests_per_hour: env_or(
                "LOGINGUARD_MAX_REQUESTS_PER_HOUR",
                defaults.max_requests_per_hour,
            )?,
            max_logins_per_day: env_or(
                "LOGINGUARD_MAX_LOGINS_PER_DAY",
                defaults.max_logins_per_day,
            )?,
            block_duration_secs: env_or(
                "LOGINGUARD_BLOCK_DURATION_SECS",
                defaults.block_duration_secs,
            )?,
        };

        let pacing = PacingConfig {
            min_delay_ms: env_or("LOGINGUARD_MIN_DELAY_MS", 1000)?,
            max_delay_ms: env_or("LOGINGUARD_MAX_DELAY_MS", 3000)?,
        };
        if pacing.max_delay_ms < pacing.min_delay_ms {
            return Err(anyhow::anyhow!(
                "LOGINGUARD_MAX_DELAY_MS must not be smaller than LOGINGUARD_MIN_DELAY_MS"
            ));
        }

        Ok(Config {
            bind_addr: {
                let port = std::env::var("LOGINGUARD_PORT").unwrap_or_else(|_| "8080".to_string());
                std::env::var("LOGINGUARD_BIND_ADDR")
                    .unwrap_or_else(|_| format!("0.0.0.0:{}", port))
            },
            tokens_path: PathBuf::from(
                std::env::var("LOGINGUARD_TOKENS_PATH")
                    .unwrap_or_else(|_| "./service_tokens.json".to_string()),
            ),
            admin: AdminConfig {
                username: admin_id,
                password: admin_password,
            },
            limits,
            pacing,
        })
    }
}
