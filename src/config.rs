use std::env;

use chrono::FixedOffset;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub event_buffer_size: usize,
    /// Local time zone of the front desks; drives the 23:59 counter reset.
    pub local_offset: FixedOffset,
    pub payment_server_key: String,
    /// 0 disables the background sweep.
    pub penalty_sweep_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let offset_minutes: i32 = parse_or_default("LOCAL_UTC_OFFSET_MINUTES", 7 * 60)?;
        let local_offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            AppError::Internal(format!(
                "invalid LOCAL_UTC_OFFSET_MINUTES: {offset_minutes} is out of range"
            ))
        })?;

        Ok(Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            local_offset,
            payment_server_key: env::var("PAYMENT_SERVER_KEY").unwrap_or_default(),
            penalty_sweep_interval_secs: parse_or_default("PENALTY_SWEEP_INTERVAL_SECS", 0)?,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_port: 3000,
            log_level: "info".to_string(),
            event_buffer_size: 1024,
            local_offset: FixedOffset::east_opt(7 * 3600).expect("UTC+7 is a valid offset"),
            payment_server_key: String::new(),
            penalty_sweep_interval_secs: 0,
        }
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}
