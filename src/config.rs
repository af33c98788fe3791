use crate::adapters::policy::DEFAULT_MINIMUM_CANCELLATION_NOTICE_DAYS;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/subscriptions";
const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// 設定の読み込みエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// 数値として解釈できない値
    #[error("Invalid value for {name}: {value:?}")]
    InvalidNumber { name: &'static str, value: String },

    /// 0を許さない設定に0が指定された
    #[error("{name} must be greater than zero")]
    MustBePositive { name: &'static str },
}

/// ワーカーの設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub sweep_interval: Duration,
    pub minimum_cancellation_notice_days: u32,
}

impl AppConfig {
    /// 環境変数から設定を読み込む
    ///
    /// 未設定の項目は既定値。`.env`の読み込みは呼び出し側で行う。
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// 任意の参照関数から設定を読み込む
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.into());

        let database_max_connections = parse_or(
            &lookup,
            "DATABASE_MAX_CONNECTIONS",
            DEFAULT_DATABASE_MAX_CONNECTIONS,
        )?;
        if database_max_connections == 0 {
            return Err(ConfigError::MustBePositive {
                name: "DATABASE_MAX_CONNECTIONS",
            });
        }

        let sweep_interval_secs =
            parse_or(&lookup, "SWEEP_INTERVAL_SECS", DEFAULT_SWEEP_INTERVAL_SECS)?;
        if sweep_interval_secs == 0 {
            return Err(ConfigError::MustBePositive {
                name: "SWEEP_INTERVAL_SECS",
            });
        }

        let minimum_cancellation_notice_days = parse_or(
            &lookup,
            "MINIMUM_CANCELLATION_NOTICE_DAYS",
            DEFAULT_MINIMUM_CANCELLATION_NOTICE_DAYS,
        )?;

        Ok(Self {
            database_url,
            database_max_connections,
            sweep_interval: Duration::from_secs(sweep_interval_secs),
            minimum_cancellation_notice_days,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber { name, value }),
    }
}
