//! 应用运行配置加载。

use std::env;

/// C6 系列固件的厂商下载地址。
pub const DEFAULT_FIRMWARE_URL_C6: &str =
    "http://www.komfovent.com/Update/Controllers/firmware.php?file=mbin";

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub slave_id: u8,
    pub poll_interval_seconds: u64,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub reconnect_delay_ms: u64,
    pub reconnect_delay_max_ms: u64,
    pub web_username: String,
    pub web_password: String,
    pub firmware_check_enabled: bool,
    pub firmware_dir: String,
    pub firmware_check_interval_hours: u64,
    /// 设为空字符串可关闭 C6 系列检查
    pub firmware_url_c6: Option<String>,
    pub firmware_url_c8: Option<String>,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = read_optional("KOMFO_HOST")
            .ok_or_else(|| ConfigError::Missing("KOMFO_HOST".to_string()))?;
        let port = read_u16_with_default("KOMFO_PORT", 502)?;
        let slave_id = read_u8_with_default("KOMFO_SLAVE_ID", 1)?;
        let poll_interval_seconds = read_u64_with_default("KOMFO_POLL_INTERVAL_SECONDS", 30)?;
        if poll_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "KOMFO_POLL_INTERVAL_SECONDS".to_string(),
                "0".to_string(),
            ));
        }
        let connect_timeout_ms = read_u64_with_default("KOMFO_CONNECT_TIMEOUT_MS", 5000)?;
        let request_timeout_ms = read_u64_with_default("KOMFO_REQUEST_TIMEOUT_MS", 5000)?;
        let retries = read_u32_with_default("KOMFO_RETRIES", 3)?;
        let retry_delay_ms = read_u64_with_default("KOMFO_RETRY_DELAY_MS", 500)?;
        let reconnect_delay_ms = read_u64_with_default("KOMFO_RECONNECT_DELAY_MS", 5000)?;
        let reconnect_delay_max_ms =
            read_u64_with_default("KOMFO_RECONNECT_DELAY_MAX_MS", 60_000)?;
        let web_username = env::var("KOMFO_WEB_USERNAME").unwrap_or_else(|_| "user".to_string());
        let web_password = env::var("KOMFO_WEB_PASSWORD").unwrap_or_else(|_| "user".to_string());
        let firmware_check_enabled = read_bool_with_default("KOMFO_FIRMWARE_CHECK", true);
        let firmware_dir =
            env::var("KOMFO_FIRMWARE_DIR").unwrap_or_else(|_| "./data".to_string());
        let firmware_check_interval_hours =
            read_u64_with_default("KOMFO_FIRMWARE_CHECK_INTERVAL_HOURS", 24)?;
        if firmware_check_interval_hours == 0 {
            return Err(ConfigError::Invalid(
                "KOMFO_FIRMWARE_CHECK_INTERVAL_HOURS".to_string(),
                "0".to_string(),
            ));
        }
        let firmware_url_c6 = match env::var("KOMFO_FIRMWARE_URL_C6") {
            Ok(value) if value.is_empty() => None,
            Ok(value) => Some(value),
            Err(_) => Some(DEFAULT_FIRMWARE_URL_C6.to_string()),
        };
        let firmware_url_c8 = read_optional("KOMFO_FIRMWARE_URL_C8");

        Ok(Self {
            host,
            port,
            slave_id,
            poll_interval_seconds,
            connect_timeout_ms,
            request_timeout_ms,
            retries,
            retry_delay_ms,
            reconnect_delay_ms,
            reconnect_delay_max_ms,
            web_username,
            web_password,
            firmware_check_enabled,
            firmware_dir,
            firmware_check_interval_hours,
            firmware_url_c6,
            firmware_url_c8,
        })
    }
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u8_with_default(key: &str, default: u8) -> Result<u8, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u8>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u32_with_default(key: &str, default: u32) -> Result<u32, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
