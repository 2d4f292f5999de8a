//! 固件上传
//!
//! 设备 Web 界面按来源 IP 维持会话，三个步骤共用同一个 HTTP 客户端：
//!
//! ```text
//! NotStarted → LoggingIn → UploadingFirmware → LoggedOut | LogoutFailed
//!                  ↓               ↓
//!               Failed          Failed
//! ```
//!
//! 登出失败不影响结果（设备上传成功后会立即重启）。上传器内部不重试。

use crate::error::FirmwareUploadError;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

const UPLOAD_ENDPOINT: &str = "/g1.html";
const LOGOUT_ENDPOINT: &str = "/";
const FIELD_USERNAME: &str = "1";
const FIELD_PASSWORD: &str = "2";
const FIELD_FIRMWARE: &str = "11111";
const FIRMWARE_EXTENSION: &str = ".mbin";
/// 设备接收固件的大致速率（字节/秒）。
const UPLOAD_BYTES_PER_SEC: u64 = 19_000;

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploaderConfig {
    /// 设备地址（host 或 host:port）
    pub host: String,
    #[serde(default = "default_credential")]
    pub username: String,
    #[serde(default = "default_credential")]
    pub password: String,
    /// 建立连接超时（秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// 登录超时（秒）
    #[serde(default = "default_login_timeout")]
    pub login_timeout_secs: u64,
    /// 上传超时下限（秒）
    #[serde(default = "default_upload_timeout")]
    pub upload_timeout_secs: u64,
    /// 登出超时（秒）
    #[serde(default = "default_logout_timeout")]
    pub logout_timeout_secs: u64,
    /// 上传成功后设备重启所需时间（秒）
    #[serde(default = "default_restart_delay")]
    pub restart_delay_secs: u64,
}

fn default_credential() -> String {
    "user".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_login_timeout() -> u64 {
    30
}

fn default_upload_timeout() -> u64 {
    300
}

fn default_logout_timeout() -> u64 {
    10
}

fn default_restart_delay() -> u64 {
    120
}

impl UploaderConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            username: default_credential(),
            password: default_credential(),
            connect_timeout_secs: default_connect_timeout(),
            login_timeout_secs: default_login_timeout(),
            upload_timeout_secs: default_upload_timeout(),
            logout_timeout_secs: default_logout_timeout(),
            restart_delay_secs: default_restart_delay(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }

    /// 上传超时：配置下限与按速率估算时间的两倍取大者。
    pub fn upload_timeout(&self, size: u64) -> Duration {
        let estimated = size.saturating_mul(2) / UPLOAD_BYTES_PER_SEC;
        Duration::from_secs(self.upload_timeout_secs.max(estimated))
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.host, path)
    }
}

/// 上传状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadState {
    NotStarted,
    LoggingIn,
    UploadingFirmware,
    LoggedOut,
    LogoutFailed,
    Failed(String),
}

impl UploadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::LoggedOut | Self::LogoutFailed | Self::Failed(_))
    }
}

/// 上传成功的结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReport {
    pub filename: String,
    pub bytes: usize,
    pub logged_out: bool,
    /// 调用方恢复轮询前需要等待的时间
    pub restart_delay: Duration,
}

/// 固件上传器
pub struct FirmwareUploader {
    config: UploaderConfig,
    http: reqwest::Client,
    state: watch::Sender<UploadState>,
}

impl FirmwareUploader {
    pub fn new(config: UploaderConfig) -> Result<Self, FirmwareUploadError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| FirmwareUploadError::Network(e.to_string()))?;
        let (state, _) = watch::channel(UploadState::NotStarted);
        Ok(Self {
            config,
            http,
            state,
        })
    }

    pub fn config(&self) -> &UploaderConfig {
        &self.config
    }

    pub fn state(&self) -> UploadState {
        self.state.borrow().clone()
    }

    /// 订阅状态变化。
    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: UploadState) {
        debug!(state = ?state, "upload state changed");
        self.state.send_replace(state);
    }

    /// 登录、上传、登出。文件校验在任何网络请求之前完成。
    pub async fn upload(&self, path: &Path) -> Result<UploadReport, FirmwareUploadError> {
        let span = info_span!(
            "firmware_upload",
            operation_id = %komfo_telemetry::new_operation_id(),
            host = %self.config.host,
        );
        let result = self.upload_inner(path).instrument(span).await;
        komfo_telemetry::record_firmware_upload(result.is_ok());
        if let Err(e) = &result {
            warn!(host = %self.config.host, error = %e, "firmware upload failed");
            self.set_state(UploadState::Failed(e.to_string()));
        }
        result
    }

    async fn upload_inner(&self, path: &Path) -> Result<UploadReport, FirmwareUploadError> {
        self.set_state(UploadState::NotStarted);

        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        if !filename.ends_with(FIRMWARE_EXTENSION) {
            return Err(FirmwareUploadError::InvalidExtension(filename));
        }
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Err(FirmwareUploadError::FileNotFound(path.to_path_buf()));
        }
        let bytes = tokio::fs::read(path).await?;
        let size = bytes.len();
        info!(filename = %filename, bytes = size, "starting firmware upload");

        self.set_state(UploadState::LoggingIn);
        self.login().await?;
        debug!("login successful");

        self.set_state(UploadState::UploadingFirmware);
        self.send_firmware(&filename, bytes).await?;
        info!(filename = %filename, "firmware upload completed");

        let logged_out = match self.logout().await {
            Ok(()) => {
                debug!("logout successful");
                self.set_state(UploadState::LoggedOut);
                true
            }
            Err(e) => {
                debug!(error = %e, "logout failed, device may be restarting");
                self.set_state(UploadState::LogoutFailed);
                false
            }
        };

        Ok(UploadReport {
            filename,
            bytes: size,
            logged_out,
            restart_delay: self.config.restart_delay(),
        })
    }

    async fn login(&self) -> Result<(), FirmwareUploadError> {
        let response = self
            .http
            .post(self.config.url(UPLOAD_ENDPOINT))
            .form(&[
                (FIELD_USERNAME, self.config.username.as_str()),
                (FIELD_PASSWORD, self.config.password.as_str()),
            ])
            .timeout(Duration::from_secs(self.config.login_timeout_secs))
            .send()
            .await
            .map_err(|e| map_http_error(e, "login"))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FirmwareUploadError::LoginFailed(format!(
                "HTTP {}",
                status.as_u16()
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|e| map_http_error(e, "login"))?;
        if is_login_page(&body) {
            return Err(FirmwareUploadError::LoginFailed(
                "incorrect username or password".to_string(),
            ));
        }
        Ok(())
    }

    async fn send_firmware(
        &self,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<(), FirmwareUploadError> {
        let timeout = self.config.upload_timeout(bytes.len() as u64);
        let part = Part::bytes(bytes)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")
            .map_err(|e| FirmwareUploadError::Network(e.to_string()))?;
        let form = Form::new()
            .text(FIELD_USERNAME, self.config.username.clone())
            .text(FIELD_PASSWORD, self.config.password.clone())
            .part(FIELD_FIRMWARE, part);

        let response = self
            .http
            .post(self.config.url(UPLOAD_ENDPOINT))
            .multipart(form)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| map_http_error(e, "upload"))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FirmwareUploadError::Rejected {
                status: status.as_u16(),
            });
        }
        let body = response
            .text()
            .await
            .map_err(|e| map_http_error(e, "upload"))?;
        if let Some(reason) = upload_error_message(&body) {
            return Err(FirmwareUploadError::DeviceRejectedFile(reason));
        }
        if is_login_page(&body) {
            return Err(FirmwareUploadError::SessionLost);
        }
        Ok(())
    }

    async fn logout(&self) -> Result<(), FirmwareUploadError> {
        let response = self
            .http
            .post(self.config.url(LOGOUT_ENDPOINT))
            .form(&[(FIELD_USERNAME, ""), (FIELD_PASSWORD, ""), ("4", "Logout")])
            .timeout(Duration::from_secs(self.config.logout_timeout_secs))
            .send()
            .await
            .map_err(|e| map_http_error(e, "logout"))?;
        if !response.status().is_success() {
            return Err(FirmwareUploadError::Rejected {
                status: response.status().as_u16(),
            });
        }
        Ok(())
    }
}

fn map_http_error(e: reqwest::Error, step: &'static str) -> FirmwareUploadError {
    if e.is_timeout() {
        FirmwareUploadError::Timeout(step)
    } else {
        FirmwareUploadError::Network(e.to_string())
    }
}

/// 设备登录页总是包含（可能隐藏的）"Incorrect password!" 提示。
fn is_login_page(body: &str) -> bool {
    body.to_ascii_lowercase().contains("incorrect password")
}

/// 设备在页面状态行中报告 "Firmware upload error: ..."。
fn upload_error_message(body: &str) -> Option<String> {
    let lower = body.to_ascii_lowercase();
    let start = lower.find("upload error")?;
    let line = body[start..]
        .split(['<', '\n'])
        .next()
        .unwrap_or_default()
        .trim();
    Some(line.to_string())
}
