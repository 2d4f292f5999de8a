//! 固件模块错误类型定义

use domain::{ControllerType, FirmwareFamily};
use std::path::PathBuf;

/// 固件下载错误：总是可恢复，记录日志后等待下一次检查。
#[derive(Debug, thiserror::Error)]
pub enum FirmwareDownloadError {
    #[error("http error: {0}")]
    Http(String),

    #[error("unexpected http status {0}")]
    Status(u16),

    #[error("download timed out")]
    Timeout,

    #[error("missing firmware filename in Content-Disposition")]
    MissingFilename,

    #[error("invalid firmware filename: {0}")]
    InvalidFilename(String),

    #[error("firmware controller type mismatch: expected {expected}, got {found}")]
    ControllerMismatch {
        expected: FirmwareFamily,
        found: ControllerType,
    },

    #[error("invalid firmware size: {size} bytes (expected {min}-{max})")]
    InvalidSize { size: usize, min: usize, max: usize },

    #[error("no download url configured for {0}")]
    NoUrl(FirmwareFamily),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// 固件上传错误：总是返回给调用方。
#[derive(Debug, thiserror::Error)]
pub enum FirmwareUploadError {
    #[error("firmware file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("invalid firmware file extension: {0}")]
    InvalidExtension(String),

    #[error("login failed: {0}")]
    LoginFailed(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("timeout during {0}")]
    Timeout(&'static str),

    #[error("upload failed with HTTP {status}")]
    Rejected { status: u16 },

    #[error("device rejected file: {0}")]
    DeviceRejectedFile(String),

    #[error("session lost: device returned the login page")]
    SessionLost,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 固件存储错误
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("invalid firmware filename: {0}")]
    InvalidFilename(String),
}

/// 固件安装错误
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("firmware update already in progress")]
    AlreadyInProgress,

    #[error("installed firmware version unknown")]
    VersionUnknown,

    #[error(
        "firmware update not supported: device runs {installed}, v{min} or newer is required; update manually first"
    )]
    Unsupported { installed: String, min: String },

    #[error("unknown controller type")]
    UnknownController,

    #[error("firmware file for {0} not available; wait for the firmware check to complete")]
    FirmwareNotAvailable(FirmwareFamily),

    #[error("firmware upload failed: {0}")]
    Upload(#[from] FirmwareUploadError),
}
