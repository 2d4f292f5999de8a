//! 追踪初始化、操作 ID 生成与基础计数器。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 基础指标快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub poll_success: u64,
    pub poll_failure: u64,
    pub register_write_success: u64,
    pub register_write_failure: u64,
    pub firmware_downloaded: u64,
    pub firmware_up_to_date: u64,
    pub firmware_check_failure: u64,
    pub firmware_upload_success: u64,
    pub firmware_upload_failure: u64,
}

/// 基础指标（进程内累计）。
pub struct TelemetryMetrics {
    poll_success: AtomicU64,
    poll_failure: AtomicU64,
    register_write_success: AtomicU64,
    register_write_failure: AtomicU64,
    firmware_downloaded: AtomicU64,
    firmware_up_to_date: AtomicU64,
    firmware_check_failure: AtomicU64,
    firmware_upload_success: AtomicU64,
    firmware_upload_failure: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            poll_success: AtomicU64::new(0),
            poll_failure: AtomicU64::new(0),
            register_write_success: AtomicU64::new(0),
            register_write_failure: AtomicU64::new(0),
            firmware_downloaded: AtomicU64::new(0),
            firmware_up_to_date: AtomicU64::new(0),
            firmware_check_failure: AtomicU64::new(0),
            firmware_upload_success: AtomicU64::new(0),
            firmware_upload_failure: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            poll_success: self.poll_success.load(Ordering::Relaxed),
            poll_failure: self.poll_failure.load(Ordering::Relaxed),
            register_write_success: self.register_write_success.load(Ordering::Relaxed),
            register_write_failure: self.register_write_failure.load(Ordering::Relaxed),
            firmware_downloaded: self.firmware_downloaded.load(Ordering::Relaxed),
            firmware_up_to_date: self.firmware_up_to_date.load(Ordering::Relaxed),
            firmware_check_failure: self.firmware_check_failure.load(Ordering::Relaxed),
            firmware_upload_success: self.firmware_upload_success.load(Ordering::Relaxed),
            firmware_upload_failure: self.firmware_upload_failure.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的操作 ID（固件检查周期、上传等长操作的 span 标识）。
pub fn new_operation_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录轮询周期结果。
pub fn record_poll(success: bool) {
    let metrics = metrics();
    if success {
        metrics.poll_success.fetch_add(1, Ordering::Relaxed);
    } else {
        metrics.poll_failure.fetch_add(1, Ordering::Relaxed);
    }
}

/// 记录寄存器写入结果。
pub fn record_register_write(success: bool) {
    let metrics = metrics();
    if success {
        metrics
            .register_write_success
            .fetch_add(1, Ordering::Relaxed);
    } else {
        metrics
            .register_write_failure
            .fetch_add(1, Ordering::Relaxed);
    }
}

/// 记录下载并保存了新固件。
pub fn record_firmware_downloaded() {
    metrics().firmware_downloaded.fetch_add(1, Ordering::Relaxed);
}

/// 记录固件已是最新。
pub fn record_firmware_up_to_date() {
    metrics().firmware_up_to_date.fetch_add(1, Ordering::Relaxed);
}

/// 记录固件检查失败。
pub fn record_firmware_check_failure() {
    metrics()
        .firmware_check_failure
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录固件上传结果。
pub fn record_firmware_upload(success: bool) {
    let metrics = metrics();
    if success {
        metrics
            .firmware_upload_success
            .fetch_add(1, Ordering::Relaxed);
    } else {
        metrics
            .firmware_upload_failure
            .fetch_add(1, Ordering::Relaxed);
    }
}
