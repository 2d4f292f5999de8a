//! 固件检查与下载
//!
//! 进程内只有一个检查周期在运行；周期进行中收到的定时或强制触发直接丢弃。
//! 每个固件系列独立检查，C6 与 C6M 共用 C6 系列。
//!
//! ```text
//! Idle → Checking → Downloaded | UpToDate | Failed → Idle
//! ```

use crate::error::FirmwareDownloadError;
use crate::filename::{extract_filename, parse_firmware_filename};
use crate::store::{FirmwareInfo, FirmwareStore};
use domain::{ControllerType, FirmwareFamily};
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, info_span, warn, Instrument};

/// C6 系列固件的厂商下载地址。
pub const DEFAULT_C6_URL: &str =
    "http://www.komfovent.com/Update/Controllers/firmware.php?file=mbin";

/// 固件检查配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FirmwareCheckerConfig {
    /// C6 / C6M 固件下载地址
    #[serde(default = "default_c6_url")]
    pub c6_url: Option<String>,
    /// C8 固件下载地址（无默认值）
    #[serde(default)]
    pub c8_url: Option<String>,
    /// 检查间隔（秒）
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    /// 下载超时（秒）
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
    /// 最小合法文件大小（字节）
    #[serde(default = "default_min_size")]
    pub min_size: usize,
    /// 最大合法文件大小（字节）
    #[serde(default = "default_max_size")]
    pub max_size: usize,
}

fn default_c6_url() -> Option<String> {
    Some(DEFAULT_C6_URL.to_string())
}

fn default_check_interval() -> u64 {
    24 * 60 * 60
}

fn default_download_timeout() -> u64 {
    60
}

fn default_min_size() -> usize {
    100_000
}

fn default_max_size() -> usize {
    10_000_000
}

impl Default for FirmwareCheckerConfig {
    fn default() -> Self {
        Self {
            c6_url: default_c6_url(),
            c8_url: None,
            check_interval_secs: default_check_interval(),
            download_timeout_secs: default_download_timeout(),
            min_size: default_min_size(),
            max_size: default_max_size(),
        }
    }
}

impl FirmwareCheckerConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn url_for(&self, family: FirmwareFamily) -> Option<&str> {
        match family {
            FirmwareFamily::C6 => self.c6_url.as_deref(),
            FirmwareFamily::C8 => self.c8_url.as_deref(),
        }
    }
}

/// 单个系列的检查结果。
#[derive(Debug)]
pub enum CheckOutcome {
    Downloaded(FirmwareInfo),
    UpToDate,
    Failed(FirmwareDownloadError),
}

/// 一次检查周期的结果。
#[derive(Debug)]
pub enum CheckCycle {
    /// 已有周期在运行，本次触发被丢弃
    AlreadyRunning,
    /// 没有已注册的控制器
    NoActiveFamilies,
    Completed(BTreeMap<FirmwareFamily, CheckOutcome>),
}

/// 周期结束时复位 `checking` 标志。
struct CheckingGuard<'a>(&'a AtomicBool);

impl Drop for CheckingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 固件检查器（进程级单例）
pub struct FirmwareChecker {
    config: FirmwareCheckerConfig,
    http: reqwest::Client,
    store: Arc<FirmwareStore>,
    active: Mutex<BTreeMap<FirmwareFamily, usize>>,
    checking: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl FirmwareChecker {
    pub fn new(
        config: FirmwareCheckerConfig,
        store: Arc<FirmwareStore>,
    ) -> Result<Self, FirmwareDownloadError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| FirmwareDownloadError::Http(e.to_string()))?;
        Ok(Self {
            config,
            http,
            store,
            active: Mutex::new(BTreeMap::new()),
            checking: AtomicBool::new(false),
            task: Mutex::new(None),
        })
    }

    pub fn store(&self) -> &Arc<FirmwareStore> {
        &self.store
    }

    /// 注册一台设备的控制器类型（按系列引用计数）。
    pub fn register_controller(&self, controller: ControllerType) {
        let Some(family) = controller.firmware_family() else {
            debug!(controller = %controller, "ignoring controller without firmware family");
            return;
        };
        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        *active.entry(family).or_insert(0) += 1;
        debug!(family = %family, "registered controller type");
    }

    /// 注销一台设备；计数归零后该系列不再检查。
    pub fn unregister_controller(&self, controller: ControllerType) {
        let Some(family) = controller.firmware_family() else {
            return;
        };
        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(count) = active.get_mut(&family) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                active.remove(&family);
            }
        }
        debug!(family = %family, "unregistered controller type");
    }

    pub fn active_families(&self) -> Vec<FirmwareFamily> {
        let active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        active.keys().copied().collect()
    }

    pub fn is_checking(&self) -> bool {
        self.checking.load(Ordering::Acquire)
    }

    /// 启动后台任务：立即检查一次，然后按间隔检查。重复调用无效果。
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }

        let period = Duration::from_secs(self.config.check_interval_secs.max(1));
        info!(interval_secs = period.as_secs(), "starting firmware checker");
        let checker = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                checker.check_for_updates().await;
            }
        }));
    }

    /// 停止后台任务。
    pub fn stop(&self) {
        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(handle) = task.take() {
            handle.abort();
            info!("stopped firmware checker");
        }
    }

    /// 检查所有活跃系列。
    pub async fn check_for_updates(&self) -> CheckCycle {
        let families = self.active_families();
        self.run_cycle(families).await
    }

    /// 立即检查；指定系列时只检查该系列（无论是否已注册）。
    pub async fn force_check(&self, family: Option<FirmwareFamily>) -> CheckCycle {
        let families = match family {
            Some(family) => vec![family],
            None => self.active_families(),
        };
        self.run_cycle(families).await
    }

    async fn run_cycle(&self, families: Vec<FirmwareFamily>) -> CheckCycle {
        if families.is_empty() {
            debug!("no active controller types registered, skipping firmware check");
            return CheckCycle::NoActiveFamilies;
        }
        if self
            .checking
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("firmware check already in progress, skipping");
            return CheckCycle::AlreadyRunning;
        }
        let _guard = CheckingGuard(&self.checking);

        let span = info_span!("firmware_check", operation_id = %komfo_telemetry::new_operation_id());
        async {
            let mut outcomes = BTreeMap::new();
            for family in families {
                let outcome = self.check_family(family).await;
                outcomes.insert(family, outcome);
            }
            CheckCycle::Completed(outcomes)
        }
        .instrument(span)
        .await
    }

    async fn check_family(&self, family: FirmwareFamily) -> CheckOutcome {
        match self.download(family).await {
            Ok(CheckOutcome::Downloaded(info)) => {
                komfo_telemetry::record_firmware_downloaded();
                info!(
                    family = %family,
                    filename = %info.filename,
                    version = %info.version(),
                    "downloaded new firmware"
                );
                CheckOutcome::Downloaded(info)
            }
            Ok(outcome) => {
                komfo_telemetry::record_firmware_up_to_date();
                debug!(family = %family, "firmware is up to date");
                outcome
            }
            Err(e) => {
                komfo_telemetry::record_firmware_check_failure();
                warn!(family = %family, error = %e, "firmware check failed");
                CheckOutcome::Failed(e)
            }
        }
    }

    async fn download(&self, family: FirmwareFamily) -> Result<CheckOutcome, FirmwareDownloadError> {
        let url = self
            .config
            .url_for(family)
            .ok_or(FirmwareDownloadError::NoUrl(family))?;
        debug!(family = %family, url, "downloading firmware");

        let mut response = self
            .http
            .get(url)
            .timeout(Duration::from_secs(self.config.download_timeout_secs))
            .send()
            .await
            .map_err(map_http_error)?;
        if response.status() != StatusCode::OK {
            return Err(FirmwareDownloadError::Status(response.status().as_u16()));
        }

        let header = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let filename = extract_filename(header).ok_or(FirmwareDownloadError::MissingFilename)?;
        let version = parse_firmware_filename(&filename)
            .ok_or_else(|| FirmwareDownloadError::InvalidFilename(filename.clone()))?;
        if version.controller_type().firmware_family() != Some(family) {
            return Err(FirmwareDownloadError::ControllerMismatch {
                expected: family,
                found: version.controller_type(),
            });
        }

        let (min, max) = (self.config.min_size, self.config.max_size);
        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(map_http_error)? {
            let size = body.len() + chunk.len();
            if size > max {
                return Err(FirmwareDownloadError::InvalidSize { size, min, max });
            }
            body.extend_from_slice(&chunk);
        }
        if body.len() < min {
            return Err(FirmwareDownloadError::InvalidSize {
                size: body.len(),
                min,
                max,
            });
        }

        if let Some(existing) = self.store.get(family).await {
            if existing.filename == filename {
                return Ok(CheckOutcome::UpToDate);
            }
        }

        let info = self
            .store
            .save_firmware(family, &filename, &version, &body)
            .await?;

        let mut keep = self.active_families();
        if !keep.contains(&family) {
            keep.push(family);
        }
        if let Err(e) = self.store.cleanup_old_files(&keep).await {
            warn!(error = %e, "failed to clean up old firmware files");
        }
        Ok(CheckOutcome::Downloaded(info))
    }
}

fn map_http_error(e: reqwest::Error) -> FirmwareDownloadError {
    if e.is_timeout() {
        FirmwareDownloadError::Timeout
    } else {
        FirmwareDownloadError::Http(e.to_string())
    }
}
