//! 固件安装编排
//!
//! 校验已安装版本与控制器类型，上传已下载的固件文件，
//! 然后在设备重启窗口内暂停寄存器轮询并等待。

use crate::error::UpdateError;
use crate::store::FirmwareStore;
use crate::uploader::{FirmwareUploader, UploadReport};
use domain::{ControllerVersion, FIRMWARE_MIN_SUPPORTED_VERSION, PollControl};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{info, warn};

struct InstallGuard<'a>(&'a AtomicBool);

impl Drop for InstallGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 固件安装器（每台设备一个）
pub struct FirmwareUpdater {
    store: Arc<FirmwareStore>,
    uploader: FirmwareUploader,
    poll_control: Arc<dyn PollControl>,
    installing: AtomicBool,
}

impl FirmwareUpdater {
    pub fn new(
        store: Arc<FirmwareStore>,
        uploader: FirmwareUploader,
        poll_control: Arc<dyn PollControl>,
    ) -> Self {
        Self {
            store,
            uploader,
            poll_control,
            installing: AtomicBool::new(false),
        }
    }

    pub fn uploader(&self) -> &FirmwareUploader {
        &self.uploader
    }

    pub fn is_installing(&self) -> bool {
        self.installing.load(Ordering::Acquire)
    }

    /// 存储中的最新版本字符串。
    pub async fn latest_version(&self, installed_raw: u32) -> Option<String> {
        let family = ControllerVersion::from_raw(installed_raw)
            .controller
            .firmware_family()?;
        self.store.latest_version(family).await
    }

    /// 存储中的固件是否比已安装版本新（按 v4 比较）。
    pub async fn update_available(&self, installed_raw: u32) -> bool {
        if installed_raw == 0 {
            return false;
        }
        let installed = ControllerVersion::from_raw(installed_raw);
        let Some(family) = installed.controller.firmware_family() else {
            return false;
        };
        self.store
            .get(family)
            .await
            .is_some_and(|info| info.controller_version.is_newer_than(&installed))
    }

    /// 安装已下载的固件。`installed_raw` 为固件寄存器的原始值（0 视为缺失）。
    pub async fn install(&self, installed_raw: Option<u32>) -> Result<UploadReport, UpdateError> {
        if self
            .installing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(UpdateError::AlreadyInProgress);
        }
        let _guard = InstallGuard(&self.installing);

        let raw = installed_raw
            .filter(|raw| *raw != 0)
            .ok_or(UpdateError::VersionUnknown)?;
        let installed = ControllerVersion::from_raw(raw);
        if !installed.supports_upload() {
            let (v1, v2, v3) = FIRMWARE_MIN_SUPPORTED_VERSION;
            return Err(UpdateError::Unsupported {
                installed: installed.to_string(),
                min: format!("{v1}.{v2}.{v3}"),
            });
        }
        let family = installed
            .controller
            .firmware_family()
            .ok_or(UpdateError::UnknownController)?;

        if !self.store.has_firmware_file(family).await {
            return Err(UpdateError::FirmwareNotAvailable(family));
        }
        let path = self
            .store
            .firmware_path(family)
            .await
            .ok_or(UpdateError::FirmwareNotAvailable(family))?;

        info!(
            family = %family,
            installed = %installed,
            path = %path.display(),
            "installing firmware"
        );
        let report = self.uploader.upload(&path).await.inspect_err(|e| {
            warn!(family = %family, error = %e, "firmware install failed");
        })?;

        self.poll_control.suspend(report.restart_delay);
        info!(
            restart_delay_secs = report.restart_delay.as_secs(),
            "firmware uploaded, waiting for device restart"
        );
        tokio::time::sleep(report.restart_delay).await;
        Ok(report)
    }
}
