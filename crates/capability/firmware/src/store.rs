//! 固件存储
//!
//! 按固件系列（C6 / C8）保存一份元数据和一个固件文件，同系列的多台设备共享：
//!
//! ```text
//! <root>/komfovent_firmware.json          {"firmware": {"C6": {...}}}
//! <root>/komfovent_firmware/<name>.mbin
//! ```
//!
//! 元数据与固件文件都先写临时文件再 rename，不会留下半写的文件。

use crate::error::StoreError;
use crate::filename::FirmwareVersionInfo;
use chrono::{DateTime, Utc};
use domain::{ControllerVersion, FirmwareFamily, PanelVersion};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// 元数据文档文件名。
pub const METADATA_FILE: &str = "komfovent_firmware.json";
/// 固件文件目录名。
pub const FIRMWARE_DIR: &str = "komfovent_firmware";

const FIRMWARE_EXTENSION: &str = ".mbin";

/// 单个固件系列的元数据；整体替换，不原地修改。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareInfo {
    pub family: FirmwareFamily,
    pub filename: String,
    pub controller_version: ControllerVersion,
    #[serde(default)]
    pub panel_version: Option<PanelVersion>,
    #[serde(default)]
    pub build_date: Option<String>,
    pub file_path: PathBuf,
    pub last_checked_at: DateTime<Utc>,
}

impl FirmwareInfo {
    /// 版本字符串 `v1.v2.v3.v4`。
    pub fn version(&self) -> String {
        self.controller_version.to_string()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredFirmwareData {
    #[serde(default)]
    firmware: BTreeMap<FirmwareFamily, FirmwareInfo>,
}

/// 固件存储
pub struct FirmwareStore {
    root: PathBuf,
    data: RwLock<StoredFirmwareData>,
}

impl FirmwareStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            data: RwLock::new(StoredFirmwareData::default()),
        }
    }

    /// 创建并加载已有元数据。
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self::new(root);
        store.load().await?;
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn storage_dir(&self) -> PathBuf {
        self.root.join(FIRMWARE_DIR)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.root.join(METADATA_FILE)
    }

    /// 从磁盘加载元数据；文件不存在时从空开始。
    pub async fn load(&self) -> Result<(), StoreError> {
        let loaded = match tokio::fs::read(self.metadata_path()).await {
            Ok(bytes) => serde_json::from_slice::<StoredFirmwareData>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no existing firmware store found, starting fresh");
                StoredFirmwareData::default()
            }
            Err(e) => return Err(e.into()),
        };
        debug!(entries = loaded.firmware.len(), "loaded firmware store");
        *self.data.write().await = loaded;
        Ok(())
    }

    pub async fn get(&self, family: FirmwareFamily) -> Option<FirmwareInfo> {
        self.data.read().await.firmware.get(&family).cloned()
    }

    /// 最新可用版本字符串。
    pub async fn latest_version(&self, family: FirmwareFamily) -> Option<String> {
        self.get(family).await.map(|info| info.version())
    }

    pub async fn firmware_path(&self, family: FirmwareFamily) -> Option<PathBuf> {
        self.get(family).await.map(|info| info.file_path)
    }

    /// 元数据存在且文件仍在磁盘上。
    pub async fn has_firmware_file(&self, family: FirmwareFamily) -> bool {
        match self.firmware_path(family).await {
            Some(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            None => false,
        }
    }

    /// 持久化写入固件文件并替换该系列的元数据。
    pub async fn save_firmware(
        &self,
        family: FirmwareFamily,
        filename: &str,
        version: &FirmwareVersionInfo,
        bytes: &[u8],
    ) -> Result<FirmwareInfo, StoreError> {
        validate_filename(filename)?;

        let dir = self.storage_dir();
        tokio::fs::create_dir_all(&dir).await?;
        let file_path = dir.join(filename);
        write_atomic(&file_path, bytes).await?;

        let info = FirmwareInfo {
            family,
            filename: filename.to_string(),
            controller_version: *version.controller(),
            panel_version: version.panel().copied(),
            build_date: version.build_date().map(str::to_string),
            file_path,
            last_checked_at: Utc::now(),
        };

        let mut data = self.data.write().await;
        let mut updated = data.clone();
        updated.firmware.insert(family, info.clone());
        self.persist(&updated).await?;
        *data = updated;

        info!(
            family = %family,
            filename = %info.filename,
            version = %info.version(),
            "stored firmware"
        );
        Ok(info)
    }

    /// 删除某系列的元数据（文件由 [`cleanup_old_files`](Self::cleanup_old_files) 回收）。
    pub async fn remove(&self, family: FirmwareFamily) -> Result<(), StoreError> {
        let mut data = self.data.write().await;
        if !data.firmware.contains_key(&family) {
            return Ok(());
        }
        let mut updated = data.clone();
        updated.firmware.remove(&family);
        self.persist(&updated).await?;
        *data = updated;
        info!(family = %family, "removed firmware info");
        Ok(())
    }

    /// 删除不属于任何活跃系列的 `.mbin` 文件，返回被删除的文件名。
    pub async fn cleanup_old_files(
        &self,
        active_families: &[FirmwareFamily],
    ) -> Result<Vec<String>, StoreError> {
        let dir = self.storage_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let keep: Vec<String> = {
            let data = self.data.read().await;
            active_families
                .iter()
                .filter_map(|family| data.firmware.get(family))
                .map(|info| info.filename.clone())
                .collect()
        };

        let mut removed = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(FIRMWARE_EXTENSION) || keep.contains(&name) {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => {
                    info!(filename = %name, "removed old firmware file");
                    removed.push(name);
                }
                Err(e) => warn!(filename = %name, error = %e, "failed to remove firmware file"),
            }
        }
        Ok(removed)
    }

    async fn persist(&self, data: &StoredFirmwareData) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.root).await?;
        let bytes = serde_json::to_vec_pretty(data)?;
        write_atomic(&self.metadata_path(), &bytes).await?;
        debug!("saved firmware store");
        Ok(())
    }
}

/// 文件名只能是单个路径分量。
fn validate_filename(filename: &str) -> Result<(), StoreError> {
    let is_plain = Path::new(filename)
        .file_name()
        .is_some_and(|name| name == filename);
    if !is_plain || !filename.ends_with(FIRMWARE_EXTENSION) {
        return Err(StoreError::InvalidFilename(filename.to_string()));
    }
    Ok(())
}

/// 临时文件 + fsync + rename。
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| StoreError::InvalidFilename(path.display().to_string()))?;
    let tmp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let mut file = tokio::fs::File::create(&tmp_path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await?;
    drop(file);

    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e.into());
    }
    Ok(())
}
