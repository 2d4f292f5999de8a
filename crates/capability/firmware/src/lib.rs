//! Komfovent 固件能力
//!
//! - [`filename`]：从文件名解析固件版本
//! - [`store`]：按系列持久化固件元数据与文件
//! - [`checker`]：定期从厂商地址下载新固件
//! - [`uploader`]：通过设备 Web 界面上传固件
//! - [`update`]：安装编排（版本校验、上传、重启窗口内暂停轮询）

pub mod checker;
pub mod error;
pub mod filename;
pub mod store;
pub mod update;
pub mod uploader;

pub use checker::{CheckCycle, CheckOutcome, DEFAULT_C6_URL, FirmwareChecker, FirmwareCheckerConfig};
pub use error::{FirmwareDownloadError, FirmwareUploadError, StoreError, UpdateError};
pub use filename::{FirmwareVersionInfo, extract_filename, parse_firmware_filename};
pub use store::{FIRMWARE_DIR, FirmwareInfo, FirmwareStore, METADATA_FILE};
pub use update::FirmwareUpdater;
pub use uploader::{FirmwareUploader, UploadReport, UploadState, UploaderConfig};
