//! 固件版本
//!
//! 固件寄存器（1000，32 位）按位打包：
//! `controller:4 | v1:4 | v2:4 | v3:8 | v4:12`（从最高位开始）。
//! `v4` 是功能构建号，版本比较只看它。

use crate::controller::ControllerType;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 支持 `.mbin` 上传的最低控制器版本 (v1, v2, v3)。
pub const FIRMWARE_MIN_SUPPORTED_VERSION: (u32, u32, u32) = (1, 3, 15);

/// 控制器固件版本。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerVersion {
    pub controller: ControllerType,
    pub v1: u32,
    pub v2: u32,
    pub v3: u32,
    pub v4: u32,
}

impl ControllerVersion {
    /// 从固件寄存器的 32 位原始值解码。
    pub fn from_raw(raw: u32) -> Self {
        Self {
            controller: ControllerType::from_code((raw >> 28) & 0x0F),
            v1: (raw >> 24) & 0x0F,
            v2: (raw >> 20) & 0x0F,
            v3: (raw >> 12) & 0xFF,
            v4: raw & 0x0FFF,
        }
    }

    /// 可用版本是否比 `installed` 新（仅比较 v4）。
    pub fn is_newer_than(&self, installed: &ControllerVersion) -> bool {
        self.v4 > installed.v4
    }

    /// 是否支持通过 Web 界面上传 `.mbin` 固件。
    pub fn supports_upload(&self) -> bool {
        (self.v1, self.v2, self.v3) >= FIRMWARE_MIN_SUPPORTED_VERSION
    }
}

impl fmt::Display for ControllerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.v1, self.v2, self.v3, self.v4)
    }
}

/// 面板固件版本（仅新格式文件名携带）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanelVersion {
    pub panel: u32,
    pub v1: u32,
    pub v2: u32,
    pub v3: u32,
    pub v4: u32,
}

impl fmt::Display for PanelVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.v1, self.v2, self.v3, self.v4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_firmware_register() {
        let version = ControllerVersion::from_raw(18_886_660);
        assert_eq!(version.controller, ControllerType::C6);
        assert_eq!((version.v1, version.v2, version.v3, version.v4), (1, 2, 3, 4));

        let version = ControllerVersion::from_raw(0xFFFF_FFFF);
        assert_eq!(version.controller, ControllerType::NA);
        assert_eq!(
            (version.v1, version.v2, version.v3, version.v4),
            (15, 15, 255, 4095)
        );

        let version = ControllerVersion::from_raw(289_542_195);
        assert_eq!(version.controller, ControllerType::C6M);
        assert_eq!(version.to_string(), "1.4.33.51");
    }

    #[test]
    fn newer_compares_build_number_only() {
        let installed = ControllerVersion::from_raw(18_886_660);
        let mut available = installed;
        available.v1 = 0;
        available.v4 = 5;
        assert!(available.is_newer_than(&installed));
        assert!(!installed.is_newer_than(&available));
        assert!(!installed.is_newer_than(&installed));
    }

    #[test]
    fn minimum_supported_version() {
        let base = ControllerVersion::from_raw(0);
        let check = |v1, v2, v3| ControllerVersion { v1, v2, v3, ..base }.supports_upload();
        assert!(check(1, 3, 15));
        assert!(check(1, 4, 0));
        assert!(!check(1, 3, 14));
        assert!(!check(1, 2, 99));
    }
}
