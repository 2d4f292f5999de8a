//! 控制器类型与固件系列

use serde::{Deserialize, Serialize};
use std::fmt;

/// 控制器类型（固件寄存器最高 4 位）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ControllerType {
    C6,
    C6M,
    C8,
    /// 未知或不支持的控制器
    NA,
}

impl ControllerType {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::C6,
            1 => Self::C6M,
            2 => Self::C8,
            _ => Self::NA,
        }
    }

    /// 按文件名前缀解析（`C6` / `C6M` / `C8`）。
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "C6" => Some(Self::C6),
            "C6M" => Some(Self::C6M),
            "C8" => Some(Self::C8),
            _ => None,
        }
    }

    /// 所属固件系列；C6 与 C6M 共用 C6 固件。
    pub fn firmware_family(self) -> Option<FirmwareFamily> {
        match self {
            Self::C6 | Self::C6M => Some(FirmwareFamily::C6),
            Self::C8 => Some(FirmwareFamily::C8),
            Self::NA => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::C6 => "C6",
            Self::C6M => "C6M",
            Self::C8 => "C8",
            Self::NA => "NA",
        }
    }
}

impl fmt::Display for ControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 固件系列：下载、存储与垃圾回收的粒度。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FirmwareFamily {
    C6,
    C8,
}

impl FirmwareFamily {
    pub const ALL: [FirmwareFamily; 2] = [FirmwareFamily::C6, FirmwareFamily::C8];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::C6 => "C6",
            Self::C8 => "C8",
        }
    }
}

impl fmt::Display for FirmwareFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
