//! 固件文件名解析
//!
//! 厂商下载端点通过 `Content-Disposition` 给出文件名，版本信息全部编码在文件名里：
//!
//! ```text
//! 新格式：C6_1_5_46_72_P1_1_1_5_48.mbin   （控制器版本 + 面板版本）
//! 旧格式：C6_1_3_28_38_20180428.mbin      （控制器版本 + 构建日期）
//! ```
//!
//! 前缀可为 `C6`、`C6M` 或 `C8`。先尝试新格式，再尝试旧格式；都不匹配返回 `None`。

use domain::{ControllerType, ControllerVersion, PanelVersion};
use regex::Regex;
use std::sync::OnceLock;

/// 文件名携带的版本信息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareVersionInfo {
    Modern {
        controller: ControllerVersion,
        panel: PanelVersion,
    },
    Legacy {
        controller: ControllerVersion,
        /// `YYYYMMDD`
        build_date: String,
    },
}

impl FirmwareVersionInfo {
    pub fn controller(&self) -> &ControllerVersion {
        match self {
            Self::Modern { controller, .. } | Self::Legacy { controller, .. } => controller,
        }
    }

    pub fn controller_type(&self) -> ControllerType {
        self.controller().controller
    }

    pub fn panel(&self) -> Option<&PanelVersion> {
        match self {
            Self::Modern { panel, .. } => Some(panel),
            Self::Legacy { .. } => None,
        }
    }

    pub fn build_date(&self) -> Option<&str> {
        match self {
            Self::Modern { .. } => None,
            Self::Legacy { build_date, .. } => Some(build_date),
        }
    }
}

fn modern_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r"^(C6M?|C8)_(\d+)_(\d+)_(\d+)_(\d+)_P(\d+)_(\d+)_(\d+)_(\d+)_(\d+)\.mbin$")
                .ok()
        })
        .as_ref()
}

fn legacy_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"^(C6M?|C8)_(\d+)_(\d+)_(\d+)_(\d+)_(\d{8})\.mbin$").ok())
        .as_ref()
}

/// 解析固件文件名；格式不符或数字溢出返回 `None`。
pub fn parse_firmware_filename(filename: &str) -> Option<FirmwareVersionInfo> {
    if let Some(caps) = modern_pattern()?.captures(filename) {
        let numbers = (2..=10)
            .map(|index| caps.get(index)?.as_str().parse::<u32>().ok())
            .collect::<Option<Vec<_>>>()?;
        let [v1, v2, v3, v4, panel, p1, p2, p3, p4] = numbers.as_slice() else {
            return None;
        };
        let controller = ControllerVersion {
            controller: ControllerType::from_prefix(caps.get(1)?.as_str())?,
            v1: *v1,
            v2: *v2,
            v3: *v3,
            v4: *v4,
        };
        let panel = PanelVersion {
            panel: *panel,
            v1: *p1,
            v2: *p2,
            v3: *p3,
            v4: *p4,
        };
        return Some(FirmwareVersionInfo::Modern { controller, panel });
    }

    let caps = legacy_pattern()?.captures(filename)?;
    let numbers = (2..=5)
        .map(|index| caps.get(index)?.as_str().parse::<u32>().ok())
        .collect::<Option<Vec<_>>>()?;
    let [v1, v2, v3, v4] = numbers.as_slice() else {
        return None;
    };
    Some(FirmwareVersionInfo::Legacy {
        controller: ControllerVersion {
            controller: ControllerType::from_prefix(caps.get(1)?.as_str())?,
            v1: *v1,
            v2: *v2,
            v3: *v3,
            v4: *v4,
        },
        build_date: caps.get(6)?.as_str().to_string(),
    })
}

/// 从 `Content-Disposition` 头中取出 `filename=` 参数（支持带引号与不带引号两种写法）。
/// `filename*=` 扩展参数被忽略。
pub fn extract_filename(content_disposition: &str) -> Option<String> {
    content_disposition
        .split(';')
        .filter_map(|segment| segment.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("filename"))
        .map(|(_, value)| value.trim().trim_matches(|c| c == '"' || c == '\'').to_string())
        .filter(|value| !value.is_empty())
}
