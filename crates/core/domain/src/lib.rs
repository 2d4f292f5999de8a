//! Komfovent 领域模型：寄存器表、控制器类型与固件版本。
//!
//! 所有 capability crate 共享这里的类型：
//! - [`registers`]：寄存器编号、位宽分类与线上地址换算
//! - [`controller`]：控制器类型与固件系列
//! - [`version`]：固件版本（控制器 / 面板）
//! - [`PollControl`]：暂停轮询的抽象（固件升级重启窗口使用）

pub mod controller;
pub mod registers;
pub mod version;

pub use controller::{ControllerType, FirmwareFamily};
pub use registers::{RegisterId, RegisterWidth, classify, wire_address};
pub use version::{ControllerVersion, FIRMWARE_MIN_SUPPORTED_VERSION, PanelVersion};

use std::time::Duration;

/// 解码后的寄存器值：逻辑寄存器编号 -> 原生整数。
pub type DecodedRegisterMap = std::collections::BTreeMap<RegisterId, i64>;

/// 轮询控制：设备重启期间暂停寄存器轮询。
pub trait PollControl: Send + Sync {
    /// 在 `duration` 内暂停轮询。
    fn suspend(&self, duration: Duration);

    /// 立即恢复轮询。
    fn resume(&self);
}
