//! 协议错误类型定义

use domain::RegisterId;

/// 协议通信错误
///
/// 连接、读取、写入共用一个错误类型；调用方按变体区分。
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 连接错误（设备不可达）
    #[error("connection error: {0}")]
    Connection(String),

    /// 超时错误
    #[error("timeout: {0}")]
    Timeout(String),

    /// 未建立连接或已关闭
    #[error("not connected")]
    NotConnected,

    /// 寄存器不在任何位宽表中
    #[error("register {0} not found")]
    NotImplemented(RegisterId),

    /// 32 位寄存器缺少第二个字
    #[error("register {0} value not retrieved")]
    ValueNotRetrieved(RegisterId),

    /// 设备返回异常响应
    #[error("device rejected register {register}: {reason}")]
    DeviceRejected { register: RegisterId, reason: String },

    /// 写入值超出寄存器位宽
    #[error("value {value} out of range for register {register}")]
    ValueOutOfRange { register: RegisterId, value: i64 },

    /// 设备异常码（尚未归属到具体寄存器）
    #[error("device exception: {0}")]
    Exception(String),

    /// Modbus 传输错误
    #[error("modbus error: {0}")]
    Modbus(String),

    /// IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 配置解析错误
    #[error("config parse error: {0}")]
    ConfigParse(String),
}

impl ProtocolError {
    /// 传输层故障：丢弃连接后可重试。设备异常与参数错误不重试。
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::Modbus(_) | Self::Io(_)
        )
    }

    /// 将设备异常归属到寄存器。
    pub(crate) fn attribute(self, register: RegisterId) -> Self {
        match self {
            Self::Exception(reason) => Self::DeviceRejected { register, reason },
            other => other,
        }
    }
}
