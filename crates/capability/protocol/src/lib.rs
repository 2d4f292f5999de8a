//! # Komfovent 协议通信模块
//!
//! 通过 Modbus TCP 读写 Komfovent 通风机组的逻辑寄存器：
//! - **ModbusClient**：按位宽表读写寄存器，连接独占、操作串行
//! - **decoder**：把原始寄存器块还原为逻辑寄存器值
//! - **RegisterPoller**：固定块轮询，支持重启冷却期
//!
//! ## 架构设计
//!
//! ```text
//! RegisterPoller ──read_block──▶ ModbusClient ──▶ RegisterTransport (tokio-modbus)
//!       │                            ▲
//!       ▼                            │ write(register, value)
//! decoder::decode_all               host
//!       │
//!       ▼
//! PollHandler (Updated / Unavailable)
//! ```
//!
//! ## 配置格式
//!
//! ```json
//! { "host": "192.168.1.100", "port": 502, "slave_id": 1, "request_timeout_ms": 5000 }
//! ```

mod client;
mod decoder;
mod error;
mod poller;
mod transport;

pub use client::{ModbusClient, ModbusTcpConfig};
pub use decoder::{decode, decode_all, RegisterBlock};
pub use error::ProtocolError;
pub use poller::{
    controller_type, installed_version, PollEvent, PollHandler, PollOutcome, RegisterPoller,
    POLL_BLOCKS,
};
pub use transport::{
    RegisterTransport, TokioModbusConnector, TokioModbusTransport, TransportConnector,
};
