//! Modbus 传输层抽象
//!
//! 客户端只依赖 [`RegisterTransport`]，真实设备由 tokio-modbus 实现，
//! 测试中可替换为内存实现。地址均为线上 0 基地址。

use crate::error::ProtocolError;
use async_trait::async_trait;
use std::net::SocketAddr;
use tokio_modbus::prelude::*;
use tracing::debug;

/// 已建立的寄存器传输连接。
#[async_trait]
pub trait RegisterTransport: Send {
    /// 功能码 3：读保持寄存器。
    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ProtocolError>;

    /// 功能码 6：写单个寄存器。
    async fn write_single_register(&mut self, address: u16, value: u16)
        -> Result<(), ProtocolError>;

    /// 功能码 16：写多个寄存器。
    async fn write_multiple_registers(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> Result<(), ProtocolError>;

    /// 关闭连接。
    async fn disconnect(&mut self) -> Result<(), ProtocolError>;
}

/// 建立传输连接的工厂（断线后按需重连）。
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn RegisterTransport>, ProtocolError>;

    /// 日志中使用的端点描述。
    fn endpoint(&self) -> String;
}

/// 基于 tokio-modbus 的 TCP 连接工厂。
pub struct TokioModbusConnector {
    host: String,
    port: u16,
    slave_id: u8,
}

impl TokioModbusConnector {
    pub fn new(host: impl Into<String>, port: u16, slave_id: u8) -> Self {
        Self {
            host: host.into(),
            port,
            slave_id,
        }
    }

    async fn resolve(&self) -> Result<SocketAddr, ProtocolError> {
        tokio::net::lookup_host((self.host.as_str(), self.port))
            .await?
            .next()
            .ok_or_else(|| {
                ProtocolError::ConfigParse(format!("invalid address: {}", self.endpoint()))
            })
    }
}

#[async_trait]
impl TransportConnector for TokioModbusConnector {
    async fn connect(&self) -> Result<Box<dyn RegisterTransport>, ProtocolError> {
        let addr = self.resolve().await?;
        let ctx = tcp::connect_slave(addr, Slave(self.slave_id))
            .await
            .map_err(|e| ProtocolError::Connection(format!("{}: {}", addr, e)))?;
        debug!(%addr, slave = self.slave_id, "modbus tcp connection established");
        Ok(Box::new(TokioModbusTransport { ctx }))
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// tokio-modbus 客户端上下文。
pub struct TokioModbusTransport {
    ctx: tokio_modbus::client::Context,
}

#[async_trait]
impl RegisterTransport for TokioModbusTransport {
    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ProtocolError> {
        self.ctx
            .read_holding_registers(address, count)
            .await
            .map_err(|e| ProtocolError::Modbus(e.to_string()))?
            .map_err(|e| ProtocolError::Exception(e.to_string()))
    }

    async fn write_single_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<(), ProtocolError> {
        self.ctx
            .write_single_register(address, value)
            .await
            .map_err(|e| ProtocolError::Modbus(e.to_string()))?
            .map_err(|e| ProtocolError::Exception(e.to_string()))
    }

    async fn write_multiple_registers(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> Result<(), ProtocolError> {
        self.ctx
            .write_multiple_registers(address, values)
            .await
            .map_err(|e| ProtocolError::Modbus(e.to_string()))?
            .map_err(|e| ProtocolError::Exception(e.to_string()))
    }

    async fn disconnect(&mut self) -> Result<(), ProtocolError> {
        self.ctx.disconnect().await?;
        Ok(())
    }
}
