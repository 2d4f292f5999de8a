//! Komfovent Modbus TCP 客户端
//!
//! 按寄存器位宽表读写逻辑寄存器：
//! - 读取前先按位宽表校验整个区间，再发起一次保持寄存器读
//! - 写入按位宽选择功能码 6（16 位）或 16（32 位，高字在前）
//! - 所有操作在同一把互斥锁下串行执行，绝不交错
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! let client = ModbusClient::new(ModbusTcpConfig::new("192.168.1.100"));
//! client.connect().await?;
//! let values = client.read(REG_SUPPLY_TEMP, 3).await?;
//! client.write(REG_NORMAL_SETPOINT, 215).await?;
//! ```

use crate::decoder::RegisterBlock;
use crate::error::ProtocolError;
use crate::transport::{RegisterTransport, TokioModbusConnector, TransportConnector};
use domain::{classify, wire_address, DecodedRegisterMap, RegisterId, RegisterWidth};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

/// Modbus TCP 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModbusTcpConfig {
    /// 设备主机地址
    pub host: String,
    /// Modbus 端口（默认 502）
    #[serde(default = "default_modbus_port")]
    pub port: u16,
    /// 从站 ID（默认 1）
    #[serde(default = "default_slave_id")]
    pub slave_id: u8,
    /// 轮询间隔（毫秒）
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// 连接超时（毫秒）
    #[serde(default = "default_timeout")]
    pub connect_timeout_ms: u64,
    /// 单次请求超时（毫秒）
    #[serde(default = "default_timeout")]
    pub request_timeout_ms: u64,
    /// 传输失败后的重试次数
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// 请求重试间隔（毫秒）
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// 建连退避起点（毫秒）
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,
    /// 建连退避上限（毫秒）
    #[serde(default = "default_reconnect_delay_max")]
    pub reconnect_delay_max_ms: u64,
}

fn default_modbus_port() -> u16 {
    502
}

fn default_slave_id() -> u8 {
    1
}

fn default_poll_interval() -> u64 {
    30_000
}

fn default_timeout() -> u64 {
    5000
}

fn default_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    500
}

fn default_reconnect_delay() -> u64 {
    5000
}

fn default_reconnect_delay_max() -> u64 {
    60_000
}

impl ModbusTcpConfig {
    /// 使用默认参数创建配置。
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_modbus_port(),
            slave_id: default_slave_id(),
            poll_interval_ms: default_poll_interval(),
            connect_timeout_ms: default_timeout(),
            request_timeout_ms: default_timeout(),
            retries: default_retries(),
            retry_delay_ms: default_retry_delay(),
            reconnect_delay_ms: default_reconnect_delay(),
            reconnect_delay_max_ms: default_reconnect_delay_max(),
        }
    }

    /// 从 JSON 配置字符串解析
    pub fn from_json(json: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(json).map_err(|e| ProtocolError::ConfigParse(e.to_string()))
    }

    fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// 单次线上请求。
enum Request<'a> {
    Read { address: u16, count: u16 },
    WriteSingle { address: u16, value: u16 },
    WriteMultiple { address: u16, values: &'a [u16] },
}

impl fmt::Display for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read { address, count } => write!(f, "read {} words at {}", count, address),
            Self::WriteSingle { address, .. } => write!(f, "write register at {}", address),
            Self::WriteMultiple { address, values } => {
                write!(f, "write {} registers at {}", values.len(), address)
            }
        }
    }
}

/// 连接槽：`open` 由 connect/close 控制，`transport` 在传输失败后被丢弃并按需重建。
struct Connection {
    open: bool,
    transport: Option<Box<dyn RegisterTransport>>,
}

/// 区间内的一个逻辑寄存器及其在响应中的字偏移。
#[derive(Debug, Clone, Copy)]
struct Slot {
    register: RegisterId,
    width: RegisterWidth,
    offset: usize,
}

/// Komfovent Modbus 客户端
pub struct ModbusClient {
    config: ModbusTcpConfig,
    connector: Arc<dyn TransportConnector>,
    connection: Mutex<Connection>,
}

impl ModbusClient {
    /// 创建连接真实设备的客户端
    pub fn new(config: ModbusTcpConfig) -> Self {
        let connector = Arc::new(TokioModbusConnector::new(
            config.host.clone(),
            config.port,
            config.slave_id,
        ));
        Self::with_connector(config, connector)
    }

    /// 使用自定义传输工厂创建客户端
    pub fn with_connector(config: ModbusTcpConfig, connector: Arc<dyn TransportConnector>) -> Self {
        Self {
            config,
            connector,
            connection: Mutex::new(Connection {
                open: false,
                transport: None,
            }),
        }
    }

    pub fn config(&self) -> &ModbusTcpConfig {
        &self.config
    }

    /// 建立连接；失败时按指数退避重试，全部失败返回连接错误。
    ///
    /// 调用后客户端即处于打开状态：首次连接失败时，后续读写会按需重连。
    pub async fn connect(&self) -> Result<(), ProtocolError> {
        let mut connection = self.connection.lock().await;
        if connection.open && connection.transport.is_some() {
            return Ok(());
        }
        connection.open = true;

        let attempts = self.config.retries.saturating_add(1);
        let max_delay = Duration::from_millis(self.config.reconnect_delay_max_ms);
        let mut delay = Duration::from_millis(self.config.reconnect_delay_ms).min(max_delay);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.open_transport().await {
                Ok(transport) => {
                    info!(
                        endpoint = %self.connector.endpoint(),
                        attempt,
                        "connected to komfovent modbus server"
                    );
                    connection.transport = Some(transport);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        endpoint = %self.connector.endpoint(),
                        attempt,
                        error = %e,
                        "modbus connect attempt failed"
                    );
                    last_error = Some(e);
                }
            }
            if attempt < attempts {
                sleep(delay).await;
                delay = (delay * 2).min(max_delay);
            }
        }

        Err(ProtocolError::Connection(format!(
            "failed to connect to {} after {} attempts: {}",
            self.connector.endpoint(),
            attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// 关闭连接（幂等）。
    pub async fn close(&self) {
        let mut connection = self.connection.lock().await;
        connection.open = false;
        if let Some(mut transport) = connection.transport.take() {
            if let Err(e) = transport.disconnect().await {
                debug!(error = %e, "modbus disconnect failed");
            }
            info!(endpoint = %self.connector.endpoint(), "modbus connection closed");
        }
    }

    pub async fn is_connected(&self) -> bool {
        let connection = self.connection.lock().await;
        connection.open && connection.transport.is_some()
    }

    /// 读取 `count` 个字并按位宽表解码。
    ///
    /// 区间布局在任何 IO 之前校验：未分类寄存器返回 `NotImplemented`，
    /// 32 位寄存器的第二个字超出区间返回 `ValueNotRetrieved`。
    pub async fn read(
        &self,
        register: RegisterId,
        count: u16,
    ) -> Result<DecodedRegisterMap, ProtocolError> {
        let layout = plan_read(register, count)?;
        if layout.is_empty() {
            return Ok(DecodedRegisterMap::new());
        }
        let address = wire_address(register).ok_or(ProtocolError::NotImplemented(register))?;

        let words = self
            .execute(Request::Read { address, count })
            .await
            .map_err(|e| e.attribute(register))?;

        let mut values = DecodedRegisterMap::new();
        for slot in layout {
            let end = slot.offset + usize::from(slot.width.word_count());
            let value = words
                .get(slot.offset..end)
                .and_then(|chunk| slot.width.decode(chunk))
                .ok_or(ProtocolError::ValueNotRetrieved(slot.register))?;
            values.insert(slot.register, value);
        }

        debug!(register, count, values = ?values, "read komfovent registers");
        Ok(values)
    }

    /// 按位宽写入一个逻辑寄存器。
    pub async fn write(&self, register: RegisterId, value: i64) -> Result<(), ProtocolError> {
        let width = classify(register).ok_or(ProtocolError::NotImplemented(register))?;
        let words = width
            .encode(value)
            .ok_or(ProtocolError::ValueOutOfRange { register, value })?;
        let address = wire_address(register).ok_or(ProtocolError::NotImplemented(register))?;

        let request = match (width, words.as_slice()) {
            (RegisterWidth::U32, values) => Request::WriteMultiple { address, values },
            (_, [word]) => Request::WriteSingle {
                address,
                value: *word,
            },
            _ => return Err(ProtocolError::ValueOutOfRange { register, value }),
        };

        let result = self
            .execute(request)
            .await
            .map(|_| ())
            .map_err(|e| e.attribute(register));
        komfo_telemetry::record_register_write(result.is_ok());

        match &result {
            Ok(()) => debug!(register, value, "wrote komfovent register"),
            Err(e) => warn!(register, value, error = %e, "failed to write komfovent register"),
        }
        result
    }

    /// 原始块读取（轮询使用，不做位宽校验）。
    pub async fn read_block(
        &self,
        register: RegisterId,
        count: u16,
    ) -> Result<RegisterBlock, ProtocolError> {
        let address = wire_address(register).ok_or(ProtocolError::NotImplemented(register))?;
        let words = self
            .execute(Request::Read { address, count })
            .await
            .map_err(|e| e.attribute(register))?;
        Ok(RegisterBlock::new(register, words))
    }

    /// 在锁内执行请求：传输失败丢弃连接并按固定间隔重试，设备异常不重试。
    async fn execute(&self, request: Request<'_>) -> Result<Vec<u16>, ProtocolError> {
        let mut connection = self.connection.lock().await;
        if !connection.open {
            return Err(ProtocolError::NotConnected);
        }

        let attempts = self.config.retries.saturating_add(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt(&mut connection, &request).await {
                Ok(words) => return Ok(words),
                Err(e) if e.is_transport_failure() => {
                    if let Some(mut transport) = connection.transport.take() {
                        if let Err(e) = transport.disconnect().await {
                            debug!(error = %e, "modbus disconnect failed");
                        }
                    }
                    if attempt >= attempts {
                        return Err(e);
                    }
                    warn!(
                        request = %request,
                        attempt,
                        error = %e,
                        "modbus request failed, retrying"
                    );
                    sleep(Duration::from_millis(self.config.retry_delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn attempt(
        &self,
        connection: &mut Connection,
        request: &Request<'_>,
    ) -> Result<Vec<u16>, ProtocolError> {
        if connection.transport.is_none() {
            connection.transport = Some(self.open_transport().await?);
            debug!(endpoint = %self.connector.endpoint(), "modbus connection re-established");
        }
        let transport = connection
            .transport
            .as_mut()
            .ok_or(ProtocolError::NotConnected)?;

        let pending = async {
            match request {
                Request::Read { address, count } => {
                    transport.read_holding_registers(*address, *count).await
                }
                Request::WriteSingle { address, value } => transport
                    .write_single_register(*address, *value)
                    .await
                    .map(|_| Vec::new()),
                Request::WriteMultiple { address, values } => transport
                    .write_multiple_registers(*address, values)
                    .await
                    .map(|_| Vec::new()),
            }
        };

        let request_timeout = self.config.request_timeout();
        timeout(request_timeout, pending).await.map_err(|_| {
            ProtocolError::Timeout(format!("{} timed out after {:?}", request, request_timeout))
        })?
    }

    async fn open_transport(&self) -> Result<Box<dyn RegisterTransport>, ProtocolError> {
        let connect_timeout = self.config.connect_timeout();
        timeout(connect_timeout, self.connector.connect())
            .await
            .map_err(|_| {
                ProtocolError::Timeout(format!(
                    "connect to {} timed out after {:?}",
                    self.connector.endpoint(),
                    connect_timeout
                ))
            })?
    }
}

/// 按位宽表展开读取区间。
fn plan_read(register: RegisterId, count: u16) -> Result<Vec<Slot>, ProtocolError> {
    let mut layout = Vec::new();
    let mut offset: u16 = 0;
    while offset < count {
        let current = register
            .checked_add(offset)
            .ok_or(ProtocolError::NotImplemented(register))?;
        let width = classify(current).ok_or(ProtocolError::NotImplemented(current))?;
        let words = width.word_count();
        if u32::from(offset) + u32::from(words) > u32::from(count) {
            return Err(ProtocolError::ValueNotRetrieved(current));
        }
        layout.push(Slot {
            register: current,
            width,
            offset: usize::from(offset),
        });
        offset += words;
    }
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::registers::{
        REG_AWAY_FAN_SUPPLY, REG_FIRMWARE, REG_NORMAL_SETPOINT, REG_POWER, REG_SUPPLY_TEMP,
    };

    #[test]
    fn test_parse_config() {
        let json = r#"{"host": "192.168.1.100", "port": 1502}"#;
        let config = ModbusTcpConfig::from_json(json).unwrap();
        assert_eq!(config.host, "192.168.1.100");
        assert_eq!(config.port, 1502);
        assert_eq!(config.slave_id, 1);
        assert_eq!(config.request_timeout_ms, 5000);
        assert_eq!(config.retries, 3);
    }

    #[test]
    fn test_parse_config_rejects_missing_host() {
        let err = ModbusTcpConfig::from_json(r#"{"port": 502}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::ConfigParse(_)));
    }

    #[test]
    fn test_plan_mixed_range() {
        // 902..905 为 S16，906 为 U32
        let layout = plan_read(REG_SUPPLY_TEMP, 6).unwrap();
        let registers: Vec<_> = layout.iter().map(|slot| slot.register).collect();
        assert_eq!(registers, vec![902, 903, 904, 905, 906]);
        assert_eq!(layout[4].offset, 4);
    }

    #[test]
    fn test_plan_rejects_split_u32() {
        let err = plan_read(REG_FIRMWARE, 1).unwrap_err();
        assert!(matches!(err, ProtocolError::ValueNotRetrieved(1000)));
        let err = plan_read(REG_AWAY_FAN_SUPPLY, 3).unwrap_err();
        assert!(matches!(err, ProtocolError::ValueNotRetrieved(102)));
    }

    #[test]
    fn test_plan_rejects_unknown() {
        assert_eq!(plan_read(REG_NORMAL_SETPOINT, 1).unwrap().len(), 1);
        // 1..=34 全部已分类，35 未分类
        assert_eq!(plan_read(REG_POWER, 34).unwrap().len(), 29);
        let err = plan_read(REG_POWER, 40).unwrap_err();
        assert!(matches!(err, ProtocolError::NotImplemented(35)));
    }
}
