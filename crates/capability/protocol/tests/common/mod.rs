//! 内存中的 Modbus 设备，记录所有线上调用。

#![allow(dead_code)]

use async_trait::async_trait;
use komfo_protocol::{ModbusTcpConfig, ProtocolError, RegisterTransport, TransportConnector};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Read { address: u16, count: u16 },
    WriteSingle { address: u16, value: u16 },
    WriteMultiple { address: u16, values: Vec<u16> },
}

#[derive(Default)]
pub struct DeviceState {
    /// 线上地址 -> 字
    pub words: HashMap<u16, u16>,
    pub calls: Vec<Call>,
    pub connects: usize,
    pub refuse_connects: usize,
    pub fail_next_requests: usize,
    pub hang_requests: bool,
    pub truncate_reads: bool,
    pub reject_writes: Option<String>,
    pub reject_reads_at: Option<u16>,
    pub active: usize,
    pub overlapped: bool,
}

#[derive(Clone, Default)]
pub struct FakeDevice {
    pub state: Arc<Mutex<DeviceState>>,
    pub latency: Duration,
}

impl FakeDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency,
            ..Self::default()
        }
    }

    pub fn set_word(&self, address: u16, value: u16) {
        self.state.lock().unwrap().words.insert(address, value);
    }

    pub fn update(&self, apply: impl FnOnce(&mut DeviceState)) {
        apply(&mut self.state.lock().unwrap());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn connects(&self) -> usize {
        self.state.lock().unwrap().connects
    }

    pub fn overlapped(&self) -> bool {
        self.state.lock().unwrap().overlapped
    }

    pub fn connector(&self) -> Arc<dyn TransportConnector> {
        Arc::new(self.clone())
    }
}

pub fn test_config() -> ModbusTcpConfig {
    let mut config = ModbusTcpConfig::new("fake-device");
    config.retry_delay_ms = 10;
    config.reconnect_delay_ms = 10;
    config.reconnect_delay_max_ms = 40;
    config
}

#[async_trait]
impl TransportConnector for FakeDevice {
    async fn connect(&self) -> Result<Box<dyn RegisterTransport>, ProtocolError> {
        let mut state = self.state.lock().unwrap();
        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            return Err(ProtocolError::Connection("connection refused".to_string()));
        }
        state.connects += 1;
        Ok(Box::new(FakeTransport {
            device: self.clone(),
        }))
    }

    fn endpoint(&self) -> String {
        "fake-device:502".to_string()
    }
}

struct FakeTransport {
    device: FakeDevice,
}

impl FakeTransport {
    async fn enter(&self, call: Call) -> Result<(), ProtocolError> {
        let hang = {
            let mut state = self.device.state.lock().unwrap();
            state.active += 1;
            if state.active > 1 {
                state.overlapped = true;
            }
            state.calls.push(call);
            state.hang_requests
        };
        if hang {
            std::future::pending::<()>().await;
        }
        if !self.device.latency.is_zero() {
            tokio::time::sleep(self.device.latency).await;
        }
        let mut state = self.device.state.lock().unwrap();
        state.active -= 1;
        if state.fail_next_requests > 0 {
            state.fail_next_requests -= 1;
            return Err(ProtocolError::Modbus("broken pipe".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RegisterTransport for FakeTransport {
    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, ProtocolError> {
        self.enter(Call::Read { address, count }).await?;
        let state = self.device.state.lock().unwrap();
        if state.reject_reads_at == Some(address) {
            return Err(ProtocolError::Exception("IllegalDataAddress".to_string()));
        }
        let count = if state.truncate_reads {
            count.saturating_sub(1)
        } else {
            count
        };
        Ok((0..count)
            .map(|offset| state.words.get(&(address + offset)).copied().unwrap_or(0))
            .collect())
    }

    async fn write_single_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<(), ProtocolError> {
        self.enter(Call::WriteSingle { address, value }).await?;
        let mut state = self.device.state.lock().unwrap();
        if let Some(reason) = state.reject_writes.clone() {
            return Err(ProtocolError::Exception(reason));
        }
        state.words.insert(address, value);
        Ok(())
    }

    async fn write_multiple_registers(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> Result<(), ProtocolError> {
        self.enter(Call::WriteMultiple {
            address,
            values: values.to_vec(),
        })
        .await?;
        let mut state = self.device.state.lock().unwrap();
        if let Some(reason) = state.reject_writes.clone() {
            return Err(ProtocolError::Exception(reason));
        }
        for (offset, value) in values.iter().enumerate() {
            state.words.insert(address + offset as u16, *value);
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }
}
