//! 寄存器轮询
//!
//! 按固定块读取设备寄存器并合并为一份解码结果。任何一个块失败则整个
//! 周期失败，不把部分数据当作实时数据交给上层。
//!
//! 固件上传后设备会重启，期间通过 [`PollControl::suspend`] 设置冷却期，
//! 冷却期内轮询不访问网络。

use crate::client::ModbusClient;
use crate::decoder::{decode_all, RegisterBlock};
use crate::error::ProtocolError;
use async_trait::async_trait;
use domain::registers::REG_FIRMWARE;
use domain::{ControllerType, ControllerVersion, DecodedRegisterMap, PollControl, RegisterId};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// 轮询块（起始逻辑编号，字数量）。
pub const POLL_BLOCKS: &[(RegisterId, u16)] = &[
    (1, 34),
    (100, 57),
    (200, 17),
    (600, 11),
    (900, 62),
    (1000, 6),
];

/// 单次轮询结果。
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Updated(DecodedRegisterMap),
    Suspended { remaining: Duration },
}

/// 交给上层的轮询事件。
#[derive(Debug, Clone, PartialEq)]
pub enum PollEvent {
    Updated(DecodedRegisterMap),
    Unavailable(String),
}

/// 轮询事件处理器
#[async_trait]
pub trait PollHandler: Send + Sync {
    async fn handle(&self, event: PollEvent);
}

/// 寄存器轮询器
pub struct RegisterPoller {
    client: Arc<ModbusClient>,
    interval: Duration,
    cooldown_until: Mutex<Option<Instant>>,
}

impl RegisterPoller {
    pub fn new(client: Arc<ModbusClient>) -> Self {
        let interval = Duration::from_millis(client.config().poll_interval_ms);
        Self::with_interval(client, interval)
    }

    pub fn with_interval(client: Arc<ModbusClient>, interval: Duration) -> Self {
        Self {
            client,
            interval,
            cooldown_until: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &Arc<ModbusClient> {
        &self.client
    }

    /// 冷却期剩余时间；不在冷却期返回 `None`。
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let mut cooldown = self
            .cooldown_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match *cooldown {
            Some(until) => {
                let now = Instant::now();
                if until > now {
                    Some(until - now)
                } else {
                    *cooldown = None;
                    None
                }
            }
            None => None,
        }
    }

    /// 读取全部轮询块并合并解码。
    pub async fn poll(&self) -> Result<PollOutcome, ProtocolError> {
        if let Some(remaining) = self.cooldown_remaining() {
            debug!(remaining_secs = remaining.as_secs(), "polling suspended");
            return Ok(PollOutcome::Suspended { remaining });
        }

        let mut blocks: Vec<RegisterBlock> = Vec::with_capacity(POLL_BLOCKS.len());
        for (start, count) in POLL_BLOCKS {
            let block = self.client.read_block(*start, *count).await?;
            blocks.push(block);
        }
        let values = decode_all(&blocks);
        debug!(registers = values.len(), "poll cycle completed");
        Ok(PollOutcome::Updated(values))
    }

    /// 轮询循环：按间隔执行并把结果交给处理器，冷却期内不产生事件。
    pub async fn run(&self, handler: Arc<dyn PollHandler>) {
        info!(interval_secs = self.interval.as_secs(), "starting register poller");
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.poll().await {
                Ok(PollOutcome::Updated(values)) => {
                    komfo_telemetry::record_poll(true);
                    handler.handle(PollEvent::Updated(values)).await;
                }
                Ok(PollOutcome::Suspended { .. }) => {}
                Err(e) => {
                    komfo_telemetry::record_poll(false);
                    warn!(error = %e, "poll cycle failed, marking device unavailable");
                    handler.handle(PollEvent::Unavailable(e.to_string())).await;
                }
            }
        }
    }
}

impl PollControl for RegisterPoller {
    fn suspend(&self, duration: Duration) {
        let until = Instant::now() + duration;
        let mut cooldown = self
            .cooldown_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *cooldown = Some(until);
        info!(secs = duration.as_secs(), "polling suspended");
    }

    fn resume(&self) {
        let mut cooldown = self
            .cooldown_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if cooldown.take().is_some() {
            info!("polling resumed");
        }
    }
}

/// 从解码结果读取已安装的控制器版本（寄存器 1000）。
pub fn installed_version(values: &DecodedRegisterMap) -> Option<ControllerVersion> {
    values
        .get(&REG_FIRMWARE)
        .and_then(|raw| u32::try_from(*raw).ok())
        .map(ControllerVersion::from_raw)
}

/// 从解码结果读取控制器类型。
pub fn controller_type(values: &DecodedRegisterMap) -> Option<ControllerType> {
    installed_version(values).map(|version| version.controller)
}
