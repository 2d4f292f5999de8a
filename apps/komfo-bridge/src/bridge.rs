//! 轮询事件处理：记录设备状态，并把控制器类型登记到固件检查器。

use async_trait::async_trait;
use domain::{ControllerType, DecodedRegisterMap};
use komfo_firmware::FirmwareChecker;
use komfo_protocol::{PollEvent, PollHandler, controller_type, installed_version};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

pub struct BridgeHandler {
    checker: Option<Arc<FirmwareChecker>>,
    registered: Mutex<Option<ControllerType>>,
    latest: Mutex<Option<DecodedRegisterMap>>,
}

impl BridgeHandler {
    pub fn new(checker: Option<Arc<FirmwareChecker>>) -> Self {
        Self {
            checker,
            registered: Mutex::new(None),
            latest: Mutex::new(None),
        }
    }

    /// 最近一次成功轮询的结果。
    pub fn latest(&self) -> Option<DecodedRegisterMap> {
        self.latest
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// 控制器类型变化时更新固件检查器的登记。
    fn track_controller(&self, controller: ControllerType) {
        let Some(checker) = &self.checker else {
            return;
        };
        let mut registered = self
            .registered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if *registered == Some(controller) {
            return;
        }
        if let Some(previous) = registered.replace(controller) {
            checker.unregister_controller(previous);
        }
        checker.register_controller(controller);

        // 新登记的系列立即检查一次，不等下一个检查周期
        let checker = Arc::clone(checker);
        tokio::spawn(async move {
            checker.check_for_updates().await;
        });
    }

    /// 进程退出前注销登记。
    pub fn release(&self) {
        let mut registered = self
            .registered
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let (Some(checker), Some(controller)) = (&self.checker, registered.take()) {
            checker.unregister_controller(controller);
        }
    }
}

#[async_trait]
impl PollHandler for BridgeHandler {
    async fn handle(&self, event: PollEvent) {
        match event {
            PollEvent::Updated(values) => {
                match installed_version(&values) {
                    Some(version) => debug!(
                        registers = values.len(),
                        controller = %version.controller,
                        firmware = %version,
                        "device state updated"
                    ),
                    None => debug!(registers = values.len(), "device state updated"),
                }
                if let Some(controller) = controller_type(&values) {
                    self.track_controller(controller);
                }
                let mut latest = self
                    .latest
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if latest.is_none() {
                    info!("device available");
                }
                *latest = Some(values);
            }
            PollEvent::Unavailable(reason) => {
                warn!(reason = %reason, "device unavailable");
                *self
                    .latest
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
            }
        }
    }
}
