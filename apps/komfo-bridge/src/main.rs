//! Komfovent 桥接服务：寄存器轮询 + 固件检查，可选一次性固件安装。
//!
//! ```text
//! komfo-bridge                                # 持续轮询，后台检查固件
//! komfo-bridge install-firmware               # 存储中的固件较新时上传
//! komfo-bridge install-firmware --reinstall   # 无新版本时也重新上传
//! ```

mod bridge;

use bridge::BridgeHandler;
use domain::FirmwareFamily;
use domain::registers::REG_FIRMWARE;
use komfo_config::AppConfig;
use komfo_firmware::{
    FirmwareChecker, FirmwareCheckerConfig, FirmwareStore, FirmwareUpdater, FirmwareUploader,
    UploaderConfig,
};
use komfo_protocol::{ModbusClient, ModbusTcpConfig, PollOutcome, RegisterPoller};
use komfo_telemetry::{init_tracing, metrics};
use std::sync::Arc;
use tracing::{info, warn};

/// 命令行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Install { reinstall: bool },
}

impl Command {
    fn parse(args: impl IntoIterator<Item = String>) -> Result<Self, String> {
        let args: Vec<String> = args.into_iter().collect();
        match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
            [] => Ok(Self::Run),
            ["install-firmware"] => Ok(Self::Install { reinstall: false }),
            ["install-firmware", "--reinstall"] => Ok(Self::Install { reinstall: true }),
            other => Err(format!("unrecognized arguments: {}", other.join(" "))),
        }
    }
}

/// 已安装版本未知时交给安装器报告；已知且无新版本时只在显式重装时继续。
fn should_install(update_available: Option<bool>, reinstall: bool) -> bool {
    update_available.unwrap_or(true) || reinstall
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    // 从环境变量加载运行配置
    let config = AppConfig::from_env()?;
    // 初始化结构化日志
    init_tracing();
    let command = Command::parse(std::env::args().skip(1))?;

    let client = Arc::new(ModbusClient::new(modbus_config(&config)));
    match client.connect().await {
        Ok(()) => info!(host = %config.host, port = config.port, "connected to device"),
        Err(e) => warn!(
            host = %config.host,
            port = config.port,
            error = %e,
            "initial connect failed, polling will keep retrying"
        ),
    }

    let poller = Arc::new(RegisterPoller::new(client.clone()));
    let store = Arc::new(FirmwareStore::open(&config.firmware_dir).await?);

    let result = match command {
        Command::Run => run(&config, store, poller).await,
        Command::Install { reinstall } => install_firmware(&config, store, poller, reinstall).await,
    };

    client.close().await;
    let snapshot = metrics().snapshot();
    info!(
        polls_ok = snapshot.poll_success,
        polls_failed = snapshot.poll_failure,
        firmware_downloads = snapshot.firmware_downloaded,
        "bridge stopped"
    );
    result
}

async fn run(
    config: &AppConfig,
    store: Arc<FirmwareStore>,
    poller: Arc<RegisterPoller>,
) -> Result<(), Box<dyn std::error::Error>> {
    // 固件检查器（全局单例，由轮询结果登记控制器类型）
    let checker = if config.firmware_check_enabled {
        let checker = Arc::new(FirmwareChecker::new(checker_config(config), store)?);
        checker.start();
        Some(checker)
    } else {
        info!("firmware check disabled");
        None
    };

    let handler = Arc::new(BridgeHandler::new(checker.clone()));
    tokio::select! {
        _ = poller.run(handler.clone()) => {}
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
            info!("shutdown requested");
        }
    }

    if let Some(values) = handler.latest() {
        info!(registers = values.len(), "last known device state retained");
    }
    handler.release();
    if let Some(checker) = checker {
        checker.stop();
    }
    Ok(())
}

async fn install_firmware(
    config: &AppConfig,
    store: Arc<FirmwareStore>,
    poller: Arc<RegisterPoller>,
    reinstall: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let installed_raw = match poller.poll().await? {
        PollOutcome::Updated(values) => values
            .get(&REG_FIRMWARE)
            .and_then(|raw| u32::try_from(*raw).ok()),
        PollOutcome::Suspended { .. } => None,
    };

    let mut uploader_config = UploaderConfig::new(config.host.clone());
    uploader_config.username = config.web_username.clone();
    uploader_config.password = config.web_password.clone();
    let uploader = FirmwareUploader::new(uploader_config)?;
    let updater = FirmwareUpdater::new(store, uploader, poller);

    let update_available = match installed_raw {
        Some(raw) => Some(updater.update_available(raw).await),
        None => None,
    };
    if !should_install(update_available, reinstall) {
        info!("no newer firmware available, pass --reinstall to upload anyway");
        return Ok(());
    }
    if update_available == Some(false) {
        info!("no newer firmware available, reinstalling stored firmware");
    }
    let report = updater.install(installed_raw).await?;
    info!(
        filename = %report.filename,
        bytes = report.bytes,
        logged_out = report.logged_out,
        "firmware installed"
    );
    Ok(())
}

fn modbus_config(config: &AppConfig) -> ModbusTcpConfig {
    ModbusTcpConfig {
        host: config.host.clone(),
        port: config.port,
        slave_id: config.slave_id,
        poll_interval_ms: config.poll_interval_seconds.saturating_mul(1000),
        connect_timeout_ms: config.connect_timeout_ms,
        request_timeout_ms: config.request_timeout_ms,
        retries: config.retries,
        retry_delay_ms: config.retry_delay_ms,
        reconnect_delay_ms: config.reconnect_delay_ms,
        reconnect_delay_max_ms: config.reconnect_delay_max_ms,
    }
}

fn checker_config(config: &AppConfig) -> FirmwareCheckerConfig {
    let checker = FirmwareCheckerConfig {
        c6_url: config.firmware_url_c6.clone(),
        c8_url: config.firmware_url_c8.clone(),
        check_interval_secs: config.firmware_check_interval_hours.saturating_mul(3600),
        ..FirmwareCheckerConfig::default()
    };
    for family in FirmwareFamily::ALL {
        if checker.url_for(family).is_none() {
            warn!(family = %family, "no firmware url configured, family will not be checked");
        }
    }
    checker
}
