mod common;

use async_trait::async_trait;
use common::{test_config, Call, FakeDevice};
use domain::registers::{REG_FIRMWARE, REG_OUTDOOR_TEMP, REG_POWER};
use domain::{ControllerType, PollControl};
use komfo_protocol::{
    controller_type, installed_version, ModbusClient, PollEvent, PollHandler, PollOutcome,
    ProtocolError, RegisterPoller, POLL_BLOCKS,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

async fn poller_for(device: &FakeDevice) -> RegisterPoller {
    let client = Arc::new(ModbusClient::with_connector(
        test_config(),
        device.connector(),
    ));
    client.connect().await.expect("connect");
    RegisterPoller::with_interval(client, Duration::from_secs(30))
}

fn seed(device: &FakeDevice) {
    device.set_word(0, 1);
    device.set_word(903, (-52i16) as u16);
    // 289542195 = 0x11421033
    device.set_word(999, 0x1142);
    device.set_word(1000, 0x1033);
}

#[tokio::test]
async fn poll_reads_every_block_and_merges() {
    let device = FakeDevice::new();
    seed(&device);
    let poller = poller_for(&device).await;

    let values = match poller.poll().await.expect("poll") {
        PollOutcome::Updated(values) => values,
        other => panic!("unexpected outcome: {other:?}"),
    };

    assert_eq!(values.get(&REG_POWER), Some(&1));
    assert_eq!(values.get(&REG_OUTDOOR_TEMP), Some(&-52));
    assert_eq!(values.get(&REG_FIRMWARE), Some(&289_542_195));
    assert_eq!(controller_type(&values), Some(ControllerType::C6M));
    assert_eq!(
        installed_version(&values).map(|v| v.to_string()),
        Some("1.4.33.51".to_string())
    );

    let reads: Vec<Call> = POLL_BLOCKS
        .iter()
        .map(|(start, count)| Call::Read {
            address: start - 1,
            count: *count,
        })
        .collect();
    assert_eq!(device.calls(), reads);
}

#[tokio::test]
async fn block_failure_fails_whole_cycle() {
    let device = FakeDevice::new();
    device.update(|state| state.reject_reads_at = Some(899));
    let poller = poller_for(&device).await;

    let err = poller.poll().await.unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::DeviceRejected { register: 900, .. }
    ));
}

#[tokio::test]
async fn cooldown_skips_network() {
    let device = FakeDevice::new();
    let poller = poller_for(&device).await;

    poller.suspend(Duration::from_secs(120));
    match poller.poll().await.expect("poll") {
        PollOutcome::Suspended { remaining } => assert!(remaining <= Duration::from_secs(120)),
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert!(device.calls().is_empty());

    poller.resume();
    assert!(matches!(
        poller.poll().await.expect("poll"),
        PollOutcome::Updated(_)
    ));
}

#[tokio::test(start_paused = true)]
async fn cooldown_expires() {
    let device = FakeDevice::new();
    let poller = poller_for(&device).await;

    poller.suspend(Duration::from_secs(5));
    assert!(poller.cooldown_remaining().is_some());
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert!(poller.cooldown_remaining().is_none());
}

struct ChannelHandler {
    tx: mpsc::UnboundedSender<PollEvent>,
}

#[async_trait]
impl PollHandler for ChannelHandler {
    async fn handle(&self, event: PollEvent) {
        let _ = self.tx.send(event);
    }
}

#[tokio::test(start_paused = true)]
async fn run_delivers_updates_and_unavailability() {
    let device = FakeDevice::new();
    seed(&device);
    let poller = Arc::new(poller_for(&device).await);
    let (tx, mut rx) = mpsc::unbounded_channel();

    let task = {
        let poller = poller.clone();
        tokio::spawn(async move { poller.run(Arc::new(ChannelHandler { tx })).await })
    };

    match rx.recv().await.expect("first event") {
        PollEvent::Updated(values) => assert_eq!(values.get(&REG_POWER), Some(&1)),
        other => panic!("unexpected event: {other:?}"),
    }

    device.update(|state| state.reject_reads_at = Some(0));
    match rx.recv().await.expect("second event") {
        PollEvent::Unavailable(reason) => assert!(reason.contains("register 1")),
        other => panic!("unexpected event: {other:?}"),
    }

    task.abort();
}

#[tokio::test(start_paused = true)]
async fn poll_recovers_after_failed_initial_connect() {
    let device = FakeDevice::new();
    seed(&device);
    // test_config: retries = 3，每次连接/请求最多尝试 4 次
    device.update(|state| state.refuse_connects = 8);
    let client = Arc::new(ModbusClient::with_connector(
        test_config(),
        device.connector(),
    ));
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, ProtocolError::Connection(_)));
    assert!(!client.is_connected().await);

    let poller = RegisterPoller::with_interval(client.clone(), Duration::from_secs(30));
    let err = poller.poll().await.unwrap_err();
    assert!(matches!(err, ProtocolError::Connection(_)));
    assert_eq!(device.connects(), 0);

    let values = match poller.poll().await.expect("poll after device is reachable") {
        PollOutcome::Updated(values) => values,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(values.get(&REG_FIRMWARE), Some(&289_542_195));
    assert_eq!(device.connects(), 1);
    assert!(client.is_connected().await);
}
