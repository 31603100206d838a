//! End-to-end scenarios driven through the public API with the mock SDKs

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::broadcast;

use rtc_harness_core::activity::ActivityLog;
use rtc_harness_core::mock::{MockClientFactory, MockRtcCall, MockRtcClient};
use rtc_harness_core::profile::{
    merge_over_defaults, ClientOptions, FileStorage, KeyValueStorage, MemoryStorage,
    ProfileStore, SimpleUserClientOptions, CLIENT_OPTIONS_KEY,
};
use rtc_harness_core::sdk::{DeviceEvent, RtcCall, RtcClientEvent, SipCallEvent};
use rtc_harness_core::tracker::CallStatusChange;
use rtc_harness_core::{
    select_view, CallDirection, CallStatus, CallTracker, CallView, ClientMode,
    ConnectionStatus, Harness, HarnessConfig, Notifier,
};

const LIFECYCLE: [&str; 5] = ["socket.open", "ready", "error", "socket.close", "socket.error"];

fn lifecycle_event(name: &str) -> RtcClientEvent {
    match name {
        "socket.open" => RtcClientEvent::SocketOpen,
        "ready" => RtcClientEvent::Ready,
        "error" => RtcClientEvent::Error {
            message: "auth failed".to_string(),
        },
        "socket.close" => RtcClientEvent::SocketClose,
        _ => RtcClientEvent::SocketError {
            message: "reset".to_string(),
        },
    }
}

fn sequences(alphabet: &[&'static str], max_len: usize) -> Vec<Vec<&'static str>> {
    let mut all = vec![Vec::new()];
    let mut frontier = vec![Vec::new()];
    for _ in 0..max_len {
        let mut next = Vec::new();
        for prefix in &frontier {
            for item in alphabet {
                let mut sequence: Vec<&'static str> = prefix.clone();
                sequence.push(*item);
                next.push(sequence);
            }
        }
        all.extend(next.iter().cloned());
        frontier = next;
    }
    all
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("rtc_harness_core=debug")
        .with_test_writer()
        .try_init();
}

fn harness(reset_delay: Duration) -> (Harness, Arc<MockClientFactory>) {
    init_logging();
    let factory = MockClientFactory::new();
    let harness = Harness::builder()
        .config(HarnessConfig::new().with_reset_delay(reset_delay))
        .factory(factory.clone())
        .build()
        .expect("harness");
    (harness, factory)
}

async fn sdk_harness(reset_delay: Duration) -> (Harness, Arc<MockRtcClient>) {
    let (harness, factory) = harness(reset_delay);
    harness
        .store()
        .set_current_options(&ClientOptions::with_credentials("alice", "secret"))
        .unwrap();
    harness.start().await;
    let client = factory.last_rtc_client().expect("sdk client");
    (harness, client)
}

fn drain(changes: &mut broadcast::Receiver<CallStatusChange>) -> Vec<CallStatusChange> {
    let mut seen = Vec::new();
    while let Ok(change) = changes.try_recv() {
        seen.push(change);
    }
    seen
}

async fn replay(events: &[&str]) -> ConnectionStatus {
    let (harness, client) = sdk_harness(Duration::ZERO).await;
    for name in events {
        client.emit(lifecycle_event(name));
    }
    harness.connection().status()
}

#[tokio::test]
async fn connection_status_is_a_function_of_the_event_sequence() {
    for sequence in sequences(&LIFECYCLE, 3) {
        let first = replay(&sequence).await;
        let second = replay(&sequence).await;
        assert_eq!(first, second, "sequence {sequence:?}");

        match sequence.last() {
            None => assert_eq!(first, ConnectionStatus::Connecting),
            Some(&"ready") => assert_eq!(first, ConnectionStatus::Connected),
            Some(&"socket.open") => assert!(matches!(
                first,
                ConnectionStatus::Registering | ConnectionStatus::Connected
            )),
            Some(_) => assert_eq!(first, ConnectionStatus::Disconnected),
        }
    }
}

#[tokio::test]
async fn without_a_client_nothing_connects() {
    let (harness, factory) = harness(Duration::ZERO);
    harness.start().await;
    assert_eq!(harness.connection().status(), ConnectionStatus::Idle);

    harness.switch_mode(ClientMode::Sipjs).await.unwrap();
    assert_eq!(harness.connection().status(), ConnectionStatus::Idle);

    assert!(factory.rtc_clients().is_empty());
    assert!(factory.sip_devices().is_empty());
}

#[test]
fn call_status_never_skips_connecting() {
    let states = ["ringing", "trying", "active", "held", "hangup"];
    for direction in [CallDirection::Inbound, CallDirection::Outbound] {
        for sequence in sequences(&states, 4) {
            let tracker = CallTracker::new(
                Duration::ZERO,
                Duration::from_millis(500),
                Notifier::default(),
                ActivityLog::default(),
            );
            let mut changes = tracker.subscribe();
            let call = MockRtcCall::new("c1", direction, None);
            for state in &sequence {
                call.set_state(state);
                let handle: Arc<dyn RtcCall> = call.clone();
                tracker.handle_sdk_update(&handle);
            }

            for change in drain(&mut changes) {
                assert!(
                    change.previous.can_transition_to(change.current),
                    "{direction} {sequence:?}: {} -> {}",
                    change.previous,
                    change.current
                );
                assert!(
                    !(change.previous == CallStatus::Incoming
                        && change.current == CallStatus::Connected)
                );
            }
        }
    }
}

#[tokio::test(start_paused = true)]
async fn terminated_call_clears_then_resets() {
    let (harness, factory) = harness(Duration::from_secs(1));
    harness
        .store()
        .set_simple_user_options(&SimpleUserClientOptions::default().with_credentials("1000", "pw"))
        .unwrap();
    harness.switch_mode(ClientMode::Sipjs).await.unwrap();
    let device = factory.last_sip_device().unwrap();
    device.emit(DeviceEvent::WsConnected);

    for last in [
        SipCallEvent::Terminated,
        SipCallEvent::Failed {
            cause: "503".to_string(),
        },
    ] {
        let call = device.incoming_invite(&format!("{last:?}"), "sip:bob@example.com");
        call.emit(SipCallEvent::Accepted);
        call.emit(last);

        assert!(harness.snapshot().call.is_empty());
        assert!(harness.calls().status().is_terminal());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(harness.calls().status(), CallStatus::Idle);
        assert_eq!(harness.current_view(), CallView::None);
    }
}

#[test]
fn idle_call_without_handle_has_no_view() {
    for mode in [ClientMode::Sdk, ClientMode::Sipjs, ClientMode::Aiagent] {
        for connection in [
            ConnectionStatus::Idle,
            ConnectionStatus::Connecting,
            ConnectionStatus::Registering,
            ConnectionStatus::Connected,
            ConnectionStatus::Disconnected,
        ] {
            assert_eq!(
                select_view(mode, connection, CallStatus::Idle, None),
                CallView::None
            );
        }
    }
}

#[test]
fn stored_options_merge_over_defaults() {
    let merged = merge_over_defaults(&json!({"a": 0, "b": 2}), json!({"a": 1}));
    assert_eq!(merged, json!({"a": 1, "b": 2}));

    let storage = Arc::new(MemoryStorage::new());
    storage
        .set(CLIENT_OPTIONS_KEY, r#"{"login":"alice"}"#.to_string())
        .unwrap();
    let defaults = ClientOptions {
        password: "default-secret".to_string(),
        trickle_ice: true,
        ..Default::default()
    };
    let store = ProfileStore::with_defaults(storage, defaults, SimpleUserClientOptions::default());

    let options = store.current_options();
    assert_eq!(options.login, "alice");
    assert_eq!(options.password, "default-secret");
    assert!(options.trickle_ice);
}

#[tokio::test]
async fn connecting_then_ready_is_connected() {
    let (harness, client) = sdk_harness(Duration::ZERO).await;
    assert_eq!(harness.connection().status(), ConnectionStatus::Connecting);
    client.emit(RtcClientEvent::Ready);
    assert_eq!(harness.connection().status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn outbound_call_ends_then_idles() {
    let (harness, factory) = harness(Duration::from_secs(1));
    harness
        .store()
        .set_simple_user_options(&SimpleUserClientOptions::default().with_credentials("1000", "pw"))
        .unwrap();
    harness.switch_mode(ClientMode::Sipjs).await.unwrap();
    let device = factory.last_sip_device().unwrap();
    device.emit(DeviceEvent::WsConnected);
    let mut changes = harness.calls().subscribe();

    assert!(harness.place_call("2000").is_sent());
    let call = device.last_initiated_call().unwrap();
    call.emit(SipCallEvent::Connecting);
    call.emit(SipCallEvent::Accepted);
    call.emit(SipCallEvent::Terminated);

    let statuses: Vec<CallStatus> = drain(&mut changes).into_iter().map(|c| c.current).collect();
    assert_eq!(
        statuses,
        [
            CallStatus::Dialing,
            CallStatus::Connecting,
            CallStatus::Connected,
            CallStatus::Ended
        ]
    );
    assert!(harness.snapshot().call.is_empty());

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(harness.calls().status(), CallStatus::Idle);
}

#[tokio::test]
async fn rejected_inbound_call_never_connects() {
    let (harness, client) = sdk_harness(Duration::ZERO).await;
    client.emit(RtcClientEvent::Ready);
    let mut changes = harness.calls().subscribe();

    let call = client.incoming_call("c1", "+15550100");
    assert_eq!(harness.current_view(), CallView::IncomingCall);

    assert!(harness.reject().await.is_sent());
    assert_eq!(call.actions(), ["hangup"]);
    client.update_call(&call, "hangup");

    let statuses: Vec<CallStatus> = drain(&mut changes).into_iter().map(|c| c.current).collect();
    assert_eq!(
        statuses,
        [CallStatus::Incoming, CallStatus::Ended, CallStatus::Idle]
    );
    assert!(!statuses.contains(&CallStatus::Connected));
}

#[tokio::test]
async fn first_client_is_silenced_after_a_mode_switch() {
    let (harness, factory) = harness(Duration::ZERO);
    harness
        .store()
        .set_current_options(&ClientOptions::with_credentials("alice", "secret"))
        .unwrap();
    harness
        .store()
        .set_simple_user_options(&SimpleUserClientOptions::default().with_credentials("1000", "pw"))
        .unwrap();

    harness.start().await;
    let first = factory.last_rtc_client().unwrap();
    first.emit(RtcClientEvent::Ready);

    harness.switch_mode(ClientMode::Sipjs).await.unwrap();
    harness.switch_mode(ClientMode::Sdk).await.unwrap();
    let second = factory.last_rtc_client().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(harness.connection().status(), ConnectionStatus::Connecting);

    first.emit(RtcClientEvent::Ready);
    first.incoming_call("stale", "+15550199");
    first.emit(RtcClientEvent::SocketClose);
    assert_eq!(harness.connection().status(), ConnectionStatus::Connecting);
    assert_eq!(harness.calls().status(), CallStatus::Idle);

    second.emit(RtcClientEvent::Ready);
    second.incoming_call("fresh", "+15550100");
    assert_eq!(harness.calls().current_call_id().as_deref(), Some("fresh"));
}

#[tokio::test]
async fn settings_survive_a_restart_with_file_storage() {
    let path = std::env::temp_dir()
        .join(format!("rtc-harness-{}", uuid::Uuid::new_v4()))
        .join("storage.json");

    {
        let storage = Arc::new(FileStorage::open(&path).unwrap());
        let factory = MockClientFactory::new();
        let harness = Harness::builder()
            .storage(storage)
            .factory(factory)
            .build()
            .unwrap();
        harness.switch_mode(ClientMode::Aiagent).await.unwrap();
        harness
            .store()
            .save_profile(&ClientOptions::with_credentials("alice", "secret"))
            .unwrap();
    }

    let storage = Arc::new(FileStorage::open(&path).unwrap());
    let store = ProfileStore::new(storage);
    assert_eq!(store.client_mode(), ClientMode::Aiagent);
    assert_eq!(store.profiles().len(), 1);

    if let Some(dir) = path.parent() {
        let _ = std::fs::remove_dir_all(dir);
    }
}
