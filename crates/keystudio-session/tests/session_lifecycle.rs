//! Integration tests for the device session lifecycle.
//!
//! These tests drive `DeviceSession` through its public API against the
//! in-memory gateway, the same way the runner does.  They verify:
//!
//! - The staged → applied → committed flow and the dirty flag.
//! - The busy rule: overlapping mutating calls are skipped, `stop_all` is not.
//! - Status refresh: one reopen on a retryable failure, teardown when the
//!   reopen fails too, no retry for fatal errors.
//! - Direct-keymap (VIA) translation and keycode writes.
//! - Device polling around unplugs and drags.

use std::sync::Arc;

use keystudio_core::keycode::{CatalogId, CatalogRegistry, OsProfile};
use keystudio_core::profile::{Binding, DeviceMode, Sequence};
use keystudio_session::application::device_list::PLACEHOLDER_NAME;
use keystudio_session::application::error::DISCONNECTED_MESSAGE;
use keystudio_session::application::{
    DeviceSession, GatewayError, InteractionMonitor, Phase, SessionError,
};
use keystudio_session::infrastructure::gateway::{demo_layout, DeviceFixture, InMemoryGateway};
use tokio_test::{assert_err, assert_ok};

// ── Helpers ───────────────────────────────────────────────────────────────────

const DEMO: &str = "demo-pad";

fn catalogs() -> Arc<CatalogRegistry> {
    Arc::new(CatalogRegistry::new(CatalogId::Default, OsProfile::Default).expect("bundled catalog"))
}

fn session_over(gateway: &Arc<InMemoryGateway>) -> DeviceSession {
    DeviceSession::new(gateway.clone(), catalogs())
}

async fn connected_demo() -> (Arc<InMemoryGateway>, DeviceSession) {
    let gateway = Arc::new(InMemoryGateway::with_demo_device());
    let session = session_over(&gateway);
    let connected = session.connect(Some(DEMO)).await.expect("connect");
    assert!(connected);
    (gateway, session)
}

fn key_a() -> Binding {
    Binding::simple("KEY_A", None)
}

// ── Staged / applied / committed ──────────────────────────────────────────────

#[tokio::test]
async fn test_stage_apply_commit_updates_dirty_flag() {
    // Arrange
    let (_gateway, session) = connected_demo().await;
    assert!(!session.is_dirty(), "fresh session must be clean");

    // Act / Assert: staging makes the session dirty.
    let staged = session.stage_binding(0, "key:0,0", key_a()).await;
    assert!(matches!(staged, Ok(true)));
    assert!(session.is_dirty());
    assert_eq!(session.last_success().as_deref(), Some("Binding updated"));

    // Applying to RAM brings applied in line with staged.
    assert!(matches!(session.apply_to_ram().await, Ok(true)));
    assert!(!session.is_dirty());
    assert!(session.sync_status().ram_loaded);

    // Commit writes flash and bumps the revision.
    assert!(matches!(session.commit().await, Ok(true)));
    let status = session.sync_status();
    assert!(!status.dirty);
    assert_eq!(status.committed.and_then(|s| s.revision), Some(2));
    assert_eq!(session.phase(), Phase::Connected);
}

#[tokio::test]
async fn test_connect_while_connected_keeps_open_session() {
    // Arrange
    let (gateway, session) = connected_demo().await;
    session
        .stage_binding(0, "key:0,0", key_a())
        .await
        .expect("stage");
    let before = session.state().expect("connected");

    // Act
    let result = session.connect(Some(DEMO)).await;

    // Assert
    assert!(matches!(result, Ok(false)));
    assert_eq!(gateway.call_count("open_session"), 1);
    assert_eq!(gateway.call_count("close_session"), 0);
    assert_eq!(gateway.open_session_count(DEMO), 1);
    let after = session.state().expect("still connected");
    assert_eq!(after.session_id, before.session_id);
    assert!(session.is_dirty(), "staged edits must survive");
    assert_eq!(session.phase(), Phase::Connected);
}

#[tokio::test]
async fn test_revert_discards_staged_edits() {
    let (_gateway, session) = connected_demo().await;
    session
        .stage_binding(0, "key:0,1", key_a())
        .await
        .expect("stage");
    assert!(session.is_dirty());

    assert!(matches!(session.revert_ram().await, Ok(true)));

    assert!(!session.is_dirty());
}

#[tokio::test]
async fn test_committed_bindings_survive_reconnect() {
    // Arrange
    let (_gateway, session) = connected_demo().await;
    session
        .stage_binding(0, "key:1,1", key_a())
        .await
        .expect("stage");
    session.commit().await.expect("commit");

    // Act
    assert!(session.disconnect().await);
    session.connect(Some(DEMO)).await.expect("reconnect");

    // Assert
    let state = session.state().expect("connected");
    assert_eq!(state.profile.binding(0, "key:1,1"), Some(&key_a()));
    assert!(!session.is_dirty());
}

#[tokio::test]
async fn test_failed_apply_leaves_state_and_releases_busy() {
    // Arrange
    let (gateway, session) = connected_demo().await;
    session
        .stage_binding(0, "key:0,0", key_a())
        .await
        .expect("stage");
    gateway.fail_next("apply_to_ram", GatewayError::retryable("E_IO", "timeout"));

    // Act
    let result = session.apply_to_ram().await;

    // Assert
    assert!(matches!(result, Err(SessionError::DeviceCall { .. })));
    assert!(session.is_dirty());
    assert!(!session.is_busy());
    assert_eq!(session.phase(), Phase::Connected);
    assert_eq!(session.last_error().map(|e| e.code), Some("E_IO".to_string()));
}

#[tokio::test]
async fn test_operations_skip_when_disconnected() {
    let gateway = Arc::new(InMemoryGateway::with_demo_device());
    let session = session_over(&gateway);

    assert!(matches!(session.apply_to_ram().await, Ok(false)));
    assert!(matches!(session.stage_binding(0, "key:0,0", key_a()).await, Ok(false)));
    assert!(session.stop_all().is_none());
    assert_eq!(gateway.call_count("apply_to_ram"), 0);
}

// ── Busy rule ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_overlapping_apply_calls_run_once() {
    // Arrange
    let (gateway, session) = connected_demo().await;

    // Act
    let (first, second) = tokio::join!(session.apply_to_ram(), session.apply_to_ram());

    // Assert
    assert!(matches!(first, Ok(true)));
    assert!(matches!(second, Ok(false)));
    assert_eq!(gateway.call_count("apply_to_ram"), 1);
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_stop_all_runs_while_busy() {
    // Arrange
    let (gateway, session) = connected_demo().await;

    // Act
    let (committed, was_busy) = tokio::join!(session.commit(), async {
        let busy = session.is_busy();
        let handle = session.stop_all().expect("connected");
        handle.await.expect("stop task");
        busy
    });

    // Assert
    assert!(was_busy, "commit must hold the busy flag while in flight");
    assert!(matches!(committed, Ok(true)));
    assert_eq!(gateway.call_count("stop_all"), 1);
}

#[tokio::test]
async fn test_run_and_stop_report_running_sequence() {
    // Arrange
    let gateway = Arc::new(InMemoryGateway::new());
    let mut fixture = DeviceFixture::studio(DEMO, "Demo Macropad", demo_layout());
    fixture.sequences.push(Sequence {
        id: "s1".into(),
        profile_id: fixture.profile.id.clone(),
        name: "Hello".into(),
        steps: Vec::new(),
    });
    gateway.add_device(fixture);
    let session = session_over(&gateway);
    session.connect(Some(DEMO)).await.expect("connect");

    // Act
    session.run("s1").expect("connected").await.expect("run task");
    session.refresh_session().await.expect("refresh");
    let running = session.sync_status().running;
    session.stop_all().expect("connected").await.expect("stop task");
    session.refresh_session().await.expect("refresh");

    // Assert
    assert_eq!(running.as_deref(), Some("s1"));
    assert_eq!(session.sync_status().running, None);
}

// ── Hydration ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_bindings_for_missing_targets_are_dropped() {
    // Arrange
    let gateway = Arc::new(InMemoryGateway::new());
    let mut fixture = DeviceFixture::studio(DEMO, "Demo Macropad", demo_layout());
    fixture.profile = fixture
        .profile
        .with_binding(0, "key:0,0", key_a())
        .with_binding(0, "key:9,9", key_a());
    gateway.add_device(fixture);
    let session = session_over(&gateway);

    // Act
    session.connect(Some(DEMO)).await.expect("connect");

    // Assert
    let state = session.state().expect("connected");
    assert!(state.profile.binding(0, "key:0,0").is_some());
    assert!(state.profile.binding(0, "key:9,9").is_none());
    assert!(state.has_target("key:2,2"));
}

#[tokio::test]
async fn test_unknown_target_is_ignored() {
    let (gateway, session) = connected_demo().await;

    let result = session.stage_binding(0, "key:9,9", key_a()).await;

    assert!(matches!(result, Ok(false)));
    assert_eq!(gateway.call_count("set_binding"), 0);
    assert!(!session.is_dirty());
}

// ── Status refresh ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_retryable_refresh_failure_reopens_session() {
    // Arrange
    let (gateway, session) = connected_demo().await;
    gateway.fail_next("get_status", GatewayError::retryable("E_IO", "timeout"));

    // Act
    let result = session.refresh_session().await;

    // Assert
    assert_ok!(result);
    assert!(session.is_connected());
    assert_eq!(gateway.call_count("open_session"), 2);
    assert_eq!(gateway.call_count("close_session"), 1);
    assert_eq!(gateway.open_session_count(DEMO), 1, "stale session must be closed");
}

#[tokio::test]
async fn test_unplugged_device_disconnects_after_failed_reopen() {
    // Arrange
    let (gateway, session) = connected_demo().await;
    gateway.unplug(DEMO);

    // Act
    let result = session.refresh_session().await;

    // Assert
    assert!(matches!(result, Err(SessionError::DeviceDisconnected { .. })));
    assert!(!session.is_connected());
    assert_eq!(session.phase(), Phase::Disconnected);
    assert_eq!(
        session.last_error().map(|e| e.message),
        Some(DISCONNECTED_MESSAGE.to_string())
    );
    assert_eq!(session.preferred_device().as_deref(), Some(DEMO));
}

#[tokio::test]
async fn test_fatal_refresh_failure_is_not_retried() {
    // Arrange
    let (gateway, session) = connected_demo().await;
    gateway.fail_next("get_status", GatewayError::fatal("E_PAIR", "re-pair the device"));

    // Act
    let result = session.refresh_session().await;

    // Assert
    assert!(matches!(result, Err(SessionError::DeviceCall { .. })));
    assert!(session.is_connected());
    assert_eq!(gateway.call_count("open_session"), 1);
    assert_eq!(
        session.last_error().map(|e| e.message),
        Some("re-pair the device (fatal)".to_string())
    );
}

#[tokio::test]
async fn test_lost_device_after_commit_disconnects() {
    let (gateway, session) = connected_demo().await;
    gateway.fail_next("get_status", GatewayError::retryable("E_IO", "gone"));
    gateway.fail_next("open_session", GatewayError::retryable("E_NOT_FOUND", "gone"));

    let result = session.commit().await;

    assert_err!(result);
    assert!(!session.is_connected());
    assert!(!session.is_busy());
    assert_eq!(session.phase(), Phase::Disconnected);
}

// ── Direct-keymap devices ─────────────────────────────────────────────────────

async fn connected_via() -> (Arc<InMemoryGateway>, DeviceSession) {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.add_device(DeviceFixture::via("via-1", "Via Pad", demo_layout(), 2, 3, 3));
    let session = session_over(&gateway);
    session.connect(Some("via-1")).await.expect("connect");
    (gateway, session)
}

#[tokio::test]
async fn test_via_device_reads_keymap_on_connect() {
    let (_gateway, session) = connected_via().await;

    let state = session.state().expect("connected");

    assert_eq!(session.device_mode(), Some(DeviceMode::ViaDirect));
    assert_eq!(state.profile.layer_ids(), vec![0, 1]);
    assert_eq!(state.via_state.as_ref().map(|v| v.layer_count), Some(2));
}

#[tokio::test]
async fn test_via_translation_failure_keeps_previous_binding() {
    // Arrange
    let (gateway, session) = connected_via().await;
    session
        .stage_binding(0, "key:0,0", key_a())
        .await
        .expect("stage keycode");

    // Act
    let result = session
        .stage_binding(
            0,
            "key:0,0",
            Binding::simple("OPEN_WEBSITE", Some("https://example.org".into())),
        )
        .await;

    // Assert
    assert!(matches!(result, Err(SessionError::Translation { .. })));
    let state = session.state().expect("connected");
    assert_eq!(state.profile.binding(0, "key:0,0"), Some(&key_a()));
    assert_eq!(gateway.call_count("set_binding"), 1);
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_via_layer_keycodes_carry_their_params() {
    // Arrange
    let (gateway, session) = connected_via().await;
    let cases = [
        ("key:0,0", Binding::simple("KC:QK_MO", Some("1".into())), "0x5221"),
        ("key:0,1", Binding::simple("KC:QK_LT", Some("1,KC_SPC".into())), "0x412C"),
        ("key:0,2", Binding::simple("KC:QK_MT", Some("LSFT,KC_A".into())), "0x6204"),
    ];

    for (target, binding, expected) in cases {
        // Act
        let result = session.stage_binding(0, target, binding.clone()).await;

        // Assert
        assert!(matches!(result, Ok(true)), "{target}: {result:?}");
        let Some(Binding::SimpleAction { arg, .. }) = gateway.staged_binding("via-1", 0, target)
        else {
            panic!("{target}: nothing staged on the device");
        };
        assert_eq!(arg.as_deref(), Some(expected), "{target}");
        let state = session.state().expect("connected");
        assert_eq!(state.profile.binding(0, target), Some(&binding));
    }
}

#[tokio::test]
async fn test_via_layer_keycode_without_layer_is_rejected() {
    // Arrange
    let (gateway, session) = connected_via().await;

    // Act
    let result = session
        .stage_binding(0, "key:0,0", Binding::simple("KC:QK_MO", None))
        .await;

    // Assert
    assert!(matches!(result, Err(SessionError::Translation { .. })));
    assert_eq!(gateway.call_count("set_binding"), 0);
    assert!(!session.is_busy());
}

#[tokio::test]
async fn test_via_keycode_write_updates_labels() {
    // Arrange
    let (gateway, session) = connected_via().await;

    // Act
    let written = session.write_via_keycode(0, 1, 1, 0x0004).await;

    // Assert
    assert!(matches!(written, Ok(true)));
    assert_eq!(gateway.via_keycode("via-1", 0, 1, 1), Some(0x0004));
    let labels = session.keycode_labels(0);
    assert_eq!(labels.get("key:1,1").map(|l| l.primary.as_str()), Some("A"));
}

#[tokio::test]
async fn test_probe_via_reports_detection() {
    let (_gateway, session) = connected_via().await;

    let probe = session.probe_via("via-1").await.expect("probe");

    assert!(probe.via_detected);
}

// ── Preview sessions ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_imported_bundle_is_read_only_preview() {
    // Arrange
    let gateway = Arc::new(InMemoryGateway::new());
    let session = session_over(&gateway);

    // Act
    let imported = session.import_via_bundle(&demo_layout().to_string()).await;
    let staged = session.stage_binding(0, "key:0,0", key_a()).await;

    // Assert
    assert!(matches!(imported, Ok(true)));
    assert!(session.state().expect("preview").is_preview());
    match staged {
        Err(SessionError::Unsupported(message)) => assert!(message.contains("preview")),
        other => panic!("expected Unsupported, got {other:?}"),
    }
}

// ── Layout editing ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_moved_layout_persists_across_reconnect() {
    // Arrange
    let (_gateway, session) = connected_demo().await;
    let x_before = key_x(&session, "key:1,1");

    // Act
    assert!(session.offset_layout_element("key:1,1", 0.25, 0.0));
    assert!(matches!(session.persist_layout().await, Ok(true)));
    session.disconnect().await;
    session.connect(Some(DEMO)).await.expect("reconnect");

    // Assert
    assert_eq!(key_x(&session, "key:1,1"), x_before + 0.25);
    assert!(!session.offset_layout_element("key:9,9", 1.0, 0.0));
}

fn key_x(session: &DeviceSession, element_id: &str) -> f64 {
    session
        .state()
        .and_then(|s| s.layout.clone())
        .and_then(|l| l.keys.into_iter().find(|k| k.element_id == element_id))
        .map(|k| k.x)
        .expect("key present")
}

// ── Device polling ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_poll_disconnects_vanished_device_then_shows_placeholder() {
    // Arrange
    let (gateway, session) = connected_demo().await;
    let monitor = InteractionMonitor::new();
    gateway.unplug(DEMO);

    // Act
    assert!(session.poll_devices(&monitor).await);
    let disconnected = !session.is_connected();
    assert!(session.poll_devices(&monitor).await);

    // Assert
    assert!(disconnected);
    let devices = session.devices();
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].id, DEMO);
    assert_eq!(devices[0].name, PLACEHOLDER_NAME);
}

#[tokio::test]
async fn test_poll_skipped_while_dragging() {
    // Arrange
    let (gateway, session) = connected_demo().await;
    let monitor = InteractionMonitor::new();
    let listed_before = gateway.call_count("list_devices");

    // Act
    monitor.start_drag();
    let during = session.poll_devices(&monitor).await;
    monitor.end_drag();
    let after = session.poll_devices(&monitor).await;

    // Assert
    assert!(!during);
    assert!(after);
    assert_eq!(gateway.call_count("list_devices"), listed_before + 1);
}

#[tokio::test]
async fn test_new_devices_append_after_known_ones() {
    // Arrange
    let (gateway, session) = connected_demo().await;
    let monitor = InteractionMonitor::new();
    gateway.add_device(DeviceFixture::studio("aaa", "Alpha Board", demo_layout()));

    // Act
    session.poll_devices(&monitor).await;

    // Assert
    let ids: Vec<String> = session.devices().into_iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![DEMO.to_string(), "aaa".to_string()]);
}
