//! Binding lifecycle against a recording surface

use crate::support::{eventually, sync_with, MockTransport, RecordingSurface};
use agent_deck_sync::binding::{Binding, BindingManager, BindingSettings, KeyOutcome};
use agent_deck_sync::sync::Registration;
use agent_deck_sync::{
    Action, AgentState, AgentSync, Model, PermissionMode, Surface, SurfaceEvent,
};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn manager(sync: &Arc<AgentSync>, surface: &Arc<RecordingSurface>) -> BindingManager {
    let surface: Arc<dyn Surface> = surface.clone();
    BindingManager::new(Arc::clone(sync), surface, BindingSettings::default())
}

fn appear(binding: &str, action: Action) -> SurfaceEvent {
    SurfaceEvent::Appear {
        binding: binding.into(),
        action,
    }
}

#[tokio::test]
async fn test_appear_renders_snapshot() {
    let sync = sync_with(
        AgentState::new(PermissionMode::Plan, Model::Opus),
        Arc::new(MockTransport::default()),
    );
    let surface = Arc::new(RecordingSurface::default());
    let mut bindings = manager(&sync, &surface);

    bindings.handle_event(appear("plan", Action::TogglePlan)).await;
    bindings.handle_event(appear("model", Action::SwitchModel)).await;

    assert_eq!(surface.last("plan", "set_title").as_deref(), Some("Plan"));
    assert_eq!(surface.last("plan", "set_image").as_deref(), Some("mode-plan"));
    assert_eq!(surface.last("plan", "set_state").as_deref(), Some("1"));

    assert_eq!(surface.last("model", "set_title").as_deref(), Some("Opus"));
    assert_eq!(surface.last("model", "set_image").as_deref(), Some("model-opus"));
    assert_eq!(surface.count("model", "set_state"), 0, "titled controls take no state index");
}

#[tokio::test]
async fn test_key_press_updates_every_visible_control() {
    let sync = sync_with(AgentState::default(), Arc::new(MockTransport::default()));
    let surface = Arc::new(RecordingSurface::default());
    let mut bindings = manager(&sync, &surface);

    bindings.handle_event(appear("plan", Action::TogglePlan)).await;
    bindings.handle_event(appear("cycle", Action::CycleMode)).await;
    bindings.handle_event(appear("yolo", Action::YoloIndicator)).await;

    let outcome = bindings
        .handle_event(SurfaceEvent::KeyDown { binding: "plan".into() })
        .await
        .expect("known binding");
    assert_eq!(outcome.await.unwrap(), KeyOutcome::Ok);
    assert_eq!(surface.count("plan", "show_ok"), 1);

    assert!(eventually(|| surface.last("cycle", "set_title").as_deref() == Some("Plan")).await);
    assert!(eventually(|| surface.last("plan", "set_state").as_deref() == Some("1")).await);
    assert!(
        eventually(|| surface.last("cycle", "set_image").as_deref() == Some("mode-plan")).await
    );
    // Plan is not a bypass mode, so the indicator stays off
    assert_eq!(surface.last("yolo", "set_image").as_deref(), Some("yolo-off"));
}

#[tokio::test]
async fn test_yolo_indicator_follows_bypass() {
    let sync = sync_with(
        AgentState::new(PermissionMode::Plan, Model::Sonnet),
        Arc::new(MockTransport::default()),
    );
    let surface = Arc::new(RecordingSurface::default());
    let mut bindings = manager(&sync, &surface);

    bindings.handle_event(appear("yolo", Action::YoloIndicator)).await;
    assert_eq!(surface.last("yolo", "set_title").as_deref(), Some("Safe"));

    let outcome = bindings.key_down(&"yolo".into()).expect("known binding");
    assert_eq!(outcome.await.unwrap(), KeyOutcome::Ok);

    assert_eq!(sync.get_state().permission_mode, PermissionMode::BypassPermissions);
    assert!(eventually(|| surface.last("yolo", "set_title").as_deref() == Some("YOLO")).await);
    assert_eq!(surface.last("yolo", "set_state").as_deref(), Some("1"));
}

#[tokio::test]
async fn test_transport_failure_alerts_and_keeps_state() {
    let initial = AgentState::new(PermissionMode::Plan, Model::Sonnet);
    let sync = sync_with(initial, MockTransport::failing());
    let surface = Arc::new(RecordingSurface::default());
    let mut bindings = manager(&sync, &surface);

    bindings.handle_event(appear("plan", Action::TogglePlan)).await;
    let renders = surface.count("plan", "set_title");

    let outcome = bindings.key_down(&"plan".into()).expect("known binding");
    assert_eq!(outcome.await.unwrap(), KeyOutcome::Failed);

    assert_eq!(surface.count("plan", "show_alert"), 1);
    assert_eq!(surface.count("plan", "show_ok"), 0);
    assert_eq!(sync.get_state(), initial);
    assert_eq!(surface.count("plan", "set_title"), renders);
}

#[tokio::test]
async fn test_surface_failure_is_contained() {
    let sync = sync_with(AgentState::default(), Arc::new(MockTransport::default()));
    let surface = Arc::new(RecordingSurface::default());
    surface.fail.store(true, Ordering::SeqCst);
    let mut bindings = manager(&sync, &surface);

    assert_eq!(
        bindings.appear("model".into(), Action::SwitchModel).await,
        Registration::GroupActivated
    );

    let outcome = bindings.key_down(&"model".into()).expect("known binding");
    assert_eq!(outcome.await.unwrap(), KeyOutcome::Ok);
    assert_eq!(sync.get_state().current_model, Model::Opus);
}

#[tokio::test]
async fn test_slow_agent_times_out() {
    let sync = sync_with(
        AgentState::default(),
        MockTransport::with_delay(Duration::from_millis(200)),
    );
    let surface = Arc::new(RecordingSurface::default());
    let settings = BindingSettings {
        ack_timeout: Duration::from_millis(20),
        default_command_label: "Send".to_string(),
    };
    let binding = Binding::new(
        "cycle".into(),
        Action::CycleMode,
        Arc::clone(&sync),
        surface.clone(),
        settings,
    );

    assert_eq!(binding.on_key_down().await, KeyOutcome::TimedOut);
    assert_eq!(surface.count("cycle", "show_alert"), 1);
}

#[tokio::test]
async fn test_send_command_label_and_press() {
    let transport = Arc::new(MockTransport::default());
    let sync = sync_with(AgentState::default(), Arc::clone(&transport));
    let surface = Arc::new(RecordingSurface::default());
    let mut bindings = manager(&sync, &surface);

    let labelled = Action::SendCommand {
        text: "/log-mistake".to_string(),
        label: Some("Oops".to_string()),
    };
    let unlabelled = Action::SendCommand {
        text: "/compact".to_string(),
        label: None,
    };
    bindings.handle_event(appear("oops", labelled)).await;
    bindings.handle_event(appear("compact", unlabelled)).await;

    assert_eq!(surface.last("oops", "set_title").as_deref(), Some("Oops"));
    assert_eq!(surface.last("compact", "set_title").as_deref(), Some("Send"));

    let outcome = bindings.key_down(&"oops".into()).expect("known binding");
    assert_eq!(outcome.await.unwrap(), KeyOutcome::Ok);
    assert_eq!(
        transport.requests(),
        vec![crate::support::Request::Text("/log-mistake".to_string())]
    );
}

#[tokio::test]
async fn test_disappear_stops_rendering_and_releases_groups() {
    let sync = sync_with(AgentState::default(), Arc::new(MockTransport::default()));
    let surface = Arc::new(RecordingSurface::default());
    let mut bindings = manager(&sync, &surface);

    bindings.handle_event(appear("a", Action::CycleMode)).await;
    bindings.handle_event(appear("b", Action::CycleMode)).await;
    bindings.handle_event(appear("c", Action::SwitchModel)).await;
    assert_eq!(sync.broadcaster().subscriber_count(), 3);
    assert_eq!(sync.broadcaster().active_groups().len(), 2);

    bindings.handle_event(SurfaceEvent::Disappear { binding: "a".into() }).await;
    let before = surface.count("a", "set_title");
    sync.cycle_mode().await.unwrap();
    assert!(eventually(|| surface.last("b", "set_title").as_deref() == Some("Accept")).await);
    assert_eq!(surface.count("a", "set_title"), before);

    bindings.handle_event(SurfaceEvent::Disappear { binding: "b".into() }).await;
    bindings.handle_event(SurfaceEvent::Disappear { binding: "c".into() }).await;
    assert_eq!(sync.broadcaster().subscriber_count(), 0);
    assert!(!sync.broadcaster().is_listening());
    assert!(bindings.is_empty());
}

#[tokio::test]
async fn test_unknown_binding_events_are_ignored() {
    let sync = sync_with(AgentState::default(), Arc::new(MockTransport::default()));
    let surface = Arc::new(RecordingSurface::default());
    let mut bindings = manager(&sync, &surface);

    assert!(bindings
        .handle_event(SurfaceEvent::KeyDown { binding: "ghost".into() })
        .await
        .is_none());
    bindings.handle_event(SurfaceEvent::Disappear { binding: "ghost".into() }).await;
    assert!(surface.updates.lock().is_empty());
}

#[tokio::test]
async fn test_reappear_replaces_previous_registration() {
    let sync = sync_with(AgentState::default(), Arc::new(MockTransport::default()));
    let surface = Arc::new(RecordingSurface::default());
    let mut bindings = manager(&sync, &surface);

    bindings.handle_event(appear("k1", Action::CycleMode)).await;
    bindings.handle_event(appear("k1", Action::SwitchModel)).await;

    assert_eq!(bindings.len(), 1);
    assert_eq!(sync.broadcaster().subscriber_count(), 1);
    assert_eq!(sync.broadcaster().active_groups().len(), 1);
}

#[tokio::test]
async fn test_commit_during_first_render_reaches_the_control() {
    let sync = sync_with(AgentState::default(), Arc::new(MockTransport::default()));
    let surface = Arc::new(RecordingSurface::default());
    let mut bindings = manager(&sync, &surface);

    // Lands after the snapshot was taken but before the binding subscribed
    let committer = Arc::clone(&sync);
    surface.during_next_update(move || {
        committer
            .store()
            .set_state(AgentState::new(PermissionMode::Plan, Model::Opus));
    });
    bindings.handle_event(appear("cycle", Action::CycleMode)).await;

    assert_eq!(surface.updates_for("cycle")[0].value, "Default");
    assert!(eventually(|| surface.last("cycle", "set_title").as_deref() == Some("Plan")).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_appear_racing_commits_settles_on_canonical_state() {
    for round in 0..25 {
        let sync = sync_with(AgentState::default(), Arc::new(MockTransport::default()));
        let surface = Arc::new(RecordingSurface::default());
        let binding = Binding::new(
            "cycle".into(),
            Action::CycleMode,
            Arc::clone(&sync),
            surface.clone(),
            BindingSettings::default(),
        );

        let cycler = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move {
                for _ in 0..3 {
                    sync.cycle_mode().await.unwrap();
                }
            })
        };
        binding.on_appear().await;
        cycler.await.unwrap();

        let expected = sync.get_state().permission_mode.label();
        assert!(
            eventually(|| surface.last("cycle", "set_title").as_deref() == Some(expected)).await,
            "round {} shows {:?}, canonical {}",
            round,
            surface.last("cycle", "set_title"),
            expected
        );
    }
}

#[tokio::test]
async fn test_press_outliving_ack_still_commits() {
    let sync = sync_with(
        AgentState::default(),
        MockTransport::with_delay(Duration::from_millis(100)),
    );
    let surface = Arc::new(RecordingSurface::default());
    let settings = BindingSettings {
        ack_timeout: Duration::from_millis(20),
        default_command_label: "Send".to_string(),
    };
    let binding = Binding::new(
        "cycle".into(),
        Action::CycleMode,
        Arc::clone(&sync),
        surface.clone(),
        settings,
    );
    binding.on_appear().await;

    assert_eq!(binding.on_key_down().await, KeyOutcome::TimedOut);
    assert_eq!(sync.get_state().permission_mode, PermissionMode::Default);

    assert!(eventually(|| sync.get_state().permission_mode == PermissionMode::AcceptEdits).await);
    assert!(eventually(|| surface.last("cycle", "set_title").as_deref() == Some("Accept")).await);
}
