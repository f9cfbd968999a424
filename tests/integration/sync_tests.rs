//! Synchronization layer behaviour: dispatcher, store and broadcaster together

use crate::support::{eventually, sync_with, MockTransport, Request};
use agent_deck_sync::sync::{BindingGroup, NotifyFn};
use agent_deck_sync::transport::{KeystrokeTransport, ModeTransition, SHIFT_TAB};
use agent_deck_sync::{
    AgentState, AgentSync, DispatchError, Model, NotifyError, PermissionMode, StateReport,
};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const GROUP: BindingGroup = BindingGroup("test");

/// Notify callback that records every state it receives
fn recorder() -> (Arc<Mutex<Vec<AgentState>>>, NotifyFn) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let notify: NotifyFn = Arc::new(move |state: &AgentState| {
        sink.lock().push(*state);
        Ok(())
    });
    (seen, notify)
}

#[tokio::test]
async fn test_cycle_returns_to_start_visiting_every_mode_once() {
    for start in PermissionMode::ALL {
        let sync = sync_with(
            AgentState::new(start, Model::Sonnet),
            Arc::new(MockTransport::default()),
        );

        let mut visited = Vec::new();
        for _ in 0..PermissionMode::ALL.len() {
            visited.push(assert_ok!(sync.cycle_mode().await).permission_mode);
        }

        assert_eq!(*visited.last().unwrap(), start);
        let mut others: Vec<_> = visited[..visited.len() - 1].to_vec();
        others.sort_by_key(|m| m.index());
        others.dedup();
        assert_eq!(others.len(), PermissionMode::ALL.len() - 1);
        assert!(!others.contains(&start));
    }
}

#[tokio::test]
async fn test_cycle_order_matches_display_order() {
    let sync = sync_with(AgentState::default(), Arc::new(MockTransport::default()));
    for expected in PermissionMode::ALL.iter().cycle().skip(1).take(4) {
        assert_eq!(sync.cycle_mode().await.unwrap().permission_mode, *expected);
    }
}

#[tokio::test]
async fn test_toggle_twice_restores_mode() {
    for start in PermissionMode::ALL {
        let sync = sync_with(
            AgentState::new(start, Model::Opus),
            Arc::new(MockTransport::default()),
        );
        assert_ok!(sync.toggle_permission_mode().await);
        let state = assert_ok!(sync.toggle_permission_mode().await);
        assert_eq!(state.permission_mode, start, "toggle symmetry from {}", start);
    }
}

#[tokio::test]
async fn test_failed_transport_leaves_state_identical() {
    for start in PermissionMode::ALL {
        let initial = AgentState::new(start, Model::Sonnet);
        let sync = sync_with(initial, MockTransport::failing());
        let (seen, notify) = recorder();
        sync.subscribe("k1".into(), GROUP, notify);

        assert_err!(sync.toggle_permission_mode().await);
        assert_err!(sync.switch_model().await);
        assert_err!(sync.cycle_mode().await);
        assert_err!(sync.send_command("/log-mistake").await);

        assert_eq!(sync.get_state(), initial);
        assert!(seen.lock().is_empty(), "failed operations must not broadcast");
    }
}

#[tokio::test]
async fn test_every_subscriber_receives_each_broadcast_once() {
    let sync = sync_with(AgentState::default(), Arc::new(MockTransport::default()));
    let recorders: Vec<_> = (0..5)
        .map(|i| {
            let (seen, notify) = recorder();
            sync.subscribe(format!("k{}", i).as_str().into(), GROUP, notify);
            seen
        })
        .collect();

    let next = AgentState::new(PermissionMode::Plan, Model::Opus);
    sync.store().set_state(next);

    for seen in &recorders {
        assert_eq!(*seen.lock(), vec![next]);
    }
}

#[tokio::test]
async fn test_no_delivery_after_unsubscribe() {
    let sync = sync_with(AgentState::default(), Arc::new(MockTransport::default()));
    let (gone, notify_gone) = recorder();
    let (stays, notify_stays) = recorder();
    sync.subscribe("gone".into(), GROUP, notify_gone);
    sync.subscribe("stays".into(), GROUP, notify_stays);

    sync.unsubscribe(&"gone".into());
    assert_ok!(sync.cycle_mode().await);

    assert!(gone.lock().is_empty());
    assert_eq!(stays.lock().len(), 1);
}

#[tokio::test]
async fn test_failing_subscriber_does_not_fail_mutation() {
    let sync = sync_with(AgentState::default(), Arc::new(MockTransport::default()));
    let (seen, notify) = recorder();
    sync.subscribe(
        "broken".into(),
        GROUP,
        Arc::new(|_: &AgentState| -> Result<(), NotifyError> {
            Err(NotifyError::Failed("render crashed".into()))
        }),
    );
    sync.subscribe("ok".into(), GROUP, notify);

    let state = assert_ok!(sync.switch_model().await);
    assert_eq!(*seen.lock(), vec![state]);
}

#[tokio::test]
async fn test_switch_model_scenario() {
    let transport = Arc::new(MockTransport::default());
    let sync = sync_with(
        AgentState::new(PermissionMode::Default, Model::Sonnet),
        Arc::clone(&transport),
    );
    let (first, notify_first) = recorder();
    let (second, notify_second) = recorder();
    sync.subscribe("model".into(), GROUP, notify_first);
    sync.subscribe("mode".into(), GROUP, notify_second);

    let state = assert_ok!(sync.switch_model().await);

    let expected = AgentState::new(PermissionMode::Default, Model::Opus);
    assert_eq!(state, expected);
    assert_eq!(sync.get_state(), expected);
    assert_eq!(*first.lock(), vec![expected]);
    assert_eq!(*second.lock(), vec![expected]);
    assert_eq!(transport.requests(), vec![Request::Model(Model::Opus)]);
}

#[tokio::test]
async fn test_failed_toggle_scenario() {
    let sync = sync_with(
        AgentState::new(PermissionMode::Plan, Model::Sonnet),
        MockTransport::failing(),
    );

    assert!(sync.toggle_permission_mode().await.is_err());
    assert_eq!(sync.get_state().permission_mode, PermissionMode::Plan);
}

#[tokio::test]
async fn test_concurrent_cycles_advance_two_steps() {
    let transport = MockTransport::with_delay(Duration::from_millis(20));
    let sync = sync_with(AgentState::default(), Arc::clone(&transport));

    let (a, b) = tokio::join!(sync.cycle_mode(), sync.cycle_mode());
    assert_ok!(a);
    assert_ok!(b);

    assert_eq!(sync.get_state().permission_mode, PermissionMode::Plan);
    assert_eq!(
        transport.requests(),
        vec![
            Request::Cycle(ModeTransition::new(
                PermissionMode::Default,
                PermissionMode::AcceptEdits
            )),
            Request::Cycle(ModeTransition::new(
                PermissionMode::AcceptEdits,
                PermissionMode::Plan
            )),
        ]
    );
}

#[tokio::test]
async fn test_concurrent_toggle_and_cycle_stay_consistent() {
    let transport = MockTransport::with_delay(Duration::from_millis(10));
    let sync = sync_with(AgentState::default(), Arc::clone(&transport));

    let (toggled, cycled) = tokio::join!(sync.toggle_permission_mode(), sync.cycle_mode());
    assert_ok!(toggled);
    assert_ok!(cycled);

    // Each request starts from the state the previous one committed
    let requests = transport.requests();
    assert_eq!(requests.len(), 2);
    let transitions: Vec<ModeTransition> = requests
        .iter()
        .map(|r| match r {
            Request::Toggle(t) | Request::Cycle(t) => *t,
            other => panic!("unexpected request {:?}", other),
        })
        .collect();
    assert_eq!(transitions[0].from, PermissionMode::Default);
    assert_eq!(transitions[1].from, transitions[0].to);
    assert_eq!(sync.get_state().permission_mode, transitions[1].to);
}

#[tokio::test]
async fn test_model_switch_runs_alongside_mode_change() {
    let transport = MockTransport::with_delay(Duration::from_millis(10));
    let sync = sync_with(AgentState::default(), Arc::clone(&transport));

    let (mode, model) = tokio::join!(sync.cycle_mode(), sync.switch_model());
    assert_ok!(mode);
    assert_ok!(model);

    // Commits on different facets never overwrite each other
    assert_eq!(sync.get_state(), AgentState::new(PermissionMode::AcceptEdits, Model::Opus));
}

#[tokio::test]
async fn test_send_command_reaches_agent_without_state_change() {
    let transport = Arc::new(MockTransport::default());
    let sync = sync_with(AgentState::default(), Arc::clone(&transport));
    let (seen, notify) = recorder();
    sync.subscribe("k1".into(), GROUP, notify);

    assert_ok!(sync.send_command("log a mistake").await);

    assert_eq!(transport.requests(), vec![Request::Text("log a mistake".to_string())]);
    assert!(seen.lock().is_empty());
    assert_eq!(sync.get_state(), AgentState::default());
}

#[tokio::test]
async fn test_late_redraws_do_not_change_toggle_target() {
    let sync = sync_with(AgentState::default(), Arc::new(MockTransport::default()));
    let (seen, notify) = recorder();
    sync.subscribe("k1".into(), GROUP, notify);

    assert_ok!(sync.toggle_permission_mode().await);
    // Redraws for each Shift+Tab press, delivered after the commit
    sync.apply_report(StateReport {
        permission_mode: Some(PermissionMode::AcceptEdits),
        model: None,
    });
    sync.apply_report(StateReport {
        permission_mode: Some(PermissionMode::Plan),
        model: None,
    });

    let state = assert_ok!(sync.toggle_permission_mode().await);
    assert_eq!(state.permission_mode, PermissionMode::Default);
    assert!(
        !seen
            .lock()
            .iter()
            .any(|s| s.permission_mode == PermissionMode::AcceptEdits),
        "intermediate mode must not reach the controls"
    );
}

#[tokio::test]
async fn test_timed_out_keystroke_burst_is_not_cut_short() {
    let shared = Arc::new(Mutex::new(Some(Vec::<u8>::new())));
    let transport = KeystrokeTransport::from_shared(Arc::clone(&shared))
        .with_key_interval(Duration::from_millis(40));
    let sync = AgentSync::new(
        AgentState::default(),
        Arc::new(transport),
        Duration::from_millis(20),
    );

    assert!(matches!(
        sync.toggle_permission_mode().await,
        Err(DispatchError::Timeout(20))
    ));

    let written = || shared.lock().clone().unwrap_or_default();
    assert!(eventually(|| written() == [SHIFT_TAB, SHIFT_TAB].concat()).await);
    // The agent took both steps, so the late completion commits them
    assert!(eventually(|| sync.get_state().permission_mode == PermissionMode::Plan).await);
}
