use canvas::viewport::Point;
use events::Phase;
use progress::TaskState;

use super::*;
use crate::api::types::{Artifact, HistoryMessage};

fn task(status: TaskStatus, progress: Option<&str>) -> Task {
    serde_json::from_value(serde_json::json!({
        "task_id": "t-1",
        "goal": "Build me a maze game",
        "status": status,
        "progress": progress,
    }))
    .unwrap()
}

fn result_with(artifacts: usize, success: bool) -> TaskResult {
    TaskResult {
        task_id: "t-1".into(),
        success,
        artifacts: (0..artifacts)
            .map(|n| Artifact {
                name: format!("file{n}"),
                path: format!("out/file{n}"),
                kind: "text".into(),
                size: None,
                content: None,
            })
            .collect(),
        validation: Default::default(),
        error_message: None,
    }
}

fn workspace_with_task() -> (Workspace, WidgetId) {
    let mut ws = Workspace::new();
    let title = ws.next_task_title();
    let id = ws.create_task_widget(&title, "t-1", "Build me a maze game", 1_000).unwrap();
    (ws, id)
}

fn log_messages(ws: &Workspace, id: &WidgetId) -> Vec<String> {
    ws.engine.registry.get(id).unwrap().logs.iter().map(|l| l.message.clone()).collect()
}

#[test]
fn message_status_maps_to_widget_status() {
    assert_eq!(status_for(MessageStatus::Pending), StatusState::Running);
    assert_eq!(status_for(MessageStatus::Streaming), StatusState::Running);
    assert_eq!(status_for(MessageStatus::Complete), StatusState::Completed);
    assert_eq!(status_for(MessageStatus::Error), StatusState::Error);
}

// =============================================================================
// create / close
// =============================================================================

#[test]
fn task_widget_starts_running_with_two_logs() {
    let (ws, id) = workspace_with_task();
    let widget = ws.engine.registry.get(&id).unwrap();
    assert_eq!(widget.title, "Task 1");
    assert_eq!(widget.status, StatusState::Running);
    assert_eq!(widget.linked_task_id.as_deref(), Some("t-1"));
    assert_eq!(widget.position, Point::new(100.0, 100.0));
    assert_eq!(log_messages(&ws, &id), vec!["Task submitted: Build me a maze game", "Task ID: t-1"]);
    assert!(ws.checklist(&id).is_some());
}

#[test]
fn task_widgets_follow_the_grid() {
    let mut ws = Workspace::new();
    for n in 0..5 {
        let title = ws.next_task_title();
        ws.create_task_widget(&title, &format!("t-{n}"), "goal", 0).unwrap();
    }
    let list = ws.engine.registry.list();
    assert_eq!(list[1].position, Point::new(450.0, 100.0));
    assert_eq!(list[4].position, Point::new(100.0, 320.0));
    assert_eq!(list[4].title, "Task 5");
}

#[test]
fn close_removes_session_and_checklist_and_stops_stream() {
    let (mut ws, id) = workspace_with_task();
    ws.begin_turn(&id, "go", 1_000);
    let handle = ws.stop_handle(&id).unwrap();

    let actions = ws.close_widget(&id);

    assert!(actions.contains(&Action::WidgetRemoved { id }));
    assert!(ws.session(&id).is_none());
    assert!(ws.checklist(&id).is_none());
    assert!(handle.is_stopped());
    assert!(ws.close_widget(&id).is_empty());
}

#[test]
fn new_turn_stops_previous_driver() {
    let (mut ws, id) = workspace_with_task();
    ws.begin_turn(&id, "first", 1_000);
    let first = ws.stop_handle(&id).unwrap();

    ws.begin_turn(&id, "second", 2_000);

    assert!(first.is_stopped());
    assert!(!ws.stop_handle(&id).unwrap().is_stopped());
}

// =============================================================================
// ingest
// =============================================================================

#[test]
fn stream_events_drive_checklist_status_and_log() {
    let (mut ws, id) = workspace_with_task();
    ws.begin_turn(&id, "Build me a maze game", 1_000);

    ws.ingest(&id, &StreamEvent::status(Phase::Understanding, 10.0, "Analyzing your request..."), 1_100).unwrap();
    ws.ingest(&id, &StreamEvent::status(Phase::Generating, 50.0, "Crafting response..."), 1_200).unwrap();
    ws.ingest(&id, &StreamEvent::delta("Okay, "), 1_300).unwrap();

    let states: Vec<TaskState> = ws.checklist(&id).unwrap().tasks().iter().map(|t| t.state).collect();
    assert_eq!(
        states,
        vec![
            TaskState::Completed,
            TaskState::Completed,
            TaskState::Completed,
            TaskState::Active,
            TaskState::Pending,
            TaskState::Pending
        ]
    );
    let logs = log_messages(&ws, &id);
    assert_eq!(&logs[logs.len() - 2..], ["Analyzing your request...", "Crafting response..."]);
    assert_eq!(ws.caption(&id).as_deref(), Some("Processing..."));

    ws.ingest(&id, &StreamEvent::complete(), 1_400).unwrap();
    let widget = ws.engine.registry.get(&id).unwrap();
    assert_eq!(widget.status, StatusState::Completed);
    assert!(ws.checklist(&id).unwrap().is_complete());
    assert_eq!(ws.session(&id).unwrap().latest_assistant().unwrap().content, "Okay, ");
}

#[test]
fn repeated_status_text_is_logged_once() {
    let (mut ws, id) = workspace_with_task();
    ws.begin_turn(&id, "go", 1_000);
    let before = log_messages(&ws, &id).len();
    ws.ingest(&id, &StreamEvent::status(Phase::Thinking, 20.0, "Thinking through options..."), 1_100).unwrap();
    ws.ingest(&id, &StreamEvent::status(Phase::Thinking, 25.0, "Thinking through options..."), 1_200).unwrap();
    assert_eq!(log_messages(&ws, &id).len(), before + 1);
}

#[test]
fn stale_update_leaves_checklist_alone() {
    let (mut ws, id) = workspace_with_task();
    ws.begin_turn(&id, "go", 1_000);
    ws.ingest(&id, &StreamEvent::status(Phase::Generating, 60.0, "x"), 1_100).unwrap();
    let before = ws.checklist(&id).unwrap().clone();
    let err = ws.ingest(&id, &StreamEvent::status(Phase::ToolUse, 40.0, "y"), 1_200).unwrap_err();
    assert!(matches!(err, SessionError::StaleUpdate { .. }));
    assert_eq!(ws.checklist(&id).unwrap(), &before);
}

#[test]
fn error_event_fails_checklist_and_widget() {
    let (mut ws, id) = workspace_with_task();
    ws.begin_turn(&id, "go", 1_000);
    ws.ingest(&id, &StreamEvent::status(Phase::Planning, 15.0, "Planning approach..."), 1_100).unwrap();
    ws.ingest(&id, &StreamEvent::error("model overloaded"), 1_200).unwrap();

    let widget = ws.engine.registry.get(&id).unwrap();
    assert_eq!(widget.status, StatusState::Error);
    assert_eq!(widget.logs.last().unwrap().level, LogLevel::Error);
    assert_eq!(widget.logs.last().unwrap().message, "Error: model overloaded");
    assert_eq!(ws.checklist(&id).unwrap().task(Phase::Planning).unwrap().state, TaskState::Failed);
    assert_eq!(ws.caption(&id).as_deref(), Some("Error"));
}

#[test]
fn ingest_for_unknown_widget_is_refused() {
    let mut ws = Workspace::new();
    let err = ws.ingest(&uuid::Uuid::new_v4(), &StreamEvent::delta("x"), 0).unwrap_err();
    assert!(matches!(err, SessionError::UnknownTarget { .. }));
}

#[test]
fn sessions_are_isolated_per_widget() {
    let (mut ws, a) = workspace_with_task();
    let b = ws.create_task_widget("Task 2", "t-2", "other", 1_000).unwrap();
    ws.begin_turn(&a, "one", 1_000);
    ws.begin_turn(&b, "two", 1_000);
    ws.ingest(&a, &StreamEvent::delta("for a"), 1_100).unwrap();
    assert_eq!(ws.session(&b).unwrap().open_message().unwrap().content, "");
    assert_eq!(ws.activity(&a, ProjectStatus::Working), "for a");
}

#[test]
fn session_widget_uses_backend_session_id() {
    let mut ws = Workspace::new();
    let id = ws.create_session_widget("Chat", "s-42").unwrap();
    ws.begin_turn(&id, "hi", 0);
    assert_eq!(ws.session(&id).unwrap().id(), "s-42");
    ws.ingest(&id, &StreamEvent::delta("hello").with_session("s-42"), 1).unwrap();
    let foreign = ws.ingest(&id, &StreamEvent::delta("nope").with_session("s-1"), 2).unwrap_err();
    assert!(matches!(foreign, SessionError::UnknownTarget { .. }));
}

#[test]
fn restored_widget_can_be_rebound_by_title() {
    let mut ws = Workspace::new();
    let id = ws.create_session_widget("Session s-7", "s-7").unwrap();
    let snapshot = ws.snapshot();

    let mut restored = Workspace::new();
    restored.restore(snapshot).unwrap();
    let found = restored.find_by_title("Session s-7").unwrap();
    assert_eq!(found, id);
    assert!(restored.bind_session(&found, "s-7"));
    restored.begin_turn(&found, "again", 0);
    assert_eq!(restored.session(&found).unwrap().id(), "s-7");
    assert!(!restored.bind_session(&uuid::Uuid::new_v4(), "s-7"));
    assert_eq!(restored.find_by_title("nope"), None);
}

#[test]
fn restored_session_widget_regains_history() {
    let mut ws = Workspace::new();
    ws.create_session_widget("Session s-7", "s-7").unwrap();
    let mut restored = Workspace::new();
    restored.restore(ws.snapshot()).unwrap();
    let found = restored.find_by_title("Session s-7").unwrap();
    restored.bind_session(&found, "s-7");
    let history: Vec<HistoryMessage> = serde_json::from_value(serde_json::json!([
        { "id": "m-1", "role": "user", "content": "Plan a trip" },
        { "id": "m-2", "role": "assistant", "content": "Day one: Lisbon", "status": "streaming" },
    ]))
    .unwrap();

    assert!(restored.load_history(&found, history.into_iter().map(|m| m.into_message(0)).collect()));

    assert_eq!(restored.session(&found).unwrap().messages().len(), 2);
    assert_eq!(restored.activity(&found, ProjectStatus::Idle), "Day one: Lisbon");
    restored.begin_turn(&found, "and day two?", 10);
    assert!(!restored.load_history(&found, Vec::new()));
    assert!(!restored.load_history(&uuid::Uuid::new_v4(), Vec::new()));
}

// =============================================================================
// stream target
// =============================================================================

#[test]
fn stop_timeout_through_widget_stream_fails_widget() {
    let (mut ws, id) = workspace_with_task();
    ws.begin_turn(&id, "go", 1_000);
    let mut target = WidgetStream { workspace: &mut ws, widget: id };
    target.stop_requested(2_000, 5_000);
    assert!(!target.stop_expired(6_000));
    assert!(target.stop_expired(7_000));
    assert_eq!(target.final_status(), Some(MessageStatus::Error));
    let logs = log_messages(&ws, &id);
    assert!(logs.iter().any(|l| l == "Stop requested"));
    assert_eq!(ws.engine.registry.get(&id).unwrap().status, StatusState::Error);
}

#[test]
fn stream_end_without_terminal_completes_widget() {
    let (mut ws, id) = workspace_with_task();
    ws.begin_turn(&id, "go", 1_000);
    let mut target = WidgetStream { workspace: &mut ws, widget: id };
    target.stream_ended(2_000);
    assert_eq!(ws.engine.registry.get(&id).unwrap().status, StatusState::Completed);
    assert!(ws.checklist(&id).unwrap().is_complete());
}

// =============================================================================
// task polling / results
// =============================================================================

#[test]
fn poll_maps_backend_status() {
    let (mut ws, id) = workspace_with_task();
    assert!(!ws.apply_task_poll(&id, &task(TaskStatus::Executing, None), 2_000));
    assert!(ws.apply_task_poll(&id, &task(TaskStatus::Failed, None), 3_000));
    assert_eq!(ws.engine.registry.get(&id).unwrap().status, StatusState::Error);
    assert!(ws.apply_task_poll(&id, &task(TaskStatus::Completed, None), 4_000));
    assert_eq!(ws.engine.registry.get(&id).unwrap().status, StatusState::Completed);
}

#[test]
fn poll_pending_keeps_status() {
    let (mut ws, id) = workspace_with_task();
    assert!(!ws.apply_task_poll(&id, &task(TaskStatus::Pending, None), 2_000));
    assert_eq!(ws.engine.registry.get(&id).unwrap().status, StatusState::Running);
}

#[test]
fn poll_logs_progress_only_when_it_changes() {
    let (mut ws, id) = workspace_with_task();
    assert!(ws.apply_task_poll(&id, &task(TaskStatus::Planning, Some("Planning steps")), 2_000));
    assert!(!ws.apply_task_poll(&id, &task(TaskStatus::Planning, Some("Planning steps")), 4_000));
    assert!(ws.apply_task_poll(&id, &task(TaskStatus::Executing, Some("Step 1/3")), 6_000));
    let logs = log_messages(&ws, &id);
    assert_eq!(&logs[2..], ["Planning steps", "Step 1/3"]);
}

#[test]
fn pollable_tasks_skip_finished_widgets() {
    let (mut ws, id) = workspace_with_task();
    let other = ws.create_task_widget("Task 2", "t-2", "g", 0).unwrap();
    ws.apply_task_poll(&other, &task(TaskStatus::Completed, None), 1);
    assert_eq!(ws.pollable_tasks(), vec![(id, "t-1".to_owned())]);
}

#[test]
fn attach_result_stores_and_logs() {
    let (mut ws, id) = workspace_with_task();
    ws.apply_task_poll(&id, &task(TaskStatus::Completed, None), 2_000);
    assert!(ws.attach_result(&id, &result_with(3, true), 2_100).unwrap());

    let widget = ws.engine.registry.get(&id).unwrap();
    assert_eq!(widget.result.as_ref().unwrap()["artifacts"].as_array().unwrap().len(), 3);
    let last = widget.logs.last().unwrap();
    assert_eq!(last.level, LogLevel::Success);
    assert_eq!(last.message, "Task completed! Generated 3 artifacts.");
    assert_eq!(ws.caption(&id).as_deref(), Some("Done"));
}

#[test]
fn attach_failed_result_logs_error() {
    let (mut ws, id) = workspace_with_task();
    let mut result = result_with(0, false);
    result.error_message = Some("verification failed".into());
    ws.attach_result(&id, &result, 2_000).unwrap();
    assert_eq!(log_messages(&ws, &id).last().unwrap(), "verification failed");
    assert!(!ws.attach_result(&uuid::Uuid::new_v4(), &result, 2_000).unwrap());
}

// =============================================================================
// caption
// =============================================================================

#[test]
fn caption_prefers_log_signal_then_status() {
    let mut ws = Workspace::new();
    let id = ws.engine.create_widget("Idle one").unwrap();
    assert_eq!(ws.caption(&id).as_deref(), Some("Idle - Ready to start"));

    ws.engine.registry.append_log(&id, LogEntry::new(0, LogLevel::Info, "Widget initialized"));
    assert_eq!(ws.caption(&id).as_deref(), Some("Ready"));

    ws.engine.registry.update(&id, &PartialWidget::status(StatusState::Paused));
    assert_eq!(ws.caption(&id).as_deref(), Some("Ready"));

    ws.engine.registry.append_log(&id, LogEntry::new(1, LogLevel::Info, "Executing step 2"));
    assert_eq!(ws.caption(&id).as_deref(), Some("Paused"));
    assert_eq!(ws.caption(&uuid::Uuid::new_v4()), None);
}

// =============================================================================
// snapshot / restore
// =============================================================================

#[test]
fn snapshot_restore_round_trip() {
    let (mut ws, id) = workspace_with_task();
    ws.begin_turn(&id, "go", 1_000);
    ws.ingest(&id, &StreamEvent::status(Phase::Thinking, 30.0, "hmm"), 1_100).unwrap();
    ws.engine.zoom_in();
    let snapshot = ws.snapshot();

    let mut restored = Workspace::new();
    restored.restore(snapshot.clone()).unwrap();

    assert_eq!(restored.snapshot(), snapshot);
    assert_eq!(restored.checklist(&id).unwrap().active(), Some(Phase::Thinking));
    assert!(restored.session(&id).is_none());
}

#[test]
fn restore_drops_orphan_checklists() {
    let (ws, _) = workspace_with_task();
    let mut snapshot = ws.snapshot();
    snapshot.checklists.insert(uuid::Uuid::new_v4(), Checklist::new());
    let mut restored = Workspace::new();
    restored.restore(snapshot).unwrap();
    assert_eq!(restored.snapshot().checklists.len(), 1);
}

#[test]
fn restore_with_duplicate_ids_keeps_current_state() {
    let (mut ws, id) = workspace_with_task();
    let mut snapshot = ws.snapshot();
    let copy = snapshot.widgets[0].clone();
    snapshot.widgets.push(copy);
    assert!(matches!(ws.restore(snapshot), Err(ClientError::DuplicateId(dup)) if dup == id));
    assert!(ws.engine.registry.contains(&id));
}
