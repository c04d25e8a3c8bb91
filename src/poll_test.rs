use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use canvas::registry::StatusState;

use super::*;
use crate::api::ByteStream;
use crate::api::types::{
    Artifact, CreateProjectRequest, CreateTaskRequest, HistoryMessage, Project, SessionInfo, Task, TaskList,
    TaskReceipt, TaskResult,
};

/// Scripted backend: each task id answers with the next queued status.
#[derive(Default)]
struct MockApi {
    statuses: Mutex<HashMap<String, VecDeque<TaskStatus>>>,
    result_calls: Mutex<Vec<String>>,
}

impl MockApi {
    fn script(self, task_id: &str, statuses: &[TaskStatus]) -> Self {
        self.statuses.lock().unwrap().insert(task_id.to_owned(), statuses.iter().copied().collect());
        self
    }

    fn result_calls(&self) -> Vec<String> {
        self.result_calls.lock().unwrap().clone()
    }
}

fn unused() -> ClientError {
    ClientError::Network("not scripted".into())
}

#[async_trait]
impl AgentApi for MockApi {
    async fn create_task(&self, _request: &CreateTaskRequest) -> Result<TaskReceipt, ClientError> {
        Err(unused())
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, ClientError> {
        let mut statuses = self.statuses.lock().unwrap();
        let queue = statuses.get_mut(task_id).ok_or_else(|| ClientError::Http { status: 404, body: String::new() })?;
        let status = if queue.len() > 1 { queue.pop_front().unwrap() } else { *queue.front().unwrap() };
        Ok(serde_json::from_value(serde_json::json!({ "task_id": task_id, "status": status })).unwrap())
    }

    async fn list_tasks(&self) -> Result<TaskList, ClientError> {
        Err(unused())
    }

    async fn get_task_result(&self, task_id: &str) -> Result<TaskResult, ClientError> {
        self.result_calls.lock().unwrap().push(task_id.to_owned());
        Ok(TaskResult {
            task_id: task_id.to_owned(),
            success: true,
            artifacts: vec![Artifact {
                name: "maze.html".into(),
                path: "maze.html".into(),
                kind: "code".into(),
                size: Some(512),
                content: None,
            }],
            validation: Default::default(),
            error_message: None,
        })
    }

    async fn download_artifact(&self, _task_id: &str, _path: &str) -> Result<Vec<u8>, ClientError> {
        Err(unused())
    }

    async fn create_project(&self, _request: &CreateProjectRequest) -> Result<Project, ClientError> {
        Err(unused())
    }

    async fn get_project(&self, _project_id: &str) -> Result<Project, ClientError> {
        Err(unused())
    }

    async fn list_projects(&self) -> Result<Vec<Project>, ClientError> {
        Err(unused())
    }

    async fn create_session(&self, _project_id: &str, _name: &str) -> Result<SessionInfo, ClientError> {
        Err(unused())
    }

    async fn list_sessions(&self, _project_id: &str) -> Result<Vec<SessionInfo>, ClientError> {
        Err(unused())
    }

    async fn get_messages(&self, _session_id: &str) -> Result<Vec<HistoryMessage>, ClientError> {
        Err(unused())
    }

    async fn send_message(&self, _session_id: &str, _content: &str) -> Result<ByteStream, ClientError> {
        Err(unused())
    }

    async fn stop(&self, _session_id: &str) -> Result<(), ClientError> {
        Err(unused())
    }
}

fn status_of(ws: &Workspace, id: &WidgetId) -> StatusState {
    ws.engine.registry.get(id).unwrap().status
}

// =============================================================================
// poll_once
// =============================================================================

#[tokio::test]
async fn completed_task_fetches_result_once() {
    let api = MockApi::default().script("t-1", &[TaskStatus::Completed]);
    let mut ws = Workspace::new();
    let id = ws.create_task_widget("Task 1", "t-1", "Build me a maze game", 0).unwrap();

    let report = poll_once(&api, &mut ws).await;
    assert_eq!(report, PollReport { polled: 1, changed: 1, finished: 1, errors: 0 });
    assert_eq!(status_of(&ws, &id), StatusState::Completed);
    assert!(ws.engine.registry.get(&id).unwrap().result.is_some());

    let again = poll_once(&api, &mut ws).await;
    assert_eq!(again.polled, 0);
    assert_eq!(api.result_calls(), vec!["t-1"]);
}

#[tokio::test]
async fn failed_task_skips_result() {
    let api = MockApi::default().script("t-1", &[TaskStatus::Failed]);
    let mut ws = Workspace::new();
    let id = ws.create_task_widget("Task 1", "t-1", "goal", 0).unwrap();

    let report = poll_once(&api, &mut ws).await;
    assert_eq!(report.finished, 1);
    assert_eq!(status_of(&ws, &id), StatusState::Error);
    assert!(api.result_calls().is_empty());
}

#[tokio::test]
async fn poll_error_is_counted_and_others_continue() {
    let api = MockApi::default().script("t-2", &[TaskStatus::Executing]);
    let mut ws = Workspace::new();
    let missing = ws.create_task_widget("Task 1", "t-1", "goal", 0).unwrap();
    ws.create_task_widget("Task 2", "t-2", "goal", 0).unwrap();

    let report = poll_once(&api, &mut ws).await;
    assert_eq!(report.polled, 2);
    assert_eq!(report.errors, 1);
    assert_eq!(report.changed, 0);
    assert_eq!(status_of(&ws, &missing), StatusState::Running);
}

// =============================================================================
// poll_until_done
// =============================================================================

#[tokio::test(start_paused = true)]
async fn polls_until_every_task_finishes() {
    let api = MockApi::default()
        .script("t-1", &[TaskStatus::Planning, TaskStatus::Executing, TaskStatus::Completed])
        .script("t-2", &[TaskStatus::Verifying, TaskStatus::Failed]);
    let mut ws = Workspace::new();
    ws.create_task_widget("Task 1", "t-1", "goal", 0).unwrap();
    ws.create_task_widget("Task 2", "t-2", "goal", 0).unwrap();
    let (_tx, rx) = watch::channel(false);

    let report = poll_until_done(&api, &mut ws, Duration::from_secs(2), None, rx).await;

    assert_eq!(report.finished, 2);
    assert_eq!(report.polled, 5);
    assert!(ws.pollable_tasks().is_empty());
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_polling() {
    let api = MockApi::default().script("t-1", &[TaskStatus::Executing]);
    let mut ws = Workspace::new();
    ws.create_task_widget("Task 1", "t-1", "goal", 0).unwrap();
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send_replace(true);
    });

    let report = poll_until_done(&api, &mut ws, Duration::from_secs(2), None, rx).await;

    assert_eq!(report.polled, 3);
    assert_eq!(ws.pollable_tasks().len(), 1);
}

#[tokio::test]
async fn changed_pass_is_persisted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("desk.json");
    let persist = crate::persist::spawn_persist_worker(path.clone(), Duration::from_secs(60));
    let api = MockApi::default().script("t-1", &[TaskStatus::Completed]);
    let mut ws = Workspace::new();
    ws.create_task_widget("Task 1", "t-1", "goal", 0).unwrap();
    let (_tx, rx) = watch::channel(false);

    poll_until_done(&api, &mut ws, Duration::from_millis(10), Some(&persist), rx).await;
    persist.shutdown().await;

    let saved = crate::persist::load_snapshot(&path).await.unwrap().unwrap();
    assert_eq!(saved, ws.snapshot());
}
