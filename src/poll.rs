//! Task poller: keeps task widgets in step with the backend.
//!
//! Each pass asks the backend for every unfinished task widget, reflects the
//! status on the widget, and fetches the result once a task completes.
//! Failures are logged per task and never stop the pass; the next pass
//! simply asks again.

use std::time::Duration;

use canvas::registry::WidgetId;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::api::AgentApi;
use crate::api::types::TaskStatus;
use crate::error::{ClientError, ErrorCode};
use crate::persist::PersistHandle;
use crate::stream::now_ms;
use crate::workspace::Workspace;

/// What one or more polling passes did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    pub polled: usize,
    pub changed: usize,
    pub finished: usize,
    pub errors: usize,
}

impl PollReport {
    fn absorb(&mut self, other: Self) {
        self.polled += other.polled;
        self.changed += other.changed;
        self.finished += other.finished;
        self.errors += other.errors;
    }
}

/// Poll every unfinished task widget once.
pub async fn poll_once<A: AgentApi + ?Sized>(api: &A, workspace: &mut Workspace) -> PollReport {
    let mut report = PollReport::default();
    for (widget, task_id) in workspace.pollable_tasks() {
        report.polled += 1;
        match poll_task(api, workspace, &widget, &task_id).await {
            Ok(Progress { changed, finished }) => {
                report.changed += usize::from(changed);
                report.finished += usize::from(finished);
            }
            Err(e) => {
                report.errors += 1;
                warn!(widget_id = %widget, task_id, code = e.error_code(), error = %e, "task poll failed");
            }
        }
    }
    report
}

struct Progress {
    changed: bool,
    finished: bool,
}

async fn poll_task<A: AgentApi + ?Sized>(
    api: &A,
    workspace: &mut Workspace,
    widget: &WidgetId,
    task_id: &str,
) -> Result<Progress, ClientError> {
    let task = api.get_task(task_id).await?;
    let mut changed = workspace.apply_task_poll(widget, &task, now_ms());
    if task.status != TaskStatus::Completed {
        return Ok(Progress { changed, finished: task.status.is_terminal() });
    }
    let result = api.get_task_result(task_id).await?;
    changed |= workspace.attach_result(widget, &result, now_ms())?;
    info!(widget_id = %widget, task_id, artifacts = result.artifacts.len(), "task finished");
    Ok(Progress { changed, finished: true })
}

/// Poll every `interval` until no task widget is left unfinished or
/// `shutdown` flips to true. A dropped shutdown sender is ignored.
///
/// Changed workspaces are handed to `persist` after each pass.
pub async fn poll_until_done<A: AgentApi + ?Sized>(
    api: &A,
    workspace: &mut Workspace,
    interval: Duration,
    persist: Option<&PersistHandle>,
    mut shutdown: watch::Receiver<bool>,
) -> PollReport {
    let mut total = PollReport::default();
    loop {
        let pass = poll_once(api, workspace).await;
        debug!(?pass, "poll pass");
        total.absorb(pass);
        if pass.changed > 0
            && let Some(persist) = persist
        {
            persist.mark_dirty(workspace.snapshot());
        }
        if workspace.pollable_tasks().is_empty() || *shutdown.borrow() {
            break;
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            Ok(()) = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    info!(polled = total.polled, finished = total.finished, errors = total.errors, "polling stopped");
    total
}

#[cfg(test)]
#[path = "poll_test.rs"]
mod poll_test;
