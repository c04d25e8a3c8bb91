use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use agentdesk::api::types::{CreateProjectRequest, CreateTaskRequest, ProjectType};
use agentdesk::api::{AgentApi, ApiClient};
use agentdesk::config::{ConfigError, DEFAULT_LOG_FILTER};
use agentdesk::persist::{PersistHandle, load_snapshot, spawn_persist_worker};
use agentdesk::poll::poll_until_done;
use agentdesk::session::{Applied, MessageStatus, Session, SessionError};
use agentdesk::stream::{DriveOptions, StreamTarget, drive_stream, now_ms};
use agentdesk::workspace::{WidgetStream, Workspace};
use agentdesk::{ClientConfig, ClientError, ErrorCode};
use canvas::registry::WidgetId;
use clap::{Args, Parser, Subcommand};
use events::{Phase, StreamEvent};
use progress::{Checklist, TaskState};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("write failed: {0}")]
    Io(#[from] io::Error),
    #[error("invalid JSON payload: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("{0}")]
    Stream(String),
}

#[derive(Parser, Debug)]
#[command(name = "agentdesk", about = "Agent task canvas client")]
struct Cli {
    /// Overrides AGENTDESK_BASE_URL.
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Task(TaskCommand),
    Project(ProjectCommand),
    /// Send a message and stream the reply.
    Send {
        session_id: String,
        message: String,
    },
    /// Stop the session's running turn.
    Stop {
        session_id: String,
    },
    /// Print a session's stored messages.
    History {
        session_id: String,
    },
    Canvas(CanvasCommand),
}

#[derive(Args, Debug)]
struct TaskCommand {
    #[command(subcommand)]
    command: TaskSubcommand,
}

#[derive(Subcommand, Debug)]
enum TaskSubcommand {
    Create {
        goal: String,
        #[arg(long)]
        context: Option<String>,
        #[arg(long = "constraint")]
        constraints: Vec<String>,
        /// Poll until the task finishes.
        #[arg(long = "watch", default_value_t = false)]
        follow: bool,
    },
    Get {
        task_id: String,
    },
    List,
    Result {
        task_id: String,
    },
    Download {
        task_id: String,
        path: String,
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct ProjectCommand {
    #[command(subcommand)]
    command: ProjectSubcommand,
}

#[derive(Subcommand, Debug)]
enum ProjectSubcommand {
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long = "type", default_value = "content")]
        kind: ProjectType,
    },
    Get {
        project_id: String,
    },
    List,
    /// Open a chat session in a project.
    Session {
        project_id: String,
        #[arg(long, default_value = "Session")]
        name: String,
    },
    /// List a project's chat sessions.
    Sessions {
        project_id: String,
    },
}

#[derive(Args, Debug)]
struct CanvasCommand {
    #[command(subcommand)]
    command: CanvasSubcommand,
}

#[derive(Subcommand, Debug)]
enum CanvasSubcommand {
    /// Print the saved widgets in paint order.
    Show,
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(e) if e.not_found() => {}
        Err(e) => eprintln!("ignoring .env: {e}"),
    }
    let cli = Cli::parse();
    let mut config = ClientConfig::from_env()?;
    if let Some(url) = cli.base_url {
        config.base_url = url.trim().trim_end_matches('/').to_owned();
    }

    let filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(io::stderr).init();

    match cli.command {
        Command::Task(task) => run_task(&config, &ApiClient::new(&config)?, task).await,
        Command::Project(project) => run_project(&ApiClient::new(&config)?, project).await,
        Command::Send { session_id, message } => {
            let api = Arc::new(ApiClient::new(&config)?);
            run_send(&config, api, session_id, &message).await
        }
        Command::Stop { session_id } => {
            ApiClient::new(&config)?.stop(&session_id).await?;
            println!("stop requested");
            Ok(())
        }
        Command::History { session_id } => print_json(&ApiClient::new(&config)?.get_messages(&session_id).await?),
        Command::Canvas(canvas) => run_canvas(&config, canvas).await,
    }
}

// =============================================================================
// TASKS / PROJECTS
// =============================================================================

async fn run_task(config: &ClientConfig, api: &ApiClient, task: TaskCommand) -> Result<(), CliError> {
    match task.command {
        TaskSubcommand::Create { goal, context, constraints, follow } => {
            let request = CreateTaskRequest { goal: goal.clone(), context, constraints };
            let receipt = api.create_task(&request).await?;
            print_json(&receipt)?;

            let (mut workspace, persist) = open_workspace(config).await?;
            let title = workspace.next_task_title();
            let widget = workspace.create_task_widget(&title, &receipt.task_id, &goal, now_ms())?;
            persist.mark_dirty(workspace.snapshot());

            if follow {
                let (shutdown, rx) = watch::channel(false);
                let ctrl_c = tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        shutdown.send_replace(true);
                    }
                });
                let report = poll_until_done(api, &mut workspace, config.poll_interval, Some(&persist), rx).await;
                ctrl_c.abort();
                print_caption(&workspace, &widget);
                info!(finished = report.finished, errors = report.errors, "watch ended");
            }
            persist.shutdown().await;
            Ok(())
        }
        TaskSubcommand::Get { task_id } => print_json(&api.get_task(&task_id).await?),
        TaskSubcommand::List => print_json(&api.list_tasks().await?),
        TaskSubcommand::Result { task_id } => print_json(&api.get_task_result(&task_id).await?),
        TaskSubcommand::Download { task_id, path, output } => {
            let bytes = api.download_artifact(&task_id, &path).await?;
            let output = output.unwrap_or_else(|| default_download_path(&path));
            tokio::fs::write(&output, &bytes).await?;
            println!("wrote {} bytes to {}", bytes.len(), output.display());
            Ok(())
        }
    }
}

fn default_download_path(artifact_path: &str) -> PathBuf {
    Path::new(artifact_path).file_name().map_or_else(|| PathBuf::from("artifact"), PathBuf::from)
}

async fn run_project(api: &ApiClient, project: ProjectCommand) -> Result<(), CliError> {
    match project.command {
        ProjectSubcommand::Create { name, description, kind } => {
            print_json(&api.create_project(&CreateProjectRequest { name, description, kind }).await?)
        }
        ProjectSubcommand::Get { project_id } => print_json(&api.get_project(&project_id).await?),
        ProjectSubcommand::List => print_json(&api.list_projects().await?),
        ProjectSubcommand::Session { project_id, name } => {
            print_json(&api.create_session(&project_id, &name).await?)
        }
        ProjectSubcommand::Sessions { project_id } => print_json(&api.list_sessions(&project_id).await?),
    }
}

// =============================================================================
// STREAMING
// =============================================================================

async fn run_send(
    config: &ClientConfig,
    api: Arc<ApiClient>,
    session_id: String,
    message: &str,
) -> Result<(), CliError> {
    let (mut workspace, persist) = open_workspace(config).await?;
    let title = format!("Session {session_id}");
    let widget = match workspace.find_by_title(&title) {
        Some(id) => {
            workspace.bind_session(&id, &session_id);
            id
        }
        None => workspace.create_session_widget(&title, &session_id)?,
    };
    match api.get_messages(&session_id).await {
        Ok(history) => {
            let received = now_ms();
            workspace.load_history(&widget, history.into_iter().map(|m| m.into_message(received)).collect());
        }
        Err(e) => warn!(session_id = %session_id, code = e.error_code(), error = %e, "could not load session history"),
    }
    workspace.begin_turn(&widget, message, now_ms());
    let handle = workspace.stop_handle(&widget).unwrap_or_default();

    let body = match api.send_message(&session_id, message).await {
        Ok(body) => body,
        Err(e) => {
            WidgetStream { workspace: &mut workspace, widget }.transport_failed(&e.user_message(), now_ms());
            persist.mark_dirty(workspace.snapshot());
            persist.shutdown().await;
            return Err(e.into());
        }
    };

    let ctrl_c = {
        let api = Arc::clone(&api);
        let handle = handle.clone();
        let session_id = session_id.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "ctrl-c handler unavailable");
                return;
            }
            eprintln!("stopping...");
            handle.stop();
            if let Err(e) = api.stop(&session_id).await {
                warn!(session_id = %session_id, error = %e, "stop request failed");
            }
        })
    };

    let options = DriveOptions { scale: config.progress_scale, stop_grace: config.stop_grace };
    let mut console = Console::new(WidgetStream { workspace: &mut workspace, widget });
    let outcome = drive_stream(&mut console, body, handle.subscribe(), options).await;
    ctrl_c.abort();
    println!();

    let failure = match outcome.final_status {
        Some(MessageStatus::Error) => workspace
            .session(&widget)
            .and_then(Session::latest_assistant)
            .map(|m| m.content.clone()),
        _ => None,
    };
    persist.mark_dirty(workspace.snapshot());
    persist.shutdown().await;
    outcome.ensure_finished(options.stop_grace)?;
    match failure {
        Some(text) => Err(CliError::Stream(text)),
        None => Ok(()),
    }
}

/// Echoes a widget stream to the terminal: reply text to stdout, checklist to stderr.
struct Console<'a> {
    inner: WidgetStream<'a>,
    printed: usize,
    checklist_line: String,
}

impl<'a> Console<'a> {
    fn new(inner: WidgetStream<'a>) -> Self {
        Self { inner, printed: 0, checklist_line: String::new() }
    }

    fn echo(&mut self) {
        let workspace = &*self.inner.workspace;
        let widget = self.inner.widget;
        if let Some(message) = workspace.session(&widget).and_then(Session::latest_assistant)
            && message.status != MessageStatus::Error
            && let Some(tail) = message.content.get(self.printed..)
            && !tail.is_empty()
        {
            print!("{tail}");
            if let Err(e) = io::stdout().flush() {
                warn!(error = %e, "stdout flush failed");
            }
            self.printed = message.content.len();
        }
        if let Some(checklist) = workspace.checklist(&widget) {
            let line = render_checklist(checklist);
            if line != self.checklist_line {
                eprintln!("{line}");
                self.checklist_line = line;
            }
        }
    }
}

impl StreamTarget for Console<'_> {
    fn apply_event(&mut self, event: &StreamEvent, now_ms: i64) -> Result<Applied, SessionError> {
        let applied = self.inner.apply_event(event, now_ms);
        self.echo();
        applied
    }

    fn transport_failed(&mut self, text: &str, now_ms: i64) {
        self.inner.transport_failed(text, now_ms);
        self.echo();
    }

    fn stream_ended(&mut self, now_ms: i64) {
        self.inner.stream_ended(now_ms);
        self.echo();
    }

    fn stop_requested(&mut self, now_ms: i64, grace_ms: i64) {
        self.inner.stop_requested(now_ms, grace_ms);
    }

    fn stop_expired(&mut self, now_ms: i64) -> bool {
        let forced = self.inner.stop_expired(now_ms);
        self.echo();
        forced
    }

    fn final_status(&self) -> Option<MessageStatus> {
        self.inner.final_status()
    }
}

fn render_checklist(checklist: &Checklist) -> String {
    checklist
        .tasks()
        .iter()
        .map(|task| {
            let mark = match task.state {
                TaskState::Pending => ' ',
                TaskState::Active => '>',
                TaskState::Completed => 'x',
                TaskState::Failed => '!',
            };
            format!("[{mark}] {}", task.label)
        })
        .collect::<Vec<_>>()
        .join("  ")
}

// =============================================================================
// CANVAS
// =============================================================================

async fn run_canvas(config: &ClientConfig, canvas: CanvasCommand) -> Result<(), CliError> {
    match canvas.command {
        CanvasSubcommand::Show => {
            let Some(snapshot) = load_snapshot(&config.snapshot_path).await? else {
                println!("no snapshot at {}", config.snapshot_path.display());
                return Ok(());
            };
            let mut workspace = Workspace::new();
            workspace.restore(snapshot)?;
            let viewport = workspace.engine.viewport;
            println!("viewport pan=({:.0}, {:.0}) scale={:.2}", viewport.pan.x, viewport.pan.y, viewport.scale());
            for widget in workspace.engine.registry.paint_order() {
                let caption = workspace.caption(&widget.id).unwrap_or_default();
                let done = workspace.checklist(&widget.id).map_or(0, Checklist::completed_count);
                println!(
                    "{:>3}  {:<9}  {}  @({:.0}, {:.0}) {:.0}x{:.0}  {}  [{done}/{}]",
                    widget.z_index,
                    format!("{:?}", widget.status),
                    widget.title,
                    widget.position.x,
                    widget.position.y,
                    widget.size.width,
                    widget.size.height,
                    caption,
                    Phase::ALL.len(),
                );
            }
            Ok(())
        }
    }
}

// =============================================================================
// HELPERS
// =============================================================================

async fn open_workspace(config: &ClientConfig) -> Result<(Workspace, PersistHandle), CliError> {
    let mut workspace = Workspace::new();
    if let Some(snapshot) = load_snapshot(&config.snapshot_path).await? {
        workspace.restore(snapshot)?;
    }
    let persist = spawn_persist_worker(config.snapshot_path.clone(), config.persist_debounce);
    Ok((workspace, persist))
}

fn print_caption(workspace: &Workspace, id: &WidgetId) {
    if let Some(widget) = workspace.engine.registry.get(id) {
        let caption = workspace.caption(id).unwrap_or_default();
        eprintln!("{}: {caption}", widget.title);
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
