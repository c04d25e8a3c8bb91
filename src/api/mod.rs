//! HTTP client for the agent backend.
//!
//! DESIGN
//! ======
//! `AgentApi` is the seam the rest of the crate talks to; `ApiClient` is the
//! reqwest implementation. Status checking and body parsing are plain
//! functions over strings so they can be tested without a server.
//!
//! Two reqwest clients are kept: one with the request timeout for ordinary
//! calls, and one with only a connect timeout for the message stream, which
//! may legitimately stay open longer than any request timeout.

pub mod types;

use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use reqwest::Url;
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::{ClientConfig, ConfigError};
use crate::error::ClientError;
use types::{
    CreateProjectRequest, CreateSessionRequest, CreateTaskRequest, HistoryMessage, Project, SendMessageRequest,
    SessionInfo, Task, TaskList, TaskReceipt, TaskResult,
};

/// Raw response body chunks of a streaming send.
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, ClientError>>;

/// Everything the client needs from the backend.
#[async_trait]
pub trait AgentApi: Send + Sync {
    async fn create_task(&self, request: &CreateTaskRequest) -> Result<TaskReceipt, ClientError>;
    async fn get_task(&self, task_id: &str) -> Result<Task, ClientError>;
    async fn list_tasks(&self) -> Result<TaskList, ClientError>;
    async fn get_task_result(&self, task_id: &str) -> Result<TaskResult, ClientError>;
    async fn download_artifact(&self, task_id: &str, path: &str) -> Result<Vec<u8>, ClientError>;

    async fn create_project(&self, request: &CreateProjectRequest) -> Result<Project, ClientError>;
    async fn get_project(&self, project_id: &str) -> Result<Project, ClientError>;
    async fn list_projects(&self) -> Result<Vec<Project>, ClientError>;
    async fn create_session(&self, project_id: &str, name: &str) -> Result<SessionInfo, ClientError>;
    async fn list_sessions(&self, project_id: &str) -> Result<Vec<SessionInfo>, ClientError>;
    /// Stored conversation of a session, oldest first.
    async fn get_messages(&self, session_id: &str) -> Result<Vec<HistoryMessage>, ClientError>;

    /// Start an assistant turn and return the event stream body.
    async fn send_message(&self, session_id: &str, content: &str) -> Result<ByteStream, ClientError>;
    /// Ask the backend to stop the session's running turn.
    async fn stop(&self, session_id: &str) -> Result<(), ClientError>;
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct ApiClient {
    base: Url,
    http: reqwest::Client,
    stream_http: reqwest::Client,
}

impl ApiClient {
    /// # Errors
    ///
    /// Returns an error if the base URL is not an absolute http(s) URL or
    /// the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        let base = parse_base_url(&config.base_url)?;
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;
        let stream_http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ClientError::Network(e.to_string()))?;
        Ok(Self { base, http, stream_http })
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ClientError> {
        endpoint(&self.base, segments)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, ClientError> {
        debug!(%url, "GET");
        let response = self.http.get(url).send().await.map_err(network)?;
        read_json(response).await
    }

    async fn post_json<B, T>(&self, url: Url, body: &B) -> Result<T, ClientError>
    where
        B: serde::Serialize + Sync + ?Sized,
        T: DeserializeOwned,
    {
        debug!(%url, "POST");
        let response = self.http.post(url).json(body).send().await.map_err(network)?;
        read_json(response).await
    }
}

#[async_trait]
impl AgentApi for ApiClient {
    async fn create_task(&self, request: &CreateTaskRequest) -> Result<TaskReceipt, ClientError> {
        self.post_json(self.endpoint(&["tasks"])?, request).await
    }

    async fn get_task(&self, task_id: &str) -> Result<Task, ClientError> {
        self.get_json(self.endpoint(&["tasks", task_id])?).await
    }

    async fn list_tasks(&self) -> Result<TaskList, ClientError> {
        self.get_json(self.endpoint(&["tasks"])?).await
    }

    async fn get_task_result(&self, task_id: &str) -> Result<TaskResult, ClientError> {
        self.get_json(self.endpoint(&["tasks", task_id, "result"])?).await
    }

    async fn download_artifact(&self, task_id: &str, path: &str) -> Result<Vec<u8>, ClientError> {
        let url = self.endpoint(&["tasks", task_id, "artifacts", path])?;
        debug!(%url, "GET artifact");
        let response = self.http.get(url).send().await.map_err(network)?;
        let status = response.status().as_u16();
        if !is_success(status) {
            let body = response.text().await.map_err(network)?;
            return Err(ClientError::Http { status, body });
        }
        let bytes = response.bytes().await.map_err(network)?;
        Ok(bytes.to_vec())
    }

    async fn create_project(&self, request: &CreateProjectRequest) -> Result<Project, ClientError> {
        self.post_json(self.endpoint(&["api", "projects"])?, request).await
    }

    async fn get_project(&self, project_id: &str) -> Result<Project, ClientError> {
        self.get_json(self.endpoint(&["api", "projects", project_id])?).await
    }

    async fn list_projects(&self) -> Result<Vec<Project>, ClientError> {
        self.get_json(self.endpoint(&["api", "projects"])?).await
    }

    async fn create_session(&self, project_id: &str, name: &str) -> Result<SessionInfo, ClientError> {
        let url = self.endpoint(&["api", "projects", project_id, "sessions"])?;
        self.post_json(url, &CreateSessionRequest { name }).await
    }

    async fn list_sessions(&self, project_id: &str) -> Result<Vec<SessionInfo>, ClientError> {
        self.get_json(self.endpoint(&["api", "projects", project_id, "sessions"])?).await
    }

    async fn get_messages(&self, session_id: &str) -> Result<Vec<HistoryMessage>, ClientError> {
        self.get_json(self.endpoint(&["api", "sessions", session_id, "messages"])?).await
    }

    async fn send_message(&self, session_id: &str, content: &str) -> Result<ByteStream, ClientError> {
        let mut url = self.endpoint(&["api", "sessions", session_id, "messages"])?;
        url.query_pairs_mut().append_pair("stream", "true");
        debug!(%url, "POST stream");
        let response = self
            .stream_http
            .post(url)
            .header(ACCEPT, "text/event-stream")
            .json(&SendMessageRequest { content })
            .send()
            .await
            .map_err(network)?;
        let status = response.status().as_u16();
        if !is_success(status) {
            let body = response.text().await.map_err(network)?;
            return Err(ClientError::Http { status, body });
        }
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(network))
            .boxed())
    }

    async fn stop(&self, session_id: &str) -> Result<(), ClientError> {
        let url = self.endpoint(&["api", "sessions", session_id, "stop"])?;
        debug!(%url, "POST stop");
        let response = self.http.post(url).send().await.map_err(network)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(network)?;
        check_status(status, body).map(|_| ())
    }
}

// =============================================================================
// PURE HELPERS
// =============================================================================

fn parse_base_url(raw: &str) -> Result<Url, ClientError> {
    let invalid = || ClientError::Config(ConfigError::InvalidValue { key: "AGENTDESK_BASE_URL", value: raw.to_owned() });
    let url = Url::parse(raw).map_err(|_| invalid())?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(invalid());
    }
    Ok(url)
}

/// Append percent-encoded path segments to `base`.
///
/// Each segment is encoded on its own, so an artifact path such as
/// `out/index.html` stays one segment (`out%2Findex.html`).
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ClientError> {
    let mut url = base.clone();
    {
        let mut path = url.path_segments_mut().map_err(|()| {
            ClientError::Config(ConfigError::InvalidValue { key: "AGENTDESK_BASE_URL", value: base.to_string() })
        })?;
        path.pop_if_empty();
        path.extend(segments);
    }
    Ok(url)
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

/// Pass the body through on 2xx, otherwise turn it into [`ClientError::Http`].
pub(crate) fn check_status(status: u16, body: String) -> Result<String, ClientError> {
    if is_success(status) { Ok(body) } else { Err(ClientError::Http { status, body }) }
}

pub(crate) fn parse_json<T: DeserializeOwned>(body: &str) -> Result<T, ClientError> {
    Ok(serde_json::from_str(body)?)
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status().as_u16();
    let body = response.text().await.map_err(network)?;
    let body = check_status(status, body)?;
    parse_json(&body)
}

fn network(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        return ClientError::Network(format!("timed out: {e}"));
    }
    ClientError::Network(e.to_string())
}
