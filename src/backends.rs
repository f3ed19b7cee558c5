//! Generation backends: the DeepSeek chat-completions API (cloud) and an
//! Ollama server (local), both reached through an injected [`HttpClient`].

use crate::error::{TransportError, WorkflowError, WorkflowResult};
use crate::http_client::{HttpClient, HttpResponse};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use tracing::{debug, info, warn};

pub const DEFAULT_CLOUD_URL: &str = "https://api.deepseek.com/chat/completions";
pub const DEFAULT_LOCAL_URL: &str = "http://localhost:11434";
const TEMPERATURE: f64 = 0.7;
const CLOUD_MAX_TOKENS: u32 = 500;
const ERROR_BODY_LIMIT: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Cloud,
    Local,
}

impl BackendKind {
    pub const ALL: [BackendKind; 2] = [BackendKind::Cloud, BackendKind::Local];

    pub fn label(self) -> &'static str {
        match self {
            BackendKind::Cloud => "DeepSeek API (cloud)",
            BackendKind::Local => "Ollama (local)",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Cloud => write!(f, "cloud"),
            BackendKind::Local => write!(f, "local"),
        }
    }
}

/// The backend and model one generation run will use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSelection {
    pub kind: BackendKind,
    pub model: String,
}

impl BackendSelection {
    pub fn new(kind: BackendKind, model: &str) -> Self {
        Self {
            kind,
            model: model.to_string(),
        }
    }
}

/// A model installed on the local backend.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LocalModel {
    pub name: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl LocalModel {
    pub fn label(&self) -> String {
        match self.size {
            Some(bytes) => format!("{} ({:.1} GB)", self.name, bytes as f64 / 1_000_000_000.0),
            None => self.name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<LocalModel>,
}

#[derive(Debug, Deserialize)]
struct LocalGenerateResponse {
    response: String,
}

/// Where the two backends live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub cloud_url: String,
    pub local_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            cloud_url: DEFAULT_CLOUD_URL.to_string(),
            local_url: DEFAULT_LOCAL_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Default endpoints, overridden by `DIFFSCRIBE_CLOUD_URL` and `OLLAMA_HOST`.
    pub fn from_env() -> Self {
        let mut endpoints = Self::default();
        if let Ok(url) = std::env::var("DIFFSCRIBE_CLOUD_URL") {
            endpoints.cloud_url = url;
        }
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            endpoints.local_url = if host.starts_with("http") {
                host
            } else {
                format!("http://{}", host)
            };
        }
        endpoints.local_url = endpoints.local_url.trim_end_matches('/').to_string();
        endpoints
    }
}

/// Sends requests to whichever backend a [`BackendSelection`] names.
pub struct BackendClient<C> {
    http: C,
    endpoints: Endpoints,
}

impl<C: HttpClient> BackendClient<C> {
    pub fn new(http: C, endpoints: Endpoints) -> Self {
        Self { http, endpoints }
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn http(&self) -> &C {
        &self.http
    }

    /// Requests one non-streaming completion and returns the raw text.
    pub async fn complete(
        &self,
        selection: &BackendSelection,
        credential: Option<&str>,
        prompt: &str,
    ) -> WorkflowResult<String> {
        info!(
            "Requesting completion from {} backend with model {} ({} prompt chars)",
            selection.kind,
            selection.model,
            prompt.len()
        );
        match selection.kind {
            BackendKind::Cloud => {
                let credential = credential.ok_or_else(|| WorkflowError::BackendRequestFailed {
                    backend: BackendKind::Cloud,
                    status: 401,
                    detail: "No API key configured".to_string(),
                })?;
                self.complete_cloud(&selection.model, credential, prompt).await
            }
            BackendKind::Local => self.complete_local(&selection.model, prompt).await,
        }
    }

    async fn complete_cloud(&self, model: &str, credential: &str, prompt: &str) -> WorkflowResult<String> {
        let body = json!({
            "model": model,
            "messages": [
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "stream": false,
            "temperature": TEMPERATURE,
            "max_tokens": CLOUD_MAX_TOKENS
        });
        let auth = format!("Bearer {}", credential);
        let headers = [("Authorization", auth.as_str()), ("Content-Type", "application/json")];

        let response = self
            .http
            .post_json(&self.endpoints.cloud_url, &headers, &body)
            .await
            .map_err(|e| unreachable_error(BackendKind::Cloud, &self.endpoints.cloud_url, e))?;

        if !response.is_success() {
            return Err(cloud_status_error(&response));
        }

        let value: serde_json::Value =
            serde_json::from_str(&response.body).map_err(|e| WorkflowError::InvalidResponse {
                backend: BackendKind::Cloud,
                detail: e.to_string(),
            })?;

        value
            .get("choices")
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first())
            .and_then(|choice| choice.get("message"))
            .and_then(|message| message.get("content"))
            .and_then(|content| content.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                warn!("Cloud response had no choices[0].message.content");
                WorkflowError::InvalidResponse {
                    backend: BackendKind::Cloud,
                    detail: "missing choices[0].message.content".to_string(),
                }
            })
    }

    async fn complete_local(&self, model: &str, prompt: &str) -> WorkflowResult<String> {
        let url = format!("{}/api/generate", self.endpoints.local_url);
        let body = json!({
            "model": model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": TEMPERATURE
            }
        });

        let response = self
            .http
            .post_json(&url, &[("Content-Type", "application/json")], &body)
            .await
            .map_err(|e| unreachable_error(BackendKind::Local, &self.endpoints.local_url, e))?;

        if !response.is_success() {
            return Err(local_status_error(&response));
        }

        let parsed: LocalGenerateResponse =
            serde_json::from_str(&response.body).map_err(|e| WorkflowError::InvalidResponse {
                backend: BackendKind::Local,
                detail: e.to_string(),
            })?;
        Ok(parsed.response)
    }

    /// Lists the models installed on the local backend.
    pub async fn list_local_models(&self) -> WorkflowResult<Vec<LocalModel>> {
        let url = format!("{}/api/tags", self.endpoints.local_url);
        let response = self
            .http
            .get(&url, &[])
            .await
            .map_err(|e| unreachable_error(BackendKind::Local, &self.endpoints.local_url, e))?;

        if !response.is_success() {
            return Err(local_status_error(&response));
        }

        let tags: TagsResponse =
            serde_json::from_str(&response.body).map_err(|e| WorkflowError::InvalidResponse {
                backend: BackendKind::Local,
                detail: e.to_string(),
            })?;
        debug!("Local backend reports {} model(s)", tags.models.len());
        Ok(tags.models)
    }
}

/// Rewrites a transport failure into a backend-specific explanation.
fn unreachable_error(backend: BackendKind, url: &str, err: TransportError) -> WorkflowError {
    warn!("{} backend transport failure: {}", backend, err);
    let detail = match (backend, &err) {
        (BackendKind::Cloud, TransportError::ConnectionRefused) => {
            "Could not connect to the DeepSeek API. Check your internet connection.".to_string()
        }
        (BackendKind::Cloud, TransportError::HostNotFound) => {
            "Could not resolve the DeepSeek API host. Check your internet connection or DNS settings."
                .to_string()
        }
        (BackendKind::Cloud, TransportError::Timeout) => {
            "The DeepSeek API did not respond in time. It may be overloaded.".to_string()
        }
        (BackendKind::Local, TransportError::ConnectionRefused) => {
            format!("Could not connect to Ollama at {}. Is `ollama serve` running?", url)
        }
        (BackendKind::Local, TransportError::HostNotFound) => {
            format!("Could not resolve the Ollama host {}. Check OLLAMA_HOST.", url)
        }
        (BackendKind::Local, TransportError::Timeout) => {
            format!("Ollama at {} did not respond in time. The model may still be loading.", url)
        }
        (_, TransportError::Other(message)) => format!("Request to {} failed: {}", url, message),
    };
    WorkflowError::BackendUnreachable { backend, detail }
}

fn cloud_status_error(response: &HttpResponse) -> WorkflowError {
    let detail = match response.status {
        429 => "Rate limit reached. Wait a moment, or switch to another model or backend.".to_string(),
        401 => "Invalid API key. Check DEEPSEEK_API_KEY or run with --set-api-key.".to_string(),
        402 => "Insufficient account balance. Top up your DeepSeek account.".to_string(),
        503 => "The DeepSeek API is temporarily unavailable. Try again later.".to_string(),
        _ => format!("Unexpected API error: {}", truncate(&response.body)),
    };
    WorkflowError::BackendRequestFailed {
        backend: BackendKind::Cloud,
        status: response.status,
        detail,
    }
}

fn local_status_error(response: &HttpResponse) -> WorkflowError {
    WorkflowError::BackendRequestFailed {
        backend: BackendKind::Local,
        status: response.status,
        detail: truncate(&response.body),
    }
}

fn truncate(body: &str) -> String {
    let body = body.trim();
    match body.char_indices().nth(ERROR_BODY_LIMIT) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
