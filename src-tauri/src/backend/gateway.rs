//! Request gateway to the backend.
//!
//! Transparent proxy: the path is appended to the backend base URL as-is,
//! method/headers/body pass through, and the response comes back decoded
//! as JSON or as text. No retries and no per-call state.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::Method;
use serde::{Deserialize, Serialize};

use super::supervisor::ProcessSupervisor;
use crate::error::RequestError;

/// Request options as sent by the front end (a subset of `fetch`'s `RequestInit`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RequestOptions {
    /// Defaults to GET.
    pub method: Option<String>,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
}

/// A validated request ready to send.
#[derive(Debug, Clone)]
pub struct ForwardedRequest {
    pub path: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<String>,
}

impl ForwardedRequest {
    pub fn new(path: &str, options: RequestOptions) -> Result<Self, RequestError> {
        let method = match options.method.as_deref() {
            None => Method::GET,
            Some(m) => Method::from_bytes(m.to_ascii_uppercase().as_bytes())
                .map_err(|_| RequestError::InvalidRequest(format!("bad method '{}'", m)))?,
        };

        let mut headers = HeaderMap::new();
        for (name, value) in &options.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| RequestError::InvalidRequest(format!("bad header name '{}'", name)))?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                RequestError::InvalidRequest(format!("bad value for header '{}'", name))
            })?;
            headers.insert(name, value);
        }

        Ok(Self {
            path: path.to_string(),
            method,
            headers,
            body: options.body,
        })
    }
}

/// Response body, JSON-decoded when the backend says it is JSON.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum Payload {
    Json(serde_json::Value),
    Text(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct ForwardedResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub payload: Payload,
}

/// True for `application/json` and `+json` media types.
pub fn is_json_content_type(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    essence == "application/json" || essence.ends_with("+json")
}

/// Single choke point for backend calls from the unprivileged side.
#[derive(Clone)]
pub struct RequestGateway {
    supervisor: Arc<ProcessSupervisor>,
    client: reqwest::Client,
}

impl RequestGateway {
    pub fn new(supervisor: Arc<ProcessSupervisor>) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = supervisor.settings().request_timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            supervisor,
            client: builder.build()?,
        })
    }

    pub fn supervisor(&self) -> &Arc<ProcessSupervisor> {
        &self.supervisor
    }

    /// Forward a request to `{base_url}{path}`.
    ///
    /// Fails with `BackendUnavailable` before any I/O when the supervisor is
    /// not running. Non-2xx responses are relayed, not treated as errors.
    pub async fn forward(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> Result<ForwardedResponse, RequestError> {
        if !self.supervisor.is_running().await {
            return Err(RequestError::BackendUnavailable);
        }

        let request = ForwardedRequest::new(path, options)?;
        let url = self.supervisor.endpoint().url(&request.path);
        log::debug!("[Gateway] {} {}", request.method, url);

        self.send(&url, request).await.map_err(|e| {
            log::error!("[Gateway] API request failed: {}", e);
            RequestError::Transport(e)
        })
    }

    async fn send(
        &self,
        url: &str,
        request: ForwardedRequest,
    ) -> Result<ForwardedResponse, reqwest::Error> {
        let mut outgoing = self
            .client
            .request(request.method, url)
            .headers(request.headers);
        if let Some(body) = request.body {
            outgoing = outgoing.body(body);
        }

        let response = outgoing.send().await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let payload = match content_type.as_deref() {
            Some(ct) if is_json_content_type(ct) => Payload::Json(response.json().await?),
            _ => Payload::Text(response.text().await?),
        };

        Ok(ForwardedResponse {
            status,
            content_type,
            payload,
        })
    }
}
