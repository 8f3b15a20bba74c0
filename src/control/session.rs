//! Control-plane session.
//!
//! Owns at most one [`reqwest::Client`] at a time. `connect` and
//! `disconnect` are idempotent and purely local; remote reachability is
//! only discovered by the first [`request`](ControlSession::request).
//! No public method returns an error: every failure is folded into an
//! error-shaped [`ControlReply`].

use reqwest::{Client, Method, StatusCode, Url};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::{ControlConfig, GlobalConfig};
use crate::control::ControlReply;
use crate::{AppError, Result};

/// Point-in-time view of the control session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlStatus {
    /// Control-plane host.
    pub host: String,
    /// Control-plane port.
    pub port: u16,
    /// Base URL every request path is appended to.
    pub base_url: String,
    /// Whether a client handle is currently allocated.
    pub session_active: bool,
}

/// Reusable connection to the simulator's control endpoint.
#[derive(Debug)]
pub struct ControlSession {
    host: String,
    port: u16,
    base_url: String,
    settings: ControlConfig,
    client: Option<Client>,
}

impl ControlSession {
    /// Create a session targeting `http://{host}:{rest_port}`.
    #[must_use]
    pub fn new(config: &GlobalConfig) -> Self {
        let base_url = format!("http://{}:{}", config.host, config.rest_port);
        info!(base_url, "control session configured");
        Self {
            host: config.host.clone(),
            port: config.rest_port,
            base_url,
            settings: config.control.clone(),
            client: None,
        }
    }

    /// Base URL of the control endpoint.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Whether a client handle is allocated.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.client.is_some()
    }

    /// Allocate the client handle if absent.
    ///
    /// A client that cannot be built (TLS backend failure) is logged and
    /// the session stays inactive; the next request retries the build.
    pub fn connect(&mut self) {
        if self.client.is_some() {
            return;
        }
        match self.build_client() {
            Ok(client) => {
                self.client = Some(client);
                info!(base_url = self.base_url, "control session created");
            }
            Err(err) => {
                error!(%err, "failed to create control session");
            }
        }
    }

    /// Release the client handle. Safe to call repeatedly.
    pub fn disconnect(&mut self) {
        if self.client.take().is_some() {
            info!(base_url = self.base_url, "control session closed");
        }
    }

    /// Issue one `(method, path, body)` call.
    ///
    /// Returns the decoded JSON body on HTTP 200. Any other status yields
    /// `{"error": "HTTP <code>"}`; transport and decode failures yield
    /// `{"error": "<error text>"}`.
    pub async fn request(&mut self, method: Method, path: &str, body: Option<&Value>) -> ControlReply {
        let url = format!("{}{}", self.base_url, path);
        self.send(method, &url, body).await
    }

    /// Issue one call whose path segments and query pairs are
    /// percent-encoded, so caller-supplied values cannot change the route.
    pub(crate) async fn request_encoded(
        &mut self,
        method: Method,
        segments: &[&str],
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> ControlReply {
        let mut url = match Url::parse(&self.base_url) {
            Ok(url) => url,
            Err(err) => return ControlReply::error(format!("invalid control url: {err}")),
        };
        match url.path_segments_mut() {
            Ok(mut path) => {
                path.pop_if_empty().extend(segments);
            }
            Err(()) => return ControlReply::error("invalid control url"),
        }
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        self.send(method, url.as_str(), body).await
    }

    async fn send(&mut self, method: Method, url: &str, body: Option<&Value>) -> ControlReply {
        self.connect();
        let Some(client) = self.client.as_ref() else {
            return ControlReply::error("control session unavailable");
        };

        debug!(%method, url, "control request");

        let mut builder = client.request(method, url);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(err) => {
                error!(url, %err, "control request failed");
                return ControlReply::error(err.to_string());
            }
        };

        let status = response.status();
        if status != StatusCode::OK {
            let text = response.text().await.unwrap_or_default();
            error!(url, status = status.as_u16(), body = text, "control request rejected");
            return ControlReply::error(format!("HTTP {}", status.as_u16()));
        }

        match response.json::<Value>().await {
            Ok(value) => ControlReply::payload(value),
            Err(err) => {
                error!(url, %err, "control response was not valid json");
                ControlReply::error(err.to_string())
            }
        }
    }

    /// Current status snapshot.
    #[must_use]
    pub fn status(&self) -> ControlStatus {
        ControlStatus {
            host: self.host.clone(),
            port: self.port,
            base_url: self.base_url.clone(),
            session_active: self.client.is_some(),
        }
    }

    fn build_client(&self) -> Result<Client> {
        let mut builder = Client::builder();
        if let Some(timeout) = self.settings.request_timeout() {
            builder = builder.timeout(timeout);
        }
        if let Some(timeout) = self.settings.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        builder
            .build()
            .map_err(|err| AppError::Control(format!("failed to build http client: {err}")))
    }
}
