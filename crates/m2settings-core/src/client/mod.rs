//! Remote repository manager client
//!
//! This module provides:
//! - The `Connector` and `Session` capability traits the download workflow talks to
//! - Connection and server data types (status, template listing, user token)
//! - A reqwest-backed implementation for the Nexus REST API (`nexus`)

pub mod nexus;

use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use url::Url;

pub use nexus::NexusConnector;

/// Errors raised by the remote client
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Invalid server URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Request to {url} failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Authentication rejected by {url}: HTTP {status}")]
    Unauthorized { url: String, status: u16 },

    #[error("Unexpected response from {url}: HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("Failed to decode response from {url}: {reason}")]
    Decode { url: String, reason: String },

    #[error("No templates are accessible")]
    NoTemplates,

    #[error("Template not found: {id}")]
    TemplateNotFound { id: String },

    #[error("User tokens are not available")]
    UserTokenUnavailable,

    #[error("Session is closed")]
    Closed,
}

/// Server credentials are wrapped so they never end up in logs
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Access the secret value
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

/// Everything needed to open a session
#[derive(Debug, Clone)]
pub struct ConnectionRequest {
    pub server_url: String,
    pub username: String,
    pub secret: Secret,
}

impl ConnectionRequest {
    pub fn new(server_url: impl Into<String>, username: impl Into<String>, secret: Secret) -> Self {
        Self {
            server_url: server_url.into(),
            username: username.into(),
            secret,
        }
    }

    /// Parse the server URL into a base URL with an explicit http(s) scheme
    ///
    /// The returned URL always ends with `/` so relative REST paths join beneath it.
    pub fn base_url(&self) -> Result<Url, ClientError> {
        parse_base_url(&self.server_url)
    }
}

/// Parse and normalize a server base URL
pub fn parse_base_url(raw: &str) -> Result<Url, ClientError> {
    let trimmed = raw.trim();
    let mut url = Url::parse(trimmed).map_err(|e| ClientError::InvalidUrl {
        url: trimmed.to_string(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ClientError::InvalidUrl {
            url: trimmed.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(ClientError::InvalidUrl {
            url: trimmed.to_string(),
            reason: "missing host".to_string(),
        });
    }

    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}

/// Whether the URL uses a plaintext protocol
pub fn is_insecure(url: &Url) -> bool {
    url.scheme() == "http"
}

/// Server identity reported once per session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerStatus {
    pub app_name: String,
    /// Short edition name, e.g. `PRO` or `OSS`
    pub edition: String,
    pub version: String,
}

/// A template available on the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateDescriptor {
    pub id: String,
}

impl TemplateDescriptor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// A per-user access token issued by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserToken {
    pub name_code: String,
    pub pass_code: Secret,
}

/// Opens sessions against a repository manager
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, request: &ConnectionRequest) -> Result<Box<dyn Session>, ClientError>;
}

/// A connected, authenticated session
#[async_trait]
pub trait Session: Send + Sync {
    /// Base URL the session is connected to
    fn base_url(&self) -> &Url;

    /// User the session authenticated as
    fn username(&self) -> &str;

    /// Server status captured when the session was opened
    fn status(&self) -> &ServerStatus;

    /// List templates in server order; fails with `NoTemplates` if there are none
    async fn list_templates(&self) -> Result<Vec<TemplateDescriptor>, ClientError>;

    /// Fetch the raw content of a template
    async fn fetch_content(&self, id: &str) -> Result<String, ClientError>;

    /// Fetch the current user's access token
    async fn user_token(&self) -> Result<UserToken, ClientError>;

    /// Release the session; calling it again is a no-op
    async fn close(&mut self) -> Result<(), ClientError>;
}
