//! Nexus REST client
//!
//! Talks to the repository manager over JSON with basic authentication:
//! - `service/local/status` for the server identity
//! - `service/local/templates/settings` for the settings template listing and content
//! - `service/siesta/usertoken/current` for the caller's user token

use super::{
    ClientError, ConnectionRequest, Connector, Secret, ServerStatus, Session, TemplateDescriptor,
    UserToken,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use url::Url;

const STATUS_PATH: &[&str] = &["service", "local", "status"];
const TEMPLATES_PATH: &[&str] = &["service", "local", "templates", "settings"];
const USER_TOKEN_PATH: &[&str] = &["service", "siesta", "usertoken", "current"];

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusDto {
    #[serde(default)]
    app_name: String,
    #[serde(default)]
    version: String,
    #[serde(default)]
    edition_short: String,
}

#[derive(Debug, Deserialize)]
struct TemplateDto {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserTokenDto {
    name_code: String,
    pass_code: String,
}

/// Opens authenticated sessions against a Nexus server
#[derive(Debug, Clone)]
pub struct NexusConnector {
    user_agent: String,
}

impl NexusConnector {
    /// Create a connector that identifies itself with the given user agent
    pub fn new(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
        }
    }
}

#[async_trait]
impl Connector for NexusConnector {
    async fn connect(&self, request: &ConnectionRequest) -> Result<Box<dyn Session>, ClientError> {
        let base_url = request.base_url()?;
        let client = reqwest::Client::builder()
            .user_agent(&self.user_agent)
            .build()
            .map_err(|source| ClientError::Transport {
                url: base_url.to_string(),
                source,
            })?;

        let mut session = NexusSession {
            client,
            base_url,
            username: request.username.clone(),
            secret: request.secret.clone(),
            status: ServerStatus::default(),
            closed: false,
        };

        // Fetching status up front also validates the credentials
        let dto: Envelope<StatusDto> = session.get_json(STATUS_PATH).await?;
        session.status = ServerStatus {
            app_name: dto.data.app_name,
            edition: dto.data.edition_short,
            version: dto.data.version,
        };

        Ok(Box::new(session))
    }
}

/// An open session against a Nexus server
pub struct NexusSession {
    client: reqwest::Client,
    base_url: Url,
    username: String,
    secret: Secret,
    status: ServerStatus,
    closed: bool,
}

impl NexusSession {
    /// Build a URL by appending path segments to the base URL
    fn build_url(&self, segments: &[&str]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: "URL cannot have path segments".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, url: &Url, accept: &str) -> Result<reqwest::Response, ClientError> {
        if self.closed {
            return Err(ClientError::Closed);
        }

        log::debug!("GET {}", url);
        let response = self
            .client
            .get(url.clone())
            .basic_auth(&self.username, Some(self.secret.expose()))
            .header(reqwest::header::ACCEPT, accept)
            .send()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ClientError::Unauthorized {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ClientError> {
        let url = self.build_url(segments)?;
        let response = self.send(&url, "application/json").await?;

        if !response.status().is_success() {
            return Err(ClientError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.to_string(),
                source,
            })?;
        serde_json::from_str(&body).map_err(|e| ClientError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl Session for NexusSession {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn username(&self) -> &str {
        &self.username
    }

    fn status(&self) -> &ServerStatus {
        &self.status
    }

    async fn list_templates(&self) -> Result<Vec<TemplateDescriptor>, ClientError> {
        let dto: Envelope<Vec<TemplateDto>> = self.get_json(TEMPLATES_PATH).await?;
        if dto.data.is_empty() {
            return Err(ClientError::NoTemplates);
        }
        Ok(dto
            .data
            .into_iter()
            .map(|t| TemplateDescriptor::new(t.id))
            .collect())
    }

    async fn fetch_content(&self, id: &str) -> Result<String, ClientError> {
        let mut segments: Vec<&str> = TEMPLATES_PATH.to_vec();
        segments.extend([id, "content"]);
        let url = self.build_url(&segments)?;

        let response = self.send(&url, "text/plain, application/xml, */*").await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ClientError::TemplateNotFound { id: id.to_string() });
        }
        if !response.status().is_success() {
            return Err(ClientError::Status {
                url: url.to_string(),
                status: response.status().as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|source| ClientError::Transport {
                url: url.to_string(),
                source,
            })
    }

    async fn user_token(&self) -> Result<UserToken, ClientError> {
        let dto = match self.get_json::<UserTokenDto>(USER_TOKEN_PATH).await {
            Err(ClientError::Status { status: 404, .. }) => {
                return Err(ClientError::UserTokenUnavailable)
            }
            other => other?,
        };
        Ok(UserToken {
            name_code: dto.name_code,
            pass_code: Secret::new(dto.pass_code),
        })
    }

    async fn close(&mut self) -> Result<(), ClientError> {
        if !self.closed {
            log::debug!("Closing session to {}", self.base_url);
            self.closed = true;
        }
        Ok(())
    }
}
