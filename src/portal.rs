//! Remote feature-service host client
//!
//! All host traffic is URL-encoded form posts (uploads are multipart)
//! returning JSON. The HTTP client carries the referer header the token
//! endpoint requires as an explicit default header. Every response is
//! checked against a per-call allowlist of expected keys; a body lacking
//! all of them fails that call rather than propagating garbage downstream.

use crate::config::{PortalConfig, ShareConfig};
use serde_json::Value as Json;
use std::path::Path;
use std::time::Duration;

/// Error type for host operations. `Transport` failures are the only
/// class the publish workflow treats as transient.
#[derive(Debug)]
pub enum PortalError {
    /// Network-level failure (connect, timeout, non-JSON body)
    Transport(String),
    Io(std::io::Error),
    /// Token endpoint answered without a token
    MissingToken { detail: String },
    /// Search found nothing to update
    ItemNotFound { item_type: String, query: String },
    /// Response body carried none of the expected keys
    UnexpectedResponse { url: String, body: String },
    /// Upload finished without the success indicator
    UploadRejected { body: String },
    /// A token-bearing call was made before authentication
    NotAuthenticated,
}

impl PortalError {
    /// Whether a whole-workflow retry could plausibly help
    pub fn is_transient(&self) -> bool {
        matches!(self, PortalError::Transport(_))
    }
}

impl std::fmt::Display for PortalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PortalError::Transport(msg) => write!(f, "Transport error: {}", msg),
            PortalError::Io(e) => write!(f, "IO error: {}", e),
            PortalError::MissingToken { detail } => {
                write!(f, "No token in response: {}", detail)
            }
            PortalError::ItemNotFound { item_type, query } => write!(
                f,
                "Could not find a {} to update (query: {}). Check the service name in the settings.",
                item_type, query
            ),
            PortalError::UnexpectedResponse { url, body } => {
                write!(f, "Unexpected response from {}: {}", url, body)
            }
            PortalError::UploadRejected { body } => {
                write!(f, ".sd file not uploaded. Check the errors and try again: {}", body)
            }
            PortalError::NotAuthenticated => write!(f, "Not authenticated against the host"),
        }
    }
}

impl std::error::Error for PortalError {}

impl From<reqwest::Error> for PortalError {
    fn from(e: reqwest::Error) -> Self {
        PortalError::Transport(e.to_string())
    }
}

impl From<std::io::Error> for PortalError {
    fn from(e: std::io::Error) -> Self {
        PortalError::Io(e)
    }
}

pub type Result<T> = std::result::Result<T, PortalError>;

/// Blocking transport to the host. The pipeline is a sequential batch
/// job, so requests simply block; tests substitute scripted transports.
pub trait PortalTransport {
    fn post_form(&self, url: &str, params: &[(String, String)]) -> Result<Json>;

    fn post_multipart(&self, url: &str, params: &[(String, String)], file: &Path) -> Result<Json>;
}

/// Real transport over reqwest's blocking client
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Build a client carrying the referer the token endpoint requires
    /// on every request.
    pub fn new(referer: &str) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        let value = reqwest::header::HeaderValue::from_str(referer)
            .map_err(|e| PortalError::Transport(format!("invalid referer header: {}", e)))?;
        headers.insert(reqwest::header::REFERER, value);
        let client = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self { client })
    }
}

impl PortalTransport for HttpTransport {
    fn post_form(&self, url: &str, params: &[(String, String)]) -> Result<Json> {
        let response = self.client.post(url).form(params).send()?;
        Ok(response.json()?)
    }

    fn post_multipart(&self, url: &str, params: &[(String, String)], file: &Path) -> Result<Json> {
        let mut form = reqwest::blocking::multipart::Form::new().file("file", file)?;
        for (key, value) in params {
            form = form.text(key.clone(), value.clone());
        }
        let response = self.client.post(url).multipart(form).send()?;
        Ok(response.json()?)
    }
}

/// Authenticated session against the host
struct Session {
    token: String,
    /// Sharing API root, scheme adjusted by the token response's ssl flag
    root: String,
}

/// Client for the host's sharing REST API
pub struct PortalClient<'a> {
    transport: &'a dyn PortalTransport,
    config: &'a PortalConfig,
    session: Option<Session>,
}

impl<'a> PortalClient<'a> {
    pub fn new(transport: &'a dyn PortalTransport, config: &'a PortalConfig) -> Self {
        Self {
            transport,
            config,
            session: None,
        }
    }

    fn session(&self) -> Result<&Session> {
        self.session.as_ref().ok_or(PortalError::NotAuthenticated)
    }

    /// Keep the returned body only if it carries at least one expected key
    fn expect_keys(url: &str, body: Json, expected: &[&str]) -> Result<Json> {
        if expected.iter().any(|key| body.get(key).is_some()) {
            Ok(body)
        } else {
            Err(PortalError::UnexpectedResponse {
                url: url.to_string(),
                body: body.to_string(),
            })
        }
    }

    fn post_checked(
        &self,
        url: &str,
        params: Vec<(String, String)>,
        expected: &[&str],
    ) -> Result<Json> {
        let body = self.transport.post_form(url, &params)?;
        Self::expect_keys(url, body, expected)
    }

    /// Exchange credentials for a short-lived bearer token
    pub fn authenticate(&mut self) -> Result<()> {
        let url = format!("{}/sharing/rest/generateToken", self.config.host);
        let params = vec![
            ("username".to_string(), self.config.username.clone()),
            ("password".to_string(), self.config.password.clone()),
            ("expiration".to_string(), "60".to_string()),
            ("client".to_string(), "referer".to_string()),
            ("referer".to_string(), format!("{}/", self.config.host)),
            ("f".to_string(), "json".to_string()),
        ];
        let body = self.transport.post_form(&url, &params)?;

        let token = match body.get("token").and_then(|t| t.as_str()) {
            Some(token) => token.to_string(),
            None => {
                return Err(PortalError::MissingToken {
                    detail: body.to_string(),
                })
            }
        };
        let ssl = body.get("ssl").and_then(|s| s.as_bool()).unwrap_or(false);
        let host = if ssl {
            self.config.host.replacen("http://", "https://", 1)
        } else {
            self.config.host.clone()
        };
        self.session = Some(Session {
            token,
            root: format!("{}/sharing/rest", host),
        });
        Ok(())
    }

    /// Find the single item of the given type for the configured service
    /// name and owner. Zero results is fatal for the attempt.
    pub fn find_item(&self, item_type: &str) -> Result<String> {
        let session = self.session()?;
        let url = format!("{}/search", session.root);
        let query = format!(
            "title:\"{}\" AND owner:\"{}\" AND type:\"{}\"",
            self.config.service_name, self.config.username, item_type
        );
        let params = vec![
            ("f".to_string(), "json".to_string()),
            ("token".to_string(), session.token.clone()),
            ("q".to_string(), query.clone()),
        ];
        let body = self.post_checked(&url, params, &["results"])?;

        let total = body.get("total").and_then(|t| t.as_u64()).unwrap_or(0);
        if total == 0 {
            return Err(PortalError::ItemNotFound {
                item_type: item_type.to_string(),
                query,
            });
        }
        body.get("results")
            .and_then(|r| r.get(0))
            .and_then(|r| r.get("id"))
            .and_then(|id| id.as_str())
            .map(|id| id.to_string())
            .ok_or_else(|| PortalError::UnexpectedResponse {
                url,
                body: body.to_string(),
            })
    }

    /// Overwrite the service-definition item with a freshly staged
    /// package. Success is signaled by the success indicator in the body,
    /// not by HTTP status.
    pub fn update_item(&self, sd_item_id: &str, package: &Path) -> Result<String> {
        let session = self.session()?;
        let url = format!(
            "{}/content/users/{}/items/{}/update",
            session.root, self.config.username, sd_item_id
        );
        let filename = package
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("service.sd")
            .to_string();
        let params = vec![
            ("f".to_string(), "json".to_string()),
            ("token".to_string(), session.token.clone()),
            ("filename".to_string(), filename),
            ("type".to_string(), "Service Definition".to_string()),
            ("title".to_string(), self.config.service_name.clone()),
            ("tags".to_string(), self.config.tags.clone()),
            ("description".to_string(), self.config.description.clone()),
        ];
        let body = self.transport.post_multipart(&url, &params, package)?;
        let body = Self::expect_keys(&url, body, &["success"])?;

        if body.get("success").and_then(|s| s.as_bool()) != Some(true) {
            return Err(PortalError::UploadRejected {
                body: body.to_string(),
            });
        }
        Ok(body
            .get("id")
            .and_then(|id| id.as_str())
            .unwrap_or(sd_item_id)
            .to_string())
    }

    /// Publish the uploaded definition with overwrite semantics,
    /// returning the new service item id.
    pub fn publish_item(&self, sd_item_id: &str) -> Result<String> {
        let session = self.session()?;
        let url = format!(
            "{}/content/users/{}/publish",
            session.root, self.config.username
        );
        let params = vec![
            ("itemID".to_string(), sd_item_id.to_string()),
            ("filetype".to_string(), "serviceDefinition".to_string()),
            ("overwrite".to_string(), "true".to_string()),
            ("f".to_string(), "json".to_string()),
            ("token".to_string(), session.token.clone()),
        ];
        let body = self.post_checked(&url, params, &["services"])?;

        body.get("services")
            .and_then(|s| s.get(0))
            .and_then(|s| s.get("serviceItemId"))
            .and_then(|id| id.as_str())
            .map(|id| id.to_string())
            .ok_or_else(|| PortalError::UnexpectedResponse {
                url,
                body: body.to_string(),
            })
    }

    /// Grant visibility on the published item to everyone, the owning
    /// organization, and/or specific groups.
    pub fn share_item(&self, item_id: &str, share: &ShareConfig) -> Result<String> {
        let session = self.session()?;
        let url = format!(
            "{}/content/users/{}/items/{}/share",
            session.root, self.config.username, item_id
        );
        let params = vec![
            ("f".to_string(), "json".to_string()),
            ("everyone".to_string(), share.everyone.to_string()),
            ("org".to_string(), share.org.to_string()),
            ("groups".to_string(), share.groups.join(",")),
            ("token".to_string(), session.token.clone()),
        ];
        let body = self.post_checked(&url, params, &["notSharedWith", "itemId"])?;

        Ok(body
            .get("itemId")
            .and_then(|id| id.as_str())
            .unwrap_or(item_id)
            .to_string())
    }
}
