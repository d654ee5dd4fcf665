//! Default platform client using reqwest.
//!
//! Implements [`PlatformBackend`] against the script platform's REST API
//! and [`ReadinessProbe`] with a plain HTTP GET. Every non-2xx response
//! is classified into the [`DeployError`] taxonomy here so the workflow
//! never looks at status codes.
//!
//! # Quick Start
//!
//! ```ignore
//! use script_deploy::{ClientSettings, CredentialsFile, DeployConfig, PlatformClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DeployConfig::load(None)?;
//! let credentials = CredentialsFile::new(config.credentials_path()?);
//! let client = PlatformClient::from_credentials_file(
//!     ClientSettings::from_config(&config),
//!     credentials,
//! ).await?;
//! # Ok(())
//! # }
//! ```

use crate::auth::{CredentialsFile, TokenSet};
use crate::backend::{PlatformBackend, ProbeResponse, ReadinessProbe};
use crate::config::{DeployConfig, TimeoutConfig};
use crate::error::DeployError;
use crate::source::{SourceBundle, SourceFile};
use crate::types::{DeploymentSlot, PushReceipt, VersionRecord};
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Connection settings, independent of credentials.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_base: String,
    pub token_url: String,
    /// Manifest file name, with or without `.json`.
    pub manifest_file: String,
    pub timeouts: TimeoutConfig,
}

impl ClientSettings {
    pub fn from_config(config: &DeployConfig) -> Self {
        Self {
            api_base: config.api_base.clone(),
            token_url: config.token_url.clone(),
            manifest_file: config.manifest_file.clone(),
            timeouts: config.timeouts.clone(),
        }
    }
}

/// REST client for the platform deployment API.
pub struct PlatformClient {
    http: reqwest::Client,
    settings: ClientSettings,
    tokens: Mutex<TokenSet>,
    /// Where refreshed tokens are written back, if anywhere.
    credentials: Option<CredentialsFile>,
}

impl PlatformClient {
    pub fn new(settings: ClientSettings, tokens: TokenSet) -> Result<Self, DeployError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("script-deploy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeployError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http,
            settings,
            tokens: Mutex::new(tokens),
            credentials: None,
        })
    }

    /// Load tokens from `credentials` and persist refreshes back to it.
    pub async fn from_credentials_file(
        settings: ClientSettings,
        credentials: CredentialsFile,
    ) -> Result<Self, DeployError> {
        let tokens = credentials.load().await?;
        let mut client = Self::new(settings, tokens)?;
        client.credentials = Some(credentials);
        Ok(client)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.settings.api_base.trim_end_matches('/'), path)
    }

    fn manifest_name(&self) -> &str {
        self.settings
            .manifest_file
            .strip_suffix(".json")
            .unwrap_or(&self.settings.manifest_file)
    }

    async fn request(&self, method: Method, path: &str, timeout: Duration) -> RequestBuilder {
        let token = self.tokens.lock().await.access_token.clone();
        self.http
            .request(method, self.url(path))
            .bearer_auth(token)
            .timeout(timeout)
    }

    async fn paginated<W, T>(
        &self,
        path: &str,
        mut extract: impl FnMut(W) -> (Vec<T>, Option<String>),
    ) -> Result<Vec<T>, DeployError>
    where
        W: DeserializeOwned,
    {
        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut req = self
                .request(Method::GET, path, self.settings.timeouts.list())
                .await;
            if let Some(token) = &page_token {
                req = req.query(&[("pageToken", token)]);
            }
            let page: W = send_json(req).await?;
            let (batch, next) = extract(page);
            items.extend(batch);
            match next.filter(|t| !t.is_empty()) {
                Some(next) => page_token = Some(next),
                None => return Ok(items),
            }
        }
    }
}

impl PlatformBackend for PlatformClient {
    async fn bound_project_id(&self) -> Result<String, DeployError> {
        Ok(self.tokens.lock().await.project_id.clone())
    }

    async fn ensure_fresh_credentials(&self) -> Result<(), DeployError> {
        let expired = self
            .tokens
            .lock()
            .await
            .needs_refresh(self.settings.timeouts.token_margin());
        if expired {
            debug!(event = "auth.token.expiring");
            self.refresh_credentials().await?;
        }
        Ok(())
    }

    async fn refresh_credentials(&self) -> Result<(), DeployError> {
        let mut tokens = self.tokens.lock().await;
        let refresh_token = tokens
            .refresh_token
            .clone()
            .ok_or_else(|| DeployError::Auth("access token expired and no refresh token is stored".into()))?;

        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token),
        ];
        if let Some(id) = &tokens.client_id {
            form.push(("client_id", id.clone()));
        }
        if let Some(secret) = &tokens.client_secret {
            form.push(("client_secret", secret.clone()));
        }

        let req = self
            .http
            .post(&self.settings.token_url)
            .form(&form)
            .timeout(self.settings.timeouts.token());
        let response: TokenResponse = match send_json(req).await {
            Ok(r) => r,
            // The token endpoint answers a dead refresh token with 400.
            Err(DeployError::Platform { code, message }) => {
                return Err(DeployError::Auth(format!("token refresh rejected: {} {}", code, message)))
            }
            Err(e) => return Err(e),
        };
        tokens.apply_refresh(response.access_token, response.expires_in, response.refresh_token);
        info!(event = "auth.token.refreshed", expires_at = tokens.expires_at);

        if let Some(file) = &self.credentials {
            if let Err(err) = file.save(&tokens).await {
                warn!(event = "auth.token.persist_failed", error = %err);
            }
        }
        Ok(())
    }

    async fn list_versions(&self, project_id: &str) -> Result<Vec<VersionRecord>, DeployError> {
        let path = format!("projects/{}/versions", project_id);
        let versions = self
            .paginated(&path, |page: ListVersionsResponse| (page.versions, page.next_page_token))
            .await?;
        Ok(versions.into_iter().map(WireVersion::into_record).collect())
    }

    async fn list_deployments(&self, project_id: &str) -> Result<Vec<DeploymentSlot>, DeployError> {
        let path = format!("projects/{}/deployments", project_id);
        let deployments = self
            .paginated(&path, |page: ListDeploymentsResponse| {
                (page.deployments, page.next_page_token)
            })
            .await?;
        deployments
            .into_iter()
            .map(|d| {
                d.into_slot()
                    .ok_or_else(|| DeployError::Protocol("listed deployment has no deploymentId".into()))
            })
            .collect()
    }

    async fn push(
        &self,
        project_id: &str,
        bundle: &SourceBundle,
        description: &str,
    ) -> Result<PushReceipt, DeployError> {
        let content = ContentBody {
            files: &bundle.files,
        };
        let req = self
            .request(
                Method::PUT,
                &format!("projects/{}/content", project_id),
                self.settings.timeouts.push(),
            )
            .await
            .json(&content);
        send_empty(req).await?;
        debug!(event = "client.content.uploaded", files = bundle.files.len());

        let req = self
            .request(
                Method::POST,
                &format!("projects/{}/versions", project_id),
                self.settings.timeouts.push(),
            )
            .await
            .json(&serde_json::json!({ "description": description }));
        let version: WireVersion = send_json(req).await?;
        Ok(PushReceipt {
            version_number: version.version_number,
            content_digest: bundle.digest.clone(),
            file_count: bundle.files.len(),
        })
    }

    async fn create_deployment(
        &self,
        project_id: &str,
        version_number: u64,
        description: &str,
    ) -> Result<Option<DeploymentSlot>, DeployError> {
        let body = DeploymentConfigBody {
            version_number,
            manifest_file_name: self.manifest_name(),
            description,
        };
        let req = self
            .request(
                Method::POST,
                &format!("projects/{}/deployments", project_id),
                self.settings.timeouts.deploy(),
            )
            .await
            .json(&body);
        let created: WireDeployment = send_json(req).await?;
        Ok(created.into_slot())
    }

    async fn delete_deployment(&self, project_id: &str, deployment_id: &str) -> Result<(), DeployError> {
        let req = self
            .request(
                Method::DELETE,
                &format!("projects/{}/deployments/{}", project_id, deployment_id),
                self.settings.timeouts.delete(),
            )
            .await;
        send_empty(req).await
    }

    async fn delete_version(&self, project_id: &str, version_number: u64) -> Result<(), DeployError> {
        let req = self
            .request(
                Method::DELETE,
                &format!("projects/{}/versions/{}", project_id, version_number),
                self.settings.timeouts.delete(),
            )
            .await;
        send_empty(req).await
    }
}

/// Readiness probe over plain HTTPS. Redirects are followed.
#[derive(Clone)]
pub struct HttpReadinessProbe {
    http: reqwest::Client,
}

impl HttpReadinessProbe {
    pub fn new() -> Result<Self, DeployError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("script-deploy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DeployError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { http })
    }
}

impl ReadinessProbe for HttpReadinessProbe {
    async fn get(&self, url: &str, timeout: Duration) -> Result<ProbeResponse, DeployError> {
        let response = self
            .http
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(transport_error)?;
        Ok(ProbeResponse { status, body })
    }
}

// ═══════════════════════════════════════════════════════════════
// ERROR CLASSIFICATION
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    #[serde(default)]
    error: ErrorBody,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

fn is_capacity_message(message: &str) -> bool {
    let m = message.to_ascii_lowercase();
    m.contains("maximum number of deployments")
        || m.contains("too many deployments")
        || m.contains("versioned deployments")
        || m.contains("deployment limit")
}

/// Map a failed response onto the error taxonomy.
pub fn classify(status: StatusCode, body: &str) -> DeployError {
    let envelope: ErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let message = if envelope.error.message.is_empty() {
        body.chars().take(500).collect()
    } else {
        envelope.error.message
    };
    let code = if envelope.error.status.is_empty() {
        status.as_u16().to_string()
    } else {
        envelope.error.status
    };

    if status == StatusCode::UNAUTHORIZED || code == "UNAUTHENTICATED" {
        return DeployError::Auth(message);
    }
    if is_capacity_message(&message) {
        return DeployError::Capacity(message);
    }
    if status == StatusCode::NOT_FOUND {
        return DeployError::NotFound(message);
    }
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        return DeployError::Transient(format!("HTTP {}: {}", status.as_u16(), message));
    }
    DeployError::Platform { code, message }
}

fn transport_error(e: reqwest::Error) -> DeployError {
    if e.is_builder() {
        DeployError::Config(format!("invalid request: {}", e))
    } else {
        DeployError::Transient(e.to_string())
    }
}

async fn send(req: RequestBuilder) -> Result<reqwest::Response, DeployError> {
    let response = req.send().await.map_err(transport_error)?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read response".to_string());
    Err(classify(status, &body))
}

async fn send_json<T: DeserializeOwned>(req: RequestBuilder) -> Result<T, DeployError> {
    let response = send(req).await?;
    let text = response.text().await.map_err(transport_error)?;
    serde_json::from_str(&text)
        .map_err(|e| DeployError::Protocol(format!("unexpected response body: {}", e)))
}

async fn send_empty(req: RequestBuilder) -> Result<(), DeployError> {
    send(req).await.map(|_| ())
}

// ═══════════════════════════════════════════════════════════════
// WIRE TYPES
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Serialize)]
struct ContentBody<'a> {
    files: &'a [SourceFile],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentConfigBody<'a> {
    version_number: u64,
    manifest_file_name: &'a str,
    description: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListVersionsResponse {
    #[serde(default)]
    versions: Vec<WireVersion>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireVersion {
    version_number: u64,
    #[serde(default)]
    description: Option<String>,
}

impl WireVersion {
    fn into_record(self) -> VersionRecord {
        VersionRecord {
            version_number: self.version_number,
            description: self.description.unwrap_or_default(),
            created_at: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDeploymentsResponse {
    #[serde(default)]
    deployments: Vec<WireDeployment>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDeployment {
    deployment_id: Option<String>,
    #[serde(default)]
    deployment_config: Option<WireDeploymentConfig>,
    #[serde(default)]
    entry_points: Vec<WireEntryPoint>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireDeploymentConfig {
    version_number: Option<u64>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEntryPoint {
    #[serde(default)]
    web_app: Option<WireWebApp>,
}

#[derive(Debug, Deserialize)]
struct WireWebApp {
    url: Option<String>,
}

impl WireDeployment {
    /// `None` when the platform left out the id. HEAD is the deployment
    /// without a version number.
    fn into_slot(self) -> Option<DeploymentSlot> {
        let id = self.deployment_id.filter(|id| !id.is_empty())?;
        let (version_number, description) = match self.deployment_config {
            Some(cfg) => (cfg.version_number, cfg.description.unwrap_or_default()),
            None => (None, String::new()),
        };
        let url = self
            .entry_points
            .into_iter()
            .find_map(|e| e.web_app.and_then(|w| w.url));
        Some(DeploymentSlot {
            id,
            version_number: version_number.unwrap_or(0),
            description,
            created_at: None,
            is_head: version_number.is_none(),
            url,
        })
    }
}
