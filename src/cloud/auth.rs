use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::REQUEST_TIMEOUT;
use crate::error::PipelineError;

const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a service-account key file we need.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub project_id: Option<String>,
}

pub fn load_service_account(path: &Path) -> Result<ServiceAccountKey, PipelineError> {
    if !path.is_file() {
        return Err(PipelineError::CredentialMissing(path.to_path_buf()));
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|e| PipelineError::Credential(format!("{}: {}", path.display(), e)))
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    iss: String,
    scope: String,
    aud: String,
    iat: i64,
    exp: i64,
}

impl Claims {
    fn new(key: &ServiceAccountKey, now: i64) -> Self {
        Self {
            iss: key.client_email.clone(),
            scope: CLOUD_PLATFORM_SCOPE.to_string(),
            aud: key.token_uri.clone(),
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        }
    }
}

fn sign_assertion(key: &ServiceAccountKey, now: i64) -> Result<String, PipelineError> {
    let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| PipelineError::Credential(format!("private key: {}", e)))?;
    jsonwebtoken::encode(
        &Header::new(Algorithm::RS256),
        &Claims::new(key, now),
        &encoding_key,
    )
    .map_err(|e| PipelineError::Credential(format!("signing assertion: {}", e)))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Tokens are replaced this long before they expire.
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct AccessToken {
    value: String,
    expires_at: Option<Instant>,
}

impl AccessToken {
    fn is_stale(&self, now: Instant) -> bool {
        self.expires_at
            .is_some_and(|expires_at| now + REFRESH_MARGIN >= expires_at)
    }
}

/// Authenticated HTTP handle shared by the storage and speech clients.
///
/// Tokens obtained from a service account are re-fetched shortly before
/// they expire, so polling and cleanup keep working on long runs.
#[derive(Clone)]
pub struct GcpSession {
    http: reqwest::Client,
    key: Option<Arc<ServiceAccountKey>>,
    token: Arc<Mutex<AccessToken>>,
}

impl GcpSession {
    pub async fn authenticate(key: &ServiceAccountKey) -> Result<Self, PipelineError> {
        // no total timeout here: uploads set their own, scaled to the file
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| PipelineError::Credential(e.to_string()))?;

        let token = fetch_token(&http, key).await?;
        Ok(Self {
            http,
            key: Some(Arc::new(key.clone())),
            token: Arc::new(Mutex::new(token)),
        })
    }

    /// A session around a fixed token that is never refreshed.
    pub fn with_token(http: reqwest::Client, token: impl Into<String>) -> Self {
        Self {
            http,
            key: None,
            token: Arc::new(Mutex::new(AccessToken {
                value: token.into(),
                expires_at: None,
            })),
        }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The current access token, refreshed first when it is about to expire.
    pub async fn bearer(&self) -> Result<String, PipelineError> {
        let mut token = self.token.lock().await;
        if let Some(key) = &self.key {
            if token.is_stale(Instant::now()) {
                log::debug!("token for {} expires soon, refreshing", key.client_email);
                *token = fetch_token(&self.http, key).await?;
            }
        }
        Ok(token.value.clone())
    }
}

async fn fetch_token(
    http: &reqwest::Client,
    key: &ServiceAccountKey,
) -> Result<AccessToken, PipelineError> {
    let assertion = sign_assertion(key, chrono::Utc::now().timestamp())?;
    let requested_at = Instant::now();

    let response = http
        .post(&key.token_uri)
        .timeout(REQUEST_TIMEOUT)
        .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
        .send()
        .await
        .map_err(|e| PipelineError::Credential(format!("token request: {}", e)))?;

    if !response.status().is_success() {
        let status = response.status();
        let error_text = response.text().await.unwrap_or_default();
        return Err(PipelineError::Credential(format!(
            "token endpoint returned {}: {}",
            status, error_text
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| PipelineError::Credential(format!("token response: {}", e)))?;
    log::debug!(
        "authenticated as {} for project {:?} (token valid for {:?}s)",
        key.client_email,
        key.project_id,
        token.expires_in
    );

    Ok(AccessToken {
        value: token.access_token,
        expires_at: token
            .expires_in
            .map(|secs| requested_at + Duration::from_secs(secs)),
    })
}
