//! Service-account access tokens for spreadsheet writes.
//!
//! Signs an RS256 assertion, exchanges it at the key's token endpoint, and
//! caches the result until five minutes before it expires.

use std::path::Path;

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

use super::{SourceError, check_status};

pub const SPREADSHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
const EXPIRY_MARGIN_SECS: i64 = 300;

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// The fields of a service-account key file this client needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

impl ServiceAccountKey {
    pub fn from_file(path: &Path) -> Result<Self, SourceError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SourceError::Config(format!(
                "failed to read service account key {}: {}",
                path.display(),
                e
            ))
        })?;
        serde_json::from_str(&content)
            .map_err(|e| SourceError::Config(format!("invalid service account key: {}", e)))
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    refresh_at: i64,
}

impl CachedToken {
    fn new(access_token: String, issued_at: i64, expires_in: i64) -> Self {
        Self {
            access_token,
            refresh_at: issued_at + expires_in - EXPIRY_MARGIN_SECS,
        }
    }

    fn is_fresh(&self, now: i64) -> bool {
        now < self.refresh_at
    }
}

/// Hands out bearer tokens for the service account.
pub struct TokenProvider {
    http: reqwest::Client,
    key: ServiceAccountKey,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(http: reqwest::Client, key: ServiceAccountKey) -> Self {
        Self {
            http,
            key,
            cached: Mutex::new(None),
        }
    }

    /// Signed assertion issued at `now` (unix seconds).
    pub fn sign_assertion(&self, now: i64) -> Result<String, SourceError> {
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SPREADSHEETS_SCOPE,
            aud: &self.key.token_uri,
            iat: now,
            exp: now + ASSERTION_LIFETIME_SECS,
        };
        let key = EncodingKey::from_rsa_pem(self.key.private_key.as_bytes())
            .map_err(|e| SourceError::Auth(format!("invalid private key: {}", e)))?;
        encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| SourceError::Auth(format!("failed to sign assertion: {}", e)))
    }

    /// A valid access token, from cache when possible.
    pub async fn access_token(&self) -> Result<String, SourceError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now().timestamp();
        if let Some(token) = cached.as_ref()
            && token.is_fresh(now)
        {
            return Ok(token.access_token.clone());
        }

        let assertion = self.sign_assertion(now)?;
        let resp = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await?;
        let resp = check_status(resp).await.map_err(|e| match e {
            SourceError::Status { status, body } => {
                SourceError::Auth(format!("token exchange returned {}: {}", status, body))
            }
            other => other,
        })?;
        let body: TokenResponse = resp.json().await?;

        debug!(expires_in = body.expires_in, "Obtained service account token");
        let token = CachedToken::new(body.access_token, now, body.expires_in);
        let access_token = token.access_token.clone();
        *cached = Some(token);
        Ok(access_token)
    }
}
