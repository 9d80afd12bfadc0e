//! Client for the XORS user-management API.
//!
//! XORS is the system of record for client logins. Creating and
//! authenticating an account share one endpoint: the provider creates the
//! account on first sight of an email and verifies the password otherwise.

use std::time::Duration;

use rand::Rng;
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

const PASSWORD_CHARSET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789";
const PASSWORD_LENGTH: usize = 12;
const PASSWORD_SUFFIX: char = '!';

#[derive(Error, Debug)]
pub enum IdentityError {
    #[error("identity provider returned {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("identity provider unreachable: {0}")]
    Transport(String),

    #[error("unexpected identity provider response: {0}")]
    Decode(String),
}

/// An account as reported by the provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdentityAccount {
    pub id: String,
    pub email: String,
    /// Per-account API key issued by the provider.
    pub key: String,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub verified: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticateResponse {
    pub user: IdentityAccount,
    #[serde(default)]
    pub existing: bool,
}

#[rocket::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Creates an account for a newly added client.
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentityAccount, IdentityError>;

    /// Verifies a client's credentials.
    async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentityAccount, IdentityError>;

    /// Changes the password of the account owning `api_key`.
    async fn change_password(
        &self,
        api_key: &str,
        current_password: Option<&str>,
        new_password: &str,
    ) -> Result<(), IdentityError>;
}

#[derive(Serialize)]
struct AuthenticateRequest<'a> {
    email: &'a str,
    password: &'a str,
    source: &'a str,
}

#[derive(Serialize)]
struct ChangePasswordRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    new_password: &'a str,
}

#[derive(Deserialize)]
struct ProviderMessage {
    message: Option<String>,
}

#[derive(Clone)]
pub struct XorsClient {
    client: Client,
    base_url: String,
    source: String,
}

impl std::fmt::Debug for XorsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XorsClient")
            .field("base_url", &self.base_url)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl XorsClient {
    pub fn new(base_url: &str, source: &str, timeout: Duration) -> Result<Self, IdentityError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            source: source.to_string(),
        })
    }

    pub(crate) fn authenticate_request(&self, email: &str, password: &str) -> RequestBuilder {
        self.client
            .post(format!("{}/api/users/authenticate", self.base_url))
            .json(&AuthenticateRequest {
                email,
                password,
                source: &self.source,
            })
    }

    pub(crate) fn change_password_request(
        &self,
        api_key: &str,
        current_password: Option<&str>,
        new_password: &str,
    ) -> RequestBuilder {
        self.client
            .post(format!("{}/api/users/update-viewer-password", self.base_url))
            .header("X-API-Key", api_key)
            .json(&ChangePasswordRequest {
                password: current_password,
                new_password,
            })
    }

    async fn post_authenticate(
        &self,
        email: &str,
        password: &str,
        fallback: &str,
    ) -> Result<IdentityAccount, IdentityError> {
        let response = self
            .authenticate_request(email, password)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(rejection(response, fallback).await);
        }

        let body: AuthenticateResponse = response
            .json()
            .await
            .map_err(|e| IdentityError::Decode(e.to_string()))?;

        info!(xors_user_id = %body.user.id, existing = body.existing, "Identity provider accepted credentials");
        Ok(body.user)
    }
}

pub(crate) async fn rejection(response: reqwest::Response, fallback: &str) -> IdentityError {
    let status = response.status().as_u16();
    let message = response
        .json::<ProviderMessage>()
        .await
        .ok()
        .and_then(|m| m.message)
        .unwrap_or_else(|| fallback.to_string());

    warn!(status = %status, message = %message, "Identity provider rejected request");
    IdentityError::Rejected { status, message }
}

#[rocket::async_trait]
impl IdentityProvider for XorsClient {
    #[instrument(skip(self, password))]
    async fn create_account(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentityAccount, IdentityError> {
        self.post_authenticate(email, password, "Failed to create user")
            .await
    }

    #[instrument(skip(self, password))]
    async fn authenticate(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentityAccount, IdentityError> {
        self.post_authenticate(email, password, "Authentication failed")
            .await
    }

    #[instrument(skip_all)]
    async fn change_password(
        &self,
        api_key: &str,
        current_password: Option<&str>,
        new_password: &str,
    ) -> Result<(), IdentityError> {
        let response = self
            .change_password_request(api_key, current_password, new_password)
            .send()
            .await
            .map_err(|e| IdentityError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(rejection(response, "Password change failed").await);
        }

        Ok(())
    }
}

/// A one-time password for a new client: twelve unambiguous alphanumerics and a `!`.
pub fn generate_client_password() -> String {
    let mut rng = rand::rng();
    let mut password: String = (0..PASSWORD_LENGTH)
        .map(|_| PASSWORD_CHARSET[rng.random_range(0..PASSWORD_CHARSET.len())] as char)
        .collect();
    password.push(PASSWORD_SUFFIX);
    password
}

/// 32 random bytes, hex encoded.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
