//! Identity resolution against the hosted auth service.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub email: String,
}

/// An access token together with the identity it resolves to.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    pub access_token: String,
    pub identity: Identity,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignUpOutcome {
    SignedIn(AuthSession),
    /// Account created; the user has to confirm their email before signing in.
    ConfirmationRequired,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Auth service rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Returns `None` when the token is unknown or expired.
    async fn resolve(&self, access_token: &str) -> Result<Option<Identity>, IdentityError>;

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, IdentityError>;

    /// Password sign-in. Wrong credentials come back as `Rejected`.
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, IdentityError>;

    async fn update_password(&self, access_token: &str, password: &str)
        -> Result<(), IdentityError>;
}

#[derive(Debug, Deserialize)]
struct UserBody {
    id: Uuid,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignUpResponse {
    access_token: Option<String>,
    user: Option<UserBody>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: UserBody,
}

#[derive(Debug, Deserialize)]
struct AuthErrorBody {
    msg: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
}

#[derive(Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct PasswordChange<'a> {
    password: &'a str,
}

/// Client for the GoTrue-compatible REST API exposed by the hosted backend.
#[derive(Clone)]
pub struct GoTrueIdentityProvider {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl GoTrueIdentityProvider {
    pub fn new(client: Client, base_url: &str, anon_key: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
        }
    }

    async fn rejection(response: reqwest::Response) -> IdentityError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<AuthErrorBody>(&body)
            .ok()
            .and_then(|b| b.msg.or(b.error_description).or(b.message))
            .unwrap_or(body);
        IdentityError::Rejected { status, message }
    }
}

#[async_trait]
impl IdentityProvider for GoTrueIdentityProvider {
    async fn resolve(&self, access_token: &str) -> Result<Option<Identity>, IdentityError> {
        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                debug!("Access token rejected by auth service");
                Ok(None)
            }
            s if s.is_success() => {
                let user: UserBody = response.json().await?;
                Ok(Some(Identity {
                    id: user.id,
                    email: user.email.unwrap_or_default(),
                }))
            }
            _ => Err(Self::rejection(response).await),
        }
    }

    async fn sign_up(&self, email: &str, password: &str) -> Result<SignUpOutcome, IdentityError> {
        let response = self
            .client
            .post(format!("{}/auth/v1/signup", self.base_url))
            .header("apikey", &self.anon_key)
            .json(&Credentials { email, password })
            .send()
            .await?;

        if !response.status().is_success() {
            let err = Self::rejection(response).await;
            warn!("Sign-up failed: {err}");
            return Err(err);
        }

        let body: SignUpResponse = response.json().await?;
        Ok(match (body.access_token, body.user) {
            (Some(access_token), Some(user)) => SignUpOutcome::SignedIn(AuthSession {
                access_token,
                identity: Identity {
                    id: user.id,
                    email: user.email.unwrap_or_else(|| email.to_string()),
                },
            }),
            _ => SignUpOutcome::ConfirmationRequired,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, IdentityError> {
        let response = self
            .client
            .post(format!("{}/auth/v1/token", self.base_url))
            .query(&[("grant_type", "password")])
            .header("apikey", &self.anon_key)
            .json(&Credentials { email, password })
            .send()
            .await?;

        if !response.status().is_success() {
            let err = Self::rejection(response).await;
            debug!("Sign-in refused: {err}");
            return Err(err);
        }

        let body: TokenResponse = response.json().await?;
        Ok(AuthSession {
            access_token: body.access_token,
            identity: Identity {
                id: body.user.id,
                email: body.user.email.unwrap_or_else(|| email.to_string()),
            },
        })
    }

    async fn update_password(
        &self,
        access_token: &str,
        password: &str,
    ) -> Result<(), IdentityError> {
        let response = self
            .client
            .put(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .json(&PasswordChange { password })
            .send()
            .await?;

        if !response.status().is_success() {
            let err = Self::rejection(response).await;
            warn!("Password update failed: {err}");
            return Err(err);
        }
        Ok(())
    }
}
