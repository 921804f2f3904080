//! Per-request session context.
//!
//! Handlers receive identity through these extractors instead of looking up
//! the current user themselves. The identity is resolved once per request and
//! the caller's profile is loaded lazily, at most once, unless refreshed.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::{header::AUTHORIZATION, request::Parts, HeaderMap};
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::data::{DataResult, DataService};
use crate::errors::AppError;
use crate::models::profile::Profile;
use crate::state::AppState;

pub mod handlers;
pub mod identity;

pub use identity::{AuthSession, Identity, IdentityError, IdentityProvider, SignUpOutcome};

impl From<IdentityError> for AppError {
    fn from(e: IdentityError) -> Self {
        AppError::Internal(anyhow::anyhow!("identity lookup failed: {e}"))
    }
}

/// Extracts the token from an `Authorization: Bearer <token>` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

pub struct SessionContext {
    identity: Identity,
    access_token: String,
    data: Arc<dyn DataService>,
    profile: OnceCell<Option<Profile>>,
}

impl SessionContext {
    pub fn new(session: AuthSession, data: Arc<dyn DataService>) -> Self {
        Self {
            identity: session.identity,
            access_token: session.access_token,
            data,
            profile: OnceCell::new(),
        }
    }

    /// Resolves `token` through the identity provider.
    pub async fn resolve(
        provider: &dyn IdentityProvider,
        data: Arc<dyn DataService>,
        token: &str,
    ) -> Result<Option<Self>, IdentityError> {
        Ok(provider.resolve(token).await?.map(|identity| {
            Self::new(
                AuthSession {
                    access_token: token.to_string(),
                    identity,
                },
                data,
            )
        }))
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn user_id(&self) -> Uuid {
        self.identity.id
    }

    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    pub fn data(&self) -> &Arc<dyn DataService> {
        &self.data
    }

    /// The caller's profile, fetched on first use.
    pub async fn profile(&self) -> DataResult<Option<&Profile>> {
        let profile = self
            .profile
            .get_or_try_init(|| self.data.get_profile(self.identity.id))
            .await?;
        Ok(profile.as_ref())
    }

    /// Like [`Self::profile`] but a missing profile is an error.
    pub async fn require_profile(&self) -> Result<&Profile, AppError> {
        self.profile()
            .await?
            .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))
    }

    /// Drops the cached profile so the next read goes back to the store.
    pub async fn refresh_profile(&mut self) -> DataResult<Option<&Profile>> {
        self.profile = OnceCell::new();
        self.profile().await
    }
}

#[async_trait]
impl FromRequestParts<AppState> for SessionContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let token = bearer_token(&parts.headers).ok_or(AppError::Unauthorized)?;
        SessionContext::resolve(state.identity.as_ref(), state.data.clone(), token)
            .await?
            .ok_or(AppError::Unauthorized)
    }
}

/// Session for routes that also serve anonymous callers. A header that is
/// present but does not resolve is still rejected.
pub struct OptionalSession(pub Option<SessionContext>);

#[async_trait]
impl FromRequestParts<AppState> for OptionalSession {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        if bearer_token(&parts.headers).is_none() {
            return Ok(OptionalSession(None));
        }
        SessionContext::from_request_parts(parts, state)
            .await
            .map(|s| OptionalSession(Some(s)))
    }
}

/// Session of an admin with a school on file.
pub struct AdminContext {
    pub session: SessionContext,
    pub school_name: String,
}

impl AdminContext {
    pub async fn from_session(session: SessionContext) -> Result<Self, AppError> {
        let school_name = admin_school(session.profile().await?)?;
        Ok(Self {
            session,
            school_name,
        })
    }

    pub fn admin_id(&self) -> Uuid {
        self.session.user_id()
    }
}

/// Fails closed unless `profile` is an admin with a non-blank school name.
pub fn admin_school(profile: Option<&Profile>) -> Result<String, AppError> {
    let profile = profile.ok_or(AppError::Forbidden)?;
    if !profile.is_admin() {
        return Err(AppError::Forbidden);
    }
    match profile.school_name() {
        Some(school) if !school.trim().is_empty() => Ok(school.to_string()),
        _ => Err(AppError::NoSchoolOnFile),
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminContext {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, AppError> {
        let session = SessionContext::from_request_parts(parts, state).await?;
        AdminContext::from_session(session).await
    }
}
