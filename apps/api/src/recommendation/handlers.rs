//! Axum route handlers for the Recommendation API.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::errors::AppError;
use crate::models::portfolio::Recommendation;
use crate::recommendation::workflow::{desired_major_matches, refresh_recommendation, RefreshOutcome};
use crate::session::SessionContext;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct RecommendationView {
    pub recommendation: Option<Recommendation>,
    pub desired_major: Option<String>,
    pub matches_desired_major: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshRequest {
    #[serde(default)]
    pub confirm_overwrite: bool,
}

/// GET /api/v1/recommendation
pub async fn handle_get_recommendation(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Json<RecommendationView>, AppError> {
    let profile = session.require_profile().await?;
    let recommendation = state.data.get_recommendation(profile.id).await?;
    let matches_desired_major = recommendation
        .as_ref()
        .map(|r| desired_major_matches(profile, &r.prediction));

    Ok(Json(RecommendationView {
        recommendation,
        desired_major: profile.desired_major.clone(),
        matches_desired_major,
    }))
}

/// POST /api/v1/recommendation/refresh
pub async fn handle_refresh_recommendation(
    State(state): State<AppState>,
    session: SessionContext,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<RefreshOutcome>, AppError> {
    let profile = session.require_profile().await?;
    let outcome = refresh_recommendation(
        state.data.as_ref(),
        state.recommender.as_ref(),
        profile,
        req.confirm_overwrite,
    )
    .await?;
    Ok(Json(outcome))
}
