//! Axum route handlers for the profile and records API.

use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::AppError;
use crate::models::academic::{
    is_valid_school_year, is_valid_score, is_valid_semester, school_year_for, AcademicRecord,
    NewAcademicRecord,
};
use crate::models::portfolio::{Achievement, Organization, Recommendation};
use crate::models::profile::{Profile, UserType};
use crate::recommendation::workflow::desired_major_matches;
use crate::session::{Identity, SessionContext};
use crate::state::AppState;
use crate::wizard::steps::{validate_biodata, BiodataInput};

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub identity: Identity,
    pub profile: Option<Profile>,
    /// False until the profile exists and carries a name.
    pub complete: bool,
}

#[derive(Debug, Deserialize)]
pub struct ProfileUpdate {
    /// Only used when no profile exists yet.
    pub user_type: Option<UserType>,
    #[serde(flatten)]
    pub biodata: BiodataInput,
    pub hobby: Option<String>,
    pub desired_major: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewRecordRequest {
    #[serde(default)]
    pub subject: String,
    pub semester: i32,
    pub score: f64,
    pub school_year: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PortfolioView {
    pub profile: Profile,
    pub records: Vec<AcademicRecord>,
    pub achievements: Vec<Achievement>,
    pub organizations: Vec<Organization>,
    pub recommendation: Option<Recommendation>,
    pub matches_desired_major: Option<bool>,
}

/// GET /api/v1/me
pub async fn handle_me(session: SessionContext) -> Result<Json<MeResponse>, AppError> {
    let profile = session.profile().await?.cloned();
    Ok(Json(MeResponse {
        identity: session.identity().clone(),
        complete: profile.as_ref().is_some_and(Profile::is_complete),
        profile,
    }))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// PUT /api/v1/profile
/// Settings edit of the biodata, validated like the wizard's biodata step.
pub async fn handle_update_profile(
    mut session: SessionContext,
    Json(req): Json<ProfileUpdate>,
) -> Result<Json<Profile>, AppError> {
    let existing = session.profile().await?.cloned();
    let user_type = match (&existing, req.user_type) {
        (Some(p), _) => p.user_type(),
        (None, Some(t)) => t,
        (None, None) => {
            return Err(AppError::InvalidFields(BTreeMap::from([(
                "user_type".to_string(),
                "User type is required".to_string(),
            )])))
        }
    };
    if user_type == UserType::Admin {
        return Err(AppError::Forbidden);
    }

    let biodata = validate_biodata(user_type, &req.biodata).map_err(AppError::InvalidFields)?;
    let (hobby, desired_major) = match &existing {
        Some(p) => (
            non_blank(req.hobby).or_else(|| p.hobby.clone()),
            non_blank(req.desired_major).or_else(|| p.desired_major.clone()),
        ),
        None => (non_blank(req.hobby), non_blank(req.desired_major)),
    };
    let profile = Profile {
        id: session.user_id(),
        name: biodata.name,
        email: session.identity().email.clone(),
        gender: Some(biodata.gender),
        date_of_birth: Some(biodata.date_of_birth),
        hobby,
        desired_major,
        kind: biodata.details.into_profile_kind(),
        updated_at: None,
    };
    session.data().upsert_profile(&profile).await?;
    info!("Profile {} updated", profile.id);

    let stored = session
        .refresh_profile()
        .await?
        .cloned()
        .ok_or_else(|| AppError::NotFound("Profile not found".to_string()))?;
    Ok(Json(stored))
}

/// GET /api/v1/records
pub async fn handle_list_records(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Json<Vec<AcademicRecord>>, AppError> {
    Ok(Json(state.data.list_records_for_user(session.user_id()).await?))
}

pub fn validate_new_record(req: &NewRecordRequest) -> Result<(), BTreeMap<String, String>> {
    let mut errors = BTreeMap::new();
    if req.subject.trim().is_empty() {
        errors.insert("subject".to_string(), "Subject is required".to_string());
    }
    if !is_valid_semester(req.semester) {
        errors.insert(
            "semester".to_string(),
            "Semester must be between 1 and 6".to_string(),
        );
    }
    if !is_valid_score(req.score) {
        errors.insert(
            "score".to_string(),
            "Score must be between 0 and 100".to_string(),
        );
    }
    if let Some(year) = &req.school_year {
        if !is_valid_school_year(year) {
            errors.insert(
                "school_year".to_string(),
                "School year must look like 2024/2025".to_string(),
            );
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// POST /api/v1/records
pub async fn handle_create_record(
    State(state): State<AppState>,
    session: SessionContext,
    Json(req): Json<NewRecordRequest>,
) -> Result<(StatusCode, Json<Vec<AcademicRecord>>), AppError> {
    let profile = session.require_profile().await?;
    if profile.is_admin() {
        return Err(AppError::Forbidden);
    }
    validate_new_record(&req).map_err(AppError::InvalidFields)?;

    let record = NewAcademicRecord {
        user_id: profile.id,
        subject: req.subject.trim().to_string(),
        semester: req.semester,
        score: req.score,
        school_year: req
            .school_year
            .map(|y| y.trim().to_string())
            .unwrap_or_else(|| school_year_for(Utc::now().date_naive())),
    };
    // A duplicate (subject, semester) comes back as 409 DUPLICATE_SCORE.
    state.data.insert_records(&[record]).await?;
    info!("Added {} semester {} for {}", req.subject.trim(), req.semester, profile.id);

    let records = state.data.list_records_for_user(profile.id).await?;
    Ok((StatusCode::CREATED, Json(records)))
}

/// GET /api/v1/portfolio
pub async fn handle_portfolio(
    State(state): State<AppState>,
    session: SessionContext,
) -> Result<Json<PortfolioView>, AppError> {
    let profile = session.require_profile().await?.clone();
    let records = state.data.list_records_for_user(profile.id).await?;
    let achievements = state.data.list_achievements(profile.id).await?;
    let organizations = state.data.list_organizations(profile.id).await?;
    let recommendation = state.data.get_recommendation(profile.id).await?;
    let matches_desired_major = recommendation
        .as_ref()
        .map(|r| desired_major_matches(&profile, &r.prediction));

    Ok(Json(PortfolioView {
        profile,
        records,
        achievements,
        organizations,
        recommendation,
        matches_desired_major,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(subject: &str, semester: i32, score: f64, year: Option<&str>) -> NewRecordRequest {
        NewRecordRequest {
            subject: subject.to_string(),
            semester,
            score,
            school_year: year.map(String::from),
        }
    }

    #[test]
    fn test_valid_record() {
        assert!(validate_new_record(&request("Fisika", 6, 100.0, Some("2025/2026"))).is_ok());
        assert!(validate_new_record(&request("Fisika", 1, 0.0, None)).is_ok());
    }

    #[test]
    fn test_each_invalid_field_reported() {
        let errors =
            validate_new_record(&request(" ", 7, 100.5, Some("2025/2027"))).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains_key("semester"));
        assert!(errors.contains_key("school_year"));
    }

    #[test]
    fn test_profile_update_flattens_biodata() {
        let req: ProfileUpdate = serde_json::from_str(
            r#"{"name":"Rani","date_of_birth":"2008-05-01","school_name":"SMA 3","track":"IPS","class_year":"12","hobby":"Tari"}"#,
        )
        .unwrap();
        assert_eq!(req.biodata.name, "Rani");
        assert_eq!(req.hobby.as_deref(), Some("Tari"));
        let biodata = validate_biodata(UserType::Student, &req.biodata).unwrap();
        assert_eq!(biodata.name, "Rani");
    }
}
