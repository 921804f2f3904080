//! Axum route handlers for the admin API.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::admin::editor::{EditSlot, SavedScore};
use crate::admin::roster::{load_roster, school_matches, RosterEntry};
use crate::errors::AppError;
use crate::models::profile::{Profile, ProfileKind};
use crate::session::{AdminContext, SessionContext};
use crate::state::AppState;

const MIN_SCHOOL_NAME_CHARS: usize = 5;

#[derive(Debug, Deserialize)]
pub struct RegisterAdminRequest {
    pub school_name: String,
    /// Registration secret handed out to schools.
    #[serde(default)]
    pub registration_password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RosterQuery {
    pub search: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RosterResponse {
    pub school_name: String,
    pub students: Vec<RosterEntry>,
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub record_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ScratchRequest {
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct EditorView {
    pub slot: Option<EditSlot>,
    pub saving: bool,
}

#[derive(Debug, Serialize)]
pub struct ScratchResponse {
    pub accepted: bool,
    pub slot: Option<EditSlot>,
}

/// POST /api/v1/admin/register
/// Creates an admin profile for the signed-in account. Requires the
/// registration secret; an account that already has a profile cannot
/// become (or re-register as) an admin.
pub async fn handle_register_admin(
    State(state): State<AppState>,
    session: SessionContext,
    Json(req): Json<RegisterAdminRequest>,
) -> Result<(StatusCode, Json<Profile>), AppError> {
    if !state.admin_gate.check(&req.registration_password) {
        warn!("Admin registration refused for {}", session.user_id());
        return Err(AppError::Forbidden);
    }
    let school_name = validate_school_name(&req.school_name)?;
    if let Some(existing) = session.profile().await? {
        let message = if existing.is_admin() {
            "This account is already registered as a school admin"
        } else {
            "This account already has a student or alumni profile"
        };
        return Err(AppError::Conflict(message.to_string()));
    }

    let email = session.identity().email.clone();
    let name = email.split('@').next().unwrap_or_default().to_string();
    let profile = Profile {
        id: session.user_id(),
        name,
        email,
        gender: None,
        date_of_birth: None,
        hobby: None,
        desired_major: None,
        kind: ProfileKind::Admin {
            school_name: school_name.to_string(),
        },
        updated_at: None,
    };
    state.data.upsert_profile(&profile).await?;
    info!("Registered admin {} for '{school_name}'", profile.id);
    Ok((StatusCode::CREATED, Json(profile)))
}

fn validate_school_name(raw: &str) -> Result<&str, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::Validation("School name is required".to_string()));
    }
    if name.chars().count() < MIN_SCHOOL_NAME_CHARS {
        return Err(AppError::Validation(format!(
            "School name must be at least {MIN_SCHOOL_NAME_CHARS} characters"
        )));
    }
    Ok(name)
}

/// GET /api/v1/admin/students?search=
pub async fn handle_list_students(
    State(state): State<AppState>,
    admin: AdminContext,
    Query(query): Query<RosterQuery>,
) -> Result<Json<RosterResponse>, AppError> {
    let students = load_roster(
        state.data.as_ref(),
        &admin.school_name,
        query.search.as_deref(),
    )
    .await?;
    Ok(Json(RosterResponse {
        school_name: admin.school_name,
        students,
    }))
}

/// POST /api/v1/admin/editor/edit
/// Opens the edit slot on a record of a student from the admin's school.
pub async fn handle_begin_edit(
    State(state): State<AppState>,
    admin: AdminContext,
    Json(req): Json<EditRequest>,
) -> Result<Json<EditorView>, AppError> {
    let record = state
        .data
        .get_record(req.record_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Record {} not found", req.record_id)))?;
    let student = state.data.get_profile(record.user_id).await?;
    let on_roster = student
        .as_ref()
        .filter(|p| matches!(p.kind, ProfileKind::Student(_)))
        .and_then(|p| p.school_name())
        .is_some_and(|school| school_matches(&admin.school_name, school));
    if !on_roster {
        return Err(AppError::Forbidden);
    }

    let view = state
        .editors
        .with_editor(admin.admin_id(), |editor| {
            let slot = editor.begin(&record).clone();
            EditorView {
                saving: editor.is_saving(slot.record_id),
                slot: Some(slot),
            }
        })
        .await;
    Ok(Json(view))
}

/// PUT /api/v1/admin/editor/scratch
pub async fn handle_update_scratch(
    State(state): State<AppState>,
    admin: AdminContext,
    Json(req): Json<ScratchRequest>,
) -> Result<Json<ScratchResponse>, AppError> {
    let response = state
        .editors
        .with_editor(admin.admin_id(), |editor| {
            let accepted = editor.update_scratch(&req.value)?;
            Ok::<_, AppError>(ScratchResponse {
                accepted,
                slot: editor.slot().cloned(),
            })
        })
        .await?;
    Ok(Json(response))
}

/// POST /api/v1/admin/editor/save
pub async fn handle_save_edit(
    State(state): State<AppState>,
    admin: AdminContext,
) -> Result<Json<SavedScore>, AppError> {
    let saved = state
        .editors
        .save(admin.admin_id(), state.data.as_ref())
        .await?;
    Ok(Json(saved))
}

/// POST /api/v1/admin/editor/cancel
pub async fn handle_cancel_edit(
    State(state): State<AppState>,
    admin: AdminContext,
) -> Result<Json<EditorView>, AppError> {
    state
        .editors
        .with_editor(admin.admin_id(), |editor| editor.cancel())
        .await;
    Ok(Json(EditorView {
        slot: None,
        saving: false,
    }))
}
