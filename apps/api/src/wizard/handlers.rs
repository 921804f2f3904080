//! Axum route handlers for the registration wizard.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::profile::ProfileKind;
use crate::ocr::handlers::read_file_part;
use crate::ocr::OcrOutcome;
use crate::session::{IdentityError, OptionalSession, SignUpOutcome};
use crate::state::AppState;
use crate::storage::read_image_field;
use crate::wizard::report::CellUpdate;
use crate::wizard::steps::{AccountInput, AchievementDraft, StepInput};
use crate::wizard::submit::{submit_wizard, SubmissionOutcome};
use crate::wizard::{Advance, EntryPoint, Wizard, WizardView};

const CONFIRM_EMAIL_MESSAGE: &str =
    "Account created. Check your email to confirm it, then sign in to continue.";

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub id: Uuid,
    pub wizard: WizardView,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ContinueResponse {
    Moved { wizard: WizardView },
    /// The account exists and is signed in; later requests carry this token.
    SignedUp { access_token: String, wizard: WizardView },
    ConfirmEmail { message: String, wizard: WizardView },
    Submitted { outcome: SubmissionOutcome },
}

#[derive(Debug, Deserialize)]
pub struct ScoreCellRequest {
    pub subject: String,
    pub semester: i32,
    #[serde(default)]
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct ScoreCellResponse {
    pub accepted: bool,
    /// Value now in the cell.
    pub score: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SubjectRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct OcrPrefillResponse {
    pub ocr: OcrOutcome,
    pub applied: usize,
    pub wizard: WizardView,
}

fn caller_id(session: &OptionalSession) -> Option<Uuid> {
    session.0.as_ref().map(|s| s.user_id())
}

/// POST /api/v1/wizard
/// Anonymous callers register from scratch; signed-in callers complete their data.
pub async fn handle_start_wizard(
    State(state): State<AppState>,
    session: OptionalSession,
) -> Result<(StatusCode, Json<StartResponse>), AppError> {
    let (entry, owner) = match &session.0 {
        None => (EntryPoint::FreshRegistration, None),
        Some(ctx) => {
            let user_type = match ctx.profile().await? {
                None => None,
                Some(p) => match &p.kind {
                    ProfileKind::Admin { .. } => return Err(AppError::Forbidden),
                    kind => Some(kind.user_type()),
                },
            };
            (EntryPoint::CompleteProfile { user_type }, Some(ctx.user_id()))
        }
    };

    let wizard = Wizard::new(entry, owner);
    let view = wizard.view();
    let id = state.wizards.create(wizard).await?;
    info!("Started wizard {id} ({entry:?})");
    Ok((StatusCode::CREATED, Json(StartResponse { id, wizard: view })))
}

/// GET /api/v1/wizard/:id
pub async fn handle_get_wizard(
    State(state): State<AppState>,
    session: OptionalSession,
    Path(id): Path<Uuid>,
) -> Result<Json<WizardView>, AppError> {
    let caller = caller_id(&session);
    let view = state
        .wizards
        .with_wizard(id, |w| {
            w.claim(caller)?;
            Ok::<_, AppError>(w.view())
        })
        .await??;
    Ok(Json(view))
}

/// POST /api/v1/wizard/:id/continue
pub async fn handle_continue(
    State(state): State<AppState>,
    session: OptionalSession,
    Path(id): Path<Uuid>,
    Json(input): Json<StepInput>,
) -> Result<Json<ContinueResponse>, AppError> {
    let caller = caller_id(&session);
    let (advance, submission, wizard) = state
        .wizards
        .with_wizard(id, |w| {
            w.claim(caller)?;
            let advance = w.continue_with(input)?;
            let submission = match advance {
                Advance::ReadyToSubmit => Some(w.begin_submission()?),
                _ => None,
            };
            Ok::<_, AppError>((advance, submission, w.view()))
        })
        .await??;

    let response = match (advance, submission) {
        (Advance::SignUpRequired(account), _) => sign_up(&state, id, account).await?,
        (_, Some(submission)) => {
            let identity = session.0.as_ref().map(|s| s.identity());
            let outcome = match submit_wizard(
                identity,
                &submission,
                state.data.as_ref(),
                state.storage.as_ref(),
                Utc::now(),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    // Kept in the store so the user can retry.
                    state
                        .wizards
                        .with_wizard(id, |w| w.submission_failed())
                        .await?;
                    return Err(e);
                }
            };
            state.wizards.remove(id).await;
            if outcome.has_soft_failures() {
                warn!(
                    "Wizard {id} submitted with {} achievement and {} organization failures",
                    outcome.achievements_failed.len(),
                    outcome.organizations_failed.len()
                );
            }
            ContinueResponse::Submitted { outcome }
        }
        _ => ContinueResponse::Moved { wizard },
    };
    Ok(Json(response))
}

async fn sign_up(
    state: &AppState,
    id: Uuid,
    account: AccountInput,
) -> Result<ContinueResponse, AppError> {
    let outcome = state
        .identity
        .sign_up(account.email.trim(), &account.password)
        .await
        .map_err(|e| match e {
            IdentityError::Rejected { message, .. } => AppError::Validation(message),
            other => other.into(),
        })?;

    match outcome {
        SignUpOutcome::SignedIn(auth) => {
            info!("Account {} created from wizard {id}", auth.identity.id);
            let wizard = state
                .wizards
                .with_wizard(id, |w| {
                    w.account_created(&auth.identity)?;
                    Ok::<_, AppError>(w.view())
                })
                .await??;
            Ok(ContinueResponse::SignedUp {
                access_token: auth.access_token,
                wizard,
            })
        }
        SignUpOutcome::ConfirmationRequired => Ok(ContinueResponse::ConfirmEmail {
            message: CONFIRM_EMAIL_MESSAGE.to_string(),
            wizard: state.wizards.with_wizard(id, |w| w.view()).await?,
        }),
    }
}

/// POST /api/v1/wizard/:id/back
pub async fn handle_back(
    State(state): State<AppState>,
    session: OptionalSession,
    Path(id): Path<Uuid>,
) -> Result<Json<WizardView>, AppError> {
    let caller = caller_id(&session);
    let view = state
        .wizards
        .with_wizard(id, |w| {
            w.claim(caller)?;
            w.back()?;
            Ok::<_, AppError>(w.view())
        })
        .await??;
    Ok(Json(view))
}

/// POST /api/v1/wizard/:id/skip
pub async fn handle_skip(
    State(state): State<AppState>,
    session: OptionalSession,
    Path(id): Path<Uuid>,
) -> Result<Json<WizardView>, AppError> {
    let caller = caller_id(&session);
    let view = state
        .wizards
        .with_wizard(id, |w| {
            w.claim(caller)?;
            w.skip()?;
            Ok::<_, AppError>(w.view())
        })
        .await??;
    Ok(Json(view))
}

/// PUT /api/v1/wizard/:id/report/score
pub async fn handle_set_score(
    State(state): State<AppState>,
    session: OptionalSession,
    Path(id): Path<Uuid>,
    Json(req): Json<ScoreCellRequest>,
) -> Result<Json<ScoreCellResponse>, AppError> {
    let caller = caller_id(&session);
    let response = state
        .wizards
        .with_wizard(id, |w| {
            w.claim(caller)?;
            let report = w.report_mut()?;
            let update = report.set_score(&req.subject, req.semester, &req.value);
            Ok::<_, AppError>(ScoreCellResponse {
                accepted: update != CellUpdate::Rejected,
                score: report.score(&req.subject, req.semester),
            })
        })
        .await??;
    Ok(Json(response))
}

/// POST /api/v1/wizard/:id/report/subjects
pub async fn handle_add_subject(
    State(state): State<AppState>,
    session: OptionalSession,
    Path(id): Path<Uuid>,
    Json(req): Json<SubjectRequest>,
) -> Result<Json<WizardView>, AppError> {
    let caller = caller_id(&session);
    let view = state
        .wizards
        .with_wizard(id, |w| {
            w.claim(caller)?;
            if !w.report_mut()?.add_subject(&req.name) {
                return Err(AppError::Validation(
                    "Subject is empty or already on the report".to_string(),
                ));
            }
            Ok::<_, AppError>(w.view())
        })
        .await??;
    Ok(Json(view))
}

/// DELETE /api/v1/wizard/:id/report/subjects
pub async fn handle_remove_subject(
    State(state): State<AppState>,
    session: OptionalSession,
    Path(id): Path<Uuid>,
    Json(req): Json<SubjectRequest>,
) -> Result<Json<WizardView>, AppError> {
    let caller = caller_id(&session);
    let view = state
        .wizards
        .with_wizard(id, |w| {
            w.claim(caller)?;
            if !w.report_mut()?.remove_subject(&req.name) {
                return Err(AppError::NotFound(format!(
                    "Subject '{}' is not on the report",
                    req.name
                )));
            }
            Ok::<_, AppError>(w.view())
        })
        .await??;
    Ok(Json(view))
}

/// POST /api/v1/wizard/:id/report/ocr
/// Multipart: `semester` (text) and `file` (report-card photo).
pub async fn handle_report_ocr(
    State(state): State<AppState>,
    session: OptionalSession,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<OcrPrefillResponse>, AppError> {
    let caller = caller_id(&session);
    let semesters = state
        .wizards
        .with_wizard(id, |w| {
            w.claim(caller)?;
            Ok::<_, AppError>(w.report_mut()?.semesters())
        })
        .await??;

    // `semester` has to come before `file` in the body.
    let mut semester = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_owned);
        if name.as_deref() == Some("semester") {
            let text = field
                .text()
                .await
                .map_err(|e| AppError::Validation(format!("Invalid semester field: {e}")))?;
            semester = text.trim().parse::<i32>().ok();
            break;
        }
    }
    let semester = semester
        .filter(|s| (1..=semesters).contains(s))
        .ok_or_else(|| {
            AppError::Validation(format!("Semester must be between 1 and {semesters}"))
        })?;
    let image = read_file_part(&mut multipart).await?;

    let ocr = state.ocr.recognize(&image).await;
    let (applied, wizard) = state
        .wizards
        .with_wizard(id, |w| {
            w.claim(caller)?;
            let applied = match (&ocr, w.report_mut()) {
                (OcrOutcome::Scores { scores, .. }, Ok(report)) => {
                    report.apply_scores(semester, scores)
                }
                _ => 0,
            };
            Ok::<_, AppError>((applied, w.view()))
        })
        .await??;
    info!("OCR pre-filled {applied} cells of semester {semester} in wizard {id}");
    Ok(Json(OcrPrefillResponse {
        ocr,
        applied,
        wizard,
    }))
}

/// POST /api/v1/wizard/:id/achievements
/// Multipart: `title` (text) and an optional `file` (certificate image).
pub async fn handle_add_achievement(
    State(state): State<AppState>,
    session: OptionalSession,
    Path(id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<Json<WizardView>, AppError> {
    let mut title = String::new();
    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().map(str::to_owned);
        let has_file = field.file_name().is_some_and(|n| !n.is_empty());
        match name.as_deref() {
            Some("title") => {
                title = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid title field: {e}")))?;
            }
            // Browsers send an empty part when no file was chosen.
            Some("file") if has_file => {
                image = Some(read_image_field(field).await?);
            }
            _ => {}
        }
    }

    let caller = caller_id(&session);
    let view = state
        .wizards
        .with_wizard(id, |w| {
            w.claim(caller)?;
            w.add_achievement(AchievementDraft {
                title: title.trim().to_string(),
                image,
            })?;
            Ok::<_, AppError>(w.view())
        })
        .await??;
    Ok(Json(view))
}

/// DELETE /api/v1/wizard/:id/achievements/:index
pub async fn handle_remove_achievement(
    State(state): State<AppState>,
    session: OptionalSession,
    Path((id, index)): Path<(Uuid, usize)>,
) -> Result<Json<WizardView>, AppError> {
    let caller = caller_id(&session);
    let view = state
        .wizards
        .with_wizard(id, |w| {
            w.claim(caller)?;
            w.remove_achievement(index)?
                .ok_or_else(|| AppError::NotFound(format!("No achievement at index {index}")))?;
            Ok::<_, AppError>(w.view())
        })
        .await??;
    Ok(Json(view))
}
