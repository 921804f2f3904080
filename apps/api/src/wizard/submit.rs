//! Final write of a completed wizard.
//!
//! Steps run in order: profile, academic records, certificate uploads with
//! achievements, organizations. The first two are hard failures and abort the
//! write. Everything after them is collected into [`SubmissionOutcome`]
//! instead of failing the request.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::data::DataService;
use crate::errors::AppError;
use crate::models::academic::school_year_for;
use crate::models::portfolio::{NewAchievement, NewOrganization};
use crate::models::profile::Profile;
use crate::session::Identity;
use crate::storage::{object_path, FileStorage, StorageError};
use crate::wizard::Submission;

pub const DASHBOARD_PATH: &str = "/dashboard";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureStage {
    Upload,
    Insert,
}

/// One item that could not be saved; the rest of the submission went ahead.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SoftFailure {
    pub item: String,
    pub stage: FailureStage,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionOutcome {
    pub profile_saved: bool,
    pub records_inserted: usize,
    pub achievements_saved: usize,
    pub achievements_failed: Vec<SoftFailure>,
    pub organizations_saved: usize,
    pub organizations_failed: Vec<SoftFailure>,
    pub redirect_to: &'static str,
}

impl SubmissionOutcome {
    pub fn has_soft_failures(&self) -> bool {
        !self.achievements_failed.is_empty() || !self.organizations_failed.is_empty()
    }
}

/// Profile row for `identity` built from the wizard answers.
pub fn build_profile(identity: &Identity, submission: &Submission) -> Profile {
    let biodata = submission.biodata.clone();
    Profile {
        id: identity.id,
        name: biodata.name,
        email: identity.email.clone(),
        gender: Some(biodata.gender),
        date_of_birth: Some(biodata.date_of_birth),
        hobby: submission.interests.hobby.clone(),
        desired_major: submission.interests.desired_major.clone(),
        kind: biodata.details.into_profile_kind(),
        updated_at: None,
    }
}

pub async fn submit_wizard(
    identity: Option<&Identity>,
    submission: &Submission,
    data: &dyn DataService,
    storage: &dyn FileStorage,
    now: DateTime<Utc>,
) -> Result<SubmissionOutcome, AppError> {
    let identity = identity.ok_or(AppError::Unauthorized)?;
    let user_id = identity.id;

    // 1. Profile
    let profile = build_profile(identity, submission);
    data.upsert_profile(&profile).await.map_err(|e| {
        error!("Profile upsert failed for {user_id}: {e}");
        AppError::Data(e)
    })?;
    info!(
        "Saved {} profile for {user_id}",
        submission.user_type.as_str()
    );

    // 2. Academic records
    let records = submission
        .report
        .flatten(user_id, &school_year_for(now.date_naive()));
    let records_inserted = if records.is_empty() {
        0
    } else {
        data.insert_records(&records).await.map_err(|e| {
            if e.is_duplicate() {
                warn!("Duplicate academic record for {user_id}: {e}");
            } else {
                error!("Academic record insert failed for {user_id}: {e}");
            }
            AppError::Data(e)
        })?
    };

    // 3. Certificates and achievements
    let mut achievements_failed = Vec::new();
    let mut rows = Vec::with_capacity(submission.achievements.len());
    for (index, draft) in submission.achievements.iter().enumerate() {
        let image_url = match &draft.image {
            None => None,
            Some(image) => {
                let path = object_path(
                    user_id,
                    now.timestamp_millis() + index as i64,
                    &image.file_name,
                );
                match storage.upload(&path, image).await {
                    Ok(()) => Some(storage.public_url(&path)),
                    Err(StorageError::AlreadyExists(_)) => {
                        info!("Certificate already stored at {path}");
                        Some(storage.public_url(&path))
                    }
                    Err(e) => {
                        warn!("Certificate upload failed for '{}': {e}", draft.title);
                        achievements_failed.push(SoftFailure {
                            item: draft.title.clone(),
                            stage: FailureStage::Upload,
                            message: e.to_string(),
                        });
                        None
                    }
                }
            }
        };
        rows.push(NewAchievement {
            user_id,
            title: draft.title.trim().to_string(),
            image_url,
        });
    }

    let mut achievements_saved = 0;
    if !rows.is_empty() {
        match data.insert_achievements(&rows).await {
            Ok(n) => achievements_saved = n,
            Err(e) => {
                warn!("Achievement insert failed for {user_id}: {e}");
                achievements_failed.extend(rows.iter().map(|r| SoftFailure {
                    item: r.title.clone(),
                    stage: FailureStage::Insert,
                    message: e.message.clone(),
                }));
            }
        }
    }

    // 4. Organizations
    let mut organizations_failed = Vec::new();
    let mut organizations_saved = 0;
    let rows: Vec<NewOrganization> = submission
        .organizations
        .iter()
        .map(|o| NewOrganization {
            user_id,
            name: o.name.clone(),
            year: o.year.clone(),
            position: o.position.clone(),
        })
        .collect();
    if !rows.is_empty() {
        match data.insert_organizations(&rows).await {
            Ok(n) => organizations_saved = n,
            Err(e) => {
                warn!("Organization insert failed for {user_id}: {e}");
                organizations_failed.extend(rows.iter().map(|r| SoftFailure {
                    item: r.name.clone(),
                    stage: FailureStage::Insert,
                    message: e.message.clone(),
                }));
            }
        }
    }

    let outcome = SubmissionOutcome {
        profile_saved: true,
        records_inserted,
        achievements_saved,
        achievements_failed,
        organizations_saved,
        organizations_failed,
        redirect_to: DASHBOARD_PATH,
    };
    info!(
        "Wizard submitted for {user_id}: {} records, {} achievements, {} organizations",
        outcome.records_inserted, outcome.achievements_saved, outcome.organizations_saved
    );
    Ok(outcome)
}
