use serde::Serialize;
use tracing::{info, warn};

use crate::data::DataService;
use crate::errors::AppError;
use crate::models::portfolio::Recommendation;
use crate::models::profile::Profile;
use crate::recommendation::client::Recommender;
use crate::recommendation::features::{build_payload, PayloadError};
use crate::recommendation::majors::matches_desired_major;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Updated {
        recommendation: Recommendation,
        matches_desired_major: bool,
    },
    /// The external service failed; nothing was written.
    Unavailable { message: String },
}

/// Whether the profile's desired major belongs to the predicted category.
pub fn desired_major_matches(profile: &Profile, prediction: &str) -> bool {
    profile
        .desired_major
        .as_deref()
        .is_some_and(|major| matches_desired_major(prediction, major))
}

/// Builds the feature payload from stored records, asks the recommender and
/// overwrites the stored recommendation. An existing recommendation is only
/// replaced when `confirm_overwrite` is set.
pub async fn refresh_recommendation(
    data: &dyn DataService,
    recommender: &dyn Recommender,
    profile: &Profile,
    confirm_overwrite: bool,
) -> Result<RefreshOutcome, AppError> {
    if !confirm_overwrite && data.get_recommendation(profile.id).await?.is_some() {
        return Err(AppError::ConfirmationRequired(
            "A recommendation already exists; confirm to replace it".to_string(),
        ));
    }

    let records = data.list_records_for_user(profile.id).await?;
    let payload = build_payload(profile, &records).map_err(|e| match e {
        PayloadError::NotAStudent => AppError::Forbidden,
        PayloadError::MissingGender => {
            AppError::Validation("Gender is required before requesting a recommendation".into())
        }
    })?;

    let prediction = match recommender.predict(&payload).await {
        Ok(p) => p,
        Err(e) => {
            warn!("Recommendation for {} failed: {e}", profile.id);
            return Ok(RefreshOutcome::Unavailable {
                message: e.user_message(),
            });
        }
    };

    let recommendation = data.upsert_recommendation(profile.id, &prediction).await?;
    info!("Stored recommendation '{prediction}' for {}", profile.id);

    Ok(RefreshOutcome::Updated {
        matches_desired_major: desired_major_matches(profile, &prediction),
        recommendation,
    })
}
