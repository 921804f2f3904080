use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::recommendation::features::RecommendationPayload;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Error)]
pub enum RecommendationError {
    #[error("Recommendation service unreachable: {0}")]
    Unreachable(String),

    #[error("Recommendation service returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Recommendation response has no prediction")]
    MissingPrediction,

    #[error("Recommendation response is not valid JSON: {0}")]
    Malformed(String),
}

impl RecommendationError {
    /// Message shown to the user; always offers trying again later.
    pub fn user_message(&self) -> String {
        match self {
            RecommendationError::Unreachable(_) => {
                "The recommendation service could not be reached. Please try again later."
            }
            RecommendationError::Status { .. } => {
                "The recommendation service is having trouble right now. Please try again later."
            }
            RecommendationError::MissingPrediction | RecommendationError::Malformed(_) => {
                "The recommendation service answered without a prediction. Please try again later."
            }
        }
        .to_string()
    }
}

#[async_trait]
pub trait Recommender: Send + Sync {
    /// Returns the predicted major category.
    async fn predict(&self, payload: &RecommendationPayload) -> Result<String, RecommendationError>;
}

/// Pulls a non-empty `prediction` string out of a response body.
pub fn parse_prediction(body: &str) -> Result<String, RecommendationError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| RecommendationError::Malformed(e.to_string()))?;
    value
        .get("prediction")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .ok_or(RecommendationError::MissingPrediction)
}

#[derive(Clone)]
pub struct HttpRecommender {
    client: Client,
    url: String,
}

impl HttpRecommender {
    pub fn new(client: Client, url: String) -> Self {
        Self { client, url }
    }
}

#[async_trait]
impl Recommender for HttpRecommender {
    async fn predict(&self, payload: &RecommendationPayload) -> Result<String, RecommendationError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(REQUEST_TIMEOUT)
            .json(payload)
            .send()
            .await
            .map_err(|e| RecommendationError::Unreachable(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| RecommendationError::Unreachable(e.to_string()))?;

        if !status.is_success() {
            warn!("Recommendation service returned {status}: {body}");
            return Err(RecommendationError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let prediction = parse_prediction(&body)?;
        debug!("Recommendation service predicted '{prediction}'");
        Ok(prediction)
    }
}
