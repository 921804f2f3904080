//! Report-card OCR through the external OCR service.
//!
//! Failures never surface as errors: every path ends in an [`OcrOutcome`]
//! the client can show, with manual entry as the fallback.

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::academic::is_valid_score;
use crate::recommendation::features::find_subject;
use crate::storage::ImageUpload;

pub mod handlers;

const MSG_TIMEOUT: &str =
    "OCR processing timed out. Please try a smaller image or enter scores manually.";
const MSG_UNREACHABLE: &str =
    "Could not reach the OCR service. Check your connection or enter scores manually.";
const MSG_TOO_LARGE: &str =
    "Image too large for the OCR service. Please compress it and try again.";
const MSG_UNAVAILABLE: &str =
    "OCR service temporarily unavailable. Please enter scores manually.";
const MSG_NO_RESULT: &str = "No text was found in the image. Please enter scores manually.";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OcrOutcome {
    /// Scores keyed by canonical subject key; absent subjects are left out.
    Scores {
        scores: BTreeMap<String, f64>,
        major: Option<String>,
        class: Option<String>,
    },
    /// Plain-text fallback when the service could not structure the result.
    Text { text: String },
    Unavailable { message: String },
}

#[async_trait]
pub trait OcrService: Send + Sync {
    async fn recognize(&self, image: &ImageUpload) -> OcrOutcome;
}

/// Interprets an OCR response body.
pub fn parse_ocr_body(body: &str) -> OcrOutcome {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return unavailable(MSG_NO_RESULT);
    };

    if let Some(nilai) = value.get("Nilai").and_then(Value::as_object) {
        let mut scores = BTreeMap::new();
        for (name, raw) in nilai {
            let Some(subject) = find_subject(name) else {
                debug!("Ignoring unknown OCR subject '{name}'");
                continue;
            };
            // -1 marks a subject the report card does not have.
            match raw.as_f64() {
                Some(score) if is_valid_score(score) => {
                    scores.insert(subject.key.to_string(), score);
                }
                _ => {}
            }
        }
        let text_field = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        return OcrOutcome::Scores {
            scores,
            major: text_field("Jurusan"),
            class: text_field("Kelas"),
        };
    }

    match value.get("text").and_then(Value::as_str) {
        Some(text) if !text.trim().is_empty() => OcrOutcome::Text {
            text: text.to_string(),
        },
        _ => unavailable(MSG_NO_RESULT),
    }
}

fn unavailable(message: &str) -> OcrOutcome {
    OcrOutcome::Unavailable {
        message: message.to_string(),
    }
}

/// Why an OCR call produced no usable body.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR request timed out after {0:?}")]
    Timeout(Duration),

    #[error("OCR request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Image rejected as too large")]
    TooLarge,

    #[error("OCR service returned {status}: {body}")]
    Status { status: StatusCode, body: String },
}

impl OcrError {
    pub fn user_message(&self) -> &'static str {
        match self {
            OcrError::Timeout(_) => MSG_TIMEOUT,
            OcrError::Transport(_) => MSG_UNREACHABLE,
            OcrError::TooLarge => MSG_TOO_LARGE,
            OcrError::Status { .. } => MSG_UNAVAILABLE,
        }
    }
}

#[derive(Clone)]
pub struct HttpOcrService {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpOcrService {
    pub fn new(client: Client, url: String, timeout: Duration) -> Self {
        Self {
            client,
            url,
            timeout,
        }
    }

    async fn send(&self, image: &ImageUpload) -> Result<String, OcrError> {
        let part = Part::bytes(image.bytes.to_vec()).file_name(image.file_name.clone());
        let part = match part.mime_str(&image.content_type) {
            Ok(p) => p,
            Err(_) => Part::bytes(image.bytes.to_vec()).file_name(image.file_name.clone()),
        };
        let response = self
            .client
            .post(&self.url)
            .multipart(Form::new().part("file", part))
            .send()
            .await?;
        let status = response.status();
        if status == StatusCode::PAYLOAD_TOO_LARGE {
            return Err(OcrError::TooLarge);
        }
        let body = response.text().await?;
        if !status.is_success() {
            return Err(OcrError::Status { status, body });
        }
        Ok(body)
    }

    /// Races the request against the configured timeout. The losing request
    /// is dropped, not cancelled on the remote side.
    async fn call(&self, image: &ImageUpload) -> Result<String, OcrError> {
        within_deadline(self.timeout, self.send(image)).await
    }
}

async fn within_deadline<F>(deadline: Duration, request: F) -> Result<String, OcrError>
where
    F: Future<Output = Result<String, OcrError>>,
{
    tokio::time::timeout(deadline, request)
        .await
        .map_err(|_| OcrError::Timeout(deadline))?
}

#[async_trait]
impl OcrService for HttpOcrService {
    async fn recognize(&self, image: &ImageUpload) -> OcrOutcome {
        info!(
            "OCR request: name={} size={} type={}",
            image.file_name,
            image.bytes.len(),
            image.content_type
        );
        match self.call(image).await {
            Ok(body) => parse_ocr_body(&body),
            Err(e) => {
                warn!("{e}");
                unavailable(e.user_message())
            }
        }
    }
}
