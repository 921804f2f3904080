use axum::{
    extract::{Multipart, State},
    Json,
};

use crate::errors::AppError;
use crate::ocr::OcrOutcome;
use crate::storage::{read_image_field, ImageUpload};
use crate::state::AppState;

/// Pulls the `file` part out of a multipart body.
pub async fn read_file_part(multipart: &mut Multipart) -> Result<ImageUpload, AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        if field.name() == Some("file") {
            return read_image_field(field).await;
        }
    }
    Err(AppError::Validation("No file provided in the request".to_string()))
}

/// POST /api/v1/ocr
pub async fn handle_ocr(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<OcrOutcome>, AppError> {
    let image = read_file_part(&mut multipart).await?;
    Ok(Json(state.ocr.recognize(&image).await))
}
