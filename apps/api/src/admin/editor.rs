//! Inline score editor.
//!
//! Each admin has one edit slot: at most one record is being edited at a
//! time. Keystrokes only reach the scratch value when they keep it a whole
//! number in [0, 100]. Saving re-validates locally, then issues a single
//! update for the record in the slot.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::data::{DataError, DataService};
use crate::errors::AppError;
use crate::models::academic::{AcademicRecord, MAX_SCORE, MIN_SCORE};

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("No score is being edited")]
    NoActiveEdit,

    #[error("Score must be a whole number between 0 and 100")]
    InvalidScore,

    #[error("This score is already being saved")]
    AlreadySaving,

    #[error(transparent)]
    Data(#[from] DataError),
}

impl From<EditorError> for AppError {
    fn from(e: EditorError) -> Self {
        match e {
            EditorError::Data(e) => AppError::Data(e),
            EditorError::NoActiveEdit => AppError::NotFound(e.to_string()),
            other => AppError::Validation(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EditSlot {
    pub student_id: Uuid,
    pub record_id: Uuid,
    pub scratch: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SavedScore {
    pub student_id: Uuid,
    pub record_id: Uuid,
    pub score: f64,
}

/// Whether `value` may become the scratch value: empty, or digits forming a
/// number in [0, 100].
pub fn accept_keystroke(value: &str) -> bool {
    value.is_empty()
        || (value.chars().all(|c| c.is_ascii_digit())
            && value
                .parse::<u32>()
                .is_ok_and(|n| (n as f64) <= MAX_SCORE))
}

/// The score a scratch value stands for, if it is a whole number in range.
pub fn validate_scratch(scratch: &str) -> Result<f64, EditorError> {
    let value = scratch.trim();
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(EditorError::InvalidScore);
    }
    let score = value
        .parse::<u32>()
        .map_err(|_| EditorError::InvalidScore)? as f64;
    if (MIN_SCORE..=MAX_SCORE).contains(&score) {
        Ok(score)
    } else {
        Err(EditorError::InvalidScore)
    }
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct ScoreEditor {
    slot: Option<EditSlot>,
    /// Records with an update in flight.
    saving: HashSet<Uuid>,
}

impl ScoreEditor {
    /// Opens the slot on `record`, replacing whatever was being edited. The
    /// scratch value starts at the whole part of the stored score.
    pub fn begin(&mut self, record: &AcademicRecord) -> &EditSlot {
        self.slot.insert(EditSlot {
            student_id: record.user_id,
            record_id: record.id,
            scratch: (record.score.trunc() as i64).to_string(),
        })
    }

    /// Applies a keystroke. Rejected input leaves the scratch value as it was.
    pub fn update_scratch(&mut self, value: &str) -> Result<bool, EditorError> {
        let slot = self.slot.as_mut().ok_or(EditorError::NoActiveEdit)?;
        if !accept_keystroke(value) {
            return Ok(false);
        }
        slot.scratch = value.to_string();
        Ok(true)
    }

    pub fn cancel(&mut self) -> Option<EditSlot> {
        self.slot.take()
    }

    pub fn slot(&self) -> Option<&EditSlot> {
        self.slot.as_ref()
    }

    pub fn is_saving(&self, record_id: Uuid) -> bool {
        self.saving.contains(&record_id)
    }
}

/// Editors of all admins, keyed by admin id.
#[derive(Clone, Default)]
pub struct EditorSessions {
    inner: Arc<Mutex<HashMap<Uuid, ScoreEditor>>>,
}

impl EditorSessions {
    /// Runs `f` on the admin's editor, creating it on first use.
    pub async fn with_editor<R>(&self, admin_id: Uuid, f: impl FnOnce(&mut ScoreEditor) -> R) -> R {
        let mut editors = self.inner.lock().await;
        f(editors.entry(admin_id).or_default())
    }

    /// Saves the slot's scratch value with exactly one update call. Invalid
    /// input never reaches the data service. On failure the slot stays open
    /// with the attempted value.
    pub async fn save(
        &self,
        admin_id: Uuid,
        data: &dyn DataService,
    ) -> Result<SavedScore, EditorError> {
        let (student_id, record_id, score) = self
            .with_editor(admin_id, |editor| -> Result<_, EditorError> {
                let slot = editor.slot.as_ref().ok_or(EditorError::NoActiveEdit)?;
                let score = validate_scratch(&slot.scratch)?;
                let (student_id, record_id) = (slot.student_id, slot.record_id);
                if !editor.saving.insert(record_id) {
                    return Err(EditorError::AlreadySaving);
                }
                Ok((student_id, record_id, score))
            })
            .await?;

        let result = data.update_score(record_id, score).await;

        self.with_editor(admin_id, |editor| {
            editor.saving.remove(&record_id);
            match result {
                Ok(()) => {
                    if editor.slot.as_ref().is_some_and(|s| s.record_id == record_id) {
                        editor.slot = None;
                    }
                    info!("Admin {admin_id} set record {record_id} to {score}");
                    Ok(SavedScore {
                        student_id,
                        record_id,
                        score,
                    })
                }
                Err(e) => {
                    warn!("Score update for record {record_id} failed: {e}");
                    Err(EditorError::Data(e))
                }
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataErrorKind;
    use crate::testing::{record, FailOn, InMemoryData};

    async fn seeded() -> (InMemoryData, AcademicRecord) {
        let data = InMemoryData::default();
        let student = Uuid::new_v4();
        data.insert_records(&[record(student, "Fisika", 2, 78.0).into()])
            .await
            .unwrap();
        let stored = data.records().pop().unwrap();
        (data, stored)
    }

    #[test]
    fn test_keystroke_filter() {
        for ok in ["", "0", "7", "85", "100"] {
            assert!(accept_keystroke(ok), "{ok}");
        }
        for bad in ["101", "-1", "8.5", "abc", "1e2", " 9", "99999999999"] {
            assert!(!accept_keystroke(bad), "{bad}");
        }
    }

    #[test]
    fn test_rejected_keystroke_keeps_scratch() {
        let mut editor = ScoreEditor::default();
        let r = record(Uuid::new_v4(), "Kimia", 1, 90.0);
        assert_eq!(editor.begin(&r).scratch, "90");
        assert!(!editor.update_scratch("901").unwrap());
        assert_eq!(editor.slot().unwrap().scratch, "90");
        assert!(editor.update_scratch("9").unwrap());
        assert_eq!(editor.slot().unwrap().scratch, "9");
    }

    #[test]
    fn test_decimal_score_opens_as_whole_number() {
        let mut editor = ScoreEditor::default();
        let r = record(Uuid::new_v4(), "Ekonomi", 3, 87.5);
        assert_eq!(editor.begin(&r).scratch, "87");
        assert_eq!(validate_scratch("87").unwrap(), 87.0);
    }

    #[test]
    fn test_single_slot() {
        let mut editor = ScoreEditor::default();
        let first = record(Uuid::new_v4(), "Kimia", 1, 90.0);
        let second = record(Uuid::new_v4(), "Biologi", 1, 70.0);
        editor.begin(&first);
        editor.begin(&second);
        assert_eq!(editor.slot().unwrap().record_id, second.id);
        assert_eq!(editor.cancel().unwrap().record_id, second.id);
        assert!(matches!(
            editor.update_scratch("5"),
            Err(EditorError::NoActiveEdit)
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_rejected_without_update_call() {
        let (data, stored) = seeded().await;
        let sessions = EditorSessions::default();
        let admin = Uuid::new_v4();
        sessions
            .with_editor(admin, |e| {
                e.begin(&stored);
                e.slot.as_mut().unwrap().scratch = "101".to_string();
            })
            .await;

        let err = sessions.save(admin, &data).await.unwrap_err();
        assert!(matches!(err, EditorError::InvalidScore));
        assert_eq!(data.update_calls(), 0);
        let slot = sessions.with_editor(admin, |e| e.slot().cloned()).await;
        assert_eq!(slot.unwrap().scratch, "101");
    }

    #[tokio::test]
    async fn test_valid_save_issues_one_update() {
        let (data, stored) = seeded().await;
        let sessions = EditorSessions::default();
        let admin = Uuid::new_v4();
        sessions
            .with_editor(admin, |e| {
                e.begin(&stored);
                e.update_scratch("100").unwrap();
            })
            .await;

        let saved = sessions.save(admin, &data).await.unwrap();
        assert_eq!(saved.record_id, stored.id);
        assert_eq!(saved.score, 100.0);
        assert_eq!(data.update_calls(), 1);
        assert_eq!(data.records()[0].score, 100.0);
        assert!(data.records()[0].updated_at.is_some());
        assert!(sessions.with_editor(admin, |e| e.slot().is_none()).await);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_slot_for_retry() {
        let (data, stored) = seeded().await;
        data.fail_on(FailOn::UpdateScore);
        let sessions = EditorSessions::default();
        let admin = Uuid::new_v4();
        sessions
            .with_editor(admin, |e| {
                e.begin(&stored);
                e.update_scratch("95").unwrap();
            })
            .await;

        let err = sessions.save(admin, &data).await.unwrap_err();
        assert!(matches!(
            err,
            EditorError::Data(DataError {
                kind: DataErrorKind::Unavailable,
                ..
            })
        ));
        let (slot, saving) = sessions
            .with_editor(admin, |e| (e.slot().cloned(), e.is_saving(stored.id)))
            .await;
        assert_eq!(slot.unwrap().scratch, "95");
        assert!(!saving);

        data.recover(FailOn::UpdateScore);
        sessions.save(admin, &data).await.unwrap();
        assert_eq!(data.update_calls(), 2);
        assert_eq!(data.records()[0].score, 95.0);
    }

    #[tokio::test]
    async fn test_second_save_refused_while_update_in_flight() {
        let (data, stored) = seeded().await;
        let data = Arc::new(data);
        let gate = data.hold_updates();
        let sessions = EditorSessions::default();
        let admin = Uuid::new_v4();
        sessions
            .with_editor(admin, |e| {
                e.begin(&stored);
                e.update_scratch("64").unwrap();
            })
            .await;

        let first = tokio::spawn({
            let (sessions, data) = (sessions.clone(), data.clone());
            async move { sessions.save(admin, data.as_ref()).await }
        });
        while data.update_calls() == 0 {
            tokio::task::yield_now().await;
        }

        assert!(sessions.with_editor(admin, |e| e.is_saving(stored.id)).await);
        assert!(matches!(
            sessions.save(admin, data.as_ref()).await,
            Err(EditorError::AlreadySaving)
        ));

        gate.notify_one();
        let saved = first.await.unwrap().unwrap();
        assert_eq!(saved.score, 64.0);
        assert!(!sessions.with_editor(admin, |e| e.is_saving(stored.id)).await);
        assert_eq!(data.update_calls(), 1);
    }

    #[tokio::test]
    async fn test_editors_are_per_admin() {
        let (_data, stored) = seeded().await;
        let sessions = EditorSessions::default();
        sessions
            .with_editor(Uuid::new_v4(), |e| {
                e.begin(&stored);
            })
            .await;
        assert!(
            sessions
                .with_editor(Uuid::new_v4(), |e| e.slot().is_none())
                .await
        );
    }
}
