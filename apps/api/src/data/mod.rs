//! Data access boundary for the hosted Postgres tables.
//!
//! Backend errors are classified into [`DataErrorKind`] here, once. Callers
//! branch on the kind and never inspect message text.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::academic::{AcademicRecord, NewAcademicRecord};
use crate::models::portfolio::{
    Achievement, NewAchievement, NewOrganization, Organization, Recommendation,
};
use crate::models::profile::Profile;

pub mod postgres;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataErrorKind {
    /// Unique constraint violated, e.g. a second score for the same subject/semester.
    Duplicate,
    NotFound,
    /// Rejected by row-level security.
    PermissionDenied,
    Unavailable,
    /// Stored row could not be mapped onto the domain model.
    Invalid,
    Other,
}

#[derive(Debug, Clone, Error)]
#[error("{kind:?}: {message}")]
pub struct DataError {
    pub kind: DataErrorKind,
    pub message: String,
}

impl DataError {
    pub fn new(kind: DataErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_duplicate(&self) -> bool {
        self.kind == DataErrorKind::Duplicate
    }
}

pub type DataResult<T> = Result<T, DataError>;

/// Everything the service reads or writes in the remote tables.
#[async_trait]
pub trait DataService: Send + Sync {
    async fn get_profile(&self, user_id: Uuid) -> DataResult<Option<Profile>>;

    /// Insert or overwrite on `profile.id`.
    async fn upsert_profile(&self, profile: &Profile) -> DataResult<()>;

    /// Students whose school name contains `school` (case-insensitive), ordered by name.
    async fn list_students_by_school(&self, school: &str) -> DataResult<Vec<Profile>>;

    async fn list_records_for_user(&self, user_id: Uuid) -> DataResult<Vec<AcademicRecord>>;

    /// Every record visible to the caller, ordered by subject then semester.
    async fn list_all_records(&self) -> DataResult<Vec<AcademicRecord>>;

    async fn get_record(&self, record_id: Uuid) -> DataResult<Option<AcademicRecord>>;

    async fn insert_records(&self, records: &[NewAcademicRecord]) -> DataResult<usize>;

    /// Sets `score` and stamps `updated_at`; scoped to a single record id.
    async fn update_score(&self, record_id: Uuid, score: f64) -> DataResult<()>;

    async fn insert_achievements(&self, rows: &[NewAchievement]) -> DataResult<usize>;

    async fn list_achievements(&self, user_id: Uuid) -> DataResult<Vec<Achievement>>;

    async fn insert_organizations(&self, rows: &[NewOrganization]) -> DataResult<usize>;

    async fn list_organizations(&self, user_id: Uuid) -> DataResult<Vec<Organization>>;

    async fn get_recommendation(&self, user_id: Uuid) -> DataResult<Option<Recommendation>>;

    /// Replaces any existing recommendation for the user.
    async fn upsert_recommendation(
        &self,
        user_id: Uuid,
        prediction: &str,
    ) -> DataResult<Recommendation>;
}
