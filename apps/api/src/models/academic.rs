use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const MIN_SEMESTER: i32 = 1;
pub const MAX_SEMESTER: i32 = 6;
pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AcademicRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub subject: String,
    pub semester: i32,
    pub score: f64,
    pub school_year: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Insert shape; uniqueness on (user_id, subject, semester) is enforced by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAcademicRecord {
    pub user_id: Uuid,
    pub subject: String,
    pub semester: i32,
    pub score: f64,
    pub school_year: String,
}

pub fn is_valid_score(score: f64) -> bool {
    score.is_finite() && (MIN_SCORE..=MAX_SCORE).contains(&score)
}

pub fn is_valid_semester(semester: i32) -> bool {
    (MIN_SEMESTER..=MAX_SEMESTER).contains(&semester)
}

/// School year label for the year containing `today`, e.g. `2026/2027`.
pub fn school_year_for(today: NaiveDate) -> String {
    format!("{}/{}", today.year(), today.year() + 1)
}

/// Accepts `YYYY/YYYY+1` only.
pub fn is_valid_school_year(value: &str) -> bool {
    let Some((start, end)) = value.trim().split_once('/') else {
        return false;
    };
    if start.len() != 4 || end.len() != 4 {
        return false;
    }
    match (start.parse::<i32>(), end.parse::<i32>()) {
        (Ok(s), Ok(e)) => e == s + 1,
        _ => false,
    }
}
