use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use crate::data::{DataError, DataErrorKind, DataResult, DataService};
use crate::models::academic::{AcademicRecord, NewAcademicRecord};
use crate::models::portfolio::{
    Achievement, NewAchievement, NewOrganization, Organization, Recommendation,
};
use crate::models::profile::{
    AlumnusDetails, ClassYear, Gender, Profile, ProfileKind, StudentDetails, Track, UserType,
};

const PROFILE_COLUMNS: &str = "id, name, email, user_type, gender, date_of_birth, hobby, \
     desired_major, school_name, track, class_year, institution, high_school_graduation_year, \
     enrollment_year, field_of_study, updated_at";

/// [`DataService`] backed by the hosted Postgres database.
#[derive(Clone)]
pub struct PgDataService {
    pool: PgPool,
}

impl PgDataService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Maps a raw driver error onto the domain error kinds.
pub(crate) fn classify(err: sqlx::Error) -> DataError {
    let kind = match &err {
        sqlx::Error::RowNotFound => DataErrorKind::NotFound,
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some("23505") => DataErrorKind::Duplicate,
            Some("42501") => DataErrorKind::PermissionDenied,
            _ => DataErrorKind::Other,
        },
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            DataErrorKind::Unavailable
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => DataErrorKind::Invalid,
        _ => DataErrorKind::Other,
    };
    DataError::new(kind, err.to_string())
}

/// Escapes LIKE metacharacters so a school name matches literally.
pub(crate) fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// `%<school>%` pattern used with `ILIKE ... ESCAPE '\'`.
pub(crate) fn school_pattern(school: &str) -> String {
    format!("%{}%", escape_like(school.trim()))
}

/// Wide storage shape of the `profiles` table.
#[derive(Debug, FromRow)]
struct ProfileRow {
    id: Uuid,
    name: Option<String>,
    email: Option<String>,
    user_type: Option<String>,
    gender: Option<String>,
    date_of_birth: Option<NaiveDate>,
    hobby: Option<String>,
    desired_major: Option<String>,
    school_name: Option<String>,
    track: Option<String>,
    class_year: Option<String>,
    institution: Option<String>,
    high_school_graduation_year: Option<String>,
    enrollment_year: Option<String>,
    field_of_study: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

fn missing(id: Uuid, column: &str) -> DataError {
    DataError::new(
        DataErrorKind::Invalid,
        format!("profile {id} has no {column} for its user type"),
    )
}

impl TryFrom<ProfileRow> for Profile {
    type Error = DataError;

    fn try_from(row: ProfileRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let user_type = row
            .user_type
            .as_deref()
            .and_then(UserType::parse)
            .ok_or_else(|| missing(id, "user_type"))?;

        let kind = match user_type {
            UserType::Student => ProfileKind::Student(StudentDetails {
                school_name: row.school_name.ok_or_else(|| missing(id, "school_name"))?,
                track: row
                    .track
                    .as_deref()
                    .and_then(Track::parse)
                    .ok_or_else(|| missing(id, "track"))?,
                class_year: row
                    .class_year
                    .as_deref()
                    .and_then(ClassYear::parse)
                    .ok_or_else(|| missing(id, "class_year"))?,
            }),
            UserType::Alumnus => ProfileKind::Alumnus(AlumnusDetails {
                institution: row.institution.ok_or_else(|| missing(id, "institution"))?,
                high_school_graduation_year: row
                    .high_school_graduation_year
                    .ok_or_else(|| missing(id, "high_school_graduation_year"))?,
                enrollment_year: row
                    .enrollment_year
                    .ok_or_else(|| missing(id, "enrollment_year"))?,
                field_of_study: row
                    .field_of_study
                    .ok_or_else(|| missing(id, "field_of_study"))?,
            }),
            UserType::Admin => ProfileKind::Admin {
                school_name: row.school_name.unwrap_or_default(),
            },
        };

        Ok(Profile {
            id,
            name: row.name.unwrap_or_default(),
            email: row.email.unwrap_or_default(),
            gender: row.gender.as_deref().and_then(Gender::parse),
            date_of_birth: row.date_of_birth,
            hobby: row.hobby,
            desired_major: row.desired_major,
            kind,
            updated_at: row.updated_at,
        })
    }
}

fn rows_to_profiles(rows: Vec<ProfileRow>) -> DataResult<Vec<Profile>> {
    rows.into_iter().map(Profile::try_from).collect()
}

#[async_trait]
impl DataService for PgDataService {
    async fn get_profile(&self, user_id: Uuid) -> DataResult<Option<Profile>> {
        let row: Option<ProfileRow> =
            sqlx::query_as(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE id = $1"))
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(classify)?;
        row.map(Profile::try_from).transpose()
    }

    async fn upsert_profile(&self, profile: &Profile) -> DataResult<()> {
        let (school_name, track, class_year) = match &profile.kind {
            ProfileKind::Student(s) => (
                Some(s.school_name.as_str()),
                Some(s.track.code()),
                Some(s.class_year.as_str()),
            ),
            ProfileKind::Admin { school_name } => (Some(school_name.as_str()), None, None),
            ProfileKind::Alumnus(_) => (None, None, None),
        };
        let alumnus = match &profile.kind {
            ProfileKind::Alumnus(a) => Some(a),
            _ => None,
        };

        sqlx::query(
            r#"
            INSERT INTO profiles
                (id, name, email, user_type, gender, date_of_birth, hobby, desired_major,
                 school_name, track, class_year, institution, high_school_graduation_year,
                 enrollment_year, field_of_study, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, now())
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                email = EXCLUDED.email,
                user_type = EXCLUDED.user_type,
                gender = EXCLUDED.gender,
                date_of_birth = EXCLUDED.date_of_birth,
                hobby = EXCLUDED.hobby,
                desired_major = EXCLUDED.desired_major,
                school_name = EXCLUDED.school_name,
                track = EXCLUDED.track,
                class_year = EXCLUDED.class_year,
                institution = EXCLUDED.institution,
                high_school_graduation_year = EXCLUDED.high_school_graduation_year,
                enrollment_year = EXCLUDED.enrollment_year,
                field_of_study = EXCLUDED.field_of_study,
                updated_at = now()
            "#,
        )
        .bind(profile.id)
        .bind(&profile.name)
        .bind(&profile.email)
        .bind(profile.user_type().as_str())
        .bind(profile.gender.map(|g| g.as_str()))
        .bind(profile.date_of_birth)
        .bind(profile.hobby.as_deref())
        .bind(profile.desired_major.as_deref())
        .bind(school_name)
        .bind(track)
        .bind(class_year)
        .bind(alumnus.map(|a| a.institution.as_str()))
        .bind(alumnus.map(|a| a.high_school_graduation_year.as_str()))
        .bind(alumnus.map(|a| a.enrollment_year.as_str()))
        .bind(alumnus.map(|a| a.field_of_study.as_str()))
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        debug!("Upserted profile {}", profile.id);
        Ok(())
    }

    async fn list_students_by_school(&self, school: &str) -> DataResult<Vec<Profile>> {
        let rows: Vec<ProfileRow> = sqlx::query_as(&format!(
            r#"
            SELECT {PROFILE_COLUMNS} FROM profiles
            WHERE user_type = 'siswa' AND school_name ILIKE $1 ESCAPE '\'
            ORDER BY name
            "#
        ))
        .bind(school_pattern(school))
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        rows_to_profiles(rows)
    }

    async fn list_records_for_user(&self, user_id: Uuid) -> DataResult<Vec<AcademicRecord>> {
        sqlx::query_as::<_, AcademicRecord>(
            "SELECT * FROM academic_records WHERE user_id = $1 ORDER BY subject, semester",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }

    async fn list_all_records(&self) -> DataResult<Vec<AcademicRecord>> {
        sqlx::query_as::<_, AcademicRecord>(
            "SELECT * FROM academic_records ORDER BY subject, semester",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }

    async fn get_record(&self, record_id: Uuid) -> DataResult<Option<AcademicRecord>> {
        sqlx::query_as::<_, AcademicRecord>("SELECT * FROM academic_records WHERE id = $1")
            .bind(record_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)
    }

    async fn insert_records(&self, records: &[NewAcademicRecord]) -> DataResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
            "INSERT INTO academic_records (user_id, subject, semester, score, school_year) ",
        );
        qb.push_values(records, |mut b, r| {
            b.push_bind(r.user_id)
                .push_bind(&r.subject)
                .push_bind(r.semester)
                .push_bind(r.score)
                .push_bind(&r.school_year);
        });
        let result = qb.build().execute(&self.pool).await.map_err(classify)?;
        Ok(result.rows_affected() as usize)
    }

    async fn update_score(&self, record_id: Uuid, score: f64) -> DataResult<()> {
        let result = sqlx::query(
            "UPDATE academic_records SET score = $1, updated_at = now() WHERE id = $2",
        )
        .bind(score)
        .bind(record_id)
        .execute(&self.pool)
        .await
        .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(DataError::new(
                DataErrorKind::NotFound,
                format!("academic record {record_id} not found"),
            ));
        }
        Ok(())
    }

    async fn insert_achievements(&self, rows: &[NewAchievement]) -> DataResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO achievements (user_id, title, image_url) ");
        qb.push_values(rows, |mut b, r| {
            b.push_bind(r.user_id)
                .push_bind(&r.title)
                .push_bind(r.image_url.as_deref());
        });
        let result = qb.build().execute(&self.pool).await.map_err(classify)?;
        Ok(result.rows_affected() as usize)
    }

    async fn list_achievements(&self, user_id: Uuid) -> DataResult<Vec<Achievement>> {
        sqlx::query_as::<_, Achievement>(
            "SELECT * FROM achievements WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }

    async fn insert_organizations(&self, rows: &[NewOrganization]) -> DataResult<usize> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new("INSERT INTO organizations (user_id, name, year, position) ");
        qb.push_values(rows, |mut b, r| {
            b.push_bind(r.user_id)
                .push_bind(&r.name)
                .push_bind(&r.year)
                .push_bind(&r.position);
        });
        let result = qb.build().execute(&self.pool).await.map_err(classify)?;
        Ok(result.rows_affected() as usize)
    }

    async fn list_organizations(&self, user_id: Uuid) -> DataResult<Vec<Organization>> {
        sqlx::query_as::<_, Organization>(
            "SELECT * FROM organizations WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(classify)
    }

    async fn get_recommendation(&self, user_id: Uuid) -> DataResult<Option<Recommendation>> {
        sqlx::query_as::<_, Recommendation>(
            "SELECT user_id, prediction, updated_at FROM recommendations WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)
    }

    async fn upsert_recommendation(
        &self,
        user_id: Uuid,
        prediction: &str,
    ) -> DataResult<Recommendation> {
        sqlx::query_as::<_, Recommendation>(
            r#"
            INSERT INTO recommendations (user_id, prediction, updated_at)
            VALUES ($1, $2, now())
            ON CONFLICT (user_id) DO UPDATE SET
                prediction = EXCLUDED.prediction,
                updated_at = EXCLUDED.updated_at
            RETURNING user_id, prediction, updated_at
            "#,
        )
        .bind(user_id)
        .bind(prediction)
        .fetch_one(&self.pool)
        .await
        .map_err(classify)
    }
}
