//! In-memory stand-ins for the remote collaborators, for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::admin::editor::EditorSessions;
use crate::admin::gate::AdminGate;
use crate::data::{DataError, DataErrorKind, DataResult, DataService};
use crate::models::academic::{AcademicRecord, NewAcademicRecord};
use crate::models::portfolio::{
    Achievement, NewAchievement, NewOrganization, Organization, Recommendation,
};
use crate::models::profile::{ClassYear, Gender, Profile, ProfileKind, StudentDetails, Track};
use crate::ocr::{OcrOutcome, OcrService};
use crate::recommendation::client::{RecommendationError, Recommender};
use crate::recommendation::features::RecommendationPayload;
use crate::session::{AuthSession, Identity, IdentityError, IdentityProvider, SignUpOutcome};
use crate::state::AppState;
use crate::storage::{FileStorage, ImageUpload, StorageError};
use crate::wizard::store::WizardStore;

pub fn student_profile(id: Uuid, track: Track) -> Profile {
    Profile {
        id,
        name: "Budi Santoso".to_string(),
        email: format!("{id}@example.com"),
        gender: Some(Gender::Male),
        date_of_birth: NaiveDate::from_ymd_opt(2008, 8, 17),
        hobby: None,
        desired_major: None,
        kind: ProfileKind::Student(StudentDetails {
            school_name: "SMA Negeri 1".to_string(),
            track,
            class_year: ClassYear::Twelve,
        }),
        updated_at: None,
    }
}

pub fn admin_profile(id: Uuid, school_name: &str) -> Profile {
    Profile {
        id,
        name: "Ibu Sari".to_string(),
        email: format!("{id}@example.com"),
        gender: None,
        date_of_birth: None,
        hobby: None,
        desired_major: None,
        kind: ProfileKind::Admin {
            school_name: school_name.to_string(),
        },
        updated_at: None,
    }
}

pub fn record(user_id: Uuid, subject: &str, semester: i32, score: f64) -> AcademicRecord {
    AcademicRecord {
        id: Uuid::new_v4(),
        user_id,
        subject: subject.to_string(),
        semester,
        score,
        school_year: "2026/2027".to_string(),
        created_at: Utc::now(),
        updated_at: None,
    }
}

impl From<AcademicRecord> for NewAcademicRecord {
    fn from(r: AcademicRecord) -> Self {
        NewAcademicRecord {
            user_id: r.user_id,
            subject: r.subject,
            semester: r.semester,
            score: r.score,
            school_year: r.school_year,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailOn {
    Profile,
    Records,
    Achievements,
    Organizations,
    UpdateScore,
}

#[derive(Default)]
struct Tables {
    profiles: HashMap<Uuid, Profile>,
    records: Vec<AcademicRecord>,
    achievements: Vec<Achievement>,
    organizations: Vec<Organization>,
    recommendations: HashMap<Uuid, Recommendation>,
}

/// Behaves like the hosted tables: unique (user, subject, semester) on
/// records and all-or-nothing bulk inserts.
#[derive(Default)]
pub struct InMemoryData {
    tables: Mutex<Tables>,
    failures: Mutex<HashSet<FailOn>>,
    update_calls: AtomicUsize,
    update_gate: Mutex<Option<Arc<Notify>>>,
}

impl InMemoryData {
    pub fn fail_on(&self, op: FailOn) {
        self.failures.lock().unwrap().insert(op);
    }

    pub fn recover(&self, op: FailOn) {
        self.failures.lock().unwrap().remove(&op);
    }

    fn check(&self, op: FailOn) -> DataResult<()> {
        if self.failures.lock().unwrap().contains(&op) {
            Err(DataError::new(
                DataErrorKind::Unavailable,
                format!("injected failure on {op:?}"),
            ))
        } else {
            Ok(())
        }
    }

    pub fn profiles(&self) -> Vec<Profile> {
        self.tables.lock().unwrap().profiles.values().cloned().collect()
    }

    pub fn records(&self) -> Vec<AcademicRecord> {
        self.tables.lock().unwrap().records.clone()
    }

    pub fn achievements(&self) -> Vec<Achievement> {
        self.tables.lock().unwrap().achievements.clone()
    }

    /// Makes `update_score` wait until the returned handle is notified.
    pub fn hold_updates(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.update_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataService for InMemoryData {
    async fn get_profile(&self, user_id: Uuid) -> DataResult<Option<Profile>> {
        Ok(self.tables.lock().unwrap().profiles.get(&user_id).cloned())
    }

    async fn upsert_profile(&self, profile: &Profile) -> DataResult<()> {
        self.check(FailOn::Profile)?;
        let mut stored = profile.clone();
        stored.updated_at = Some(Utc::now());
        self.tables
            .lock()
            .unwrap()
            .profiles
            .insert(profile.id, stored);
        Ok(())
    }

    async fn list_students_by_school(&self, school: &str) -> DataResult<Vec<Profile>> {
        let needle = school.trim().to_lowercase();
        let mut students: Vec<Profile> = self
            .tables
            .lock()
            .unwrap()
            .profiles
            .values()
            .filter(|p| match &p.kind {
                ProfileKind::Student(s) => s.school_name.to_lowercase().contains(&needle),
                _ => false,
            })
            .cloned()
            .collect();
        students.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(students)
    }

    async fn list_records_for_user(&self, user_id: Uuid) -> DataResult<Vec<AcademicRecord>> {
        Ok(self
            .records()
            .into_iter()
            .filter(|r| r.user_id == user_id)
            .collect())
    }

    async fn list_all_records(&self) -> DataResult<Vec<AcademicRecord>> {
        let mut records = self.records();
        records.sort_by(|a, b| a.subject.cmp(&b.subject).then(a.semester.cmp(&b.semester)));
        Ok(records)
    }

    async fn get_record(&self, record_id: Uuid) -> DataResult<Option<AcademicRecord>> {
        Ok(self.records().into_iter().find(|r| r.id == record_id))
    }

    async fn insert_records(&self, records: &[NewAcademicRecord]) -> DataResult<usize> {
        self.check(FailOn::Records)?;
        let mut tables = self.tables.lock().unwrap();
        let mut seen: HashSet<(Uuid, String, i32)> = tables
            .records
            .iter()
            .map(|r| (r.user_id, r.subject.clone(), r.semester))
            .collect();
        for r in records {
            if !seen.insert((r.user_id, r.subject.clone(), r.semester)) {
                return Err(DataError::new(
                    DataErrorKind::Duplicate,
                    "duplicate key value violates unique constraint",
                ));
            }
        }
        let now = Utc::now();
        tables.records.extend(records.iter().map(|r| AcademicRecord {
            id: Uuid::new_v4(),
            user_id: r.user_id,
            subject: r.subject.clone(),
            semester: r.semester,
            score: r.score,
            school_year: r.school_year.clone(),
            created_at: now,
            updated_at: None,
        }));
        Ok(records.len())
    }

    async fn update_score(&self, record_id: Uuid, score: f64) -> DataResult<()> {
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.update_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.check(FailOn::UpdateScore)?;
        let mut tables = self.tables.lock().unwrap();
        let record = tables
            .records
            .iter_mut()
            .find(|r| r.id == record_id)
            .ok_or_else(|| DataError::new(DataErrorKind::NotFound, "Record not found"))?;
        record.score = score;
        record.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn insert_achievements(&self, rows: &[NewAchievement]) -> DataResult<usize> {
        self.check(FailOn::Achievements)?;
        let now = Utc::now();
        self.tables
            .lock()
            .unwrap()
            .achievements
            .extend(rows.iter().map(|r| Achievement {
                id: Uuid::new_v4(),
                user_id: r.user_id,
                title: r.title.clone(),
                image_url: r.image_url.clone(),
                created_at: now,
            }));
        Ok(rows.len())
    }

    async fn list_achievements(&self, user_id: Uuid) -> DataResult<Vec<Achievement>> {
        Ok(self
            .achievements()
            .into_iter()
            .filter(|a| a.user_id == user_id)
            .collect())
    }

    async fn insert_organizations(&self, rows: &[NewOrganization]) -> DataResult<usize> {
        self.check(FailOn::Organizations)?;
        let now = Utc::now();
        self.tables
            .lock()
            .unwrap()
            .organizations
            .extend(rows.iter().map(|r| Organization {
                id: Uuid::new_v4(),
                user_id: r.user_id,
                name: r.name.clone(),
                year: r.year.clone(),
                position: r.position.clone(),
                created_at: now,
            }));
        Ok(rows.len())
    }

    async fn list_organizations(&self, user_id: Uuid) -> DataResult<Vec<Organization>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .organizations
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn get_recommendation(&self, user_id: Uuid) -> DataResult<Option<Recommendation>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .recommendations
            .get(&user_id)
            .cloned())
    }

    async fn upsert_recommendation(
        &self,
        user_id: Uuid,
        prediction: &str,
    ) -> DataResult<Recommendation> {
        let rec = Recommendation {
            user_id,
            prediction: prediction.to_string(),
            updated_at: Utc::now(),
        };
        self.tables
            .lock()
            .unwrap()
            .recommendations
            .insert(user_id, rec.clone());
        Ok(rec)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum StorageMode {
    #[default]
    Accept,
    Fail,
    /// Every path is already taken.
    Exists,
}

#[derive(Default)]
pub struct FakeStorage {
    mode: StorageMode,
    uploads: Mutex<Vec<String>>,
}

impl FakeStorage {
    pub fn failing() -> Self {
        Self {
            mode: StorageMode::Fail,
            ..Default::default()
        }
    }

    pub fn existing() -> Self {
        Self {
            mode: StorageMode::Exists,
            ..Default::default()
        }
    }

    pub fn uploaded(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileStorage for FakeStorage {
    async fn upload(&self, path: &str, _image: &ImageUpload) -> Result<(), StorageError> {
        match self.mode {
            StorageMode::Accept => {
                self.uploads.lock().unwrap().push(path.to_string());
                Ok(())
            }
            StorageMode::Fail => Err(StorageError::Upload("bucket unavailable".to_string())),
            StorageMode::Exists => Err(StorageError::AlreadyExists(path.to_string())),
        }
    }

    fn public_url(&self, path: &str) -> String {
        format!("https://storage.test/{path}")
    }
}

pub struct FakeRecommender {
    answer: Result<String, RecommendationError>,
    last_payload: Mutex<Option<serde_json::Value>>,
    calls: AtomicUsize,
}

impl FakeRecommender {
    pub fn answering(prediction: &str) -> Self {
        Self::with(Ok(prediction.to_string()))
    }

    pub fn failing(error: RecommendationError) -> Self {
        Self::with(Err(error))
    }

    fn with(answer: Result<String, RecommendationError>) -> Self {
        Self {
            answer,
            last_payload: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    /// Wire form of the most recent payload.
    pub fn last_payload(&self) -> Option<serde_json::Value> {
        self.last_payload.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Recommender for FakeRecommender {
    async fn predict(&self, payload: &RecommendationPayload) -> Result<String, RecommendationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_payload.lock().unwrap() = serde_json::to_value(payload).ok();
        self.answer.clone()
    }
}

pub const ADMIN_SECRET: &str = "rahasia-admin";

/// Accepts the tokens it was seeded with. Sign-ups always need email
/// confirmation; password sign-in works for seeded accounts and hands out a
/// fresh token.
#[derive(Default)]
pub struct FakeIdentity {
    tokens: Mutex<HashMap<String, Identity>>,
    /// email -> (password, identity)
    accounts: Mutex<HashMap<String, (String, Identity)>>,
}

impl FakeIdentity {
    pub fn with_token(self, token: &str, id: Uuid, email: &str) -> Self {
        self.tokens.lock().unwrap().insert(
            token.to_string(),
            Identity {
                id,
                email: email.to_string(),
            },
        );
        self
    }

    pub fn with_account(self, email: &str, password: &str, id: Uuid) -> Self {
        self.accounts.lock().unwrap().insert(
            email.to_string(),
            (
                password.to_string(),
                Identity {
                    id,
                    email: email.to_string(),
                },
            ),
        );
        self
    }

    pub fn password_of(&self, email: &str) -> Option<String> {
        self.accounts
            .lock()
            .unwrap()
            .get(email)
            .map(|(password, _)| password.clone())
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn resolve(&self, access_token: &str) -> Result<Option<Identity>, IdentityError> {
        Ok(self.tokens.lock().unwrap().get(access_token).cloned())
    }

    async fn sign_up(&self, email: &str, _password: &str) -> Result<SignUpOutcome, IdentityError> {
        let exists = self
            .tokens
            .lock()
            .unwrap()
            .values()
            .any(|i| i.email == email)
            || self.accounts.lock().unwrap().contains_key(email);
        if exists {
            return Err(IdentityError::Rejected {
                status: 422,
                message: "User already registered".to_string(),
            });
        }
        Ok(SignUpOutcome::ConfirmationRequired)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, IdentityError> {
        let identity = match self.accounts.lock().unwrap().get(email) {
            Some((stored, identity)) if stored == password => identity.clone(),
            _ => {
                return Err(IdentityError::Rejected {
                    status: 400,
                    message: "Invalid login credentials".to_string(),
                })
            }
        };
        let access_token = format!("token-{}", Uuid::new_v4());
        self.tokens
            .lock()
            .unwrap()
            .insert(access_token.clone(), identity.clone());
        Ok(AuthSession {
            access_token,
            identity,
        })
    }

    async fn update_password(
        &self,
        access_token: &str,
        password: &str,
    ) -> Result<(), IdentityError> {
        let identity = self
            .tokens
            .lock()
            .unwrap()
            .get(access_token)
            .cloned()
            .ok_or_else(|| IdentityError::Rejected {
                status: 401,
                message: "Invalid token".to_string(),
            })?;
        self.accounts.lock().unwrap().insert(
            identity.email.clone(),
            (password.to_string(), identity),
        );
        Ok(())
    }
}

/// Answers every image with the same outcome.
pub struct FakeOcr(pub OcrOutcome);

#[async_trait]
impl OcrService for FakeOcr {
    async fn recognize(&self, _image: &ImageUpload) -> OcrOutcome {
        self.0.clone()
    }
}

pub fn test_state(data: Arc<InMemoryData>, identity: FakeIdentity) -> AppState {
    AppState {
        data,
        identity: Arc::new(identity),
        storage: Arc::new(FakeStorage::default()),
        ocr: Arc::new(FakeOcr(OcrOutcome::Unavailable {
            message: "OCR is not available".to_string(),
        })),
        recommender: Arc::new(FakeRecommender::answering("Saintek")),
        wizards: WizardStore::default(),
        editors: EditorSessions::default(),
        admin_gate: AdminGate::new(ADMIN_SECRET),
    }
}
