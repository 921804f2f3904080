use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Account role. Wire values follow the stored `user_type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserType {
    #[serde(rename = "siswa")]
    Student,
    #[serde(rename = "alumni")]
    Alumnus,
    #[serde(rename = "admin")]
    Admin,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Student => "siswa",
            UserType::Alumnus => "alumni",
            UserType::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "siswa" => Some(UserType::Student),
            "alumni" => Some(UserType::Alumnus),
            "admin" => Some(UserType::Admin),
            _ => None,
        }
    }
}

/// High-school track. Determines which elective subjects a student can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Track {
    #[serde(rename = "IPA")]
    Science,
    #[serde(rename = "IPS")]
    Social,
}

impl Track {
    pub fn code(&self) -> &'static str {
        match self {
            Track::Science => "IPA",
            Track::Social => "IPS",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "IPA" => Some(Track::Science),
            "IPS" => Some(Track::Social),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
        }
    }

    /// Single-letter code expected by the recommendation service.
    pub fn code(&self) -> &'static str {
        match self {
            Gender::Male => "L",
            Gender::Female => "P",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClassYear {
    #[serde(rename = "10")]
    Ten,
    #[serde(rename = "11")]
    Eleven,
    #[serde(rename = "12")]
    Twelve,
}

impl ClassYear {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassYear::Ten => "10",
            ClassYear::Eleven => "11",
            ClassYear::Twelve => "12",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "10" => Some(ClassYear::Ten),
            "11" => Some(ClassYear::Eleven),
            "12" => Some(ClassYear::Twelve),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentDetails {
    pub school_name: String,
    pub track: Track,
    pub class_year: ClassYear,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlumnusDetails {
    pub institution: String,
    pub high_school_graduation_year: String,
    pub enrollment_year: String,
    pub field_of_study: String,
}

/// Role-specific part of a profile. Exactly one variant exists per profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "user_type")]
pub enum ProfileKind {
    #[serde(rename = "siswa")]
    Student(StudentDetails),
    #[serde(rename = "alumni")]
    Alumnus(AlumnusDetails),
    #[serde(rename = "admin")]
    Admin { school_name: String },
}

impl ProfileKind {
    pub fn user_type(&self) -> UserType {
        match self {
            ProfileKind::Student(_) => UserType::Student,
            ProfileKind::Alumnus(_) => UserType::Alumnus,
            ProfileKind::Admin { .. } => UserType::Admin,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub gender: Option<Gender>,
    pub date_of_birth: Option<NaiveDate>,
    pub hobby: Option<String>,
    pub desired_major: Option<String>,
    #[serde(flatten)]
    pub kind: ProfileKind,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Profile {
    pub fn user_type(&self) -> UserType {
        self.kind.user_type()
    }

    pub fn is_admin(&self) -> bool {
        matches!(self.kind, ProfileKind::Admin { .. })
    }

    /// School the profile is attached to (students and admins only).
    pub fn school_name(&self) -> Option<&str> {
        match &self.kind {
            ProfileKind::Student(s) => Some(s.school_name.as_str()),
            ProfileKind::Admin { school_name } => Some(school_name.as_str()),
            ProfileKind::Alumnus(_) => None,
        }
    }

    pub fn track(&self) -> Option<Track> {
        match &self.kind {
            ProfileKind::Student(s) => Some(s.track),
            _ => None,
        }
    }

    /// A profile counts as complete once it carries a display name.
    pub fn is_complete(&self) -> bool {
        !self.name.trim().is_empty()
    }
}
