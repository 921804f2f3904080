//! Step inputs and their local validation. Nothing here touches the network.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::profile::{
    AlumnusDetails, ClassYear, Gender, ProfileKind, StudentDetails, Track, UserType,
};
use crate::storage::ImageUpload;

pub type FieldErrors = BTreeMap<String, String>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccountInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BiodataInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub date_of_birth: String,
    pub gender: Option<Gender>,
    // Student
    pub school_name: Option<String>,
    pub track: Option<Track>,
    pub class_year: Option<String>,
    // Alumnus
    pub institution: Option<String>,
    pub high_school_graduation_year: Option<String>,
    pub enrollment_year: Option<String>,
    pub field_of_study: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BiodataDetails {
    Student(StudentDetails),
    Alumnus(AlumnusDetails),
}

impl BiodataDetails {
    pub fn into_profile_kind(self) -> ProfileKind {
        match self {
            BiodataDetails::Student(s) => ProfileKind::Student(s),
            BiodataDetails::Alumnus(a) => ProfileKind::Alumnus(a),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Biodata {
    pub name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Gender,
    pub details: BiodataDetails,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AchievementDraft {
    pub title: String,
    pub image: Option<ImageUpload>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrganizationDraft {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub year: String,
    #[serde(default)]
    pub position: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrganizationsInput {
    #[serde(default)]
    pub organizations: Vec<OrganizationDraft>,
    #[serde(default)]
    pub hobby: String,
    #[serde(default)]
    pub desired_major: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Interests {
    pub hobby: Option<String>,
    pub desired_major: Option<String>,
}

/// Payload of a "continue" action, tagged with the step it belongs to.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum StepInput {
    Account(AccountInput),
    UserType { user_type: UserType },
    Biodata(BiodataInput),
    Report,
    Achievements,
    Organizations(OrganizationsInput),
}

fn required(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
}

pub fn validate_account(input: &AccountInput) -> Result<(), FieldErrors> {
    let mut errors = FieldErrors::new();
    if input.email.trim().is_empty() || input.password.is_empty() {
        errors.insert(
            "account".to_string(),
            "Email and password are required".to_string(),
        );
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Only students and alumni register through the wizard.
pub fn validate_user_type(user_type: UserType) -> Result<UserType, FieldErrors> {
    match user_type {
        UserType::Student | UserType::Alumnus => Ok(user_type),
        UserType::Admin => Err(FieldErrors::from([(
            "user_type".to_string(),
            "Admins register through the admin registration page".to_string(),
        )])),
    }
}

pub fn validate_biodata(user_type: UserType, input: &BiodataInput) -> Result<Biodata, FieldErrors> {
    let mut errors = FieldErrors::new();
    let mut err = |field: &str, msg: &str| {
        errors.insert(field.to_string(), msg.to_string());
    };

    let name = input.name.trim().to_string();
    if name.is_empty() {
        err("name", "Name is required");
    }

    let date_of_birth = if input.date_of_birth.trim().is_empty() {
        err("date_of_birth", "Date of birth is required");
        None
    } else {
        let parsed = NaiveDate::parse_from_str(input.date_of_birth.trim(), "%Y-%m-%d").ok();
        if parsed.is_none() {
            err("date_of_birth", "Date of birth must be a valid date (YYYY-MM-DD)");
        }
        parsed
    };

    let details = match user_type {
        UserType::Student => {
            let school_name = required(&input.school_name);
            if school_name.is_none() {
                err("school_name", "School name is required");
            }
            if input.track.is_none() {
                err("track", "Track is required");
            }
            let class_year = match required(&input.class_year) {
                None => {
                    err("class_year", "Class is required");
                    None
                }
                Some(c) => {
                    let parsed = ClassYear::parse(&c);
                    if parsed.is_none() {
                        err("class_year", "Class must be 10, 11 or 12");
                    }
                    parsed
                }
            };
            match (school_name, input.track, class_year) {
                (Some(school_name), Some(track), Some(class_year)) => {
                    Some(BiodataDetails::Student(StudentDetails {
                        school_name,
                        track,
                        class_year,
                    }))
                }
                _ => None,
            }
        }
        UserType::Alumnus => {
            let fields = [
                ("institution", &input.institution, "Institution is required"),
                (
                    "high_school_graduation_year",
                    &input.high_school_graduation_year,
                    "High-school graduation year is required",
                ),
                ("enrollment_year", &input.enrollment_year, "Enrollment year is required"),
                ("field_of_study", &input.field_of_study, "Field of study is required"),
            ];
            let values: Vec<Option<String>> = fields
                .iter()
                .map(|(field, value, msg)| {
                    let v = required(value);
                    if v.is_none() {
                        err(field, msg);
                    }
                    v
                })
                .collect();
            match values.as_slice() {
                [Some(institution), Some(grad), Some(enrolled), Some(field)] => {
                    Some(BiodataDetails::Alumnus(AlumnusDetails {
                        institution: institution.clone(),
                        high_school_graduation_year: grad.clone(),
                        enrollment_year: enrolled.clone(),
                        field_of_study: field.clone(),
                    }))
                }
                _ => None,
            }
        }
        UserType::Admin => {
            err("user_type", "Admins have no biodata");
            None
        }
    };

    match (errors.is_empty(), date_of_birth, details) {
        (true, Some(date_of_birth), Some(details)) => Ok(Biodata {
            name,
            date_of_birth,
            gender: input.gender.unwrap_or(Gender::Male),
            details,
        }),
        _ => Err(errors),
    }
}

/// Items with an image need a title. On success returns the list without
/// items that have neither.
pub fn validate_achievements(
    drafts: &[AchievementDraft],
) -> Result<Vec<AchievementDraft>, FieldErrors> {
    let errors: FieldErrors = drafts
        .iter()
        .enumerate()
        .filter(|(_, d)| d.image.is_some() && d.title.trim().is_empty())
        .map(|(i, _)| {
            (
                format!("achievements[{i}].title"),
                "A title is required for an uploaded certificate".to_string(),
            )
        })
        .collect();
    if !errors.is_empty() {
        return Err(errors);
    }
    Ok(drafts
        .iter()
        .filter(|d| !d.title.trim().is_empty() || d.image.is_some())
        .cloned()
        .collect())
}

/// Drops organizations with a blank name and normalizes the interests.
pub fn clean_organizations(input: OrganizationsInput) -> (Vec<OrganizationDraft>, Interests) {
    let organizations = input
        .organizations
        .into_iter()
        .filter(|o| !o.name.trim().is_empty())
        .map(|o| OrganizationDraft {
            name: o.name.trim().to_string(),
            year: o.year.trim().to_string(),
            position: o.position.trim().to_string(),
        })
        .collect();
    let non_blank = |s: String| {
        let s = s.trim().to_string();
        (!s.is_empty()).then_some(s)
    };
    (
        organizations,
        Interests {
            hobby: non_blank(input.hobby),
            desired_major: non_blank(input.desired_major),
        },
    )
}
