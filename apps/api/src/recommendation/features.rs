//! Feature vector for the major-recommendation model.
//!
//! Every canonical subject gets the mean of the matching academic records, or
//! `None` when nothing matches. `None` only becomes the model's `-1` marker at
//! serialization time.

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::models::academic::AcademicRecord;
use crate::models::profile::{Gender, Profile, Track};

/// Feature value sent for "not applicable / not provided".
pub const ABSENT: i64 = -1;
const NO_HOBBY: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubjectGroup {
    /// Shown to every student by default.
    Mandatory,
    /// Available to every student on request.
    Elective,
    Science,
    Social,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CanonicalSubject {
    /// Key used by the OCR and recommendation services.
    pub key: &'static str,
    /// Name shown in the report form and stored on academic records.
    pub label: &'static str,
    pub group: SubjectGroup,
}

const fn subject(key: &'static str, label: &'static str, group: SubjectGroup) -> CanonicalSubject {
    CanonicalSubject { key, label, group }
}

pub const CANONICAL_SUBJECTS: [CanonicalSubject; 19] = [
    subject("Pendidikan_Agama", "Pendidikan Agama dan Budi Pekerti", SubjectGroup::Mandatory),
    subject("PPKn", "PPKn (Pendidikan Pancasila dan Kewarganegaraan)", SubjectGroup::Mandatory),
    subject("Bahasa_Indonesia", "Bahasa Indonesia", SubjectGroup::Mandatory),
    subject("Matematika_Wajib", "Matematika Wajib", SubjectGroup::Mandatory),
    subject("Sejarah_Indonesia", "Sejarah Indonesia", SubjectGroup::Mandatory),
    subject("Bahasa_Inggris", "Bahasa Inggris", SubjectGroup::Mandatory),
    subject("Seni_Budaya", "Seni Budaya", SubjectGroup::Mandatory),
    subject("PJOK", "PJOK (Pendidikan Jasmani, Olahraga, dan Kesehatan)", SubjectGroup::Mandatory),
    subject("Prakarya", "Prakarya dan Kewirausahaan", SubjectGroup::Elective),
    subject("Informatika", "Informatika", SubjectGroup::Elective),
    subject("Muatan_Lokal", "Muatan Lokal", SubjectGroup::Elective),
    subject("Matematika_Peminatan", "Matematika Peminatan", SubjectGroup::Science),
    subject("Fisika", "Fisika", SubjectGroup::Science),
    subject("Kimia", "Kimia", SubjectGroup::Science),
    subject("Biologi", "Biologi", SubjectGroup::Science),
    subject("Geografi", "Geografi", SubjectGroup::Social),
    subject("Sejarah", "Sejarah", SubjectGroup::Social),
    subject("Sosiologi", "Sosiologi", SubjectGroup::Social),
    subject("Ekonomi", "Ekonomi", SubjectGroup::Social),
];

/// Lowercases, treats `_` as a space and collapses runs of whitespace.
pub fn normalize_subject(name: &str) -> String {
    name.replace('_', " ")
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

impl CanonicalSubject {
    pub fn matches(&self, subject_name: &str) -> bool {
        let n = normalize_subject(subject_name);
        n == normalize_subject(self.key) || n == normalize_subject(self.label)
    }

    /// Whether a student on `track` can take this subject at all.
    pub fn open_to(&self, track: Track) -> bool {
        match (self.group, track) {
            (SubjectGroup::Science, Track::Social) | (SubjectGroup::Social, Track::Science) => {
                false
            }
            _ => true,
        }
    }
}

/// Looks up a canonical subject by key or label.
pub fn find_subject(name: &str) -> Option<&'static CanonicalSubject> {
    CANONICAL_SUBJECTS.iter().find(|s| s.matches(name))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feature {
    pub key: &'static str,
    pub value: Option<f64>,
}

/// Mean score per canonical subject, in canonical order.
pub fn subject_averages(records: &[AcademicRecord]) -> Vec<Feature> {
    CANONICAL_SUBJECTS
        .iter()
        .map(|subject| {
            let scores: Vec<f64> = records
                .iter()
                .filter(|r| subject.matches(&r.subject))
                .map(|r| r.score)
                .collect();
            let value = if scores.is_empty() {
                None
            } else {
                Some(scores.iter().sum::<f64>() / scores.len() as f64)
            };
            Feature {
                key: subject.key,
                value,
            }
        })
        .collect()
}

/// Clears the subjects closed to `track`, whatever records exist for them.
pub fn apply_track_exclusion(track: Track, features: &mut [Feature]) {
    for feature in features.iter_mut() {
        let closed = CANONICAL_SUBJECTS
            .iter()
            .any(|s| s.key == feature.key && !s.open_to(track));
        if closed {
            feature.value = None;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationPayload {
    pub gender: Gender,
    pub track: Track,
    pub features: Vec<Feature>,
    pub hobby: Option<String>,
}

impl RecommendationPayload {
    pub fn feature(&self, key: &str) -> Option<f64> {
        self.features
            .iter()
            .find(|f| f.key == key)
            .and_then(|f| f.value)
    }
}

/// Wire shape: `{ JK, Jurusan_SMA, <19 subject keys>, Hobi }`.
impl Serialize for RecommendationPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.features.len() + 3))?;
        map.serialize_entry("JK", self.gender.code())?;
        map.serialize_entry("Jurusan_SMA", self.track.code())?;
        for feature in &self.features {
            match feature.value {
                Some(v) => map.serialize_entry(feature.key, &v)?,
                None => map.serialize_entry(feature.key, &ABSENT)?,
            }
        }
        let hobby = self
            .hobby
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .unwrap_or(NO_HOBBY);
        map.serialize_entry("Hobi", hobby)?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadError {
    /// Only students carry a high-school track.
    NotAStudent,
    MissingGender,
}

pub fn build_payload(
    profile: &Profile,
    records: &[AcademicRecord],
) -> Result<RecommendationPayload, PayloadError> {
    let track = profile.track().ok_or(PayloadError::NotAStudent)?;
    let gender = profile.gender.ok_or(PayloadError::MissingGender)?;

    let mut features = subject_averages(records);
    apply_track_exclusion(track, &mut features);

    Ok(RecommendationPayload {
        gender,
        track,
        features,
        hobby: profile.hobby.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{record, student_profile};
    use uuid::Uuid;

    #[test]
    fn test_canonical_table_shape() {
        assert_eq!(CANONICAL_SUBJECTS.len(), 19);
        let count = |g| CANONICAL_SUBJECTS.iter().filter(|s| s.group == g).count();
        assert_eq!(count(SubjectGroup::Science), 4);
        assert_eq!(count(SubjectGroup::Social), 4);
    }

    #[test]
    fn test_normalize_subject() {
        assert_eq!(normalize_subject("Matematika_Wajib"), "matematika wajib");
        assert_eq!(normalize_subject("  MATEMATIKA   wajib "), "matematika wajib");
    }

    #[test]
    fn test_find_subject_by_label_or_key() {
        assert_eq!(find_subject("Bahasa Inggris").unwrap().key, "Bahasa_Inggris");
        assert_eq!(find_subject("bahasa_inggris").unwrap().key, "Bahasa_Inggris");
        assert!(find_subject("Astronomi").is_none());
    }

    #[test]
    fn test_missing_subject_is_none_not_zero() {
        let user = Uuid::new_v4();
        let records = vec![record(user, "Fisika", 1, 0.0)];
        let features = subject_averages(&records);
        let fisika = features.iter().find(|f| f.key == "Fisika").unwrap();
        assert_eq!(fisika.value, Some(0.0));
        let kimia = features.iter().find(|f| f.key == "Kimia").unwrap();
        assert_eq!(kimia.value, None);
    }

    #[test]
    fn test_average_over_semesters() {
        let user = Uuid::new_v4();
        let records = vec![
            record(user, "Fisika", 1, 80.0),
            record(user, "fisika ", 2, 90.0),
            record(user, "Kimia", 1, 70.0),
        ];
        let features = subject_averages(&records);
        assert_eq!(features.iter().find(|f| f.key == "Fisika").unwrap().value, Some(85.0));
    }

    #[test]
    fn test_science_track_forces_social_subjects_absent() {
        let user = Uuid::new_v4();
        let profile = student_profile(user, Track::Science);
        let records = vec![
            record(user, "Geografi", 1, 88.0),
            record(user, "Ekonomi", 2, 75.0),
            record(user, "Fisika", 1, 90.0),
        ];
        let payload = build_payload(&profile, &records).unwrap();
        for key in ["Geografi", "Sejarah", "Sosiologi", "Ekonomi"] {
            assert_eq!(payload.feature(key), None, "{key} should be absent");
        }
        assert_eq!(payload.feature("Fisika"), Some(90.0));
    }

    #[test]
    fn test_social_track_forces_science_subjects_absent() {
        let user = Uuid::new_v4();
        let profile = student_profile(user, Track::Social);
        let records = vec![record(user, "Biologi", 1, 95.0), record(user, "Sosiologi", 1, 80.0)];
        let payload = build_payload(&profile, &records).unwrap();
        for key in ["Matematika_Peminatan", "Fisika", "Kimia", "Biologi"] {
            assert_eq!(payload.feature(key), None);
        }
        assert_eq!(payload.feature("Sosiologi"), Some(80.0));
    }

    #[test]
    fn test_science_male_payload_wire_shape() {
        let user = Uuid::new_v4();
        let profile = student_profile(user, Track::Science);
        let records = vec![
            record(user, "Matematika Wajib", 1, 90.0),
            record(user, "Fisika", 1, 80.0),
            record(user, "Fisika", 2, 86.0),
        ];
        let payload = build_payload(&profile, &records).unwrap();
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["JK"], "L");
        assert_eq!(json["Jurusan_SMA"], "IPA");
        assert_eq!(json["Fisika"], 83.0);
        assert_eq!(json["Matematika_Wajib"], 90.0);
        assert_eq!(json["Geografi"], -1);
        assert_eq!(json["Kimia"], -1);
        assert_eq!(json["Biologi"], -1);
        assert_eq!(json["Hobi"], "-");
        assert_eq!(json.as_object().unwrap().len(), 22);
    }

    #[test]
    fn test_hobby_passed_through() {
        let user = Uuid::new_v4();
        let mut profile = student_profile(user, Track::Social);
        profile.hobby = Some("Musik".to_string());
        let json = serde_json::to_value(build_payload(&profile, &[]).unwrap()).unwrap();
        assert_eq!(json["Hobi"], "Musik");
        assert_eq!(json["JK"], "L");
    }

    #[test]
    fn test_non_student_rejected() {
        let mut profile = student_profile(Uuid::new_v4(), Track::Science);
        profile.kind = crate::models::profile::ProfileKind::Admin {
            school_name: "SMA 1".into(),
        };
        assert_eq!(build_payload(&profile, &[]), Err(PayloadError::NotAStudent));
    }
}
