//! Academic report accumulator: subject → semester → score.

use std::collections::BTreeMap;

use serde::Serialize;
use uuid::Uuid;

use crate::models::academic::{is_valid_score, NewAcademicRecord};
use crate::models::profile::ClassYear;
use crate::recommendation::features::{find_subject, SubjectGroup, CANONICAL_SUBJECTS};
use crate::wizard::steps::BiodataDetails;

/// Number of semesters a registrant reports on.
pub fn semester_count(details: &BiodataDetails) -> i32 {
    match details {
        BiodataDetails::Student(s) => match s.class_year {
            ClassYear::Ten => 1,
            ClassYear::Eleven => 3,
            ClassYear::Twelve => 5,
        },
        BiodataDetails::Alumnus(_) => 6,
    }
}

/// Subjects pre-selected on the report form.
pub fn default_subjects(details: &BiodataDetails) -> Vec<&'static str> {
    let track = match details {
        BiodataDetails::Student(s) => Some(s.track),
        BiodataDetails::Alumnus(_) => None,
    };
    CANONICAL_SUBJECTS
        .iter()
        .filter(|s| match (s.group, track) {
            (SubjectGroup::Mandatory, _) => true,
            (SubjectGroup::Elective, _) => false,
            (SubjectGroup::Science, Some(t)) | (SubjectGroup::Social, Some(t)) => s.open_to(t),
            // Alumni see both tracks.
            (SubjectGroup::Science, None) | (SubjectGroup::Social, None) => true,
        })
        .map(|s| s.label)
        .collect()
}

fn is_track_subject(name: &str) -> bool {
    find_subject(name).is_some_and(|s| matches!(s.group, SubjectGroup::Science | SubjectGroup::Social))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CellUpdate {
    Committed(f64),
    Cleared,
    /// Input was not accepted; the cell keeps its previous value.
    Rejected,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSheet {
    semesters: i32,
    subjects: BTreeMap<String, BTreeMap<i32, f64>>,
}

impl ReportSheet {
    /// Applies the semester policy and seeds default subjects. Scores already
    /// entered survive a re-visit of the biodata step; empty track subjects
    /// the new track does not offer are dropped.
    pub fn prepare(&mut self, details: &BiodataDetails) {
        self.semesters = semester_count(details);
        let defaults = default_subjects(details);
        self.subjects.retain(|name, cells| {
            !cells.is_empty() || defaults.contains(&name.as_str()) || !is_track_subject(name)
        });
        for label in defaults {
            self.subjects.entry(label.to_string()).or_default();
        }
    }

    pub fn semesters(&self) -> i32 {
        self.semesters
    }

    pub fn score(&self, subject: &str, semester: i32) -> Option<f64> {
        self.subjects.get(subject)?.get(&semester).copied()
    }

    /// Curriculum subjects not on the sheet yet.
    pub fn addable_subjects(&self) -> Vec<&'static str> {
        CANONICAL_SUBJECTS
            .iter()
            .map(|s| s.label)
            .filter(|label| !self.subjects.contains_key(*label))
            .collect()
    }

    /// Adds a curriculum or custom subject. Curriculum subjects are stored
    /// under their display label.
    pub fn add_subject(&mut self, name: &str) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        let name = find_subject(name).map(|s| s.label).unwrap_or(name);
        if self.subjects.contains_key(name) {
            return false;
        }
        self.subjects.insert(name.to_string(), BTreeMap::new());
        true
    }

    /// Removes a subject together with its scores.
    pub fn remove_subject(&mut self, name: &str) -> bool {
        self.subjects.remove(name.trim()).is_some()
    }

    /// Commits `raw` into a cell if it parses as a number in [0, 100]. An
    /// empty string clears the cell.
    pub fn set_score(&mut self, subject: &str, semester: i32, raw: &str) -> CellUpdate {
        if semester < 1 || semester > self.semesters {
            return CellUpdate::Rejected;
        }
        let Some(cells) = self.subjects.get_mut(subject) else {
            return CellUpdate::Rejected;
        };
        let raw = raw.trim();
        if raw.is_empty() {
            cells.remove(&semester);
            return CellUpdate::Cleared;
        }
        match raw.parse::<f64>() {
            Ok(score) if is_valid_score(score) => {
                cells.insert(semester, score);
                CellUpdate::Committed(score)
            }
            _ => CellUpdate::Rejected,
        }
    }

    /// Fills one semester from OCR scores keyed by canonical subject key.
    /// Returns how many cells were written.
    pub fn apply_scores(&mut self, semester: i32, scores: &BTreeMap<String, f64>) -> usize {
        if semester < 1 || semester > self.semesters {
            return 0;
        }
        let mut applied = 0;
        for (key, &score) in scores {
            let Some(subject) = find_subject(key) else {
                continue;
            };
            if !is_valid_score(score) {
                continue;
            }
            self.subjects
                .entry(subject.label.to_string())
                .or_default()
                .insert(semester, score);
            applied += 1;
        }
        applied
    }

    pub fn has_any_score(&self) -> bool {
        self.subjects.values().any(|cells| !cells.is_empty())
    }

    /// One record per (subject, semester) with a score. Subjects without any
    /// score produce nothing.
    pub fn flatten(&self, user_id: Uuid, school_year: &str) -> Vec<NewAcademicRecord> {
        let semesters = self.semesters;
        if semesters < 1 {
            return Vec::new();
        }
        self.subjects
            .iter()
            .flat_map(move |(subject, cells)| {
                cells
                    .range(1..=semesters)
                    .map(move |(semester, score)| NewAcademicRecord {
                        user_id,
                        subject: subject.clone(),
                        semester: *semester,
                        score: *score,
                        school_year: school_year.to_string(),
                    })
            })
            .collect()
    }
}
