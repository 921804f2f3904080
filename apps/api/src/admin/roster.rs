//! Students of an admin's school, with their academic records attached.

use std::collections::HashMap;

use serde::Serialize;
use uuid::Uuid;

use crate::data::{DataResult, DataService};
use crate::models::academic::AcademicRecord;
use crate::models::profile::Profile;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RosterEntry {
    pub student: Profile,
    pub records: Vec<AcademicRecord>,
}

/// Case-insensitive substring match on the trimmed admin school name.
/// An empty name matches nothing.
pub fn school_matches(admin_school: &str, student_school: &str) -> bool {
    let needle = admin_school.trim().to_lowercase();
    !needle.is_empty() && student_school.to_lowercase().contains(&needle)
}

/// Attaches records to their student, keeping the student order. Records of
/// anyone not in `students` are dropped.
pub fn join_records(students: Vec<Profile>, records: Vec<AcademicRecord>) -> Vec<RosterEntry> {
    let mut by_user: HashMap<Uuid, Vec<AcademicRecord>> = HashMap::new();
    for record in records {
        by_user.entry(record.user_id).or_default().push(record);
    }
    students
        .into_iter()
        .map(|student| {
            let records = by_user.remove(&student.id).unwrap_or_default();
            RosterEntry { student, records }
        })
        .collect()
}

fn matches_search(entry: &RosterEntry, query: &str) -> bool {
    let s = &entry.student;
    [
        Some(s.name.as_str()),
        Some(s.email.as_str()),
        s.school_name(),
    ]
    .into_iter()
    .flatten()
    .any(|field| field.to_lowercase().contains(query))
}

pub async fn load_roster(
    data: &dyn DataService,
    school_name: &str,
    search: Option<&str>,
) -> DataResult<Vec<RosterEntry>> {
    let mut students = data.list_students_by_school(school_name).await?;
    students.retain(|p| p.school_name().is_some_and(|s| school_matches(school_name, s)));
    let records = data.list_all_records().await?;

    let mut roster = join_records(students, records);
    if let Some(query) = search.map(|q| q.trim().to_lowercase()).filter(|q| !q.is_empty()) {
        roster.retain(|entry| matches_search(entry, &query));
    }
    Ok(roster)
}
