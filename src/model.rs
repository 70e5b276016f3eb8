use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type RecordId = u64;

/// Number of decorative images an event can point at; indexes are `1..=IMAGE_COUNT`.
pub const IMAGE_COUNT: u8 = 4;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: RecordId,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Mirrors `status == Completed`; kept in sync by the store.
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: RecordId,
    pub title: String,
    pub date: DateTime<Utc>,
    pub description: Option<String>,
    /// Minutes before `date`.
    pub reminder: Option<u32>,
    pub image_index: Option<u8>,
    pub completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Caller-supplied fields for a new task; the store fills in the rest.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
pub struct NewEvent {
    pub title: String,
    pub date: DateTime<Utc>,
    pub description: Option<String>,
    pub reminder: Option<u32>,
    pub image_index: Option<u8>,
}

/// Partial update for a task. `None` leaves a field untouched; for the
/// optional fields `Some(None)` clears them.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub status: Option<TaskStatus>,
    pub due_date: Option<Option<DateTime<Utc>>>,
}

#[derive(Debug, Clone, Default)]
pub struct EventUpdate {
    pub title: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub description: Option<Option<String>>,
    pub reminder: Option<Option<u32>>,
    pub image_index: Option<Option<u8>>,
    pub completed: Option<bool>,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum RecordError {
    #[error("title must not be empty")]
    EmptyTitle,
    #[error("image index {0} is outside 1..={IMAGE_COUNT}")]
    InvalidImageIndex(u8),
}

impl NewTask {
    pub fn titled(title: impl Into<String>) -> Self {
        NewTask {
            title: title.into(),
            ..NewTask::default()
        }
    }
}

impl NewEvent {
    pub fn new(title: impl Into<String>, date: DateTime<Utc>) -> Self {
        NewEvent {
            title: title.into(),
            date,
            description: None,
            reminder: None,
            image_index: None,
        }
    }
}

impl TaskUpdate {
    pub fn status(status: TaskStatus) -> Self {
        TaskUpdate {
            status: Some(status),
            ..TaskUpdate::default()
        }
    }
}

impl EventUpdate {
    pub fn completed(completed: bool) -> Self {
        EventUpdate {
            completed: Some(completed),
            ..EventUpdate::default()
        }
    }
}

/// Trims a title and rejects it when nothing is left.
pub fn clean_title(raw: &str) -> Result<String, RecordError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RecordError::EmptyTitle);
    }
    Ok(trimmed.to_string())
}

pub fn check_image_index(index: Option<u8>) -> Result<Option<u8>, RecordError> {
    match index {
        Some(i) if !(1..=IMAGE_COUNT).contains(&i) => Err(RecordError::InvalidImageIndex(i)),
        other => Ok(other),
    }
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [
        TaskStatus::NotStarted,
        TaskStatus::InProgress,
        TaskStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::NotStarted => "not-started",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
        }
    }

    /// Next status in the not-started → in-progress → completed cycle.
    pub fn cycle(self) -> Self {
        match self {
            TaskStatus::NotStarted => TaskStatus::InProgress,
            TaskStatus::InProgress => TaskStatus::Completed,
            TaskStatus::Completed => TaskStatus::NotStarted,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TaskStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                format!("unknown status `{s}` (expected not-started, in-progress or completed)")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn status_parses_kebab_names() {
        assert_eq!("in-progress".parse::<TaskStatus>(), Ok(TaskStatus::InProgress));
        assert_eq!(" Completed ".parse::<TaskStatus>(), Ok(TaskStatus::Completed));
        assert!("done".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn titles_are_trimmed_and_must_not_be_blank() {
        assert_eq!(clean_title("  buy milk "), Ok("buy milk".to_string()));
        assert_eq!(clean_title("   "), Err(RecordError::EmptyTitle));
    }

    #[test]
    fn image_index_bounds() {
        assert_eq!(check_image_index(None), Ok(None));
        assert_eq!(check_image_index(Some(4)), Ok(Some(4)));
        assert_eq!(check_image_index(Some(0)), Err(RecordError::InvalidImageIndex(0)));
        assert_eq!(check_image_index(Some(5)), Err(RecordError::InvalidImageIndex(5)));
    }

    #[test]
    fn task_serializes_with_camel_case_fields() {
        let created = Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap();
        let task = Task {
            id: 7,
            title: "write report".into(),
            description: None,
            status: TaskStatus::InProgress,
            due_date: None,
            created_at: created,
            completed: false,
            completed_at: None,
        };
        let yaml = serde_yaml::to_string(&task).unwrap();
        assert!(yaml.contains("createdAt:"));
        assert!(yaml.contains("dueDate:"));
        assert!(yaml.contains("status: in-progress"));
    }
}
