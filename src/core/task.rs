use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Server-assigned task identifier. The backend may use uuid or bigint
/// primary keys; either is kept as its textual form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for TaskId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match serde_json::Value::deserialize(deserializer)? {
            serde_json::Value::String(s) => Ok(Self(s)),
            serde_json::Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "expected string or number task id, got {}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub const ALL: [TaskStatus; 3] = [Self::Todo, Self::InProgress, Self::Done];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Todo => "todo",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }

    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(Self::Todo),
            "in_progress" => Some(Self::InProgress),
            "done" => Some(Self::Done),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Localized label for status badges.
    pub fn label(&self) -> String {
        match self {
            Self::Todo => crate::fl!("status-todo"),
            Self::InProgress => crate::fl!("status-in-progress"),
            Self::Done => crate::fl!("status-done"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Calendar day the task is bucketed under (UTC, matching the backend's timestamps).
    pub fn created_on(&self) -> NaiveDate {
        self.created_at.date_naive()
    }

    pub fn notes_str(&self) -> &str {
        self.notes.as_deref().unwrap_or("")
    }

    /// Case-insensitive substring match against title and notes.
    /// `needle` must already be lowercased.
    pub fn matches(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(needle)
            || self
                .notes
                .as_ref()
                .is_some_and(|n| n.to_lowercase().contains(needle))
    }

    /// Merge the set fields of `patch` into this record.
    pub fn apply(&mut self, patch: &TaskPatch) {
        if let Some(ref title) = patch.title {
            self.title = title.clone();
        }
        if let Some(ref notes) = patch.notes {
            self.notes = notes.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
    }
}

/// Fields submitted when creating a task. The owner and initial status are
/// filled in by the store.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewTask {
    pub user_id: String,
    pub title: String,
    pub notes: Option<String>,
    pub status: TaskStatus,
}

/// A field-level change. Unset fields are neither sent nor merged.
/// `notes: Some(None)` clears the notes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}

impl TaskPatch {
    pub fn status(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn text(title: impl Into<String>, notes: Option<String>) -> Self {
        Self {
            title: Some(title.into()),
            notes: Some(notes),
            status: None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.notes.is_none() && self.status.is_none()
    }
}

/// Blank notes are stored as absent.
pub fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes.filter(|n| !n.trim().is_empty())
}

pub fn title_is_valid(title: &str) -> bool {
    !title.trim().is_empty()
}
