use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use ts_rs::TS;

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    sqlx::Type,
    TS,
    EnumString,
    Display,
    Default,
)]
#[ts(export)]
pub enum TaskStatus {
    #[default]
    #[sqlx(rename = "Pending")]
    Pending,
    #[serde(rename = "In-Progress")]
    #[strum(serialize = "In-Progress")]
    #[sqlx(rename = "In-Progress")]
    InProgress,
    #[sqlx(rename = "Completed")]
    Completed,
}

impl TaskStatus {
    fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::InProgress => 1,
            TaskStatus::Completed => 2,
        }
    }

    /// The lifecycle only moves forward; re-asserting the current status is
    /// a no-op, not a violation.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        next.rank() >= self.rank()
    }
}

/// Display-only state layered on top of the persisted lifecycle: a task with
/// a due date in the past that is not completed shows as overdue. Never
/// stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, TS, Display)]
#[ts(export)]
pub enum TaskDisplayStatus {
    Pending,
    #[serde(rename = "In-Progress")]
    #[strum(serialize = "In-Progress")]
    InProgress,
    Completed,
    Overdue,
}

impl TaskDisplayStatus {
    pub fn derive(status: TaskStatus, due_date: NaiveDate, today: NaiveDate) -> Self {
        if status != TaskStatus::Completed && due_date < today {
            return TaskDisplayStatus::Overdue;
        }
        match status {
            TaskStatus::Pending => TaskDisplayStatus::Pending,
            TaskStatus::InProgress => TaskDisplayStatus::InProgress,
            TaskStatus::Completed => TaskDisplayStatus::Completed,
        }
    }
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, TS, EnumString, Display,
)]
#[ts(export)]
pub enum TaskPriority {
    #[sqlx(rename = "High")]
    High,
    #[sqlx(rename = "Medium")]
    Medium,
    #[sqlx(rename = "Low")]
    Low,
}

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, TS, EnumString, Display,
)]
#[ts(export)]
pub enum TaskCategory {
    #[sqlx(rename = "HR")]
    HR,
    #[sqlx(rename = "IT")]
    IT,
    #[sqlx(rename = "Finance")]
    Finance,
    #[sqlx(rename = "Marketing")]
    Marketing,
    #[sqlx(rename = "Sales")]
    Sales,
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    sqlx::Type,
    TS,
    EnumString,
    Display,
    Default,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[sqlx(rename = "admin")]
    Admin,
    #[default]
    #[sqlx(rename = "employee")]
    Employee,
}
