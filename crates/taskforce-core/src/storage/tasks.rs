//! Task run state and artifacts

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::database::Database;

/// Task lifecycle status
///
/// `AwaitingInput` is only ever set by the interaction broker while a request
/// is outstanding; the prior status is restored once the wait resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Planning,
    Executing,
    Reviewing,
    AwaitingInput,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Planning => "planning",
            Self::Executing => "executing",
            Self::Reviewing => "reviewing",
            Self::AwaitingInput => "awaiting_input",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "planning" => Ok(Self::Planning),
            "executing" => Ok(Self::Executing),
            "reviewing" => Ok(Self::Reviewing),
            "awaiting_input" => Ok(Self::AwaitingInput),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => anyhow::bail!("Unknown task status: {}", other),
        }
    }
}

/// Accumulated phase outputs written at successful completion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskOutputs {
    pub plan: String,
    pub execution_result: String,
    pub review_result: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: i64,
    pub objective: String,
    pub status: TaskStatus,
    pub plan: Option<String>,
    pub execution_result: Option<String>,
    pub review_result: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A deliverable file registered against a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskArtifact {
    pub filename: String,
    pub path: String,
    pub extension: String,
    pub size_bytes: u64,
}

pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Task persistence store
pub struct TaskStore<'a> {
    db: &'a Database,
}

impl<'a> TaskStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create a task in `pending` status, returning its id
    pub fn create_task(&self, objective: &str) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO tasks (objective, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![objective, TaskStatus::Pending.as_str(), now, now],
        )?;
        Ok(self.db.conn().last_insert_rowid())
    }

    pub fn get_task(&self, task_id: i64) -> Result<Option<TaskRecord>> {
        let row = self
            .db
            .conn()
            .query_row(
                "SELECT id, objective, status, plan, execution_result, review_result,
                        created_at, updated_at
                 FROM tasks WHERE id = ?1",
                [task_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, Option<String>>(4)?,
                        row.get::<_, Option<String>>(5)?,
                        row.get::<_, String>(6)?,
                        row.get::<_, String>(7)?,
                    ))
                },
            )
            .optional()?;

        row.map(
            |(id, objective, status, plan, execution_result, review_result, created, updated)| {
                Ok(TaskRecord {
                    id,
                    objective,
                    status: status.parse()?,
                    plan,
                    execution_result,
                    review_result,
                    created_at: parse_timestamp(&created),
                    updated_at: parse_timestamp(&updated),
                })
            },
        )
        .transpose()
    }

    pub fn get_status(&self, task_id: i64) -> Result<Option<TaskStatus>> {
        let status: Option<String> = self
            .db
            .conn()
            .query_row("SELECT status FROM tasks WHERE id = ?1", [task_id], |row| {
                row.get(0)
            })
            .optional()?;
        status.map(|s| s.parse()).transpose()
    }

    pub fn set_status(&self, task_id: i64, status: TaskStatus) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let affected = self.db.conn().execute(
            "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status.as_str(), now, task_id],
        )?;
        if affected == 0 {
            anyhow::bail!("Task {} not found", task_id);
        }
        Ok(())
    }

    pub fn update_outputs(&self, task_id: i64, outputs: &TaskOutputs) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "UPDATE tasks SET plan = ?1, execution_result = ?2, review_result = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                outputs.plan,
                outputs.execution_result,
                outputs.review_result,
                now,
                task_id
            ],
        )?;
        Ok(())
    }

    pub fn add_file(&self, task_id: i64, artifact: &TaskArtifact) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.db
            .conn()
            .execute(
                "INSERT INTO task_files (task_id, filename, path, extension, size_bytes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    task_id,
                    artifact.filename,
                    artifact.path,
                    artifact.extension,
                    artifact.size_bytes as i64,
                    now
                ],
            )
            .with_context(|| format!("Failed to register artifact {}", artifact.filename))?;
        Ok(())
    }

    pub fn list_files(&self, task_id: i64) -> Result<Vec<TaskArtifact>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT filename, path, extension, size_bytes FROM task_files
             WHERE task_id = ?1 ORDER BY id",
        )?;
        let files = stmt
            .query_map([task_id], |row| {
                Ok(TaskArtifact {
                    filename: row.get(0)?,
                    path: row.get(1)?,
                    extension: row.get(2)?,
                    size_bytes: row.get::<_, i64>(3)?.max(0) as u64,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(files)
    }
}
