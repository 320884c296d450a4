//! Interaction requests
//!
//! One row per human-in-the-loop suspension. Rows move from `pending` to
//! `responded` (external response) or `expired` (broker timeout) exactly once
//! and are never deleted.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::database::Database;
use super::tasks::parse_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    InputNeeded,
    Confirmation,
    Choice,
    AgentStuck,
}

impl InteractionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InputNeeded => "input_needed",
            Self::Confirmation => "confirmation",
            Self::Choice => "choice",
            Self::AgentStuck => "agent_stuck",
        }
    }
}

impl fmt::Display for InteractionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InteractionKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "input_needed" => Ok(Self::InputNeeded),
            "confirmation" => Ok(Self::Confirmation),
            "choice" => Ok(Self::Choice),
            "agent_stuck" => Ok(Self::AgentStuck),
            other => anyhow::bail!("Unknown interaction kind: {}", other),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionStatus {
    Pending,
    Responded,
    /// Closed by the broker after its wait timed out
    Expired,
}

impl InteractionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Responded => "responded",
            Self::Expired => "expired",
        }
    }
}

impl FromStr for InteractionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "responded" => Ok(Self::Responded),
            "expired" => Ok(Self::Expired),
            other => anyhow::bail!("Unknown interaction status: {}", other),
        }
    }
}

fn default_field_type() -> String {
    "text".to_string()
}

fn default_required() -> bool {
    true
}

/// Describes one value the user is asked to supply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub label: String,
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub default: Option<String>,
}

impl FieldSpec {
    pub fn new(name: &str, label: &str, field_type: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            field_type: field_type.to_string(),
            required: true,
            default: None,
        }
    }
}

/// Payload submitted by the user to resolve a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionResponse {
    #[serde(default)]
    pub confirmed: Option<bool>,
    #[serde(default)]
    pub values: Option<BTreeMap<String, Value>>,
    #[serde(default)]
    pub cancelled: bool,
}

impl InteractionResponse {
    pub fn confirm() -> Self {
        Self {
            confirmed: Some(true),
            ..Default::default()
        }
    }

    pub fn deny() -> Self {
        Self {
            confirmed: Some(false),
            ..Default::default()
        }
    }

    pub fn cancel() -> Self {
        Self {
            cancelled: true,
            ..Default::default()
        }
    }

    pub fn with_values<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self {
            values: Some(
                values
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    /// Value of `name` rendered as text; strings are taken verbatim
    pub fn value_text(&self, name: &str) -> Option<String> {
        self.values.as_ref()?.get(name).map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }
}

/// Fields for a request about to be persisted
#[derive(Debug, Clone)]
pub struct NewInteraction {
    pub task_id: i64,
    pub kind: InteractionKind,
    pub tool_name: String,
    pub prompt: String,
    pub fields: Option<Vec<FieldSpec>>,
    pub preview: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRequest {
    pub id: i64,
    pub task_id: i64,
    pub kind: InteractionKind,
    pub tool_name: String,
    pub prompt: String,
    pub fields: Option<Vec<FieldSpec>>,
    pub preview: Option<Value>,
    pub status: InteractionStatus,
    pub response: Option<InteractionResponse>,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

/// Result of writing a response onto a request row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RespondOutcome {
    Recorded,
    /// Row exists but already left `pending`; left untouched
    AlreadyResolved,
    NotFound,
}

/// Interaction request persistence store
pub struct InteractionStore<'a> {
    db: &'a Database,
}

const SELECT_COLUMNS: &str = "SELECT id, task_id, kind, tool_name, prompt, fields, preview,
        status, response, created_at, responded_at
 FROM interaction_requests";

impl<'a> InteractionStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Persist a new pending request, returning its id
    pub fn create(&self, new: &NewInteraction) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        let fields = new.fields.as_ref().map(serde_json::to_string).transpose()?;
        let preview = new.preview.as_ref().map(serde_json::to_string).transpose()?;
        self.db.conn().execute(
            "INSERT INTO interaction_requests
                (task_id, kind, tool_name, prompt, fields, preview, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new.task_id,
                new.kind.as_str(),
                new.tool_name,
                new.prompt,
                fields,
                preview,
                InteractionStatus::Pending.as_str(),
                now
            ],
        )?;
        Ok(self.db.conn().last_insert_rowid())
    }

    pub fn get(&self, request_id: i64) -> Result<Option<InteractionRequest>> {
        let sql = format!("{SELECT_COLUMNS} WHERE id = ?1");
        let row = self
            .db
            .conn()
            .query_row(&sql, [request_id], RawRow::from_row)
            .optional()?;
        row.map(RawRow::into_request).transpose()
    }

    /// The newest pending request for a task, if any
    pub fn pending_for_task(&self, task_id: i64) -> Result<Option<InteractionRequest>> {
        let sql = format!(
            "{SELECT_COLUMNS} WHERE task_id = ?1 AND status = 'pending' ORDER BY id DESC LIMIT 1"
        );
        let row = self
            .db
            .conn()
            .query_row(&sql, [task_id], RawRow::from_row)
            .optional()?;
        row.map(RawRow::into_request).transpose()
    }

    pub fn count_pending(&self, task_id: i64) -> Result<usize> {
        let count: i64 = self.db.conn().query_row(
            "SELECT COUNT(*) FROM interaction_requests WHERE task_id = ?1 AND status = 'pending'",
            [task_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Record a response; only a pending row transitions
    pub fn respond(&self, request_id: i64, response: &InteractionResponse) -> Result<RespondOutcome> {
        let now = Utc::now().to_rfc3339();
        let payload = serde_json::to_string(response)?;
        let affected = self.db.conn().execute(
            "UPDATE interaction_requests SET status = 'responded', response = ?1, responded_at = ?2
             WHERE id = ?3 AND status = 'pending'",
            params![payload, now, request_id],
        )?;
        if affected > 0 {
            return Ok(RespondOutcome::Recorded);
        }

        let exists: Option<i64> = self
            .db
            .conn()
            .query_row(
                "SELECT id FROM interaction_requests WHERE id = ?1",
                [request_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(match exists {
            Some(_) => RespondOutcome::AlreadyResolved,
            None => RespondOutcome::NotFound,
        })
    }

    /// Close a still-pending request after its wait timed out
    pub fn expire(&self, request_id: i64) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let affected = self.db.conn().execute(
            "UPDATE interaction_requests SET status = 'expired', responded_at = ?1
             WHERE id = ?2 AND status = 'pending'",
            params![now, request_id],
        )?;
        Ok(affected > 0)
    }
}

struct RawRow {
    id: i64,
    task_id: i64,
    kind: String,
    tool_name: String,
    prompt: String,
    fields: Option<String>,
    preview: Option<String>,
    status: String,
    response: Option<String>,
    created_at: String,
    responded_at: Option<String>,
}

impl RawRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            task_id: row.get(1)?,
            kind: row.get(2)?,
            tool_name: row.get(3)?,
            prompt: row.get(4)?,
            fields: row.get(5)?,
            preview: row.get(6)?,
            status: row.get(7)?,
            response: row.get(8)?,
            created_at: row.get(9)?,
            responded_at: row.get(10)?,
        })
    }

    fn into_request(self) -> Result<InteractionRequest> {
        Ok(InteractionRequest {
            id: self.id,
            task_id: self.task_id,
            kind: self.kind.parse()?,
            tool_name: self.tool_name,
            prompt: self.prompt,
            fields: self.fields.as_deref().map(serde_json::from_str).transpose()?,
            preview: self.preview.as_deref().map(serde_json::from_str).transpose()?,
            status: self.status.parse()?,
            response: self.response.as_deref().map(serde_json::from_str).transpose()?,
            created_at: parse_timestamp(&self.created_at),
            responded_at: self.responded_at.as_deref().map(parse_timestamp),
        })
    }
}
