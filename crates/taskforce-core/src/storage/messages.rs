//! Agent conversation log
//!
//! Append-only: every agent turn plus synthetic `User` guidance and `System`
//! termination messages.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;
use serde::{Deserialize, Serialize};

use super::database::Database;
use super::tasks::parse_timestamp;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: i64,
    pub task_id: i64,
    pub agent_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// Message persistence store
pub struct MessageStore<'a> {
    db: &'a Database,
}

impl<'a> MessageStore<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    pub fn save_message(&self, task_id: i64, agent_name: &str, content: &str) -> Result<i64> {
        let now = Utc::now().to_rfc3339();
        self.db.conn().execute(
            "INSERT INTO agent_messages (task_id, agent_name, content, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![task_id, agent_name, content, now],
        )?;
        Ok(self.db.conn().last_insert_rowid())
    }

    /// Load a task's transcript in emission order
    pub fn load_task_messages(&self, task_id: i64) -> Result<Vec<AgentMessage>> {
        let mut stmt = self.db.conn().prepare(
            "SELECT id, task_id, agent_name, content, created_at
             FROM agent_messages WHERE task_id = ?1 ORDER BY id",
        )?;
        let messages = stmt
            .query_map([task_id], |row| {
                let created_at: String = row.get(4)?;
                Ok(AgentMessage {
                    id: row.get(0)?,
                    task_id: row.get(1)?,
                    agent_name: row.get(2)?,
                    content: row.get(3)?,
                    created_at: parse_timestamp(&created_at),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(messages)
    }
}
