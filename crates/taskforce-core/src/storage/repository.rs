//! Async persistence seam consumed by the broker, orchestrator, and server

use std::path::{Path, PathBuf};

use anyhow::Result;
use async_trait::async_trait;

use super::database::Database;
use super::interactions::{
    InteractionRequest, InteractionResponse, InteractionStore, NewInteraction, RespondOutcome,
};
use super::messages::{AgentMessage, MessageStore};
use super::tasks::{TaskArtifact, TaskOutputs, TaskRecord, TaskStatus, TaskStore};

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create_task(&self, objective: &str) -> Result<i64>;
    async fn get_task(&self, task_id: i64) -> Result<Option<TaskRecord>>;
    async fn task_status(&self, task_id: i64) -> Result<Option<TaskStatus>>;
    async fn set_task_status(&self, task_id: i64, status: TaskStatus) -> Result<()>;
    async fn save_outputs(&self, task_id: i64, outputs: &TaskOutputs) -> Result<()>;

    async fn append_message(&self, task_id: i64, agent_name: &str, content: &str) -> Result<()>;
    async fn messages(&self, task_id: i64) -> Result<Vec<AgentMessage>>;

    async fn register_artifact(&self, task_id: i64, artifact: &TaskArtifact) -> Result<()>;
    async fn artifacts(&self, task_id: i64) -> Result<Vec<TaskArtifact>>;

    async fn create_interaction(&self, new: &NewInteraction) -> Result<i64>;
    async fn get_interaction(&self, request_id: i64) -> Result<Option<InteractionRequest>>;
    async fn pending_interaction(&self, task_id: i64) -> Result<Option<InteractionRequest>>;
    async fn respond_to_interaction(
        &self,
        request_id: i64,
        response: &InteractionResponse,
    ) -> Result<RespondOutcome>;
    /// Returns false when the row was no longer pending
    async fn expire_interaction(&self, request_id: i64) -> Result<bool>;
}

/// SQLite-backed repository; opens a connection per operation
#[derive(Debug, Clone)]
pub struct SqliteRepository {
    db_path: PathBuf,
}

impl SqliteRepository {
    /// Create the repository, applying the schema once up front
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        Database::new(&db_path)?;
        Ok(Self { db_path })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn open(&self) -> Result<Database> {
        Database::new(&self.db_path)
    }
}

#[async_trait]
impl TaskRepository for SqliteRepository {
    async fn create_task(&self, objective: &str) -> Result<i64> {
        let db = self.open()?;
        TaskStore::new(&db).create_task(objective)
    }

    async fn get_task(&self, task_id: i64) -> Result<Option<TaskRecord>> {
        let db = self.open()?;
        TaskStore::new(&db).get_task(task_id)
    }

    async fn task_status(&self, task_id: i64) -> Result<Option<TaskStatus>> {
        let db = self.open()?;
        TaskStore::new(&db).get_status(task_id)
    }

    async fn set_task_status(&self, task_id: i64, status: TaskStatus) -> Result<()> {
        let db = self.open()?;
        TaskStore::new(&db).set_status(task_id, status)
    }

    async fn save_outputs(&self, task_id: i64, outputs: &TaskOutputs) -> Result<()> {
        let db = self.open()?;
        TaskStore::new(&db).update_outputs(task_id, outputs)
    }

    async fn append_message(&self, task_id: i64, agent_name: &str, content: &str) -> Result<()> {
        let db = self.open()?;
        MessageStore::new(&db).save_message(task_id, agent_name, content)?;
        Ok(())
    }

    async fn messages(&self, task_id: i64) -> Result<Vec<AgentMessage>> {
        let db = self.open()?;
        MessageStore::new(&db).load_task_messages(task_id)
    }

    async fn register_artifact(&self, task_id: i64, artifact: &TaskArtifact) -> Result<()> {
        let db = self.open()?;
        TaskStore::new(&db).add_file(task_id, artifact)
    }

    async fn artifacts(&self, task_id: i64) -> Result<Vec<TaskArtifact>> {
        let db = self.open()?;
        TaskStore::new(&db).list_files(task_id)
    }

    async fn create_interaction(&self, new: &NewInteraction) -> Result<i64> {
        let db = self.open()?;
        InteractionStore::new(&db).create(new)
    }

    async fn get_interaction(&self, request_id: i64) -> Result<Option<InteractionRequest>> {
        let db = self.open()?;
        InteractionStore::new(&db).get(request_id)
    }

    async fn pending_interaction(&self, task_id: i64) -> Result<Option<InteractionRequest>> {
        let db = self.open()?;
        InteractionStore::new(&db).pending_for_task(task_id)
    }

    async fn respond_to_interaction(
        &self,
        request_id: i64,
        response: &InteractionResponse,
    ) -> Result<RespondOutcome> {
        let db = self.open()?;
        InteractionStore::new(&db).respond(request_id, response)
    }

    async fn expire_interaction(&self, request_id: i64) -> Result<bool> {
        let db = self.open()?;
        InteractionStore::new(&db).expire(request_id)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn test_repository_persists_across_connections() {
        let temp = TempDir::new().unwrap();
        let repo = SqliteRepository::new(temp.path().join("test.db")).unwrap();

        let id = repo.create_task("objective").await.unwrap();
        repo.set_task_status(id, TaskStatus::Planning).await.unwrap();
        repo.append_message(id, "Planner", "plan").await.unwrap();

        assert_eq!(repo.task_status(id).await.unwrap(), Some(TaskStatus::Planning));
        assert_eq!(repo.messages(id).await.unwrap().len(), 1);
        assert!(repo.pending_interaction(id).await.unwrap().is_none());
    }
}
