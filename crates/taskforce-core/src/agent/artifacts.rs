//! Workspace artifact collection

use std::path::Path;

use anyhow::{Context, Result};
use tokio::fs;

use crate::constants::workflow::SCREENSHOT_DIR;
use crate::storage::TaskArtifact;

/// Purge transient screenshots and list the regular files left at the top
/// level of a task workspace, sorted by name
pub async fn collect_artifacts(workspace: &Path) -> Result<Vec<TaskArtifact>> {
    if !fs::try_exists(workspace).await.unwrap_or(false) {
        return Ok(Vec::new());
    }

    let screenshots = workspace.join(SCREENSHOT_DIR);
    if fs::try_exists(&screenshots).await.unwrap_or(false) {
        if let Err(e) = fs::remove_dir_all(&screenshots).await {
            tracing::warn!(path = %screenshots.display(), error = %e, "Failed to purge screenshots");
        }
    }

    let mut artifacts = Vec::new();
    let mut entries = fs::read_dir(workspace)
        .await
        .with_context(|| format!("Failed to read workspace {}", workspace.display()))?;
    while let Some(entry) = entries.next_entry().await? {
        let metadata = entry.metadata().await?;
        if !metadata.is_file() {
            continue;
        }
        let path = entry.path();
        artifacts.push(TaskArtifact {
            filename: entry.file_name().to_string_lossy().into_owned(),
            path: path.display().to_string(),
            extension: path
                .extension()
                .map(|e| format!(".{}", e.to_string_lossy()))
                .unwrap_or_default(),
            size_bytes: metadata.len(),
        });
    }
    artifacts.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(artifacts)
}
