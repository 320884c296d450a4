//! Taskforce Server binary

use taskforce_core::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let settings = Settings::load()?;
    tracing::info!(
        database = %settings.database_path.display(),
        workspace = %settings.workspace_dir.display(),
        "Starting taskforce-server"
    );

    taskforce_server::start_server(settings).await
}
