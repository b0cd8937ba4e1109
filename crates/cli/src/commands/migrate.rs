//! Database migration command.
//!
//! Migrations live in `crates/assistant/migrations/` and are embedded into
//! the assistant library, so the CLI always applies the same set the server
//! was built against.

use skin_edit_assistant::db::MIGRATOR;

use super::CommandError;

/// Run all pending migrations.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), CommandError> {
    let pool = super::connect().await?;

    tracing::info!(migrations = MIGRATOR.iter().count(), "Running migrations...");
    MIGRATOR.run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}
