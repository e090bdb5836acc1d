//! Database migration management for the sync system.
//!
//! This module handles running SQLx migrations to set up and update the database schema.
//! Migrations are idempotent - running them multiple times is safe.

use rocket_db_pools::sqlx::PgPool;

/// Run database migrations.
///
/// This is idempotent - migrations that have already been applied will be skipped.
/// Uses SQLx's built-in migration system to track which migrations have been run.
///
/// # Arguments
/// * `pool` - PostgreSQL connection pool
///
/// # Returns
/// `Ok(())` if migrations succeed, error otherwise
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    log::info!("running database migrations");

    sqlx::migrate!("./migrations")
        .run(pool)
        .await?;

    log::info!("database migrations completed");
    Ok(())
}
