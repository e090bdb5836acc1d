use rocket_db_pools::{Database, sqlx};

#[derive(Database)]
#[database("arrival_sync_db")]
pub struct AppDb(sqlx::PgPool);
