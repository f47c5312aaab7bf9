use sqlx::SqlitePool;

use crate::error::CoreError;

pub async fn run_migrations(pool: &SqlitePool) -> Result<(), CoreError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}
