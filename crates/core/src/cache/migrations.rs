//! Database schema migrations.
//!
//! Applied migrations are recorded in `_migrations`; anything newer than the
//! highest recorded version runs in order on open.

use super::Error;
use tokio_rusqlite::{Connection, params};

/// Numbered SQL batches, ascending. Each is idempotent (`IF NOT EXISTS`).
const MIGRATIONS: &[(i64, &str)] = &[(1, include_str!("../../migrations/001_render_cache.sql"))];

/// Apply pending migrations inside a single transaction.
///
/// # Errors
///
/// Returns `Error::MigrationFailed` naming the version whose SQL failed.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        let tx = conn.transaction()?;
        tx.execute(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
            [],
        )?;

        let current: i64 =
            tx.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

        for (version, sql) in MIGRATIONS.iter().filter(|(version, _)| *version > current) {
            tx.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("version {version}: {e}")))?;
            tx.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, chrono::Utc::now().to_rfc3339()],
            )?;
            tracing::debug!(version, "applied cache migration");
        }

        tx.commit()?;
        Ok(())
    })
    .await
    .map_err(Error::from)
}
