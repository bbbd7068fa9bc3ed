//! Schema Migrations
//!
//! Versioned, idempotent, non-destructive migrations applied at store open.
//! `PRAGMA user_version` tracks the applied version; failures leave the
//! pre-migration schema in place.

use rusqlite::Connection;

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub up: &'static str,
}

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "Initial schema: documents with metadata JSON and embedding BLOB",
    up: MIGRATION_V1_UP,
}];

const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    doc_type TEXT NOT NULL DEFAULT '',
    repository TEXT NOT NULL DEFAULT '',
    text TEXT NOT NULL,
    metadata TEXT NOT NULL DEFAULT '{}',
    embedding BLOB,
    updated_at TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_documents_type ON documents(doc_type);
CREATE INDEX IF NOT EXISTS idx_documents_repository ON documents(repository);
CREATE INDEX IF NOT EXISTS idx_documents_updated ON documents(updated_at);
"#;

/// Currently applied schema version.
pub fn schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get::<_, i64>(0))
        .map(|v| v as u32)
}

/// Apply any pending migrations in order.
pub fn apply_migrations(conn: &Connection) -> rusqlite::Result<()> {
    let current = schema_version(conn)?;

    for migration in MIGRATIONS {
        if migration.version <= current {
            continue;
        }
        tracing::info!(
            version = migration.version,
            "Applying migration: {}",
            migration.description
        );
        conn.execute_batch(migration.up)?;
        conn.pragma_update(None, "user_version", migration.version as i64)?;
    }

    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_apply_and_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), MIGRATIONS.len() as u32);

        // Second run is a no-op
        apply_migrations(&conn).unwrap();
        assert_eq!(schema_version(&conn).unwrap(), MIGRATIONS.len() as u32);

        // Schema exists
        conn.execute(
            "INSERT INTO documents (id, text) VALUES ('x', 'hello')",
            [],
        )
        .unwrap();
    }
}
