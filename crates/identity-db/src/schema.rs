//! Schema definitions and migration runner for SurrealDB.
//!
//! All table definitions use SCHEMAFULL mode. UUIDs are stored as
//! strings and key statuses as lowercase strings guarded by ASSERT.

use surrealdb::{Connection, Surreal};
use surrealdb_types::SurrealValue;
use tracing::info;

use crate::error::DbError;

// -----------------------------------------------------------------------
// Migration tracking
// -----------------------------------------------------------------------

const MIGRATION_TABLE_DDL: &str = "\
DEFINE TABLE IF NOT EXISTS _migration SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS version ON TABLE _migration TYPE int;
DEFINE FIELD IF NOT EXISTS name ON TABLE _migration TYPE string;
DEFINE FIELD IF NOT EXISTS applied_at ON TABLE _migration TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX IF NOT EXISTS idx_migration_version ON TABLE _migration \
    COLUMNS version UNIQUE;
";

#[derive(Debug, SurrealValue)]
struct MigrationRecord {
    version: u32,
}

struct Migration {
    version: u32,
    name: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: SCHEMA_V1,
    },
    Migration {
        version: 2,
        name: "signing_key_rotated_at_index",
        sql: SCHEMA_V2,
    },
];

// -----------------------------------------------------------------------
// Schema v1: users, signing keys, refresh sessions, leases
// -----------------------------------------------------------------------

const SCHEMA_V1: &str = "\
-- =======================================================================
-- Users
-- =======================================================================
DEFINE TABLE user SCHEMAFULL;
DEFINE FIELD name ON TABLE user TYPE string;
DEFINE FIELD email ON TABLE user TYPE string;
DEFINE FIELD password_hash ON TABLE user TYPE string;
DEFINE FIELD roles ON TABLE user TYPE array<string> DEFAULT [];
DEFINE FIELD created_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE FIELD updated_at ON TABLE user TYPE datetime \
    DEFAULT time::now();
DEFINE INDEX idx_user_email ON TABLE user COLUMNS email UNIQUE;

-- =======================================================================
-- Token signing keys
-- =======================================================================
DEFINE TABLE signing_key SCHEMAFULL;
DEFINE FIELD kid ON TABLE signing_key TYPE string;
DEFINE FIELD algorithm ON TABLE signing_key TYPE string;
DEFINE FIELD usage ON TABLE signing_key TYPE string;
DEFINE FIELD private_key_pem ON TABLE signing_key TYPE string;
DEFINE FIELD public_key_pem ON TABLE signing_key TYPE string;
DEFINE FIELD status ON TABLE signing_key TYPE string \
    ASSERT $value IN ['active', 'retiring', 'revoked'];
DEFINE FIELD created_at ON TABLE signing_key TYPE datetime;
DEFINE FIELD rotated_at ON TABLE signing_key TYPE option<datetime>;
DEFINE INDEX idx_signing_key_kid ON TABLE signing_key COLUMNS kid UNIQUE;
DEFINE INDEX idx_signing_key_status ON TABLE signing_key COLUMNS status;

-- =======================================================================
-- Refresh sessions
-- =======================================================================
DEFINE TABLE refresh_session SCHEMAFULL;
DEFINE FIELD session_id ON TABLE refresh_session TYPE string;
DEFINE FIELD user_id ON TABLE refresh_session TYPE string;
DEFINE FIELD refresh_secret_hash ON TABLE refresh_session TYPE string;
DEFINE FIELD user_agent ON TABLE refresh_session TYPE option<string>;
DEFINE FIELD client_address ON TABLE refresh_session TYPE option<string>;
DEFINE FIELD created_at ON TABLE refresh_session TYPE datetime;
DEFINE FIELD expires_at ON TABLE refresh_session TYPE datetime;
DEFINE FIELD revoked_at ON TABLE refresh_session TYPE option<datetime>;
DEFINE INDEX idx_refresh_session_sid ON TABLE refresh_session \
    COLUMNS session_id UNIQUE;
DEFINE INDEX idx_refresh_session_user ON TABLE refresh_session \
    COLUMNS user_id;
DEFINE INDEX idx_refresh_session_expires ON TABLE refresh_session \
    COLUMNS expires_at;

-- =======================================================================
-- Distributed leases (record id is the lock key)
-- =======================================================================
DEFINE TABLE lease SCHEMAFULL;
DEFINE FIELD owner ON TABLE lease TYPE string;
DEFINE FIELD expires_at ON TABLE lease TYPE datetime;
";

// -----------------------------------------------------------------------
// Schema v2: retirement sweep index
// -----------------------------------------------------------------------

const SCHEMA_V2: &str = "\
DEFINE INDEX idx_signing_key_status_rotated ON TABLE signing_key \
    COLUMNS status, rotated_at;
";

// -----------------------------------------------------------------------
// Public API
// -----------------------------------------------------------------------

/// Run all pending migrations against the given SurrealDB client.
///
/// Creates a `_migration` tracking table on first run, then applies
/// each migration whose version exceeds the current maximum.
pub async fn run_migrations<C: Connection>(db: &Surreal<C>) -> Result<(), DbError> {
    db.query(MIGRATION_TABLE_DDL)
        .await?
        .check()
        .map_err(|e| DbError::Migration(e.to_string()))?;

    let mut result = db
        .query("SELECT version FROM _migration ORDER BY version DESC LIMIT 1")
        .await?;
    let records: Vec<MigrationRecord> = result.take(0)?;
    let current_version = records.first().map(|m| m.version).unwrap_or(0);

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        info!(
            version = migration.version,
            name = migration.name,
            "Applying migration"
        );
        db.query(migration.sql).await?.check().map_err(|e| {
            DbError::Migration(format!(
                "Migration v{} '{}' failed: {}",
                migration.version, migration.name, e,
            ))
        })?;

        db.query("CREATE _migration SET version = $version, name = $name")
            .bind(("version", migration.version))
            .bind(("name", migration.name))
            .await?
            .check()
            .map_err(|e| {
                DbError::Migration(format!(
                    "Failed to record migration v{}: {}",
                    migration.version, e,
                ))
            })?;
    }

    Ok(())
}

/// Highest schema version this build knows about.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map(|m| m.version).unwrap_or(0)
}
