// [crates/cms-db/src/schema.rs]
/*!
 * =================================================================
 * APARATO: COORDINATION CORE SCHEMA
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: GOBERNANZA ESTRUCTURAL E IDEMPOTENCIA DE MIGRACIONES
 *
 * Tres fases idempotentes: tablas base, reparaciones evolutivas
 * (`ALTER TABLE ADD COLUMN`, toleradas si la columna ya existe) e
 * índices de aceleración. Turso/libSQL no soporta `IF NOT EXISTS` en
 * `ALTER TABLE ADD COLUMN`, de ahí la tolerancia explícita.
 * =================================================================
 */

use anyhow::{Context, Result};
use libsql::Connection;
use tracing::{debug, info, instrument, warn};

const BASE_TABLES: &[(&str, &str)] = &[
    ("TABLE_USERS", r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            role TEXT NOT NULL DEFAULT 'user',
            active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
    "#),
    ("TABLE_REFRESH_TOKENS", r#"
        CREATE TABLE IF NOT EXISTS refresh_tokens (
            token_id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(user_id),
            selector TEXT NOT NULL UNIQUE,
            verifier_hash TEXT NOT NULL,
            issued_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            expires_at TEXT NOT NULL
        );
    "#),
    ("TABLE_ROOMS", r#"
        CREATE TABLE IF NOT EXISTS rooms (
            room_id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            columns INTEGER NOT NULL,
            rows INTEGER NOT NULL,
            description TEXT
        );
    "#),
    ("TABLE_USER_ROOM_ASSIGNMENTS", r#"
        CREATE TABLE IF NOT EXISTS user_room_assignments (
            user_id INTEGER NOT NULL REFERENCES users(user_id),
            room_id INTEGER NOT NULL REFERENCES rooms(room_id),
            PRIMARY KEY (user_id, room_id)
        );
    "#),
    ("TABLE_COMPUTERS", r#"
        CREATE TABLE IF NOT EXISTS computers (
            computer_id INTEGER PRIMARY KEY AUTOINCREMENT,
            agent_id TEXT NOT NULL UNIQUE,
            agent_token_hash TEXT,
            room_id INTEGER REFERENCES rooms(room_id),
            pos_x INTEGER NOT NULL DEFAULT 0,
            pos_y INTEGER NOT NULL DEFAULT 0,
            name TEXT NOT NULL DEFAULT '',
            hardware_info TEXT,
            have_active_errors INTEGER NOT NULL DEFAULT 0
        );
    "#),
    ("TABLE_COMPUTER_ERRORS", r#"
        CREATE TABLE IF NOT EXISTS computer_errors (
            error_id INTEGER PRIMARY KEY AUTOINCREMENT,
            computer_id INTEGER NOT NULL REFERENCES computers(computer_id),
            error_type TEXT NOT NULL,
            error_message TEXT NOT NULL,
            error_details TEXT,
            reported_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            resolved INTEGER NOT NULL DEFAULT 0,
            resolved_at TEXT,
            resolution_notes TEXT
        );
    "#),
    ("TABLE_AGENT_VERSIONS", r#"
        CREATE TABLE IF NOT EXISTS agent_versions (
            version_id INTEGER PRIMARY KEY AUTOINCREMENT,
            version TEXT NOT NULL UNIQUE,
            checksum_sha256 TEXT NOT NULL,
            download_url TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_size INTEGER NOT NULL,
            notes TEXT,
            is_stable INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        );
    "#),
];

const EVOLUTIONARY_STRATA: &[(&str, &str)] = &[
    ("COMPUTER_NAME_DEFAULT", "ALTER TABLE computers ADD COLUMN name TEXT NOT NULL DEFAULT ''"),
    ("COMPUTER_HARDWARE_INFO", "ALTER TABLE computers ADD COLUMN hardware_info TEXT"),
];

const ACCELERATION_INDEXES: &[(&str, &str)] = &[
    ("IDX_REFRESH_SELECTOR", "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_selector ON refresh_tokens(selector);"),
    ("IDX_REFRESH_USER", "CREATE INDEX IF NOT EXISTS idx_refresh_tokens_user ON refresh_tokens(user_id);"),
    ("IDX_COMPUTERS_AGENT", "CREATE INDEX IF NOT EXISTS idx_computers_agent_id ON computers(agent_id);"),
    ("IDX_COMPUTERS_ROOM", "CREATE INDEX IF NOT EXISTS idx_computers_room ON computers(room_id);"),
    ("IDX_COMPUTER_ERRORS_COMPUTER", "CREATE INDEX IF NOT EXISTS idx_computer_errors_computer ON computer_errors(computer_id);"),
    ("IDX_UR_ASSIGNMENTS_ROOM", "CREATE INDEX IF NOT EXISTS idx_user_room_assignments_room ON user_room_assignments(room_id);"),
    ("IDX_AGENT_VERSIONS_STABLE", "CREATE INDEX IF NOT EXISTS idx_agent_versions_stable ON agent_versions(is_stable);"),
    (
        "IDX_COMPUTERS_POSITION_UNIQUE",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_computers_position_unique ON computers(room_id, pos_x, pos_y);",
    ),
];

#[instrument(skip(conn))]
pub async fn apply_schema(conn: &Connection) -> Result<()> {
    info!("applying coordination core schema");

    solidify_base_tables(conn).await?;
    execute_evolutionary_repair(conn).await?;
    harden_indexes(conn).await?;

    info!("schema synchronized");
    Ok(())
}

async fn solidify_base_tables(db: &Connection) -> Result<()> {
    for (identifier, sql) in BASE_TABLES {
        debug!("solidifying {}", identifier);
        db.execute(sql, ()).await.with_context(|| format!("failed to create table: {identifier}"))?;
    }
    Ok(())
}

async fn execute_evolutionary_repair(db: &Connection) -> Result<()> {
    for (identifier, sql) in EVOLUTIONARY_STRATA {
        match db.execute(sql, ()).await {
            Ok(_) => info!("applied evolutionary stratum {}", identifier),
            Err(e) => {
                let message = e.to_string();
                if message.contains("duplicate column name") {
                    debug!("{} already applied", identifier);
                } else {
                    warn!("evolutionary stratum {} incomplete: {}", identifier, message);
                }
            }
        }
    }
    Ok(())
}

async fn harden_indexes(db: &Connection) -> Result<()> {
    for (identifier, sql) in ACCELERATION_INDEXES {
        debug!("hardening {}", identifier);
        db.execute(sql, ()).await.with_context(|| format!("failed to create index: {identifier}"))?;
    }
    Ok(())
}
