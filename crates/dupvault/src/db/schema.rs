use crate::error::Result;
use rusqlite::Connection;

pub const SCHEMA_VERSION: i32 = 1;

pub fn initialize_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS volumes (
            id              INTEGER PRIMARY KEY,
            serial          TEXT NOT NULL UNIQUE,
            label           TEXT NOT NULL,
            fs_type         TEXT,
            roots           TEXT NOT NULL DEFAULT '[]',
            free_bytes      INTEGER,
            total_bytes     INTEGER,
            first_seen      TEXT DEFAULT (datetime('now')),
            last_seen       TEXT
        );

        CREATE TABLE IF NOT EXISTS files (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            volume_id       TEXT NOT NULL,
            base_path       TEXT NOT NULL COLLATE NOCASE,
            native_file_id  TEXT,
            size_bytes      INTEGER NOT NULL,
            created_at      TEXT,
            modified_at     TEXT,
            content_hash    TEXT,
            exists_flag     BOOLEAN DEFAULT 1,
            state           TEXT DEFAULT 'new',
            status          TEXT,
            first_seen      TEXT DEFAULT (datetime('now')),
            last_seen       TEXT,
            UNIQUE(volume_id, base_path)
        );

        CREATE TABLE IF NOT EXISTS file_history (
            id              INTEGER PRIMARY KEY,
            file_id         INTEGER NOT NULL UNIQUE,
            volume_id       TEXT NOT NULL,
            base_path       TEXT NOT NULL COLLATE NOCASE,
            native_file_id  TEXT,
            size_bytes      INTEGER NOT NULL,
            created_at      TEXT,
            modified_at     TEXT,
            content_hash    TEXT,
            exists_flag     BOOLEAN DEFAULT 0,
            status          TEXT,
            last_seen       TEXT,
            archived_at     TEXT DEFAULT (datetime('now'))
        );
        "#,
    )?;

    create_indexes(conn)?;
    set_schema_version(conn)?;

    Ok(())
}

fn create_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_files_hash ON files(content_hash);
        CREATE INDEX IF NOT EXISTS idx_files_native ON files(volume_id, native_file_id);
        CREATE INDEX IF NOT EXISTS idx_files_volume ON files(volume_id);
        CREATE INDEX IF NOT EXISTS idx_history_volume ON file_history(volume_id, base_path);
        CREATE INDEX IF NOT EXISTS idx_history_hash ON file_history(content_hash);
        "#,
    )?;
    Ok(())
}

fn set_schema_version(conn: &Connection) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
        [SCHEMA_VERSION],
    )?;
    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<Option<i32>> {
    let mut stmt = conn.prepare("SELECT version FROM schema_version LIMIT 1")?;
    let mut rows = stmt.query([])?;

    if let Some(row) = rows.next()? {
        Ok(Some(row.get(0)?))
    } else {
        Ok(None)
    }
}
