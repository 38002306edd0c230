use crate::db::{parse_timestamp, FileRecord, FileState};
use crate::error::{DupvaultError, Result};
use crate::identity::NativeFileId;
use chrono::Utc;
use rusqlite::{named_params, Connection, OptionalExtension};

const FILE_COLUMNS: &str = "id, volume_id, base_path, native_file_id, size_bytes,
    created_at, modified_at, content_hash, exists_flag, state, status, last_seen";

pub fn add_file(conn: &Connection, file: &FileRecord) -> Result<i64> {
    conn.execute(
        "INSERT INTO files (
            volume_id, base_path, native_file_id, size_bytes, created_at, modified_at,
            content_hash, exists_flag, state, status, last_seen
        ) VALUES (
            :volume_id, :base_path, :native_file_id, :size_bytes, :created_at, :modified_at,
            :content_hash, :exists_flag, :state, :status, :last_seen
        )",
        named_params! {
            ":volume_id": &file.volume_id,
            ":base_path": &file.base_path,
            ":native_file_id": file.native_file_id.as_ref().map(|id| id.to_string()),
            ":size_bytes": file.size_bytes,
            ":created_at": file.created_at.as_ref().map(|dt| dt.to_rfc3339()),
            ":modified_at": file.modified_at.as_ref().map(|dt| dt.to_rfc3339()),
            ":content_hash": &file.content_hash,
            ":exists_flag": file.exists,
            ":state": file.state.as_str(),
            ":status": &file.status,
            ":last_seen": file.last_seen.to_rfc3339(),
        },
    )?;

    Ok(conn.last_insert_rowid())
}

/// Rewrites every mutable field of the record with the given id.
/// `volume_id` and `base_path` are updated too so a rename keeps the record id.
pub fn update_file(conn: &Connection, file: &FileRecord) -> Result<()> {
    let rows = conn.execute(
        "UPDATE files SET
            volume_id = :volume_id,
            base_path = :base_path,
            native_file_id = :native_file_id,
            size_bytes = :size_bytes,
            created_at = :created_at,
            modified_at = :modified_at,
            content_hash = :content_hash,
            exists_flag = :exists_flag,
            state = :state,
            status = :status,
            last_seen = :last_seen
         WHERE id = :id",
        named_params! {
            ":id": file.id,
            ":volume_id": &file.volume_id,
            ":base_path": &file.base_path,
            ":native_file_id": file.native_file_id.as_ref().map(|id| id.to_string()),
            ":size_bytes": file.size_bytes,
            ":created_at": file.created_at.as_ref().map(|dt| dt.to_rfc3339()),
            ":modified_at": file.modified_at.as_ref().map(|dt| dt.to_rfc3339()),
            ":content_hash": &file.content_hash,
            ":exists_flag": file.exists,
            ":state": file.state.as_str(),
            ":status": &file.status,
            ":last_seen": file.last_seen.to_rfc3339(),
        },
    )?;

    if rows == 0 {
        return Err(DupvaultError::FileNotFound(file.base_path.clone().into()));
    }

    Ok(())
}

pub fn find_file(conn: &Connection, volume_id: &str, base_path: &str) -> Result<Option<FileRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM files WHERE volume_id = ?1 AND base_path = ?2",
        FILE_COLUMNS
    ))?;

    let file = stmt
        .query_row([volume_id, base_path], parse_file_row)
        .optional()?;

    Ok(file)
}

pub fn find_files_by_native_id(
    conn: &Connection,
    volume_id: &str,
    native_id: &NativeFileId,
) -> Result<Vec<FileRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM files WHERE volume_id = ?1 AND native_file_id = ?2 ORDER BY id",
        FILE_COLUMNS
    ))?;

    let files = stmt
        .query_map([volume_id, native_id.to_string().as_str()], parse_file_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(files)
}

pub fn find_files_by_hash(conn: &Connection, hash: &str) -> Result<Vec<FileRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM files WHERE content_hash = ?1 ORDER BY volume_id, base_path",
        FILE_COLUMNS
    ))?;

    let files = stmt
        .query_map([hash], parse_file_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(files)
}

pub fn list_files_by_volume(conn: &Connection, volume_id: &str) -> Result<Vec<FileRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM files WHERE volume_id = ?1 ORDER BY base_path",
        FILE_COLUMNS
    ))?;

    let files = stmt
        .query_map([volume_id], parse_file_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(files)
}

pub fn count_files(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM files", [], |row| row.get(0))?;
    Ok(count)
}

pub fn total_size(conn: &Connection) -> Result<i64> {
    let total = conn.query_row(
        "SELECT COALESCE(SUM(size_bytes), 0) FROM files WHERE exists_flag = 1",
        [],
        |row| row.get(0),
    )?;
    Ok(total)
}

/// Number of hashes held by more than one present record, and how many surplus copies they account for.
pub fn duplicate_stats(conn: &Connection) -> Result<(i64, i64)> {
    let stats = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(copies - 1), 0) FROM (
            SELECT COUNT(*) AS copies FROM files
            WHERE content_hash IS NOT NULL AND exists_flag = 1
            GROUP BY content_hash HAVING COUNT(*) > 1
        )",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;
    Ok(stats)
}

pub(crate) fn parse_file_row(row: &rusqlite::Row) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        id: row.get(0)?,
        volume_id: row.get(1)?,
        base_path: row.get(2)?,
        abs_path: None,
        native_file_id: row
            .get::<_, Option<String>>(3)?
            .and_then(|s| NativeFileId::parse(&s)),
        size_bytes: row.get(4)?,
        created_at: parse_timestamp(row.get(5)?),
        modified_at: parse_timestamp(row.get(6)?),
        content_hash: row.get(7)?,
        exists: row.get(8)?,
        state: FileState::from_str(&row.get::<_, String>(9)?).unwrap_or(FileState::Stale),
        status: row.get(10)?,
        last_seen: parse_timestamp(row.get(11)?).unwrap_or_else(Utc::now),
    })
}
