use crate::db::files::parse_file_row;
use crate::db::{parse_timestamp, FileRecord, HistoryRecord};
use crate::error::Result;
use chrono::Utc;
use rusqlite::{named_params, Connection};

/// Moves a record from `files` into `file_history` in one transaction.
///
/// The history row is written with `exists_flag = 0`. Archiving the same record
/// id twice leaves a single history row; the return value reports whether a
/// new row was written.
pub fn archive_file(conn: &mut Connection, file: &FileRecord) -> Result<bool> {
    let tx = conn.transaction()?;

    let inserted = tx.execute(
        "INSERT OR IGNORE INTO file_history (
            file_id, volume_id, base_path, native_file_id, size_bytes, created_at,
            modified_at, content_hash, exists_flag, status, last_seen
        ) VALUES (
            :file_id, :volume_id, :base_path, :native_file_id, :size_bytes, :created_at,
            :modified_at, :content_hash, 0, :status, :last_seen
        )",
        named_params! {
            ":file_id": file.id,
            ":volume_id": &file.volume_id,
            ":base_path": &file.base_path,
            ":native_file_id": file.native_file_id.as_ref().map(|id| id.to_string()),
            ":size_bytes": file.size_bytes,
            ":created_at": file.created_at.as_ref().map(|dt| dt.to_rfc3339()),
            ":modified_at": file.modified_at.as_ref().map(|dt| dt.to_rfc3339()),
            ":content_hash": &file.content_hash,
            ":status": &file.status,
            ":last_seen": file.last_seen.to_rfc3339(),
        },
    )?;

    tx.execute("DELETE FROM files WHERE id = ?1", [file.id])?;
    tx.commit()?;

    Ok(inserted > 0)
}

pub fn list_history(conn: &Connection, limit: Option<u32>) -> Result<Vec<HistoryRecord>> {
    let mut sql = String::from(
        "SELECT file_id, volume_id, base_path, native_file_id, size_bytes, created_at,
                modified_at, content_hash, exists_flag, 'missing', status, last_seen,
                id, archived_at
         FROM file_history ORDER BY archived_at DESC, id DESC",
    );
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    let mut stmt = conn.prepare(&sql)?;
    let records = stmt
        .query_map([], |row| {
            let file = parse_file_row(row)?;
            Ok(HistoryRecord {
                id: row.get(12)?,
                file,
                archived_at: parse_timestamp(row.get(13)?).unwrap_or_else(Utc::now),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(records)
}

pub fn count_history(conn: &Connection) -> Result<i64> {
    let count = conn.query_row("SELECT COUNT(*) FROM file_history", [], |row| row.get(0))?;
    Ok(count)
}
