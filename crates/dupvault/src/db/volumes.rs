use crate::db::{parse_timestamp, VolumeRecord};
use crate::error::{DupvaultError, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};

const VOLUME_COLUMNS: &str =
    "id, serial, label, fs_type, roots, free_bytes, total_bytes, first_seen, last_seen";

pub fn add_volume(conn: &Connection, volume: &VolumeRecord) -> Result<i64> {
    let roots = serde_json::to_string(&volume.roots)?;

    conn.execute(
        "INSERT INTO volumes (serial, label, fs_type, roots, free_bytes, total_bytes, first_seen, last_seen)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        (
            &volume.serial,
            &volume.label,
            &volume.fs_type,
            roots,
            volume.free_bytes,
            volume.total_bytes,
            volume.first_seen.to_rfc3339(),
            volume.last_seen.as_ref().map(|dt| dt.to_rfc3339()),
        ),
    )?;

    Ok(conn.last_insert_rowid())
}

/// Replaces label, roots and space figures. The serial never changes.
pub fn update_volume(conn: &Connection, volume: &VolumeRecord) -> Result<()> {
    let roots = serde_json::to_string(&volume.roots)?;
    let last_seen = volume.last_seen.unwrap_or_else(Utc::now).to_rfc3339();

    let rows = conn.execute(
        "UPDATE volumes SET label = ?1, fs_type = ?2, roots = ?3, free_bytes = ?4,
                            total_bytes = ?5, last_seen = ?6
         WHERE serial = ?7",
        (
            &volume.label,
            &volume.fs_type,
            roots,
            volume.free_bytes,
            volume.total_bytes,
            last_seen,
            &volume.serial,
        ),
    )?;

    if rows == 0 {
        return Err(DupvaultError::VolumeNotFound(volume.serial.clone()));
    }

    Ok(())
}

pub fn get_volume(conn: &Connection, serial: &str) -> Result<Option<VolumeRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM volumes WHERE serial = ?1",
        VOLUME_COLUMNS
    ))?;

    let volume = stmt.query_row([serial], parse_volume_row).optional()?;
    Ok(volume)
}

pub fn list_volumes(conn: &Connection) -> Result<Vec<VolumeRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM volumes ORDER BY serial",
        VOLUME_COLUMNS
    ))?;

    let volumes = stmt
        .query_map([], parse_volume_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(volumes)
}

fn parse_volume_row(row: &rusqlite::Row) -> rusqlite::Result<VolumeRecord> {
    let roots: String = row.get(4)?;

    Ok(VolumeRecord {
        id: row.get(0)?,
        serial: row.get(1)?,
        label: row.get(2)?,
        fs_type: row.get(3)?,
        roots: serde_json::from_str(&roots).unwrap_or_default(),
        free_bytes: row.get(5)?,
        total_bytes: row.get(6)?,
        first_seen: parse_timestamp(row.get(7)?).unwrap_or_else(Utc::now),
        last_seen: parse_timestamp(row.get(8)?),
    })
}
