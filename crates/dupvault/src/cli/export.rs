use console::style;
use dupvault_lib::{Database, FileRecord, Result, SqliteDatabase};
use std::path::PathBuf;

pub fn handle_export_command(db: &SqliteDatabase, output: Option<PathBuf>) -> Result<()> {
    let volumes = db.list_volumes()?;

    let mut records: Vec<FileRecord> = Vec::new();
    for volume in &volumes {
        records.extend(db.list_files_by_volume(&volume.serial)?);
    }

    let export = serde_json::json!({
        "exported_at": chrono::Utc::now().to_rfc3339(),
        "volumes": volumes,
        "files": records,
    });
    let content = serde_json::to_string_pretty(&export)?;

    match output {
        Some(path) => {
            std::fs::write(&path, content)?;
            eprintln!(
                "{} Exported {} record(s) to {}",
                style("✓").green(),
                records.len(),
                path.display()
            );
        }
        None => println!("{}", content),
    }

    Ok(())
}
