use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use console::style;
use dupvault_lib::util::{format_bytes, format_timestamp, short_hash};
use dupvault_lib::{Database, Result, SqliteDatabase};

pub fn handle_history_command(db: &SqliteDatabase, limit: Option<u32>) -> Result<()> {
    let records = db.list_history(limit)?;

    if records.is_empty() {
        println!("{}", style("No archived records").yellow());
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Archived").fg(Color::Cyan),
        Cell::new("Volume").fg(Color::Cyan),
        Cell::new("Path").fg(Color::Cyan),
        Cell::new("Size").fg(Color::Cyan),
        Cell::new("Hash").fg(Color::Cyan),
        Cell::new("Status").fg(Color::Cyan),
    ]);

    for record in &records {
        let file = &record.file;
        table.add_row(vec![
            Cell::new(format_timestamp(&record.archived_at)),
            Cell::new(&file.volume_id),
            Cell::new(&file.base_path),
            Cell::new(format_bytes(file.size_bytes)),
            Cell::new(short_hash(file.content_hash.as_deref())),
            Cell::new(file.status.as_deref().unwrap_or("")),
        ]);
    }

    println!("{}", table);
    println!("\n{} record(s)", style(records.len()).cyan());

    Ok(())
}
