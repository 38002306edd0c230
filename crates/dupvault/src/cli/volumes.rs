use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use console::style;
use dupvault_lib::util::{format_bytes, format_timestamp};
use dupvault_lib::{Database, Result, SqliteDatabase, VolumeRecord};

pub fn handle_volumes_command(db: &mut SqliteDatabase, quiet: bool) -> Result<()> {
    let (catalog, report) = super::refresh_volumes(db, quiet)?;

    if quiet {
        return Ok(());
    }

    println!(
        "{} {} mounted, {} new, {} relabelled, {} no longer mounted",
        style(">>>").cyan(),
        catalog.volumes().len(),
        report.inserted.len(),
        report.relabelled.len(),
        report.unmounted.len()
    );

    let volumes = db.list_volumes()?;
    if volumes.is_empty() {
        println!("{}", style("No volumes recorded").yellow());
        return Ok(());
    }

    print_volume_table(&volumes);
    Ok(())
}

pub fn print_volume_table(volumes: &[VolumeRecord]) {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        Cell::new("Label").fg(Color::Cyan),
        Cell::new("Serial").fg(Color::Cyan),
        Cell::new("FS").fg(Color::Cyan),
        Cell::new("Roots").fg(Color::Cyan),
        Cell::new("Free").fg(Color::Cyan),
        Cell::new("Total").fg(Color::Cyan),
        Cell::new("Last Seen").fg(Color::Cyan),
    ]);

    for volume in volumes {
        let roots = if volume.roots.is_empty() {
            Cell::new("not mounted").fg(Color::Red)
        } else {
            Cell::new(volume.roots.join("\n"))
        };

        table.add_row(vec![
            Cell::new(&volume.label),
            Cell::new(&volume.serial),
            Cell::new(volume.fs_type.as_deref().unwrap_or("-")),
            roots,
            Cell::new(volume.free_bytes.map(format_bytes).unwrap_or_else(|| "-".to_string())),
            Cell::new(volume.total_bytes.map(format_bytes).unwrap_or_else(|| "-".to_string())),
            Cell::new(
                volume
                    .last_seen
                    .as_ref()
                    .map(format_timestamp)
                    .unwrap_or_else(|| "never".to_string()),
            ),
        ]);
    }

    println!("{}", table);
}
