use console::style;
use dupvault_lib::db::{files, history};
use dupvault_lib::util::format_bytes;
use dupvault_lib::{Config, Database, Result, SqliteDatabase};

pub fn handle_status_command(db: &SqliteDatabase, config: &Config) -> Result<()> {
    println!("\n{}", style("Dupvault Status").bold().cyan());
    println!("{}\n", style("═".repeat(60)).dim());

    println!("{}", style("Store").bold());
    println!("  Database: {}", config.db_path.display());
    match &config.config_path {
        Some(path) => println!("  Settings: {}", path.display()),
        None => println!("  Settings: {}", style("defaults").dim()),
    }
    println!();

    show_volume_summary(db)?;
    show_file_summary(db)?;
    show_duplicate_summary(db)?;

    Ok(())
}

fn show_volume_summary(db: &SqliteDatabase) -> Result<()> {
    let volumes = db.list_volumes()?;
    let mounted = volumes.iter().filter(|v| !v.roots.is_empty()).count();
    let unmounted = volumes.len() - mounted;

    println!("{}", style("Volumes").bold());
    println!("  Known: {}", volumes.len());
    println!("  Mounted: {}", style(mounted).green());
    if unmounted > 0 {
        println!("  Not mounted: {}", style(unmounted).red());
    }
    println!();

    Ok(())
}

fn show_file_summary(db: &SqliteDatabase) -> Result<()> {
    let conn = db.conn();
    let active = files::count_files(conn)?;
    let size = files::total_size(conn)?;
    let archived = history::count_history(conn)?;

    println!("{}", style("Files").bold());
    println!("  Active records: {}", style(active).cyan());
    println!("  Present size: {}", style(format_bytes(size)).cyan());
    println!("  Archived records: {}", style(archived).dim());
    println!();

    Ok(())
}

fn show_duplicate_summary(db: &SqliteDatabase) -> Result<()> {
    let (groups, surplus) = files::duplicate_stats(db.conn())?;

    if groups > 0 {
        println!("{}", style("Duplicates").bold());
        println!("  Groups: {}", style(groups).yellow());
        println!("  Surplus copies: {}", style(surplus).yellow());
        println!();
    }

    Ok(())
}
