pub mod clean;
pub mod export;
pub mod history;
pub mod scan;
pub mod status;
pub mod volumes;

use clap::{Parser, Subcommand};
use dupvault_lib::util::create_spinner;
use dupvault_lib::{
    Config, Database, MountInfoSource, RefreshReport, Result, SqliteDatabase, VolumeCatalog,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dupvault")]
#[command(about = "Cross-volume duplicate finder with a persistent file identity store", long_about = None)]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Path to database file")]
    pub db: Option<PathBuf>,

    #[arg(long, global = true, help = "Path to settings file (TOML)")]
    pub config: Option<PathBuf>,

    #[arg(long, short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, short = 'q', global = true, help = "Suppress non-error output")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Scan roots for duplicates and relocate them")]
    Scan(scan::ScanArgs),

    #[command(about = "Refresh and list known volumes")]
    Volumes,

    #[command(about = "Relocate files in a root whose content already exists elsewhere")]
    Clean {
        #[arg(help = "Root to clean")]
        root: PathBuf,

        #[arg(long, help = "Directory that receives relocated files")]
        quarantine: Option<PathBuf>,

        #[arg(long, help = "Copy instead of move")]
        copy: bool,
    },

    #[command(about = "Show store status")]
    Status,

    #[command(about = "List archived (missing) file records")]
    History {
        #[arg(long, short = 'n', help = "Maximum number of records to show")]
        limit: Option<u32>,
    },

    #[command(about = "Export active file records as JSON")]
    Export {
        #[arg(long, short = 'o', help = "Output file path (stdout if omitted)")]
        output: Option<PathBuf>,
    },
}

pub fn init_database(config: &Config) -> Result<SqliteDatabase> {
    config.ensure_db_directory()?;

    let mut db = SqliteDatabase::open(&config.db_path)?;
    db.initialize()?;

    Ok(db)
}

/// Syncs mounted volumes into the store and returns the catalog for this run.
pub fn refresh_volumes(
    db: &mut SqliteDatabase,
    quiet: bool,
) -> Result<(VolumeCatalog, RefreshReport)> {
    let spinner = create_spinner("Reading mounted volumes...");
    if quiet {
        spinner.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let mut catalog = VolumeCatalog::new();
    let report = catalog.refresh(db, &MountInfoSource::default());
    spinner.finish_and_clear();
    let report = report?;

    log::info!(
        "Volume refresh: {} new, {} updated, {} unmounted",
        report.inserted.len(),
        report.updated.len(),
        report.unmounted.len()
    );
    Ok((catalog, report))
}
