use console::style;
use dupvault_lib::util::create_progress_bar;
use dupvault_lib::{
    Config, FileOutcome, RelocationMode, Result, ScanLock, ScanOrchestrator, SqliteDatabase,
    UnixIdentityProvider,
};
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::scan::{describe_report, print_summary};

pub fn handle_clean_command(
    db: &mut SqliteDatabase,
    config: &Config,
    root: &Path,
    quarantine: Option<PathBuf>,
    copy: bool,
    quiet: bool,
) -> Result<()> {
    let (catalog, _) = super::refresh_volumes(db, quiet)?;

    let mut options = config.settings.scan_options();
    if quarantine.is_some() {
        options.quarantine_root = quarantine;
    }
    if copy {
        options.mode = RelocationMode::Copy;
    }
    options.relocate = true;

    let lock_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let _lock = ScanLock::acquire(&config.db_path, &[lock_root])?;

    if !quiet {
        println!(
            "{} Cleaning {} of content already stored elsewhere...",
            style(">>>").cyan(),
            style(root.display()).bold()
        );
    }

    let started = Instant::now();
    let provider = UnixIdentityProvider;
    let pb = create_progress_bar(0, "Checking");
    if quiet {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let summary = {
        let mut orchestrator =
            ScanOrchestrator::new(db, &catalog, &provider, options).with_reporter(|report| {
                pb.set_length(report.total as u64);
                pb.set_position(report.position as u64);
                if !quiet && !matches!(report.outcome, FileOutcome::Kept { .. }) {
                    pb.println(describe_report(report));
                }
            });
        orchestrator.clean(root)
    };
    pb.finish_and_clear();
    let summary = summary?;

    if !quiet {
        print_summary(&summary, started);
    }

    Ok(())
}
