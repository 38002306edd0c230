use clap::Args;
use console::style;
use dupvault_lib::util::{create_progress_bar, format_bytes, format_duration, format_rate};
use dupvault_lib::{
    Config, Database, FileOutcome, FileReport, HashSource, Relocated, RelocationMode, Result,
    ScanLock, ScanOrchestrator, ScanSummary, SqliteDatabase, UnixIdentityProvider,
};
use std::path::PathBuf;
use std::time::Instant;

#[derive(Args)]
pub struct ScanArgs {
    #[arg(required = true, help = "Directories to scan")]
    pub roots: Vec<PathBuf>,

    #[arg(long, help = "Directory that receives relocated duplicates")]
    pub quarantine: Option<PathBuf>,

    #[arg(long, help = "Report duplicates without relocating them")]
    pub no_relocate: bool,

    #[arg(long, help = "Copy duplicates instead of moving them")]
    pub copy: bool,

    #[arg(long, help = "Only refresh the volume catalog")]
    pub volumes_only: bool,

    #[arg(long, conflicts_with = "fail_fast", help = "Continue past per-file errors")]
    pub tolerant: bool,

    #[arg(long, help = "Stop at the first per-file error")]
    pub fail_fast: bool,

    #[arg(long, short = 'j', help = "Number of hashing threads")]
    pub threads: Option<usize>,
}

pub fn handle_scan_command(
    db: &mut SqliteDatabase,
    config: &Config,
    args: ScanArgs,
    quiet: bool,
) -> Result<()> {
    let (catalog, _) = super::refresh_volumes(db, quiet)?;

    if args.volumes_only {
        if !quiet {
            println!(
                "{} Refreshed {} volume(s)",
                style("✓").green(),
                style(catalog.volumes().len()).cyan()
            );
            super::volumes::print_volume_table(&db.list_volumes()?);
        }
        return Ok(());
    }

    let mut options = config.settings.scan_options();
    if args.quarantine.is_some() {
        options.quarantine_root = args.quarantine.clone();
    }
    if args.no_relocate {
        options.relocate = false;
    }
    if args.copy {
        options.mode = RelocationMode::Copy;
    }
    if args.fail_fast {
        options.tolerant = false;
    } else if args.tolerant {
        options.tolerant = true;
    }
    if args.threads.is_some() {
        options.threads = args.threads;
    }

    let lock_roots: Vec<PathBuf> = args
        .roots
        .iter()
        .map(|r| r.canonicalize().unwrap_or_else(|_| r.clone()))
        .collect();
    let _lock = ScanLock::acquire(&config.db_path, &lock_roots)?;

    if !quiet {
        println!(
            "{} Scanning {} root(s)...",
            style(">>>").cyan(),
            args.roots.len()
        );
    }

    let started = Instant::now();
    let provider = UnixIdentityProvider;
    let pb = create_progress_bar(0, "Hashing");
    if quiet {
        pb.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }

    let summary = {
        let mut orchestrator =
            ScanOrchestrator::new(db, &catalog, &provider, options).with_reporter(|report| {
                pb.set_length(report.total as u64);
                pb.set_position(report.position as u64);
                if !quiet {
                    pb.println(describe_report(report));
                }
            });
        orchestrator.run(&args.roots)
    };
    pb.finish_and_clear();
    let summary = summary?;

    if !quiet {
        print_summary(&summary, started);
    }

    Ok(())
}

pub(crate) fn describe_report(report: &FileReport) -> String {
    let position = format!("[{}/{}]", report.position, report.total);
    let path = report.path.display();

    match &report.outcome {
        FileOutcome::Kept { source } => format!(
            "{} {} {}",
            style(position).dim(),
            path,
            style(source_label(*source)).dim()
        ),
        FileOutcome::Duplicate {
            canonical,
            relocation,
            ..
        } => {
            let action = match relocation {
                Relocated::NotRequested => "left in place".to_string(),
                Relocated::Moved(target) => format!("moved to {}", target.display()),
                Relocated::Copied(target) => format!("copied to {}", target.display()),
                Relocated::AlreadyCopied(target) => {
                    format!("already copied to {}", target.display())
                }
                Relocated::Failed(cause) => format!("relocation failed: {}", cause),
            };
            format!(
                "{} {} {} of {}, {}",
                style(position).dim(),
                path,
                style("duplicate").yellow(),
                canonical,
                action
            )
        }
        FileOutcome::Faulted { cause } => format!(
            "{} {} {}: {}",
            style(position).dim(),
            path,
            style("error").red(),
            cause
        ),
    }
}

fn source_label(source: HashSource) -> &'static str {
    match source {
        HashSource::Computed => "hashed",
        HashSource::Cached => "cached",
        HashSource::Renamed => "renamed",
    }
}

pub(crate) fn print_summary(summary: &ScanSummary, started: Instant) {
    if summary.cancelled {
        println!("\n{} Scan cancelled", style("!").yellow());
    } else if summary.stopped_early {
        println!("\n{} Scan stopped at first error", style("!").yellow());
    } else {
        println!("\n{} Scan completed", style("✓").green());
    }

    println!("  Files seen: {}", style(summary.files_seen).cyan());
    println!(
        "  Hashed: {} ({}, {})",
        style(summary.hashed).cyan(),
        format_bytes(summary.bytes_hashed as i64),
        format_rate(summary.bytes_hashed, started.elapsed())
    );
    println!("  Reused cached hashes: {}", style(summary.cached).cyan());
    if summary.renamed > 0 {
        println!("  Renames recognised: {}", style(summary.renamed).cyan());
    }
    println!("  Duplicates: {}", style(summary.duplicates).yellow());
    if summary.unique_hashes > 0 {
        println!("  Distinct contents: {}", style(summary.unique_hashes).cyan());
    }
    println!("  Relocated: {}", style(summary.relocated).yellow());
    if summary.relocation_failed > 0 {
        println!(
            "  Relocation failures: {}",
            style(summary.relocation_failed).red()
        );
    }
    if summary.faulted > 0 {
        println!("  Errors: {}", style(summary.faulted).red());
    }
    if summary.walk_errors > 0 {
        println!("  Unreadable entries: {}", style(summary.walk_errors).yellow());
    }
    if summary.reconcile.is_some() {
        println!("  Archived missing records: {}", style(summary.archived).dim());
    }
    if summary.relocated > 0 {
        for root in &summary.quarantine_roots {
            if root.exists() {
                println!("  Quarantine: {}", root.display());
            }
        }
    }
    println!("  Elapsed: {}", format_duration(started.elapsed()));
}
