// Volume discovery and file identities come from /proc and stat.
#[cfg(unix)]
mod cli;

#[cfg(not(unix))]
fn main() -> anyhow::Result<()> {
    anyhow::bail!("dupvault needs a Unix mount table and file identities")
}

#[cfg(unix)]
fn main() -> anyhow::Result<()> {
    use anyhow::Context;
    use clap::Parser;
    use dupvault_lib::Config;

    let cli = cli::Cli::parse();

    let level = if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    let config = Config::new(cli.db.clone(), cli.config.clone())?;
    let mut db = cli::init_database(&config)
        .with_context(|| format!("Failed to open store at {}", config.db_path.display()))?;

    match cli.command {
        cli::Commands::Scan(args) => {
            cli::scan::handle_scan_command(&mut db, &config, args, cli.quiet)?
        }

        cli::Commands::Volumes => cli::volumes::handle_volumes_command(&mut db, cli.quiet)?,

        cli::Commands::Clean {
            root,
            quarantine,
            copy,
        } => cli::clean::handle_clean_command(&mut db, &config, &root, quarantine, copy, cli.quiet)?,

        cli::Commands::Status => cli::status::handle_status_command(&db, &config)?,

        cli::Commands::History { limit } => cli::history::handle_history_command(&db, limit)?,

        cli::Commands::Export { output } => cli::export::handle_export_command(&db, output)?,
    }

    Ok(())
}
