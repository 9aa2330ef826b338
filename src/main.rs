use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use periodic_backup::config::{self, Config};
use periodic_backup::destinations::Destination;
use periodic_backup::managers::backup::{BackupError, BackupExecutor, BackupPlan, BackupReport};
use periodic_backup::managers::host::CliHost;
use periodic_backup::managers::logging::{init_console_logging, init_logging, LoggingConfig};
use periodic_backup::managers::restore::RestoreExecutor;
use periodic_backup::managers::scheduler::{CronSchedule, ManualTrigger, Scheduler};
use periodic_backup::manifest::BackupManifest;
use periodic_backup::utils::locker::RunLock;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "periodic-backup")]
#[command(about = "Scheduled backup and restore of a directory tree", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "periodic-backup.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one backup now
    Run,

    /// List the backups available in each destination
    List {
        /// Only list this destination
        #[arg(short, long)]
        destination: Option<String>,
    },

    /// Restore the root directory from a backup
    Restore {
        /// Destination to restore from
        #[arg(short, long)]
        destination: Option<String>,

        /// Backup to restore, e.g. backup_2026_10_19_08_00_00 (interactive if not specified)
        #[arg(short, long)]
        timestamp: Option<String>,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Validate configuration file
    Validate,

    /// Check that every destination is reachable
    Check,

    /// Ask a running daemon to back up at its next tick
    Trigger,

    /// Run backups on the configured schedule until stopped
    Daemon,

    /// Print a stored manifest file (no configuration needed)
    Show {
        /// Path to a `.manifest` file
        manifest: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Commands that don't require a config file - use simple console logging
    if let Some(Commands::Show { ref manifest }) = cli.command {
        init_console_logging();
        return show_manifest(manifest);
    }

    let config = config::load_config(&cli.config)
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;

    // Setup logging with file rotation (must keep guard alive)
    let _log_guard = init_logging(&LoggingConfig::from_global(&config.global))?;

    let host = Arc::new(CliHost::new(config.global.reload_command.clone()));

    // If no command specified, list backups
    let command = cli.command.unwrap_or(Commands::List { destination: None });

    match command {
        Commands::Run => {
            let mut lock = RunLock::open(&config.global.temp_directory)?;
            let _held = lock.try_hold()?;

            let plan = BackupPlan::from_config(&config)?;
            let executor = BackupExecutor::new(host);

            println!("Running backup of {:?}...", config.global.root);
            let report = executor.run_backup(&plan)?;
            print_report(&report);

            if !report.all_succeeded() {
                std::process::exit(1);
            }
        }

        Commands::List { destination } => {
            for (name, dest) in selected_destinations(&config, destination.as_deref())? {
                println!("=== {} ===", name);
                match dest.available_backups() {
                    Ok(backups) if backups.is_empty() => println!("  (no backups)"),
                    Ok(backups) => {
                        for backup in backups.iter().rev() {
                            println!("  {}  {}", backup.file_name_base(), backup);
                        }
                    }
                    Err(e) => eprintln!("  ✗ Could not list backups: {:#}", e),
                }
                println!();
            }
        }

        Commands::Restore { destination, timestamp, yes } => {
            use dialoguer::{Confirm, Select};

            let names: Vec<&String> = config.destinations.keys().collect();
            let dest_name = if let Some(ref d) = destination {
                if !config.destinations.contains_key(d) {
                    eprintln!("Error: Destination '{}' is not configured", d);
                    eprintln!(
                        "Available destinations: {}",
                        names.iter().map(|n| n.as_str()).collect::<Vec<_>>().join(", ")
                    );
                    std::process::exit(1);
                }
                d.clone()
            } else if names.len() == 1 {
                names[0].clone()
            } else {
                println!("Multiple destinations available. Select one:");
                let selection = Select::new().items(&names).default(0).interact()?;
                names[selection].clone()
            };

            let dest = config.destinations[&dest_name].build()?;
            let backups = dest.available_backups()?;
            if backups.is_empty() {
                eprintln!("No backups found in '{}'", dest_name);
                std::process::exit(1);
            }

            let manifest = if let Some(ref t) = timestamp {
                match find_backup(&backups, t) {
                    Some(m) => m.clone(),
                    None => {
                        eprintln!("Backup '{}' not found in '{}'", t, dest_name);
                        std::process::exit(1);
                    }
                }
            } else {
                let items: Vec<String> = backups.iter().map(|b| b.to_string()).collect();
                let selection = Select::new()
                    .with_prompt("Select backup to restore")
                    .items(&items)
                    .default(items.len() - 1) // Default to most recent
                    .interact()?;
                backups[selection].clone()
            };

            println!("\nSelected backup: {}", manifest);
            println!("Restore will replace the contents of {:?}!\n", config.global.root);

            if !yes {
                let confirm = Confirm::new()
                    .with_prompt("Do you want to proceed with the restore?")
                    .default(false)
                    .interact()?;
                if !confirm {
                    println!("Restore cancelled.");
                    std::process::exit(0);
                }
            }

            let mut lock = RunLock::open(&config.global.temp_directory)?;
            let _held = lock.try_hold()?;

            let temp_dir = config.global.temp_directory.join("restore");
            std::fs::create_dir_all(&temp_dir)
                .with_context(|| format!("Failed to create {:?}", temp_dir))?;

            println!("Starting restore...\n");
            let selector = config.selector().build()?;
            let handle = RestoreExecutor::new(selector, host)
                .with_protected_paths(config.protected_paths())
                .spawn(manifest, temp_dir)?;
            let result = handle
                .join()
                .map_err(|_| anyhow::anyhow!("Restore thread panicked"))?;

            match result {
                Ok(report) => match report.replaced {
                    Some(stats) => println!(
                        "\n✓ Restore completed: {} files restored, {} failed",
                        stats.copied, stats.failed
                    ),
                    None => {
                        eprintln!("\n✗ Nothing could be extracted; root left untouched");
                        std::process::exit(1);
                    }
                },
                Err(e) => {
                    eprintln!("\n✗ Restore failed: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Commands::Validate => {
            // load_config already validated everything
            println!("✓ Configuration is valid");
            println!("  Root: {:?}", config.global.root);
            println!("  Archiver: {:?}", config.archiver);
            println!("  Destinations: {}", config.destinations.len());

            let schedule = CronSchedule::parse(&config.global.cron)?;
            match schedule.next_after(&Local::now()) {
                Some(next) => println!("  Next backup: {}", next.format("%Y-%m-%d %H:%M")),
                None => println!("  Next backup: never within a year"),
            }
        }

        Commands::Check => {
            let mut failures = 0;
            for (name, dest) in selected_destinations(&config, None)? {
                if !dest.is_enabled() {
                    println!("- {}: disabled", name);
                    continue;
                }
                match dest.check_connectivity() {
                    Ok(()) => println!("✓ {}: reachable", name),
                    Err(e) => {
                        println!("✗ {}: {:#}", name, e);
                        failures += 1;
                    }
                }
            }
            if failures > 0 {
                std::process::exit(1);
            }
        }

        Commands::Trigger => {
            ManualTrigger::new(&config.global.temp_directory).fire()?;
            println!("✓ Backup requested; the daemon will start it within a minute");
        }

        Commands::Daemon => run_daemon(&config, host)?,

        Commands::Show { .. } => unreachable!("handled before loading the configuration"),
    }

    Ok(())
}

/// Configured destinations, optionally only the one named
fn selected_destinations(
    config: &Config,
    only: Option<&str>,
) -> Result<Vec<(String, Box<dyn Destination>)>> {
    if let Some(name) = only {
        if !config.destinations.contains_key(name) {
            anyhow::bail!("Destination '{}' is not configured", name);
        }
    }

    config
        .destinations
        .iter()
        .filter(|(name, _)| only.map_or(true, |o| o == name.as_str()))
        .map(|(name, dest)| -> Result<(String, Box<dyn Destination>)> {
            Ok((name.clone(), dest.build()?))
        })
        .collect()
}

/// Match a backup by its full marker or by the timestamp part alone
fn find_backup<'a>(backups: &'a [BackupManifest], wanted: &str) -> Option<&'a BackupManifest> {
    let wanted = wanted.trim_end_matches(".manifest");
    backups
        .iter()
        .find(|b| b.file_name_base() == wanted || b.file_name_base().ends_with(wanted))
}

fn show_manifest(path: &std::path::Path) -> Result<()> {
    let manifest = BackupManifest::from_file(path)?;
    println!("{}", manifest);
    println!("  Marker: {}", manifest.file_name_base());
    println!("  Root: {:?}", manifest.selector().root);
    if let Some(ref includes) = manifest.selector().includes {
        println!("  Includes: {}", includes);
    }
    if let Some(ref excludes) = manifest.selector().excludes {
        println!("  Excludes: {}", excludes);
    }
    println!("  Archiver: {:?}", manifest.archiver());
    Ok(())
}

fn print_report(report: &BackupReport) {
    println!(
        "Backup {}: {} files ({} skipped), {} blob(s)",
        report.timestamp.format("%Y-%m-%d %H:%M:%S UTC"),
        report.files_selected,
        report.files_skipped,
        report.blobs.len()
    );
    for dest in &report.destinations {
        match (&dest.outcome, &dest.error) {
            (_, Some(e)) => println!("  ✗ {}: {}", dest.name, e),
            (Some(periodic_backup::StoreOutcome::Skipped(reason)), None) => {
                println!("  - {}: skipped ({})", dest.name, reason)
            }
            _ => println!("  ✓ {}: stored, {} expired backup(s) removed", dest.name, dest.evicted),
        }
    }
}

fn run_daemon(config: &Config, host: Arc<CliHost>) -> Result<()> {
    let schedule = CronSchedule::parse(&config.global.cron)?;
    let trigger = ManualTrigger::new(&config.global.temp_directory);
    let mut scheduler = Scheduler::new(schedule, Some(trigger));
    let plan = BackupPlan::from_config(config)?;
    let executor = BackupExecutor::new(host);
    let mut lock = RunLock::open(&config.global.temp_directory)?;

    info!("Daemon started with schedule '{}'", scheduler.schedule());

    loop {
        let now = Local::now();
        if scheduler.should_run(&now) {
            match lock.try_hold() {
                Ok(_held) => match executor.run_backup(&plan) {
                    Ok(report) if report.all_succeeded() => {
                        info!("Scheduled backup finished")
                    }
                    Ok(_) => warn!("Scheduled backup finished with destination errors"),
                    Err(BackupError::AlreadyInProgress) => warn!("Backup already running, skipping"),
                    Err(e) => error!("Scheduled backup failed: {}", e),
                },
                Err(e) => warn!("Skipping scheduled backup: {:#}", e),
            }
        }

        // Wake at the start of the next minute
        let elapsed = u64::from(chrono::Timelike::second(&Local::now()));
        std::thread::sleep(Duration::from_secs(60 - elapsed.min(59)));
    }
}
