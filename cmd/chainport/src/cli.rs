use std::{
    io::IsTerminal,
    path::{Path, PathBuf},
};

use clap::{Parser as ClapParser, Subcommand as ClapSubcommand};
use eyre::{Result, WrapErr};
use tracing::Level;
use tracing_subscriber::{EnvFilter, filter::Directive};

use chainport_migration::{MigrationConfig, MigrationReport, REPORT_FILENAME, run};

#[allow(clippy::upper_case_acronyms)]
#[derive(ClapParser)]
#[command(name = "chainport", about = "Ledger migration tools")]
pub struct CLI {
    #[command(subcommand)]
    pub command: Subcommand,
}

#[derive(ClapSubcommand)]
pub enum Subcommand {
    #[command(
        name = "migrate",
        visible_alias = "m",
        about = "Migrate a legacy ledger snapshot into a target chain store and validate the result"
    )]
    Migrate {
        #[arg(long = "source")]
        /// Path to the legacy snapshot directory
        source_dir: PathBuf,
        #[arg(long = "target")]
        /// Path to the target chain store directory
        target_dir: PathBuf,
        #[arg(long = "backup", default_value = "./backups")]
        /// Root directory for timestamped snapshot backups
        backup_root: PathBuf,
        #[arg(long = "no-validate", default_value_t = false)]
        /// Skip post-migration validation
        no_validate: bool,
        #[arg(long = "skip-backup", default_value_t = false)]
        /// Skip the snapshot backup (recorded as a warning in the report)
        skip_backup: bool,
        #[arg(long = "yes", short = 'y', default_value_t = false)]
        /// Proceed without a backup if the backup stage fails
        assume_yes: bool,
        #[arg(long = "json", default_value_t = false)]
        /// Emit the migration report as JSON on stdout
        json: bool,
        #[arg(long = "log.level", default_value_t = Level::INFO, env = "CHAINPORT_LOG_LEVEL")]
        /// Log level (error, warn, info, debug, trace)
        log_level: Level,
    },
}

impl Subcommand {
    pub fn json_output(&self) -> bool {
        match self {
            Self::Migrate { json, .. } => *json,
        }
    }

    pub fn run(&self) -> Result<MigrationReport> {
        match self {
            Self::Migrate {
                source_dir,
                target_dir,
                backup_root,
                no_validate,
                skip_backup,
                assume_yes,
                json,
                log_level,
            } => {
                init_tracing(*log_level);

                let config = MigrationConfig {
                    snapshot_dir: source_dir.clone(),
                    target_dir: target_dir.clone(),
                    backup_root: backup_root.clone(),
                    validate: !*no_validate,
                    skip_backup: *skip_backup,
                    assume_yes: *assume_yes,
                };

                let report = run(&config).wrap_err("Cannot complete migration run")?;
                emit_report(&report, *json, target_dir)?;
                Ok(report)
            }
        }
    }
}

/// Printed when the run itself fails, before a report could be persisted.
pub fn emit_error(json: bool, error: &eyre::Report) {
    if json {
        let payload = serde_json::json!({
            "status": "failed",
            "error": format!("{error:#}"),
        });
        println!("{payload}");
        return;
    }
    eprintln!("Migration failed: {error:#}");
}

/// Logs go to stderr so `--json` keeps stdout machine-readable.
fn init_tracing(log_level: Level) {
    let filter = EnvFilter::builder()
        .with_default_directive(Directive::from(log_level))
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn emit_report(report: &MigrationReport, json: bool, target_dir: &Path) -> Result<()> {
    if json {
        let encoded =
            serde_json::to_string(report).wrap_err("Cannot serialize migration report")?;
        println!("{encoded}");
        return Ok(());
    }

    println!("Migration finished in {} ms", report.duration_ms);
    println!("  validators migrated:    {}", report.validators_migrated);
    println!(
        "  blocks migrated:        {} ({} transaction(s))",
        report.blocks_migrated, report.transactions_migrated
    );
    println!("  state entries migrated: {}", report.state_entries_migrated);
    for warning in &report.warnings {
        println!("  warning: {warning}");
    }
    for error in &report.errors {
        println!("  error: {error}");
    }
    println!(
        "{}",
        if report.validation_passed {
            "Validation passed."
        } else {
            "Validation FAILED."
        }
    );
    println!(
        "Report saved to {}",
        target_dir.join(REPORT_FILENAME).display()
    );
    Ok(())
}
