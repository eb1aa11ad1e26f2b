//! Migration orchestrator.
//!
//! Runs the stages in a fixed order (backup, validators, blocks, state,
//! validation), folding each stage's outcome into one report. Stage
//! failures are accumulated, never fatal: whatever happens, the run ends
//! by writing the report into the target directory, and the report's
//! `validation_passed` flag is the run's single success signal.

use std::{
    fs,
    io::IsTerminal,
    path::{Path, PathBuf},
    time::Instant,
};

use chainport_storage::Store;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    adapter::{StateMode, TargetAdapter},
    backup::backup_snapshot,
    error::MigrationError,
    reader::SnapshotReader,
    reconcile::{CheckOutcome, Reconciler},
};

pub const REPORT_FILENAME: &str = "migration_report.json";

#[derive(Debug, Clone)]
pub struct MigrationConfig {
    pub snapshot_dir: PathBuf,
    pub target_dir: PathBuf,
    pub backup_root: PathBuf,
    /// Reconcile source and target after migrating.
    pub validate: bool,
    /// Skip the backup stage entirely (recorded as a warning).
    pub skip_backup: bool,
    /// Proceed without a backup if the backup stage fails, instead of
    /// prompting (interactive) or aborting (non-interactive).
    pub assume_yes: bool,
}

/// The durable record of one migration run, written to
/// `<target>/migration_report.json` whatever the outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub validators_migrated: u64,
    pub blocks_migrated: u64,
    pub transactions_migrated: u64,
    pub state_entries_migrated: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub validation_passed: bool,
}

#[derive(Debug, Default)]
struct RunAccumulator {
    validators: u64,
    blocks: u64,
    transactions: u64,
    state_entries: u64,
    errors: Vec<String>,
    warnings: Vec<String>,
}

/// Executes a full migration run and returns the written report.
///
/// The only error this returns is a failure to persist the report itself;
/// every other failure is folded into the report.
pub fn run(config: &MigrationConfig) -> Result<MigrationReport, MigrationError> {
    let started_at = Utc::now();
    let clock = Instant::now();
    let mut acc = RunAccumulator::default();

    info!(
        source = %config.snapshot_dir.display(),
        target = %config.target_dir.display(),
        "Starting ledger migration"
    );

    let reader = SnapshotReader::new(&config.snapshot_dir);
    let mut validation_passed = false;

    if run_backup_stage(config, &reader, &mut acc) {
        match Store::open(&config.target_dir) {
            Ok(mut store) => {
                warn_if_target_populated(&store, &mut acc);
                let state_mode = run_migration_stages(&reader, &mut store, &mut acc);
                validation_passed = run_validation_stage(config, &reader, &store, state_mode, &mut acc);
            }
            Err(store_error) => {
                let message = format!("Cannot open target store: {store_error}");
                error!("{message}");
                acc.errors.push(message);
            }
        }
    }

    let finished_at = Utc::now();
    let report = MigrationReport {
        started_at,
        finished_at,
        duration_ms: clock.elapsed().as_millis() as u64,
        validators_migrated: acc.validators,
        blocks_migrated: acc.blocks,
        transactions_migrated: acc.transactions,
        state_entries_migrated: acc.state_entries,
        errors: acc.errors,
        warnings: acc.warnings,
        validation_passed,
    };

    let report_path = write_report(&report, &config.target_dir)?;
    info!(report = %report_path.display(), passed = report.validation_passed, "Migration run finished");
    Ok(report)
}

/// Returns whether the run may proceed to write into the target.
fn run_backup_stage(
    config: &MigrationConfig,
    reader: &SnapshotReader,
    acc: &mut RunAccumulator,
) -> bool {
    if config.skip_backup {
        let message = "Backup skipped by operator request".to_owned();
        warn!("{message}");
        acc.warnings.push(message);
        return true;
    }

    info!(backup_root = %config.backup_root.display(), "Backing up snapshot");
    match backup_snapshot(reader.snapshot_dir(), &config.backup_root) {
        Ok(backup_dir) => {
            info!(backup = %backup_dir.display(), "Snapshot backed up");
            true
        }
        Err(backup_error) => {
            let message = format!("Backup failed: {backup_error}");
            error!("{message}");
            acc.errors.push(message);

            if config.assume_yes {
                acc.warnings
                    .push("Proceeding without a backup (acknowledged up front)".to_owned());
                return true;
            }
            if confirm_on_terminal() {
                acc.warnings
                    .push("Proceeding without a backup (operator confirmed)".to_owned());
                return true;
            }
            acc.errors.push(
                "Migration aborted before any target write: the snapshot was not backed up \
                 and proceeding was not acknowledged"
                    .to_owned(),
            );
            false
        }
    }
}

/// Blocking decision point: prompts when a terminal is attached, refuses
/// otherwise.
fn confirm_on_terminal() -> bool {
    if !std::io::stdin().is_terminal() {
        return false;
    }
    eprint!("Backup failed. Continue without a backup? [y/N] ");
    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return false;
    }
    matches!(line.trim(), "y" | "Y" | "yes")
}

fn warn_if_target_populated(store: &Store, acc: &mut RunAccumulator) {
    let extra_blocks = store.height().saturating_sub(1);
    let validators = store.validators().len();
    if extra_blocks > 0 || validators > 0 {
        let message = format!(
            "Target already contains {extra_blocks} block(s) beyond genesis and \
             {validators} validator(s); re-running a migration against it may duplicate data"
        );
        warn!("{message}");
        acc.warnings.push(message);
    }
}

/// Runs the three migration stages in dependency order. Each stage runs
/// to completion regardless of what the previous one recorded.
fn run_migration_stages(
    reader: &SnapshotReader,
    store: &mut Store,
    acc: &mut RunAccumulator,
) -> Option<StateMode> {
    let mut adapter = match TargetAdapter::open(store) {
        Ok(adapter) => adapter,
        Err(adapter_error) => {
            let message = format!("Cannot open target adapter: {adapter_error}");
            error!("{message}");
            acc.errors.push(message);
            return None;
        }
    };
    let state_mode = adapter.state_mode();

    match reader.read_validators() {
        Ok(records) => {
            info!(count = records.len(), "Migrating validators");
            let outcome = adapter.migrate_validators(&records);
            acc.validators = outcome.migrated;
            acc.errors.extend(outcome.errors);
            acc.warnings.extend(outcome.warnings);
        }
        Err(snapshot_error) => {
            acc.errors
                .push(format!("Cannot read validators from snapshot: {snapshot_error}"));
        }
    }

    match reader.read_blocks() {
        Ok(records) => {
            info!(count = records.len(), "Migrating blocks");
            let outcome = adapter.migrate_blocks(records);
            acc.blocks = outcome.blocks;
            acc.transactions = outcome.transactions;
            acc.warnings.extend(outcome.warnings);
        }
        Err(snapshot_error) => {
            acc.errors
                .push(format!("Cannot read blocks from snapshot: {snapshot_error}"));
        }
    }

    match reader.read_state() {
        Ok(state) => {
            info!(keys = state.len(), "Migrating state");
            match adapter.migrate_state(&state) {
                Ok(outcome) => {
                    acc.state_entries = outcome.migrated;
                    acc.errors.extend(outcome.errors);
                    acc.warnings.extend(outcome.warnings);
                }
                Err(state_error) => {
                    let message = format!("State migration failed: {state_error}");
                    error!("{message}");
                    acc.errors.push(message);
                }
            }
        }
        Err(snapshot_error) => {
            acc.errors
                .push(format!("Cannot read state from snapshot: {snapshot_error}"));
        }
    }

    Some(state_mode)
}

fn run_validation_stage(
    config: &MigrationConfig,
    reader: &SnapshotReader,
    store: &Store,
    state_mode: Option<StateMode>,
    acc: &mut RunAccumulator,
) -> bool {
    if !config.validate {
        let message =
            "Validation skipped by configuration; migrated data was not reconciled".to_owned();
        warn!("{message}");
        acc.warnings.push(message);
        return true;
    }

    info!("Validating migrated data");
    let reconciler = Reconciler::new(reader, store);
    let mut passed = absorb_check("Block", reconciler.check_blocks(), acc);
    passed &= absorb_check("Validator", reconciler.check_validators(), acc);
    passed &= absorb_check("State", reconciler.check_state(), acc);

    if state_mode == Some(StateMode::Staged) {
        acc.warnings.push(
            "State was validated against the staged artifact only; the target's live state \
             was never exercised"
                .to_owned(),
        );
    }
    passed
}

fn absorb_check(
    label: &str,
    result: Result<CheckOutcome, crate::error::SnapshotError>,
    acc: &mut RunAccumulator,
) -> bool {
    match result {
        Ok(outcome) if outcome.passed => {
            info!("{label} validation passed");
            true
        }
        Ok(outcome) => {
            warn!(errors = outcome.errors.len(), "{label} validation failed");
            acc.errors.extend(outcome.errors);
            false
        }
        Err(snapshot_error) => {
            let message = format!("{label} validation could not run: {snapshot_error}");
            error!("{message}");
            acc.errors.push(message);
            false
        }
    }
}

fn write_report(report: &MigrationReport, target_dir: &Path) -> Result<PathBuf, MigrationError> {
    fs::create_dir_all(target_dir).map_err(|source| MigrationError::ReportWrite {
        path: target_dir.to_path_buf(),
        source,
    })?;
    let path = target_dir.join(REPORT_FILENAME);
    let encoded =
        serde_json::to_string_pretty(report).map_err(MigrationError::ReportEncode)?;
    fs::write(&path, encoded).map_err(|source| MigrationError::ReportWrite { path: path.clone(), source })?;
    Ok(path)
}
