//! Repair command implementation.

use std::fs;
use std::path::{Path, PathBuf};

use docsync_engine::{Report, ReplicateError, ReplicateOptions, Replicator};
use docsync_storage::{StorageDescription, StorageRegistry};
use serde::Deserialize;
use tracing::info;

use super::snapshot::OpenSnapshots;
use super::{CommandError, OutputFormat};

/// Contents of a repair config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RepairConfig {
    /// The store being kept convergent.
    pub local: StorageDescription,
    /// The store it is reconciled with.
    pub remote: StorageDescription,
    /// Where signatures are kept.
    pub signature: StorageDescription,
    /// Replication options.
    #[serde(default)]
    pub options: ReplicateOptions,
}

impl RepairConfig {
    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self, CommandError> {
        let text = fs::read_to_string(path).map_err(|source| CommandError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| CommandError::Config {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Build the stores of `config`, run one pass and save snapshot stores.
///
/// Relative snapshot paths are resolved against `base`. Snapshot stores are
/// saved whether or not the pass comes out clean.
pub async fn execute(config: RepairConfig, base: &Path) -> Result<Report, CommandError> {
    let snapshots = OpenSnapshots::default();
    let mut registry = StorageRegistry::with_builtin();
    snapshots.register(&mut registry, base);

    let replicator = Replicator::new(
        registry.create(&config.local)?,
        registry.create(&config.remote)?,
        registry.create(&config.signature)?,
        config.options,
    )?;
    let result = replicator.repair().await;

    snapshots.save_all()?;
    info!(stores = snapshots.count(), "snapshots saved");
    result.map_err(CommandError::from)
}

/// Runs the repair command.
pub fn run(config_path: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let format: OutputFormat = format.parse()?;
    let config = RepairConfig::load(config_path)?;
    let base = config_path
        .parent()
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);

    let runtime = tokio::runtime::Runtime::new()?;
    match runtime.block_on(execute(config, &base)) {
        Ok(report) => {
            print_report(&report, format)?;
            Ok(())
        }
        Err(CommandError::Replicate(ReplicateError::Unresolved(failure))) => {
            print_report(failure.report(), format)?;
            Err(format!(
                "repair finished with {} unresolved entries",
                failure.failures().len()
            )
            .into())
        }
        Err(e) => Err(e.into()),
    }
}

fn print_report(report: &Report, format: OutputFormat) -> Result<(), CommandError> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
        OutputFormat::Text => {
            for entry in report.entries() {
                println!("{entry}");
            }
            println!();
            for (code, count) in report.summary() {
                println!("{count:>6}  {code}");
            }
            if report.has_failures() {
                println!("✗ {} unresolved", report.failures().len());
            } else {
                println!("✓ Repair finished cleanly");
            }
        }
    }
    Ok(())
}
