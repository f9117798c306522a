//! `agora repair` — restore missing or corrupted files from a trusted
//! source tree.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::installer::validator::{PostInstallValidator, ValidatorOptions};
use crate::output::OutputContext;

/// Arguments for the repair command.
#[derive(Args)]
pub struct RepairArgs {
    /// Installed tree to repair (contains .agora-core/)
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Trusted source tree to copy verified replacements from
    #[arg(long)]
    pub source: PathBuf,

    /// Tolerate a missing manifest signature (development installs only)
    #[arg(long)]
    pub allow_unsigned: bool,
}

/// Run `agora repair`.
///
/// Repair always runs in full (hash-verifying) mode; each replacement is
/// hashed against the manifest before it is copied.
///
/// # Errors
///
/// Returns an error when repair is refused (missing trust prerequisites) or
/// any attempt failed.
pub fn run(args: &RepairArgs, ctx: &OutputContext) -> Result<()> {
    let options = ValidatorOptions {
        require_signature: !args.allow_unsigned,
        verify_hashes: true,
    };
    let mut validator =
        PostInstallValidator::new(&args.dir, Some(args.source.clone()), options);

    let before = validator.validate();
    if before.is_clean() {
        ctx.success("Nothing to repair");
        return Ok(());
    }
    ctx.info(&format!(
        "{} missing, {} corrupted",
        before.stats.missing_files, before.stats.corrupted_files
    ));

    let report = validator.repair()?;
    for path in &report.repaired {
        ctx.success(&format!("Repaired {path}"));
    }
    for failure in &report.failed {
        ctx.error(&format!("{}: {}", failure.path, failure.reason));
    }

    anyhow::ensure!(
        report.success,
        "{} file(s) could not be repaired",
        report.failed.len()
    );
    ctx.success(&format!("Repaired {} file(s)", report.repaired.len()));
    Ok(())
}
