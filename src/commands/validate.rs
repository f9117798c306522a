//! `agora validate` — post-install integrity check of an installed tree.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use crate::domain::report::ValidationStatus;
use crate::installer::validator::{PostInstallValidator, ValidatorOptions};
use crate::output::OutputContext;

/// Arguments for the validate command.
#[derive(Args)]
pub struct ValidateArgs {
    /// Installed tree to validate (contains .agora-core/)
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Quick mode: compare file sizes instead of content hashes
    #[arg(long)]
    pub quick: bool,

    /// Tolerate a missing manifest signature (development installs only)
    #[arg(long)]
    pub allow_unsigned: bool,
}

/// Run `agora validate`.
///
/// # Errors
///
/// Returns an error when validation ends in `failed` status, so the process
/// exits non-zero.
pub fn run(args: &ValidateArgs, ctx: &OutputContext, json: bool) -> Result<()> {
    let options = ValidatorOptions {
        require_signature: !args.allow_unsigned,
        verify_hashes: !args.quick,
    };
    let mut validator = PostInstallValidator::new(&args.dir, None, options);
    let report = validator.validate();

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        ctx.print_validation_report(&report);
    }

    anyhow::ensure!(
        report.status != ValidationStatus::Failed,
        "validation failed with {} issue(s)",
        report.issues.len()
    );
    Ok(())
}
