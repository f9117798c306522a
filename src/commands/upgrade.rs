//! `agora upgrade` — brownfield upgrade check and application.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::domain::manifest::{
    CORE_DIR, INSTALLED_MANIFEST_NAME, InstalledManifest, MANIFEST_NAME, Manifest,
};
use crate::installer::upgrader::{
    ApplyOptions, apply_upgrade, format_upgrade_report, generate_upgrade_report, load_manifest,
    update_installed_manifest,
};
use crate::infra::signature::{LoadOptions, load_and_verify_manifest};
use crate::output::OutputContext;

/// Upgrade subcommands.
#[derive(Subcommand)]
pub enum UpgradeCommand {
    /// Compute the upgrade plan without changing anything
    Check(CheckArgs),
    /// Apply the upgrade plan
    Apply(ApplyArgs),
}

/// Arguments shared by check and apply.
#[derive(Args)]
pub struct CheckArgs {
    /// Source tree shipping the new framework content
    #[arg(long)]
    pub source: PathBuf,

    /// Installed tree to upgrade (contains .agora-core/)
    #[arg(long, default_value = ".")]
    pub target: PathBuf,

    /// Tolerate a missing source-manifest signature (development only)
    #[arg(long)]
    pub allow_unsigned: bool,
}

/// Arguments for `upgrade apply`.
#[derive(Args)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub check: CheckArgs,

    /// Preview the plan without writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Also install files upstream changed since the last install
    #[arg(long)]
    pub include_modified: bool,
}

/// Run `agora upgrade <check|apply>`.
///
/// # Errors
///
/// Returns an error when a manifest cannot be loaded or the apply step
/// fails.
pub fn run(cmd: UpgradeCommand, ctx: &OutputContext, json: bool) -> Result<()> {
    match cmd {
        UpgradeCommand::Check(args) => check(&args, ctx, json),
        UpgradeCommand::Apply(args) => apply(&args, ctx, json),
    }
}

/// Load the source manifest through the signature loader, then parse it.
fn load_source_manifest(source_dir: &Path, allow_unsigned: bool) -> Result<Manifest> {
    let options = LoadOptions {
        require_signature: !allow_unsigned,
        pinned_key: None,
    };
    let loaded = load_and_verify_manifest(&source_dir.join(MANIFEST_NAME), &options)
        .context("loading source manifest")?;
    serde_yaml::from_slice(&loaded.bytes).context("parsing source manifest")
}

/// Load the installed baseline, or an empty one for a fresh install.
fn load_installed_manifest(target_dir: &Path) -> Result<InstalledManifest> {
    let loaded: Option<InstalledManifest> =
        load_manifest(&target_dir.join(CORE_DIR), INSTALLED_MANIFEST_NAME)?;
    Ok(loaded.unwrap_or_else(|| InstalledManifest {
        installed_version: "0.0.0".to_string(),
        installed_from: None,
        installed_at: None,
        files: Vec::new(),
    }))
}

fn check(args: &CheckArgs, ctx: &OutputContext, json: bool) -> Result<()> {
    let source = load_source_manifest(&args.source, args.allow_unsigned)?;
    let installed = load_installed_manifest(&args.target)?;
    let report = generate_upgrade_report(&source, &installed, &args.target);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if !ctx.quiet {
        print!("{}", format_upgrade_report(&report));
    }
    Ok(())
}

fn apply(args: &ApplyArgs, ctx: &OutputContext, json: bool) -> Result<()> {
    let source = load_source_manifest(&args.check.source, args.check.allow_unsigned)?;
    let installed = load_installed_manifest(&args.check.target)?;
    let report = generate_upgrade_report(&source, &installed, &args.check.target);

    let options = ApplyOptions {
        dry_run: args.dry_run,
        include_modified: args.include_modified,
    };
    let outcome = apply_upgrade(&report, &args.check.source, &args.check.target, &options);

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        for change in &outcome.files_installed {
            ctx.success(&format!("Installed {}", change.path));
        }
        for change in &outcome.files_skipped {
            let reason = change.reason.as_deref().unwrap_or("skipped");
            ctx.info(&format!("Skipped {} ({reason})", change.path));
        }
        if args.dry_run {
            ctx.info(&format!(
                "Dry run: {} file(s) would be installed",
                outcome.files_installed.len()
            ));
        }
    }

    anyhow::ensure!(outcome.success, "upgrade did not complete cleanly");

    if !args.dry_run {
        let installed_from = format!("agora-core@{}", source.version);
        update_installed_manifest(&args.check.target, &source, &installed_from)?;
        ctx.success(&format!("Upgraded to {}", source.version));
    }
    Ok(())
}
