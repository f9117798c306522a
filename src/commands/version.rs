//! `agora version` — show the installer version.

use anyhow::Result;

/// Run `agora version`.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn run(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    if json {
        println!(
            "{}",
            serde_json::to_string(&serde_json::json!({
                "name": "agora",
                "version": version,
            }))?
        );
    } else {
        println!("agora {version}");
    }
    Ok(())
}
