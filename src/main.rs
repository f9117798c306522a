//! Agora installer CLI - signed installs and brownfield upgrades

use clap::Parser;

use agora_installer::cli::Cli;

fn main() {
    let cli = Cli::parse();
    if let Err(e) = cli.run() {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
