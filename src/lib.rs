//! Agora installer library — manifest integrity and brownfield upgrades.
//!
//! Exposes modules for integration testing; the `agora` binary is a thin
//! wrapper over [`cli::Cli`].

#![cfg_attr(test, allow(clippy::expect_used))]

pub mod cli;
pub mod commands;
pub mod domain;
pub mod infra;
pub mod installer;
pub mod output;
