//! Unit tests for the agora installer library.
//!
//! These exercise the library API directly and run fast without spawning the
//! binary.

mod property_tests;
mod upgrade_flow;
