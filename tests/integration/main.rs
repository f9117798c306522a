//! Integration tests for the agora CLI.
//!
//! These spawn the actual binary and test end-to-end behavior. They are
//! slower and should be run separately from unit tests.

mod validate_command;
