//! Property-based tests for hashing and manifest-entry validation.
//!
//! Uses `proptest` to verify invariants across many random inputs.

#![allow(clippy::expect_used)]

use std::path::Path;

use proptest::prelude::*;

use agora_installer::domain::manifest::validate_manifest_entry;
use agora_installer::domain::paths::is_path_contained;
use agora_installer::infra::hasher::{hash_str, hashes_match};

proptest! {
    /// CRLF and LF renditions of the same lines always hash identically.
    #[test]
    fn prop_line_ending_convention_never_changes_hash(
        lines in proptest::collection::vec("[a-zA-Z0-9 .:#-]{0,40}", 0..20),
    ) {
        let lf = lines.join("\n");
        let crlf = lines.join("\r\n");
        prop_assert_eq!(hash_str(&lf), hash_str(&crlf));
    }

    /// A leading BOM never changes the hash.
    #[test]
    fn prop_leading_bom_never_changes_hash(content in "[a-zA-Z0-9 \n]{0,200}") {
        let with_bom = format!("\u{feff}{content}");
        prop_assert_eq!(hash_str(&content), hash_str(&with_bom));
    }

    /// Hash comparison ignores ASCII case on either side.
    #[test]
    fn prop_hashes_match_is_case_insensitive(hex in "[0-9a-f]{64}") {
        let upper = hex.to_uppercase();
        prop_assert!(hashes_match(Some(&hex), Some(&upper)));
        let prefixed = format!("sha256:{hex}");
        prop_assert!(hashes_match(Some(&prefixed), Some(&upper)));
    }

    /// Any entry whose path carries a `..` segment is rejected.
    #[test]
    fn prop_traversal_paths_are_rejected(
        prefix in "[a-z]{0,8}",
        suffix in "[a-z]{1,8}",
    ) {
        let path = if prefix.is_empty() {
            format!("../{suffix}")
        } else {
            format!("{prefix}/../{suffix}")
        };
        let value: serde_yaml::Value =
            serde_yaml::from_str(&format!("path: \"{path}\"")).expect("yaml");
        prop_assert!(validate_manifest_entry(&value, 0).is_err());
    }

    /// Any unknown field name is rejected, whatever it is called.
    #[test]
    fn prop_unknown_fields_are_rejected(field in "[a-z_]{1,12}") {
        prop_assume!(!matches!(field.as_str(), "path" | "hash" | "size" | "type"));
        let value: serde_yaml::Value =
            serde_yaml::from_str(&format!("path: ok.md\n{field}: x")).expect("yaml");
        let err = validate_manifest_entry(&value, 0).expect_err("unknown field");
        prop_assert!(err.to_string().contains("unknown field"));
    }

    /// Well-formed relative paths always resolve inside the root.
    #[test]
    fn prop_clean_relative_paths_stay_contained(
        segments in proptest::collection::vec("[a-z0-9]{1,10}", 1..6),
    ) {
        let root = Path::new("/install/root");
        let resolved = root.join(segments.join("/"));
        prop_assert!(is_path_contained(&resolved, root));
    }

    /// Valid entries survive validation with their path normalized.
    #[test]
    fn prop_valid_entries_round_trip(
        name in "[a-z][a-z0-9]{0,12}",
        size in 0u64..1_000_000,
    ) {
        let value: serde_yaml::Value = serde_yaml::from_str(
            &format!("path: agents/{name}.md\nsize: {size}\ntype: agent"),
        ).expect("yaml");
        let entry = validate_manifest_entry(&value, 0).expect("valid entry");
        prop_assert_eq!(entry.path, format!("agents/{name}.md"));
        prop_assert_eq!(entry.size, Some(size));
    }
}

#[test]
fn test_absent_hashes_never_match_anything() {
    assert!(!hashes_match(None, None));
    assert!(!hashes_match(Some("sha256:abc"), None));
    assert!(!hashes_match(None, Some("sha256:abc")));
}
