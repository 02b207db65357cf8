#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Project policy tests for Radix Room Client.
//!
//! These verify that `Cargo.toml` and the library sources keep the panic-free
//! policy and the feature layout consumers depend on. All checks are
//! synchronous filesystem reads.

use std::path::{Path, PathBuf};

/// Returns the project root directory (where Cargo.toml lives).
fn project_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// Reads a file relative to the project root and returns its contents.
fn read_project_file(relative_path: &str) -> String {
    let path = project_root().join(relative_path);
    std::fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read '{}': {e}", path.display()))
}

/// Every `.rs` file under `dir`, recursively.
fn rust_sources(dir: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            files.extend(rust_sources(&path));
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            files.push(path);
        }
    }
    files
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: panic_policy
// ─────────────────────────────────────────────────────────────────────────────

mod panic_policy {
    use super::*;

    const REQUIRED_DENY_LINTS: &[&str] = &[
        "unwrap_used",
        "expect_used",
        "panic",
        "todo",
        "unimplemented",
        "indexing_slicing",
    ];

    #[test]
    fn cargo_toml_has_all_panic_free_lints() {
        let cargo = read_project_file("Cargo.toml");
        assert!(
            cargo.contains("[lints.clippy]"),
            "Cargo.toml is missing the [lints.clippy] section."
        );
        for lint in REQUIRED_DENY_LINTS {
            let pattern = format!("{lint} = \"deny\"");
            assert!(
                cargo.contains(&pattern),
                "Cargo.toml is missing `{pattern}` in [lints.clippy]."
            );
        }
    }

    /// Test modules opt out of the deny lints explicitly, right after
    /// `#[cfg(test)]`, so the opt-out never leaks into library code.
    #[test]
    fn test_modules_carry_explicit_allow() {
        for path in rust_sources(&project_root().join("src")) {
            let source = std::fs::read_to_string(&path).unwrap();
            let lines: Vec<&str> = source.lines().collect();
            for (i, line) in lines.iter().enumerate() {
                if line.trim() == "#[cfg(test)]" {
                    let next = lines.get(i + 1).map(|l| l.trim()).unwrap_or_default();
                    assert!(
                        next.starts_with("#[allow("),
                        "{}:{} has #[cfg(test)] without a following #[allow(...)]",
                        path.display(),
                        i + 1
                    );
                }
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Module: feature_policy
// ─────────────────────────────────────────────────────────────────────────────

mod feature_policy {
    use super::*;

    #[test]
    fn websocket_transport_is_default() {
        let cargo = read_project_file("Cargo.toml");
        assert!(
            cargo.contains("default = [\"transport-websocket\"]"),
            "The WebSocket transport must stay a default feature."
        );
    }

    #[test]
    fn http_authorizer_is_opt_in() {
        let cargo = read_project_file("Cargo.toml");
        assert!(cargo.contains("authorizer-http = [\"dep:reqwest\"]"));
        assert!(
            cargo.contains("reqwest = { version = \"0.12\", optional = true"),
            "reqwest must remain optional so transport-only users do not pull in an HTTP stack."
        );
    }
}
