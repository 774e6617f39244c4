//! Every workspace member must inherit the workspace version.

use std::path::{Path, PathBuf};

fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(2)
        .unwrap()
        .to_path_buf()
}

fn read_manifest(dir: &Path) -> toml::Value {
    let text = std::fs::read_to_string(dir.join("Cargo.toml"))
        .unwrap_or_else(|e| panic!("cannot read {}: {e}", dir.join("Cargo.toml").display()));
    text.parse().unwrap()
}

fn members() -> Vec<String> {
    read_manifest(&workspace_root())["workspace"]["members"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m.as_str().unwrap().to_string())
        .collect()
}

#[test]
fn members_inherit_workspace_version() {
    let members = members();
    assert!(members.iter().any(|m| m == "crates/model-resolver"));

    for member in &members {
        let manifest = read_manifest(&workspace_root().join(member));
        let inherits = manifest["package"]["version"]
            .get("workspace")
            .and_then(|v| v.as_bool());
        assert_eq!(
            inherits,
            Some(true),
            "{member} should use version.workspace = true"
        );
    }
}

#[test]
fn compiled_version_is_workspace_version() {
    let root = read_manifest(&workspace_root());
    assert_eq!(
        root["workspace"]["package"]["version"].as_str(),
        Some(env!("CARGO_PKG_VERSION"))
    );
}
