//! Legacy manifest adapter.
//!
//! Older packages declare their dependencies in a JSON manifest under
//! `Godeps/`. This adapter translates that format into ledger-shaped
//! (name, reference, repository) triples. A missing manifest is an empty
//! list; a malformed one that does exist is an error.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

const LEGACY_MANIFEST: &str = "Godeps/Godeps.json";

#[derive(Debug, Deserialize)]
struct LegacyManifest {
    #[serde(rename = "Deps", default)]
    deps: Vec<LegacyDep>,
}

#[derive(Debug, Deserialize)]
struct LegacyDep {
    #[serde(rename = "ImportPath")]
    import_path: String,
    #[serde(rename = "Rev", default)]
    rev: String,
    #[serde(rename = "Comment", default)]
    comment: String,
    #[serde(rename = "Repository", default)]
    repository: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LegacyEntry {
    pub name: String,
    pub reference: String,
    pub repository: Option<String>,
}

pub fn parse(repo_dir: &Path) -> Result<Vec<LegacyEntry>> {
    let path = repo_dir.join(LEGACY_MANIFEST);
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(&path)
        .with_context(|| format!("failed to read legacy manifest {}", path.display()))?;
    let manifest: LegacyManifest = serde_json::from_str(&content)
        .with_context(|| format!("malformed legacy manifest {}", path.display()))?;
    Ok(manifest
        .deps
        .into_iter()
        .map(|dep| {
            // The revision pins the dependency; the comment is only a
            // human-readable tag carried when no revision is recorded.
            let reference = if dep.rev.is_empty() { dep.comment } else { dep.rev };
            LegacyEntry {
                name: dep.import_path,
                reference,
                repository: dep.repository,
            }
        })
        .collect())
}
