//! Transitive dependency expansion.
//!
//! Entries flagged `transitive` carry their own dependency declarations:
//! either a legacy manifest or a nested ledger file inside the fetched
//! repository. Expansion walks an explicit worklist with a seen-set keyed
//! by package path, so cycles terminate and stack depth stays flat no
//! matter how deep the nesting goes.

use crate::conf::{Conf, Dep, LEDGER_FILES};
use crate::run::Ctx;
use crate::{cache, legacy, resolve, vendor};
use anyhow::{Result, bail};
use colored::*;
use log::debug;
use std::collections::{HashSet, VecDeque};
use std::path::Path;

/// Discover dependencies declared inside fetched packages and return them
/// as ledger-shaped entries. The caller folds them in with `Conf::merge`,
/// so entries already present in the ledger always win.
pub fn expand(ctx: &Ctx, conf: &Conf, update: bool) -> Result<Vec<Dep>> {
    if !conf.imports.iter().any(|dep| dep.transitive) {
        return Ok(Vec::new());
    }
    // The checkouts have to exist before their manifests can be read.
    vendor::materialize(ctx, conf, update)?;

    let mut extra: Vec<Dep> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut queue: VecDeque<Dep> = conf
        .imports
        .iter()
        .filter(|dep| dep.transitive)
        .cloned()
        .collect();

    while let Some(dep) = queue.pop_front() {
        if !seen.insert(dep.package.clone()) {
            println!(
                "{} Already searched transitive dep {}. Skipping",
                "!".yellow(),
                dep.package
            );
            continue;
        }
        if update && dep.lock {
            continue;
        }

        let repo_dir = ctx.repo_dir(&dep.package);
        if !repo_dir.exists() {
            // Nested entries surfaced mid-expansion have not been fetched yet.
            if dep.version.is_empty() {
                bail!("version not specified for package '{}'", dep.package);
            }
            cache::ensure_cached(ctx, &dep)?;
            resolve::checkout(ctx, &dep)?;
        }

        let nested = legacy::parse(&repo_dir)?;
        if !nested.is_empty() {
            debug!(
                "'{}' declares {} legacy dependencies",
                dep.package,
                nested.len()
            );
            extra.extend(nested.into_iter().map(|entry| Dep {
                package: entry.name,
                version: entry.reference,
                repo: entry.repository,
                ..Default::default()
            }));
            continue;
        }

        if let Some(nested_conf) = nested_ledger(&repo_dir)? {
            debug!(
                "'{}' carries a nested ledger with {} entries",
                dep.package,
                nested_conf.imports.len()
            );
            for nested_dep in &nested_conf.imports {
                if nested_dep.transitive {
                    queue.push_back(nested_dep.clone());
                }
            }
            extra.extend(nested_conf.imports);
        }
    }
    Ok(extra)
}

/// First recognized ledger file inside a fetched repository, if any.
fn nested_ledger(repo_dir: &Path) -> Result<Option<Conf>> {
    for name in LEDGER_FILES {
        let path = repo_dir.join(name);
        if path.exists() {
            return Conf::load(&path).map(Some);
        }
    }
    Ok(None)
}
