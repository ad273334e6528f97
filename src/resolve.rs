//! Revision checkout and latest-version resolution.
//!
//! `checkout` makes a cache repository's working tree match a dependency's
//! pin, with a refreshed-fetch retry and a `master` fallback to the newest
//! reachable commit. `latest_version` picks the highest semantic-version
//! tag, or the current revision when no tag parses.

use crate::cache::remote_name;
use crate::conf::Dep;
use crate::git;
use crate::run::Ctx;
use anyhow::{Context, Result};
use colored::*;
use log::{debug, warn};
use semver::Version;
use std::path::Path;

/// Check out `dep.version` (branch, tag, or commit) in the cache slot,
/// detached and forced. Exhausting the fallback ladder is an error: the
/// requested revision is unattainable and no correct vendor tree exists.
pub fn checkout(ctx: &Ctx, dep: &Dep) -> Result<()> {
    let repo_dir = ctx.repo_dir(&dep.package);
    println!(
        "{} Checking out '{}', commit: '{}'",
        "📌".blue(),
        dep.package,
        dep.version
    );

    let remote = remote_name(dep.repo.as_deref());
    let branch_ref = format!("{}/{}", remote, dep.version);
    let mut target = dep.version.clone();
    if dep.version == "master" || git::remote_branch_exists(&repo_dir, &branch_ref) {
        target = branch_ref;
        git::fetch(&repo_dir, &remote)
            .with_context(|| format!("fetch from '{}' failed for '{}'", remote, dep.package))?;
    }

    if let Err(err) = git::checkout_detached(&repo_dir, &target) {
        debug!("checkout of '{}' failed: {}", target, err);
        if dep.version == "master" {
            println!(
                "{} Failed to check out 'master' for '{}': using the latest commit instead",
                "!".yellow(),
                dep.package
            );
            target = git::newest_commit_any_ref(&repo_dir)
                .with_context(|| format!("no fallback commit for '{}'", dep.package))?;
        } else {
            git::fetch(&repo_dir, &remote)
                .with_context(|| format!("fetch from '{}' failed for '{}'", remote, dep.package))?;
        }
        debug!("retrying checkout of '{}'", target);
        git::checkout_detached(&repo_dir, &target).with_context(|| {
            format!(
                "cannot check out revision '{}' of '{}'",
                dep.version, dep.package
            )
        })?;
    }
    Ok(())
}

/// Latest revision for an unpinned entry: the highest semantic-version tag
/// after a forced tag fetch, falling back to the current revision when the
/// repository has no parseable version tags. Never an error on "no tags".
pub fn latest_version(repo_dir: &Path) -> Result<String> {
    if let Err(err) = git::fetch_tags(repo_dir) {
        warn!("tag fetch in {} failed: {}", repo_dir.display(), err);
    }
    let tags = git::tags(repo_dir)?;
    match pick_latest(&tags) {
        Some(tag) => Ok(tag),
        None => git::current_revision(repo_dir),
    }
}

/// Highest tag by semantic-version precedence. Tags that do not parse are
/// ignored; the returned string is the tag's original literal text.
fn pick_latest(tags: &[String]) -> Option<String> {
    let mut versions: Vec<(Version, &str)> = tags
        .iter()
        .filter_map(|tag| {
            let literal = tag.trim();
            Version::parse(literal.trim_start_matches('v'))
                .ok()
                .map(|parsed| (parsed, literal))
        })
        .collect();
    versions.sort_by(|a, b| a.0.cmp(&b.0));
    versions.pop().map(|(_, literal)| literal.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pick_latest_ignores_invalid_tags() {
        let result = pick_latest(&tags(&["v1.0.0", "v1.2.0", "v1.1.0", "not-a-version"]));
        assert_eq!(result.as_deref(), Some("v1.2.0"));
    }

    #[test]
    fn test_pick_latest_keeps_original_literal() {
        let result = pick_latest(&tags(&["2.0.0", "v1.9.9"]));
        assert_eq!(result.as_deref(), Some("2.0.0"));
    }

    #[test]
    fn test_pick_latest_orders_prereleases_below_releases() {
        let result = pick_latest(&tags(&["v1.2.0-rc.1", "v1.2.0", "v1.2.0-alpha"]));
        assert_eq!(result.as_deref(), Some("v1.2.0"));
    }

    #[test]
    fn test_pick_latest_none_without_parseable_tags() {
        assert_eq!(pick_latest(&tags(&[])), None);
        assert_eq!(pick_latest(&tags(&["release", "stable"])), None);
    }
}
