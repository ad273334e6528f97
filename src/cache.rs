//! Shared repository cache.
//!
//! One clone per unique package path, under `<cache root>/src/<package>`.
//! `ensure_cached` repairs whatever it finds in the slot: a missing or
//! corrupted slot is recreated, an explicit repo URL becomes an additional
//! remote so several logical packages can share one physical repository.

use crate::conf::Dep;
use crate::git;
use crate::run::Ctx;
use anyhow::{Context, Result};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use log::debug;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Remote alias for a dependency's URL: `origin` for the default remote, a
/// short stable hash otherwise. Hashing keeps aliases collision-resistant
/// for practical remote counts while staying scannable in `git remote`.
pub fn remote_name(url: Option<&str>) -> String {
    match url {
        None | Some("") => "origin".to_string(),
        Some(url) => {
            let digest = Sha256::digest(url.as_bytes());
            format!("{:x}", digest)[..7].to_string()
        }
    }
}

/// Repository root for a package path: the first three segments
/// (`host/owner/repo`), or the whole path when shorter.
pub fn repo_root(package: &str) -> String {
    package.split('/').take(3).collect::<Vec<_>>().join("/")
}

/// Make sure a usable clone of the dependency exists in its cache slot.
pub fn ensure_cached(ctx: &Ctx, dep: &Dep) -> Result<()> {
    let repo_dir = ctx.repo_dir(&dep.package);
    debug!("ensure_cached '{}' at {}", dep.package, repo_dir.display());

    if !repo_dir.exists() || !is_cache_repo(ctx, &repo_dir) {
        return recreate_slot(ctx, dep, &repo_dir);
    }

    if let Some(url) = dep.repo.as_deref() {
        let name = remote_name(Some(url));
        if !git::remote_exists(&repo_dir, &name) {
            git::add_remote(&repo_dir, &name, url);
        }
    } else if !git::remote_exists(&repo_dir, "origin") {
        // Leftover content with no usable remote: wipe and start over.
        return recreate_slot(ctx, dep, &repo_dir);
    }
    Ok(())
}

/// Map an import path to the package of its repository's top-level
/// directory, relative to the cache's `src` root.
pub fn toplevel_package(ctx: &Ctx, package: &str) -> Result<String> {
    let repo_dir = ctx.repo_dir(package);
    let top = git::toplevel(&repo_dir)?;
    let top = top.canonicalize().unwrap_or(top);
    let lib_root = ctx.lib_root();
    let lib_root = lib_root.canonicalize().unwrap_or(lib_root);
    let rel = top.strip_prefix(&lib_root).with_context(|| {
        format!(
            "repository for '{}' resolves outside the cache: {}",
            package,
            top.display()
        )
    })?;
    Ok(rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/"))
}

fn is_cache_repo(ctx: &Ctx, dir: &Path) -> bool {
    match git::toplevel(dir) {
        Ok(top) => {
            let top = top.canonicalize().unwrap_or(top);
            let lib_root = ctx.lib_root();
            top.starts_with(lib_root.canonicalize().unwrap_or(lib_root))
        }
        Err(err) => {
            debug!("{} is not a cache repository: {}", dir.display(), err);
            false
        }
    }
}

/// Wipe and rebuild a cache slot. Inability to remove or create the slot is
/// a hard error: caching is foundational and cannot be partially completed.
fn recreate_slot(ctx: &Ctx, dep: &Dep, repo_dir: &Path) -> Result<()> {
    println!("{} Preparing cache for '{}'", "📦".blue(), dep.package);
    if repo_dir.exists() {
        fs::remove_dir_all(repo_dir)
            .with_context(|| format!("failed to clear cache slot {}", repo_dir.display()))?;
    }

    auto_fetch(ctx, &dep.package);

    fs::create_dir_all(repo_dir)
        .with_context(|| format!("failed to create cache slot {}", repo_dir.display()))?;
    if !is_cache_repo(ctx, repo_dir) {
        // Some packages are only reachable through an explicit repo URL;
        // start from an empty repository and let fetch do the rest.
        debug!("{} is not a repository, initializing one", repo_dir.display());
        if let Err(err) = git::init(repo_dir) {
            debug!("git init in {} failed: {}", repo_dir.display(), err);
        }
    }
    if let Some(url) = dep.repo.as_deref() {
        git::add_remote(repo_dir, &remote_name(Some(url)), url);
    }
    Ok(())
}

/// Best-effort automatic resolution of a package path to its repository:
/// derive the default clone URL from the path and try it. Failure is logged
/// and ignored; the caller proceeds with a manually initialized repository.
fn auto_fetch(ctx: &Ctx, package: &str) {
    let root = repo_root(package);
    let dest = ctx.lib_root().join(&root);
    if dest.exists() {
        return;
    }

    let scheme = if ctx.insecure { "http" } else { "https" };
    let url = format!("{}://{}", scheme, root);

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⣾⣽⣻⢿⡿⣟⣯⣷"),
    );
    pb.set_message(format!("Downloading {}...", root));
    pb.enable_steady_tick(Duration::from_millis(100));

    match git::clone(&url, &dest) {
        Ok(()) => pb.finish_with_message(format!("{} Downloaded {}", "✓".green(), root)),
        Err(err) => {
            pb.finish_with_message(format!(
                "{} No automatic source for {}",
                "!".yellow(),
                root
            ));
            debug!("automatic fetch from {} failed: {}", url, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_name_defaults_to_origin() {
        assert_eq!(remote_name(None), "origin");
        assert_eq!(remote_name(Some("")), "origin");
    }

    #[test]
    fn test_remote_name_is_short_stable_and_distinct() {
        let a = remote_name(Some("https://example.com/a.git"));
        let b = remote_name(Some("https://example.com/b.git"));
        assert_eq!(a.len(), 7);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(a, remote_name(Some("https://example.com/a.git")));
        assert_ne!(a, b);
    }

    #[test]
    fn test_repo_root_takes_three_segments() {
        assert_eq!(
            repo_root("github.com/user/repo/sub/pkg"),
            "github.com/user/repo"
        );
        assert_eq!(repo_root("github.com/user/repo"), "github.com/user/repo");
        assert_eq!(repo_root("gopkg.in/yaml.v2"), "gopkg.in/yaml.v2");
    }
}
