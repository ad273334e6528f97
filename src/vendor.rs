//! Vendor tree synchronization and pruning.
//!
//! `materialize` turns checked-out cache slots into the vendor directory:
//! moved in update mode (the cache slot is relocated), copied otherwise.
//! `cleanup` then deletes everything the live import graph does not use:
//! excluded paths first, then unused source files and packages (keeping
//! ancestors of used paths), then directories left empty, iterated to a
//! fixed point. Each walk computes its deletions first and applies them
//! after, so nothing is removed out from under an ongoing traversal.

use crate::conf::{Conf, LOCK_FILE};
use crate::imports::parent_packages;
use crate::run::Ctx;
use crate::{cache, resolve};
use anyhow::{Context, Result, bail};
use colored::*;
use log::{debug, warn};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Fetch, check out, and place every ledger entry under the vendor
/// directory. Locked entries are skipped in update mode.
pub fn materialize(ctx: &Ctx, conf: &Conf, update: bool) -> Result<()> {
    for dep in &conf.imports {
        if dep.version.is_empty() {
            bail!("version not specified for package '{}'", dep.package);
        }
    }

    fs::create_dir_all(ctx.lib_root()).with_context(|| {
        format!("failed to create cache directory {}", ctx.lib_root().display())
    })?;

    for dep in &conf.imports {
        if update && dep.lock {
            continue;
        }
        cache::ensure_cached(ctx, dep)?;
        resolve::checkout(ctx, dep)?;
    }

    if update {
        println!("{} Moving deps...", "📦".blue());
        for dep in &conf.imports {
            if dep.lock {
                continue;
            }
            move_into_vendor(ctx, &dep.package)?;
        }
        println!("{} Moving deps... Done", "✓".green());
    } else {
        if ctx.vendor_dir.exists() {
            fs::remove_dir_all(&ctx.vendor_dir).with_context(|| {
                format!("failed to clear vendor directory {}", ctx.vendor_dir.display())
            })?;
        }
        fs::create_dir_all(&ctx.vendor_dir)?;

        println!("{} Copying deps...", "📦".blue());
        for dep in &conf.imports {
            let source = ctx.repo_dir(&dep.package);
            let target = ctx.vendor_dir.join(&dep.package);
            copy_dir_all(&source, &target).with_context(|| {
                format!("failed to copy '{}' into the vendor tree", dep.package)
            })?;
        }
        println!("{} Copying deps... Done", "✓".green());
    }

    if !ctx.keep {
        strip_vcs_dirs(&ctx.vendor_dir);
    }
    Ok(())
}

/// Hoist staged source trees into place: a `staging` entry's real code
/// lives under `staging/src/<parent>` inside its repository, not at the
/// repository root.
pub fn place_staging(ctx: &Ctx, conf: &Conf) -> Result<()> {
    for dep in &conf.imports {
        if !dep.staging {
            continue;
        }
        let parent = match dep.package.rsplit_once('/') {
            Some((parent, _)) => parent,
            None => continue,
        };
        let base = ctx
            .repo_dir(&dep.package)
            .join("staging")
            .join("src")
            .join(parent);
        let target = ctx.vendor_dir.join(parent);
        fs::create_dir_all(&target)?;

        let entries = fs::read_dir(&base).with_context(|| {
            format!(
                "staged source of '{}' missing at {}",
                dep.package,
                base.display()
            )
        })?;
        for entry in entries {
            let entry = entry?;
            let dest = target.join(entry.file_name());
            if entry.file_type()?.is_dir() {
                copy_dir_all(&entry.path(), &dest)?;
            } else {
                fs::copy(entry.path(), &dest)?;
            }
        }
    }
    Ok(())
}

/// Prune the vendor tree against the live import set, then write the lock
/// snapshot. Per-path removal failures are logged and cleanup continues:
/// the pass is idempotent and re-run safe.
pub fn cleanup(ctx: &Ctx, conf: &Conf, imports: &BTreeSet<String>) -> Result<()> {
    remove_excludes(&ctx.vendor_dir, &conf.excludes);

    let mut used = imports.clone();
    for pkg in &conf.packages {
        println!("{} Must include package {}", "ℹ".blue(), pkg);
        used.insert(pkg.clone());
    }
    remove_unused(&ctx.vendor_dir, &used);

    let keep: BTreeSet<String> = conf.packages.iter().cloned().collect();
    remove_empty_dirs(&ctx.vendor_dir, &keep);

    write_lock(ctx, conf)
}

/// With `--keep` and without `--include-vendor`: drop vendor directories
/// nested inside vendored dependencies.
pub fn prune_nested_vendor(ctx: &Ctx) {
    let mut doomed = Vec::new();
    let mut walker = WalkDir::new(&ctx.vendor_dir).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let Ok(entry) = entry else { continue };
        if entry.file_type().is_dir() && entry.file_name().to_string_lossy() == ctx.target {
            doomed.push(entry.path().to_path_buf());
            walker.skip_current_dir();
        }
    }
    for path in doomed {
        println!("{} Removing {}", "🗑️".red(), path.display());
        if let Err(err) = fs::remove_dir_all(&path) {
            println!("{} Error removing '{}': {}", "x".red(), path.display(), err);
        }
    }
}

// Simple recursive copy
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        if ty.is_dir() {
            copy_dir_all(&entry.path(), &dst.join(entry.file_name()))?;
        } else {
            fs::copy(entry.path(), dst.join(entry.file_name()))?;
        }
    }
    Ok(())
}

fn move_into_vendor(ctx: &Ctx, package: &str) -> Result<()> {
    let source = ctx.repo_dir(package);
    let target = ctx.vendor_dir.join(package);
    if target.exists() {
        fs::remove_dir_all(&target)
            .with_context(|| format!("failed to clear {}", target.display()))?;
    }
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    println!("{} Moving {} into the vendor tree", "📦".blue(), package);
    // Rename fails across filesystems; fall back to copy + delete.
    if fs::rename(&source, &target).is_err() {
        copy_dir_all(&source, &target)
            .with_context(|| format!("failed to move '{}' into the vendor tree", package))?;
        fs::remove_dir_all(&source)
            .with_context(|| format!("failed to clear cache slot {}", source.display()))?;
    }
    Ok(())
}

/// Delete every directory of version-control metadata under `root`.
fn strip_vcs_dirs(root: &Path) {
    let mut doomed = Vec::new();
    let mut walker = WalkDir::new(root).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let Ok(entry) = entry else { continue };
        if entry.file_type().is_dir() && entry.file_name().to_string_lossy() == ".git" {
            doomed.push(entry.path().to_path_buf());
            walker.skip_current_dir();
        }
    }
    for path in doomed {
        debug!("removing '{}'", path.display());
        if let Err(err) = fs::remove_dir_all(&path) {
            println!("{} Error stripping '{}': {}", "x".red(), path.display(), err);
        }
    }
}

fn remove_excludes(vendor_dir: &Path, excludes: &[String]) {
    if excludes.is_empty() {
        return;
    }
    let excluded: BTreeSet<&str> = excludes.iter().map(String::as_str).collect();

    let mut doomed = Vec::new();
    let mut walker = WalkDir::new(vendor_dir).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable path during exclude pass: {}", err);
                continue;
            }
        };
        let Some(rel) = rel_package(vendor_dir, entry.path()) else {
            continue;
        };
        if excluded.contains(rel.as_str()) {
            doomed.push(entry.path().to_path_buf());
            if entry.file_type().is_dir() {
                walker.skip_current_dir();
            }
        }
    }
    for path in doomed {
        println!("{} Removing excluded path: '{}'", "🗑️".red(), path.display());
        if let Err(err) = remove_path(&path) {
            println!("{} Error removing '{}': {}", "x".red(), path.display(), err);
        }
    }
}

/// Remove vendored code the import graph does not reach.
///
/// A directory survives if its package path is used or is an ancestor of a
/// used path (intermediate packages may have no direct references but must
/// exist for the path to resolve). Test files are never vendored for use
/// and are removed outright; other source files survive only in used
/// packages.
fn remove_unused(vendor_dir: &Path, used: &BTreeSet<String>) {
    let mut retained = BTreeSet::new();
    for pkg in used {
        retained.extend(parent_packages("", pkg));
    }

    let mut doomed_dirs = Vec::new();
    let mut doomed_files = Vec::new();
    let mut walker = WalkDir::new(vendor_dir).min_depth(1).into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("skipping unreadable path during unused pass: {}", err);
                continue;
            }
        };
        let Some(rel) = rel_package(vendor_dir, entry.path()) else {
            continue;
        };

        if entry.file_type().is_dir() {
            if !used.contains(&rel) && !retained.contains(&rel) {
                doomed_dirs.push(entry.path().to_path_buf());
                walker.skip_current_dir();
            }
            continue;
        }

        let name = entry.file_name().to_string_lossy();
        let pkg = match rel.rsplit_once('/') {
            Some((pkg, _)) => pkg.to_string(),
            None => String::new(),
        };
        if name.ends_with("_test.go") || (name.ends_with(".go") && !used.contains(&pkg)) {
            doomed_files.push(entry.path().to_path_buf());
        }
    }

    for path in doomed_files {
        debug!("removing unused source file '{}'", path.display());
        if let Err(err) = fs::remove_file(&path) {
            println!("{} Error removing file '{}': {}", "x".red(), path.display(), err);
        }
    }
    for path in doomed_dirs {
        println!("{} Removing unused dir: '{}'", "🗑️".red(), path.display());
        if let Err(err) = fs::remove_dir_all(&path) {
            println!("{} Error removing dir '{}': {}", "x".red(), path.display(), err);
        }
    }
}

/// Directories become empty only as a side effect of file removal, so this
/// iterates until a full pass removes nothing. Keep-list paths survive even
/// when physically empty.
fn remove_empty_dirs(vendor_dir: &Path, keep: &BTreeSet<String>) {
    loop {
        let mut empties = Vec::new();
        for entry in WalkDir::new(vendor_dir).min_depth(1).into_iter().flatten() {
            if !entry.file_type().is_dir() {
                continue;
            }
            let Some(rel) = rel_package(vendor_dir, entry.path()) else {
                continue;
            };
            if keep.contains(&rel) {
                continue;
            }
            if dir_is_empty(entry.path()) {
                empties.push(entry.path().to_path_buf());
            }
        }

        let mut removed = 0;
        for path in empties {
            if fs::remove_dir(&path).is_ok() {
                println!("{} Removed empty dir: '{}'", "🗑️".red(), path.display());
                removed += 1;
            }
        }
        if removed == 0 {
            return;
        }
    }
}

fn write_lock(ctx: &Ctx, conf: &Conf) -> Result<()> {
    let mut lock = Conf::default();
    lock.package = conf.package.clone();
    lock.excludes = conf.excludes.clone();
    for dep in &conf.imports {
        if ctx.vendor_dir.join(&dep.package).exists() {
            lock.imports.push(dep.clone());
        } else {
            println!(
                "{} Package '{}' was completely removed: it's probably unused",
                "!".yellow(),
                dep.package
            );
        }
    }
    let lock_path = ctx.project_dir.join(LOCK_FILE);
    lock.save(&lock_path)?;
    println!("{} Wrote {}", "✓".green(), lock_path.display());
    Ok(())
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

fn dir_is_empty(path: &Path) -> bool {
    fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(false)
}

/// Vendor-relative package path with forward slashes.
fn rel_package(vendor_dir: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(vendor_dir).ok()?;
    if rel.as_os_str().is_empty() {
        return None;
    }
    Some(
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn touch(path: &PathBuf) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "package x\n").unwrap();
    }

    #[test]
    fn test_remove_unused_retains_ancestors() {
        let tmp = tempfile::tempdir().unwrap();
        let vendor = tmp.path().to_path_buf();
        touch(&vendor.join("a/b/c/c.go"));
        touch(&vendor.join("a/d/d.go"));

        let used: BTreeSet<String> = ["a/b/c".to_string()].into_iter().collect();
        remove_unused(&vendor, &used);

        assert!(vendor.join("a").is_dir());
        assert!(vendor.join("a/b").is_dir());
        assert!(vendor.join("a/b/c/c.go").exists());
        // Unrelated sibling with no references is gone.
        assert!(!vendor.join("a/d").exists());
    }

    #[test]
    fn test_remove_unused_drops_test_files_everywhere() {
        let tmp = tempfile::tempdir().unwrap();
        let vendor = tmp.path().to_path_buf();
        touch(&vendor.join("a/b/b.go"));
        touch(&vendor.join("a/b/b_test.go"));

        let used: BTreeSet<String> = ["a/b".to_string()].into_iter().collect();
        remove_unused(&vendor, &used);

        assert!(vendor.join("a/b/b.go").exists());
        assert!(!vendor.join("a/b/b_test.go").exists());
    }

    #[test]
    fn test_remove_unused_keeps_non_source_files_in_ancestors() {
        let tmp = tempfile::tempdir().unwrap();
        let vendor = tmp.path().to_path_buf();
        touch(&vendor.join("a/b/c/c.go"));
        fs::write(vendor.join("a/b/LICENSE"), "license text\n").unwrap();
        touch(&vendor.join("a/b/stray.go"));

        let used: BTreeSet<String> = ["a/b/c".to_string()].into_iter().collect();
        remove_unused(&vendor, &used);

        // Ancestor directory survives, its non-source files too; its
        // source files do not, since the package itself is unused.
        assert!(vendor.join("a/b/LICENSE").exists());
        assert!(!vendor.join("a/b/stray.go").exists());
    }

    #[test]
    fn test_remove_empty_dirs_iterates_to_fixed_point() {
        let tmp = tempfile::tempdir().unwrap();
        let vendor = tmp.path().to_path_buf();
        fs::create_dir_all(vendor.join("a/b/c")).unwrap();
        fs::create_dir_all(vendor.join("d")).unwrap();
        touch(&vendor.join("d/d.go"));

        remove_empty_dirs(&vendor, &BTreeSet::new());

        // The whole empty chain collapses, occupied dirs stay.
        assert!(!vendor.join("a").exists());
        assert!(vendor.join("d/d.go").exists());
    }

    #[test]
    fn test_remove_empty_dirs_honors_keep_list() {
        let tmp = tempfile::tempdir().unwrap();
        let vendor = tmp.path().to_path_buf();
        fs::create_dir_all(vendor.join("kept/pkg")).unwrap();

        let keep: BTreeSet<String> = ["kept/pkg".to_string()].into_iter().collect();
        remove_empty_dirs(&vendor, &keep);

        assert!(vendor.join("kept/pkg").is_dir());
    }

    #[test]
    fn test_remove_excludes() {
        let tmp = tempfile::tempdir().unwrap();
        let vendor = tmp.path().to_path_buf();
        touch(&vendor.join("a/b/b.go"));
        touch(&vendor.join("a/testdata/fixture.go"));

        remove_excludes(&vendor, &["a/testdata".to_string()]);

        assert!(vendor.join("a/b/b.go").exists());
        assert!(!vendor.join("a/testdata").exists());
    }

    #[test]
    fn test_copy_dir_all_recurses() {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        touch(&src.join("deep/nested/file.go"));
        let dst = tmp.path().join("dst");

        copy_dir_all(&src, &dst).unwrap();
        assert!(dst.join("deep/nested/file.go").exists());
    }
}
