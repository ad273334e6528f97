//! Top-level run orchestration.
//!
//! One `run` call drives the whole pipeline: locate and parse the ledger,
//! (in update mode) re-derive the live import set and refresh versions,
//! expand transitive declarations, materialize the vendor tree, and (in
//! normal mode) prune unused code and write the lock snapshot. Every
//! fallible step propagates errors here; only `main` decides to exit.

use crate::conf::{Conf, Dep, LEDGER_FILES};
use crate::imports::{self, Scan};
use crate::{cache, resolve, transitive, vendor};
use anyhow::{Context, Result, bail};
use colored::*;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// Parsed command-line options, already defaulted.
pub struct Options {
    pub file: String,
    pub directory: String,
    pub target: String,
    pub keep: bool,
    pub update: bool,
    pub insecure: bool,
    pub cache: PathBuf,
    pub include_vendor: bool,
}

/// Directories and toggles threaded through every operation. There is no
/// implicit working directory: concurrent tasks each resolve paths against
/// these roots explicitly.
pub struct Ctx {
    pub project_dir: PathBuf,
    pub vendor_dir: PathBuf,
    /// Vendor directory name relative to the project root.
    pub target: String,
    pub cache_root: PathBuf,
    pub insecure: bool,
    pub keep: bool,
}

impl Ctx {
    /// Root under which cached repositories live, keyed by package path.
    pub fn lib_root(&self) -> PathBuf {
        self.cache_root.join("src")
    }

    /// Cache slot of one package.
    pub fn repo_dir(&self, package: &str) -> PathBuf {
        self.lib_root().join(package)
    }
}

pub fn run(opts: Options) -> Result<()> {
    let project_dir = fs::canonicalize(&opts.directory)
        .with_context(|| format!("cannot resolve project directory '{}'", opts.directory))?;
    let cache_root = std::path::absolute(&opts.cache)
        .with_context(|| format!("cannot resolve cache directory '{}'", opts.cache.display()))?;
    debug!("project: {}, cache: {}", project_dir.display(), cache_root.display());

    let ctx = Ctx {
        vendor_dir: project_dir.join(&opts.target),
        project_dir,
        target: opts.target.clone(),
        cache_root,
        insecure: opts.insecure,
        keep: opts.keep,
    };

    let conf_path = locate_ledger(&ctx.project_dir, &opts.file, opts.update)?;
    println!("{} Reading ledger: '{}'", "📖".blue(), conf_path.display());
    let mut conf = if conf_path.exists() {
        Conf::load(&conf_path)?
    } else {
        Conf::default()
    };

    if opts.update {
        update(&ctx, &mut conf)?;
        conf.save(&conf_path)?;
    }

    let extra = transitive::expand(&ctx, &conf, opts.update)?;
    conf.merge(extra);

    vendor::materialize(&ctx, &conf, opts.update)?;

    if !opts.update {
        vendor::place_staging(&ctx, &conf)?;
    }

    if opts.keep {
        if !opts.include_vendor {
            vendor::prune_nested_vendor(&ctx);
        }
        return Ok(());
    }
    if opts.update {
        return Ok(());
    }

    if conf.package.is_empty() {
        bail!(
            "the ledger must declare the root package (`package = \"...\"`) before cleanup"
        );
    }
    let scan = Scan {
        root_package: &conf.package,
        project_dir: &ctx.project_dir,
        lib_root: &ctx.vendor_dir,
        target: &ctx.target,
    };
    let imports = imports::collect_imports(&scan);
    vendor::cleanup(&ctx, &conf, &imports)
}

/// Probe for the ledger document: the explicit `--file` first, then the
/// recognized fallback names. In update mode a missing ledger is created;
/// otherwise it is a configuration error.
fn locate_ledger(project_dir: &Path, file: &str, update: bool) -> Result<PathBuf> {
    let mut candidates = vec![file];
    candidates.extend(LEDGER_FILES.iter().copied().filter(|name| *name != file));
    for candidate in &candidates {
        let path = project_dir.join(candidate);
        if path.exists() {
            return Ok(path);
        }
    }
    if update {
        println!("{} '{}' not found, creating a new one!", "!".yellow(), file);
        return Ok(project_dir.join(file));
    }
    bail!(
        "no ledger file found in {} (looked for: {})",
        project_dir.display(),
        candidates.join(", ")
    );
}

/// Update mode: grow the import set to its fixed point (fetching newly
/// referenced packages as they appear), then rebuild the entry list from
/// the live set, preserving the flags of packages already declared and
/// refreshing every unlocked version to the latest.
fn update(ctx: &Ctx, conf: &mut Conf) -> Result<()> {
    if conf.package.is_empty() {
        bail!("the ledger must declare the root package (`package = \"...\"`) before update");
    }
    let root_package = conf.package.clone();
    fs::create_dir_all(ctx.lib_root()).with_context(|| {
        format!("failed to create cache directory {}", ctx.lib_root().display())
    })?;

    let lib_root = ctx.lib_root();
    let scan = Scan {
        root_package: &root_package,
        project_dir: &ctx.project_dir,
        lib_root: &lib_root,
        target: &ctx.target,
    };

    // Outer fixed point: fetching a package can surface imports that only
    // exist once its source is present in the cache.
    let mut collected = imports::collect_imports(&scan);
    let mut previous_len = 0;
    while collected.len() > previous_len {
        previous_len = collected.len();
        for pkg in &collected {
            if is_self_reference(&root_package, pkg) {
                continue;
            }
            let mut dep = conf
                .get(pkg)
                .cloned()
                .unwrap_or_else(|| Dep {
                    package: pkg.clone(),
                    ..Default::default()
                });
            dep.version = "master".to_string();
            cache::ensure_cached(ctx, &dep)?;
            resolve::checkout(ctx, &dep)?;
        }
        collected = imports::collect_imports(&scan);
    }

    let previous = conf.clone();
    conf.imports.clear();
    for pkg in &collected {
        if is_self_reference(&root_package, pkg) {
            continue;
        }
        // Several import paths can live in one repository; the entry is
        // keyed by the repository's top-level package.
        let top = cache::toplevel_package(ctx, pkg)?;
        let mut dep = previous.get(&top).cloned().unwrap_or_else(|| Dep {
            package: top.clone(),
            ..Default::default()
        });
        if !dep.lock {
            dep.version = resolve::latest_version(&ctx.repo_dir(&top))?;
        }
        conf.imports.push(dep);
    }
    let removed = conf.dedupe();
    debug!("update collapsed {} duplicate entries", removed);
    Ok(())
}

fn is_self_reference(root_package: &str, package: &str) -> bool {
    package == root_package || package.starts_with(&format!("{}/", root_package))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_ledger_prefers_explicit_file() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("custom.toml"), "").unwrap();
        fs::write(tmp.path().join("vendor.toml"), "").unwrap();

        let found = locate_ledger(tmp.path(), "custom.toml", false).unwrap();
        assert_eq!(found, tmp.path().join("custom.toml"));
    }

    #[test]
    fn test_locate_ledger_falls_back_to_recognized_names() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("vendrs.toml"), "").unwrap();

        let found = locate_ledger(tmp.path(), "vendor.toml", false).unwrap();
        assert_eq!(found, tmp.path().join("vendrs.toml"));
    }

    #[test]
    fn test_locate_ledger_missing_is_an_error_outside_update() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(locate_ledger(tmp.path(), "vendor.toml", false).is_err());
        let created = locate_ledger(tmp.path(), "vendor.toml", true).unwrap();
        assert_eq!(created, tmp.path().join("vendor.toml"));
    }

    #[test]
    fn test_is_self_reference() {
        assert!(is_self_reference("a.io/me/proj", "a.io/me/proj"));
        assert!(is_self_reference("a.io/me/proj", "a.io/me/proj/sub"));
        assert!(!is_self_reference("a.io/me/proj", "a.io/me/project"));
        assert!(!is_self_reference("a.io/me/proj", "b.io/dep/lib"));
    }
}
