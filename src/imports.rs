//! Static import graph discovery.
//!
//! Walks the project tree for local packages, extracts import references
//! from their sources, and expands to a fixed point: any referenced package
//! that exists locally (project subtree or library root) is scanned too,
//! until an iteration discovers nothing new. Discovery is best-effort; a
//! directory that cannot be read contributes nothing instead of aborting.

use colored::*;
use log::{debug, warn};
use rayon::prelude::*;
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use walkdir::WalkDir;

static PACKAGE_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^package\s+[A-Za-z_][A-Za-z0-9_]*").unwrap());
static IMPORT_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\bimport\s*\(([^)]*)\)").unwrap());
static IMPORT_SINGLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*import\s+(?:[A-Za-z_][A-Za-z0-9_]*\s+|\.\s+|_\s+)?"([^"]+)""#).unwrap()
});
static QUOTED_PATH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#""([^"]+)""#).unwrap());

/// Directories and naming context for one discovery run.
pub struct Scan<'a> {
    /// Import path of the project itself; self-references are excluded.
    pub root_package: &'a str,
    pub project_dir: &'a Path,
    /// Root under which external packages are found (the cache's `src` tree
    /// during update, the vendor directory during cleanup).
    pub lib_root: &'a Path,
    /// Vendor directory name, skipped while walking the project.
    pub target: &'a str,
}

impl Scan<'_> {
    /// Directory a package path resolves to for scanning.
    fn package_dir(&self, pkg: &str) -> PathBuf {
        if pkg == self.root_package {
            self.project_dir.to_path_buf()
        } else if let Some(rel) = pkg.strip_prefix(&format!("{}/", self.root_package)) {
            self.project_dir.join(rel)
        } else {
            self.lib_root.join(pkg)
        }
    }

    fn is_self_reference(&self, pkg: &str) -> bool {
        pkg == self.root_package || pkg.starts_with(&format!("{}/", self.root_package))
    }
}

/// Enumerate local packages: every directory under the project that directly
/// contains a source file with a package clause. The vendor directory and
/// hidden directories are skipped.
pub fn list_packages(scan: &Scan) -> BTreeSet<String> {
    let mut packages = BTreeSet::new();
    let walker = WalkDir::new(scan.project_dir).into_iter().filter_entry(|e| {
        if !e.file_type().is_dir() {
            return true;
        }
        let name = e.file_name().to_string_lossy();
        if e.depth() > 0 && name.starts_with('.') {
            return false;
        }
        e.depth() != 1 || name != scan.target
    });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(err) => {
                warn!("skipping unreadable path while listing packages: {}", err);
                continue;
            }
        };
        if !entry.file_type().is_dir() || !is_source_package(entry.path()) {
            continue;
        }
        if entry.depth() == 0 {
            packages.insert(scan.root_package.to_string());
        } else if let Ok(rel) = entry.path().strip_prefix(scan.project_dir) {
            packages.insert(format!("{}/{}", scan.root_package, slash_path(rel)));
        }
    }
    packages
}

/// Cheap syntactic check: does this directory directly contain a compilable
/// source file? No full parse, just a package clause scan.
fn is_source_package(dir: &Path) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("go") {
            continue;
        }
        if let Ok(content) = fs::read_to_string(&path)
            && PACKAGE_CLAUSE.is_match(&content)
        {
            return true;
        }
    }
    false
}

/// External import references of one package, plus the package itself.
///
/// Single-segment paths with no domain-like separator (standard library),
/// self-references, and anything under the root package are excluded.
/// Relative imports are resolved against the importing package.
pub fn list_imports(scan: &Scan, pkg: &str) -> BTreeSet<String> {
    let mut found = BTreeSet::new();
    found.insert(pkg.to_string());

    let pkg_dir = scan.package_dir(pkg);
    let vendored = !scan.is_self_reference(pkg);
    let entries = match fs::read_dir(&pkg_dir) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("package dir {} not readable: {}", pkg_dir.display(), err);
            return found;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".go") {
            continue;
        }
        // Tests inside vendored code are never compiled against.
        if vendored && name.ends_with("_test.go") {
            continue;
        }
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(err) => {
                warn!("cannot read source file {}: {}", path.display(), err);
                continue;
            }
        };

        for imp in source_imports(&content) {
            if let Some(resolved) = resolve_import(scan, pkg, &imp) {
                found.insert(resolved);
            }
        }
        for dir in interop_includes(&content, &pkg_dir) {
            found.insert(clean_join(pkg, &dir));
        }
    }
    found
}

/// All quoted import paths in a source file, from both single-form imports
/// and import blocks.
fn source_imports(content: &str) -> Vec<String> {
    let mut imports = Vec::new();
    for cap in IMPORT_SINGLE.captures_iter(content) {
        imports.push(cap[1].to_string());
    }
    for block in IMPORT_BLOCK.captures_iter(content) {
        for cap in QUOTED_PATH.captures_iter(&block[1]) {
            imports.push(cap[1].to_string());
        }
    }
    imports
}

fn resolve_import(scan: &Scan, pkg: &str, imp: &str) -> Option<String> {
    let imp = if imp.starts_with("./") || imp.starts_with("../") {
        clean_join(pkg, imp)
    } else {
        imp.to_string()
    };
    let first = imp.split('/').next().unwrap_or("");
    if !first.contains('.') {
        return None;
    }
    if scan.is_self_reference(&imp) {
        return None;
    }
    Some(imp)
}

/// Include directories referenced from foreign-interop preambles.
///
/// A comment block directly above an `import "C"` line may `#include`
/// headers with relative paths; each existing include directory contributes
/// the corresponding package path.
fn interop_includes(content: &str, pkg_dir: &Path) -> Vec<String> {
    let mut dirs = Vec::new();
    let mut preamble: Vec<String> = Vec::new();
    let mut in_block_comment = false;

    for line in content.lines() {
        let trimmed = line.trim();
        if in_block_comment {
            let text = trimmed.trim_end_matches("*/");
            preamble.push(text.to_string());
            if trimmed.ends_with("*/") {
                in_block_comment = false;
            }
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("//") {
            preamble.push(rest.to_string());
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("/*") {
            preamble.push(rest.trim_end_matches("*/").to_string());
            in_block_comment = !trimmed.ends_with("*/");
            continue;
        }
        if trimmed == r#"import "C""# {
            for pline in &preamble {
                let pline = pline.trim();
                let Some(include) = pline
                    .strip_prefix("#include \"")
                    .and_then(|rest| rest.strip_suffix('"'))
                else {
                    continue;
                };
                let dir = match include.rsplit_once('/') {
                    Some((dir, _)) => dir,
                    None => continue,
                };
                if dir != "." && pkg_dir.join(dir).is_dir() {
                    dirs.push(dir.to_string());
                }
            }
        }
        if !trimmed.is_empty() {
            preamble.clear();
        }
    }
    dirs
}

/// Transitive closure of import references, starting from the project's own
/// packages. Each iteration scans all pending packages concurrently, merges
/// the results, then queues any newly referenced package that exists
/// locally. Terminates when the set stops growing: it is monotone and
/// bounded by the reachable import paths.
pub fn collect_imports(scan: &Scan) -> BTreeSet<String> {
    println!(
        "{} Collecting imports for '{}'",
        "⚡".yellow(),
        scan.root_package
    );

    let mut imports: BTreeSet<String> = BTreeSet::new();
    let mut seen: BTreeSet<String> = BTreeSet::new();
    let mut pending: Vec<String> = list_packages(scan).into_iter().collect();

    while !pending.is_empty() {
        let discovered: Vec<BTreeSet<String>> = pending
            .par_iter()
            .map(|pkg| list_imports(scan, pkg))
            .collect();
        for set in discovered {
            imports.extend(set);
        }
        seen.extend(pending.drain(..));
        pending = imports
            .iter()
            .filter(|imp| !seen.contains(*imp) && scan.package_dir(imp).is_dir())
            .cloned()
            .collect();
    }

    debug!("collected {} import paths", imports.len());
    imports
}

/// The path itself and every ancestor above `root`.
pub fn parent_packages(root: &str, path: &str) -> BTreeSet<String> {
    let mut parents = BTreeSet::new();
    let mut current = path.to_string();
    while current.len() > root.len() {
        parents.insert(current.clone());
        match current.rsplit_once('/') {
            Some((head, _)) => current = head.to_string(),
            None => break,
        }
    }
    parents
}

/// Join and normalize a slash-separated import path, resolving `.` and `..`
/// segments.
pub fn clean_join(base: &str, rel: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in base.split('/').chain(rel.split('/')) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn slash_path(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
