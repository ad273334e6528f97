use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Ledger filenames probed, in priority order, when `--file` is absent.
pub const LEDGER_FILES: &[&str] = &["vendor.toml", "vendrs.toml", "deps.toml"];

/// Filename of the derived lock snapshot written after cleanup.
pub const LOCK_FILE: &str = "vendor.lock";

/// One external package dependency.
///
/// `package` is the unique identity: two entries with equal `package` are
/// duplicates regardless of every other field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dep {
    pub package: String,
    /// Branch name, tag, or commit. Must be non-empty before any fetch.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Explicit remote URL override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    /// Also scan this dependency's own manifest for nested dependencies.
    #[serde(default, skip_serializing_if = "is_false")]
    pub transitive: bool,
    /// Frozen: never re-resolve or re-fetch in update mode.
    #[serde(default, skip_serializing_if = "is_false")]
    pub lock: bool,
    /// Source tree lives under `staging/src` inside the fetched repository.
    #[serde(default, skip_serializing_if = "is_false")]
    pub staging: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// The dependency ledger: ordered entries plus vendoring policy.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conf {
    /// Import path of the project's own source tree. Used to exclude
    /// self-references from the import graph.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub package: String,
    /// Relative paths removed from the vendor directory regardless of usage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excludes: Vec<String>,
    /// Keep-list: packages retained even if nothing imports them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub imports: Vec<Dep>,
    #[serde(skip)]
    index: HashMap<String, Dep>,
}

impl Conf {
    /// Ledger with the given entries; the lookup index is built eagerly.
    pub fn with_imports(imports: Vec<Dep>) -> Self {
        let mut conf = Conf {
            imports,
            ..Default::default()
        };
        conf.rebuild_index();
        conf
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read ledger file {}", path.display()))?;
        let mut conf: Conf = toml::from_str(&content)
            .with_context(|| format!("malformed ledger file {}", path.display()))?;
        conf.rebuild_index();
        Ok(conf)
    }

    /// Write the ledger, entries sorted by package path.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut sorted = self.clone();
        sorted.imports.sort_by(|a, b| a.package.cmp(&b.package));
        let content = toml::to_string_pretty(&sorted)?;
        fs::write(path, content)
            .with_context(|| format!("failed to write ledger file {}", path.display()))?;
        Ok(())
    }

    pub fn get(&self, package: &str) -> Option<&Dep> {
        self.index.get(package)
    }

    /// Drop later duplicates, keeping the first entry per unique package and
    /// the relative order of first occurrences. Returns the number removed.
    pub fn dedupe(&mut self) -> usize {
        let before = self.imports.len();
        let mut seen = HashSet::new();
        self.imports.retain(|dep| seen.insert(dep.package.clone()));
        self.rebuild_index();
        before - self.imports.len()
    }

    /// Fold newly discovered entries in. Entries whose package already exists
    /// are discarded: pre-existing entries always win.
    pub fn merge(&mut self, new_entries: Vec<Dep>) {
        for dep in new_entries {
            if self.index.contains_key(&dep.package) {
                continue;
            }
            self.imports.push(dep);
        }
        self.dedupe();
    }

    fn rebuild_index(&mut self) {
        self.index.clear();
        for dep in &self.imports {
            // First occurrence wins in the index too.
            self.index
                .entry(dep.package.clone())
                .or_insert_with(|| dep.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(package: &str, version: &str, repo: Option<&str>) -> Dep {
        Dep {
            package: package.to_string(),
            version: version.to_string(),
            repo: repo.map(str::to_string),
            ..Default::default()
        }
    }

    fn conf_with(imports: Vec<Dep>) -> Conf {
        Conf::with_imports(imports)
    }

    #[test]
    fn test_dedupe_removal_counts() {
        let cases: Vec<(Vec<Dep>, usize)> = vec![
            (vec![dep("package1", "version1", None)], 0),
            (
                vec![
                    dep("package1", "version1", None),
                    dep("package2", "version1", Some("repoA")),
                ],
                0,
            ),
            (
                vec![
                    dep("package1", "version1", None),
                    dep("package2", "version1", Some("repoA")),
                    dep("package1", "version1", None),
                ],
                1,
            ),
            (
                vec![
                    dep("package1", "version1", None),
                    dep("package2", "version1", Some("repoA")),
                    dep("package1", "version1", None),
                    dep("package1", "version1", None),
                ],
                2,
            ),
            (
                vec![
                    dep("package1", "version1", None),
                    dep("package2", "version1", Some("repoA")),
                    dep("package1", "version1", None),
                    dep("package1", "version1", None),
                    dep("package2", "version2", Some("repoB")),
                    dep("package3", "version1", Some("repoA")),
                ],
                3,
            ),
        ];

        for (i, (imports, duplicates)) in cases.into_iter().enumerate() {
            let mut conf = conf_with(imports);
            let removed = conf.dedupe();
            assert_eq!(removed, duplicates, "case {} removed wrong count", i);
        }
    }

    #[test]
    fn test_dedupe_is_idempotent_and_keeps_first() {
        let mut conf = conf_with(vec![
            dep("a", "v1", None),
            dep("b", "v1", None),
            dep("a", "v2", Some("other")),
        ]);
        conf.dedupe();
        assert_eq!(conf.imports.len(), 2);
        assert_eq!(conf.imports[0].package, "a");
        assert_eq!(conf.imports[0].version, "v1");
        assert_eq!(conf.imports[1].package, "b");

        let again = conf.dedupe();
        assert_eq!(again, 0);
        assert_eq!(conf.imports.len(), 2);
    }

    #[test]
    fn test_merge_never_overwrites_existing() {
        let mut conf = conf_with(vec![dep("a", "v1", None)]);
        conf.merge(vec![
            dep("a", "v9", Some("hijack")),
            dep("b", "v2", None),
            dep("b", "v3", None),
        ]);
        assert_eq!(conf.imports.len(), 2);
        assert_eq!(conf.get("a").unwrap().version, "v1");
        assert!(conf.get("a").unwrap().repo.is_none());
        assert_eq!(conf.get("b").unwrap().version, "v2");
    }

    #[test]
    fn test_get_uses_index() {
        let conf = conf_with(vec![dep("x/y", "v1", None)]);
        assert!(conf.get("x/y").is_some());
        assert!(conf.get("x").is_none());
    }

    #[test]
    fn test_roundtrip_sorted_by_package() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vendor.toml");

        let mut conf = conf_with(vec![
            dep("zeta.io/z/pkg", "v2.0.0", None),
            Dep {
                package: "alpha.io/a/pkg".to_string(),
                version: "master".to_string(),
                repo: Some("https://example.com/a.git".to_string()),
                transitive: true,
                lock: true,
                staging: false,
            },
        ]);
        conf.package = "example.com/me/project".to_string();
        conf.excludes = vec!["zeta.io/z/pkg/testdata".to_string()];
        conf.packages = vec!["alpha.io/a/pkg/extras".to_string()];
        conf.save(&path).unwrap();

        let loaded = Conf::load(&path).unwrap();
        assert_eq!(loaded.package, "example.com/me/project");
        assert_eq!(loaded.imports.len(), 2);
        assert_eq!(loaded.imports[0].package, "alpha.io/a/pkg");
        assert!(loaded.imports[0].transitive);
        assert!(loaded.imports[0].lock);
        assert_eq!(loaded.imports[1].package, "zeta.io/z/pkg");
        assert_eq!(loaded.excludes, conf.excludes);
        assert_eq!(loaded.packages, conf.packages);
        assert_eq!(
            loaded.get("alpha.io/a/pkg").unwrap().repo.as_deref(),
            Some("https://example.com/a.git")
        );
    }
}
