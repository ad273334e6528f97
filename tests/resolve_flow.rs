//! Checkout and version-resolution tests against real git repositories.
//!
//! These tests shell out to `git` the same way the tool does, building
//! small throwaway repositories under a temp directory.

use std::fs;
use std::path::Path;
use std::process::Command;

use vendrs::conf::Dep;
use vendrs::resolve;
use vendrs::run::Ctx;

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "`git {}` failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn commit(dir: &Path, message: &str) {
    git(dir, &["add", "-A"]);
    git(
        dir,
        &[
            "-c",
            "user.name=test",
            "-c",
            "user.email=test@example.com",
            "-c",
            "commit.gpgsign=false",
            "commit",
            "-m",
            message,
        ],
    );
}

/// New repository with one committed file on branch `main`.
fn init_repo(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    git(dir, &["init", "-q"]);
    git(dir, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    fs::write(dir.join("lib.go"), "package lib\n").unwrap();
    commit(dir, "initial");
}

fn ctx_for(cache_root: &Path) -> Ctx {
    Ctx {
        project_dir: cache_root.to_path_buf(),
        vendor_dir: cache_root.join("vendor"),
        target: "vendor".to_string(),
        cache_root: cache_root.to_path_buf(),
        insecure: false,
        keep: false,
    }
}

#[test]
fn latest_version_picks_highest_semver_tag() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = tmp.path().join("repo");
    init_repo(&repo);
    git(&repo, &["tag", "v1.0.0"]);
    git(&repo, &["tag", "v1.2.0"]);
    git(&repo, &["tag", "v1.1.0"]);
    git(&repo, &["tag", "not-a-version"]);

    let version = resolve::latest_version(&repo).unwrap();
    assert_eq!(version, "v1.2.0");
}

#[test]
fn latest_version_falls_back_to_current_revision() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = tmp.path().join("repo");
    init_repo(&repo);

    let version = resolve::latest_version(&repo).unwrap();
    let head = git(&repo, &["rev-parse", "--short", "HEAD"]);
    assert_eq!(version, head);
}

#[test]
fn checkout_pins_a_tag_detached() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = tmp.path().join("cache");
    let repo_dir = cache.join("src").join("x.io/dep/lib");
    init_repo(&repo_dir);
    git(&repo_dir, &["tag", "v1.0.0"]);
    let pinned = git(&repo_dir, &["rev-parse", "HEAD"]);

    fs::write(repo_dir.join("later.go"), "package lib\n").unwrap();
    commit(&repo_dir, "later work");

    let ctx = ctx_for(&cache);
    let dep = Dep {
        package: "x.io/dep/lib".to_string(),
        version: "v1.0.0".to_string(),
        ..Default::default()
    };
    resolve::checkout(&ctx, &dep).unwrap();

    assert_eq!(git(&repo_dir, &["rev-parse", "HEAD"]), pinned);
    assert!(!repo_dir.join("later.go").exists());
}

#[test]
fn checkout_master_falls_back_to_newest_commit() {
    let tmp = tempfile::tempdir().unwrap();

    // Upstream's default branch is `main`, so `origin/master` cannot exist
    // and the fallback ladder has to kick in.
    let upstream = tmp.path().join("upstream");
    init_repo(&upstream);
    let newest = git(&upstream, &["rev-parse", "--short", "HEAD"]);

    let cache = tmp.path().join("cache");
    let repo_dir = cache.join("src").join("x.io/dep/lib");
    fs::create_dir_all(&repo_dir).unwrap();
    git(&repo_dir, &["init", "-q"]);
    git(&repo_dir, &["remote", "add", "origin", upstream.to_str().unwrap()]);

    let ctx = ctx_for(&cache);
    let dep = Dep {
        package: "x.io/dep/lib".to_string(),
        version: "master".to_string(),
        ..Default::default()
    };
    resolve::checkout(&ctx, &dep).unwrap();

    assert_eq!(git(&repo_dir, &["rev-parse", "--short", "HEAD"]), newest);
    assert!(repo_dir.join("lib.go").exists());
}

#[test]
fn checkout_of_unattainable_revision_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let cache = tmp.path().join("cache");
    let repo_dir = cache.join("src").join("x.io/dep/lib");
    init_repo(&repo_dir);
    // A retry needs somewhere to fetch from.
    git(&repo_dir, &["remote", "add", "origin", repo_dir.to_str().unwrap()]);

    let ctx = ctx_for(&cache);
    let dep = Dep {
        package: "x.io/dep/lib".to_string(),
        version: "v9.9.9".to_string(),
        ..Default::default()
    };
    let err = resolve::checkout(&ctx, &dep).unwrap_err();
    assert!(format!("{:#}", err).contains("x.io/dep/lib"));
}
