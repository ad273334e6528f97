//! Subprocess wrappers around the `git` binary.
//!
//! Every repository operation goes through `git -C <dir> ...` with an
//! explicit working directory; only exit status and a few textual markers
//! are interpreted. Nothing here implements a version-control protocol.

use anyhow::{Context, Result, bail};
use colored::*;
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn run(dir: &Path, args: &[&str]) -> Result<Output> {
    debug!("git -C {} {}", dir.display(), args.join(" "));
    Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .with_context(|| format!("failed to execute `git {}`", args.join(" ")))
}

fn run_checked(dir: &Path, args: &[&str]) -> Result<String> {
    let output = run(dir, args)?;
    if !output.status.success() {
        bail!(
            "`git {}` failed in {}:\n{}",
            args.join(" "),
            dir.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Clone `url` into `dest`. `dest` must not exist yet.
pub fn clone(url: &str, dest: &Path) -> Result<()> {
    debug!("git clone {} {}", url, dest.display());
    let output = Command::new("git")
        .arg("clone")
        .arg(url)
        .arg(dest)
        .output()
        .context("failed to execute git clone")?;
    if !output.status.success() {
        bail!(
            "`git clone {}` failed:\n{}",
            url,
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

/// Initialize a bare-bones repository in place.
pub fn init(dir: &Path) -> Result<()> {
    run_checked(dir, &["init", "-q"]).map(|_| ())
}

/// Top-level directory of the working tree containing `dir`.
pub fn toplevel(dir: &Path) -> Result<PathBuf> {
    let out = run_checked(dir, &["rev-parse", "--show-toplevel"])?;
    Ok(PathBuf::from(out.trim()))
}

/// Whether `dir` is inside a git working tree at all.
pub fn is_work_tree(dir: &Path) -> bool {
    toplevel(dir).is_ok()
}

pub fn remotes(dir: &Path) -> Result<Vec<String>> {
    let out = run_checked(dir, &["remote"])?;
    Ok(out.lines().map(|l| l.trim().to_string()).collect())
}

pub fn remote_exists(dir: &Path, name: &str) -> bool {
    remotes(dir)
        .map(|rs| rs.iter().any(|r| r == name))
        .unwrap_or(false)
}

/// Register an additional remote. An already-registered name is a benign
/// warning, any other failure is logged; neither aborts the caller.
pub fn add_remote(dir: &Path, name: &str, url: &str) {
    match run(dir, &["remote", "add", "-f", name, url]) {
        Ok(output) if output.status.success() => {}
        Ok(output) => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if stderr.contains("already exists") {
                warn!("remote '{}' for '{}' already exists", name, url);
                println!("{} Already have the remote '{}' ({})", "!".yellow(), name, url);
            } else {
                println!(
                    "{} Could not add remote '{}' '{}': {}",
                    "x".red(),
                    name,
                    url,
                    stderr.trim()
                );
            }
        }
        Err(err) => {
            println!("{} Could not add remote '{}': {}", "x".red(), name, err);
        }
    }
}

/// Forced fetch of commits and tags from one remote.
pub fn fetch(dir: &Path, remote: &str) -> Result<()> {
    run_checked(dir, &["fetch", "-f", "-t", remote]).map(|_| ())
}

/// Forced fetch of all tags, overwriting stale local tag refs.
pub fn fetch_tags(dir: &Path) -> Result<()> {
    run_checked(dir, &["fetch", "--tags", "--force"]).map(|_| ())
}

pub fn checkout_detached(dir: &Path, refname: &str) -> Result<()> {
    run_checked(dir, &["checkout", "-f", "--detach", refname]).map(|_| ())
}

/// Whether `branch_ref` (e.g. `origin/main`) names a remote-tracking branch.
pub fn remote_branch_exists(dir: &Path, branch_ref: &str) -> bool {
    match run_checked(dir, &["branch", "--list", "-r", branch_ref]) {
        Ok(out) => out.lines().any(|l| l.trim() == branch_ref),
        Err(_) => false,
    }
}

pub fn tags(dir: &Path) -> Result<Vec<String>> {
    let out = run_checked(dir, &["tag", "-l"])?;
    Ok(out
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect())
}

/// Abbreviated hash of the most recent commit reachable from any ref.
pub fn newest_commit_any_ref(dir: &Path) -> Result<String> {
    let out = run_checked(dir, &["log", "--all", "--pretty=oneline", "--abbrev-commit", "-1"])?;
    out.split_whitespace()
        .next()
        .map(str::to_string)
        .ok_or_else(|| anyhow::anyhow!("repository at {} has no commits", dir.display()))
}

/// Short revision identifier of the current checkout.
pub fn current_revision(dir: &Path) -> Result<String> {
    let out = run_checked(dir, &["rev-parse", "--short", "HEAD"])?;
    Ok(out.trim().to_string())
}
