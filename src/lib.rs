//! # vendrs - Dependency Vendoring Tool
//!
//! vendrs resolves the external packages a project actually imports,
//! fetches pinned revisions into a shared cache, and synchronizes a
//! `vendor/` directory with exactly the files needed, throwing away
//! everything the import graph does not reach.
//!
//! ## Features
//!
//! - **Static Resolution**: Discovers imports transitively, no compilation
//! - **Pinned Revisions**: Branch, tag, or commit per dependency
//! - **Shared Cache**: One clone per package, repaired in place
//! - **Precise Vendoring**: Unused files, tests, and empty dirs are pruned
//!
//! ## Quick Start
//!
//! ```bash
//! # Vendor everything declared in vendor.toml
//! vendrs
//!
//! # Re-derive dependencies from source and refresh versions
//! vendrs -u
//! ```
//!
//! ## Module Organization
//!
//! - [`conf`] - Ledger document model (`vendor.toml`, `vendor.lock`)
//! - [`imports`] - Static import graph discovery
//! - [`cache`] - Shared repository cache management
//! - [`resolve`] - Revision checkout and latest-version selection
//! - [`vendor`] - Vendor tree materialization and pruning
//! - [`run`] - Top-level orchestration

/// Shared repository cache management.
pub mod cache;

/// Ledger document parsing and manipulation.
pub mod conf;

/// Subprocess wrappers around the `git` binary.
pub mod git;

/// Static import graph discovery.
pub mod imports;

/// Legacy manifest adapter.
pub mod legacy;

/// Revision checkout and latest-version resolution.
pub mod resolve;

/// Top-level run orchestration.
pub mod run;

/// Transitive dependency expansion.
pub mod transitive;

/// Vendor tree synchronization and pruning.
pub mod vendor;
