//! Snapshot export/import engine.
//!
//! Captures the entire operational dataset into one portable archive and can
//! destructively reconstruct it later, preserving original identifiers,
//! restoring auto-increment state, and guaranteeing that a partially applied
//! restore can never leave the store inconsistent.
//!
//! Submodules, leaf-first:
//!
//! - `registry`: ordered catalog of datasets and their dependency edges
//! - `flatten`: row <-> flattened-record mapping driven by the registry
//! - `archive`: ZIP container writing, reading, and structural validation
//! - `export`: read-only capture with dangling-reference filtering
//! - `restore`: guard -> reset -> load -> resync in one transaction, plus
//!   best-effort outcome recording

pub mod archive;
pub mod export;
pub mod flatten;
pub mod registry;
pub mod restore;

pub use export::export;
pub use restore::{restore, RestoreSummary};
