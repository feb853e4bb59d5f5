//! Data models for the gastro backend.
//!
//! These are the API-facing representations of the operational tables. The
//! snapshot engine deliberately bypasses them and works on flattened records
//! driven by the dataset registry.

mod menu;
mod order;
mod table;

pub use menu::*;
pub use order::*;
pub use table::*;
