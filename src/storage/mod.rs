mod context;
mod error;
mod memory;
mod sqlite;
mod store;

pub use context::*;
pub use error::StoreError;
pub use memory::*;
pub use sqlite::*;
pub use store::*;

/// SQL migration for the initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");
