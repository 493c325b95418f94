mod repository;
mod tx;

pub use repository::*;
pub use tx::*;

/// SQL migration for initial schema
pub const MIGRATION_001_INITIAL: &str = include_str!("migrations/001_initial.sql");
