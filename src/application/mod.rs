// Application layer - use cases and orchestration.
// The service owns invariant enforcement; the storage layer only persists.

pub mod error;
mod locks;
mod service;

pub use error::*;
pub use locks::*;
pub use service::*;
