//! ## Crate layout
//! - `core`: the data engine — declaration model, codecs, lifecycle runtime,
//!   routing, query layer, sync, and migration.
//! - `primitives`: leaf field-kind metadata and scalar newtypes.
//!
//! The `prelude` module mirrors the surface application code composes at
//! startup (schema + engine) and per request (contexts, entries, settings).

pub use entrydb_core as core;
pub use entrydb_primitives as primitives;

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use entrydb_core::error::EngineError;

///
/// Prelude
///

pub mod prelude {
    pub use entrydb_core::prelude::*;
}
