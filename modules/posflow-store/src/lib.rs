//! Keyed record store used by point-of-sale handlers.
//!
//! Handlers talk to a `PosStore`: keyed lookups, keyed upserts, and batched
//! writes that land atomically. `PgStore` is the production backend;
//! `MemoryStore` backs tests and supports fault injection.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;
pub mod types;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use traits::PosStore;
pub use types::{CatalogItem, Recommendation, Write};
