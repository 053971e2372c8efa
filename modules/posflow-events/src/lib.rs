//! Point-of-sale event records.
//!
//! An `Event` is an immutable fact: a kind tag, the instant it happened, and an
//! open JSON payload whose shape depends on the kind. Producers and handlers do
//! not share a compile-time schema, so handlers validate payloads themselves.

pub mod types;
pub mod wire;

pub use types::{Event, EventKind};
pub use wire::WireError;
