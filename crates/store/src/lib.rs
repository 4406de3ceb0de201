//! `crosswalk-store` — durable state behind the linking service.
//!
//! One SQLite database, two tables: administrator-curated explicit links and
//! the registry of every (set, key) ever observed.

pub mod db;
pub mod error;
pub mod links;
pub mod registry;

pub use db::Store;
pub use error::StoreError;
pub use links::{LinkPair, LinkStore};
pub use registry::{KeyRegistry, KnownKey};
