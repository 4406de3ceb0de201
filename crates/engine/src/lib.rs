//! `crosswalk-engine` — greedy two-phase identifier matching.
//!
//! Pure engine crate: receives key lists, returns scored pairings.
//! No CLI or IO dependencies.

pub mod matcher;
pub mod model;
pub mod similarity;

pub use matcher::compute_implicit_links;
pub use model::ImplicitLink;
