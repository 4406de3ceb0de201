use serde::Serialize;

/// A heuristic pairing computed at request time. Never persisted.
///
/// `correlation` is 1.0 for byte-for-byte equality, otherwise the
/// Jaro-Winkler similarity of the two keys.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImplicitLink {
    pub left: String,
    pub right: String,
    pub correlation: f64,
}
