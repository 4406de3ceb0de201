//! Crosswalk Wire Protocol — v1 Frozen Format
//!
//! Canonical protocol types for CLI ↔ server communication. The wire format
//! is JSONL (newline-delimited JSON) over TCP localhost; every message
//! carries an `id` for request/response correlation.
//!
//! This is **protocol v1** — the format is frozen. Changes require a version
//! bump in `PROTOCOL_VERSION` and backward compatibility handling.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Current protocol version. Increment for breaking changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum accepted message size (1 MB). Key lists are short; anything past
/// this is a misbehaving client.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

// =============================================================================
// Client → Server Messages
// =============================================================================

/// Messages sent from client (CLI or peer service) to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientRequest {
    /// Initial handshake - must be first message.
    Hello(HelloRequest),

    /// Explicit links between two sets, in the requested orientation.
    GetExplicitLinks(GetExplicitLinksRequest),

    /// Record one administrator-curated link.
    AddExplicitLink(ExplicitLinkRequest),

    /// Remove one administrator-curated link.
    DeleteExplicitLink(ExplicitLinkRequest),

    /// All set names present in the key registry.
    GetKnownSets(GetKnownSetsRequest),

    /// Observed keys (with last-seen times) for one set.
    GetKnownKeys(GetKnownKeysRequest),

    /// Drop every observation under the listed set names.
    DeleteKnownSets(DeleteKnownSetsRequest),

    /// Drop specific observed keys from one set.
    DeleteKnownKeys(DeleteKnownKeysRequest),

    /// Compute a committed left→right mapping.
    Link(LinkRequest),

    /// Compute unfiltered pairing candidates for human review.
    SuggestLinks(LinkRequest),

    /// Ping for keepalive.
    Ping(PingRequest),
}

/// Initial handshake from client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HelloRequest {
    pub id: String,
    /// Client identifier (e.g., "xwalk", "roster-sync").
    pub client: String,
    /// Client version.
    pub version: String,
    /// Shared-secret bearer token; compared for equality server-side.
    pub token: String,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: u32,
}

fn default_protocol_version() -> u32 {
    1
}

/// A (set, key) pair naming one identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRef {
    pub set: String,
    pub key: String,
}

/// Add/delete payload for one explicit link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplicitLinkRequest {
    pub id: String,
    pub left: KeyRef,
    pub right: KeyRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetExplicitLinksRequest {
    pub id: String,
    pub left_set: String,
    pub right_set: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetKnownSetsRequest {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetKnownKeysRequest {
    pub id: String,
    pub set: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteKnownSetsRequest {
    pub id: String,
    pub names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteKnownKeysRequest {
    pub id: String,
    pub set: String,
    pub keys: Vec<String>,
}

/// One side of a linking request: a set name plus the keys seen there.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyList {
    pub name: String,
    pub keys: Vec<String>,
}

/// Shared payload for `link` and `suggest_links`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRequest {
    pub id: String,
    pub src: KeyList,
    pub dst: KeyList,
}

/// Ping for keepalive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingRequest {
    pub id: String,
}

// =============================================================================
// Server → Client Messages
// =============================================================================

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerResponse {
    /// Response to Hello.
    Welcome(WelcomeResponse),

    /// Response to GetExplicitLinks.
    ExplicitLinks(ExplicitLinksResponse),

    /// Acknowledgement for add/delete operations.
    Ack(AckResponse),

    /// Response to GetKnownSets.
    KnownSets(KnownSetsResponse),

    /// Response to GetKnownKeys.
    KnownKeys(KnownKeysResponse),

    /// Response to Link.
    Mapping(MappingResponse),

    /// Response to SuggestLinks.
    Candidates(CandidatesResponse),

    /// Response to Ping.
    Pong(PongResponse),

    /// Error response.
    Error(ErrorResponse),
}

/// Welcome response after successful hello.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WelcomeResponse {
    pub id: String,
    /// Protocol version in use (min of client and server).
    pub protocol_version: u32,
    pub capabilities: Vec<String>,
}

/// Parallel arrays: `left_keys[i]` is linked to `right_keys[i]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExplicitLinksResponse {
    pub id: String,
    pub left_keys: Vec<String>,
    pub right_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AckResponse {
    pub id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownSetsResponse {
    pub id: String,
    pub sets: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownKeyEntry {
    pub key: String,
    pub last_seen: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownKeysResponse {
    pub id: String,
    pub entries: Vec<KnownKeyEntry>,
}

/// Committed mapping from left keys to right keys.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingResponse {
    pub id: String,
    pub mapping: BTreeMap<String, String>,
}

/// One pairing candidate with its confidence score.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub left: String,
    pub right: String,
    pub correlation: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidatesResponse {
    pub id: String,
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PongResponse {
    pub id: String,
}

/// Error response. `id` echoes the failing request when known.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub code: String,
    pub message: String,
}
