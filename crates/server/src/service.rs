//! The linking service: seeds from explicit links, computes gaps, delegates
//! to the match engine, applies the confidence threshold.

use std::collections::BTreeMap;
use std::sync::Arc;

use crosswalk_engine::{compute_implicit_links, ImplicitLink};
use crosswalk_store::{KeyRegistry, KnownKey, LinkPair, LinkStore, StoreError};

/// Minimum correlation an implicit pairing needs to enter a committed
/// mapping. Exact matches sit at 1.0; explicit links bypass the threshold
/// entirely.
pub const LINK_THRESHOLD: f64 = 0.75;

/// Time source, injected so tests can pin timestamps.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Stateless between calls; all mutable state lives in the stores.
pub struct LinkingService {
    links: LinkStore,
    registry: KeyRegistry,
    clock: Arc<dyn Clock>,
}

impl LinkingService {
    pub fn new(links: LinkStore, registry: KeyRegistry, clock: Arc<dyn Clock>) -> Self {
        Self {
            links,
            registry,
            clock,
        }
    }

    /// Compute a committed left→right mapping between two key lists.
    ///
    /// Explicit links seed the mapping (later store rows win on duplicate
    /// left keys); the match engine fills the gaps; implicit pairings below
    /// [`LINK_THRESHOLD`] are discarded. A store failure fails the whole
    /// call — no partial mapping is returned.
    pub fn link(
        &self,
        left_set: &str,
        left_keys: &[String],
        right_set: &str,
        right_keys: &[String],
    ) -> Result<BTreeMap<String, String>, StoreError> {
        self.observe(left_set, left_keys, right_set, right_keys)?;

        let mut mapping = self.seed_mapping(left_set, right_set)?;
        let implicit = self.compute_gaps(&mapping, left_keys, right_keys);

        for link in implicit {
            if link.correlation >= LINK_THRESHOLD {
                mapping.insert(link.left, link.right);
            }
        }

        log::debug!(
            "link {left_set}→{right_set}: {} of {} left keys resolved",
            mapping.len(),
            left_keys.len()
        );
        Ok(mapping)
    }

    /// Same pipeline as [`link`](Self::link), but returns every implicit
    /// candidate unfiltered, for human review. Explicit links are not echoed
    /// back — the caller already curates those.
    pub fn suggest_links(
        &self,
        left_set: &str,
        left_keys: &[String],
        right_set: &str,
        right_keys: &[String],
    ) -> Result<Vec<ImplicitLink>, StoreError> {
        self.observe(left_set, left_keys, right_set, right_keys)?;

        let mapping = self.seed_mapping(left_set, right_set)?;
        Ok(self.compute_gaps(&mapping, left_keys, right_keys))
    }

    /// Seed a mapping from the explicit link table, in store iteration
    /// order. Later rows overwrite earlier ones on duplicate left keys.
    fn seed_mapping(
        &self,
        left_set: &str,
        right_set: &str,
    ) -> Result<BTreeMap<String, String>, StoreError> {
        let mut mapping = BTreeMap::new();
        for pair in self.links.get(left_set, right_set)? {
            mapping.insert(pair.left, pair.right);
        }
        Ok(mapping)
    }

    /// Run the match engine over the keys the explicit seed did not resolve.
    ///
    /// Both exclusion filters check the mapping's *key* set: a right key
    /// that appears as an explicit mapping value stays available to the
    /// matcher.
    fn compute_gaps(
        &self,
        mapping: &BTreeMap<String, String>,
        left_keys: &[String],
        right_keys: &[String],
    ) -> Vec<ImplicitLink> {
        let remaining_left: Vec<String> = left_keys
            .iter()
            .filter(|k| !mapping.contains_key(*k))
            .cloned()
            .collect();
        let remaining_right: Vec<String> = right_keys
            .iter()
            .filter(|k| !mapping.contains_key(*k))
            .cloned()
            .collect();

        compute_implicit_links(&remaining_left, &remaining_right)
    }

    /// Keep the registry populated: every key named in a linking request is
    /// an observation of that key in its set, stamped with the injected
    /// clock.
    fn observe(
        &self,
        left_set: &str,
        left_keys: &[String],
        right_set: &str,
        right_keys: &[String],
    ) -> Result<(), StoreError> {
        let now = self.clock.now_unix();
        for key in left_keys {
            self.registry.record_observation(left_set, key, now)?;
        }
        for key in right_keys {
            self.registry.record_observation(right_set, key, now)?;
        }
        Ok(())
    }

    // Administrative operations delegate straight to the stores.

    pub fn explicit_links(
        &self,
        left_set: &str,
        right_set: &str,
    ) -> Result<Vec<LinkPair>, StoreError> {
        self.links.get(left_set, right_set)
    }

    pub fn add_explicit_link(
        &self,
        left_set: &str,
        left_key: &str,
        right_set: &str,
        right_key: &str,
    ) -> Result<(), StoreError> {
        self.links.add(left_set, left_key, right_set, right_key)
    }

    pub fn delete_explicit_link(
        &self,
        left_set: &str,
        left_key: &str,
        right_set: &str,
        right_key: &str,
    ) -> Result<(), StoreError> {
        self.links.delete(left_set, left_key, right_set, right_key)
    }

    pub fn known_sets(&self) -> Result<Vec<String>, StoreError> {
        self.registry.known_sets()
    }

    pub fn known_keys(&self, set: &str) -> Result<Vec<KnownKey>, StoreError> {
        self.registry.known_keys(set)
    }

    pub fn delete_known_sets(&self, names: &[String]) -> Result<(), StoreError> {
        self.registry.delete_sets(names)
    }

    pub fn delete_known_keys(&self, set: &str, keys: &[String]) -> Result<(), StoreError> {
        self.registry.delete_keys(set, keys)
    }
}
