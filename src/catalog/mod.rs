//! Wildcard catalog
//!
//! The catalog is the registry mapping normalized wildcard keys to candidate
//! lists. It operates in one of two modes decided at build time:
//!
//! - Full-cache: every source file is read during the build and all keys
//!   live in the `loaded` map.
//! - On-demand: flat files are only discovered (key → deferred source in the
//!   `available` map) and read on first access; structured files are always
//!   parsed up front because their keys are embedded in file content.
//!
//! Realization is memoized: once a key has been read it stays in `loaded`
//! for the lifetime of the catalog, and repeated `get` calls return the
//! same shared allocation without touching the filesystem again.

pub mod builder;
pub mod source;
pub mod structured;

pub use builder::CatalogBuilder;
pub use source::{LazySource, RealizedData, SourceKind};

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use regex::Regex;
use tracing::warn;

/// Operating mode of a catalog, decided once per build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogMode {
    /// All source content was read at build time.
    FullCache,
    /// Flat-file content is read on first access.
    OnDemand,
}

/// Normalize a wildcard key: backslashes become slashes, spaces become
/// hyphens, everything is lowercased.
pub fn normalize_key(key: &str) -> String {
    key.replace('\\', "/").replace(' ', "-").to_lowercase()
}

/// The registry mapping wildcard keys to candidate lists.
///
/// The catalog maintains two mappings:
/// - `available`: key to deferred flat source (on-demand mode only)
/// - `loaded`: key to realized candidate list
///
/// A key present in `available` but absent from `loaded` has never been
/// read; once read, it appears identically in `loaded` for the remainder
/// of the catalog's lifetime. The catalog is safe to share across threads:
/// `loaded` sits behind a `RwLock` and first realization of a source is
/// serialized inside [`LazySource`].
#[derive(Debug)]
pub struct WildcardCatalog {
    mode: CatalogMode,
    available: HashMap<String, Arc<LazySource>>,
    loaded: RwLock<HashMap<String, Arc<Vec<String>>>>,
}

impl WildcardCatalog {
    pub(crate) fn new(
        mode: CatalogMode,
        available: HashMap<String, Arc<LazySource>>,
        loaded: HashMap<String, Arc<Vec<String>>>,
    ) -> Self {
        Self {
            mode,
            available,
            loaded: RwLock::new(loaded),
        }
    }

    /// An empty full-cache catalog. Useful for expanding templates that
    /// contain no wildcard references.
    pub fn empty() -> Self {
        Self::new(CatalogMode::FullCache, HashMap::new(), HashMap::new())
    }

    pub fn mode(&self) -> CatalogMode {
        self.mode
    }

    /// Get the realized candidate list for a key, reading the backing file
    /// if this is the first access to a deferred entry. Returns `None` for
    /// keys the catalog knows nothing about, and for deferred entries whose
    /// source file turned out to be unreadable (logged, not raised — one
    /// bad file must not poison the batch).
    pub fn get(&self, key: &str) -> Option<Arc<Vec<String>>> {
        let key = normalize_key(key);

        if let Some(list) = self.loaded.read().unwrap_or_else(|e| e.into_inner()).get(&key) {
            return Some(list.clone());
        }

        let source = self.available.get(&key)?;
        match source.realize() {
            Ok(RealizedData::Flat(list)) => {
                let mut loaded = self.loaded.write().unwrap_or_else(|e| e.into_inner());
                Some(loaded.entry(key).or_insert_with(|| list.clone()).clone())
            }
            Ok(RealizedData::Structured(entries)) => {
                // Deferred structured sources do not occur in practice (the
                // builder always pre-loads them), but realize them coherently
                // if one is ever registered.
                let mut loaded = self.loaded.write().unwrap_or_else(|e| e.into_inner());
                for (k, v) in entries {
                    loaded.entry(k.clone()).or_insert_with(|| v.clone());
                }
                loaded.get(&key).cloned()
            }
            Err(err) => {
                warn!(key = %key, error = %err, "failed to realize wildcard source");
                None
            }
        }
    }

    /// All realized keys, sorted. In full-cache mode this is every known
    /// key; in on-demand mode it reflects what has actually been touched,
    /// not what could be touched (see [`discoverable_keys`](Self::discoverable_keys)).
    pub fn keys(&self) -> Vec<String> {
        let loaded = self.loaded.read().unwrap_or_else(|e| e.into_inner());
        let mut keys: Vec<String> = loaded.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Every key that could be resolved, sorted: realized keys plus, in
    /// on-demand mode, unrealized flat-file keys.
    pub fn discoverable_keys(&self) -> Vec<String> {
        let mut keys = self.keys();
        if self.mode == CatalogMode::OnDemand {
            keys.extend(self.available.keys().cloned());
            keys.sort();
            keys.dedup();
        }
        keys
    }

    /// Number of realized keys.
    pub fn loaded_count(&self) -> usize {
        self.loaded.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Number of discoverable keys.
    pub fn discoverable_count(&self) -> usize {
        self.discoverable_keys().len()
    }

    /// Glob-style lookup: concatenated candidates of every key matching the
    /// pattern, in sorted key order. `*` matches any run of characters and
    /// `+` is taken literally; patterns are anchored at the start of the
    /// key and also tried against `key + "/"`. The special form `*/name`
    /// matches the leaf `name` at any depth: exactly, as a path suffix, as
    /// a path prefix, and as an interior segment.
    ///
    /// The pattern is matched against the discoverable universe in
    /// on-demand mode and the loaded universe in full-cache mode. An empty
    /// result means nothing matched.
    pub fn glob(&self, pattern: &str) -> Vec<String> {
        let pattern = normalize_key(pattern);
        let universe = self.search_universe();

        let matched: Vec<&String> = if let Some(base) = pattern.strip_prefix("*/") {
            if base.is_empty() {
                Vec::new()
            } else {
                universe
                    .iter()
                    .filter(|k| leaf_matches(k, base))
                    .collect()
            }
        } else {
            let translated = pattern.replace('*', ".*").replace('+', "\\+");
            let Ok(re) = Regex::new(&format!("^(?:{})", translated)) else {
                return Vec::new();
            };
            universe
                .iter()
                .filter(|k| re.is_match(k) || re.is_match(&format!("{}/", k)))
                .collect()
        };

        let mut values = Vec::new();
        for key in matched {
            if let Some(list) = self.get(key) {
                values.extend(list.iter().cloned());
            }
        }
        values
    }

    fn search_universe(&self) -> Vec<String> {
        match self.mode {
            CatalogMode::OnDemand => self.discoverable_keys(),
            CatalogMode::FullCache => self.keys(),
        }
    }
}

/// Depth-agnostic leaf match for the `*/name` pattern form:
/// `name` itself, `a/name`, `name/b`, and `a/name/b` all match.
fn leaf_matches(key: &str, base: &str) -> bool {
    key == base
        || key.ends_with(&format!("/{}", base))
        || key.starts_with(&format!("{}/", base))
        || key.contains(&format!("/{}/", base))
}
