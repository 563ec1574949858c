//! Catalog construction
//!
//! Walks the configured source roots, decides the operating mode by
//! comparing aggregate source size against the configured byte budget, and
//! populates the catalog. The size scan exits early the instant the running
//! total reaches the budget, so huge trees never pay a full stat pass just
//! to learn they are over the limit.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::WildcardConfig;

use super::source::{read_flat_lines, LazySource, SourceKind};
use super::{normalize_key, structured, CatalogMode, WildcardCatalog};

/// Builds a [`WildcardCatalog`] from a [`WildcardConfig`].
///
/// Building never fails wholesale: an unreadable file is logged and
/// skipped, and a missing root simply contributes nothing.
pub struct CatalogBuilder {
    config: WildcardConfig,
}

impl CatalogBuilder {
    pub fn new(config: WildcardConfig) -> Self {
        Self { config }
    }

    /// Scan the source roots and build the catalog.
    ///
    /// Mode selection is global and happens exactly once: if the combined
    /// size of all source files stays under the budget the catalog is
    /// fully cached, otherwise flat files are deferred to first access.
    /// Structured files are parsed immediately in both modes because their
    /// key space is only discoverable by reading content. The custom root
    /// is scanned after the primary root, so its keys win on collision.
    pub fn build(&self) -> WildcardCatalog {
        let limit = self.config.cache_limit_bytes();

        let mut total = scan_source_size(&self.config.wildcard_dir, limit);
        if total < limit {
            if let Some(custom) = &self.config.custom_wildcard_dir {
                total += scan_source_size(custom, limit.saturating_sub(total));
            }
        }

        let mode = if total >= limit {
            CatalogMode::OnDemand
        } else {
            CatalogMode::FullCache
        };
        info!(
            total_bytes = total,
            limit_bytes = limit,
            mode = ?mode,
            "building wildcard catalog"
        );

        let mut available = HashMap::new();
        let mut loaded = HashMap::new();

        populate_root(&self.config.wildcard_dir, mode, &mut available, &mut loaded);
        if let Some(custom) = &self.config.custom_wildcard_dir {
            populate_root(custom, mode, &mut available, &mut loaded);
        }

        info!(
            loaded = loaded.len(),
            deferred = available.len(),
            "wildcard catalog ready"
        );
        WildcardCatalog::new(mode, available, loaded)
    }
}

fn populate_root(
    root: &Path,
    mode: CatalogMode,
    available: &mut HashMap<String, Arc<LazySource>>,
    loaded: &mut HashMap<String, Arc<Vec<String>>>,
) {
    walk_source_files(root, &mut |path| {
        let Some(kind) = SourceKind::from_path(path) else {
            return true;
        };
        let Some(key) = source_key(root, path) else {
            return true;
        };

        match kind {
            SourceKind::Flat => match mode {
                CatalogMode::FullCache => match read_flat_lines(path) {
                    Ok(lines) => {
                        loaded.insert(key, Arc::new(lines));
                    }
                    Err(err) => {
                        warn!(path = %path.display(), error = %err, "skipping unreadable flat source");
                    }
                },
                CatalogMode::OnDemand => {
                    let source =
                        LazySource::new(path.to_path_buf(), SourceKind::Flat, key.clone());
                    available.insert(key, Arc::new(source));
                }
            },
            // Structured sources are parsed in both modes: their keys live
            // inside the document and cannot be deferred.
            SourceKind::Structured => match structured::flatten_file(path, &key) {
                Ok(entries) => {
                    for (k, v) in entries {
                        loaded.insert(k, v);
                    }
                }
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable structured source");
                }
            },
        }
        true
    });
}

/// Catalog key of a source file: path relative to its root, extension
/// stripped, normalized.
fn source_key(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let stem = rel.with_extension("");
    Some(normalize_key(&stem.to_string_lossy()))
}

/// Accumulate the byte size of all source files under `root`, stopping the
/// walk as soon as the running total reaches `limit` (when `limit` is
/// non-zero). Unreadable directories and files contribute nothing.
fn scan_source_size(root: &Path, limit: u64) -> u64 {
    let mut total = 0u64;
    walk_source_files(root, &mut |path| {
        if SourceKind::from_path(path).is_some() {
            if let Ok(meta) = path.metadata() {
                total += meta.len();
            }
            if limit > 0 && total >= limit {
                return false;
            }
        }
        true
    });
    total
}

/// Depth-first walk over `root` in sorted entry order, calling `visit` for
/// every file. `visit` returns `false` to abort the walk early. Unreadable
/// directories are skipped silently.
fn walk_source_files(dir: &Path, visit: &mut dyn FnMut(&Path) -> bool) -> bool {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return true,
    };

    let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            if !walk_source_files(&path, visit) {
                return false;
            }
        } else if !visit(&path) {
            return false;
        }
    }
    true
}
