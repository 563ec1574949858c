//! Deferred wildcard source loading
//!
//! A [`LazySource`] represents one on-disk source file whose content has not
//! necessarily been read yet. Realization is idempotent and thread-safe:
//! concurrent first access from multiple expansion threads performs the file
//! read exactly once (double-checked locking — lock-free fast path on the
//! realized cell, mutex-guarded read on first access).

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use tracing::debug;

use crate::error::{Result, WildError};

use super::structured;

/// Classification of a wildcard source file, decided by extension during the
/// directory walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// `.txt`: one candidate per line, key derived from the file path.
    Flat,
    /// `.yaml`/`.yml`: nested document, keys derived from file content.
    Structured,
}

impl SourceKind {
    /// Classify a path by extension. `None` for non-source files.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("txt") => Some(Self::Flat),
            Some("yaml") | Some("yml") => Some(Self::Structured),
            _ => None,
        }
    }
}

/// Realized content of a source file.
#[derive(Debug)]
pub enum RealizedData {
    /// Candidate list of a flat file.
    Flat(Arc<Vec<String>>),
    /// Every key a structured file contributes, in document order. The
    /// file-root key (carrying the aggregate of all leaf values) is the
    /// last entry.
    Structured(Vec<(String, Arc<Vec<String>>)>),
}

/// One on-disk wildcard source with deferred, memoized realization.
///
/// Flat sources realize into their line list. Structured sources realize
/// into the full set of keys discovered inside the document; the catalog
/// inserts those into its loaded map.
#[derive(Debug)]
pub struct LazySource {
    path: PathBuf,
    kind: SourceKind,
    /// Normalized catalog key of this file (relative path, extension
    /// stripped). Prefixes every key inside a structured document.
    root_key: String,
    cell: OnceLock<RealizedData>,
    init: Mutex<()>,
}

impl LazySource {
    pub fn new(path: PathBuf, kind: SourceKind, root_key: String) -> Self {
        Self {
            path,
            kind,
            root_key,
            cell: OnceLock::new(),
            init: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn kind(&self) -> SourceKind {
        self.kind
    }

    pub fn root_key(&self) -> &str {
        &self.root_key
    }

    /// Whether the backing file has been read.
    pub fn is_realized(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Read and parse the backing file, at most once for the lifetime of
    /// this source. Subsequent calls return the memoized data without
    /// touching the filesystem.
    pub fn realize(&self) -> Result<&RealizedData> {
        if let Some(data) = self.cell.get() {
            return Ok(data);
        }

        let _guard = self.init.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(data) = self.cell.get() {
            return Ok(data);
        }

        let data = match self.kind {
            SourceKind::Flat => RealizedData::Flat(Arc::new(read_flat_lines(&self.path)?)),
            SourceKind::Structured => {
                RealizedData::Structured(structured::flatten_file(&self.path, &self.root_key)?)
            }
        };
        debug!(path = %self.path.display(), key = %self.root_key, "realized wildcard source");

        let _ = self.cell.set(data);
        Ok(self.cell.get().expect("cell populated above"))
    }
}

/// Read a flat source file into its candidate list: one candidate per line,
/// dropping blank lines and lines whose first non-whitespace character is
/// `#`. UTF-8 is tried first; invalid UTF-8 falls back to a permissive
/// Latin-1 decode so legacy dictionaries still load.
pub fn read_flat_lines(path: &Path) -> Result<Vec<String>> {
    let bytes = std::fs::read(path).map_err(|e| WildError::Source {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let text = decode_permissive(bytes);

    Ok(text
        .lines()
        .filter(|line| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(|line| line.to_string())
        .collect())
}

/// Decode bytes as UTF-8, falling back to Latin-1 (every byte maps to the
/// code point of the same value) when the content is not valid UTF-8.
pub fn decode_permissive(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => err.as_bytes().iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_source(dir: &Path, name: &str, content: &[u8]) -> LazySource {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        let key = name.trim_end_matches(".txt").to_string();
        LazySource::new(path, SourceKind::Flat, key)
    }

    #[test]
    fn test_kind_from_path() {
        assert_eq!(
            SourceKind::from_path(Path::new("a/b.txt")),
            Some(SourceKind::Flat)
        );
        assert_eq!(
            SourceKind::from_path(Path::new("c.yaml")),
            Some(SourceKind::Structured)
        );
        assert_eq!(
            SourceKind::from_path(Path::new("c.yml")),
            Some(SourceKind::Structured)
        );
        assert_eq!(SourceKind::from_path(Path::new("readme.md")), None);
        assert_eq!(SourceKind::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_flat_lines_skip_comments_and_blanks() {
        let temp = tempfile::tempdir().unwrap();
        let source = flat_source(
            temp.path(),
            "fruit.txt",
            b"apple\nbanana\n# comment\n\n   \ncherry\n  # indented comment\n",
        );

        match source.realize().unwrap() {
            RealizedData::Flat(lines) => {
                assert_eq!(lines.as_ref(), &["apple", "banana", "cherry"]);
            }
            _ => panic!("expected flat data"),
        }
    }

    #[test]
    fn test_realize_is_memoized() {
        let temp = tempfile::tempdir().unwrap();
        let source = flat_source(temp.path(), "fruit.txt", b"apple\n");
        assert!(!source.is_realized());

        let first = match source.realize().unwrap() {
            RealizedData::Flat(lines) => lines.clone(),
            _ => panic!("expected flat data"),
        };
        assert!(source.is_realized());

        // Delete the backing file: a second realize must not re-read it.
        std::fs::remove_file(source.path()).unwrap();
        let second = match source.realize().unwrap() {
            RealizedData::Flat(lines) => lines.clone(),
            _ => panic!("expected flat data"),
        };
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_missing_file_is_source_error() {
        let temp = tempfile::tempdir().unwrap();
        let source = LazySource::new(
            temp.path().join("missing.txt"),
            SourceKind::Flat,
            "missing".to_string(),
        );
        let err = source.realize().unwrap_err();
        assert!(matches!(err, WildError::Source { .. }));
    }

    #[test]
    fn test_latin1_fallback() {
        let temp = tempfile::tempdir().unwrap();
        // 0xE9 is 'é' in Latin-1 and invalid as a standalone UTF-8 byte.
        let source = flat_source(temp.path(), "accents.txt", b"caf\xe9\n");

        match source.realize().unwrap() {
            RealizedData::Flat(lines) => assert_eq!(lines.as_ref(), &["caf\u{e9}"]),
            _ => panic!("expected flat data"),
        }
    }

    #[test]
    fn test_decode_permissive_utf8_passthrough() {
        assert_eq!(decode_permissive("héllo".as_bytes().to_vec()), "héllo");
    }
}
