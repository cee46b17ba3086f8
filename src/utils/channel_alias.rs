//! Channel alias normalization
//!
//! Maps raw channel names to one canonical spelling so that differently
//! labelled copies of the same channel can be treated as a single identity.
//! The table is an explicitly reloaded read-only snapshot: the pipeline
//! refreshes it at the start of a run and merging operates on that one
//! snapshot for the run's whole duration.

use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::errors::SourceError;
use crate::utils::normalize_lookup_key;

/// Decoration patterns stripped from a name before lookup. Quality tags and
/// bracketed labels distinguish feeds of the same channel, not channels.
const STRIP_PATTERNS: &[&str] = &[
    r"(?i)\b(4K|8K|UHD|FHD|HD|SD|HEVC)\b",
    r"(?i)\b(720P?|1080P?|2160P?)\b",
    r"\[[^\]]*\]|\([^)]*\)",
    r"高清|超清|超高清",
];

/// Immutable alias-table snapshot.
///
/// `standard_name` is a pure function over the snapshot; unmapped names pass
/// through unchanged, so a name with no aliases is its own canonical
/// identity.
pub struct AliasTable {
    index: HashMap<String, String>,
    strip_patterns: Vec<Regex>,
}

impl AliasTable {
    pub fn empty() -> Self {
        Self::from_entries(HashMap::new())
    }

    /// Build a snapshot from canonical-name → alternate-spellings entries.
    /// The canonical spelling itself is always resolvable.
    pub fn from_entries(entries: HashMap<String, Vec<String>>) -> Self {
        let strip_patterns = STRIP_PATTERNS
            .iter()
            .filter_map(|pattern| match Regex::new(pattern) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!("invalid alias strip pattern '{}': {}", pattern, e);
                    None
                }
            })
            .collect::<Vec<_>>();

        let mut index = HashMap::new();
        for (canonical, aliases) in entries {
            index.insert(strip_key(&strip_patterns, &canonical), canonical.clone());
            for alias in aliases {
                index.insert(strip_key(&strip_patterns, &alias), canonical.clone());
            }
        }

        Self {
            index,
            strip_patterns,
        }
    }

    /// Resolve a raw channel name to its canonical spelling. Returns the raw
    /// name unchanged when no mapping exists.
    pub fn standard_name(&self, raw_name: &str) -> String {
        match self.index.get(&self.lookup_key(raw_name)) {
            Some(canonical) => canonical.clone(),
            None => raw_name.to_string(),
        }
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    fn lookup_key(&self, name: &str) -> String {
        strip_key(&self.strip_patterns, name)
    }
}

fn strip_key(patterns: &[Regex], name: &str) -> String {
    let mut cleaned = name.to_string();
    for re in patterns {
        cleaned = re.replace_all(&cleaned, "").to_string();
    }
    normalize_lookup_key(cleaned.trim())
}

/// Collaborator seam for loading the alias table, reloaded explicitly before
/// each pipeline run.
pub trait AliasLoader: Send + Sync {
    fn load(&self) -> Result<AliasTable, SourceError>;
}

/// Loads the alias table from a JSON file of the form
/// `{ "CCTV-1": ["cctv1", "CCTV1 综合"], ... }`. A `None` path yields an
/// empty table.
pub struct FileAliasLoader {
    path: Option<PathBuf>,
}

impl FileAliasLoader {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl AliasLoader for FileAliasLoader {
    fn load(&self) -> Result<AliasTable, SourceError> {
        let Some(path) = &self.path else {
            return Ok(AliasTable::empty());
        };
        load_alias_file(path)
    }
}

fn load_alias_file(path: &Path) -> Result<AliasTable, SourceError> {
    let contents = std::fs::read_to_string(path)?;
    let entries: HashMap<String, Vec<String>> = serde_json::from_str(&contents)
        .map_err(|e| SourceError::parse("alias table", e.to_string()))?;

    debug!(
        "loaded {} alias entries from {}",
        entries.len(),
        path.display()
    );
    Ok(AliasTable::from_entries(entries))
}
