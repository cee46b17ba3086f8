//! Source fetch collaborators
//!
//! The pipeline consumes these as trait objects: fetching may fail and is
//! retried by the caller, never by the fetcher itself. Concrete
//! implementations keep their own disk cache so a fresh enough download is
//! reused instead of refetched.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{debug, warn};

use crate::errors::SourceError;
use crate::models::{ChannelGroupList, EpgList};

pub mod m3u;
pub mod xmltv;

/// Retrieves the raw channel listing from the configured source.
#[async_trait]
pub trait ChannelSource: Send + Sync {
    /// Fetch the channel group list, reusing a cached download no older
    /// than `cache_ttl`.
    async fn fetch_channels(&self, cache_ttl: Duration) -> Result<ChannelGroupList, SourceError>;
}

/// Retrieves program-guide data from the configured source.
#[async_trait]
pub trait EpgSource: Send + Sync {
    /// Fetch guide data for the given channel names, reusing cached data
    /// younger than `stale_threshold`.
    async fn fetch_epg(
        &self,
        filter_names: &[String],
        stale_threshold: Duration,
    ) -> Result<EpgList, SourceError>;
}

/// Single-file disk cache for a downloaded source document.
///
/// Freshness is judged by file modification time. Reads and writes are best
/// effort: a broken cache only costs a refetch, and a failed write only
/// costs the next run a download.
pub(crate) struct SourceCache {
    path: PathBuf,
}

impl SourceCache {
    pub(crate) fn new(dir: &Path, file_name: &str) -> Self {
        Self {
            path: dir.join(file_name),
        }
    }

    /// Return the cached document if it exists and is younger than
    /// `max_age`.
    pub(crate) fn read_fresh(&self, max_age: Duration) -> Option<String> {
        let modified = std::fs::metadata(&self.path).ok()?.modified().ok()?;
        let age = SystemTime::now().duration_since(modified).ok()?;
        if age > max_age {
            debug!(
                "cache {} is stale ({}s old)",
                self.path.display(),
                age.as_secs()
            );
            return None;
        }

        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                debug!(
                    "using cached {} ({}s old)",
                    self.path.display(),
                    age.as_secs()
                );
                Some(contents)
            }
            Err(e) => {
                warn!("failed to read cache {}: {}", self.path.display(), e);
                None
            }
        }
    }

    pub(crate) fn write(&self, contents: &str) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("failed to create cache dir {}: {}", parent.display(), e);
                return;
            }
        }
        if let Err(e) = std::fs::write(&self.path, contents) {
            warn!("failed to write cache {}: {}", self.path.display(), e);
        }
    }
}
