//! Hybrid stream URL resolution
//!
//! Some channels have an alternate browser-rendered stream in addition to
//! their direct stream URLs. Depending on the configured mode the alternate
//! URLs are appended after or prepended before the direct list. Unlike
//! merging, this stage performs no deduplication; a URL present in both the
//! playlist and the hybrid table appears twice.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::errors::SourceError;
use crate::models::{Channel, ChannelGroup, ChannelGroupList, HybridMode};
use crate::utils::normalize_lookup_key;

/// Lookup seam for alternate stream URLs, a pure function of channel name.
/// A name with no entry yields an empty list, never an error.
pub trait HybridUrlProvider: Send + Sync {
    fn lookup(&self, channel_name: &str) -> Vec<String>;
}

/// Hybrid URL table backed by a JSON file of the form
/// `{ "CCTV-1": ["https://tv.example.com/cctv1"], ... }`.
pub struct HybridUrlTable {
    entries: HashMap<String, Vec<String>>,
}

impl HybridUrlTable {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn from_entries(entries: HashMap<String, Vec<String>>) -> Self {
        let entries = entries
            .into_iter()
            .map(|(name, urls)| (normalize_lookup_key(&name), urls))
            .collect();
        Self { entries }
    }

    pub fn load(path: &Path) -> Result<Self, SourceError> {
        let contents = std::fs::read_to_string(path)?;
        let entries: HashMap<String, Vec<String>> = serde_json::from_str(&contents)
            .map_err(|e| SourceError::parse("hybrid table", e.to_string()))?;

        debug!(
            "loaded {} hybrid URL entries from {}",
            entries.len(),
            path.display()
        );
        Ok(Self::from_entries(entries))
    }

    /// Load the table, falling back to an empty one when no file is
    /// configured or the file cannot be read. Hybrid URLs are a supplement;
    /// their absence never blocks aggregation.
    pub fn load_or_empty(path: Option<&PathBuf>) -> Self {
        match path {
            Some(path) => match Self::load(path) {
                Ok(table) => table,
                Err(e) => {
                    warn!("failed to load hybrid URL table: {}", e);
                    Self::empty()
                }
            },
            None => Self::empty(),
        }
    }
}

impl HybridUrlProvider for HybridUrlTable {
    fn lookup(&self, channel_name: &str) -> Vec<String> {
        self.entries
            .get(&normalize_lookup_key(channel_name))
            .cloned()
            .unwrap_or_default()
    }
}

/// Apply the hybrid URL policy to every channel.
pub fn resolve_hybrid_urls(
    groups: ChannelGroupList,
    mode: HybridMode,
    provider: &dyn HybridUrlProvider,
) -> ChannelGroupList {
    if mode == HybridMode::Disable {
        return groups;
    }

    ChannelGroupList::new(
        groups
            .0
            .into_iter()
            .map(|group| ChannelGroup {
                name: group.name,
                channels: group
                    .channels
                    .into_iter()
                    .map(|channel| resolve_channel(channel, mode, provider))
                    .collect(),
            })
            .collect(),
    )
}

fn resolve_channel(
    mut channel: Channel,
    mode: HybridMode,
    provider: &dyn HybridUrlProvider,
) -> Channel {
    let hybrid_urls = provider.lookup(&channel.name);
    if hybrid_urls.is_empty() {
        return channel;
    }

    channel.url_list = match mode {
        HybridMode::Disable => channel.url_list,
        HybridMode::IptvFirst => {
            let mut urls = channel.url_list;
            urls.extend(hybrid_urls);
            urls
        }
        HybridMode::HybridFirst => {
            let mut urls = hybrid_urls;
            urls.extend(channel.url_list);
            urls
        }
    };
    channel
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> HybridUrlTable {
        let mut entries = HashMap::new();
        entries.insert(
            "CCTV-1".to_string(),
            vec!["https://tv.example.com/cctv1".to_string()],
        );
        HybridUrlTable::from_entries(entries)
    }

    fn groups() -> ChannelGroupList {
        ChannelGroupList::new(vec![ChannelGroup {
            name: "News".to_string(),
            channels: vec![Channel {
                name: "CCTV-1".to_string(),
                epg_name: "CCTV1".to_string(),
                url_list: vec!["http://example.com/x".to_string()],
                logo: None,
            }],
        }])
    }

    fn urls(groups: &ChannelGroupList) -> Vec<String> {
        groups.groups()[0].channels[0].url_list.clone()
    }

    #[test]
    fn disable_leaves_input_unchanged() {
        let input = groups();
        let result = resolve_hybrid_urls(input.clone(), HybridMode::Disable, &provider());
        assert_eq!(result, input);
    }

    #[test]
    fn iptv_first_appends_hybrid_urls() {
        let result = resolve_hybrid_urls(groups(), HybridMode::IptvFirst, &provider());
        assert_eq!(
            urls(&result),
            vec!["http://example.com/x", "https://tv.example.com/cctv1"]
        );
    }

    #[test]
    fn hybrid_first_prepends_hybrid_urls() {
        let result = resolve_hybrid_urls(groups(), HybridMode::HybridFirst, &provider());
        assert_eq!(
            urls(&result),
            vec!["https://tv.example.com/cctv1", "http://example.com/x"]
        );
    }

    #[test]
    fn missing_lookup_leaves_url_list_unchanged() {
        let mut input = groups();
        input.0[0].channels[0].name = "BBC One".to_string();

        for mode in [
            HybridMode::Disable,
            HybridMode::IptvFirst,
            HybridMode::HybridFirst,
        ] {
            let result = resolve_hybrid_urls(input.clone(), mode, &provider());
            assert_eq!(urls(&result), vec!["http://example.com/x"]);
        }
    }

    #[test]
    fn duplicates_across_sources_are_permitted() {
        let mut entries = HashMap::new();
        entries.insert(
            "CCTV-1".to_string(),
            vec!["http://example.com/x".to_string()],
        );
        let provider = HybridUrlTable::from_entries(entries);

        let result = resolve_hybrid_urls(groups(), HybridMode::IptvFirst, &provider);
        assert_eq!(
            urls(&result),
            vec!["http://example.com/x", "http://example.com/x"]
        );
    }

    #[test]
    fn table_lookup_tolerates_spelling_differences() {
        let provider = provider();
        assert_eq!(provider.lookup("cctv 1").len(), 1);
        assert_eq!(provider.lookup("unknown").len(), 0);
    }
}
