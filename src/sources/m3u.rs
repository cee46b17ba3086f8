//! M3U playlist source
//!
//! Fetches the configured playlist over HTTP, caches the raw document on
//! disk, and parses EXTINF entries into channel groups. Grouping follows the
//! `group-title` attribute, preserving the order in which groups first
//! appear in the playlist.

use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ChannelSource, SourceCache};
use crate::config::SourceConfig;
use crate::errors::SourceError;
use crate::models::{Channel, ChannelGroup, ChannelGroupList};

const DEFAULT_USER_AGENT: &str = concat!("iptv-aggregator/", env!("CARGO_PKG_VERSION"));
const UNGROUPED: &str = "Uncategorized";

pub struct M3uChannelSource {
    client: Client,
    url: String,
    cache: SourceCache,
}

impl M3uChannelSource {
    pub fn new(config: &SourceConfig, cache_dir: &Path) -> Self {
        let user_agent = config
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(user_agent)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            url: config.url.clone(),
            cache: SourceCache::new(cache_dir, "channels.m3u"),
        }
    }

    async fn download(&self) -> Result<String, SourceError> {
        debug!("downloading playlist from {}", self.url);
        let response = self.client.get(&self.url).send().await?;
        let response = response.error_for_status()?;
        Ok(response.text().await?)
    }

    /// Parse a playlist document into grouped channels.
    pub fn parse_playlist(content: &str) -> Result<ChannelGroupList, SourceError> {
        let mut groups: Vec<ChannelGroup> = Vec::new();
        let mut group_index: HashMap<String, usize> = HashMap::new();
        let mut pending: Option<(Channel, String)> = None;

        for (line_num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(extinf) = line.strip_prefix("#EXTINF:") {
                pending = parse_extinf(extinf);
            } else if line.starts_with('#') {
                continue;
            } else if let Some((mut channel, group_name)) = pending.take() {
                channel.url_list = vec![line.to_string()];
                let slot = match group_index.get(&group_name) {
                    Some(&slot) => slot,
                    None => {
                        group_index.insert(group_name.clone(), groups.len());
                        groups.push(ChannelGroup {
                            name: group_name,
                            channels: Vec::new(),
                        });
                        groups.len() - 1
                    }
                };
                groups[slot].channels.push(channel);
            } else {
                warn!(
                    "stream URL without EXTINF metadata at line {}, skipping",
                    line_num + 1
                );
            }
        }

        if groups.is_empty() {
            return Err(SourceError::parse("m3u", "no channels found in playlist"));
        }
        Ok(ChannelGroupList::new(groups))
    }
}

/// Parse one `#EXTINF:` line (already stripped of the prefix) into a channel
/// and its group name. Returns `None` for lines without a title.
fn parse_extinf(extinf: &str) -> Option<(Channel, String)> {
    // Format: duration [key="value"]...,title
    let comma = extinf.rfind(',')?;
    let (duration_and_attrs, title) = extinf.split_at(comma);
    let title = title.trim_start_matches(',').trim();
    if title.is_empty() {
        return None;
    }

    let attributes = parse_attributes(duration_and_attrs);
    let epg_name = attributes
        .get("tvg-name")
        .or_else(|| attributes.get("tvg-id"))
        .cloned()
        .unwrap_or_else(|| title.to_string());
    let group = attributes
        .get("group-title")
        .cloned()
        .filter(|g| !g.is_empty())
        .unwrap_or_else(|| UNGROUPED.to_string());

    let channel = Channel {
        name: title.to_string(),
        epg_name,
        url_list: Vec::new(),
        logo: attributes.get("tvg-logo").cloned().filter(|l| !l.is_empty()),
    };
    Some((channel, group))
}

/// Scan `key="value"` pairs out of the part before the title comma.
fn parse_attributes(attrs_part: &str) -> HashMap<String, String> {
    let mut attributes = HashMap::new();
    let mut rest = attrs_part;

    while let Some(eq) = rest.find("=\"") {
        let key = rest[..eq]
            .rsplit(|c: char| c.is_whitespace())
            .next()
            .unwrap_or("")
            .to_string();
        let value_start = eq + 2;
        match rest[value_start..].find('"') {
            Some(end) => {
                if !key.is_empty() {
                    attributes.insert(key, rest[value_start..value_start + end].to_string());
                }
                rest = &rest[value_start + end + 1..];
            }
            None => break,
        }
    }

    attributes
}

#[async_trait]
impl ChannelSource for M3uChannelSource {
    async fn fetch_channels(&self, cache_ttl: Duration) -> Result<ChannelGroupList, SourceError> {
        if let Some(cached) = self.cache.read_fresh(cache_ttl) {
            match Self::parse_playlist(&cached) {
                Ok(groups) => return Ok(groups),
                // A broken cache is not fatal; fall through to a refetch.
                Err(e) => warn!("cached playlist is unusable ({}), refetching", e),
            }
        }

        let content = self.download().await?;
        let groups = Self::parse_playlist(&content)?;
        self.cache.write(&content);

        info!(
            "fetched {} channels in {} groups from {}",
            groups.channel_count(),
            groups.groups().len(),
            self.url
        );
        Ok(groups)
    }
}
