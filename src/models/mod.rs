//! Core data model for the aggregation pipeline
//!
//! Channels and groups are plain value types; transforms in the pipeline
//! consume and re-produce them rather than mutating shared state. Once a
//! `ChannelGroupList` has been published in a `Ready` state it is never
//! modified in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single live channel.
///
/// `url_list` is ordered by playback priority (first entry is the preferred
/// source) and never contains duplicate entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    /// Name used to look this channel up in program-guide data. Usually the
    /// `tvg-name` attribute from the playlist, falling back to `name`.
    pub epg_name: String,
    pub url_list: Vec<String>,
    pub logo: Option<String>,
}

/// A named group of channels, in the order the source listed them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelGroup {
    pub name: String,
    pub channels: Vec<Channel>,
}

/// Ordered list of channel groups as produced by one pipeline run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelGroupList(pub Vec<ChannelGroup>);

impl ChannelGroupList {
    pub fn new(groups: Vec<ChannelGroup>) -> Self {
        Self(groups)
    }

    pub fn groups(&self) -> &[ChannelGroup] {
        &self.0
    }

    /// Iterate over every channel across all groups, in group order.
    pub fn channels(&self) -> impl Iterator<Item = &Channel> {
        self.0.iter().flat_map(|group| group.channels.iter())
    }

    pub fn channel_count(&self) -> usize {
        self.0.iter().map(|group| group.channels.len()).sum()
    }

    /// Distinct `epg_name` values in first-appearance order, used to filter
    /// the EPG fetch to channels that are actually listed.
    pub fn epg_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for channel in self.channels() {
            if channel.epg_name.is_empty() {
                continue;
            }
            if !names.iter().any(|name| name == &channel.epg_name) {
                names.push(channel.epg_name.clone());
            }
        }
        names
    }
}

/// One scheduled programme on a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpgProgramme {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub title: String,
}

/// Programme schedule for a single channel, keyed by the channel's
/// `epg_name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Epg {
    pub channel_name: String,
    pub programmes: Vec<EpgProgramme>,
}

/// Program-guide data for the channels of one pipeline run. Attached to the
/// `Ready` state as a whole; never merged into individual channels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpgList(pub Vec<Epg>);

impl EpgList {
    pub fn new(entries: Vec<Epg>) -> Self {
        Self(entries)
    }

    pub fn find(&self, channel_name: &str) -> Option<&Epg> {
        self.0.iter().find(|epg| epg.channel_name == channel_name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn channel_count(&self) -> usize {
        self.0.len()
    }

    pub fn programme_count(&self) -> usize {
        self.0.iter().map(|epg| epg.programmes.len()).sum()
    }
}

/// Placement policy for alternate browser-rendered ("hybrid") stream URLs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HybridMode {
    #[default]
    Disable,
    /// Direct stream URLs keep priority; hybrid URLs are appended.
    IptvFirst,
    /// Hybrid URLs take priority; direct stream URLs follow.
    HybridFirst,
}

/// Observable state of the aggregation pipeline.
///
/// Exactly one value is current at any time. Within a single run the
/// transitions are monotonic: `Loading` may repeat with progress messages,
/// then settles in `Error` or `Ready`. Once `Ready`, only the `epg` field is
/// replaced by the EPG sub-run; the channel list is never re-derived without
/// a fresh run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Loading {
        message: Option<String>,
    },
    Error {
        message: Option<String>,
    },
    Ready {
        channel_groups: ChannelGroupList,
        epg: EpgList,
    },
}

impl PipelineState {
    pub fn loading(message: impl Into<String>) -> Self {
        Self::Loading {
            message: Some(message.into()),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: Some(message.into()),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }
}
