//! Duplicate-channel merging
//!
//! Within each group, channels whose names resolve to the same canonical
//! identity collapse into one channel carrying the union of their stream
//! URLs. Merging never crosses group boundaries: the same channel listed in
//! two groups stays listed in both.

use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::models::{Channel, ChannelGroup, ChannelGroupList};
use crate::utils::channel_alias::AliasTable;

/// Merge channels with alias-equivalent names.
///
/// Disabled merging is the identity transform. When enabled, the result is
/// fully determined by input order and the alias snapshot: partitions keep
/// first-encounter order, the first channel of a partition supplies the
/// non-name metadata, and URL lists concatenate in encounter order with
/// duplicates removed (first occurrence wins).
pub fn merge_similar_channels(
    groups: ChannelGroupList,
    enabled: bool,
    aliases: &AliasTable,
) -> ChannelGroupList {
    if !enabled {
        return groups;
    }

    let before = groups.channel_count();
    let merged = ChannelGroupList::new(
        groups
            .0
            .into_iter()
            .map(|group| merge_group(group, aliases))
            .collect(),
    );

    if merged.channel_count() != before {
        debug!(
            "merged {} channels down to {}",
            before,
            merged.channel_count()
        );
    }
    merged
}

fn merge_group(group: ChannelGroup, aliases: &AliasTable) -> ChannelGroup {
    let mut slots: Vec<MergeSlot> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for channel in group.channels {
        let canonical = aliases.standard_name(&channel.name);
        match index.get(&canonical) {
            Some(&slot) => slots[slot].absorb(channel),
            None => {
                index.insert(canonical.clone(), slots.len());
                slots.push(MergeSlot::new(canonical, channel));
            }
        }
    }

    ChannelGroup {
        name: group.name,
        channels: slots.into_iter().map(MergeSlot::into_channel).collect(),
    }
}

/// Accumulator for one canonical identity. The first channel encountered
/// supplies the template metadata; later members only contribute URLs.
struct MergeSlot {
    canonical: String,
    epg_name: String,
    logo: Option<String>,
    url_list: Vec<String>,
    seen: HashSet<String>,
}

impl MergeSlot {
    fn new(canonical: String, first: Channel) -> Self {
        let mut slot = Self {
            canonical,
            epg_name: first.epg_name,
            logo: first.logo,
            url_list: Vec::new(),
            seen: HashSet::new(),
        };
        slot.push_urls(first.url_list);
        slot
    }

    fn absorb(&mut self, member: Channel) {
        self.push_urls(member.url_list);
    }

    fn push_urls(&mut self, urls: Vec<String>) {
        for url in urls {
            if self.seen.insert(url.clone()) {
                self.url_list.push(url);
            }
        }
    }

    fn into_channel(self) -> Channel {
        Channel {
            name: self.canonical,
            epg_name: self.epg_name,
            url_list: self.url_list,
            logo: self.logo,
        }
    }
}
