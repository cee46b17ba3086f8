//! XMLTV program-guide source
//!
//! Fetches the configured XMLTV document over HTTP, caches it on disk, and
//! extracts `<channel>`/`<programme>` sections with targeted regexes rather
//! than a full XML parse. Only channels named in the filter set are kept, so
//! guide data for channels the playlist does not carry never enters the
//! pipeline.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use reqwest::Client;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{EpgSource, SourceCache};
use crate::config::EpgConfig;
use crate::errors::SourceError;
use crate::models::{Epg, EpgList, EpgProgramme};

pub struct XmltvEpgSource {
    client: Client,
    url: String,
    cache: SourceCache,
}

impl XmltvEpgSource {
    pub fn new(config: &EpgConfig, cache_dir: &Path) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            url: config.url.clone(),
            cache: SourceCache::new(cache_dir, "epg.xml"),
        }
    }

    async fn download(&self) -> Result<String, SourceError> {
        debug!("downloading XMLTV guide from {}", self.url);
        let response = self.client.get(&self.url).send().await?;
        let response = response.error_for_status()?;
        Ok(response.text().await?)
    }

    /// Parse an XMLTV document, keeping only channels whose display name or
    /// id appears in `filter_names`.
    pub fn parse_xmltv(content: &str, filter_names: &[String]) -> Result<EpgList, SourceError> {
        let channel_sections = extract_sections(content, "channel");
        if channel_sections.is_empty() {
            return Err(SourceError::parse("xmltv", "no channel entries found"));
        }

        // channel id -> the filter name it satisfies
        let mut id_to_name: HashMap<String, String> = HashMap::new();
        for section in &channel_sections {
            let Some(id) = capture(section, r#"id="([^"]+)""#) else {
                continue;
            };
            let display_names = capture_all(section, r"<display-name[^>]*>([^<]+)</display-name>");

            let matched = filter_names
                .iter()
                .find(|name| display_names.iter().any(|d| d == *name) || **name == id);
            if let Some(name) = matched {
                id_to_name.insert(id, name.clone());
            }
        }

        let mut programmes: HashMap<String, Vec<EpgProgramme>> = HashMap::new();
        let mut skipped = 0usize;
        for section in extract_sections(content, "programme") {
            let Some(channel_id) = capture(&section, r#"channel="([^"]+)""#) else {
                skipped += 1;
                continue;
            };
            let Some(name) = id_to_name.get(&channel_id) else {
                continue;
            };

            match parse_programme(&section) {
                Some(programme) => programmes.entry(name.clone()).or_default().push(programme),
                None => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!("skipped {} malformed programme entries", skipped);
        }

        let mut entries = Vec::new();
        for name in filter_names {
            if !id_to_name.values().any(|mapped| mapped == name) {
                continue;
            }
            let mut channel_programmes = programmes.remove(name).unwrap_or_default();
            channel_programmes.sort_by_key(|p| p.start);
            entries.push(Epg {
                channel_name: name.clone(),
                programmes: channel_programmes,
            });
        }

        Ok(EpgList::new(entries))
    }
}

fn parse_programme(section: &str) -> Option<EpgProgramme> {
    let start = parse_xmltv_datetime(&capture(section, r#"start="([^"]+)""#)?)?;
    let end = parse_xmltv_datetime(&capture(section, r#"stop="([^"]+)""#)?)?;
    let title = capture(section, r"<title[^>]*>([^<]+)</title>")?;

    Some(EpgProgramme { start, end, title })
}

/// Extract whole `<tag ...>...</tag>` sections. Sections may span lines.
fn extract_sections(content: &str, tag: &str) -> Vec<String> {
    let pattern = format!(r"(?s)<{tag}\s+[^>]*>.*?</{tag}>");
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(e) => {
            warn!("failed to compile section regex for '{}': {}", tag, e);
            return Vec::new();
        }
    };

    re.find_iter(content)
        .map(|m| m.as_str().to_string())
        .collect()
}

fn capture(section: &str, pattern: &str) -> Option<String> {
    let re = Regex::new(pattern).ok()?;
    re.captures(section)?
        .get(1)
        .map(|m| m.as_str().trim().to_string())
}

fn capture_all(section: &str, pattern: &str) -> Vec<String> {
    let Ok(re) = Regex::new(pattern) else {
        return Vec::new();
    };
    re.captures_iter(section)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
        .collect()
}

/// XMLTV datetime: `YYYYMMDDHHMMSS ±HHMM`, offset optional (UTC assumed).
fn parse_xmltv_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y%m%d%H%M%S %z") {
        return Some(dt.with_timezone(&Utc));
    }

    let bare = value.split_whitespace().next()?;
    let naive = NaiveDateTime::parse_from_str(bare, "%Y%m%d%H%M%S").ok()?;
    Some(Utc.from_utc_datetime(&naive))
}

#[async_trait]
impl EpgSource for XmltvEpgSource {
    async fn fetch_epg(
        &self,
        filter_names: &[String],
        stale_threshold: Duration,
    ) -> Result<EpgList, SourceError> {
        if let Some(cached) = self.cache.read_fresh(stale_threshold) {
            match Self::parse_xmltv(&cached, filter_names) {
                Ok(list) => return Ok(list),
                Err(e) => warn!("cached guide is unusable ({}), refetching", e),
            }
        }

        let content = self.download().await?;
        let list = Self::parse_xmltv(&content, filter_names)?;
        self.cache.write(&content);

        info!(
            "fetched guide data for {} of {} channels ({} programmes)",
            list.channel_count(),
            filter_names.len(),
            list.programme_count()
        );
        Ok(list)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    const GUIDE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<tv generator-info-name="test">
  <channel id="cctv1.cn">
    <display-name>CCTV1</display-name>
    <display-name>CCTV-1 综合</display-name>
  </channel>
  <channel id="hunan.cn">
    <display-name>HunanTV</display-name>
  </channel>
  <programme start="20260107120000 +0800" stop="20260107130000 +0800" channel="cctv1.cn">
    <title lang="zh">新闻30分</title>
  </programme>
  <programme start="20260107110000 +0800" stop="20260107120000 +0800" channel="cctv1.cn">
    <title lang="zh">今日说法</title>
  </programme>
  <programme start="20260107120000 +0800" stop="20260107140000 +0800" channel="hunan.cn">
    <title>快乐大本营</title>
  </programme>
  <programme start="garbage" stop="20260107140000 +0800" channel="cctv1.cn">
    <title>Broken</title>
  </programme>
</tv>
"#;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn filters_to_requested_channels() {
        let list = XmltvEpgSource::parse_xmltv(GUIDE, &names(&["CCTV1"])).unwrap();

        assert_eq!(list.channel_count(), 1);
        assert_eq!(list.0[0].channel_name, "CCTV1");
        assert_eq!(list.0[0].programmes.len(), 2);
    }

    #[test]
    fn programmes_are_sorted_by_start_time() {
        let list = XmltvEpgSource::parse_xmltv(GUIDE, &names(&["CCTV1"])).unwrap();
        let programmes = &list.0[0].programmes;

        assert_eq!(programmes[0].title, "今日说法");
        assert_eq!(programmes[1].title, "新闻30分");
        assert!(programmes[0].start < programmes[1].start);
    }

    #[test]
    fn timezone_offset_is_applied() {
        let list = XmltvEpgSource::parse_xmltv(GUIDE, &names(&["CCTV1"])).unwrap();
        // 12:00 +0800 is 04:00 UTC
        assert_eq!(list.0[0].programmes[1].start.hour(), 4);
    }

    #[test]
    fn any_display_name_or_id_matches() {
        let by_alt = XmltvEpgSource::parse_xmltv(GUIDE, &names(&["CCTV-1 综合"])).unwrap();
        assert_eq!(by_alt.channel_count(), 1);

        let by_id = XmltvEpgSource::parse_xmltv(GUIDE, &names(&["hunan.cn"])).unwrap();
        assert_eq!(by_id.channel_count(), 1);
        assert_eq!(by_id.0[0].programmes.len(), 1);
    }

    #[test]
    fn malformed_programmes_are_skipped() {
        let list = XmltvEpgSource::parse_xmltv(GUIDE, &names(&["CCTV1", "HunanTV"])).unwrap();
        assert_eq!(list.programme_count(), 3);
    }

    #[test]
    fn unknown_channels_are_absent_not_empty() {
        let list = XmltvEpgSource::parse_xmltv(GUIDE, &names(&["CCTV1", "Nonexistent"])).unwrap();
        assert_eq!(list.channel_count(), 1);
        assert!(list.find("Nonexistent").is_none());
    }

    #[test]
    fn document_without_channels_is_a_parse_error() {
        let err = XmltvEpgSource::parse_xmltv("<html>not a guide</html>", &names(&["CCTV1"]))
            .unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn bare_datetime_without_offset_is_utc() {
        let parsed = parse_xmltv_datetime("20260107120000").unwrap();
        assert_eq!(parsed.hour(), 12);
    }
}
