//! Story records at the two ends of ingestion: raw HN items and pipeline input.

use crate::error::{PipelineError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use url::Url;

/// HN item type carried by link and text stories.
pub const STORY_TYPE: &str = "story";

/// Raw story item as returned by the HN API and stored in story lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoryItem {
    /// HN item id.
    pub id: u64,
    /// Unix seconds when the item was posted.
    #[serde(default)]
    pub time: i64,
    /// Item type (`story`, `comment`, `job`, ...).
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Story title.
    #[serde(default)]
    pub title: String,
    /// Outbound link, empty for text posts.
    #[serde(default)]
    pub url: String,
    /// Points at fetch time.
    #[serde(default)]
    pub score: i64,
}

impl StoryItem {
    /// Whether the item is a story rather than a comment, job or poll.
    pub fn is_story(&self) -> bool {
        self.kind == STORY_TYPE
    }

    /// Posting time as a UTC instant (epoch for out-of-range values).
    pub fn posted_at(&self) -> DateTime<Utc> {
        unix_to_utc(self.time)
    }

    /// Host of the outbound URL, or an empty string when absent or unparseable.
    pub fn host_name(&self) -> String {
        host_from_url(&self.url)
    }

    /// Pairs the item with scraped article text to form a pipeline record.
    pub fn to_record(&self, content: String) -> StoryRecord {
        StoryRecord {
            title: self.title.clone(),
            content,
            host_name: self.host_name(),
            timestamp: self.posted_at(),
        }
    }
}

/// Immutable pipeline input consumed by the vocabulary builder and encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryRecord {
    /// Story title.
    pub title: String,
    /// Article body text, empty if unavailable.
    pub content: String,
    /// Host of the outbound link, empty if none.
    pub host_name: String,
    /// Posting instant.
    pub timestamp: DateTime<Utc>,
}

/// Extracts the host (with port, if any) from a URL string.
pub fn host_from_url(raw: &str) -> String {
    if raw.trim().is_empty() {
        return String::new();
    }
    Url::parse(raw)
        .ok()
        .and_then(|url| {
            let host = url.host_str()?.to_string();
            Some(match url.port() {
                Some(port) => format!("{host}:{port}"),
                None => host,
            })
        })
        .unwrap_or_default()
}

/// Converts unix seconds to a UTC instant, clamping invalid values to the epoch.
pub fn unix_to_utc(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
}

/// Reads a JSON array of story items.
pub fn load_story_list(path: &Path) -> Result<Vec<StoryItem>> {
    let data = fs::read(path).map_err(|err| PipelineError::io(path, err))?;
    serde_json::from_slice(&data).map_err(|err| {
        PipelineError::corrupt(format!("story list {}: {err}", path.display()))
    })
}

/// Writes story items as a JSON array.
pub fn save_story_list(path: &Path, stories: &[StoryItem]) -> Result<()> {
    let data = serde_json::to_vec(stories)
        .map_err(|err| PipelineError::corrupt(format!("story list encoding: {err}")))?;
    fs::write(path, data).map_err(|err| PipelineError::io(path, err))
}

/// Tally of stories whose score exceeds a threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreTally {
    /// Stories with `score > threshold`.
    pub matched: usize,
    /// Stories inspected.
    pub total: usize,
}

impl ScoreTally {
    /// Matched fraction in `[0, 1]`; zero for an empty list.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.matched as f64 / self.total as f64
        }
    }
}

/// Counts how many stories scored strictly above `threshold`.
pub fn fraction_above(stories: &[StoryItem], threshold: i64) -> ScoreTally {
    let matched = stories.iter().filter(|s| s.score > threshold).count();
    ScoreTally {
        matched,
        total: stories.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    fn item(id: u64, score: i64, url: &str) -> StoryItem {
        StoryItem {
            id,
            time: 1_700_000_000,
            kind: STORY_TYPE.to_string(),
            title: format!("story {id}"),
            url: url.to_string(),
            score,
        }
    }

    #[test]
    fn hosts_are_extracted_from_urls() {
        assert_eq!(host_from_url("https://blog.rust-lang.org/x"), "blog.rust-lang.org");
        assert_eq!(host_from_url("http://localhost:8080/a"), "localhost:8080");
        assert_eq!(host_from_url(""), "");
        assert_eq!(host_from_url("not a url"), "");
    }

    #[test]
    fn parses_hn_item_json() {
        let raw = r#"{"by":"pg","id":1,"score":57,"time":1160418111,
            "title":"Y Combinator","type":"story","url":"http://ycombinator.com"}"#;
        let item: StoryItem = serde_json::from_str(raw).expect("item");
        assert!(item.is_story());
        assert_eq!(item.host_name(), "ycombinator.com");
        let posted = item.posted_at();
        assert_eq!(posted.year(), 2006);
        assert_eq!(posted.hour(), 18);
    }

    #[test]
    fn record_carries_host_and_time() {
        let record = item(7, 3, "https://example.com/post").to_record("body".into());
        assert_eq!(record.host_name, "example.com");
        assert_eq!(record.content, "body");
        assert_eq!(record.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn fraction_above_counts_strictly_greater() {
        let stories = vec![item(1, 1, ""), item(2, 5, ""), item(3, 10, ""), item(4, 50, "")];
        let tally = fraction_above(&stories, 5);
        assert_eq!(tally, ScoreTally { matched: 2, total: 4 });
        assert!((tally.fraction() - 0.5).abs() < 1e-12);
        assert_eq!(fraction_above(&[], 5).fraction(), 0.0);
    }
}
