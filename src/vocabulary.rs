//! Vocabulary (feature map) selection from a story corpus.

use crate::features::FeatureVector;
use crate::story::StoryRecord;
use crate::tokenizer::extract_keywords;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Number of hour-of-day slots appended after the keyword and host blocks.
pub const HOUR_SLOTS: usize = 24;
/// Number of day-of-week slots appended after the hour block.
pub const WEEKDAY_SLOTS: usize = 7;

/// Minimum document frequency required per vocabulary category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UbiquityThresholds {
    /// Stories a content keyword must appear in.
    pub content: usize,
    /// Stories a title keyword must appear in.
    pub title: usize,
    /// Stories a host name must appear in.
    pub host: usize,
}

impl Default for UbiquityThresholds {
    fn default() -> Self {
        Self {
            content: 2,
            title: 1,
            host: 1,
        }
    }
}

/// Affine rewrite applied to every emitted feature value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Normalization {
    /// Subtracted from each value.
    pub offset: f64,
    /// Multiplied after the offset is removed.
    pub scale: f64,
}

impl Normalization {
    /// Applies `(value - offset) * scale`.
    pub fn apply(&self, value: f64) -> f64 {
        (value - self.offset) * self.scale
    }
}

/// Describes how story data maps onto vector positions.
///
/// Keyword and host order is the permanent index mapping for any classifier
/// trained against this vocabulary, so it is never reordered after `build`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vocabulary {
    /// Content keywords, occupying indices `0..content_keywords.len()`.
    pub content_keywords: Vec<String>,
    /// Title keywords, following the content block.
    pub title_keywords: Vec<String>,
    /// Host names, following the title block.
    pub host_names: Vec<String>,
    /// Optional value normalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalization: Option<Normalization>,
}

impl Vocabulary {
    /// Builds a vocabulary from `stories`, keeping entries whose document
    /// frequency meets the category threshold.
    pub fn build(stories: &[StoryRecord], thresholds: UbiquityThresholds) -> Self {
        let mut content_seen: BTreeMap<String, usize> = BTreeMap::new();
        let mut title_seen: BTreeMap<String, usize> = BTreeMap::new();
        let mut host_seen: BTreeMap<String, usize> = BTreeMap::new();

        for story in stories {
            for keyword in extract_keywords(&story.content).into_keys() {
                *content_seen.entry(keyword).or_insert(0) += 1;
            }
            for keyword in extract_keywords(&story.title).into_keys() {
                *title_seen.entry(keyword).or_insert(0) += 1;
            }
            if !story.host_name.is_empty() {
                *host_seen.entry(story.host_name.clone()).or_insert(0) += 1;
            }
        }

        Self {
            content_keywords: retain_ubiquitous(content_seen, thresholds.content),
            title_keywords: retain_ubiquitous(title_seen, thresholds.title),
            host_names: retain_ubiquitous(host_seen, thresholds.host),
            normalization: None,
        }
    }

    /// Attaches value normalization to the vocabulary.
    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = Some(normalization);
        self
    }

    /// Total feature width, including the 24 hour and 7 weekday slots.
    pub fn vector_size(&self) -> usize {
        self.time_offset() + HOUR_SLOTS + WEEKDAY_SLOTS
    }

    /// Index of the first hour-of-day slot.
    pub fn time_offset(&self) -> usize {
        self.content_keywords.len() + self.title_keywords.len() + self.host_names.len()
    }

    /// Encodes `story` against this vocabulary.
    pub fn encode(&self, story: &StoryRecord) -> FeatureVector {
        FeatureVector::encode(story, self)
    }
}

fn retain_ubiquitous(seen: BTreeMap<String, usize>, threshold: usize) -> Vec<String> {
    seen.into_iter()
        .filter(|(_, count)| *count >= threshold)
        .map(|(key, _)| key)
        .collect()
}
