//! Sparse feature vectors derived from a story and a vocabulary.

use crate::story::StoryRecord;
use crate::tokenizer::extract_keywords;
use crate::vocabulary::{Vocabulary, HOUR_SLOTS};
use chrono::{Datelike, Timelike};

/// One non-zero entry of a feature vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureValue {
    /// Position within the vocabulary's vector layout.
    pub index: usize,
    /// Feature value at `index`.
    pub value: f64,
}

/// Sparse vector of `(index, value)` pairs sorted by ascending index.
///
/// Indices that are absent are implicitly zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    values: Vec<FeatureValue>,
}

impl FeatureVector {
    /// Encodes `story` against `vocab`.
    ///
    /// Blocks are emitted in layout order (content, title, host, hour,
    /// weekday), each already ascending, so the result needs no sorting.
    pub fn encode(story: &StoryRecord, vocab: &Vocabulary) -> Self {
        let mut encoder = Encoder::new(vocab);

        let content = extract_keywords(&story.content);
        for (i, keyword) in vocab.content_keywords.iter().enumerate() {
            if let Some(freq) = content.get(keyword) {
                encoder.emit(i, *freq);
            }
        }

        let title = extract_keywords(&story.title);
        let mut offset = vocab.content_keywords.len();
        for (i, keyword) in vocab.title_keywords.iter().enumerate() {
            if let Some(freq) = title.get(keyword) {
                encoder.emit(offset + i, *freq);
            }
        }

        offset += vocab.title_keywords.len();
        if let Some(i) = vocab
            .host_names
            .iter()
            .position(|host| *host == story.host_name)
        {
            encoder.emit(offset + i, 1.0);
        }

        offset += vocab.host_names.len();
        encoder.emit(offset + story.timestamp.hour() as usize, 1.0);

        offset += HOUR_SLOTS;
        let weekday = story.timestamp.weekday().num_days_from_sunday() as usize;
        encoder.emit(offset + weekday, 1.0);

        encoder.finish()
    }

    /// Builds a vector from raw pairs, sorting them and keeping the last value
    /// for a repeated index.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (usize, f64)>) -> Self {
        let mut values: Vec<FeatureValue> = pairs
            .into_iter()
            .map(|(index, value)| FeatureValue { index, value })
            .collect();
        values.sort_by_key(|v| v.index);
        values.reverse();
        values.dedup_by_key(|v| v.index);
        values.reverse();
        Self { values }
    }

    /// Iterates over non-zero entries in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = &FeatureValue> {
        self.values.iter()
    }

    /// Number of explicitly stored entries.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no entry is stored.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Stored entries as a slice.
    pub fn as_slice(&self) -> &[FeatureValue] {
        &self.values
    }

    /// Value at `index`, zero when absent.
    pub fn get(&self, index: usize) -> f64 {
        self.values
            .binary_search_by_key(&index, |v| v.index)
            .map(|pos| self.values[pos].value)
            .unwrap_or(0.0)
    }

    /// Expands into a dense vector of `width` slots; out-of-range entries are
    /// dropped.
    pub fn to_dense(&self, width: usize) -> Vec<f64> {
        let mut dense = vec![0.0; width];
        self.write_dense(&mut dense);
        dense
    }

    /// Zeroes `dense` and scatters the stored entries into it.
    pub fn write_dense(&self, dense: &mut [f64]) {
        dense.iter_mut().for_each(|slot| *slot = 0.0);
        for entry in &self.values {
            if let Some(slot) = dense.get_mut(entry.index) {
                *slot = entry.value;
            }
        }
    }
}

struct Encoder<'v> {
    vocab: &'v Vocabulary,
    values: Vec<FeatureValue>,
}

impl<'v> Encoder<'v> {
    fn new(vocab: &'v Vocabulary) -> Self {
        Self {
            vocab,
            values: Vec::new(),
        }
    }

    fn emit(&mut self, index: usize, value: f64) {
        let value = match &self.vocab.normalization {
            Some(norm) => norm.apply(value),
            None => value,
        };
        self.values.push(FeatureValue { index, value });
    }

    fn finish(self) -> FeatureVector {
        FeatureVector {
            values: self.values,
        }
    }
}
