#![warn(missing_docs)]
//! Core library entry points for the hn-ranker story popularity pipeline.

pub mod classifier;
mod codec;
pub mod config;
pub mod container;
pub mod error;
pub mod features;
pub mod hn_api;
pub mod scrape;
pub mod story;
pub mod tokenizer;
pub mod training;
pub mod vocabulary;

pub use classifier::{
    registry, AccuracyReport, Classifier, ClassifierParams, ClassifierRegistry, RegistryEntry,
    StopSignal, TrainableClassifier, TrainingSet,
};
pub use config::{TrainArgs, TrainingConfig, DEFAULT_SCORE_CUTOFFS};
pub use container::{deserialize_classifier, serialize_classifier, Container};
pub use error::{PipelineError, Result};
pub use features::{FeatureValue, FeatureVector};
pub use hn_api::{locate_before, Collection, HnClient, Item, ItemSource, PartialListing};
pub use scrape::{extract_paragraphs, scrape_articles, ScrapeConfig, ScrapeSummary};
pub use story::{fraction_above, ScoreTally, StoryItem, StoryRecord};
pub use tokenizer::extract_keywords;
pub use training::{load_story_data, run_training, score_class, train_classifier, TrainedModel};
pub use vocabulary::{Normalization, UbiquityThresholds, Vocabulary};
