//! Training orchestration: joins story lists with scraped articles, builds a
//! vocabulary, encodes, splits, trains and persists the result.

use crate::classifier::{AccuracyReport, Classifier, ClassifierRegistry, StopSignal, TrainingSet};
use crate::config::TrainingConfig;
use crate::container::Container;
use crate::error::{PipelineError, Result};
use crate::features::FeatureVector;
use crate::scrape::article_path;
use crate::story::{load_story_list, StoryItem, StoryRecord};
use crate::vocabulary::Vocabulary;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Popularity class of `score`: the number of cutoffs it meets or exceeds.
pub fn score_class(score: i64, cutoffs: &[i64]) -> usize {
    cutoffs.iter().filter(|cutoff| score >= **cutoff).count()
}

/// Stories paired with their article text and score.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledStories {
    /// Pipeline records, in story-list order.
    pub records: Vec<StoryRecord>,
    /// Score of each record.
    pub scores: Vec<i64>,
}

impl LabeledStories {
    /// Number of loaded stories.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing was loaded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Keeps only the first `limit` stories.
    pub fn truncate(&mut self, limit: usize) {
        self.records.truncate(limit);
        self.scores.truncate(limit);
    }
}

/// Joins `stories` with their `<id>.txt` dumps; stories without one are skipped.
pub fn load_story_data(stories: &[StoryItem], article_dir: &Path) -> LabeledStories {
    let mut loaded = LabeledStories::default();
    for story in stories {
        let path = article_path(article_dir, story.id);
        match fs::read_to_string(&path) {
            Ok(content) => {
                loaded.records.push(story.to_record(content));
                loaded.scores.push(story.score);
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                log::debug!("story {} has no article dump", story.id);
            }
            Err(err) => log::warn!("{}: {err}", path.display()),
        }
    }
    loaded
}

/// Training and cross-validation halves of a labelled corpus.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DataSplit {
    /// Examples the classifier is fitted on.
    pub training: TrainingSet,
    /// Held-out examples used only for reporting.
    pub cross_validation: TrainingSet,
}

/// Shuffles examples and holds out `fraction` of them (rounded) for cross
/// validation, always leaving at least one training example when any exist.
pub fn split_examples(
    vectors: Vec<FeatureVector>,
    classes: Vec<usize>,
    fraction: f64,
    seed: Option<u64>,
) -> DataSplit {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut examples: Vec<_> = vectors.into_iter().zip(classes).collect();
    examples.shuffle(&mut rng);

    let total = examples.len();
    let held_out = ((total as f64 * fraction).round() as usize).min(total.saturating_sub(1));
    let training = examples.split_off(held_out);
    let (cv_vectors, cv_classes) = examples.into_iter().unzip();
    let (tr_vectors, tr_classes) = training.into_iter().unzip();
    DataSplit {
        training: TrainingSet::new(tr_vectors, tr_classes),
        cross_validation: TrainingSet::new(cv_vectors, cv_classes),
    }
}

/// A fitted classifier with its vocabulary and final accuracy.
pub struct TrainedModel {
    /// The fitted classifier.
    pub classifier: Box<dyn Classifier>,
    /// Vocabulary its input vectors were encoded with.
    pub vocabulary: Vocabulary,
    /// Accuracy over the training half.
    pub training: AccuracyReport,
    /// Accuracy over the held-out half.
    pub cross_validation: AccuracyReport,
}

impl TrainedModel {
    /// Packs the model into a persistable container.
    pub fn to_container(&self) -> Container {
        Container::from_classifier(self.vocabulary.clone(), self.classifier.as_ref())
    }
}

/// Builds a vocabulary from `stories`, then trains a classifier of the
/// configured kind until it finishes or `stop` is raised.
pub fn train_classifier(
    stories: &LabeledStories,
    config: &TrainingConfig,
    registry: &ClassifierRegistry,
    stop: &StopSignal,
) -> Result<TrainedModel> {
    config.validate(registry)?;
    if stories.records.len() != stories.scores.len() {
        return Err(PipelineError::Configuration(format!(
            "{} stories but {} scores",
            stories.records.len(),
            stories.scores.len()
        )));
    }
    let count = config
        .story_limit
        .map_or(stories.len(), |limit| limit.min(stories.len()));
    let records = &stories.records[..count];
    let scores = &stories.scores[..count];
    if records.is_empty() {
        log::warn!("no stories with article text; the model will be untrained");
    }

    let mut vocabulary = Vocabulary::build(records, config.thresholds);
    if let Some(normalization) = config.normalization {
        vocabulary = vocabulary.with_normalization(normalization);
    }
    log::info!(
        "vocabulary: {} content, {} title, {} hosts ({} features)",
        vocabulary.content_keywords.len(),
        vocabulary.title_keywords.len(),
        vocabulary.host_names.len(),
        vocabulary.vector_size()
    );

    let vectors = records.iter().map(|record| vocabulary.encode(record)).collect();
    let classes = scores
        .iter()
        .map(|score| score_class(*score, &config.score_cutoffs))
        .collect();
    let split = split_examples(
        vectors,
        classes,
        config.cross_validation_fraction,
        config.params.seed,
    );
    log::info!(
        "training on {} stories, cross validating on {}",
        split.training.len(),
        split.cross_validation.len()
    );

    let class_count = config.class_count();
    let mut trainable = registry.construct(
        &config.classifier_kind,
        &vocabulary,
        class_count,
        &config.params,
    )?;
    trainable.train(&split.training, &split.cross_validation, stop);
    let classifier = trainable.into_classifier();

    let training = AccuracyReport::measure(classifier.as_ref(), &split.training, class_count);
    let cross_validation =
        AccuracyReport::measure(classifier.as_ref(), &split.cross_validation, class_count);
    Ok(TrainedModel {
        classifier,
        vocabulary,
        training,
        cross_validation,
    })
}

/// Loads a story list and its article dumps, trains, and writes the container
/// to `output`.
pub fn run_training(
    story_list: &Path,
    article_dir: &Path,
    output: &Path,
    config: &TrainingConfig,
    registry: &ClassifierRegistry,
    stop: &StopSignal,
) -> Result<TrainedModel> {
    config.validate(registry)?;
    let items = load_story_list(story_list)?;
    let stories = load_story_data(&items, article_dir);
    log::info!(
        "loaded {} of {} stories from {}",
        stories.len(),
        items.len(),
        article_dir.display()
    );

    let model = train_classifier(&stories, config, registry, stop)?;
    model.to_container().write_to(output)?;
    log::info!("saved {} model to {}", config.classifier_kind, output.display());
    Ok(model)
}

/// Classifies `stories` with a persisted model and reports per-class accuracy.
pub fn evaluate(
    classifier: &dyn Classifier,
    vocabulary: &Vocabulary,
    stories: &LabeledStories,
    score_cutoffs: &[i64],
) -> AccuracyReport {
    let vectors = stories
        .records
        .iter()
        .map(|record| vocabulary.encode(record))
        .collect();
    let classes = stories
        .scores
        .iter()
        .map(|score| score_class(*score, score_cutoffs))
        .collect();
    AccuracyReport::measure(
        classifier,
        &TrainingSet::new(vectors, classes),
        score_cutoffs.len() + 1,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::registry;
    use crate::story::STORY_TYPE;
    use pretty_assertions::assert_eq;

    #[test]
    fn score_classes_count_met_cutoffs() {
        let cutoffs = [2, 5, 10, 50];
        let classes: Vec<_> = [0, 1, 2, 4, 5, 9, 10, 49, 50, 5000]
            .iter()
            .map(|s| score_class(*s, &cutoffs))
            .collect();
        assert_eq!(classes, vec![0, 0, 1, 1, 2, 2, 3, 3, 4, 4]);
        assert_eq!(score_class(100, &[]), 0);
    }

    #[test]
    fn split_honours_fraction_and_keeps_pairs() {
        let vectors: Vec<_> = (0..10)
            .map(|i| FeatureVector::from_pairs([(i, 1.0)]))
            .collect();
        let classes: Vec<_> = (0..10).collect();
        let split = split_examples(vectors, classes, 0.2, Some(3));
        assert_eq!(split.training.len(), 8);
        assert_eq!(split.cross_validation.len(), 2);
        for (vector, class) in split.training.iter().chain(split.cross_validation.iter()) {
            assert_eq!(vector.get(class), 1.0);
        }
    }

    #[test]
    fn split_is_deterministic_for_a_seed() {
        let make = || {
            let vectors: Vec<_> = (0..20)
                .map(|i| FeatureVector::from_pairs([(i, 1.0)]))
                .collect();
            split_examples(vectors, (0..20).collect(), 0.25, Some(11))
        };
        assert_eq!(make(), make());
    }

    #[test]
    fn split_leaves_a_training_example() {
        let split = split_examples(vec![FeatureVector::default()], vec![0], 0.9, Some(1));
        assert_eq!(split.training.len(), 1);
        assert!(split.cross_validation.is_empty());
        assert!(split_examples(Vec::new(), Vec::new(), 0.5, Some(1)).training.is_empty());
    }

    #[test]
    fn load_story_data_skips_missing_dumps() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(article_path(dir.path(), 2), "body of two").expect("write");
        let stories: Vec<_> = [1, 2]
            .into_iter()
            .map(|id| StoryItem {
                id,
                kind: STORY_TYPE.into(),
                title: format!("title {id}"),
                url: "https://example.com/a".into(),
                score: id as i64 * 10,
                time: 1_700_000_000,
            })
            .collect();
        let loaded = load_story_data(&stories, dir.path());
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded.records[0].content, "body of two");
        assert_eq!(loaded.records[0].host_name, "example.com");
        assert_eq!(loaded.scores, vec![20]);
    }

    #[test]
    fn invalid_config_fails_before_training() {
        let config = TrainingConfig {
            cross_validation_fraction: 2.0,
            ..TrainingConfig::new("centroid")
        };
        let err = train_classifier(&LabeledStories::default(), &config, registry(), &StopSignal::new())
            .err()
            .expect("fail");
        assert!(matches!(err, PipelineError::Configuration(_)));
    }
}
