//! Training knobs and the command-line surface that fills them.

use crate::classifier::{ClassifierParams, ClassifierRegistry};
use crate::error::{PipelineError, Result};
use crate::vocabulary::{Normalization, UbiquityThresholds};
use clap::Args;
use std::path::PathBuf;

/// Score boundaries separating popularity classes.
pub const DEFAULT_SCORE_CUTOFFS: [i64; 4] = [2, 5, 10, 50];

/// Everything `train` needs besides its input and output paths.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    /// Registry key of the classifier to train.
    pub classifier_kind: String,
    /// Hyperparameters forwarded to the classifier constructor.
    pub params: ClassifierParams,
    /// Vocabulary document-frequency thresholds.
    pub thresholds: UbiquityThresholds,
    /// Share of stories held out for cross validation, in `[0, 1)`.
    pub cross_validation_fraction: f64,
    /// Ascending score boundaries; class count is `cutoffs + 1`.
    pub score_cutoffs: Vec<i64>,
    /// Only the first `n` loaded stories are used.
    pub story_limit: Option<usize>,
    /// Optional affine rewrite of every feature value.
    pub normalization: Option<Normalization>,
}

impl TrainingConfig {
    /// Defaults for classifier `kind`.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            classifier_kind: kind.into(),
            params: ClassifierParams::default(),
            thresholds: UbiquityThresholds::default(),
            cross_validation_fraction: 0.2,
            score_cutoffs: DEFAULT_SCORE_CUTOFFS.to_vec(),
            story_limit: None,
            normalization: None,
        }
    }

    /// Number of popularity classes implied by the cutoffs.
    pub fn class_count(&self) -> usize {
        self.score_cutoffs.len() + 1
    }

    /// Rejects settings no classifier could train with.
    pub fn validate(&self, registry: &ClassifierRegistry) -> Result<()> {
        if self.classifier_kind.trim().is_empty() {
            return Err(invalid("classifier kind is required"));
        }
        registry.entry(&self.classifier_kind)?;

        let fraction = self.cross_validation_fraction;
        if !(0.0..1.0).contains(&fraction) {
            return Err(invalid(format!(
                "cross validation fraction {fraction} is outside [0, 1)"
            )));
        }
        if self.params.hidden_count == 0 {
            return Err(invalid("hidden count must be positive"));
        }
        if !self.params.step_size.is_finite() || self.params.step_size <= 0.0 {
            return Err(invalid(format!(
                "step size {} must be positive and finite",
                self.params.step_size
            )));
        }
        if self.score_cutoffs.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(invalid("score cutoffs must be strictly ascending"));
        }
        if let Some(norm) = self.normalization {
            if norm.scale == 0.0 || !norm.scale.is_finite() || !norm.offset.is_finite() {
                return Err(invalid(format!(
                    "normalization offset {} scale {} is unusable",
                    norm.offset, norm.scale
                )));
            }
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> PipelineError {
    PipelineError::Configuration(msg.into())
}

/// Arguments of the `train` subcommand.
#[derive(Args, Debug, Clone)]
pub struct TrainArgs {
    /// Story list JSON produced by `save-stories`
    pub story_list: PathBuf,

    /// Directory holding scraped `<id>.txt` articles
    pub article_dir: PathBuf,

    /// Destination of the trained container
    pub output: PathBuf,

    /// Classifier kind to train
    #[arg(long, env = "HN_CLASSIFIER", default_value = "neuralnet")]
    pub classifier: String,

    /// Hidden layer width
    #[arg(long, env = "NEURALNET_HIDDEN_COUNT", default_value_t = 30)]
    pub hidden_count: usize,

    /// Gradient step size
    #[arg(long, env = "NEURALNET_STEP_SIZE", default_value_t = 0.01)]
    pub step_size: f64,

    /// Stop after this many epochs (default: until Ctrl+C)
    #[arg(long, env = "NEURALNET_MAX_EPOCHS")]
    pub max_epochs: Option<usize>,

    /// Seed for weight initialisation, shuffling and the validation split
    #[arg(long, env = "HN_SEED")]
    pub seed: Option<u64>,

    /// Stories a content keyword must appear in
    #[arg(long, env = "HN_CONTENT_UBIQUITY", default_value_t = 2)]
    pub content_ubiquity: usize,

    /// Stories a title keyword must appear in
    #[arg(long, env = "HN_TITLE_UBIQUITY", default_value_t = 1)]
    pub title_ubiquity: usize,

    /// Stories a host name must appear in
    #[arg(long, env = "HN_HOST_UBIQUITY", default_value_t = 1)]
    pub host_ubiquity: usize,

    /// Share of stories held out for cross validation
    #[arg(long, env = "HN_CV_FRACTION", default_value_t = 0.2)]
    pub cv_fraction: f64,

    /// Score cutoffs between classes, comma separated
    #[arg(
        long,
        env = "HN_SCORE_CUTOFFS",
        value_delimiter = ',',
        default_value = "2,5,10,50"
    )]
    pub score_cutoffs: Vec<i64>,

    /// Use only the first N stories
    #[arg(long)]
    pub limit: Option<usize>,

    /// Subtracted from every feature value
    #[arg(long, requires = "normalize_scale")]
    pub normalize_offset: Option<f64>,

    /// Multiplies every feature value after the offset
    #[arg(long, requires = "normalize_offset")]
    pub normalize_scale: Option<f64>,
}

impl TrainArgs {
    /// Converts the parsed arguments into a `TrainingConfig`.
    pub fn build_config(&self) -> TrainingConfig {
        let normalization = match (self.normalize_offset, self.normalize_scale) {
            (Some(offset), Some(scale)) => Some(Normalization { offset, scale }),
            _ => None,
        };
        TrainingConfig {
            classifier_kind: self.classifier.clone(),
            params: ClassifierParams {
                hidden_count: self.hidden_count,
                step_size: self.step_size,
                max_epochs: self.max_epochs,
                seed: self.seed,
            },
            thresholds: UbiquityThresholds {
                content: self.content_ubiquity,
                title: self.title_ubiquity,
                host: self.host_ubiquity,
            },
            cross_validation_fraction: self.cv_fraction,
            score_cutoffs: self.score_cutoffs.clone(),
            story_limit: self.limit,
            normalization,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::registry;
    use clap::Parser;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        train: TrainArgs,
    }

    fn parse(extra: &[&str]) -> std::result::Result<TrainingConfig, clap::Error> {
        let mut argv = vec!["train", "stories.json", "dump", "model.bin"];
        argv.extend_from_slice(extra);
        Harness::try_parse_from(argv).map(|h| h.train.build_config())
    }

    #[test]
    fn defaults_match_training_defaults() {
        // Only meaningful when the env fallbacks are unset.
        if std::env::vars().any(|(k, _)| k.starts_with("HN_") || k.starts_with("NEURALNET_")) {
            return;
        }
        assert_eq!(parse(&[]).expect("parse"), TrainingConfig::new("neuralnet"));
    }

    #[test]
    fn flags_populate_config() {
        let config = parse(&[
            "--classifier",
            "centroid",
            "--hidden-count",
            "8",
            "--step-size",
            "0.5",
            "--max-epochs",
            "3",
            "--seed",
            "7",
            "--score-cutoffs",
            "1,10",
            "--normalize-offset",
            "0.5",
            "--normalize-scale",
            "2",
        ])
        .expect("parse");
        assert_eq!(config.classifier_kind, "centroid");
        assert_eq!(config.params.hidden_count, 8);
        assert_eq!(config.params.max_epochs, Some(3));
        assert_eq!(config.params.seed, Some(7));
        assert_eq!(config.score_cutoffs, vec![1, 10]);
        assert_eq!(config.class_count(), 3);
        assert_eq!(
            config.normalization,
            Some(Normalization {
                offset: 0.5,
                scale: 2.0
            })
        );
        config.validate(registry()).expect("valid");
    }

    #[test]
    fn normalization_needs_both_halves() {
        assert!(parse(&["--normalize-offset", "0.5"]).is_err());
    }

    #[test]
    fn validation_rejects_unusable_settings() {
        let base = TrainingConfig::new("neuralnet");
        base.validate(registry()).expect("defaults are valid");

        let mut cases = Vec::new();
        cases.push(TrainingConfig::new(""));
        cases.push(TrainingConfig {
            cross_validation_fraction: 1.0,
            ..base.clone()
        });
        cases.push(TrainingConfig {
            cross_validation_fraction: -0.1,
            ..base.clone()
        });
        let mut zero_hidden = base.clone();
        zero_hidden.params.hidden_count = 0;
        cases.push(zero_hidden);
        let mut bad_step = base.clone();
        bad_step.params.step_size = f64::NAN;
        cases.push(bad_step);
        cases.push(TrainingConfig {
            score_cutoffs: vec![5, 5],
            ..base.clone()
        });
        cases.push(TrainingConfig {
            normalization: Some(Normalization {
                offset: 0.0,
                scale: 0.0,
            }),
            ..base.clone()
        });

        for config in cases {
            let err = config.validate(registry()).unwrap_err();
            assert!(
                matches!(err, PipelineError::Configuration(_)),
                "{config:?}: {err}"
            );
        }
    }

    #[test]
    fn unknown_kind_is_not_a_configuration_error() {
        let err = TrainingConfig::new("svm").validate(registry()).unwrap_err();
        assert!(matches!(err, PipelineError::UnknownClassifierKind(_)));
    }
}
