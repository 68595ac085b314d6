//! Classifier capability traits and the name-keyed registry of implementations.

pub mod centroid;
pub mod neuralnet;

use crate::error::{PipelineError, Result};
use crate::features::FeatureVector;
use crate::vocabulary::Vocabulary;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

pub use centroid::CentroidClassifier;
pub use neuralnet::NeuralNet;

/// Anything that maps a feature vector to a class and can persist itself.
pub trait Classifier: Send {
    /// Predicts the class index for `vector`.
    fn classify(&self, vector: &FeatureVector) -> usize;

    /// Opaque payload sufficient to rebuild this classifier.
    fn serialize(&self) -> Vec<u8>;

    /// Registry key of the deserializer that understands [`Classifier::serialize`].
    fn serializer_type(&self) -> &'static str;
}

/// A classifier whose state can be fitted to labelled vectors.
pub trait TrainableClassifier: Classifier {
    /// Fits the model until `stop` is raised or the implementation finishes.
    fn train(&mut self, training: &TrainingSet, cross_validation: &TrainingSet, stop: &StopSignal);

    /// Upcasts to the read-only capability.
    fn into_classifier(self: Box<Self>) -> Box<dyn Classifier>;
}

/// Labelled vectors used for training or cross validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSet {
    /// Encoded stories.
    pub vectors: Vec<FeatureVector>,
    /// Class of each vector, same length as `vectors`.
    pub classes: Vec<usize>,
}

impl TrainingSet {
    /// Pairs vectors with their classes.
    pub fn new(vectors: Vec<FeatureVector>, classes: Vec<usize>) -> Self {
        debug_assert_eq!(vectors.len(), classes.len());
        Self { vectors, classes }
    }

    /// Number of labelled examples.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// True when the set holds no examples.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Iterates `(vector, class)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&FeatureVector, usize)> {
        self.vectors.iter().zip(self.classes.iter().copied())
    }
}

/// Cooperative cancellation flag checked between training steps.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    requested: Arc<AtomicBool>,
}

impl StopSignal {
    /// Creates a signal that has not been raised.
    pub fn new() -> Self {
        Self::default()
    }

    /// Asks every holder to stop after its current step.
    pub fn raise(&self) {
        self.requested.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested.
    pub fn is_raised(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

/// Hyperparameters forwarded to classifier constructors.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierParams {
    /// Hidden layer width for network classifiers.
    pub hidden_count: usize,
    /// Gradient step size.
    pub step_size: f64,
    /// Epoch limit; `None` trains until stopped.
    pub max_epochs: Option<usize>,
    /// RNG seed for initialisation and shuffling; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            hidden_count: 30,
            step_size: 0.01,
            max_epochs: None,
            seed: None,
        }
    }
}

/// Builds a fresh trainable classifier for a vocabulary and class count.
pub type Constructor =
    fn(&Vocabulary, usize, &ClassifierParams) -> Result<Box<dyn TrainableClassifier>>;

/// Rebuilds a classifier from its serialized payload.
pub type Deserializer = fn(&Vocabulary, &[u8]) -> Result<Box<dyn Classifier>>;

/// Constructor and deserializer registered under one name.
#[derive(Clone, Copy)]
pub struct RegistryEntry {
    /// Registry key, equal to the classifier's `serializer_type`.
    pub name: &'static str,
    /// Builds an untrained classifier.
    pub construct: Constructor,
    /// Parses a persisted payload.
    pub deserialize: Deserializer,
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Name-keyed set of classifier implementations.
#[derive(Debug, Clone, Default)]
pub struct ClassifierRegistry {
    entries: Vec<RegistryEntry>,
}

static GLOBAL_REGISTRY: OnceLock<ClassifierRegistry> = OnceLock::new();

/// Returns the lazily initialized registry of built-in classifiers.
pub fn registry() -> &'static ClassifierRegistry {
    GLOBAL_REGISTRY.get_or_init(ClassifierRegistry::with_defaults)
}

impl ClassifierRegistry {
    /// Registry with no entries.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry holding every built-in classifier kind.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(RegistryEntry {
            name: neuralnet::KIND,
            construct: neuralnet::construct,
            deserialize: neuralnet::deserialize,
        });
        registry.register(RegistryEntry {
            name: centroid::KIND,
            construct: centroid::construct,
            deserialize: centroid::deserialize,
        });
        registry
    }

    /// Adds `entry`, replacing any entry with the same name.
    pub fn register(&mut self, entry: RegistryEntry) {
        match self.entries.iter_mut().find(|e| e.name == entry.name) {
            Some(existing) => *existing = entry,
            None => self.entries.push(entry),
        }
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<&'static str> {
        self.entries.iter().map(|entry| entry.name).collect()
    }

    /// Looks up the entry for `name`.
    pub fn entry(&self, name: &str) -> Result<&RegistryEntry> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .ok_or_else(|| PipelineError::UnknownClassifierKind(name.to_string()))
    }

    /// Builds an untrained classifier of kind `name`.
    pub fn construct(
        &self,
        name: &str,
        vocab: &Vocabulary,
        class_count: usize,
        params: &ClassifierParams,
    ) -> Result<Box<dyn TrainableClassifier>> {
        let entry = self.entry(name)?;
        (entry.construct)(vocab, class_count, params)
    }

    /// Rebuilds a classifier of kind `name` from `payload`.
    pub fn deserialize(
        &self,
        name: &str,
        vocab: &Vocabulary,
        payload: &[u8],
    ) -> Result<Box<dyn Classifier>> {
        let entry = self.entry(name)?;
        (entry.deserialize)(vocab, payload)
    }
}

/// Per-class hit counts of a classifier over a labelled set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccuracyReport {
    /// Correct predictions per true class.
    pub right: Vec<usize>,
    /// Examples per true class.
    pub total: Vec<usize>,
}

impl AccuracyReport {
    /// Classifies every example of `set` and tallies hits per class.
    pub fn measure(classifier: &dyn Classifier, set: &TrainingSet, class_count: usize) -> Self {
        let mut right = vec![0; class_count];
        let mut total = vec![0; class_count];
        for (vector, class) in set.iter() {
            if class >= class_count {
                continue;
            }
            total[class] += 1;
            if classifier.classify(vector) == class {
                right[class] += 1;
            }
        }
        Self { right, total }
    }

    /// Correct predictions across all classes.
    pub fn right_count(&self) -> usize {
        self.right.iter().sum()
    }

    /// Examples across all classes.
    pub fn total_count(&self) -> usize {
        self.total.iter().sum()
    }

    /// Overall accuracy in `[0, 1]`; zero for an empty set.
    pub fn accuracy(&self) -> f64 {
        match self.total_count() {
            0 => 0.0,
            total => self.right_count() as f64 / total as f64,
        }
    }
}

impl fmt::Display for AccuracyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} (classes:",
            self.right_count(),
            self.total_count()
        )?;
        for (right, total) in self.right.iter().zip(&self.total) {
            write!(f, " {right}/{total}")?;
        }
        write!(f, ")")
    }
}

pub(crate) fn log_progress(
    classifier: &dyn Classifier,
    epoch: usize,
    training: &TrainingSet,
    cross_validation: &TrainingSet,
    class_count: usize,
) {
    let cross = AccuracyReport::measure(classifier, cross_validation, class_count);
    let train = AccuracyReport::measure(classifier, training, class_count);
    log::info!("epoch {epoch} cross validation: {cross}");
    log::info!("epoch {epoch} training: {train}");
}

pub(crate) fn corrupt(kind: &str, err: PipelineError) -> PipelineError {
    match err {
        PipelineError::BufferUnderflow { needed, remaining } => PipelineError::CorruptPayload(
            format!("{kind} payload truncated: needed {needed} bytes, {remaining} remaining"),
        ),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureVector;

    struct Constant(usize);

    impl Classifier for Constant {
        fn classify(&self, _vector: &FeatureVector) -> usize {
            self.0
        }

        fn serialize(&self) -> Vec<u8> {
            vec![self.0 as u8]
        }

        fn serializer_type(&self) -> &'static str {
            "constant"
        }
    }

    impl TrainableClassifier for Constant {
        fn train(&mut self, _: &TrainingSet, _: &TrainingSet, _: &StopSignal) {}

        fn into_classifier(self: Box<Self>) -> Box<dyn Classifier> {
            self
        }
    }

    fn construct_constant(
        _vocab: &Vocabulary,
        class_count: usize,
        _params: &ClassifierParams,
    ) -> Result<Box<dyn TrainableClassifier>> {
        Ok(Box::new(Constant(class_count - 1)))
    }

    fn deserialize_constant(_vocab: &Vocabulary, payload: &[u8]) -> Result<Box<dyn Classifier>> {
        match payload {
            [class] => Ok(Box::new(Constant(*class as usize))),
            _ => Err(PipelineError::corrupt("constant payload must be one byte")),
        }
    }

    fn constant_entry() -> RegistryEntry {
        RegistryEntry {
            name: "constant",
            construct: construct_constant,
            deserialize: deserialize_constant,
        }
    }

    #[test]
    fn defaults_register_builtin_kinds() {
        let names = ClassifierRegistry::with_defaults().names();
        assert_eq!(names, vec!["neuralnet", "centroid"]);
        assert_eq!(registry().names(), names);
    }

    #[test]
    fn unknown_kind_is_rejected_both_ways() {
        let registry = ClassifierRegistry::empty();
        let vocab = Vocabulary::default();
        let err = registry
            .construct("svm", &vocab, 2, &ClassifierParams::default())
            .err()
            .expect("construct must fail");
        assert!(matches!(err, PipelineError::UnknownClassifierKind(ref k) if k == "svm"));
        let err = registry.deserialize("svm", &vocab, &[1]).err().expect("fail");
        assert!(matches!(err, PipelineError::UnknownClassifierKind(_)));
    }

    #[test]
    fn entries_pair_constructor_and_deserializer() {
        let mut registry = ClassifierRegistry::empty();
        registry.register(constant_entry());
        let vocab = Vocabulary::default();
        let built = registry
            .construct("constant", &vocab, 3, &ClassifierParams::default())
            .expect("construct");
        assert_eq!(built.serializer_type(), "constant");
        let restored = registry
            .deserialize(built.serializer_type(), &vocab, &built.serialize())
            .expect("deserialize");
        assert_eq!(restored.classify(&FeatureVector::default()), 2);

        let err = registry.deserialize("constant", &vocab, &[]).err().expect("fail");
        assert!(matches!(err, PipelineError::CorruptPayload(_)));
    }

    #[test]
    fn re_registering_replaces_entry() {
        let mut registry = ClassifierRegistry::with_defaults();
        let mut entry = constant_entry();
        entry.name = "centroid";
        registry.register(entry);
        assert_eq!(registry.names(), vec!["neuralnet", "centroid"]);
        let built = registry
            .construct("centroid", &Vocabulary::default(), 2, &ClassifierParams::default())
            .expect("construct");
        assert_eq!(built.serializer_type(), "constant");
    }

    #[test]
    fn stop_signal_is_shared_between_clones() {
        let signal = StopSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_raised());
        signal.raise();
        assert!(clone.is_raised());
    }

    #[test]
    fn accuracy_report_formats_per_class_counts() {
        let set = TrainingSet::new(vec![FeatureVector::default(); 3], vec![0, 1, 1]);
        let report = AccuracyReport::measure(&Constant(1), &set, 2);
        assert_eq!(report.right, vec![0, 2]);
        assert_eq!(report.total, vec![1, 2]);
        assert_eq!(report.to_string(), "2/3 (classes: 0/1 2/2)");
    }
}
