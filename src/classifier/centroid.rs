//! Nearest-centroid classifier: one mean vector per class, Euclidean distance.

use super::{
    corrupt, log_progress, Classifier, ClassifierParams, StopSignal, TrainableClassifier,
    TrainingSet,
};
use crate::codec::{ByteReader, ByteWriter};
use crate::error::{PipelineError, Result};
use crate::features::FeatureVector;
use crate::vocabulary::Vocabulary;

/// Registry key for [`CentroidClassifier`].
pub const KIND: &str = "centroid";

/// Mean feature vector per class. Classes never seen in training are never predicted.
#[derive(Debug, Clone, PartialEq)]
pub struct CentroidClassifier {
    width: usize,
    counts: Vec<u64>,
    /// `classes x width`, row-major.
    centroids: Vec<f64>,
    /// Squared norm of each centroid.
    norms: Vec<f64>,
}

pub(super) fn construct(
    vocab: &Vocabulary,
    class_count: usize,
    _params: &ClassifierParams,
) -> Result<Box<dyn TrainableClassifier>> {
    if class_count == 0 {
        return Err(PipelineError::Configuration(
            "centroid classifier needs at least one class".into(),
        ));
    }
    Ok(Box::new(CentroidClassifier::new(vocab.vector_size(), class_count)))
}

pub(super) fn deserialize(vocab: &Vocabulary, payload: &[u8]) -> Result<Box<dyn Classifier>> {
    Ok(Box::new(CentroidClassifier::from_payload(vocab, payload)?))
}

impl CentroidClassifier {
    /// Untrained classifier over vectors of `width` slots.
    pub fn new(width: usize, class_count: usize) -> Self {
        Self {
            width,
            counts: vec![0; class_count],
            centroids: vec![0.0; class_count * width],
            norms: vec![0.0; class_count],
        }
    }

    /// Parses a payload produced by [`Classifier::serialize`].
    pub fn from_payload(vocab: &Vocabulary, payload: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(payload);
        let classes = reader.take_u64().map_err(|err| corrupt(KIND, err))?;
        let width = reader.take_u64().map_err(|err| corrupt(KIND, err))?;
        if width != vocab.vector_size() as u64 {
            return Err(PipelineError::CorruptPayload(format!(
                "{KIND} width {width} does not match vocabulary width {}",
                vocab.vector_size()
            )));
        }
        let classes = usize::try_from(classes)
            .ok()
            .filter(|c| *c > 0)
            .ok_or_else(|| PipelineError::CorruptPayload(format!("{KIND} class count {classes}")))?;
        let width = width as usize;

        let mut model = Self::new(0, 0);
        model.width = width;
        for _ in 0..classes {
            let count = reader.take_u64().map_err(|err| corrupt(KIND, err))?;
            let row = reader
                .take_f64s(width)
                .map_err(|err| corrupt(KIND, err))?;
            model.counts.push(count);
            model.centroids.extend(row);
        }
        if reader.remaining() != 0 {
            return Err(PipelineError::CorruptPayload(format!(
                "{KIND} payload has {} trailing bytes",
                reader.remaining()
            )));
        }
        model.refresh_norms();
        Ok(model)
    }

    /// Number of classes the model distinguishes.
    pub fn class_count(&self) -> usize {
        self.counts.len()
    }

    fn row(&self, class: usize) -> &[f64] {
        &self.centroids[class * self.width..(class + 1) * self.width]
    }

    fn refresh_norms(&mut self) {
        self.norms = (0..self.class_count())
            .map(|class| self.row(class).iter().map(|v| v * v).sum())
            .collect();
    }
}

impl Classifier for CentroidClassifier {
    fn classify(&self, vector: &FeatureVector) -> usize {
        // |c - x|^2 = |c|^2 - 2 c.x + |x|^2, and |x|^2 is the same for every class.
        let mut best: Option<(usize, f64)> = None;
        for class in 0..self.class_count() {
            if self.counts[class] == 0 {
                continue;
            }
            let row = self.row(class);
            let dot: f64 = vector
                .iter()
                .filter_map(|entry| row.get(entry.index).map(|c| c * entry.value))
                .sum();
            let distance = self.norms[class] - 2.0 * dot;
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((class, distance));
            }
        }
        best.map(|(class, _)| class).unwrap_or(0)
    }

    fn serialize(&self) -> Vec<u8> {
        let mut writer = ByteWriter::with_capacity(16 + self.counts.len() * (8 + self.width * 8));
        writer.put_u64(self.class_count() as u64);
        writer.put_u64(self.width as u64);
        for class in 0..self.class_count() {
            writer.put_u64(self.counts[class]);
            writer.put_f64s(self.row(class));
        }
        writer.into_bytes()
    }

    fn serializer_type(&self) -> &'static str {
        KIND
    }
}

impl TrainableClassifier for CentroidClassifier {
    fn train(&mut self, training: &TrainingSet, cross_validation: &TrainingSet, stop: &StopSignal) {
        let classes = self.class_count();
        self.counts.iter_mut().for_each(|c| *c = 0);
        self.centroids.iter_mut().for_each(|v| *v = 0.0);

        for (vector, class) in training.iter() {
            if stop.is_raised() {
                log::info!("{KIND}: stop requested, using partial means");
                break;
            }
            if class >= classes {
                continue;
            }
            self.counts[class] += 1;
            let width = self.width;
            let row = &mut self.centroids[class * width..(class + 1) * width];
            for entry in vector.iter() {
                if let Some(slot) = row.get_mut(entry.index) {
                    *slot += entry.value;
                }
            }
        }

        for class in 0..classes {
            let count = self.counts[class];
            if count > 0 {
                let width = self.width;
                self.centroids[class * width..(class + 1) * width]
                    .iter_mut()
                    .for_each(|v| *v /= count as f64);
            }
        }
        self.refresh_norms();
        log_progress(&*self, 1, training, cross_validation, classes);
    }

    fn into_classifier(self: Box<Self>) -> Box<dyn Classifier> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab() -> Vocabulary {
        Vocabulary {
            content_keywords: vec!["x".into(), "y".into()],
            ..Vocabulary::default()
        }
    }

    fn set() -> TrainingSet {
        TrainingSet::new(
            vec![
                FeatureVector::from_pairs([(0, 1.0)]),
                FeatureVector::from_pairs([(0, 0.8), (1, 0.1)]),
                FeatureVector::from_pairs([(1, 1.0)]),
                FeatureVector::from_pairs([(1, 0.9)]),
            ],
            vec![0, 0, 2, 2],
        )
    }

    #[test]
    fn predicts_nearest_mean() {
        let mut model = CentroidClassifier::new(vocab().vector_size(), 3);
        model.train(&set(), &TrainingSet::default(), &StopSignal::new());
        assert_eq!(model.classify(&FeatureVector::from_pairs([(0, 0.9)])), 0);
        assert_eq!(model.classify(&FeatureVector::from_pairs([(1, 0.7)])), 2);
    }

    #[test]
    fn unseen_classes_are_never_predicted() {
        let mut model = CentroidClassifier::new(vocab().vector_size(), 3);
        model.train(&set(), &TrainingSet::default(), &StopSignal::new());
        assert_ne!(model.classify(&FeatureVector::default()), 1);
    }

    #[test]
    fn payload_round_trips() {
        let mut model = CentroidClassifier::new(vocab().vector_size(), 3);
        model.train(&set(), &set(), &StopSignal::new());
        let restored = CentroidClassifier::from_payload(&vocab(), &model.serialize()).expect("restore");
        assert_eq!(restored, model);
    }

    #[test]
    fn truncated_payload_is_corrupt() {
        let model = CentroidClassifier::new(vocab().vector_size(), 2);
        let payload = model.serialize();
        let err = CentroidClassifier::from_payload(&vocab(), &payload[..payload.len() - 1])
            .unwrap_err();
        assert!(matches!(err, PipelineError::CorruptPayload(_)));
    }
}
