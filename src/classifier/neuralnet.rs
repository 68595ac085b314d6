//! Two-layer sigmoid network trained with per-example gradient steps.
//!
//! Layout: `vector_size -> hidden_count -> class_count`, sigmoid activations on
//! both layers, mean-squared cost against a one-hot target.

use super::{
    corrupt, log_progress, Classifier, ClassifierParams, StopSignal, TrainableClassifier,
    TrainingSet,
};
use crate::codec::{ByteReader, ByteWriter};
use crate::error::{PipelineError, Result};
use crate::features::FeatureVector;
use crate::vocabulary::Vocabulary;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

/// Registry key for [`NeuralNet`].
pub const KIND: &str = "neuralnet";

/// Dense sigmoid network over sparse inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct NeuralNet {
    inputs: usize,
    hidden: usize,
    outputs: usize,
    /// `hidden x inputs`, row-major.
    hidden_weights: Vec<f64>,
    hidden_biases: Vec<f64>,
    /// `outputs x hidden`, row-major.
    output_weights: Vec<f64>,
    output_biases: Vec<f64>,
    step_size: f64,
    max_epochs: Option<usize>,
    seed: Option<u64>,
}

pub(super) fn construct(
    vocab: &Vocabulary,
    class_count: usize,
    params: &ClassifierParams,
) -> Result<Box<dyn TrainableClassifier>> {
    Ok(Box::new(NeuralNet::new(vocab, class_count, params)?))
}

pub(super) fn deserialize(vocab: &Vocabulary, payload: &[u8]) -> Result<Box<dyn Classifier>> {
    Ok(Box::new(NeuralNet::from_payload(vocab, payload)?))
}

impl NeuralNet {
    /// Builds a randomly initialised network for `vocab` with `class_count` outputs.
    pub fn new(vocab: &Vocabulary, class_count: usize, params: &ClassifierParams) -> Result<Self> {
        if params.hidden_count == 0 {
            return Err(PipelineError::Configuration(
                "neuralnet hidden count must be positive".into(),
            ));
        }
        if class_count < 2 {
            return Err(PipelineError::Configuration(format!(
                "neuralnet needs at least two classes, got {class_count}"
            )));
        }
        if !(params.step_size.is_finite() && params.step_size > 0.0) {
            return Err(PipelineError::Configuration(format!(
                "neuralnet step size must be positive, got {}",
                params.step_size
            )));
        }

        let inputs = vocab.vector_size();
        let hidden = params.hidden_count;
        let mut net = Self {
            inputs,
            hidden,
            outputs: class_count,
            hidden_weights: vec![0.0; hidden * inputs],
            hidden_biases: vec![0.0; hidden],
            output_weights: vec![0.0; class_count * hidden],
            output_biases: vec![0.0; class_count],
            step_size: params.step_size,
            max_epochs: params.max_epochs,
            seed: params.seed,
        };
        let mut rng = net.rng(0);
        net.randomize(&mut rng);
        Ok(net)
    }

    /// Parses a payload produced by [`Classifier::serialize`].
    pub fn from_payload(vocab: &Vocabulary, payload: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(payload);
        let inputs = read_dim(&mut reader)?;
        let hidden = read_dim(&mut reader)?;
        let outputs = read_dim(&mut reader)?;
        let expected = vocab.vector_size() as u64;
        if inputs != expected {
            return Err(PipelineError::CorruptPayload(format!(
                "{KIND} input width {inputs} does not match vocabulary width {expected}"
            )));
        }
        let hidden = to_dim(hidden, "hidden")?;
        let outputs = to_dim(outputs, "output")?;
        let inputs = inputs as usize;

        let hidden_weights = read_floats(&mut reader, checked_area(hidden, inputs)?)?;
        let hidden_biases = read_floats(&mut reader, hidden)?;
        let output_weights = read_floats(&mut reader, checked_area(outputs, hidden)?)?;
        let output_biases = read_floats(&mut reader, outputs)?;
        if reader.remaining() != 0 {
            return Err(PipelineError::CorruptPayload(format!(
                "{KIND} payload has {} trailing bytes",
                reader.remaining()
            )));
        }

        let defaults = ClassifierParams::default();
        Ok(Self {
            inputs,
            hidden,
            outputs,
            hidden_weights,
            hidden_biases,
            output_weights,
            output_biases,
            step_size: defaults.step_size,
            max_epochs: defaults.max_epochs,
            seed: defaults.seed,
        })
    }

    /// Number of output classes.
    pub fn class_count(&self) -> usize {
        self.outputs
    }

    fn rng(&self, stream: u64) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(stream)),
            None => StdRng::from_entropy(),
        }
    }

    fn randomize(&mut self, rng: &mut StdRng) {
        let hidden_scale = 1.0 / (self.inputs.max(1) as f64).sqrt();
        let output_scale = 1.0 / (self.hidden as f64).sqrt();
        for w in &mut self.hidden_weights {
            *w = rng.gen_range(-hidden_scale..hidden_scale);
        }
        for w in &mut self.output_weights {
            *w = rng.gen_range(-output_scale..output_scale);
        }
        self.hidden_biases.iter_mut().for_each(|b| *b = 0.0);
        self.output_biases.iter_mut().for_each(|b| *b = 0.0);
    }

    fn forward(&self, vector: &FeatureVector) -> (Vec<f64>, Vec<f64>) {
        let mut hidden = self.hidden_biases.clone();
        for (j, activation) in hidden.iter_mut().enumerate() {
            let row = &self.hidden_weights[j * self.inputs..(j + 1) * self.inputs];
            for entry in vector.iter() {
                if let Some(w) = row.get(entry.index) {
                    *activation += w * entry.value;
                }
            }
            *activation = sigmoid(*activation);
        }

        let mut output = self.output_biases.clone();
        for (k, activation) in output.iter_mut().enumerate() {
            let row = &self.output_weights[k * self.hidden..(k + 1) * self.hidden];
            *activation += row.iter().zip(&hidden).map(|(w, h)| w * h).sum::<f64>();
            *activation = sigmoid(*activation);
        }
        (hidden, output)
    }

    fn sgd_step(&mut self, vector: &FeatureVector, class: usize) {
        let (hidden, output) = self.forward(vector);

        let output_deltas: Vec<f64> = output
            .iter()
            .enumerate()
            .map(|(k, o)| {
                let target = if k == class { 1.0 } else { 0.0 };
                (o - target) * o * (1.0 - o)
            })
            .collect();

        let hidden_deltas: Vec<f64> = (0..self.hidden)
            .map(|j| {
                let downstream: f64 = output_deltas
                    .iter()
                    .enumerate()
                    .map(|(k, delta)| delta * self.output_weights[k * self.hidden + j])
                    .sum();
                downstream * hidden[j] * (1.0 - hidden[j])
            })
            .collect();

        let step = self.step_size;
        for (k, delta) in output_deltas.iter().enumerate() {
            let row = &mut self.output_weights[k * self.hidden..(k + 1) * self.hidden];
            for (w, h) in row.iter_mut().zip(&hidden) {
                *w -= step * delta * h;
            }
            self.output_biases[k] -= step * delta;
        }

        for (j, delta) in hidden_deltas.iter().enumerate() {
            let row = &mut self.hidden_weights[j * self.inputs..(j + 1) * self.inputs];
            for entry in vector.iter() {
                if let Some(w) = row.get_mut(entry.index) {
                    *w -= step * delta * entry.value;
                }
            }
            self.hidden_biases[j] -= step * delta;
        }
    }
}

impl Classifier for NeuralNet {
    fn classify(&self, vector: &FeatureVector) -> usize {
        let (_, output) = self.forward(vector);
        argmax(&output)
    }

    fn serialize(&self) -> Vec<u8> {
        let floats = self.hidden_weights.len()
            + self.hidden_biases.len()
            + self.output_weights.len()
            + self.output_biases.len();
        let mut writer = ByteWriter::with_capacity(24 + floats * 8);
        writer.put_u64(self.inputs as u64);
        writer.put_u64(self.hidden as u64);
        writer.put_u64(self.outputs as u64);
        writer.put_f64s(&self.hidden_weights);
        writer.put_f64s(&self.hidden_biases);
        writer.put_f64s(&self.output_weights);
        writer.put_f64s(&self.output_biases);
        writer.into_bytes()
    }

    fn serializer_type(&self) -> &'static str {
        KIND
    }
}

impl TrainableClassifier for NeuralNet {
    fn train(&mut self, training: &TrainingSet, cross_validation: &TrainingSet, stop: &StopSignal) {
        if training.is_empty() {
            log::warn!("{KIND}: empty training set, nothing to fit");
            return;
        }

        let mut rng = self.rng(1);
        let mut order: Vec<usize> = (0..training.len()).collect();
        let mut epoch = 0usize;
        while self.max_epochs.map_or(true, |max| epoch < max) {
            log_progress(&*self, epoch, training, cross_validation, self.outputs);
            order.shuffle(&mut rng);
            for &idx in &order {
                let class = training.classes[idx];
                if class < self.outputs {
                    self.sgd_step(&training.vectors[idx], class);
                }
                if stop.is_raised() {
                    log::info!("{KIND}: stop requested during epoch {epoch}");
                    return;
                }
            }
            epoch += 1;
        }
        log_progress(&*self, epoch, training, cross_validation, self.outputs);
    }

    fn into_classifier(self: Box<Self>) -> Box<dyn Classifier> {
        self
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn argmax(values: &[f64]) -> usize {
    let mut best = 0;
    for (i, value) in values.iter().enumerate().skip(1) {
        if *value > values[best] {
            best = i;
        }
    }
    best
}

fn read_dim(reader: &mut ByteReader<'_>) -> Result<u64> {
    reader.take_u64().map_err(|err| corrupt(KIND, err))
}

fn read_floats(reader: &mut ByteReader<'_>, count: usize) -> Result<Vec<f64>> {
    reader.take_f64s(count).map_err(|err| corrupt(KIND, err))
}

fn to_dim(value: u64, label: &str) -> Result<usize> {
    usize::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| PipelineError::CorruptPayload(format!("{KIND} {label} size {value}")))
}

fn checked_area(rows: usize, cols: usize) -> Result<usize> {
    rows.checked_mul(cols).ok_or_else(|| {
        PipelineError::CorruptPayload(format!("{KIND} layer {rows}x{cols} overflows"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureVector;

    fn vocab() -> Vocabulary {
        Vocabulary {
            content_keywords: vec!["alpha".into(), "beta".into()],
            title_keywords: Vec::new(),
            host_names: Vec::new(),
            normalization: None,
        }
    }

    fn params(max_epochs: Option<usize>) -> ClassifierParams {
        ClassifierParams {
            hidden_count: 6,
            step_size: 0.5,
            max_epochs,
            seed: Some(7),
        }
    }

    fn separable_set() -> TrainingSet {
        let mut vectors = Vec::new();
        let mut classes = Vec::new();
        for _ in 0..20 {
            vectors.push(FeatureVector::from_pairs([(0, 1.0)]));
            classes.push(0);
            vectors.push(FeatureVector::from_pairs([(1, 1.0)]));
            classes.push(1);
        }
        TrainingSet::new(vectors, classes)
    }

    #[test]
    fn learns_a_separable_problem() {
        let mut net = NeuralNet::new(&vocab(), 2, &params(Some(300))).expect("net");
        let set = separable_set();
        net.train(&set, &set, &StopSignal::new());
        assert_eq!(net.classify(&FeatureVector::from_pairs([(0, 1.0)])), 0);
        assert_eq!(net.classify(&FeatureVector::from_pairs([(1, 1.0)])), 1);
    }

    #[test]
    fn raised_stop_signal_ends_training_after_one_step() {
        let mut net = NeuralNet::new(&vocab(), 2, &params(None)).expect("net");
        let before = net.clone();
        let stop = StopSignal::new();
        stop.raise();
        let set = separable_set();
        net.train(&set, &TrainingSet::default(), &stop);
        assert_ne!(net, before, "exactly one step should have been applied");
    }

    #[test]
    fn payload_round_trips_through_registry() {
        let mut net = NeuralNet::new(&vocab(), 3, &params(Some(2))).expect("net");
        let set = separable_set();
        net.train(&set, &set, &StopSignal::new());

        let payload = net.serialize();
        let restored = super::super::registry()
            .deserialize(KIND, &vocab(), &payload)
            .expect("restore");
        assert_eq!(restored.serialize(), payload);
        for vector in &set.vectors {
            assert_eq!(restored.classify(vector), net.classify(vector));
        }
    }

    #[test]
    fn rejects_mismatched_or_truncated_payloads() {
        let net = NeuralNet::new(&vocab(), 2, &params(Some(1))).expect("net");
        let payload = net.serialize();

        let wider = Vocabulary {
            host_names: vec!["example.com".into()],
            ..vocab()
        };
        let err = NeuralNet::from_payload(&wider, &payload).unwrap_err();
        assert!(matches!(err, PipelineError::CorruptPayload(_)));

        let err = NeuralNet::from_payload(&vocab(), &payload[..payload.len() - 3]).unwrap_err();
        assert!(matches!(err, PipelineError::CorruptPayload(_)));

        let err = NeuralNet::from_payload(&vocab(), &payload[..10]).unwrap_err();
        assert!(matches!(err, PipelineError::CorruptPayload(_)));

        let mut padded = payload.clone();
        padded.push(0);
        let err = NeuralNet::from_payload(&vocab(), &padded).unwrap_err();
        assert!(matches!(err, PipelineError::CorruptPayload(_)));
    }

    #[test]
    fn invalid_hyperparameters_are_configuration_errors() {
        let mut bad = params(None);
        bad.hidden_count = 0;
        assert!(matches!(
            NeuralNet::new(&vocab(), 2, &bad),
            Err(PipelineError::Configuration(_))
        ));
        let mut bad = params(None);
        bad.step_size = f64::NAN;
        assert!(matches!(
            NeuralNet::new(&vocab(), 2, &bad),
            Err(PipelineError::Configuration(_))
        ));
    }

    #[test]
    fn argmax_prefers_first_maximum() {
        assert_eq!(argmax(&[0.2, 0.9, 0.9]), 1);
        assert_eq!(argmax(&[0.5]), 0);
    }
}
