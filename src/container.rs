//! Single-file persistence of a vocabulary plus a trained classifier.
//!
//! Layout (integers little-endian):
//!
//! ```text
//! u64 vocab_len | vocab JSON | u64 kind_len | kind UTF-8 | classifier payload ...
//! ```
//!
//! The payload carries no length prefix and runs to the end of the buffer.

use crate::classifier::{Classifier, ClassifierRegistry};
use crate::codec::{ByteReader, ByteWriter};
use crate::error::{PipelineError, Result};
use crate::vocabulary::Vocabulary;
use std::fs;
use std::path::Path;

/// Decoded container parts, before the payload is handed to a deserializer.
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    /// Vocabulary the classifier was trained against.
    pub vocabulary: Vocabulary,
    /// Registry key of the classifier.
    pub classifier_kind: String,
    /// Opaque classifier payload.
    pub payload: Vec<u8>,
}

impl Container {
    /// Captures `classifier` and its vocabulary.
    pub fn from_classifier(vocabulary: Vocabulary, classifier: &dyn Classifier) -> Self {
        Self {
            vocabulary,
            classifier_kind: classifier.serializer_type().to_string(),
            payload: classifier.serialize(),
        }
    }

    /// Encodes the container into its binary layout.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        encode(&self.vocabulary, &self.classifier_kind, &self.payload)
    }

    /// Splits `bytes` into vocabulary, kind and payload without consulting a registry.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);

        let vocab_bytes = reader.take_prefixed()?;
        let vocabulary: Vocabulary = serde_json::from_slice(vocab_bytes)
            .map_err(|err| PipelineError::corrupt(format!("vocabulary: {err}")))?;

        let kind_bytes = reader.take_prefixed()?;
        let classifier_kind = std::str::from_utf8(kind_bytes)
            .map_err(|err| PipelineError::corrupt(format!("classifier kind: {err}")))?
            .to_string();

        let payload = reader.rest().to_vec();
        Ok(Self {
            vocabulary,
            classifier_kind,
            payload,
        })
    }

    /// Rebuilds the classifier through `registry`.
    pub fn into_classifier(
        self,
        registry: &ClassifierRegistry,
    ) -> Result<(Box<dyn Classifier>, Vocabulary)> {
        let classifier =
            registry.deserialize(&self.classifier_kind, &self.vocabulary, &self.payload)?;
        Ok((classifier, self.vocabulary))
    }

    /// Writes the encoded container to `path`.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let bytes = self.to_bytes()?;
        fs::write(path, bytes).map_err(|err| PipelineError::io(path, err))
    }

    /// Reads and splits the container stored at `path`.
    pub fn read_from(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|err| PipelineError::io(path, err))?;
        Self::from_bytes(&bytes)
    }
}

/// Encodes the three container fields.
pub fn encode(vocabulary: &Vocabulary, classifier_kind: &str, payload: &[u8]) -> Result<Vec<u8>> {
    // JSON has no NaN or infinity; such a block could never be read back.
    if let Some(norm) = vocabulary.normalization {
        if !norm.offset.is_finite() || !norm.scale.is_finite() {
            return Err(PipelineError::Configuration(format!(
                "normalization offset {} scale {} cannot be persisted",
                norm.offset, norm.scale
            )));
        }
    }
    let vocab_bytes = serde_json::to_vec(vocabulary)
        .map_err(|err| PipelineError::corrupt(format!("vocabulary encoding: {err}")))?;
    let mut writer =
        ByteWriter::with_capacity(16 + vocab_bytes.len() + classifier_kind.len() + payload.len());
    writer.put_prefixed(&vocab_bytes);
    writer.put_prefixed(classifier_kind.as_bytes());
    writer.put_raw(payload);
    Ok(writer.into_bytes())
}

/// Serializes a trained classifier together with its vocabulary.
pub fn serialize_classifier(classifier: &dyn Classifier, vocabulary: &Vocabulary) -> Result<Vec<u8>> {
    encode(
        vocabulary,
        classifier.serializer_type(),
        &classifier.serialize(),
    )
}

/// Decodes a container and rebuilds its classifier through `registry`.
pub fn deserialize_classifier(
    bytes: &[u8],
    registry: &ClassifierRegistry,
) -> Result<(Box<dyn Classifier>, Vocabulary)> {
    Container::from_bytes(bytes)?.into_classifier(registry)
}
