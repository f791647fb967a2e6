//! ModernBERT sequence classifier.
//!
//! Uses `candle_transformers::models::modernbert` for the underlying implementation.

use super::capabilities::SequenceClassifier;
use super::load_safetensors;
use crate::error::{PipelineError, Result};
use candle_core::{Device, Tensor};
use candle_transformers::models::modernbert::{
    ClassifierConfig, ClassifierPooling, Config,
    ModernBertForSequenceClassification as CandleModernBertForSequenceClassification,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// ModernBERT with a sequence classification head.
pub struct ModernBertClassifier {
    model: CandleModernBertForSequenceClassification,
    num_labels: usize,
    span: tracing::Span,
}

impl ModernBertClassifier {
    /// Load from an HF `config.json` and safetensors weights.
    ///
    /// The head is sized to `labels`. When the checkpoint's `id2label` has a different
    /// number of entries (or none) it is replaced by `labels` in order; the checkpoint's
    /// `classifier_pooling` is kept either way.
    pub fn load(
        config_path: &Path,
        weights_path: &Path,
        labels: &[String],
        device: &Device,
    ) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path).map_err(|e| {
            PipelineError::unavailable(
                "model_config",
                format!("cannot read '{}': {e}", config_path.display()),
            )
        })?;
        let mut config: Config = serde_json::from_str(&config_str).map_err(|e| {
            PipelineError::corrupt("model_config", "a ModernBERT config.json", e)
        })?;
        let pooling = declared_pooling(&config_str);
        patch_config_labels(&mut config, labels, pooling);

        let vb = load_safetensors("weights", weights_path, device)?;
        let model = CandleModernBertForSequenceClassification::load(vb, &config).map_err(|e| {
            PipelineError::corrupt(
                "weights",
                format!("ModernBERT weights with a {}-label head", labels.len()),
                e,
            )
        })?;

        Ok(Self {
            model,
            num_labels: labels.len(),
            span: tracing::span!(tracing::Level::TRACE, "modernbert-classifier"),
        })
    }
}

impl SequenceClassifier for ModernBertClassifier {
    fn forward(&self, input_ids: &Tensor, attention_mask: &Tensor) -> candle_core::Result<Tensor> {
        let _enter = self.span.enter();
        self.model.forward(input_ids, attention_mask)
    }

    fn num_labels(&self) -> usize {
        self.num_labels
    }
}

// `classifier_pooling` from the raw document; candle drops it when `id2label` is absent.
fn declared_pooling(config_str: &str) -> Option<ClassifierPooling> {
    let raw: serde_json::Value = serde_json::from_str(config_str).ok()?;
    ClassifierPooling::deserialize(raw.get("classifier_pooling")?).ok()
}

fn patch_config_labels(
    config: &mut Config,
    labels: &[String],
    declared_pooling: Option<ClassifierPooling>,
) {
    let matches = config
        .classifier_config
        .as_ref()
        .map(|c| c.id2label.len())
        .unwrap_or(0)
        == labels.len();

    if !matches {
        let classifier_pooling = config
            .classifier_config
            .as_ref()
            .map(|c| c.classifier_pooling)
            .or(declared_pooling)
            .unwrap_or_default();
        let id2label: HashMap<String, String> = labels
            .iter()
            .enumerate()
            .map(|(i, label)| (i.to_string(), label.clone()))
            .collect();
        let label2id: HashMap<String, String> = id2label
            .iter()
            .map(|(k, v)| (v.clone(), k.clone()))
            .collect();

        config.classifier_config = Some(ClassifierConfig {
            id2label,
            label2id,
            classifier_pooling,
        });
    }
}
