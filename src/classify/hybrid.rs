//! Two-tier classifier: keyword rules, escalated to a model when unsure.

use crate::classify::inference::{self, TextClassifier};
use crate::classify::{mechanical, ClassificationResult, Method};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Thresholds and switches of the hybrid gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Reported with the stats; the gate itself compares confidences directly
    pub ai_confidence_threshold: f64,
    /// Keyword results at or above this confidence are final
    pub mechanical_confidence_threshold: f64,
    pub enable_ai: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { ai_confidence_threshold: 0.8, mechanical_confidence_threshold: 0.7, enable_ai: false }
    }
}

/// Partial override merged into a [`ClassifierConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub ai_confidence_threshold: Option<f64>,
    pub mechanical_confidence_threshold: Option<f64>,
    pub enable_ai: Option<bool>,
}

impl ClassifierConfig {
    /// Applies the fields present in `update`, keeping the rest.
    pub fn merge(&mut self, update: ConfigUpdate) {
        if let Some(v) = update.ai_confidence_threshold {
            self.ai_confidence_threshold = v;
        }
        if let Some(v) = update.mechanical_confidence_threshold {
            self.mechanical_confidence_threshold = v;
        }
        if let Some(v) = update.enable_ai {
            self.enable_ai = v;
        }
    }
}

/// Snapshot of the classifier. Serialized snake_case like the config it embeds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassifierStats {
    pub ai_enabled: bool,
    pub current_config: ClassifierConfig,
}

/// Classifies titles with keyword rules, asking an external model only when
/// the rules are not confident. Never fails.
pub struct HybridClassifier {
    config: ClassifierConfig,
    model: Option<Arc<dyn TextClassifier>>,
}

impl HybridClassifier {
    /// Creates a keyword-only classifier. Escalation stays off even if
    /// `enable_ai` is set, since there is no model to ask.
    pub fn new(config: ClassifierConfig) -> Self {
        if config.enable_ai {
            warn!("Model escalation requested but no inference client is configured, using keyword rules only");
        }
        Self { config, model: None }
    }

    /// Creates a classifier that may escalate to `model`.
    pub fn with_model(config: ClassifierConfig, model: Arc<dyn TextClassifier>) -> Self {
        debug!("Hybrid classifier initialized (AI: {})", config.enable_ai);
        Self { config, model: Some(model) }
    }

    pub fn config(&self) -> ClassifierConfig {
        self.config
    }

    pub fn update_config(&mut self, update: ConfigUpdate) {
        self.config.merge(update);
        info!("Classifier config updated: {:?}", self.config);
    }

    pub fn stats(&self) -> ClassifierStats {
        ClassifierStats { ai_enabled: self.ai_enabled(), current_config: self.config }
    }

    fn ai_enabled(&self) -> bool {
        self.config.enable_ai && self.model.is_some()
    }

    /// Keyword tier only. Pure.
    pub fn classify_mechanical(&self, title: &str) -> ClassificationResult {
        mechanical::classify(title)
    }

    /// Classifies a title, escalating low-confidence keyword results to the
    /// model when enabled. A model failure falls back to the keyword result.
    pub async fn classify(&self, title: &str) -> ClassificationResult {
        let keyword = self.classify_mechanical(title);
        debug!("Keyword result for '{}': {} ({:.2})", title, keyword.product_type, keyword.confidence);

        if keyword.confidence >= self.config.mechanical_confidence_threshold {
            return keyword;
        }

        let Some(model) = self.model.as_ref().filter(|_| self.config.enable_ai) else {
            return keyword;
        };

        let scores = match model.classify(title).await {
            Ok(scores) => scores,
            Err(e) => {
                warn!(op = "classifier.model", recovered = true, "Model classification failed, using keyword result: {:#}", e);
                return keyword;
            }
        };

        match inference::to_classification(title, &scores) {
            Some(model_result) if model_result.confidence > keyword.confidence => {
                debug!(
                    "Model beats keywords for '{}': {:.2} > {:.2}",
                    title, model_result.confidence, keyword.confidence
                );
                ClassificationResult { method: Method::Hybrid, ..model_result }
            }
            Some(_) => keyword,
            None => {
                warn!(op = "classifier.model", recovered = true, "Model returned no labels, using keyword result");
                keyword
            }
        }
    }
}

impl Default for HybridClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::inference::LabelScore;
    use crate::classify::ProductType;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Mock model returning fixed scores, or failing.
    struct MockModel {
        scores: Option<Vec<LabelScore>>,
        calls: AtomicUsize,
    }

    impl MockModel {
        fn answering(label: &str, score: f64) -> Arc<Self> {
            Arc::new(Self {
                scores: Some(vec![LabelScore { label: label.to_string(), score }]),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { scores: None, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl TextClassifier for MockModel {
        async fn classify(&self, _text: &str) -> anyhow::Result<Vec<LabelScore>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.scores.clone().ok_or_else(|| anyhow::anyhow!("inference timed out"))
        }
    }

    fn enabled() -> ClassifierConfig {
        ClassifierConfig { enable_ai: true, ..Default::default() }
    }

    // "Equipo" alone: 1 of 5 tube terms, below the 0.7 threshold
    const LOW_CONFIDENCE_TITLE: &str = "Equipo Dieta Enteral";

    #[tokio::test]
    async fn test_model_wins_when_more_confident() {
        let model = MockModel::answering("kit", 0.92);
        let classifier = HybridClassifier::with_model(enabled(), model.clone());

        let result = classifier.classify(LOW_CONFIDENCE_TITLE).await;
        assert_eq!(result.method, Method::Hybrid);
        assert_eq!(result.product_type, ProductType::Bundle);
        assert_eq!(result.confidence, 0.92);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_keywords_kept_when_model_not_better() {
        // Keyword confidence is 0.2; a tie does not switch
        let classifier = HybridClassifier::with_model(enabled(), MockModel::answering("frasco", 0.2));
        let result = classifier.classify(LOW_CONFIDENCE_TITLE).await;
        assert_eq!(result, classifier.classify_mechanical(LOW_CONFIDENCE_TITLE));
    }

    #[tokio::test]
    async fn test_model_failure_falls_back() {
        let model = MockModel::failing();
        let classifier = HybridClassifier::with_model(enabled(), model.clone());

        let result = classifier.classify(LOW_CONFIDENCE_TITLE).await;
        assert_eq!(result, mechanical::classify(LOW_CONFIDENCE_TITLE));
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_model_answer_falls_back() {
        let model = Arc::new(MockModel { scores: Some(Vec::new()), calls: AtomicUsize::new(0) });
        let classifier = HybridClassifier::with_model(enabled(), model);
        let result = classifier.classify(LOW_CONFIDENCE_TITLE).await;
        assert_eq!(result.method, Method::Mechanical);
    }

    #[tokio::test]
    async fn test_confident_keywords_skip_model() {
        let model = MockModel::answering("outro", 0.99);
        let classifier = HybridClassifier::with_model(enabled(), model.clone());

        let result = classifier.classify("Kit Frasco + Equipo").await;
        assert_eq!(result.method, Method::Mechanical);
        assert_eq!(result.product_type, ProductType::Bundle);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_disabled_model_never_called() {
        let model = MockModel::answering("kit", 0.99);
        let classifier = HybridClassifier::with_model(ClassifierConfig::default(), model.clone());

        for title in ["Equipo", "Suplemento", "Frasco 300ml"] {
            let result = classifier.classify(title).await;
            assert_eq!(result, mechanical::classify(title));
        }
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
        assert!(!classifier.stats().ai_enabled);
    }

    #[tokio::test]
    async fn test_without_model_is_keyword_only() {
        let classifier = HybridClassifier::new(enabled());
        let result = classifier.classify(LOW_CONFIDENCE_TITLE).await;
        assert_eq!(result.method, Method::Mechanical);
        assert!(!classifier.stats().ai_enabled);
    }

    #[test]
    fn test_update_config_merges() {
        let mut classifier = HybridClassifier::default();
        classifier.update_config(ConfigUpdate { enable_ai: Some(true), ..Default::default() });

        let config = classifier.config();
        assert!(config.enable_ai);
        assert_eq!(config.ai_confidence_threshold, 0.8);
        assert_eq!(config.mechanical_confidence_threshold, 0.7);

        classifier.update_config(ConfigUpdate { mechanical_confidence_threshold: Some(0.1), ..Default::default() });
        assert!(classifier.config().enable_ai);
        assert_eq!(classifier.config().mechanical_confidence_threshold, 0.1);
    }

    #[tokio::test]
    async fn test_lower_threshold_keeps_keyword_result() {
        let model = MockModel::answering("kit", 0.99);
        let mut classifier = HybridClassifier::with_model(enabled(), model.clone());
        classifier.update_config(ConfigUpdate { mechanical_confidence_threshold: Some(0.2), ..Default::default() });

        let result = classifier.classify(LOW_CONFIDENCE_TITLE).await;
        assert_eq!(result.method, Method::Mechanical);
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stats() {
        let classifier = HybridClassifier::with_model(enabled(), MockModel::failing());
        let stats = classifier.stats();
        assert!(stats.ai_enabled);
        assert_eq!(stats.current_config, enabled());

        let json = serde_json::to_value(stats).unwrap();
        assert_eq!(json["ai_enabled"], true);
        assert_eq!(json["current_config"]["mechanical_confidence_threshold"], 0.7);
        assert_eq!(json["current_config"]["enable_ai"], true);
        assert!(json.get("aiEnabled").is_none());
    }
}
