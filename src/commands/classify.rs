//! Classify command implementation.

use crate::classify::HybridClassifier;
use crate::config::Config;
use crate::format::Formatter;
use anyhow::{bail, Result};
use tracing::debug;

/// Classifies a single listing title.
pub struct ClassifyCommand {
    config: Config,
}

impl ClassifyCommand {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Classifies `title` with the configured classifier.
    pub async fn execute(&self, title: &str) -> Result<String> {
        let classifier = self.config.classifier();
        self.execute_with_classifier(&classifier, title).await
    }

    /// Classifies with a provided classifier (for testing).
    pub async fn execute_with_classifier(&self, classifier: &HybridClassifier, title: &str) -> Result<String> {
        let title = title.trim();
        if title.is_empty() {
            bail!("Title must not be empty");
        }

        let stats = classifier.stats();
        debug!("Classifying '{}' (model escalation: {})", title, stats.ai_enabled);

        let result = classifier.classify(title).await;
        Ok(Formatter::new(self.config.format).format_classification(title, &result))
    }
}
