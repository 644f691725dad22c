//! External text-classification model, queried over HTTP.

use crate::classify::{mechanical, quantity, ClassificationResult, Method, ProductType};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use wreq::Client;

/// One label with its model score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

/// Trait for text classification - enables mocking for tests.
#[async_trait]
pub trait TextClassifier: Send + Sync {
    /// Scores the text against the model's labels, best first.
    async fn classify(&self, text: &str) -> Result<Vec<LabelScore>>;
}

/// Maps a model label to a product type. Unknown labels are `Other`.
pub fn map_label(label: &str) -> ProductType {
    match label.trim().to_lowercase().as_str() {
        "kit" => ProductType::Bundle,
        "frasco" => ProductType::Container,
        "equipo" => ProductType::DeliveryTube,
        "seringa" => ProductType::Syringe,
        _ => ProductType::Other,
    }
}

/// Turns model scores into a classification of `title`, taking the
/// top-scoring label. `None` when the model returned nothing.
pub fn to_classification(title: &str, scores: &[LabelScore]) -> Option<ClassificationResult> {
    let top = scores.iter().max_by(|a, b| a.score.total_cmp(&b.score))?;
    let product_type = map_label(&top.label);

    debug!("Model labelled '{}' as {} -> {} ({:.3})", title, top.label, product_type, top.score);

    Some(ClassificationResult::new(
        product_type,
        top.score,
        mechanical::metadata(title, quantity::first_number(title)),
        Method::Ai,
    ))
}

/// Where the model lives and how to reach it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InferenceConfig {
    pub endpoint: String,
    pub model: String,
    /// API token, usually from `HUGGINGFACE_TOKEN`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    pub timeout_secs: u64,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api-inference.huggingface.co/models".to_string(),
            model: "microsoft/DialoGPT-medium".to_string(),
            token: None,
            timeout_secs: 20,
        }
    }
}

/// Hugging Face style inference API client.
pub struct HfInferenceClient {
    client: Client,
    url: String,
    token: String,
}

impl HfInferenceClient {
    /// Creates a client. Fails when no token is configured.
    pub fn new(config: &InferenceConfig) -> Result<Self> {
        let token = config
            .token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .context("No inference token configured (set HUGGINGFACE_TOKEN)")?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build inference HTTP client")?;

        let url = format!("{}/{}", config.endpoint.trim_end_matches('/'), config.model.trim_start_matches('/'));

        Ok(Self { client, url, token })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum InferenceResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

fn parse_scores(body: &str) -> Result<Vec<LabelScore>> {
    let response: InferenceResponse = serde_json::from_str(body)
        .with_context(|| format!("Unexpected inference response: {}", body.chars().take(200).collect::<String>()))?;

    let mut scores = match response {
        InferenceResponse::Nested(batches) => batches.into_iter().next().unwrap_or_default(),
        InferenceResponse::Flat(scores) => scores,
    };
    scores.sort_by(|a, b| b.score.total_cmp(&a.score));
    Ok(scores)
}

#[async_trait]
impl TextClassifier for HfInferenceClient {
    async fn classify(&self, text: &str) -> Result<Vec<LabelScore>> {
        let body = serde_json::to_string(&serde_json::json!({ "inputs": text }))?;

        debug!("POST {}", self.url);

        let response = self
            .client
            .post(self.url.as_str())
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .body(body)
            .send()
            .await
            .context("Failed to send inference request")?;

        let status = response.status();
        debug!("Inference response status: {}", status);

        if !status.is_success() {
            anyhow::bail!("Inference request failed with status: {}", status);
        }

        let body = response.text().await.context("Failed to read inference response")?;
        parse_scores(&body)
    }
}
