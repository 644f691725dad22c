//! Product classification: keyword rules first, optional model escalation.

pub mod hybrid;
pub mod inference;
pub mod mechanical;
pub mod quantity;

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

pub use hybrid::{ClassifierConfig, ClassifierStats, ConfigUpdate, HybridClassifier};
pub use inference::{HfInferenceClient, InferenceConfig, LabelScore, TextClassifier};

/// Product category assigned to a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductType {
    Container,
    DeliveryTube,
    /// Container sold together with a delivery tube
    Bundle,
    Syringe,
    #[default]
    Other,
}

impl ProductType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProductType::Container => "container",
            ProductType::DeliveryTube => "delivery_tube",
            ProductType::Bundle => "bundle",
            ProductType::Syringe => "syringe",
            ProductType::Other => "other",
        }
    }
}

impl fmt::Display for ProductType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which tier produced a classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    Mechanical,
    Ai,
    Hybrid,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Method::Mechanical => "mechanical",
            Method::Ai => "ai",
            Method::Hybrid => "hybrid",
        };
        write!(f, "{}", s)
    }
}

/// Details read from the title alongside the category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedInfo {
    /// Unit count, always positive when present
    pub quantity: Option<u32>,
    #[serde(skip_serializing_if = "BTreeSet::is_empty", default)]
    pub components: BTreeSet<String>,
    pub brand: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    #[serde(rename = "type")]
    pub product_type: ProductType,
    /// Always within [0, 1]
    pub confidence: f64,
    pub extracted_info: ExtractedInfo,
    pub method: Method,
}

impl ClassificationResult {
    /// Builds a result, clamping confidence into [0, 1].
    pub fn new(product_type: ProductType, confidence: f64, extracted_info: ExtractedInfo, method: Method) -> Self {
        let confidence = if confidence.is_nan() { 0.0 } else { confidence.clamp(0.0, 1.0) };
        Self { product_type, confidence, extracted_info, method }
    }
}
