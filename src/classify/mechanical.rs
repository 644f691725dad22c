//! Keyword classification of listing titles.
//!
//! Deterministic and side-effect free: the same title always yields the same
//! result.

use crate::classify::{quantity, ClassificationResult, ExtractedInfo, Method, ProductType};
use std::collections::BTreeSet;

pub const CONTAINER_TERMS: &[&str] = &["frasco", "garrafa", "recipiente", "frs"];
pub const TUBE_TERMS: &[&str] = &["equipo", "extensor", "tubo", "sonda", "equipos"];
pub const SYRINGE_TERMS: &[&str] = &["seringa", "seringas"];
pub const BUNDLE_TERMS: &[&str] = &["kit"];

/// Brands checked in order; the first one found wins.
pub const BRANDS: &[&str] = &["nutrimed", "nestle", "trophic", "biobase", "isosource"];

/// Confidence reported for titles with no category evidence.
pub const OTHER_CONFIDENCE: f64 = 0.5;

/// Component name and the title fragments that indicate it.
const COMPONENTS: &[(&str, &[&str])] = &[
    ("frasco", &["frasco", "frs"]),
    ("equipo", &["equipo", "equipos"]),
    ("seringa", &["seringa", "seringas"]),
];

/// Keyword hits per term set for one lowercased title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Evidence {
    pub container: usize,
    pub tube: usize,
    pub syringe: usize,
    pub bundle: usize,
}

impl Evidence {
    pub fn from_title(lower: &str) -> Self {
        Self {
            container: matches(lower, CONTAINER_TERMS),
            tube: matches(lower, TUBE_TERMS),
            syringe: matches(lower, SYRINGE_TERMS),
            bundle: matches(lower, BUNDLE_TERMS),
        }
    }

    /// Category by keyword precedence.
    pub fn decide(&self) -> ProductType {
        let container = self.container > 0;
        let tube = self.tube > 0;
        let syringe = self.syringe > 0;

        if self.bundle > 0 {
            return match (container, tube, syringe) {
                (true, true, _) => ProductType::Bundle,
                (false, false, true) => ProductType::Syringe,
                (true, false, _) => ProductType::Container,
                (false, true, _) => ProductType::DeliveryTube,
                // A kit with no recognizable contents
                (false, false, false) => ProductType::Bundle,
            };
        }

        match (container, tube, syringe) {
            (true, true, _) => ProductType::Bundle,
            (true, false, _) => ProductType::Container,
            (false, true, _) => ProductType::DeliveryTube,
            (false, false, true) => ProductType::Syringe,
            (false, false, false) => ProductType::Other,
        }
    }

    /// Share of the chosen category's term set found in the title.
    pub fn confidence(&self, product_type: ProductType) -> f64 {
        let (hits, total) = match product_type {
            ProductType::Container => (self.container, CONTAINER_TERMS.len()),
            ProductType::DeliveryTube => (self.tube, TUBE_TERMS.len()),
            ProductType::Syringe => (self.syringe, SYRINGE_TERMS.len()),
            ProductType::Bundle => (self.bundle, BUNDLE_TERMS.len()),
            ProductType::Other => return OTHER_CONFIDENCE,
        };
        (hits as f64 / total as f64).min(1.0)
    }
}

fn matches(lower: &str, terms: &[&str]) -> usize {
    terms.iter().filter(|term| lower.contains(*term)).count()
}

/// Component names mentioned in the title.
pub fn components(lower: &str) -> BTreeSet<String> {
    COMPONENTS
        .iter()
        .filter(|(_, fragments)| fragments.iter().any(|f| lower.contains(f)))
        .map(|(name, _)| name.to_string())
        .collect()
}

pub fn brand(lower: &str) -> Option<String> {
    BRANDS.iter().find(|b| lower.contains(*b)).map(|b| b.to_string())
}

/// Components and brand read from the title, with the given quantity.
pub fn metadata(title: &str, quantity: Option<u32>) -> ExtractedInfo {
    let lower = title.to_lowercase();
    ExtractedInfo { quantity, components: components(&lower), brand: brand(&lower) }
}

/// Classifies a title using keyword rules only.
pub fn classify(title: &str) -> ClassificationResult {
    let lower = title.to_lowercase();
    let evidence = Evidence::from_title(&lower);
    let product_type = evidence.decide();
    let confidence = evidence.confidence(product_type);

    ClassificationResult::new(
        product_type,
        confidence,
        metadata(title, quantity::extract(title)),
        Method::Mechanical,
    )
}
