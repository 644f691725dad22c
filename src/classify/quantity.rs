//! Unit-count extraction from listing titles.
//!
//! Rules are evaluated in table order against a normalized title and the
//! first capture wins. Rules overlap on purpose: a broad rule further down
//! only decides when every more specific phrasing above it missed.

use regex_lite::Regex;
use std::sync::LazyLock;

/// One phrasing that states a unit count.
#[derive(Debug)]
pub struct QuantityRule {
    pub name: &'static str,
    pattern: Regex,
}

impl QuantityRule {
    fn new(name: &'static str, pattern: &str) -> Self {
        Self { name, pattern: Regex::new(pattern).unwrap() }
    }

    /// Captured count, if this rule matches with a positive number.
    pub fn capture(&self, normalized: &str) -> Option<u32> {
        self.pattern
            .captures_iter(normalized)
            .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
            .find(|n| *n > 0)
    }
}

static RULES: LazyLock<Vec<QuantityRule>> = LazyLock::new(|| {
    vec![
        QuantityRule::new("kit_with_units", r"kit\s+(?:com|c/)\s*(\d+)\s*(?:unidades|un)\b"),
        QuantityRule::new("kit_units", r"kit\s+(\d+)\s*(?:unidades|un)\b"),
        QuantityRule::new("units", r"(\d+)\s*(?:unidades|un)\b"),
        QuantityRule::new("with_count", r"c/\s*(\d+)\b"),
        QuantityRule::new("bottles", r"(\d+)\s*(?:frs|frascos)\b"),
        QuantityRule::new("kit_count", r"kit\s+(?:com\s+)?(\d+)\b"),
        QuantityRule::new("pack", r"\b(?:caixa|pacote|pct|cx)\s+(?:com\s+|c/\s*)?(\d+)\b"),
        QuantityRule::new("times_before", r"\b(\d+)\s*x\b"),
        QuantityRule::new("times_after", r"\bx\s*(\d+)\b"),
    ]
});

static UNIT_ABBREVIATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(?:unids?|unds?)\b").unwrap());

static NUMBER_WITH_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\d+)\s*([a-z]*)").unwrap());

/// Suffixes that make a number a volume, weight or size rather than a count.
const MEASURE_UNITS: &[&str] = &["ml", "l", "lt", "litro", "litros", "g", "gr", "kg", "mg", "cm", "mm"];

/// Rules in evaluation order.
pub fn rules() -> &'static [QuantityRule] {
    &RULES
}

/// Lowercases, strips periods and expands "und"/"unid" to "unidades".
pub fn normalize(title: &str) -> String {
    let lower = title.to_lowercase().replace('.', "");
    UNIT_ABBREVIATION.replace_all(&lower, "unidades").into_owned()
}

/// Unit count stated in the title, with the name of the rule that found it.
pub fn extract_with_rule(title: &str) -> Option<(&'static str, u32)> {
    let normalized = normalize(title);
    rules().iter().find_map(|rule| rule.capture(&normalized).map(|n| (rule.name, n)))
}

/// Unit count stated in the title.
pub fn extract(title: &str) -> Option<u32> {
    extract_with_rule(title).map(|(_, n)| n)
}

/// First positive integer in the title that is not a measurement, so
/// "Frasco 300ml" has no count but "Frasco 300ml Embalagem 6" has 6.
pub fn first_number(title: &str) -> Option<u32> {
    let lower = title.to_lowercase();
    NUMBER_WITH_SUFFIX
        .captures_iter(&lower)
        .filter(|caps| !caps.get(2).is_some_and(|unit| MEASURE_UNITS.contains(&unit.as_str())))
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
        .find(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str) -> &'static QuantityRule {
        rules().iter().find(|r| r.name == name).unwrap()
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Kit 30 Und."), "kit 30 unidades");
        assert_eq!(normalize("Frasco 1.000 unid"), "frasco 1000 unidades");
        assert_eq!(normalize("Seringa c/ 10 unds"), "seringa c/ 10 unidades");
        // Only whole words are expanded
        assert_eq!(normalize("Fundo"), "fundo");
    }

    #[test]
    fn test_kit_phrasings() {
        assert_eq!(extract("kit com 100 unidades"), Some(100));
        assert_eq!(extract("kit 30 und"), Some(30));
        assert_eq!(extract("Kit C/ 50 Un Frasco Dieta"), Some(50));
        assert_eq!(extract("Kit 10 Frasco Dieta Enteral 300ml"), Some(10));
    }

    #[test]
    fn test_no_quantity() {
        assert_eq!(extract("Frasco para dieta enteral"), None);
        assert_eq!(extract("Seringa 20ml"), None);
        assert_eq!(extract(""), None);
    }

    #[test]
    fn test_unit_phrasings() {
        assert_eq!(extract("Equipo Dieta Enteral 100 Un"), Some(100));
        assert_eq!(extract("Equipo Gravitacional 25 unidades"), Some(25));
        assert_eq!(extract("Frasco 300ml c/ 10"), Some(10));
        assert_eq!(extract("Dieta Enteral 20 Frs 500ml"), Some(20));
        assert_eq!(extract("Caixa com 12 frascos"), Some(12));
        assert_eq!(extract("Frasco 300 ml 2x"), Some(2));
        assert_eq!(extract("Seringa 20ml x 5"), Some(5));
    }

    #[test]
    fn test_priority_order() {
        // "units" wins over the later "with_count" and "kit_count"
        assert_eq!(extract_with_rule("Kit c/ 3 frascos 50 unidades"), Some(("units", 50)));
        assert_eq!(extract_with_rule("kit com 100 unidades"), Some(("kit_with_units", 100)));
        assert_eq!(extract_with_rule("Kit 30 und"), Some(("kit_units", 30)));
    }

    #[test]
    fn test_zero_capture_is_skipped() {
        assert_eq!(extract("Kit 0 unidades c/ 4"), Some(4));
    }

    #[test]
    fn test_rules_individually() {
        assert_eq!(rule("kit_with_units").capture("kit com 8 unidades"), Some(8));
        assert_eq!(rule("kit_units").capture("kit 8 un"), Some(8));
        assert_eq!(rule("units").capture("frasco 8unidades"), Some(8));
        assert_eq!(rule("with_count").capture("seringa c/8"), Some(8));
        assert_eq!(rule("bottles").capture("8 frs"), Some(8));
        assert_eq!(rule("kit_count").capture("kit com 8"), Some(8));
        assert_eq!(rule("pack").capture("pacote c/ 8"), Some(8));
        assert_eq!(rule("times_before").capture("8x frasco"), Some(8));
        assert_eq!(rule("times_after").capture("frasco x8"), Some(8));
        assert_eq!(rule("kit_count").capture("frasco 8"), None);
    }

    #[test]
    fn test_first_number() {
        assert_eq!(first_number("Equipo 20 unidades"), Some(20));
        assert_eq!(first_number("Kit 0 frascos 6"), Some(6));
        assert_eq!(first_number("Frasco"), None);
    }

    #[test]
    fn test_first_number_skips_measurements() {
        assert_eq!(first_number("Frasco 300ml"), None);
        assert_eq!(first_number("Frasco 300 ML"), None);
        assert_eq!(first_number("Kit 0 frascos 20 ml"), None);
        assert_eq!(first_number("Frasco 1L Dieta 500g"), None);
        assert_eq!(first_number("Frasco 300ml Embalagem 6"), Some(6));
        assert_eq!(first_number("Seringa 20ML 3 peças"), Some(3));
    }
}
