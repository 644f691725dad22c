//! Localized price text to integer minor units.

use anyhow::{bail, Context, Result};

/// Converts Brazilian price text such as "R$ 1.234,56" into centavos.
///
/// Thousands separators (periods) are dropped, the decimal comma becomes a
/// point, and the currency symbol is stripped before the value is scaled by
/// 100 and rounded.
pub fn to_minor_units(price: &str) -> Result<i64> {
    let cleaned: String = price
        .replace("R$", "")
        .replace('.', "")
        .replacen(',', ".", 1)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        bail!("Empty price: {:?}", price);
    }

    let value: f64 = cleaned.parse().with_context(|| format!("Invalid price: {:?}", price))?;

    if !value.is_finite() || value < 0.0 {
        bail!("Invalid price: {:?}", price);
    }

    Ok((value * 100.0).round() as i64)
}
