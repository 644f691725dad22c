//! Output formatting for listings, classifications and save reports
//! (table, JSON, markdown, CSV).

use crate::classify::ClassificationResult;
use crate::config::OutputFormat;
use crate::marketplace::{Listing, SearchBatch};
use crate::persist::SaveReport;

/// Formats results for output.
pub struct Formatter {
    format: OutputFormat,
}

impl Formatter {
    /// Creates a new formatter.
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats the listings of a search batch.
    pub fn format_batch(&self, batch: &SearchBatch) -> String {
        if batch.total() == 0 && self.format != OutputFormat::Json {
            return match self.format {
                OutputFormat::Csv => self.csv_header(),
                _ => self.empty_batch(batch),
            };
        }

        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(batch).unwrap_or_else(|_| "{}".to_string()),
            OutputFormat::Table => self.table_batch(batch),
            OutputFormat::Markdown => self.markdown_batch(batch),
            OutputFormat::Csv => self.csv_batch(batch),
        }
    }

    /// Formats the classification of one title.
    pub fn format_classification(&self, title: &str, result: &ClassificationResult) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(result).unwrap_or_else(|_| "{}".to_string()),
            OutputFormat::Markdown => self.markdown_classification(title, result),
            OutputFormat::Csv => self.csv_classification(title, result),
            OutputFormat::Table => self.table_classification(title, result),
        }
    }

    /// One-line summary of a save run.
    pub fn format_report(&self, report: &SaveReport) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string()),
            _ => format!(
                "Saved {} of {} listings ({} duplicates, {} rejected, {} failed)",
                report.inserted,
                report.total(),
                report.duplicates,
                report.rejected,
                report.failed
            ),
        }
    }

    fn empty_batch(&self, batch: &SearchBatch) -> String {
        let failed = batch.failed_terms();
        if failed.is_empty() {
            "No listings found.".to_string()
        } else {
            format!("No listings found. Failed terms: {}", failed.join(", "))
        }
    }

    // Table formatting

    fn table_batch(&self, batch: &SearchBatch) -> String {
        let term_width = 24;
        let price_width = 14;
        let title_width = 60;

        let mut lines = Vec::new();

        lines.push(format!("{:<term_width$}  {:>price_width$}  {}", "Term", "Price", "Title"));
        lines.push(format!("{:-<term_width$}  {:-<price_width$}  {:-<title_width$}", "", "", ""));

        for results in &batch.terms {
            for listing in &results.listings {
                lines.push(format!(
                    "{:<term_width$}  {:>price_width$}  {}",
                    truncate(&results.term, term_width),
                    listing.price,
                    truncate(&listing.title, title_width)
                ));
            }
        }

        lines.push(String::new());
        lines.push(format!("Total: {} listings across {} terms", batch.total(), batch.terms.len()));

        let failed = batch.failed_terms();
        if !failed.is_empty() {
            lines.push(format!("Failed terms: {}", failed.join(", ")));
        }

        lines.join("\n")
    }

    fn table_classification(&self, title: &str, result: &ClassificationResult) -> String {
        let info = &result.extracted_info;
        let mut lines = Vec::new();

        lines.push(format!("Title:       {}", title));
        lines.push(format!("Type:        {}", result.product_type));
        lines.push(format!("Confidence:  {:.2}", result.confidence));
        lines.push(format!("Method:      {}", result.method));
        lines.push(format!(
            "Quantity:    {}",
            info.quantity.map(|q| q.to_string()).unwrap_or_else(|| "N/A".to_string())
        ));

        if !info.components.is_empty() {
            lines.push(format!(
                "Components:  {}",
                info.components.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
            ));
        }
        if let Some(brand) = &info.brand {
            lines.push(format!("Brand:       {}", brand));
        }

        lines.join("\n")
    }

    // Markdown formatting

    fn markdown_batch(&self, batch: &SearchBatch) -> String {
        let mut lines = Vec::new();

        for results in &batch.terms {
            lines.push(format!("## {}", results.term));
            lines.push(String::new());

            if results.listings.is_empty() {
                lines.push(if results.succeeded { "*No listings*" } else { "*Search failed*" }.to_string());
                lines.push(String::new());
                continue;
            }

            lines.push("| Price | Title |".to_string());
            lines.push("|-------|-------|".to_string());
            for listing in &results.listings {
                lines.push(format!(
                    "| {} | [{}]({}) |",
                    listing.price,
                    truncate(&listing.title, 50).replace('|', "\\|"),
                    listing.link
                ));
            }
            lines.push(String::new());
        }

        lines.push(format!("*{} listings found*", batch.total()));
        lines.join("\n")
    }

    fn markdown_classification(&self, title: &str, result: &ClassificationResult) -> String {
        let info = &result.extracted_info;
        let mut lines = Vec::new();

        lines.push(format!("## {}", title));
        lines.push(String::new());
        lines.push(format!("- **Type:** {}", result.product_type));
        lines.push(format!("- **Confidence:** {:.2}", result.confidence));
        lines.push(format!("- **Method:** {}", result.method));
        if let Some(q) = info.quantity {
            lines.push(format!("- **Quantity:** {}", q));
        }
        if let Some(brand) = &info.brand {
            lines.push(format!("- **Brand:** {}", brand));
        }

        lines.join("\n")
    }

    // CSV formatting

    fn csv_header(&self) -> String {
        "term,title,price,link,image,source,extracted_at".to_string()
    }

    fn csv_batch(&self, batch: &SearchBatch) -> String {
        let mut lines = Vec::new();
        lines.push(self.csv_header());

        for results in &batch.terms {
            for listing in &results.listings {
                lines.push(Self::csv_listing(&results.term, listing));
            }
        }

        lines.join("\n")
    }

    fn csv_listing(term: &str, listing: &Listing) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            Self::csv_escape(term),
            Self::csv_escape(&listing.title),
            Self::csv_escape(&listing.price),
            Self::csv_escape(&listing.link),
            listing.image.as_deref().map(Self::csv_escape).unwrap_or_default(),
            listing.source,
            listing.extracted_at.to_rfc3339()
        )
    }

    fn csv_classification(&self, title: &str, result: &ClassificationResult) -> String {
        let info = &result.extracted_info;
        format!(
            "title,type,confidence,method,quantity,brand\n{},{},{},{},{},{}",
            Self::csv_escape(title),
            result.product_type,
            result.confidence,
            result.method,
            info.quantity.map(|q| q.to_string()).unwrap_or_default(),
            info.brand.as_deref().unwrap_or_default()
        )
    }

    fn csv_escape(s: &str) -> String {
        if s.contains(',') || s.contains('"') || s.contains('\n') {
            format!("\"{}\"", s.replace('"', "\"\""))
        } else {
            s.to_string()
        }
    }
}

/// Shortens to `width` characters, marking the cut with "...".
fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        return s.to_string();
    }
    let kept: String = s.chars().take(width.saturating_sub(3)).collect();
    format!("{}...", kept)
}
