//! Integration tests for the page extractor using fixture files.

use ml_harvester::classify::{HybridClassifier, ProductType};
use ml_harvester::marketplace::{ExtractionRules, Extractor, Listing, RuleTable};
use ml_harvester::persist::to_minor_units;
use ml_harvester::HarvestError;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

const SEARCH_FIXTURE: &str = include_str!("fixtures/search_page.html");

fn extractor() -> Extractor {
    Extractor::new(Arc::new(ExtractionRules::builtin().unwrap()), "https://www.mercadolivre.com.br")
}

#[test]
fn test_extract_search_page() {
    let page = extractor().extract_page(SEARCH_FIXTURE).unwrap();

    // Five cards: one without a price, one with an unusable link
    assert_eq!(page.candidates, 5);
    assert_eq!(page.listings.len(), 3);
    assert_eq!(page.discarded, 2);

    let first = &page.listings[0];
    assert_eq!(first.title(), "Frasco Para Dieta Enteral 300ml");
    assert_eq!(first.price(), "R$ 1.234,56");
    assert_eq!(
        first.link(),
        "https://produto.mercadolivre.com.br/MLB-111111111-frasco-para-dieta-enteral-300ml-_JM"
    );
    assert_eq!(first.image(), Some("https://http2.mlstatic.com/D_Q_NP_frasco-300.webp"));

    // Lazy image and relative link
    let second = &page.listings[1];
    assert_eq!(second.price(), "R$ 89");
    assert_eq!(second.image(), Some("https://http2.mlstatic.com/D_Q_NP_kit-frascos.webp"));
    assert_eq!(
        second.link(),
        "https://www.mercadolivre.com.br/MLB-222222222-kit-10-frascos-equipo-nutrimed-_JM"
    );

    // Protocol-relative link
    let third = &page.listings[2];
    assert_eq!(third.price(), "R$ 7,99");
    assert!(third.link().starts_with("https://produto.mercadolivre.com.br/MLB-444444444"));

    let next = page.next_page.expect("next page control");
    assert_eq!(
        next.href.as_deref(),
        Some("https://lista.mercadolivre.com.br/frasco-dieta-enteral_Desde_49_NoIndex_True")
    );
}

#[test]
fn test_fixture_is_results_page() {
    let extractor = extractor();
    assert!(extractor.is_results_page(SEARCH_FIXTURE));
    assert!(extractor.has_next_page(SEARCH_FIXTURE));
}

#[test]
fn test_last_page_has_no_next() {
    let last = SEARCH_FIXTURE.replace(
        "andes-pagination__button andes-pagination__button--next",
        "andes-pagination__button andes-pagination__button--next andes-pagination__button--disabled",
    );
    assert!(!extractor().has_next_page(&last));
}

#[test]
fn test_captcha_page_is_blocked() {
    let html = r#"
        <html>
        <body>
            <form action="/jms/lgz/captcha/validate"><div class="g-recaptcha"></div></form>
        </body>
        </html>
    "#;

    let err = extractor().extract_page(html).unwrap_err();
    assert!(matches!(err, HarvestError::Blocked(_)));
}

#[test]
fn test_rules_file_replaces_builtin() {
    let mut table = RuleTable::builtin();
    table.version = "custom-1".to_string();
    table.item = vec!["article.card".to_string()];
    table.title = vec!["h2".to_string()];
    table.price_fraction = vec![".amount".to_string()];
    table.link = vec!["a.go".to_string()];

    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", toml::to_string(&table).unwrap()).unwrap();

    let rules = ExtractionRules::load(Some(file.path())).unwrap();
    assert_eq!(rules.version, "custom-1");

    let html = r#"
        <html><body><section class="ui-search-results">
            <article class="card"><h2>Seringa 20ml</h2><span class="amount">5</span><a class="go" href="/MLB-9">ver</a></article>
        </section></body></html>
    "#;

    let page = Extractor::new(Arc::new(rules), "https://www.mercadolivre.com.br").extract_page(html).unwrap();
    assert_eq!(page.listings.len(), 1);
    assert_eq!(page.listings[0].title(), "Seringa 20ml");
    assert_eq!(page.listings[0].link(), "https://www.mercadolivre.com.br/MLB-9");

    // The built-in cards no longer match
    let page = Extractor::new(Arc::new(ExtractionRules::load(Some(file.path())).unwrap()), "https://x")
        .extract_page(SEARCH_FIXTURE)
        .unwrap();
    assert!(page.listings.is_empty());
}

#[tokio::test]
async fn test_fixture_listings_classify_and_price() {
    let page = extractor().extract_page(SEARCH_FIXTURE).unwrap();
    let listings: Vec<Listing> =
        page.listings.into_iter().map(|raw| Listing::stamp(raw, "mercadolivre", chrono::Utc::now())).collect();

    let classifier = HybridClassifier::default();
    let mut types = Vec::new();
    for listing in &listings {
        types.push(classifier.classify(&listing.title).await.product_type);
    }

    assert_eq!(types, vec![ProductType::Container, ProductType::Bundle, ProductType::DeliveryTube]);

    let prices: Vec<i64> = listings.iter().map(|l| to_minor_units(&l.price).unwrap()).collect();
    assert_eq!(prices, vec![123456, 8900, 799]);
}
