//! URL-safe slugs from listing titles.

/// Slug used when a title has no letters or digits at all.
pub const FALLBACK_SLUG: &str = "listing";

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Lower,
    Upper,
    Digit,
}

/// Strips diacritics from Latin letters common in Portuguese titles.
fn fold(c: char) -> char {
    match c {
        'á' | 'à' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'Á' | 'À' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'É' | 'È' | 'Ê' | 'Ë' => 'E',
        'í' | 'ì' | 'î' | 'ï' => 'i',
        'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
        'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
        'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
        'ú' | 'ù' | 'û' | 'ü' => 'u',
        'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
        'ç' => 'c',
        'Ç' => 'C',
        'ñ' => 'n',
        'Ñ' => 'N',
        other => other,
    }
}

/// Kebab-cases a title: "Frasco 300ml Ácido" becomes "frasco-300-ml-acido".
///
/// Words break on anything that is not an ASCII letter or digit, between
/// letters and digits, and at lower-to-upper case changes.
pub fn slugify(title: &str) -> String {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut prev: Option<Kind> = None;

    for c in title.chars().map(fold) {
        let kind = if c.is_ascii_lowercase() {
            Kind::Lower
        } else if c.is_ascii_uppercase() {
            Kind::Upper
        } else if c.is_ascii_digit() {
            Kind::Digit
        } else {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            prev = None;
            continue;
        };

        let boundary = match (prev, kind) {
            (Some(Kind::Digit), Kind::Lower | Kind::Upper) => true,
            (Some(Kind::Lower | Kind::Upper), Kind::Digit) => true,
            (Some(Kind::Lower), Kind::Upper) => true,
            _ => false,
        };
        if boundary && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }

        current.push(c.to_ascii_lowercase());
        prev = Some(kind);
    }

    if !current.is_empty() {
        words.push(current);
    }

    if words.is_empty() {
        return FALLBACK_SLUG.to_string();
    }
    words.join("-")
}

/// `base` with a numeric suffix: "-1", "-2", and so on.
pub fn with_suffix(base: &str, n: u32) -> String {
    format!("{}-{}", base, n)
}
