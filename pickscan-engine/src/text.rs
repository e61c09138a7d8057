//! Text normalization shared by the voice grammar and name search

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Lowercase, strip diacritics and punctuation, collapse whitespace
///
/// `"¡Ixora, agrega 5 CAJAS de Vitamina C!"` becomes
/// `"ixora agrega 5 cajas de vitamina c"`.
pub fn normalize(text: &str) -> String {
    let stripped: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { ' ' })
        .collect();

    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
