use anyhow::{Result, anyhow};
use isolang::Language;

/// Language utilities for ISO language code handling
///
/// This module provides pure lookups for validating, normalizing and comparing
/// ISO 639-1 (2-letter) and ISO 639-2 (3-letter) language codes. Two codes are
/// synonyms when they name the same language, e.g. "fr", "fra" and "fre".
/// Language code type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageCodeType {
    /// ISO 639-1 (2-letter) code
    Part1,
    /// ISO 639-2/T (3-letter) code
    Part2T,
    /// ISO 639-2/B (3-letter) code
    Part2B,
}

/// ISO 639-2/B codes that differ from their ISO 639-2/T counterpart, as (B, T)
const BIBLIOGRAPHIC_CODES: &[(&str, &str)] = &[
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("dut", "nld"),
    ("fre", "fra"),
    ("geo", "kat"),
    ("ger", "deu"),
    ("gre", "ell"),
    ("ice", "isl"),
    ("mac", "mkd"),
    ("mao", "mri"),
    ("may", "msa"),
    ("per", "fas"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("tib", "bod"),
    ("wel", "cym"),
];

fn bibliographic_to_terminology(code: &str) -> Option<&'static str> {
    BIBLIOGRAPHIC_CODES
        .iter()
        .find(|(b, _)| *b == code)
        .map(|(_, t)| *t)
}

fn terminology_to_bibliographic(code: &str) -> Option<&'static str> {
    BIBLIOGRAPHIC_CODES
        .iter()
        .find(|(_, t)| *t == code)
        .map(|(b, _)| *b)
}

/// Validate if a language code is a valid ISO 639-1 or ISO 639-2 code
pub fn validate_language_code(code: &str) -> Result<LanguageCodeType> {
    let normalized_code = code.trim().to_lowercase();

    match normalized_code.len() {
        2 if Language::from_639_1(&normalized_code).is_some() => Ok(LanguageCodeType::Part1),
        3 if Language::from_639_3(&normalized_code).is_some() => Ok(LanguageCodeType::Part2T),
        3 if bibliographic_to_terminology(&normalized_code).is_some() => Ok(LanguageCodeType::Part2B),
        _ => Err(anyhow!("Invalid language code: {}", code)),
    }
}

/// Normalize a language code to ISO 639-2/T (3-letter) format
pub fn normalize_to_part2t(code: &str) -> Result<String> {
    let normalized_code = code.trim().to_lowercase();

    match validate_language_code(&normalized_code)? {
        LanguageCodeType::Part1 => Language::from_639_1(&normalized_code)
            .map(|lang| lang.to_639_3().to_string())
            .ok_or_else(|| anyhow!("Cannot normalize invalid language code: {}", code)),
        LanguageCodeType::Part2T => Ok(normalized_code),
        LanguageCodeType::Part2B => bibliographic_to_terminology(&normalized_code)
            .map(String::from)
            .ok_or_else(|| anyhow!("Cannot normalize invalid language code: {}", code)),
    }
}

/// All codes naming the same language as `code`: ISO 639-1, 639-2/T and 639-2/B.
///
/// Unknown codes only have themselves (lowercased) as synonym.
pub fn language_synonyms(code: &str) -> Vec<String> {
    let normalized_code = code.trim().to_lowercase();

    let Ok(part2t) = normalize_to_part2t(&normalized_code) else {
        return vec![normalized_code];
    };

    let mut synonyms = vec![part2t.clone()];
    if let Some(part1) = Language::from_639_3(&part2t).and_then(|lang| lang.to_639_1()) {
        synonyms.push(part1.to_string());
    }
    if let Some(part2b) = terminology_to_bibliographic(&part2t) {
        synonyms.push(part2b.to_string());
    }
    synonyms
}

/// Check if two language codes match (represent the same language)
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    match (normalize_to_part2t(code1), normalize_to_part2t(code2)) {
        (Ok(normalized1), Ok(normalized2)) => normalized1 == normalized2,
        _ => false,
    }
}

/// Language-family comparison for optional stream tags.
///
/// Known codes match through their synonyms, unknown codes only match
/// themselves case-insensitively, and untagged streams only match untagged ones.
pub fn same_language_family(tag1: Option<&str>, tag2: Option<&str>) -> bool {
    match (tag1, tag2) {
        (None, None) => true,
        (Some(code1), Some(code2)) => {
            let synonyms = language_synonyms(code1);
            let code2 = code2.trim().to_lowercase();
            synonyms.iter().any(|synonym| *synonym == code2)
        }
        _ => false,
    }
}

/// Get the language name from a code
pub fn get_language_name(code: &str) -> Result<String> {
    let normalized = normalize_to_part2t(code)?;
    let lang = Language::from_639_3(&normalized)
        .ok_or_else(|| anyhow!("Failed to get language from code: {}", normalized))?;

    Ok(lang.to_name().to_string())
}
