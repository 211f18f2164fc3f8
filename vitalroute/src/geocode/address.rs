//! Brazilian address text handling.
//!
//! Dispatch operators type addresses the way they are read over the phone:
//! `"Hospital Universitário, Rua Luís Vaz de Camões, s/n - Vila Celina,
//! 13566-448"`. Before anything is sent to a geocoder the text is cleaned:
//!
//! - postal codes (`\d{5}-?\d{3}`) are removed
//! - `s/n`, `s/nº`, `s/no` ("no number") markers are removed and remembered
//! - ` - ` separators become `, `
//! - whitespace and empty comma groups are collapsed
//! - the region suffix is appended when the city is missing
//!
//! Keyword extraction and comparisons are accent-insensitive.

use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use super::region::Region;

/// Words ignored when extracting address keywords.
const STOP_WORDS: &[&str] = &[
    "de", "da", "do", "das", "dos", "e", "em", "na", "no", "a", "o", "para", "por", "com",
];

/// What the resolver learned from the raw text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AddressDetails {
    /// An explicit "no number" marker was present.
    pub no_number: bool,
    pub postal_code: Option<String>,
    /// Facility name to search for on its own.
    pub institution: Option<String>,
}

fn no_number_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)s/n[ºo°]?").expect("static regex"))
}

fn postal_code_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\d{5}-?\d{3}").expect("static regex"))
}

fn dash_separator_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s*-\s*").expect("static regex"))
}

fn whitespace_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

fn empty_group_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r",\s*,").expect("static regex"))
}

/// Leading facility keyword of the first comma part.
fn facility_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)^(escola|hospital|cl[íi]nica|posto|centro|igreja|capela|shopping|",
            r"mercado|supermercado|universidade|faculdade|instituto|farm[aá]cia|",
            r"laborat[óo]rio|hotel|pousada|restaurante|lanchonete|padaria|academia|",
            r"gin[aá]sio|quadra|parque|pra[cç]a|terminal|esta[cç][aã]o|biblioteca|",
            r"museu|teatro|cinema|banco|ag[eê]ncia|cart[óo]rio|f[óo]rum|delegacia|",
            r"bombeiro|pronto.?socorro|upa|ubs|emei|emef|creche|col[eé]gio)"
        ))
        .expect("static regex")
    })
}

/// Leading street-type keyword; abbreviations must end in `.` or a space.
fn street_type_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?i)^(rua|avenida|travessa|alameda|estrada|rodovia|r|av|trav|al|estr|rod)(\.|\s|$)",
        )
        .expect("static regex")
    })
}

/// Removes Portuguese diacritics.
pub fn fold_accents(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
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
        })
        .collect()
}

/// Lowercased, accent-folded form used for comparisons.
pub fn comparable(text: &str) -> String {
    fold_accents(&text.to_lowercase())
}

/// Significant words of an address.
///
/// Lowercase, accent-folded, split on commas, whitespace and hyphens; words
/// of two characters or fewer, stop words and pure numbers are dropped.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let stop: HashSet<&str> = STOP_WORDS.iter().copied().collect();
    comparable(text)
        .split(|c: char| c == ',' || c == '-' || c.is_whitespace())
        .filter(|word| word.chars().count() > 2)
        .filter(|word| !stop.contains(word))
        .filter(|word| !word.chars().all(|c| c.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

/// Extracts the no-number flag, postal code and institution name.
pub fn parse_details(text: &str) -> AddressDetails {
    let no_number = no_number_pattern().is_match(text);
    let postal_code = postal_code_pattern()
        .find(text)
        .map(|m| m.as_str().to_string());

    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    let mut institution = parts
        .first()
        .filter(|first| !first.is_empty() && facility_pattern().is_match(first))
        .map(|first| first.to_string());

    if institution.is_none() && parts.len() > 1 && street_type_pattern().is_match(parts[1]) {
        institution = Some(parts[0].to_string()).filter(|s| !s.is_empty());
    }

    AddressDetails {
        no_number,
        postal_code,
        institution,
    }
}

/// Cleans raw address text into a geocoder query.
pub fn normalize_address(text: &str, region: &Region) -> String {
    let without_postal = postal_code_pattern().replace_all(text, "");
    let without_marker = no_number_pattern().replace_all(&without_postal, "");
    let separated = dash_separator_pattern().replace_all(&without_marker, ", ");
    let collapsed = whitespace_pattern().replace_all(&separated, " ");

    let mut grouped = collapsed.into_owned();
    loop {
        let next = empty_group_pattern().replace_all(&grouped, ",").into_owned();
        if next == grouped {
            break;
        }
        grouped = next;
    }

    let mut normalized = grouped
        .trim_matches(|c: char| c == ',' || c.is_whitespace())
        .to_string();

    if !comparable(&normalized).contains(&comparable(&region.name)) {
        if normalized.is_empty() {
            normalized = region.suffix();
        } else {
            normalized.push_str(", ");
            normalized.push_str(&region.suffix());
        }
    }
    normalized
}

/// Fallback query for unnumbered street addresses: a nearby school is often
/// the only landmark the map knows on that street.
pub fn school_query(normalized: &str, region: &Region) -> Option<String> {
    let street = normalized.split(',').next()?.trim();
    let keywords: Vec<String> = extract_keywords(street).into_iter().take(3).collect();
    if keywords.is_empty() {
        return None;
    }
    Some(format!("escola {} {}", keywords.join(" "), region.name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fold_accents() {
        assert_eq!(fold_accents("São Carlos"), "Sao Carlos");
        assert_eq!(fold_accents("Clínica Açaí"), "Clinica Acai");
    }

    #[test]
    fn test_extract_keywords_filters() {
        let keywords = extract_keywords("Rua Episcopal, 1234 - Centro de São Carlos");
        assert_eq!(keywords, vec!["rua", "episcopal", "centro", "sao", "carlos"]);
    }

    #[test]
    fn test_extract_keywords_drops_stop_words_and_short() {
        let keywords = extract_keywords("Av. da Paz com a Rua XV");
        assert_eq!(keywords, vec!["av.", "paz", "rua"]);
    }

    #[test]
    fn test_parse_details_facility_prefix() {
        let details = parse_details("Hospital Municipal, São Carlos");
        assert_eq!(details.institution.as_deref(), Some("Hospital Municipal"));
        assert!(!details.no_number);
    }

    #[test]
    fn test_parse_details_accented_facility() {
        let details = parse_details("Clínica São José, Rua 9 de Julho, 100");
        assert_eq!(details.institution.as_deref(), Some("Clínica São José"));
    }

    #[test]
    fn test_parse_details_name_before_street() {
        let details = parse_details("Santa Casa, R. Paulino Botelho, s/n");
        assert_eq!(details.institution.as_deref(), Some("Santa Casa"));
        assert!(details.no_number);
    }

    #[test]
    fn test_parse_details_plain_street() {
        let details = parse_details("Rua Episcopal, 1234, Centro");
        assert_eq!(details.institution, None);
    }

    #[test]
    fn test_parse_details_street_abbreviation_needs_delimiter() {
        // "Residencial" must not be read as the "R" abbreviation.
        let details = parse_details("Bloco 3, Residencial Jardim, 45");
        assert_eq!(details.institution, None);
    }

    #[test]
    fn test_parse_details_postal_code() {
        let details = parse_details("Rua X, 10, 13560-000");
        assert_eq!(details.postal_code.as_deref(), Some("13560-000"));
    }

    #[test]
    fn test_normalize_strips_noise() {
        let region = Region::default();
        let normalized = normalize_address(
            "Rua  Episcopal, s/nº - Centro,  13560-000",
            &region,
        );
        assert_eq!(normalized, "Rua Episcopal, Centro, são carlos, sp");
    }

    #[test]
    fn test_normalize_keeps_existing_city() {
        let region = Region::default();
        let normalized = normalize_address("Hospital Municipal, Sao Carlos", &region);
        assert_eq!(normalized, "Hospital Municipal, Sao Carlos");
    }

    #[test]
    fn test_normalize_collapses_empty_groups() {
        let region = Region::default();
        let normalized = normalize_address("Rua A, , , 12", &region);
        assert_eq!(normalized, "Rua A, 12, são carlos, sp");
    }

    #[test]
    fn test_school_query() {
        let region = Region::default();
        let query = school_query("Rua Doutor Carlos Botelho Neto, são carlos, sp", &region);
        assert_eq!(query.as_deref(), Some("escola rua doutor carlos são carlos"));
    }
}
