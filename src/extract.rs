//! Place-name candidate extraction.
//!
//! Candidates come from two producers, merged and ranked by frequency:
//!
//! 1. Lexical patterns: an administrative keyword (`desa`, `kecamatan`,
//!    `kabupaten`, ...) followed by a capitalized word.
//! 2. A named-entity recognizer, behind the [`EntityRecognizer`] trait.
//!    [`GazetteerRecognizer`] is the built-in implementation.
//!
//! Extraction is a pure function of its input text.

use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;
use tracing::debug;

use crate::models::LocationCandidate;
use crate::utils::{normalize_whitespace, title_case};

/// Administrative-unit and landform keywords followed by a capitalized name.
const LOCATION_PATTERNS: &[&str] = &[
    r"\b(?i:desa)\s+\p{Lu}\p{Ll}+",
    r"\b(?i:kelurahan)\s+\p{Lu}\p{Ll}+",
    r"\b(?i:kecamatan)\s+\p{Lu}\p{Ll}+",
    r"\b(?i:kabupaten)\s+\p{Lu}\p{Ll}+",
    r"\b(?i:kota)\s+\p{Lu}\p{Ll}+",
    r"\b(?i:jalan)\s+\p{Lu}[^\s,]+",
    r"\b(?i:gunung)\s+\p{Lu}\p{Ll}+",
    r"\b(?i:bukit)\s+\p{Lu}\p{Ll}+",
    r"\b(?i:tukad)\s+\p{Lu}\p{Ll}+",
];

static COMPILED_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    LOCATION_PATTERNS
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
});

/// Entity categories a recognizer may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityLabel {
    /// Geopolitical entity (country, province, regency, town).
    Gpe,
    /// Non-political location (mountain, river, beach).
    Loc,
    Person,
    Org,
    Misc,
}

impl EntityLabel {
    pub fn is_place(self) -> bool {
        matches!(self, EntityLabel::Gpe | EntityLabel::Loc)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub text: String,
    pub label: EntityLabel,
}

/// Opaque text → entities capability.
pub trait EntityRecognizer: Send + Sync {
    fn recognize(&self, text: &str) -> Vec<Entity>;
}

/// Regencies, towns and landmarks of Bali.
pub const DEFAULT_GAZETTEER: &[(&str, EntityLabel)] = &[
    ("Badung", EntityLabel::Gpe),
    ("Bangli", EntityLabel::Gpe),
    ("Buleleng", EntityLabel::Gpe),
    ("Denpasar", EntityLabel::Gpe),
    ("Gianyar", EntityLabel::Gpe),
    ("Jembrana", EntityLabel::Gpe),
    ("Karangasem", EntityLabel::Gpe),
    ("Klungkung", EntityLabel::Gpe),
    ("Tabanan", EntityLabel::Gpe),
    ("Amlapura", EntityLabel::Gpe),
    ("Singaraja", EntityLabel::Gpe),
    ("Semarapura", EntityLabel::Gpe),
    ("Negara", EntityLabel::Gpe),
    ("Ubud", EntityLabel::Gpe),
    ("Kuta", EntityLabel::Gpe),
    ("Sanur", EntityLabel::Gpe),
    ("Seminyak", EntityLabel::Gpe),
    ("Canggu", EntityLabel::Gpe),
    ("Jimbaran", EntityLabel::Gpe),
    ("Nusa Dua", EntityLabel::Gpe),
    ("Nusa Penida", EntityLabel::Loc),
    ("Kintamani", EntityLabel::Gpe),
    ("Sukawati", EntityLabel::Gpe),
    ("Tegallalang", EntityLabel::Gpe),
    ("Lovina", EntityLabel::Gpe),
    ("Amed", EntityLabel::Gpe),
    ("Bedugul", EntityLabel::Loc),
    ("Uluwatu", EntityLabel::Loc),
    ("Gunung Agung", EntityLabel::Loc),
    ("Gunung Batur", EntityLabel::Loc),
    ("Danau Batur", EntityLabel::Loc),
];

/// Dictionary-based recognizer: whole-word, case-insensitive matches of
/// known place names, longest name first.
#[derive(Debug, Clone)]
pub struct GazetteerRecognizer {
    matcher: Option<Regex>,
    labels: HashMap<String, EntityLabel>,
}

impl GazetteerRecognizer {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, EntityLabel)>,
        S: Into<String>,
    {
        let mut labels = HashMap::new();
        for (name, label) in entries {
            let name = normalize_whitespace(&name.into());
            if !name.is_empty() {
                labels.insert(name.to_lowercase(), label);
            }
        }

        let mut names: Vec<&String> = labels.keys().collect();
        names.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        let alternation = names
            .iter()
            .map(|n| regex::escape(n).replace(' ', r"\s+"))
            .collect::<Vec<_>>()
            .join("|");

        let matcher = if alternation.is_empty() {
            None
        } else {
            RegexBuilder::new(&format!(r"\b(?:{alternation})\b"))
                .case_insensitive(true)
                .build()
                .ok()
        };
        Self { matcher, labels }
    }

    /// The built-in Bali gazetteer plus `extra` place names (labelled GPE).
    pub fn with_defaults(extra: &[String]) -> Self {
        let entries = DEFAULT_GAZETTEER
            .iter()
            .map(|(n, l)| (n.to_string(), *l))
            .chain(extra.iter().map(|n| (n.clone(), EntityLabel::Gpe)));
        Self::new(entries)
    }
}

impl EntityRecognizer for GazetteerRecognizer {
    fn recognize(&self, text: &str) -> Vec<Entity> {
        let Some(matcher) = &self.matcher else {
            return Vec::new();
        };
        matcher
            .find_iter(text)
            .map(|m| {
                let found = m.as_str().to_string();
                let key = normalize_whitespace(&found).to_lowercase();
                let label = self.labels.get(&key).copied().unwrap_or(EntityLabel::Gpe);
                Entity { text: found, label }
            })
            .collect()
    }
}

/// Merges pattern and recognizer output into ranked candidates.
#[derive(Debug, Clone)]
pub struct CandidateExtractor<R> {
    recognizer: R,
}

impl<R: EntityRecognizer> CandidateExtractor<R> {
    pub fn new(recognizer: R) -> Self {
        Self { recognizer }
    }

    /// Ranked, case-insensitively deduplicated place candidates.
    ///
    /// Rank is the number of raw occurrences; ties keep the order in which
    /// the candidate first appeared (pattern matches in pattern order, then
    /// recognizer entities).
    pub fn extract(&self, text: &str) -> Vec<LocationCandidate> {
        let mut raw: Vec<String> = Vec::new();
        for pattern in COMPILED_PATTERNS.iter() {
            raw.extend(pattern.find_iter(text).map(|m| m.as_str().to_string()));
        }
        raw.extend(
            self.recognizer
                .recognize(text)
                .into_iter()
                .filter(|e| e.label.is_place())
                .map(|e| e.text),
        );

        // (display text, count) in first-appearance order
        let mut tally: Vec<(String, u32)> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for item in raw {
            let normalized = title_case(&normalize_whitespace(&item));
            if normalized.is_empty() {
                continue;
            }
            let key = normalized.to_lowercase();
            match index.get(&key) {
                Some(&i) => tally[i].1 += 1,
                None => {
                    index.insert(key, tally.len());
                    tally.push((normalized, 1));
                }
            }
        }

        // stable: equal counts keep first-appearance order
        tally.sort_by(|a, b| b.1.cmp(&a.1));
        let candidates: Vec<LocationCandidate> = tally
            .into_iter()
            .map(|(text, rank)| LocationCandidate { text, rank })
            .collect();
        debug!(count = candidates.len(), "Extracted location candidates");
        candidates
    }
}
