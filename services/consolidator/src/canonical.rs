//! Raw column label -> stable indicator name.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// One `(phrase, canonical)` substring rule. Rules are evaluated in order and
/// the first phrase contained in the normalized label wins, so a longer phrase
/// must be listed before any phrase it contains.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRule {
    pub phrase: String,
    pub canonical: String,
}

impl CanonicalRule {
    pub fn new(phrase: &str, canonical: &str) -> Self {
        Self {
            phrase: phrase.to_string(),
            canonical: canonical.to_string(),
        }
    }
}

/// Security-incident categories published by the Madrid municipal police.
pub fn default_rules() -> Vec<CanonicalRule> {
    vec![
        CanonicalRule::new("relacionadas con las personas", "relacionadas_con_personas"),
        CanonicalRule::new("relacionadas con el patrimonio", "relacionadas_con_patrimonio"),
        CanonicalRule::new("por tenencia de armas", "por_tenencia_armas"),
        CanonicalRule::new("por tenencia de drogas", "por_tenencia_drogas"),
        CanonicalRule::new("por consumo de drogas", "por_consumo_drogas"),
    ]
}

#[derive(Debug, Clone)]
pub struct Canonicalizer {
    rules: Vec<CanonicalRule>,
}

impl Canonicalizer {
    /// Validates and normalizes the rule list.
    ///
    /// Targets must be slugs, and phrases must contain at least one character
    /// that never occurs in a slug. Together these keep `canonicalize`
    /// idempotent: a canonical name can never match a rule again.
    pub fn new(rules: Vec<CanonicalRule>) -> Result<Self, ConfigError> {
        let mut normalized = Vec::with_capacity(rules.len());
        for rule in rules {
            if !is_slug(&rule.canonical) {
                return Err(ConfigError::RuleTargetNotSlug(rule.canonical));
            }
            let phrase = rule.phrase.trim().to_lowercase();
            if phrase.chars().all(is_slug_char) {
                return Err(ConfigError::RulePhraseAmbiguous(rule.phrase));
            }
            normalized.push(CanonicalRule {
                phrase,
                canonical: rule.canonical,
            });
        }
        Ok(Self { rules: normalized })
    }

    pub fn rules(&self) -> &[CanonicalRule] {
        &self.rules
    }

    pub fn canonicalize(&self, raw: &str) -> String {
        let normalized = raw.trim().to_lowercase();

        if let Some(rule) = self
            .rules
            .iter()
            .find(|rule| normalized.contains(rule.phrase.as_str()))
        {
            return rule.canonical.clone();
        }

        let slug = slugify(&normalized);
        if !slug.is_empty() || raw.is_empty() {
            return slug;
        }

        // Nothing survived slugification (punctuation, symbols, whitespace):
        // spell out the code points so the name stays non-empty and distinct.
        let basis = if normalized.is_empty() {
            raw.to_lowercase()
        } else {
            normalized
        };
        let codes: Vec<String> = basis.chars().map(|c| format!("{:x}", c as u32)).collect();
        format!("col_{}", codes.join("_"))
    }
}

impl Default for Canonicalizer {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

fn is_slug_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'
}

/// Replaces every maximal run outside `[a-z0-9]` with one `_` and strips
/// leading/trailing underscores. Expects already lowercased input.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_sep = false;
    for c in s.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    out
}

/// True when `s` is a fixed point of [`slugify`] and non-empty.
pub fn is_slug(s: &str) -> bool {
    !s.is_empty() && slugify(s) == s
}
