//! # Event Name Normalisation
//!
//! Maps raw type names (`OrderCreatedIntegrationEvent`) and wire labels to
//! the canonical routing key (`OrderCreated`). The registry and the dispatch
//! path share one normaliser so both sides agree on keys.

use std::str::FromStr;

use super::errors::EventBusError;

/// How configured prefix/suffix text is stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrimStyle {
    /// Remove every leading/trailing character that appears in the prefix/suffix text.
    #[default]
    CharSet,
    /// Remove the exact prefix/suffix text, repeated occurrences included.
    Literal,
}

impl FromStr for TrimStyle {
    type Err = EventBusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "charset" | "char_set" => Ok(Self::CharSet),
            "literal" => Ok(Self::Literal),
            _ => Err(EventBusError::ConfigInvalid {
                var: "EVENTBUS_TRIM_STYLE".to_string(),
                reason: format!("Unknown trim style: {s}"),
            }),
        }
    }
}

/// Prefix/suffix stripping rules.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamingRules {
    /// Strip the prefix.
    pub delete_prefix: bool,
    /// Prefix text (or character set).
    pub prefix: String,
    /// Strip the suffix.
    pub delete_suffix: bool,
    /// Suffix text (or character set).
    pub suffix: String,
    /// Stripping style.
    pub style: TrimStyle,
}

/// Pure, deterministic event name normaliser.
#[derive(Debug, Clone, Default)]
pub struct EventNameNormalizer {
    rules: NamingRules,
}

impl EventNameNormalizer {
    /// Create a normaliser from stripping rules.
    pub fn new(rules: NamingRules) -> Self {
        Self { rules }
    }

    /// Rules in effect.
    pub fn rules(&self) -> &NamingRules {
        &self.rules
    }

    /// Canonical name for `raw`. Missing prefix/suffix is a no-op.
    pub fn normalize<'a>(&self, raw: &'a str) -> &'a str {
        let mut name = raw;

        if self.rules.delete_prefix && !self.rules.prefix.is_empty() {
            name = match self.rules.style {
                TrimStyle::CharSet => {
                    name.trim_start_matches(|c: char| self.rules.prefix.contains(c))
                }
                TrimStyle::Literal => name.trim_start_matches(self.rules.prefix.as_str()),
            };
        }

        if self.rules.delete_suffix && !self.rules.suffix.is_empty() {
            name = match self.rules.style {
                TrimStyle::CharSet => name.trim_end_matches(|c: char| self.rules.suffix.contains(c)),
                TrimStyle::Literal => name.trim_end_matches(self.rules.suffix.as_str()),
            };
        }

        name
    }

    /// Rebuild the raw type name from a canonical one.
    ///
    /// Only the parts whose strip flag is enabled are added back.
    pub fn frame(&self, canonical: &str) -> String {
        let prefix = if self.rules.delete_prefix {
            self.rules.prefix.as_str()
        } else {
            ""
        };
        let suffix = if self.rules.delete_suffix {
            self.rules.suffix.as_str()
        } else {
            ""
        };
        format!("{prefix}{canonical}{suffix}")
    }
}
