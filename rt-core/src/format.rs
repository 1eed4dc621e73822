//! Title formatting: fragment normalization and per-room decoration rules.

use crate::error::ConfigError;
use serde::Deserialize;

/// Normalizes a captured fragment into a title-case phrase.
///
/// Each whitespace-separated token gets its first character uppercased, except
/// a bare `and` (any case) which becomes `&`. Tokens are rejoined with a single
/// space.
pub fn normalize_fragment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for token in raw.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        if token.to_lowercase() == "and" {
            out.push('&');
            continue;
        }
        let mut chars = token.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

/// Title length as the chat service counts it: Unicode scalar values.
pub fn title_len(title: &str) -> usize {
    title.chars().count()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FixupRule {
    /// Prepends `text` unless the title already starts with it.
    Prefix { text: String },
    /// Appends `suffix` unless `keyword` already appears in the title.
    AppendUnless { keyword: String, suffix: String },
}

impl FixupRule {
    fn apply(&self, title: &mut String) {
        match self {
            FixupRule::Prefix { text } => {
                if !title.to_lowercase().starts_with(&text.to_lowercase()) {
                    title.insert_str(0, text);
                }
            }
            FixupRule::AppendUnless { keyword, suffix } => {
                if !title.to_lowercase().contains(&keyword.to_lowercase()) {
                    title.push_str(suffix);
                }
            }
        }
    }
}

/// Ordered rule table applied to a joined title. Empty means identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fixup {
    rules: Vec<FixupRule>,
}

impl Fixup {
    /// Rejects rules that would keep growing a title when re-applied to their
    /// own output.
    pub fn new(rules: Vec<FixupRule>) -> Result<Self, ConfigError> {
        for rule in &rules {
            match rule {
                FixupRule::Prefix { text } if text.trim().is_empty() => {
                    return Err(ConfigError::InvalidFixup(
                        "prefix rule text must not be empty".to_string(),
                    ));
                }
                FixupRule::AppendUnless { keyword, suffix } => {
                    if keyword.trim().is_empty() {
                        return Err(ConfigError::InvalidFixup(
                            "append_unless keyword must not be empty".to_string(),
                        ));
                    }
                    if !suffix.to_lowercase().contains(&keyword.to_lowercase()) {
                        return Err(ConfigError::InvalidFixup(format!(
                            "append_unless suffix {suffix:?} must contain its keyword {keyword:?}"
                        )));
                    }
                }
                FixupRule::Prefix { .. } => {}
            }
        }
        Ok(Self { rules })
    }

    pub fn identity() -> Self {
        Self::default()
    }

    pub fn rules(&self) -> &[FixupRule] {
        &self.rules
    }

    pub fn apply(&self, title: &str) -> String {
        let mut out = title.to_string();
        for rule in &self.rules {
            rule.apply(&mut out);
        }
        out
    }
}

/// Joins `fragments` with `separator` and decorates the result.
pub fn compose_title<S: AsRef<str>>(separator: &str, fixup: &Fixup, fragments: &[S]) -> String {
    let joined = fragments
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(separator);
    fixup.apply(&joined)
}
