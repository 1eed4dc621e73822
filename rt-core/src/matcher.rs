use crate::error::ConfigError;
use regex::{Regex, RegexBuilder};

/// Ordered, case-insensitive patterns for one room. The first match wins.
#[derive(Debug, Clone)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    /// Compiles `sources` in order. Every pattern is anchored at the start of
    /// the message and must expose exactly one capture group.
    pub fn compile<S: AsRef<str>>(sources: &[S]) -> Result<Self, ConfigError> {
        let mut patterns = Vec::with_capacity(sources.len());
        for source in sources {
            let source = source.as_ref();
            let regex = RegexBuilder::new(&format!("^(?:{source})"))
                .case_insensitive(true)
                .build()
                .map_err(|e| ConfigError::InvalidPattern {
                    pattern: source.to_string(),
                    message: e.to_string(),
                })?;
            // captures_len counts the implicit whole-match group.
            let found = regex.captures_len() - 1;
            if found != 1 {
                return Err(ConfigError::CaptureGroups {
                    pattern: source.to_string(),
                    found,
                });
            }
            patterns.push(regex);
        }
        Ok(Self { patterns })
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Returns the capture of the first matching pattern.
    pub fn find<'t>(&self, text: &'t str) -> Option<&'t str> {
        self.patterns.iter().find_map(|regex| {
            regex
                .captures(text)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str())
        })
    }
}
