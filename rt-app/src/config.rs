//! Retitle configuration loader.

use rt_core::{
    Fixup, FixupRule, PatternSet, RoomRegistry, RoomSpec, Tunables, title_len,
    DEFAULT_MAX_TITLE_LEN, DEFAULT_MULTI_EDIT_HOLD, DEFAULT_REVERT_AFTER,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct RetitleConfig {
    #[serde(default)]
    pub telegram: TelegramConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub rooms: Vec<RoomConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TimingConfig {
    /// How long the rename gate stays held after a successful rename.
    #[serde(default = "default_multi_edit_hold_secs")]
    pub multi_edit_hold_secs: u64,
    /// Idle time before a renamed room reverts to its original title.
    #[serde(default = "default_revert_after_secs")]
    pub revert_after_secs: u64,
    #[serde(default = "default_max_title_len")]
    pub max_title_len: usize,
}

fn default_multi_edit_hold_secs() -> u64 {
    DEFAULT_MULTI_EDIT_HOLD.as_secs()
}

fn default_revert_after_secs() -> u64 {
    DEFAULT_REVERT_AFTER.as_secs()
}

fn default_max_title_len() -> usize {
    DEFAULT_MAX_TITLE_LEN
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            multi_edit_hold_secs: default_multi_edit_hold_secs(),
            revert_after_secs: default_revert_after_secs(),
            max_title_len: default_max_title_len(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomConfig {
    /// Chat id as the platform reports it, e.g. `-1001384391544`.
    pub id: String,
    pub original_title: String,
    #[serde(default = "default_separator")]
    pub separator: String,
    pub patterns: Vec<String>,
    #[serde(default)]
    pub fixup: Vec<FixupRule>,
}

fn default_separator() -> String {
    " & ".to_string()
}

impl RoomConfig {
    pub fn to_spec(&self) -> anyhow::Result<RoomSpec> {
        let patterns = PatternSet::compile(&self.patterns)
            .map_err(|e| anyhow::anyhow!("rooms.{}: {e}", self.id))?;
        let fixup = Fixup::new(self.fixup.clone())
            .map_err(|e| anyhow::anyhow!("rooms.{}: {e}", self.id))?;
        Ok(RoomSpec::new(
            self.id.clone(),
            self.original_title.clone(),
            self.separator.clone(),
            patterns,
            fixup,
        )?)
    }
}

impl RetitleConfig {
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        Ok(Self::load_with_path(path).await?.0)
    }

    pub async fn load_with_path(path: Option<PathBuf>) -> anyhow::Result<(Self, PathBuf)> {
        let path = path.unwrap_or_else(default_config_path);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;

        let mut cfg = Self::parse(&contents)
            .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?;

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok((cfg, path))
    }

    fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("TELEGRAM_BOT_TOKEN") {
            if !v.trim().is_empty() {
                self.telegram.bot_token = v;
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.rooms.is_empty() {
            return Err(anyhow::anyhow!("at least one [[rooms]] entry is required"));
        }
        if self.timing.multi_edit_hold_secs == 0 {
            return Err(anyhow::anyhow!("timing.multi_edit_hold_secs must be > 0"));
        }
        if self.timing.revert_after_secs == 0 {
            return Err(anyhow::anyhow!("timing.revert_after_secs must be > 0"));
        }
        if self.timing.max_title_len == 0 {
            return Err(anyhow::anyhow!("timing.max_title_len must be > 0"));
        }

        let mut seen = HashSet::new();
        for room in &self.rooms {
            if !seen.insert(room.id.as_str()) {
                return Err(anyhow::anyhow!("rooms.{} is defined more than once", room.id));
            }
            if title_len(&room.original_title) > self.timing.max_title_len {
                return Err(anyhow::anyhow!(
                    "rooms.{}.original_title is longer than timing.max_title_len ({})",
                    room.id,
                    self.timing.max_title_len
                ));
            }
            room.to_spec()?;
        }
        Ok(())
    }

    pub fn tunables(&self) -> Tunables {
        Tunables {
            multi_edit_hold: Duration::from_secs(self.timing.multi_edit_hold_secs),
            revert_after: Duration::from_secs(self.timing.revert_after_secs),
            max_title_len: self.timing.max_title_len,
        }
    }

    pub fn build_registry(&self) -> anyhow::Result<RoomRegistry> {
        let specs = self
            .rooms
            .iter()
            .map(RoomConfig::to_spec)
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(RoomRegistry::new(specs)?)
    }

    pub fn bot_token(&self) -> Option<&str> {
        Some(self.telegram.bot_token.as_str()).filter(|t| !t.trim().is_empty())
    }
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".retitle").join("config.toml")
}
