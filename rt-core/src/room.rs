//! Managed rooms and their registry.
//!
//! Every room is fully built at startup, gate included. The gate owns the
//! mutable per-room state; a `watch` channel publishes a read-only view of it
//! so that callers can inspect fragments without contending for the gate.

use crate::error::ConfigError;
use crate::format::{Fixup, compose_title, normalize_fragment, title_len};
use crate::matcher::PatternSet;
use crate::revert::RevertHandle;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard, watch};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(String);

impl RoomId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RoomId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for RoomId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl AsRef<str> for RoomId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static definition of a room, fixed at configuration time.
#[derive(Debug, Clone)]
pub struct RoomSpec {
    id: RoomId,
    original_title: String,
    separator: String,
    patterns: PatternSet,
    fixup: Fixup,
}

/// Fragment list and title a matched message would produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub fragments: Vec<String>,
    pub title: String,
}

impl Candidate {
    /// Title length in characters.
    pub fn char_len(&self) -> usize {
        title_len(&self.title)
    }
}

impl RoomSpec {
    pub fn new(
        id: impl Into<RoomId>,
        original_title: impl Into<String>,
        separator: impl Into<String>,
        patterns: PatternSet,
        fixup: Fixup,
    ) -> Result<Self, ConfigError> {
        let id = id.into();
        let original_title = original_title.into();
        if id.as_str().trim().is_empty() {
            return Err(ConfigError::InvalidRoom {
                room: id.to_string(),
                message: "id must not be empty".to_string(),
            });
        }
        if original_title.trim().is_empty() {
            return Err(ConfigError::InvalidRoom {
                room: id.to_string(),
                message: "original_title must not be empty".to_string(),
            });
        }
        if patterns.is_empty() {
            return Err(ConfigError::NoPatterns(id.to_string()));
        }
        Ok(Self {
            id,
            original_title,
            separator: separator.into(),
            patterns,
            fixup,
        })
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn original_title(&self) -> &str {
        &self.original_title
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    pub fn fixup(&self) -> &Fixup {
        &self.fixup
    }

    pub fn compose(&self, fragments: &[String]) -> String {
        compose_title(&self.separator, &self.fixup, fragments)
    }

    /// Matches `raw_text` and builds the title that appending its fragment to
    /// `accumulated` would produce. `None` when no pattern matches or the
    /// capture is blank.
    pub fn candidate(&self, accumulated: &[String], raw_text: &str) -> Option<Candidate> {
        let fragment = normalize_fragment(self.patterns.find(raw_text)?);
        if fragment.is_empty() {
            return None;
        }
        let mut fragments = accumulated.to_vec();
        fragments.push(fragment);
        let title = self.compose(&fragments);
        Some(Candidate { fragments, title })
    }
}

/// Read-only snapshot of a room's coordination state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoomView {
    pub fragments: Vec<String>,
    pub revert_pending: bool,
}

/// Mutable room state. Only reachable through the room gate.
pub(crate) struct RoomState {
    view: watch::Sender<RoomView>,
    pending_revert: Option<RevertHandle>,
}

impl RoomState {
    pub(crate) fn fragments(&self) -> Vec<String> {
        self.view.borrow().fragments.clone()
    }

    pub(crate) fn pending_generation(&self) -> Option<u64> {
        self.pending_revert.as_ref().map(RevertHandle::generation)
    }

    pub(crate) fn take_pending(&mut self) -> Option<RevertHandle> {
        let handle = self.pending_revert.take();
        if handle.is_some() {
            self.view.send_modify(|view| view.revert_pending = false);
        }
        handle
    }

    /// Records a successful rename. Any previous revert must already have been
    /// taken and cancelled.
    pub(crate) fn commit(&mut self, fragments: Vec<String>, revert: RevertHandle) {
        debug_assert!(self.pending_revert.is_none());
        self.pending_revert = Some(revert);
        self.view.send_replace(RoomView {
            fragments,
            revert_pending: true,
        });
    }

    /// Back to the original title: no fragments, no pending revert.
    pub(crate) fn reset(&mut self) {
        self.pending_revert = None;
        self.view.send_replace(RoomView::default());
    }
}

pub struct Room {
    spec: RoomSpec,
    gate: Arc<Mutex<RoomState>>,
    view: watch::Receiver<RoomView>,
}

impl Room {
    pub fn new(spec: RoomSpec) -> Self {
        let (tx, rx) = watch::channel(RoomView::default());
        Self {
            spec,
            gate: Arc::new(Mutex::new(RoomState {
                view: tx,
                pending_revert: None,
            })),
            view: rx,
        }
    }

    pub fn id(&self) -> &RoomId {
        self.spec.id()
    }

    pub fn spec(&self) -> &RoomSpec {
        &self.spec
    }

    pub fn view(&self) -> RoomView {
        self.view.borrow().clone()
    }

    /// Single atomic try-acquire. Never waits.
    pub(crate) fn try_acquire(&self) -> Option<OwnedMutexGuard<RoomState>> {
        self.gate.clone().try_lock_owned().ok()
    }

    /// Waits for the gate. Used by reverts and shutdown, never by renames.
    pub(crate) async fn acquire(&self) -> MutexGuard<'_, RoomState> {
        self.gate.lock().await
    }
}

impl fmt::Debug for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Room")
            .field("spec", &self.spec)
            .field("view", &*self.view.borrow())
            .finish()
    }
}

/// Immutable set of managed rooms, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct RoomRegistry {
    rooms: HashMap<RoomId, Arc<Room>>,
}

impl RoomRegistry {
    pub fn new(specs: impl IntoIterator<Item = RoomSpec>) -> Result<Self, ConfigError> {
        let mut rooms = HashMap::new();
        for spec in specs {
            let id = spec.id().clone();
            if rooms.insert(id.clone(), Arc::new(Room::new(spec))).is_some() {
                return Err(ConfigError::DuplicateRoom(id.to_string()));
            }
        }
        Ok(Self { rooms })
    }

    pub fn get(&self, id: &RoomId) -> Option<&Arc<Room>> {
        self.rooms.get(id)
    }

    pub fn contains(&self, id: &RoomId) -> bool {
        self.rooms.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Room>> {
        self.rooms.values()
    }

    /// Room ids in sorted order, for stable listings.
    pub fn ids(&self) -> Vec<RoomId> {
        let mut ids: Vec<RoomId> = self.rooms.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::FixupRule;

    fn spec(id: &str) -> RoomSpec {
        RoomSpec::new(
            id,
            "Programming & Tech for girls",
            " & ",
            PatternSet::compile(&[r"programming (?:&|and) (.+)"]).expect("compile"),
            Fixup::new(vec![FixupRule::AppendUnless {
                keyword: "girl".to_string(),
                suffix: " for girls".to_string(),
            }])
            .expect("fixup"),
        )
        .expect("spec")
    }

    #[test]
    fn candidate_appends_normalized_fragment() {
        let spec = spec("room-1");
        let candidate = spec
            .candidate(&["Cats".to_string()], "programming and big dogs")
            .expect("match");
        assert_eq!(candidate.fragments, vec!["Cats", "Big Dogs"]);
        assert_eq!(candidate.title, "Cats & Big Dogs for girls");
        assert_eq!(candidate.char_len(), "Cats & Big Dogs for girls".len());
    }

    #[test]
    fn candidate_is_none_without_match() {
        assert!(spec("room-1").candidate(&[], "hello there").is_none());
    }

    #[test]
    fn blank_capture_is_not_a_candidate() {
        let spec = spec("room-1");
        assert!(spec.candidate(&[], "programming and  \nsee above").is_none());
        assert!(spec
            .candidate(&["Cats".to_string()], "programming and \t")
            .is_none());
    }

    #[test]
    fn spec_rejects_empty_fields() {
        let patterns = PatternSet::compile(&[r"x (.+)"]).expect("compile");
        assert!(RoomSpec::new("", "Title", " ", patterns.clone(), Fixup::identity()).is_err());
        assert!(RoomSpec::new("r", " ", " ", patterns, Fixup::identity()).is_err());
        let none = PatternSet::compile::<&str>(&[]).expect("empty set compiles");
        assert!(matches!(
            RoomSpec::new("r", "Title", " ", none, Fixup::identity()),
            Err(ConfigError::NoPatterns(_))
        ));
    }

    #[test]
    fn registry_rejects_duplicate_ids() {
        let err = RoomRegistry::new([spec("a"), spec("a")]).expect_err("duplicate");
        assert!(matches!(err, ConfigError::DuplicateRoom(id) if id == "a"));
    }

    #[test]
    fn registry_lists_ids_sorted() {
        let registry = RoomRegistry::new([spec("b"), spec("a")]).expect("registry");
        assert_eq!(registry.ids(), vec![RoomId::from("a"), RoomId::from("b")]);
        assert!(registry.contains(&RoomId::from("a")));
        assert!(registry.get(&RoomId::from("c")).is_none());
    }

    #[tokio::test]
    async fn new_room_starts_idle() {
        let room = Room::new(spec("a"));
        assert_eq!(room.view(), RoomView::default());
        let guard = room.try_acquire().expect("free gate");
        assert!(room.try_acquire().is_none(), "second try-acquire must fail");
        drop(guard);
        assert!(room.try_acquire().is_some());
    }
}
