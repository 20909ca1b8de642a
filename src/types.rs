//! Core types for the story store.

use crate::error::{Result, StoreError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Editorial state of a story.
///
/// States are ordered; the workflow only ever moves a story one step
/// forward, and `Approved` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryState {
    Written,
    FirstEdited,
    Approved,
}

impl StoryState {
    /// All states in workflow order.
    pub const ALL: [StoryState; 3] = [
        StoryState::Written,
        StoryState::FirstEdited,
        StoryState::Approved,
    ];

    /// Wire name of the state.
    pub fn as_str(self) -> &'static str {
        match self {
            StoryState::Written => "written",
            StoryState::FirstEdited => "firstedited",
            StoryState::Approved => "approved",
        }
    }

    /// The state that directly follows this one, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            StoryState::Written => Some(StoryState::FirstEdited),
            StoryState::FirstEdited => Some(StoryState::Approved),
            StoryState::Approved => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.next().is_none()
    }

    /// Whether `self -> to` is an edge of the workflow.
    pub fn can_transition_to(self, to: StoryState) -> bool {
        self.next() == Some(to)
    }
}

impl Default for StoryState {
    fn default() -> Self {
        StoryState::Written
    }
}

impl fmt::Display for StoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoryState {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        StoryState::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| StoreError::UnknownState(s.to_string()))
    }
}

/// A single story. Its name doubles as its ledger key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Story {
    pub name: String,
    pub state: StoryState,
}

impl Story {
    /// A freshly written story.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: StoryState::Written,
        }
    }

    /// Encode as a field-tagged JSON object.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Deserialization(e.to_string()))
    }
}

/// Ordered list of every known story name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoryIndex(Vec<String>);

impl StoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exact, case-sensitive membership check.
    ///
    /// This is a linear scan over the list.
    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|existing| existing == name)
    }

    /// Append a name. Returns `false` without modifying the index if the
    /// name is already present.
    pub fn push(&mut self, name: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.0.push(name);
        true
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Encode as a JSON array of strings.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.0)?)
    }

    /// Decode a JSON array of strings.
    ///
    /// A JSON `null` is also accepted and decodes as empty. It is never
    /// produced by [`StoryIndex::encode`], so only arrays survive a
    /// decode/encode round trip byte for byte.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let names: Option<Vec<String>> = serde_json::from_slice(bytes)
            .map_err(|e| StoreError::Deserialization(e.to_string()))?;
        Ok(StoryIndex(names.unwrap_or_default()))
    }
}

impl From<Vec<String>> for StoryIndex {
    fn from(names: Vec<String>) -> Self {
        let mut index = StoryIndex::new();
        for name in names {
            index.push(name);
        }
        index
    }
}

/// Outcome of loading the index from the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IndexLoad {
    /// Nothing stored under the index key: the store was never initialized.
    Empty,
    /// The index was present and decoded.
    Loaded(StoryIndex),
}

impl IndexLoad {
    pub fn is_initialized(&self) -> bool {
        matches!(self, IndexLoad::Loaded(_))
    }

    /// Treat a missing index as an empty one.
    pub fn into_index(self) -> StoryIndex {
        match self {
            IndexLoad::Empty => StoryIndex::new(),
            IndexLoad::Loaded(index) => index,
        }
    }
}

/// Indexed names whose story entity is missing or unreadable.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IndexAudit {
    /// Number of names in the index.
    pub indexed: usize,
    /// Names with no story stored under them.
    pub missing: Vec<String>,
    /// Names whose stored bytes do not decode to a story with that name.
    pub mismatched: Vec<String>,
}

impl IndexAudit {
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty()
    }
}

/// Result of repairing an orphaned story.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Reindexed {
    /// The name was appended to the index.
    Added,
    /// The name was already indexed; nothing was written.
    AlreadyIndexed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_state_wire_names() {
        let story = Story::new("intro");
        assert_eq!(story.encode().unwrap(), br#"{"name":"intro","state":"written"}"#);

        let edited = Story {
            name: "intro".to_string(),
            state: StoryState::FirstEdited,
        };
        assert_eq!(
            edited.encode().unwrap(),
            br#"{"name":"intro","state":"firstedited"}"#
        );
    }

    #[test]
    fn test_state_order() {
        assert_eq!(StoryState::Written.next(), Some(StoryState::FirstEdited));
        assert_eq!(StoryState::FirstEdited.next(), Some(StoryState::Approved));
        assert!(StoryState::Approved.is_terminal());

        assert!(StoryState::Written.can_transition_to(StoryState::FirstEdited));
        assert!(!StoryState::Written.can_transition_to(StoryState::Approved));
        assert!(!StoryState::Approved.can_transition_to(StoryState::Written));
    }

    #[test]
    fn test_parse_state() {
        assert_eq!("approved".parse::<StoryState>().unwrap(), StoryState::Approved);
        assert!(matches!(
            "Approved".parse::<StoryState>(),
            Err(StoreError::UnknownState(_))
        ));
    }

    #[test]
    fn test_index_rejects_duplicates() {
        let mut index = StoryIndex::new();
        assert!(index.push("a"));
        assert!(index.push("b"));
        assert!(!index.push("a"));
        assert_eq!(index.names(), ["a", "b"]);

        // Case-sensitive
        assert!(index.push("A"));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn test_index_null_decodes_empty() {
        let index = StoryIndex::decode(b"null").unwrap();
        assert!(index.is_empty());
        // null is accepted on input but the canonical form is an array
        assert_eq!(index.encode().unwrap(), b"[]");
    }

    #[test]
    fn test_index_decode_rejects_garbage() {
        assert!(matches!(
            StoryIndex::decode(b"{not json"),
            Err(StoreError::Deserialization(_))
        ));
    }

    fn arb_state() -> impl Strategy<Value = StoryState> {
        prop_oneof![
            Just(StoryState::Written),
            Just(StoryState::FirstEdited),
            Just(StoryState::Approved),
        ]
    }

    proptest! {
        #[test]
        fn story_bytes_are_canonical(name in ".*", state in arb_state()) {
            let bytes = Story { name, state }.encode().unwrap();
            let reencoded = Story::decode(&bytes).unwrap().encode().unwrap();
            prop_assert_eq!(reencoded, bytes);
        }

        #[test]
        fn index_bytes_are_canonical(names in proptest::collection::vec(".*", 0..16)) {
            let bytes = StoryIndex::from(names).encode().unwrap();
            let reencoded = StoryIndex::decode(&bytes).unwrap().encode().unwrap();
            prop_assert_eq!(reencoded, bytes);
        }
    }
}
