//! Record store over a host ledger.
//!
//! The store is the only component that turns ledger bytes into stories
//! and indexes. It holds nothing but the ledger handle and its
//! configuration.

use crate::error::{Result, StoreError};
use crate::ledger::{Ledger, LedgerWrite};
use crate::types::{IndexAudit, IndexLoad, Story, StoryIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which configuration of the store is active.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreMode {
    /// Stories plus the name index, driven by the editorial workflow.
    #[default]
    Workflow,
    /// Free-form key/value storage with no schema.
    KeyValue,
}

/// Store configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Active configuration of the store.
    pub mode: StoreMode,

    /// Key holding the story index.
    pub index_key: String,

    /// Key seeded by `init` in key/value mode.
    pub seed_key: String,

    /// Refuse to add stories until `init` has written an index.
    pub require_initialized: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            mode: StoreMode::Workflow,
            index_key: "stories".to_string(),
            seed_key: "hello_world".to_string(),
            require_initialized: false,
        }
    }
}

impl StoreConfig {
    /// Default configuration for the key/value mode.
    pub fn key_value() -> Self {
        Self {
            mode: StoreMode::KeyValue,
            ..Default::default()
        }
    }

    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| StoreError::Deserialization(e.to_string()))
    }

    /// Whether `key` is used by the store itself.
    ///
    /// The seed key is only written in key/value mode.
    pub fn is_reserved(&self, key: &str) -> bool {
        key == self.index_key || (self.mode == StoreMode::KeyValue && key == self.seed_key)
    }
}

/// Typed access to stories and the story index.
pub struct RecordStore<L> {
    ledger: L,
    config: StoreConfig,
}

impl<L: Ledger> RecordStore<L> {
    /// Wrap `ledger` with the default configuration.
    pub fn new(ledger: L) -> Self {
        Self::with_config(ledger, StoreConfig::default())
    }

    pub fn with_config(ledger: L, config: StoreConfig) -> Self {
        Self { ledger, config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub fn into_ledger(self) -> L {
        self.ledger
    }

    /// Reset the store.
    ///
    /// In workflow mode this writes an empty index; stories already stored
    /// are left in place. In key/value mode `initial_value` is stored under
    /// the seed key.
    pub fn initialize(&self, initial_value: &[u8]) -> Result<()> {
        match self.config.mode {
            StoreMode::Workflow => {
                self.save_index(&StoryIndex::new())?;
                info!(index_key = %self.config.index_key, "story index reset");
            }
            StoreMode::KeyValue => {
                self.put_raw(&self.config.seed_key, initial_value)?;
                info!(seed_key = %self.config.seed_key, "seed key written");
            }
        }
        Ok(())
    }

    /// Raw bytes stored under `key`.
    pub fn get_raw(&self, key: &str) -> Result<Vec<u8>> {
        self.ledger
            .get(key)?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    /// Store raw bytes under `key` without any validation.
    pub fn put_raw(&self, key: &str, value: &[u8]) -> Result<()> {
        debug!(key, len = value.len(), "put");
        self.ledger.put(key, value)
    }

    /// Load the story index.
    ///
    /// A missing index is reported as [`IndexLoad::Empty`]; bytes that do
    /// not decode are a [`StoreError::Corruption`].
    pub fn load_index(&self) -> Result<IndexLoad> {
        match self.ledger.get(&self.config.index_key)? {
            None => Ok(IndexLoad::Empty),
            Some(bytes) => StoryIndex::decode(&bytes)
                .map(IndexLoad::Loaded)
                .map_err(|e| {
                    StoreError::Corruption(format!(
                        "index under {} is unreadable: {}",
                        self.config.index_key, e
                    ))
                }),
        }
    }

    pub fn save_index(&self, index: &StoryIndex) -> Result<()> {
        self.ledger.put(&self.config.index_key, &index.encode()?)
    }

    /// Fetch and decode the story stored under `name`.
    pub fn get_story(&self, name: &str) -> Result<Story> {
        let bytes = self.get_raw(name)?;
        Story::decode(&bytes)
    }

    /// Store `story` under its own name.
    pub fn put_story(&self, story: &Story) -> Result<()> {
        self.put_raw(&story.name, &story.encode()?)
    }

    /// Store a new story and the index that lists it in one batch.
    ///
    /// Whether the pair lands atomically depends on the ledger; see
    /// [`Ledger::put_batch`].
    pub fn insert_story(&self, story: &Story, index: &StoryIndex) -> Result<()> {
        let writes = [
            LedgerWrite::new(story.name.as_str(), story.encode()?),
            LedgerWrite::new(self.config.index_key.as_str(), index.encode()?),
        ];
        self.ledger.put_batch(&writes)
    }

    /// Check every indexed name against the story stored under it.
    pub fn audit(&self) -> Result<IndexAudit> {
        let index = self.load_index()?.into_index();
        let mut audit = IndexAudit {
            indexed: index.len(),
            ..Default::default()
        };

        for name in index.iter() {
            match self.ledger.get(name)? {
                None => audit.missing.push(name.to_string()),
                Some(bytes) => match Story::decode(&bytes) {
                    Ok(story) if story.name == name => {}
                    _ => audit.mismatched.push(name.to_string()),
                },
            }
        }

        Ok(audit)
    }
}
