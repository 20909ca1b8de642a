//! Editorial workflow over the record store.
//!
//! Stories move `written -> firstedited -> approved`, one step at a time.
//! Every mutation goes through [`Workflow::change_state`], which only
//! applies a transition when the stored state matches the expected one.

use crate::error::{Result, StoreError};
use crate::ledger::Ledger;
use crate::store::RecordStore;
use crate::types::{Reindexed, Story, StoryState};
use tracing::{debug, info, warn};

/// Guarded state transitions over a [`RecordStore`].
pub struct Workflow<L> {
    store: RecordStore<L>,
}

impl<L: Ledger> Workflow<L> {
    pub fn new(store: RecordStore<L>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RecordStore<L> {
        &self.store
    }

    pub fn into_store(self) -> RecordStore<L> {
        self.store
    }

    /// Create a story in the `written` state and add it to the index.
    pub fn add_record(&self, name: &str) -> Result<Story> {
        self.check_name(name)?;

        let load = self.store.load_index()?;
        if !load.is_initialized() {
            if self.store.config().require_initialized {
                return Err(StoreError::NotInitialized);
            }
            warn!("story index missing, starting from an empty index");
        }
        let mut index = load.into_index();

        if !index.push(name) {
            return Err(StoreError::Duplicate(name.to_string()));
        }

        let story = Story::new(name);
        if let Err(e) = self.store.insert_story(&story, &index) {
            if !self.store.ledger().atomic_batches() {
                warn!(name, error = %e, "story may be stored without an index entry; run reindex");
            }
            return Err(e);
        }

        info!(name, stories = index.len(), "story added");
        Ok(story)
    }

    /// Move `name` from `from` to `to`.
    ///
    /// Fails without touching the ledger if `from -> to` is not a workflow
    /// edge, and fails with [`StoreError::InvalidTransition`] if the story is
    /// not currently in `from`.
    pub fn change_state(&self, name: &str, from: &str, to: &str) -> Result<Story> {
        let from: StoryState = from.parse()?;
        let to: StoryState = to.parse()?;
        self.transition(name, from, to)
    }

    /// `written -> firstedited`.
    pub fn first_edit(&self, name: &str) -> Result<Story> {
        self.transition(name, StoryState::Written, StoryState::FirstEdited)
    }

    /// `firstedited -> approved`.
    pub fn approve(&self, name: &str) -> Result<Story> {
        self.transition(name, StoryState::FirstEdited, StoryState::Approved)
    }

    /// Raw bytes stored under `name`, undecoded.
    pub fn read(&self, name: &str) -> Result<Vec<u8>> {
        self.store.get_raw(name)
    }

    /// Add an orphaned story back to the index.
    ///
    /// An orphan is what a failed index write leaves behind when the ledger
    /// applies batches key by key.
    pub fn reindex(&self, name: &str) -> Result<Reindexed> {
        self.check_name(name)?;

        let story = self.store.get_story(name)?;
        if story.name != name {
            return Err(StoreError::Corruption(format!(
                "story stored under {} is named {}",
                name, story.name
            )));
        }

        let mut index = self.store.load_index()?.into_index();
        if !index.push(name) {
            return Ok(Reindexed::AlreadyIndexed);
        }
        self.store.save_index(&index)?;

        info!(name, "orphaned story reindexed");
        Ok(Reindexed::Added)
    }

    fn transition(&self, name: &str, from: StoryState, to: StoryState) -> Result<Story> {
        if !from.can_transition_to(to) {
            return Err(StoreError::IllegalTransition {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let mut story = self.store.get_story(name)?;
        if story.state != from {
            return Err(StoreError::InvalidTransition {
                name: name.to_string(),
                expected: from.to_string(),
                actual: story.state.to_string(),
            });
        }

        story.state = to;
        self.store.put_story(&story)?;

        debug!(name, %from, %to, "state changed");
        Ok(story)
    }

    fn check_name(&self, name: &str) -> Result<()> {
        if name.is_empty() {
            return Err(StoreError::InvalidOperation(
                "story name must not be empty".into(),
            ));
        }
        if self.store.config().is_reserved(name) {
            return Err(StoreError::InvalidOperation(format!(
                "story name {} is reserved",
                name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::store::StoreConfig;
    use crate::types::IndexLoad;

    fn test_workflow() -> Workflow<MemoryLedger> {
        let store = RecordStore::new(MemoryLedger::new());
        store.initialize(b"").unwrap();
        Workflow::new(store)
    }

    #[test]
    fn test_add_record() {
        let workflow = test_workflow();

        let story = workflow.add_record("intro").unwrap();
        assert_eq!(story.state, StoryState::Written);

        let stored = Story::decode(&workflow.read("intro").unwrap()).unwrap();
        assert_eq!(stored, story);
    }

    #[test]
    fn test_add_duplicate() {
        let workflow = test_workflow();
        workflow.add_record("intro").unwrap();
        let writes = workflow.store().ledger().write_count();

        let result = workflow.add_record("intro");

        assert!(matches!(result, Err(StoreError::Duplicate(_))));
        assert_eq!(workflow.store().ledger().write_count(), writes);
        let index = workflow.store().load_index().unwrap().into_index();
        assert_eq!(index.names(), ["intro"]);
    }

    #[test]
    fn test_full_lifecycle() {
        let workflow = test_workflow();
        workflow.add_record("intro").unwrap();

        workflow.first_edit("intro").unwrap();
        let story = workflow.approve("intro").unwrap();
        assert_eq!(story.state, StoryState::Approved);

        let result = workflow.first_edit("intro");
        assert!(matches!(
            result,
            Err(StoreError::InvalidTransition { ref expected, ref actual, .. })
                if expected == "written" && actual == "approved"
        ));
    }

    #[test]
    fn test_approve_requires_first_edit() {
        let workflow = test_workflow();
        workflow.add_record("intro").unwrap();

        let result = workflow.approve("intro");
        assert!(matches!(result, Err(StoreError::InvalidTransition { .. })));

        let story = workflow.store().get_story("intro").unwrap();
        assert_eq!(story.state, StoryState::Written);
    }

    #[test]
    fn test_change_state_rejects_skips() {
        let workflow = test_workflow();
        workflow.add_record("intro").unwrap();
        let writes = workflow.store().ledger().write_count();

        let result = workflow.change_state("intro", "written", "approved");
        assert!(matches!(result, Err(StoreError::IllegalTransition { .. })));

        let result = workflow.change_state("intro", "approved", "written");
        assert!(matches!(result, Err(StoreError::IllegalTransition { .. })));

        assert_eq!(workflow.store().ledger().write_count(), writes);
    }

    #[test]
    fn test_change_state_unknown_state() {
        let workflow = test_workflow();
        workflow.add_record("intro").unwrap();

        let result = workflow.change_state("intro", "written", "published");
        assert!(matches!(result, Err(StoreError::UnknownState(s)) if s == "published"));
    }

    #[test]
    fn test_change_state_missing_story() {
        let workflow = test_workflow();
        let result = workflow.first_edit("ghost");
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_first_edit_matches_change_state() {
        let a = test_workflow();
        let b = test_workflow();
        a.add_record("s").unwrap();
        b.add_record("s").unwrap();

        a.first_edit("s").unwrap();
        b.change_state("s", "written", "firstedited").unwrap();

        assert_eq!(a.read("s").unwrap(), b.read("s").unwrap());
    }

    #[test]
    fn test_reserved_names() {
        let workflow = test_workflow();

        assert!(matches!(
            workflow.add_record("stories"),
            Err(StoreError::InvalidOperation(_))
        ));
        assert!(matches!(
            workflow.add_record(""),
            Err(StoreError::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_seed_key_is_a_valid_story_name() {
        let workflow = test_workflow();

        // Nothing is written under the seed key outside key/value mode
        workflow.add_record("hello_world").unwrap();
        workflow.first_edit("hello_world").unwrap();

        let story = workflow.store().get_story("hello_world").unwrap();
        assert_eq!(story.state, StoryState::FirstEdited);
    }

    #[test]
    fn test_add_without_init() {
        let workflow = Workflow::new(RecordStore::new(MemoryLedger::new()));
        workflow.add_record("intro").unwrap();

        let index = workflow.store().load_index().unwrap();
        assert!(matches!(index, IndexLoad::Loaded(ref i) if i.contains("intro")));
    }

    #[test]
    fn test_add_requires_init_when_configured() {
        let config = StoreConfig {
            require_initialized: true,
            ..Default::default()
        };
        let workflow = Workflow::new(RecordStore::with_config(MemoryLedger::new(), config));

        let result = workflow.add_record("intro");
        assert!(matches!(result, Err(StoreError::NotInitialized)));
    }

    #[test]
    fn test_add_does_not_overwrite_corrupt_index() {
        let workflow = test_workflow();
        workflow.store().put_raw("stories", b"{broken").unwrap();

        let result = workflow.add_record("intro");
        assert!(matches!(result, Err(StoreError::Corruption(_))));
        assert_eq!(workflow.store().get_raw("stories").unwrap(), b"{broken");
        assert!(!workflow.store().ledger().contains_key("intro"));
    }

    #[test]
    fn test_reindex_already_indexed() {
        let workflow = test_workflow();
        workflow.add_record("intro").unwrap();

        assert_eq!(workflow.reindex("intro").unwrap(), Reindexed::AlreadyIndexed);
        assert!(matches!(
            workflow.reindex("ghost"),
            Err(StoreError::NotFound(_))
        ));
    }
}
