//! # Story Chain
//!
//! A ledger-backed story store with a fixed editorial workflow.
//!
//! ## Core Concepts
//!
//! - **Ledger**: The host key/value store; the only persistence substrate
//! - **Stories**: Records keyed by their own name, each in one workflow state
//! - **Index**: A single list of every story name, used for existence checks
//! - **Workflow**: Guarded transitions `written -> firstedited -> approved`
//!
//! ## Example
//!
//! ```ignore
//! use storychain::{Dispatcher, FileLedger};
//!
//! let dispatcher = Dispatcher::new(FileLedger::open_path("./ledger")?);
//!
//! dispatcher.invoke("init", &["0"])?;
//! dispatcher.invoke("addstory", &["chapter-1"])?;
//! dispatcher.invoke("firstedit", &["chapter-1"])?;
//! dispatcher.invoke("approve", &["chapter-1"])?;
//!
//! let bytes = dispatcher.query("read", &["chapter-1"])?;
//! ```

pub mod dispatch;
pub mod error;
pub mod ledger;
pub mod store;
pub mod types;
pub mod workflow;

// Re-exports
pub use dispatch::{Dispatcher, Operation};
pub use error::{Result, StoreError};
pub use ledger::{FileLedger, FileLedgerConfig, Ledger, LedgerWrite, MemoryLedger};
pub use store::{RecordStore, StoreConfig, StoreMode};
pub use types::*;
pub use workflow::Workflow;
