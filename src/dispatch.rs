//! Named-operation entry point.
//!
//! Callers address the store with an operation name and positional string
//! arguments. The dispatcher resolves the name, checks the argument count
//! and hands off to the workflow or the raw store.

use crate::error::{Result, StoreError};
use crate::ledger::Ledger;
use crate::store::{RecordStore, StoreConfig, StoreMode};
use crate::workflow::Workflow;
use std::fmt;
use tracing::debug;

/// Operations reachable through the dispatcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Init,
    Read,
    Write,
    AddStory,
    FirstEdit,
    Approve,
    ChangeState,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::Init,
        Operation::Read,
        Operation::Write,
        Operation::AddStory,
        Operation::FirstEdit,
        Operation::Approve,
        Operation::ChangeState,
    ];

    /// Resolve an operation name, including its aliases.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "init" => Some(Operation::Init),
            "read" => Some(Operation::Read),
            "write" => Some(Operation::Write),
            "addstory" | "addRecord" => Some(Operation::AddStory),
            "firstedit" | "firstEdit" => Some(Operation::FirstEdit),
            "approve" => Some(Operation::Approve),
            "changestate" | "changeState" => Some(Operation::ChangeState),
            _ => None,
        }
    }

    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            Operation::Init => "init",
            Operation::Read => "read",
            Operation::Write => "write",
            Operation::AddStory => "addstory",
            Operation::FirstEdit => "firstedit",
            Operation::Approve => "approve",
            Operation::ChangeState => "changestate",
        }
    }

    /// Number of positional arguments expected.
    pub fn arity(self) -> usize {
        match self {
            Operation::Write => 2,
            Operation::ChangeState => 3,
            _ => 1,
        }
    }

    pub fn is_read_only(self) -> bool {
        matches!(self, Operation::Read)
    }

    /// Whether the operation is routed in the given store mode.
    pub fn available_in(self, mode: StoreMode) -> bool {
        match self {
            Operation::Init | Operation::Read => true,
            Operation::Write => mode == StoreMode::KeyValue,
            Operation::AddStory
            | Operation::FirstEdit
            | Operation::Approve
            | Operation::ChangeState => mode == StoreMode::Workflow,
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Routes named operations to the workflow and the record store.
pub struct Dispatcher<L> {
    workflow: Workflow<L>,
}

impl<L: Ledger> Dispatcher<L> {
    /// Dispatcher over `ledger` with the default workflow configuration.
    pub fn new(ledger: L) -> Self {
        Self::with_config(ledger, StoreConfig::default())
    }

    pub fn with_config(ledger: L, config: StoreConfig) -> Self {
        Self {
            workflow: Workflow::new(RecordStore::with_config(ledger, config)),
        }
    }

    pub fn workflow(&self) -> &Workflow<L> {
        &self.workflow
    }

    pub fn store(&self) -> &RecordStore<L> {
        self.workflow.store()
    }

    /// Entry point for state-changing calls. Accepts every routed operation.
    pub fn invoke<S: AsRef<str>>(&self, function: &str, args: &[S]) -> Result<Option<Vec<u8>>> {
        debug!(function, "invoke is running");
        self.dispatch(function, args)
    }

    /// Entry point for read-only calls.
    pub fn query<S: AsRef<str>>(&self, function: &str, args: &[S]) -> Result<Option<Vec<u8>>> {
        debug!(function, "query is running");
        match Operation::parse(function) {
            Some(op) if op.is_read_only() => self.dispatch(function, args),
            _ => Err(StoreError::UnknownOperation(function.to_string())),
        }
    }

    /// Resolve `function`, check the argument count and run it.
    ///
    /// Mutations return `None`; `read` returns the stored bytes.
    pub fn dispatch<S: AsRef<str>>(&self, function: &str, args: &[S]) -> Result<Option<Vec<u8>>> {
        let mode = self.store().config().mode;
        let op = Operation::parse(function)
            .filter(|op| op.available_in(mode))
            .ok_or_else(|| {
                debug!(function, "did not find func");
                StoreError::UnknownOperation(function.to_string())
            })?;

        if args.len() != op.arity() {
            return Err(StoreError::Arity {
                operation: op.name().to_string(),
                expected: op.arity(),
                got: args.len(),
            });
        }
        let args: Vec<&str> = args.iter().map(|a| a.as_ref()).collect();

        match op {
            Operation::Init => self.store().initialize(args[0].as_bytes())?,
            Operation::Read => return self.workflow.read(args[0]).map(Some),
            Operation::Write => self.store().put_raw(args[0], args[1].as_bytes())?,
            Operation::AddStory => {
                self.workflow.add_record(args[0])?;
            }
            Operation::FirstEdit => {
                self.workflow.first_edit(args[0])?;
            }
            Operation::Approve => {
                self.workflow.approve(args[0])?;
            }
            Operation::ChangeState => {
                self.workflow.change_state(args[0], args[1], args[2])?;
            }
        }
        Ok(None)
    }
}
