//! keel engine: reconciles declared resource state against a remote control
//! plane.
//!
//! Every resource kind implements [`ResourceKind`] (its wire mapping plus
//! its remote calls) and is driven through a [`Reconciler`], which runs the
//! create, read, update, delete and import verbs, waits for long-running
//! operations and reports failures as [`Diagnostics`].

pub mod config;
pub mod diagnostics;
pub mod diff;
pub mod error;
pub mod field;
pub mod identity;
pub mod mapper;
pub mod reconciler;
pub mod waiter;

pub use config::{EngineConfig, Timeouts};
pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use error::{ApiError, EngineError, RemoteEffect, Result, VerbError};
pub use field::{Field, FieldList, FieldMap};
pub use identity::{ImportFormat, PartRule, RemoteIdentity};
pub use mapper::WireMapper;
pub use reconciler::{
    ApiResult, Issued, OperationHandle, Outcome, Reconciler, ResourceKind, StateChange,
};
pub use waiter::{Expect, Operation, Readiness, TerminalOutcome, WaitConfig};
