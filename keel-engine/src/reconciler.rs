//! Verb drivers shared by every resource kind.
//!
//! A resource kind supplies its wire mapping, its remote calls and a few
//! hooks through [`ResourceKind`]; [`Reconciler`] runs the create, read,
//! update, delete and import sequences on top of it and turns every failure
//! into diagnostics.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, Timeouts};
use crate::diagnostics::Diagnostics;
use crate::diff::check_identity_stable;
use crate::error::{ApiError, EngineError, Result, VerbError};
use crate::identity::{ImportFormat, RemoteIdentity};
use crate::mapper::WireMapper;
use crate::waiter::{self, Operation, Readiness, TerminalOutcome};

/// Result of a call against the remote API.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Accepted long-running operation.
///
/// Not `Clone`: a handle is consumed by exactly one wait.
#[derive(Debug)]
pub struct OperationHandle<R> {
    pub operation: Operation,
    /// `None` while the remote side has not assigned an id yet.
    pub identity: Option<RemoteIdentity>,
    /// Whatever the kind needs to probe the operation (id, name, ...).
    pub reference: R,
}

impl<R> OperationHandle<R> {
    pub fn new(operation: Operation, identity: Option<RemoteIdentity>, reference: R) -> Self {
        Self {
            operation,
            identity,
            reference,
        }
    }
}

/// What a mutating call returned.
#[derive(Debug)]
pub enum Issued<T, R> {
    /// The call finished synchronously.
    Complete(T),
    /// The call was accepted and completes asynchronously.
    Accepted(OperationHandle<R>),
}

/// A resource kind as seen by the engine.
#[async_trait]
pub trait ResourceKind: WireMapper + Send + Sync {
    /// Probe reference carried by operation handles.
    type Reference: fmt::Debug + Send + Sync;

    fn name(&self) -> &'static str;

    fn import_format(&self) -> &'static ImportFormat;

    /// Default operation timeouts of this kind.
    fn timeouts(&self) -> Timeouts;

    /// Remote identity recorded in a model, if any.
    fn identity(&self, model: &Self::Model) -> Option<RemoteIdentity>;

    /// Model holding only the identity fields; the starting point of an import.
    fn seed(&self, identity: &RemoteIdentity) -> Self::Model;

    /// Constraints the schema cannot express.
    fn validate(&self, _desired: &Self::Model) -> Result<()> {
        Ok(())
    }

    /// Lookups needed before the desired state can be mapped.
    async fn prepare(&self, desired: Self::Model) -> Result<Self::Model> {
        Ok(desired)
    }

    /// Fill fields the caller left unknown from the prior observed state.
    fn merge_prior(&self, desired: Self::Model, prior: &Self::Model) -> Self::Model;

    /// Whether any user-controllable field differs.
    fn needs_update_call(&self, desired: &Self::Model, observed: &Self::Model) -> bool;

    /// Post-conditions of an update, e.g. fields the server must echo unchanged.
    fn verify_update(&self, _requested: &Self::Model, _observed: &Self::Model) -> Result<()> {
        Ok(())
    }

    fn readiness(&self, _response: &Self::Response) -> Readiness {
        Readiness::Ready
    }

    /// Recover fields an import cannot get from the read response alone.
    async fn complete_import(&self, model: Self::Model) -> Result<Self::Model> {
        Ok(model)
    }

    async fn create(
        &self,
        desired: &Self::Model,
        request: Self::CreateRequest,
    ) -> ApiResult<Issued<Self::Response, Self::Reference>>;

    async fn read(&self, identity: &RemoteIdentity) -> ApiResult<Self::Response>;

    async fn update(
        &self,
        identity: &RemoteIdentity,
        request: Self::UpdateRequest,
    ) -> ApiResult<Issued<Self::Response, Self::Reference>>;

    async fn delete(&self, identity: &RemoteIdentity) -> ApiResult<Issued<(), Self::Reference>>;

    /// Status read for an accepted operation.
    async fn probe(&self, handle: &OperationHandle<Self::Reference>) -> ApiResult<Self::Response>;
}

/// Change to apply to the caller's persisted state.
#[derive(Debug, Clone, PartialEq)]
pub enum StateChange<M> {
    Commit(M),
    /// The resource is gone; drop the local record.
    Remove,
    /// Leave the local record untouched.
    Keep,
}

/// Result of one verb.
#[derive(Debug, Clone)]
pub struct Outcome<M> {
    pub change: StateChange<M>,
    pub diagnostics: Diagnostics,
}

impl<M> Outcome<M> {
    fn commit(model: M) -> Self {
        Self {
            change: StateChange::Commit(model),
            diagnostics: Diagnostics::new(),
        }
    }

    fn removed(diagnostics: Diagnostics) -> Self {
        Self {
            change: StateChange::Remove,
            diagnostics,
        }
    }

    fn failed(context: &str, err: &VerbError) -> Self {
        let mut diagnostics = Diagnostics::new();
        diagnostics.add_verb_error(context, err);
        Self {
            change: StateChange::Keep,
            diagnostics,
        }
    }

    /// No error-severity diagnostic was produced.
    pub fn is_success(&self) -> bool {
        !self.diagnostics.has_error()
    }
}

/// Run `fut` unless the caller cancels first.
async fn until_cancelled<F: Future>(cancel: &CancellationToken, fut: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        out = fut => Some(out),
    }
}

/// Drives the five verbs for one resource kind.
pub struct Reconciler<K> {
    kind: K,
    config: EngineConfig,
}

impl<K: ResourceKind> Reconciler<K> {
    pub fn new(kind: K, config: EngineConfig) -> Self {
        Self { kind, config }
    }

    pub fn kind(&self) -> &K {
        &self.kind
    }

    pub async fn create(&self, desired: K::Model, cancel: &CancellationToken) -> Outcome<K::Model> {
        info!("Creating {}", self.kind.name());
        match self.try_create(desired, cancel).await {
            Ok(observed) => {
                info!(
                    "Created {} ({})",
                    self.kind.name(),
                    self.describe_identity(&observed)
                );
                Outcome::commit(observed)
            }
            Err(e) => self.failure(Operation::Create, e),
        }
    }

    async fn try_create(
        &self,
        desired: K::Model,
        cancel: &CancellationToken,
    ) -> std::result::Result<K::Model, VerbError> {
        self.kind.validate(&desired).map_err(VerbError::before_issue)?;
        let desired = self
            .pre_issue(cancel, self.kind.prepare(desired))
            .await?;
        let request = self
            .kind
            .to_wire_create(&desired)
            .map_err(VerbError::before_issue)?;

        let issued = self.issue(cancel, self.kind.create(&desired, request)).await?;
        let (response, identity) = match issued {
            Issued::Complete(response) => (response, None),
            Issued::Accepted(handle) => {
                let identity = handle.identity.clone();
                let response = self
                    .await_ready(handle, cancel)
                    .await
                    .map_err(|e| VerbError::after_issue(e).with_identity(identity.clone()))?;
                (response, identity)
            }
        };

        self.kind
            .from_wire(response, &desired)
            .map_err(|e| VerbError::after_issue(e).with_identity(identity))
    }

    /// Refresh the observed state of an existing resource.
    pub async fn read(&self, state: &K::Model, cancel: &CancellationToken) -> Outcome<K::Model> {
        let identity = match self.require_identity(state) {
            Ok(identity) => identity,
            Err(e) => return self.read_failure(&e),
        };
        debug!("Reading {} ({})", self.kind.name(), identity);

        let response = match until_cancelled(cancel, self.kind.read(&identity)).await {
            None => return self.read_failure(&VerbError::before_issue(EngineError::Cancelled)),
            Some(Err(e)) if e.is_not_found() => return self.vanished(&identity),
            Some(Err(e)) => return self.read_failure(&VerbError::before_issue(e.into())),
            Some(Ok(response)) => response,
        };

        if self.kind.readiness(&response) == Readiness::Gone {
            return self.vanished(&identity);
        }

        let observed = self
            .kind
            .from_wire(response, state)
            .and_then(|observed| {
                check_identity_stable(Some(&identity), self.kind.identity(&observed).as_ref())?;
                Ok(observed)
            });

        match observed {
            Ok(observed) => Outcome::commit(observed),
            Err(e) => self.read_failure(&VerbError::before_issue(e)),
        }
    }

    pub async fn update(
        &self,
        desired: K::Model,
        prior: &K::Model,
        cancel: &CancellationToken,
    ) -> Outcome<K::Model> {
        match self.try_update(desired, prior, cancel).await {
            Ok(observed) => Outcome::commit(observed),
            Err(e) => self.failure(Operation::Update, e),
        }
    }

    async fn try_update(
        &self,
        desired: K::Model,
        prior: &K::Model,
        cancel: &CancellationToken,
    ) -> std::result::Result<K::Model, VerbError> {
        let identity = self.require_identity(prior)?;
        let desired = self.kind.merge_prior(desired, prior);
        self.kind.validate(&desired).map_err(VerbError::before_issue)?;

        if !self.kind.needs_update_call(&desired, prior) {
            debug!(
                "No changes for {} ({}), carrying state forward",
                self.kind.name(),
                identity
            );
            return Ok(desired);
        }

        info!("Updating {} ({})", self.kind.name(), identity);
        let desired = self
            .pre_issue(cancel, self.kind.prepare(desired))
            .await?;
        let request = self
            .kind
            .to_wire_update(&desired, prior)
            .map_err(VerbError::before_issue)?;

        let unresolved = |e: EngineError| VerbError::after_issue(e).with_identity(Some(identity.clone()));

        let issued = self
            .issue(cancel, self.kind.update(&identity, request))
            .await
            .map_err(|e| e.with_identity(Some(identity.clone())))?;
        let response = match issued {
            Issued::Complete(response) => response,
            Issued::Accepted(handle) => self.await_ready(handle, cancel).await.map_err(unresolved)?,
        };

        let observed = self.kind.from_wire(response, &desired).map_err(unresolved)?;
        self.kind
            .verify_update(&desired, &observed)
            .map_err(unresolved)?;
        check_identity_stable(Some(&identity), self.kind.identity(&observed).as_ref())
            .map_err(unresolved)?;

        info!("Updated {} ({})", self.kind.name(), identity);
        Ok(observed)
    }

    /// Delete the remote resource.
    ///
    /// The local record is removed whenever the delete call itself succeeded.
    /// If waiting for the resource to disappear then fails, the removal is
    /// still reported but together with an error saying the resource may
    /// still exist.
    pub async fn delete(&self, state: &K::Model, cancel: &CancellationToken) -> Outcome<K::Model> {
        let identity = match self.require_identity(state) {
            Ok(identity) => identity,
            Err(e) => return self.failure(Operation::Delete, e),
        };
        info!("Deleting {} ({})", self.kind.name(), identity);

        let issued = match until_cancelled(cancel, self.kind.delete(&identity)).await {
            None => {
                return self.failure(
                    Operation::Delete,
                    VerbError::after_issue(EngineError::Cancelled).with_identity(Some(identity)),
                )
            }
            Some(Err(e)) if e.is_not_found() => {
                info!("{} ({}) already absent", self.kind.name(), identity);
                return Outcome::removed(Diagnostics::new());
            }
            Some(Err(e)) => {
                return self.failure(
                    Operation::Delete,
                    VerbError::from_mutation(e).with_identity(Some(identity)),
                )
            }
            Some(Ok(issued)) => issued,
        };

        let handle = match issued {
            Issued::Complete(()) => {
                info!("Deleted {} ({})", self.kind.name(), identity);
                return Outcome::removed(Diagnostics::new());
            }
            Issued::Accepted(handle) => handle,
        };

        match self.await_absent(handle, cancel).await {
            Ok(()) => {
                info!("Deleted {} ({})", self.kind.name(), identity);
                Outcome::removed(Diagnostics::new())
            }
            Err(e) => {
                warn!(
                    "Delete of {} ({}) was accepted but not confirmed: {}",
                    self.kind.name(),
                    identity,
                    e
                );
                let mut diagnostics = Diagnostics::new();
                diagnostics.add_verb_error(
                    &format!("delete {}", self.kind.name()),
                    &VerbError::after_issue(e).with_identity(Some(identity)),
                );
                diagnostics.add_error(
                    format!("{} may still exist", self.kind.name()),
                    "The delete request was accepted and the resource was removed from \
                     local state, but its removal on the remote side was not confirmed. \
                     Check the remote resource before recreating it.",
                );
                Outcome::removed(diagnostics)
            }
        }
    }

    /// Seed state entirely from the remote side, given an import identifier.
    pub async fn import(&self, raw: &str, cancel: &CancellationToken) -> Outcome<K::Model> {
        match self.try_import(raw, cancel).await {
            Ok(model) => {
                info!("Imported {} ({})", self.kind.name(), raw);
                Outcome::commit(model)
            }
            Err(e) => Outcome::failed(&format!("import {}", self.kind.name()), &e),
        }
    }

    async fn try_import(
        &self,
        raw: &str,
        cancel: &CancellationToken,
    ) -> std::result::Result<K::Model, VerbError> {
        let identity = self
            .kind
            .import_format()
            .parse(raw)
            .map_err(VerbError::before_issue)?;

        let response = match until_cancelled(cancel, self.kind.read(&identity)).await {
            None => return Err(VerbError::before_issue(EngineError::Cancelled)),
            Some(result) => result.map_err(|e| VerbError::before_issue(e.into()))?,
        };

        let seed = self.kind.seed(&identity);
        let model = self
            .kind
            .from_wire(response, &seed)
            .map_err(VerbError::before_issue)?;
        let model = self
            .pre_issue(cancel, self.kind.complete_import(model))
            .await?;
        check_identity_stable(Some(&identity), self.kind.identity(&model).as_ref())
            .map_err(VerbError::before_issue)?;

        Ok(model)
    }

    fn require_identity(&self, model: &K::Model) -> std::result::Result<RemoteIdentity, VerbError> {
        self.kind.identity(model).ok_or_else(|| {
            VerbError::before_issue(EngineError::validation(format!(
                "{} state carries no remote identity",
                self.kind.name()
            )))
        })
    }

    fn describe_identity(&self, model: &K::Model) -> String {
        self.kind
            .identity(model)
            .map(|i| i.to_string())
            .unwrap_or_else(|| "no identity".to_string())
    }

    /// Pre-issuance async step; cancellation here has no remote effect.
    async fn pre_issue<T, F>(&self, cancel: &CancellationToken, fut: F) -> std::result::Result<T, VerbError>
    where
        F: Future<Output = Result<T>>,
    {
        match until_cancelled(cancel, fut).await {
            None => Err(VerbError::before_issue(EngineError::Cancelled)),
            Some(result) => result.map_err(VerbError::before_issue),
        }
    }

    /// Mutating call. Never retried; cancellation while it is in flight
    /// leaves its effect unresolved.
    async fn issue<T, F>(&self, cancel: &CancellationToken, call: F) -> std::result::Result<T, VerbError>
    where
        F: Future<Output = ApiResult<T>>,
    {
        match until_cancelled(cancel, call).await {
            None => Err(VerbError::after_issue(EngineError::Cancelled)),
            Some(result) => result.map_err(VerbError::from_mutation),
        }
    }

    async fn await_terminal(
        &self,
        handle: OperationHandle<K::Reference>,
        cancel: &CancellationToken,
    ) -> Result<TerminalOutcome<K::Response>> {
        let config = self
            .config
            .wait_config(handle.operation, self.kind.timeouts());
        let label = format!("{} {}", handle.operation, self.kind.name());
        let kind = &self.kind;
        let handle = &handle;

        waiter::wait(
            config,
            handle.operation.expectation(),
            cancel,
            &label,
            move || kind.probe(handle),
            |response| kind.readiness(response),
        )
        .await
    }

    async fn await_ready(
        &self,
        handle: OperationHandle<K::Reference>,
        cancel: &CancellationToken,
    ) -> Result<K::Response> {
        match self.await_terminal(handle, cancel).await? {
            TerminalOutcome::Ready(response) => Ok(response),
            TerminalOutcome::Absent => Err(EngineError::LroFailed(format!(
                "{} disappeared while waiting for it to become ready",
                self.kind.name()
            ))),
            TerminalOutcome::Failed(cause) => Err(EngineError::LroFailed(cause)),
        }
    }

    async fn await_absent(
        &self,
        handle: OperationHandle<K::Reference>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match self.await_terminal(handle, cancel).await? {
            TerminalOutcome::Absent => Ok(()),
            TerminalOutcome::Ready(_) => Err(EngineError::LroFailed(format!(
                "{} is still present",
                self.kind.name()
            ))),
            TerminalOutcome::Failed(cause) => Err(EngineError::LroFailed(cause)),
        }
    }

    fn vanished(&self, identity: &RemoteIdentity) -> Outcome<K::Model> {
        warn!(
            "{} ({}) not found, removing from state",
            self.kind.name(),
            identity
        );
        let mut diagnostics = Diagnostics::new();
        diagnostics.add_warning(
            format!("{} not found", self.kind.name()),
            format!(
                "{} {} no longer exists on the remote side and was removed from state",
                self.kind.name(),
                identity
            ),
        );
        Outcome::removed(diagnostics)
    }

    fn read_failure(&self, err: &VerbError) -> Outcome<K::Model> {
        Outcome::failed(&format!("read {}", self.kind.name()), err)
    }

    fn failure(&self, operation: Operation, err: VerbError) -> Outcome<K::Model> {
        warn!("Failed to {} {}: {}", operation, self.kind.name(), err);
        Outcome::failed(&format!("{} {}", operation, self.kind.name()), &err)
    }
}
