//! File-based verb host.
//!
//! Stands in for the orchestrator: models are read from JSON files, the
//! verb runs through a [`Reconciler`], and the resulting state change is
//! applied to the state file.

use std::path::{Path, PathBuf};

use keel_engine::{Diagnostics, EngineConfig, Reconciler, ResourceKind, StateChange};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::clients::{ApiClient, ArgusClient, DsaClient, IaasClient, PostgresFlexClient};
use crate::resources::{CredentialKind, InstanceKind, JobKind, NetworkKind, UserKind};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("{verb} requires --{argument}")]
    MissingArgument {
        verb: Verb,
        argument: &'static str,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, HostError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Kind {
    Network,
    Instance,
    Credential,
    User,
    Job,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Verb {
    Create,
    Read,
    Update,
    Delete,
    Import,
}

impl std::fmt::Display for Verb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verb::Create => "create",
            Verb::Read => "read",
            Verb::Update => "update",
            Verb::Delete => "delete",
            Verb::Import => "import",
        };
        f.write_str(s)
    }
}

/// One verb invocation and the files it works on.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub verb: Verb,
    /// Desired model (create, update).
    pub desired: Option<PathBuf>,
    /// Current state, read by read/update/delete and written on commit.
    pub state: Option<PathBuf>,
    /// Import identifier.
    pub id: Option<String>,
}

impl Invocation {
    fn require_path(&self, path: &Option<PathBuf>, argument: &'static str) -> Result<PathBuf> {
        path.clone().ok_or(HostError::MissingArgument {
            verb: self.verb,
            argument,
        })
    }
}

/// What a verb did, as printed for the caller.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub change: &'static str,
    pub diagnostics: Diagnostics,
}

impl Report {
    pub fn has_error(&self) -> bool {
        self.diagnostics.has_error()
    }
}

async fn read_model<M: DeserializeOwned>(path: &Path) -> Result<M> {
    let bytes = tokio::fs::read(path).await.map_err(|source| HostError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&bytes).map_err(|source| HostError::Json {
        path: path.to_path_buf(),
        source,
    })
}

async fn write_model<M: Serialize>(path: &Path, model: &M) -> Result<()> {
    let mut bytes = serde_json::to_vec_pretty(model).map_err(|source| HostError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    bytes.push(b'\n');
    tokio::fs::write(path, bytes)
        .await
        .map_err(|source| HostError::Io {
            path: path.to_path_buf(),
            source,
        })
}

async fn remove_state(path: &Path) -> Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(HostError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Run one verb for one kind and apply its state change.
pub async fn run<K>(
    reconciler: &Reconciler<K>,
    invocation: &Invocation,
    cancel: &CancellationToken,
) -> Result<Report>
where
    K: ResourceKind,
    K::Model: Serialize + DeserializeOwned,
{
    let state_path = invocation.require_path(&invocation.state, "state")?;

    let outcome = match invocation.verb {
        Verb::Create => {
            let desired = read_model(&invocation.require_path(&invocation.desired, "desired")?).await?;
            reconciler.create(desired, cancel).await
        }
        Verb::Read => {
            let state = read_model(&state_path).await?;
            reconciler.read(&state, cancel).await
        }
        Verb::Update => {
            let desired = read_model(&invocation.require_path(&invocation.desired, "desired")?).await?;
            let prior = read_model(&state_path).await?;
            reconciler.update(desired, &prior, cancel).await
        }
        Verb::Delete => {
            let state = read_model(&state_path).await?;
            reconciler.delete(&state, cancel).await
        }
        Verb::Import => {
            let id = invocation.id.as_deref().ok_or(HostError::MissingArgument {
                verb: invocation.verb,
                argument: "id",
            })?;
            reconciler.import(id, cancel).await
        }
    };

    let change = match &outcome.change {
        StateChange::Commit(model) => {
            write_model(&state_path, model).await?;
            debug!("Wrote state to {}", state_path.display());
            "commit"
        }
        StateChange::Remove => {
            remove_state(&state_path).await?;
            debug!("Removed state {}", state_path.display());
            "remove"
        }
        StateChange::Keep => "keep",
    };

    info!(
        kind = reconciler.kind().name(),
        verb = %invocation.verb,
        change,
        diagnostics = outcome.diagnostics.len(),
        "Verb finished"
    );

    Ok(Report {
        change,
        diagnostics: outcome.diagnostics,
    })
}

/// Build the reconciler for `kind` over a shared client and run the verb.
pub async fn dispatch(
    kind: Kind,
    api: ApiClient,
    config: EngineConfig,
    invocation: &Invocation,
    cancel: &CancellationToken,
) -> Result<Report> {
    match kind {
        Kind::Network => {
            let reconciler = Reconciler::new(NetworkKind::new(IaasClient::new(api)), config);
            run(&reconciler, invocation, cancel).await
        }
        Kind::Instance => {
            let reconciler = Reconciler::new(InstanceKind::new(DsaClient::new(api)), config);
            run(&reconciler, invocation, cancel).await
        }
        Kind::Credential => {
            let reconciler = Reconciler::new(CredentialKind::new(DsaClient::new(api)), config);
            run(&reconciler, invocation, cancel).await
        }
        Kind::User => {
            let reconciler = Reconciler::new(UserKind::new(PostgresFlexClient::new(api)), config);
            run(&reconciler, invocation, cancel).await
        }
        Kind::Job => {
            let reconciler = Reconciler::new(JobKind::new(ArgusClient::new(api)), config);
            run(&reconciler, invocation, cancel).await
        }
    }
}
