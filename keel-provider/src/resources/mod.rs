//! Resource kinds: field mappings and remote calls for each kind the engine
//! reconciles.

pub mod credential;
pub mod instance;
pub mod job;
pub mod network;
pub mod user;

pub use credential::{Credential, CredentialKind};
pub use instance::{Instance, InstanceKind};
pub use job::{Job, JobKind};
pub use network::{Network, NetworkKind};
pub use user::{User, UserKind};
