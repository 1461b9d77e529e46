//! Data services credential: a generated login for a service instance.
//!
//! Every field is assigned by the remote side. A credential is created by
//! asking for one and becomes readable once provisioned; it is never
//! modified afterwards.

use std::time::Duration;

use async_trait::async_trait;
use keel_engine::identity::rules;
use keel_engine::mapper::sensitive;
use keel_engine::{
    ApiError, ApiResult, EngineError, Field, ImportFormat, Issued, Operation, OperationHandle,
    PartRule, RemoteIdentity, ResourceKind, Result, Timeouts, WireMapper,
};
use serde::{Deserialize, Serialize};

use crate::clients::dsa::{self, DsaClient};

pub struct CredentialDefaults;

impl CredentialDefaults {
    pub const TIMEOUTS: Timeouts = Timeouts::uniform(Duration::from_secs(15 * 60));
}

static IMPORT_FORMAT: ImportFormat = ImportFormat::new(&[
    PartRule {
        name: "project_id",
        validate: rules::uuid,
    },
    PartRule {
        name: "instance_id",
        validate: rules::non_empty,
    },
    PartRule {
        name: "credential_id",
        validate: rules::non_empty,
    },
]);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub project_id: String,
    pub instance_id: String,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub id: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub host: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub username: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub password: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub port: Field<i64>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub uri: Field<String>,
}

pub struct CredentialKind {
    client: DsaClient,
}

impl CredentialKind {
    pub fn new(client: DsaClient) -> Self {
        Self { client }
    }
}

fn credential_id(identity: &RemoteIdentity) -> ApiResult<&str> {
    identity
        .sub_id
        .as_deref()
        .ok_or_else(|| ApiError::Invalid(format!("{} carries no credential id", identity)))
}

impl WireMapper for CredentialKind {
    type Model = Credential;
    type CreateRequest = ();
    type UpdateRequest = ();
    type Response = dsa::Credential;

    fn to_wire_create(&self, _desired: &Credential) -> Result<()> {
        Ok(())
    }

    fn to_wire_update(&self, _desired: &Credential, _prior: &Credential) -> Result<()> {
        Err(EngineError::validation(
            "credentials cannot be changed in place; recreate the credential",
        ))
    }

    fn from_wire(&self, response: dsa::Credential, prior: &Credential) -> Result<Credential> {
        let details = response.raw.credentials;
        Ok(Credential {
            project_id: prior.project_id.clone(),
            instance_id: prior.instance_id.clone(),
            id: Field::Value(response.id),
            host: Field::from_option(details.host),
            username: Field::from_option(details.username),
            password: sensitive(details.password, &prior.password),
            port: Field::from_option(details.port),
            uri: sensitive(details.uri, &prior.uri),
        })
    }
}

#[async_trait]
impl ResourceKind for CredentialKind {
    type Reference = RemoteIdentity;

    fn name(&self) -> &'static str {
        "credential"
    }

    fn import_format(&self) -> &'static ImportFormat {
        &IMPORT_FORMAT
    }

    fn timeouts(&self) -> Timeouts {
        CredentialDefaults::TIMEOUTS
    }

    fn identity(&self, model: &Credential) -> Option<RemoteIdentity> {
        model.id.value().map(|id| {
            RemoteIdentity::new(model.project_id.clone(), model.instance_id.clone()).with_sub(id)
        })
    }

    fn seed(&self, identity: &RemoteIdentity) -> Credential {
        Credential {
            project_id: identity.project_id.clone(),
            instance_id: identity.instance_id.clone(),
            id: Field::from_option(identity.sub_id.clone()),
            ..Default::default()
        }
    }

    fn validate(&self, desired: &Credential) -> Result<()> {
        rules::uuid(&desired.project_id)
            .map_err(|e| EngineError::validation(format!("project_id: {}", e)))?;
        rules::non_empty(&desired.instance_id)
            .map_err(|e| EngineError::validation(format!("instance_id: {}", e)))
    }

    fn merge_prior(&self, desired: Credential, prior: &Credential) -> Credential {
        Credential {
            project_id: prior.project_id.clone(),
            instance_id: prior.instance_id.clone(),
            id: desired.id.or_prior(&prior.id),
            host: desired.host.or_prior(&prior.host),
            username: desired.username.or_prior(&prior.username),
            password: desired.password.or_prior(&prior.password),
            port: desired.port.or_prior(&prior.port),
            uri: desired.uri.or_prior(&prior.uri),
        }
    }

    /// Nothing about a credential is user-controllable apart from the
    /// instance it belongs to, which is part of its identity.
    fn needs_update_call(&self, _desired: &Credential, _observed: &Credential) -> bool {
        false
    }

    async fn create(
        &self,
        desired: &Credential,
        _request: (),
    ) -> ApiResult<Issued<dsa::Credential, RemoteIdentity>> {
        let created = self
            .client
            .create_credential(&desired.project_id, &desired.instance_id)
            .await?;

        let identity = RemoteIdentity::new(desired.project_id.clone(), desired.instance_id.clone())
            .with_sub(&created.id);
        Ok(Issued::Accepted(OperationHandle::new(
            Operation::Create,
            Some(identity.clone()),
            identity,
        )))
    }

    async fn read(&self, identity: &RemoteIdentity) -> ApiResult<dsa::Credential> {
        self.client
            .get_credential(
                &identity.project_id,
                &identity.instance_id,
                credential_id(identity)?,
            )
            .await
    }

    async fn update(
        &self,
        _identity: &RemoteIdentity,
        _request: (),
    ) -> ApiResult<Issued<dsa::Credential, RemoteIdentity>> {
        Err(ApiError::Status {
            code: 405,
            body: "credentials cannot be updated".to_string(),
        })
    }

    async fn delete(&self, identity: &RemoteIdentity) -> ApiResult<Issued<(), RemoteIdentity>> {
        self.client
            .delete_credential(
                &identity.project_id,
                &identity.instance_id,
                credential_id(identity)?,
            )
            .await?;
        Ok(Issued::Complete(()))
    }

    async fn probe(&self, handle: &OperationHandle<RemoteIdentity>) -> ApiResult<dsa::Credential> {
        self.read(&handle.reference).await
    }
}
