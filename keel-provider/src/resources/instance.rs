//! Data services instance resource.
//!
//! The plan is declared either by name and version, resolved through the
//! project offerings, or directly by plan id. The ACL is sent as one comma
//! separated service parameter.

use std::time::Duration;

use async_trait::async_trait;
use keel_engine::diff::{check_immutable, list_changed, scalar_changed};
use keel_engine::identity::rules;
use keel_engine::mapper::{list_from_wire, present_list};
use keel_engine::{
    ApiResult, EngineError, Field, FieldList, ImportFormat, Issued, Operation, OperationHandle,
    PartRule, Readiness, RemoteIdentity, ResourceKind, Result, Timeouts, WireMapper,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::clients::dsa::{self, DsaClient, InstanceParameters, LastOperation};

pub struct InstanceDefaults;

impl InstanceDefaults {
    pub const TIMEOUTS: Timeouts = Timeouts::uniform(Duration::from_secs(60 * 60));
    pub const ACL_SEPARATOR: char = ',';
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
]);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub id: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub name: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub plan: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub version: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub plan_id: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub acl: FieldList<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub dashboard_url: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub cf_guid: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub cf_space_guid: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub cf_organization_guid: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub image_url: Field<String>,
}

pub struct InstanceKind {
    client: DsaClient,
}

impl InstanceKind {
    pub fn new(client: DsaClient) -> Self {
        Self { client }
    }

    async fn offerings(&self, project_id: &str) -> Result<dsa::Offerings> {
        self.client
            .offerings(project_id)
            .await
            .map_err(EngineError::from)
    }
}

fn acl_parameters(acl: &FieldList<String>) -> InstanceParameters {
    let entries = present_list(acl);
    InstanceParameters {
        sgw_acl: Some(entries.join(&InstanceDefaults::ACL_SEPARATOR.to_string())),
    }
}

fn acl_from_wire(parameters: &InstanceParameters, prior: &FieldList<String>) -> FieldList<String> {
    let entries: Vec<String> = parameters
        .sgw_acl
        .as_deref()
        .unwrap_or_default()
        .split(InstanceDefaults::ACL_SEPARATOR)
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect();

    if entries.is_empty() && prior.is_null() {
        return Field::Null;
    }
    list_from_wire(Some(entries))
}

fn required<'a>(field: &'a Field<String>, name: &str) -> Result<&'a String> {
    field
        .value()
        .ok_or_else(|| EngineError::validation(format!("{} is required", name)))
}

impl WireMapper for InstanceKind {
    type Model = Instance;
    type CreateRequest = dsa::ProvisionRequest;
    type UpdateRequest = dsa::UpdateInstanceRequest;
    type Response = dsa::Instance;

    fn to_wire_create(&self, desired: &Instance) -> Result<dsa::ProvisionRequest> {
        Ok(dsa::ProvisionRequest {
            instance_name: required(&desired.name, "name")?.clone(),
            plan_id: required(&desired.plan_id, "plan_id")?.clone(),
            parameters: acl_parameters(&desired.acl),
        })
    }

    fn to_wire_update(&self, desired: &Instance, prior: &Instance) -> Result<dsa::UpdateInstanceRequest> {
        if scalar_changed(&desired.name, &prior.name) {
            return Err(EngineError::validation(
                "name cannot be changed in place; recreate the instance",
            ));
        }

        Ok(dsa::UpdateInstanceRequest {
            plan_id: required(&desired.plan_id, "plan_id")?.clone(),
            parameters: acl_parameters(&desired.acl),
        })
    }

    fn from_wire(&self, response: dsa::Instance, prior: &Instance) -> Result<Instance> {
        Ok(Instance {
            project_id: prior.project_id.clone(),
            id: Field::Value(response.instance_id),
            name: Field::Value(response.name),
            plan: prior.plan.clone(),
            version: prior.version.clone(),
            plan_id: Field::Value(response.plan_id),
            acl: acl_from_wire(&response.parameters, &prior.acl),
            dashboard_url: Field::from_option(response.dashboard_url),
            cf_guid: Field::from_option(response.cf_guid),
            cf_space_guid: Field::from_option(response.cf_space_guid),
            cf_organization_guid: Field::from_option(response.organization_guid),
            image_url: Field::from_option(response.image_url),
        })
    }
}

#[async_trait]
impl ResourceKind for InstanceKind {
    type Reference = RemoteIdentity;

    fn name(&self) -> &'static str {
        "instance"
    }

    fn import_format(&self) -> &'static ImportFormat {
        &IMPORT_FORMAT
    }

    fn timeouts(&self) -> Timeouts {
        InstanceDefaults::TIMEOUTS
    }

    fn identity(&self, model: &Instance) -> Option<RemoteIdentity> {
        model
            .id
            .value()
            .map(|id| RemoteIdentity::new(model.project_id.clone(), id.clone()))
    }

    fn seed(&self, identity: &RemoteIdentity) -> Instance {
        Instance {
            project_id: identity.project_id.clone(),
            id: Field::Value(identity.instance_id.clone()),
            ..Default::default()
        }
    }

    fn validate(&self, desired: &Instance) -> Result<()> {
        rules::uuid(&desired.project_id)
            .map_err(|e| EngineError::validation(format!("project_id: {}", e)))?;

        if desired.name.is_null() {
            return Err(EngineError::validation("name is required"));
        }

        let plan = desired.plan.value().is_some();
        let version = desired.version.value().is_some();
        if plan != version && desired.plan.is_known() && desired.version.is_known() {
            return Err(EngineError::validation(
                "plan and version must be set together",
            ));
        }
        if desired.plan.is_null() && desired.version.is_null() && desired.plan_id.is_null() {
            return Err(EngineError::validation(
                "either plan_id or plan and version must be set",
            ));
        }
        Ok(())
    }

    /// Resolve the plan fields against the project offerings so that plan,
    /// version and plan_id agree before anything is sent.
    async fn prepare(&self, mut desired: Instance) -> Result<Instance> {
        let declared = (desired.plan.value().cloned(), desired.version.value().cloned());
        match declared {
            (Some(plan), Some(version)) => {
                let offerings = self.offerings(&desired.project_id).await?;
                let resolved = offerings.plan_id(&plan, &version).ok_or_else(|| {
                    EngineError::validation(format!(
                        "no plan {:?} offered for version {:?}",
                        plan, version
                    ))
                })?;

                if let Some(plan_id) = desired.plan_id.value() {
                    if plan_id != resolved {
                        return Err(EngineError::validation(format!(
                            "plan_id {:?} conflicts with plan {:?} version {:?} ({:?})",
                            plan_id, plan, version, resolved
                        )));
                    }
                }

                debug!("Resolved plan {} version {} to {}", plan, version, resolved);
                desired.plan_id = Field::Value(resolved.to_string());
            }
            _ => {
                let plan_id = required(&desired.plan_id, "plan_id")?.clone();
                let offerings = self.offerings(&desired.project_id).await?;
                let (plan, version) = offerings.plan_and_version(&plan_id).ok_or_else(|| {
                    EngineError::validation(format!("plan_id {:?} is not offered", plan_id))
                })?;
                desired.plan = Field::Value(plan.to_string());
                desired.version = Field::Value(version.to_string());
            }
        }
        Ok(desired)
    }

    fn merge_prior(&self, desired: Instance, prior: &Instance) -> Instance {
        // A changed plan or version invalidates the recorded plan id; a
        // changed plan id invalidates the recorded plan and version.
        let plan_changed = scalar_changed(&desired.plan, &prior.plan)
            || scalar_changed(&desired.version, &prior.version);
        let plan_id_changed = scalar_changed(&desired.plan_id, &prior.plan_id);

        let (plan, version) = if plan_id_changed && !plan_changed {
            (desired.plan, desired.version)
        } else {
            (
                desired.plan.or_prior(&prior.plan),
                desired.version.or_prior(&prior.version),
            )
        };
        let plan_id = if plan_changed {
            desired.plan_id
        } else {
            desired.plan_id.or_prior(&prior.plan_id)
        };

        Instance {
            project_id: prior.project_id.clone(),
            id: desired.id.or_prior(&prior.id),
            name: desired.name.or_prior(&prior.name),
            plan,
            version,
            plan_id,
            acl: desired.acl.or_prior_when_unset(&prior.acl),
            dashboard_url: desired.dashboard_url.or_prior(&prior.dashboard_url),
            cf_guid: desired.cf_guid.or_prior(&prior.cf_guid),
            cf_space_guid: desired.cf_space_guid.or_prior(&prior.cf_space_guid),
            cf_organization_guid: desired
                .cf_organization_guid
                .or_prior(&prior.cf_organization_guid),
            image_url: desired.image_url.or_prior(&prior.image_url),
        }
    }

    fn needs_update_call(&self, desired: &Instance, observed: &Instance) -> bool {
        scalar_changed(&desired.name, &observed.name)
            || scalar_changed(&desired.plan, &observed.plan)
            || scalar_changed(&desired.version, &observed.version)
            || scalar_changed(&desired.plan_id, &observed.plan_id)
            || list_changed(&desired.acl, &observed.acl)
    }

    fn verify_update(&self, requested: &Instance, observed: &Instance) -> Result<()> {
        check_immutable("plan_id", &requested.plan_id, &observed.plan_id)
    }

    fn readiness(&self, response: &dsa::Instance) -> Readiness {
        let op = &response.last_operation;
        match op.state.as_str() {
            LastOperation::SUCCEEDED if op.kind == LastOperation::DELETE => Readiness::Gone,
            LastOperation::SUCCEEDED => Readiness::Ready,
            LastOperation::FAILED => Readiness::Failed(format!(
                "instance {} failed: {}",
                op.kind, op.description
            )),
            _ => Readiness::Pending,
        }
    }

    async fn complete_import(&self, mut model: Instance) -> Result<Instance> {
        let plan_id = model
            .plan_id
            .value()
            .cloned()
            .ok_or_else(|| EngineError::malformed("plan_id", "instance carries no plan id"))?;
        let offerings = self.offerings(&model.project_id).await?;
        let (plan, version) = offerings.plan_and_version(&plan_id).ok_or_else(|| {
            EngineError::malformed(
                "plan_id",
                format!("{:?} is not listed in the project offerings", plan_id),
            )
        })?;

        model.plan = Field::Value(plan.to_string());
        model.version = Field::Value(version.to_string());
        Ok(model)
    }

    async fn create(
        &self,
        desired: &Instance,
        request: dsa::ProvisionRequest,
    ) -> ApiResult<Issued<dsa::Instance, RemoteIdentity>> {
        let provisioned = self.client.provision(&desired.project_id, &request).await?;
        let identity = RemoteIdentity::new(desired.project_id.clone(), provisioned.instance_id);

        Ok(Issued::Accepted(OperationHandle::new(
            Operation::Create,
            Some(identity.clone()),
            identity,
        )))
    }

    async fn read(&self, identity: &RemoteIdentity) -> ApiResult<dsa::Instance> {
        self.client
            .get_instance(&identity.project_id, &identity.instance_id)
            .await
    }

    async fn update(
        &self,
        identity: &RemoteIdentity,
        request: dsa::UpdateInstanceRequest,
    ) -> ApiResult<Issued<dsa::Instance, RemoteIdentity>> {
        self.client
            .update_instance(&identity.project_id, &identity.instance_id, &request)
            .await?;

        Ok(Issued::Accepted(OperationHandle::new(
            Operation::Update,
            Some(identity.clone()),
            identity.clone(),
        )))
    }

    async fn delete(&self, identity: &RemoteIdentity) -> ApiResult<Issued<(), RemoteIdentity>> {
        self.client
            .deprovision(&identity.project_id, &identity.instance_id)
            .await?;

        Ok(Issued::Accepted(OperationHandle::new(
            Operation::Delete,
            Some(identity.clone()),
            identity.clone(),
        )))
    }

    async fn probe(&self, handle: &OperationHandle<RemoteIdentity>) -> ApiResult<dsa::Instance> {
        self.read(&handle.reference).await
    }
}
