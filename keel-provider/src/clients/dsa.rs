//! Data services API: managed service instances, their credentials and
//! offerings.

use keel_engine::ApiResult;
use serde::{Deserialize, Serialize};

use super::ApiClient;

/// Service parameters. The ACL travels as one comma separated string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sgw_acl: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionRequest {
    pub instance_name: String,
    pub plan_id: String,
    pub parameters: InstanceParameters,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionResponse {
    pub instance_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInstanceRequest {
    pub plan_id: String,
    pub parameters: InstanceParameters,
}

/// State of the most recent operation on an instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastOperation {
    /// `create`, `update` or `delete`.
    #[serde(rename = "type")]
    pub kind: String,
    /// `in progress`, `succeeded` or `failed`.
    pub state: String,
    #[serde(default)]
    pub description: String,
}

impl LastOperation {
    pub const SUCCEEDED: &'static str = "succeeded";
    pub const FAILED: &'static str = "failed";
    pub const DELETE: &'static str = "delete";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub instance_id: String,
    pub name: String,
    pub plan_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dashboard_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cf_guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cf_space_guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_guid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default)]
    pub parameters: InstanceParameters,
    pub last_operation: LastOperation,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offering {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub plans: Vec<Plan>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Offerings {
    #[serde(default)]
    pub offerings: Vec<Offering>,
}

impl Offerings {
    /// Plan id for a (plan name, version) pair.
    pub fn plan_id(&self, plan: &str, version: &str) -> Option<&str> {
        self.offerings
            .iter()
            .filter(|o| o.version == version)
            .flat_map(|o| o.plans.iter())
            .find(|p| p.name == plan)
            .map(|p| p.id.as_str())
    }

    /// (plan name, version) for a plan id.
    pub fn plan_and_version(&self, plan_id: &str) -> Option<(&str, &str)> {
        self.offerings.iter().find_map(|o| {
            o.plans
                .iter()
                .find(|p| p.id == plan_id)
                .map(|p| (p.name.as_str(), o.version.as_str()))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateCredentialResponse {
    pub id: String,
}

/// Connection details of one credential.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCredential {
    #[serde(default)]
    pub credentials: CredentialDetails,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub id: String,
    #[serde(default)]
    pub raw: RawCredential,
}

/// Client for the data services instance endpoints.
#[derive(Clone)]
pub struct DsaClient {
    api: ApiClient,
}

impl DsaClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn instances_path(project_id: &str) -> String {
        format!("/v1/projects/{}/instances", project_id)
    }

    fn instance_path(project_id: &str, instance_id: &str) -> String {
        format!("{}/{}", Self::instances_path(project_id), instance_id)
    }

    pub async fn provision(
        &self,
        project_id: &str,
        request: &ProvisionRequest,
    ) -> ApiResult<ProvisionResponse> {
        self.api
            .post(&Self::instances_path(project_id), request)
            .await
    }

    pub async fn get_instance(&self, project_id: &str, instance_id: &str) -> ApiResult<Instance> {
        self.api
            .get(&Self::instance_path(project_id, instance_id))
            .await
    }

    pub async fn update_instance(
        &self,
        project_id: &str,
        instance_id: &str,
        request: &UpdateInstanceRequest,
    ) -> ApiResult<()> {
        self.api
            .patch_accepted(&Self::instance_path(project_id, instance_id), request)
            .await
    }

    pub async fn deprovision(&self, project_id: &str, instance_id: &str) -> ApiResult<()> {
        self.api
            .delete(&Self::instance_path(project_id, instance_id))
            .await
    }

    fn credentials_path(project_id: &str, instance_id: &str) -> String {
        format!("{}/credentials", Self::instance_path(project_id, instance_id))
    }

    /// Request a new credential. It becomes readable once provisioned.
    pub async fn create_credential(
        &self,
        project_id: &str,
        instance_id: &str,
    ) -> ApiResult<CreateCredentialResponse> {
        self.api
            .post(
                &Self::credentials_path(project_id, instance_id),
                &serde_json::json!({}),
            )
            .await
    }

    pub async fn get_credential(
        &self,
        project_id: &str,
        instance_id: &str,
        credential_id: &str,
    ) -> ApiResult<Credential> {
        self.api
            .get(&format!(
                "{}/{}",
                Self::credentials_path(project_id, instance_id),
                credential_id
            ))
            .await
    }

    pub async fn delete_credential(
        &self,
        project_id: &str,
        instance_id: &str,
        credential_id: &str,
    ) -> ApiResult<()> {
        self.api
            .delete(&format!(
                "{}/{}",
                Self::credentials_path(project_id, instance_id),
                credential_id
            ))
            .await
    }

    pub async fn offerings(&self, project_id: &str) -> ApiResult<Offerings> {
        self.api
            .get(&format!("/v1/projects/{}/offerings", project_id))
            .await
    }
}
