//! IaaS API: project networks.

use keel_engine::{ApiError, ApiResult};
use serde::{Deserialize, Serialize};

use super::ApiClient;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNetworkRequest {
    pub name: String,
    pub nameservers: Vec<String>,
    pub prefix_length_v4: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateNetworkRequest {
    pub name: String,
    pub nameservers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Network {
    pub network_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nameservers: Option<Vec<String>>,
    /// IPv4 prefixes in CIDR notation, e.g. `10.0.0.0/24`.
    #[serde(default)]
    pub prefixes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_ip: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NetworkList {
    #[serde(default)]
    pub items: Vec<Network>,
}

/// Client for the IaaS networks endpoints.
#[derive(Clone)]
pub struct IaasClient {
    api: ApiClient,
}

impl IaasClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn networks_path(project_id: &str) -> String {
        format!("/iaas/v1alpha/projects/{}/networks", project_id)
    }

    fn network_path(project_id: &str, network_id: &str) -> String {
        format!("{}/{}", Self::networks_path(project_id), network_id)
    }

    /// Request a network. Accepted asynchronously; the response carries no id.
    pub async fn create_network(
        &self,
        project_id: &str,
        request: &CreateNetworkRequest,
    ) -> ApiResult<()> {
        self.api
            .post_accepted(&Self::networks_path(project_id), request)
            .await
    }

    pub async fn list_networks(&self, project_id: &str) -> ApiResult<Vec<Network>> {
        let list: NetworkList = self.api.get(&Self::networks_path(project_id)).await?;
        Ok(list.items)
    }

    /// Look a network up by name; not found while no network carries it.
    pub async fn find_network(&self, project_id: &str, name: &str) -> ApiResult<Network> {
        self.list_networks(project_id)
            .await?
            .into_iter()
            .find(|n| n.name == name)
            .ok_or_else(|| ApiError::not_found(format!("no network named {:?}", name)))
    }

    pub async fn get_network(&self, project_id: &str, network_id: &str) -> ApiResult<Network> {
        self.api
            .get(&Self::network_path(project_id, network_id))
            .await
    }

    pub async fn update_network(
        &self,
        project_id: &str,
        network_id: &str,
        request: &UpdateNetworkRequest,
    ) -> ApiResult<Network> {
        self.api
            .put(&Self::network_path(project_id, network_id), request)
            .await
    }

    pub async fn delete_network(&self, project_id: &str, network_id: &str) -> ApiResult<()> {
        self.api
            .delete(&Self::network_path(project_id, network_id))
            .await
    }
}
