//! Network resource: IaaS project networks.
//!
//! Creation is asynchronous and the create response carries no id, so the
//! create operation is tracked by looking the network up by name.
//!
//! The IPv4 prefix length is fixed at creation. The server may round the
//! requested length, so the observed value is whatever the first prefix
//! reports and updates never send or compare it.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use keel_engine::diff::{list_changed, scalar_changed};
use keel_engine::identity::rules;
use keel_engine::mapper::{list_from_wire, parse_suffix, present_list};
use keel_engine::{
    ApiResult, EngineError, Field, FieldList, ImportFormat, Issued, Operation, OperationHandle,
    PartRule, RemoteIdentity, ResourceKind, Result, Timeouts, WireMapper,
};
use serde::{Deserialize, Serialize};

use crate::clients::iaas::{self, IaasClient};

/// Defaults applied when the desired state leaves a field unset.
pub struct NetworkDefaults;

impl NetworkDefaults {
    /// Assumed when the remote side reports no prefix at all.
    pub const PREFIX_LENGTH_V4: i64 = 25;
    pub const TIMEOUTS: Timeouts = Timeouts::uniform(Duration::from_secs(5 * 60));
}

static IMPORT_FORMAT: ImportFormat = ImportFormat::new(&[
    PartRule {
        name: "project_id",
        validate: rules::uuid,
    },
    PartRule {
        name: "network_id",
        validate: rules::uuid,
    },
]);

/// Desired and observed state of a network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub network_id: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub name: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub nameservers: FieldList<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub prefix_length_v4: Field<i64>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub public_ip: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub prefixes: FieldList<String>,
}

/// How an accepted network operation is probed.
#[derive(Debug)]
pub enum NetworkProbe {
    /// The id is not known until the network shows up in the project listing.
    ByName { project_id: String, name: String },
    ById(RemoteIdentity),
}

pub struct NetworkKind {
    client: IaasClient,
}

impl NetworkKind {
    pub fn new(client: IaasClient) -> Self {
        Self { client }
    }
}

impl WireMapper for NetworkKind {
    type Model = Network;
    type CreateRequest = iaas::CreateNetworkRequest;
    type UpdateRequest = iaas::UpdateNetworkRequest;
    type Response = iaas::Network;

    fn to_wire_create(&self, desired: &Network) -> Result<iaas::CreateNetworkRequest> {
        Ok(iaas::CreateNetworkRequest {
            name: required_name(desired)?,
            nameservers: present_list(&desired.nameservers),
            prefix_length_v4: desired
                .prefix_length_v4
                .clone()
                .resolve_or(NetworkDefaults::PREFIX_LENGTH_V4),
        })
    }

    fn to_wire_update(&self, desired: &Network, _prior: &Network) -> Result<iaas::UpdateNetworkRequest> {
        Ok(iaas::UpdateNetworkRequest {
            name: required_name(desired)?,
            nameservers: present_list(&desired.nameservers),
        })
    }

    fn from_wire(&self, response: iaas::Network, prior: &Network) -> Result<Network> {
        // Only the first prefix is considered; the API does not return the
        // requested length directly.
        let prefix_length_v4 = match response.prefixes.first() {
            Some(prefix) => parse_suffix::<i64>(prefix, '/', "prefix_length_v4")?,
            None => NetworkDefaults::PREFIX_LENGTH_V4,
        };

        let nameservers = match response.nameservers {
            Some(ns) if !ns.is_empty() => list_from_wire(Some(ns)),
            _ if prior.nameservers.is_null() => Field::Null,
            _ => Field::Value(Vec::new()),
        };

        Ok(Network {
            project_id: prior.project_id.clone(),
            network_id: Field::Value(response.network_id),
            name: Field::Value(response.name),
            nameservers,
            prefix_length_v4: Field::Value(prefix_length_v4),
            public_ip: Field::from_option(response.public_ip),
            prefixes: list_from_wire(Some(response.prefixes)),
        })
    }
}

fn required_name(desired: &Network) -> Result<String> {
    desired
        .name
        .value()
        .cloned()
        .ok_or_else(|| EngineError::validation("name is required"))
}

#[async_trait]
impl ResourceKind for NetworkKind {
    type Reference = NetworkProbe;

    fn name(&self) -> &'static str {
        "network"
    }

    fn import_format(&self) -> &'static ImportFormat {
        &IMPORT_FORMAT
    }

    fn timeouts(&self) -> Timeouts {
        NetworkDefaults::TIMEOUTS
    }

    fn identity(&self, model: &Network) -> Option<RemoteIdentity> {
        model
            .network_id
            .value()
            .map(|id| RemoteIdentity::new(model.project_id.clone(), id.clone()))
    }

    fn seed(&self, identity: &RemoteIdentity) -> Network {
        Network {
            project_id: identity.project_id.clone(),
            network_id: Field::Value(identity.instance_id.clone()),
            ..Default::default()
        }
    }

    fn validate(&self, desired: &Network) -> Result<()> {
        rules::uuid(&desired.project_id)
            .map_err(|e| EngineError::validation(format!("project_id: {}", e)))?;

        match desired.name.value() {
            Some(name) if !name.trim().is_empty() => {}
            Some(_) => return Err(EngineError::validation("name must not be empty")),
            None if desired.name.is_unknown() => {}
            None => return Err(EngineError::validation("name is required")),
        }

        if let Some(len) = desired.prefix_length_v4.value() {
            if !(1..=32).contains(len) {
                return Err(EngineError::validation(format!(
                    "prefix_length_v4 must be between 1 and 32, got {}",
                    len
                )));
            }
        }

        for ns in present_list(&desired.nameservers) {
            ns.parse::<IpAddr>().map_err(|_| {
                EngineError::validation(format!("nameserver {:?} is not an IP address", ns))
            })?;
        }

        Ok(())
    }

    fn merge_prior(&self, desired: Network, prior: &Network) -> Network {
        Network {
            project_id: prior.project_id.clone(),
            network_id: desired.network_id.or_prior(&prior.network_id),
            name: desired.name.or_prior(&prior.name),
            nameservers: desired.nameservers.or_prior(&prior.nameservers),
            // Create-only and derived by the server: the observed length stands.
            prefix_length_v4: match prior.prefix_length_v4 {
                Field::Value(_) => prior.prefix_length_v4.clone(),
                _ => desired.prefix_length_v4,
            },
            public_ip: desired.public_ip.or_prior(&prior.public_ip),
            prefixes: desired.prefixes.or_prior(&prior.prefixes),
        }
    }

    fn needs_update_call(&self, desired: &Network, observed: &Network) -> bool {
        scalar_changed(&desired.name, &observed.name)
            || list_changed(&desired.nameservers, &observed.nameservers)
    }

    async fn create(
        &self,
        desired: &Network,
        request: iaas::CreateNetworkRequest,
    ) -> ApiResult<Issued<iaas::Network, NetworkProbe>> {
        self.client
            .create_network(&desired.project_id, &request)
            .await?;

        Ok(Issued::Accepted(OperationHandle::new(
            Operation::Create,
            None,
            NetworkProbe::ByName {
                project_id: desired.project_id.clone(),
                name: request.name,
            },
        )))
    }

    async fn read(&self, identity: &RemoteIdentity) -> ApiResult<iaas::Network> {
        self.client
            .get_network(&identity.project_id, &identity.instance_id)
            .await
    }

    async fn update(
        &self,
        identity: &RemoteIdentity,
        request: iaas::UpdateNetworkRequest,
    ) -> ApiResult<Issued<iaas::Network, NetworkProbe>> {
        let network = self
            .client
            .update_network(&identity.project_id, &identity.instance_id, &request)
            .await?;
        Ok(Issued::Complete(network))
    }

    async fn delete(&self, identity: &RemoteIdentity) -> ApiResult<Issued<(), NetworkProbe>> {
        self.client
            .delete_network(&identity.project_id, &identity.instance_id)
            .await?;

        Ok(Issued::Accepted(OperationHandle::new(
            Operation::Delete,
            Some(identity.clone()),
            NetworkProbe::ById(identity.clone()),
        )))
    }

    async fn probe(&self, handle: &OperationHandle<NetworkProbe>) -> ApiResult<iaas::Network> {
        match &handle.reference {
            NetworkProbe::ByName { project_id, name } => {
                self.client.find_network(project_id, name).await
            }
            NetworkProbe::ById(identity) => self.read(identity).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{ApiClient, ClientConfig};

    const PROJECT: &str = "7c3a3f3e-3f0c-4a44-a7f1-0d7f4d4b3c1a";
    const NETWORK: &str = "0b0f7e45-4c8e-4a3b-9f34-3f0a9a9e5c11";

    fn kind() -> NetworkKind {
        let api = ApiClient::new(&ClientConfig::new("http://127.0.0.1:9")).unwrap();
        NetworkKind::new(IaasClient::new(api))
    }

    fn desired() -> Network {
        Network {
            project_id: PROJECT.to_string(),
            name: "net".into(),
            nameservers: Field::Null,
            ..Default::default()
        }
    }

    fn wire(prefixes: &[&str]) -> iaas::Network {
        iaas::Network {
            network_id: NETWORK.to_string(),
            name: "net".to_string(),
            nameservers: None,
            prefixes: prefixes.iter().map(|p| p.to_string()).collect(),
            public_ip: Some("192.0.2.10".to_string()),
        }
    }

    #[test]
    fn test_create_request_defaults() {
        let request = kind().to_wire_create(&desired()).unwrap();
        assert!(request.nameservers.is_empty());
        assert_eq!(request.prefix_length_v4, 25);
    }

    #[test]
    fn test_observed_prefix_length_overrides_request() {
        let k = kind();
        let mut plan = desired();
        plan.prefix_length_v4 = Field::Value(25);

        let request = k.to_wire_create(&plan).unwrap();
        assert_eq!(request.prefix_length_v4, 25);
        assert!(request.nameservers.is_empty());

        let observed = k.from_wire(wire(&["10.0.0.0/24"]), &plan).unwrap();
        assert_eq!(observed.prefix_length_v4, Field::Value(24));
        assert_eq!(observed.network_id, Field::Value(NETWORK.to_string()));
        assert!(observed.nameservers.is_null());
        assert_eq!(observed.public_ip, Field::Value("192.0.2.10".to_string()));
    }

    #[test]
    fn test_missing_prefixes_fall_back_to_default() {
        let observed = kind().from_wire(wire(&[]), &desired()).unwrap();
        assert_eq!(observed.prefix_length_v4, Field::Value(25));
    }

    #[test]
    fn test_malformed_prefix_is_rejected() {
        match kind().from_wire(wire(&["10.0.0.0"]), &desired()) {
            Err(EngineError::MalformedRemoteValue { field, .. }) => {
                assert_eq!(field, "prefix_length_v4")
            }
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_nameserver_nulls_are_skipped() {
        let mut plan = desired();
        plan.nameservers = Field::Value(vec!["1.1.1.1".into(), Field::Null, "8.8.8.8".into()]);
        let request = kind().to_wire_create(&plan).unwrap();
        assert_eq!(request.nameservers, vec!["1.1.1.1", "8.8.8.8"]);
    }

    #[test]
    fn test_diff_ignores_derived_fields() {
        let k = kind();
        let observed = k.from_wire(wire(&["10.0.0.0/25"]), &desired()).unwrap();

        let mut plan = observed.clone();
        plan.public_ip = Field::Value("198.51.100.1".to_string());
        plan.prefixes = Field::Unknown;
        assert!(!k.needs_update_call(&plan, &observed));

        plan.nameservers = Field::Value(vec!["9.9.9.9".into()]);
        assert!(k.needs_update_call(&plan, &observed));
    }

    #[test]
    fn test_prefix_length_is_not_updated_in_place() {
        let k = kind();
        let mut requested = desired();
        requested.prefix_length_v4 = Field::Value(25);
        let prior = k.from_wire(wire(&["10.0.0.0/24"]), &requested).unwrap();

        for declared in [Field::Value(25), Field::Value(22), Field::Null, Field::Unknown] {
            let mut plan = requested.clone();
            plan.prefix_length_v4 = declared;
            let merged = k.merge_prior(plan, &prior);
            assert_eq!(merged.prefix_length_v4, Field::Value(24));
            assert!(!k.needs_update_call(&merged, &prior));
        }

        let mut renamed = k.merge_prior(requested, &prior);
        renamed.name = "net-2".into();
        assert!(k.needs_update_call(&renamed, &prior));
        assert_eq!(k.to_wire_update(&renamed, &prior).unwrap().name, "net-2");
    }

    #[test]
    fn test_validate_rejects_bad_nameserver() {
        let mut plan = desired();
        plan.nameservers = Field::Value(vec!["dns.example".into()]);
        assert!(kind().validate(&plan).is_err());
        assert!(kind().validate(&desired()).is_ok());
    }

    #[test]
    fn test_model_json_round_trip_keeps_null_and_unknown() {
        let json = format!(r#"{{"project_id":"{}","name":"net","nameservers":null}}"#, PROJECT);
        let model: Network = serde_json::from_str(&json).unwrap();
        assert!(model.nameservers.is_null());
        assert!(model.prefix_length_v4.is_unknown());
        assert_eq!(serde_json::to_string(&model).unwrap(), json);
    }
}
