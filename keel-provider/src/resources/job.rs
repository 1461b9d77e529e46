//! Argus monitoring scrape job.
//!
//! The job name is the remote id. Target order is significant, label maps
//! are not.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use keel_engine::diff::scalar_changed;
use keel_engine::identity::rules;
use keel_engine::mapper::{list_from_wire, map_from_wire, present_list, present_map, sensitive};
use keel_engine::{
    ApiError, ApiResult, EngineError, Field, FieldList, FieldMap, ImportFormat, Issued, Operation,
    OperationHandle, PartRule, RemoteIdentity, ResourceKind, Result, Timeouts, WireMapper,
};
use serde::{Deserialize, Serialize};

use crate::clients::argus::{self, ArgusClient};

pub struct ScrapeDefaults;

impl ScrapeDefaults {
    pub const METRICS_PATH: &'static str = "/metrics";
    pub const SCHEME: &'static str = "https";
    pub const SCRAPE_INTERVAL: &'static str = "5m";
    pub const SCRAPE_TIMEOUT: &'static str = "2m";
    pub const SAML2_ENABLE_URL_PARAMETERS: bool = true;
    pub const TIMEOUTS: Timeouts = Timeouts::uniform(Duration::from_secs(10 * 60));
}

const SAML2_PARAM: &str = "saml2";
const SAML2_DISABLED: &str = "disabled";

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
        name: "name",
        validate: rules::job_name,
    },
]);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Saml2 {
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub enable_url_parameters: Field<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasicAuth {
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub username: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub password: Field<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Target {
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub urls: FieldList<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub labels: FieldMap<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub project_id: String,
    pub argus_instance_id: String,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub name: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub metrics_path: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub scheme: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub scrape_interval: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub scrape_timeout: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub saml2: Field<Saml2>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub basic_auth: Field<BasicAuth>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub targets: Field<Vec<Target>>,
}

impl Job {
    fn saml2_enabled(&self) -> bool {
        self.saml2
            .value()
            .and_then(|s| s.enable_url_parameters.value().copied())
            .unwrap_or(ScrapeDefaults::SAML2_ENABLE_URL_PARAMETERS)
    }
}

pub struct JobKind {
    client: ArgusClient,
}

impl JobKind {
    pub fn new(client: ArgusClient) -> Self {
        Self { client }
    }
}

fn job_name(identity: &RemoteIdentity) -> ApiResult<&str> {
    identity
        .sub_id
        .as_deref()
        .ok_or_else(|| ApiError::Invalid(format!("{} carries no job name", identity)))
}

/// Everything sent on create and update, except the name.
struct Settings {
    metrics_path: String,
    scheme: String,
    scrape_interval: String,
    scrape_timeout: String,
    params: Option<BTreeMap<String, Vec<String>>>,
    basic_auth: Option<argus::BasicAuth>,
    static_configs: Vec<argus::StaticConfig>,
}

impl Settings {
    fn effective(job: &Job) -> Self {
        let params = (!job.saml2_enabled()).then(|| {
            BTreeMap::from([(SAML2_PARAM.to_string(), vec![SAML2_DISABLED.to_string()])])
        });

        let basic_auth = job.basic_auth.value().and_then(|auth| {
            Some(argus::BasicAuth {
                username: auth.username.value()?.clone(),
                password: auth.password.value()?.clone(),
            })
        });

        let static_configs = job
            .targets
            .value()
            .map(|targets| {
                targets
                    .iter()
                    .map(|t| argus::StaticConfig {
                        targets: present_list(&t.urls),
                        labels: t.labels.value().map(|_| present_map(&t.labels)),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            metrics_path: job
                .metrics_path
                .clone()
                .resolve_or(ScrapeDefaults::METRICS_PATH.to_string()),
            scheme: job.scheme.clone().resolve_or(ScrapeDefaults::SCHEME.to_string()),
            scrape_interval: job
                .scrape_interval
                .clone()
                .resolve_or(ScrapeDefaults::SCRAPE_INTERVAL.to_string()),
            scrape_timeout: job
                .scrape_timeout
                .clone()
                .resolve_or(ScrapeDefaults::SCRAPE_TIMEOUT.to_string()),
            params,
            basic_auth,
            static_configs,
        }
    }

    /// Comparable form for the diff gate: the basic auth password is
    /// sensitive and never compared, and absent label maps equal empty ones.
    fn comparable(mut self) -> Self {
        if let Some(auth) = &mut self.basic_auth {
            auth.password.clear();
        }
        for config in &mut self.static_configs {
            if config.labels.as_ref().is_some_and(BTreeMap::is_empty) {
                config.labels = None;
            }
        }
        self
    }

    fn differs(&self, other: &Self) -> bool {
        self.metrics_path != other.metrics_path
            || self.scheme != other.scheme
            || self.scrape_interval != other.scrape_interval
            || self.scrape_timeout != other.scrape_timeout
            || self.params != other.params
            || self.basic_auth != other.basic_auth
            || self.static_configs != other.static_configs
    }
}

fn required_name(job: &Job) -> Result<String> {
    job.name
        .value()
        .cloned()
        .ok_or_else(|| EngineError::validation("name is required"))
}

fn saml2_from_wire(params: Option<&BTreeMap<String, Vec<String>>>, prior: &Field<Saml2>) -> Field<Saml2> {
    if params.is_none() && prior.value().is_none() {
        return Field::Null;
    }
    let disabled = params
        .and_then(|p| p.get(SAML2_PARAM))
        .is_some_and(|v| v.len() == 1 && v[0] == SAML2_DISABLED);

    Field::Value(Saml2 {
        enable_url_parameters: Field::Value(!disabled),
    })
}

fn basic_auth_from_wire(auth: Option<argus::BasicAuth>, prior: &Field<BasicAuth>) -> Field<BasicAuth> {
    let Some(auth) = auth else {
        return Field::Null;
    };
    let prior_password = prior
        .value()
        .map(|p| p.password.clone())
        .unwrap_or_default();

    Field::Value(BasicAuth {
        username: Field::Value(auth.username),
        password: sensitive(
            (!auth.password.is_empty()).then_some(auth.password),
            &prior_password,
        ),
    })
}

fn targets_from_wire(configs: Vec<argus::StaticConfig>, prior: &Field<Vec<Target>>) -> Field<Vec<Target>> {
    if configs.is_empty() && prior.value().is_none() {
        return Field::Null;
    }
    let prior_targets = prior.value().map(Vec::as_slice).unwrap_or_default();

    let targets = configs
        .into_iter()
        .enumerate()
        .map(|(i, config)| {
            let prior_labels = prior_targets.get(i).map(|t| &t.labels);
            let labels = match config.labels {
                Some(labels) if !labels.is_empty() => map_from_wire(Some(labels)),
                _ if matches!(prior_labels, Some(Field::Value(_))) => Field::Value(BTreeMap::new()),
                _ => Field::Null,
            };
            Target {
                urls: list_from_wire(Some(config.targets)),
                labels,
            }
        })
        .collect();
    Field::Value(targets)
}

impl WireMapper for JobKind {
    type Model = Job;
    type CreateRequest = argus::ScrapeJob;
    type UpdateRequest = argus::UpdateScrapeJob;
    type Response = argus::ScrapeJob;

    fn to_wire_create(&self, desired: &Job) -> Result<argus::ScrapeJob> {
        let s = Settings::effective(desired);
        Ok(argus::ScrapeJob {
            job_name: required_name(desired)?,
            scheme: s.scheme,
            metrics_path: s.metrics_path,
            scrape_interval: s.scrape_interval,
            scrape_timeout: s.scrape_timeout,
            params: s.params,
            basic_auth: s.basic_auth,
            static_configs: s.static_configs,
        })
    }

    fn to_wire_update(&self, desired: &Job, prior: &Job) -> Result<argus::UpdateScrapeJob> {
        if scalar_changed(&desired.name, &prior.name) {
            return Err(EngineError::validation(
                "name cannot be changed in place; recreate the scrape job",
            ));
        }

        let s = Settings::effective(desired);
        Ok(argus::UpdateScrapeJob {
            scheme: s.scheme,
            metrics_path: s.metrics_path,
            scrape_interval: s.scrape_interval,
            scrape_timeout: s.scrape_timeout,
            params: s.params,
            basic_auth: s.basic_auth,
            static_configs: s.static_configs,
        })
    }

    fn from_wire(&self, response: argus::ScrapeJob, prior: &Job) -> Result<Job> {
        Ok(Job {
            project_id: prior.project_id.clone(),
            argus_instance_id: prior.argus_instance_id.clone(),
            name: Field::Value(response.job_name),
            metrics_path: Field::Value(response.metrics_path),
            scheme: Field::Value(response.scheme),
            scrape_interval: Field::Value(response.scrape_interval),
            scrape_timeout: Field::Value(response.scrape_timeout),
            saml2: saml2_from_wire(response.params.as_ref(), &prior.saml2),
            basic_auth: basic_auth_from_wire(response.basic_auth, &prior.basic_auth),
            targets: targets_from_wire(response.static_configs, &prior.targets),
        })
    }
}

#[async_trait]
impl ResourceKind for JobKind {
    type Reference = RemoteIdentity;

    fn name(&self) -> &'static str {
        "scrape job"
    }

    fn import_format(&self) -> &'static ImportFormat {
        &IMPORT_FORMAT
    }

    fn timeouts(&self) -> Timeouts {
        ScrapeDefaults::TIMEOUTS
    }

    fn identity(&self, model: &Job) -> Option<RemoteIdentity> {
        model.name.value().map(|name| {
            RemoteIdentity::new(model.project_id.clone(), model.argus_instance_id.clone())
                .with_sub(name)
        })
    }

    fn seed(&self, identity: &RemoteIdentity) -> Job {
        Job {
            project_id: identity.project_id.clone(),
            argus_instance_id: identity.instance_id.clone(),
            name: Field::from_option(identity.sub_id.clone()),
            ..Default::default()
        }
    }

    fn validate(&self, desired: &Job) -> Result<()> {
        rules::uuid(&desired.project_id)
            .map_err(|e| EngineError::validation(format!("project_id: {}", e)))?;
        rules::non_empty(&desired.argus_instance_id)
            .map_err(|e| EngineError::validation(format!("argus_instance_id: {}", e)))?;

        match desired.name.value() {
            Some(name) => rules::job_name(name)
                .map_err(|e| EngineError::validation(format!("name: {}", e)))?,
            None if desired.name.is_null() => {
                return Err(EngineError::validation("name is required"))
            }
            None => {}
        }

        if let Some(scheme) = desired.scheme.value() {
            if scheme != "http" && scheme != "https" {
                return Err(EngineError::validation(format!(
                    "scheme must be http or https, got {:?}",
                    scheme
                )));
            }
        }

        for target in desired.targets.value().into_iter().flatten() {
            if present_list(&target.urls).iter().any(|u| u.trim().is_empty()) {
                return Err(EngineError::validation("target urls must not be empty"));
            }
        }
        Ok(())
    }

    fn merge_prior(&self, desired: Job, prior: &Job) -> Job {
        // A declared basic auth block without a password keeps the recorded one.
        let basic_auth = match (desired.basic_auth, prior.basic_auth.value()) {
            (Field::Value(mut auth), Some(prior_auth)) => {
                auth.password = auth.password.or_prior(&prior_auth.password);
                Field::Value(auth)
            }
            (other, _) => other.or_prior(&prior.basic_auth),
        };

        Job {
            project_id: prior.project_id.clone(),
            argus_instance_id: prior.argus_instance_id.clone(),
            name: desired.name.or_prior(&prior.name),
            metrics_path: desired.metrics_path.or_prior(&prior.metrics_path),
            scheme: desired.scheme.or_prior(&prior.scheme),
            scrape_interval: desired.scrape_interval.or_prior(&prior.scrape_interval),
            scrape_timeout: desired.scrape_timeout.or_prior(&prior.scrape_timeout),
            saml2: desired.saml2.or_prior(&prior.saml2),
            basic_auth,
            targets: desired.targets.or_prior(&prior.targets),
        }
    }

    fn needs_update_call(&self, desired: &Job, observed: &Job) -> bool {
        scalar_changed(&desired.name, &observed.name)
            || Settings::effective(desired)
                .comparable()
                .differs(&Settings::effective(observed).comparable())
    }

    async fn create(
        &self,
        desired: &Job,
        request: argus::ScrapeJob,
    ) -> ApiResult<Issued<argus::ScrapeJob, RemoteIdentity>> {
        self.client
            .create_job(&desired.project_id, &desired.argus_instance_id, &request)
            .await?;

        let identity = RemoteIdentity::new(
            desired.project_id.clone(),
            desired.argus_instance_id.clone(),
        )
        .with_sub(request.job_name);
        Ok(Issued::Accepted(OperationHandle::new(
            Operation::Create,
            Some(identity.clone()),
            identity,
        )))
    }

    async fn read(&self, identity: &RemoteIdentity) -> ApiResult<argus::ScrapeJob> {
        self.client
            .get_job(&identity.project_id, &identity.instance_id, job_name(identity)?)
            .await
    }

    async fn update(
        &self,
        identity: &RemoteIdentity,
        request: argus::UpdateScrapeJob,
    ) -> ApiResult<Issued<argus::ScrapeJob, RemoteIdentity>> {
        self.client
            .update_job(
                &identity.project_id,
                &identity.instance_id,
                job_name(identity)?,
                &request,
            )
            .await?;

        Ok(Issued::Accepted(OperationHandle::new(
            Operation::Update,
            Some(identity.clone()),
            identity.clone(),
        )))
    }

    async fn delete(&self, identity: &RemoteIdentity) -> ApiResult<Issued<(), RemoteIdentity>> {
        self.client
            .delete_job(&identity.project_id, &identity.instance_id, job_name(identity)?)
            .await?;

        Ok(Issued::Accepted(OperationHandle::new(
            Operation::Delete,
            Some(identity.clone()),
            identity.clone(),
        )))
    }

    async fn probe(&self, handle: &OperationHandle<RemoteIdentity>) -> ApiResult<argus::ScrapeJob> {
        self.read(&handle.reference).await
    }
}
