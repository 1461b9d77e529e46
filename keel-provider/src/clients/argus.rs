//! Argus monitoring API: scrape jobs.

use std::collections::BTreeMap;

use keel_engine::ApiResult;
use serde::{Deserialize, Serialize};

use super::ApiClient;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

/// One group of targets sharing a label set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticConfig {
    pub targets: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,
}

/// Scrape job as sent on create and returned on read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeJob {
    pub job_name: String,
    pub scheme: String,
    pub metrics_path: String,
    pub scrape_interval: String,
    pub scrape_timeout: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuth>,
    #[serde(default)]
    pub static_configs: Vec<StaticConfig>,
}

/// Update body: every job setting except the name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateScrapeJob {
    pub scheme: String,
    pub metrics_path: String,
    pub scrape_interval: String,
    pub scrape_timeout: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<BTreeMap<String, Vec<String>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuth>,
    #[serde(default)]
    pub static_configs: Vec<StaticConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapeJobResponse {
    pub data: ScrapeJob,
}

/// Client for the Argus scrape config endpoints.
#[derive(Clone)]
pub struct ArgusClient {
    api: ApiClient,
}

impl ArgusClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn jobs_path(project_id: &str, instance_id: &str) -> String {
        format!(
            "/argus/v1/projects/{}/instances/{}/scrapeconfigs",
            project_id, instance_id
        )
    }

    fn job_path(project_id: &str, instance_id: &str, job_name: &str) -> String {
        format!("{}/{}", Self::jobs_path(project_id, instance_id), job_name)
    }

    /// Accepted asynchronously; the job becomes readable once applied.
    pub async fn create_job(
        &self,
        project_id: &str,
        instance_id: &str,
        job: &ScrapeJob,
    ) -> ApiResult<()> {
        self.api
            .post_accepted(&Self::jobs_path(project_id, instance_id), job)
            .await
    }

    pub async fn get_job(
        &self,
        project_id: &str,
        instance_id: &str,
        job_name: &str,
    ) -> ApiResult<ScrapeJob> {
        let response: ScrapeJobResponse = self
            .api
            .get(&Self::job_path(project_id, instance_id, job_name))
            .await?;
        Ok(response.data)
    }

    pub async fn update_job(
        &self,
        project_id: &str,
        instance_id: &str,
        job_name: &str,
        job: &UpdateScrapeJob,
    ) -> ApiResult<()> {
        self.api
            .put_accepted(&Self::job_path(project_id, instance_id, job_name), job)
            .await
    }

    pub async fn delete_job(
        &self,
        project_id: &str,
        instance_id: &str,
        job_name: &str,
    ) -> ApiResult<()> {
        self.api
            .delete(&Self::job_path(project_id, instance_id, job_name))
            .await
    }
}
