//! Postgres Flex API: database users.

use keel_engine::ApiResult;
use serde::{Deserialize, Serialize};

use super::ApiClient;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub roles: Vec<String>,
}

/// User record. The password and connection URI are only present in the
/// create response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item: Option<User>,
}

/// Client for the Postgres Flex user endpoints.
#[derive(Clone)]
pub struct PostgresFlexClient {
    api: ApiClient,
}

impl PostgresFlexClient {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    fn users_path(project_id: &str, instance_id: &str) -> String {
        format!(
            "/postgres/v1/projects/{}/instances/{}/users",
            project_id, instance_id
        )
    }

    /// Create a user. Synchronous; the response is the only one carrying
    /// the password.
    pub async fn create_user(
        &self,
        project_id: &str,
        instance_id: &str,
        request: &CreateUserRequest,
    ) -> ApiResult<UserResponse> {
        self.api
            .post(&Self::users_path(project_id, instance_id), request)
            .await
    }

    pub async fn get_user(
        &self,
        project_id: &str,
        instance_id: &str,
        user_id: &str,
    ) -> ApiResult<UserResponse> {
        self.api
            .get(&format!(
                "{}/{}",
                Self::users_path(project_id, instance_id),
                user_id
            ))
            .await
    }

    pub async fn delete_user(
        &self,
        project_id: &str,
        instance_id: &str,
        user_id: &str,
    ) -> ApiResult<()> {
        self.api
            .delete(&format!(
                "{}/{}",
                Self::users_path(project_id, instance_id),
                user_id
            ))
            .await
    }
}
