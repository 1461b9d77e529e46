//! Postgres Flex database user.
//!
//! Users cannot be modified; any change to username or roles means
//! replacing the user. The password is returned once, on create.
//!
//! A null username or role list stands for the default, so changes are
//! judged on effective values.

use std::time::Duration;

use async_trait::async_trait;
use keel_engine::identity::rules;
use keel_engine::mapper::{list_from_wire, present_list, sensitive};
use keel_engine::{
    ApiError, ApiResult, EngineError, Field, FieldList, ImportFormat, Issued, OperationHandle,
    PartRule, RemoteIdentity, ResourceKind, Result, Timeouts, WireMapper,
};
use serde::{Deserialize, Serialize};

use crate::clients::postgres_flex::{self, PostgresFlexClient};

pub struct UserDefaults;

impl UserDefaults {
    pub const USERNAME: &'static str = "psqluser";
    pub const ROLES: &'static [&'static str] = &["login"];
    pub const ALLOWED_ROLES: &'static [&'static str] = &["login", "createdb"];
    pub const MAX_USERNAME_LEN: usize = 63;
    pub const TIMEOUTS: Timeouts = Timeouts::uniform(Duration::from_secs(5 * 60));
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
        name: "user_id",
        validate: rules::non_empty,
    },
]);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub project_id: String,
    pub instance_id: String,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub id: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub username: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub roles: FieldList<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub password: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub host: Field<String>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub port: Field<i64>,
    #[serde(default, skip_serializing_if = "Field::is_unknown")]
    pub uri: Field<String>,
}

pub struct UserKind {
    client: PostgresFlexClient,
}

impl UserKind {
    pub fn new(client: PostgresFlexClient) -> Self {
        Self { client }
    }
}

fn effective_username(username: &Field<String>) -> String {
    username.clone().resolve_or(UserDefaults::USERNAME.to_string())
}

fn effective_roles(roles: &FieldList<String>) -> Vec<String> {
    let mut effective = match roles {
        Field::Value(_) => present_list(roles),
        _ => UserDefaults::ROLES.iter().map(|r| r.to_string()).collect(),
    };
    effective.sort();
    effective
}

/// A declared null keeps the observed value when that value is the default.
fn null_as_observed<T: Clone, E: PartialEq>(
    desired: Field<T>,
    prior: &Field<T>,
    effective: impl Fn(&Field<T>) -> E,
) -> Field<T> {
    match desired {
        Field::Null if effective(prior) == effective(&Field::Null) => prior.clone(),
        other => other.or_prior(prior),
    }
}

fn user_id(identity: &RemoteIdentity) -> ApiResult<&str> {
    identity
        .sub_id
        .as_deref()
        .ok_or_else(|| ApiError::Invalid(format!("{} carries no user id", identity)))
}

impl WireMapper for UserKind {
    type Model = User;
    type CreateRequest = postgres_flex::CreateUserRequest;
    type UpdateRequest = ();
    type Response = postgres_flex::UserResponse;

    fn to_wire_create(&self, desired: &User) -> Result<postgres_flex::CreateUserRequest> {
        Ok(postgres_flex::CreateUserRequest {
            username: effective_username(&desired.username),
            roles: effective_roles(&desired.roles),
        })
    }

    fn to_wire_update(&self, _desired: &User, _prior: &User) -> Result<()> {
        Err(EngineError::validation(
            "users cannot be changed in place; recreate the user",
        ))
    }

    fn from_wire(&self, response: postgres_flex::UserResponse, prior: &User) -> Result<User> {
        let item = response
            .item
            .ok_or_else(|| EngineError::malformed("item", "response carries no user"))?;

        // Only the create response carries the id and password; without a
        // prior id this must be that response.
        let creating = prior.id.value().is_none();
        let id = match item.id.or_else(|| prior.id.value().cloned()) {
            Some(id) => id,
            None => return Err(EngineError::malformed("id", "response carries no user id")),
        };
        if creating && item.password.is_none() {
            return Err(EngineError::malformed(
                "password",
                "create response carries no password",
            ));
        }

        Ok(User {
            project_id: prior.project_id.clone(),
            instance_id: prior.instance_id.clone(),
            id: Field::Value(id),
            username: match item.username {
                Some(username) => Field::Value(username),
                None => prior.username.clone(),
            },
            roles: match item.roles {
                Some(roles) => list_from_wire(Some(roles)),
                None => prior.roles.clone(),
            },
            password: sensitive(item.password, &prior.password),
            host: Field::from_option(item.host),
            port: Field::from_option(item.port),
            uri: sensitive(item.uri, &prior.uri),
        })
    }
}

#[async_trait]
impl ResourceKind for UserKind {
    type Reference = RemoteIdentity;

    fn name(&self) -> &'static str {
        "user"
    }

    fn import_format(&self) -> &'static ImportFormat {
        &IMPORT_FORMAT
    }

    fn timeouts(&self) -> Timeouts {
        UserDefaults::TIMEOUTS
    }

    fn identity(&self, model: &User) -> Option<RemoteIdentity> {
        model.id.value().map(|id| {
            RemoteIdentity::new(model.project_id.clone(), model.instance_id.clone()).with_sub(id)
        })
    }

    fn seed(&self, identity: &RemoteIdentity) -> User {
        User {
            project_id: identity.project_id.clone(),
            instance_id: identity.instance_id.clone(),
            id: Field::from_option(identity.sub_id.clone()),
            ..Default::default()
        }
    }

    fn validate(&self, desired: &User) -> Result<()> {
        rules::uuid(&desired.project_id)
            .map_err(|e| EngineError::validation(format!("project_id: {}", e)))?;
        rules::non_empty(&desired.instance_id)
            .map_err(|e| EngineError::validation(format!("instance_id: {}", e)))?;

        if let Some(username) = desired.username.value() {
            if username.is_empty() || username.len() > UserDefaults::MAX_USERNAME_LEN {
                return Err(EngineError::validation(format!(
                    "username must be 1-{} characters long",
                    UserDefaults::MAX_USERNAME_LEN
                )));
            }
        }

        for role in present_list(&desired.roles) {
            if !UserDefaults::ALLOWED_ROLES.contains(&role.as_str()) {
                return Err(EngineError::validation(format!(
                    "role {:?} is not one of {}",
                    role,
                    UserDefaults::ALLOWED_ROLES.join(", ")
                )));
            }
        }
        Ok(())
    }

    fn merge_prior(&self, desired: User, prior: &User) -> User {
        User {
            project_id: prior.project_id.clone(),
            instance_id: prior.instance_id.clone(),
            id: desired.id.or_prior(&prior.id),
            username: null_as_observed(desired.username, &prior.username, effective_username),
            roles: null_as_observed(desired.roles, &prior.roles, effective_roles),
            password: desired.password.or_prior(&prior.password),
            host: desired.host.or_prior(&prior.host),
            port: desired.port.or_prior(&prior.port),
            uri: desired.uri.or_prior(&prior.uri),
        }
    }

    fn needs_update_call(&self, desired: &User, observed: &User) -> bool {
        (!desired.username.is_unknown()
            && effective_username(&desired.username) != effective_username(&observed.username))
            || (!desired.roles.is_unknown()
                && effective_roles(&desired.roles) != effective_roles(&observed.roles))
    }

    async fn create(
        &self,
        desired: &User,
        request: postgres_flex::CreateUserRequest,
    ) -> ApiResult<Issued<postgres_flex::UserResponse, RemoteIdentity>> {
        let response = self
            .client
            .create_user(&desired.project_id, &desired.instance_id, &request)
            .await?;
        Ok(Issued::Complete(response))
    }

    async fn read(&self, identity: &RemoteIdentity) -> ApiResult<postgres_flex::UserResponse> {
        self.client
            .get_user(&identity.project_id, &identity.instance_id, user_id(identity)?)
            .await
    }

    async fn update(
        &self,
        _identity: &RemoteIdentity,
        _request: (),
    ) -> ApiResult<Issued<postgres_flex::UserResponse, RemoteIdentity>> {
        Err(ApiError::Status {
            code: 405,
            body: "users cannot be updated".to_string(),
        })
    }

    async fn delete(&self, identity: &RemoteIdentity) -> ApiResult<Issued<(), RemoteIdentity>> {
        self.client
            .delete_user(&identity.project_id, &identity.instance_id, user_id(identity)?)
            .await?;
        Ok(Issued::Complete(()))
    }

    async fn probe(
        &self,
        handle: &OperationHandle<RemoteIdentity>,
    ) -> ApiResult<postgres_flex::UserResponse> {
        self.read(&handle.reference).await
    }
}
