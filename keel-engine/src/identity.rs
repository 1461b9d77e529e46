//! Remote identity and import identifier parsing.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Separator between the parts of an import identifier.
pub const DELIMITER: char = ',';

/// Addressing tuple for a resource on the remote API.
///
/// `instance_id` is the primary remote object (network, service instance);
/// `sub_id` is an object nested in it (database user, scrape job).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteIdentity {
    pub project_id: String,
    pub instance_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_id: Option<String>,
}

impl RemoteIdentity {
    pub fn new(project_id: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            instance_id: instance_id.into(),
            sub_id: None,
        }
    }

    pub fn with_sub(mut self, sub_id: impl Into<String>) -> Self {
        self.sub_id = Some(sub_id.into());
        self
    }

    fn parts(&self) -> Vec<&str> {
        let mut parts = vec![self.project_id.as_str(), self.instance_id.as_str()];
        if let Some(sub) = &self.sub_id {
            parts.push(sub);
        }
        parts
    }
}

impl fmt::Display for RemoteIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.parts().join(","))
    }
}

/// Split an import identifier into a [`RemoteIdentity`].
///
/// Two parts yield `project,instance`; three parts add the sub-resource id.
pub fn parse(raw: &str, expected_parts: usize) -> Result<RemoteIdentity> {
    if !(2..=3).contains(&expected_parts) {
        return Err(EngineError::MalformedImportIdentifier(format!(
            "unsupported import identifier arity {}",
            expected_parts
        )));
    }

    let parts: Vec<&str> = raw.split(DELIMITER).collect();
    if parts.len() != expected_parts || parts.iter().any(|p| p.is_empty()) {
        return Err(EngineError::MalformedImportIdentifier(format!(
            "expected {} non-empty parts separated by '{}', got {:?}",
            expected_parts, DELIMITER, raw
        )));
    }

    let mut identity = RemoteIdentity::new(parts[0], parts[1]);
    if let Some(sub) = parts.get(2) {
        identity.sub_id = Some(sub.to_string());
    }
    Ok(identity)
}

/// Validation rule for one part of an import identifier.
pub struct PartRule {
    pub name: &'static str,
    pub validate: fn(&str) -> std::result::Result<(), String>,
}

/// Import identifier format of one resource kind.
pub struct ImportFormat {
    parts: &'static [PartRule],
}

impl ImportFormat {
    pub const fn new(parts: &'static [PartRule]) -> Self {
        Self { parts }
    }

    /// Human readable format, e.g. `project_id,network_id`.
    pub fn describe(&self) -> String {
        self.parts
            .iter()
            .map(|p| p.name)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parse and validate each part; the first failing part aborts.
    pub fn parse(&self, raw: &str) -> Result<RemoteIdentity> {
        let identity = parse(raw, self.parts.len()).map_err(|_| {
            EngineError::MalformedImportIdentifier(format!(
                "Expected import identifier with format: `{}`.\nInstead got: {:?}",
                self.describe(),
                raw
            ))
        })?;

        for (rule, value) in self.parts.iter().zip(identity.parts()) {
            (rule.validate)(value).map_err(|e| {
                EngineError::MalformedImportIdentifier(format!(
                    "Couldn't validate {}.\n{}",
                    rule.name, e
                ))
            })?;
        }

        Ok(identity)
    }
}

/// Part validators shared by the resource kinds.
pub mod rules {
    /// Project, network and service instance ids are UUIDs.
    pub fn uuid(value: &str) -> Result<(), String> {
        uuid::Uuid::parse_str(value)
            .map(|_| ())
            .map_err(|e| format!("{:?} is not a valid UUID: {}", value, e))
    }

    pub fn non_empty(value: &str) -> Result<(), String> {
        if value.trim().is_empty() {
            return Err("value must not be empty".to_string());
        }
        Ok(())
    }

    /// Scrape job names: 1-200 characters of `[A-Za-z0-9_-]`.
    pub fn job_name(value: &str) -> Result<(), String> {
        if value.is_empty() || value.len() > 200 {
            return Err(format!("{:?} must be 1-200 characters long", value));
        }
        if let Some(c) = value
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
        {
            return Err(format!("{:?} contains invalid character {:?}", value, c));
        }
        Ok(())
    }
}
