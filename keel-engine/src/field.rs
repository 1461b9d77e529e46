//! Three-valued attribute wrapper used by every resource model.
//!
//! A declared attribute is either set, explicitly absent (`Null`, the kind
//! default applies) or not yet resolvable (`Unknown`, computed by the remote
//! side). Mappers and the diff gate branch on this instead of ad hoc checks.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Attribute value with explicit null and unknown states.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Field<T> {
    /// Value not resolvable yet. Never sent to the remote API and never
    /// used for comparison or defaulting.
    Unknown,
    /// Explicitly absent; the resource kind default applies.
    Null,
    /// Known value.
    Value(T),
}

/// Ordered collection whose elements may themselves be null or unknown.
pub type FieldList<T> = Field<Vec<Field<T>>>;

/// Key/value collection; key order carries no meaning.
pub type FieldMap<T> = Field<BTreeMap<String, Field<T>>>;

impl<T> Default for Field<T> {
    fn default() -> Self {
        Field::Unknown
    }
}

impl<T> Field<T> {
    pub fn is_unknown(&self) -> bool {
        matches!(self, Field::Unknown)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Field::Null)
    }

    /// True for `Null` and `Value`.
    pub fn is_known(&self) -> bool {
        !self.is_unknown()
    }

    /// True when the kind default has to be applied.
    pub fn is_unset(&self) -> bool {
        !matches!(self, Field::Value(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Field::Value(v) => Some(v),
            _ => None,
        }
    }

    /// `None` maps to `Null`: the remote side answered without a value.
    pub fn from_option(value: Option<T>) -> Self {
        match value {
            Some(v) => Field::Value(v),
            None => Field::Null,
        }
    }

    pub fn as_ref(&self) -> Field<&T> {
        match self {
            Field::Unknown => Field::Unknown,
            Field::Null => Field::Null,
            Field::Value(v) => Field::Value(v),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Field<U> {
        match self {
            Field::Unknown => Field::Unknown,
            Field::Null => Field::Null,
            Field::Value(v) => Field::Value(f(v)),
        }
    }

    /// Resolve to the value, or `default` when null or unknown.
    pub fn resolve_or(self, default: T) -> T {
        self.into_value().unwrap_or(default)
    }

    pub fn resolve_or_else<F: FnOnce() -> T>(self, default: F) -> T {
        self.into_value().unwrap_or_else(default)
    }

    /// Unknown becomes null; known states are kept.
    pub fn unknown_as_null(self) -> Self {
        match self {
            Field::Unknown => Field::Null,
            other => other,
        }
    }
}

impl<T: Clone> Field<T> {
    /// Replace an unknown value with the prior one. Used to merge prior
    /// observed state into a plan before an update.
    pub fn or_prior(self, prior: &Field<T>) -> Field<T> {
        match self {
            Field::Unknown => prior.clone(),
            other => other,
        }
    }

    /// Like [`Field::or_prior`], but also falls back on `Null`.
    pub fn or_prior_when_unset(self, prior: &Field<T>) -> Field<T> {
        match self {
            Field::Value(v) => Field::Value(v),
            _ => prior.clone(),
        }
    }
}

impl<T> From<T> for Field<T> {
    fn from(value: T) -> Self {
        Field::Value(value)
    }
}

impl From<&str> for Field<String> {
    fn from(value: &str) -> Self {
        Field::Value(value.to_string())
    }
}

// Unknown and null both serialize as JSON null. Models skip unknown fields
// with `skip_serializing_if = "Field::is_unknown"`, so a missing key reads
// back as unknown and an explicit null as null.
impl<T: Serialize> Serialize for Field<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Value(v) => v.serialize(serializer),
            Field::Null | Field::Unknown => serializer.serialize_none(),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Field<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Option::<T>::deserialize(deserializer).map(Field::from_option)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Model {
        #[serde(default, skip_serializing_if = "Field::is_unknown")]
        name: Field<String>,
        #[serde(default, skip_serializing_if = "Field::is_unknown")]
        size: Field<i64>,
    }

    #[test]
    fn test_missing_key_is_unknown_and_null_is_null() {
        let m: Model = serde_json::from_str(r#"{"size": null}"#).unwrap();
        assert!(m.name.is_unknown());
        assert!(m.size.is_null());
    }

    #[test]
    fn test_serialize_skips_unknown() {
        let m = Model {
            name: Field::Unknown,
            size: Field::Null,
        };
        assert_eq!(serde_json::to_string(&m).unwrap(), r#"{"size":null}"#);

        let m = Model {
            name: "net".into(),
            size: Field::Value(3),
        };
        assert_eq!(
            serde_json::to_string(&m).unwrap(),
            r#"{"name":"net","size":3}"#
        );
    }

    #[test]
    fn test_resolve_or_applies_default_for_null_and_unknown() {
        assert_eq!(Field::<i64>::Null.resolve_or(25), 25);
        assert_eq!(Field::<i64>::Unknown.resolve_or(25), 25);
        assert_eq!(Field::Value(24).resolve_or(25), 24);
    }

    #[test]
    fn test_or_prior_only_replaces_unknown() {
        let prior = Field::Value("a".to_string());
        assert_eq!(Field::Unknown.or_prior(&prior), prior);
        assert!(Field::<String>::Null.or_prior(&prior).is_null());
        assert_eq!(
            Field::Null.or_prior_when_unset(&prior),
            Field::Value("a".to_string())
        );
    }
}
