//! Wire mapping contract and the collection helpers every kind shares.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{EngineError, Result};
use crate::field::{Field, FieldList, FieldMap};

/// Bidirectional conversion between a resource model and its wire shapes.
pub trait WireMapper {
    /// Desired and observed record. Both share one schema.
    type Model: Clone + fmt::Debug + Send + Sync;
    type CreateRequest: Send;
    type UpdateRequest: Send;
    type Response: Send;

    /// Build the create request. Null and unknown optionals get the kind default.
    fn to_wire_create(&self, desired: &Self::Model) -> Result<Self::CreateRequest>;

    fn to_wire_update(&self, desired: &Self::Model, prior: &Self::Model)
        -> Result<Self::UpdateRequest>;

    /// Rebuild the model from a response. `prior` supplies what the remote
    /// side does not return (sensitive values, null-vs-empty choices).
    fn from_wire(&self, response: Self::Response, prior: &Self::Model) -> Result<Self::Model>;
}

/// Known elements of a list in their original order. Null and unknown
/// elements are skipped; an unset list is empty.
pub fn present_list<T: Clone>(list: &FieldList<T>) -> Vec<T> {
    match list {
        Field::Value(items) => items.iter().filter_map(|i| i.value().cloned()).collect(),
        _ => Vec::new(),
    }
}

/// Known entries of a map.
pub fn present_map<T: Clone>(map: &FieldMap<T>) -> BTreeMap<String, T> {
    match map {
        Field::Value(entries) => entries
            .iter()
            .filter_map(|(k, v)| v.value().map(|v| (k.clone(), v.clone())))
            .collect(),
        _ => BTreeMap::new(),
    }
}

/// List as returned by the remote side. A missing list reads as empty.
pub fn list_from_wire<T>(items: Option<Vec<T>>) -> FieldList<T> {
    Field::Value(
        items
            .unwrap_or_default()
            .into_iter()
            .map(Field::Value)
            .collect(),
    )
}

pub fn map_from_wire<T>(entries: Option<BTreeMap<String, T>>) -> FieldMap<T> {
    Field::Value(
        entries
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, Field::Value(v)))
            .collect(),
    )
}

/// Sensitive value handling: a value the response carries wins, otherwise
/// a known prior value is kept and anything else becomes unknown. Never
/// invents a placeholder.
pub fn sensitive<T: Clone>(returned: Option<T>, prior: &Field<T>) -> Field<T> {
    match (returned, prior) {
        (Some(v), _) => Field::Value(v),
        (None, Field::Value(v)) => Field::Value(v.clone()),
        (None, _) => Field::Unknown,
    }
}

/// Recover a numeric subfield from a composite string, e.g. the prefix
/// length `24` from `10.0.0.0/24`.
pub fn parse_suffix<T>(composite: &str, delimiter: char, field: &str) -> Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    let mut split = composite.split(delimiter);
    let (Some(_), Some(suffix), None) = (split.next(), split.next(), split.next()) else {
        return Err(EngineError::malformed(
            field,
            format!("expected exactly one '{}' in {:?}", delimiter, composite),
        ));
    };

    suffix
        .parse::<T>()
        .map_err(|e| EngineError::malformed(field, format!("{:?}: {}", suffix, e)))
}
