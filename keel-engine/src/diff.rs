//! Diff gate: decides whether a mutating call is needed and checks the
//! post-conditions of an update.

use std::fmt;

use crate::error::{EngineError, Result};
use crate::field::{Field, FieldList, FieldMap};
use crate::identity::RemoteIdentity;
use crate::mapper::{present_list, present_map};

/// Scalar comparison for the diff gate. An unknown desired value carries
/// no intent and never counts as a change.
pub fn scalar_changed<T: PartialEq>(desired: &Field<T>, observed: &Field<T>) -> bool {
    match desired {
        Field::Unknown => false,
        _ => desired != observed,
    }
}

/// List comparison; null, unknown and empty lists are equal.
pub fn list_changed<T: PartialEq + Clone>(desired: &FieldList<T>, observed: &FieldList<T>) -> bool {
    if desired.is_unknown() {
        return false;
    }
    present_list(desired) != present_list(observed)
}

/// Map comparison; key order is irrelevant.
pub fn map_changed<T: PartialEq + Clone>(desired: &FieldMap<T>, observed: &FieldMap<T>) -> bool {
    if desired.is_unknown() {
        return false;
    }
    present_map(desired) != present_map(observed)
}

/// Post-update check for a field the server must echo unchanged.
pub fn check_immutable<T>(field: &str, requested: &Field<T>, returned: &Field<T>) -> Result<()>
where
    T: PartialEq + fmt::Display,
{
    let Field::Value(requested) = requested else {
        return Ok(());
    };

    match returned {
        Field::Value(r) if r == requested => Ok(()),
        Field::Value(r) => Err(EngineError::ImmutableFieldViolation {
            field: field.to_string(),
            requested: requested.to_string(),
            returned: r.to_string(),
        }),
        _ => Err(EngineError::ImmutableFieldViolation {
            field: field.to_string(),
            requested: requested.to_string(),
            returned: "<none>".to_string(),
        }),
    }
}

/// A remote identity, once observed, never changes.
pub fn check_identity_stable(
    prior: Option<&RemoteIdentity>,
    observed: Option<&RemoteIdentity>,
) -> Result<()> {
    match (prior, observed) {
        (Some(prior), Some(observed)) if prior != observed => {
            Err(EngineError::ImmutableFieldViolation {
                field: "remote identity".to_string(),
                requested: prior.to_string(),
                returned: observed.to_string(),
            })
        }
        (Some(prior), None) => Err(EngineError::ImmutableFieldViolation {
            field: "remote identity".to_string(),
            requested: prior.to_string(),
            returned: "<none>".to_string(),
        }),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_desired_is_no_change() {
        assert!(!scalar_changed(&Field::Unknown, &Field::Value(1)));
        assert!(scalar_changed(&Field::Value(2), &Field::Value(1)));
        assert!(scalar_changed(&Field::Null, &Field::Value(1)));
        assert!(!scalar_changed(&Field::Value(1), &Field::Value(1)));
    }

    #[test]
    fn test_empty_and_null_lists_are_equal() {
        let empty: FieldList<String> = Field::Value(vec![]);
        assert!(!list_changed(&empty, &Field::Null));
        assert!(!list_changed(&Field::Null, &empty));
        assert!(!list_changed(&Field::Value(vec![Field::Null]), &empty));
        assert!(list_changed(&Field::Value(vec!["8.8.8.8".into()]), &empty));
    }

    #[test]
    fn test_list_order_matters() {
        let a: FieldList<String> = Field::Value(vec!["a".into(), "b".into()]);
        let b: FieldList<String> = Field::Value(vec!["b".into(), "a".into()]);
        assert!(list_changed(&a, &b));
    }

    #[test]
    fn test_check_immutable() {
        let a = Field::Value("plan-a".to_string());
        let b = Field::Value("plan-b".to_string());
        assert!(check_immutable("plan_id", &a, &a).is_ok());
        assert!(check_immutable("plan_id", &Field::Unknown, &b).is_ok());
        match check_immutable("plan_id", &a, &b) {
            Err(EngineError::ImmutableFieldViolation {
                field,
                requested,
                returned,
            }) => {
                assert_eq!(field, "plan_id");
                assert_eq!(requested, "plan-a");
                assert_eq!(returned, "plan-b");
            }
            other => panic!("Unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_identity_stability() {
        let a = RemoteIdentity::new("p", "i");
        let b = RemoteIdentity::new("p", "j");
        assert!(check_identity_stable(Some(&a), Some(&a)).is_ok());
        assert!(check_identity_stable(None, Some(&a)).is_ok());
        assert!(check_identity_stable(Some(&a), Some(&b)).is_err());
        assert!(check_identity_stable(Some(&a), None).is_err());
    }
}
