//! Atomic update operators of the public dialect.
//!
//! An update value is either a literal (replace) or an object carrying
//! an `__op` tag. `Batch` combines several operators on one field,
//! typically an `AddRelation` with a `RemoveRelation`.

use serde_json::Value;

use crate::json::{get_array, op_tag};
use crate::{Error, Result};

/// A parsed `__op` object.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOperator {
    Delete,
    Increment { amount: f64 },
    Add { objects: Vec<Value> },
    AddUnique { objects: Vec<Value> },
    Remove { objects: Vec<Value> },
    AddRelation { objects: Vec<Value> },
    RemoveRelation { objects: Vec<Value> },
    Batch { ops: Vec<Value> },
}

impl UpdateOperator {
    /// Parse an update value. Returns `None` when the value carries no
    /// `__op` tag, i.e. it is a literal replacement.
    pub fn from_value(value: &Value) -> Option<Result<UpdateOperator>> {
        let op = op_tag(value)?;
        let map = value.as_object().expect("op_tag implies an object");

        let objects = || get_array(map, "objects").cloned().unwrap_or_default();
        let parsed = match op {
            "Delete" => Ok(UpdateOperator::Delete),
            "Increment" => match map.get("amount").and_then(Value::as_f64) {
                Some(amount) => Ok(UpdateOperator::Increment { amount }),
                None => Err(Error::InvalidJson("incrementing must provide a number".to_string())),
            },
            "Add" => Ok(UpdateOperator::Add { objects: objects() }),
            "AddUnique" => Ok(UpdateOperator::AddUnique { objects: objects() }),
            "Remove" => Ok(UpdateOperator::Remove { objects: objects() }),
            "AddRelation" => Ok(UpdateOperator::AddRelation { objects: objects() }),
            "RemoveRelation" => Ok(UpdateOperator::RemoveRelation { objects: objects() }),
            "Batch" => Ok(UpdateOperator::Batch {
                ops: get_array(map, "ops").cloned().unwrap_or_default(),
            }),
            other => Err(Error::IncorrectType(format!("unexpected op: {other}"))),
        };
        Some(parsed)
    }

    /// Whether this operator touches a relation join table rather than
    /// the primary document.
    pub fn is_relation_op(&self) -> bool {
        matches!(
            self,
            UpdateOperator::AddRelation { .. }
                | UpdateOperator::RemoveRelation { .. }
                | UpdateOperator::Batch { .. }
        )
    }
}
