//! # Optimistic Updates
//!
//! Lets callers see the effect of a write before the server confirms it.
//! Each outstanding write is recorded as a [`FoldOp`] and folded, in
//! insertion order, over the last known server value whenever the value is
//! read.
//!
//! ## Features
//!
//! - **Immediate Updates**: Reads reflect pending writes at once
//! - **Confirmation**: Confirmed writes stop being overlaid; the server value
//!   now contains them
//! - **Rollback**: Failed writes are removed without ever being applied again
//! - **Self-Healing**: A fold that cannot be applied is dropped and counted
//!   instead of blocking the rest of the view
//!
//! ## Usage
//!
//! ```rust
//! use cms_sync::offline::optimistic::{FoldOp, OptimisticManager};
//! use serde_json::json;
//!
//! let mut manager = OptimisticManager::new("_id");
//! manager.apply_optimistic("op-1", FoldOp::insert(json!({ "_id": "p1", "name": "Tower A" })));
//!
//! let view = manager.apply_optimistic_updates(&json!([]));
//! assert_eq!(view, json!([{ "_id": "p1", "name": "Tower A" }]));
//!
//! manager.confirm_optimistic("op-1");
//! assert_eq!(manager.apply_optimistic_updates(&json!([])), json!([]));
//! ```

use crate::shared::operation::Operation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// How one pending write transforms a base value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum FoldOp {
    /// Append a record to a collection
    Insert { record: Value },
    /// Swap the record with the given id for a new one
    Replace { id: String, record: Value },
    /// Drop the record with the given id
    Remove { id: String },
    /// Overwrite some fields of the record with the given id
    Patch { id: String, fields: Map<String, Value> },
    /// Replace the whole value
    Set { value: Value },
}

/// Why a fold could not be applied
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FoldError {
    #[error("base value is not a collection")]
    NotACollection,
    #[error("no record with id '{0}'")]
    RecordNotFound(String),
    #[error("record is not an object")]
    NotAnObject,
}

impl FoldOp {
    /// Shorthand for [`FoldOp::Insert`]
    pub fn insert(record: Value) -> Self {
        FoldOp::Insert { record }
    }

    /// Fold onto `base`; records are matched on `id_field`
    ///
    /// A `null` base is treated as an empty collection.
    pub fn apply(&self, base: Value, id_field: &str) -> Result<Value, FoldError> {
        if let FoldOp::Set { value } = self {
            return Ok(value.clone());
        }

        let mut records = match base {
            Value::Array(records) => records,
            Value::Null => Vec::new(),
            _ => return Err(FoldError::NotACollection),
        };

        match self {
            FoldOp::Insert { record } => records.push(record.clone()),
            FoldOp::Replace { id, record } => {
                let index = position(&records, id_field, id)?;
                records[index] = record.clone();
            }
            FoldOp::Remove { id } => {
                let index = position(&records, id_field, id)?;
                records.remove(index);
            }
            FoldOp::Patch { id, fields } => {
                let index = position(&records, id_field, id)?;
                let target = records[index]
                    .as_object_mut()
                    .ok_or(FoldError::NotAnObject)?;
                for (key, value) in fields {
                    target.insert(key.clone(), value.clone());
                }
            }
            FoldOp::Set { .. } => {}
        }

        Ok(Value::Array(records))
    }

    /// Overlay implied by a queued operation, keyed by the queue item id
    ///
    /// Created records get `temp_id` in `id_field` unless they carry an id.
    pub fn for_operation(operation: &Operation, temp_id: &str, id_field: &str) -> Option<FoldOp> {
        let insert = |payload: Value| -> Option<FoldOp> {
            let mut record = match payload {
                Value::Object(record) => record,
                _ => return None,
            };
            record
                .entry(id_field.to_string())
                .or_insert_with(|| Value::String(temp_id.to_string()));
            Some(FoldOp::Insert {
                record: Value::Object(record),
            })
        };

        match operation {
            Operation::CreateProject(_)
            | Operation::LogAttendance(_)
            | Operation::SubmitTimesheet(_)
            | Operation::CreateEquipmentDispatch(_)
            | Operation::CreatePurchaseRequest(_)
            | Operation::CreateVendorPayment(_)
            | Operation::CreateIncidentReport(_) => insert(operation.payload().ok()?),
            Operation::UpdateProject(update) | Operation::UpdateInventoryItem(update) => {
                Some(FoldOp::Patch {
                    id: update.id.clone(),
                    fields: update.changes.clone(),
                })
            }
            Operation::UpdatePurchaseRequestStatus(change) => {
                let mut fields = Map::new();
                fields.insert("status".to_string(), Value::String(change.status.clone()));
                Some(FoldOp::Patch {
                    id: change.id.clone(),
                    fields,
                })
            }
            Operation::DeleteRecord(deletion) => Some(FoldOp::Remove {
                id: deletion.id.clone(),
            }),
        }
    }
}

fn position(records: &[Value], id_field: &str, id: &str) -> Result<usize, FoldError> {
    records
        .iter()
        .position(|record| record.get(id_field).and_then(Value::as_str) == Some(id))
        .ok_or_else(|| FoldError::RecordNotFound(id.to_string()))
}

/// An in-flight local write not yet confirmed by the server
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimisticOperation {
    /// Caller-supplied correlation key
    pub operation_id: String,
    /// How the write transforms the base value
    pub fold: FoldOp,
    /// When the write was applied locally
    pub timestamp: DateTime<Utc>,
}

/// Outstanding optimistic writes over one value
#[derive(Debug, Default)]
pub struct OptimisticManager {
    operations: Vec<OptimisticOperation>,
    id_field: String,
    dropped: u64,
}

impl OptimisticManager {
    /// Create a manager matching records on `id_field`
    pub fn new(id_field: impl Into<String>) -> Self {
        Self {
            operations: Vec::new(),
            id_field: id_field.into(),
            dropped: 0,
        }
    }

    /// Record a write; an existing entry with the same id is replaced in place
    pub fn apply_optimistic(&mut self, operation_id: impl Into<String>, fold: FoldOp) {
        let operation = OptimisticOperation {
            operation_id: operation_id.into(),
            fold,
            timestamp: Utc::now(),
        };

        match self
            .operations
            .iter_mut()
            .find(|existing| existing.operation_id == operation.operation_id)
        {
            Some(existing) => *existing = operation,
            None => self.operations.push(operation),
        }
    }

    /// Server confirmed the write
    pub fn confirm_optimistic(&mut self, operation_id: &str) -> bool {
        self.remove(operation_id)
    }

    /// Server rejected the write
    pub fn rollback_optimistic(&mut self, operation_id: &str) -> bool {
        let removed = self.remove(operation_id);
        if removed {
            tracing::debug!(operation_id, "optimistic update rolled back");
        }
        removed
    }

    fn remove(&mut self, operation_id: &str) -> bool {
        let before = self.operations.len();
        self.operations.retain(|op| op.operation_id != operation_id);
        self.operations.len() != before
    }

    /// Fold every outstanding write over `base`, in insertion order
    ///
    /// Writes that fail to fold are dropped from the outstanding set and
    /// counted in [`dropped_count`](Self::dropped_count).
    pub fn apply_optimistic_updates(&mut self, base: &Value) -> Value {
        let mut value = base.clone();
        let mut invalid = Vec::new();

        for operation in &self.operations {
            match operation.fold.apply(value.clone(), &self.id_field) {
                Ok(next) => value = next,
                Err(e) => {
                    tracing::warn!(
                        operation_id = %operation.operation_id,
                        error = %e,
                        "dropping optimistic update that no longer applies"
                    );
                    invalid.push(operation.operation_id.clone());
                }
            }
        }

        if !invalid.is_empty() {
            self.dropped += invalid.len() as u64;
            self.operations
                .retain(|op| !invalid.contains(&op.operation_id));
        }
        value
    }

    /// Outstanding writes in insertion order
    pub fn pending(&self) -> &[OptimisticOperation] {
        &self.operations
    }

    /// Number of outstanding writes
    pub fn count_pending(&self) -> usize {
        self.operations.len()
    }

    /// Check if an operation has an optimistic update
    pub fn has_optimistic_update(&self, operation_id: &str) -> bool {
        self.operations.iter().any(|op| op.operation_id == operation_id)
    }

    /// Writes dropped because they no longer applied
    pub fn dropped_count(&self) -> u64 {
        self.dropped
    }

    /// Forget every outstanding write; returns their ids
    pub fn clear_all(&mut self) -> Vec<String> {
        self.operations
            .drain(..)
            .map(|op| op.operation_id)
            .collect()
    }
}
