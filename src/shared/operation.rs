//! Queueable operations.
//!
//! [`Operation`] is the closed set of writes the site-operations client can
//! defer while offline, each with its own payload. The queue persists the
//! untyped [`OperationEnvelope`] (`{ "type": ..., "data": ... }`) so that
//! entries written by an older client still load; decoding back to a typed
//! operation happens at drain time.
//!
//! Payload structs keep fields they do not model in `extra`, so a record
//! round-trips through the queue without losing form fields.

use crate::shared::error::SyncError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Remote entity collection an operation writes to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Collection {
    Projects,
    Attendance,
    Timesheets,
    EquipmentDispatches,
    PurchaseRequests,
    VendorPayments,
    IncidentReports,
    Inventory,
}

impl Collection {
    /// Collection name as used by the remote store
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Projects => "projects",
            Collection::Attendance => "attendance",
            Collection::Timesheets => "timesheets",
            Collection::EquipmentDispatches => "equipmentDispatches",
            Collection::PurchaseRequests => "purchaseRequests",
            Collection::VendorPayments => "vendorPayments",
            Collection::IncidentReports => "incidentReports",
            Collection::Inventory => "inventory",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Discriminant of [`Operation`], matching the persisted `type` tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    CreateProject,
    UpdateProject,
    LogAttendance,
    SubmitTimesheet,
    CreateEquipmentDispatch,
    CreatePurchaseRequest,
    UpdatePurchaseRequestStatus,
    CreateVendorPayment,
    CreateIncidentReport,
    UpdateInventoryItem,
    DeleteRecord,
}

impl OperationKind {
    /// Every kind, in declaration order
    pub const ALL: [OperationKind; 11] = [
        OperationKind::CreateProject,
        OperationKind::UpdateProject,
        OperationKind::LogAttendance,
        OperationKind::SubmitTimesheet,
        OperationKind::CreateEquipmentDispatch,
        OperationKind::CreatePurchaseRequest,
        OperationKind::UpdatePurchaseRequestStatus,
        OperationKind::CreateVendorPayment,
        OperationKind::CreateIncidentReport,
        OperationKind::UpdateInventoryItem,
        OperationKind::DeleteRecord,
    ];

    /// Persisted `type` tag
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::CreateProject => "CREATE_PROJECT",
            OperationKind::UpdateProject => "UPDATE_PROJECT",
            OperationKind::LogAttendance => "LOG_ATTENDANCE",
            OperationKind::SubmitTimesheet => "SUBMIT_TIMESHEET",
            OperationKind::CreateEquipmentDispatch => "CREATE_EQUIPMENT_DISPATCH",
            OperationKind::CreatePurchaseRequest => "CREATE_PURCHASE_REQUEST",
            OperationKind::UpdatePurchaseRequestStatus => "UPDATE_PURCHASE_REQUEST_STATUS",
            OperationKind::CreateVendorPayment => "CREATE_VENDOR_PAYMENT",
            OperationKind::CreateIncidentReport => "CREATE_INCIDENT_REPORT",
            OperationKind::UpdateInventoryItem => "UPDATE_INVENTORY_ITEM",
            OperationKind::DeleteRecord => "DELETE_RECORD",
        }
    }
}

impl FromStr for OperationKind {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| SyncError::unknown_operation(s))
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// New project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDraft {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_info: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProjectDraft {
    /// Draft with only a name
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client_info: None,
            location: None,
            start_date: None,
            budget: None,
            extra: Map::new(),
        }
    }
}

/// Field changes to an existing record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordUpdate {
    pub id: String,
    pub changes: Map<String, Value>,
}

/// Daily attendance mark for one employee
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceEntry {
    pub employee_id: String,
    pub date: String,
    pub status: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Weekly timesheet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimesheetEntry {
    pub employee_id: String,
    pub week_start: String,
    pub hours: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Equipment sent to a site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentDispatch {
    pub equipment_id: String,
    pub project_id: String,
    pub dispatch_date: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// New purchase request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRequestDraft {
    pub project_id: String,
    pub items: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_by: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Status transition on an existing record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub id: String,
    pub status: String,
}

/// Payment to a vendor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorPaymentDraft {
    pub vendor_name: String,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Site incident
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncidentReportDraft {
    pub incident_type: String,
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Removal of a record from a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDeletion {
    pub collection: Collection,
    pub id: String,
}

/// Write that can be deferred while offline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operation {
    CreateProject(ProjectDraft),
    UpdateProject(RecordUpdate),
    LogAttendance(AttendanceEntry),
    SubmitTimesheet(TimesheetEntry),
    CreateEquipmentDispatch(EquipmentDispatch),
    CreatePurchaseRequest(PurchaseRequestDraft),
    UpdatePurchaseRequestStatus(StatusChange),
    CreateVendorPayment(VendorPaymentDraft),
    CreateIncidentReport(IncidentReportDraft),
    UpdateInventoryItem(RecordUpdate),
    DeleteRecord(RecordDeletion),
}

impl Operation {
    /// Kind tag of this operation
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::CreateProject(_) => OperationKind::CreateProject,
            Operation::UpdateProject(_) => OperationKind::UpdateProject,
            Operation::LogAttendance(_) => OperationKind::LogAttendance,
            Operation::SubmitTimesheet(_) => OperationKind::SubmitTimesheet,
            Operation::CreateEquipmentDispatch(_) => OperationKind::CreateEquipmentDispatch,
            Operation::CreatePurchaseRequest(_) => OperationKind::CreatePurchaseRequest,
            Operation::UpdatePurchaseRequestStatus(_) => OperationKind::UpdatePurchaseRequestStatus,
            Operation::CreateVendorPayment(_) => OperationKind::CreateVendorPayment,
            Operation::CreateIncidentReport(_) => OperationKind::CreateIncidentReport,
            Operation::UpdateInventoryItem(_) => OperationKind::UpdateInventoryItem,
            Operation::DeleteRecord(_) => OperationKind::DeleteRecord,
        }
    }

    /// Collection the operation writes to
    pub fn collection(&self) -> Collection {
        match self {
            Operation::CreateProject(_) | Operation::UpdateProject(_) => Collection::Projects,
            Operation::LogAttendance(_) => Collection::Attendance,
            Operation::SubmitTimesheet(_) => Collection::Timesheets,
            Operation::CreateEquipmentDispatch(_) => Collection::EquipmentDispatches,
            Operation::CreatePurchaseRequest(_) | Operation::UpdatePurchaseRequestStatus(_) => {
                Collection::PurchaseRequests
            }
            Operation::CreateVendorPayment(_) => Collection::VendorPayments,
            Operation::CreateIncidentReport(_) => Collection::IncidentReports,
            Operation::UpdateInventoryItem(_) => Collection::Inventory,
            Operation::DeleteRecord(deletion) => deletion.collection,
        }
    }

    /// Payload as a JSON value
    pub fn payload(&self) -> Result<Value, SyncError> {
        Ok(self.to_envelope()?.data)
    }

    /// Untyped form persisted in the queue
    pub fn to_envelope(&self) -> Result<OperationEnvelope, SyncError> {
        let value = serde_json::to_value(self)?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Persisted `{ type, data }` form of an operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
}

impl OperationEnvelope {
    /// Create an envelope from raw parts
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Check the envelope carries a recognisable type, as required at enqueue time
    pub fn validate(&self) -> Result<OperationKind, SyncError> {
        if self.kind.trim().is_empty() {
            return Err(SyncError::invalid_operation("operation has no type"));
        }
        self.kind.parse().map_err(|_| {
            SyncError::invalid_operation(format!("unrecognised operation type '{}'", self.kind))
        })
    }

    /// Decode into a typed operation
    pub fn decode(&self) -> Result<Operation, SyncError> {
        let kind: OperationKind = self.kind.parse()?;
        let tagged = serde_json::json!({ "type": kind.as_str(), "data": self.data });
        serde_json::from_value(tagged).map_err(|e| SyncError::InvalidPayload {
            kind: self.kind.clone(),
            message: e.to_string(),
        })
    }
}

impl TryFrom<&Operation> for OperationEnvelope {
    type Error = SyncError;

    fn try_from(operation: &Operation) -> Result<Self, Self::Error> {
        operation.to_envelope()
    }
}
