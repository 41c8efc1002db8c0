//! Aggregation key: the identity a failure report is folded under.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::LedgerError;
use super::ids::{DurableName, OperationId, ParentId};
use super::report::FailureReport;

/// `(operation_id, parent_id, durable_name)`: one logical failure cause.
///
/// Used verbatim as the store's match predicate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureKey {
    pub operation_id: OperationId,
    pub parent_id: ParentId,
    pub durable_name: DurableName,
}

impl FailureKey {
    pub fn from_parts(
        operation_id: impl Into<String>,
        parent_id: impl Into<String>,
        durable_name: impl Into<String>,
    ) -> Result<Self, LedgerError> {
        Ok(Self {
            operation_id: OperationId::parse(operation_id)?,
            parent_id: ParentId::parse(parent_id)?,
            durable_name: DurableName::parse(durable_name)?,
        })
    }

    /// Derive the key of a report. Pure; fails on the first missing field.
    pub fn resolve(report: &FailureReport) -> Result<Self, LedgerError> {
        Self::from_parts(
            report.operation_id.as_str(),
            report.parent_id.as_str(),
            report.durable_name.as_str(),
        )
    }
}

impl fmt::Display for FailureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.operation_id, self.parent_id, self.durable_name
        )
    }
}
