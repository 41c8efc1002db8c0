//! Failure report: one handler failure as reported by the pipeline.

use serde::{Deserialize, Serialize};

/// Diagnostic payload of a single failure.
///
/// `message` is kept as a JSON value so structured messages can be reported;
/// it is encoded to text when the occurrence is recorded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl ErrorDetail {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(serde_json::Value::String(message.into())),
            stack: None,
        }
    }

    pub fn structured(message: serde_json::Value) -> Self {
        Self {
            message: Some(message),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    /// Build a detail from a Rust error; the source chain becomes the stack.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(format!("caused by: {cause}"));
            source = cause.source();
        }

        let detail = Self::message(err.to_string());
        if chain.is_empty() {
            detail
        } else {
            detail.with_stack(chain.join("\n"))
        }
    }
}

/// A single reported occurrence of a handler failing.
///
/// Identity fields are plain strings here; they are validated when the
/// aggregation key is resolved. Missing fields deserialize as empty strings so
/// they are rejected there instead of at parse time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    #[serde(default)]
    pub operation_id: String,

    #[serde(default)]
    pub parent_id: String,

    #[serde(default)]
    pub durable_name: String,

    /// Consumer group of the handler. Only read when a record is created.
    #[serde(default)]
    pub client_group: String,

    /// Subject of the parent event. Only read when a record is created.
    #[serde(default)]
    pub subject: String,

    /// Position of the handler within its stage. Only read when a record is created.
    #[serde(default)]
    pub handler_order: Option<i32>,

    #[serde(default)]
    pub error: ErrorDetail,
}

impl FailureReport {
    pub fn new(
        operation_id: impl Into<String>,
        parent_id: impl Into<String>,
        durable_name: impl Into<String>,
    ) -> Self {
        Self {
            operation_id: operation_id.into(),
            parent_id: parent_id.into(),
            durable_name: durable_name.into(),
            ..Self::default()
        }
    }

    pub fn with_context(
        mut self,
        client_group: impl Into<String>,
        subject: impl Into<String>,
        handler_order: i32,
    ) -> Self {
        self.client_group = client_group.into();
        self.subject = subject.into();
        self.handler_order = Some(handler_order);
        self
    }

    pub fn with_error(mut self, error: ErrorDetail) -> Self {
        self.error = error;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, thiserror::Error)]
    #[error("connection reset")]
    struct Reset;

    #[derive(Debug, thiserror::Error)]
    #[error("publish failed")]
    struct Publish(#[source] Reset);

    #[test]
    fn report_parses_from_pipeline_json() {
        let report: FailureReport = serde_json::from_value(json!({
            "operationId": "op1",
            "parentId": "p1",
            "durableName": "h1",
            "clientGroup": "g1",
            "subject": "s1",
            "handlerOrder": 0,
            "error": { "message": "boom" }
        }))
        .unwrap();

        assert_eq!(report.operation_id, "op1");
        assert_eq!(report.handler_order, Some(0));
        assert_eq!(report.error.message, Some(json!("boom")));
        assert_eq!(report.error.stack, None);
    }

    #[test]
    fn absent_handler_order_is_none_not_zero() {
        let report: FailureReport = serde_json::from_value(json!({
            "operationId": "op1",
            "parentId": "p1",
            "durableName": "h1",
            "clientGroup": "g1",
            "subject": "s1"
        }))
        .unwrap();
        assert_eq!(report.handler_order, None);
    }

    #[test]
    fn missing_identity_fields_parse_as_empty() {
        let report: FailureReport = serde_json::from_value(json!({ "parentId": "p1" })).unwrap();
        assert!(report.operation_id.is_empty());
        assert!(report.durable_name.is_empty());
    }

    #[test]
    fn from_error_renders_source_chain() {
        let err = Publish(Reset);
        let detail = ErrorDetail::from_error(&err);

        assert_eq!(detail.message, Some(json!("publish failed")));
        assert_eq!(detail.stack.as_deref(), Some("caused by: connection reset"));
    }

    #[test]
    fn from_error_without_source_has_no_stack() {
        let detail = ErrorDetail::from_error(&Reset);
        assert_eq!(detail.stack, None);
    }
}
