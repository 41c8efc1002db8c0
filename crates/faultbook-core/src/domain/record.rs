//! Failure record: the aggregation unit kept by the store.
//!
//! State transitions go through `FailureRecord::apply` so that
//! `occurrence_count == occurrences.len()` holds after every write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::LedgerError;
use super::ids::RecordId;
use super::key::FailureKey;
use super::report::{ErrorDetail, FailureReport};

/// Encode a report message as JSON text.
///
/// Strings come out quoted (`boom` -> `"boom"`), structured values as compact JSON.
pub fn encode_message(message: &serde_json::Value) -> String {
    message.to_string()
}

/// Reverse of [`encode_message`].
pub fn decode_message(encoded: &str) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::from_str(encoded)
}

/// One failure report folded into a record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Occurrence {
    /// Encoded message (see [`encode_message`]).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Stored verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,

    pub created_at: DateTime<Utc>,
}

impl Occurrence {
    pub fn from_detail(detail: &ErrorDetail, at: DateTime<Utc>) -> Self {
        Self {
            message: detail.message.as_ref().map(encode_message),
            stack: detail.stack.clone(),
            created_at: at,
        }
    }

    /// The message as originally reported.
    ///
    /// Text that is not valid JSON is returned as a plain string.
    pub fn decoded_message(&self) -> Option<serde_json::Value> {
        self.message.as_deref().map(|encoded| {
            decode_message(encoded)
                .unwrap_or_else(|_| serde_json::Value::String(encoded.to_string()))
        })
    }

    /// The original text, when the reported message was a string.
    pub fn message_text(&self) -> Option<String> {
        match self.decoded_message()? {
            serde_json::Value::String(text) => Some(text),
            _ => None,
        }
    }
}

/// Everything the store needs to create a record on a miss.
#[derive(Debug, Clone, PartialEq)]
pub struct NewFailureRecord {
    pub key: FailureKey,
    pub client_group: String,
    pub parent_subject: String,
    pub handler_order: i32,
    pub first_occurrence: Occurrence,
}

impl NewFailureRecord {
    /// Creation-only fields are required here, and only here.
    pub fn from_report(
        key: &FailureKey,
        report: &FailureReport,
        first_occurrence: Occurrence,
    ) -> Result<Self, LedgerError> {
        if report.client_group.trim().is_empty() {
            return Err(LedgerError::InvalidReport {
                field: "client_group",
            });
        }
        if report.subject.trim().is_empty() {
            return Err(LedgerError::InvalidReport { field: "subject" });
        }
        let Some(handler_order) = report.handler_order else {
            return Err(LedgerError::InvalidReport {
                field: "handler_order",
            });
        };
        Ok(Self {
            key: key.clone(),
            client_group: report.client_group.clone(),
            parent_subject: report.subject.clone(),
            handler_order,
            first_occurrence,
        })
    }
}

/// Mutations a store may apply to an existing record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordUpdate {
    /// Append the occurrence, increment the count and reopen the record.
    Fold(Occurrence),

    /// Mark the failure condition as handled.
    Resolve,
}

/// The aggregated, durable entity keyed by [`FailureKey`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub id: RecordId,

    #[serde(flatten)]
    pub key: FailureKey,

    /// Fixed at creation.
    pub client_group: String,

    /// Fixed at creation.
    pub parent_subject: String,

    /// Fixed at creation.
    pub handler_order: i32,

    pub occurrence_count: u64,

    /// Append-only, in arrival order.
    pub occurrences: Vec<Occurrence>,

    pub resolved: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FailureRecord {
    pub fn create(id: RecordId, seed: NewFailureRecord, now: DateTime<Utc>) -> Self {
        Self {
            id,
            key: seed.key,
            client_group: seed.client_group,
            parent_subject: seed.parent_subject,
            handler_order: seed.handler_order,
            occurrence_count: 1,
            occurrences: vec![seed.first_occurrence],
            resolved: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn apply(&mut self, update: &RecordUpdate, now: DateTime<Utc>) {
        match update {
            RecordUpdate::Fold(occurrence) => {
                self.occurrences.push(occurrence.clone());
                self.occurrence_count += 1;
                self.resolved = false;
            }
            RecordUpdate::Resolve => {
                self.resolved = true;
            }
        }
        self.updated_at = now;
    }

    pub fn is_consistent(&self) -> bool {
        self.occurrence_count == self.occurrences.len() as u64
    }

    pub fn last_occurrence(&self) -> Option<&Occurrence> {
        self.occurrences.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use ulid::Ulid;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn report() -> FailureReport {
        FailureReport::new("op1", "p1", "h1")
            .with_context("g1", "s1", 0)
            .with_error(ErrorDetail::message("boom"))
    }

    fn created() -> FailureRecord {
        let report = report();
        let key = FailureKey::resolve(&report).unwrap();
        let occurrence = Occurrence::from_detail(&report.error, t0());
        let seed = NewFailureRecord::from_report(&key, &report, occurrence).unwrap();
        FailureRecord::create(RecordId::from_ulid(Ulid::new()), seed, t0())
    }

    #[test]
    fn message_is_stored_quoted_and_decodes_back() {
        let occurrence = Occurrence::from_detail(&ErrorDetail::message("boom"), t0());

        assert_eq!(occurrence.message.as_deref(), Some("\"boom\""));
        assert_eq!(occurrence.message_text().as_deref(), Some("boom"));
    }

    #[test]
    fn structured_message_is_encoded_as_json_text() {
        let detail = ErrorDetail::structured(json!({"code": 42, "reason": "timeout"}));
        let occurrence = Occurrence::from_detail(&detail, t0());

        assert_eq!(
            occurrence.decoded_message(),
            Some(json!({"code": 42, "reason": "timeout"}))
        );
        assert_eq!(occurrence.message_text(), None);
    }

    #[test]
    fn stack_is_stored_verbatim_and_absent_message_stays_absent() {
        let detail = ErrorDetail {
            message: None,
            stack: Some("at handler (x.rs:1)\n  \"quoted\"".into()),
        };
        let occurrence = Occurrence::from_detail(&detail, t0());

        assert_eq!(occurrence.message, None);
        assert_eq!(occurrence.stack, detail.stack);
    }

    #[test]
    fn legacy_plain_text_message_decodes_as_string() {
        let occurrence = Occurrence {
            message: Some("not json".into()),
            stack: None,
            created_at: t0(),
        };
        assert_eq!(occurrence.message_text().as_deref(), Some("not json"));
    }

    #[test]
    fn creation_requires_group_subject_and_order() {
        let report = FailureReport::new("op1", "p1", "h1").with_context("", "s1", 0);
        let key = FailureKey::resolve(&report).unwrap();
        let occurrence = Occurrence::from_detail(&report.error, t0());

        let err = NewFailureRecord::from_report(&key, &report, occurrence.clone()).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidReport { field: "client_group" }));

        let report = report.with_context(" \t", "s1", 0);
        let err = NewFailureRecord::from_report(&key, &report, occurrence.clone()).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidReport { field: "client_group" }));

        let report = report.with_context("g1", "  ", 0);
        let err = NewFailureRecord::from_report(&key, &report, occurrence.clone()).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidReport { field: "subject" }));

        let mut report = report.with_context("g1", "s1", 0);
        report.handler_order = None;
        let err = NewFailureRecord::from_report(&key, &report, occurrence).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidReport { field: "handler_order" }));
    }

    #[test]
    fn created_record_starts_with_one_open_occurrence() {
        let record = created();

        assert_eq!(record.occurrence_count, 1);
        assert_eq!(record.occurrences.len(), 1);
        assert!(!record.resolved);
        assert_eq!(record.parent_subject, "s1");
        assert_eq!(record.created_at, record.updated_at);
        assert!(record.is_consistent());
    }

    #[test]
    fn fold_appends_increments_and_reopens() {
        let mut record = created();
        record.apply(&RecordUpdate::Resolve, t0() + Duration::seconds(1));
        assert!(record.resolved);

        let later = t0() + Duration::seconds(2);
        let occurrence = Occurrence::from_detail(&ErrorDetail::message("boom again"), later);
        record.apply(&RecordUpdate::Fold(occurrence), later);

        assert_eq!(record.occurrence_count, 2);
        assert!(!record.resolved);
        assert_eq!(
            record.last_occurrence().and_then(Occurrence::message_text).as_deref(),
            Some("boom again")
        );
        assert_eq!(record.occurrences[0].message_text().as_deref(), Some("boom"));
        assert_eq!(record.created_at, t0());
        assert_eq!(record.updated_at, later);
        assert!(record.is_consistent());
    }

    #[test]
    fn resolve_does_not_touch_occurrences() {
        let mut record = created();
        record.apply(&RecordUpdate::Resolve, t0());

        assert_eq!(record.occurrence_count, 1);
        assert_eq!(record.occurrences.len(), 1);
    }

    #[test]
    fn record_serializes_with_flattened_key() {
        let record = created();
        let v = serde_json::to_value(&record).unwrap();

        assert_eq!(v["operationId"], "op1");
        assert_eq!(v["parentId"], "p1");
        assert_eq!(v["durableName"], "h1");
        assert_eq!(v["occurrenceCount"], 1);
        assert_eq!(v["occurrences"][0]["message"], "\"boom\"");
    }
}
