//! Domain model (IDs, reports, keys, records, errors).

pub mod errors;
pub mod ids;
pub mod key;
pub mod record;
pub mod report;

pub use self::errors::{ErrorKind, LedgerError};
pub use self::ids::{DurableName, OperationId, ParentId, RecordId};
pub use self::key::FailureKey;
pub use self::record::{
    FailureRecord, NewFailureRecord, Occurrence, RecordUpdate, decode_message, encode_message,
};
pub use self::report::{ErrorDetail, FailureReport};
