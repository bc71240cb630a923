//! # Laudo Types
//!
//! Value types shared by every crate in the laudo workspace.
//!
//! The wire names of these types follow the persisted draft record (Portuguese keys such as
//! `nome`, `registro`, `anexos`), while the Rust field names are English. Deserialisation is
//! deliberately tolerant: drafts written by older builds may omit fields, so every field has a
//! default rather than failing the whole record.

pub mod lenient;
mod media;
mod people;
mod report_number;

pub use media::{
    Attachment, AttachmentId, DataUri, Signature, SignatureSource, UNKNOWN_SIZE_LABEL,
};
pub use people::{Patient, Professional, RegistrationType};
pub use report_number::{ReportNumber, REPORT_NUMBER_PREFIX};

/// Errors that can occur when constructing validated value types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypesError {
    /// The text is not a `data:<mime>;base64,<payload>` URI
    #[error("invalid data URI: {0}")]
    InvalidDataUri(String),

    /// The text is not a `LAUDO-<digits>` report number
    #[error("invalid report number: {0}")]
    InvalidReportNumber(String),
}
