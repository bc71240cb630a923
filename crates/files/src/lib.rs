//! Laudo Image Intake
//!
//! This crate turns uploaded image files into the records a report carries: numbered
//! attachment pages and the professional's signature.
//!
//! ## Rules
//!
//! - Only images are accepted. The media type is sniffed from the content, never trusted from
//!   the file extension.
//! - Attachments are limited to 10 MiB, signatures to 5 MiB.
//! - Signatures are scaled down to fit a 400×200 px box and re-encoded as PNG.
//! - Accepted bytes are carried inline as base64 `data:` URIs, so a report (and its draft) is
//!   self-contained.
//! - A rejected upload never produces a partial record: callers get an [`AssetError`] and the
//!   report state is left as it was.
//!
//! ## Example Usage
//!
//! ```no_run
//! use laudo_files::AssetService;
//! use std::path::Path;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let service = AssetService::new();
//! let attachment = service.attachment_from_path(Path::new("exames/raio-x.png"))?;
//! println!("{} ({})", attachment.display_name, attachment.size_label);
//! # Ok(())
//! # }
//! ```

mod constants;
mod intake;

pub use constants::{
    MAX_ATTACHMENT_BYTES, MAX_SIGNATURE_BYTES, SIGNATURE_MAX_HEIGHT, SIGNATURE_MAX_WIDTH,
};
pub use intake::{fit_within, format_file_size, AssetService};

/// Errors that can occur while accepting an uploaded image
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    /// The content is not a recognised image format
    #[error("{file_name}: only images are accepted (detected: {detected})")]
    UnsupportedType { file_name: String, detected: String },

    /// The file exceeds the size limit for its purpose
    #[error("{file_name}: image too large ({size_label}, limit {limit_label})")]
    TooLarge {
        file_name: String,
        size_label: String,
        limit_label: String,
    },

    /// The file has no content
    #[error("{0}: file is empty")]
    Empty(String),

    /// The image could not be decoded or re-encoded
    #[error("failed to process image {file_name}: {source}")]
    Image {
        file_name: String,
        #[source]
        source: image::ImageError,
    },

    /// The encoded image could not be wrapped as a data URI
    #[error("invalid data URI: {0}")]
    DataUri(#[from] laudo_types::TypesError),

    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
