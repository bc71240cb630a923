//! Upload limits.

/// Largest accepted attachment image (10 MiB).
pub const MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

/// Largest accepted signature image (5 MiB).
pub const MAX_SIGNATURE_BYTES: u64 = 5 * 1024 * 1024;

/// Signature images are scaled down to fit within this width.
pub const SIGNATURE_MAX_WIDTH: u32 = 400;

/// Signature images are scaled down to fit within this height.
pub const SIGNATURE_MAX_HEIGHT: u32 = 200;

/// Media type of re-encoded signatures.
pub(crate) const SIGNATURE_MEDIA_TYPE: &str = "image/png";
