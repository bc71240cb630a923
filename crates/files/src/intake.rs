//! Upload intake service
//!
//! [`AssetService`] validates raw upload bytes and produces report records:
//!
//! - [`AssetService::attachment_from_bytes`] → [`Attachment`] (bytes kept as uploaded)
//! - [`AssetService::signature_from_bytes`] → [`Signature`] (decoded, scaled, re-encoded PNG)
//!
//! Checks run in a fixed order: empty content, media type, size. The first failing check is
//! reported, so a 20 MiB text file is rejected for its type, not its size.
//!
//! Attachments leave intake with ordinal `0`. The report state assigns the real ordinal when
//! the attachment is appended.

use crate::constants::SIGNATURE_MEDIA_TYPE;
use crate::{
    AssetError, MAX_ATTACHMENT_BYTES, MAX_SIGNATURE_BYTES, SIGNATURE_MAX_HEIGHT,
    SIGNATURE_MAX_WIDTH,
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use image::imageops::FilterType;
use image::ImageFormat;
use laudo_types::{Attachment, AttachmentId, DataUri, Signature, SignatureSource};
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;

/// Bytes read from an oversized file to tell its type before rejecting it.
const SNIFF_BYTES: u64 = 8192;

/// Service for accepting attachment and signature uploads
///
/// Holds the size limits and the signature bounding box. The defaults match the limits
/// advertised to users; tests and embedders can tighten them with [`AssetService::with_limits`].
#[derive(Debug, Clone)]
pub struct AssetService {
    max_attachment_bytes: u64,
    max_signature_bytes: u64,
    signature_box: (u32, u32),
}

impl Default for AssetService {
    fn default() -> Self {
        Self::new()
    }
}

impl AssetService {
    pub fn new() -> Self {
        Self {
            max_attachment_bytes: MAX_ATTACHMENT_BYTES,
            max_signature_bytes: MAX_SIGNATURE_BYTES,
            signature_box: (SIGNATURE_MAX_WIDTH, SIGNATURE_MAX_HEIGHT),
        }
    }

    /// Overrides the attachment and signature size limits (in bytes).
    pub fn with_limits(mut self, max_attachment_bytes: u64, max_signature_bytes: u64) -> Self {
        self.max_attachment_bytes = max_attachment_bytes;
        self.max_signature_bytes = max_signature_bytes;
        self
    }

    /// Reads an attachment image from disk.
    ///
    /// # Errors
    ///
    /// Returns `AssetError` if the file cannot be read or fails validation
    /// (see [`Self::attachment_from_bytes`]).
    pub fn attachment_from_path(&self, path: &Path) -> Result<Attachment, AssetError> {
        let bytes = self.read_within(path, self.max_attachment_bytes, "attachment")?;
        self.attachment_from_bytes(&file_name_of(path), &bytes)
    }

    /// Validates attachment bytes and wraps them as an [`Attachment`].
    ///
    /// The image bytes are stored unchanged. The media type recorded on the attachment is the
    /// sniffed one.
    ///
    /// # Errors
    ///
    /// Returns `AssetError` if:
    /// - the content is empty,
    /// - the content is not an image,
    /// - the content exceeds the attachment size limit.
    pub fn attachment_from_bytes(
        &self,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<Attachment, AssetError> {
        let media_type = self.check(file_name, bytes, self.max_attachment_bytes)?;

        let payload = general_purpose::STANDARD.encode(bytes);
        let image = DataUri::from_base64(media_type, &payload)?;

        tracing::debug!(file_name, media_type, size = bytes.len(), "attachment accepted");

        Ok(Attachment {
            id: AttachmentId::new(uuid::Uuid::new_v4().simple().to_string()),
            display_name: file_name.to_string(),
            image,
            mime_type: media_type.to_string(),
            size_label: format_file_size(bytes.len() as u64),
            ordinal: 0,
        })
    }

    /// Reads a signature image from disk, stamping it with the current time.
    pub fn signature_from_path(&self, path: &Path) -> Result<Signature, AssetError> {
        let bytes = self.read_within(path, self.max_signature_bytes, "signature")?;
        self.signature_from_bytes(&file_name_of(path), &bytes, Utc::now())
    }

    /// Reads `path` whole only when its length is within `limit`. An oversized file is
    /// rejected after sniffing its first bytes, so the type check still comes first.
    fn read_within(&self, path: &Path, limit: u64, what: &str) -> Result<Vec<u8>, AssetError> {
        let io_error = |e: std::io::Error| {
            AssetError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read {} {}: {}", what, path.display(), e),
            ))
        };
        let file = File::open(path).map_err(io_error)?;
        let size = file.metadata().map_err(io_error)?.len();
        if size > limit {
            let mut header = Vec::new();
            file.take(SNIFF_BYTES)
                .read_to_end(&mut header)
                .map_err(io_error)?;
            let file_name = file_name_of(path);
            check_media_type(&file_name, &header)?;
            return Err(too_large(&file_name, size, limit));
        }

        let mut bytes = Vec::with_capacity(size as usize);
        file.take(limit + 1)
            .read_to_end(&mut bytes)
            .map_err(io_error)?;
        Ok(bytes)
    }

    /// Validates, scales and re-encodes a signature image.
    ///
    /// Images larger than the signature box are scaled down keeping their aspect ratio (both
    /// sides rounded down). Smaller images keep their size. The result is always PNG.
    ///
    /// # Errors
    ///
    /// Returns `AssetError` if the content fails the empty/type/size checks, or cannot be
    /// decoded or re-encoded.
    pub fn signature_from_bytes(
        &self,
        file_name: &str,
        bytes: &[u8],
        captured_at: DateTime<Utc>,
    ) -> Result<Signature, AssetError> {
        self.check(file_name, bytes, self.max_signature_bytes)?;

        let decoded = image::load_from_memory(bytes).map_err(|source| AssetError::Image {
            file_name: file_name.to_string(),
            source,
        })?;

        let (max_width, max_height) = self.signature_box;
        let (width, height) = fit_within(decoded.width(), decoded.height(), max_width, max_height);
        let scaled = if (width, height) == (decoded.width(), decoded.height()) {
            decoded
        } else {
            decoded.resize_exact(width, height, FilterType::Lanczos3)
        };

        let mut png = Vec::new();
        scaled
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|source| AssetError::Image {
                file_name: file_name.to_string(),
                source,
            })?;

        tracing::debug!(file_name, width, height, "signature accepted");

        Ok(Signature {
            image: DataUri::from_base64(
                SIGNATURE_MEDIA_TYPE,
                &general_purpose::STANDARD.encode(&png),
            )?,
            source: SignatureSource::Uploaded,
            captured_at: captured_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            original_file_name: file_name.to_string(),
        })
    }

    /// Shared checks. Returns the sniffed media type.
    fn check(&self, file_name: &str, bytes: &[u8], limit: u64) -> Result<&'static str, AssetError> {
        if bytes.is_empty() {
            return Err(AssetError::Empty(file_name.to_string()));
        }

        let media_type = check_media_type(file_name, bytes)?;

        let size = bytes.len() as u64;
        if size > limit {
            return Err(too_large(file_name, size, limit));
        }

        Ok(media_type)
    }
}

fn check_media_type(file_name: &str, bytes: &[u8]) -> Result<&'static str, AssetError> {
    match infer::get(bytes) {
        Some(kind) if kind.matcher_type() == infer::MatcherType::Image => Ok(kind.mime_type()),
        Some(kind) => Err(AssetError::UnsupportedType {
            file_name: file_name.to_string(),
            detected: kind.mime_type().to_string(),
        }),
        None => Err(AssetError::UnsupportedType {
            file_name: file_name.to_string(),
            detected: "unknown".to_string(),
        }),
    }
}

fn too_large(file_name: &str, size: u64, limit: u64) -> AssetError {
    AssetError::TooLarge {
        file_name: file_name.to_string(),
        size_label: format_file_size(size),
        limit_label: format_file_size(limit),
    }
}

/// Formats a byte count with 1024-based units.
///
/// Two decimal places at most, trailing zeros dropped: `0 Bytes`, `500 Bytes`, `1.5 KB`,
/// `10 MB`.
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit = 0;
    let mut scaled = bytes as f64;
    while scaled >= 1024.0 && unit < UNITS.len() - 1 {
        scaled /= 1024.0;
        unit += 1;
    }

    let fixed = format!("{:.2}", scaled);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", trimmed, UNITS[unit])
}

/// Scales `(width, height)` down to fit `(max_width, max_height)` keeping the aspect ratio.
///
/// Dimensions already inside the box are returned unchanged. Each side is at least 1.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width <= max_width && height <= max_height {
        return (width, height);
    }
    let ratio = f64::min(
        max_width as f64 / width as f64,
        max_height as f64 / height as f64,
    );
    let scaled_width = ((width as f64 * ratio).floor() as u32).max(1);
    let scaled_height = ((height as f64 * ratio).floor() as u32).max(1);
    (scaled_width, scaled_height)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba([10, 20, 30, 255]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn test_file_size_labels_match_user_facing_format() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(500), "500 Bytes");
        assert_eq!(format_file_size(1024), "1 KB");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1_300_000), "1.24 MB");
        assert_eq!(format_file_size(10 * 1024 * 1024), "10 MB");
    }

    #[test]
    fn test_fit_within_scales_down_only() {
        assert_eq!(fit_within(800, 200, 400, 200), (400, 100));
        assert_eq!(fit_within(300, 600, 400, 200), (100, 200));
        assert_eq!(fit_within(120, 60, 400, 200), (120, 60));
        assert_eq!(fit_within(4000, 1, 400, 200), (400, 1));
    }

    #[test]
    fn test_attachment_from_png_bytes() {
        let service = AssetService::new();
        let bytes = png_bytes(4, 4);
        let attachment = service.attachment_from_bytes("ecg.png", &bytes).unwrap();

        assert_eq!(attachment.display_name, "ecg.png");
        assert_eq!(attachment.mime_type, "image/png");
        assert_eq!(attachment.image.media_type(), Some("image/png"));
        assert_eq!(attachment.ordinal, 0);
        assert_eq!(attachment.size_label, format_file_size(bytes.len() as u64));
        assert_eq!(attachment.id.as_str().len(), 32);
    }

    #[test]
    fn test_attachment_rejects_non_images() {
        let service = AssetService::new();
        let result = service.attachment_from_bytes("notes.pdf", b"%PDF-1.7 fake body");
        assert!(matches!(result, Err(AssetError::UnsupportedType { .. })));

        let result = service.attachment_from_bytes("plain.txt", b"just some words");
        assert!(matches!(
            result,
            Err(AssetError::UnsupportedType { detected, .. }) if detected == "unknown"
        ));
    }

    #[test]
    fn test_attachment_rejects_empty_files() {
        let service = AssetService::new();
        assert!(matches!(
            service.attachment_from_bytes("empty.png", &[]),
            Err(AssetError::Empty(_))
        ));
    }

    #[test]
    fn test_attachment_over_limit_is_rejected() {
        let bytes = png_bytes(64, 64);
        let service = AssetService::new().with_limits(16, 16);
        assert!(matches!(
            service.attachment_from_bytes("big.png", &bytes),
            Err(AssetError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_signature_is_scaled_into_box_and_reencoded() {
        let service = AssetService::new();
        let bytes = png_bytes(800, 200);
        let signature = service
            .signature_from_bytes("assinatura.png", &bytes, Utc::now())
            .unwrap();

        assert_eq!(signature.source, SignatureSource::Uploaded);
        assert_eq!(signature.original_file_name, "assinatura.png");
        assert!(signature.captured_at.ends_with('Z'));

        let payload = signature.image.base64_payload().unwrap();
        let decoded = general_purpose::STANDARD.decode(payload).unwrap();
        let img = image::load_from_memory(&decoded).unwrap();
        assert_eq!((img.width(), img.height()), (400, 100));
    }

    #[test]
    fn test_small_signature_keeps_its_size() {
        let service = AssetService::new();
        let signature = service
            .signature_from_bytes("s.png", &png_bytes(120, 40), Utc::now())
            .unwrap();
        let decoded = general_purpose::STANDARD
            .decode(signature.image.base64_payload().unwrap())
            .unwrap();
        let img = image::load_from_memory(&decoded).unwrap();
        assert_eq!((img.width(), img.height()), (120, 40));
    }

    #[test]
    fn test_attachment_from_path_uses_file_name() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("tomografia 1.png");
        fs::write(&path, png_bytes(2, 2)).unwrap();

        let attachment = AssetService::new().attachment_from_path(&path).unwrap();
        assert_eq!(attachment.display_name, "tomografia 1.png");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();
        let result = AssetService::new().attachment_from_path(&temp.path().join("nope.png"));
        assert!(matches!(result, Err(AssetError::Io(_))));
    }

    #[test]
    fn test_oversized_file_is_rejected_from_its_length() {
        let temp = TempDir::new().unwrap();
        let service = AssetService::new().with_limits(64, 64);

        let big_png = temp.path().join("grande.png");
        let mut bytes = png_bytes(2, 2);
        bytes.resize(4096, 0);
        fs::write(&big_png, &bytes).unwrap();
        let Err(AssetError::TooLarge { size_label, .. }) = service.attachment_from_path(&big_png)
        else {
            panic!("expected TooLarge");
        };
        assert_eq!(size_label, "4 KB");
        assert!(matches!(
            service.signature_from_path(&big_png),
            Err(AssetError::TooLarge { .. })
        ));

        let big_text = temp.path().join("notas.txt");
        fs::write(&big_text, "texto ".repeat(1000)).unwrap();
        assert!(matches!(
            service.attachment_from_path(&big_text),
            Err(AssetError::UnsupportedType { .. })
        ));
    }
}
