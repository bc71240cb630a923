//! Image-bearing records: attachments, signatures and the data URIs that carry their bytes.

use crate::{lenient, TypesError};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// An inline `data:` URI holding an encoded image.
///
/// Construction through [`DataUri::parse`] or [`DataUri::from_base64`] checks the shape.
/// Deserialisation does not: a draft with a damaged image must still restore its other fields,
/// and the renderer treats the URI as opaque text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DataUri(#[serde(deserialize_with = "lenient::text")] String);

impl DataUri {
    pub fn parse(input: impl Into<String>) -> Result<Self, TypesError> {
        let input = input.into();
        let Some(rest) = input.strip_prefix("data:") else {
            return Err(TypesError::InvalidDataUri("missing data: scheme".into()));
        };
        if !rest.contains(',') {
            return Err(TypesError::InvalidDataUri("missing payload separator".into()));
        }
        Ok(Self(input))
    }

    /// Builds `data:<media_type>;base64,<payload>` from an already-encoded payload.
    pub fn from_base64(media_type: &str, payload: &str) -> Result<Self, TypesError> {
        if media_type.trim().is_empty() {
            return Err(TypesError::InvalidDataUri("empty media type".into()));
        }
        Ok(Self(format!("data:{};base64,{}", media_type, payload)))
    }

    /// Media type declared in the URI header, if any.
    pub fn media_type(&self) -> Option<&str> {
        let header = self.0.strip_prefix("data:")?.split(',').next()?;
        let media_type = header.split(';').next()?;
        (!media_type.is_empty()).then_some(media_type)
    }

    /// Base64 payload, or `None` when the URI is not base64-encoded.
    pub fn base64_payload(&self) -> Option<&str> {
        let (header, payload) = self.0.strip_prefix("data:")?.split_once(',')?;
        header.ends_with(";base64").then_some(payload)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for DataUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DataUri {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of an attachment.
///
/// Older drafts stored a floating point millisecond timestamp here, so numbers are accepted on
/// input and normalised to text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AttachmentId(String);

impl AttachmentId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttachmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AttachmentId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        lenient::text(deserializer).map(AttachmentId)
    }
}

impl Default for AttachmentId {
    fn default() -> Self {
        Self(String::new())
    }
}

/// An uploaded image shown as a trailing page of the report.
///
/// `ordinal` is 1-based and always equals the attachment's position plus one once a mutation
/// has settled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default)]
    pub id: AttachmentId,

    #[serde(rename = "name", default, deserialize_with = "lenient::text")]
    pub display_name: String,

    #[serde(rename = "data", default)]
    pub image: DataUri,

    #[serde(rename = "type", default, deserialize_with = "lenient::text")]
    pub mime_type: String,

    #[serde(
        rename = "tamanho",
        default = "unknown_size_label",
        deserialize_with = "size_label"
    )]
    pub size_label: String,

    #[serde(
        rename = "numero",
        default = "first_ordinal",
        deserialize_with = "lenient::ordinal"
    )]
    pub ordinal: u32,
}

/// Size label used when the stored record did not carry one.
pub const UNKNOWN_SIZE_LABEL: &str = "unknown";

fn unknown_size_label() -> String {
    UNKNOWN_SIZE_LABEL.to_string()
}

fn size_label<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let label = lenient::text(deserializer)?;
    Ok(if label.trim().is_empty() {
        unknown_size_label()
    } else {
        label
    })
}

fn first_ordinal() -> u32 {
    1
}

/// How a signature image was obtained.
///
/// Uploading is the only source; any stored tag reads back as [`SignatureSource::Uploaded`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureSource {
    #[default]
    Uploaded,
}

impl<'de> Deserialize<'de> for SignatureSource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        lenient::text(deserializer).map(|_| SignatureSource::Uploaded)
    }
}

/// The professional's signature image embedded in the report footer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    #[serde(rename = "data", default)]
    pub image: DataUri,

    #[serde(rename = "type", default)]
    pub source: SignatureSource,

    /// ISO-8601 capture time
    #[serde(rename = "timestamp", default, deserialize_with = "lenient::text")]
    pub captured_at: String,

    #[serde(rename = "originalName", default, deserialize_with = "lenient::text")]
    pub original_file_name: String,
}

impl Signature {
    /// A signature whose image is empty is treated as absent by the renderer.
    pub fn has_image(&self) -> bool {
        !self.image.is_empty()
    }
}
