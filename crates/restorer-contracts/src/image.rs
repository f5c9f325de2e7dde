use std::fmt;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::ImageReader;

/// MIME type assumed when a producer does not report one.
pub const DEFAULT_IMAGE_MIME: &str = "image/png";

/// Upload size hint shown to users. Advisory only; nothing rejects on it.
pub const ADVISORY_MAX_BYTES: u64 = 10 * 1024 * 1024;

const UNKNOWN_MIME: &str = "application/octet-stream";

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("Failed to read the image file ({}): {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{file_name} is not a supported image ({mime_type}); choose a PNG, JPG, GIF or WebP file")]
    UnsupportedType {
        file_name: String,
        mime_type: String,
    },
    #[error("invalid data URI: {0}")]
    InvalidDataUri(String),
}

/// An image payload tagged with the MIME type that describes it.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    mime_type: String,
    bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn new(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        let mime_type = mime_type.into();
        let mime_type = if mime_type.trim().is_empty() {
            DEFAULT_IMAGE_MIME.to_string()
        } else {
            mime_type.trim().to_ascii_lowercase()
        };
        Self { mime_type, bytes }
    }

    /// Decodes a `data:<mime>;base64,<payload>` string.
    pub fn from_data_uri(raw: &str) -> Result<Self, AcquisitionError> {
        let rest = raw
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| AcquisitionError::InvalidDataUri("missing data: prefix".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| AcquisitionError::InvalidDataUri("missing payload".to_string()))?;
        let Some(mime_type) = header.strip_suffix(";base64") else {
            return Err(AcquisitionError::InvalidDataUri(
                "only base64 payloads are supported".to_string(),
            ));
        };
        let bytes = BASE64
            .decode(payload.as_bytes())
            .map_err(|err| AcquisitionError::InvalidDataUri(err.to_string()))?;
        Ok(Self::new(mime_type, bytes))
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }

    pub fn base64_data(&self) -> String {
        BASE64.encode(&self.bytes)
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.base64_data())
    }

    /// File extension matching the MIME subtype, e.g. `image/jpeg` -> `jpeg`.
    pub fn extension(&self) -> String {
        extension_for_mime(Some(&self.mime_type))
    }

    /// Pixel dimensions read from the image header, if the format is known.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        ImageReader::new(Cursor::new(self.bytes.as_slice()))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()
    }
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// An acquired image plus the name of the file it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedImage {
    pub file_name: String,
    pub image: EncodedImage,
}

/// Reads a user-selected file into a [`StagedImage`].
///
/// The MIME type is the file's declared type (from its extension). Files with
/// an unrecognised extension are sniffed by magic bytes. Restricting accepted
/// types is left to the caller.
pub fn acquire(path: &Path) -> Result<StagedImage, AcquisitionError> {
    let bytes = fs::read(path).map_err(|source| AcquisitionError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let mime_type = mime_for_path(path)
        .or_else(|| sniff_mime(&bytes))
        .unwrap_or(UNKNOWN_MIME);
    let file_name = path
        .file_name()
        .and_then(|value| value.to_str())
        .filter(|value| !value.is_empty())
        .unwrap_or("photo")
        .to_string();
    Ok(StagedImage {
        file_name,
        image: EncodedImage::new(mime_type, bytes),
    })
}

pub fn mime_for_path(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        "tif" | "tiff" => Some("image/tiff"),
        "heic" => Some("image/heic"),
        "heif" => Some("image/heif"),
        _ => None,
    }
}

fn sniff_mime(bytes: &[u8]) -> Option<&'static str> {
    image::guess_format(bytes)
        .ok()
        .map(|format| format.to_mime_type())
}

pub fn extension_for_mime(mime: Option<&str>) -> String {
    mime.and_then(|value| value.split(';').next())
        .and_then(|value| value.split_once('/'))
        .map(|(_, subtype)| subtype.split('+').next().unwrap_or("").trim())
        .filter(|subtype| !subtype.is_empty())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "png".to_string())
}
