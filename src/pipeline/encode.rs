//! Page images as they travel to a provider: raw bytes + MIME type.
//!
//! Vision APIs accept images as base64 embedded in the JSON request body
//! (Gemini `inline_data`, OpenAI-style `data:` URLs). The bytes are read once
//! per page and encoded on demand by each client.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::Path;
use tracing::debug;

/// An encoded page image.
#[derive(Clone, PartialEq, Eq)]
pub struct PageImage {
    bytes: Vec<u8>,
    mime_type: String,
}

impl std::fmt::Debug for PageImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageImage")
            .field("bytes", &self.bytes.len())
            .field("mime_type", &self.mime_type)
            .finish()
    }
}

impl PageImage {
    pub fn new(bytes: Vec<u8>, mime_type: impl Into<String>) -> Self {
        Self {
            bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Read an image file, guessing its MIME type from the extension.
    pub async fn load(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        debug!("Loaded {} ({} bytes)", path.display(), bytes.len());
        Ok(Self::new(bytes, mime_type_for(path)))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }

    /// `data:` URL for OpenAI-style `image_url` parts.
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

/// MIME type from a file extension; unknown types map to
/// `application/octet-stream`.
pub fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_types() {
        assert_eq!(mime_type_for(Path::new("page_1.png")), "image/png");
        assert_eq!(mime_type_for(Path::new("scan.JPG")), "image/jpeg");
        assert_eq!(mime_type_for(Path::new("x.webp")), "image/webp");
        assert_eq!(mime_type_for(Path::new("noext")), "application/octet-stream");
    }

    #[test]
    fn data_url_is_valid_base64() {
        let img = PageImage::new(vec![0x89, b'P', b'N', b'G'], "image/png");
        let url = img.to_data_url();
        let b64 = url.strip_prefix("data:image/png;base64,").expect("prefix");
        assert_eq!(STANDARD.decode(b64).expect("valid base64"), img.bytes());
    }

    #[tokio::test]
    async fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page_3.png");
        std::fs::write(&path, b"fake png").unwrap();
        let img = PageImage::load(&path).await.unwrap();
        assert_eq!(img.bytes(), b"fake png");
        assert_eq!(img.mime_type(), "image/png");
    }
}
