//! Image encoding: local path or URL → canonical base64 PNG.
//!
//! Whatever the source format (PNG from the rasteriser, a JPEG someone points
//! us at), the bytes are decoded and re-encoded as PNG before transport, so
//! the backend always receives a format it accepts. PNG is lossless, which
//! keeps rendered text crisp for the vision model. Encoding the same source
//! twice yields byte-identical output.

use crate::error::DigestError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// A transport-ready image: base64 payload plus its MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub mime_type: &'static str,
    /// Standard base64 (with padding) of the encoded bytes.
    pub data: String,
}

impl EncodedImage {
    /// `data:<mime>;base64,<data>` form used by OpenAI-style APIs.
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    /// The edgequake-llm attachment for provider-backed requests.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.data.clone(), self.mime_type).with_detail("high")
    }
}

/// Where an image comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageSource {
    Local(PathBuf),
    Remote(String),
}

impl ImageSource {
    /// `http://` and `https://` locations are remote; anything else is a path.
    pub fn parse(location: &str) -> Self {
        if is_url(location) {
            ImageSource::Remote(location.to_string())
        } else {
            ImageSource::Local(PathBuf::from(location))
        }
    }

    /// Human-readable location for logs and errors.
    pub fn label(&self) -> String {
        match self {
            ImageSource::Local(path) => path.display().to_string(),
            ImageSource::Remote(url) => url.clone(),
        }
    }
}

/// Check if the location string looks like a URL.
pub fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Loads images from disk or HTTP and normalises them to [`EncodedImage`].
#[derive(Debug, Clone)]
pub struct ImageEncoder {
    client: reqwest::Client,
    timeout: Duration,
}

impl ImageEncoder {
    /// `timeout` bounds the whole load (read or fetch) for one image.
    pub fn new(timeout: Duration) -> Result<Self, DigestError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DigestError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { client, timeout })
    }

    /// Load `location` (a path or URL) and encode it. No retries.
    pub async fn encode(&self, location: &str) -> Result<EncodedImage, DigestError> {
        self.encode_source(&ImageSource::parse(location)).await
    }

    /// Encode a local file. The path is read as-is, without a round trip
    /// through UTF-8.
    pub async fn encode_path(&self, path: &Path) -> Result<EncodedImage, DigestError> {
        self.encode_source(&ImageSource::Local(path.to_path_buf())).await
    }

    /// Load `source` and encode it. No retries.
    pub async fn encode_source(&self, source: &ImageSource) -> Result<EncodedImage, DigestError> {
        let location = source.label();
        let bytes = match tokio::time::timeout(self.timeout, self.load(source, &location)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(DigestError::SourceUnreadable {
                    location,
                    reason: format!("timed out after {}s", self.timeout.as_secs()),
                })
            }
        };
        encode_bytes(&bytes, &location)
    }

    async fn load(&self, source: &ImageSource, location: &str) -> Result<Vec<u8>, DigestError> {
        let unreadable = |reason: String| DigestError::SourceUnreadable {
            location: location.to_string(),
            reason,
        };

        match source {
            ImageSource::Local(path) => tokio::fs::read(path)
                .await
                .map_err(|e| unreadable(e.to_string())),
            ImageSource::Remote(url) => {
                let response = self
                    .client
                    .get(url)
                    .send()
                    .await
                    .map_err(|e| unreadable(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(unreadable(format!("HTTP {}", response.status())));
                }
                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| unreadable(e.to_string()))?;
                Ok(bytes.to_vec())
            }
        }
    }
}

/// Decode `bytes` as any supported raster format and re-encode as base64 PNG.
///
/// `location` is only used for error context.
pub fn encode_bytes(bytes: &[u8], location: &str) -> Result<EncodedImage, DigestError> {
    let img = image::load_from_memory(bytes).map_err(|e| DigestError::DecodeUnsupported {
        location: location.to_string(),
        detail: e.to_string(),
    })?;

    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| DigestError::DecodeUnsupported {
            location: location.to_string(),
            detail: format!("PNG re-encode failed: {e}"),
        })?;

    let data = STANDARD.encode(&buf);
    debug!(
        "Encoded {} ({}x{}) → {} bytes base64",
        location,
        img.width(),
        img.height(),
        data.len()
    );

    Ok(EncodedImage {
        mime_type: "image/png",
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb, RgbImage};

    fn sample(format: image::ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(8, 6, |x, y| {
            Rgb([(x * 30) as u8, (y * 40) as u8, 128])
        }));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.com/page.png"));
        assert!(is_url("http://example.com/page.png"));
        assert!(!is_url("/tmp/page.png"));
        assert!(!is_url("tmp/tmpPdfImage-1.png"));
        assert!(!is_url(""));
    }

    #[test]
    fn jpeg_is_reencoded_as_png() {
        let data = encode_bytes(&sample(image::ImageFormat::Jpeg), "page.jpg").unwrap();
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert_eq!(&decoded[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn encoding_is_deterministic() {
        let bytes = sample(image::ImageFormat::Png);
        let a = encode_bytes(&bytes, "a.png").unwrap();
        let b = encode_bytes(&bytes, "a.png").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn garbage_is_decode_unsupported() {
        let err = encode_bytes(b"%PDF-1.7 not an image", "x.png").unwrap_err();
        assert!(matches!(err, DigestError::DecodeUnsupported { .. }));
    }

    #[test]
    fn data_url_prefix() {
        let img = EncodedImage {
            mime_type: "image/png",
            data: "AAAA".into(),
        };
        assert_eq!(img.data_url(), "data:image/png;base64,AAAA");
    }

    #[tokio::test]
    async fn local_file_round_trip_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("page.png");
        std::fs::write(&path, sample(image::ImageFormat::Png)).unwrap();

        let encoder = ImageEncoder::new(Duration::from_secs(5)).unwrap();
        let loc = path.to_string_lossy();
        let first = encoder.encode(&loc).await.unwrap();
        let second = encoder.encode(&loc).await.unwrap();
        assert_eq!(first.data, second.data);
    }

    #[tokio::test]
    async fn missing_local_file_is_source_unreadable() {
        let encoder = ImageEncoder::new(Duration::from_secs(5)).unwrap();
        let err = encoder
            .encode("/definitely/not/here/page-1.png")
            .await
            .unwrap_err();
        assert!(matches!(err, DigestError::SourceUnreadable { .. }));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn non_utf8_path_is_read_as_is() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(OsStr::from_bytes(b"page-\xff.png"));
        std::fs::write(&path, sample(image::ImageFormat::Png)).unwrap();

        let encoder = ImageEncoder::new(Duration::from_secs(5)).unwrap();
        let encoded = encoder.encode_path(&path).await.unwrap();
        assert_eq!(encoded.mime_type, "image/png");

        // The lossy string form names a different file.
        let lossy = path.to_string_lossy();
        assert!(encoder.encode(&lossy).await.is_err());
    }

    #[test]
    fn source_label_names_the_location() {
        assert_eq!(ImageSource::parse("/tmp/p-1.png").label(), "/tmp/p-1.png");
        assert_eq!(
            ImageSource::parse("https://example.com/p.png").label(),
            "https://example.com/p.png"
        );
    }
}
