// Image block translation (request direction only — spec §4.1: `image`
// blocks translate to Gemini `inlineData`; there is no response-direction
// image path in this gateway).

use super::models::{validate_image_size, ImageFormat};
use crate::error::{ProxyError, Result};
use crate::models::anthropic::ImageSource;
use crate::models::gemini::InlineData;
use base64::Engine;

const DEFAULT_MEDIA_TYPE: &str = "image/png";

/// `image` with `source.type=="base64"` → `{inlineData:{mimeType: source.media_type ?? "image/png", data}}`.
pub fn translate_image_source(source: &ImageSource) -> Result<InlineData> {
    if source.source_type != "base64" {
        return Err(ProxyError::InvalidRequest(format!(
            "unsupported image source type: {}",
            source.source_type
        )));
    }

    let media_type = source.media_type.clone().unwrap_or_else(|| DEFAULT_MEDIA_TYPE.to_string());

    ImageFormat::from_mime_type(&media_type)
        .ok_or_else(|| ProxyError::InvalidRequest(format!("unsupported image format: {media_type}")))?;

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(&source.data)
        .map_err(|e| ProxyError::InvalidRequest(format!("invalid base64 image data: {e}")))?;

    validate_image_size(decoded.len()).map_err(ProxyError::InvalidRequest)?;

    Ok(InlineData { mime_type: media_type, data: source.data.clone() })
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_1X1: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNk+M9QDwADhgGAWjR9awAAAABJRU5ErkJggg==";

    #[test]
    fn translates_valid_image() {
        let source = ImageSource {
            source_type: "base64".to_string(),
            media_type: Some("image/png".to_string()),
            data: PNG_1X1.to_string(),
        };
        let inline = translate_image_source(&source).unwrap();
        assert_eq!(inline.mime_type, "image/png");
        assert_eq!(inline.data, PNG_1X1);
    }

    #[test]
    fn missing_media_type_defaults_to_png() {
        let source = ImageSource { source_type: "base64".to_string(), media_type: None, data: PNG_1X1.to_string() };
        let inline = translate_image_source(&source).unwrap();
        assert_eq!(inline.mime_type, "image/png");
    }

    #[test]
    fn rejects_unsupported_mime_type() {
        let source = ImageSource {
            source_type: "base64".to_string(),
            media_type: Some("image/bmp".to_string()),
            data: "dGVzdA==".to_string(),
        };
        assert!(translate_image_source(&source).is_err());
    }

    #[test]
    fn rejects_invalid_base64() {
        let source = ImageSource {
            source_type: "base64".to_string(),
            media_type: Some("image/png".to_string()),
            data: "not-valid-base64!!!".to_string(),
        };
        assert!(translate_image_source(&source).is_err());
    }
}
