//! Decoding of `data:<media-type>;base64,<body>` upload payloads.

use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DataUrlError {
    #[error("payload is not a `data:<media-type>;base64,` URL")]
    Shape,
    #[error("media type `{0}` is not valid")]
    MediaType(String),
    #[error("base64 body could not be decoded: {0}")]
    Base64(String),
}

/// Raw image bytes pulled out of a data URL, with their declared media type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub media_type: String,
    pub bytes: Bytes,
}

impl DecodedImage {
    /// Parse a data URL.
    ///
    /// The media type may only contain ASCII letters, `-`, `+` and `/`, so
    /// parameters such as `;charset=` are rejected.
    pub fn parse(payload: &str) -> Result<Self, DataUrlError> {
        let rest = payload.strip_prefix("data:").ok_or(DataUrlError::Shape)?;
        let (media_type, body) = rest.split_once(";base64,").ok_or(DataUrlError::Shape)?;

        if media_type.is_empty()
            || !media_type
                .chars()
                .all(|c| c.is_ascii_alphabetic() || matches!(c, '-' | '+' | '/'))
        {
            return Err(DataUrlError::MediaType(media_type.to_string()));
        }
        if body.is_empty() {
            return Err(DataUrlError::Shape);
        }

        let bytes = general_purpose::STANDARD
            .decode(body)
            .map_err(|err| DataUrlError::Base64(err.to_string()))?;

        Ok(Self {
            media_type: media_type.to_ascii_lowercase(),
            bytes: Bytes::from(bytes),
        })
    }

    /// File extension used when the backend stores the image under a file name.
    ///
    /// Image types take the extension `mime_guess` knows them by, preferring
    /// one spelled like the subtype (`image/jpeg` stores as `.jpeg`). Anything
    /// else is stored as `.bin`.
    pub fn extension(&self) -> &'static str {
        let Some(("image", subtype)) = self.media_type.split_once('/') else {
            return "bin";
        };
        let extensions = mime_guess::get_mime_extensions_str(&self.media_type).unwrap_or_default();
        extensions
            .iter()
            .find(|ext| **ext == subtype)
            .or_else(|| extensions.first())
            .copied()
            .unwrap_or("bin")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_jpeg_payload() {
        let image = DecodedImage::parse("data:image/jpeg;base64,AAAA").unwrap();
        assert_eq!(image.media_type, "image/jpeg");
        assert_eq!(image.bytes.as_ref(), &[0u8, 0, 0]);
        assert_eq!(image.extension(), "jpeg");
    }

    #[test]
    fn image_extensions_come_from_known_types() {
        let extension = |media_type: &str| {
            DecodedImage::parse(&format!("data:{};base64,AAAA", media_type))
                .unwrap()
                .extension()
        };
        assert_eq!(extension("image/png"), "png");
        assert_eq!(extension("image/webp"), "webp");
        assert_eq!(extension("image/svg+xml"), "svg");
        assert_eq!(extension("image/x-unheard-of"), "bin");
    }

    #[test]
    fn stored_extensions_serve_back_as_the_uploaded_type() {
        for media_type in ["image/jpeg", "image/png", "image/gif", "image/webp", "image/svg+xml"] {
            let image = DecodedImage::parse(&format!("data:{};base64,AAAA", media_type)).unwrap();
            let served = mime_guess::from_path(format!("photo.{}", image.extension()))
                .first_or_octet_stream();
            assert_eq!(served.essence_str(), media_type);
        }
    }

    #[test]
    fn rejects_missing_prefix() {
        assert_eq!(DecodedImage::parse("AAAA"), Err(DataUrlError::Shape));
        assert_eq!(
            DecodedImage::parse("image/png;base64,AAAA"),
            Err(DataUrlError::Shape)
        );
        assert_eq!(
            DecodedImage::parse("data:image/png,AAAA"),
            Err(DataUrlError::Shape)
        );
    }

    #[test]
    fn rejects_empty_body() {
        assert_eq!(
            DecodedImage::parse("data:image/png;base64,"),
            Err(DataUrlError::Shape)
        );
    }

    #[test]
    fn rejects_media_type_parameters() {
        assert!(matches!(
            DecodedImage::parse("data:image/png;charset=utf-8;base64,AAAA"),
            Err(DataUrlError::MediaType(_))
        ));
        assert!(matches!(
            DecodedImage::parse("data:;base64,AAAA"),
            Err(DataUrlError::MediaType(_))
        ));
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(matches!(
            DecodedImage::parse("data:image/png;base64,@@@"),
            Err(DataUrlError::Base64(_))
        ));
    }

    #[test]
    fn unknown_media_types_fall_back_to_bin() {
        let image = DecodedImage::parse("data:application/octet-stream;base64,AQID").unwrap();
        assert_eq!(image.bytes.as_ref(), &[1u8, 2, 3]);
        assert_eq!(image.extension(), "bin");
    }
}
