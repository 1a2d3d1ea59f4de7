//! Company logos, signatures and seals are stored inline as data URLs so a
//! company record stays self-contained.

use std::fs;
use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::error::ImageError;

/// Reads an image file and encodes it as `data:<mime>;base64,<payload>`.
pub fn encode_file(path: &Path) -> Result<String, ImageError> {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    if mime.type_() != mime_guess::mime::IMAGE {
        return Err(ImageError::NotImage(path.display().to_string()));
    }
    let bytes = fs::read(path).map_err(|source| ImageError::Read { path: path.to_path_buf(), source })?;
    Ok(encode(mime.essence_str(), &bytes))
}

pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedImage {
    pub mime: String,
    pub bytes: Vec<u8>,
}

impl DecodedImage {
    /// File extension matching the image type, for writing it to disk.
    pub fn extension(&self) -> &'static str {
        match self.mime.as_str() {
            "image/jpeg" => "jpg",
            "image/svg+xml" => "svg",
            "image/gif" => "gif",
            "image/webp" => "webp",
            _ => mime_guess::get_mime_extensions_str(&self.mime)
                .and_then(|exts| exts.first().copied())
                .unwrap_or("png"),
        }
    }
}

pub fn decode(data_url: &str) -> Result<DecodedImage, ImageError> {
    let rest = data_url.trim().strip_prefix("data:").ok_or(ImageError::Malformed)?;
    let (header, payload) = rest.split_once(',').ok_or(ImageError::Malformed)?;
    let mime = header.strip_suffix(";base64").ok_or(ImageError::Malformed)?;
    if !mime.starts_with("image/") {
        return Err(ImageError::NotImage(mime.to_string()));
    }
    Ok(DecodedImage {
        mime: mime.to_string(),
        bytes: STANDARD.decode(payload.trim())?,
    })
}
