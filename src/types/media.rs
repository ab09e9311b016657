//! Media attachments (images, audio) for user and assistant messages.

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum MediaData {
    Url(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub mime_type: String,
    pub data: MediaData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Media {
    pub fn from_url(mime_type: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: None,
            mime_type: mime_type.into(),
            data: MediaData::Url(url.into()),
            name: None,
        }
    }

    pub fn from_bytes(mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            id: None,
            mime_type: mime_type.into(),
            data: MediaData::Bytes(bytes),
            name: None,
        }
    }

    pub fn from_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let mime_type =
            guess_media_type(path).unwrap_or_else(|| "application/octet-stream".to_string());
        let mut media = Self::from_bytes(mime_type, bytes);
        media.name = path.file_name().and_then(|n| n.to_str()).map(str::to_string);
        Ok(media)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Inline payload as base64 (URL media is passed through unchanged).
    pub fn to_base64(&self) -> String {
        match &self.data {
            MediaData::Bytes(bytes) => base64::engine::general_purpose::STANDARD.encode(bytes),
            MediaData::Url(url) => url.clone(),
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

fn guess_media_type(path: &Path) -> Option<String> {
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();
    let mt = match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "m4a" => "audio/mp4",
        _ => return None,
    };
    Some(mt.to_string())
}
