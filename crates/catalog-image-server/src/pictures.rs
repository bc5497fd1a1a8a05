//! Category picture storage
//!
//! Pictures are stored one file per category id, as the raw bytes of the
//! category's picture column. Older rows carry a 78-byte OLE object header in
//! front of a BMP payload; that header is stripped when serving.

use crate::error::Result;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

const OLE_HEADER_LEN: usize = 78;

/// A decoded picture ready to be served
#[derive(Debug, Clone, PartialEq)]
pub struct Picture {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

/// Reads category pictures from a directory
pub struct PictureStore {
    dir: PathBuf,
}

impl PictureStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    /// Load the picture for a category, `None` if it has none
    pub async fn load(&self, id: u32) -> Result<Option<Picture>> {
        let path = self.dir.join(id.to_string());
        match fs::read(&path).await {
            Ok(raw) if raw.is_empty() => Ok(None),
            Ok(raw) => {
                let picture = decode_picture(raw);
                debug!(
                    id,
                    size = picture.bytes.len(),
                    content_type = picture.content_type,
                    "Loaded picture"
                );
                Ok(Some(picture))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Category ids that have a picture, ascending
    pub async fn ids(&self) -> Result<Vec<u32>> {
        let mut ids = Vec::new();
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(ids),
            Err(e) => return Err(e.into()),
        };

        while let Some(item) = dir.next_entry().await? {
            if let Some(id) = item.file_name().to_str().and_then(|n| n.parse().ok()) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }
}

/// Strip a legacy OLE header if a BMP follows it, otherwise assume JPEG
fn decode_picture(raw: Vec<u8>) -> Picture {
    if raw.len() > OLE_HEADER_LEN && raw[OLE_HEADER_LEN..].starts_with(b"BM") {
        return Picture {
            bytes: raw[OLE_HEADER_LEN..].to_vec(),
            content_type: "image/bmp",
        };
    }
    Picture {
        bytes: raw,
        content_type: "image/jpeg",
    }
}

#[cfg(test)]
pub(crate) fn ole_wrapped_bmp() -> Vec<u8> {
    let mut raw = vec![0u8; OLE_HEADER_LEN];
    raw.extend_from_slice(b"BM\x36\x00 bitmap body");
    raw
}
