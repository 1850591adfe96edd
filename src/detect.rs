// Content-type detection. The registry wants a MIME type for the file
// being registered; detection is an injected capability so the
// workflow can be tested with a fixed detector.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{Result, UploadError};

pub trait ContentTypeDetector {
    fn detect(&self, path: &Path) -> Result<String>;
}

/// Detector backed by the `infer` magic-byte tables, with a generic
/// fallback when the leading bytes match nothing known.
pub struct InferDetector;

impl ContentTypeDetector for InferDetector {
    fn detect(&self, path: &Path) -> Result<String> {
        let mut file = File::open(path).map_err(|source| UploadError::SourceUnreadable {
            path: path.to_path_buf(),
            source,
        })?;
        // infer only needs the first few KiB.
        let mut head = [0u8; 8192];
        let n = file
            .read(&mut head)
            .map_err(|source| UploadError::SourceUnreadable {
                path: path.to_path_buf(),
                source,
            })?;
        match infer::get(&head[..n]) {
            Some(kind) => Ok(kind.mime_type().to_string()),
            None => Ok("application/octet-stream".to_string()),
        }
    }
}
