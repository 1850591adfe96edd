// Registry client: talks to the hosting service's metadata API over
// HTTPS. The registry tracks uploaded file entries and issues the
// one-shot credentials used for the direct-to-storage upload.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use reqwest::blocking::Client;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::detect::ContentTypeDetector;
use crate::error::{Result, UploadError};
use crate::multipart::FileContent;

/// A file to be uploaded. Exactly one content source exists by
/// construction; `size_bytes` always matches the actual content.
pub struct UploadRequest {
    pub name: String,
    pub size_bytes: u64,
    pub content_type: String,
    pub description: Option<String>,
    pub source: UploadSource,
}

pub enum UploadSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl UploadRequest {
    /// Build a request for a file on disk, detecting its content type
    /// via the injected detector.
    pub fn from_path(
        path: &Path,
        detector: &dyn ContentTypeDetector,
        description: Option<String>,
    ) -> Result<Self> {
        let unreadable = |source: io::Error| UploadError::SourceUnreadable {
            path: path.to_path_buf(),
            source,
        };
        let meta = fs::metadata(path).map_err(unreadable)?;
        if !meta.is_file() {
            return Err(unreadable(io::Error::new(
                io::ErrorKind::InvalidInput,
                "not a regular file",
            )));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                unreadable(io::Error::new(io::ErrorKind::InvalidInput, "no file name"))
            })?;
        let content_type = detector.detect(path)?;
        Ok(UploadRequest {
            name,
            size_bytes: meta.len(),
            content_type,
            description,
            source: UploadSource::Path(path.to_path_buf()),
        })
    }

    /// Build a request around in-memory content, mainly for tests and
    /// embedding callers. The name must be non-empty; the registry
    /// keys entries by it.
    pub fn from_bytes(name: &str, content_type: &str, bytes: Vec<u8>) -> Self {
        debug_assert!(!name.is_empty(), "upload name must be non-empty");
        UploadRequest {
            name: name.to_string(),
            size_bytes: bytes.len() as u64,
            content_type: content_type.to_string(),
            description: None,
            source: UploadSource::Bytes(bytes),
        }
    }

    pub(crate) fn file_content(&self) -> FileContent<'_> {
        match &self.source {
            UploadSource::Path(path) => FileContent::Path(path),
            UploadSource::Bytes(bytes) => FileContent::Bytes(bytes),
        }
    }
}

/// One row of the registry's file listing; a read-only snapshot, not
/// cached across calls. `id` and `size` stay as flexible JSON values
/// because API revisions disagree on number-vs-string here.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteFileEntry {
    pub id: Value,
    pub name: String,
    #[serde(default)]
    pub size: Value,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "created_at")]
    pub upload_date: String,
    #[serde(default, rename = "html_url")]
    pub link: String,
}

impl RemoteFileEntry {
    pub fn id_str(&self) -> String {
        plain_string(&self.id)
    }

    pub fn size_display(&self) -> String {
        plain_string(&self.size)
    }
}

fn plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Short-lived credentials issued by one register call and consumed by
/// exactly one upload; never persisted or reused.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadCredentials {
    #[serde(rename = "s3_url")]
    pub target_url: String,
    #[serde(rename = "path")]
    pub object_key: String,
    #[serde(rename = "accesskeyid")]
    pub access_key_id: String,
    pub policy: String,
    // API revisions disagree on the capitalization of this field.
    #[serde(alias = "Signature")]
    pub signature: String,
    pub acl: String,
    #[serde(
        default = "default_success_status",
        alias = "success_action_status"
    )]
    pub success_status: u16,
    pub name: String,
    pub mime_type: String,
}

fn default_success_status() -> u16 {
    201
}

/// Seam over the registry API so the workflow can run against fakes.
pub trait FileRegistry {
    fn list(&self, repo: &str) -> Result<Vec<RemoteFileEntry>>;
    fn register(&self, repo: &str, request: &UploadRequest) -> Result<UploadCredentials>;
    fn delete_by_id(&self, repo: &str, id: &str) -> Result<()>;
}

/// Blocking HTTP client for the registry, authenticating every call
/// with the legacy `Authorization: token <tok>` scheme.
pub struct RegistryClient {
    client: Client,
    api_base: String,
    token: String,
}

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

impl RegistryClient {
    pub fn new(api_base: &str, token: &str) -> Result<Self> {
        let client = Client::builder().build()?;
        Ok(RegistryClient {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    fn downloads_url(&self, repo: &str) -> String {
        format!("{}/repos/{}/downloads", self.api_base, repo)
    }

    fn auth(&self) -> String {
        format!("token {}", self.token)
    }
}

#[derive(Serialize)]
struct RegisterPayload<'a> {
    name: &'a str,
    size: u64,
    content_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

impl FileRegistry for RegistryClient {
    fn list(&self, repo: &str) -> Result<Vec<RemoteFileEntry>> {
        debug!("GET {}", self.downloads_url(repo));
        let res = self
            .client
            .get(self.downloads_url(repo))
            .header(AUTHORIZATION, self.auth())
            .send()?;
        let status = res.status().as_u16();
        let body = res.text().unwrap_or_else(|_| "".into());
        parse_listing(status, &body)
    }

    fn register(&self, repo: &str, request: &UploadRequest) -> Result<UploadCredentials> {
        debug!("POST {}", self.downloads_url(repo));
        let payload = RegisterPayload {
            name: &request.name,
            size: request.size_bytes,
            content_type: &request.content_type,
            description: request.description.as_deref(),
        };
        let res = self
            .client
            .post(self.downloads_url(repo))
            .header(AUTHORIZATION, self.auth())
            .json(&payload)
            .send()?;
        let status = res.status().as_u16();
        let body = res.text().unwrap_or_else(|_| "".into());
        parse_credentials(&request.name, status, &body)
    }

    fn delete_by_id(&self, repo: &str, id: &str) -> Result<()> {
        let url = format!("{}/{}", self.downloads_url(repo), id);
        debug!("DELETE {}", url);
        let res = self
            .client
            .delete(url)
            .header(AUTHORIZATION, self.auth())
            .send()?;
        let status = res.status().as_u16();
        if !(200..300).contains(&status) {
            return Err(UploadError::DeletionFailed {
                id: id.to_string(),
                status,
            });
        }
        Ok(())
    }
}

// Response interpretation is factored out of the HTTP calls so it can
// be tested without a live registry.

fn parse_listing(status: u16, body: &str) -> Result<Vec<RemoteFileEntry>> {
    if !(200..300).contains(&status) {
        return Err(UploadError::RegistryRequest {
            status,
            body: snippet(body),
        });
    }
    serde_json::from_str(body).map_err(|e| UploadError::RegistryParse(e.to_string()))
}

fn parse_credentials(name: &str, status: u16, body: &str) -> Result<UploadCredentials> {
    match status {
        200..=299 => {
            serde_json::from_str(body).map_err(|e| UploadError::RegistryParse(e.to_string()))
        }
        409 | 422 => Err(UploadError::FileAlreadyExists(name.to_string())),
        _ => Err(UploadError::RegistrationRejected {
            status,
            body: snippet(body),
        }),
    }
}

// Keep error payloads readable; remote error bodies can be huge.
pub(crate) fn snippet(body: &str) -> String {
    const MAX: usize = 200;
    if body.len() <= MAX {
        body.to_string()
    } else {
        let mut end = MAX;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &body[..end])
    }
}
