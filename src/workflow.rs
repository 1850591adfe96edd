// Upload workflow: a linear pass over the registry and the storage
// endpoint. Every step blocks until its network call completes and no
// step is retried; the first failure ends the run.

use log::{info, warn};

use crate::error::{Result, UploadError};
use crate::multipart::{self, MultipartField};
use crate::registry::{snippet, FileRegistry, UploadCredentials, UploadRequest};
use crate::storage::{self, StorageTransport};

/// What to do when the registry already holds a file of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictPolicy {
    /// Announce the conflict, delete the old entry, upload the new one.
    Replace,
    /// Delete the old entry without comment.
    OverwriteSilently,
    /// Abort with `FileAlreadyExists` before registering anything.
    FailOnConflict,
}

/// Step the workflow is currently in; reported to the optional
/// progress callback. Purely informational, never drives control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Listing,
    Deleting,
    Registering,
    Uploading,
    Done,
}

impl Phase {
    pub fn message(&self) -> &'static str {
        match self {
            Phase::Listing => "Checking for an existing file...",
            Phase::Deleting => "Deleting the existing entry...",
            Phase::Registering => "Registering the upload...",
            Phase::Uploading => "Uploading...",
            Phase::Done => "Done",
        }
    }
}

pub struct UploadWorkflow<'a> {
    registry: &'a dyn FileRegistry,
    storage: &'a dyn StorageTransport,
    policy: ConflictPolicy,
    progress: Option<&'a dyn Fn(Phase)>,
}

impl<'a> UploadWorkflow<'a> {
    pub fn new(
        registry: &'a dyn FileRegistry,
        storage: &'a dyn StorageTransport,
        policy: ConflictPolicy,
    ) -> Self {
        UploadWorkflow {
            registry,
            storage,
            policy,
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: &'a dyn Fn(Phase)) -> Self {
        self.progress = Some(progress);
        self
    }

    fn report(&self, phase: Phase) {
        if let Some(progress) = self.progress {
            progress(phase);
        }
    }

    /// Run the whole upload and return the public URL of the stored
    /// object.
    pub fn run(&self, repo: &str, request: &UploadRequest) -> Result<String> {
        self.report(Phase::Listing);
        let entries = self.registry.list(repo)?;

        if let Some(existing) = entries.iter().find(|e| e.name == request.name) {
            let id = existing.id_str();
            match self.policy {
                ConflictPolicy::FailOnConflict => {
                    return Err(UploadError::FileAlreadyExists(request.name.clone()));
                }
                ConflictPolicy::Replace => {
                    info!(
                        "file \"{}\" already exists as entry {}, deleting it",
                        request.name, id
                    );
                    self.delete_existing(repo, &id);
                }
                ConflictPolicy::OverwriteSilently => {
                    self.delete_existing(repo, &id);
                }
            }
        }

        self.report(Phase::Registering);
        let credentials = self.registry.register(repo, request)?;

        self.report(Phase::Uploading);
        let url = self.upload(&credentials, request)?;

        self.report(Phase::Done);
        Ok(url)
    }

    // Best effort: a stale entry that cannot be deleted must not stop
    // the new upload.
    fn delete_existing(&self, repo: &str, id: &str) {
        self.report(Phase::Deleting);
        if let Err(e) = self.registry.delete_by_id(repo, id) {
            warn!("{}", e);
        }
    }

    fn upload(&self, credentials: &UploadCredentials, request: &UploadRequest) -> Result<String> {
        let status_field = credentials.success_status.to_string();
        // The bucket's parser requires exactly this field order, with
        // the file content last.
        let fields = [
            MultipartField::text("key", &credentials.object_key),
            MultipartField::text("acl", &credentials.acl),
            MultipartField::text("success_action_status", &status_field),
            MultipartField::text("Filename", &credentials.name),
            MultipartField::text("AWSAccessKeyId", &credentials.access_key_id),
            MultipartField::text("Policy", &credentials.policy),
            MultipartField::text("Signature", &credentials.signature),
            MultipartField::text("Content-Type", &credentials.mime_type),
            MultipartField::file(
                "file",
                request.file_content(),
                &credentials.mime_type,
                &request.name,
                request.size_bytes,
            ),
        ];

        let boundary = multipart::random_boundary();
        let (body, content_type) = multipart::encode(&boundary, &fields)?;
        let reply = self.storage.post(&credentials.target_url, &content_type, body)?;

        if reply.status != credentials.success_status {
            // Keep whatever the server said, even when it is not the
            // expected XML error shape.
            let (code, message) = storage::error_details(&reply.body).unwrap_or_else(|| {
                let message = if reply.body.trim().is_empty() {
                    "storage endpoint returned an unexpected response".to_string()
                } else {
                    snippet(&reply.body)
                };
                ("UploadFailed".to_string(), message)
            });
            return Err(UploadError::UploadRejected {
                status: reply.status,
                code,
                message,
            });
        }

        Ok(storage::success_location(&reply.body).unwrap_or_else(|| {
            format!("{}{}", credentials.target_url, credentials.object_key)
        }))
    }
}
