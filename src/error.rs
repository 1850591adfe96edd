// Error taxonomy for the upload pipeline. Every library function
// returns `Result<T, UploadError>`; only `main` decides process exit.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, UploadError>;

#[derive(Error, Debug)]
pub enum UploadError {
    /// The local file to upload is missing or unreadable.
    #[error("cannot read source file {path}: {source}")]
    SourceUnreadable { path: PathBuf, source: io::Error },

    /// The registry answered with a non-success HTTP status.
    #[error("registry request failed with status {status}: {body}")]
    RegistryRequest { status: u16, body: String },

    /// The registry answered 2xx but the payload did not parse.
    #[error("could not parse registry response: {0}")]
    RegistryParse(String),

    /// A file of the same name already exists and the conflict policy
    /// forbids replacing it.
    #[error("file \"{0}\" already exists on the remote")]
    FileAlreadyExists(String),

    /// The registry refused to register the new file.
    #[error("registration rejected with status {status}: {body}")]
    RegistrationRejected { status: u16, body: String },

    /// Removing an existing entry failed. Non-fatal during a replace.
    #[error("deleting remote entry {id} failed with status {status}")]
    DeletionFailed { id: String, status: u16 },

    /// The storage endpoint refused the multipart upload.
    #[error("upload rejected with status {status}: {code}: {message}")]
    UploadRejected {
        status: u16,
        code: String,
        message: String,
    },

    /// A file field was placed before the end of the multipart body.
    /// The storage service requires the file to be the last field.
    #[error("the file field must be the last multipart field")]
    FileFieldOrdering,

    /// A required credential could not be found in the git config.
    #[error("missing credential: {0}")]
    MissingCredential(String),

    /// The repository identifier could not be derived from the origin.
    #[error("could not derive a repository from the origin url \"{0}\"")]
    RepoDetection(String),

    #[error("http transport error: {0}")]
    Transport(#[from] reqwest::Error),
}
