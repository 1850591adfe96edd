// Library root
// -----------
// This crate exposes a small library surface for the CLI. The binary
// (`main.rs`) wires the modules together; keeping them as a library
// lets the workflow run against fakes in tests.
//
// Module responsibilities:
// - `multipart`: wire-exact multipart/form-data body construction.
// - `registry`: metadata API client (list, register, delete) and the
//   upload data model.
// - `storage`: POST of the finished body to the storage bucket and
//   parsing of its XML replies.
// - `workflow`: the linear upload state machine tying it all together.
// - `detect` / `git`: injected capabilities for content-type detection
//   and credential/repository lookup.
pub mod detect;
pub mod error;
pub mod git;
pub mod multipart;
pub mod registry;
pub mod storage;
pub mod workflow;

pub use error::{Result, UploadError};
pub use workflow::{ConflictPolicy, Phase, UploadWorkflow};
