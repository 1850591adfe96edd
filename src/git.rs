// Credential and repository lookup from the local git configuration.
// Kept behind a trait so the workflow and CLI can be exercised without
// a git checkout. Tokens are never logged and never written anywhere
// by this tool.

use std::process::Command;

use crate::error::{Result, UploadError};

pub trait CredentialProvider {
    /// Personal upload token for the hosting service.
    fn token(&self) -> Result<String>;
    /// Repository identifier (`owner/name`) to use when none was given
    /// on the command line.
    fn default_repo(&self) -> Result<String>;
}

/// Reads `hostup.token` and `remote.origin.url` via `git config`.
pub struct GitCredentialProvider;

const TOKEN_KEY: &str = "hostup.token";

impl GitCredentialProvider {
    fn config_value(&self, key: &str) -> Result<String> {
        let output = Command::new("git")
            .args(["config", "--get", key])
            .output()
            .map_err(|_| UploadError::MissingCredential(key.to_string()))?;
        let value = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() || value.is_empty() {
            return Err(UploadError::MissingCredential(key.to_string()));
        }
        Ok(value)
    }
}

impl CredentialProvider for GitCredentialProvider {
    fn token(&self) -> Result<String> {
        self.config_value(TOKEN_KEY)
    }

    fn default_repo(&self) -> Result<String> {
        let origin = self.config_value("remote.origin.url")?;
        repo_from_origin(&origin)
    }
}

/// Derive `owner/name` from an scp-style origin url of the form
/// `host:owner/name.git` (e.g. `git@example.com:owner/name.git`).
pub fn repo_from_origin(origin: &str) -> Result<String> {
    let after_host = origin
        .rsplit_once(':')
        .map(|(_, rest)| rest)
        .ok_or_else(|| UploadError::RepoDetection(origin.to_string()))?;
    let repo = after_host.strip_suffix(".git").unwrap_or(after_host);
    if repo.split('/').filter(|s| !s.is_empty()).count() != 2 {
        return Err(UploadError::RepoDetection(origin.to_string()));
    }
    Ok(repo.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scp_style_origin_parses() {
        assert_eq!(
            repo_from_origin("git@example.com:tekkub/sandbox.git").unwrap(),
            "tekkub/sandbox"
        );
    }

    #[test]
    fn git_suffix_is_optional() {
        assert_eq!(
            repo_from_origin("git@example.com:owner/name").unwrap(),
            "owner/name"
        );
    }

    #[test]
    fn unrecognized_origin_is_rejected() {
        assert!(matches!(
            repo_from_origin("https-no-colon-path"),
            Err(UploadError::RepoDetection(_))
        ));
        assert!(matches!(
            repo_from_origin("git@example.com:not-a-repo"),
            Err(UploadError::RepoDetection(_))
        ));
    }
}
