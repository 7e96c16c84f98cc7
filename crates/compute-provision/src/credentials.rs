//! Service-account credentials.

use std::fmt;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::providers::ProvisionError;

/// Domain suffix of Google service-account identities.
const SERVICE_ACCOUNT_DOMAIN: &str = ".iam.gserviceaccount.com";

/// Service-account key in Google's JSON key format.
#[derive(Debug, Deserialize)]
struct JsonKeyFile {
    client_email: Option<String>,
    private_key: String,
    token_uri: Option<String>,
    project_id: Option<String>,
}

/// Account identity plus private key material.
#[derive(Clone)]
pub struct Credentials {
    /// Account identity (service-account email).
    pub identity: String,
    /// PEM-encoded private key.
    pub private_key: String,
    /// Token endpoint named by the key file, if any.
    pub token_uri: Option<String>,
    /// Project named by the key file, if any.
    pub project_id: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("private_key", &"<redacted>")
            .field("token_uri", &self.token_uri)
            .field("project_id", &self.project_id)
            .finish()
    }
}

impl Credentials {
    /// Read credentials from a key file.
    ///
    /// The file may hold a bare PEM private key or a JSON service-account key.
    ///
    /// # Errors
    /// Returns [`ProvisionError::Credentials`] if the file cannot be read or
    /// does not contain a private key.
    pub fn from_key_file(identity: impl Into<String>, path: &Path) -> Result<Self, ProvisionError> {
        let contents = std::fs::read(path).map_err(|e| {
            ProvisionError::Credentials(format!(
                "Cannot open service account private key file {}: {e}",
                path.display()
            ))
        })?;
        let contents = String::from_utf8_lossy(&contents);
        debug!(path = %path.display(), "Read service account key file");
        Self::from_key_material(identity, &contents)
    }

    /// Build credentials from key file contents.
    ///
    /// # Errors
    /// Returns [`ProvisionError::Credentials`] if no private key is present.
    pub fn from_key_material(
        identity: impl Into<String>,
        contents: &str,
    ) -> Result<Self, ProvisionError> {
        let identity = identity.into();

        if contents.trim_start().starts_with('{') {
            let key: JsonKeyFile = serde_json::from_str(contents).map_err(|e| {
                ProvisionError::Credentials(format!("Invalid JSON service account key: {e}"))
            })?;
            let identity = if identity.is_empty() {
                key.client_email.unwrap_or_default()
            } else {
                identity
            };
            return Self::checked(identity, key.private_key, key.token_uri, key.project_id);
        }

        Self::checked(identity, contents.to_string(), None, None)
    }

    fn checked(
        identity: String,
        private_key: String,
        token_uri: Option<String>,
        project_id: Option<String>,
    ) -> Result<Self, ProvisionError> {
        if identity.trim().is_empty() {
            return Err(ProvisionError::Credentials(
                "Service account identity is empty".to_string(),
            ));
        }
        if !private_key.contains("PRIVATE KEY-----") {
            return Err(ProvisionError::Credentials(
                "Key file does not contain a PEM private key".to_string(),
            ));
        }
        Ok(Self {
            identity,
            private_key,
            token_uri,
            project_id,
        })
    }

    /// Resolve the project: explicit override, key file, then identity domain.
    ///
    /// # Errors
    /// Returns [`ProvisionError::Config`] if no project can be determined.
    pub fn project_id(&self, explicit: Option<&str>) -> Result<String, ProvisionError> {
        if let Some(project) = explicit.filter(|p| !p.is_empty()) {
            return Ok(project.to_string());
        }
        if let Some(project) = self.project_id.as_deref().filter(|p| !p.is_empty()) {
            return Ok(project.to_string());
        }
        project_from_identity(&self.identity).ok_or_else(|| {
            ProvisionError::Config(format!(
                "Cannot derive a project from identity '{}'; set `project`",
                self.identity
            ))
        })
    }
}

/// `name@PROJECT.iam.gserviceaccount.com` -> `PROJECT`.
fn project_from_identity(identity: &str) -> Option<String> {
    let (_, domain) = identity.split_once('@')?;
    let project = domain.strip_suffix(SERVICE_ACCOUNT_DOMAIN)?;
    (!project.is_empty()).then(|| project.to_string())
}
