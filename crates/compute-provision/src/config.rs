//! Provisioning configuration.
//!
//! Every field has a default, so an empty file (or no file) yields the
//! stock single-node Compute Engine setup.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::providers::ProvisionError;

/// Provider id for Google Compute Engine.
pub const GOOGLE_COMPUTE_ENGINE: &str = "google-compute-engine";

/// Default zone.
pub const DEFAULT_ZONE: &str = "europe-west1-b";

/// Default hardware profile.
pub const DEFAULT_HARDWARE_PROFILE: &str = "f1-micro";

/// Default image name prefix.
pub const DEFAULT_IMAGE_PREFIX: &str = "centos-7";

/// Default node group.
pub const DEFAULT_GROUP: &str = "provision-example";

/// Default poll interval (20 seconds).
pub const DEFAULT_POLL_INTERVAL_MILLIS: u64 = 20_000;

/// Default time to wait for a node to reach RUNNING.
pub const DEFAULT_NODE_RUNNING_TIMEOUT_SECS: u64 = 1200;

/// Upper bound on `node_count` for one request.
pub const MAX_NODE_COUNT: u32 = 100;

/// Default login user written into instance metadata.
pub const DEFAULT_LOGIN_USER: &str = "provision";

/// Default Compute Engine API base URL.
pub const DEFAULT_COMPUTE_ENDPOINT: &str = "https://compute.googleapis.com/compute/v1";

/// Default OAuth2 token endpoint.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Public image projects searched after the session project.
pub const DEFAULT_IMAGE_PROJECTS: &[&str] = &[
    "centos-cloud",
    "debian-cloud",
    "ubuntu-os-cloud",
    "rocky-linux-cloud",
    "cos-cloud",
];

/// Provisioning configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvisionConfig {
    /// Provider id.
    pub provider: String,
    /// Zone to create the node in.
    pub zone: String,
    /// Hardware profile name, matched exactly.
    pub hardware_profile_name: String,
    /// Image name prefix, first match wins.
    pub image_name_prefix: String,
    /// Group name; node names are derived from it.
    pub group_name: String,
    /// Initial poll interval while waiting for provisioning.
    pub poll_interval_millis: u64,
    /// Upper bound for the poll interval.
    pub poll_max_interval_millis: u64,
    /// Number of nodes to request.
    pub node_count: u32,
    /// Give up waiting for a node after this long.
    pub node_running_timeout_secs: u64,
    /// Project override; otherwise taken from the credentials.
    pub project: Option<String>,
    /// Image projects listed after the session project.
    pub image_projects: Vec<String>,
    /// Login user for the created node.
    pub login_user: String,
    /// Existing login private key (with a sibling `.pub`); generated when unset.
    pub login_key_file: Option<PathBuf>,
    /// Compute API base URL.
    pub compute_endpoint: String,
    /// OAuth2 token endpoint override.
    pub token_uri: Option<String>,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            provider: GOOGLE_COMPUTE_ENGINE.to_string(),
            zone: DEFAULT_ZONE.to_string(),
            hardware_profile_name: DEFAULT_HARDWARE_PROFILE.to_string(),
            image_name_prefix: DEFAULT_IMAGE_PREFIX.to_string(),
            group_name: DEFAULT_GROUP.to_string(),
            poll_interval_millis: DEFAULT_POLL_INTERVAL_MILLIS,
            poll_max_interval_millis: DEFAULT_POLL_INTERVAL_MILLIS,
            node_count: 1,
            node_running_timeout_secs: DEFAULT_NODE_RUNNING_TIMEOUT_SECS,
            project: None,
            image_projects: DEFAULT_IMAGE_PROJECTS
                .iter()
                .map(ToString::to_string)
                .collect(),
            login_user: DEFAULT_LOGIN_USER.to_string(),
            login_key_file: None,
            compute_endpoint: DEFAULT_COMPUTE_ENDPOINT.to_string(),
            token_uri: None,
        }
    }
}

impl ProvisionConfig {
    /// Load configuration from a YAML file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ProvisionError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ProvisionError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&contents)
    }

    /// Parse configuration from YAML text.
    ///
    /// # Errors
    /// Returns error if the text is not valid configuration.
    pub fn from_yaml(contents: &str) -> Result<Self, ProvisionError> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents)
            .map_err(|e| ProvisionError::Config(format!("Failed to parse config: {e}")))
    }

    /// Initial poll interval.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_millis)
    }

    /// Maximum poll interval.
    #[must_use]
    pub fn poll_max_interval(&self) -> Duration {
        Duration::from_millis(self.poll_max_interval_millis)
    }

    /// Check the configuration for values the provisioning flow cannot use.
    ///
    /// # Errors
    /// Returns [`ProvisionError::Config`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ProvisionError> {
        let required = [
            ("provider", &self.provider),
            ("zone", &self.zone),
            ("hardware_profile_name", &self.hardware_profile_name),
            ("image_name_prefix", &self.image_name_prefix),
            ("group_name", &self.group_name),
            ("login_user", &self.login_user),
            ("compute_endpoint", &self.compute_endpoint),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(ProvisionError::Config(format!("{field} must not be empty")));
            }
        }

        if !is_valid_group_name(&self.group_name) {
            return Err(ProvisionError::Config(format!(
                "group_name '{}' must start with a lowercase letter and contain only \
                 lowercase letters, digits and hyphens",
                self.group_name
            )));
        }

        if self.poll_interval_millis == 0 {
            return Err(ProvisionError::Config(
                "poll_interval_millis must be greater than zero".to_string(),
            ));
        }

        if self.poll_max_interval_millis < self.poll_interval_millis {
            return Err(ProvisionError::Config(format!(
                "poll_max_interval_millis ({}) is below poll_interval_millis ({})",
                self.poll_max_interval_millis, self.poll_interval_millis
            )));
        }

        if self.node_count == 0 {
            return Err(ProvisionError::Config(
                "node_count must be at least 1".to_string(),
            ));
        }

        if self.node_count > MAX_NODE_COUNT {
            return Err(ProvisionError::Config(format!(
                "node_count {} exceeds the maximum of {MAX_NODE_COUNT}",
                self.node_count
            )));
        }

        Ok(())
    }
}

/// Instance names are `{group}-{suffix}` and must satisfy RFC 1035, which
/// leaves 58 characters for the group.
fn is_valid_group_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase())
        && name.len() <= 58
        && !name.ends_with('-')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}
