//! Compute provider abstractions.

pub mod gce;
mod traits;

pub use traits::{
    ComputeService, HardwareProfile, Image, Location, LocationScope, LoginCredentials,
    NodeMetadata, NodeStatus, ProvisionError, Template, TemplateBuilder,
};

pub use gce::Gce;

use crate::config::{ProvisionConfig, GOOGLE_COMPUTE_ENGINE};
use crate::credentials::Credentials;

/// Open an authenticated session for `config.provider`.
///
/// # Errors
/// Returns [`ProvisionError::UnsupportedProvider`] for unknown providers,
/// or the provider's own error if authentication fails.
pub async fn open_session(
    config: &ProvisionConfig,
    credentials: &Credentials,
) -> Result<Box<dyn ComputeService>, ProvisionError> {
    match config.provider.as_str() {
        GOOGLE_COMPUTE_ENGINE => Ok(Box::new(Gce::connect(config, credentials).await?)),
        other => Err(ProvisionError::UnsupportedProvider(other.to_string())),
    }
}
