//! Provisioning client: resolve a template and create a node.
//!
//! ```text
//! Uninitialized -> SessionOpen -> HardwareResolved -> ImageResolved
//!   -> TemplateBuilt -> NodeRequested -> NodeReady | Failed -> Closed
//! ```
//!
//! [`provision`] runs the whole attempt and always closes the session.

use std::fmt;
use std::io::Write;

use tracing::{info, warn};

use crate::config::ProvisionConfig;
use crate::credentials::Credentials;
use crate::providers::{
    open_session, ComputeService, HardwareProfile, Image, NodeMetadata, ProvisionError, Template,
};
use crate::report::write_report;

/// Lifecycle of a [`ProvisioningClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClientState {
    /// No session yet.
    Uninitialized,
    /// Session established.
    SessionOpen,
    /// Hardware profile resolved.
    HardwareResolved,
    /// Image resolved.
    ImageResolved,
    /// Template built.
    TemplateBuilt,
    /// Node creation requested.
    NodeRequested,
    /// Node is running.
    NodeReady,
    /// A step failed.
    Failed,
    /// Session released.
    Closed,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::SessionOpen => "session_open",
            Self::HardwareResolved => "hardware_resolved",
            Self::ImageResolved => "image_resolved",
            Self::TemplateBuilt => "template_built",
            Self::NodeRequested => "node_requested",
            Self::NodeReady => "node_ready",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// First profile whose location id and name both match exactly.
#[must_use]
pub fn find_hardware<'a>(
    profiles: &'a [HardwareProfile],
    zone: &str,
    name: &str,
) -> Option<&'a HardwareProfile> {
    profiles
        .iter()
        .find(|p| p.location.id == zone && p.name == name)
}

/// First image (in catalog order) whose name starts with `prefix`.
#[must_use]
pub fn find_image<'a>(images: &'a [Image], prefix: &str) -> Option<&'a Image> {
    images.iter().find(|i| i.name.starts_with(prefix))
}

/// Drives one provisioning attempt over a single session.
pub struct ProvisioningClient {
    service: Box<dyn ComputeService>,
    config: ProvisionConfig,
    state: ClientState,
}

impl ProvisioningClient {
    /// Validate `config` and open a session for its provider.
    ///
    /// # Errors
    /// Returns error if the configuration is invalid or the session cannot
    /// be established.
    pub async fn connect(
        config: ProvisionConfig,
        credentials: &Credentials,
    ) -> Result<Self, ProvisionError> {
        config.validate()?;
        let service = open_session(&config, credentials).await?;
        Ok(Self::new(service, config))
    }

    /// Wrap an already open session.
    #[must_use]
    pub fn new(service: Box<dyn ComputeService>, config: ProvisionConfig) -> Self {
        info!(provider = %service.provider(), zone = %config.zone, "Provisioning client ready");
        Self {
            service,
            config,
            state: ClientState::SessionOpen,
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    fn advance<T>(
        &mut self,
        result: Result<T, ProvisionError>,
        next: ClientState,
    ) -> Result<T, ProvisionError> {
        match result {
            Ok(value) => {
                self.state = next;
                Ok(value)
            }
            Err(e) => {
                warn!(state = %self.state, error = %e, "Provisioning step failed");
                self.state = ClientState::Failed;
                Err(e)
            }
        }
    }

    /// Resolve the configured hardware profile in the configured zone.
    ///
    /// # Errors
    /// Returns [`ProvisionError::NotFound`] when no profile matches.
    pub async fn get_hardware(&mut self) -> Result<HardwareProfile, ProvisionError> {
        let result = self.resolve_hardware().await;
        self.advance(result, ClientState::HardwareResolved)
    }

    async fn resolve_hardware(&self) -> Result<HardwareProfile, ProvisionError> {
        let zone = &self.config.zone;
        let name = &self.config.hardware_profile_name;
        let profiles = self.service.list_hardware_profiles().await?;

        let profile = find_hardware(&profiles, zone, name).cloned().ok_or_else(|| {
            ProvisionError::NotFound(format!("hardware profile '{name}' in zone '{zone}'"))
        })?;

        if profile.deprecated {
            warn!(profile = %profile.name, zone = %zone, "Hardware profile is deprecated");
        }
        info!(profile = %profile.name, id = %profile.id, "Resolved hardware profile");
        Ok(profile)
    }

    /// Resolve the first image whose name starts with the configured prefix.
    ///
    /// # Errors
    /// Returns [`ProvisionError::NotFound`] when no image matches.
    pub async fn get_image(&mut self) -> Result<Image, ProvisionError> {
        let result = self.resolve_image().await;
        self.advance(result, ClientState::ImageResolved)
    }

    async fn resolve_image(&self) -> Result<Image, ProvisionError> {
        let prefix = &self.config.image_name_prefix;
        let images = self.service.list_images().await?;

        let image = find_image(&images, prefix)
            .cloned()
            .ok_or_else(|| ProvisionError::NotFound(format!("image with prefix '{prefix}'")))?;

        info!(image = %image.name, project = %image.project, "Resolved image");
        Ok(image)
    }

    /// Combine the configured zone with the resolved hardware and image.
    ///
    /// # Errors
    /// Returns [`ProvisionError::Config`] if an id is empty.
    pub fn build_template(
        &mut self,
        hardware: &HardwareProfile,
        image: &Image,
    ) -> Result<Template, ProvisionError> {
        let result = self
            .service
            .template_builder()
            .location_id(&self.config.zone)
            .hardware_id(&hardware.id)
            .image_id(&image.id)
            .build();
        self.advance(result, ClientState::TemplateBuilt)
    }

    /// Resolve the template and create the configured nodes.
    ///
    /// # Errors
    /// Returns the first error from resolution or node creation.
    pub async fn create_nodes(&mut self) -> Result<Vec<NodeMetadata>, ProvisionError> {
        let hardware = self.get_hardware().await?;
        let image = self.get_image().await?;
        let template = self.build_template(&hardware, &image)?;

        self.state = ClientState::NodeRequested;
        info!(
            group = %self.config.group_name,
            count = self.config.node_count,
            "Requesting nodes"
        );

        let result = self
            .service
            .create_nodes_in_group(&self.config.group_name, self.config.node_count, template)
            .await
            .and_then(|nodes| {
                if nodes.is_empty() {
                    Err(ProvisionError::NotFound(format!(
                        "no nodes returned for group '{}'",
                        self.config.group_name
                    )))
                } else {
                    Ok(nodes)
                }
            });
        self.advance(result, ClientState::NodeReady)
    }

    /// Release the session.
    ///
    /// # Errors
    /// Returns the provider's error if release fails.
    pub async fn close(mut self) -> Result<(), ProvisionError> {
        let result = self.service.close().await;
        self.state = ClientState::Closed;
        match &result {
            Ok(()) => info!("Session released"),
            Err(e) => warn!(error = %e, "Session release failed"),
        }
        result
    }
}

/// Result of a full provisioning attempt.
#[derive(Debug)]
pub struct ProvisionOutcome {
    /// Created nodes, or the error that stopped the attempt.
    pub nodes: Result<Vec<NodeMetadata>, ProvisionError>,
    /// Result of releasing the session.
    pub release: Result<(), ProvisionError>,
}

/// Create nodes, report the first one to `out`, and close the session.
///
/// The session is released exactly once whatever happens before it.
pub async fn provision<W: Write>(mut client: ProvisioningClient, out: &mut W) -> ProvisionOutcome {
    let nodes = client
        .create_nodes()
        .await
        .and_then(|nodes| write_report(out, &nodes[0]).map(|()| nodes));

    let release = client.close().await;
    ProvisionOutcome { nodes, release }
}
