//! Compute Engine API client implementation.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::{debug, info, warn};

use super::auth::TokenSource;
use super::models::{
    AccessConfigDefinition, AttachedDiskDefinition, GceImage, GceInstance, ImageList,
    InitializeParams, InsertInstanceRequest, MachineType, MachineTypeAggregatedList, Metadata,
    MetadataItem, NetworkInterfaceDefinition, Operation,
};
use crate::config::{ProvisionConfig, DEFAULT_TOKEN_URI, GOOGLE_COMPUTE_ENGINE};
use crate::credentials::Credentials;
use crate::login::LoginKey;
use crate::poll::PollSchedule;
use crate::providers::traits::{
    ComputeService, HardwareProfile, Image, Location, NodeMetadata, NodeStatus, ProvisionError,
    Template,
};

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// SSH port reported for created nodes.
const SSH_PORT: u16 = 22;

/// Hex characters appended to the group name.
const NAME_SUFFIX_LEN: usize = 3;

/// Distinct names available per group (16^3).
const NAME_SUFFIX_SPACE: usize = 1 << (4 * NAME_SUFFIX_LEN);

/// Compute Engine session.
pub struct Gce {
    /// HTTP client.
    client: Client,
    /// OAuth2 tokens for the service account.
    tokens: TokenSource,
    /// Project the session operates in.
    project_id: String,
    /// Provisioning settings (endpoints, polling, login).
    config: ProvisionConfig,
    /// Set once `close` has run.
    closed: bool,
}

impl Gce {
    /// Open an authenticated session.
    ///
    /// An access token is requested immediately so bad credentials fail here.
    ///
    /// # Errors
    /// Returns error if the key is unusable, no project can be resolved or
    /// the token endpoint rejects the credentials.
    pub async fn connect(
        config: &ProvisionConfig,
        credentials: &Credentials,
    ) -> Result<Self, ProvisionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(ProvisionError::Http)?;

        let project_id = credentials.project_id(config.project.as_deref())?;
        let token_uri = config
            .token_uri
            .clone()
            .or_else(|| credentials.token_uri.clone())
            .unwrap_or_else(|| DEFAULT_TOKEN_URI.to_string());

        let tokens = TokenSource::new(client.clone(), credentials, token_uri)?;
        tokens.token().await?;

        info!(
            project = %project_id,
            identity = %credentials.identity,
            "Compute Engine session open"
        );

        Ok(Self {
            client,
            tokens,
            project_id,
            config: config.clone(),
            closed: false,
        })
    }

    /// Project the session operates in.
    #[must_use]
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.compute_endpoint.trim_end_matches('/'))
    }

    fn ensure_open(&self) -> Result<(), ProvisionError> {
        if self.closed {
            Err(ProvisionError::SessionClosed)
        } else {
            Ok(())
        }
    }

    /// Make an authenticated GET request.
    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        page_token: Option<&str>,
    ) -> Result<T, ProvisionError> {
        debug!(url = %url, page_token = ?page_token, "GET request");

        let mut request = self.client.get(url).bearer_auth(self.tokens.token().await?);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }

        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// Make an authenticated POST request.
    async fn post<T, B>(&self, url: &str, body: &B) -> Result<T, ProvisionError>
    where
        T: serde::de::DeserializeOwned,
        B: serde::Serialize,
    {
        debug!(url = %url, "POST request");

        let response = self
            .client
            .post(url)
            .bearer_auth(self.tokens.token().await?)
            .json(body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handle API response.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ProvisionError> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            serde_json::from_str(&text).map_err(|e| {
                warn!(error = %e, body = %text, "Failed to parse response");
                ProvisionError::Serialization(e)
            })
        } else if status == StatusCode::NOT_FOUND {
            Err(ProvisionError::NotFound(text))
        } else if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            Err(ProvisionError::Auth(text))
        } else {
            Err(ProvisionError::Api {
                status: status.as_u16(),
                message: text,
            })
        }
    }

    /// Last path segment of a resource URL.
    fn short_name(url: &str) -> &str {
        url.rsplit('/').next().unwrap_or(url)
    }

    /// `{group}-{3 hex chars}`, unique within `taken`.
    fn node_name(group: &str, taken: &mut HashSet<String>) -> Result<String, ProvisionError> {
        if taken.len() >= NAME_SUFFIX_SPACE {
            return Err(ProvisionError::Config(format!(
                "group '{group}' has no free node names left ({NAME_SUFFIX_SPACE} in use)"
            )));
        }
        loop {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            let name = format!("{group}-{}", &suffix[..NAME_SUFFIX_LEN]);
            if taken.insert(name.clone()) {
                return Ok(name);
            }
        }
    }

    fn status_of(status: &str) -> NodeStatus {
        match status {
            "PROVISIONING" | "STAGING" => NodeStatus::Pending,
            "RUNNING" => NodeStatus::Running,
            "STOPPING" | "STOPPED" | "SUSPENDING" | "SUSPENDED" => NodeStatus::Suspended,
            "TERMINATED" => NodeStatus::Terminated,
            _ => NodeStatus::Unknown,
        }
    }

    fn to_hardware(machine_type: &MachineType) -> HardwareProfile {
        HardwareProfile {
            id: machine_type.self_link.clone(),
            name: machine_type.name.clone(),
            location: Location::zone(Self::short_name(&machine_type.zone)),
            cpus: machine_type.guest_cpus,
            memory_mb: machine_type.memory_mb,
            deprecated: machine_type
                .deprecated
                .as_ref()
                .and_then(|d| d.state.as_deref())
                .is_some_and(|state| state != "ACTIVE"),
        }
    }

    fn to_image(project: &str, image: &GceImage) -> Image {
        Image {
            id: image.self_link.clone(),
            name: image.name.clone(),
            project: project.to_string(),
            family: image.family.clone(),
            status: image.status.clone(),
        }
    }

    fn to_node(
        instance: &GceInstance,
        group: &str,
        template: &Template,
        login: &LoginKey,
    ) -> NodeMetadata {
        let zone = Self::short_name(&instance.zone).to_string();

        let public_addresses = instance
            .network_interfaces
            .iter()
            .flat_map(|ni| ni.access_configs.iter())
            .filter_map(|ac| ac.nat_i_p.clone())
            .collect();

        let private_addresses = instance
            .network_interfaces
            .iter()
            .filter_map(|ni| ni.network_i_p.clone())
            .collect();

        NodeMetadata {
            id: format!("{zone}/{}", instance.name),
            provider_id: instance.id.clone(),
            name: instance.name.clone(),
            group: group.to_string(),
            location: zone,
            hardware_id: Self::short_name(&instance.machine_type).to_string(),
            image_id: Self::short_name(template.image_id()).to_string(),
            status: Self::status_of(&instance.status),
            login_port: SSH_PORT,
            public_addresses,
            private_addresses,
            credentials: Some(login.credentials()),
        }
    }

    fn insert_request(
        name: &str,
        group: &str,
        template: &Template,
        login: &LoginKey,
    ) -> InsertInstanceRequest {
        let mut labels = HashMap::new();
        labels.insert("group".to_string(), group.to_string());

        InsertInstanceRequest {
            name: name.to_string(),
            machine_type: template.hardware_id().to_string(),
            disks: vec![AttachedDiskDefinition {
                boot: true,
                auto_delete: true,
                initialize_params: InitializeParams {
                    source_image: template.image_id().to_string(),
                },
            }],
            network_interfaces: vec![NetworkInterfaceDefinition {
                network: "global/networks/default".to_string(),
                access_configs: vec![AccessConfigDefinition {
                    access_type: "ONE_TO_ONE_NAT".to_string(),
                    name: "External NAT".to_string(),
                }],
            }],
            labels,
            metadata: Metadata {
                items: vec![MetadataItem {
                    key: "ssh-keys".to_string(),
                    value: login.ssh_keys_metadata(),
                }],
            },
        }
    }

    /// Poll a zonal operation until it is DONE.
    async fn wait_operation(
        &self,
        zone: &str,
        mut operation: Operation,
        schedule: &mut PollSchedule,
    ) -> Result<(), ProvisionError> {
        let url = self.url(&format!(
            "/projects/{}/zones/{zone}/operations/{}",
            self.project_id, operation.name
        ));

        loop {
            debug!(
                operation = %operation.name,
                status = %operation.status,
                elapsed_secs = schedule.elapsed().as_secs(),
                "Polling operation status"
            );

            if operation.is_done() {
                return match operation.error_message() {
                    Some(message) => Err(ProvisionError::Operation {
                        name: operation.name,
                        message,
                    }),
                    None => Ok(()),
                };
            }

            if !schedule.wait().await {
                return Err(ProvisionError::Timeout(schedule.timeout().as_secs()));
            }

            operation = self.get(&url, None).await?;
        }
    }

    /// Poll an instance until it is RUNNING.
    async fn wait_running(
        &self,
        zone: &str,
        name: &str,
        schedule: &mut PollSchedule,
    ) -> Result<GceInstance, ProvisionError> {
        let url = self.url(&format!(
            "/projects/{}/zones/{zone}/instances/{name}",
            self.project_id
        ));

        loop {
            let instance: GceInstance = self.get(&url, None).await?;
            let status = Self::status_of(&instance.status);

            debug!(
                instance = %name,
                status = %status,
                elapsed_secs = schedule.elapsed().as_secs(),
                "Polling instance status"
            );

            match status {
                NodeStatus::Running => {
                    info!(instance = %name, "Instance is running");
                    return Ok(instance);
                }
                NodeStatus::Terminated | NodeStatus::Suspended => {
                    return Err(ProvisionError::NodeFailed {
                        name: name.to_string(),
                        status: instance.status,
                    });
                }
                _ => {}
            }

            if !schedule.wait().await {
                return Err(ProvisionError::Timeout(schedule.timeout().as_secs()));
            }
        }
    }

    async fn create_node(
        &self,
        name: &str,
        group: &str,
        template: &Template,
        login: &LoginKey,
    ) -> Result<NodeMetadata, ProvisionError> {
        let zone = template.location();
        info!(
            instance = %name,
            zone = %zone,
            machine_type = %Self::short_name(template.hardware_id()),
            image = %Self::short_name(template.image_id()),
            "Creating Compute Engine instance"
        );

        let url = self.url(&format!("/projects/{}/zones/{zone}/instances", self.project_id));
        let body = Self::insert_request(name, group, template, login);
        let operation: Operation = self.post(&url, &body).await?;

        let mut schedule = PollSchedule::from_config(&self.config);
        self.wait_operation(zone, operation, &mut schedule).await?;
        schedule.reset_interval();
        let instance = self.wait_running(zone, name, &mut schedule).await?;

        Ok(Self::to_node(&instance, group, template, login))
    }
}

#[async_trait]
impl ComputeService for Gce {
    fn provider(&self) -> &str {
        GOOGLE_COMPUTE_ENGINE
    }

    async fn list_hardware_profiles(&self) -> Result<Vec<HardwareProfile>, ProvisionError> {
        self.ensure_open()?;

        let url = self.url(&format!("/projects/{}/aggregated/machineTypes", self.project_id));
        let mut profiles = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page: MachineTypeAggregatedList = self.get(&url, page_token.as_deref()).await?;

            // Scopes come back as a map; sort for a stable catalog order.
            let mut scopes: Vec<_> = page.items.into_iter().collect();
            scopes.sort_by(|a, b| a.0.cmp(&b.0));
            profiles.extend(
                scopes
                    .iter()
                    .flat_map(|(_, scoped)| scoped.machine_types.iter())
                    .map(Self::to_hardware),
            );

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(count = profiles.len(), "Listed hardware profiles");
        Ok(profiles)
    }

    async fn list_images(&self) -> Result<Vec<Image>, ProvisionError> {
        self.ensure_open()?;

        let mut projects = vec![self.project_id.clone()];
        for project in &self.config.image_projects {
            if !projects.contains(project) {
                projects.push(project.clone());
            }
        }

        let mut images = Vec::new();
        for project in &projects {
            let url = self.url(&format!("/projects/{project}/global/images"));
            let mut page_token: Option<String> = None;

            loop {
                let page: ImageList = self.get(&url, page_token.as_deref()).await?;
                for image in &page.items {
                    if image.is_bootable() {
                        images.push(Self::to_image(project, image));
                    } else {
                        debug!(image = %image.name, project = %project, "Skipping unbootable image");
                    }
                }

                match page.next_page_token {
                    Some(token) if !token.is_empty() => page_token = Some(token),
                    _ => break,
                }
            }
        }

        debug!(count = images.len(), projects = projects.len(), "Listed images");
        Ok(images)
    }

    async fn create_nodes_in_group(
        &self,
        group: &str,
        count: u32,
        template: Template,
    ) -> Result<Vec<NodeMetadata>, ProvisionError> {
        self.ensure_open()?;

        if count == 0 {
            return Err(ProvisionError::Config("node count must be at least 1".to_string()));
        }

        let login = LoginKey::resolve(
            &self.config.login_user,
            self.config.login_key_file.as_deref(),
        )
        .await?;

        let mut taken = HashSet::new();
        let mut nodes = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = Self::node_name(group, &mut taken)?;
            nodes.push(self.create_node(&name, group, &template, &login).await?);
        }

        info!(group = %group, count = nodes.len(), "Nodes created");
        Ok(nodes)
    }

    async fn close(&mut self) -> Result<(), ProvisionError> {
        self.ensure_open()?;
        self.tokens.clear().await;
        self.closed = true;
        info!(project = %self.project_id, "Compute Engine session closed");
        Ok(())
    }
}
