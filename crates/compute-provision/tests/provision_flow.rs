//! Integration tests for the provisioning flow.
//!
//! A scripted in-process `ComputeService` stands in for the provider so the
//! client's resolution, reporting and session release can be observed.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use compute_provision::providers::Location;
use compute_provision::{
    provision, ClientState, ComputeService, HardwareProfile, Image, LoginCredentials,
    NodeMetadata, NodeStatus, ProvisionConfig, ProvisionError, ProvisioningClient, Template,
};

// =============================================================================
// Stub compute service
// =============================================================================

/// How the stub answers node creation.
#[derive(Clone, Copy)]
enum CreateBehaviour {
    /// Return one running node with a public address.
    Succeed,
    /// Fail as if the provider timed out.
    Timeout,
    /// Return no nodes at all.
    Empty,
}

/// Observations shared with the test body.
#[derive(Default)]
struct Observed {
    /// Number of `close` calls.
    closes: AtomicUsize,
    /// Number of `create_nodes_in_group` calls.
    creates: AtomicUsize,
    /// Template passed to the last creation.
    template: Mutex<Option<Template>>,
}

struct StubService {
    profiles: Vec<HardwareProfile>,
    images: Vec<Image>,
    create: CreateBehaviour,
    fail_close: bool,
    observed: Arc<Observed>,
}

impl StubService {
    fn new(observed: Arc<Observed>) -> Self {
        Self {
            profiles: vec![
                profile("europe-west1-c", "f1-micro"),
                profile("europe-west1-b", "f1-micro"),
                profile("europe-west1-b", "g1-small"),
            ],
            images: vec![image("centos-6"), image("centos-7-v1"), image("centos-7-v2")],
            create: CreateBehaviour::Succeed,
            fail_close: false,
            observed,
        }
    }
}

fn profile(zone: &str, name: &str) -> HardwareProfile {
    HardwareProfile {
        id: format!("zones/{zone}/machineTypes/{name}"),
        name: name.to_string(),
        location: Location::zone(zone),
        cpus: 1,
        memory_mb: 614,
        deprecated: false,
    }
}

fn image(name: &str) -> Image {
    Image {
        id: format!("projects/centos-cloud/global/images/{name}"),
        name: name.to_string(),
        project: "centos-cloud".to_string(),
        family: Some("centos".to_string()),
        status: "READY".to_string(),
    }
}

#[async_trait]
impl ComputeService for StubService {
    fn provider(&self) -> &str {
        "stub"
    }

    async fn list_hardware_profiles(&self) -> Result<Vec<HardwareProfile>, ProvisionError> {
        Ok(self.profiles.clone())
    }

    async fn list_images(&self) -> Result<Vec<Image>, ProvisionError> {
        Ok(self.images.clone())
    }

    async fn create_nodes_in_group(
        &self,
        group: &str,
        _count: u32,
        template: Template,
    ) -> Result<Vec<NodeMetadata>, ProvisionError> {
        self.observed.creates.fetch_add(1, Ordering::SeqCst);
        *self.observed.template.lock().unwrap() = Some(template.clone());

        match self.create {
            CreateBehaviour::Succeed => Ok(vec![NodeMetadata {
                id: format!("{}/{group}-abc", template.location()),
                provider_id: "7001".to_string(),
                name: format!("{group}-abc"),
                group: group.to_string(),
                location: template.location().to_string(),
                hardware_id: template.hardware_id().to_string(),
                image_id: template.image_id().to_string(),
                status: NodeStatus::Running,
                login_port: 22,
                public_addresses: vec!["203.0.113.7".to_string()],
                private_addresses: vec!["10.0.0.2".to_string()],
                credentials: Some(LoginCredentials {
                    identity: "provision".to_string(),
                    credential: "PRIVATE-KEY-MATERIAL".to_string(),
                }),
            }]),
            CreateBehaviour::Timeout => Err(ProvisionError::Timeout(1200)),
            CreateBehaviour::Empty => Ok(vec![]),
        }
    }

    async fn close(&mut self) -> Result<(), ProvisionError> {
        self.observed.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            Err(ProvisionError::Api {
                status: 503,
                message: "unavailable".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

fn client(stub: StubService) -> ProvisioningClient {
    ProvisioningClient::new(Box::new(stub), ProvisionConfig::default())
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn test_end_to_end_reports_node_and_closes_once() {
    let observed = Arc::new(Observed::default());
    let mut out = Vec::new();

    let outcome = provision(client(StubService::new(observed.clone())), &mut out).await;

    let nodes = outcome.nodes.unwrap();
    outcome.release.unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(observed.closes.load(Ordering::SeqCst), 1);
    assert_eq!(observed.creates.load(Ordering::SeqCst), 1);

    let text = String::from_utf8(out).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("  {id=europe-west1-b/provision-example-abc"));
    assert_eq!(
        lines[1],
        "  Instance provision-example-abc started with IP 203.0.113.7"
    );
    assert_eq!(lines[2], "  Username provision");
    assert_eq!(lines[3], "  Key PRIVATE-KEY-MATERIAL");
}

#[tokio::test]
async fn test_template_uses_resolved_ids() {
    let observed = Arc::new(Observed::default());
    let mut out = Vec::new();

    let outcome = provision(client(StubService::new(observed.clone())), &mut out).await;
    assert!(outcome.nodes.is_ok());

    let template = observed.template.lock().unwrap().clone().unwrap();
    assert_eq!(template.location(), "europe-west1-b");
    assert_eq!(
        template.hardware_id(),
        "zones/europe-west1-b/machineTypes/f1-micro"
    );
    assert_eq!(
        template.image_id(),
        "projects/centos-cloud/global/images/centos-7-v1"
    );
}

#[tokio::test]
async fn test_creation_failure_still_closes_once() {
    let observed = Arc::new(Observed::default());
    let mut stub = StubService::new(observed.clone());
    stub.create = CreateBehaviour::Timeout;
    let mut out = Vec::new();

    let outcome = provision(client(stub), &mut out).await;

    assert!(matches!(outcome.nodes, Err(ProvisionError::Timeout(1200))));
    assert!(outcome.release.is_ok());
    assert_eq!(observed.closes.load(Ordering::SeqCst), 1);
    assert!(out.is_empty(), "nothing is reported for a failed attempt");
}

#[tokio::test]
async fn test_empty_creation_result_is_not_found() {
    let observed = Arc::new(Observed::default());
    let mut stub = StubService::new(observed.clone());
    stub.create = CreateBehaviour::Empty;
    let mut out = Vec::new();

    let outcome = provision(client(stub), &mut out).await;

    assert!(matches!(outcome.nodes, Err(ProvisionError::NotFound(_))));
    assert_eq!(observed.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_hardware_skips_creation() {
    let observed = Arc::new(Observed::default());
    let mut stub = StubService::new(observed.clone());
    stub.profiles.retain(|p| p.location.id != "europe-west1-b");
    let mut client = client(stub);

    let err = client.create_nodes().await.unwrap_err();
    assert!(matches!(err, ProvisionError::NotFound(ref m) if m.contains("f1-micro")));
    assert_eq!(client.state(), ClientState::Failed);
    assert_eq!(observed.creates.load(Ordering::SeqCst), 0);

    client.close().await.unwrap();
    assert_eq!(observed.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_image_skips_creation() {
    let observed = Arc::new(Observed::default());
    let mut stub = StubService::new(observed.clone());
    stub.images = vec![image("debian-12")];
    let mut out = Vec::new();

    let outcome = provision(client(stub), &mut out).await;

    assert!(matches!(outcome.nodes, Err(ProvisionError::NotFound(ref m)) if m.contains("centos-7")));
    assert_eq!(observed.creates.load(Ordering::SeqCst), 0);
    assert_eq!(observed.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_client_walks_states_in_order() {
    let observed = Arc::new(Observed::default());
    let mut client = client(StubService::new(observed));
    assert_eq!(client.state(), ClientState::SessionOpen);

    let hardware = client.get_hardware().await.unwrap();
    assert_eq!(client.state(), ClientState::HardwareResolved);

    let image = client.get_image().await.unwrap();
    assert_eq!(client.state(), ClientState::ImageResolved);
    assert_eq!(image.name, "centos-7-v1");

    client.build_template(&hardware, &image).unwrap();
    assert_eq!(client.state(), ClientState::TemplateBuilt);
}

#[tokio::test]
async fn test_close_failure_is_reported() {
    let observed = Arc::new(Observed::default());
    let mut stub = StubService::new(observed.clone());
    stub.fail_close = true;
    let mut out = Vec::new();

    let outcome = provision(client(stub), &mut out).await;

    assert!(outcome.nodes.is_ok());
    assert!(matches!(
        outcome.release,
        Err(ProvisionError::Api { status: 503, .. })
    ));
    assert_eq!(observed.closes.load(Ordering::SeqCst), 1);
}
