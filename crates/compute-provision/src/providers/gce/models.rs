//! Compute Engine API request and response models.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

// ============================================================================
// OAuth2 types
// ============================================================================

/// Claims of the service-account assertion.
#[derive(Debug, Serialize)]
pub struct AssertionClaims<'a> {
    /// Issuer (service-account identity).
    pub iss: &'a str,
    /// Requested OAuth scope.
    pub scope: &'a str,
    /// Audience (token endpoint).
    pub aud: &'a str,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
}

/// Token endpoint response.
#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    /// Bearer token.
    pub access_token: String,
    /// Lifetime in seconds.
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    /// Token type (always "Bearer").
    pub token_type: Option<String>,
}

fn default_expires_in() -> i64 {
    3600
}

// ============================================================================
// Catalog types
// ============================================================================

/// Deprecation status of a catalog resource.
#[derive(Debug, Clone, Deserialize)]
pub struct DeprecationStatus {
    /// "ACTIVE", "DEPRECATED", "OBSOLETE" or "DELETED".
    pub state: Option<String>,
}

/// Machine type (hardware profile).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineType {
    /// Numeric id.
    pub id: String,
    /// Name (e.g., "f1-micro").
    pub name: String,
    /// Zone name.
    pub zone: String,
    /// Virtual CPUs.
    #[serde(default)]
    pub guest_cpus: u32,
    /// Memory in MB.
    #[serde(default)]
    pub memory_mb: u64,
    /// Resource URL.
    pub self_link: String,
    /// Deprecation status.
    pub deprecated: Option<DeprecationStatus>,
}

/// Machine types in one scope of an aggregated list.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineTypesScopedList {
    /// Machine types in this scope.
    #[serde(default)]
    pub machine_types: Vec<MachineType>,
}

/// `GET /projects/{project}/aggregated/machineTypes` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineTypeAggregatedList {
    /// Machine types keyed by scope ("zones/europe-west1-b").
    #[serde(default)]
    pub items: HashMap<String, MachineTypesScopedList>,
    /// Token for the next page.
    pub next_page_token: Option<String>,
}

/// Image.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GceImage {
    /// Numeric id.
    pub id: String,
    /// Name (e.g., "centos-7-v20240611").
    pub name: String,
    /// Image family.
    pub family: Option<String>,
    /// Status ("READY", "PENDING", "FAILED", ...).
    #[serde(default)]
    pub status: String,
    /// Resource URL.
    pub self_link: String,
    /// Deprecation status.
    pub deprecated: Option<DeprecationStatus>,
}

impl GceImage {
    /// READY and neither OBSOLETE nor DELETED. DEPRECATED images still boot.
    #[must_use]
    pub fn is_bootable(&self) -> bool {
        let retired = self
            .deprecated
            .as_ref()
            .and_then(|d| d.state.as_deref())
            .is_some_and(|state| matches!(state, "OBSOLETE" | "DELETED"));
        self.status == "READY" && !retired
    }
}

/// `GET /projects/{project}/global/images` response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageList {
    /// Images.
    #[serde(default)]
    pub items: Vec<GceImage>,
    /// Token for the next page.
    pub next_page_token: Option<String>,
}

// ============================================================================
// Instance types
// ============================================================================

/// Compute Engine instance.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GceInstance {
    /// Numeric id.
    pub id: String,
    /// Instance name.
    pub name: String,
    /// Zone (URL).
    pub zone: String,
    /// Machine type (URL).
    pub machine_type: String,
    /// Status.
    pub status: String,
    /// Network interfaces.
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
}

/// Network interface.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    /// Network (URL).
    pub network: Option<String>,
    /// Network IP (internal).
    pub network_i_p: Option<String>,
    /// Access configs (for external IP).
    #[serde(default)]
    pub access_configs: Vec<AccessConfig>,
}

/// Access configuration (external IP).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfig {
    /// Access type.
    #[serde(rename = "type")]
    pub access_type: Option<String>,
    /// External NAT IP.
    pub nat_i_p: Option<String>,
    /// Name.
    pub name: Option<String>,
}

/// Create instance request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertInstanceRequest {
    /// Instance name.
    pub name: String,
    /// Machine type (URL).
    pub machine_type: String,
    /// Disks.
    pub disks: Vec<AttachedDiskDefinition>,
    /// Network interfaces.
    pub network_interfaces: Vec<NetworkInterfaceDefinition>,
    /// Labels.
    pub labels: HashMap<String, String>,
    /// Metadata.
    pub metadata: Metadata,
}

/// Attached disk definition for creation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedDiskDefinition {
    /// Boot disk.
    pub boot: bool,
    /// Auto delete.
    pub auto_delete: bool,
    /// Initialize params.
    pub initialize_params: InitializeParams,
}

/// Disk initialization parameters.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Source image (URL).
    pub source_image: String,
}

/// Network interface definition for creation.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterfaceDefinition {
    /// Network (URL).
    pub network: String,
    /// Access configs.
    pub access_configs: Vec<AccessConfigDefinition>,
}

/// Access config definition.
#[derive(Debug, Serialize)]
pub struct AccessConfigDefinition {
    /// Access type.
    #[serde(rename = "type")]
    pub access_type: String,
    /// Name.
    pub name: String,
}

/// Metadata for instance.
#[derive(Debug, Serialize)]
pub struct Metadata {
    /// Metadata items.
    pub items: Vec<MetadataItem>,
}

/// Metadata item.
#[derive(Debug, Serialize)]
pub struct MetadataItem {
    /// Key.
    pub key: String,
    /// Value.
    pub value: String,
}

// ============================================================================
// Operation types
// ============================================================================

/// Zonal operation (async task).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Operation name.
    pub name: String,
    /// "PENDING", "RUNNING" or "DONE".
    pub status: String,
    /// Target link.
    pub target_link: Option<String>,
    /// Operation type.
    pub operation_type: Option<String>,
    /// Error, set once a failed operation is DONE.
    pub error: Option<OperationError>,
    /// HTTP error message, set with `error`.
    pub http_error_message: Option<String>,
}

impl Operation {
    /// Whether the operation has finished.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.status == "DONE"
    }

    /// Error messages joined, if the operation failed.
    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        let error = self.error.as_ref()?;
        let messages: Vec<String> = error
            .errors
            .iter()
            .map(|e| match (&e.code, &e.message) {
                (Some(code), Some(message)) => format!("{code}: {message}"),
                (None, Some(message)) => message.clone(),
                (Some(code), None) => code.clone(),
                (None, None) => "unknown error".to_string(),
            })
            .collect();
        if messages.is_empty() {
            Some(
                self.http_error_message
                    .clone()
                    .unwrap_or_else(|| "unknown error".to_string()),
            )
        } else {
            Some(messages.join("; "))
        }
    }
}

/// Operation error.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationError {
    /// Errors.
    #[serde(default)]
    pub errors: Vec<OperationErrorDetail>,
}

/// Operation error detail.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationErrorDetail {
    /// Error code.
    pub code: Option<String>,
    /// Error message.
    pub message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregated_machine_types_deserialization() {
        let json = r#"{
            "kind": "compute#machineTypeAggregatedList",
            "items": {
                "zones/europe-west1-b": {
                    "machineTypes": [{
                        "id": "1000",
                        "name": "f1-micro",
                        "zone": "europe-west1-b",
                        "guestCpus": 1,
                        "memoryMb": 614,
                        "selfLink": "https://compute.googleapis.com/compute/v1/projects/p/zones/europe-west1-b/machineTypes/f1-micro"
                    }]
                },
                "zones/asia-east1-a": {
                    "warning": {"code": "NO_RESULTS_ON_PAGE"}
                }
            },
            "nextPageToken": "abc"
        }"#;

        let list: MachineTypeAggregatedList = serde_json::from_str(json).unwrap();
        assert_eq!(list.next_page_token.as_deref(), Some("abc"));
        let scoped = &list.items["zones/europe-west1-b"];
        assert_eq!(scoped.machine_types[0].memory_mb, 614);
        assert!(list.items["zones/asia-east1-a"].machine_types.is_empty());
    }

    #[test]
    fn test_operation_error_message() {
        let json = r#"{
            "name": "operation-1",
            "status": "DONE",
            "httpErrorMessage": "FORBIDDEN",
            "error": {"errors": [
                {"code": "QUOTA_EXCEEDED", "message": "Quota 'CPUS' exceeded."}
            ]}
        }"#;
        let op: Operation = serde_json::from_str(json).unwrap();
        assert!(op.is_done());
        assert_eq!(
            op.error_message().as_deref(),
            Some("QUOTA_EXCEEDED: Quota 'CPUS' exceeded.")
        );
    }

    #[test]
    fn test_instance_network_fields() {
        let json = r#"{
            "id": "42",
            "name": "web-1a2",
            "zone": "https://compute.googleapis.com/compute/v1/projects/p/zones/europe-west1-b",
            "machineType": "https://compute.googleapis.com/compute/v1/projects/p/zones/europe-west1-b/machineTypes/f1-micro",
            "status": "RUNNING",
            "creationTimestamp": "2024-06-11T10:00:00.000-07:00",
            "labels": {"group": "web"},
            "networkInterfaces": [{
                "networkIP": "10.132.0.5",
                "accessConfigs": [{"type": "ONE_TO_ONE_NAT", "natIP": "35.1.2.3"}]
            }]
        }"#;
        let instance: GceInstance = serde_json::from_str(json).unwrap();
        let nic = &instance.network_interfaces[0];
        assert_eq!(nic.network_i_p.as_deref(), Some("10.132.0.5"));
        assert_eq!(nic.access_configs[0].nat_i_p.as_deref(), Some("35.1.2.3"));
    }

    #[test]
    fn test_image_bootability() {
        let image = |status: &str, state: Option<&str>| GceImage {
            id: "1".to_string(),
            name: "centos-7-v20240611".to_string(),
            family: None,
            status: status.to_string(),
            self_link: "images/centos-7-v20240611".to_string(),
            deprecated: state.map(|s| DeprecationStatus {
                state: Some(s.to_string()),
            }),
        };

        assert!(image("READY", None).is_bootable());
        assert!(image("READY", Some("DEPRECATED")).is_bootable());
        assert!(image("READY", Some("ACTIVE")).is_bootable());
        assert!(!image("READY", Some("OBSOLETE")).is_bootable());
        assert!(!image("READY", Some("DELETED")).is_bootable());
        assert!(!image("PENDING", None).is_bootable());
        assert!(!image("FAILED", None).is_bootable());
    }
}
