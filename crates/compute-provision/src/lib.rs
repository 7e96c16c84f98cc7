//! Single-node compute provisioning.
//!
//! This crate authenticates to a compute provider (Google Compute Engine),
//! resolves a hardware profile and an image into a template, creates a
//! node from it and reports how to reach it.
//!
//! # Example
//!
//! ```rust,ignore
//! use compute_provision::{provision, Credentials, ProvisionConfig, ProvisioningClient};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let credentials = Credentials::from_key_file(
//!         "svc@my-project.iam.gserviceaccount.com",
//!         "key.pem".as_ref(),
//!     )?;
//!     let client = ProvisioningClient::connect(ProvisionConfig::default(), &credentials).await?;
//!
//!     // Always releases the session, even when creation fails.
//!     let outcome = provision(client, &mut std::io::stdout()).await;
//!     outcome.nodes?;
//!     outcome.release?;
//!     Ok(())
//! }
//! ```

#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod config;
pub mod credentials;
pub mod login;
pub mod poll;
pub mod providers;
pub mod report;

pub use client::{
    find_hardware, find_image, provision, ClientState, ProvisionOutcome, ProvisioningClient,
};
pub use config::ProvisionConfig;
pub use credentials::Credentials;
pub use providers::{
    open_session, ComputeService, HardwareProfile, Image, LoginCredentials, NodeMetadata,
    NodeStatus, ProvisionError, Template, TemplateBuilder,
};
