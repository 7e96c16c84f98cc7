//! Google Compute Engine provider.
//!
//! Implements the [`ComputeService`](crate::providers::ComputeService)
//! trait against the Compute Engine v1 REST API, authenticating with a
//! service-account key through the OAuth2 JWT bearer flow.
//!
//! Hardware profiles are machine types (one per zone) and images are read
//! from the session project followed by the configured public image
//! projects.

mod auth;
mod client;
mod models;

pub use auth::{TokenSource, COMPUTE_SCOPE};
pub use client::Gce;
pub use models::*;
