//! OpenShift Cluster Manager (OCM) adapter for [`RemoteApi`](crate::remote::RemoteApi).
//!
//! Talks to the `clusters_mgmt/v1` REST API with a bearer token. HTTP
//! statuses are classified with [`ClupError::from_status`](crate::error::ClupError::from_status).

pub mod client;
pub mod model;

pub use client::OcmClient;
