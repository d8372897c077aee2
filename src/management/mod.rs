//! Management API clients
//!
//! All cluster mutations go through a [`ManagementClient`]:
//! - [`RancherClient`]: the Rancher v3 REST API over HTTPS
//! - [`crate::fixtures::FakeManagement`]: in-memory backend for the crate's own tests

use async_trait::async_trait;

use crate::model::{CloudCredential, Cluster};

mod rancher;

pub use rancher::RancherClient;

/// Setting holding the management server version (e.g. "v2.12.1")
pub const SERVER_VERSION_SETTING: &str = "server-version";

/// Setting holding the Kubernetes range the UI offers (e.g. ">=1.28.x <=1.33.x")
pub const UI_K8S_RANGE_SETTING: &str = "ui-k8s-supported-versions-range";

/// Error type for management API calls
#[derive(Debug, thiserror::Error)]
pub enum ManagementError {
    #[error("request to {url} failed: {message}")]
    Transport { url: String, message: String },

    #[error("{method} {url} returned {status}: {body}")]
    Status {
        method: &'static str,
        url: String,
        status: u16,
        body: String,
    },

    #[error("failed to decode response from {url}: {message}")]
    Decode { url: String, message: String },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

/// Cluster CRUD and settings access on a management server
#[async_trait]
pub trait ManagementClient: Send + Sync {
    /// Create a cluster; returns the server's representation with its ID
    async fn create_cluster(&self, cluster: &Cluster) -> Result<Cluster, ManagementError>;

    /// Fetch the current representation of a cluster
    async fn cluster_by_id(&self, id: &str) -> Result<Cluster, ManagementError>;

    /// Replace `existing` with `updated`; returns what the server accepted
    async fn update_cluster(
        &self,
        existing: &Cluster,
        updated: &Cluster,
    ) -> Result<Cluster, ManagementError>;

    /// Delete a cluster
    async fn delete_cluster(&self, cluster: &Cluster) -> Result<(), ManagementError>;

    /// Read a global setting value
    async fn setting(&self, name: &str) -> Result<String, ManagementError>;

    /// Create a cloud credential; returns its ID
    async fn create_cloud_credential(
        &self,
        credential: &CloudCredential,
    ) -> Result<String, ManagementError>;
}

/// Management server version, e.g. "v2.12.1"
pub async fn server_version(client: &dyn ManagementClient) -> Result<String, ManagementError> {
    client.setting(SERVER_VERSION_SETTING).await
}
