//! Per-test context
//!
//! A [`TestContext`] carries everything one test case needs: the management
//! client, the loaded settings, a fresh cluster name and the cluster handle
//! once one exists. It replaces suite-level globals, so test cases never share
//! mutable state.
//!
//! Usually created by the `#[hosted_e2e::test]` macro, which also cleans up
//! on success and prints diagnostics on failure.
//!
//! # Example
//!
//! ```ignore
//! use hosted_e2e::provider::Ack;
//! use hosted_e2e::TestContext;
//!
//! let mut ctx = TestContext::from_env()?;
//! ctx.use_provider::<Ack>();
//! let version = ctx.k8s_version::<Ack>(false).await?;
//! ctx.create_cluster::<Ack>(&version).await?;
//! ```

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{ConfigError, Settings};
use crate::diagnostics::Diagnostics;
use crate::lifecycle::{self, OperationError};
use crate::management::{ManagementClient, ManagementError, RancherClient};
use crate::model::Cluster;
use crate::namegen::append_random_string;
use crate::provider::{CreateRequest, HostedProvider, ImportableProvider};
use crate::versions::{self, UpgradePath, VersionError};

/// Prefix for cluster names when the config sets none
pub const DEFAULT_CLUSTER_NAME_PREFIX: &str = "auto-hp-ci";

/// Errors from context operations
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Management(#[from] ManagementError),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("no cluster has been created in this test case")]
    NoCluster,
}

/// State of one test case
pub struct TestContext {
    /// Management API client
    pub client: Arc<dyn ManagementClient>,
    /// Loaded settings
    pub settings: Settings,
    /// Name for the cluster this test case creates
    pub cluster_name: String,
    /// Cluster under test, once created or imported
    pub cluster: Option<Cluster>,
    /// Per-run number; keeps pod CIDRs of parallel runs apart
    pub run_id: u32,
    /// Test case ID for reporting, if any
    pub test_case_id: Option<i64>,
}

impl std::fmt::Debug for TestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestContext")
            .field("cluster_name", &self.cluster_name)
            .field("cluster", &self.cluster.as_ref().map(|c| &c.id))
            .field("run_id", &self.run_id)
            .field("test_case_id", &self.test_case_id)
            .finish_non_exhaustive()
    }
}

impl TestContext {
    /// Create a context against an existing client
    pub fn new(client: Arc<dyn ManagementClient>, settings: Settings) -> Self {
        let prefix = settings
            .rancher
            .cluster_name_prefix
            .clone()
            .unwrap_or_else(|| DEFAULT_CLUSTER_NAME_PREFIX.to_string());

        Self {
            client,
            settings,
            cluster_name: append_random_string(&prefix),
            cluster: None,
            run_id: rand::random::<u32>(),
            test_case_id: None,
        }
    }

    /// Load settings from the environment and connect to the configured server
    pub fn from_env() -> Result<Self, ContextError> {
        let settings = Settings::from_env()?;
        let client = RancherClient::new(&settings.rancher)?;
        info!(host = %settings.rancher.host, "Connected to management server");
        Ok(Self::new(Arc::new(client), settings))
    }

    /// Name clusters after `P` unless the config sets a prefix
    pub fn use_provider<P: HostedProvider>(&mut self) {
        if self.settings.rancher.cluster_name_prefix.is_none() {
            self.cluster_name = append_random_string(&format!("auto-{}-hp-ci", P::NAME));
        }
    }

    /// The cluster under test
    pub fn cluster(&self) -> Result<&Cluster, ContextError> {
        self.cluster.as_ref().ok_or(ContextError::NoCluster)
    }

    /// Replace the tracked cluster, e.g. with the result of an operation
    pub fn track(&mut self, cluster: Cluster) -> &Cluster {
        self.cluster.insert(cluster)
    }

    /// Version to create clusters with; see [`versions::k8s_version`]
    pub async fn k8s_version<P: HostedProvider>(
        &self,
        for_upgrade: bool,
    ) -> Result<String, ContextError> {
        Ok(versions::k8s_version::<P>(self.client.as_ref(), &self.settings, for_upgrade).await?)
    }

    /// Versions for an upgrade test; see [`versions::k8s_upgrade_path`]
    pub async fn k8s_upgrade_path<P: HostedProvider>(&self) -> Result<UpgradePath, ContextError> {
        Ok(versions::k8s_upgrade_path::<P>(self.client.as_ref(), &self.settings).await?)
    }

    /// Create the test cluster from the provider template
    pub async fn create_cluster<P: HostedProvider>(
        &mut self,
        kubernetes_version: &str,
    ) -> Result<&Cluster, ContextError> {
        self.create_cluster_with::<P, _>(kubernetes_version, None, |_| {})
            .await
    }

    /// Create the test cluster, customizing the filled template first
    pub async fn create_cluster_with<P, F>(
        &mut self,
        kubernetes_version: &str,
        region: Option<String>,
        customize: F,
    ) -> Result<&Cluster, ContextError>
    where
        P: HostedProvider,
        F: FnOnce(&mut P::Spec),
    {
        let client = self.client.clone();
        let credential =
            lifecycle::resolve_cloud_credential::<P>(client.as_ref(), &self.settings).await?;

        let request = CreateRequest {
            name: self.cluster_name.clone(),
            cloud_credential_id: credential,
            kubernetes_version: kubernetes_version.to_string(),
            region,
            run_id: self.run_id,
        };
        let cluster =
            lifecycle::create_cluster::<P, F>(client.as_ref(), &self.settings, &request, customize)
                .await?;

        info!(cluster = %cluster.id, name = %cluster.name, "Created cluster");
        Ok(self.track(cluster))
    }

    /// Register an existing cloud cluster as the test cluster
    pub async fn import_cluster<P: ImportableProvider>(
        &mut self,
        region: &str,
    ) -> Result<&Cluster, ContextError> {
        let client = self.client.clone();
        let credential =
            lifecycle::resolve_cloud_credential::<P>(client.as_ref(), &self.settings).await?;
        let cluster =
            lifecycle::import_cluster::<P>(client.as_ref(), &self.cluster_name, &credential, region)
                .await?;
        Ok(self.track(cluster))
    }

    /// Whether [`cleanup`](Self::cleanup) should run after a passing test
    pub fn should_cleanup(&self) -> bool {
        self.settings.rancher.cleanup && !Settings::keep_all()
    }

    /// Delete the test cluster, if one was created
    pub async fn cleanup(&mut self) -> Result<(), ContextError> {
        let Some(cluster) = self.cluster.take() else {
            return Ok(());
        };

        match lifecycle::delete_cluster(self.client.as_ref(), &cluster).await {
            Ok(()) => {
                info!(cluster = %cluster.id, "Deleted test cluster");
                Ok(())
            }
            Err(OperationError::Api {
                source: ManagementError::NotFound(_),
                ..
            }) => {
                warn!(cluster = %cluster.id, "Cluster already gone");
                Ok(())
            }
            Err(e) => {
                self.cluster = Some(cluster);
                Err(e.into())
            }
        }
    }

    /// Gather the latest cluster state for a failure report
    ///
    /// Best effort: if the refresh fails the last known state is reported.
    pub async fn collect_diagnostics(&self) -> Diagnostics {
        let Some(cluster) = &self.cluster else {
            return Diagnostics::without_cluster(&self.cluster_name);
        };

        match self.client.cluster_by_id(&cluster.id).await {
            Ok(latest) => Diagnostics::from_cluster(&latest),
            Err(e) => {
                warn!(cluster = %cluster.id, error = %e, "Failed to refresh cluster for diagnostics");
                let mut diag = Diagnostics::from_cluster(cluster);
                diag.fetch_error = Some(e.to_string());
                diag
            }
        }
    }
}
