//! In-memory management backend
//!
//! [`FakeManagement`] behaves like a management server whose clouds reconcile
//! every change after a fixed number of reads. It can also stall forever,
//! reject or rewrite updates, and put clusters into an error state, which is
//! enough to exercise every path of the lifecycle operations without a cloud
//! account.
//!
//! # Example
//!
//! ```ignore
//! use hosted_e2e::fixtures::FakeManagement;
//!
//! let fake = FakeManagement::new()
//!     .reconcile_after(3)
//!     .with_server_version("v2.11.2");
//!
//! let created = fake.create_cluster(&cluster).await?;
//! // third read returns the reconciled cluster
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::management::{
    ManagementClient, ManagementError, SERVER_VERSION_SETTING, UI_K8S_RANGE_SETTING,
};
use crate::model::{CloudCredential, Cluster, UpstreamStatus, VersionInfo, STATE_ACTIVE};

type UpdateHook = Box<dyn Fn(&mut Cluster) + Send + Sync>;

struct FakeCluster {
    cluster: Cluster,
    reads_since_change: u32,
    total_reads: u32,
}

#[derive(Default)]
struct FakeState {
    clusters: HashMap<String, FakeCluster>,
    settings: HashMap<String, String>,
    credentials: Vec<CloudCredential>,
    deleted: Vec<String>,
    next_id: u32,
    updates: u32,
    fail_next_update: Option<String>,
}

/// Management backend held entirely in memory
pub struct FakeManagement {
    state: Mutex<FakeState>,
    reconcile_after: u32,
    stalled: bool,
    upstream_frozen: bool,
    update_hook: Option<UpdateHook>,
}

impl Default for FakeManagement {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeManagement {
    /// Backend that reconciles on the first read after each change
    pub fn new() -> Self {
        let mut settings = HashMap::new();
        settings.insert(SERVER_VERSION_SETTING.to_string(), "v2.12.1".to_string());
        settings.insert(UI_K8S_RANGE_SETTING.to_string(), ">=1.28.x <=1.33.x".to_string());

        Self {
            state: Mutex::new(FakeState {
                settings,
                ..Default::default()
            }),
            reconcile_after: 1,
            stalled: false,
            upstream_frozen: false,
            update_hook: None,
        }
    }

    /// Reconcile on the `reads`-th read after each change
    pub fn reconcile_after(mut self, reads: u32) -> Self {
        self.reconcile_after = reads;
        self
    }

    /// Never reconcile; clusters keep whatever status they had
    pub fn stalled(mut self) -> Self {
        self.stalled = true;
        self
    }

    /// Report clusters active but never copy desired config into the
    /// upstream status
    pub fn freeze_upstream(mut self) -> Self {
        self.upstream_frozen = true;
        self
    }

    /// Set a global setting
    pub fn with_setting(self, name: &str, value: &str) -> Self {
        self.lock()
            .settings
            .insert(name.to_string(), value.to_string());
        self
    }

    /// Set the reported management server version
    pub fn with_server_version(self, version: &str) -> Self {
        self.with_setting(SERVER_VERSION_SETTING, version)
    }

    /// Rewrite every accepted update, e.g. to simulate the server dropping a field
    pub fn with_update_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Cluster) + Send + Sync + 'static,
    {
        self.update_hook = Some(Box::new(hook));
        self
    }

    /// Reject the next update with a 422
    pub fn fail_next_update(&self, message: &str) {
        self.lock().fail_next_update = Some(message.to_string());
    }

    /// Put a cluster into the error state
    pub fn set_error(&self, id: &str, message: &str) {
        if let Some(entry) = self.lock().clusters.get_mut(id) {
            entry.cluster.transitioning = Some("error".to_string());
            entry.cluster.transitioning_message = Some(message.to_string());
        }
    }

    /// Current stored cluster, without counting as a read
    pub fn peek(&self, id: &str) -> Option<Cluster> {
        self.lock().clusters.get(id).map(|entry| entry.cluster.clone())
    }

    /// Total reads of a cluster since creation
    pub fn fetch_count(&self, id: &str) -> u32 {
        self.lock()
            .clusters
            .get(id)
            .map(|entry| entry.total_reads)
            .unwrap_or(0)
    }

    /// Number of accepted updates
    pub fn update_count(&self) -> u32 {
        self.lock().updates
    }

    /// Whether a cluster has been deleted
    pub fn was_deleted(&self, id: &str) -> bool {
        self.lock().deleted.iter().any(|d| d == id)
    }

    /// Credentials created so far
    pub fn credentials(&self) -> Vec<CloudCredential> {
        self.lock().credentials.clone()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Copy every desired config into its upstream status and mark the cluster active
fn reconcile(cluster: &mut Cluster, copy_status: bool) {
    cluster.state = Some(STATE_ACTIVE.to_string());
    cluster.transitioning = Some("no".to_string());
    cluster.transitioning_message = None;
    if !copy_status {
        return;
    }

    if let Some(spec) = &cluster.ack_config {
        cluster.ack_status = Some(UpstreamStatus::new(spec.clone()));
    }
    if let Some(spec) = &cluster.cce_config {
        cluster.cce_status = Some(UpstreamStatus::new(spec.clone()));
    }
    if let Some(spec) = &cluster.tke_config {
        cluster.tke_status = Some(UpstreamStatus::new(spec.clone()));
    }

    let version = cluster
        .ack_config
        .as_ref()
        .and_then(|s| s.kubernetes_version.clone())
        .or_else(|| cluster.cce_config.as_ref().and_then(|s| s.version.clone()))
        .or_else(|| {
            cluster
                .tke_config
                .as_ref()
                .and_then(|s| s.cluster_basic_settings.cluster_version.clone())
        });
    if let Some(version) = version {
        cluster.version = Some(VersionInfo {
            git_version: format!("v{}", version.trim_start_matches('v')),
            ..Default::default()
        });
    }
}

#[async_trait]
impl ManagementClient for FakeManagement {
    async fn create_cluster(&self, cluster: &Cluster) -> Result<Cluster, ManagementError> {
        let mut state = self.lock();
        state.next_id += 1;

        let mut created = cluster.clone();
        created.id = format!("c-{:05}", state.next_id);
        created.state = Some("provisioning".to_string());
        created.transitioning = Some("yes".to_string());
        created.ack_status = None;
        created.cce_status = None;
        created.tke_status = None;

        debug!(cluster = %created.id, "fake: created cluster");
        state.clusters.insert(
            created.id.clone(),
            FakeCluster {
                cluster: created.clone(),
                reads_since_change: 0,
                total_reads: 0,
            },
        );
        Ok(created)
    }

    async fn cluster_by_id(&self, id: &str) -> Result<Cluster, ManagementError> {
        let mut state = self.lock();
        let entry = state
            .clusters
            .get_mut(id)
            .ok_or_else(|| ManagementError::NotFound(id.to_string()))?;

        entry.total_reads += 1;
        entry.reads_since_change += 1;
        if !self.stalled
            && !entry.cluster.is_errored()
            && entry.reads_since_change >= self.reconcile_after
        {
            reconcile(&mut entry.cluster, !self.upstream_frozen);
        }

        Ok(entry.cluster.clone())
    }

    async fn update_cluster(
        &self,
        existing: &Cluster,
        updated: &Cluster,
    ) -> Result<Cluster, ManagementError> {
        let mut state = self.lock();

        if let Some(message) = state.fail_next_update.take() {
            return Err(ManagementError::Status {
                method: "PUT",
                url: format!("fake://clusters/{}", existing.id),
                status: 422,
                body: message,
            });
        }

        let entry = state
            .clusters
            .get_mut(&existing.id)
            .ok_or_else(|| ManagementError::NotFound(existing.id.clone()))?;

        let mut accepted = updated.clone();
        if let Some(hook) = &self.update_hook {
            hook(&mut accepted);
        }

        // status is server-owned
        accepted.id = entry.cluster.id.clone();
        accepted.ack_status = entry.cluster.ack_status.clone();
        accepted.cce_status = entry.cluster.cce_status.clone();
        accepted.tke_status = entry.cluster.tke_status.clone();
        accepted.version = entry.cluster.version.clone();
        accepted.state = Some("updating".to_string());
        accepted.transitioning = Some("yes".to_string());

        entry.cluster = accepted.clone();
        entry.reads_since_change = 0;
        state.updates += 1;

        debug!(cluster = %accepted.id, "fake: updated cluster");
        Ok(accepted)
    }

    async fn delete_cluster(&self, cluster: &Cluster) -> Result<(), ManagementError> {
        let mut state = self.lock();
        state
            .clusters
            .remove(&cluster.id)
            .ok_or_else(|| ManagementError::NotFound(cluster.id.clone()))?;
        state.deleted.push(cluster.id.clone());
        Ok(())
    }

    async fn setting(&self, name: &str) -> Result<String, ManagementError> {
        self.lock()
            .settings
            .get(name)
            .cloned()
            .ok_or_else(|| ManagementError::NotFound(format!("setting {}", name)))
    }

    async fn create_cloud_credential(
        &self,
        credential: &CloudCredential,
    ) -> Result<String, ManagementError> {
        let mut state = self.lock();
        let id = format!("cattle-global-data:cc-{}", state.credentials.len() + 1);
        let mut stored = credential.clone();
        stored.id = id.clone();
        state.credentials.push(stored);
        Ok(id)
    }
}
