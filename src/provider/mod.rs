//! Hosted cluster providers
//!
//! Each provider maps the generic lifecycle operations onto its own
//! configuration schema:
//! - [`Ack`]: Alibaba Cloud Container Service for Kubernetes
//! - [`Cce`]: Huawei Cloud Container Engine
//! - [`Tke`]: Tencent Kubernetes Engine
//!
//! The operations in [`crate::lifecycle`] are written once against
//! [`HostedProvider`] and instantiated per provider.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Debug;

use crate::converge::PollTiming;
use crate::model::{CloudCredential, Cluster};

mod ack;
mod cce;
mod tke;

pub use ack::Ack;
pub use cce::Cce;
pub use tke::Tke;

/// Cloud credential type understood by the management server
pub const CLOUD_CREDENTIAL_TYPE: &str = "provisioning.cattle.io/cloud-credential";

/// Error type for provider-specific preparation
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("environment variable {0} is required for {1} credentials")]
    MissingCredentialEnv(&'static str, &'static str),

    #[error("{0} template has no node pools")]
    EmptyTemplate(&'static str),
}

/// A node pool entry in a provider's desired or observed config
pub trait NodePoolSpec: Clone + Debug + Send + Sync {
    fn name(&self) -> &str;

    fn set_name(&mut self, name: String);

    /// Desired (or reported) replica count
    fn replicas(&self) -> i64;

    fn set_replicas(&mut self, count: i64);

    /// Drop server-assigned IDs so the entry is created as a new pool
    fn clear_identity(&mut self);
}

/// A provider's cluster config; used for both desired and observed sides
pub trait ClusterSpec:
    Clone + Debug + Default + PartialEq + Serialize + DeserializeOwned + Send + Sync
{
    type NodePool: NodePoolSpec;

    fn kubernetes_version(&self) -> Option<&str>;

    fn set_kubernetes_version(&mut self, version: &str);

    fn node_pools(&self) -> &[Self::NodePool];

    fn node_pools_mut(&mut self) -> &mut Vec<Self::NodePool>;

    /// Names of all node pools, in order
    fn node_pool_names(&self) -> Vec<String> {
        self.node_pools()
            .iter()
            .map(|np| np.name().to_string())
            .collect()
    }

    /// Replica counts of all node pools, in order
    fn node_pool_replicas(&self) -> Vec<i64> {
        self.node_pools().iter().map(NodePoolSpec::replicas).collect()
    }
}

/// Inputs for building a creation request from a provider template
#[derive(Debug, Clone, Default)]
pub struct CreateRequest {
    pub name: String,
    pub cloud_credential_id: String,
    pub kubernetes_version: String,
    /// Region override; providers that take the region from the template ignore it
    pub region: Option<String>,
    /// Per-run number used to keep pod CIDRs of parallel clusters apart
    pub run_id: u32,
}

impl CreateRequest {
    /// `10.<run_id % 255>.0.0/16`
    pub fn cluster_cidr(&self) -> String {
        format!("10.{}.0.0/16", self.run_id % 255)
    }
}

/// A hosted Kubernetes provider
pub trait HostedProvider: Send + Sync + 'static {
    type Spec: ClusterSpec;

    /// Short lowercase name ("ack")
    const NAME: &'static str;

    /// Name used in log lines ("ACK")
    const DISPLAY_NAME: &'static str;

    /// Section of the test config holding the cluster template
    const TEMPLATE_KEY: &'static str;

    /// Desired config field on the cluster resource ("ackConfig")
    const CONFIG_FIELD: &'static str;

    /// Observed spec path on the cluster resource ("ackStatus.upstreamSpec")
    const UPSTREAM_FIELD: &'static str;

    /// Version field inside the cluster config
    const VERSION_FIELD: &'static str;

    /// Node pool list field inside the cluster config
    const NODE_POOLS_FIELD: &'static str;

    /// Replica count field inside a node pool
    const REPLICAS_FIELD: &'static str;

    /// Credential config block name in a cloud credential
    const CREDENTIAL_CONFIG: &'static str;

    /// (credential field, environment variable) pairs
    const CREDENTIAL_ENV: &'static [(&'static str, &'static str)];

    /// How long a version upgrade may take to converge
    const UPGRADE_TIMING: PollTiming;

    fn desired(cluster: &Cluster) -> Option<&Self::Spec>;

    fn desired_mut(cluster: &mut Cluster) -> Option<&mut Self::Spec>;

    fn observed(cluster: &Cluster) -> Option<&Self::Spec>;

    /// Wrap a spec into a new cluster resource
    fn attach(cluster: &mut Cluster, spec: Self::Spec);

    /// Fill a template with the per-cluster values of a creation request
    fn prepare_create(spec: &mut Self::Spec, request: &CreateRequest);

    /// Versions offered for a management server version, before UI filtering
    fn version_catalog(server_version: &str) -> Vec<String>;

    /// Build a cloud credential from the provider's environment variables
    fn cloud_credential(name: &str) -> Result<CloudCredential, ProviderError> {
        let mut fields = Map::new();
        for &(field, env) in Self::CREDENTIAL_ENV {
            let value = std::env::var(env)
                .map_err(|_| ProviderError::MissingCredentialEnv(env, Self::DISPLAY_NAME))?;
            fields.insert(field.to_string(), Value::String(value));
        }

        let mut config = Map::new();
        config.insert("type".to_string(), Value::String(CLOUD_CREDENTIAL_TYPE.to_string()));
        config.insert(Self::CREDENTIAL_CONFIG.to_string(), Value::Object(fields));

        Ok(CloudCredential {
            id: String::new(),
            name: name.to_string(),
            config,
        })
    }

    /// Dotted path of a field on the desired side
    fn desired_path(field: &str) -> String {
        format!("{}.{}", Self::CONFIG_FIELD, field)
    }

    /// Dotted path of a field on the observed side
    fn upstream_path(field: &str) -> String {
        format!("{}.{}", Self::UPSTREAM_FIELD, field)
    }
}

/// Providers that can register an existing cloud cluster
pub trait ImportableProvider: HostedProvider {
    fn import_spec(name: &str, cloud_credential_id: &str, region: &str) -> Self::Spec;
}

/// Tags attached to every cluster the suite creates
pub fn common_metadata_labels() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("owner".to_string(), "hosted-providers-e2e".to_string());
    labels.insert("purpose".to_string(), "ci".to_string());
    labels
}

/// Pick the catalog matching a management server version
///
/// `catalogs` is checked in order; the first entry whose key is contained in
/// the server version wins.
pub(crate) fn select_catalog(
    server_version: &str,
    catalogs: &[(&str, &[&str])],
    default: &[&str],
) -> Vec<String> {
    catalogs
        .iter()
        .find(|(key, _)| server_version.contains(key))
        .map(|(_, versions)| *versions)
        .unwrap_or(default)
        .iter()
        .map(|v| v.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cluster_cidr_wraps() {
        let request = CreateRequest {
            run_id: 300,
            ..Default::default()
        };
        assert_eq!(request.cluster_cidr(), "10.45.0.0/16");
    }

    #[test]
    fn test_select_catalog_first_match_wins() {
        let catalogs: &[(&str, &[&str])] = &[("2.12", &["a", "b"]), ("2.1", &["c"])];
        assert_eq!(select_catalog("v2.12.1", catalogs, &["z"]), vec!["a", "b"]);
        assert_eq!(select_catalog("v2.10.3", catalogs, &["z"]), vec!["c"]);
        assert_eq!(select_catalog("v3.0.0", catalogs, &["z"]), vec!["z"]);
    }

    #[test]
    fn test_common_metadata_labels() {
        let labels = common_metadata_labels();
        assert_eq!(labels.get("owner").map(String::as_str), Some("hosted-providers-e2e"));
    }

    #[test]
    fn test_cloud_credential_missing_env() {
        std::env::remove_var("TENCENT_SECRET_ID");
        let result = Tke::cloud_credential("cc");
        assert!(matches!(
            result,
            Err(ProviderError::MissingCredentialEnv("TENCENT_SECRET_ID", "TKE"))
        ));
    }

    #[test]
    fn test_paths() {
        assert_eq!(Ack::desired_path(Ack::VERSION_FIELD), "ackConfig.kubernetesVersion");
        assert_eq!(
            Tke::upstream_path(Tke::VERSION_FIELD),
            "tkeStatus.upstreamSpec.clusterBasicSettings.clusterVersion"
        );
    }
}
