//! TKE (Tencent Cloud) provider

use super::{select_catalog, ClusterSpec, CreateRequest, HostedProvider, NodePoolSpec};
use crate::converge::PollTiming;
use crate::model::{Cluster, TkeClusterCidrSettings, TkeClusterConfigSpec, TkeNodePool};

/// TKE catalogs by management server version
const CATALOGS: &[(&str, &[&str])] = &[
    ("2.12", &["1.32.2", "1.30.0"]),
    ("2.11", &["1.32.2", "1.30.0"]),
    ("2.10", &["1.30.0", "1.28.3"]),
];

const DEFAULT_CATALOG: &[&str] = &["1.32.2", "1.30.0", "1.28.3"];

/// Tencent Kubernetes Engine
pub struct Tke;

impl NodePoolSpec for TkeNodePool {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn replicas(&self) -> i64 {
        self.auto_scaling_group_para.desired_capacity
    }

    fn set_replicas(&mut self, count: i64) {
        self.auto_scaling_group_para.desired_capacity = count;
    }

    fn clear_identity(&mut self) {
        self.node_pool_id = None;
        self.cluster_id = None;
    }
}

impl ClusterSpec for TkeClusterConfigSpec {
    type NodePool = TkeNodePool;

    fn kubernetes_version(&self) -> Option<&str> {
        self.cluster_basic_settings.cluster_version.as_deref()
    }

    fn set_kubernetes_version(&mut self, version: &str) {
        self.cluster_basic_settings.cluster_version = Some(version.to_string());
    }

    fn node_pools(&self) -> &[TkeNodePool] {
        &self.node_pool_list
    }

    fn node_pools_mut(&mut self) -> &mut Vec<TkeNodePool> {
        &mut self.node_pool_list
    }
}

impl HostedProvider for Tke {
    type Spec = TkeClusterConfigSpec;

    const NAME: &'static str = "tke";
    const DISPLAY_NAME: &'static str = "TKE";
    const TEMPLATE_KEY: &'static str = "tkeClusterConfig";
    const CONFIG_FIELD: &'static str = "tkeConfig";
    const UPSTREAM_FIELD: &'static str = "tkeStatus.upstreamSpec";
    const VERSION_FIELD: &'static str = "clusterBasicSettings.clusterVersion";
    const NODE_POOLS_FIELD: &'static str = "nodePoolList";
    const REPLICAS_FIELD: &'static str = "autoScalingGroupPara.desiredCapacity";
    const CREDENTIAL_CONFIG: &'static str = "tencentcredentialConfig";
    const CREDENTIAL_ENV: &'static [(&'static str, &'static str)] = &[
        ("accessKeyId", "TENCENT_SECRET_ID"),
        ("accessKeySecret", "TENCENT_SECRET_KEY"),
        ("region", "TENCENT_REGION"),
    ];
    const UPGRADE_TIMING: PollTiming = PollTiming::from_secs(30 * 60, 30);

    fn desired(cluster: &Cluster) -> Option<&TkeClusterConfigSpec> {
        cluster.tke_config.as_ref()
    }

    fn desired_mut(cluster: &mut Cluster) -> Option<&mut TkeClusterConfigSpec> {
        cluster.tke_config.as_mut()
    }

    fn observed(cluster: &Cluster) -> Option<&TkeClusterConfigSpec> {
        cluster
            .tke_status
            .as_ref()
            .and_then(|status| status.upstream_spec.as_ref())
    }

    fn attach(cluster: &mut Cluster, spec: TkeClusterConfigSpec) {
        cluster.tke_config = Some(spec);
        cluster.tke_status = None;
    }

    fn prepare_create(spec: &mut TkeClusterConfigSpec, request: &CreateRequest) {
        spec.cluster_basic_settings.cluster_name = Some(request.name.clone());
        spec.cluster_basic_settings.cluster_version = Some(request.kubernetes_version.clone());
        spec.tencent_credential_secret = Some(request.cloud_credential_id.clone());
        spec.imported = false;
        spec.cluster_cidr_settings
            .get_or_insert_with(TkeClusterCidrSettings::default)
            .cluster_cidr = Some(request.cluster_cidr());
    }

    fn version_catalog(server_version: &str) -> Vec<String> {
        select_catalog(server_version, CATALOGS, DEFAULT_CATALOG)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_catalog() {
        assert_eq!(Tke::version_catalog("v2.12.0"), vec!["1.32.2", "1.30.0"]);
        assert_eq!(Tke::version_catalog("v2.10.2"), vec!["1.30.0", "1.28.3"]);
        assert_eq!(Tke::version_catalog("v2.8.0").len(), 3);
    }

    #[test]
    fn test_prepare_create_initializes_cidr_settings() {
        let mut spec = TkeClusterConfigSpec::default();
        assert!(spec.cluster_cidr_settings.is_none());

        let request = CreateRequest {
            name: "auto-tke-hp-ci-abcde".to_string(),
            kubernetes_version: "1.30.0".to_string(),
            run_id: 12,
            ..Default::default()
        };
        Tke::prepare_create(&mut spec, &request);

        assert_eq!(
            spec.cluster_basic_settings.cluster_name.as_deref(),
            Some("auto-tke-hp-ci-abcde")
        );
        assert_eq!(spec.kubernetes_version(), Some("1.30.0"));
        assert_eq!(
            spec.cluster_cidr_settings.unwrap().cluster_cidr.as_deref(),
            Some("10.12.0.0/16")
        );
    }

    #[test]
    fn test_node_pool_replicas_live_in_scaling_group() {
        let mut pool = TkeNodePool::default();
        pool.set_replicas(5);
        assert_eq!(pool.auto_scaling_group_para.desired_capacity, 5);
        assert_eq!(pool.replicas(), 5);
    }
}
