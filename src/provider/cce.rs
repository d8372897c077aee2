//! CCE (Huawei Cloud) provider

use super::{
    common_metadata_labels, select_catalog, ClusterSpec, CreateRequest, HostedProvider,
    ImportableProvider, NodePoolSpec,
};
use crate::converge::PollTiming;
use crate::model::{CceClusterConfigSpec, CceContainerNetwork, CceNodePool, Cluster};

/// CCE catalogs by management server version
const CATALOGS: &[(&str, &[&str])] = &[
    // Huawei Cloud does not offer 1.33 yet
    ("2.12", &["v1.32", "v1.31", "v1.30"]),
    ("2.11", &["v1.32", "v1.31", "v1.30"]),
    ("2.10", &["v1.31", "v1.30", "v1.29", "v1.28"]),
    ("2.9", &["v1.30", "v1.29", "v1.28"]),
];

const DEFAULT_CATALOG: &[&str] = &["v1.32", "v1.31", "v1.30"];

/// Huawei Cloud Container Engine
pub struct Cce;

impl NodePoolSpec for CceNodePool {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn replicas(&self) -> i64 {
        self.initial_node_count
    }

    fn set_replicas(&mut self, count: i64) {
        self.initial_node_count = count;
    }

    fn clear_identity(&mut self) {
        self.node_pool_id = None;
    }
}

impl ClusterSpec for CceClusterConfigSpec {
    type NodePool = CceNodePool;

    fn kubernetes_version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn set_kubernetes_version(&mut self, version: &str) {
        self.version = Some(version.to_string());
    }

    fn node_pools(&self) -> &[CceNodePool] {
        &self.node_pools
    }

    fn node_pools_mut(&mut self) -> &mut Vec<CceNodePool> {
        &mut self.node_pools
    }
}

impl HostedProvider for Cce {
    type Spec = CceClusterConfigSpec;

    const NAME: &'static str = "cce";
    const DISPLAY_NAME: &'static str = "CCE";
    const TEMPLATE_KEY: &'static str = "cceClusterConfig";
    const CONFIG_FIELD: &'static str = "cceConfig";
    const UPSTREAM_FIELD: &'static str = "cceStatus.upstreamSpec";
    const VERSION_FIELD: &'static str = "version";
    const NODE_POOLS_FIELD: &'static str = "nodePools";
    const REPLICAS_FIELD: &'static str = "initialNodeCount";
    const CREDENTIAL_CONFIG: &'static str = "huaweicredentialConfig";
    const CREDENTIAL_ENV: &'static [(&'static str, &'static str)] = &[
        ("accessKey", "HUAWEI_ACCESS_KEY"),
        ("secretKey", "HUAWEI_SECRET_KEY"),
        ("projectID", "HUAWEI_PROJECT_ID"),
        ("regionID", "HUAWEI_REGION_ID"),
    ];
    const UPGRADE_TIMING: PollTiming = PollTiming::from_secs(15 * 60, 30);

    fn desired(cluster: &Cluster) -> Option<&CceClusterConfigSpec> {
        cluster.cce_config.as_ref()
    }

    fn desired_mut(cluster: &mut Cluster) -> Option<&mut CceClusterConfigSpec> {
        cluster.cce_config.as_mut()
    }

    fn observed(cluster: &Cluster) -> Option<&CceClusterConfigSpec> {
        cluster
            .cce_status
            .as_ref()
            .and_then(|status| status.upstream_spec.as_ref())
    }

    fn attach(cluster: &mut Cluster, spec: CceClusterConfigSpec) {
        cluster.cce_config = Some(spec);
        cluster.cce_status = None;
    }

    fn prepare_create(spec: &mut CceClusterConfigSpec, request: &CreateRequest) {
        spec.name = Some(request.name.clone());
        spec.version = Some(request.kubernetes_version.clone());
        spec.huawei_credential_secret = Some(request.cloud_credential_id.clone());
        spec.imported = false;
        if let Some(region) = &request.region {
            spec.region_id = Some(region.clone());
        }
        spec.tags.extend(common_metadata_labels());
        spec.container_network
            .get_or_insert_with(CceContainerNetwork::default)
            .cidr = Some(request.cluster_cidr());
    }

    fn version_catalog(server_version: &str) -> Vec<String> {
        select_catalog(server_version, CATALOGS, DEFAULT_CATALOG)
    }
}

impl ImportableProvider for Cce {
    fn import_spec(name: &str, cloud_credential_id: &str, region: &str) -> CceClusterConfigSpec {
        CceClusterConfigSpec {
            huawei_credential_secret: Some(cloud_credential_id.to_string()),
            name: Some(name.to_string()),
            imported: true,
            region_id: Some(region.to_string()),
            ..Default::default()
        }
    }
}
