//! ACK (Alibaba Cloud) provider

use super::{select_catalog, ClusterSpec, CreateRequest, HostedProvider, NodePoolSpec};
use crate::converge::PollTiming;
use crate::model::{AckClusterConfigSpec, AckNodePool, Cluster};

/// ACK catalogs by management server version
const CATALOGS: &[(&str, &[&str])] = &[
    ("2.12", &["1.31.9-aliyun.1", "1.32.7-aliyun.1", "1.33.3-aliyun.1"]),
    ("2.11", &["1.31.9-aliyun.1", "1.32.7-aliyun.1"]),
    ("2.10", &["1.31.9-aliyun.1"]),
];

const DEFAULT_CATALOG: &[&str] = &["1.31.9-aliyun.1", "1.32.7-aliyun.1", "1.33.3-aliyun.1"];

/// Alibaba Cloud Container Service for Kubernetes
pub struct Ack;

impl NodePoolSpec for AckNodePool {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: String) {
        self.name = name;
    }

    fn replicas(&self) -> i64 {
        self.instances_num
    }

    fn set_replicas(&mut self, count: i64) {
        self.instances_num = count;
    }

    fn clear_identity(&mut self) {
        self.node_pool_id = None;
    }
}

impl ClusterSpec for AckClusterConfigSpec {
    type NodePool = AckNodePool;

    fn kubernetes_version(&self) -> Option<&str> {
        self.kubernetes_version.as_deref()
    }

    fn set_kubernetes_version(&mut self, version: &str) {
        self.kubernetes_version = Some(version.to_string());
    }

    fn node_pools(&self) -> &[AckNodePool] {
        &self.node_pool_list
    }

    fn node_pools_mut(&mut self) -> &mut Vec<AckNodePool> {
        &mut self.node_pool_list
    }
}

impl HostedProvider for Ack {
    type Spec = AckClusterConfigSpec;

    const NAME: &'static str = "ack";
    const DISPLAY_NAME: &'static str = "ACK";
    const TEMPLATE_KEY: &'static str = "ackClusterConfig";
    const CONFIG_FIELD: &'static str = "ackConfig";
    const UPSTREAM_FIELD: &'static str = "ackStatus.upstreamSpec";
    const VERSION_FIELD: &'static str = "kubernetesVersion";
    const NODE_POOLS_FIELD: &'static str = "nodePoolList";
    const REPLICAS_FIELD: &'static str = "instancesNum";
    const CREDENTIAL_CONFIG: &'static str = "aliyunecscredentialConfig";
    const CREDENTIAL_ENV: &'static [(&'static str, &'static str)] = &[
        ("accessKeyId", "ALIBABA_ACCESS_KEY_ID"),
        ("accessKeySecret", "ALIBABA_ACCESS_KEY_SECRET"),
    ];
    const UPGRADE_TIMING: PollTiming = PollTiming::from_secs(30 * 60, 30);

    fn desired(cluster: &Cluster) -> Option<&AckClusterConfigSpec> {
        cluster.ack_config.as_ref()
    }

    fn desired_mut(cluster: &mut Cluster) -> Option<&mut AckClusterConfigSpec> {
        cluster.ack_config.as_mut()
    }

    fn observed(cluster: &Cluster) -> Option<&AckClusterConfigSpec> {
        cluster
            .ack_status
            .as_ref()
            .and_then(|status| status.upstream_spec.as_ref())
    }

    fn attach(cluster: &mut Cluster, spec: AckClusterConfigSpec) {
        cluster.ack_config = Some(spec);
        cluster.ack_status = None;
    }

    fn prepare_create(spec: &mut AckClusterConfigSpec, request: &CreateRequest) {
        spec.cluster_name = Some(request.name.clone());
        spec.kubernetes_version = Some(request.kubernetes_version.clone());
        spec.aliyun_credential_secret = Some(request.cloud_credential_id.clone());
        spec.imported = false;
    }

    fn version_catalog(server_version: &str) -> Vec<String> {
        select_catalog(server_version, CATALOGS, DEFAULT_CATALOG)
    }
}
