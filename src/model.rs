//! Object model of the management API cluster resource
//!
//! Only the fields the suite reads or writes are typed. Everything else is
//! kept in the `extra` maps so an update round-trips the full object the
//! server returned.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Cluster state reported once the management server has finished reconciling
pub const STATE_ACTIVE: &str = "active";

/// `transitioning` value the server uses for a failed reconciliation
pub const TRANSITIONING_ERROR: &str = "error";

/// Treat an explicit JSON `null` like a missing field
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// A cluster resource as returned by `/v3/clusters`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    #[serde(default, deserialize_with = "nullable")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transitioning: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transitioning_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_root_dir: Option<String>,

    /// Kubernetes version info of the running cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<VersionInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_config: Option<AckClusterConfigSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ack_status: Option<UpstreamStatus<AckClusterConfigSpec>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cce_config: Option<CceClusterConfigSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cce_status: Option<UpstreamStatus<CceClusterConfigSpec>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tke_config: Option<TkeClusterConfigSpec>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tke_status: Option<UpstreamStatus<TkeClusterConfigSpec>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Cluster {
    /// Whether the server reports the cluster as active
    pub fn is_active(&self) -> bool {
        self.state.as_deref() == Some(STATE_ACTIVE)
    }

    /// Whether the server reports a failed reconciliation
    pub fn is_errored(&self) -> bool {
        self.transitioning.as_deref() == Some(TRANSITIONING_ERROR)
    }

    /// Human-readable summary of the lifecycle state
    pub fn state_description(&self) -> String {
        let state = self.state.as_deref().unwrap_or("unknown");
        match (
            self.transitioning.as_deref(),
            self.transitioning_message.as_deref(),
        ) {
            (Some(t), Some(msg)) if !msg.is_empty() => {
                format!("state={}, transitioning={}: {}", state, t, msg)
            }
            (Some(t), _) => format!("state={}, transitioning={}", state, t),
            _ => format!("state={}", state),
        }
    }
}

/// Kubernetes version reported by the downstream cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    #[serde(default, deserialize_with = "nullable")]
    pub git_version: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `<provider>Status` block; `upstreamSpec` is what the cloud actually runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpstreamStatus<S> {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_spec: Option<S>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl<S> UpstreamStatus<S> {
    pub fn new(upstream_spec: S) -> Self {
        Self {
            upstream_spec: Some(upstream_spec),
            extra: Map::new(),
        }
    }
}

// =============================================================================
// ACK (Alibaba Cloud)
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckClusterConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliyun_credential_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region_id: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub imported: bool,

    #[serde(default, deserialize_with = "nullable")]
    pub node_pool_list: Vec<AckNodePool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckNodePool {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_pool_id: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub instances_num: i64,

    /// Instance types, key pair, disks, vswitches, runtime...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// CCE (Huawei Cloud)
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CceClusterConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub huawei_credential_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(rename = "regionID", default, skip_serializing_if = "Option::is_none")]
    pub region_id: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub imported: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub tags: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_network: Option<CceContainerNetwork>,

    #[serde(default, deserialize_with = "nullable")]
    pub node_pools: Vec<CceNodePool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CceContainerNetwork {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cidr: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CceNodePool {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,

    #[serde(rename = "nodePoolID", default, skip_serializing_if = "Option::is_none")]
    pub node_pool_id: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub initial_node_count: i64,

    /// Type, node template, security groups...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// =============================================================================
// TKE (Tencent Cloud)
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TkeClusterConfigSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tencent_credential_secret: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub imported: bool,

    #[serde(default, deserialize_with = "nullable")]
    pub cluster_basic_settings: TkeClusterBasicSettings,

    #[serde(
        rename = "clusterCIDRSettings",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub cluster_cidr_settings: Option<TkeClusterCidrSettings>,

    #[serde(default, deserialize_with = "nullable")]
    pub node_pool_list: Vec<TkeNodePool>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TkeClusterBasicSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_version: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TkeClusterCidrSettings {
    #[serde(rename = "clusterCIDR", default, skip_serializing_if = "Option::is_none")]
    pub cluster_cidr: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TkeNodePool {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_pool_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<String>,

    #[serde(default, deserialize_with = "nullable")]
    pub auto_scaling_group_para: TkeAutoScalingGroupPara,

    /// Launch configuration, labels, taints, OS...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TkeAutoScalingGroupPara {
    #[serde(default, deserialize_with = "nullable")]
    pub desired_capacity: i64,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Request body for `POST /v3/cloudcredentials`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudCredential {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,

    pub name: String,

    #[serde(flatten)]
    pub config: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cluster_preserves_unknown_fields() {
        let raw = json!({
            "id": "c-abcde",
            "name": "auto-ack-hp-ci-xyz",
            "state": "active",
            "driver": "AliyunKubernetesContainerService",
            "ackConfig": {
                "kubernetesVersion": "1.31.9-aliyun.1",
                "clusterType": "ManagedKubernetes",
                "nodePoolList": [
                    {"name": "np", "instancesNum": 3, "instanceTypes": ["ecs.g6.large"]}
                ]
            }
        });

        let cluster: Cluster = serde_json::from_value(raw).unwrap();
        assert_eq!(cluster.extra.get("driver"), Some(&json!("AliyunKubernetesContainerService")));

        let ack = cluster.ack_config.as_ref().unwrap();
        assert_eq!(ack.kubernetes_version.as_deref(), Some("1.31.9-aliyun.1"));
        assert_eq!(ack.extra.get("clusterType"), Some(&json!("ManagedKubernetes")));
        assert_eq!(ack.node_pool_list[0].instances_num, 3);

        let back = serde_json::to_value(&cluster).unwrap();
        assert_eq!(
            back["ackConfig"]["nodePoolList"][0]["instanceTypes"],
            json!(["ecs.g6.large"])
        );
    }

    #[test]
    fn test_null_lists_decode_as_empty() {
        let raw = json!({
            "name": "c",
            "cceConfig": {"nodePools": null, "tags": null},
            "cceStatus": {"upstreamSpec": null}
        });

        let cluster: Cluster = serde_json::from_value(raw).unwrap();
        let cce = cluster.cce_config.unwrap();
        assert!(cce.node_pools.is_empty());
        assert!(cce.tags.is_empty());
        assert!(cluster.cce_status.unwrap().upstream_spec.is_none());
    }

    #[test]
    fn test_provider_specific_field_names() {
        let raw = json!({
            "name": "c",
            "cceConfig": {
                "regionID": "ap-southeast-1",
                "nodePools": [{"name": "np", "nodePoolID": "abc", "initialNodeCount": 2}]
            },
            "tkeConfig": {
                "clusterBasicSettings": {"clusterVersion": "1.30.0"},
                "clusterCIDRSettings": {"clusterCIDR": "10.1.0.0/16"},
                "nodePoolList": [{"name": "np", "autoScalingGroupPara": {"desiredCapacity": 4}}]
            }
        });

        let cluster: Cluster = serde_json::from_value(raw).unwrap();
        let cce = cluster.cce_config.unwrap();
        assert_eq!(cce.region_id.as_deref(), Some("ap-southeast-1"));
        assert_eq!(cce.node_pools[0].node_pool_id.as_deref(), Some("abc"));

        let tke = cluster.tke_config.unwrap();
        assert_eq!(tke.cluster_basic_settings.cluster_version.as_deref(), Some("1.30.0"));
        assert_eq!(
            tke.cluster_cidr_settings.unwrap().cluster_cidr.as_deref(),
            Some("10.1.0.0/16")
        );
        assert_eq!(tke.node_pool_list[0].auto_scaling_group_para.desired_capacity, 4);
    }

    #[test]
    fn test_state_description() {
        let mut cluster = Cluster {
            state: Some("updating".to_string()),
            transitioning: Some("yes".to_string()),
            transitioning_message: Some("scaling node pool".to_string()),
            ..Default::default()
        };
        assert_eq!(
            cluster.state_description(),
            "state=updating, transitioning=yes: scaling node pool"
        );
        assert!(!cluster.is_active());

        cluster.state = Some("active".to_string());
        cluster.transitioning = None;
        assert_eq!(cluster.state_description(), "state=active");
        assert!(cluster.is_active());
    }
}
