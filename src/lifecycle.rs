//! Hosted cluster lifecycle operations
//!
//! Every mutation follows the same shape: copy the cluster, change its
//! desired config, submit the copy, then optionally confirm the server took
//! the change and wait for the cloud to report it back.
//!
//! # Example
//!
//! ```ignore
//! use hosted_e2e::lifecycle::{scale_node_pools, Verification};
//! use hosted_e2e::provider::Ack;
//!
//! let cluster = scale_node_pools::<Ack>(client.as_ref(), &cluster, 4, Verification::full()).await?;
//! ```

use tracing::{info, instrument, warn};

use crate::config::{ConfigError, Settings};
use crate::converge::{wait_cluster_active, wait_for_field, ConvergeError, PollTiming};
use crate::management::{ManagementClient, ManagementError};
use crate::model::Cluster;
use crate::namegen::append_random_string;
use crate::provider::{
    ClusterSpec, CreateRequest, HostedProvider, ImportableProvider, NodePoolSpec, ProviderError,
};

/// Docker root used when registering existing clusters
pub const DEFAULT_DOCKER_ROOT_DIR: &str = "/var/lib/docker";

/// Prefix of node pools added by [`add_node_pools`]
pub const NODE_POOL_NAME_PREFIX: &str = "ng";

/// Error type for lifecycle operations
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("{operation} failed: {source}")]
    Api {
        operation: &'static str,
        #[source]
        source: ManagementError,
    },

    #[error("{field} was not accepted: expected {expected}, got {actual}")]
    NotAccepted {
        field: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Converge(#[from] ConvergeError),

    #[error("cluster {cluster} has no {field}")]
    MissingConfig { cluster: String, field: &'static str },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{field} names do not match: expected {expected:?}, got {actual:?}")]
    NameMismatch {
        field: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("cluster is named {actual}, expected {expected}")]
    UnexpectedName { expected: String, actual: String },
}

impl OperationError {
    fn api(operation: &'static str) -> impl FnOnce(ManagementError) -> Self {
        move |source| OperationError::Api { operation, source }
    }
}

/// Which post-conditions a mutation checks
///
/// - `verify`: the update response carries the submitted desired values
/// - `wait`: the cluster returns to active and the observed side converges
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Verification {
    pub wait: bool,
    pub verify: bool,
}

impl Verification {
    /// Submit only
    pub const NONE: Verification = Verification {
        wait: false,
        verify: false,
    };

    /// Verify and wait
    pub fn full() -> Self {
        Self {
            wait: true,
            verify: true,
        }
    }
}

fn desired_spec<P: HostedProvider>(cluster: &Cluster) -> Result<&P::Spec, OperationError> {
    P::desired(cluster).ok_or_else(|| OperationError::MissingConfig {
        cluster: cluster.id.clone(),
        field: P::CONFIG_FIELD,
    })
}

fn desired_version<P: HostedProvider>(cluster: &Cluster) -> Option<String> {
    P::desired(cluster)
        .and_then(ClusterSpec::kubernetes_version)
        .map(str::to_string)
}

fn observed_version<P: HostedProvider>(cluster: &Cluster) -> Option<String> {
    P::observed(cluster)
        .and_then(ClusterSpec::kubernetes_version)
        .map(str::to_string)
}

fn observed_pool_names<P: HostedProvider>(cluster: &Cluster) -> Vec<String> {
    P::observed(cluster)
        .map(ClusterSpec::node_pool_names)
        .unwrap_or_default()
}

/// Load a provider's cluster template from the test config
pub fn load_template<P: HostedProvider>(settings: &Settings) -> Result<P::Spec, OperationError> {
    Ok(settings.section(P::TEMPLATE_KEY)?)
}

/// Create a cluster from the provider template
///
/// The template is filled from `request`, then handed to `customize` for
/// test-specific changes before the cluster is submitted.
#[instrument(skip(client, settings, customize), fields(provider = P::NAME))]
pub async fn create_cluster<P, F>(
    client: &dyn ManagementClient,
    settings: &Settings,
    request: &CreateRequest,
    customize: F,
) -> Result<Cluster, OperationError>
where
    P: HostedProvider,
    F: FnOnce(&mut P::Spec),
{
    let mut spec = load_template::<P>(settings)?;
    P::prepare_create(&mut spec, request);
    customize(&mut spec);

    info!(
        name = %request.name,
        version = %request.kubernetes_version,
        "Creating {} cluster",
        P::DISPLAY_NAME
    );

    let mut cluster = Cluster {
        name: request.name.clone(),
        ..Default::default()
    };
    P::attach(&mut cluster, spec);

    client
        .create_cluster(&cluster)
        .await
        .map_err(OperationError::api("create cluster"))
}

/// Register an existing cloud cluster
#[instrument(skip(client), fields(provider = P::NAME))]
pub async fn import_cluster<P: ImportableProvider>(
    client: &dyn ManagementClient,
    name: &str,
    cloud_credential_id: &str,
    region: &str,
) -> Result<Cluster, OperationError> {
    info!("Importing {} cluster {}", P::DISPLAY_NAME, name);

    let mut cluster = Cluster {
        name: name.to_string(),
        docker_root_dir: Some(DEFAULT_DOCKER_ROOT_DIR.to_string()),
        ..Default::default()
    };
    P::attach(&mut cluster, P::import_spec(name, cloud_credential_id, region));

    client
        .create_cluster(&cluster)
        .await
        .map_err(OperationError::api("import cluster"))
}

/// Delete a cluster
pub async fn delete_cluster(
    client: &dyn ManagementClient,
    cluster: &Cluster,
) -> Result<(), OperationError> {
    info!(cluster = %cluster.id, name = %cluster.name, "Deleting cluster");
    client
        .delete_cluster(cluster)
        .await
        .map_err(OperationError::api("delete cluster"))
}

/// Apply `mutate` to a copy of the desired config and submit it
///
/// Returns the server's response without any waiting.
pub async fn update_cluster<P, F>(
    client: &dyn ManagementClient,
    cluster: &Cluster,
    mutate: F,
) -> Result<Cluster, OperationError>
where
    P: HostedProvider,
    F: FnOnce(&mut P::Spec),
{
    let mut updated = cluster.clone();
    let spec = P::desired_mut(&mut updated).ok_or_else(|| OperationError::MissingConfig {
        cluster: cluster.id.clone(),
        field: P::CONFIG_FIELD,
    })?;
    mutate(spec);

    client
        .update_cluster(cluster, &updated)
        .await
        .map_err(OperationError::api("update cluster"))
}

/// Wait for active, check the name, and check that the cloud runs the desired version
#[instrument(skip(client, cluster), fields(provider = P::NAME, cluster = %cluster.id))]
pub async fn cluster_is_ready_checks<P: HostedProvider>(
    client: &dyn ManagementClient,
    cluster: &Cluster,
    name: &str,
) -> Result<Cluster, OperationError> {
    info!("Waiting for cluster {} to be ready", name);
    let cluster = wait_cluster_active(client, &cluster.id, PollTiming::CLUSTER_ACTIVE).await?;

    if cluster.name != name {
        return Err(OperationError::UnexpectedName {
            expected: name.to_string(),
            actual: cluster.name,
        });
    }

    let expected = desired_spec::<P>(&cluster)?
        .kubernetes_version()
        .map(str::to_string);
    let cluster = wait_for_field(
        client,
        &cluster.id,
        &P::upstream_path(P::VERSION_FIELD),
        &expected,
        observed_version::<P>,
        PollTiming::CLUSTER_ACTIVE,
    )
    .await?;

    info!("Cluster {} is ready", name);
    Ok(cluster)
}

/// Upgrade the Kubernetes version
///
/// With `check`, the response must carry the new version and the wait ends
/// only once both the desired and the observed version equal `version`.
#[instrument(skip(client, cluster), fields(provider = P::NAME, cluster = %cluster.id))]
pub async fn upgrade_kubernetes_version<P: HostedProvider>(
    client: &dyn ManagementClient,
    cluster: &Cluster,
    version: &str,
    check: bool,
) -> Result<Cluster, OperationError> {
    info!("Upgrading {} cluster to {}", P::DISPLAY_NAME, version);
    let updated =
        update_cluster::<P, _>(client, cluster, |spec| spec.set_kubernetes_version(version))
            .await?;

    if !check {
        return Ok(updated);
    }

    let accepted = desired_version::<P>(&updated);
    if accepted.as_deref() != Some(version) {
        return Err(OperationError::NotAccepted {
            field: P::desired_path(P::VERSION_FIELD),
            expected: version.to_string(),
            actual: format!("{:?}", accepted),
        });
    }

    wait_cluster_active(client, &updated.id, PollTiming::CLUSTER_ACTIVE).await?;

    let expected = (Some(version.to_string()), Some(version.to_string()));
    let cluster = wait_for_field(
        client,
        &updated.id,
        &format!(
            "{} & {}",
            P::upstream_path(P::VERSION_FIELD),
            P::desired_path(P::VERSION_FIELD)
        ),
        &expected,
        |c: &Cluster| (observed_version::<P>(c), desired_version::<P>(c)),
        P::UPGRADE_TIMING,
    )
    .await?;

    info!("Upgraded {} cluster to {}", P::DISPLAY_NAME, version);
    Ok(cluster)
}

/// Set every node pool's replica count to `count`
#[instrument(skip(client, cluster), fields(provider = P::NAME, cluster = %cluster.id))]
pub async fn scale_node_pools<P: HostedProvider>(
    client: &dyn ManagementClient,
    cluster: &Cluster,
    count: i64,
    verification: Verification,
) -> Result<Cluster, OperationError> {
    let pools = desired_spec::<P>(cluster)?.node_pools().len();
    let expected = vec![count; pools];

    info!("Scaling {} node pools to {}", P::DISPLAY_NAME, count);
    let updated = update_cluster::<P, _>(client, cluster, |spec| {
        for pool in spec.node_pools_mut() {
            pool.set_replicas(count);
        }
    })
    .await?;

    if verification.verify {
        let accepted = desired_spec::<P>(&updated)?.node_pool_replicas();
        if accepted != expected {
            return Err(OperationError::NotAccepted {
                field: P::desired_path(&format!("{}[*].{}", P::NODE_POOLS_FIELD, P::REPLICAS_FIELD)),
                expected: format!("{:?}", expected),
                actual: format!("{:?}", accepted),
            });
        }
    }

    if !verification.wait {
        return Ok(updated);
    }

    wait_cluster_active(client, &updated.id, PollTiming::CLUSTER_ACTIVE).await?;
    let cluster = wait_for_field(
        client,
        &updated.id,
        &P::upstream_path(&format!("{}[*].{}", P::NODE_POOLS_FIELD, P::REPLICAS_FIELD)),
        &Some(expected),
        |c: &Cluster| P::observed(c).map(ClusterSpec::node_pool_replicas),
        PollTiming::NODE_POOL,
    )
    .await?;

    info!("Scaled {} node pools to {}", P::DISPLAY_NAME, count);
    Ok(cluster)
}

/// Append `count` copies of the template's first node pool, each freshly named
#[instrument(skip(client, cluster, template), fields(provider = P::NAME, cluster = %cluster.id))]
pub async fn add_node_pools<P: HostedProvider>(
    client: &dyn ManagementClient,
    cluster: &Cluster,
    template: &P::Spec,
    count: usize,
    verification: Verification,
) -> Result<Cluster, OperationError> {
    let pool_template = template
        .node_pools()
        .first()
        .ok_or(ProviderError::EmptyTemplate(P::DISPLAY_NAME))?;

    let mut pools = desired_spec::<P>(cluster)?.node_pools().to_vec();
    for _ in 0..count {
        let mut pool = pool_template.clone();
        pool.clear_identity();
        pool.set_name(append_random_string(NODE_POOL_NAME_PREFIX));
        pools.push(pool);
    }
    let expected: Vec<String> = pools.iter().map(|np| np.name().to_string()).collect();

    info!("Adding {} {} node pool(s)", count, P::DISPLAY_NAME);
    let updated = update_cluster::<P, _>(client, cluster, |spec| *spec.node_pools_mut() = pools).await?;

    converge_pool_list::<P>(client, updated, expected, verification).await
}

/// Replace a config's node pools with `count` copies of its first pool
///
/// Each copy is named after the first pool plus a random suffix. Meant as a
/// `customize` hook for [`create_cluster`] so a cluster starts with several
/// pools. A config without pools is left as is.
pub fn add_node_pools_to_config<P: HostedProvider>(spec: &mut P::Spec, count: usize) {
    let Some(pool_template) = spec.node_pools().first().cloned() else {
        warn!("{} template has no node pool to copy", P::DISPLAY_NAME);
        return;
    };

    let pools = (0..count)
        .map(|_| {
            let mut pool = pool_template.clone();
            pool.clear_identity();
            pool.set_name(append_random_string(pool_template.name()));
            pool
        })
        .collect::<Vec<_>>();
    *spec.node_pools_mut() = pools;
}

/// Truncate the node pool list to its first entry
#[instrument(skip(client, cluster), fields(provider = P::NAME, cluster = %cluster.id))]
pub async fn delete_node_pool<P: HostedProvider>(
    client: &dyn ManagementClient,
    cluster: &Cluster,
    verification: Verification,
) -> Result<Cluster, OperationError> {
    let current = desired_spec::<P>(cluster)?.node_pool_names();
    if current.len() <= 1 {
        warn!(pools = ?current, "Nothing to delete beyond the first node pool");
    }
    let expected: Vec<String> = current.into_iter().take(1).collect();

    info!("Deleting {} node pools down to {:?}", P::DISPLAY_NAME, expected);
    let updated = update_cluster::<P, _>(client, cluster, |spec| spec.node_pools_mut().truncate(1)).await?;

    converge_pool_list::<P>(client, updated, expected, verification).await
}

/// Check and wait for a node pool list change: count first, then names in order
async fn converge_pool_list<P: HostedProvider>(
    client: &dyn ManagementClient,
    updated: Cluster,
    expected: Vec<String>,
    verification: Verification,
) -> Result<Cluster, OperationError> {
    let pools_field = P::NODE_POOLS_FIELD;

    if verification.verify {
        let accepted = desired_spec::<P>(&updated)?.node_pool_names();
        if accepted.len() != expected.len() {
            return Err(OperationError::NotAccepted {
                field: P::desired_path(pools_field),
                expected: format!("{} node pools", expected.len()),
                actual: format!("{} node pools", accepted.len()),
            });
        }
        if accepted != expected {
            return Err(OperationError::NameMismatch {
                field: P::desired_path(pools_field),
                expected,
                actual: accepted,
            });
        }
    }

    if !verification.wait {
        return Ok(updated);
    }

    wait_cluster_active(client, &updated.id, PollTiming::CLUSTER_ACTIVE).await?;
    let cluster = wait_for_field(
        client,
        &updated.id,
        &P::upstream_path(&format!("{}.length", pools_field)),
        &expected.len(),
        |c: &Cluster| observed_pool_names::<P>(c).len(),
        PollTiming::NODE_POOL,
    )
    .await?;

    let observed = observed_pool_names::<P>(&cluster);
    if observed != expected {
        return Err(OperationError::NameMismatch {
            field: P::upstream_path(pools_field),
            expected,
            actual: observed,
        });
    }

    info!(pools = ?observed, "Node pool list converged");
    Ok(cluster)
}

/// Cloud credential to create clusters with
///
/// Uses the configured credential if there is one, otherwise creates one
/// from the provider's environment variables.
pub async fn resolve_cloud_credential<P: HostedProvider>(
    client: &dyn ManagementClient,
    settings: &Settings,
) -> Result<String, OperationError> {
    if let Some(id) = &settings.rancher.cloud_credential_id {
        return Ok(id.clone());
    }

    let credential = P::cloud_credential(&append_random_string(&format!("{}-cc", P::NAME)))?;
    let id = client
        .create_cloud_credential(&credential)
        .await
        .map_err(OperationError::api("create cloud credential"))?;
    info!(provider = P::NAME, credential = %id, "Created cloud credential");
    Ok(id)
}
