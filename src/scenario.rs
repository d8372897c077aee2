//! Reusable test scenarios
//!
//! Scenarios run a fixed sequence of named steps against the cluster in a
//! [`TestContext`]. A failed step aborts the scenario and carries the step
//! description, so the test output says which part broke.
//!
//! # Example
//!
//! ```ignore
//! use hosted_e2e::provider::Ack;
//! use hosted_e2e::scenario;
//!
//! #[hosted_e2e::test]
//! #[ignore]
//! async fn ack_node_pools(ctx: &mut TestContext) -> Result<(), Box<dyn std::error::Error>> {
//!     ctx.use_provider::<Ack>();
//!     let version = ctx.k8s_version::<Ack>(false).await?;
//!     ctx.create_cluster::<Ack>(&version).await?;
//!     scenario::node_pool_checks::<Ack>(ctx).await?;
//!     Ok(())
//! }
//! ```

use std::error::Error;
use std::future::Future;
use tracing::info;

use crate::context::TestContext;
use crate::lifecycle::{self, Verification};
use crate::provider::{ClusterSpec, HostedProvider, NodePoolSpec};
use crate::versions;

/// Node pool scale step used by [`node_pool_checks`]
pub const INCREASE_BY: i64 = 1;

/// Error type for scenario steps
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("step '{step}' failed: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },

    #[error("no cluster in the test context")]
    NoCluster,

    #[error("cluster {0} has no node pools")]
    NoNodePools(String),
}

/// Run one named step
///
/// Logs the description before running and wraps a failure with it.
pub async fn step<T, E, Fut>(description: &str, fut: Fut) -> Result<T, ScenarioError>
where
    Fut: Future<Output = Result<T, E>>,
    E: Into<Box<dyn Error + Send + Sync>>,
{
    info!("By: {}", description);
    fut.await.map_err(|e| ScenarioError::Step {
        step: description.to_string(),
        source: e.into(),
    })
}

/// Check the cluster is ready, then upgrade it to the target of
/// [`versions::k8s_upgrade_path`]
///
/// Create the cluster at the path's `from` version first.
pub async fn upgrade_kubernetes_version_checks<P: HostedProvider>(
    ctx: &mut TestContext,
) -> Result<(), ScenarioError> {
    let client = ctx.client.clone();
    let client = client.as_ref();
    let cluster = ctx.cluster.clone().ok_or(ScenarioError::NoCluster)?;

    let cluster = step(
        "checking the cluster is ready",
        lifecycle::cluster_is_ready_checks::<P>(client, &cluster, &ctx.cluster_name),
    )
    .await?;
    ctx.track(cluster.clone());

    let upgrade_to = step(
        "picking the upgrade version",
        versions::k8s_upgrade_path::<P>(client, &ctx.settings),
    )
    .await?
    .to;
    info!("Upgrading {} cluster to version {}", P::DISPLAY_NAME, upgrade_to);

    let upgraded = step(
        &format!("upgrading the {} cluster", P::DISPLAY_NAME),
        lifecycle::upgrade_kubernetes_version::<P>(client, &cluster, &upgrade_to, true),
    )
    .await?;
    ctx.track(upgraded);

    Ok(())
}

/// Check the cluster is ready, then scale up and down, add a node pool and
/// delete back to the first one, verifying and waiting at every step
pub async fn node_pool_checks<P: HostedProvider>(
    ctx: &mut TestContext,
) -> Result<(), ScenarioError> {
    let client = ctx.client.clone();
    let client = client.as_ref();
    let cluster = ctx.cluster.clone().ok_or(ScenarioError::NoCluster)?;

    let mut cluster = step(
        "checking the cluster is ready",
        lifecycle::cluster_is_ready_checks::<P>(client, &cluster, &ctx.cluster_name),
    )
    .await?;
    ctx.track(cluster.clone());

    let initial = P::desired(&cluster)
        .and_then(|spec| spec.node_pools().first().map(NodePoolSpec::replicas))
        .ok_or_else(|| ScenarioError::NoNodePools(cluster.id.clone()))?;

    cluster = step(
        "scaling up the node pool",
        lifecycle::scale_node_pools::<P>(client, &cluster, initial + INCREASE_BY, Verification::full()),
    )
    .await?;
    ctx.track(cluster.clone());

    cluster = step(
        "scaling down the node pool",
        lifecycle::scale_node_pools::<P>(client, &cluster, initial, Verification::full()),
    )
    .await?;
    ctx.track(cluster.clone());

    let template = step(
        "loading the node pool template",
        std::future::ready(lifecycle::load_template::<P>(&ctx.settings)),
    )
    .await?;

    cluster = step(
        "adding a node pool",
        lifecycle::add_node_pools::<P>(client, &cluster, &template, 1, Verification::full()),
    )
    .await?;
    ctx.track(cluster.clone());

    cluster = step(
        "deleting the node pool",
        lifecycle::delete_node_pool::<P>(client, &cluster, Verification::full()),
    )
    .await?;
    ctx.track(cluster);

    Ok(())
}
