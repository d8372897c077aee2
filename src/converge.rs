//! Eventual convergence of cluster fields
//!
//! After a mutation the management server accepts the desired config at once
//! but the cloud reports it back in the upstream status much later. The
//! functions here re-fetch the cluster at a fixed interval until the observed
//! side matches.
//!
//! # Example
//!
//! ```ignore
//! use hosted_e2e::converge::{wait_for_field, PollTiming};
//!
//! let cluster = wait_for_field(
//!     client.as_ref(),
//!     &cluster.id,
//!     "ackStatus.upstreamSpec.kubernetesVersion",
//!     &Some("1.32.7-aliyun.1".to_string()),
//!     |c| Ack::observed(c).and_then(|s| s.kubernetes_version()).map(str::to_string),
//!     PollTiming::from_secs(30 * 60, 30),
//! )
//! .await?;
//! ```

use std::fmt::Debug;
use std::time::Duration;
use tracing::{debug, info};

use crate::eventually::{eventually, ConditionError, Probe};
use crate::management::{ManagementClient, ManagementError};
use crate::model::Cluster;
use crate::wait::WaitError;

/// Timeout and polling interval of one wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollTiming {
    /// Node pool scale, add and delete: 15 minutes, every 10 seconds
    pub const NODE_POOL: PollTiming = PollTiming::from_secs(15 * 60, 10);

    /// Cluster returning to active after an update: 30 minutes, every 10 seconds
    pub const CLUSTER_ACTIVE: PollTiming = PollTiming::from_secs(30 * 60, 10);

    pub const fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }

    pub const fn from_secs(timeout: u64, interval: u64) -> Self {
        Self::new(Duration::from_secs(timeout), Duration::from_secs(interval))
    }
}

/// Error type for convergence waits
#[derive(Debug, thiserror::Error)]
pub enum ConvergeError {
    #[error("{0}")]
    Timeout(#[from] WaitError),

    #[error("failed to fetch cluster {cluster}: {source}")]
    Fetch {
        cluster: String,
        #[source]
        source: ManagementError,
    },

    #[error("cluster {cluster} reported an error: {message}")]
    ClusterFailed { cluster: String, message: String },
}

fn into_converge_error(
    err: ConditionError<ConvergeError>,
    cluster_id: &str,
    field: &str,
    expected: String,
) -> ConvergeError {
    match err {
        ConditionError::EventuallyFailed {
            attempts,
            elapsed,
            timeout,
            last_state,
        } => ConvergeError::Timeout(
            WaitError::new(cluster_id, field, timeout, elapsed)
                .with_expected(expected)
                .with_actual(last_state)
                .with_attempts(attempts),
        ),
        ConditionError::ProbeFailed { source, .. } => source,
    }
}

/// Poll a cluster until `accessor` returns `expected`
///
/// `field` names what the accessor reads and is only used for logging and
/// errors. Values compare with `==`: node counts exactly, versions as plain
/// strings. Returns the last fetched cluster.
pub async fn wait_for_field<T, A>(
    client: &dyn ManagementClient,
    cluster_id: &str,
    field: &str,
    expected: &T,
    accessor: A,
    timing: PollTiming,
) -> Result<Cluster, ConvergeError>
where
    T: PartialEq + Debug,
    A: Fn(&Cluster) -> T,
{
    info!(cluster = %cluster_id, field = %field, expected = ?expected, "Waiting for field to converge");

    let accessor = &accessor;
    let cluster = eventually(move || async move {
        let cluster = client
            .cluster_by_id(cluster_id)
            .await
            .map_err(|source| ConvergeError::Fetch {
                cluster: cluster_id.to_string(),
                source,
            })?;

        let actual = accessor(&cluster);
        if actual == *expected {
            Ok::<_, ConvergeError>(Probe::Ready(cluster))
        } else {
            info!(cluster = %cluster_id, field = %field, actual = ?actual, expected = ?expected, "Still waiting");
            Ok(Probe::Pending(format!("{:?}", actual)))
        }
    })
    .timeout(timing.timeout)
    .interval(timing.interval)
    .await_condition()
    .await
    .map_err(|e| into_converge_error(e, cluster_id, field, format!("{:?}", expected)))?;

    info!(cluster = %cluster_id, field = %field, "Done waiting for field to converge");
    Ok(cluster)
}

/// Poll a cluster until its state is `active`
///
/// A cluster whose `transitioning` is `error` fails the wait at once.
pub async fn wait_cluster_active(
    client: &dyn ManagementClient,
    cluster_id: &str,
    timing: PollTiming,
) -> Result<Cluster, ConvergeError> {
    debug!(cluster = %cluster_id, "Waiting for cluster to become active");

    eventually(move || async move {
        let cluster = client
            .cluster_by_id(cluster_id)
            .await
            .map_err(|source| ConvergeError::Fetch {
                cluster: cluster_id.to_string(),
                source,
            })?;

        if cluster.is_errored() {
            return Err(ConvergeError::ClusterFailed {
                cluster: cluster_id.to_string(),
                message: cluster.state_description(),
            });
        }

        if cluster.is_active() {
            Ok(Probe::Ready(cluster))
        } else {
            debug!(cluster = %cluster_id, state = %cluster.state_description(), "Cluster not active yet");
            Ok(Probe::Pending(cluster.state_description()))
        }
    })
    .timeout(timing.timeout)
    .interval(timing.interval)
    .await_condition()
    .await
    .map_err(|e| into_converge_error(e, cluster_id, "state", format!("{:?}", "active")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::FakeManagement;
    use crate::model::{AckClusterConfigSpec, AckNodePool};
    use crate::provider::{Ack, ClusterSpec, HostedProvider};

    fn ack_cluster(version: &str) -> Cluster {
        let mut cluster = Cluster {
            name: "converge".to_string(),
            ..Default::default()
        };
        Ack::attach(
            &mut cluster,
            AckClusterConfigSpec {
                kubernetes_version: Some(version.to_string()),
                node_pool_list: vec![AckNodePool {
                    name: "np".to_string(),
                    instances_num: 3,
                    ..Default::default()
                }],
                ..Default::default()
            },
        );
        cluster
    }

    fn observed_version(cluster: &Cluster) -> Option<String> {
        Ack::observed(cluster)
            .and_then(ClusterSpec::kubernetes_version)
            .map(str::to_string)
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_field_converges_after_lag() {
        let fake = FakeManagement::new().reconcile_after(3);
        let created = fake.create_cluster(&ack_cluster("1.31.9-aliyun.1")).await.unwrap();

        let cluster = wait_for_field(
            &fake,
            &created.id,
            "ackStatus.upstreamSpec.kubernetesVersion",
            &Some("1.31.9-aliyun.1".to_string()),
            observed_version,
            PollTiming::from_secs(60, 1),
        )
        .await
        .unwrap();

        assert_eq!(observed_version(&cluster).as_deref(), Some("1.31.9-aliyun.1"));
        assert_eq!(fake.fetch_count(&created.id), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_field_times_out_with_context() {
        let fake = FakeManagement::new().stalled();
        let created = fake.create_cluster(&ack_cluster("1.31.9-aliyun.1")).await.unwrap();
        let start = tokio::time::Instant::now();

        let err = wait_for_field(
            &fake,
            &created.id,
            "ackStatus.upstreamSpec.kubernetesVersion",
            &Some("1.32.7-aliyun.1".to_string()),
            observed_version,
            PollTiming::from_secs(60, 10),
        )
        .await
        .unwrap_err();

        assert_eq!(start.elapsed(), Duration::from_secs(60));
        match err {
            ConvergeError::Timeout(wait) => {
                assert_eq!(wait.cluster, created.id);
                assert_eq!(wait.field, "ackStatus.upstreamSpec.kubernetesVersion");
                assert!(wait.expected.contains("1.32.7-aliyun.1"));
                assert_eq!(wait.actual, "None");
                assert_eq!(wait.timeout, Duration::from_secs(60));
                assert_eq!(wait.elapsed, Duration::from_secs(60));
            }
            other => panic!("expected Timeout, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_field_fetch_error_fails_fast() {
        let fake = FakeManagement::new();
        let err = wait_for_field(
            &fake,
            "c-missing",
            "state",
            &Some("active".to_string()),
            |c: &Cluster| c.state.clone(),
            PollTiming::from_secs(60, 10),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            ConvergeError::Fetch { source: ManagementError::NotFound(_), .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_cluster_active() {
        let fake = FakeManagement::new().reconcile_after(2);
        let created = fake.create_cluster(&ack_cluster("1.31.9-aliyun.1")).await.unwrap();
        assert!(!created.is_active());

        let cluster = wait_cluster_active(&fake, &created.id, PollTiming::from_secs(60, 5))
            .await
            .unwrap();
        assert!(cluster.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_cluster_active_fails_on_error_state() {
        let fake = FakeManagement::new().stalled();
        let created = fake.create_cluster(&ack_cluster("1.31.9-aliyun.1")).await.unwrap();
        fake.set_error(&created.id, "quota exceeded");

        let err = wait_cluster_active(&fake, &created.id, PollTiming::from_secs(60, 5))
            .await
            .unwrap_err();

        match err {
            ConvergeError::ClusterFailed { message, .. } => {
                assert!(message.contains("quota exceeded"))
            }
            other => panic!("expected ClusterFailed, got {:?}", other),
        }
    }
}
