//! hosted-e2e - end-to-end tests for hosted Kubernetes clusters
//!
//! Drives ACK, CCE and TKE clusters through a Rancher management server and
//! checks that every change the server accepts eventually shows up in what
//! the cloud reports back.
//!
//! # Example
//!
//! ```ignore
//! use hosted_e2e::provider::Ack;
//! use hosted_e2e::{scenario, TestContext};
//!
//! #[hosted_e2e::test]
//! #[ignore]
//! async fn ack_upgrade(ctx: &mut TestContext) -> Result<(), Box<dyn std::error::Error>> {
//!     ctx.use_provider::<Ack>();
//!     let path = ctx.k8s_upgrade_path::<Ack>().await?;
//!     ctx.create_cluster::<Ack>(&path.from).await?;
//!     scenario::upgrade_kubernetes_version_checks::<Ack>(ctx).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Environment
//!
//! - `CATTLE_TEST_CONFIG`: path of the YAML test config
//! - `DOWNSTREAM_K8S_MINOR_VERSION`: pin the Kubernetes version
//! - `HOSTED_E2E_KEEP_ALL`: keep clusters even after passing tests
//! - `RUST_LOG`: log filter

pub mod config;
pub mod context;
pub mod converge;
pub mod diagnostics;
pub mod eventually;
pub mod fixtures;
pub mod lifecycle;
pub mod management;
pub mod model;
pub mod namegen;
pub mod provider;
pub mod scenario;
pub mod telemetry;
pub mod versions;
pub mod wait;

pub use config::{ConfigError, RancherConfig, Settings};
pub use context::{ContextError, TestContext};
pub use converge::{wait_cluster_active, wait_for_field, ConvergeError, PollTiming};
pub use diagnostics::Diagnostics;
pub use eventually::{eventually, ConditionError, Probe};
pub use hosted_e2e_macros::test;
pub use lifecycle::{OperationError, Verification};
pub use management::{ManagementClient, ManagementError, RancherClient};
pub use model::Cluster;
pub use provider::{Ack, Cce, HostedProvider, Tke};
pub use scenario::ScenarioError;
pub use wait::WaitError;

#[doc(hidden)]
pub mod __private {
    pub use futures::FutureExt;
}
