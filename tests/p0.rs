//! P0 suites against a live management server
//!
//! These create real cloud clusters and need `CATTLE_TEST_CONFIG` plus the
//! provider's credential variables, so they are ignored by default:
//!
//! ```bash
//! CATTLE_TEST_CONFIG=cattle-config.yaml cargo test --test p0 ack -- --ignored
//! ```

use std::error::Error;

use hosted_e2e::provider::{Ack, Cce, HostedProvider, Tke};
use hosted_e2e::{scenario, versions, TestContext};

async fn create_latest<P: HostedProvider>(
    ctx: &mut TestContext,
    region: Option<String>,
) -> Result<(), Box<dyn Error>> {
    ctx.use_provider::<P>();
    let version = ctx.k8s_version::<P>(false).await?;
    ctx.create_cluster_with::<P, _>(&version, region, |_| {})
        .await?;
    Ok(())
}

async fn create_for_upgrade<P: HostedProvider>(
    ctx: &mut TestContext,
    region: Option<String>,
) -> Result<(), Box<dyn Error>> {
    ctx.use_provider::<P>();
    let path = ctx.k8s_upgrade_path::<P>().await?;
    ctx.create_cluster_with::<P, _>(&path.from, region, |_| {})
        .await?;
    Ok(())
}

fn cce_region() -> Option<String> {
    std::env::var("HUAWEI_REGION_ID").ok()
}

mod ack {
    use super::*;

    #[hosted_e2e::test]
    #[ignore]
    async fn provision_and_manage_node_pools(ctx: &mut TestContext) -> Result<(), Box<dyn Error>> {
        create_latest::<Ack>(ctx, None).await?;
        scenario::node_pool_checks::<Ack>(ctx).await?;
        Ok(())
    }

    #[hosted_e2e::test]
    #[ignore]
    async fn upgrade_kubernetes_version(ctx: &mut TestContext) -> Result<(), Box<dyn Error>> {
        create_for_upgrade::<Ack>(ctx, None).await?;
        scenario::upgrade_kubernetes_version_checks::<Ack>(ctx).await?;
        Ok(())
    }
}

mod cce {
    use super::*;

    #[hosted_e2e::test]
    #[ignore]
    async fn provision_and_manage_node_pools(ctx: &mut TestContext) -> Result<(), Box<dyn Error>> {
        create_latest::<Cce>(ctx, cce_region()).await?;
        scenario::node_pool_checks::<Cce>(ctx).await?;
        Ok(())
    }

    #[hosted_e2e::test]
    #[ignore]
    async fn upgrade_kubernetes_version(ctx: &mut TestContext) -> Result<(), Box<dyn Error>> {
        create_for_upgrade::<Cce>(ctx, cce_region()).await?;
        scenario::upgrade_kubernetes_version_checks::<Cce>(ctx).await?;

        let cluster = ctx.cluster()?;
        let remaining = versions::list_cce_available_versions(ctx.client.as_ref(), cluster).await?;
        tracing::info!(versions = ?remaining, "CCE upgrade targets after upgrade");
        Ok(())
    }
}

mod tke {
    use super::*;

    #[hosted_e2e::test]
    #[ignore]
    async fn provision_and_manage_node_pools(ctx: &mut TestContext) -> Result<(), Box<dyn Error>> {
        create_latest::<Tke>(ctx, None).await?;
        scenario::node_pool_checks::<Tke>(ctx).await?;
        Ok(())
    }

    #[hosted_e2e::test]
    #[ignore]
    async fn upgrade_kubernetes_version(ctx: &mut TestContext) -> Result<(), Box<dyn Error>> {
        create_for_upgrade::<Tke>(ctx, None).await?;
        scenario::upgrade_kubernetes_version_checks::<Tke>(ctx).await?;
        Ok(())
    }
}
