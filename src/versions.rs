//! Kubernetes version selection
//!
//! Each provider offers a fixed catalog per management server version. The
//! catalog is narrowed to what the UI supports, then a version is picked for
//! a test: the highest one, or for upgrade tests the highest patch of the
//! second-highest minor.

use semver::{Version, VersionReq};
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::management::{server_version, ManagementClient, ManagementError, UI_K8S_RANGE_SETTING};
use crate::model::Cluster;
use crate::provider::{Cce, HostedProvider};

/// Error type for version selection
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error(transparent)]
    Management(#[from] ManagementError),

    #[error("no {0} versions available")]
    NoVersions(&'static str),

    #[error("only one minor version available, cannot pick an upgrade version from {0:?}")]
    NoUpgradeCandidate(Vec<String>),

    #[error("no version below {0} to upgrade from")]
    NoUpgradeSource(String),

    #[error("cannot parse Kubernetes version '{0}'")]
    Invalid(String),
}

/// Parse a Kubernetes version into `major.minor.patch`
///
/// Accepts a leading `v`, missing components (`v1.32` is `1.32.0`) and a
/// vendor suffix after `-` or `+` (`1.31.9-aliyun.1`). The suffix is dropped,
/// so vendor builds order and match ranges like the release they are cut from.
pub fn parse_version(raw: &str) -> Option<Version> {
    let raw = raw.trim();
    let raw = raw.strip_prefix('v').unwrap_or(raw);
    let core = raw.split(['-', '+']).next()?;

    let mut parts = core.split('.').map(str::parse::<u64>);
    let major = parts.next()?.ok()?;
    let minor = parts.next().transpose().ok()?.unwrap_or(0);
    let patch = parts.next().transpose().ok()?.unwrap_or(0);
    if parts.next().is_some() {
        return None;
    }

    Some(Version::new(major, minor, patch))
}

fn minor_key(version: &Version) -> (u64, u64) {
    (version.major, version.minor)
}

/// Rewrite one UI range term for [`VersionReq`]
///
/// `x` wildcards become partial versions (`<=1.33` covers every 1.33 patch)
/// and a bare version is an exact match instead of a caret requirement.
fn normalize_term(term: &str) -> String {
    let split = term
        .find(|c: char| c.is_ascii_digit() || c == 'v')
        .unwrap_or(term.len());
    let (op, version) = term.split_at(split);
    let mut version = version.strip_prefix('v').unwrap_or(version);
    while let Some(rest) = [".x", ".X", ".*"]
        .iter()
        .find_map(|wildcard| version.strip_suffix(*wildcard))
    {
        version = rest;
    }

    let op = if op.is_empty() { "=" } else { op };
    format!("{}{}", op, version)
}

/// Parse a UI range such as `>=1.28.x <=1.33.x`, terms split by spaces or commas
fn parse_range(range: &str) -> Option<VersionReq> {
    let terms: Vec<String> = range
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|t| !t.is_empty())
        .map(normalize_term)
        .collect();
    VersionReq::parse(&terms.join(", ")).ok()
}

/// Keep only versions inside a UI range such as `>=1.28.x <=1.33.x`
///
/// An empty or unparsable range keeps the list as is. With a valid range,
/// versions that cannot be parsed are dropped.
pub fn filter_ui_supported(versions: Vec<String>, range: &str) -> Vec<String> {
    if range.trim().is_empty() {
        return versions;
    }

    let Some(req) = parse_range(range) else {
        warn!(range = %range, "Ignoring unparsable UI version range");
        return versions;
    };

    versions
        .into_iter()
        .filter(|raw| parse_version(raw).is_some_and(|v| req.matches(&v)))
        .collect()
}

fn parsed(versions: &[String]) -> Result<Vec<(Version, &String)>, VersionError> {
    let mut parsed = versions
        .iter()
        .map(|raw| {
            parse_version(raw)
                .map(|v| (v, raw))
                .ok_or_else(|| VersionError::Invalid(raw.clone()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    parsed.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(parsed)
}

/// Pick the default version from a catalog
///
/// Returns the highest version, or with `for_upgrade` the highest version of
/// the second-highest minor so that an upgrade target remains.
pub fn default_k8s_version(versions: &[String], for_upgrade: bool) -> Result<String, VersionError> {
    let sorted = parsed(versions)?;
    let (highest, raw) = sorted.first().ok_or(VersionError::NoVersions("Kubernetes"))?;
    if !for_upgrade {
        return Ok((*raw).clone());
    }

    sorted
        .iter()
        .find(|(v, _)| minor_key(v) < minor_key(highest))
        .map(|(_, raw)| (*raw).clone())
        .ok_or_else(|| VersionError::NoUpgradeCandidate(versions.to_vec()))
}

/// Highest version whose minor is below `target`'s, to create a cluster that
/// can then be upgraded to `target`
pub fn upgrade_source_version(versions: &[String], target: &str) -> Result<String, VersionError> {
    let target_version =
        parse_version(target).ok_or_else(|| VersionError::Invalid(target.to_string()))?;

    parsed(versions)?
        .into_iter()
        .find(|(v, _)| minor_key(v) < minor_key(&target_version))
        .map(|(_, raw)| raw.clone())
        .ok_or_else(|| VersionError::NoUpgradeSource(target.to_string()))
}

/// Versions an upgrade test creates its cluster at and upgrades to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradePath {
    pub from: String,
    pub to: String,
}

/// Pick an upgrade path from a catalog
///
/// The target is [`default_k8s_version`] with `for_upgrade`, reached from the
/// highest version of a lower minor. A catalog with exactly two minors has
/// nothing below that target, so the path runs from the lower minor to the
/// highest version instead.
pub fn upgrade_path(versions: &[String]) -> Result<UpgradePath, VersionError> {
    let target = default_k8s_version(versions, true)?;
    match upgrade_source_version(versions, &target) {
        Ok(from) => Ok(UpgradePath { from, to: target }),
        Err(VersionError::NoUpgradeSource(_)) => Ok(UpgradePath {
            to: default_k8s_version(versions, false)?,
            from: target,
        }),
        Err(e) => Err(e),
    }
}

/// CCE versions a cluster at `current` may upgrade to
///
/// Versions strictly above `current` and at most one minor ahead, formatted
/// `v<major>.<minor>`, highest first. Unparsable catalog entries are skipped.
pub fn cce_available_versions(current: &str, all: &[String]) -> Result<Vec<String>, VersionError> {
    let current =
        parse_version(current).ok_or_else(|| VersionError::Invalid(current.to_string()))?;

    let mut candidates: Vec<Version> = all
        .iter()
        .filter_map(|raw| parse_version(raw))
        .filter(|v| *v > current && v.minor <= current.minor + 1)
        .collect();
    candidates.sort_by(|a, b| b.cmp(a));
    candidates.dedup_by_key(|v| minor_key(v));

    Ok(candidates
        .into_iter()
        .map(|v| format!("v{}.{}", v.major, v.minor))
        .collect())
}

/// A provider's catalog for the connected server, filtered to the UI range
pub async fn list_all_versions<P: HostedProvider>(
    client: &dyn ManagementClient,
) -> Result<Vec<String>, VersionError> {
    let server = server_version(client).await?;
    let catalog = P::version_catalog(&server);

    let range = match client.setting(UI_K8S_RANGE_SETTING).await {
        Ok(range) => range,
        Err(ManagementError::NotFound(_)) => String::new(),
        Err(e) => return Err(e.into()),
    };

    let versions = filter_ui_supported(catalog, &range);
    debug!(provider = P::NAME, server = %server, range = %range, versions = ?versions, "Listed versions");
    Ok(versions)
}

/// Version to use for a test
///
/// A pinned `DOWNSTREAM_K8S_MINOR_VERSION` wins; otherwise
/// [`default_k8s_version`] over [`list_all_versions`].
pub async fn k8s_version<P: HostedProvider>(
    client: &dyn ManagementClient,
    settings: &Settings,
    for_upgrade: bool,
) -> Result<String, VersionError> {
    if let Some(pinned) = &settings.downstream_k8s_version {
        info!(provider = P::NAME, version = %pinned, "Using pinned Kubernetes version");
        return Ok(pinned.clone());
    }

    let versions = list_all_versions::<P>(client).await?;
    if versions.is_empty() {
        return Err(VersionError::NoVersions(P::DISPLAY_NAME));
    }
    default_k8s_version(&versions, for_upgrade)
}

/// Upgrade path for a test
///
/// A pinned `DOWNSTREAM_K8S_MINOR_VERSION` is the target and the cluster
/// starts from [`upgrade_source_version`]; otherwise [`upgrade_path`] over
/// [`list_all_versions`].
pub async fn k8s_upgrade_path<P: HostedProvider>(
    client: &dyn ManagementClient,
    settings: &Settings,
) -> Result<UpgradePath, VersionError> {
    let versions = list_all_versions::<P>(client).await?;
    if let Some(pinned) = &settings.downstream_k8s_version {
        let from = upgrade_source_version(&versions, pinned)?;
        return Ok(UpgradePath {
            from,
            to: pinned.clone(),
        });
    }

    if versions.is_empty() {
        return Err(VersionError::NoVersions(P::DISPLAY_NAME));
    }
    let path = upgrade_path(&versions)?;
    info!(provider = P::NAME, from = %path.from, to = %path.to, "Picked upgrade path");
    Ok(path)
}

/// Upgrade targets for a live CCE cluster, read from its reported version
pub async fn list_cce_available_versions(
    client: &dyn ManagementClient,
    cluster: &Cluster,
) -> Result<Vec<String>, VersionError> {
    let current = cluster
        .version
        .as_ref()
        .map(|v| v.git_version.as_str())
        .unwrap_or_default();
    let all = list_all_versions::<Cce>(client).await?;
    cce_available_versions(current, &all)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RancherConfig;
    use crate::fixtures::FakeManagement;
    use crate::model::VersionInfo;
    use crate::provider::{Ack, Tke};

    fn strings(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("1.31.9-aliyun.1"), Some(Version::new(1, 31, 9)));
        assert_eq!(parse_version("v1.32"), Some(Version::new(1, 32, 0)));
        assert_eq!(parse_version("v1.30.14-r0").map(|v| v.patch), Some(14));
        assert!(parse_version("latest").is_none());
        assert!(parse_version("1.2.3.4").is_none());
    }

    #[test]
    fn test_normalize_term() {
        assert_eq!(normalize_term(">=1.28.x"), ">=1.28");
        assert_eq!(normalize_term("<=v1.33.X"), "<=1.33");
        assert_eq!(normalize_term("1.30.*"), "=1.30");
        assert_eq!(normalize_term("<1.32.4"), "<1.32.4");
    }

    #[test]
    fn test_filter_ui_supported() {
        let versions = strings(&["v1.27", "v1.28", "v1.33", "v1.34"]);
        assert_eq!(
            filter_ui_supported(versions, ">=1.28.x <=1.33.x"),
            strings(&["v1.28", "v1.33"])
        );
    }

    #[test]
    fn test_filter_ui_supported_keeps_list_on_bad_range() {
        let versions = strings(&["1.30.0", "1.28.3"]);
        assert_eq!(filter_ui_supported(versions.clone(), ""), versions);
        assert_eq!(filter_ui_supported(versions.clone(), "~garbage"), versions);
    }

    #[test]
    fn test_filter_ui_supported_strict_bounds() {
        let versions = strings(&["1.28.3", "1.30.0", "1.32.2"]);
        assert_eq!(
            filter_ui_supported(versions, ">1.28.x, <1.32.x"),
            strings(&["1.30.0"])
        );
    }

    #[test]
    fn test_default_k8s_version() {
        let versions = strings(&["1.31.9-aliyun.1", "1.32.7-aliyun.1", "1.33.3-aliyun.1"]);
        assert_eq!(default_k8s_version(&versions, false).unwrap(), "1.33.3-aliyun.1");
        assert_eq!(default_k8s_version(&versions, true).unwrap(), "1.32.7-aliyun.1");
    }

    #[test]
    fn test_default_k8s_version_single_minor() {
        let versions = strings(&["1.31.9-aliyun.1"]);
        assert!(matches!(
            default_k8s_version(&versions, true),
            Err(VersionError::NoUpgradeCandidate(_))
        ));
        assert!(matches!(
            default_k8s_version(&[], false),
            Err(VersionError::NoVersions(_))
        ));
    }

    #[test]
    fn test_upgrade_source_version() {
        let versions = strings(&["1.31.9-aliyun.1", "1.32.7-aliyun.1", "1.33.3-aliyun.1"]);
        assert_eq!(
            upgrade_source_version(&versions, "1.32.7-aliyun.1").unwrap(),
            "1.31.9-aliyun.1"
        );
        assert!(matches!(
            upgrade_source_version(&versions, "1.31.9-aliyun.1"),
            Err(VersionError::NoUpgradeSource(_))
        ));
    }

    #[test]
    fn test_upgrade_path() {
        let three = strings(&["1.31.9-aliyun.1", "1.32.7-aliyun.1", "1.33.3-aliyun.1"]);
        assert_eq!(
            upgrade_path(&three).unwrap(),
            UpgradePath {
                from: "1.31.9-aliyun.1".to_string(),
                to: "1.32.7-aliyun.1".to_string(),
            }
        );

        let two = strings(&["1.32.2", "1.30.0"]);
        assert_eq!(
            upgrade_path(&two).unwrap(),
            UpgradePath {
                from: "1.30.0".to_string(),
                to: "1.32.2".to_string(),
            }
        );

        assert!(matches!(
            upgrade_path(&strings(&["1.31.9-aliyun.1"])),
            Err(VersionError::NoUpgradeCandidate(_))
        ));
    }

    #[tokio::test]
    async fn test_k8s_upgrade_path_on_two_minor_catalogs() {
        let settings = Settings::new(RancherConfig::new("h", "t"));

        for server in ["v2.12.1", "v2.11.0"] {
            let fake = FakeManagement::new().with_server_version(server);
            let path = k8s_upgrade_path::<Tke>(&fake, &settings).await.unwrap();
            assert_eq!((path.from.as_str(), path.to.as_str()), ("1.30.0", "1.32.2"));
        }

        let fake = FakeManagement::new().with_server_version("v2.11.0");
        let path = k8s_upgrade_path::<Ack>(&fake, &settings).await.unwrap();
        assert_eq!(
            (path.from.as_str(), path.to.as_str()),
            ("1.31.9-aliyun.1", "1.32.7-aliyun.1")
        );

        let fake = FakeManagement::new().with_server_version("v2.12.1");
        let path = k8s_upgrade_path::<Ack>(&fake, &settings).await.unwrap();
        assert_eq!(
            (path.from.as_str(), path.to.as_str()),
            ("1.31.9-aliyun.1", "1.32.7-aliyun.1")
        );
    }

    #[tokio::test]
    async fn test_k8s_upgrade_path_pinned_target() {
        let fake = FakeManagement::new().with_server_version("v2.12.1");
        let settings =
            Settings::new(RancherConfig::new("h", "t")).downstream_k8s_version("1.33.3-aliyun.1");

        let path = k8s_upgrade_path::<Ack>(&fake, &settings).await.unwrap();
        assert_eq!(path.from, "1.32.7-aliyun.1");
        assert_eq!(path.to, "1.33.3-aliyun.1");
    }

    #[test]
    fn test_cce_available_versions() {
        let all = strings(&["v1.32", "v1.31", "v1.30", "v1.29"]);
        assert_eq!(
            cce_available_versions("v1.30.14-r0", &all).unwrap(),
            strings(&["v1.31"])
        );
        assert_eq!(
            cce_available_versions("v1.29.0", &all).unwrap(),
            strings(&["v1.30"])
        );
        assert!(cce_available_versions("v1.32.5", &all).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_list_all_versions_filters_catalog() {
        let fake = FakeManagement::new()
            .with_server_version("v2.10.3")
            .with_setting(UI_K8S_RANGE_SETTING, ">=1.29.x <=1.33.x");

        let versions = list_all_versions::<Tke>(&fake).await.unwrap();
        assert_eq!(versions, strings(&["1.30.0"]));
    }

    #[tokio::test]
    async fn test_k8s_version_pinned_wins() {
        let fake = FakeManagement::new();
        let settings =
            Settings::new(RancherConfig::new("h", "t")).downstream_k8s_version("1.31.9-aliyun.1");

        let version = k8s_version::<Ack>(&fake, &settings, false).await.unwrap();
        assert_eq!(version, "1.31.9-aliyun.1");
    }

    #[tokio::test]
    async fn test_k8s_version_from_catalog() {
        let fake = FakeManagement::new().with_server_version("v2.12.1");
        let settings = Settings::new(RancherConfig::new("h", "t"));

        assert_eq!(
            k8s_version::<Ack>(&fake, &settings, false).await.unwrap(),
            "1.33.3-aliyun.1"
        );
        assert_eq!(
            k8s_version::<Ack>(&fake, &settings, true).await.unwrap(),
            "1.32.7-aliyun.1"
        );
    }

    #[tokio::test]
    async fn test_list_cce_available_versions() {
        let fake = FakeManagement::new().with_server_version("v2.11.0");
        let cluster = Cluster {
            version: Some(VersionInfo {
                git_version: "v1.31.2-r0".to_string(),
                ..Default::default()
            }),
            ..Default::default()
        };

        let versions = list_cce_available_versions(&fake, &cluster).await.unwrap();
        assert_eq!(versions, strings(&["v1.32"]));
    }
}
