//! Failure diagnostics for test debugging
//!
//! Collects the desired and observed configs of the cluster under test and
//! formats them, with the fields that still differ, when a test fails.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::model::Cluster;
use crate::provider::{Ack, Cce, HostedProvider, Tke};

const LINE_WIDTH: usize = 80;
const HEAVY_LINE: &str = "━";
const LIGHT_LINE: &str = "─";
const MAX_SPEC_LINES: usize = 50;
const MAX_VALUE_LEN: usize = 60;

/// Collected diagnostic information from a failed test
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// Cluster name
    pub cluster_name: String,
    /// Cluster ID, if the cluster was created
    pub cluster_id: Option<String>,
    /// Lifecycle state as reported by the server
    pub state: String,
    /// Desired config field, e.g. "ackConfig"
    pub desired_field: Option<&'static str>,
    /// Desired config as JSON
    pub desired: Option<Value>,
    /// Observed config field, e.g. "ackStatus.upstreamSpec"
    pub observed_field: Option<&'static str>,
    /// Observed config as JSON
    pub observed: Option<Value>,
    /// Why the state could not be refreshed
    pub fetch_error: Option<String>,
}

fn to_json<T: Serialize>(value: Option<&T>) -> Option<Value> {
    value.and_then(|v| serde_json::to_value(v).ok())
}

impl Diagnostics {
    /// Diagnostics for a test that failed before creating a cluster
    pub fn without_cluster(name: &str) -> Self {
        Self {
            cluster_name: name.to_string(),
            state: "not created".to_string(),
            ..Default::default()
        }
    }

    /// Diagnostics from a cluster snapshot
    pub fn from_cluster(cluster: &Cluster) -> Self {
        let mut diag = Self {
            cluster_name: cluster.name.clone(),
            cluster_id: Some(cluster.id.clone()),
            state: cluster.state_description(),
            ..Default::default()
        };

        if !diag.fill_configs::<Ack>(cluster) && !diag.fill_configs::<Cce>(cluster) {
            diag.fill_configs::<Tke>(cluster);
        }

        diag
    }

    /// Take both configs from `P` if the cluster carries its desired config
    fn fill_configs<P: HostedProvider>(&mut self, cluster: &Cluster) -> bool {
        let Some(desired) = P::desired(cluster) else {
            return false;
        };

        self.desired_field = Some(P::CONFIG_FIELD);
        self.desired = to_json(Some(desired));
        self.observed_field = Some(P::UPSTREAM_FIELD);
        self.observed = to_json(P::observed(cluster));
        true
    }

    /// Top-level fields whose desired and observed values differ
    pub fn drift(&self) -> Vec<(String, Option<&Value>, Option<&Value>)> {
        let (Some(Value::Object(desired)), Some(Value::Object(observed))) =
            (&self.desired, &self.observed)
        else {
            return Vec::new();
        };

        let mut keys: Vec<&String> = desired.keys().chain(observed.keys()).collect();
        keys.sort();
        keys.dedup();

        keys.into_iter()
            .filter_map(|key| {
                let d = desired.get(key);
                let o = observed.get(key);
                (d != o).then(|| (key.clone(), d, o))
            })
            .collect()
    }

    fn heavy_line() -> String {
        HEAVY_LINE.repeat(LINE_WIDTH)
    }

    fn section_header(title: &str) -> String {
        let title_with_spaces = format!(" {} ", title);
        let remaining = LINE_WIDTH.saturating_sub(title_with_spaces.chars().count() + 3);
        format!(
            "{}{}{}",
            LIGHT_LINE.repeat(3),
            title_with_spaces,
            LIGHT_LINE.repeat(remaining)
        )
    }

    fn write_spec(f: &mut fmt::Formatter<'_>, spec: &Value) -> fmt::Result {
        let pretty = serde_json::to_string_pretty(spec).map_err(|_| fmt::Error)?;
        let lines: Vec<&str> = pretty.lines().collect();
        for line in lines.iter().take(MAX_SPEC_LINES) {
            writeln!(f, "  {}", line)?;
        }
        if lines.len() > MAX_SPEC_LINES {
            writeln!(f, "  ... ({} more lines)", lines.len() - MAX_SPEC_LINES)?;
        }
        Ok(())
    }
}

fn compact(value: Option<&Value>) -> String {
    let text = match value {
        Some(v) => v.to_string(),
        None => "(missing)".to_string(),
    };
    if text.chars().count() > MAX_VALUE_LEN {
        let truncated: String = text.chars().take(MAX_VALUE_LEN).collect();
        format!("{}...", truncated)
    } else {
        text
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", Self::heavy_line())?;
        writeln!(f, "  HOSTED E2E TEST FAILED")?;
        writeln!(f, "{}", Self::heavy_line())?;
        writeln!(f)?;
        match &self.cluster_id {
            Some(id) => writeln!(f, "  Cluster: {} ({}) (kept for debugging)", self.cluster_name, id)?,
            None => writeln!(f, "  Cluster: {}", self.cluster_name)?,
        }
        writeln!(f, "  State:   {}", self.state)?;
        if let Some(err) = &self.fetch_error {
            writeln!(f, "  (last known state; refresh failed: {})", err)?;
        }

        if let (Some(field), Some(desired)) = (self.desired_field, &self.desired) {
            writeln!(f)?;
            writeln!(f, "{}", Self::section_header(&format!("Desired ({})", field)))?;
            writeln!(f)?;
            Self::write_spec(f, desired)?;
        }

        if let Some(field) = self.observed_field {
            writeln!(f)?;
            writeln!(f, "{}", Self::section_header(&format!("Observed ({})", field)))?;
            writeln!(f)?;
            match &self.observed {
                Some(observed) => Self::write_spec(f, observed)?,
                None => writeln!(f, "  (not reported yet)")?,
            }
        }

        let drift = self.drift();
        if !drift.is_empty() {
            writeln!(f)?;
            writeln!(f, "{}", Self::section_header(&format!("Drift ({})", drift.len())))?;
            writeln!(f)?;
            for (key, desired, observed) in drift {
                writeln!(f, "  • {}", key)?;
                writeln!(f, "      desired:  {}", compact(desired))?;
                writeln!(f, "      observed: {}", compact(observed))?;
            }
        }

        if let Some(id) = &self.cluster_id {
            writeln!(f)?;
            writeln!(f, "{}", Self::section_header("Debug"))?;
            writeln!(f)?;
            writeln!(f, "  GET    /v3/clusters/{}", id)?;
            writeln!(f, "  DELETE /v3/clusters/{}  # cleanup", id)?;
        }

        writeln!(f)?;
        writeln!(f, "{}", Self::heavy_line())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        AckClusterConfigSpec, AckNodePool, CceClusterConfigSpec, TkeClusterConfigSpec,
        UpstreamStatus,
    };

    fn ack_cluster(desired: i64, observed: Option<i64>) -> Cluster {
        let spec = |n: i64| AckClusterConfigSpec {
            kubernetes_version: Some("1.31.9-aliyun.1".to_string()),
            node_pool_list: vec![AckNodePool {
                name: "np".to_string(),
                instances_num: n,
                ..Default::default()
            }],
            ..Default::default()
        };

        Cluster {
            id: "c-00001".to_string(),
            name: "auto-ack-hp-ci-abcde".to_string(),
            state: Some("updating".to_string()),
            ack_config: Some(spec(desired)),
            ack_status: observed.map(|n| UpstreamStatus::new(spec(n))),
            ..Default::default()
        }
    }

    #[test]
    fn test_without_cluster() {
        let output = Diagnostics::without_cluster("auto-hp-ci-xyz").to_string();

        assert!(output.contains("HOSTED E2E TEST FAILED"));
        assert!(output.contains("auto-hp-ci-xyz"));
        assert!(output.contains("not created"));
        assert!(!output.contains("Debug"));
    }

    #[test]
    fn test_from_cluster_sections() {
        let output = Diagnostics::from_cluster(&ack_cluster(4, Some(3))).to_string();

        assert!(output.contains("━━━"));
        assert!(output.contains("Desired (ackConfig)"));
        assert!(output.contains("Observed (ackStatus.upstreamSpec)"));
        assert!(output.contains("state=updating"));
        assert!(output.contains("GET    /v3/clusters/c-00001"));
    }

    #[test]
    fn test_drift_lists_differing_fields() {
        let diag = Diagnostics::from_cluster(&ack_cluster(4, Some(3)));
        let drift = diag.drift();

        assert_eq!(drift.len(), 1);
        assert_eq!(drift[0].0, "nodePoolList");
        assert!(diag.to_string().contains("Drift (1)"));
    }

    #[test]
    fn test_no_drift_when_converged() {
        let diag = Diagnostics::from_cluster(&ack_cluster(3, Some(3)));
        assert!(diag.drift().is_empty());
    }

    #[test]
    fn test_observed_not_reported() {
        let output = Diagnostics::from_cluster(&ack_cluster(3, None)).to_string();
        assert!(output.contains("(not reported yet)"));
    }

    #[test]
    fn test_picks_configured_provider() {
        let cluster = Cluster {
            tke_config: Some(TkeClusterConfigSpec::default()),
            ..Default::default()
        };
        let diag = Diagnostics::from_cluster(&cluster);
        assert_eq!(diag.desired_field, Some("tkeConfig"));
        assert!(diag.observed.is_none());
    }

    #[test]
    fn test_fields_follow_provider_paths() {
        let cluster = Cluster {
            cce_config: Some(CceClusterConfigSpec::default()),
            cce_status: Some(UpstreamStatus::new(CceClusterConfigSpec::default())),
            ..Default::default()
        };
        let diag = Diagnostics::from_cluster(&cluster);

        assert_eq!(diag.desired_field, Some(Cce::CONFIG_FIELD));
        assert_eq!(diag.observed_field, Some(Cce::UPSTREAM_FIELD));
        assert!(diag.observed.is_some());
        assert!(diag.drift().is_empty());
    }
}
