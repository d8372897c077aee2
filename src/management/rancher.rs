//! Rancher v3 REST client

use async_trait::async_trait;
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{ManagementClient, ManagementError};
use crate::config::RancherConfig;
use crate::model::{CloudCredential, Cluster};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Management client talking to a Rancher server
pub struct RancherClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Deserialize)]
struct SettingValue {
    #[serde(default)]
    value: String,
}

#[derive(Deserialize)]
struct CreatedResource {
    id: String,
}

impl RancherClient {
    /// Build a client for the configured host
    pub fn new(config: &RancherConfig) -> Result<Self, ManagementError> {
        if config.host.is_empty() {
            return Err(ManagementError::InvalidConfig(
                "rancher host is empty".to_string(),
            ));
        }
        if config.admin_token.is_empty() {
            return Err(ManagementError::InvalidConfig(
                "rancher admin token is empty".to_string(),
            ));
        }

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| {
                ManagementError::InvalidConfig(format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self {
            http,
            base_url: api_base_url(&config.host),
            token: config.admin_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    async fn execute(
        &self,
        method: &'static str,
        url: &str,
        request: RequestBuilder,
    ) -> Result<Response, ManagementError> {
        debug!("{} {}", method, url);

        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| ManagementError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(ManagementError::NotFound(url.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ManagementError::Status {
                method,
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(url: &str, response: Response) -> Result<T, ManagementError> {
        response
            .json::<T>()
            .await
            .map_err(|e| ManagementError::Decode {
                url: url.to_string(),
                message: e.to_string(),
            })
    }
}

/// `https://<host>/v3` unless the host already carries a scheme
fn api_base_url(host: &str) -> String {
    let host = host.trim_end_matches('/');
    let base = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{}", host)
    };
    if base.ends_with("/v3") {
        base
    } else {
        format!("{}/v3", base)
    }
}

#[async_trait]
impl ManagementClient for RancherClient {
    #[instrument(skip(self, cluster), fields(cluster_name = %cluster.name))]
    async fn create_cluster(&self, cluster: &Cluster) -> Result<Cluster, ManagementError> {
        let url = self.url("clusters");
        let response = self
            .execute("POST", &url, self.http.post(&url).json(cluster))
            .await?;
        Self::decode(&url, response).await
    }

    async fn cluster_by_id(&self, id: &str) -> Result<Cluster, ManagementError> {
        let url = self.url(&format!("clusters/{}", id));
        let response = self.execute("GET", &url, self.http.get(&url)).await?;
        Self::decode(&url, response).await
    }

    #[instrument(skip(self, existing, updated), fields(cluster_id = %existing.id))]
    async fn update_cluster(
        &self,
        existing: &Cluster,
        updated: &Cluster,
    ) -> Result<Cluster, ManagementError> {
        let url = self.url(&format!("clusters/{}", existing.id));
        let response = self
            .execute("PUT", &url, self.http.put(&url).json(updated))
            .await?;
        Self::decode(&url, response).await
    }

    #[instrument(skip(self, cluster), fields(cluster_id = %cluster.id))]
    async fn delete_cluster(&self, cluster: &Cluster) -> Result<(), ManagementError> {
        let url = self.url(&format!("clusters/{}", cluster.id));
        self.execute("DELETE", &url, self.http.delete(&url)).await?;
        Ok(())
    }

    async fn setting(&self, name: &str) -> Result<String, ManagementError> {
        let url = self.url(&format!("settings/{}", name));
        let response = self.execute("GET", &url, self.http.get(&url)).await?;
        let setting: SettingValue = Self::decode(&url, response).await?;
        Ok(setting.value)
    }

    async fn create_cloud_credential(
        &self,
        credential: &CloudCredential,
    ) -> Result<String, ManagementError> {
        let url = self.url("cloudcredentials");
        let response = self
            .execute("POST", &url, self.http.post(&url).json(credential))
            .await?;
        let created: CreatedResource = Self::decode(&url, response).await?;
        Ok(created.id)
    }
}
