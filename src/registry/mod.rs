// Registry collaborator: "latest version of package P for dist-tag T".

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::errors::DaemonError;

#[async_trait]
pub trait RegistryClient: Send + Sync {
    async fn latest_version(&self, package: &str, tag: &str) -> Result<String, DaemonError>;
}

/// Resolves dist tags against an npm-compatible registry's
/// `/-/package/<name>/dist-tags` endpoint.
pub struct HttpRegistry {
    client: Client,
    registry_url: String,
}

impl HttpRegistry {
    pub fn new(registry_url: &str, timeout: Duration) -> Result<Self, DaemonError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("pud/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DaemonError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            registry_url: registry_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn dist_tags_url(&self, package: &str) -> String {
        // Scoped packages keep the '@' but escape the separator
        format!(
            "{}/-/package/{}/dist-tags",
            self.registry_url,
            package.replace('/', "%2f")
        )
    }
}

#[async_trait]
impl RegistryClient for HttpRegistry {
    async fn latest_version(&self, package: &str, tag: &str) -> Result<String, DaemonError> {
        let lookup_err = |message: String| DaemonError::Lookup {
            package: package.to_string(),
            tag: tag.to_string(),
            message,
        };

        let url = self.dist_tags_url(package);
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| lookup_err(e.to_string()))?;

        let tags: HashMap<String, String> = response
            .json()
            .await
            .map_err(|e| lookup_err(format!("invalid dist-tags response: {}", e)))?;

        tags.get(tag)
            .cloned()
            .ok_or_else(|| lookup_err("no such dist tag".to_string()))
    }
}
