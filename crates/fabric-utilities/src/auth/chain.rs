use fabric_common::error::{FabricError, FabricResult};
use log::{debug, warn};
use reqwest::Client;

use crate::auth::config::CredentialConfig;
use crate::auth::credential::TokenCredential;
use crate::auth::token::AccessToken;

/// Tries each configured credential source in turn and returns the first token obtained.
#[derive(Debug)]
pub struct DefaultCredential {
    sources: Vec<Box<dyn TokenCredential>>,
}

impl DefaultCredential {
    pub fn new(sources: Vec<Box<dyn TokenCredential>>) -> Self {
        Self { sources }
    }

    pub fn from_config(config: &CredentialConfig) -> Self {
        Self::new(config.credential_sources())
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait::async_trait]
impl TokenCredential for DefaultCredential {
    fn name(&self) -> &'static str {
        "DefaultCredential"
    }

    async fn fetch_token(&self, client: &Client, audience: &str) -> FabricResult<AccessToken> {
        if self.sources.is_empty() {
            return Err(FabricError::authentication(
                "no credential source is configured: provide service principal or workload \
                 identity environment variables, a managed identity endpoint, or enable the Azure CLI",
            ));
        }
        let mut failures = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            debug!("requesting a token for {audience} from {}", source.name());
            match source.fetch_token(client, audience).await {
                Ok(token) => {
                    debug!("acquired a token from {}", source.name());
                    return Ok(token);
                }
                Err(e) => {
                    warn!("{} failed to acquire a token: {e}", source.name());
                    failures.push(format!("- {}: {e}", source.name()));
                }
            }
        }
        Err(FabricError::authentication(format!(
            "no credential source could provide a token for {audience}:\n{}",
            failures.join("\n")
        )))
    }
}
