//! Azure access tokens for Fabric and OneLake.
//!
//! Tokens are requested from the first working credential source: a
//! service principal, workload identity federation, managed identity, or the
//! Azure CLI. Nothing is cached; every call goes to the identity provider.

mod chain;
mod config;
mod credential;
mod token;

use fabric_common::config::{FabricConfig, StorageConfig};
use fabric_common::error::{FabricError, FabricResult};
use log::debug;
use reqwest::Client;

pub use chain::DefaultCredential;
pub use config::{CredentialConfig, CredentialConfigKey};
pub use credential::{
    authority_hosts, AzureCliCredential, ClientSecretCredential, ManagedIdentityCredential,
    TokenCredential, WorkloadIdentityCredential,
};
pub use token::AccessToken;

/// Gets an access token for the given audience (e.g. `https://storage.azure.com`)
/// using the ambient credentials.
pub async fn get_access_token(audience: &str) -> FabricResult<AccessToken> {
    let config = FabricConfig::load()?;
    let credential = DefaultCredential::from_config(&CredentialConfig::from_env(&config.auth)?);
    get_access_token_with(&credential, audience).await
}

/// Gets an access token for the given audience from a specific credential.
pub async fn get_access_token_with(
    credential: &dyn TokenCredential,
    audience: &str,
) -> FabricResult<AccessToken> {
    let audience = audience.trim();
    if audience.is_empty() {
        return Err(FabricError::invalid("token audience must not be empty"));
    }
    let client = Client::new();
    credential.fetch_token(&client, audience).await
}

/// Gets an access token for Azure Storage operations.
///
/// A token set in the `AZURE_STORAGE_TOKEN` environment variable is returned
/// as is. Otherwise a token for `https://storage.azure.com` is requested.
pub async fn get_azure_storage_access_token() -> FabricResult<AccessToken> {
    let config = FabricConfig::load()?;
    let credential = DefaultCredential::from_config(&CredentialConfig::from_env(&config.auth)?);
    storage_access_token(&config.storage, &credential).await
}

pub(crate) async fn storage_access_token(
    storage: &StorageConfig,
    credential: &dyn TokenCredential,
) -> FabricResult<AccessToken> {
    if let Ok(token) = std::env::var(&storage.token_env) {
        let token = token.trim();
        if !token.is_empty() {
            debug!("using the storage token from {}", storage.token_env);
            return Ok(AccessToken::new(token, None));
        }
    }

    get_access_token_with(credential, &storage.audience)
        .await
        .map_err(|e| match e {
            FabricError::Authentication(message) => FabricError::Authentication(format!(
                "{message}\n\n\
                 Additional troubleshooting steps:\n\
                 1. Ensure you can use any of the credentials methods to get an access token\n\
                 2. Set the `{}` environment variable with a valid access token",
                storage.token_env
            )),
            other => other,
        })
}
