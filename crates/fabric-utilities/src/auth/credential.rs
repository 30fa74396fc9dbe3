// https://github.com/delta-io/delta-rs/blob/5575ad16bf641420404611d65f4ad7626e9acb16/LICENSE.txt
//
// Copyright (2020) QP Hou and a number of other contributors.
// Portions Copyright (2025) LakeSail, Inc.
// Modified in 2025 by LakeSail, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// [CREDIT]: https://github.com/delta-io/delta-rs/blob/d7dea29162451fd00b9579e3d7fb546d95fb5e4a/crates/catalog-unity/src/credential.rs

use std::time::Duration;

use fabric_common::error::{FabricError, FabricResult};
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Client, Method, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::auth::token::AccessToken;

// https://learn.microsoft.com/en-us/entra/identity-platform/v2-oauth2-client-creds-grant-flow

const CONTENT_TYPE_JSON: &str = "application/json";
const MSI_SECRET_ENV_KEY: &str = "IDENTITY_HEADER";
const MSI_API_VERSION: &str = "2019-08-01";
const IMDS_ENDPOINT: &str = "http://169.254.169.254/metadata/identity/oauth2/token";
/// Outside Azure the instance metadata address does not answer, so requests
/// to it must give up quickly to let the next credential run.
const IMDS_TIMEOUT: Duration = Duration::from_secs(2);

/// Known Azure authority hosts
pub mod authority_hosts {
    /// Public Cloud Azure Authority Host
    pub const AZURE_PUBLIC_CLOUD: &str = "https://login.microsoftonline.com";
}

/// A source of Azure access tokens.
#[async_trait::async_trait]
pub trait TokenCredential: std::fmt::Debug + Send + Sync + 'static {
    /// A short name identifying the credential in log and error messages.
    fn name(&self) -> &'static str;

    /// Requests a token for the given audience, e.g. `https://storage.azure.com`.
    async fn fetch_token(&self, client: &Client, audience: &str) -> FabricResult<AccessToken>;
}

/// The AAD v2 scope for an audience.
pub(crate) fn scope_for(audience: &str) -> String {
    format!("{}/.default", audience.trim_end_matches('/'))
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

async fn non200_or_json<T: DeserializeOwned>(response: Response) -> FabricResult<T> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(FabricError::authentication(format!(
            "identity endpoint returned HTTP {status}: {body}"
        )));
    }
    response
        .json()
        .await
        .map_err(|e| FabricError::authentication(format!("failed to parse token response: {e}")))
}

/// Service principal authentication with a client secret.
#[derive(Debug)]
pub struct ClientSecretCredential {
    token_url: String,
    client_id: String,
    client_secret: SecretString,
}

impl ClientSecretCredential {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: SecretString,
        tenant_id: impl AsRef<str>,
        authority_host: Option<impl Into<String>>,
    ) -> Self {
        let authority_host = authority_host
            .map(|h| h.into())
            .unwrap_or_else(|| authority_hosts::AZURE_PUBLIC_CLOUD.to_owned());

        Self {
            token_url: format!(
                "{}/{}/oauth2/v2.0/token",
                authority_host.trim_end_matches('/'),
                tenant_id.as_ref()
            ),
            client_id: client_id.into(),
            client_secret,
        }
    }
}

#[async_trait::async_trait]
impl TokenCredential for ClientSecretCredential {
    fn name(&self) -> &'static str {
        "ClientSecretCredential"
    }

    async fn fetch_token(&self, client: &Client, audience: &str) -> FabricResult<AccessToken> {
        let response = client
            .request(Method::POST, &self.token_url)
            .header(ACCEPT, HeaderValue::from_static(CONTENT_TYPE_JSON))
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
                ("scope", &scope_for(audience)),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| FabricError::authentication(format!("failed to fetch token: {e}")))?;

        let response: TokenResponse = non200_or_json(response).await?;
        Ok(AccessToken::expiring_in(
            response.access_token,
            response.expires_in,
        ))
    }
}

/// Credential for using workload identity federation
///
/// <https://learn.microsoft.com/en-us/azure/active-directory/develop/workload-identity-federation>
#[derive(Debug)]
pub struct WorkloadIdentityCredential {
    token_url: String,
    client_id: String,
    federated_token_file: String,
}

impl WorkloadIdentityCredential {
    pub fn new(
        client_id: impl Into<String>,
        federated_token_file: impl Into<String>,
        tenant_id: impl AsRef<str>,
        authority_host: Option<String>,
    ) -> Self {
        let authority_host =
            authority_host.unwrap_or_else(|| authority_hosts::AZURE_PUBLIC_CLOUD.to_owned());

        Self {
            token_url: format!(
                "{}/{}/oauth2/v2.0/token",
                authority_host.trim_end_matches('/'),
                tenant_id.as_ref()
            ),
            client_id: client_id.into(),
            federated_token_file: federated_token_file.into(),
        }
    }
}

#[async_trait::async_trait]
impl TokenCredential for WorkloadIdentityCredential {
    fn name(&self) -> &'static str {
        "WorkloadIdentityCredential"
    }

    async fn fetch_token(&self, client: &Client, audience: &str) -> FabricResult<AccessToken> {
        let assertion = tokio::fs::read_to_string(&self.federated_token_file)
            .await
            .map_err(|e| {
                FabricError::authentication(format!(
                    "failed reading federated token file {}: {e}",
                    self.federated_token_file
                ))
            })?;

        // https://learn.microsoft.com/en-us/entra/identity-platform/v2-oauth2-client-creds-grant-flow#third-case-access-token-request-with-a-federated-credential
        let response = client
            .request(Method::POST, &self.token_url)
            .header(ACCEPT, HeaderValue::from_static(CONTENT_TYPE_JSON))
            .form(&[
                ("client_id", self.client_id.as_str()),
                (
                    "client_assertion_type",
                    "urn:ietf:params:oauth:client-assertion-type:jwt-bearer",
                ),
                ("client_assertion", assertion.trim()),
                ("scope", &scope_for(audience)),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await
            .map_err(|e| FabricError::authentication(format!("failed to fetch token: {e}")))?;

        let response: TokenResponse = non200_or_json(response).await?;
        Ok(AccessToken::expiring_in(
            response.access_token,
            response.expires_in,
        ))
    }
}

fn expires_in_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    let v = String::deserialize(deserializer)?;
    v.parse::<u64>().map_err(serde::de::Error::custom)
}

// NOTE: expires_in is a String version of a number of seconds, not an integer.
// <https://learn.microsoft.com/en-us/entra/identity/managed-identities-azure-resources/how-to-use-vm-token#get-a-token-using-http>
#[derive(Debug, Clone, Deserialize)]
struct MsiTokenResponse {
    pub access_token: String,
    #[serde(deserialize_with = "expires_in_string")]
    pub expires_in: u64,
}

/// Attempts authentication using a managed identity that has been assigned to the deployment environment.
///
/// This authentication type works in Azure VMs, App Service and Azure Functions applications,
/// as well as Fabric notebooks and the Azure Cloud Shell.
/// <https://learn.microsoft.com/en-us/entra/identity/managed-identities-azure-resources/how-to-use-vm-token#get-a-token-using-http>
#[derive(Debug)]
pub struct ManagedIdentityCredential {
    msi_endpoint: String,
    client_id: Option<String>,
    object_id: Option<String>,
    msi_res_id: Option<String>,
    timeout: Option<Duration>,
}

impl ManagedIdentityCredential {
    pub fn new(
        client_id: Option<String>,
        object_id: Option<String>,
        msi_res_id: Option<String>,
        msi_endpoint: Option<String>,
    ) -> Self {
        let (msi_endpoint, timeout) = match msi_endpoint {
            Some(endpoint) => (endpoint, None),
            None => (IMDS_ENDPOINT.to_owned(), Some(IMDS_TIMEOUT)),
        };
        Self {
            msi_endpoint,
            client_id,
            object_id,
            msi_res_id,
            timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait::async_trait]
impl TokenCredential for ManagedIdentityCredential {
    fn name(&self) -> &'static str {
        "ManagedIdentityCredential"
    }

    async fn fetch_token(&self, client: &Client, audience: &str) -> FabricResult<AccessToken> {
        let mut query_items = vec![("api-version", MSI_API_VERSION), ("resource", audience)];

        let mut identity = None;
        if let Some(client_id) = &self.client_id {
            identity = Some(("client_id", client_id.as_str()));
        }
        if let Some(object_id) = &self.object_id {
            identity = Some(("object_id", object_id.as_str()));
        }
        if let Some(msi_res_id) = &self.msi_res_id {
            identity = Some(("msi_res_id", msi_res_id.as_str()));
        }
        if let Some((key, value)) = identity {
            query_items.push((key, value));
        }

        let mut builder = client
            .request(Method::GET, &self.msi_endpoint)
            .header("metadata", "true")
            .query(&query_items);

        if let Ok(val) = std::env::var(MSI_SECRET_ENV_KEY) {
            builder = builder.header("x-identity-header", val);
        };
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| FabricError::authentication(format!("failed to fetch token: {e}")))?;

        let response: MsiTokenResponse = non200_or_json(response).await?;
        Ok(AccessToken::expiring_in(
            response.access_token,
            response.expires_in,
        ))
    }
}

mod az_cli_date_format {
    use chrono::{DateTime, TimeZone};
    use serde::{self, Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<chrono::Local>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let Some(s) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        // expiresOn from azure cli uses the local timezone
        let date = chrono::NaiveDateTime::parse_from_str(&s, "%Y-%m-%d %H:%M:%S.%6f")
            .map_err(serde::de::Error::custom)?;
        chrono::Local
            .from_local_datetime(&date)
            .single()
            .map(Some)
            .ok_or(serde::de::Error::custom(
                "azure cli returned ambiguous expiry date",
            ))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureCliTokenResponse {
    pub access_token: String,
    #[serde(default, with = "az_cli_date_format")]
    pub expires_on: Option<chrono::DateTime<chrono::Local>>,
    /// Unix timestamp reported by newer releases of the Azure CLI.
    #[serde(default, rename = "expires_on")]
    pub expires_on_timestamp: Option<i64>,
    pub token_type: String,
}

impl AzureCliTokenResponse {
    fn into_access_token(self) -> FabricResult<AccessToken> {
        if !self.token_type.eq_ignore_ascii_case("bearer") {
            return Err(FabricError::authentication(format!(
                "got unexpected token type from Azure CLI: {}",
                self.token_type
            )));
        }
        let expiry = match (self.expires_on_timestamp, self.expires_on) {
            (Some(timestamp), _) => chrono::DateTime::from_timestamp(timestamp, 0),
            (None, Some(local)) => Some(local.to_utc()),
            (None, None) => None,
        };
        Ok(AccessToken::new(self.access_token, expiry))
    }
}

/// Credential for acquiring access tokens via the Azure CLI
#[derive(Default, Debug)]
pub struct AzureCliCredential {
    _private: (),
}

impl AzureCliCredential {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl TokenCredential for AzureCliCredential {
    fn name(&self) -> &'static str {
        "AzureCliCredential"
    }

    async fn fetch_token(&self, _client: &Client, audience: &str) -> FabricResult<AccessToken> {
        // On Windows, az is a batch file (.cmd) and must be run through cmd.exe
        // See: https://doc.rust-lang.org/nightly/std/process/struct.Command.html
        let (program, extra_args): (&str, &[&str]) = if cfg!(target_os = "windows") {
            ("cmd", &["/C", "az"])
        } else {
            ("az", &[])
        };

        let output = tokio::process::Command::new(program)
            .args(extra_args)
            .args([
                "account",
                "get-access-token",
                "--output",
                "json",
                "--resource",
                audience,
            ])
            .output()
            .await;

        match output {
            Ok(az_output) if az_output.status.success() => {
                let output = std::str::from_utf8(&az_output.stdout).map_err(|e| {
                    FabricError::authentication(format!(
                        "Azure CLI response is not a valid utf-8 string: {e}"
                    ))
                })?;
                serde_json::from_str::<AzureCliTokenResponse>(output)
                    .map_err(|e| {
                        FabricError::authentication(format!(
                            "Azure CLI returned an invalid token response: {e}"
                        ))
                    })?
                    .into_access_token()
            }
            Ok(az_output) => {
                let message = String::from_utf8_lossy(&az_output.stderr);
                Err(FabricError::authentication(format!(
                    "Azure CLI: {}",
                    message.trim()
                )))
            }
            Err(e) => match e.kind() {
                std::io::ErrorKind::NotFound => Err(FabricError::authentication(format!(
                    "Azure CLI not installed: {e}"
                ))),
                error_kind => Err(FabricError::authentication(format!(
                    "Azure CLI io error: {error_kind}"
                ))),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use reqwest::Client;
    use tempfile::NamedTempFile;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const STORAGE: &str = "https://storage.azure.com";

    #[test]
    fn test_scope_for() {
        assert_eq!(scope_for(STORAGE), "https://storage.azure.com/.default");
        assert_eq!(
            scope_for("https://storage.azure.com/"),
            "https://storage.azure.com/.default"
        );
    }

    #[tokio::test]
    async fn test_managed_identity() {
        let server = MockServer::start().await;
        let client = Client::new();

        Mock::given(method("GET"))
            .and(path("/metadata/identity/oauth2/token"))
            .and(query_param("client_id", "client_id"))
            .and(query_param("resource", STORAGE))
            .and(header("metadata", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "TOKEN",
                "refresh_token": "",
                "expires_in": "3599",
                "expires_on": "1506484173",
                "not_before": "1506480273",
                "resource": STORAGE,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let credential = ManagedIdentityCredential::new(
            Some("client_id".into()),
            None,
            None,
            Some(format!("{}/metadata/identity/oauth2/token", server.uri())),
        );

        let token = credential.fetch_token(&client, STORAGE).await.unwrap();

        assert_eq!(token.secret(), "TOKEN");
        assert!(!token.is_expired());
    }

    #[tokio::test]
    async fn test_managed_identity_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/metadata/identity/oauth2/token"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(5))
                    .set_body_json(serde_json::json!({
                        "access_token": "TOKEN",
                        "expires_in": "3599"
                    })),
            )
            .mount(&server)
            .await;

        let credential = ManagedIdentityCredential::new(
            None,
            None,
            None,
            Some(format!("{}/metadata/identity/oauth2/token", server.uri())),
        )
        .with_timeout(Duration::from_millis(100));

        let error = credential
            .fetch_token(&Client::new(), STORAGE)
            .await
            .unwrap_err();
        assert!(error.is_authentication());
    }

    #[test]
    fn test_managed_identity_defaults_to_imds() {
        let credential = ManagedIdentityCredential::new(None, None, None, None);
        assert_eq!(credential.msi_endpoint, IMDS_ENDPOINT);
        assert_eq!(credential.timeout, Some(IMDS_TIMEOUT));
    }

    #[tokio::test]
    async fn test_client_secret() {
        let server = MockServer::start().await;
        let client = Client::new();

        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .and(body_string_contains("client_secret=client_secret"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "token_type": "Bearer",
                "expires_in": 3599,
                "access_token": "TOKEN"
            })))
            .mount(&server)
            .await;

        let credential = ClientSecretCredential::new(
            "client_id",
            SecretString::from("client_secret"),
            "tenant",
            Some(server.uri()),
        );

        let token = credential.fetch_token(&client, STORAGE).await.unwrap();

        assert_eq!(token.secret(), "TOKEN");
    }

    #[tokio::test]
    async fn test_invalid_response_code() {
        let server = MockServer::start().await;
        let client = Client::new();

        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .respond_with(ResponseTemplate::new(401).set_body_json(serde_json::json!({
                "error": "invalid_client",
                "error_description": "Client authentication failed"
            })))
            .mount(&server)
            .await;

        let credential = ClientSecretCredential::new(
            "client_id",
            SecretString::from("wrong"),
            "tenant",
            Some(server.uri()),
        );

        let error = credential.fetch_token(&client, STORAGE).await.unwrap_err();

        assert!(error.is_authentication());
        assert!(error.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_workload_identity() {
        let server = MockServer::start().await;
        let token_file = NamedTempFile::new().unwrap();
        let tenant = "tenant";
        std::fs::write(token_file.path(), "federated-token").unwrap();

        let client = Client::new();

        Mock::given(method("POST"))
            .and(path(format!("/{tenant}/oauth2/v2.0/token")))
            .and(body_string_contains("federated-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": "TOKEN",
                "refresh_token": "",
                "expires_in": 3599,
                "expires_on": "1506484173",
                "not_before": "1506480273",
                "resource": STORAGE,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let credential = WorkloadIdentityCredential::new(
            "client_id",
            token_file.path().to_str().unwrap(),
            tenant,
            Some(server.uri()),
        );

        let token = credential.fetch_token(&client, STORAGE).await.unwrap();

        assert_eq!(token.secret(), "TOKEN");
    }

    #[tokio::test]
    async fn test_workload_identity_missing_file() {
        let credential = WorkloadIdentityCredential::new(
            "client_id",
            "/nonexistent/federated-token",
            "tenant",
            None,
        );

        let error = credential
            .fetch_token(&Client::new(), STORAGE)
            .await
            .unwrap_err();

        assert!(error.is_authentication());
    }

    #[test]
    fn test_azure_cli_token_response() {
        let legacy: AzureCliTokenResponse = serde_json::from_str(
            r#"{
                "accessToken": "TOKEN",
                "expiresOn": "2030-01-01 12:00:00.000000",
                "tokenType": "Bearer"
            }"#,
        )
        .unwrap();
        let token = legacy.into_access_token().unwrap();
        assert_eq!(token.secret(), "TOKEN");
        assert!(token.expiry().is_some());

        let current: AzureCliTokenResponse = serde_json::from_str(
            r#"{
                "accessToken": "TOKEN",
                "expiresOn": "2030-01-01 12:00:00.000000",
                "expires_on": 1893499200,
                "tokenType": "Bearer"
            }"#,
        )
        .unwrap();
        let token = current.into_access_token().unwrap();
        assert_eq!(token.expiry().map(|e| e.timestamp()), Some(1893499200));

        let unexpected: AzureCliTokenResponse = serde_json::from_str(
            r#"{"accessToken": "TOKEN", "tokenType": "pop"}"#,
        )
        .unwrap();
        assert!(unexpected.into_access_token().is_err());
    }
}
