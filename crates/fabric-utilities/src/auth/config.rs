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

// [CREDIT]: https://github.com/delta-io/delta-rs/blob/16621c499106dbaac11560441e0c59ed9346b4b9/crates/catalog-unity/src/lib.rs

use std::collections::HashMap;
use std::str::FromStr;

use fabric_common::config::{str_is_truthy, AuthConfig};
use fabric_common::error::{FabricError, FabricResult};
use secrecy::{ExposeSecret, SecretString};

use crate::auth::credential::{
    AzureCliCredential, ClientSecretCredential, ManagedIdentityCredential, TokenCredential,
    WorkloadIdentityCredential,
};

pub enum CredentialConfigKey {
    /// Service principal client id for authorizing requests
    ///
    /// Supported keys:
    /// - `azure_client_id`
    /// - `client_id`
    ClientId,

    /// Service principal client secret for authorizing requests
    ///
    /// Supported keys:
    /// - `azure_client_secret`
    /// - `client_secret`
    ClientSecret,

    /// Tenant id used in oauth flows
    ///
    /// Supported keys:
    /// - `azure_tenant_id`
    /// - `tenant_id`
    /// - `authority_id`
    TenantId,

    /// Authority host used in oauth flows
    ///
    /// Supported keys:
    /// - `azure_authority_host`
    /// - `authority_host`
    AuthorityHost,

    /// File containing token for Azure AD workload identity federation
    ///
    /// Supported keys:
    /// - `azure_federated_token_file`
    /// - `federated_token_file`
    FederatedTokenFile,

    /// Endpoint to request a managed identity token
    ///
    /// Supported keys:
    /// - `identity_endpoint`
    /// - `msi_endpoint`
    /// - `azure_msi_endpoint`
    MsiEndpoint,

    /// Msi resource id for use with managed identity authentication
    ///
    /// Supported keys:
    /// - `azure_msi_resource_id`
    /// - `msi_resource_id`
    MsiResourceId,

    /// Object id for use with managed identity authentication
    ///
    /// Supported keys:
    /// - `azure_object_id`
    /// - `object_id`
    ObjectId,

    /// Try the instance metadata endpoint when no managed identity endpoint
    /// is configured
    ///
    /// Supported keys:
    /// - `azure_use_managed_identity`
    /// - `use_managed_identity`
    UseManagedIdentity,

    /// Use azure cli for acquiring access token
    ///
    /// Supported keys:
    /// - `azure_use_azure_cli`
    /// - `use_azure_cli`
    UseAzureCli,
}

impl FromStr for CredentialConfigKey {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "azure_client_id" | "client_id" => Ok(CredentialConfigKey::ClientId),
            "azure_client_secret" | "client_secret" => Ok(CredentialConfigKey::ClientSecret),
            "azure_tenant_id" | "tenant_id" | "authority_id" => Ok(CredentialConfigKey::TenantId),
            "azure_authority_host" | "authority_host" => Ok(CredentialConfigKey::AuthorityHost),
            "azure_federated_token_file" | "federated_token_file" => {
                Ok(CredentialConfigKey::FederatedTokenFile)
            }
            "identity_endpoint" | "msi_endpoint" | "azure_msi_endpoint" => {
                Ok(CredentialConfigKey::MsiEndpoint)
            }
            "azure_msi_resource_id" | "msi_resource_id" => Ok(CredentialConfigKey::MsiResourceId),
            "azure_object_id" | "object_id" => Ok(CredentialConfigKey::ObjectId),
            "azure_use_managed_identity" | "use_managed_identity" => {
                Ok(CredentialConfigKey::UseManagedIdentity)
            }
            "azure_use_azure_cli" | "use_azure_cli" => Ok(CredentialConfigKey::UseAzureCli),
            _ => Err(FabricError::invalid(format!(
                "unknown credential config key: {s}"
            ))),
        }
    }
}

/// The ambient credential settings, gathered from configuration, explicit
/// options, and the standard Azure environment variables.
#[derive(Debug)]
pub struct CredentialConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<SecretString>,
    pub tenant_id: Option<String>,
    pub authority_host: Option<String>,
    pub federated_token_file: Option<String>,
    pub msi_endpoint: Option<String>,
    pub msi_resource_id: Option<String>,
    pub object_id: Option<String>,
    pub use_managed_identity: bool,
    pub use_azure_cli: bool,
}

impl CredentialConfig {
    /// Creates a configuration from the application settings only.
    pub fn new(auth: &AuthConfig) -> Self {
        Self {
            client_id: None,
            client_secret: None,
            tenant_id: None,
            authority_host: Some(auth.authority_host.clone()),
            federated_token_file: None,
            msi_endpoint: auth.msi_endpoint.clone(),
            msi_resource_id: None,
            object_id: None,
            use_managed_identity: auth.use_managed_identity,
            use_azure_cli: auth.use_azure_cli,
        }
    }

    /// Creates a configuration from the application settings and the environment.
    pub fn from_env(auth: &AuthConfig) -> FabricResult<Self> {
        let mut config = Self::new(auth);
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> FabricResult<()> {
        for (os_key, os_value) in std::env::vars_os() {
            if let (Some(key), Some(value)) = (os_key.to_str(), os_value.to_str()) {
                let key = key.trim().to_ascii_uppercase();
                if key.starts_with("AZURE_") || key == "IDENTITY_ENDPOINT" || key == "MSI_ENDPOINT"
                {
                    if let Ok(config_key) = CredentialConfigKey::from_str(&key.to_ascii_lowercase())
                    {
                        self.set_option(config_key, value.to_string())?;
                    }
                }
            }
        }
        Ok(())
    }

    pub fn apply_options(&mut self, options: HashMap<String, String>) -> FabricResult<()> {
        for (key, value) in options {
            let config_key = CredentialConfigKey::from_str(&key)?;
            self.set_option(config_key, value)?;
        }
        Ok(())
    }

    pub fn set_option(&mut self, key: CredentialConfigKey, value: String) -> FabricResult<()> {
        let value = value.trim().to_string();
        if value.is_empty() {
            return Ok(());
        }
        match key {
            CredentialConfigKey::ClientId => {
                self.client_id = Some(value);
            }
            CredentialConfigKey::ClientSecret => {
                self.client_secret = Some(SecretString::from(value));
            }
            CredentialConfigKey::TenantId => {
                self.tenant_id = Some(value);
            }
            CredentialConfigKey::AuthorityHost => {
                self.authority_host = Some(value);
            }
            CredentialConfigKey::FederatedTokenFile => {
                self.federated_token_file = Some(value);
            }
            CredentialConfigKey::MsiEndpoint => {
                self.msi_endpoint = Some(value);
            }
            CredentialConfigKey::MsiResourceId => {
                self.msi_resource_id = Some(value);
            }
            CredentialConfigKey::ObjectId => {
                self.object_id = Some(value);
            }
            CredentialConfigKey::UseManagedIdentity => {
                self.use_managed_identity = str_is_truthy(&value);
            }
            CredentialConfigKey::UseAzureCli => {
                self.use_azure_cli = str_is_truthy(&value);
            }
        }
        Ok(())
    }

    /// Returns every configured credential source in the order they are tried.
    pub fn credential_sources(&self) -> Vec<Box<dyn TokenCredential>> {
        let mut sources: Vec<Box<dyn TokenCredential>> = vec![];

        if let (Some(client_id), Some(client_secret), Some(tenant_id)) =
            (&self.client_id, &self.client_secret, &self.tenant_id)
        {
            sources.push(Box::new(ClientSecretCredential::new(
                client_id,
                SecretString::from(client_secret.expose_secret().to_string()),
                tenant_id,
                self.authority_host.as_ref(),
            )));
        }

        if let (Some(client_id), Some(federated_token_file), Some(tenant_id)) =
            (&self.client_id, &self.federated_token_file, &self.tenant_id)
        {
            sources.push(Box::new(WorkloadIdentityCredential::new(
                client_id,
                federated_token_file,
                tenant_id,
                self.authority_host.clone(),
            )));
        }

        if self.use_managed_identity
            || self.msi_endpoint.is_some()
            || self.msi_resource_id.is_some()
        {
            sources.push(Box::new(ManagedIdentityCredential::new(
                self.client_id.clone(),
                self.object_id.clone(),
                self.msi_resource_id.clone(),
                self.msi_endpoint.clone(),
            )));
        }

        if self.use_azure_cli {
            sources.push(Box::new(AzureCliCredential::new()));
        }

        sources
    }
}
