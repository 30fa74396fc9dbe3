use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::config::loader::deserialize_non_empty_string;
use crate::error::{FabricError, FabricResult};

const DEFAULT_CONFIG: &str = include_str!("default.toml");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FabricConfig {
    pub storage: StorageConfig,
    pub auth: AuthConfig,
}

impl FabricConfig {
    /// Loads the built-in defaults overridden by `FABRIC__` environment variables.
    ///
    /// Nested keys are separated by `__`, e.g. `FABRIC__STORAGE__AUDIENCE`.
    pub fn load() -> FabricResult<Self> {
        Figment::from(Toml::string(DEFAULT_CONFIG))
            .admerge(Env::prefixed("FABRIC__").map(|p| p.as_str().replace("__", ".").into()))
            .extract()
            .map_err(|e| FabricError::Configuration(e.to_string()))
    }

    /// Loads the built-in defaults overridden by the given TOML document.
    /// The environment is not consulted.
    pub fn from_toml(overrides: &str) -> FabricResult<Self> {
        Figment::from(Toml::string(DEFAULT_CONFIG))
            .admerge(Toml::string(overrides))
            .extract()
            .map_err(|e| FabricError::Configuration(e.to_string()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub audience: String,
    pub token_env: String,
    pub use_fabric_endpoint: bool,
    pub allow_unsafe_rename: bool,
    pub allow_invalid_certificates: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub authority_host: String,
    #[serde(default, deserialize_with = "deserialize_non_empty_string")]
    pub msi_endpoint: Option<String>,
    pub use_managed_identity: bool,
    pub use_azure_cli: bool,
}
