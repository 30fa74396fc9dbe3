//! Storage options and object stores for table locations.

mod location;

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Once};

use fabric_common::config::{FabricConfig, StorageConfig};
use fabric_common::error::{FabricError, FabricResult};
use futures::TryStreamExt;
use log::debug;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectMeta, ObjectStore};

pub use location::TableLocation;

use crate::auth::{storage_access_token, CredentialConfig, DefaultCredential};
use crate::error::ResultExt;

/// Key-value options handed to the Delta and object store libraries.
pub type StorageOptions = HashMap<String, String>;

pub const BEARER_TOKEN: &str = "bearer_token";
pub const USE_FABRIC_ENDPOINT: &str = "use_fabric_endpoint";
pub const ALLOW_UNSAFE_RENAME: &str = "allow_unsafe_rename";
pub const ALLOW_INVALID_CERTIFICATES: &str = "allow_invalid_certificates";

static REGISTER_HANDLERS: Once = Once::new();

/// Registers the Azure storage handlers with delta-rs.
pub(crate) fn register_handlers() {
    REGISTER_HANDLERS.call_once(|| {
        deltalake::azure::register_handlers(None);
    });
}

/// Per-call storage settings that take precedence over the ambient ones.
#[derive(Debug, Clone, Default)]
pub struct StorageOverrides {
    /// Used as the storage token instead of acquiring one.
    pub bearer_token: Option<String>,
    /// Merged over the generated options.
    pub storage_options: StorageOptions,
}

/// Returns the Fabric storage options for a location.
///
/// Azure locations (`abfss://`) get a storage access token along with the
/// OneLake endpoint settings. Any other location needs no options.
pub async fn get_storage_options(location: &str) -> FabricResult<Option<StorageOptions>> {
    let location = TableLocation::parse(location)?;
    resolve_storage_options(&location, &StorageOverrides::default()).await
}

pub(crate) async fn resolve_storage_options(
    location: &TableLocation,
    overrides: &StorageOverrides,
) -> FabricResult<Option<StorageOptions>> {
    let config = FabricConfig::load()?;
    if location.is_fabric() && overrides.bearer_token.is_none() {
        let credential = DefaultCredential::from_config(&CredentialConfig::from_env(&config.auth)?);
        let token = storage_access_token(&config.storage, &credential).await?;
        Ok(build_storage_options(
            location,
            &config.storage,
            Some(token.secret()),
            &overrides.storage_options,
        ))
    } else {
        Ok(build_storage_options(
            location,
            &config.storage,
            overrides.bearer_token.as_deref(),
            &overrides.storage_options,
        ))
    }
}

fn build_storage_options(
    location: &TableLocation,
    storage: &StorageConfig,
    bearer_token: Option<&str>,
    extra: &StorageOptions,
) -> Option<StorageOptions> {
    if !location.is_fabric() {
        if extra.is_empty() {
            debug!("no storage options needed for {location}");
            return None;
        }
        return Some(extra.clone());
    }
    let mut options = StorageOptions::from([
        (
            ALLOW_UNSAFE_RENAME.to_string(),
            storage.allow_unsafe_rename.to_string(),
        ),
        (
            USE_FABRIC_ENDPOINT.to_string(),
            storage.use_fabric_endpoint.to_string(),
        ),
        (
            ALLOW_INVALID_CERTIFICATES.to_string(),
            storage.allow_invalid_certificates.to_string(),
        ),
    ]);
    if let Some(token) = bearer_token {
        options.insert(BEARER_TOKEN.to_string(), token.to_string());
    }
    options.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
    debug!("using Fabric storage options for {location}");
    Some(options)
}

/// Builds an object store for the location along with the path of the
/// location within the store.
pub fn object_store_for(
    location: &TableLocation,
    options: Option<&StorageOptions>,
) -> FabricResult<(Arc<dyn ObjectStore>, ObjectPath)> {
    let options = options.cloned().unwrap_or_default();
    let (store, path) = object_store::parse_url_opts(location.url(), options).map_read_err()?;
    Ok((Arc::from(store), path))
}

/// Lists the Parquet files directly under a directory.
///
/// Only objects whose names end in `.parquet` are returned, sorted by location.
/// Subdirectories are not descended into.
pub async fn list_parquet_files(
    location: &TableLocation,
    options: Option<&StorageOptions>,
) -> FabricResult<Vec<TableLocation>> {
    if let Some(path) = location.to_file_path() {
        if !path.is_dir() {
            return Err(FabricError::not_found(format!(
                "directory does not exist: {location}"
            )));
        }
    }
    let (store, prefix) = object_store_for(location, options)?;
    let listing = store.list_with_delimiter(Some(&prefix)).await.map_read_err()?;
    let mut files = listing
        .objects
        .into_iter()
        .filter(|meta| meta.location.as_ref().ends_with(".parquet"))
        .map(|meta| location.with_object_path(&meta.location))
        .collect::<Vec<_>>();
    files.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    debug!("found {} parquet files in {location}", files.len());
    Ok(files)
}

/// A Hive partition column of a dataset, with the distinct values found in
/// its `key=value` directory names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PartitionColumn {
    pub name: String,
    pub values: Vec<String>,
}

/// Lists the Hive partition columns of a dataset, e.g. `year` and `month`
/// for `year=2024/month=01/part-0.parquet`.
///
/// Only directories that hold Parquet files are considered, so empty
/// directories left behind by earlier writes do not add columns.
pub(crate) async fn list_partition_columns(
    location: &TableLocation,
    options: Option<&StorageOptions>,
) -> FabricResult<Vec<PartitionColumn>> {
    if location.is_parquet_file() {
        return Ok(vec![]);
    }
    let (store, prefix) = object_store_for(location, options)?;
    let objects = store
        .list(Some(&prefix))
        .try_collect::<Vec<ObjectMeta>>()
        .await
        .map_read_err()?;
    let mut columns: Vec<PartitionColumn> = vec![];
    for meta in objects
        .iter()
        .filter(|meta| meta.location.as_ref().ends_with(".parquet"))
    {
        let Some(parts) = meta.location.prefix_match(&prefix) else {
            continue;
        };
        let parts = parts.collect::<Vec<_>>();
        let Some((_, directories)) = parts.split_last() else {
            continue;
        };
        for part in directories {
            let Some((key, value)) = part.as_ref().split_once('=') else {
                continue;
            };
            if key.is_empty() {
                continue;
            }
            match columns.iter_mut().find(|c| c.name == key) {
                Some(column) => {
                    if !column.values.iter().any(|v| v == value) {
                        column.values.push(value.to_string());
                    }
                }
                None => columns.push(PartitionColumn {
                    name: key.to_string(),
                    values: vec![value.to_string()],
                }),
            }
        }
    }
    Ok(columns)
}

/// Removes the empty directories below a local directory, keeping the
/// directory itself.
pub(crate) fn remove_empty_directories(root: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(root)? {
        let path = entry?.path();
        if path.is_dir() {
            remove_empty_directories(&path)?;
            if std::fs::read_dir(&path)?.next().is_none() {
                std::fs::remove_dir(&path)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn storage_config() -> StorageConfig {
        FabricConfig::from_toml("").unwrap().storage
    }

    #[test]
    fn test_fabric_storage_options() {
        let location = TableLocation::parse(
            "abfss://workspace@onelake.dfs.fabric.microsoft.com/lake.Lakehouse/Tables/sales",
        )
        .unwrap();
        let options =
            build_storage_options(&location, &storage_config(), Some("t0k"), &HashMap::new())
                .unwrap();
        assert_eq!(options.len(), 4);
        assert_eq!(options[BEARER_TOKEN], "t0k");
        assert_eq!(options[USE_FABRIC_ENDPOINT], "true");
        assert_eq!(options[ALLOW_UNSAFE_RENAME], "true");
        assert_eq!(options[ALLOW_INVALID_CERTIFICATES], "true");
    }

    #[test]
    fn test_extra_options_take_precedence() {
        let location =
            TableLocation::parse("abfss://container@account.dfs.core.windows.net/table").unwrap();
        let extra = HashMap::from([(USE_FABRIC_ENDPOINT.to_string(), "false".to_string())]);
        let options =
            build_storage_options(&location, &storage_config(), Some("t0k"), &extra).unwrap();
        assert_eq!(options[USE_FABRIC_ENDPOINT], "false");
    }

    #[test]
    fn test_local_storage_options() {
        let location = TableLocation::parse("/tmp/table").unwrap();
        assert!(
            build_storage_options(&location, &storage_config(), None, &HashMap::new()).is_none()
        );
    }

    #[tokio::test]
    async fn test_get_storage_options_for_local_path() {
        assert!(get_storage_options("/tmp/table").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bearer_token_override() {
        let location =
            TableLocation::parse("abfss://container@account.dfs.core.windows.net/table").unwrap();
        let overrides = StorageOverrides {
            bearer_token: Some("explicit".to_string()),
            storage_options: HashMap::new(),
        };
        let options = resolve_storage_options(&location, &overrides)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(options[BEARER_TOKEN], "explicit");
    }

    #[tokio::test]
    async fn test_list_parquet_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.parquet"), b"x").unwrap();
        std::fs::write(dir.path().join("a.parquet"), b"x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("nested.parquet")).unwrap();
        std::fs::write(dir.path().join("nested.parquet").join("c.parquet"), b"x").unwrap();

        let location = TableLocation::parse(dir.path().to_str().unwrap()).unwrap();
        let files = list_parquet_files(&location, None).await.unwrap();
        let names = files
            .iter()
            .map(|f| f.url().path_segments().unwrap().next_back().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["a.parquet", "b.parquet"]);
    }

    #[tokio::test]
    async fn test_list_parquet_files_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let location =
            TableLocation::parse(dir.path().join("missing").to_str().unwrap()).unwrap();
        let error = list_parquet_files(&location, None).await.unwrap_err();
        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn test_partition_columns() {
        let dir = tempfile::tempdir().unwrap();
        let leaf = dir.path().join("year=2024").join("month=01");
        std::fs::create_dir_all(&leaf).unwrap();
        std::fs::write(leaf.join("part-0.parquet"), b"x").unwrap();

        let other = dir.path().join("year=2025").join("month=02");
        std::fs::create_dir_all(&other).unwrap();
        std::fs::write(other.join("part-0.parquet"), b"x").unwrap();

        let location = TableLocation::parse(dir.path().to_str().unwrap()).unwrap();
        let columns = list_partition_columns(&location, None).await.unwrap();
        let names = columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, vec!["year", "month"]);
        let mut years = columns[0].values.clone();
        years.sort();
        assert_eq!(years, vec!["2024", "2025"]);
    }

    #[tokio::test]
    async fn test_partition_columns_skip_empty_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("name=a")).unwrap();
        std::fs::write(dir.path().join("part-0.parquet"), b"x").unwrap();

        let location = TableLocation::parse(dir.path().to_str().unwrap()).unwrap();
        let columns = list_partition_columns(&location, None).await.unwrap();
        assert!(columns.is_empty());
    }

    #[test]
    fn test_remove_empty_directories() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("a=1").join("b=2")).unwrap();
        std::fs::create_dir_all(dir.path().join("a=2")).unwrap();
        std::fs::write(dir.path().join("a=2").join("part-0.parquet"), b"x").unwrap();

        remove_empty_directories(dir.path()).unwrap();
        assert!(!dir.path().join("a=1").exists());
        assert!(dir.path().join("a=2").join("part-0.parquet").exists());
        assert!(dir.path().exists());
    }
}
