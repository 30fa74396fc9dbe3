use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use fabric_common::error::{FabricError, FabricResult};
use object_store::path::Path as ObjectPath;
use url::Url;

const ONELAKE_HOST: &str = "onelake.dfs.fabric.microsoft.com";

/// Converts a OneLake `https` URL to its `abfss` equivalent.
///
/// `https://onelake.dfs.fabric.microsoft.com/<workspace>/<item>/...` becomes
/// `abfss://<workspace>@onelake.dfs.fabric.microsoft.com/<item>/...`.
fn convert_to_abfss_url(https_url: &str) -> Option<String> {
    let url = https_url.strip_prefix(&format!("https://{ONELAKE_HOST}/"))?;
    let (workspace, rest) = url.split_once('/')?;
    if workspace.is_empty() {
        return None;
    }
    Some(format!("abfss://{workspace}@{ONELAKE_HOST}/{rest}"))
}

/// A validated location of a table or dataset.
///
/// Local paths are made absolute and stored as `file://` URLs so that every
/// location can be handed to the storage libraries in the same form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableLocation {
    url: Url,
}

impl TableLocation {
    pub fn parse(location: &str) -> FabricResult<Self> {
        let location = location.trim();
        if location.is_empty() {
            return Err(FabricError::invalid("table location must not be empty"));
        }
        if let Some(abfss) = convert_to_abfss_url(location) {
            return Self::parse_url(&abfss);
        }
        if location.contains("://") || location.starts_with("file:") {
            Self::parse_url(location)
        } else {
            Self::from_path(location)
        }
    }

    fn parse_url(location: &str) -> FabricResult<Self> {
        let url = Url::parse(location)
            .map_err(|e| FabricError::invalid(format!("invalid table location {location}: {e}")))?;
        if url.cannot_be_a_base() {
            return Err(FabricError::invalid(format!(
                "invalid table location {location}: not a hierarchical URL"
            )));
        }
        if matches!(url.scheme(), "abfs" | "abfss") && url.host_str().is_none_or(str::is_empty) {
            return Err(FabricError::invalid(format!(
                "invalid table location {location}: missing storage account host"
            )));
        }
        Ok(Self { url })
    }

    fn from_path(location: &str) -> FabricResult<Self> {
        let path = std::path::absolute(location)
            .map_err(|e| FabricError::invalid(format!("invalid table location {location}: {e}")))?;
        let url = Url::from_file_path(&path).map_err(|()| {
            FabricError::invalid(format!("invalid table location {}", path.display()))
        })?;
        Ok(Self { url })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    /// Whether the location is on Azure storage and needs Fabric credentials.
    pub fn is_fabric(&self) -> bool {
        matches!(self.url.scheme(), "abfs" | "abfss")
    }

    pub fn is_onelake(&self) -> bool {
        self.is_fabric() && self.url.host_str() == Some(ONELAKE_HOST)
    }

    pub fn is_local(&self) -> bool {
        self.url.scheme() == "file"
    }

    pub fn to_file_path(&self) -> Option<PathBuf> {
        if self.is_local() {
            self.url.to_file_path().ok()
        } else {
            None
        }
    }

    /// Whether the location names a single Parquet file rather than a dataset.
    pub fn is_parquet_file(&self) -> bool {
        self.url.path().ends_with(".parquet")
    }

    /// The location with a trailing slash, which listing-based readers
    /// treat as a directory.
    pub fn as_directory(&self) -> Self {
        let mut url = self.url.clone();
        if !url.path().ends_with('/') {
            url.set_path(&format!("{}/", url.path()));
        }
        Self { url }
    }

    /// The location of a child object, resolved relative to this location as a directory.
    pub fn join(&self, name: &str) -> FabricResult<Self> {
        let url = self
            .as_directory()
            .url
            .join(name)
            .map_err(|e| FabricError::invalid(format!("invalid path {name}: {e}")))?;
        Ok(Self { url })
    }

    /// The location of an object returned by an object store rooted at this location.
    pub(crate) fn with_object_path(&self, path: &ObjectPath) -> Self {
        let mut url = self.url.clone();
        url.set_path(&format!("/{}", path.as_ref()));
        url.set_query(None);
        url.set_fragment(None);
        Self { url }
    }
}

impl fmt::Display for TableLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

impl FromStr for TableLocation {
    type Err = FabricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for TableLocation {
    type Error = FabricError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<String> for TableLocation {
    type Error = FabricError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&String> for TableLocation {
    type Error = FabricError;

    fn try_from(value: &String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&TableLocation> for TableLocation {
    type Error = FabricError;

    fn try_from(value: &TableLocation) -> Result<Self, Self::Error> {
        Ok(value.clone())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_empty_location() {
        assert!(matches!(
            TableLocation::parse(""),
            Err(FabricError::InvalidArgument(_))
        ));
        assert!(matches!(
            TableLocation::parse("   "),
            Err(FabricError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_abfss_location() {
        let location = TableLocation::parse(
            "abfss://workspace@onelake.dfs.fabric.microsoft.com/lake.Lakehouse/Tables/sales",
        )
        .unwrap();
        assert!(location.is_fabric());
        assert!(location.is_onelake());
        assert!(!location.is_local());
        assert_eq!(location.scheme(), "abfss");
    }

    #[test]
    fn test_abfss_without_host() {
        assert!(matches!(
            TableLocation::parse("abfss:///Tables/sales"),
            Err(FabricError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_onelake_https_conversion() {
        let location = TableLocation::parse(
            "https://onelake.dfs.fabric.microsoft.com/workspace/lake.Lakehouse/Tables/sales",
        )
        .unwrap();
        assert_eq!(
            location.as_str(),
            "abfss://workspace@onelake.dfs.fabric.microsoft.com/lake.Lakehouse/Tables/sales"
        );
        assert!(location.is_onelake());
    }

    #[test]
    fn test_local_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("my table");
        let location = TableLocation::parse(path.to_str().unwrap()).unwrap();
        assert!(location.is_local());
        assert!(!location.is_fabric());
        assert_eq!(location.to_file_path().unwrap(), path);

        let relative = TableLocation::parse("data/sales").unwrap();
        assert!(relative.is_local());
        assert!(relative.as_str().ends_with("/data/sales"));
    }

    #[test]
    fn test_directory_and_join() {
        let location = TableLocation::parse("file:///tmp/dataset").unwrap();
        assert!(!location.is_parquet_file());
        assert_eq!(location.as_directory().as_str(), "file:///tmp/dataset/");
        assert_eq!(
            location.join("part-0.parquet").unwrap().as_str(),
            "file:///tmp/dataset/part-0.parquet"
        );
        assert!(location
            .join("part-0.parquet")
            .unwrap()
            .is_parquet_file());
    }

    #[test]
    fn test_with_object_path() {
        let location = TableLocation::parse(
            "abfss://workspace@onelake.dfs.fabric.microsoft.com/lake.Lakehouse/Files/raw",
        )
        .unwrap();
        let child =
            location.with_object_path(&ObjectPath::from("lake.Lakehouse/Files/raw/a.parquet"));
        assert_eq!(
            child.as_str(),
            "abfss://workspace@onelake.dfs.fabric.microsoft.com/lake.Lakehouse/Files/raw/a.parquet"
        );
    }
}
