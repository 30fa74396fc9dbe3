use arrow::error::ArrowError;
use datafusion::error::DataFusionError;
use deltalake::DeltaTableError;
use fabric_common::error::{FabricError, FabricResult};

/// The kind of storage access that failed, used to pick between
/// [`FabricError::Read`] and [`FabricError::Write`] for unclassified failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Operation {
    Read,
    Write,
}

impl Operation {
    fn error(self, message: String) -> FabricError {
        match self {
            Operation::Read => FabricError::Read(message),
            Operation::Write => FabricError::Write(message),
        }
    }

    /// Classifies a failure that only carries a message, e.g. an HTTP error
    /// status wrapped in a generic storage error.
    fn classify(self, message: String) -> FabricError {
        if message.contains("401 Unauthorized") || message.contains("InvalidAuthenticationInfo") {
            FabricError::Authentication(message)
        } else if message.contains("403 Forbidden")
            || message.contains("AuthorizationPermissionMismatch")
            || message.contains("AuthorizationFailure")
        {
            FabricError::Authorization(message)
        } else {
            self.error(message)
        }
    }
}

pub(crate) trait IntoFabricError {
    fn into_fabric_error(self, operation: Operation) -> FabricError;
}

impl IntoFabricError for object_store::Error {
    fn into_fabric_error(self, operation: Operation) -> FabricError {
        match &self {
            object_store::Error::NotFound { .. } => FabricError::NotFound(self.to_string()),
            object_store::Error::Unauthenticated { .. } => {
                FabricError::Authentication(self.to_string())
            }
            object_store::Error::PermissionDenied { .. } => {
                FabricError::Authorization(self.to_string())
            }
            object_store::Error::AlreadyExists { .. } | object_store::Error::Precondition { .. } => {
                FabricError::Conflict(self.to_string())
            }
            _ => operation.classify(self.to_string()),
        }
    }
}

impl IntoFabricError for DeltaTableError {
    fn into_fabric_error(self, operation: Operation) -> FabricError {
        match self {
            DeltaTableError::ObjectStore { source } => source.into_fabric_error(operation),
            DeltaTableError::NotATable(message) => FabricError::NotFound(message),
            DeltaTableError::InvalidTableLocation(location) => {
                FabricError::NotFound(format!("invalid table location: {location}"))
            }
            DeltaTableError::VersionAlreadyExists(version) => FabricError::Conflict(format!(
                "a concurrent write already created table version {version}"
            )),
            other => operation.classify(other.to_string()),
        }
    }
}

impl IntoFabricError for DataFusionError {
    fn into_fabric_error(self, operation: Operation) -> FabricError {
        match self {
            DataFusionError::ObjectStore(source) => source.into_fabric_error(operation),
            DataFusionError::Context(_, inner) => (*inner).into_fabric_error(operation),
            DataFusionError::External(source) => match source.downcast::<DeltaTableError>() {
                Ok(e) => e.into_fabric_error(operation),
                Err(source) => match source.downcast::<object_store::Error>() {
                    Ok(e) => e.into_fabric_error(operation),
                    Err(source) => operation.classify(source.to_string()),
                },
            },
            other => operation.classify(other.to_string()),
        }
    }
}

impl IntoFabricError for ArrowError {
    fn into_fabric_error(self, operation: Operation) -> FabricError {
        operation.error(self.to_string())
    }
}

pub(crate) trait ResultExt<T> {
    fn map_read_err(self) -> FabricResult<T>;
    fn map_write_err(self) -> FabricResult<T>;
}

impl<T, E: IntoFabricError> ResultExt<T> for Result<T, E> {
    fn map_read_err(self) -> FabricResult<T> {
        self.map_err(|e| e.into_fabric_error(Operation::Read))
    }

    fn map_write_err(self) -> FabricResult<T> {
        self.map_err(|e| e.into_fabric_error(Operation::Write))
    }
}
