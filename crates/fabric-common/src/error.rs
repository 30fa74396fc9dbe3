use thiserror::Error;

pub type FabricResult<T> = Result<T, FabricError>;

/// Errors surfaced to callers of the Fabric utilities.
///
/// Failures of the underlying identity, storage, and table-format libraries
/// are classified into one of these kinds with the original message kept.
#[derive(Debug, Error)]
pub enum FabricError {
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("not authorized: {0}")]
    Authorization(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("read error: {0}")]
    Read(String),
    #[error("write error: {0}")]
    Write(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl FabricError {
    pub fn authentication(message: impl Into<String>) -> Self {
        FabricError::Authentication(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        FabricError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        FabricError::Conflict(message.into())
    }

    pub fn write(message: impl Into<String>) -> Self {
        FabricError::Write(message.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        FabricError::InvalidArgument(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        FabricError::Internal(message.into())
    }

    pub fn is_authentication(&self) -> bool {
        matches!(self, FabricError::Authentication(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FabricError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, FabricError::Conflict(_))
    }
}
