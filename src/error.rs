use crate::matter::status::Status;
use crate::matter::types::{AttrPath, ClusterPath, EndptId};
use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum ProviderError {
    #[error("Endpoint 0x{0:04X} not found")]
    EndpointNotFound(EndptId),

    #[error("Cluster {0} not found")]
    ClusterNotFound(ClusterPath),

    #[error("Attribute {0} not found")]
    AttributeNotFound(AttrPath),

    #[error("Attribute {0} is not writable")]
    UnsupportedWrite(AttrPath),

    #[error("Attribute {0} requires a timed interaction")]
    NeedsTimedInteraction(AttrPath),

    #[error("Operation not implemented by handler")]
    NotImplemented,

    #[error("Cluster has not been started")]
    NotStarted,

    #[error("Cluster is already started")]
    AlreadyStarted,

    #[error("Duplicate registration for {0}")]
    Duplicate(ClusterPath),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid registry configuration: {0}")]
    InvalidConfig(String),

    #[error("Interaction failed with status {0}")]
    Status(Status),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

impl ProviderError {
    /// Protocol status reported to the peer for this failure.
    pub fn status(&self) -> Status {
        match self {
            Self::EndpointNotFound(_) => Status::UnsupportedEndpoint,
            Self::ClusterNotFound(_) => Status::UnsupportedCluster,
            Self::AttributeNotFound(_) => Status::UnsupportedAttribute,
            Self::UnsupportedWrite(_) => Status::UnsupportedWrite,
            Self::NeedsTimedInteraction(_) => Status::NeedsTimedInteraction,
            Self::InvalidPath(_) => Status::InvalidAction,
            Self::Status(status) => *status,
            Self::NotImplemented
            | Self::NotStarted
            | Self::AlreadyStarted
            | Self::Duplicate(_)
            | Self::InvalidConfig(_)
            | Self::IoError(_)
            | Self::SerdeJsonError(_) => Status::Failure,
        }
    }

    /// `true` for the "does not exist / not visible" class of failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::EndpointNotFound(_) | Self::ClusterNotFound(_) | Self::AttributeNotFound(_)
        ) || matches!(self, Self::Status(Status::NotFound))
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
