//! Interaction-model status codes.
//!
//! Collaborators (attribute storage, command dispatch) report outcomes as a
//! protocol status rather than a Rust error. Values follow the Matter Core
//! Specification status code table.

use crate::error::{ProviderError, Result};
use strum::{Display, FromRepr};

/// Protocol status code for a single addressed path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRepr, Display)]
#[repr(u8)]
pub enum Status {
    Success = 0x00,
    Failure = 0x01,
    UnsupportedAccess = 0x7E,
    UnsupportedEndpoint = 0x7F,
    InvalidAction = 0x80,
    UnsupportedCommand = 0x81,
    InvalidCommand = 0x85,
    UnsupportedAttribute = 0x86,
    ConstraintError = 0x87,
    UnsupportedWrite = 0x88,
    ResourceExhausted = 0x89,
    NotFound = 0x8B,
    InvalidDataType = 0x8D,
    UnsupportedRead = 0x8F,
    DataVersionMismatch = 0x92,
    Timeout = 0x94,
    Busy = 0x9C,
    UnsupportedCluster = 0xC3,
    NeedsTimedInteraction = 0xC6,
}

impl Status {
    pub fn is_success(self) -> bool {
        self == Status::Success
    }

    /// Lift a collaborator status into the crate error type.
    pub fn into_result(self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(ProviderError::Status(self))
        }
    }

    /// Raw status byte as carried on the wire.
    pub fn code(self) -> u8 {
        self as u8
    }
}
