//! Identifiers, concrete paths and small value types of the data model.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

pub type EndptId = u16;
pub type ClusterId = u32;
pub type AttrId = u32;
pub type CmdId = u32;
pub type DeviceTypeId = u32;

pub const INVALID_ENDPOINT_ID: EndptId = 0xFFFF;
pub const INVALID_CLUSTER_ID: ClusterId = 0xFFFF_FFFF;
pub const INVALID_ATTRIBUTE_ID: AttrId = 0xFFFF_FFFF;
pub const INVALID_COMMAND_ID: CmdId = 0xFFFF_FFFF;
pub const INVALID_DEVICE_TYPE_ID: DeviceTypeId = 0xFFFF_FFFF;

/// A concrete (endpoint, cluster) address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusterPath {
    pub endpoint_id: EndptId,
    pub cluster_id: ClusterId,
}

impl ClusterPath {
    pub const fn new(endpoint_id: EndptId, cluster_id: ClusterId) -> Self {
        Self {
            endpoint_id,
            cluster_id,
        }
    }

    /// `false` if either component carries the reserved invalid id.
    pub fn is_valid(&self) -> bool {
        self.endpoint_id != INVALID_ENDPOINT_ID && self.cluster_id != INVALID_CLUSTER_ID
    }

    pub const fn attribute(&self, attr_id: AttrId) -> AttrPath {
        AttrPath::new(self.endpoint_id, self.cluster_id, attr_id)
    }

    pub const fn command(&self, cmd_id: CmdId) -> CmdPath {
        CmdPath::new(self.endpoint_id, self.cluster_id, cmd_id)
    }
}

impl fmt::Display for ClusterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(0x{:04X}, 0x{:08X})", self.endpoint_id, self.cluster_id)
    }
}

/// A concrete attribute address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttrPath {
    pub endpoint_id: EndptId,
    pub cluster_id: ClusterId,
    pub attr_id: AttrId,
}

impl AttrPath {
    pub const fn new(endpoint_id: EndptId, cluster_id: ClusterId, attr_id: AttrId) -> Self {
        Self {
            endpoint_id,
            cluster_id,
            attr_id,
        }
    }

    pub const fn cluster(&self) -> ClusterPath {
        ClusterPath::new(self.endpoint_id, self.cluster_id)
    }
}

impl fmt::Display for AttrPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(0x{:04X}, 0x{:08X}, attr 0x{:08X})",
            self.endpoint_id, self.cluster_id, self.attr_id
        )
    }
}

/// A concrete command address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CmdPath {
    pub endpoint_id: EndptId,
    pub cluster_id: ClusterId,
    pub cmd_id: CmdId,
}

impl CmdPath {
    pub const fn new(endpoint_id: EndptId, cluster_id: ClusterId, cmd_id: CmdId) -> Self {
        Self {
            endpoint_id,
            cluster_id,
            cmd_id,
        }
    }

    pub const fn cluster(&self) -> ClusterPath {
        ClusterPath::new(self.endpoint_id, self.cluster_id)
    }
}

impl fmt::Display for CmdPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "(0x{:04X}, 0x{:08X}, cmd 0x{:08X})",
            self.endpoint_id, self.cluster_id, self.cmd_id
        )
    }
}

/// Per-cluster-instance change counter.
///
/// Incremented once per successful mutation, wrapping at `u32::MAX`.
#[derive(Debug)]
pub struct Dataver(AtomicU32);

impl Dataver {
    pub const fn new(initial: u32) -> Self {
        Self(AtomicU32::new(initial))
    }

    /// Seed with a random value, so peers holding a stale version from a
    /// previous boot do not match by accident.
    pub fn new_rand() -> Self {
        Self::new(rand::random())
    }

    pub fn get(&self) -> u32 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, value: u32) {
        self.0.store(value, Ordering::SeqCst);
    }

    /// Bump the version and return the new value.
    pub fn changed(&self) -> u32 {
        self.0.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }
}

impl Default for Dataver {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Decoded attribute value or command payload.
///
/// The wire encoding lives outside this crate; collaborators exchange values
/// in this already-decoded form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Utf8(String),
    List(Vec<Value>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Utf8(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Unsigned(v) => Some(*v),
            Value::Signed(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Utf8(value.to_string())
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Value::Unsigned(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dataver_wraps() {
        let dv = Dataver::new(u32::MAX);
        assert_eq!(dv.changed(), 0);
        assert_eq!(dv.get(), 0);
        assert_eq!(dv.changed(), 1);
    }

    #[test]
    fn test_path_validity() {
        assert!(ClusterPath::new(1, 6).is_valid());
        assert!(!ClusterPath::new(1, INVALID_CLUSTER_ID).is_valid());
        assert!(!ClusterPath::new(INVALID_ENDPOINT_ID, 6).is_valid());
    }

    #[test]
    fn test_value_from_json() {
        let v: Value = serde_json::from_str(r#"[1, -2, "x", null, true]"#).unwrap();
        assert_eq!(
            v,
            Value::List(vec![
                Value::Unsigned(1),
                Value::Signed(-2),
                Value::Utf8("x".into()),
                Value::Null,
                Value::Bool(true),
            ])
        );
    }
}
