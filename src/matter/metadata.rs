//! Metadata entries handed to the protocol engine during enumeration.
//!
//! None of these are stored; they are synthesized on demand from registry
//! rows or from a server cluster's own description.

use super::types::{AttrId, AttrPath, ClusterPath, CmdPath, DeviceTypeId, EndptId};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use strum::FromRepr;

/// Access privilege levels, ordered from least to most powerful.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    #[default]
    View,
    ProxyView,
    Operate,
    Manage,
    Administer,
}

bitflags! {
    /// Qualities of an attribute as seen by the protocol engine.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AttributeQualities: u8 {
        const LIST_ATTRIBUTE = 0x01;
        const TIMED_WRITE = 0x02;
        const FABRIC_SCOPED = 0x04;
        const FABRIC_SENSITIVE = 0x08;
        const NULLABLE = 0x10;
    }
}

bitflags! {
    /// Qualities of an accepted command.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CommandQualities: u8 {
        const TIMED = 0x01;
        const FABRIC_SCOPED = 0x02;
        const LARGE_MESSAGE = 0x04;
    }
}

/// Global meta-attributes every cluster exposes.
#[derive(Clone, Copy, Debug, Eq, PartialEq, FromRepr)]
#[repr(u32)]
pub enum GlobalAttribute {
    GeneratedCmdList = 0xFFF8,
    AcceptedCmdList = 0xFFF9,
    EventList = 0xFFFA,
    AttributeList = 0xFFFB,
    FeatureMap = 0xFFFC,
    ClusterRevision = 0xFFFD,
}

impl GlobalAttribute {
    pub const fn id(self) -> AttrId {
        self as AttrId
    }

    /// The list-valued meta-attributes appended after a cluster's own
    /// attributes, in reporting order.
    pub const TRAILING_LISTS: [GlobalAttribute; 3] = [
        GlobalAttribute::GeneratedCmdList,
        GlobalAttribute::AcceptedCmdList,
        GlobalAttribute::AttributeList,
    ];
}

/// How an endpoint's children are composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Composition {
    #[default]
    Tree,
    FullFamily,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointEntry {
    pub id: EndptId,
    pub parent_id: Option<EndptId>,
    pub composition: Composition,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterInfo {
    pub data_version: u32,
    pub revision: u16,
    pub feature_map: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterEntry {
    pub path: ClusterPath,
    pub info: ClusterInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeInfo {
    pub flags: AttributeQualities,
    pub read_privilege: Option<Privilege>,
    /// `None` for attributes that cannot be written.
    pub write_privilege: Option<Privilege>,
}

impl AttributeInfo {
    /// Info for a read-only list-valued meta-attribute.
    pub const fn global_list() -> Self {
        Self {
            flags: AttributeQualities::LIST_ATTRIBUTE,
            read_privilege: Some(Privilege::View),
            write_privilege: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeEntry {
    pub path: AttrPath,
    pub info: AttributeInfo,
}

impl AttributeEntry {
    pub fn is_list(&self) -> bool {
        self.info.flags.contains(AttributeQualities::LIST_ATTRIBUTE)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandInfo {
    pub flags: CommandQualities,
    pub invoke_privilege: Privilege,
}

impl Default for CommandInfo {
    fn default() -> Self {
        Self {
            flags: CommandQualities::empty(),
            invoke_privilege: Privilege::Operate,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandEntry {
    pub path: CmdPath,
    pub info: CommandInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceTypeEntry {
    pub device_type: DeviceTypeId,
    pub revision: u8,
}

impl DeviceTypeEntry {
    pub const fn new(device_type: DeviceTypeId, revision: u8) -> Self {
        Self {
            device_type,
            revision,
        }
    }
}
