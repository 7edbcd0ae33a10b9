//! Capability Registry.
//!
//! Read-only, array-backed description of endpoints, the cluster instances on
//! each endpoint, and the attributes/commands each cluster declares. Built
//! once from declarations; after that only endpoint enablement and cluster
//! data versions change.
//!
//! Every slice handed out here keeps its identity and ordering for the
//! registry's lifetime. The shape `generation` is bumped whenever visibility
//! changes so that cached positions can be re-validated.

mod decl;

pub use decl::{AttributeDecl, ClusterDecl, CommandDecl, EndpointDecl, RegistryConfig};

use super::metadata::{
    AttributeInfo, AttributeQualities, ClusterInfo, CommandInfo, CommandQualities, Composition,
    DeviceTypeEntry, EndpointEntry, Privilege,
};
use super::types::{AttrId, ClusterId, ClusterPath, CmdId, Dataver, EndptId, Value};
use crate::error::{ProviderError, Result};
use bitflags::bitflags;
use log::info;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use strum::Display;

bitflags! {
    /// Roles a cluster is declared with on an endpoint.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClusterRole: u8 {
        const SERVER = 0x01;
        const CLIENT = 0x02;
    }
}

bitflags! {
    /// Storage-level attribute mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AttributeMask: u8 {
        const WRITABLE = 0x01;
        const NULLABLE = 0x02;
        const TIMED_WRITE = 0x04;
        const FABRIC_SCOPED = 0x08;
        const FABRIC_SENSITIVE = 0x10;
    }
}

/// Declared storage type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttrType {
    Boolean,
    Int8u,
    Int16u,
    Int32u,
    Int64u,
    Int8s,
    Int16s,
    Int32s,
    Int64s,
    Enum8,
    Enum16,
    Bitmap8,
    Bitmap16,
    Bitmap32,
    Single,
    Double,
    CharString,
    Array,
    Struct,
}

impl AttrType {
    /// `true` for array-shaped (list-valued) attributes.
    pub fn is_array(self) -> bool {
        self == AttrType::Array
    }
}

#[derive(Debug, Clone)]
pub struct AttributeMetadata {
    pub id: AttrId,
    pub attr_type: AttrType,
    /// Maximum encoded length for strings; ignored for other types.
    pub size: u16,
    pub mask: AttributeMask,
    pub read_privilege: Privilege,
    pub write_privilege: Privilege,
    pub default: Option<Value>,
}

impl AttributeMetadata {
    pub fn is_writable(&self) -> bool {
        self.mask.contains(AttributeMask::WRITABLE)
    }

    pub fn is_nullable(&self) -> bool {
        self.mask.contains(AttributeMask::NULLABLE)
    }

    pub fn info(&self) -> AttributeInfo {
        let mut flags = AttributeQualities::empty();
        flags.set(AttributeQualities::LIST_ATTRIBUTE, self.attr_type.is_array());
        flags.set(
            AttributeQualities::TIMED_WRITE,
            self.mask.contains(AttributeMask::TIMED_WRITE),
        );
        flags.set(
            AttributeQualities::FABRIC_SCOPED,
            self.mask.contains(AttributeMask::FABRIC_SCOPED),
        );
        flags.set(
            AttributeQualities::FABRIC_SENSITIVE,
            self.mask.contains(AttributeMask::FABRIC_SENSITIVE),
        );
        flags.set(AttributeQualities::NULLABLE, self.is_nullable());

        AttributeInfo {
            flags,
            read_privilege: Some(self.read_privilege),
            write_privilege: self.is_writable().then_some(self.write_privilege),
        }
    }
}

/// Invoke requirements of one accepted command.
#[derive(Debug, Clone, Copy)]
pub struct CommandAccess {
    pub id: CmdId,
    pub privilege: Privilege,
    pub flags: CommandQualities,
}

impl CommandAccess {
    pub fn info(&self) -> CommandInfo {
        CommandInfo {
            flags: self.flags,
            invoke_privilege: self.privilege,
        }
    }
}

#[derive(Debug)]
pub struct Cluster {
    pub id: ClusterId,
    pub role: ClusterRole,
    pub revision: u16,
    pub feature_map: u32,
    pub attributes: Vec<AttributeMetadata>,
    pub accepted_commands: Vec<CmdId>,
    pub generated_commands: Vec<CmdId>,
    pub command_access: Vec<CommandAccess>,
    dataver: Dataver,
}

impl Cluster {
    pub fn is_server(&self) -> bool {
        self.role.contains(ClusterRole::SERVER)
    }

    pub fn dataver(&self) -> &Dataver {
        &self.dataver
    }

    pub fn info(&self) -> ClusterInfo {
        ClusterInfo {
            data_version: self.dataver.get(),
            revision: self.revision,
            feature_map: self.feature_map,
        }
    }

    pub fn attribute(&self, id: AttrId) -> Option<&AttributeMetadata> {
        self.attributes.iter().find(|attr| attr.id == id)
    }

    /// Invoke requirements for a command; commands without an explicit
    /// access row need Operate and carry no qualities.
    pub fn command_info(&self, id: CmdId) -> CommandInfo {
        self.command_access
            .iter()
            .find(|access| access.id == id)
            .map(CommandAccess::info)
            .unwrap_or_default()
    }

    /// Invoke requirements for the accepted command at `index`. Access rows
    /// are kept in accepted-command order, so this is a direct lookup.
    pub fn command_info_at(&self, index: usize) -> Option<CommandInfo> {
        let id = *self.accepted_commands.get(index)?;
        match self.command_access.get(index) {
            Some(access) if access.id == id => Some(access.info()),
            _ => Some(self.command_info(id)),
        }
    }
}

#[derive(Debug)]
pub struct Endpoint {
    pub id: EndptId,
    pub parent_id: Option<EndptId>,
    pub composition: Composition,
    pub device_types: Vec<DeviceTypeEntry>,
    pub clusters: Vec<Cluster>,
    enabled: AtomicBool,
}

impl Endpoint {
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn entry(&self) -> EndpointEntry {
        EndpointEntry {
            id: self.id,
            parent_id: self.parent_id,
            composition: self.composition,
        }
    }

    /// Any declared cluster with the given id, regardless of role.
    pub fn cluster(&self, id: ClusterId) -> Option<&Cluster> {
        self.clusters.iter().find(|cluster| cluster.id == id)
    }
}

#[derive(Debug)]
pub struct Registry {
    endpoints: Vec<Endpoint>,
    generation: AtomicU64,
}

impl Registry {
    /// Build the registry from declarations, validating identifiers.
    pub fn new(decls: Vec<EndpointDecl>) -> Result<Self> {
        let mut endpoints: Vec<Endpoint> = Vec::with_capacity(decls.len());

        for decl in decls {
            if endpoints.iter().any(|ep| ep.id == decl.id) {
                return Err(ProviderError::InvalidConfig(format!(
                    "duplicate endpoint 0x{:04X}",
                    decl.id
                )));
            }
            endpoints.push(decl.build()?);
        }

        info!(
            "Capability registry built: {} endpoints, {} clusters",
            endpoints.len(),
            endpoints.iter().map(|ep| ep.clusters.len()).sum::<usize>()
        );

        Ok(Self {
            endpoints,
            generation: AtomicU64::new(0),
        })
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Shape generation, bumped on every visibility change.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Any declared endpoint with the given id, enabled or not.
    pub fn endpoint(&self, id: EndptId) -> Option<&Endpoint> {
        self.endpoints.iter().find(|ep| ep.id == id)
    }

    /// A server-role cluster on an enabled endpoint.
    pub fn server_cluster(&self, path: &ClusterPath) -> Option<&Cluster> {
        self.endpoint(path.endpoint_id)
            .filter(|ep| ep.is_enabled())?
            .cluster(path.cluster_id)
            .filter(|cluster| cluster.is_server())
    }

    /// Enable or disable an endpoint. Disabled endpoints are invisible to
    /// enumeration and lookups.
    pub fn set_endpoint_enabled(&self, id: EndptId, enabled: bool) -> Result<()> {
        let endpoint = self
            .endpoint(id)
            .ok_or(ProviderError::EndpointNotFound(id))?;

        if endpoint.enabled.swap(enabled, Ordering::SeqCst) != enabled {
            self.generation.fetch_add(1, Ordering::SeqCst);
            info!(
                "Endpoint 0x{:04X} {}",
                id,
                if enabled { "enabled" } else { "disabled" }
            );
        }

        Ok(())
    }
}
