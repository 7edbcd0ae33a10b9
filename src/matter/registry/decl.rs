//! Declarations the registry is built from.
//!
//! The same types deserialize from a JSON registry description and act as
//! builders for registries assembled in code.

use super::{
    AttrType, AttributeMask, AttributeMetadata, Cluster, ClusterRole, CommandAccess, Endpoint,
    Registry,
};
use crate::error::{ProviderError, Result};
use crate::matter::metadata::{
    CommandQualities, Composition, DeviceTypeEntry, GlobalAttribute, Privilege,
};
use crate::matter::types::{
    AttrId, ClusterId, CmdId, Dataver, EndptId, INVALID_ATTRIBUTE_ID, INVALID_CLUSTER_ID,
    INVALID_COMMAND_ID, INVALID_DEVICE_TYPE_ID, INVALID_ENDPOINT_ID, Value,
};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;

fn yes() -> bool {
    true
}

fn one() -> u16 {
    1
}

fn operate() -> Privilege {
    Privilege::Operate
}

fn default_string_size() -> u16 {
    254
}

/// Top-level registry description file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub endpoints: Vec<EndpointDecl>,
}

impl RegistryConfig {
    /// Load a registry description from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path)?;
        let config: RegistryConfig = serde_json::from_slice(&bytes)?;
        info!(
            "Loaded registry description with {} endpoints from {:?}",
            config.endpoints.len(),
            path
        );
        Ok(config)
    }

    pub fn into_registry(self) -> Result<Registry> {
        Registry::new(self.endpoints)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointDecl {
    pub id: EndptId,
    #[serde(default)]
    pub parent_id: Option<EndptId>,
    #[serde(default)]
    pub composition: Composition,
    #[serde(default = "yes")]
    pub enabled: bool,
    #[serde(default)]
    pub device_types: Vec<DeviceTypeEntry>,
    #[serde(default)]
    pub clusters: Vec<ClusterDecl>,
}

impl EndpointDecl {
    pub fn new(id: EndptId) -> Self {
        Self {
            id,
            parent_id: None,
            composition: Composition::Tree,
            enabled: true,
            device_types: Vec::new(),
            clusters: Vec::new(),
        }
    }

    pub fn parent(mut self, parent_id: EndptId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn composition(mut self, composition: Composition) -> Self {
        self.composition = composition;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn device_type(mut self, device_type: DeviceTypeEntry) -> Self {
        self.device_types.push(device_type);
        self
    }

    pub fn cluster(mut self, cluster: ClusterDecl) -> Self {
        self.clusters.push(cluster);
        self
    }

    pub(super) fn build(self) -> Result<Endpoint> {
        if self.id == INVALID_ENDPOINT_ID {
            return Err(ProviderError::InvalidConfig(
                "endpoint id 0xFFFF is reserved".into(),
            ));
        }

        if let Some(reserved) = self
            .device_types
            .iter()
            .find(|entry| entry.device_type == INVALID_DEVICE_TYPE_ID)
        {
            return Err(ProviderError::InvalidConfig(format!(
                "device type 0x{:08X} on endpoint 0x{:04X} is reserved",
                reserved.device_type, self.id
            )));
        }

        let mut types = HashSet::new();
        if let Some(dup) = self
            .device_types
            .iter()
            .find(|entry| !types.insert(entry.device_type))
        {
            return Err(ProviderError::InvalidConfig(format!(
                "duplicate device type 0x{:08X} on endpoint 0x{:04X}",
                dup.device_type, self.id
            )));
        }

        let mut seen = HashSet::new();
        let mut clusters = Vec::with_capacity(self.clusters.len());
        for cluster in self.clusters {
            if !seen.insert(cluster.id) {
                return Err(ProviderError::InvalidConfig(format!(
                    "duplicate cluster 0x{:08X} on endpoint 0x{:04X}",
                    cluster.id, self.id
                )));
            }
            clusters.push(cluster.build(self.id)?);
        }

        Ok(Endpoint {
            id: self.id,
            parent_id: self.parent_id,
            composition: self.composition,
            device_types: self.device_types,
            clusters,
            enabled: AtomicBool::new(self.enabled),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterDecl {
    pub id: ClusterId,
    #[serde(default = "yes")]
    pub server: bool,
    #[serde(default)]
    pub client: bool,
    #[serde(default = "one")]
    pub revision: u16,
    #[serde(default)]
    pub feature_map: u32,
    /// Pinned initial data version; random when absent.
    #[serde(default)]
    pub data_version: Option<u32>,
    #[serde(default)]
    pub attributes: Vec<AttributeDecl>,
    #[serde(default)]
    pub accepted_commands: Vec<CommandDecl>,
    #[serde(default)]
    pub generated_commands: Vec<CmdId>,
}

impl ClusterDecl {
    pub fn server(id: ClusterId) -> Self {
        Self {
            id,
            server: true,
            client: false,
            revision: 1,
            feature_map: 0,
            data_version: None,
            attributes: Vec::new(),
            accepted_commands: Vec::new(),
            generated_commands: Vec::new(),
        }
    }

    pub fn client(id: ClusterId) -> Self {
        Self {
            server: false,
            client: true,
            ..Self::server(id)
        }
    }

    pub fn revision(mut self, revision: u16) -> Self {
        self.revision = revision;
        self
    }

    pub fn feature_map(mut self, feature_map: u32) -> Self {
        self.feature_map = feature_map;
        self
    }

    pub fn data_version(mut self, data_version: u32) -> Self {
        self.data_version = Some(data_version);
        self
    }

    pub fn attribute(mut self, attribute: AttributeDecl) -> Self {
        self.attributes.push(attribute);
        self
    }

    pub fn accepts(mut self, command: CommandDecl) -> Self {
        self.accepted_commands.push(command);
        self
    }

    pub fn generates(mut self, id: CmdId) -> Self {
        self.generated_commands.push(id);
        self
    }

    fn build(self, endpoint_id: EndptId) -> Result<Cluster> {
        let invalid = |what: String| {
            ProviderError::InvalidConfig(format!(
                "{} in cluster 0x{:08X} on endpoint 0x{:04X}",
                what, self.id, endpoint_id
            ))
        };

        if self.id == INVALID_CLUSTER_ID {
            return Err(invalid("reserved cluster id".into()));
        }

        // The global list attributes are synthesized, never declared
        let mut seen = HashSet::new();
        for attr in &self.attributes {
            let synthesized = GlobalAttribute::TRAILING_LISTS
                .iter()
                .any(|global| global.id() == attr.id);
            if attr.id == INVALID_ATTRIBUTE_ID || synthesized || !seen.insert(attr.id) {
                return Err(invalid(format!("bad attribute id 0x{:08X}", attr.id)));
            }
        }

        let mut accepted = HashSet::new();
        let mut generated = HashSet::new();
        let bad_command = self
            .accepted_commands
            .iter()
            .map(|cmd| (cmd.id, accepted.insert(cmd.id)))
            .chain(
                self.generated_commands
                    .iter()
                    .map(|id| (*id, generated.insert(*id))),
            )
            .find(|(id, fresh)| *id == INVALID_COMMAND_ID || !fresh);
        if let Some((cmd, _)) = bad_command {
            return Err(invalid(format!("bad command id 0x{:08X}", cmd)));
        }

        let mut role = ClusterRole::empty();
        role.set(ClusterRole::SERVER, self.server);
        role.set(ClusterRole::CLIENT, self.client);

        let dataver = match self.data_version {
            Some(initial) => Dataver::new(initial),
            None => Dataver::new_rand(),
        };

        Ok(Cluster {
            id: self.id,
            role,
            revision: self.revision,
            feature_map: self.feature_map,
            attributes: self
                .attributes
                .into_iter()
                .map(AttributeDecl::build)
                .collect(),
            accepted_commands: self.accepted_commands.iter().map(|cmd| cmd.id).collect(),
            generated_commands: self.generated_commands,
            command_access: self
                .accepted_commands
                .iter()
                .map(CommandDecl::access)
                .collect(),
            dataver,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeDecl {
    pub id: AttrId,
    #[serde(rename = "type")]
    pub attr_type: AttrType,
    #[serde(default = "default_string_size")]
    pub size: u16,
    #[serde(default)]
    pub writable: bool,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub timed_write: bool,
    #[serde(default)]
    pub fabric_scoped: bool,
    #[serde(default)]
    pub fabric_sensitive: bool,
    #[serde(default)]
    pub read_privilege: Privilege,
    #[serde(default = "operate")]
    pub write_privilege: Privilege,
    #[serde(default)]
    pub default: Option<Value>,
}

impl AttributeDecl {
    pub fn new(id: AttrId, attr_type: AttrType) -> Self {
        Self {
            id,
            attr_type,
            size: default_string_size(),
            writable: false,
            nullable: false,
            timed_write: false,
            fabric_scoped: false,
            fabric_sensitive: false,
            read_privilege: Privilege::View,
            write_privilege: Privilege::Operate,
            default: None,
        }
    }

    pub fn writable(mut self) -> Self {
        self.writable = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn timed_write(mut self) -> Self {
        self.timed_write = true;
        self
    }

    pub fn fabric_scoped(mut self) -> Self {
        self.fabric_scoped = true;
        self
    }

    pub fn size(mut self, size: u16) -> Self {
        self.size = size;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    fn build(self) -> AttributeMetadata {
        let mut mask = AttributeMask::empty();
        mask.set(AttributeMask::WRITABLE, self.writable);
        mask.set(AttributeMask::NULLABLE, self.nullable);
        mask.set(AttributeMask::TIMED_WRITE, self.timed_write);
        mask.set(AttributeMask::FABRIC_SCOPED, self.fabric_scoped);
        mask.set(AttributeMask::FABRIC_SENSITIVE, self.fabric_sensitive);

        AttributeMetadata {
            id: self.id,
            attr_type: self.attr_type,
            size: self.size,
            mask,
            read_privilege: self.read_privilege,
            write_privilege: self.write_privilege,
            default: self.default,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDecl {
    pub id: CmdId,
    #[serde(default = "operate")]
    pub privilege: Privilege,
    #[serde(default)]
    pub timed: bool,
    #[serde(default)]
    pub fabric_scoped: bool,
    #[serde(default)]
    pub large_message: bool,
}

impl CommandDecl {
    pub fn new(id: CmdId) -> Self {
        Self {
            id,
            privilege: Privilege::Operate,
            timed: false,
            fabric_scoped: false,
            large_message: false,
        }
    }

    pub fn privilege(mut self, privilege: Privilege) -> Self {
        self.privilege = privilege;
        self
    }

    pub fn timed(mut self) -> Self {
        self.timed = true;
        self
    }

    pub fn fabric_scoped(mut self) -> Self {
        self.fabric_scoped = true;
        self
    }

    fn access(&self) -> CommandAccess {
        let mut flags = CommandQualities::empty();
        flags.set(CommandQualities::TIMED, self.timed);
        flags.set(CommandQualities::FABRIC_SCOPED, self.fabric_scoped);
        flags.set(CommandQualities::LARGE_MESSAGE, self.large_message);

        CommandAccess {
            id: self.id,
            privilege: self.privilege,
            flags,
        }
    }
}

impl From<CmdId> for CommandDecl {
    fn from(id: CmdId) -> Self {
        Self::new(id)
    }
}
