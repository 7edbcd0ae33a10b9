//! Interaction-model provider.
//!
//! The facade a protocol engine talks to: first/next enumeration of the
//! whole capability tree, single-shot metadata lookups, and read/write/invoke
//! dispatch. Paths owned by a registered [`ServerCluster`] are answered by
//! it; everything else comes from the capability registry.
//!
//! Sequential traversals are amortized O(1) per step through one position
//! hint per axis, and lists built by a server cluster are kept until its
//! registration or the registry shape changes. Containing collections are found through single-slot
//! "last found" caches, one for endpoints and one for clusters, so a nested
//! lookup on one axis never evicts another axis' entry. No lock is held
//! while calling out to a cluster, handler or collaborator, which keeps
//! re-entrant calls from inside a dispatch safe.

use super::cluster::{ServerCluster, ServerClusterContext, ServerClusterRegistry};
use super::command_enum::{self, CommandKind, CommandLookup};
use super::handlers::CommandHandlerRegistry;
use super::hint::{ArrayAnchor, ArrayId, AxisHints, Slot};
use super::invoke::{CommandResponder, HandlerContext, InvokeRequest, WriteAttributeRequest};
use super::legacy::{AttributeValueDecoder, AttributeValueEncoder, LegacyDataModel};
use super::metadata::{
    AttributeEntry, AttributeInfo, ClusterEntry, ClusterInfo, CommandEntry, CommandInfo,
    CommandQualities, DeviceTypeEntry, EndpointEntry, GlobalAttribute,
};
use super::registry::{AttributeMetadata, Cluster, Endpoint, Registry};
use super::status::Status;
use super::types::{
    AttrId, AttrPath, ClusterId, ClusterPath, CmdId, CmdPath, DeviceTypeId, EndptId,
    INVALID_COMMAND_ID, Value,
};
use crate::error::{ProviderError, Result};
use log::{debug, info, trace};
use parking_lot::Mutex;
use std::sync::Arc;

fn endpoint_slot(endpoint: &Endpoint) -> Slot<EndptId> {
    if endpoint.is_enabled() {
        Slot::Visible(endpoint.id)
    } else {
        Slot::Hidden(endpoint.id)
    }
}

fn cluster_slot(cluster: &Cluster) -> Slot<ClusterId> {
    if cluster.is_server() {
        Slot::Visible(cluster.id)
    } else {
        Slot::Hidden(cluster.id)
    }
}

fn attribute_slot(attr: &AttributeMetadata) -> Slot<AttrId> {
    Slot::of(attr.id)
}

fn attribute_entry_slot(entry: &AttributeEntry) -> Slot<AttrId> {
    Slot::of(entry.path.attr_id)
}

fn command_slot(id: &CmdId) -> Slot<CmdId> {
    Slot::of(*id)
}

fn command_entry_slot(entry: &CommandEntry) -> Slot<CmdId> {
    Slot::of(entry.path.cmd_id)
}

fn device_type_slot(entry: &DeviceTypeEntry) -> Slot<DeviceTypeId> {
    Slot::of(entry.device_type)
}

/// Position of `id` among the synthesized trailing list attributes.
fn trailing_position(id: AttrId) -> Option<usize> {
    GlobalAttribute::TRAILING_LISTS
        .iter()
        .position(|global| global.id() == id)
}

fn first_trailing() -> AttrId {
    GlobalAttribute::TRAILING_LISTS[0].id()
}

fn declared_attribute(path: &ClusterPath, attr: &AttributeMetadata) -> AttributeEntry {
    AttributeEntry {
        path: path.attribute(attr.id),
        info: attr.info(),
    }
}

fn trailing_attribute(path: &ClusterPath, id: AttrId) -> AttributeEntry {
    AttributeEntry {
        path: path.attribute(id),
        info: AttributeInfo::global_list(),
    }
}

fn accepted_at(path: &ClusterPath, cluster: &Cluster, index: usize) -> Option<CommandEntry> {
    let id = *cluster.accepted_commands.get(index)?;
    Some(CommandEntry {
        path: path.command(id),
        info: cluster.command_info_at(index)?,
    })
}

/// `Some(answer)` when a dynamic handler owns the command list.
fn dynamic(lookup: CommandLookup) -> Option<Option<CmdId>> {
    match lookup {
        CommandLookup::Unhandled => None,
        CommandLookup::Missing => Some(None),
        CommandLookup::Found(id) => Some(Some(id)),
    }
}

/// A visible registry cluster and where it sits.
#[derive(Clone, Copy)]
struct Located<'a> {
    endpoint: usize,
    index: usize,
    cluster: &'a Cluster,
}

/// Who answers for one visible cluster path.
enum Served<'a> {
    Registry(Located<'a>),
    Server(Arc<dyn ServerCluster>),
}

/// The last list a server cluster built, with the anchor it was built at.
struct BuiltList<T>(Mutex<Option<(ArrayAnchor, Arc<[T]>)>>);

impl<T> Default for BuiltList<T> {
    fn default() -> Self {
        Self(Mutex::new(None))
    }
}

impl<T> BuiltList<T> {
    /// The cached list when `anchor` matches, otherwise a fresh build. No
    /// lock is held while `build` runs; failed builds are not cached.
    fn get_or_build<F>(&self, anchor: ArrayAnchor, build: F) -> Option<Arc<[T]>>
    where
        F: FnOnce() -> Option<Vec<T>>,
    {
        let cached = self.0.lock().clone();
        if let Some((built_at, list)) = cached
            && built_at == anchor
        {
            return Some(list);
        }

        let list: Arc<[T]> = build()?.into();
        *self.0.lock() = Some((anchor, list.clone()));
        Some(list)
    }
}

#[derive(Default)]
struct BuiltLists {
    attributes: BuiltList<AttributeEntry>,
    accepted_commands: BuiltList<CommandEntry>,
    generated_commands: BuiltList<CmdId>,
}

pub struct DataModelProvider {
    legacy: Arc<LegacyDataModel>,
    handlers: CommandHandlerRegistry,
    clusters: ServerClusterRegistry,
    hints: AxisHints,
    built: BuiltLists,
    endpoint_cache: Mutex<Option<(EndptId, usize)>>,
    cluster_cache: Mutex<Option<(ClusterPath, usize)>>,
}

impl DataModelProvider {
    pub fn new(legacy: Arc<LegacyDataModel>) -> Self {
        Self {
            legacy,
            handlers: CommandHandlerRegistry::new(),
            clusters: ServerClusterRegistry::new(),
            hints: AxisHints::default(),
            built: BuiltLists::default(),
            endpoint_cache: Mutex::new(None),
            cluster_cache: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &Registry {
        self.legacy.registry()
    }

    pub fn legacy(&self) -> &Arc<LegacyDataModel> {
        &self.legacy
    }

    pub fn command_handlers(&self) -> &CommandHandlerRegistry {
        &self.handlers
    }

    /// Start every registered server cluster; later registrations are
    /// started as they arrive.
    pub fn startup(&self, context: ServerClusterContext) -> Result<()> {
        self.clusters.startup(context)?;
        info!("Data model provider started");
        Ok(())
    }

    /// Hand the paths of `cluster` over to it. Every path must name a
    /// server cluster declared in the registry.
    pub fn register_server_cluster(&self, cluster: Arc<dyn ServerCluster>) -> Result<()> {
        for path in cluster.paths() {
            let declared = self
                .registry()
                .endpoint(path.endpoint_id)
                .and_then(|ep| ep.cluster(path.cluster_id))
                .is_some_and(Cluster::is_server);
            if !declared {
                return Err(ProviderError::ClusterNotFound(*path));
            }
        }
        self.clusters.register(cluster)
    }

    /// Take the paths of the server cluster serving `path` back. Each
    /// registry cluster's data version moves past the last one the server
    /// reported, so a peer never sees it go backwards.
    pub fn unregister_server_cluster(&self, path: &ClusterPath) -> Option<Arc<dyn ServerCluster>> {
        let server = self.clusters.unregister(path)?;
        for served in server.paths() {
            let Some(cluster) = self
                .registry()
                .endpoint(served.endpoint_id)
                .and_then(|ep| ep.cluster(served.cluster_id))
            else {
                continue;
            };
            match server.data_version(served) {
                Ok(version) => {
                    cluster.dataver().set(version);
                    let version = cluster.dataver().changed();
                    debug!("{} handed back at data version {}", served, version);
                }
                Err(e) => debug!("No data version for {} from its server: {}", served, e),
            }
        }
        Some(server)
    }

    fn anchor(&self, array: ArrayId) -> ArrayAnchor {
        ArrayAnchor::new(array, self.registry().generation())
    }

    fn built_anchor(&self, path: &ClusterPath) -> ArrayAnchor {
        self.anchor(ArrayId::Built {
            path: *path,
            serial: self.clusters.serial(),
        })
    }

    fn attributes_anchor(&self, located: &Located<'_>) -> ArrayAnchor {
        self.anchor(ArrayId::Attributes {
            endpoint: located.endpoint,
            cluster: located.index,
        })
    }

    fn accepted_anchor(&self, located: &Located<'_>) -> ArrayAnchor {
        self.anchor(ArrayId::AcceptedCommands {
            endpoint: located.endpoint,
            cluster: located.index,
        })
    }

    fn generated_anchor(&self, located: &Located<'_>) -> ArrayAnchor {
        self.anchor(ArrayId::GeneratedCommands {
            endpoint: located.endpoint,
            cluster: located.index,
        })
    }

    /// Any declared endpoint, through the endpoint cache.
    fn locate_endpoint(&self, id: EndptId) -> Option<(usize, &Endpoint)> {
        let endpoints = self.registry().endpoints();

        let cached = *self.endpoint_cache.lock();
        if let Some((cached_id, index)) = cached
            && cached_id == id
            && let Some(endpoint) = endpoints.get(index)
            && endpoint.id == id
        {
            return Some((index, endpoint));
        }

        let index = endpoints.iter().position(|ep| ep.id == id)?;
        trace!("Endpoint cache refreshed for 0x{:04X}", id);
        *self.endpoint_cache.lock() = Some((id, index));
        endpoints.get(index).map(|endpoint| (index, endpoint))
    }

    fn enabled_endpoint(&self, id: EndptId) -> Option<(usize, &Endpoint)> {
        self.locate_endpoint(id)
            .filter(|(_, endpoint)| endpoint.is_enabled())
    }

    /// A server cluster on an enabled endpoint, through the cluster cache.
    fn locate_cluster(&self, path: &ClusterPath) -> Option<Located<'_>> {
        let (endpoint, ep) = self.enabled_endpoint(path.endpoint_id)?;

        let cached = *self.cluster_cache.lock();
        let index = match cached {
            Some((cached_path, index))
                if cached_path == *path
                    && ep
                        .clusters
                        .get(index)
                        .is_some_and(|cluster| cluster.id == path.cluster_id) =>
            {
                index
            }
            _ => {
                let index = ep
                    .clusters
                    .iter()
                    .position(|cluster| cluster.id == path.cluster_id)?;
                trace!("Cluster cache refreshed for {}", path);
                *self.cluster_cache.lock() = Some((*path, index));
                index
            }
        };

        let cluster = ep.clusters.get(index).filter(|cluster| cluster.is_server())?;
        Some(Located {
            endpoint,
            index,
            cluster,
        })
    }

    fn serve(&self, path: &ClusterPath) -> Option<Served<'_>> {
        let located = self.locate_cluster(path)?;
        Some(match self.clusters.find(path) {
            Some(server) => Served::Server(server),
            None => Served::Registry(located),
        })
    }

    fn cluster_entry(&self, endpoint_id: EndptId, cluster: &Cluster) -> ClusterEntry {
        let path = ClusterPath::new(endpoint_id, cluster.id);
        let info = match self.clusters.find(&path) {
            Some(server) => server.cluster_info(&path).unwrap_or_else(|e| {
                debug!("Cluster info for {} unavailable: {}", path, e);
                cluster.info()
            }),
            None => cluster.info(),
        };
        ClusterEntry { path, info }
    }

    // Endpoints

    pub fn first_endpoint(&self) -> Option<EndpointEntry> {
        let endpoints = self.registry().endpoints();
        let anchor = self.anchor(ArrayId::Endpoints);
        let found = self
            .hints
            .endpoints
            .lock()
            .first(anchor, Some(endpoints), endpoint_slot);
        endpoints.get(found?).map(Endpoint::entry)
    }

    pub fn next_endpoint(&self, previous: EndptId) -> Option<EndpointEntry> {
        let endpoints = self.registry().endpoints();
        let anchor = self.anchor(ArrayId::Endpoints);
        let found = self
            .hints
            .endpoints
            .lock()
            .next(anchor, Some(endpoints), endpoint_slot, previous);
        endpoints.get(found?).map(Endpoint::entry)
    }

    pub fn endpoint_exists(&self, id: EndptId) -> bool {
        let endpoints = self.registry().endpoints();
        let anchor = self.anchor(ArrayId::Endpoints);
        self.hints
            .endpoints
            .lock()
            .exists(anchor, Some(endpoints), endpoint_slot, id)
    }

    // Clusters

    pub fn first_cluster(&self, endpoint: EndptId) -> Option<ClusterEntry> {
        let (index, ep) = self.enabled_endpoint(endpoint)?;
        let anchor = self.anchor(ArrayId::Clusters { endpoint: index });
        let found = self
            .hints
            .clusters
            .lock()
            .first(anchor, Some(ep.clusters.as_slice()), cluster_slot);
        let cluster = ep.clusters.get(found?)?;
        Some(self.cluster_entry(ep.id, cluster))
    }

    pub fn next_cluster(&self, previous: &ClusterPath) -> Option<ClusterEntry> {
        let (index, ep) = self.enabled_endpoint(previous.endpoint_id)?;
        let anchor = self.anchor(ArrayId::Clusters { endpoint: index });
        let found = self.hints.clusters.lock().next(
            anchor,
            Some(ep.clusters.as_slice()),
            cluster_slot,
            previous.cluster_id,
        );
        let cluster = ep.clusters.get(found?)?;
        Some(self.cluster_entry(ep.id, cluster))
    }

    pub fn get_cluster_info(&self, path: &ClusterPath) -> Option<ClusterInfo> {
        let located = self.locate_cluster(path)?;
        Some(self.cluster_entry(path.endpoint_id, located.cluster).info)
    }

    // Attributes

    fn built_attributes(
        &self,
        server: &dyn ServerCluster,
        path: &ClusterPath,
    ) -> Option<(ArrayAnchor, Arc<[AttributeEntry]>)> {
        let anchor = self.built_anchor(path);
        let list = self.built.attributes.get_or_build(anchor, || {
            let mut list = Vec::new();
            match server.attributes(path, &mut list) {
                Ok(()) => Some(list),
                Err(e) => {
                    debug!("Attribute list of {} unavailable: {}", path, e);
                    None
                }
            }
        })?;
        Some((anchor, list))
    }

    pub fn first_attribute(&self, path: &ClusterPath) -> Option<AttributeEntry> {
        match self.serve(path)? {
            Served::Server(server) => {
                let (anchor, list) = self.built_attributes(server.as_ref(), path)?;
                let found = self
                    .hints
                    .attributes
                    .lock()
                    .first(anchor, Some(&list[..]), attribute_entry_slot);
                list.get(found?).copied()
            }
            Served::Registry(located) => {
                let attributes = located.cluster.attributes.as_slice();
                let anchor = self.attributes_anchor(&located);
                let found = self
                    .hints
                    .attributes
                    .lock()
                    .first(anchor, Some(attributes), attribute_slot);
                Some(match found {
                    Some(index) => declared_attribute(path, attributes.get(index)?),
                    None => trailing_attribute(path, first_trailing()),
                })
            }
        }
    }

    /// Declared attributes in declaration order, then the synthesized
    /// generated-command, accepted-command and attribute lists.
    pub fn next_attribute(&self, previous: &AttrPath) -> Option<AttributeEntry> {
        let path = previous.cluster();
        match self.serve(&path)? {
            Served::Server(server) => {
                let (anchor, list) = self.built_attributes(server.as_ref(), &path)?;
                let found = self.hints.attributes.lock().next(
                    anchor,
                    Some(&list[..]),
                    attribute_entry_slot,
                    previous.attr_id,
                );
                list.get(found?).copied()
            }
            Served::Registry(located) => {
                if let Some(position) = trailing_position(previous.attr_id) {
                    let next = GlobalAttribute::TRAILING_LISTS.get(position + 1)?;
                    return Some(trailing_attribute(&path, next.id()));
                }

                let attributes = located.cluster.attributes.as_slice();
                let anchor = self.attributes_anchor(&located);
                let mut hint = self.hints.attributes.lock();
                match hint.next(anchor, Some(attributes), attribute_slot, previous.attr_id) {
                    Some(index) => Some(declared_attribute(&path, attributes.get(index)?)),
                    // Past the last declared attribute; the hint still holds it
                    None => {
                        hint.find(anchor, Some(attributes), attribute_slot, previous.attr_id)?;
                        Some(trailing_attribute(&path, first_trailing()))
                    }
                }
            }
        }
    }

    pub fn get_attribute_info(&self, path: &AttrPath) -> Option<AttributeInfo> {
        let cluster_path = path.cluster();
        match self.serve(&cluster_path)? {
            Served::Server(server) => {
                let (anchor, list) = self.built_attributes(server.as_ref(), &cluster_path)?;
                let found = self.hints.attributes.lock().find(
                    anchor,
                    Some(&list[..]),
                    attribute_entry_slot,
                    path.attr_id,
                );
                list.get(found?).map(|entry| entry.info)
            }
            Served::Registry(located) => {
                if trailing_position(path.attr_id).is_some() {
                    return Some(AttributeInfo::global_list());
                }
                let attributes = located.cluster.attributes.as_slice();
                let anchor = self.attributes_anchor(&located);
                let found = self.hints.attributes.lock().find(
                    anchor,
                    Some(attributes),
                    attribute_slot,
                    path.attr_id,
                );
                attributes.get(found?).map(AttributeMetadata::info)
            }
        }
    }

    // Accepted commands

    fn built_accepted(
        &self,
        server: &dyn ServerCluster,
        path: &ClusterPath,
    ) -> Option<(ArrayAnchor, Arc<[CommandEntry]>)> {
        let anchor = self.built_anchor(path);
        let list = self.built.accepted_commands.get_or_build(anchor, || {
            let mut list = Vec::new();
            match server.accepted_commands(path, &mut list) {
                Ok(()) => Some(list),
                Err(e) => {
                    debug!("Accepted commands of {} unavailable: {}", path, e);
                    None
                }
            }
        })?;
        Some((anchor, list))
    }

    /// Entry for a command id reported by a dynamic handler. Ids the
    /// underlying cluster does not declare get default requirements.
    fn accepted_entry(&self, served: &Served<'_>, path: CmdPath) -> CommandEntry {
        let cluster_path = path.cluster();
        let info = match served {
            Served::Registry(located) => {
                let anchor = self.accepted_anchor(located);
                let found = self.hints.accepted_commands.lock().find(
                    anchor,
                    Some(located.cluster.accepted_commands.as_slice()),
                    command_slot,
                    path.cmd_id,
                );
                found.and_then(|index| located.cluster.command_info_at(index))
            }
            Served::Server(server) => {
                self.built_accepted(server.as_ref(), &cluster_path)
                    .and_then(|(anchor, list)| {
                        let found = self.hints.accepted_commands.lock().find(
                            anchor,
                            Some(&list[..]),
                            command_entry_slot,
                            path.cmd_id,
                        );
                        list.get(found?).map(|entry| entry.info)
                    })
            }
        };
        CommandEntry {
            path,
            info: info.unwrap_or_default(),
        }
    }

    pub fn first_accepted_command(&self, path: &ClusterPath) -> Option<CommandEntry> {
        let served = self.serve(path)?;
        let lookup = command_enum::find_first(&self.handlers, CommandKind::Accepted, path);
        if let Some(answer) = dynamic(lookup) {
            return answer.map(|id| self.accepted_entry(&served, path.command(id)));
        }

        match served {
            Served::Server(server) => {
                let (anchor, list) = self.built_accepted(server.as_ref(), path)?;
                let found = self
                    .hints
                    .accepted_commands
                    .lock()
                    .first(anchor, Some(&list[..]), command_entry_slot);
                list.get(found?).copied()
            }
            Served::Registry(located) => {
                let anchor = self.accepted_anchor(&located);
                let found = self.hints.accepted_commands.lock().first(
                    anchor,
                    Some(located.cluster.accepted_commands.as_slice()),
                    command_slot,
                );
                accepted_at(path, located.cluster, found?)
            }
        }
    }

    pub fn next_accepted_command(&self, previous: &CmdPath) -> Option<CommandEntry> {
        let path = previous.cluster();
        let served = self.serve(&path)?;
        let lookup =
            command_enum::find_next(&self.handlers, CommandKind::Accepted, &path, previous.cmd_id);
        if let Some(answer) = dynamic(lookup) {
            return answer.map(|id| self.accepted_entry(&served, path.command(id)));
        }

        match served {
            Served::Server(server) => {
                let (anchor, list) = self.built_accepted(server.as_ref(), &path)?;
                let found = self.hints.accepted_commands.lock().next(
                    anchor,
                    Some(&list[..]),
                    command_entry_slot,
                    previous.cmd_id,
                );
                list.get(found?).copied()
            }
            Served::Registry(located) => {
                let anchor = self.accepted_anchor(&located);
                let found = self.hints.accepted_commands.lock().next(
                    anchor,
                    Some(located.cluster.accepted_commands.as_slice()),
                    command_slot,
                    previous.cmd_id,
                );
                accepted_at(&path, located.cluster, found?)
            }
        }
    }

    pub fn get_accepted_command_info(&self, path: &CmdPath) -> Option<CommandInfo> {
        let cluster_path = path.cluster();
        let served = self.serve(&cluster_path)?;
        let lookup = command_enum::find_exact(
            &self.handlers,
            CommandKind::Accepted,
            &cluster_path,
            path.cmd_id,
        );
        if let Some(answer) = dynamic(lookup) {
            return answer.map(|id| self.accepted_entry(&served, cluster_path.command(id)).info);
        }

        match served {
            Served::Server(server) => {
                let (anchor, list) = self.built_accepted(server.as_ref(), &cluster_path)?;
                let found = self.hints.accepted_commands.lock().find(
                    anchor,
                    Some(&list[..]),
                    command_entry_slot,
                    path.cmd_id,
                );
                list.get(found?).map(|entry| entry.info)
            }
            Served::Registry(located) => {
                let anchor = self.accepted_anchor(&located);
                let found = self.hints.accepted_commands.lock().find(
                    anchor,
                    Some(located.cluster.accepted_commands.as_slice()),
                    command_slot,
                    path.cmd_id,
                );
                located.cluster.command_info_at(found?)
            }
        }
    }

    // Generated commands

    fn built_generated(
        &self,
        server: &dyn ServerCluster,
        path: &ClusterPath,
    ) -> Option<(ArrayAnchor, Arc<[CmdId]>)> {
        let anchor = self.built_anchor(path);
        let list = self.built.generated_commands.get_or_build(anchor, || {
            let mut list = Vec::new();
            match server.generated_commands(path, &mut list) {
                Ok(()) => Some(list),
                Err(e) => {
                    debug!("Generated commands of {} unavailable: {}", path, e);
                    None
                }
            }
        })?;
        Some((anchor, list))
    }

    pub fn first_generated_command(&self, path: &ClusterPath) -> Option<CmdPath> {
        let served = self.serve(path)?;
        let lookup = command_enum::find_first(&self.handlers, CommandKind::Generated, path);
        if let Some(answer) = dynamic(lookup) {
            return answer.map(|id| path.command(id));
        }

        let built;
        let (anchor, list) = match &served {
            Served::Server(server) => {
                let (anchor, list) = self.built_generated(server.as_ref(), path)?;
                built = list;
                (anchor, &built[..])
            }
            Served::Registry(located) => (
                self.generated_anchor(located),
                located.cluster.generated_commands.as_slice(),
            ),
        };
        let found = self
            .hints
            .generated_commands
            .lock()
            .first(anchor, Some(list), command_slot);
        list.get(found?).map(|id| path.command(*id))
    }

    pub fn next_generated_command(&self, previous: &CmdPath) -> Option<CmdPath> {
        let path = previous.cluster();
        let served = self.serve(&path)?;
        let lookup =
            command_enum::find_next(&self.handlers, CommandKind::Generated, &path, previous.cmd_id);
        if let Some(answer) = dynamic(lookup) {
            return answer.map(|id| path.command(id));
        }

        let built;
        let (anchor, list) = match &served {
            Served::Server(server) => {
                let (anchor, list) = self.built_generated(server.as_ref(), &path)?;
                built = list;
                (anchor, &built[..])
            }
            Served::Registry(located) => (
                self.generated_anchor(located),
                located.cluster.generated_commands.as_slice(),
            ),
        };
        let found = self.hints.generated_commands.lock().next(
            anchor,
            Some(list),
            command_slot,
            previous.cmd_id,
        );
        list.get(found?).map(|id| path.command(*id))
    }

    // Device types

    pub fn first_device_type(&self, endpoint: EndptId) -> Option<DeviceTypeEntry> {
        let (index, ep) = self.enabled_endpoint(endpoint)?;
        let anchor = self.anchor(ArrayId::DeviceTypes { endpoint: index });
        let found = self
            .hints
            .device_types
            .lock()
            .first(anchor, Some(ep.device_types.as_slice()), device_type_slot);
        ep.device_types.get(found?).copied()
    }

    pub fn next_device_type(
        &self,
        endpoint: EndptId,
        previous: DeviceTypeId,
    ) -> Option<DeviceTypeEntry> {
        let (index, ep) = self.enabled_endpoint(endpoint)?;
        let anchor = self.anchor(ArrayId::DeviceTypes { endpoint: index });
        let found = self.hints.device_types.lock().next(
            anchor,
            Some(ep.device_types.as_slice()),
            device_type_slot,
            previous,
        );
        ep.device_types.get(found?).copied()
    }

    // Data operations

    /// The server cluster owning a visible path, if any.
    fn served_by(&self, path: &ClusterPath) -> Result<Option<Arc<dyn ServerCluster>>> {
        self.legacy.cluster(path)?;
        Ok(self.clusters.find(path))
    }

    pub fn read_attribute(
        &self,
        path: &AttrPath,
        encoder: &mut AttributeValueEncoder,
    ) -> Result<()> {
        match self.served_by(&path.cluster())? {
            Some(server) => server.read_attribute(path, encoder),
            None => self.legacy.read_attribute(path, encoder),
        }
    }

    /// On success the owning cluster's data version moves by exactly one.
    pub fn write_attribute(
        &self,
        request: &WriteAttributeRequest,
        decoder: &mut AttributeValueDecoder,
    ) -> Result<()> {
        let path = request.path.cluster();
        if let Some(server) = self.served_by(&path)? {
            return server.write_attribute(request, decoder);
        }

        self.legacy.write_attribute(request, decoder)?;
        let version = self.legacy.cluster(&path)?.dataver().changed();
        debug!("{} written, data version now {}", request.path, version);

        if let Some(context) = self.clusters.context() {
            context.notify.attribute_changed(&request.path);
        }
        Ok(())
    }

    /// `None` when the answer has gone (or will go) out through `responder`.
    pub fn invoke(
        &self,
        request: &InvokeRequest,
        args: &Value,
        responder: &mut dyn CommandResponder,
    ) -> Option<Status> {
        let path = request.path;
        if path.cmd_id == INVALID_COMMAND_ID {
            return Some(Status::InvalidAction);
        }
        let server = match self.served_by(&path.cluster()) {
            Ok(server) => server,
            Err(e) => {
                debug!("Invoke of {} rejected: {}", path, e);
                return Some(e.status());
            }
        };

        let timed_only = self
            .get_accepted_command_info(&path)
            .is_some_and(|info| info.flags.contains(CommandQualities::TIMED));
        if timed_only && !request.timed {
            debug!("Untimed invoke of {} refused", path);
            return Some(Status::NeedsTimedInteraction);
        }

        if let Some(handler) = self.handlers.find(&path.cluster()) {
            let mut ctx = HandlerContext::new(request, args, responder);
            handler.invoke_command(&mut ctx);
            if ctx.is_handled() {
                return None;
            }
            trace!("Handler declined {}", path);
        }

        if let Some(server) = server {
            return server
                .invoke_command(request, args, responder)
                .unwrap_or_else(|e| Some(e.status()));
        }

        self.legacy.dispatch(&path, args, responder);
        None
    }
}
