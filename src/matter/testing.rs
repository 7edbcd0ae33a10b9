//! Shared unit-test fixtures: a small node and recording collaborators.

use super::invoke::CommandResponder;
use super::legacy::{
    AttributeStorage, AttributeValueDecoder, AttributeValueEncoder, CommandDispatch,
    LegacyDataModel, MemoryStorage,
};
use super::metadata::{DeviceTypeEntry, Privilege};
use super::registry::{
    AttrType, AttributeDecl, AttributeMetadata, ClusterDecl, CommandDecl, EndpointDecl, Registry,
};
use super::status::Status;
use super::types::{AttrId, AttrPath, ClusterId, CmdPath, EndptId, Value};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const DESCRIPTOR: ClusterId = 0x001D;
pub const BASIC_INFO: ClusterId = 0x0028;
pub const CLIENT_ONLY: ClusterId = 0x0003;
pub const ON_OFF: ClusterId = 0x0006;
pub const LEVEL: ClusterId = 0x0008;
pub const SHIM_CLUSTER: ClusterId = 0x0004;

pub const LIGHT_EP: EndptId = 1;
pub const DISABLED_EP: EndptId = 2;
pub const SHIM_EP: EndptId = 3;

pub const ATTR_ON_OFF: AttrId = 0x0000;
pub const ATTR_LABEL: AttrId = 0x4000;
pub const ATTR_LIST: AttrId = 0x4001;
pub const ATTR_TIMED: AttrId = 0x4002;
pub const ATTR_X: AttrId = 0x0010;

pub const ON_OFF_DATAVER: u32 = 10;
pub const SHIM_DATAVER: u32 = 100;

pub const DEV_TYPE_ROOT_NODE: DeviceTypeEntry = DeviceTypeEntry::new(0x0016, 1);
pub const DEV_TYPE_ON_OFF_LIGHT: DeviceTypeEntry = DeviceTypeEntry::new(0x0100, 2);
pub const DEV_TYPE_BRIDGED_NODE: DeviceTypeEntry = DeviceTypeEntry::new(0x0013, 1);

fn on_off_cluster() -> ClusterDecl {
    ClusterDecl::server(ON_OFF)
        .revision(5)
        .feature_map(1)
        .data_version(ON_OFF_DATAVER)
        .attribute(
            AttributeDecl::new(ATTR_LABEL, AttrType::CharString)
                .writable()
                .size(16),
        )
        .attribute(AttributeDecl::new(ATTR_ON_OFF, AttrType::Boolean))
        .attribute(AttributeDecl::new(ATTR_LIST, AttrType::Array))
        .attribute(
            AttributeDecl::new(ATTR_TIMED, AttrType::Int8u)
                .writable()
                .timed_write(),
        )
        .accepts(CommandDecl::new(2))
        .accepts(CommandDecl::new(0))
        .accepts(CommandDecl::new(1).timed().privilege(Privilege::Manage))
}

/// Endpoints 0..=3: root, an enabled light (with a client-only cluster
/// declared first), a disabled light and the shim target.
pub fn registry() -> Registry {
    let root = EndpointDecl::new(0)
        .device_type(DEV_TYPE_ROOT_NODE)
        .cluster(
            ClusterDecl::server(DESCRIPTOR)
                .attribute(AttributeDecl::new(0x0003, AttrType::Array)),
        )
        .cluster(
            ClusterDecl::server(BASIC_INFO)
                .attribute(AttributeDecl::new(0x0001, AttrType::CharString).default_value("acme"))
                .attribute(AttributeDecl::new(0x0005, AttrType::CharString).writable()),
        );

    let light = EndpointDecl::new(LIGHT_EP)
        .parent(0)
        .device_type(DEV_TYPE_ON_OFF_LIGHT)
        .device_type(DEV_TYPE_BRIDGED_NODE)
        .cluster(ClusterDecl::client(CLIENT_ONLY))
        .cluster(on_off_cluster())
        .cluster(
            ClusterDecl::server(LEVEL)
                .attribute(AttributeDecl::new(0x0000, AttrType::Int8u).nullable())
                .accepts(CommandDecl::new(0))
                .generates(0x0A),
        );

    let disabled = EndpointDecl::new(DISABLED_EP)
        .parent(0)
        .disabled()
        .device_type(DEV_TYPE_ON_OFF_LIGHT)
        .cluster(
            ClusterDecl::server(ON_OFF)
                .attribute(AttributeDecl::new(ATTR_ON_OFF, AttrType::Boolean)),
        );

    let shim_target = EndpointDecl::new(SHIM_EP).parent(0).cluster(
        ClusterDecl::server(SHIM_CLUSTER)
            .data_version(SHIM_DATAVER)
            .attribute(AttributeDecl::new(ATTR_X, AttrType::CharString).writable())
            .accepts(CommandDecl::new(0x10))
            .accepts(CommandDecl::new(0x11))
            .generates(0x20),
    );

    match Registry::new(vec![root, light, disabled, shim_target]) {
        Ok(registry) => registry,
        Err(e) => panic!("fixture registry is invalid: {}", e),
    }
}

pub fn legacy() -> LegacyDataModel {
    LegacyDataModel::new(
        Arc::new(registry()),
        Arc::new(MemoryStorage::new()),
        Arc::new(RecordingDispatch::default()),
    )
}

/// Memory storage that counts how often it was consulted.
#[derive(Default)]
pub struct CountingStorage {
    inner: MemoryStorage,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl CountingStorage {
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl AttributeStorage for CountingStorage {
    fn read(
        &self,
        path: &AttrPath,
        metadata: &AttributeMetadata,
        encoder: &mut AttributeValueEncoder,
    ) -> Status {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.read(path, metadata, encoder)
    }

    fn write(
        &self,
        path: &AttrPath,
        metadata: &AttributeMetadata,
        decoder: &mut AttributeValueDecoder,
    ) -> Status {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.write(path, metadata, decoder)
    }
}

/// Dispatch that records every call and acknowledges it.
#[derive(Default)]
pub struct RecordingDispatch {
    calls: Mutex<Vec<CmdPath>>,
}

impl RecordingDispatch {
    pub fn calls(&self) -> Vec<CmdPath> {
        self.calls.lock().clone()
    }
}

impl CommandDispatch for RecordingDispatch {
    fn dispatch(&self, path: &CmdPath, _args: &Value, responder: &mut dyn CommandResponder) {
        self.calls.lock().push(*path);
        responder.add_status(path, Status::Success);
    }
}
