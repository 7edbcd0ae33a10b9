//! Device type definitions and the built-in sample node.
//!
//! The sample node is what the CLI serves when no registry description is
//! given: a root node, an aggregator, and two bridged devices below it.

use super::metadata::{Composition, DeviceTypeEntry, Privilege};
use super::registry::{AttrType, AttributeDecl, ClusterDecl, CommandDecl, EndpointDecl};
use super::types::{ClusterId, ClusterPath, EndptId};

/// Matter Root Node device type
///
/// Device Type ID: 0x0016 (22 decimal)
/// Device Type Revision: 1
pub const DEV_TYPE_ROOT_NODE: DeviceTypeEntry = DeviceTypeEntry::new(0x0016, 1);

/// Matter Aggregator device type (for bridge root)
///
/// Device Type ID: 0x000E (14 decimal)
/// Device Type Revision: 1
///
/// Used as the bridge aggregator endpoint that enumerates bridged devices.
pub const DEV_TYPE_AGGREGATOR: DeviceTypeEntry = DeviceTypeEntry::new(0x000E, 1);

/// Matter Bridged Node device type
///
/// Device Type ID: 0x0013 (19 decimal)
/// Device Type Revision: 1
///
/// Added to bridged device endpoints alongside their functional device type.
pub const DEV_TYPE_BRIDGED_NODE: DeviceTypeEntry = DeviceTypeEntry::new(0x0013, 1);

/// Matter On/Off Light device type
///
/// Device Type ID: 0x0100 (256 decimal)
/// Device Type Revision: 2
pub const DEV_TYPE_ON_OFF_LIGHT: DeviceTypeEntry = DeviceTypeEntry::new(0x0100, 2);

/// Matter Contact Sensor device type
///
/// Device Type ID: 0x0015 (21 decimal)
/// Device Type Revision: 1
///
/// Used for binary sensors (open/closed, true/false states).
pub const DEV_TYPE_CONTACT_SENSOR: DeviceTypeEntry = DeviceTypeEntry::new(0x0015, 1);

pub const CLUSTER_IDENTIFY: ClusterId = 0x0003;
pub const CLUSTER_ON_OFF: ClusterId = 0x0006;
pub const CLUSTER_DESCRIPTOR: ClusterId = 0x001D;
pub const CLUSTER_BASIC_INFORMATION: ClusterId = 0x0028;
pub const CLUSTER_BRIDGED_DEVICE_BASIC_INFORMATION: ClusterId = 0x0039;
pub const CLUSTER_BOOLEAN_STATE: ClusterId = 0x0045;

pub const ROOT_ENDPOINT: EndptId = 0;
pub const AGGREGATOR_ENDPOINT: EndptId = 1;
pub const LIGHT_ENDPOINT: EndptId = 2;
pub const CONTACT_ENDPOINT: EndptId = 3;

/// The sample light's On/Off cluster, served through the compatibility shim
/// by default.
pub const SAMPLE_SHIM_PATH: ClusterPath = ClusterPath::new(LIGHT_ENDPOINT, CLUSTER_ON_OFF);

fn descriptor() -> ClusterDecl {
    ClusterDecl::server(CLUSTER_DESCRIPTOR)
        .revision(2)
        .attribute(AttributeDecl::new(0x0000, AttrType::Array))
        .attribute(AttributeDecl::new(0x0001, AttrType::Array))
        .attribute(AttributeDecl::new(0x0002, AttrType::Array))
        .attribute(AttributeDecl::new(0x0003, AttrType::Array))
}

fn identify() -> ClusterDecl {
    ClusterDecl::server(CLUSTER_IDENTIFY)
        .revision(4)
        .attribute(AttributeDecl::new(0x0000, AttrType::Int16u).writable())
        .attribute(AttributeDecl::new(0x0001, AttrType::Enum8).default_value(0u64))
        .accepts(CommandDecl::new(0x00).privilege(Privilege::Manage))
        .accepts(CommandDecl::new(0x40).privilege(Privilege::Manage))
}

fn bridged_basic_information(label: &str) -> ClusterDecl {
    ClusterDecl::server(CLUSTER_BRIDGED_DEVICE_BASIC_INFORMATION)
        .revision(4)
        .attribute(
            AttributeDecl::new(0x0005, AttrType::CharString)
                .writable()
                .size(32)
                .default_value(label),
        )
        .attribute(AttributeDecl::new(0x0011, AttrType::Boolean).default_value(true))
}

/// Root node, aggregator, a bridged on/off light and a bridged contact
/// sensor.
pub fn sample_node() -> Vec<EndpointDecl> {
    let root = EndpointDecl::new(ROOT_ENDPOINT)
        .device_type(DEV_TYPE_ROOT_NODE)
        .cluster(descriptor())
        .cluster(
            ClusterDecl::server(CLUSTER_BASIC_INFORMATION)
                .revision(3)
                .attribute(AttributeDecl::new(0x0000, AttrType::Int16u).default_value(17u64))
                .attribute(
                    AttributeDecl::new(0x0001, AttrType::CharString)
                        .size(32)
                        .default_value("Virtual Matter Bridge"),
                )
                .attribute(AttributeDecl::new(0x0002, AttrType::Int16u).default_value(0xFFF1u64))
                .attribute(
                    AttributeDecl::new(0x0005, AttrType::CharString)
                        .writable()
                        .size(32),
                ),
        );

    let aggregator = EndpointDecl::new(AGGREGATOR_ENDPOINT)
        .parent(ROOT_ENDPOINT)
        .composition(Composition::FullFamily)
        .device_type(DEV_TYPE_AGGREGATOR)
        .cluster(descriptor());

    let light = EndpointDecl::new(LIGHT_ENDPOINT)
        .parent(AGGREGATOR_ENDPOINT)
        .device_type(DEV_TYPE_ON_OFF_LIGHT)
        .device_type(DEV_TYPE_BRIDGED_NODE)
        .cluster(descriptor())
        .cluster(identify())
        .cluster(
            ClusterDecl::server(CLUSTER_ON_OFF)
                .revision(6)
                .feature_map(0x01)
                .attribute(AttributeDecl::new(0x0000, AttrType::Boolean).default_value(false))
                .attribute(AttributeDecl::new(0x4000, AttrType::Boolean).default_value(true))
                .attribute(AttributeDecl::new(0x4001, AttrType::Int16u).writable())
                .attribute(AttributeDecl::new(0x4002, AttrType::Int16u).writable())
                .attribute(
                    AttributeDecl::new(0x4003, AttrType::Enum8)
                        .writable()
                        .nullable(),
                )
                .accepts(CommandDecl::new(0x00))
                .accepts(CommandDecl::new(0x01))
                .accepts(CommandDecl::new(0x02)),
        )
        .cluster(bridged_basic_information("Porch Light"));

    let contact = EndpointDecl::new(CONTACT_ENDPOINT)
        .parent(AGGREGATOR_ENDPOINT)
        .device_type(DEV_TYPE_CONTACT_SENSOR)
        .device_type(DEV_TYPE_BRIDGED_NODE)
        .cluster(descriptor())
        .cluster(identify())
        .cluster(
            ClusterDecl::server(CLUSTER_BOOLEAN_STATE)
                .attribute(AttributeDecl::new(0x0000, AttrType::Boolean).default_value(false)),
        )
        .cluster(bridged_basic_information("Front Door"));

    vec![root, aggregator, light, contact]
}
