//! Registry-backed attribute storage and command dispatch.
//!
//! The registry only describes clusters; their values live behind
//! [`AttributeStorage`] and their command behavior behind a single
//! [`CommandDispatch`] entry point. Both report outcomes as a protocol
//! [`Status`], never as a Rust error.

use super::invoke::{CommandResponder, WriteAttributeRequest};
use super::metadata::GlobalAttribute;
use super::registry::{AttrType, AttributeMask, AttributeMetadata, Cluster, Registry};
use super::status::Status;
use super::types::{AttrPath, ClusterPath, CmdPath, Value};
use crate::error::{ProviderError, Result};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Output side of an attribute read.
#[derive(Debug)]
pub struct AttributeValueEncoder {
    path: AttrPath,
    data_version: u32,
    value: Option<Value>,
}

impl AttributeValueEncoder {
    pub fn new(path: AttrPath) -> Self {
        Self {
            path,
            data_version: 0,
            value: None,
        }
    }

    pub fn path(&self) -> &AttrPath {
        &self.path
    }

    pub fn data_version(&self) -> u32 {
        self.data_version
    }

    pub fn set_data_version(&mut self, data_version: u32) {
        self.data_version = data_version;
    }

    pub fn encode(&mut self, value: Value) {
        self.value = Some(value);
    }

    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    pub fn into_value(self) -> Option<Value> {
        self.value
    }
}

/// Input side of an attribute write.
#[derive(Debug)]
pub struct AttributeValueDecoder {
    value: Value,
    tried: bool,
}

impl AttributeValueDecoder {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            tried: false,
        }
    }

    pub fn decode(&mut self) -> &Value {
        self.tried = true;
        &self.value
    }

    /// Whether anyone looked at the incoming value.
    pub fn tried_decode(&self) -> bool {
        self.tried
    }
}

/// Type-directed storage for registry-declared attributes.
pub trait AttributeStorage: Send + Sync {
    fn read(
        &self,
        path: &AttrPath,
        metadata: &AttributeMetadata,
        encoder: &mut AttributeValueEncoder,
    ) -> Status;

    fn write(
        &self,
        path: &AttrPath,
        metadata: &AttributeMetadata,
        decoder: &mut AttributeValueDecoder,
    ) -> Status;
}

/// The single entry point resolving a command path to built-in behavior.
///
/// There is no return value; the outcome is reported through `responder`.
pub trait CommandDispatch: Send + Sync {
    fn dispatch(&self, path: &CmdPath, args: &Value, responder: &mut dyn CommandResponder);
}

/// Dispatch that acknowledges every command with `Success`.
#[derive(Debug, Default)]
pub struct AcknowledgingDispatch;

impl CommandDispatch for AcknowledgingDispatch {
    fn dispatch(&self, path: &CmdPath, args: &Value, responder: &mut dyn CommandResponder) {
        info!("Command {} invoked with {:?}", path, args);
        responder.add_status(path, Status::Success);
    }
}

/// In-memory attribute values, validated against the declared type.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: RwLock<HashMap<AttrPath, Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &AttrPath) -> Option<Value> {
        self.values.read().get(path).cloned()
    }
}

impl AttributeStorage for MemoryStorage {
    fn read(
        &self,
        path: &AttrPath,
        metadata: &AttributeMetadata,
        encoder: &mut AttributeValueEncoder,
    ) -> Status {
        let value = self
            .get(path)
            .or_else(|| metadata.default.clone())
            .unwrap_or_else(|| zero_value(metadata.attr_type));
        encoder.encode(value);
        Status::Success
    }

    fn write(
        &self,
        path: &AttrPath,
        metadata: &AttributeMetadata,
        decoder: &mut AttributeValueDecoder,
    ) -> Status {
        let value = decoder.decode();
        let status = check_value(metadata, value);
        if !status.is_success() {
            debug!("Rejected write to {}: {} ({:?})", path, status, value);
            return status;
        }

        self.values.write().insert(*path, value.clone());
        Status::Success
    }
}

fn zero_value(attr_type: AttrType) -> Value {
    match attr_type {
        AttrType::Boolean => Value::Bool(false),
        AttrType::Int8s | AttrType::Int16s | AttrType::Int32s | AttrType::Int64s => {
            Value::Signed(0)
        }
        AttrType::Single | AttrType::Double => Value::Float(0.0),
        AttrType::CharString => Value::Utf8(String::new()),
        AttrType::Array | AttrType::Struct => Value::List(Vec::new()),
        _ => Value::Unsigned(0),
    }
}

fn check_value(metadata: &AttributeMetadata, value: &Value) -> Status {
    if *value == Value::Null {
        return if metadata.mask.contains(AttributeMask::NULLABLE) {
            Status::Success
        } else {
            Status::ConstraintError
        };
    }

    match metadata.attr_type {
        AttrType::Boolean => match value {
            Value::Bool(_) => Status::Success,
            _ => Status::InvalidDataType,
        },
        AttrType::Int8u | AttrType::Enum8 | AttrType::Bitmap8 => unsigned_within(value, 8),
        AttrType::Int16u | AttrType::Enum16 | AttrType::Bitmap16 => unsigned_within(value, 16),
        AttrType::Int32u | AttrType::Bitmap32 => unsigned_within(value, 32),
        AttrType::Int64u => unsigned_within(value, 64),
        AttrType::Int8s => signed_within(value, 8),
        AttrType::Int16s => signed_within(value, 16),
        AttrType::Int32s => signed_within(value, 32),
        AttrType::Int64s => signed_within(value, 64),
        AttrType::Single | AttrType::Double => match value {
            Value::Float(_) | Value::Unsigned(_) | Value::Signed(_) => Status::Success,
            _ => Status::InvalidDataType,
        },
        AttrType::CharString => match value {
            Value::Utf8(s) if s.len() <= usize::from(metadata.size) => Status::Success,
            Value::Utf8(_) => Status::ConstraintError,
            _ => Status::InvalidDataType,
        },
        AttrType::Array | AttrType::Struct => match value {
            Value::List(_) => Status::Success,
            _ => Status::InvalidDataType,
        },
    }
}

fn unsigned_within(value: &Value, bits: u32) -> Status {
    let max = u64::MAX >> (64 - bits);
    match value {
        Value::Unsigned(_) | Value::Signed(_) => match value.as_u64() {
            Some(v) if v <= max => Status::Success,
            _ => Status::ConstraintError,
        },
        _ => Status::InvalidDataType,
    }
}

fn signed_within(value: &Value, bits: u32) -> Status {
    let max = i64::MAX >> (64 - bits);
    let min = -max - 1;
    let v = match value {
        Value::Signed(v) => i128::from(*v),
        Value::Unsigned(v) => i128::from(*v),
        _ => return Status::InvalidDataType,
    };
    if (i128::from(min)..=i128::from(max)).contains(&v) {
        Status::Success
    } else {
        Status::ConstraintError
    }
}

fn id_list(ids: impl IntoIterator<Item = u32>) -> Value {
    Value::List(ids.into_iter().map(|id| Value::Unsigned(u64::from(id))).collect())
}

/// Value of a synthesized global list attribute.
fn global_list(cluster: &Cluster, global: GlobalAttribute) -> Option<Value> {
    match global {
        GlobalAttribute::GeneratedCmdList => {
            Some(id_list(cluster.generated_commands.iter().copied()))
        }
        GlobalAttribute::AcceptedCmdList => {
            Some(id_list(cluster.accepted_commands.iter().copied()))
        }
        GlobalAttribute::AttributeList => Some(id_list(
            cluster
                .attributes
                .iter()
                .map(|attr| attr.id)
                .chain(GlobalAttribute::TRAILING_LISTS.iter().map(|global| global.id())),
        )),
        _ => None,
    }
}

/// The registry plus its storage and dispatch collaborators.
pub struct LegacyDataModel {
    registry: Arc<Registry>,
    storage: Arc<dyn AttributeStorage>,
    dispatch: Arc<dyn CommandDispatch>,
}

impl LegacyDataModel {
    pub fn new(
        registry: Arc<Registry>,
        storage: Arc<dyn AttributeStorage>,
        dispatch: Arc<dyn CommandDispatch>,
    ) -> Self {
        Self {
            registry,
            storage,
            dispatch,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// A server-role cluster on an enabled endpoint.
    pub fn cluster(&self, path: &ClusterPath) -> Result<&Cluster> {
        if !path.is_valid() {
            return Err(ProviderError::InvalidPath(path.to_string()));
        }

        let endpoint = self
            .registry
            .endpoint(path.endpoint_id)
            .filter(|ep| ep.is_enabled())
            .ok_or(ProviderError::EndpointNotFound(path.endpoint_id))?;

        endpoint
            .cluster(path.cluster_id)
            .filter(|cluster| cluster.is_server())
            .ok_or(ProviderError::ClusterNotFound(*path))
    }

    pub fn resolve(&self, path: &AttrPath) -> Result<(&Cluster, &AttributeMetadata)> {
        let cluster = self.cluster(&path.cluster())?;
        let metadata = cluster
            .attribute(path.attr_id)
            .ok_or(ProviderError::AttributeNotFound(*path))?;
        Ok((cluster, metadata))
    }

    pub fn read_attribute(
        &self,
        path: &AttrPath,
        encoder: &mut AttributeValueEncoder,
    ) -> Result<()> {
        let cluster = self.cluster(&path.cluster())?;
        encoder.set_data_version(cluster.dataver().get());

        if let Some(value) =
            GlobalAttribute::from_repr(path.attr_id).and_then(|global| global_list(cluster, global))
        {
            encoder.encode(value);
            return Ok(());
        }

        let metadata = cluster
            .attribute(path.attr_id)
            .ok_or(ProviderError::AttributeNotFound(*path))?;
        self.storage.read(path, metadata, encoder).into_result()
    }

    /// Checks access qualities, then hands the value to storage. Data
    /// versions are left to the caller.
    pub fn write_attribute(
        &self,
        request: &WriteAttributeRequest,
        decoder: &mut AttributeValueDecoder,
    ) -> Result<()> {
        let path = &request.path;
        let cluster = self.cluster(&path.cluster())?;

        let Some(metadata) = cluster.attribute(path.attr_id) else {
            return Err(match GlobalAttribute::from_repr(path.attr_id) {
                Some(_) => ProviderError::UnsupportedWrite(*path),
                None => ProviderError::AttributeNotFound(*path),
            });
        };

        if !metadata.is_writable() {
            warn!("Write to read-only attribute {}", path);
            return Err(ProviderError::UnsupportedWrite(*path));
        }
        if metadata.mask.contains(AttributeMask::TIMED_WRITE) && !request.timed {
            warn!("Untimed write to {}", path);
            return Err(ProviderError::NeedsTimedInteraction(*path));
        }

        self.storage.write(path, metadata, decoder).into_result()
    }

    pub fn dispatch(&self, path: &CmdPath, args: &Value, responder: &mut dyn CommandResponder) {
        debug!("Legacy dispatch of {}", path);
        self.dispatch.dispatch(path, args, responder);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matter::testing::{self, ATTR_LABEL, ATTR_LIST, ATTR_ON_OFF, ATTR_TIMED, ON_OFF};

    fn label() -> AttrPath {
        AttrPath::new(1, ON_OFF, ATTR_LABEL)
    }

    #[test]
    fn test_read_falls_back_to_zero_value() {
        let legacy = testing::legacy();
        let mut encoder = AttributeValueEncoder::new(AttrPath::new(1, ON_OFF, ATTR_ON_OFF));
        legacy
            .read_attribute(&AttrPath::new(1, ON_OFF, ATTR_ON_OFF), &mut encoder)
            .unwrap();
        assert_eq!(encoder.value(), Some(&Value::Bool(false)));
        assert_eq!(encoder.data_version(), testing::ON_OFF_DATAVER);
    }

    #[test]
    fn test_write_then_read() {
        let legacy = testing::legacy();
        let mut decoder = AttributeValueDecoder::new("kitchen");
        legacy
            .write_attribute(&WriteAttributeRequest::new(label()), &mut decoder)
            .unwrap();
        assert!(decoder.tried_decode());

        let mut encoder = AttributeValueEncoder::new(label());
        legacy.read_attribute(&label(), &mut encoder).unwrap();
        assert_eq!(encoder.into_value(), Some(Value::from("kitchen")));
    }

    #[test]
    fn test_write_checks() {
        let legacy = testing::legacy();

        let read_only = WriteAttributeRequest::new(AttrPath::new(1, ON_OFF, ATTR_ON_OFF));
        let err = legacy
            .write_attribute(&read_only, &mut AttributeValueDecoder::new(true))
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedWrite(_)));

        let timed = AttrPath::new(1, ON_OFF, ATTR_TIMED);
        let err = legacy
            .write_attribute(
                &WriteAttributeRequest::new(timed),
                &mut AttributeValueDecoder::new(5u64),
            )
            .unwrap_err();
        assert_eq!(err.status(), Status::NeedsTimedInteraction);
        legacy
            .write_attribute(
                &WriteAttributeRequest::new(timed).timed(),
                &mut AttributeValueDecoder::new(5u64),
            )
            .unwrap();

        let global = AttrPath::new(1, ON_OFF, GlobalAttribute::AttributeList.id());
        let err = legacy
            .write_attribute(
                &WriteAttributeRequest::new(global),
                &mut AttributeValueDecoder::new(Value::List(vec![])),
            )
            .unwrap_err();
        assert!(matches!(err, ProviderError::UnsupportedWrite(_)));
    }

    #[test]
    fn test_type_directed_validation() {
        let legacy = testing::legacy();
        let write = |path: AttrPath, value: Value| {
            legacy
                .write_attribute(
                    &WriteAttributeRequest::new(path).timed(),
                    &mut AttributeValueDecoder::new(value),
                )
                .map_err(|err| err.status())
        };

        // Label is bounded to 16 bytes
        assert_eq!(
            write(label(), Value::from("a label that is far too long")),
            Err(Status::ConstraintError)
        );
        assert_eq!(write(label(), Value::Unsigned(1)), Err(Status::InvalidDataType));
        assert_eq!(write(label(), Value::Null), Err(Status::ConstraintError));

        let timed = AttrPath::new(1, ON_OFF, ATTR_TIMED);
        assert_eq!(write(timed, Value::Unsigned(256)), Err(Status::ConstraintError));
        assert_eq!(write(timed, Value::Signed(-1)), Err(Status::ConstraintError));
        assert_eq!(write(timed, Value::Unsigned(255)), Ok(()));
    }

    #[test]
    fn test_signed_and_unsigned_bounds() {
        assert_eq!(signed_within(&Value::Signed(-128), 8), Status::Success);
        assert_eq!(signed_within(&Value::Signed(-129), 8), Status::ConstraintError);
        assert_eq!(signed_within(&Value::Unsigned(127), 8), Status::Success);
        assert_eq!(signed_within(&Value::Unsigned(u64::MAX), 64), Status::ConstraintError);
        assert_eq!(unsigned_within(&Value::Unsigned(u64::MAX), 64), Status::Success);
        assert_eq!(unsigned_within(&Value::Float(1.0), 8), Status::InvalidDataType);
    }

    #[test]
    fn test_global_lists() {
        let legacy = testing::legacy();
        let path = AttrPath::new(1, ON_OFF, GlobalAttribute::AcceptedCmdList.id());
        let mut encoder = AttributeValueEncoder::new(path);
        legacy.read_attribute(&path, &mut encoder).unwrap();
        assert_eq!(
            encoder.value(),
            Some(&Value::List(vec![
                Value::Unsigned(2),
                Value::Unsigned(0),
                Value::Unsigned(1)
            ]))
        );

        let path = AttrPath::new(1, ON_OFF, GlobalAttribute::AttributeList.id());
        let mut encoder = AttributeValueEncoder::new(path);
        legacy.read_attribute(&path, &mut encoder).unwrap();
        let Some(Value::List(ids)) = encoder.into_value() else {
            panic!("attribute list is not a list");
        };
        assert_eq!(ids.len(), 4 + 3);
        assert_eq!(ids[2], Value::Unsigned(u64::from(ATTR_LIST)));
        assert_eq!(ids[6], Value::Unsigned(0xFFFB));
    }

    #[test]
    fn test_resolve_failures() {
        let legacy = testing::legacy();
        let err = legacy.resolve(&AttrPath::new(0x77, ON_OFF, 0)).unwrap_err();
        assert!(matches!(err, ProviderError::EndpointNotFound(0x77)));

        let err = legacy
            .resolve(&AttrPath::new(testing::DISABLED_EP, ON_OFF, 0))
            .unwrap_err();
        assert!(err.is_not_found());

        let err = legacy
            .resolve(&AttrPath::new(1, testing::CLIENT_ONLY, 0))
            .unwrap_err();
        assert!(matches!(err, ProviderError::ClusterNotFound(_)));

        let err = legacy
            .resolve(&AttrPath::new(1, crate::matter::types::INVALID_CLUSTER_ID, 0))
            .unwrap_err();
        assert_eq!(err.status(), Status::InvalidAction);
    }
}
