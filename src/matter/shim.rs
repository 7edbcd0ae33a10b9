//! Compatibility shim serving registry clusters as one [`ServerCluster`].
//!
//! The shim owns an explicit allow-list of registry paths. Everything
//! addressed to an allow-listed path is forwarded verbatim to the registry's
//! storage and dispatch entry points; anything else is refused before a
//! collaborator is touched. Data versions for the allow-listed paths belong
//! to the shim, not to the registry.

use super::cluster::{ServerCluster, ServerClusterContext};
use super::invoke::{CommandResponder, InvokeRequest, WriteAttributeRequest};
use super::legacy::{AttributeValueDecoder, AttributeValueEncoder, LegacyDataModel};
use super::metadata::{AttributeEntry, AttributeInfo, ClusterInfo, CommandEntry, GlobalAttribute};
use super::status::Status;
use super::types::{AttrPath, ClusterPath, CmdId, Dataver, Value};
use crate::error::{ProviderError, Result};
use log::{debug, info, warn};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct ClusterShim {
    legacy: Arc<LegacyDataModel>,
    paths: Vec<ClusterPath>,
    versions: Vec<Dataver>,
    context: RwLock<Option<ServerClusterContext>>,
    dispatches: AtomicUsize,
}

impl ClusterShim {
    /// Serve `paths` (duplicates dropped, order kept). Nothing is read from
    /// storage until [`ServerCluster::startup`].
    pub fn new(legacy: Arc<LegacyDataModel>, paths: impl IntoIterator<Item = ClusterPath>) -> Self {
        let mut unique: Vec<ClusterPath> = Vec::new();
        for path in paths {
            if !unique.contains(&path) {
                unique.push(path);
            }
        }

        // Continue from the registry's counter so peers holding a version
        // from before the handover see a change
        let versions = unique
            .iter()
            .map(|path| {
                legacy
                    .registry()
                    .endpoint(path.endpoint_id)
                    .and_then(|ep| ep.cluster(path.cluster_id))
                    .map_or_else(Dataver::new_rand, |cluster| {
                        Dataver::new(cluster.dataver().get())
                    })
            })
            .collect();

        Self {
            legacy,
            paths: unique,
            versions,
            context: RwLock::new(None),
            dispatches: AtomicUsize::new(0),
        }
    }

    pub fn is_started(&self) -> bool {
        self.context.read().is_some()
    }

    /// Number of invokes forwarded to the registry dispatch.
    pub fn dispatch_count(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }

    fn started(&self) -> Result<ServerClusterContext> {
        self.context.read().clone().ok_or(ProviderError::NotStarted)
    }

    fn index_of(&self, path: &ClusterPath) -> Option<usize> {
        self.paths.iter().position(|p| p == path)
    }

    /// Started first, then allow-listed.
    fn gate(&self, path: &ClusterPath) -> Result<(usize, ServerClusterContext)> {
        let context = self.started()?;
        let index = self
            .index_of(path)
            .ok_or(ProviderError::ClusterNotFound(*path))?;
        Ok((index, context))
    }

    fn version_key(path: &ClusterPath) -> String {
        format!("dv/{}/{}", path.endpoint_id, path.cluster_id)
    }
}

impl ServerCluster for ClusterShim {
    fn paths(&self) -> &[ClusterPath] {
        &self.paths
    }

    fn startup(&self, context: &ServerClusterContext) -> Result<()> {
        let mut slot = self.context.write();
        if slot.is_some() {
            return Err(ProviderError::AlreadyStarted);
        }

        for (path, version) in self.paths.iter().zip(&self.versions) {
            let Some(stored) = context.storage.get(&Self::version_key(path)) else {
                continue;
            };
            match stored.parse::<u32>() {
                Ok(value) => version.set(value),
                Err(e) => warn!("Ignoring stored data version for {}: {}", path, e),
            }
        }

        *slot = Some(context.clone());
        info!("Cluster shim started for {} path(s)", self.paths.len());
        Ok(())
    }

    fn data_version(&self, path: &ClusterPath) -> Result<u32> {
        let (index, _) = self.gate(path)?;
        Ok(self.versions[index].get())
    }

    fn cluster_info(&self, path: &ClusterPath) -> Result<ClusterInfo> {
        let (index, _) = self.gate(path)?;
        let cluster = self.legacy.cluster(path)?;
        Ok(ClusterInfo {
            data_version: self.versions[index].get(),
            ..cluster.info()
        })
    }

    fn read_attribute(&self, path: &AttrPath, encoder: &mut AttributeValueEncoder) -> Result<()> {
        let (index, _) = self.gate(&path.cluster())?;
        self.legacy.read_attribute(path, encoder)?;
        encoder.set_data_version(self.versions[index].get());
        Ok(())
    }

    fn write_attribute(
        &self,
        request: &WriteAttributeRequest,
        decoder: &mut AttributeValueDecoder,
    ) -> Result<()> {
        let cluster_path = request.path.cluster();
        let (index, context) = self.gate(&cluster_path)?;
        self.legacy.write_attribute(request, decoder)?;

        let version = self.versions[index].changed();
        if let Err(e) = context
            .storage
            .set(&Self::version_key(&cluster_path), version.to_string())
        {
            warn!("Failed to persist data version for {}: {}", cluster_path, e);
        }
        context.notify.attribute_changed(&request.path);
        Ok(())
    }

    fn invoke_command(
        &self,
        request: &InvokeRequest,
        args: &Value,
        responder: &mut dyn CommandResponder,
    ) -> Result<Option<Status>> {
        self.started()?;
        if self.index_of(&request.path.cluster()).is_none() {
            debug!("Refusing invoke outside the allow-list: {}", request.path);
            return Ok(Some(Status::Failure));
        }

        self.legacy.dispatch(&request.path, args, responder);
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }

    fn attributes(&self, path: &ClusterPath, out: &mut Vec<AttributeEntry>) -> Result<()> {
        self.gate(path)?;
        let cluster = self.legacy.cluster(path)?;

        out.extend(cluster.attributes.iter().map(|attr| AttributeEntry {
            path: path.attribute(attr.id),
            info: attr.info(),
        }));
        out.extend(
            GlobalAttribute::TRAILING_LISTS
                .iter()
                .map(|global| AttributeEntry {
                    path: path.attribute(global.id()),
                    info: AttributeInfo::global_list(),
                }),
        );
        Ok(())
    }

    fn accepted_commands(&self, path: &ClusterPath, out: &mut Vec<CommandEntry>) -> Result<()> {
        self.gate(path)?;
        let cluster = self.legacy.cluster(path)?;
        out.extend(
            cluster
                .accepted_commands
                .iter()
                .enumerate()
                .map(|(index, id)| CommandEntry {
                    path: path.command(*id),
                    info: cluster.command_info_at(index).unwrap_or_default(),
                }),
        );
        Ok(())
    }

    fn generated_commands(&self, path: &ClusterPath, out: &mut Vec<CmdId>) -> Result<()> {
        self.gate(path)?;
        let cluster = self.legacy.cluster(path)?;
        out.extend_from_slice(&cluster.generated_commands);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matter::cluster::ChangeLog;
    use crate::matter::invoke::ResponseCollector;
    use crate::matter::persistence::{KeyValueStore, MemoryStore};
    use crate::matter::testing::{self, ATTR_X, SHIM_CLUSTER, SHIM_EP};
    use crate::matter::types::CmdPath;

    const SHIM_PATH: ClusterPath = ClusterPath::new(SHIM_EP, SHIM_CLUSTER);

    fn attr_x() -> AttrPath {
        SHIM_PATH.attribute(ATTR_X)
    }

    struct Harness {
        shim: ClusterShim,
        storage: Arc<testing::CountingStorage>,
        dispatch: Arc<testing::RecordingDispatch>,
        store: Arc<MemoryStore>,
        changes: Arc<ChangeLog>,
    }

    fn harness(paths: &[ClusterPath]) -> Harness {
        let storage = Arc::new(testing::CountingStorage::default());
        let dispatch = Arc::new(testing::RecordingDispatch::default());
        let legacy = Arc::new(LegacyDataModel::new(
            Arc::new(testing::registry()),
            storage.clone(),
            dispatch.clone(),
        ));
        Harness {
            shim: ClusterShim::new(legacy, paths.iter().copied()),
            storage,
            dispatch,
            store: Arc::new(MemoryStore::new()),
            changes: Arc::new(ChangeLog::new()),
        }
    }

    impl Harness {
        fn start(&self) {
            let context = ServerClusterContext::new(self.store.clone(), self.changes.clone());
            self.shim.startup(&context).unwrap();
        }

        fn write(&self, path: AttrPath, value: impl Into<Value>) -> Result<()> {
            self.shim.write_attribute(
                &WriteAttributeRequest::new(path),
                &mut AttributeValueDecoder::new(value),
            )
        }

        fn read(&self, path: AttrPath) -> Result<Value> {
            let mut encoder = AttributeValueEncoder::new(path);
            self.shim.read_attribute(&path, &mut encoder)?;
            Ok(encoder.into_value().unwrap_or(Value::Null))
        }
    }

    #[test]
    fn test_write_round_trip() {
        let h = harness(&[SHIM_PATH]);
        h.start();
        let initial = h.shim.data_version(&SHIM_PATH).unwrap();
        assert_eq!(initial, testing::SHIM_DATAVER);

        h.write(attr_x(), "hello world").unwrap();
        assert_eq!(h.read(attr_x()).unwrap(), Value::from("hello world"));
        assert_eq!(h.shim.data_version(&SHIM_PATH).unwrap(), initial.wrapping_add(1));

        assert_eq!(h.changes.changes(), vec![attr_x()]);
        assert_eq!(
            h.store.get("dv/3/4").as_deref(),
            Some(initial.wrapping_add(1).to_string().as_str())
        );
    }

    #[test]
    fn test_out_of_scope_path() {
        let h = harness(&[ClusterPath::new(1, 1)]);
        h.start();

        let err = h.write(attr_x(), "anything").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(h.storage.writes(), 0);

        assert!(h.read(attr_x()).unwrap_err().is_not_found());
        assert_eq!(h.storage.reads(), 0);

        let mut out = Vec::new();
        assert!(h.shim.attributes(&SHIM_PATH, &mut out).is_err());
        let mut commands = Vec::new();
        assert!(h.shim.accepted_commands(&SHIM_PATH, &mut commands).is_err());
        let mut generated = Vec::new();
        assert!(h.shim.generated_commands(&SHIM_PATH, &mut generated).is_err());
        assert!(out.is_empty() && commands.is_empty() && generated.is_empty());

        let mut collector = ResponseCollector::new();
        let request = InvokeRequest::new(SHIM_PATH.command(0x10));
        let status = h
            .shim
            .invoke_command(&request, &Value::Null, &mut collector)
            .unwrap();
        assert_eq!(status, Some(Status::Failure));
        assert_eq!(h.dispatch.calls().len(), 0);
        assert_eq!(h.shim.dispatch_count(), 0);
    }

    #[test]
    fn test_unstarted_fails_fast() {
        let h = harness(&[SHIM_PATH]);
        assert!(!h.shim.is_started());

        assert!(matches!(h.write(attr_x(), "x"), Err(ProviderError::NotStarted)));
        assert!(matches!(h.read(attr_x()), Err(ProviderError::NotStarted)));
        assert!(matches!(
            h.shim.data_version(&SHIM_PATH),
            Err(ProviderError::NotStarted)
        ));
        assert!(matches!(
            h.shim.cluster_info(&SHIM_PATH),
            Err(ProviderError::NotStarted)
        ));

        let mut out = Vec::new();
        assert!(matches!(
            h.shim.attributes(&SHIM_PATH, &mut out),
            Err(ProviderError::NotStarted)
        ));

        let mut collector = ResponseCollector::new();
        let request = InvokeRequest::new(SHIM_PATH.command(0x10));
        assert!(matches!(
            h.shim.invoke_command(&request, &Value::Null, &mut collector),
            Err(ProviderError::NotStarted)
        ));
        assert_eq!(h.storage.writes(), 0);
    }

    #[test]
    fn test_startup_twice() {
        let h = harness(&[SHIM_PATH]);
        h.start();
        let context = ServerClusterContext::in_memory();
        assert!(matches!(
            h.shim.startup(&context),
            Err(ProviderError::AlreadyStarted)
        ));
    }

    #[test]
    fn test_failed_write_and_reads_keep_version() {
        let h = harness(&[SHIM_PATH]);
        h.start();
        let initial = h.shim.data_version(&SHIM_PATH).unwrap();

        // Not a string
        assert!(h.write(attr_x(), 7u64).is_err());
        h.read(attr_x()).unwrap();
        assert_eq!(h.shim.data_version(&SHIM_PATH).unwrap(), initial);
        assert!(h.changes.changes().is_empty());

        h.write(attr_x(), "a").unwrap();
        h.write(attr_x(), "b").unwrap();
        assert_eq!(h.shim.data_version(&SHIM_PATH).unwrap(), initial.wrapping_add(2));
    }

    #[test]
    fn test_attributes_end_with_global_lists() {
        let h = harness(&[SHIM_PATH]);
        h.start();

        let mut out = Vec::new();
        h.shim.attributes(&SHIM_PATH, &mut out).unwrap();

        let ids: Vec<_> = out.iter().map(|entry| entry.path.attr_id).collect();
        assert_eq!(ids, vec![ATTR_X, 0xFFF8, 0xFFF9, 0xFFFB]);
        assert!(out[1..].iter().all(AttributeEntry::is_list));
        assert!(!out[0].is_list());
    }

    #[test]
    fn test_attributes_flag_list_typed() {
        let h = harness(&[ClusterPath::new(1, testing::ON_OFF)]);
        h.start();

        let mut out = Vec::new();
        h.shim
            .attributes(&ClusterPath::new(1, testing::ON_OFF), &mut out)
            .unwrap();
        assert_eq!(out.len(), 4 + 3);
        let list: Vec<_> = out
            .iter()
            .filter(|entry| entry.is_list())
            .map(|entry| entry.path.attr_id)
            .collect();
        assert_eq!(list, vec![testing::ATTR_LIST, 0xFFF8, 0xFFF9, 0xFFFB]);
    }

    #[test]
    fn test_commands_copied_in_order() {
        let h = harness(&[SHIM_PATH]);
        h.start();

        let mut accepted = Vec::new();
        h.shim.accepted_commands(&SHIM_PATH, &mut accepted).unwrap();
        let ids: Vec<_> = accepted.iter().map(|entry| entry.path.cmd_id).collect();
        assert_eq!(ids, vec![0x10, 0x11]);

        let mut generated = Vec::new();
        h.shim.generated_commands(&SHIM_PATH, &mut generated).unwrap();
        assert_eq!(generated, vec![0x20]);
    }

    #[test]
    fn test_invoke_forwards_to_dispatch() {
        let h = harness(&[SHIM_PATH]);
        h.start();

        let mut collector = ResponseCollector::new();
        let request = InvokeRequest::new(SHIM_PATH.command(0x11));
        let status = h
            .shim
            .invoke_command(&request, &Value::Unsigned(3), &mut collector)
            .unwrap();

        assert_eq!(status, None);
        assert_eq!(h.shim.dispatch_count(), 1);
        assert_eq!(h.dispatch.calls(), vec![CmdPath::new(SHIM_EP, SHIM_CLUSTER, 0x11)]);
        assert_eq!(collector.last_status(), Some(Status::Success));
    }

    #[test]
    fn test_startup_restores_versions() {
        let h = harness(&[SHIM_PATH]);
        h.store.set("dv/3/4", "4242".into()).unwrap();
        h.start();
        assert_eq!(h.shim.data_version(&SHIM_PATH).unwrap(), 4242);
        assert!(
            h.shim
                .data_version(&ClusterPath::new(9, 9))
                .unwrap_err()
                .is_not_found()
        );

        let info = h.shim.cluster_info(&SHIM_PATH).unwrap();
        assert_eq!(info.data_version, 4242);
    }

    #[test]
    fn test_duplicate_paths_collapse() {
        let h = harness(&[SHIM_PATH, ClusterPath::new(1, testing::ON_OFF), SHIM_PATH]);
        assert_eq!(
            h.shim.paths(),
            &[SHIM_PATH, ClusterPath::new(1, testing::ON_OFF)]
        );
    }
}
