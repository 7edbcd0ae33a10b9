//! The per-cluster-object interface and its execution context.
//!
//! A [`ServerCluster`] owns one or more cluster paths outright: reads,
//! writes, invokes, metadata and data versions for those paths go to it
//! instead of the registry.

use super::invoke::{CommandResponder, InvokeRequest, WriteAttributeRequest};
use super::legacy::{AttributeValueDecoder, AttributeValueEncoder};
use super::metadata::{AttributeEntry, ClusterInfo, CommandEntry};
use super::persistence::{KeyValueStore, MemoryStore};
use super::status::Status;
use super::types::{AttrPath, ClusterPath, CmdId, Value};
use crate::error::{ProviderError, Result};
use log::{debug, info};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Sink for attribute change reports.
///
/// Called after every successful mutation so subscriptions can be told that
/// the attribute's value (and its cluster's data version) moved.
pub trait ChangeNotify: Send + Sync {
    fn attribute_changed(&self, path: &AttrPath);
}

impl ChangeNotify for () {
    fn attribute_changed(&self, _path: &AttrPath) {}
}

/// Change sink that remembers every report.
#[derive(Debug, Default)]
pub struct ChangeLog {
    changes: Mutex<Vec<AttrPath>>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> Vec<AttrPath> {
        self.changes.lock().clone()
    }

    pub fn take(&self) -> Vec<AttrPath> {
        std::mem::take(&mut *self.changes.lock())
    }
}

impl ChangeNotify for ChangeLog {
    fn attribute_changed(&self, path: &AttrPath) {
        debug!("Attribute changed: {}", path);
        self.changes.lock().push(*path);
    }
}

/// What a cluster is bound to at startup.
#[derive(Clone)]
pub struct ServerClusterContext {
    pub storage: Arc<dyn KeyValueStore>,
    pub notify: Arc<dyn ChangeNotify>,
}

impl ServerClusterContext {
    pub fn new(storage: Arc<dyn KeyValueStore>, notify: Arc<dyn ChangeNotify>) -> Self {
        Self { storage, notify }
    }

    /// Volatile storage and no change reporting.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), Arc::new(()))
    }
}

pub trait ServerCluster: Send + Sync {
    /// Every path this instance serves, in a fixed order.
    fn paths(&self) -> &[ClusterPath];

    /// Bind to the execution context. Must succeed before anything else.
    fn startup(&self, context: &ServerClusterContext) -> Result<()>;

    /// Fails with `NotStarted` before `startup`, like every data operation.
    fn data_version(&self, path: &ClusterPath) -> Result<u32>;

    fn cluster_info(&self, path: &ClusterPath) -> Result<ClusterInfo>;

    fn read_attribute(&self, path: &AttrPath, encoder: &mut AttributeValueEncoder) -> Result<()>;

    fn write_attribute(
        &self,
        request: &WriteAttributeRequest,
        decoder: &mut AttributeValueDecoder,
    ) -> Result<()>;

    /// `Ok(None)` when the answer went out through `responder`.
    fn invoke_command(
        &self,
        request: &InvokeRequest,
        args: &Value,
        responder: &mut dyn CommandResponder,
    ) -> Result<Option<Status>>;

    /// The three list builders below must give the same answer for as long
    /// as the instance stays registered; callers may cache their output.
    fn attributes(&self, path: &ClusterPath, out: &mut Vec<AttributeEntry>) -> Result<()>;

    fn accepted_commands(&self, path: &ClusterPath, out: &mut Vec<CommandEntry>) -> Result<()>;

    fn generated_commands(&self, path: &ClusterPath, out: &mut Vec<CmdId>) -> Result<()>;
}

/// Per-path registry of [`ServerCluster`] instances.
#[derive(Default)]
pub struct ServerClusterRegistry {
    clusters: RwLock<Vec<Arc<dyn ServerCluster>>>,
    context: RwLock<Option<ServerClusterContext>>,
    serial: AtomicU64,
}

impl ServerClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumped whenever the set of registered paths changes.
    pub fn serial(&self) -> u64 {
        self.serial.load(Ordering::SeqCst)
    }

    pub fn context(&self) -> Option<ServerClusterContext> {
        self.context.read().clone()
    }

    /// Register a cluster. If the registry is already started, the cluster
    /// is started here too, before it becomes visible.
    pub fn register(&self, cluster: Arc<dyn ServerCluster>) -> Result<()> {
        {
            let clusters = self.clusters.read();
            if let Some(taken) = cluster
                .paths()
                .iter()
                .find(|path| clusters.iter().any(|c| c.paths().contains(path)))
            {
                return Err(ProviderError::Duplicate(*taken));
            }
        }

        if let Some(context) = self.context() {
            cluster.startup(&context)?;
        }

        let mut clusters = self.clusters.write();
        // Re-check under the write lock; startup ran unlocked
        if let Some(taken) = cluster
            .paths()
            .iter()
            .find(|path| clusters.iter().any(|c| c.paths().contains(path)))
        {
            return Err(ProviderError::Duplicate(*taken));
        }
        info!(
            "Registered server cluster for {} path(s)",
            cluster.paths().len()
        );
        clusters.push(cluster);
        self.serial.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Remove the cluster serving `path`, along with all its other paths.
    pub fn unregister(&self, path: &ClusterPath) -> Option<Arc<dyn ServerCluster>> {
        let mut clusters = self.clusters.write();
        let index = clusters.iter().position(|c| c.paths().contains(path))?;
        let removed = clusters.remove(index);
        self.serial.fetch_add(1, Ordering::SeqCst);
        Some(removed)
    }

    pub fn find(&self, path: &ClusterPath) -> Option<Arc<dyn ServerCluster>> {
        self.clusters
            .read()
            .iter()
            .find(|c| c.paths().contains(path))
            .cloned()
    }

    /// Start every registered cluster against `context`.
    pub fn startup(&self, context: ServerClusterContext) -> Result<()> {
        {
            let mut slot = self.context.write();
            if slot.is_some() {
                return Err(ProviderError::AlreadyStarted);
            }
            *slot = Some(context.clone());
        }

        let clusters: Vec<_> = self.clusters.read().clone();
        for cluster in clusters {
            cluster.startup(&context)?;
        }
        Ok(())
    }
}
