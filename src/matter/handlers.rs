//! Dynamically registered per-cluster command handlers.
//!
//! A handler is registered for one cluster id, either on a single endpoint or
//! on every endpoint. It gets the first chance at every invoke addressed to
//! its scope and may also report its own accepted/generated command lists,
//! which then replace the registry's static arrays.

use super::invoke::HandlerContext;
use super::types::{ClusterId, ClusterPath, CmdId, EndptId, INVALID_ENDPOINT_ID};
use crate::error::{ProviderError, Result};
use log::info;
use parking_lot::RwLock;
use std::ops::ControlFlow;
use std::sync::Arc;

/// Visitor handed to command enumeration; return `Break` to stop the walk.
pub type CommandVisitor<'a> = dyn FnMut(CmdId) -> ControlFlow<()> + 'a;

pub trait CommandHandler: Send + Sync {
    /// Called for every invoke addressed to the handler's scope.
    ///
    /// Leave the context unhandled to let the request fall through to the
    /// registry dispatch.
    fn invoke_command(&self, ctx: &mut HandlerContext<'_>);

    /// Offer every accepted command id to `visit`, in order.
    ///
    /// Handlers that do not override this keep the registry's static list.
    fn enumerate_accepted_commands(
        &self,
        _path: &ClusterPath,
        _visit: &mut CommandVisitor<'_>,
    ) -> Result<()> {
        Err(ProviderError::NotImplemented)
    }

    fn enumerate_generated_commands(
        &self,
        _path: &ClusterPath,
        _visit: &mut CommandVisitor<'_>,
    ) -> Result<()> {
        Err(ProviderError::NotImplemented)
    }
}

struct Registration {
    endpoint: Option<EndptId>,
    cluster: ClusterId,
    handler: Arc<dyn CommandHandler>,
}

impl Registration {
    fn scope(&self) -> ClusterPath {
        ClusterPath::new(self.endpoint.unwrap_or(INVALID_ENDPOINT_ID), self.cluster)
    }
}

#[derive(Default)]
pub struct CommandHandlerRegistry {
    entries: RwLock<Vec<Registration>>,
}

impl CommandHandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `cluster` on `endpoint`, or on every endpoint
    /// when `endpoint` is `None`.
    pub fn register(
        &self,
        endpoint: Option<EndptId>,
        cluster: ClusterId,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<()> {
        let mut entries = self.entries.write();
        if let Some(existing) = entries
            .iter()
            .find(|entry| entry.endpoint == endpoint && entry.cluster == cluster)
        {
            return Err(ProviderError::Duplicate(existing.scope()));
        }

        let registration = Registration {
            endpoint,
            cluster,
            handler,
        };
        info!("Registered command handler for {}", registration.scope());
        entries.push(registration);
        Ok(())
    }

    /// Returns `false` if nothing was registered for that scope.
    pub fn unregister(&self, endpoint: Option<EndptId>, cluster: ClusterId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|entry| !(entry.endpoint == endpoint && entry.cluster == cluster));
        before != entries.len()
    }

    /// The handler responsible for `path`; an exact endpoint match wins over
    /// a wildcard one.
    pub fn find(&self, path: &ClusterPath) -> Option<Arc<dyn CommandHandler>> {
        let entries = self.entries.read();
        let mut wildcard = None;
        for entry in entries.iter().filter(|entry| entry.cluster == path.cluster_id) {
            match entry.endpoint {
                Some(endpoint) if endpoint == path.endpoint_id => {
                    return Some(entry.handler.clone());
                }
                None => wildcard = Some(entry.handler.clone()),
                Some(_) => {}
            }
        }
        wildcard
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matter::status::Status;

    struct Answering(Status);

    impl CommandHandler for Answering {
        fn invoke_command(&self, ctx: &mut HandlerContext<'_>) {
            ctx.respond_status(self.0);
        }
    }

    fn answer_of(handler: &Arc<dyn CommandHandler>) -> Option<Status> {
        use crate::matter::invoke::{InvokeRequest, ResponseCollector};
        use crate::matter::types::{CmdPath, Value};

        let request = InvokeRequest::new(CmdPath::new(1, 6, 0));
        let args = Value::Null;
        let mut collector = ResponseCollector::new();
        let mut ctx = HandlerContext::new(&request, &args, &mut collector);
        handler.invoke_command(&mut ctx);
        collector.last_status()
    }

    #[test]
    fn test_exact_registration_wins_over_wildcard() {
        let registry = CommandHandlerRegistry::new();
        registry
            .register(None, 6, Arc::new(Answering(Status::Busy)))
            .unwrap();
        registry
            .register(Some(1), 6, Arc::new(Answering(Status::Success)))
            .unwrap();

        let exact = registry.find(&ClusterPath::new(1, 6)).unwrap();
        assert_eq!(answer_of(&exact), Some(Status::Success));

        let wildcard = registry.find(&ClusterPath::new(9, 6)).unwrap();
        assert_eq!(answer_of(&wildcard), Some(Status::Busy));

        assert!(registry.find(&ClusterPath::new(1, 8)).is_none());
    }

    #[test]
    fn test_duplicate_and_unregister() {
        let registry = CommandHandlerRegistry::new();
        registry
            .register(Some(1), 6, Arc::new(Answering(Status::Success)))
            .unwrap();

        let err = registry
            .register(Some(1), 6, Arc::new(Answering(Status::Success)))
            .unwrap_err();
        assert!(matches!(err, ProviderError::Duplicate(path) if path == ClusterPath::new(1, 6)));

        assert!(registry.unregister(Some(1), 6));
        assert!(!registry.unregister(Some(1), 6));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_default_enumeration_is_not_implemented() {
        let handler = Answering(Status::Success);
        let mut visit = |_: CmdId| ControlFlow::Continue(());
        assert!(matches!(
            handler.enumerate_accepted_commands(&ClusterPath::new(1, 6), &mut visit),
            Err(ProviderError::NotImplemented)
        ));
    }
}
