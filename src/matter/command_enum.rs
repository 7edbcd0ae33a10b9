//! Pull-style command lookups over push-style handler enumeration.
//!
//! Dynamic handlers report their command sets by calling a visitor once per
//! id. The provider wants "first", "exact" and "next after" answers, so each
//! lookup walks the handler's list once with a small search state machine and
//! stops as soon as the answer is known.

use super::handlers::CommandHandlerRegistry;
use super::types::{ClusterPath, CmdId};
use crate::error::ProviderError;
use log::warn;
use std::ops::ControlFlow;

/// Outcome of a command lookup against the dynamic handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandLookup {
    /// No handler owns the path's command list; use the static arrays.
    Unhandled,
    /// A handler owns the list but the requested command is not in it.
    Missing,
    Found(CmdId),
}

impl CommandLookup {
    pub fn is_handled(self) -> bool {
        self != CommandLookup::Unhandled
    }

    pub fn found(self) -> Option<CmdId> {
        match self {
            CommandLookup::Found(id) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Accepted,
    Generated,
}

#[derive(Debug, Clone, Copy)]
enum Search {
    First,
    Exact(CmdId),
    After(CmdId),
    /// `After` has seen its id; the next one offered is the answer.
    Following,
}

pub fn find_first(
    handlers: &CommandHandlerRegistry,
    kind: CommandKind,
    path: &ClusterPath,
) -> CommandLookup {
    walk(handlers, kind, path, Search::First)
}

pub fn find_exact(
    handlers: &CommandHandlerRegistry,
    kind: CommandKind,
    path: &ClusterPath,
    target: CmdId,
) -> CommandLookup {
    walk(handlers, kind, path, Search::Exact(target))
}

pub fn find_next(
    handlers: &CommandHandlerRegistry,
    kind: CommandKind,
    path: &ClusterPath,
    after: CmdId,
) -> CommandLookup {
    walk(handlers, kind, path, Search::After(after))
}

fn walk(
    handlers: &CommandHandlerRegistry,
    kind: CommandKind,
    path: &ClusterPath,
    mut search: Search,
) -> CommandLookup {
    let Some(handler) = handlers.find(path) else {
        return CommandLookup::Unhandled;
    };

    let mut found = None;
    let mut visit = |id: CmdId| match search {
        Search::First | Search::Following => {
            found = Some(id);
            ControlFlow::Break(())
        }
        Search::Exact(target) if id == target => {
            found = Some(id);
            ControlFlow::Break(())
        }
        Search::After(previous) if id == previous => {
            search = Search::Following;
            ControlFlow::Continue(())
        }
        Search::Exact(_) | Search::After(_) => ControlFlow::Continue(()),
    };

    let outcome = match kind {
        CommandKind::Accepted => handler.enumerate_accepted_commands(path, &mut visit),
        CommandKind::Generated => handler.enumerate_generated_commands(path, &mut visit),
    };

    match outcome {
        Ok(()) => found.map_or(CommandLookup::Missing, CommandLookup::Found),
        Err(ProviderError::NotImplemented) => CommandLookup::Unhandled,
        Err(err) => {
            warn!("Command enumeration failed on {}: {}", path, err);
            CommandLookup::Missing
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::matter::handlers::{CommandHandler, CommandVisitor};
    use crate::matter::invoke::HandlerContext;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Handler reporting fixed lists and counting how many ids it offered.
    struct Listing {
        accepted: Vec<CmdId>,
        generated: Option<Vec<CmdId>>,
        offered: Mutex<usize>,
    }

    impl Listing {
        fn new(accepted: &[CmdId], generated: Option<&[CmdId]>) -> Arc<Self> {
            Arc::new(Self {
                accepted: accepted.to_vec(),
                generated: generated.map(<[CmdId]>::to_vec),
                offered: Mutex::new(0),
            })
        }

        fn offer(&self, ids: &[CmdId], visit: &mut CommandVisitor<'_>) {
            for id in ids {
                *self.offered.lock() += 1;
                if visit(*id).is_break() {
                    break;
                }
            }
        }
    }

    impl CommandHandler for Listing {
        fn invoke_command(&self, _ctx: &mut HandlerContext<'_>) {}

        fn enumerate_accepted_commands(
            &self,
            _path: &ClusterPath,
            visit: &mut CommandVisitor<'_>,
        ) -> Result<()> {
            self.offer(&self.accepted, visit);
            Ok(())
        }

        fn enumerate_generated_commands(
            &self,
            _path: &ClusterPath,
            visit: &mut CommandVisitor<'_>,
        ) -> Result<()> {
            match &self.generated {
                Some(ids) => {
                    self.offer(ids, visit);
                    Ok(())
                }
                None => Err(ProviderError::NotImplemented),
            }
        }
    }

    const PATH: ClusterPath = ClusterPath::new(1, 6);

    fn registry_with(handler: Arc<Listing>) -> CommandHandlerRegistry {
        let registry = CommandHandlerRegistry::new();
        registry.register(Some(1), 6, handler).unwrap();
        registry
    }

    #[test]
    fn test_no_handler_is_unhandled() {
        let registry = CommandHandlerRegistry::new();
        let accepted = CommandKind::Accepted;
        assert_eq!(find_first(&registry, accepted, &PATH), CommandLookup::Unhandled);
        assert_eq!(find_exact(&registry, accepted, &PATH, 1), CommandLookup::Unhandled);
        assert_eq!(find_next(&registry, accepted, &PATH, 1), CommandLookup::Unhandled);
    }

    #[test]
    fn test_empty_list_is_missing_not_unhandled() {
        let registry = registry_with(Listing::new(&[], None));
        let accepted = CommandKind::Accepted;
        assert_eq!(find_first(&registry, accepted, &PATH), CommandLookup::Missing);
        assert_eq!(find_exact(&registry, accepted, &PATH, 1), CommandLookup::Missing);
        assert_eq!(find_next(&registry, accepted, &PATH, 1), CommandLookup::Missing);
    }

    #[test]
    fn test_not_implemented_falls_back() {
        let registry = registry_with(Listing::new(&[1], None));
        assert_eq!(
            find_first(&registry, CommandKind::Generated, &PATH),
            CommandLookup::Unhandled
        );
        assert_eq!(
            find_first(&registry, CommandKind::Accepted, &PATH),
            CommandLookup::Found(1)
        );
    }

    #[test]
    fn test_lookups_stop_early() {
        let handler = Listing::new(&[5, 3, 9, 7], Some(&[0x20]));
        let registry = registry_with(handler.clone());
        let accepted = CommandKind::Accepted;

        assert_eq!(find_first(&registry, accepted, &PATH), CommandLookup::Found(5));
        assert_eq!(*handler.offered.lock(), 1);

        *handler.offered.lock() = 0;
        assert_eq!(find_exact(&registry, accepted, &PATH, 3), CommandLookup::Found(3));
        assert_eq!(*handler.offered.lock(), 2);

        *handler.offered.lock() = 0;
        assert_eq!(find_next(&registry, accepted, &PATH, 3), CommandLookup::Found(9));
        assert_eq!(*handler.offered.lock(), 3);

        assert_eq!(
            find_first(&registry, CommandKind::Generated, &PATH),
            CommandLookup::Found(0x20)
        );
    }

    #[test]
    fn test_next_edges() {
        let registry = registry_with(Listing::new(&[5, 3], None));
        let accepted = CommandKind::Accepted;
        // Last id has no successor
        assert_eq!(find_next(&registry, accepted, &PATH, 3), CommandLookup::Missing);
        // Unknown previous id
        assert_eq!(find_next(&registry, accepted, &PATH, 4), CommandLookup::Missing);
        assert_eq!(find_exact(&registry, accepted, &PATH, 4), CommandLookup::Missing);
    }

    #[test]
    fn test_full_walk_matches_list() {
        let ids = [0x10, 0x02, 0x11, 0x00];
        let registry = registry_with(Listing::new(&ids, None));
        let accepted = CommandKind::Accepted;

        let mut walked = Vec::new();
        let mut current = find_first(&registry, accepted, &PATH).found();
        while let Some(id) = current {
            walked.push(id);
            current = find_next(&registry, accepted, &PATH, id).found();
        }
        assert_eq!(walked, ids);
    }
}
