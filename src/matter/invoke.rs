//! Request descriptors and the response sink used while dispatching.

use super::status::Status;
use super::types::{AttrPath, CmdId, CmdPath, Value};

/// A write addressed to one concrete attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteAttributeRequest {
    pub path: AttrPath,
    /// Whether the write arrived inside a timed interaction.
    pub timed: bool,
}

impl WriteAttributeRequest {
    pub const fn new(path: AttrPath) -> Self {
        Self { path, timed: false }
    }

    pub const fn timed(mut self) -> Self {
        self.timed = true;
        self
    }
}

/// An invoke addressed to one concrete command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokeRequest {
    pub path: CmdPath,
    pub timed: bool,
}

impl InvokeRequest {
    pub const fn new(path: CmdPath) -> Self {
        Self { path, timed: false }
    }

    pub const fn timed(mut self) -> Self {
        self.timed = true;
        self
    }
}

/// Sink for the answer to an invoke.
///
/// Whoever handles a command answers through this sink exactly once, either
/// with a bare status or with a response command carrying data.
pub trait CommandResponder {
    fn add_status(&mut self, path: &CmdPath, status: Status);

    fn add_response(&mut self, path: &CmdPath, response_id: CmdId, data: Value);
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandResponse {
    Status {
        path: CmdPath,
        status: Status,
    },
    Data {
        path: CmdPath,
        response_id: CmdId,
        data: Value,
    },
}

/// Responder that keeps every answer in order.
#[derive(Debug, Default)]
pub struct ResponseCollector {
    responses: Vec<CommandResponse>,
}

impl ResponseCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn responses(&self) -> &[CommandResponse] {
        &self.responses
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }

    /// Status of the last answer, treating a data response as success.
    pub fn last_status(&self) -> Option<Status> {
        self.responses.last().map(|response| match response {
            CommandResponse::Status { status, .. } => *status,
            CommandResponse::Data { .. } => Status::Success,
        })
    }
}

impl CommandResponder for ResponseCollector {
    fn add_status(&mut self, path: &CmdPath, status: Status) {
        self.responses.push(CommandResponse::Status {
            path: *path,
            status,
        });
    }

    fn add_response(&mut self, path: &CmdPath, response_id: CmdId, data: Value) {
        self.responses.push(CommandResponse::Data {
            path: *path,
            response_id,
            data,
        });
    }
}

/// What a dynamic command handler sees for one invoke.
///
/// A handler that consumes the request answers through the context, which
/// marks it handled. Returning without doing so lets the request fall through
/// to the next dispatch stage.
pub struct HandlerContext<'a> {
    pub request: &'a InvokeRequest,
    pub args: &'a Value,
    responder: &'a mut dyn CommandResponder,
    handled: bool,
}

impl<'a> HandlerContext<'a> {
    pub fn new(
        request: &'a InvokeRequest,
        args: &'a Value,
        responder: &'a mut dyn CommandResponder,
    ) -> Self {
        Self {
            request,
            args,
            responder,
            handled: false,
        }
    }

    pub fn path(&self) -> &CmdPath {
        &self.request.path
    }

    pub fn is_handled(&self) -> bool {
        self.handled
    }

    /// Mark the request handled without answering; the handler has arranged
    /// for the answer some other way.
    pub fn set_handled(&mut self) {
        self.handled = true;
    }

    pub fn respond_status(&mut self, status: Status) {
        self.responder.add_status(&self.request.path, status);
        self.handled = true;
    }

    pub fn respond(&mut self, response_id: CmdId, data: Value) {
        self.responder
            .add_response(&self.request.path, response_id, data);
        self.handled = true;
    }
}
