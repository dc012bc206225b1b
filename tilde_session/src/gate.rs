use crate::renderer::{Notice, ViewRenderer, BUSY_NOTICE};
use crate::transport::Transport;
use serde_json::Value;
use std::collections::VecDeque;
use tilde_protocol::{actions, is_exempt, Frame};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub action: String,
    pub payload: Option<Value>,
}

impl Request {
    pub fn new(action: &str, payload: Option<Value>) -> Self {
        Self {
            action: action.to_string(),
            payload,
        }
    }

    pub fn encode(&self) -> String {
        tilde_protocol::encode(&self.action, self.payload.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    Sent,
    Rejected,
}

/// Single-in-flight request slot.
///
/// A request is only written to the transport while the gate is idle; a
/// second one is rejected with a busy notice instead of being queued.
/// Internal follow-ups go through [`RequestGate::defer`] and are flushed one
/// at a time once the gate is idle again.
#[derive(Debug, Default)]
pub struct RequestGate {
    busy: bool,
    last_request: Option<Request>,
    last_browse: Option<Value>,
    deferred: VecDeque<Request>,
}

impl RequestGate {
    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn last_request(&self) -> Option<&Request> {
        self.last_request.as_ref()
    }

    pub fn take_last_request(&mut self) -> Option<Request> {
        self.last_request.take()
    }

    pub fn last_browse(&self) -> Option<&Value> {
        self.last_browse.as_ref()
    }

    pub fn dispatch(
        &mut self,
        request: Request,
        debug_console: bool,
        transport: &mut dyn Transport,
        renderer: &mut dyn ViewRenderer,
    ) -> Dispatched {
        if self.busy {
            debug!(action = %request.action, "gate busy, request dropped");
            renderer.notify(Notice::info(BUSY_NOTICE));
            return Dispatched::Rejected;
        }
        self.busy = true;
        renderer.set_busy(true);

        let wire = request.encode();
        if debug_console {
            renderer.log(&format!("REQUESTED: {}", request.action));
        }
        debug!(action = %request.action, "request sent");
        if let Err(e) = transport.send(wire) {
            warn!(action = %request.action, error = %e, "send failed");
            renderer.log(&format!("SEND FAILED ({}): {e}", request.action));
        }

        if request.action == actions::BROWSE {
            self.last_browse = request.payload.clone();
        }
        if !is_exempt(&request.action) {
            self.last_request = Some(request);
        }
        Dispatched::Sent
    }

    /// Whether `frame` ends the exchange that holds the gate.
    ///
    /// Directory scans stream partial `report` frames; those keep the gate
    /// busy until the scan finishes.
    pub fn releases(frame: &Frame) -> bool {
        if frame.has_error() {
            return true;
        }
        frame.action != actions::REPORT || frame.req_u64("directory").unwrap_or(0) < 1
    }

    /// Applies the release rule to an inbound frame. Returns true if the gate
    /// went from busy to idle.
    pub fn on_frame(&mut self, frame: &Frame, renderer: &mut dyn ViewRenderer) -> bool {
        if !Self::releases(frame) {
            return false;
        }
        if self
            .last_request
            .as_ref()
            .is_some_and(|r| r.action == frame.action)
        {
            self.last_request = None;
        }
        self.release(renderer)
    }

    pub fn release(&mut self, renderer: &mut dyn ViewRenderer) -> bool {
        let was_busy = self.busy;
        self.busy = false;
        renderer.set_busy(false);
        was_busy
    }

    /// Fresh connection: nothing is in flight anymore. The replay slot is
    /// kept so the login handler can resend it.
    pub fn reset(&mut self, renderer: &mut dyn ViewRenderer) {
        self.busy = false;
        renderer.set_busy(false);
    }

    pub fn defer(&mut self, request: Request) {
        debug!(action = %request.action, pending = self.deferred.len(), "deferred until idle");
        self.deferred.push_back(request);
    }

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Next continuation, only while idle.
    pub fn take_deferred(&mut self) -> Option<Request> {
        if self.busy {
            return None;
        }
        self.deferred.pop_front()
    }

    pub fn clear_deferred(&mut self) {
        self.deferred.clear();
    }
}
