use crate::error::SessionError;
use crate::renderer::Notice;
use crate::state::Context;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tilde_protocol::Frame;
use tracing::warn;

/// Reply handler: `(ctx, echoed request, data)`.
pub type Handler = fn(&mut Context<'_>, &Value, &str) -> Result<(), SessionError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("a handler for `{0}` is already registered")]
    Duplicate(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Routed {
    Handled,
    ServerError,
    Unhandled,
    Failed,
}

#[derive(Debug, Default)]
pub struct DispatchTable {
    handlers: HashMap<String, Handler>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, action: &str, handler: Handler) -> Result<(), DispatchError> {
        if self.handlers.contains_key(action) {
            return Err(DispatchError::Duplicate(action.to_string()));
        }
        self.handlers.insert(action.to_string(), handler);
        Ok(())
    }

    pub fn contains(&self, action: &str) -> bool {
        self.handlers.contains_key(action)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn route(&self, ctx: &mut Context<'_>, frame: &Frame) -> Routed {
        if frame.has_error() {
            warn!(action = %frame.action, error = %frame.error, "server reported an error");
            ctx.renderer
                .notify(Notice::urgent(format!("Diagnostic message: {}", frame.error)));
            return Routed::ServerError;
        }
        let Some(handler) = self.handlers.get(frame.action.as_str()) else {
            warn!(action = %frame.action, "no handler registered");
            ctx.renderer.notify(Notice::urgent(format!(
                "Unhandled action received: {}",
                frame.action
            )));
            return Routed::Unhandled;
        };
        match handler(ctx, &frame.req, &frame.data) {
            Ok(()) => Routed::Handled,
            Err(e) => {
                warn!(action = %frame.action, error = %e, "handler failed");
                ctx.renderer
                    .notify(Notice::urgent(format!("Diagnostic message: {e}")));
                Routed::Failed
            }
        }
    }
}
