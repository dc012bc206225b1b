use crate::config::SessionConfig;
use crate::dispatch::{DispatchError, DispatchTable, Handler};
use crate::error::SessionError;
use crate::handlers;
use crate::navigation;
use crate::renderer::{Notice, ViewRenderer};
use crate::settings::{self, Settings, SettingsStore};
use crate::state::{Context, SessionState};
use crate::transport::{CloseOutcome, Transport, TransportEvent};
use crossbeam_channel::{Receiver, TryRecvError};
use serde_json::json;
use std::time::Instant;
use tilde_protocol::actions;
use tracing::{debug, info, warn};

const LOST_NOTICE: &str = "Connection to program core was lost, reconnecting...";
const GAVE_UP_NOTICE: &str = "Connection to program core cannot be established due to the failed server or network restrictions. Sometimes a page reload can help.";

/// Owns the session and drives it from transport events and timer ticks.
pub struct SessionController<T, R, S> {
    pub(crate) state: SessionState,
    pub(crate) transport: T,
    pub(crate) renderer: R,
    pub(crate) store: S,
    pub(crate) config: SessionConfig,
    handlers: DispatchTable,
    events: Receiver<TransportEvent>,
    next_poll: Option<Instant>,
}

impl<T: Transport, R: ViewRenderer, S: SettingsStore> SessionController<T, R, S> {
    pub fn new(
        config: SessionConfig,
        transport: T,
        renderer: R,
        store: S,
        events: Receiver<TransportEvent>,
    ) -> Result<Self, SessionError> {
        let settings = settings::load_or_default(&store);
        Ok(Self {
            state: SessionState::new(settings, &config),
            transport,
            renderer,
            store,
            config,
            handlers: handlers::default_table()?,
            events,
            next_poll: None,
        })
    }

    pub fn register(&mut self, action: &str, handler: Handler) -> Result<(), DispatchError> {
        self.handlers.register(action, handler)
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn settings(&self) -> &Settings {
        &self.state.settings
    }

    pub fn location(&self) -> &str {
        self.state.nav.location()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn ctx(&mut self) -> Context<'_> {
        Context {
            state: &mut self.state,
            transport: &mut self.transport,
            renderer: &mut self.renderer,
            store: &mut self.store,
        }
    }

    pub fn start(&mut self) {
        info!("connecting to program core");
        self.renderer.log("CONNECTING...");
        self.state.link.connect(&mut self.transport);
    }

    pub fn tick(&mut self, now: Instant) {
        loop {
            match self.events.try_recv() {
                Ok(event) => self.handle_event(event, now),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => break,
            }
        }

        if self.state.link.take_due(now) {
            debug!(attempt = self.state.link.attempts(), "retrying connection");
            self.state.link.connect(&mut self.transport);
        }

        if self.next_poll.map_or(true, |at| now >= at) {
            self.next_poll = Some(now + self.config.poll_interval);
            navigation::poll(&mut self.ctx());
        }

        self.ctx().flush_deferred();
    }

    pub fn handle_event(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::Opened => self.on_open(),
            TransportEvent::Message(wire) => self.on_message(&wire),
            TransportEvent::Closed => self.on_close(now),
        }
    }

    fn on_open(&mut self) {
        info!("connected");
        self.state.link.opened();
        self.state.gate.reset(&mut self.renderer);
        self.renderer.log("CONNECTED.");
        let settings = self.state.settings.to_value();
        self.ctx()
            .send(actions::LOGIN, Some(json!({"settings": settings})));
    }

    fn on_close(&mut self, now: Instant) {
        match self.state.link.closed(now) {
            CloseOutcome::GaveUp => {
                warn!(attempts = self.state.link.attempts(), "giving up on reconnecting");
                self.renderer.notify(Notice::urgent(GAVE_UP_NOTICE));
            }
            CloseOutcome::RetryAt(_) => {
                warn!(attempt = self.state.link.attempts(), "connection lost");
                self.renderer.log("CONNECTION LOST");
                self.renderer.notify(Notice::info(LOST_NOTICE));
            }
            CloseOutcome::RetryPending => {}
        }
    }

    fn on_message(&mut self, wire: &str) {
        let mut ctx = Context {
            state: &mut self.state,
            transport: &mut self.transport,
            renderer: &mut self.renderer,
            store: &mut self.store,
        };
        let frame = match tilde_protocol::decode(wire) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "undecodable frame");
                ctx.renderer.log(&format!("BAD FRAME: {e}"));
                ctx.state.gate.release(&mut *ctx.renderer);
                ctx.flush_deferred();
                return;
            }
        };
        ctx.debug_log(&format!("RECEIVED: {}", frame.action));
        ctx.state.gate.on_frame(&frame, &mut *ctx.renderer);
        if frame.has_error() && frame.action == actions::REPORT {
            ctx.state.scan.reset();
        }
        self.handlers.route(&mut ctx, &frame);
        ctx.flush_deferred();
    }
}
