use crate::catalog::Catalog;
use crate::config::SessionConfig;
use crate::gate::{Dispatched, Request, RequestGate};
use crate::navigation::NavState;
use crate::panels::{ObjectHash, RenderedPanels};
use crate::renderer::{Notice, ViewRenderer};
use crate::settings::{Settings, SettingsStore};
use crate::transport::{LinkState, Transport};
use serde_json::Value;
use std::collections::BTreeSet;
use tracing::{debug, warn};

/// Progress of a streaming directory scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanState {
    pub multireceive: usize,
    pub checksums: Vec<String>,
}

impl ScanState {
    pub fn reset(&mut self) {
        self.multireceive = 0;
        self.checksums.clear();
    }
}

#[derive(Debug)]
pub struct SessionState {
    pub settings: Settings,
    pub link: LinkState,
    pub gate: RequestGate,
    pub nav: NavState,
    pub panels: RenderedPanels,
    pub tabs: BTreeSet<String>,
    pub catalog: Catalog,
    pub scan: ScanState,
    pub selection: Vec<String>,
    pub file_tree: BTreeSet<String>,
    pub max_cols: Option<usize>,
    pub debug: bool,
    pub demo: bool,
}

impl SessionState {
    pub fn new(settings: Settings, config: &SessionConfig) -> Self {
        Self {
            settings,
            link: LinkState::new(config.max_attempts, config.retry_delay),
            gate: RequestGate::default(),
            nav: NavState::default(),
            panels: RenderedPanels::with_cap(config.max_panels),
            tabs: BTreeSet::new(),
            catalog: Catalog::default(),
            scan: ScanState::default(),
            selection: Vec::new(),
            file_tree: BTreeSet::new(),
            max_cols: None,
            debug: false,
            demo: false,
        }
    }

    pub fn active_db(&self) -> Option<&str> {
        self.settings.active_db()
    }

    fn debug_console(&self) -> bool {
        self.debug || self.settings.debug_regime
    }
}

/// Borrowed view handed to handlers and navigation.
pub struct Context<'a> {
    pub state: &'a mut SessionState,
    pub transport: &'a mut dyn Transport,
    pub renderer: &'a mut dyn ViewRenderer,
    pub store: &'a mut dyn SettingsStore,
}

impl Context<'_> {
    pub fn send(&mut self, action: &str, payload: Option<Value>) -> Dispatched {
        self.dispatch(Request::new(action, payload))
    }

    pub fn dispatch(&mut self, request: Request) -> Dispatched {
        let debug_console = self.state.debug_console();
        self.state
            .gate
            .dispatch(request, debug_console, &mut *self.transport, &mut *self.renderer)
    }

    /// Sends now if nothing is in flight or queued, otherwise after the
    /// current exchange completes.
    pub fn send_when_idle(&mut self, action: &str, payload: Option<Value>) {
        let request = Request::new(action, payload);
        if self.state.gate.is_busy() || self.state.gate.has_deferred() {
            self.state.gate.defer(request);
        } else {
            self.dispatch(request);
        }
    }

    pub fn flush_deferred(&mut self) -> bool {
        match self.state.gate.take_deferred() {
            Some(request) => {
                debug!(action = %request.action, "flushing continuation");
                self.dispatch(request);
                true
            }
            None => false,
        }
    }

    pub fn notify(&mut self, notice: Notice) {
        self.renderer.notify(notice);
    }

    pub fn debug_log(&mut self, line: &str) {
        if self.state.debug_console() {
            self.renderer.log(line);
        }
    }

    pub fn navigate(&mut self, fragment: impl Into<String>) {
        self.state.nav.set_location(fragment);
    }

    pub fn persist_settings(&mut self) {
        if let Err(e) = self.store.save(&self.state.settings) {
            warn!(error = %e, "settings not persisted");
            self.renderer.log(&format!("SETTINGS NOT SAVED: {e}"));
        }
    }

    pub fn active_db_owned(&self) -> Option<String> {
        self.state.active_db().map(str::to_string)
    }

    pub fn close_panel(&mut self, hash: &ObjectHash) {
        if self.state.panels.remove(hash) {
            let prefix = format!("{hash}_");
            self.state.tabs.retain(|t| !t.starts_with(&prefix));
            self.renderer.close_panel(hash);
        }
    }

    pub fn close_all_panels(&mut self) {
        for hash in self.state.panels.clear() {
            self.renderer.close_panel(&hash);
        }
        self.state.tabs.clear();
    }
}
