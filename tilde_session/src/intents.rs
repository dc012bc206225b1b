//! Operations triggered by the user.
//!
//! Every request issued here goes through the gate and is dropped with a
//! busy notice while another exchange is in flight. Fragment-shaped
//! preconditions that cannot fail in a consistent session are reported as
//! numbered "unexpected behaviour" diagnostics.

use crate::config::max_columns;
use crate::controller::SessionController;
use crate::error::SessionError;
use crate::gate::Dispatched;
use crate::navigation::{detail_fragment, Route, BROWSE_SEGMENT};
use crate::panels::{tab_id, ObjectHash, Pane};
use crate::renderer::{Notice, TagsUpdate, ViewRenderer};
use crate::settings::{SettingsStore, Units};
use crate::transport::{LinkStatus, Transport};
use serde_json::{json, Map, Value};
use tilde_protocol::actions;
use tracing::warn;

const DB_NAME_MAX: usize = 18;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgCredentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub dbname: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbEngine {
    Sqlite,
    Postgres(PgCredentials),
}

impl DbEngine {
    /// Writes the engine choice into the server's `db` settings block. Keys
    /// this choice does not cover (e.g. `default_sqlite_db`) are kept.
    fn apply_to(&self, db: &mut Map<String, Value>) {
        match self {
            DbEngine::Sqlite => {
                db.insert("engine".into(), json!("sqlite"));
            }
            DbEngine::Postgres(creds) => {
                db.insert("engine".into(), json!("postgresql"));
                db.insert("host".into(), json!(creds.host));
                db.insert("port".into(), json!(creds.port));
                db.insert("user".into(), json!(creds.user));
                db.insert("password".into(), json!(creds.password));
                db.insert("dbname".into(), json!(creds.dbname));
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneralSettings {
    pub title: Option<String>,
    pub debug_regime: bool,
    pub demo_regime: bool,
    pub webport: Option<u16>,
    pub db: DbEngine,
}

impl<T: Transport, R: ViewRenderer, S: SettingsStore> SessionController<T, R, S> {
    fn fail(&mut self, err: SessionError) -> Result<(), SessionError> {
        warn!(error = %err, "operation rejected");
        self.renderer.notify(Notice::urgent(err.to_string()));
        Err(err)
    }

    fn active_db_or_fail(&mut self) -> Result<String, SessionError> {
        match self.state.active_db() {
            Some(db) => Ok(db.to_string()),
            None => {
                self.renderer
                    .notify(Notice::urgent(SessionError::NoDatabase.to_string()));
                Err(SessionError::NoDatabase)
            }
        }
    }

    fn in_table(&self) -> bool {
        matches!(
            self.state.nav.route(),
            Route::Table { .. } | Route::Detail { .. }
        )
    }

    pub fn navigate(&mut self, fragment: &str) {
        self.state.nav.set_location(fragment);
    }

    /// Row click: opens the object as a detail panel, or closes it when it
    /// is already open. With panel expansion off it toggles the selection.
    pub fn open_object(&mut self, hash: &ObjectHash) -> Result<(), SessionError> {
        if !self.state.settings.objects_expand {
            self.toggle_selection(hash.as_str());
            return Ok(());
        }
        if self.state.panels.contains(hash) {
            return self.close_object(hash);
        }
        let db = self.active_db_or_fail()?;
        let mut hashes = match self.state.nav.route() {
            Route::Detail { hashes, .. } => hashes,
            Route::Table { .. } => Vec::new(),
            _ => return self.fail(SessionError::Invariant(3)),
        };
        if hashes.len() >= self.config.max_panels {
            hashes.remove(0);
        }
        hashes.push(hash.clone());
        self.navigate(&detail_fragment(&db, hashes.iter()));
        Ok(())
    }

    pub fn close_object(&mut self, hash: &ObjectHash) -> Result<(), SessionError> {
        let Route::Detail { db, mut hashes } = self.state.nav.route() else {
            return self.fail(SessionError::Invariant(1));
        };
        hashes.retain(|h| h != hash);
        self.ctx().close_panel(hash);
        let target = if hashes.is_empty() {
            format!("#{db}/{BROWSE_SEGMENT}")
        } else {
            detail_fragment(&db, hashes.iter())
        };
        self.navigate(&target);
        Ok(())
    }

    pub fn close_all_objects(&mut self) -> Result<(), SessionError> {
        let Some(db) = self.state.nav.route().db().map(str::to_string) else {
            return self.fail(SessionError::Invariant(2));
        };
        self.ctx().close_all_panels();
        self.navigate(&format!("#{db}/{BROWSE_SEGMENT}"));
        Ok(())
    }

    /// Shows a detail pane, requesting its data the first time only.
    pub fn open_pane(&mut self, hash: &ObjectHash, pane: Pane) -> Result<(), SessionError> {
        if !self.state.panels.contains(hash) {
            return self.fail(SessionError::NotOpened(hash.to_string()));
        }
        self.renderer.focus_pane(hash, pane);
        let id = tab_id(hash, pane);
        if self.state.tabs.contains(&id) {
            return Ok(());
        }
        let Some(action) = pane.action() else {
            self.state.tabs.insert(id);
            return Ok(());
        };
        if self.ctx().send(action, Some(json!({"datahash": hash}))) == Dispatched::Sent {
            self.state.tabs.insert(id);
        }
        Ok(())
    }

    /// Narrows the tag cloud to tags compatible with `tids`; an empty set
    /// restores the full taxonomy.
    pub fn filter_tags(&mut self, tids: &[u64]) {
        if tids.is_empty() {
            self.state.catalog.visible_tags = None;
            self.renderer.render_tags(TagsUpdate::Reset);
            return;
        }
        self.ctx().send(actions::TAGS, Some(json!({"tids": tids})));
    }

    pub fn browse_tags(&mut self, tids: &[u64]) {
        self.ctx().send(actions::BROWSE, Some(json!({"tids": tids})));
    }

    pub fn list_dir(&mut self, path: &str) {
        self.ctx().send(
            actions::LIST,
            Some(json!({"path": path, "transport": "local"})),
        );
    }

    pub fn scan_file(&mut self, path: &str) {
        self.ctx().send(
            actions::REPORT,
            Some(json!({"path": path, "directory": 0, "transport": "local"})),
        );
    }

    pub fn scan_directory(&mut self, path: &str, recursive: bool) {
        self.state.scan.reset();
        let directory = if recursive { 2 } else { 1 };
        self.ctx().send(
            actions::REPORT,
            Some(json!({"path": path, "directory": directory, "transport": "local"})),
        );
    }

    pub fn switch_db(&mut self, name: &str) -> Result<(), SessionError> {
        if !self.state.settings.dbs.iter().any(|d| d == name) {
            return self.fail(SessionError::UnknownDatabase(name.to_string()));
        }
        self.navigate(&format!("#{name}"));
        Ok(())
    }

    pub fn create_db(&mut self, name: &str) -> Result<(), SessionError> {
        if self.state.demo {
            return self.fail(SessionError::DemoRestricted);
        }
        let name = name.trim();
        let valid = !name.is_empty()
            && name.chars().count() <= DB_NAME_MAX
            && !name.contains(['/', '#', '+', '.', ' '])
            && !self.state.settings.dbs.contains(&format!("{name}.db"));
        if !valid {
            return self.fail(SessionError::InvalidName(name.to_string()));
        }
        self.ctx()
            .send(actions::DB_CREATE, Some(json!({"newname": name})));
        Ok(())
    }

    pub fn delete_db(&mut self, name: &str) -> Result<(), SessionError> {
        if self.state.demo {
            return self.fail(SessionError::DemoRestricted);
        }
        if !self.state.settings.dbs.iter().any(|d| d == name) {
            return self.fail(SessionError::UnknownDatabase(name.to_string()));
        }
        self.ctx().send(actions::CLEAN, Some(json!({"db": name})));
        Ok(())
    }

    pub fn toggle_selection(&mut self, checksum: &str) {
        let selection = &mut self.state.selection;
        match selection.iter().position(|c| c == checksum) {
            Some(i) => {
                selection.remove(i);
            }
            None => selection.push(checksum.to_string()),
        }
    }

    pub fn copy_selected(&mut self, dest: &str) -> Result<(), SessionError> {
        let known = self.state.settings.dbs.iter().skip(1).any(|d| d == dest);
        if !known {
            return self.fail(SessionError::UnknownDatabase(dest.to_string()));
        }
        if self.state.selection.is_empty() {
            self.renderer.notify(Notice::info("Nothing selected."));
            return Ok(());
        }
        let tocopy = self.state.selection.clone();
        self.ctx().send(
            actions::DB_COPY,
            Some(json!({"tocopy": tocopy, "dest": dest})),
        );
        Ok(())
    }

    pub fn delete_selected(&mut self) -> Result<(), SessionError> {
        if self.state.selection.is_empty() {
            self.renderer.notify(Notice::info("Nothing selected."));
            return Ok(());
        }
        let hashes = self.state.selection.clone();
        if let Route::Detail { db, .. } = self.state.nav.route() {
            let mut ctx = self.ctx();
            for hash in hashes.iter().filter_map(|h| ObjectHash::parse(h)) {
                ctx.close_panel(&hash);
            }
            if ctx.state.panels.is_empty() {
                ctx.navigate(format!("#{db}/{BROWSE_SEGMENT}"));
            }
        }
        self.ctx()
            .send(actions::DELETE, Some(json!({"hashes": hashes})));
        Ok(())
    }

    pub fn export_selected(&mut self) -> Result<(), SessionError> {
        let [id] = self.state.selection.as_slice() else {
            self.renderer
                .notify(Notice::info("Batch export is not implemented."));
            return Ok(());
        };
        let id = id.clone();
        let db = self.active_db_or_fail()?;
        self.ctx()
            .send(actions::CHECK_EXPORT, Some(json!({"id": id, "db": db})));
        Ok(())
    }

    pub fn set_units(&mut self, units: Units) {
        self.state.settings.units = units;
        self.ctx().persist_settings();
        if !self.in_table() {
            return;
        }
        if let Some(last) = self.state.gate.last_browse().cloned() {
            self.ctx().send(actions::BROWSE, Some(last));
        }
    }

    pub fn save_columns(&mut self, cols: Vec<u32>) {
        if cols.is_empty() {
            self.renderer
                .notify(Notice::info("Please, select at least one column."));
            return;
        }
        if let Some(max) = self.state.max_cols.filter(|m| cols.len() > *m) {
            self.renderer.notify(Notice::info(format!(
                "Sorry, the current screen width allows at most {max} columns."
            )));
            return;
        }
        self.state.settings.cols = cols;
        self.send_settings("cols");
    }

    pub fn save_table_prefs(&mut self, colnum: u32, objects_expand: bool) {
        self.state.settings.colnum = colnum;
        self.state.settings.objects_expand = objects_expand;
        self.send_settings("cols");
    }

    pub fn save_scan_prefs(&mut self, skip_unfinished: bool, skip_if_path: Option<String>) {
        self.state.settings.skip_unfinished = skip_unfinished;
        self.state.settings.skip_if_path = skip_if_path.filter(|p| !p.is_empty());
        self.send_settings("scan");
    }

    pub fn set_local_path(&mut self, path: &str) {
        self.ctx().send(
            actions::SETTINGS,
            Some(json!({"area": "path", "path": path})),
        );
    }

    /// Postgres credentials are checked by the server first; the settings
    /// are pushed once the connection test succeeds.
    pub fn save_general(&mut self, general: GeneralSettings) {
        let settings = &mut self.state.settings;
        settings.title = general.title;
        settings.debug_regime = general.debug_regime;
        settings.demo_regime = general.demo_regime;
        if let Some(port) = general.webport {
            settings.extra.insert("webport".into(), json!(port));
        }
        let db = settings
            .extra
            .entry("db")
            .or_insert_with(|| Value::Object(Map::new()));
        if !db.is_object() {
            *db = Value::Object(Map::new());
        }
        if let Value::Object(fields) = db {
            general.db.apply_to(fields);
        }

        match general.db {
            DbEngine::Postgres(_) => {
                let creds = settings.extra.get("db").cloned().unwrap_or(Value::Null);
                self.ctx()
                    .send(actions::TRY_PGCONN, Some(json!({"creds": creds})));
            }
            DbEngine::Sqlite => self.send_settings("general"),
        }
    }

    fn send_settings(&mut self, area: &str) {
        let settings = self.state.settings.to_value();
        self.ctx().send(
            actions::SETTINGS,
            Some(json!({"area": area, "settings": settings})),
        );
    }

    pub fn restart(&mut self) {
        let reload_delay = self.config.reload_delay;
        let mut ctx = self.ctx();
        if ctx.send(actions::RESTART, None) == Dispatched::Sent {
            ctx.debug_log("RESTART SIGNAL SENT");
            ctx.renderer.schedule_reload(reload_delay);
        }
    }

    pub fn terminate(&mut self) {
        if self.ctx().send(actions::TERMINATE, None) == Dispatched::Sent {
            self.renderer
                .notify(Notice::info("This window may be closed now."));
        }
    }

    /// Manual reload: starts over after the retry ceiling was hit.
    pub fn reconnect(&mut self) {
        self.state.link.reset();
        if self.state.link.status() != LinkStatus::Connected {
            self.start();
        }
    }

    pub fn apply_viewport_width(&mut self, width: u32) {
        let max = max_columns(width);
        self.state.max_cols = Some(max);
        if self.state.settings.clamp_columns(max) {
            self.ctx().persist_settings();
        }
    }
}
