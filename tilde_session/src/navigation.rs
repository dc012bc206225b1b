//! Location-fragment state machine.
//!
//! Grammar: `#` or `#start` is the landing view, `#about` the about view,
//! `#<db>` the tag browser, `#<db>/browse` the table browser and
//! `#<db>/<hash>[+<hash>...]` the object detail view. Every detail segment
//! must be a 56-character hash; anything else is unknown.

use crate::panels::{tab_id, ObjectHash, Pane};
use crate::renderer::{Notice, TagsUpdate, View};
use crate::state::Context;
use serde_json::json;
use tilde_protocol::actions;
use tracing::debug;

pub const BROWSE_SEGMENT: &str = "browse";
const LANDING: &str = "start";
const ABOUT: &str = "about";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Landing,
    About,
    Tags { db: String },
    Table { db: String },
    Detail { db: String, hashes: Vec<ObjectHash> },
    Unknown,
}

impl Route {
    pub fn parse(fragment: &str) -> Route {
        let body = fragment.strip_prefix('#').unwrap_or(fragment);
        match body {
            "" | LANDING => return Route::Landing,
            ABOUT => return Route::About,
            _ => {}
        }
        let mut anchors = body.split('/');
        let db = anchors.next().unwrap_or_default();
        let rest = anchors.next();
        if db.is_empty() || anchors.next().is_some() {
            return Route::Unknown;
        }
        let db = db.to_string();
        match rest {
            None => Route::Tags { db },
            Some(BROWSE_SEGMENT) => Route::Table { db },
            Some(segment) => {
                let hashes: Option<Vec<ObjectHash>> =
                    segment.split('+').map(ObjectHash::parse).collect();
                match hashes {
                    Some(hashes) => Route::Detail { db, hashes },
                    None => Route::Unknown,
                }
            }
        }
    }

    pub fn db(&self) -> Option<&str> {
        match self {
            Route::Tags { db } | Route::Table { db } | Route::Detail { db, .. } => Some(db),
            _ => None,
        }
    }

    pub fn to_fragment(&self) -> String {
        match self {
            Route::Landing => format!("#{LANDING}"),
            Route::About => format!("#{ABOUT}"),
            Route::Tags { db } => format!("#{db}"),
            Route::Table { db } => format!("#{db}/{BROWSE_SEGMENT}"),
            Route::Detail { db, hashes } => detail_fragment(db, hashes.iter()),
            Route::Unknown => "#".to_string(),
        }
    }
}

pub fn detail_fragment<'a>(db: &str, hashes: impl Iterator<Item = &'a ObjectHash>) -> String {
    let joined: Vec<&str> = hashes.map(ObjectHash::as_str).collect();
    format!("#{db}/{}", joined.join("+"))
}

pub fn normalize(fragment: &str) -> String {
    if fragment.starts_with('#') {
        fragment.to_string()
    } else {
        format!("#{fragment}")
    }
}

/// Current fragment and what the state machine last acted on.
#[derive(Debug, Clone, Default)]
pub struct NavState {
    location: String,
    last_seen: Option<String>,
    pub pending_switchto: Option<String>,
}

impl NavState {
    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn route(&self) -> Route {
        Route::parse(&self.location)
    }

    pub fn set_location(&mut self, fragment: impl Into<String>) {
        self.location = normalize(&fragment.into());
    }

    /// Forces the current fragment to be evaluated again.
    pub fn rearm(&mut self) {
        self.last_seen = None;
    }

    pub fn is_settled(&self) -> bool {
        self.last_seen.as_deref() == Some(self.location.as_str())
    }

    /// Rewrites the fragment without triggering a new evaluation.
    fn replace_settled(&mut self, fragment: String) {
        self.last_seen = Some(fragment.clone());
        self.location = fragment;
    }
}

/// One poll step: acts on the fragment if it changed since last time.
pub fn poll(ctx: &mut Context<'_>) {
    if ctx.state.nav.is_settled() {
        return;
    }
    let current = ctx.state.nav.location().to_string();
    let route = Route::parse(&current);

    if route.db().is_some() && ctx.state.settings.dbs.is_empty() {
        return;
    }
    if ctx.state.gate.is_busy() {
        ctx.state.nav.rearm();
        return;
    }
    ctx.state.nav.last_seen = Some(current.clone());
    debug!(fragment = %current, ?route, "entering location");

    if let Some(db) = route.db() {
        if ctx.state.active_db() != Some(db) {
            switch_database(ctx, db);
        }
    }

    match route {
        Route::Landing => {
            if ctx.state.demo {
                ctx.renderer.redirect_mirror();
            } else {
                ctx.renderer.show_view(View::Landing);
            }
        }
        Route::About => ctx.renderer.show_view(View::About),
        Route::Tags { .. } => enter_tags(ctx),
        Route::Table { db } => enter_table(ctx, &db),
        Route::Detail { db, hashes } => enter_detail(ctx, &db, &hashes),
        Route::Unknown => {
            ctx.notify(Notice::urgent(format!("Unknown location {current} (404)")));
            let target = ctx.active_db_owned().unwrap_or_default();
            ctx.navigate(format!("#{target}"));
        }
    }
}

fn switch_database(ctx: &mut Context<'_>, db: &str) {
    debug!(db, "switching database");
    ctx.state.catalog.clear();
    ctx.state.selection.clear();
    ctx.close_all_panels();
    ctx.state.gate.clear_deferred();
    ctx.send(
        actions::SETTINGS,
        Some(json!({"area": "switching", "switching": db})),
    );
}

fn enter_tags(ctx: &mut Context<'_>) {
    ctx.renderer.show_view(View::Tags);
    ctx.close_all_panels();
    if !ctx.state.catalog.taxonomy_is_empty() {
        ctx.state.nav.pending_switchto = None;
        if let Some(taxonomy) = &ctx.state.catalog.taxonomy {
            ctx.renderer.render_tags(TagsUpdate::Taxonomy(taxonomy));
        }
        return;
    }
    let mut payload = json!({"tids": false});
    if let Some(target) = ctx.state.nav.pending_switchto.take() {
        payload["switchto"] = json!(target);
    }
    ctx.send_when_idle(actions::TAGS, Some(payload));
}

fn enter_table(ctx: &mut Context<'_>, db: &str) {
    if ctx.state.catalog.taxonomy_is_empty() {
        ctx.state.nav.pending_switchto = Some(BROWSE_SEGMENT.to_string());
        ctx.navigate(format!("#{db}"));
        return;
    }
    ctx.close_all_panels();
    ctx.renderer.show_view(View::Table);
    if ctx.state.catalog.table.is_empty() {
        if let Some(last) = ctx.state.gate.last_browse().cloned() {
            ctx.send_when_idle(actions::BROWSE, Some(last));
        }
    }
}

fn enter_detail(ctx: &mut Context<'_>, db: &str, hashes: &[ObjectHash]) {
    ctx.renderer.show_view(View::Table);
    if ctx.state.catalog.table.is_empty() {
        ctx.send_when_idle(actions::BROWSE, Some(json!({"hashes": hashes})));
        return;
    }

    let stale: Vec<ObjectHash> = ctx
        .state
        .panels
        .iter()
        .filter(|h| !hashes.contains(h))
        .cloned()
        .collect();
    for hash in &stale {
        ctx.close_panel(hash);
    }

    // Oldest first: open panels, then loaded rows new to the fragment. Only
    // the newest `cap` survive.
    let mut order: Vec<ObjectHash> = ctx.state.panels.iter().cloned().collect();
    for hash in hashes {
        if order.contains(hash) {
            continue;
        }
        if !ctx.state.catalog.table.contains(hash) {
            debug!(%hash, "row not loaded, skipping panel");
            continue;
        }
        order.push(hash.clone());
    }
    let keep_from = order.len().saturating_sub(ctx.state.panels.cap());
    let evicted = keep_from > 0;
    for hash in &order[..keep_from] {
        ctx.close_panel(hash);
    }
    for hash in &order[keep_from..] {
        if ctx.state.panels.contains(hash) {
            continue;
        }
        ctx.state.panels.insert(hash.clone());
        ctx.renderer.open_panel(hash);
        ctx.state.tabs.insert(tab_id(hash, Pane::Summary));
        ctx.send_when_idle(actions::SUMMARY, Some(json!({"datahash": hash})));
    }

    if evicted {
        let fragment = detail_fragment(db, ctx.state.panels.iter());
        ctx.state.nav.replace_settled(fragment);
    }
}
