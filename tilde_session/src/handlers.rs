use crate::catalog::BrowseTable;
use crate::dispatch::{DispatchError, DispatchTable, Handler};
use crate::error::SessionError;
use crate::navigation::{Route, BROWSE_SEGMENT};
use crate::panels::{ObjectHash, Pane};
use crate::renderer::{Notice, ScanEvent, TagsUpdate};
use crate::state::Context;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tilde_protocol::actions;
use tracing::{debug, info};

/// Data of a `report` frame that signals a scan still in progress.
pub const KEEP_ALIVE: &str = "1";

pub fn default_table() -> Result<DispatchTable, DispatchError> {
    let entries: [(&str, Handler); 22] = [
        (actions::LOGIN, on_login),
        (actions::BROWSE, on_browse),
        (actions::TAGS, on_tags),
        (actions::LIST, on_list),
        (actions::REPORT, on_report),
        (actions::SUMMARY, on_summary),
        (actions::PHONONS, on_phonons),
        (actions::PH_DOS, on_ph_dos),
        (actions::E_DOS, on_e_dos),
        (actions::PH_BANDS, on_ph_bands),
        (actions::E_BANDS, on_e_bands),
        (actions::OPTSTORY, on_optstory),
        (actions::ESTORY, on_estory),
        (actions::SETTINGS, on_settings),
        (actions::CLEAN, on_clean),
        (actions::DB_CREATE, on_db_create),
        (actions::DB_COPY, on_db_copy),
        (actions::DELETE, on_delete),
        (actions::CHECK_EXPORT, on_check_export),
        (actions::TRY_PGCONN, on_try_pgconn),
        (actions::RESTART, on_restart),
        (actions::TERMINATE, on_terminate),
    ];
    let mut table = DispatchTable::new();
    for (action, handler) in entries {
        table.register(action, handler)?;
    }
    Ok(table)
}

#[derive(Deserialize, Debug, Default)]
struct LoginReply {
    #[serde(default)]
    version: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    debug_regime: bool,
    #[serde(default)]
    demo_regime: bool,
    #[serde(default)]
    custom_about_link: Option<String>,
    #[serde(default)]
    settings: Map<String, Value>,
}

#[derive(Deserialize, Debug)]
struct ReportEntry {
    #[serde(default)]
    filename: String,
    #[serde(default)]
    checksum: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    finished: bool,
}

fn req_str<'a>(req: &'a Value, key: &'static str) -> Result<&'a str, SessionError> {
    req.get(key)
        .and_then(Value::as_str)
        .ok_or(SessionError::MissingField(key))
}

fn req_hash(req: &Value) -> Result<ObjectHash, SessionError> {
    req.get("datahash")
        .and_then(Value::as_str)
        .and_then(ObjectHash::parse)
        .ok_or(SessionError::MissingField("datahash"))
}

fn req_strings(req: &Value, key: &'static str) -> Vec<String> {
    req.get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default()
}

fn on_login(ctx: &mut Context<'_>, _req: &Value, data: &str) -> Result<(), SessionError> {
    if let Some(last) = ctx.state.gate.take_last_request() {
        info!(action = %last.action, "replaying request interrupted by reconnect");
        ctx.dispatch(last);
    }

    let reply: LoginReply = if data.trim().is_empty() {
        LoginReply::default()
    } else {
        serde_json::from_str(data)?
    };
    ctx.state.debug = reply.debug_regime;
    ctx.state.demo = reply.demo_regime;
    if !reply.settings.is_empty() {
        ctx.debug_log(&format!(
            "RECEIVED SETTINGS: {}",
            Value::Object(reply.settings.clone())
        ));
    }
    ctx.state.settings.merge(&reply.settings)?;
    if let Some(max_cols) = ctx.state.max_cols {
        ctx.state.settings.clamp_columns(max_cols);
    }
    ctx.persist_settings();

    ctx.renderer.server_info(&reply.version, &reply.title);
    if reply.demo_regime {
        if let Some(link) = reply.custom_about_link.as_deref().filter(|l| !l.is_empty()) {
            ctx.renderer.custom_about_link(link);
        }
    }
    ctx.renderer.set_databases(&ctx.state.settings.dbs);

    let location = ctx.state.nav.location();
    if location.trim_start_matches('#').is_empty() {
        if let Some(db) = ctx.active_db_owned() {
            ctx.navigate(format!("#{db}"));
        }
    }
    Ok(())
}

fn on_browse(ctx: &mut Context<'_>, req: &Value, data: &str) -> Result<(), SessionError> {
    let table = BrowseTable::parse(data);
    ctx.close_all_panels();
    ctx.state.selection.clear();
    ctx.renderer.render_table(&table);
    ctx.state.catalog.table = table;

    let Some(db) = ctx.active_db_owned() else {
        return Ok(());
    };
    let revisit = req.get("hashes").is_some()
        && matches!(ctx.state.nav.route(), Route::Detail { .. })
        && !ctx.state.catalog.table.is_empty();
    if revisit {
        ctx.state.nav.rearm();
    } else {
        ctx.navigate(format!("#{db}/{BROWSE_SEGMENT}"));
    }
    Ok(())
}

fn on_tags(ctx: &mut Context<'_>, req: &Value, data: &str) -> Result<(), SessionError> {
    let tags: Value = if data.trim().is_empty() {
        Value::Array(Vec::new())
    } else {
        serde_json::from_str(data)?
    };
    let filtered = req
        .get("tids")
        .and_then(Value::as_array)
        .is_some_and(|t| !t.is_empty());

    if filtered {
        ctx.renderer.render_tags(TagsUpdate::Filter(&tags));
        ctx.state.catalog.visible_tags = Some(tags);
    } else {
        ctx.renderer.render_tags(TagsUpdate::Taxonomy(&tags));
        ctx.state.catalog.taxonomy = Some(tags);
        ctx.state.catalog.visible_tags = None;
    }

    let Some(target) = req.get("switchto").and_then(Value::as_str) else {
        return Ok(());
    };
    if ctx.state.catalog.taxonomy_is_empty() {
        debug!(target, "empty taxonomy, staying on tag browser");
        ctx.debug_log("NO TAGS IN DATABASE");
        return Ok(());
    }
    if let Some(db) = ctx.active_db_owned() {
        ctx.navigate(format!("#{db}/{target}"));
    }
    Ok(())
}

fn on_list(ctx: &mut Context<'_>, req: &Value, data: &str) -> Result<(), SessionError> {
    let path = req.get("path").and_then(Value::as_str).unwrap_or_default();
    let transport = req
        .get("transport")
        .and_then(Value::as_str)
        .unwrap_or("local");
    ctx.state.file_tree.insert(transport.to_string());
    ctx.renderer.render_file_list(path, transport, data);
    Ok(())
}

fn on_report(ctx: &mut Context<'_>, req: &Value, data: &str) -> Result<(), SessionError> {
    let path = req.get("path").and_then(Value::as_str).unwrap_or_default();
    let directory = req.get("directory").and_then(Value::as_u64).unwrap_or(0);

    if directory < 1 {
        if data.is_empty() {
            ctx.renderer.scan_progress(ScanEvent::NoFiles { path });
            return Ok(());
        }
        ctx.renderer.scan_progress(ScanEvent::FileDone { path });
        ctx.send_when_idle(actions::BROWSE, Some(json!({"hashes": [data]})));
        return Ok(());
    }

    if data.is_empty() {
        ctx.state.scan.reset();
        ctx.renderer.scan_progress(ScanEvent::NoFiles { path });
        ctx.state.gate.release(&mut *ctx.renderer);
        return Ok(());
    }
    if data == KEEP_ALIVE {
        ctx.renderer.scan_progress(ScanEvent::KeepAlive);
        return Ok(());
    }

    let entry: ReportEntry = match serde_json::from_str(data) {
        Ok(entry) => entry,
        Err(e) => {
            ctx.state.scan.reset();
            ctx.state.gate.release(&mut *ctx.renderer);
            return Err(e.into());
        }
    };
    if !entry.filename.is_empty() {
        ctx.state.scan.multireceive += 1;
        ctx.renderer.scan_progress(ScanEvent::Entry {
            path,
            filename: &entry.filename,
            error: entry.error.as_deref(),
        });
    }
    if let Some(checksum) = entry.checksum.filter(|c| !c.is_empty()) {
        ctx.state.scan.checksums.push(checksum);
    }
    if !entry.finished {
        return Ok(());
    }

    let checksums = std::mem::take(&mut ctx.state.scan.checksums);
    let seen = ctx.state.scan.multireceive;
    ctx.state.scan.reset();
    info!(path, seen, added = checksums.len(), "directory scan finished");
    ctx.renderer.scan_progress(ScanEvent::Finished {
        path,
        added: checksums.len(),
    });
    ctx.state.gate.release(&mut *ctx.renderer);
    if !checksums.is_empty() {
        ctx.send(actions::BROWSE, Some(json!({"hashes": checksums})));
    }
    Ok(())
}

fn render_pane(
    ctx: &mut Context<'_>,
    req: &Value,
    data: &str,
    pane: Pane,
) -> Result<(), SessionError> {
    let hash = req_hash(req)?;
    if !ctx.state.panels.contains(&hash) {
        debug!(%hash, pane = pane.name(), "panel closed before reply arrived");
        return Ok(());
    }
    ctx.renderer
        .render_pane(&hash, pane, data, &ctx.state.settings.units);
    Ok(())
}

fn on_summary(ctx: &mut Context<'_>, req: &Value, data: &str) -> Result<(), SessionError> {
    render_pane(ctx, req, data, Pane::Summary)
}

fn on_phonons(ctx: &mut Context<'_>, req: &Value, data: &str) -> Result<(), SessionError> {
    let empty = data.trim().is_empty()
        || matches!(serde_json::from_str::<Value>(data), Ok(Value::Null));
    if empty {
        ctx.notify(Notice::info("No phonon information found!"));
        return Ok(());
    }
    render_pane(ctx, req, data, Pane::Phonons)
}

fn on_ph_dos(ctx: &mut Context<'_>, req: &Value, data: &str) -> Result<(), SessionError> {
    render_pane(ctx, req, data, Pane::PhDos)
}

fn on_e_dos(ctx: &mut Context<'_>, req: &Value, data: &str) -> Result<(), SessionError> {
    render_pane(ctx, req, data, Pane::EDos)
}

fn on_ph_bands(ctx: &mut Context<'_>, req: &Value, data: &str) -> Result<(), SessionError> {
    render_pane(ctx, req, data, Pane::PhBands)
}

fn on_e_bands(ctx: &mut Context<'_>, req: &Value, data: &str) -> Result<(), SessionError> {
    render_pane(ctx, req, data, Pane::EBands)
}

fn on_optstory(ctx: &mut Context<'_>, req: &Value, data: &str) -> Result<(), SessionError> {
    render_pane(ctx, req, data, Pane::OptStory)
}

fn on_estory(ctx: &mut Context<'_>, req: &Value, data: &str) -> Result<(), SessionError> {
    render_pane(ctx, req, data, Pane::EStory)
}

fn on_settings(ctx: &mut Context<'_>, req: &Value, data: &str) -> Result<(), SessionError> {
    match req.get("area").and_then(Value::as_str) {
        Some("path") => {
            ctx.state.settings.local_dir = Some(data.to_string());
            ctx.state.file_tree.clear();
            ctx.send(
                actions::LIST,
                Some(json!({"path": "", "transport": "local"})),
            );
        }
        Some("cols") => {
            let in_table = matches!(
                ctx.state.nav.route(),
                Route::Table { .. } | Route::Detail { .. }
            );
            if let Some(last) = ctx.state.gate.last_browse().cloned().filter(|_| in_table) {
                ctx.send(actions::BROWSE, Some(last));
            }
        }
        Some("switching") => {
            let db = req_str(req, "switching")?.to_string();
            ctx.state.settings.activate_db(&db);
            ctx.renderer.set_databases(&ctx.state.settings.dbs);
        }
        Some("general") => {
            ctx.notify(Notice::info("Saving new settings and restarting..."));
            ctx.send(actions::RESTART, None);
            ctx.debug_log("RESTART SIGNAL SENT");
            ctx.renderer.schedule_reload(crate::config::RELOAD_DELAY);
        }
        other => debug!(area = ?other, "settings acknowledged"),
    }
    ctx.persist_settings();
    ctx.debug_log("SETTINGS SAVED!");
    Ok(())
}

fn on_clean(ctx: &mut Context<'_>, req: &Value, _data: &str) -> Result<(), SessionError> {
    let db = req_str(req, "db")?;
    ctx.state.settings.remove_db(db);
    ctx.renderer.set_databases(&ctx.state.settings.dbs);
    ctx.persist_settings();
    ctx.debug_log(&format!("DATABASE {db} REMOVED"));
    Ok(())
}

fn on_db_create(ctx: &mut Context<'_>, req: &Value, _data: &str) -> Result<(), SessionError> {
    let name = format!("{}.db", req_str(req, "newname")?);
    if !ctx.state.settings.dbs.contains(&name) {
        ctx.state.settings.dbs.push(name.clone());
    }
    ctx.renderer.set_databases(&ctx.state.settings.dbs);
    ctx.persist_settings();
    ctx.debug_log(&format!("DATABASE {name} CREATED"));
    Ok(())
}

fn on_db_copy(ctx: &mut Context<'_>, req: &Value, _data: &str) -> Result<(), SessionError> {
    let dest = req.get("dest").and_then(Value::as_str).unwrap_or_default();
    let copied = req_strings(req, "tocopy").len();
    ctx.state.selection.clear();
    ctx.notify(Notice::info(format!("{copied} item(s) copied to {dest}")));
    Ok(())
}

fn on_delete(ctx: &mut Context<'_>, req: &Value, _data: &str) -> Result<(), SessionError> {
    let hashes = req_strings(req, "hashes");
    ctx.state.catalog.table.remove(&hashes);
    ctx.state.selection.retain(|h| !hashes.contains(h));
    ctx.renderer.remove_rows(&hashes);
    if ctx.state.catalog.table.is_empty() {
        if let Some(db) = ctx.active_db_owned() {
            ctx.navigate(format!("#{db}"));
        }
    }
    Ok(())
}

fn on_check_export(ctx: &mut Context<'_>, req: &Value, _data: &str) -> Result<(), SessionError> {
    let db = req_str(req, "db")?;
    let id = req_str(req, "id")?;
    ctx.renderer.download(&format!("/export/{db}/{id}"));
    Ok(())
}

fn on_try_pgconn(ctx: &mut Context<'_>, _req: &Value, _data: &str) -> Result<(), SessionError> {
    let settings = ctx.state.settings.to_value();
    ctx.send(
        actions::SETTINGS,
        Some(json!({"area": "general", "settings": settings})),
    );
    Ok(())
}

fn on_restart(ctx: &mut Context<'_>, _req: &Value, _data: &str) -> Result<(), SessionError> {
    ctx.debug_log("CORE RESTARTING");
    Ok(())
}

fn on_terminate(ctx: &mut Context<'_>, _req: &Value, _data: &str) -> Result<(), SessionError> {
    ctx.debug_log("CORE TERMINATED");
    Ok(())
}
