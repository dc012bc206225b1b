use crossbeam_channel::{unbounded, Sender};
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tilde_protocol::{decode, encode_frame, Frame};
use tilde_session::catalog::BrowseTable;
use tilde_session::renderer::BUSY_NOTICE;
use tilde_session::settings::{EnergyUnit, PhononUnit};
use tilde_session::{
    DbEngine, GeneralSettings, MemorySettingsStore, Notice, ObjectHash, Pane, PgCredentials,
    ScanEvent, SessionConfig, SessionController, SessionError, TagsUpdate, Transport,
    TransportError, TransportEvent, Units, Urgency, View, ViewRenderer,
};

#[derive(Default)]
struct FakeTransport {
    sent: Vec<String>,
    connects: usize,
}

impl Transport for FakeTransport {
    fn connect(&mut self) {
        self.connects += 1;
    }

    fn send(&mut self, wire: String) -> Result<(), TransportError> {
        self.sent.push(wire);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingRenderer {
    notices: Vec<Notice>,
    logs: Vec<String>,
    busy: Vec<bool>,
    views: Vec<View>,
    opened: Vec<String>,
    closed: Vec<String>,
    panes: Vec<(String, Pane)>,
    scan_entries: usize,
    scans_finished: Vec<usize>,
    dbs: Vec<String>,
    reloads: usize,
    about_link: Option<String>,
}

impl ViewRenderer for RecordingRenderer {
    fn notify(&mut self, notice: Notice) {
        self.notices.push(notice);
    }
    fn log(&mut self, line: &str) {
        self.logs.push(line.to_string());
    }
    fn set_busy(&mut self, busy: bool) {
        self.busy.push(busy);
    }
    fn show_view(&mut self, view: View) {
        self.views.push(view);
    }
    fn redirect_mirror(&mut self) {}
    fn custom_about_link(&mut self, url: &str) {
        self.about_link = Some(url.to_string());
    }
    fn server_info(&mut self, _version: &str, _title: &str) {}
    fn set_databases(&mut self, dbs: &[String]) {
        self.dbs = dbs.to_vec();
    }
    fn render_tags(&mut self, _update: TagsUpdate<'_>) {}
    fn render_table(&mut self, _table: &BrowseTable) {}
    fn remove_rows(&mut self, _checksums: &[String]) {}
    fn open_panel(&mut self, hash: &ObjectHash) {
        self.opened.push(hash.to_string());
    }
    fn close_panel(&mut self, hash: &ObjectHash) {
        self.closed.push(hash.to_string());
    }
    fn focus_pane(&mut self, _hash: &ObjectHash, _pane: Pane) {}
    fn render_pane(&mut self, hash: &ObjectHash, pane: Pane, _data: &str, _units: &Units) {
        self.panes.push((hash.to_string(), pane));
    }
    fn render_file_list(&mut self, _path: &str, _transport: &str, _listing: &str) {}
    fn scan_progress(&mut self, event: ScanEvent<'_>) {
        match event {
            ScanEvent::Entry { .. } => self.scan_entries += 1,
            ScanEvent::Finished { added, .. } => self.scans_finished.push(added),
            _ => {}
        }
    }
    fn download(&mut self, _url: &str) {}
    fn schedule_reload(&mut self, _after: Duration) {
        self.reloads += 1;
    }
}

type Controller = SessionController<FakeTransport, RecordingRenderer, MemorySettingsStore>;

struct Harness {
    ctl: Controller,
    tx: Sender<TransportEvent>,
    now: Instant,
}

fn hash(c: char) -> String {
    c.to_string().repeat(56)
}

fn oh(c: char) -> ObjectHash {
    ObjectHash::parse(&hash(c)).unwrap()
}

/// Browse reply data the way the server renders it.
fn rows(chars: &[char]) -> String {
    let body: String = chars
        .iter()
        .map(|c| {
            let sum = hash(*c);
            format!(
                "<tr id=i_{sum}><td><input type=checkbox id=d_cb_{sum} class=SHFT_cb></td>\
                 <td>Si2</td><td class=objects_expand><strong>click by row</strong></td></tr>"
            )
        })
        .collect();
    format!(
        "<thead><tr><th class=not-sortable><input type=\"checkbox\" id=\"d_cb_all\"></th>\
         <th rel=1><span>Formula</span></th></tr></thead><tbody>{body}</tbody>||||Matched items: {}",
        chars.len()
    )
}

const TAXONOMY: &str = r#"[{"category":"elements","content":[{"tid":1,"topic":"Si"}]}]"#;

impl Harness {
    fn new() -> Self {
        let (tx, rx) = unbounded();
        let config = SessionConfig {
            poll_interval: Duration::ZERO,
            ..SessionConfig::default()
        };
        let ctl = SessionController::new(
            config,
            FakeTransport::default(),
            RecordingRenderer::default(),
            MemorySettingsStore::new(),
            rx,
        )
        .unwrap();
        Self {
            ctl,
            tx,
            now: Instant::now(),
        }
    }

    /// Connected, logged in with `dbs`; the tag browser's `tags` request is
    /// in flight afterwards.
    fn logged_in(dbs: &[&str]) -> Self {
        let mut h = Self::new();
        h.ctl.start();
        h.open();
        h.login(dbs);
        h
    }

    fn tick(&mut self) {
        self.now += Duration::from_millis(10);
        self.ctl.tick(self.now);
    }

    fn advance(&mut self, by: Duration) {
        self.now += by;
        self.ctl.tick(self.now);
    }

    fn event(&mut self, event: TransportEvent) {
        self.tx.send(event).unwrap();
        self.tick();
    }

    fn open(&mut self) {
        self.event(TransportEvent::Opened);
    }

    fn login(&mut self, dbs: &[&str]) {
        self.login_with(json!({"version": "0.9", "title": "Tilde", "settings": {"dbs": dbs}}));
    }

    fn login_with(&mut self, data: Value) {
        self.reply("login", json!({}), &data.to_string());
    }

    /// Logged in and showing the table of a `browse {tids: [1]}` reply.
    fn browsing(chars: &[char]) -> Self {
        let mut h = Self::logged_in(&["mydb"]);
        h.reply("tags", json!({"tids": false}), TAXONOMY);
        h.ctl.browse_tags(&[1]);
        h.reply("browse", json!({"tids": [1]}), &rows(chars));
        h.tick();
        h
    }

    fn reply(&mut self, action: &str, req: Value, data: &str) {
        let wire = encode_frame(&Frame::reply(action, req, data));
        self.event(TransportEvent::Message(wire));
    }

    fn fail(&mut self, action: &str, req: Value, error: &str) {
        let wire = encode_frame(&Frame::failure(action, req, error));
        self.event(TransportEvent::Message(wire));
    }

    fn sent(&self) -> Vec<Frame> {
        self.ctl
            .transport()
            .sent
            .iter()
            .map(|w| decode(w).unwrap())
            .collect()
    }

    fn sent_actions(&self) -> Vec<String> {
        self.sent().into_iter().map(|f| f.action).collect()
    }

    fn count(&self, action: &str) -> usize {
        self.sent().iter().filter(|f| f.action == action).count()
    }

    fn renderer(&self) -> &RecordingRenderer {
        self.ctl.renderer()
    }

    fn last_notice(&self) -> Option<&Notice> {
        self.renderer().notices.last()
    }
}

#[test]
fn login_lands_on_active_database() {
    let h = Harness::logged_in(&["mydb"]);
    assert_eq!(h.ctl.location(), "#mydb");
    assert_eq!(h.sent_actions(), vec!["login", "tags"]);
    assert_eq!(h.sent()[1].req, json!({"tids": false}));
    assert_eq!(h.renderer().dbs, vec!["mydb"]);
    assert_eq!(h.ctl.store().saves(), 1);
}

#[test]
fn gate_admits_one_request_at_a_time() {
    let mut h = Harness::logged_in(&["mydb"]);
    assert!(h.ctl.state().gate.is_busy());

    h.ctl.browse_tags(&[1]);
    assert_eq!(h.sent_actions(), vec!["login", "tags"]);
    assert_eq!(h.last_notice().map(|n| n.text.as_str()), Some(BUSY_NOTICE));

    h.reply("tags", json!({"tids": false}), TAXONOMY);
    assert!(!h.ctl.state().gate.is_busy());
    h.ctl.browse_tags(&[1]);
    assert_eq!(h.sent_actions(), vec!["login", "tags", "browse"]);
}

#[test]
fn busy_gate_rejects_user_command() {
    let mut h = Harness::logged_in(&["mydb"]);
    let before = h.ctl.transport().sent.len();
    let notices = h.renderer().notices.len();

    h.ctl.browse_tags(&[]);

    assert_eq!(h.ctl.transport().sent.len(), before);
    assert!(h.ctl.state().gate.is_busy());
    assert_eq!(h.renderer().notices.len(), notices + 1);
    assert_eq!(h.last_notice().unwrap().urgency, Urgency::Info);
}

#[test]
fn interrupted_request_is_replayed_once_after_reconnect() {
    let mut h = Harness::logged_in(&["mydb"]);
    h.reply("tags", json!({"tids": false}), TAXONOMY);

    h.ctl.browse_tags(&[1]);
    h.event(TransportEvent::Closed);
    h.advance(Duration::from_secs(2));
    assert_eq!(h.ctl.transport().connects, 2);
    h.open();
    h.login(&["mydb"]);

    let browses: Vec<Frame> = h.sent().into_iter().filter(|f| f.action == "browse").collect();
    assert_eq!(browses.len(), 2);
    assert_eq!(browses[1].req, json!({"tids": [1]}));

    h.reply("browse", json!({"tids": [1]}), &rows(&['a']));
    assert!(h.ctl.state().gate.last_request().is_none());
    assert_eq!(h.ctl.location(), "#mydb/browse");

    h.ctl.restart();
    assert_eq!(h.count("restart"), 1);
    assert_eq!(h.renderer().reloads, 1);
    h.event(TransportEvent::Closed);
    h.advance(Duration::from_secs(2));
    h.open();
    h.login(&["mydb"]);

    assert_eq!(h.count("browse"), 2);
    assert_eq!(h.count("restart"), 1);
}

#[test]
fn unchanged_fragment_is_entered_once() {
    let mut h = Harness::logged_in(&["mydb"]);
    h.reply("tags", json!({"tids": false}), TAXONOMY);
    let sent = h.ctl.transport().sent.len();
    let views = h.renderer().views.len();

    for _ in 0..5 {
        h.tick();
    }
    h.ctl.navigate("#mydb");
    h.tick();

    assert_eq!(h.ctl.transport().sent.len(), sent);
    assert_eq!(h.renderer().views.len(), views);
}

#[test]
fn table_route_without_tags_loads_taxonomy_first() {
    let mut h = Harness::new();
    h.ctl.navigate("#mydb/browse");
    h.ctl.start();
    h.open();
    h.tick();
    assert_eq!(h.sent_actions(), vec!["login"]);

    h.login(&["mydb"]);
    assert_eq!(h.ctl.location(), "#mydb");
    h.tick();
    let tags: Vec<Frame> = h.sent().into_iter().filter(|f| f.action == "tags").collect();
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].req, json!({"tids": false, "switchto": "browse"}));

    h.reply("tags", tags[0].req.clone(), TAXONOMY);
    h.tick();
    h.tick();

    assert_eq!(h.ctl.location(), "#mydb/browse");
    assert_eq!(h.renderer().views.last(), Some(&View::Table));
    assert_eq!(h.count("tags"), 1);
}

#[test]
fn empty_taxonomy_does_not_loop() {
    let mut h = Harness::new();
    h.ctl.navigate("#mydb/browse");
    h.ctl.start();
    h.open();
    h.login(&["mydb"]);
    h.tick();
    h.reply("tags", json!({"tids": false, "switchto": "browse"}), "[]");
    for _ in 0..5 {
        h.tick();
    }
    assert_eq!(h.ctl.location(), "#mydb");
    assert_eq!(h.count("tags"), 1);
}

#[test]
fn detail_panels_stay_bounded() {
    let mut h = Harness::logged_in(&["mydb"]);
    h.reply("tags", json!({"tids": false}), TAXONOMY);
    h.ctl.browse_tags(&[1]);
    h.reply("browse", json!({"tids": [1]}), &rows(&['a', 'b', 'c', 'd']));

    let fragment = format!("#mydb/{}+{}+{}+{}", hash('a'), hash('b'), hash('c'), hash('d'));
    h.ctl.navigate(&fragment);
    h.tick();

    assert_eq!(h.ctl.state().panels.len(), 3);
    assert_eq!(
        h.ctl.location(),
        format!("#mydb/{}+{}+{}", hash('b'), hash('c'), hash('d'))
    );
    assert!(!h.renderer().opened.contains(&hash('a')));
    assert!(!h.renderer().closed.contains(&hash('a')));

    for c in ['b', 'c', 'd'] {
        h.reply("summary", json!({"datahash": hash(c)}), "{}");
        assert!(h.ctl.state().panels.len() <= 3);
    }
    let summaries: Vec<Value> = h
        .sent()
        .into_iter()
        .filter(|f| f.action == "summary")
        .map(|f| f.req["datahash"].clone())
        .collect();
    assert_eq!(summaries, vec![json!(hash('b')), json!(hash('c')), json!(hash('d'))]);

    // Settled after the rewrite: no second round of summaries.
    h.tick();
    assert_eq!(h.count("summary"), 3);
}

#[test]
fn row_clicks_evict_the_oldest_panel() {
    let mut h = Harness::logged_in(&["mydb"]);
    h.reply("tags", json!({"tids": false}), TAXONOMY);
    h.ctl.browse_tags(&[1]);
    h.reply("browse", json!({"tids": [1]}), &rows(&['a', 'b', 'c', 'd']));

    for c in ['a', 'b', 'c', 'd'] {
        h.ctl.open_object(&oh(c)).unwrap();
        h.tick();
        h.reply("summary", json!({"datahash": hash(c)}), "{}");
        assert!(h.ctl.state().panels.len() <= 3);
    }
    let open: Vec<String> = h.ctl.state().panels.iter().map(|p| p.to_string()).collect();
    assert_eq!(open, vec![hash('b'), hash('c'), hash('d')]);

    h.ctl.open_object(&oh('c')).unwrap();
    h.tick();
    assert!(!h.ctl.state().panels.contains(&oh('c')));
    assert_eq!(
        h.ctl.location(),
        format!("#mydb/{}+{}", hash('b'), hash('d'))
    );
}

#[test]
fn detail_without_rows_browses_then_opens() {
    let mut h = Harness::logged_in(&["mydb"]);
    h.reply("tags", json!({"tids": false}), TAXONOMY);

    h.ctl.navigate(&format!("#mydb/{}", hash('e')));
    h.tick();
    let last = h.sent().pop().unwrap();
    assert_eq!(last.action, "browse");
    assert_eq!(last.req, json!({"hashes": [hash('e')]}));

    h.reply("browse", last.req.clone(), &rows(&['e']));
    h.tick();
    assert_eq!(h.renderer().opened, vec![hash('e')]);
    assert_eq!(h.sent().pop().unwrap().req, json!({"datahash": hash('e')}));
}

#[test]
fn pane_data_is_requested_once() {
    let mut h = Harness::logged_in(&["mydb"]);
    h.reply("tags", json!({"tids": false}), TAXONOMY);
    h.ctl.browse_tags(&[1]);
    h.reply("browse", json!({"tids": [1]}), &rows(&['a']));
    h.ctl.open_object(&oh('a')).unwrap();
    h.tick();
    h.reply("summary", json!({"datahash": hash('a')}), "{}");

    h.ctl.open_pane(&oh('a'), Pane::Phonons).unwrap();
    h.reply("phonons", json!({"datahash": hash('a')}), "[[0.0, 120.5]]");
    h.ctl.open_pane(&oh('a'), Pane::Phonons).unwrap();
    h.ctl.open_pane(&oh('a'), Pane::View3d).unwrap();

    assert_eq!(h.count("phonons"), 1);
    assert!(h.renderer().panes.contains(&(hash('a'), Pane::Phonons)));
    assert!(h.ctl.open_pane(&oh('b'), Pane::Summary).is_err());
}

#[test]
fn directory_scan_releases_gate_once() {
    let mut h = Harness::logged_in(&["mydb"]);
    h.reply("tags", json!({"tids": false}), TAXONOMY);

    h.ctl.scan_directory("/data", true);
    let req = h.sent().pop().unwrap().req;
    assert_eq!(req["directory"], json!(2));
    let released_before = h.renderer().busy.iter().filter(|b| !**b).count();

    h.reply("report", req.clone(), "1");
    h.reply(
        "report",
        req.clone(),
        &json!({"filename": "a.out", "checksum": hash('a'), "finished": false}).to_string(),
    );
    assert!(h.ctl.state().gate.is_busy());
    h.ctl.list_dir("/");
    assert_eq!(h.count("list"), 0);

    h.reply(
        "report",
        req.clone(),
        &json!({"filename": "b.out", "error": "unparsable", "finished": false}).to_string(),
    );
    h.reply(
        "report",
        req.clone(),
        &json!({"filename": "c.out", "checksum": hash('c'), "finished": true}).to_string(),
    );

    let released_after = h.renderer().busy.iter().filter(|b| !**b).count();
    assert_eq!(released_after - released_before, 1);
    assert_eq!(h.renderer().scan_entries, 3);
    assert_eq!(h.renderer().scans_finished, vec![2]);
    let browse = h.sent().pop().unwrap();
    assert_eq!(browse.action, "browse");
    assert_eq!(browse.req, json!({"hashes": [hash('a'), hash('c')]}));
    assert_eq!(h.ctl.state().scan.multireceive, 0);
}

#[test]
fn empty_directory_scan_releases_gate() {
    let mut h = Harness::logged_in(&["mydb"]);
    h.reply("tags", json!({"tids": false}), TAXONOMY);
    h.ctl.scan_directory("/empty", false);
    let req = h.sent().pop().unwrap().req;
    assert_eq!(req["directory"], json!(1));

    h.reply("report", req, "");
    assert!(!h.ctl.state().gate.is_busy());
    assert_eq!(h.count("browse"), 0);
}

#[test]
fn server_errors_release_gate_and_skip_handler() {
    let mut h = Harness::logged_in(&["mydb"]);
    h.fail("tags", json!({"tids": false}), "Database is corrupted");

    assert!(!h.ctl.state().gate.is_busy());
    let notice = h.last_notice().unwrap();
    assert_eq!(notice.urgency, Urgency::Urgent);
    assert!(notice.text.contains("Database is corrupted"));
    assert!(h.ctl.state().catalog.taxonomy.is_none());

    h.reply("frobnicate", json!({}), "");
    assert!(h.last_notice().unwrap().text.contains("Unhandled action received"));
}

#[test]
fn switching_database_defers_entry_requests() {
    let mut h = Harness::logged_in(&["a.db", "b.db"]);
    h.reply("tags", json!({"tids": false}), TAXONOMY);

    h.ctl.navigate("#b.db");
    h.tick();
    let switch = h.sent().pop().unwrap();
    assert_eq!(switch.action, "settings");
    assert_eq!(switch.req, json!({"area": "switching", "switching": "b.db"}));
    assert!(h.ctl.state().catalog.taxonomy.is_none());

    h.reply("settings", switch.req.clone(), "");
    assert_eq!(h.ctl.settings().dbs, vec!["b.db", "a.db"]);
    assert_eq!(h.sent_actions().last().map(String::as_str), Some("tags"));
    assert_eq!(h.renderer().dbs, vec!["b.db", "a.db"]);
}

#[test]
fn unknown_location_redirects_to_active_database() {
    let mut h = Harness::logged_in(&["mydb"]);
    h.reply("tags", json!({"tids": false}), TAXONOMY);
    h.ctl.navigate("#mydb/not-a-hash");
    h.tick();
    assert!(h.last_notice().unwrap().text.contains("(404)"));
    assert_eq!(h.ctl.location(), "#mydb");
}

#[test]
fn close_object_outside_detail_is_reported() {
    let mut h = Harness::logged_in(&["mydb"]);
    h.reply("tags", json!({"tids": false}), TAXONOMY);
    let err = h.ctl.close_object(&oh('a')).unwrap_err();
    assert!(err.to_string().contains("ref #1"));
    assert!(h.last_notice().unwrap().text.contains("Unexpected behaviour"));
}

#[test]
fn reconnect_gives_up_after_ceiling() {
    let mut h = Harness::new();
    h.ctl.start();
    assert_eq!(h.ctl.transport().connects, 1);

    for _ in 0..5 {
        h.event(TransportEvent::Closed);
        h.advance(Duration::from_secs(2));
    }
    assert_eq!(h.ctl.transport().connects, 6);

    h.event(TransportEvent::Closed);
    h.advance(Duration::from_secs(10));
    assert_eq!(h.ctl.transport().connects, 6);
    assert_eq!(h.last_notice().unwrap().urgency, Urgency::Urgent);

    h.ctl.reconnect();
    assert_eq!(h.ctl.transport().connects, 7);
}

#[test]
fn viewport_caps_columns() {
    let mut h = Harness::logged_in(&["mydb"]);
    h.ctl.apply_viewport_width(640);
    assert_eq!(h.ctl.settings().cols.len(), 4);
    h.reply("tags", json!({"tids": false}), TAXONOMY);

    h.ctl.save_columns(vec![1, 2, 3, 4, 5]);
    assert_eq!(h.count("settings"), 0);
    h.ctl.save_columns(vec![1, 2]);
    let last = h.sent().pop().unwrap();
    assert_eq!(last.req["area"], json!("cols"));
    assert_eq!(last.req["settings"]["cols"], json!([1, 2]));
}

#[test]
fn server_table_markup_fills_rows() {
    let mut h = Harness::browsing(&['a', 'b']);
    assert_eq!(h.ctl.location(), "#mydb/browse");
    assert_eq!(h.ctl.state().catalog.table.len(), 2);
    assert_eq!(
        h.ctl.state().catalog.table.caption.as_deref(),
        Some("Matched items: 2")
    );
    assert!(h.renderer().notices.iter().all(|n| n.urgency != Urgency::Urgent));

    h.ctl.open_object(&oh('b')).unwrap();
    h.tick();
    assert_eq!(h.renderer().opened, vec![hash('b')]);
    assert_eq!(h.sent().pop().unwrap().req, json!({"datahash": hash('b')}));
}

#[test]
fn unit_change_redraws_table_without_tags() {
    let mut h = Harness::browsing(&['a']);
    h.ctl.set_units(Units {
        energy: EnergyUnit::Ry,
        phonons: PhononUnit::Thz,
    });

    let browses: Vec<Frame> = h.sent().into_iter().filter(|f| f.action == "browse").collect();
    assert_eq!(browses.len(), 2);
    assert_eq!(browses[1].req, json!({"tids": [1]}));
    assert_eq!(h.count("tags"), 1);
    assert_eq!(h.ctl.settings().units.energy, EnergyUnit::Ry);
}

#[test]
fn column_change_redraws_table() {
    let mut h = Harness::browsing(&['a']);
    h.ctl.save_columns(vec![1, 7]);
    let save = h.sent().pop().unwrap();
    assert_eq!(save.action, "settings");

    h.reply("settings", save.req.clone(), "");
    let last = h.sent().pop().unwrap();
    assert_eq!(last.action, "browse");
    assert_eq!(last.req, json!({"tids": [1]}));
    assert_eq!(h.count("tags"), 1);
}

#[test]
fn settings_changes_outside_table_do_not_browse() {
    let mut h = Harness::browsing(&['a']);
    h.ctl.navigate("#mydb");
    h.tick();
    assert_eq!(h.renderer().views.last(), Some(&View::Tags));

    h.ctl.set_units(Units {
        energy: EnergyUnit::Au,
        phonons: PhononUnit::InverseCm,
    });
    h.ctl.save_columns(vec![1, 7]);
    let save = h.sent().pop().unwrap();
    h.reply("settings", save.req.clone(), "");

    assert_eq!(h.count("browse"), 1);
}

fn server_db_block() -> Value {
    json!({
        "engine": "sqlite",
        "default_sqlite_db": "default.db",
        "host": "localhost",
        "port": 5432,
        "user": "tilde",
        "password": "",
        "dbname": "tilde"
    })
}

fn logged_in_with_db_block() -> Harness {
    let mut h = Harness::new();
    h.ctl.start();
    h.open();
    h.login_with(json!({
        "version": "0.9",
        "settings": {"dbs": ["mydb"], "db": server_db_block(), "webport": 8070}
    }));
    h.reply("tags", json!({"tids": false}), TAXONOMY);
    h
}

#[test]
fn general_settings_keep_server_db_fields() {
    let mut h = logged_in_with_db_block();
    h.ctl.save_general(GeneralSettings {
        title: Some("Lab".into()),
        debug_regime: false,
        demo_regime: false,
        webport: None,
        db: DbEngine::Sqlite,
    });

    let sent = h.sent().pop().unwrap();
    assert_eq!(sent.action, "settings");
    assert_eq!(sent.req["area"], json!("general"));
    assert_eq!(sent.req["settings"]["db"], server_db_block());
    assert_eq!(sent.req["settings"]["webport"], json!(8070));
}

#[test]
fn postgres_credentials_are_tested_with_the_full_db_block() {
    let mut h = logged_in_with_db_block();
    h.ctl.save_general(GeneralSettings {
        title: None,
        debug_regime: false,
        demo_regime: false,
        webport: Some(8071),
        db: DbEngine::Postgres(PgCredentials {
            host: "db.lab".into(),
            port: 5433,
            user: "admin".into(),
            password: "secret".into(),
            dbname: "materials".into(),
        }),
    });

    let sent = h.sent().pop().unwrap();
    assert_eq!(sent.action, "try_pgconn");
    let creds = &sent.req["creds"];
    assert_eq!(creds["engine"], json!("postgresql"));
    assert_eq!(creds["host"], json!("db.lab"));
    assert_eq!(creds["port"], json!(5433));
    assert_eq!(creds["default_sqlite_db"], json!("default.db"));
    assert_eq!(h.ctl.settings().extra["webport"], json!(8071));
}

#[test]
fn demo_mode_refuses_database_changes() {
    let mut h = Harness::new();
    h.ctl.start();
    h.open();
    h.login_with(json!({
        "version": "0.9",
        "demo_regime": true,
        "custom_about_link": "https://example.org/about",
        "settings": {"dbs": ["a.db", "b.db"]}
    }));
    h.reply("tags", json!({"tids": false}), TAXONOMY);
    assert_eq!(
        h.renderer().about_link.as_deref(),
        Some("https://example.org/about")
    );

    assert!(matches!(h.ctl.delete_db("b.db"), Err(SessionError::DemoRestricted)));
    assert!(matches!(h.ctl.create_db("fresh"), Err(SessionError::DemoRestricted)));
    assert_eq!(h.count("clean"), 0);
    assert_eq!(h.count("db_create"), 0);
    assert_eq!(h.last_notice().unwrap().urgency, Urgency::Urgent);
}

#[test]
fn about_link_is_ignored_outside_demo_mode() {
    let mut h = Harness::new();
    h.ctl.start();
    h.open();
    h.login_with(json!({
        "settings": {"dbs": ["a.db", "b.db"]},
        "custom_about_link": "https://example.org/about"
    }));
    h.reply("tags", json!({"tids": false}), TAXONOMY);
    assert!(h.renderer().about_link.is_none());

    h.ctl.delete_db("b.db").unwrap();
    assert_eq!(h.count("clean"), 1);
}
