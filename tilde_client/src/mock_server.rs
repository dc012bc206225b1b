//! Minimal in-process Tilde server for demos and integration tests.
//!
//! Serves one client at a time and answers every client frame with canned
//! four-field replies. Directory scans stream a keep-alive, one partial
//! entry and a final entry, like the real server does.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use serde_json::{json, Value};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tilde_protocol::{actions, decode, encode_frame, Frame};
use tilde_session::catalog::CAPTION_SEP;
use tilde_session::panels::HASH_LEN;
use tracing::{debug, info, warn};
use tungstenite::protocol::Message;

pub const VERSION: &str = "0.9.0-mock";

/// Server-side data the mock answers from.
#[derive(Debug, Clone)]
pub struct Fixture {
    pub dbs: Vec<String>,
    pub objects: Vec<Value>,
    pub taxonomy: Value,
}

impl Default for Fixture {
    fn default() -> Self {
        let objects = ["Si2", "GaAs", "NaCl"]
            .iter()
            .map(|formula| json!({"checksum": checksum(), "formula": formula, "energy": -10.25}))
            .collect();
        Self {
            dbs: vec!["default.db".to_string()],
            objects,
            taxonomy: json!([
                {"category": "elements", "content": [{"tid": 1, "topic": "Si"}, {"tid": 2, "topic": "Ga"}]},
                {"category": "calculation", "content": [{"tid": 3, "topic": "phonons"}]}
            ]),
        }
    }
}

impl Fixture {
    /// Table markup shaped like the real server's: one `<tr id=i_<checksum>>`
    /// per object, then the count caption.
    fn browse(&self, req: &Value) -> (String, usize) {
        let wanted: Option<Vec<&str>> = req
            .get("hashes")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).collect());
        let mut markup = String::from(
            "<thead><tr><th class=not-sortable><input type=\"checkbox\" id=\"d_cb_all\"></th>\
             <th rel=1><span>Formula</span></th><th rel=7><span>Energy</span></th></tr></thead><tbody>",
        );
        let mut count = 0;
        for object in &self.objects {
            let Some(sum) = object.get("checksum").and_then(Value::as_str) else {
                continue;
            };
            if wanted.as_ref().is_some_and(|w| !w.contains(&sum)) {
                continue;
            }
            count += 1;
            let formula = object.get("formula").and_then(Value::as_str).unwrap_or("?");
            let energy = object.get("energy").cloned().unwrap_or(Value::Null);
            markup.push_str(&format!(
                "<tr id=i_{sum}><td><input type=checkbox id=d_cb_{sum} class=SHFT_cb></td>\
                 <td>{formula}</td><td>{energy}</td></tr>"
            ));
        }
        markup.push_str("</tbody>");
        (format!("{markup}{CAPTION_SEP}Matched items: {count}"), count)
    }

    fn add_object(&mut self, filename: &str) -> String {
        let sum = checksum();
        self.objects
            .push(json!({"checksum": sum, "formula": filename, "energy": -3.5}));
        sum
    }

    fn respond(&mut self, frame: Frame) -> Vec<Frame> {
        let Frame { action, req, .. } = frame;
        let reply = |data: String| Frame::reply(&action, req.clone(), data);
        match action.as_str() {
            actions::LOGIN => vec![reply(
                json!({
                    "version": VERSION,
                    "title": "Tilde mock",
                    "debug_regime": false,
                    "demo_regime": false,
                    "settings": {"dbs": self.dbs},
                })
                .to_string(),
            )],
            actions::TAGS => vec![reply(self.taxonomy.to_string())],
            actions::BROWSE => match self.browse(&req) {
                (_, 0) => vec![Frame::failure(&action, req.clone(), "No objects match!")],
                (markup, _) => vec![reply(markup)],
            },
            actions::LIST => {
                let path = req.get("path").and_then(Value::as_str).unwrap_or_default();
                vec![reply(format!("<ul><li>{path}calc.out</li><li>{path}run/</li></ul>"))]
            }
            actions::REPORT => self.report(&action, &req),
            actions::SUMMARY => {
                let hash = req.get("datahash").cloned().unwrap_or(Value::Null);
                vec![reply(json!({"checksum": hash, "energy": -10.25}).to_string())]
            }
            actions::PHONONS => vec![reply("[[0.0, 0.0, 0.0, 120.5, 240.1, 310.9]]".to_string())],
            actions::PH_DOS | actions::E_DOS | actions::PH_BANDS | actions::E_BANDS
            | actions::OPTSTORY | actions::ESTORY => {
                vec![reply(json!({"x": [0, 1, 2], "y": [0.0, 0.5, 0.1]}).to_string())]
            }
            actions::SETTINGS => match req.get("area").and_then(Value::as_str) {
                Some("path") => {
                    let path = req.get("path").and_then(Value::as_str).unwrap_or("/");
                    vec![reply(path.to_string())]
                }
                Some("switching") => {
                    if let Some(db) = req.get("switching").and_then(Value::as_str) {
                        self.dbs.retain(|d| d != db);
                        self.dbs.insert(0, db.to_string());
                    }
                    vec![reply(String::new())]
                }
                _ => vec![reply(String::new())],
            },
            actions::CLEAN => {
                if let Some(db) = req.get("db").and_then(Value::as_str) {
                    self.dbs.retain(|d| d != db);
                }
                vec![reply(String::new())]
            }
            actions::DB_CREATE => {
                if let Some(name) = req.get("newname").and_then(Value::as_str) {
                    self.dbs.push(format!("{name}.db"));
                }
                vec![reply(String::new())]
            }
            actions::DELETE => {
                let gone: Vec<&str> = req
                    .get("hashes")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(Value::as_str).collect())
                    .unwrap_or_default();
                self.objects.retain(|o| {
                    !o.get("checksum")
                        .and_then(Value::as_str)
                        .is_some_and(|c| gone.contains(&c))
                });
                vec![reply(String::new())]
            }
            actions::DB_COPY | actions::CHECK_EXPORT | actions::TRY_PGCONN | actions::RESTART
            | actions::TERMINATE => vec![reply(String::new())],
            other => vec![Frame::failure(
                other,
                req.clone(),
                format!("No server handler for action: {other}"),
            )],
        }
    }

    fn report(&mut self, action: &str, req: &Value) -> Vec<Frame> {
        let directory = req.get("directory").and_then(Value::as_u64).unwrap_or(0);
        let path = req.get("path").and_then(Value::as_str).unwrap_or_default();
        if directory < 1 {
            let sum = self.add_object(path);
            return vec![Frame::reply(action, req.clone(), sum)];
        }
        let first = self.add_object("relax.out");
        let second = self.add_object("phonons.out");
        [
            "1".to_string(),
            json!({"filename": format!("{path}/relax.out"), "checksum": first, "finished": false}).to_string(),
            json!({"filename": format!("{path}/broken.out"), "error": "unknown format", "finished": false}).to_string(),
            json!({"filename": format!("{path}/phonons.out"), "checksum": second, "finished": true}).to_string(),
        ]
        .into_iter()
        .map(|data| Frame::reply(action, req.clone(), data))
        .collect()
    }
}

pub fn checksum() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(HASH_LEN)
        .map(char::from)
        .collect()
}

pub struct MockServer {
    shutdown: Arc<AtomicBool>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
    listen_addr: SocketAddr,
}

impl MockServer {
    pub fn spawn_with_addr(addr: &str, fixture: Fixture) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        let listen_addr = listener.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_for_thread = Arc::clone(&shutdown);

        let join_handle = thread::spawn(move || serve(listener, fixture, shutdown_for_thread));
        info!(%listen_addr, "mock server listening");

        Ok(Self {
            shutdown,
            join_handle: Mutex::new(Some(join_handle)),
            listen_addr,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        self.listen_addr
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Ok(mut h) = self.join_handle.lock() {
            if let Some(h) = h.take() {
                let _ = h.join();
            }
        }
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn serve(listener: TcpListener, mut fixture: Fixture, shutdown: Arc<AtomicBool>) {
    let mut active: Option<tungstenite::WebSocket<TcpStream>> = None;

    while !shutdown.load(Ordering::Relaxed) {
        // Single-client policy: a new connection replaces the old one.
        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    let _ = stream.set_nonblocking(false);
                    let _ = stream.set_nodelay(true);
                    let _ = stream.set_read_timeout(Some(Duration::from_millis(30)));
                    let _ = stream.set_write_timeout(Some(Duration::from_millis(200)));
                    match tungstenite::accept(stream) {
                        Ok(ws) => {
                            debug!(%peer, "client connected");
                            if let Some(mut prev) = active.replace(ws) {
                                let _ = prev.close(None);
                            }
                        }
                        Err(e) => warn!(error = %e, "ws handshake failed"),
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    break;
                }
            }
        }

        let Some(ws) = active.as_mut() else {
            thread::sleep(Duration::from_millis(25));
            continue;
        };

        match ws.read() {
            Ok(Message::Text(text)) => {
                if answer(ws, &mut fixture, text.as_str()).is_err() {
                    active = None;
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = ws.send(Message::Pong(payload));
            }
            Ok(Message::Close(_)) => {
                debug!("client closed");
                active = None;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                debug!(error = %e, "client dropped");
                active = None;
            }
        }
    }

    if let Some(mut ws) = active {
        let _ = ws.close(None);
    }
}

fn answer(
    ws: &mut tungstenite::WebSocket<TcpStream>,
    fixture: &mut Fixture,
    wire: &str,
) -> Result<(), tungstenite::Error> {
    let frame = match decode(wire) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(error = %e, "undecodable client frame");
            return Ok(());
        }
    };
    debug!(action = %frame.action, "client request");
    for reply in fixture.respond(frame) {
        ws.send(Message::Text(encode_frame(&reply).into()))?;
    }
    Ok(())
}
