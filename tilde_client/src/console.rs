use serde_json::Value;
use std::io::Write;
use std::time::Duration;
use tilde_session::catalog::BrowseTable;
use tilde_session::{
    Notice, ObjectHash, Pane, ScanEvent, TagsUpdate, Units, Urgency, View, ViewRenderer,
};

/// Line-oriented renderer for a terminal.
pub struct ConsoleRenderer<W: Write> {
    out: W,
    debug_console: bool,
    busy: bool,
    reload_requested: Option<Duration>,
}

impl<W: Write> ConsoleRenderer<W> {
    pub fn new(out: W, debug_console: bool) -> Self {
        Self {
            out,
            debug_console,
            busy: false,
            reload_requested: None,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Delay of a reload the core asked for, cleared on read.
    pub fn take_reload(&mut self) -> Option<Duration> {
        self.reload_requested.take()
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, text: &str) {
        let _ = writeln!(self.out, "{text}");
    }

    fn tags(&mut self, label: &str, tags: &Value) {
        let Some(categories) = tags.as_array() else {
            self.line(&format!("{label}: {tags}"));
            return;
        };
        self.line(&format!("{label}:"));
        for cat in categories {
            let name = cat.get("category").and_then(Value::as_str).unwrap_or("?");
            let topics: Vec<String> = cat
                .get("content")
                .and_then(Value::as_array)
                .map(|c| {
                    c.iter()
                        .map(|t| {
                            let tid = t.get("tid").map(Value::to_string).unwrap_or_default();
                            let topic = t.get("topic").and_then(Value::as_str).unwrap_or("?");
                            format!("{topic}[{tid}]")
                        })
                        .collect()
                })
                .unwrap_or_default();
            self.line(&format!("  {name}: {}", topics.join(" ")));
        }
    }
}

fn summary_text(data: &str, units: &Units) -> String {
    let Ok(Value::Object(summary)) = serde_json::from_str::<Value>(data) else {
        return data.to_string();
    };
    summary
        .iter()
        .map(|(k, v)| match (k.as_str(), v.as_f64()) {
            ("energy", Some(ev)) => format!(
                "energy = {:.6} {}",
                units.energy_from_ev(ev),
                units.energy.label()
            ),
            _ => format!("{k} = {v}"),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn phonon_text(data: &str, units: &Units) -> String {
    let Ok(Value::Array(modes)) = serde_json::from_str::<Value>(data) else {
        return data.to_string();
    };
    let freqs: Vec<String> = modes
        .iter()
        .filter_map(Value::as_array)
        .flatten()
        .filter_map(Value::as_f64)
        .map(|f| format!("{:.2}", units.frequency_from_inverse_cm(f)))
        .collect();
    format!("{} {}", freqs.join(" "), units.phonons.label())
}

impl<W: Write> ViewRenderer for ConsoleRenderer<W> {
    fn notify(&mut self, notice: Notice) {
        let tag = match notice.urgency {
            Urgency::Urgent => "!!",
            Urgency::Info => "--",
        };
        self.line(&format!("{tag} {}", notice.text));
    }

    fn log(&mut self, line: &str) {
        if self.debug_console {
            self.line(&format!("[debug] {line}"));
        }
    }

    fn set_busy(&mut self, busy: bool) {
        self.busy = busy;
    }

    fn show_view(&mut self, view: View) {
        let name = match view {
            View::Landing => "Welcome to Tilde. Type `help` for commands.",
            View::About => "Tilde: a repository of computed materials.",
            View::Tags => "== tags ==",
            View::Table => "== table ==",
        };
        self.line(name);
    }

    fn redirect_mirror(&mut self) {
        self.line("Demo mode: please use the read-only mirror.");
    }

    fn custom_about_link(&mut self, url: &str) {
        self.line(&format!("About this repository: {url}"));
    }

    fn server_info(&mut self, version: &str, title: &str) {
        self.line(&format!("{title} (core {version})"));
    }

    fn set_databases(&mut self, dbs: &[String]) {
        let listed: Vec<String> = dbs
            .iter()
            .enumerate()
            .map(|(i, d)| if i == 0 { format!("*{d}") } else { d.clone() })
            .collect();
        self.line(&format!("databases: {}", listed.join(" ")));
    }

    fn render_tags(&mut self, update: TagsUpdate<'_>) {
        match update {
            TagsUpdate::Taxonomy(tags) => self.tags("tags", tags),
            TagsUpdate::Filter(tags) => self.tags("compatible tags", tags),
            TagsUpdate::Reset => self.line("tag filter cleared"),
        }
    }

    fn render_table(&mut self, table: &BrowseTable) {
        for checksum in &table.checksums {
            self.line(&format!("  {checksum}"));
        }
        if table.is_empty() {
            self.line("No data, let's add!");
        }
        if let Some(caption) = table.caption.clone() {
            self.line(&caption);
        }
    }

    fn remove_rows(&mut self, checksums: &[String]) {
        self.line(&format!("{} row(s) removed", checksums.len()));
    }

    fn open_panel(&mut self, hash: &ObjectHash) {
        self.line(&format!("+ {hash}"));
    }

    fn close_panel(&mut self, hash: &ObjectHash) {
        self.line(&format!("- {hash}"));
    }

    fn focus_pane(&mut self, hash: &ObjectHash, pane: Pane) {
        self.line(&format!("[{hash}] {}", pane.name()));
    }

    fn render_pane(&mut self, hash: &ObjectHash, pane: Pane, data: &str, units: &Units) {
        let body = match pane {
            Pane::Summary => summary_text(data, units),
            Pane::Phonons => phonon_text(data, units),
            _ => data.to_string(),
        };
        self.line(&format!("[{hash}] {}: {body}", pane.name()));
    }

    fn render_file_list(&mut self, path: &str, transport: &str, listing: &str) {
        self.line(&format!("{transport}:{path}"));
        self.line(listing);
    }

    fn scan_progress(&mut self, event: ScanEvent<'_>) {
        match event {
            ScanEvent::Entry {
                filename,
                error: Some(err),
                ..
            } => self.line(&format!("  {filename}: {err}")),
            ScanEvent::Entry { filename, .. } => self.line(&format!("  {filename}")),
            ScanEvent::KeepAlive => {}
            ScanEvent::NoFiles { path } => self.line(&format!("nothing to scan in {path}")),
            ScanEvent::Finished { path, added } => {
                self.line(&format!("{path}: {added} object(s) added"))
            }
            ScanEvent::FileDone { path } => self.line(&format!("{path} processed")),
        }
    }

    fn download(&mut self, url: &str) {
        self.line(&format!("download: {url}"));
    }

    fn schedule_reload(&mut self, after: Duration) {
        self.reload_requested = Some(after);
    }
}
