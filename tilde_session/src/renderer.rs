use crate::catalog::BrowseTable;
use crate::panels::{ObjectHash, Pane};
use crate::settings::Units;
use serde_json::Value;
use std::time::Duration;

pub const BUSY_NOTICE: &str =
    "Program core is now busy serving your request. Please, wait a bit and try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Urgent,
    Info,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub urgency: Urgency,
    pub text: String,
}

impl Notice {
    pub fn urgent(text: impl Into<String>) -> Self {
        Self {
            urgency: Urgency::Urgent,
            text: text.into(),
        }
    }

    pub fn info(text: impl Into<String>) -> Self {
        Self {
            urgency: Urgency::Info,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    Landing,
    About,
    Tags,
    Table,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TagsUpdate<'a> {
    Taxonomy(&'a Value),
    Filter(&'a Value),
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanEvent<'a> {
    Entry {
        path: &'a str,
        filename: &'a str,
        error: Option<&'a str>,
    },
    KeepAlive,
    NoFiles {
        path: &'a str,
    },
    Finished {
        path: &'a str,
        added: usize,
    },
    FileDone {
        path: &'a str,
    },
}

/// Presentation collaborator. Everything the session core shows to the user
/// goes through here.
pub trait ViewRenderer {
    fn notify(&mut self, notice: Notice);
    /// Debug console line.
    fn log(&mut self, line: &str);
    fn set_busy(&mut self, busy: bool);
    fn show_view(&mut self, view: View);
    fn redirect_mirror(&mut self);
    /// Operator-provided about page, offered in demo mode.
    fn custom_about_link(&mut self, url: &str);
    fn server_info(&mut self, version: &str, title: &str);
    fn set_databases(&mut self, dbs: &[String]);
    fn render_tags(&mut self, update: TagsUpdate<'_>);
    fn render_table(&mut self, table: &BrowseTable);
    fn remove_rows(&mut self, checksums: &[String]);
    fn open_panel(&mut self, hash: &ObjectHash);
    fn close_panel(&mut self, hash: &ObjectHash);
    fn focus_pane(&mut self, hash: &ObjectHash, pane: Pane);
    fn render_pane(&mut self, hash: &ObjectHash, pane: Pane, data: &str, units: &Units);
    fn render_file_list(&mut self, path: &str, transport: &str, listing: &str);
    fn scan_progress(&mut self, event: ScanEvent<'_>);
    fn download(&mut self, url: &str);
    fn schedule_reload(&mut self, after: Duration);
}
