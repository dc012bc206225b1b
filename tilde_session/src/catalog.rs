use crate::panels::{ObjectHash, HASH_LEN};
use serde_json::Value;

/// Separates the table markup from the count caption in browse replies.
pub const CAPTION_SEP: &str = "||||";
const ROW_MARKER: &str = "<tr id=";
const ROW_ID_PREFIX: &str = "i_";

/// Browse reply: server-rendered table markup kept as is, plus the
/// checksums of its rows in display order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrowseTable {
    pub markup: String,
    pub checksums: Vec<String>,
    pub caption: Option<String>,
}

impl BrowseTable {
    pub fn parse(data: &str) -> Self {
        let (markup, caption) = match data.split_once(CAPTION_SEP) {
            Some((markup, caption)) => (markup, Some(caption.trim().to_string())),
            None => (data, None),
        };
        Self {
            markup: markup.to_string(),
            checksums: row_ids(markup),
            caption: caption.filter(|c| !c.is_empty()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.checksums.is_empty()
    }

    pub fn len(&self) -> usize {
        self.checksums.len()
    }

    pub fn contains(&self, hash: &ObjectHash) -> bool {
        self.checksums.iter().any(|c| c == hash.as_str())
    }

    pub fn remove(&mut self, checksums: &[String]) -> usize {
        let before = self.checksums.len();
        self.checksums.retain(|c| !checksums.contains(c));
        before - self.checksums.len()
    }
}

/// Checksums from `<tr id=i_<hash>>` row markers.
fn row_ids(markup: &str) -> Vec<String> {
    markup
        .match_indices(ROW_MARKER)
        .filter_map(|(at, marker)| {
            let attr = markup[at + marker.len()..].trim_start_matches(['"', '\'']);
            let id = attr.strip_prefix(ROW_ID_PREFIX)?;
            let hash: String = id
                .chars()
                .take_while(char::is_ascii_alphanumeric)
                .collect();
            (hash.len() == HASH_LEN).then_some(hash)
        })
        .collect()
}

/// Cached view of the active database.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub taxonomy: Option<Value>,
    pub visible_tags: Option<Value>,
    pub table: BrowseTable,
}

impl Catalog {
    pub fn taxonomy_is_empty(&self) -> bool {
        match &self.taxonomy {
            None | Some(Value::Null) => true,
            Some(Value::Array(a)) => a.is_empty(),
            Some(Value::Object(o)) => o.is_empty(),
            Some(_) => false,
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
