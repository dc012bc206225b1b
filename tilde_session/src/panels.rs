use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;
use std::str::FromStr;

pub const HASH_LEN: usize = 56;
pub const MAX_PANELS: usize = 3;

/// Content hash identifying one calculation record.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ObjectHash(String);

impl ObjectHash {
    /// Any 56-character segment counts as a hash.
    pub fn parse(s: &str) -> Option<Self> {
        (s.chars().count() == HASH_LEN).then(|| Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Detail panes of an opened object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pane {
    Summary,
    View3d,
    Phonons,
    PhDos,
    EDos,
    PhBands,
    EBands,
    OptStory,
    EStory,
}

impl Pane {
    pub const ALL: [Pane; 9] = [
        Pane::Summary,
        Pane::View3d,
        Pane::Phonons,
        Pane::PhDos,
        Pane::EDos,
        Pane::PhBands,
        Pane::EBands,
        Pane::OptStory,
        Pane::EStory,
    ];

    pub fn name(self) -> &'static str {
        use tilde_protocol::actions;
        match self {
            Pane::View3d => "3dview",
            Pane::Summary => actions::SUMMARY,
            Pane::Phonons => actions::PHONONS,
            Pane::PhDos => actions::PH_DOS,
            Pane::EDos => actions::E_DOS,
            Pane::PhBands => actions::PH_BANDS,
            Pane::EBands => actions::E_BANDS,
            Pane::OptStory => actions::OPTSTORY,
            Pane::EStory => actions::ESTORY,
        }
    }

    /// Server action feeding this pane. The 3D view is filled client-side.
    pub fn action(self) -> Option<&'static str> {
        match self {
            Pane::View3d => None,
            other => Some(other.name()),
        }
    }

    pub fn from_action(action: &str) -> Option<Pane> {
        Self::ALL.into_iter().find(|p| p.action() == Some(action))
    }
}

impl FromStr for Pane {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.name() == s)
            .ok_or_else(|| format!("unknown pane `{s}`"))
    }
}

pub fn tab_id(hash: &ObjectHash, pane: Pane) -> String {
    format!("{}_{}", hash, pane.name())
}

/// Objects currently shown as detail panels, oldest first.
#[derive(Debug, Clone)]
pub struct RenderedPanels {
    order: VecDeque<ObjectHash>,
    cap: usize,
}

impl Default for RenderedPanels {
    fn default() -> Self {
        Self::with_cap(MAX_PANELS)
    }
}

impl RenderedPanels {
    pub fn with_cap(cap: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(cap),
            cap: cap.max(1),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.order.len() >= self.cap
    }

    pub fn contains(&self, hash: &ObjectHash) -> bool {
        self.order.contains(hash)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ObjectHash> {
        self.order.iter()
    }

    /// Adds `hash`, returning the evicted oldest panel when at the cap.
    pub fn insert(&mut self, hash: ObjectHash) -> Option<ObjectHash> {
        if self.contains(&hash) {
            return None;
        }
        let evicted = if self.is_full() {
            self.order.pop_front()
        } else {
            None
        };
        self.order.push_back(hash);
        evicted
    }

    pub fn remove(&mut self, hash: &ObjectHash) -> bool {
        let before = self.order.len();
        self.order.retain(|h| h != hash);
        before != self.order.len()
    }

    pub fn clear(&mut self) -> Vec<ObjectHash> {
        self.order.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(c: char) -> ObjectHash {
        ObjectHash::parse(&c.to_string().repeat(HASH_LEN)).unwrap()
    }

    #[test]
    fn hash_is_length_only() {
        assert!(ObjectHash::parse(&"a".repeat(56)).is_some());
        assert!(ObjectHash::parse(&"a".repeat(55)).is_none());
        assert!(ObjectHash::parse("browse").is_none());
    }

    #[test]
    fn fifo_eviction_at_cap() {
        let mut panels = RenderedPanels::default();
        assert_eq!(panels.insert(h('a')), None);
        assert_eq!(panels.insert(h('b')), None);
        assert_eq!(panels.insert(h('c')), None);
        assert_eq!(panels.insert(h('a')), None);
        assert_eq!(panels.insert(h('d')), Some(h('a')));
        assert_eq!(panels.len(), 3);
        let order: Vec<_> = panels.iter().cloned().collect();
        assert_eq!(order, vec![h('b'), h('c'), h('d')]);
    }

    #[test]
    fn pane_names_round_trip() {
        for pane in Pane::ALL {
            assert_eq!(pane.name().parse::<Pane>().unwrap(), pane);
        }
        assert_eq!(Pane::from_action("ph_dos"), Some(Pane::PhDos));
        assert_eq!(Pane::from_action("browse"), None);
        assert_eq!(tab_id(&h('a'), Pane::EBands), format!("{}_e_bands", "a".repeat(56)));
    }
}
