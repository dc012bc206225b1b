use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Key of the settings blob inside the client-local key-value store.
pub const SETTINGS_KEY: &str = "tilde_settings";

const DEFAULT_COLS: [u32; 9] = [1, 1002, 7, 25, 17, 9, 10, 12, 22];
const DEFAULT_COLNUM: u32 = 100;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnergyUnit {
    #[serde(rename = "au")]
    Au,
    #[default]
    #[serde(rename = "eV")]
    Ev,
    #[serde(rename = "Ry")]
    Ry,
}

impl EnergyUnit {
    /// Multiplier applied to a value expressed in eV.
    pub fn factor(self) -> f64 {
        match self {
            EnergyUnit::Au => 0.03674932601,
            EnergyUnit::Ev => 1.0,
            EnergyUnit::Ry => 0.07349861206,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            EnergyUnit::Au => "au",
            EnergyUnit::Ev => "eV",
            EnergyUnit::Ry => "Ry",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PhononUnit {
    #[default]
    #[serde(rename = "cm^-1", alias = "cm<sup>-1</sup>")]
    InverseCm,
    #[serde(rename = "THz")]
    Thz,
}

impl PhononUnit {
    /// Multiplier applied to a frequency expressed in cm^-1.
    pub fn factor(self) -> f64 {
        match self {
            PhononUnit::InverseCm => 1.0,
            PhononUnit::Thz => 0.029979,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PhononUnit::InverseCm => "cm^-1",
            PhononUnit::Thz => "THz",
        }
    }
}

#[derive(Debug, Error)]
#[error("unknown unit `{0}`")]
pub struct UnknownUnit(pub String);

impl FromStr for EnergyUnit {
    type Err = UnknownUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "au" => Ok(EnergyUnit::Au),
            "eV" | "ev" => Ok(EnergyUnit::Ev),
            "Ry" | "ry" => Ok(EnergyUnit::Ry),
            other => Err(UnknownUnit(other.to_string())),
        }
    }
}

impl FromStr for PhononUnit {
    type Err = UnknownUnit;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cm^-1" | "cm-1" => Ok(PhononUnit::InverseCm),
            "THz" | "thz" => Ok(PhononUnit::Thz),
            other => Err(UnknownUnit(other.to_string())),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Units {
    #[serde(default)]
    pub energy: EnergyUnit,
    #[serde(default)]
    pub phonons: PhononUnit,
}

impl Units {
    pub fn energy_from_ev(&self, value: f64) -> f64 {
        value * self.energy.factor()
    }

    pub fn frequency_from_inverse_cm(&self, value: f64) -> f64 {
        value * self.phonons.factor()
    }
}

/// Client settings, merged from server pushes and local edits.
///
/// `dbs[0]` is the active database. Keys the client does not interpret (db
/// credentials, web port, ...) are kept in `extra` and sent back verbatim.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub dbs: Vec<String>,
    #[serde(default)]
    pub units: Units,
    #[serde(default = "default_cols")]
    pub cols: Vec<u32>,
    #[serde(default = "default_colnum")]
    pub colnum: u32,
    #[serde(default = "default_true")]
    pub objects_expand: bool,
    #[serde(default)]
    pub local_dir: Option<String>,
    #[serde(default)]
    pub skip_unfinished: bool,
    #[serde(default, deserialize_with = "string_or_false")]
    pub skip_if_path: Option<String>,
    #[serde(default)]
    pub exportability: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub debug_regime: bool,
    #[serde(default)]
    pub demo_regime: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_cols() -> Vec<u32> {
    DEFAULT_COLS.to_vec()
}

fn default_colnum() -> u32 {
    DEFAULT_COLNUM
}

fn default_true() -> bool {
    true
}

// The server stores `false` when path masking is off.
fn string_or_false<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) if !s.is_empty() => Some(s),
        _ => None,
    })
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dbs: Vec::new(),
            units: Units::default(),
            cols: default_cols(),
            colnum: DEFAULT_COLNUM,
            objects_expand: true,
            local_dir: None,
            skip_unfinished: false,
            skip_if_path: None,
            exportability: false,
            title: None,
            debug_regime: false,
            demo_regime: false,
            extra: Map::new(),
        }
    }
}

impl Settings {
    pub fn active_db(&self) -> Option<&str> {
        self.dbs.first().map(String::as_str)
    }

    /// Overwrites top-level keys with the ones in `patch`.
    pub fn merge(&mut self, patch: &Map<String, Value>) -> Result<(), serde_json::Error> {
        let mut current = serde_json::to_value(&*self)?;
        if let Value::Object(map) = &mut current {
            for (k, v) in patch {
                map.insert(k.clone(), v.clone());
            }
        }
        *self = serde_json::from_value(current)?;
        Ok(())
    }

    /// Moves `db` to the front of the database list.
    pub fn activate_db(&mut self, db: &str) {
        self.dbs.retain(|d| d != db);
        self.dbs.insert(0, db.to_string());
    }

    pub fn remove_db(&mut self, db: &str) {
        self.dbs.retain(|d| d != db);
    }

    pub fn clamp_columns(&mut self, max_cols: usize) -> bool {
        if self.cols.len() > max_cols {
            self.cols.truncate(max_cols);
            return true;
        }
        false
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("settings store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("settings store holds invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

pub trait SettingsStore {
    fn load(&self) -> Result<Option<Settings>, StoreError>;
    fn save(&mut self, settings: &Settings) -> Result<(), StoreError>;
}

/// Loads the persisted settings, falling back to defaults.
pub fn load_or_default(store: &dyn SettingsStore) -> Settings {
    match store.load() {
        Ok(Some(settings)) => settings,
        Ok(None) => Settings::default(),
        Err(e) => {
            tracing::warn!(error = %e, "persisted settings unreadable, using defaults");
            Settings::default()
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemorySettingsStore {
    blob: Map<String, Value>,
    saves: usize,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: &Settings) -> Self {
        let mut blob = Map::new();
        blob.insert(SETTINGS_KEY.to_string(), settings.to_value());
        Self { blob, saves: 0 }
    }

    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl SettingsStore for MemorySettingsStore {
    fn load(&self) -> Result<Option<Settings>, StoreError> {
        match self.blob.get(SETTINGS_KEY) {
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
            None => Ok(None),
        }
    }

    fn save(&mut self, settings: &Settings) -> Result<(), StoreError> {
        self.blob
            .insert(SETTINGS_KEY.to_string(), serde_json::to_value(settings)?);
        self.saves += 1;
        Ok(())
    }
}

/// Key-value JSON file; the settings live under [`SETTINGS_KEY`] and other
/// keys in the file are left untouched.
#[derive(Debug, Clone)]
pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_blob(&self) -> Result<Map<String, Value>, StoreError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let raw = std::fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<Option<Settings>, StoreError> {
        let blob = self.read_blob()?;
        match blob.get(SETTINGS_KEY) {
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
            None => Ok(None),
        }
    }

    fn save(&mut self, settings: &Settings) -> Result<(), StoreError> {
        let mut blob = self.read_blob()?;
        blob.insert(SETTINGS_KEY.to_string(), serde_json::to_value(settings)?);
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&blob)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_match_first_run() {
        let s = Settings::default();
        assert!(s.dbs.is_empty());
        assert_eq!(s.cols, vec![1, 1002, 7, 25, 17, 9, 10, 12, 22]);
        assert_eq!(s.colnum, 100);
        assert!(s.objects_expand);
        assert_eq!(s.units.energy, EnergyUnit::Ev);
    }

    #[test]
    fn merge_keeps_untouched_keys_and_unknown_extras() {
        let mut s = Settings::default();
        s.cols = vec![1, 2];
        let patch = json!({
            "dbs": ["a.db", "b.db"],
            "skip_if_path": false,
            "local_dir": "/data/",
            "webport": 8070,
            "units": {"energy": "Ry", "phonons": "cm<sup>-1</sup>"}
        });
        s.merge(patch.as_object().unwrap()).unwrap();
        assert_eq!(s.dbs, vec!["a.db", "b.db"]);
        assert_eq!(s.cols, vec![1, 2]);
        assert_eq!(s.skip_if_path, None);
        assert_eq!(s.local_dir.as_deref(), Some("/data/"));
        assert_eq!(s.units.energy, EnergyUnit::Ry);
        assert_eq!(s.units.phonons, PhononUnit::InverseCm);
        assert_eq!(s.extra.get("webport"), Some(&json!(8070)));
        assert_eq!(s.to_value()["webport"], json!(8070));
    }

    #[test]
    fn activate_db_moves_to_front() {
        let mut s = Settings::default();
        s.dbs = vec!["a.db".into(), "b.db".into(), "c.db".into()];
        s.activate_db("c.db");
        assert_eq!(s.dbs, vec!["c.db", "a.db", "b.db"]);
        assert_eq!(s.active_db(), Some("c.db"));
    }

    #[test]
    fn unit_factors() {
        let units = Units {
            energy: EnergyUnit::Au,
            phonons: PhononUnit::Thz,
        };
        assert!((units.energy_from_ev(27.211386) - 1.0).abs() < 1e-6);
        assert!((units.frequency_from_inverse_cm(100.0) - 2.9979).abs() < 1e-9);
        assert!("furlongs".parse::<EnergyUnit>().is_err());
    }

    #[test]
    fn memory_store_round_trips() {
        let mut store = MemorySettingsStore::new();
        assert!(store.load().unwrap().is_none());
        let mut s = Settings::default();
        s.dbs.push("x.db".into());
        store.save(&s).unwrap();
        assert_eq!(store.load().unwrap(), Some(s));
        assert_eq!(store.saves(), 1);
    }

    #[test]
    fn file_store_preserves_foreign_keys() {
        let dir = std::env::temp_dir().join(format!("tilde-store-{}", std::process::id()));
        let path = dir.join("client.json");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(&path, r#"{"other_app": {"k": 1}}"#).unwrap();

        let mut store = FileSettingsStore::new(&path);
        assert!(store.load().unwrap().is_none());
        let mut s = Settings::default();
        s.dbs.push("default.db".into());
        store.save(&s).unwrap();

        let raw: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["other_app"]["k"], json!(1));
        assert_eq!(store.load().unwrap().unwrap().dbs, vec!["default.db"]);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
