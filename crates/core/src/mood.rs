use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

/// Class index produced by a classifier.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(transparent)]
pub struct MoodLabel(pub u32);

impl fmt::Display for MoodLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for MoodLabel {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

pub const FEAR_PREAMBLE: &str = "The speaker sounds afraid or anxious. Reply calmly, acknowledge the worry and offer gentle reassurance: ";
pub const SADNESS_PREAMBLE: &str = "The speaker sounds sad. Reply with warmth and empathy, and let them know they are being heard: ";
pub const ANGER_PREAMBLE: &str = "The speaker sounds frustrated. Just listen and let them vent without lecturing or judging: ";
pub const CALM_PREAMBLE: &str = "The speaker sounds calm. Give clear, practical advice: ";
pub const FALLBACK_PREAMBLE: &str = "You are a helpful assistant. ";

/// Label to instructional preamble lookup with a generic fallback.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreambleTable {
    preambles: BTreeMap<MoodLabel, String>,
    #[serde(default = "default_fallback")]
    fallback: String,
}

fn default_fallback() -> String {
    FALLBACK_PREAMBLE.to_owned()
}

impl Default for PreambleTable {
    fn default() -> Self {
        let preambles = [FEAR_PREAMBLE, SADNESS_PREAMBLE, ANGER_PREAMBLE, CALM_PREAMBLE]
            .into_iter()
            .enumerate()
            .map(|(i, p)| (MoodLabel(i as u32), p.to_owned()))
            .collect();
        Self {
            preambles,
            fallback: default_fallback(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PreambleError {
    #[error("failed to read preamble table {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid preamble table {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("preamble table {0} defines no preambles")]
    Empty(String),
}

impl PreambleTable {
    /// Loads `{"preambles": {"0": "...", ...}, "fallback": "..."}`.
    pub fn load(path: &Path) -> Result<Self, PreambleError> {
        let display = path.display().to_string();
        let raw = std::fs::read_to_string(path).map_err(|source| PreambleError::Io {
            path: display.clone(),
            source,
        })?;
        let table: Self = serde_json::from_str(&raw).map_err(|source| PreambleError::Parse {
            path: display.clone(),
            source,
        })?;
        if table.preambles.is_empty() {
            return Err(PreambleError::Empty(display));
        }
        Ok(table)
    }

    pub fn get(&self, label: MoodLabel) -> Option<&str> {
        self.preambles.get(&label).map(String::as_str)
    }

    /// Never fails: unmapped labels get the fallback preamble.
    pub fn resolve(&self, label: MoodLabel) -> &str {
        match self.get(label) {
            Some(p) => p,
            None => {
                tracing::warn!(%label, "no preamble for label, using fallback");
                &self.fallback
            }
        }
    }

    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn labels(&self) -> impl Iterator<Item = MoodLabel> + '_ {
        self.preambles.keys().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_table_maps_four_moods() {
        let table = PreambleTable::default();
        assert_eq!(table.labels().count(), 4);
        assert_eq!(table.resolve(MoodLabel(0)), FEAR_PREAMBLE);
        assert_eq!(table.resolve(MoodLabel(3)), CALM_PREAMBLE);
    }

    #[test]
    fn unknown_label_falls_back() {
        let table = PreambleTable::default();
        assert_eq!(table.get(MoodLabel(99)), None);
        assert_eq!(table.resolve(MoodLabel(99)), FALLBACK_PREAMBLE);
    }

    #[test]
    fn table_parses_with_default_fallback() {
        let table: PreambleTable =
            serde_json::from_str(r#"{"preambles": {"0": "Just listen. ", "2": "Advise. "}}"#)
                .unwrap();
        assert_eq!(table.resolve(MoodLabel(2)), "Advise. ");
        assert_eq!(table.resolve(MoodLabel(1)), FALLBACK_PREAMBLE);
    }

    #[test]
    fn bundled_japanese_table_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../assets/preambles.ja.json");
        let table = PreambleTable::load(&path).unwrap();
        assert_eq!(table.labels().count(), 3);
        assert_eq!(table.resolve(MoodLabel(1)), "共感を示してください");
        assert_eq!(table.resolve(MoodLabel(3)), FALLBACK_PREAMBLE);
    }

    #[test]
    fn empty_table_file_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"preambles": {}}"#).unwrap();
        let err = PreambleTable::load(file.path()).unwrap_err();
        assert!(matches!(err, PreambleError::Empty(_)));
    }

    #[test]
    fn malformed_table_file_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{not json").unwrap();
        let err = PreambleTable::load(file.path()).unwrap_err();
        assert!(matches!(err, PreambleError::Parse { .. }));
    }
}
