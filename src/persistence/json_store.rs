//! JSON files on disk
//!
//! ```text
//! <root>/<document>/markers.json
//! <root>/<document>/ink/<user>/page-<n>.json
//! ```

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use super::{InkKey, PersistenceGateway};
use crate::error::PersistenceError;
use crate::ink::SerializedInk;
use crate::markers::Marker;

const APP_NAME: &str = "pageink";
const MARKERS_FILENAME: &str = "markers.json";
const MARKERS_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoredMarkers {
    #[serde(default)]
    version: u32,
    updated_at: DateTime<Utc>,
    #[serde(default)]
    markers: Vec<Marker>,
}

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store under the user's data directory
    pub fn default_location() -> Option<Self> {
        dirs::data_dir().map(|dir| Self::new(dir.join(APP_NAME).join("annotations")))
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn document_dir(&self, document_id: &str) -> PathBuf {
        self.root.join(encode_id(document_id))
    }

    fn user_ink_dir(&self, document_id: &str, user_id: &str) -> PathBuf {
        self.document_dir(document_id)
            .join("ink")
            .join(encode_id(user_id))
    }

    fn ink_path(&self, key: &InkKey) -> PathBuf {
        self.user_ink_dir(&key.document_id, &key.user_id)
            .join(format!("page-{}.json", key.page))
    }

    fn markers_path(&self, document_id: &str) -> PathBuf {
        self.document_dir(document_id).join(MARKERS_FILENAME)
    }

    /// Pages that have a saved ink layer for `user_id`, ascending
    pub fn ink_pages(&self, document_id: &str, user_id: &str) -> anyhow::Result<Vec<usize>> {
        let dir = self.user_ink_dir(document_id, user_id);
        if !dir.exists() {
            return Ok(vec![]);
        }

        let mut pages = vec![];
        for entry in
            fs::read_dir(&dir).with_context(|| format!("Failed to list {}", dir.display()))?
        {
            let name = entry?.file_name();
            let page = name
                .to_str()
                .and_then(|n| n.strip_prefix("page-"))
                .and_then(|n| n.strip_suffix(".json"))
                .and_then(|n| n.parse::<usize>().ok());
            if let Some(page) = page {
                pages.push(page);
            }
        }
        pages.sort_unstable();
        Ok(pages)
    }

    /// Users that have saved ink for `document_id`
    pub fn ink_users(&self, document_id: &str) -> anyhow::Result<Vec<String>> {
        let dir = self.document_dir(document_id).join("ink");
        if !dir.exists() {
            return Ok(vec![]);
        }
        let mut users = vec![];
        for entry in
            fs::read_dir(&dir).with_context(|| format!("Failed to list {}", dir.display()))?
        {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            match entry.file_name().to_str().and_then(decode_id) {
                Some(user) => users.push(user),
                None => log::warn!("Skipping unrecognized ink directory {:?}", entry.path()),
            }
        }
        users.sort();
        Ok(users)
    }
}

/// Encode an id as a single path component. ASCII letters, digits, `-` and
/// `_` are kept; every other byte becomes `%XX`, so distinct ids never share
/// a directory. The empty id is `%`.
fn encode_id(id: &str) -> String {
    if id.is_empty() {
        return "%".to_string();
    }
    let mut encoded = String::with_capacity(id.len());
    for byte in id.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            encoded.push(char::from(byte));
        } else {
            encoded.push('%');
            encoded.push_str(&hex::encode_upper([byte]));
        }
    }
    encoded
}

/// Inverse of [`encode_id`]; `None` for names it never produces
fn decode_id(name: &str) -> Option<String> {
    if name == "%" {
        return Some(String::new());
    }
    let mut bytes = Vec::with_capacity(name.len());
    let mut rest = name.as_bytes();
    while let Some((&first, tail)) = rest.split_first() {
        if first == b'%' {
            let digits = tail.get(..2)?;
            let mut byte = [0u8; 1];
            hex::decode_to_slice(digits, &mut byte).ok()?;
            bytes.push(byte[0]);
            rest = &tail[2..];
        } else {
            bytes.push(first);
            rest = tail;
        }
    }
    String::from_utf8(bytes).ok()
}

/// Write through a temp file in the same directory so readers never see a
/// half-written file
fn write_atomic(path: &Path, content: &str) -> Result<(), PersistenceError> {
    let dir = path
        .parent()
        .ok_or_else(|| PersistenceError::Unavailable(format!("no parent for {}", path.display())))?;
    fs::create_dir_all(dir)?;

    let mut file = NamedTempFile::new_in(dir)?;
    file.write_all(content.as_bytes())?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn read_optional(path: &Path) -> Result<Option<String>, PersistenceError> {
    match fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl PersistenceGateway for JsonFileStore {
    fn save_ink_layer(&self, key: &InkKey, ink: &SerializedInk) -> Result<(), PersistenceError> {
        let path = self.ink_path(key);
        write_atomic(&path, &ink.to_json()?)?;
        log::debug!("Saved {} strokes to {}", ink.strokes.len(), path.display());
        Ok(())
    }

    fn load_ink_layer(&self, key: &InkKey) -> Result<Option<SerializedInk>, PersistenceError> {
        let Some(content) = read_optional(&self.ink_path(key))? else {
            return Ok(None);
        };
        Ok(Some(SerializedInk::from_json(&content)?))
    }

    fn save_markers(&self, document_id: &str, markers: &[Marker]) -> Result<(), PersistenceError> {
        let stored = StoredMarkers {
            version: MARKERS_VERSION,
            updated_at: Utc::now(),
            markers: markers.to_vec(),
        };
        let content = serde_json::to_string_pretty(&stored)?;
        write_atomic(&self.markers_path(document_id), &content)
    }

    fn load_markers(&self, document_id: &str) -> Result<Vec<Marker>, PersistenceError> {
        let Some(content) = read_optional(&self.markers_path(document_id))? else {
            return Ok(vec![]);
        };
        let stored: StoredMarkers = serde_json::from_str(&content)?;
        Ok(stored.markers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::PercentPoint;
    use crate::ink::{Color, SerializedStroke, StrokeMode};
    use crate::markers::{MarkerOverlay, MarkerStyle, NewMarker};
    use tempfile::TempDir;

    fn ink_with_one_stroke() -> SerializedInk {
        SerializedInk {
            strokes: vec![SerializedStroke {
                id: 1,
                mode: StrokeMode::Pen,
                color: Color::BLACK,
                width: 0.5,
                points: vec![PercentPoint::new(10.0, 10.0), PercentPoint::new(20.0, 30.0)],
            }],
            ..SerializedInk::empty()
        }
    }

    #[test]
    fn ink_layers_are_keyed_by_page_and_user() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        let key = InkKey::new("doc-1", 2, "alice");

        assert!(store.load_ink_layer(&key).unwrap().is_none());
        store.save_ink_layer(&key, &ink_with_one_stroke()).unwrap();

        let loaded = store.load_ink_layer(&key).unwrap().unwrap();
        assert_eq!(loaded.strokes, ink_with_one_stroke().strokes);
        assert!(
            store
                .load_ink_layer(&InkKey::new("doc-1", 2, "bob"))
                .unwrap()
                .is_none()
        );
        assert!(
            store
                .load_ink_layer(&InkKey::new("doc-1", 1, "alice"))
                .unwrap()
                .is_none()
        );
        assert_eq!(store.ink_pages("doc-1", "alice").unwrap(), vec![2]);
        assert_eq!(store.ink_users("doc-1").unwrap(), vec!["alice".to_string()]);
    }

    #[test]
    fn last_write_wins() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        let key = InkKey::new("doc", 1, "u");

        store.save_ink_layer(&key, &ink_with_one_stroke()).unwrap();
        store.save_ink_layer(&key, &SerializedInk::empty()).unwrap();

        assert!(store.load_ink_layer(&key).unwrap().unwrap().is_empty());
    }

    #[test]
    fn markers_round_trip_through_disk() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        let mut overlay = MarkerOverlay::new(MarkerStyle::default());
        overlay.add(NewMarker::answer("x = 2"), 1, Some(PercentPoint::new(10.0, 20.0)));
        overlay.add(NewMarker::audio("clip.mp3").with_label("Listen"), 3, None);

        store.save_markers("book", overlay.markers()).unwrap();
        assert_eq!(store.load_markers("book").unwrap(), overlay.markers());
        assert!(store.load_markers("other").unwrap().is_empty());
    }

    #[test]
    fn path_like_ids_stay_inside_the_root() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        let key = InkKey::new("../../etc", 1, "a/b");
        store.save_ink_layer(&key, &SerializedInk::empty()).unwrap();

        let path = store.ink_path(&key);
        assert!(path.starts_with(dir.path()));
        assert!(path.exists());
    }

    #[test]
    fn similar_ids_do_not_share_files() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        let dotted = InkKey::new("report.v1", 1, "alice.smith");
        let underscored = InkKey::new("report_v1", 1, "alice_smith");

        store.save_ink_layer(&dotted, &ink_with_one_stroke()).unwrap();
        assert!(store.load_ink_layer(&underscored).unwrap().is_none());
        assert_ne!(store.ink_path(&dotted), store.ink_path(&underscored));

        store.save_ink_layer(&InkKey::new("report.v1", 1, ""), &SerializedInk::empty()).unwrap();
        assert_eq!(
            store.ink_users("report.v1").unwrap(),
            vec![String::new(), "alice.smith".to_string()]
        );
    }

    #[test]
    fn id_encoding_is_reversible() {
        for id in ["plain-id_1", "a/b", "../../etc", "report.v1", "100%", "", "caf\u{e9}"] {
            let encoded = encode_id(id);
            assert!(!encoded.contains('/') && encoded != "." && encoded != "..");
            assert_eq!(decode_id(&encoded).as_deref(), Some(id));
        }
        assert_eq!(encode_id("a.b"), "a%2Eb");
        assert_eq!(decode_id("a%2"), None);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(dir.path());
        let key = InkKey::new("doc", 1, "u");
        let path = store.ink_path(&key);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            store.load_ink_layer(&key),
            Err(PersistenceError::Serialize(_))
        ));
    }
}
