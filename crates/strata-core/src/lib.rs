mod canonical;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use canonical::{
    CanonicalJsonError, canonical_bytes, canonical_hash, canonical_value, sort_extension_value,
};

pub type UnitId = String;

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub content: Option<String>,
    pub content_hash: String,
    pub is_binary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub format_version: u32,
    pub fingerprint: String,
    pub file_count: u32,
    pub total_bytes: u64,
    pub files: Vec<FileRecord>,
}

impl Snapshot {
    pub fn file(&self, path: &str) -> Option<&FileRecord> {
        self.files
            .binary_search_by(|record| record.path.as_str().cmp(path))
            .ok()
            .map(|index| &self.files[index])
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|record| record.path.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub id: String,
    pub namespace: String,
    pub rule: String,
    pub severity: Severity,
    pub location: String,
    pub message: String,
    pub context: Value,
}

pub fn violation_id(namespace: &str, rule: &str, location: &str) -> String {
    blake3_hex(format!("{namespace}\n{rule}\n{location}").as_bytes())
}

pub fn content_hash(content: &str) -> String {
    blake3_hex(content.as_bytes())
}

pub fn bytes_hash(bytes: &[u8]) -> String {
    blake3_hex(bytes)
}

fn blake3_hex(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(path: &str, content: &str) -> FileRecord {
        FileRecord {
            path: path.to_owned(),
            content: Some(content.to_owned()),
            content_hash: content_hash(content),
            is_binary: false,
        }
    }

    #[test]
    fn violation_id_is_stable_and_input_sensitive() {
        let id_a = violation_id("deps.fan_in", "fan_in_exceeded", "src/hub.rs");
        let id_b = violation_id("deps.fan_in", "fan_in_exceeded", "src/hub.rs");
        assert_eq!(id_a, id_b);
        assert_eq!(id_a.len(), 64);

        let other = violation_id("deps.fan_in", "fan_in_exceeded", "src/other.rs");
        assert_ne!(id_a, other);
    }

    #[test]
    fn snapshot_file_lookup_uses_sorted_order() {
        let snapshot = Snapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            fingerprint: String::new(),
            file_count: 2,
            total_bytes: 4,
            files: vec![sample_record("a.rs", "aa"), sample_record("b.rs", "bb")],
        };

        assert!(snapshot.file("a.rs").is_some());
        assert!(snapshot.file("b.rs").is_some());
        assert!(snapshot.file("c.rs").is_none());
    }
}
