use serde::{Deserialize, Serialize};
use strata_config::LimitsConfig;
use strata_core::{
    CanonicalJsonError, FileRecord, SNAPSHOT_FORMAT_VERSION, Snapshot, bytes_hash, canonical_hash,
    content_hash,
};
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawFile {
    pub path: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum CanonError {
    #[error("empty path")]
    EmptyPath,
    #[error("null byte in path '{path}'")]
    NulByteInPath { path: String },
    #[error("path '{path}' escapes the snapshot root")]
    PathEscape { path: String },
    #[error("duplicate canonical path '{path}'")]
    DuplicatePath { path: String },
    #[error("file count {count} exceeds limit {max}")]
    FileLimitExceeded { count: u32, max: u32 },
    #[error("total bytes {total} exceed limit {max}")]
    ByteLimitExceeded { total: u64, max: u64 },
    #[error("path '{path}' depth {depth} exceeds limit {max}")]
    DepthLimitExceeded { path: String, depth: u32, max: u32 },
    #[error("snapshot files are not sorted by canonical path near '{path}'")]
    UnsortedFiles { path: String },
    #[error("file '{path}' is not in canonical form: {detail}")]
    NotCanonical { path: String, detail: String },
    #[error("snapshot metadata mismatch: {detail}")]
    MetadataMismatch { detail: String },
    #[error("snapshot fingerprint mismatch: expected {expected}, found {found}")]
    FingerprintMismatch { expected: String, found: String },
    #[error("canonical serialization failed: {0}")]
    Serialize(#[from] CanonicalJsonError),
}

pub fn canonicalize(files: Vec<RawFile>, limits: &LimitsConfig) -> Result<Snapshot, CanonError> {
    if files.len() as u32 > limits.max_files {
        return Err(CanonError::FileLimitExceeded {
            count: files.len() as u32,
            max: limits.max_files,
        });
    }

    let mut records = Vec::with_capacity(files.len());
    let mut total_bytes = 0u64;
    for file in files {
        let path = canonical_path(&file.path, limits.max_path_depth)?;
        let record = match decode_text(&file.bytes) {
            Some(text) => {
                let normalized = normalize_text(&text);
                total_bytes += normalized.len() as u64;
                FileRecord {
                    path,
                    content_hash: content_hash(&normalized),
                    content: Some(normalized),
                    is_binary: false,
                }
            }
            None => {
                total_bytes += file.bytes.len() as u64;
                FileRecord {
                    path,
                    content: None,
                    content_hash: bytes_hash(&file.bytes),
                    is_binary: true,
                }
            }
        };
        records.push(record);
    }

    if total_bytes > limits.max_total_bytes {
        return Err(CanonError::ByteLimitExceeded {
            total: total_bytes,
            max: limits.max_total_bytes,
        });
    }

    records.sort_by(|left, right| left.path.cmp(&right.path));
    for window in records.windows(2) {
        if window[0].path == window[1].path {
            return Err(CanonError::DuplicatePath {
                path: window[0].path.clone(),
            });
        }
    }

    let file_count = records.len() as u32;
    let fingerprint = fingerprint(file_count, total_bytes, &records)?;
    tracing::debug!(file_count, total_bytes, "snapshot canonicalized");

    Ok(Snapshot {
        format_version: SNAPSHOT_FORMAT_VERSION,
        fingerprint,
        file_count,
        total_bytes,
        files: records,
    })
}

pub fn verify_canonical(snapshot: &Snapshot, limits: &LimitsConfig) -> Result<(), CanonError> {
    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(CanonError::MetadataMismatch {
            detail: format!(
                "format_version {} (expected {})",
                snapshot.format_version, SNAPSHOT_FORMAT_VERSION
            ),
        });
    }
    if snapshot.file_count as usize != snapshot.files.len() {
        return Err(CanonError::MetadataMismatch {
            detail: format!(
                "file_count {} but {} files present",
                snapshot.file_count,
                snapshot.files.len()
            ),
        });
    }
    if snapshot.files.len() as u32 > limits.max_files {
        return Err(CanonError::FileLimitExceeded {
            count: snapshot.files.len() as u32,
            max: limits.max_files,
        });
    }

    let mut total_bytes = 0u64;
    for (index, record) in snapshot.files.iter().enumerate() {
        if index > 0 && snapshot.files[index - 1].path >= record.path {
            return Err(CanonError::UnsortedFiles {
                path: record.path.clone(),
            });
        }
        let normalized = canonical_path(&record.path, limits.max_path_depth)?;
        if normalized != record.path {
            return Err(CanonError::NotCanonical {
                path: record.path.clone(),
                detail: format!("path normalizes to '{normalized}'"),
            });
        }
        match (&record.content, record.is_binary) {
            (Some(content), false) => {
                if normalize_text(content) != *content {
                    return Err(CanonError::NotCanonical {
                        path: record.path.clone(),
                        detail: "text content is not normalized".to_owned(),
                    });
                }
                if content_hash(content) != record.content_hash {
                    return Err(CanonError::NotCanonical {
                        path: record.path.clone(),
                        detail: "content hash does not match content".to_owned(),
                    });
                }
                total_bytes += content.len() as u64;
            }
            (None, true) => {}
            _ => {
                return Err(CanonError::NotCanonical {
                    path: record.path.clone(),
                    detail: "binary flag and content presence disagree".to_owned(),
                });
            }
        }
    }

    if snapshot.files.iter().all(|record| !record.is_binary)
        && total_bytes != snapshot.total_bytes
    {
        return Err(CanonError::MetadataMismatch {
            detail: format!(
                "total_bytes {} but contents sum to {total_bytes}",
                snapshot.total_bytes
            ),
        });
    }

    let expected = fingerprint(snapshot.file_count, snapshot.total_bytes, &snapshot.files)?;
    if expected != snapshot.fingerprint {
        return Err(CanonError::FingerprintMismatch {
            expected,
            found: snapshot.fingerprint.clone(),
        });
    }
    Ok(())
}

pub fn canonical_path(path: &str, max_depth: u32) -> Result<String, CanonError> {
    if path.is_empty() {
        return Err(CanonError::EmptyPath);
    }
    if path.contains('\0') {
        return Err(CanonError::NulByteInPath {
            path: path.to_owned(),
        });
    }

    let posix = path.replace('\\', "/");
    if posix.starts_with('/') {
        return Err(CanonError::PathEscape {
            path: path.to_owned(),
        });
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in posix.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if segments.pop().is_none() {
                    return Err(CanonError::PathEscape {
                        path: path.to_owned(),
                    });
                }
            }
            other => segments.push(other),
        }
    }
    if segments.is_empty() {
        return Err(CanonError::EmptyPath);
    }
    if segments.len() as u32 > max_depth {
        return Err(CanonError::DepthLimitExceeded {
            path: path.to_owned(),
            depth: segments.len() as u32,
            max: max_depth,
        });
    }
    Ok(segments.join("/"))
}

fn decode_text(bytes: &[u8]) -> Option<String> {
    let text = std::str::from_utf8(bytes).ok()?;
    let disallowed = text
        .bytes()
        .any(|byte| byte < 0x20 && byte != b'\n' && byte != b'\r' && byte != b'\t');
    if disallowed {
        return None;
    }
    Some(text.to_owned())
}

fn normalize_text(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    unified.nfc().collect()
}

fn fingerprint(
    file_count: u32,
    total_bytes: u64,
    files: &[FileRecord],
) -> Result<String, CanonicalJsonError> {
    #[derive(Serialize)]
    struct FingerprintMaterial<'a> {
        format_version: u32,
        file_count: u32,
        total_bytes: u64,
        files: &'a [FileRecord],
    }

    canonical_hash(&FingerprintMaterial {
        format_version: SNAPSHOT_FORMAT_VERSION,
        file_count,
        total_bytes,
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(path: &str, content: &str) -> RawFile {
        RawFile {
            path: path.to_owned(),
            bytes: content.as_bytes().to_vec(),
        }
    }

    fn limits() -> LimitsConfig {
        LimitsConfig::default()
    }

    #[test]
    fn canonicalize_sorts_by_path_and_fingerprints() {
        let snapshot = canonicalize(
            vec![raw("src/b.rs", "fn b() {}\n"), raw("src/a.rs", "fn a() {}\n")],
            &limits(),
        )
        .expect("canonicalize");

        assert_eq!(
            snapshot.paths().collect::<Vec<_>>(),
            vec!["src/a.rs", "src/b.rs"]
        );
        assert_eq!(snapshot.file_count, 2);
        assert_eq!(snapshot.fingerprint.len(), 64);
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let first = canonicalize(
            vec![raw("src/a.rs", "line one\r\nline two\r"), raw("b.txt", "x")],
            &limits(),
        )
        .expect("first pass");

        let round_trip = first
            .files
            .iter()
            .map(|record| RawFile {
                path: record.path.clone(),
                bytes: record.content.clone().unwrap_or_default().into_bytes(),
            })
            .collect::<Vec<_>>();
        let second = canonicalize(round_trip, &limits()).expect("second pass");

        assert_eq!(first, second);
        verify_canonical(&first, &limits()).expect("verify");
    }

    #[test]
    fn newlines_normalize_to_lf() {
        let snapshot =
            canonicalize(vec![raw("a.txt", "one\r\ntwo\rthree\n")], &limits()).expect("canon");
        assert_eq!(
            snapshot.files[0].content.as_deref(),
            Some("one\ntwo\nthree\n")
        );
    }

    #[test]
    fn text_normalizes_to_nfc() {
        let decomposed = "caf\u{0065}\u{0301}";
        let composed = "caf\u{00e9}";
        let left = canonicalize(vec![raw("a.txt", decomposed)], &limits()).expect("canon");
        let right = canonicalize(vec![raw("a.txt", composed)], &limits()).expect("canon");
        assert_eq!(left.files[0].content, right.files[0].content);
        assert_eq!(left.fingerprint, right.fingerprint);
    }

    #[test]
    fn binary_content_skips_normalization_and_hashes_raw_bytes() {
        let bytes = vec![0u8, 159, 146, 150];
        let snapshot = canonicalize(
            vec![RawFile {
                path: "blob.bin".to_owned(),
                bytes: bytes.clone(),
            }],
            &limits(),
        )
        .expect("canon");

        let record = &snapshot.files[0];
        assert!(record.is_binary);
        assert_eq!(record.content, None);
        assert_eq!(record.content_hash, bytes_hash(&bytes));
    }

    #[test]
    fn path_normalization_strips_dot_segments() {
        assert_eq!(canonical_path("./src/./a.rs", 32).expect("path"), "src/a.rs");
        assert_eq!(
            canonical_path("src\\nested\\..\\a.rs", 32).expect("path"),
            "src/a.rs"
        );
    }

    #[test]
    fn escaping_paths_are_rejected() {
        assert!(matches!(
            canonical_path("../outside.rs", 32),
            Err(CanonError::PathEscape { .. })
        ));
        assert!(matches!(
            canonical_path("/abs/path.rs", 32),
            Err(CanonError::PathEscape { .. })
        ));
        assert!(matches!(
            canonical_path("a/../../b.rs", 32),
            Err(CanonError::PathEscape { .. })
        ));
    }

    #[test]
    fn duplicate_normalized_paths_are_rejected() {
        let result = canonicalize(
            vec![raw("src/a.rs", "left"), raw("./src/a.rs", "right")],
            &limits(),
        );
        assert!(matches!(result, Err(CanonError::DuplicatePath { .. })));
    }

    #[test]
    fn null_byte_in_path_is_rejected() {
        let result = canonicalize(vec![raw("src/a\0.rs", "x")], &limits());
        assert!(matches!(result, Err(CanonError::NulByteInPath { .. })));
    }

    #[test]
    fn file_limit_rejects_before_engine_runs() {
        let mut limits = limits();
        limits.max_files = 1;
        let result = canonicalize(vec![raw("a.rs", "a"), raw("b.rs", "b")], &limits);
        assert!(matches!(
            result,
            Err(CanonError::FileLimitExceeded { count: 2, max: 1 })
        ));
    }

    #[test]
    fn tampered_fingerprint_fails_verification() {
        let mut snapshot = canonicalize(vec![raw("a.rs", "a")], &limits()).expect("canon");
        snapshot.fingerprint = "0".repeat(64);
        assert!(matches!(
            verify_canonical(&snapshot, &limits()),
            Err(CanonError::FingerprintMismatch { .. })
        ));
    }
}
