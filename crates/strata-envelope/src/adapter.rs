use std::collections::BTreeMap;

use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::ENVELOPE_VERSION;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("envelope has no numeric 'version' field")]
    MissingVersion,
    #[error("no adapter published for version {version}: broken chain")]
    BrokenChain { version: u32 },
    #[error("envelope version {found} is newer than current {current}")]
    FutureVersion { found: u32, current: u32 },
    #[error("adapter for version {from} produced version {to}, expected {expected}")]
    BadStep { from: u32, to: u32, expected: u32 },
    #[error("envelope section '{section}' is not an object")]
    MalformedSection { section: String },
}

pub trait SchemaAdapter: Send + Sync {
    fn source_version(&self) -> u32;

    fn apply(&self, envelope: Value) -> Result<Value, AdapterError>;
}

pub struct AdapterChain {
    adapters: BTreeMap<u32, Box<dyn SchemaAdapter>>,
}

impl AdapterChain {
    pub fn published() -> Self {
        let mut adapters: BTreeMap<u32, Box<dyn SchemaAdapter>> = BTreeMap::new();
        adapters.insert(1, Box::new(V1ToV2));
        adapters.insert(2, Box::new(V2ToV3));
        Self { adapters }
    }

    pub fn empty() -> Self {
        Self {
            adapters: BTreeMap::new(),
        }
    }

    pub fn with_adapter(mut self, adapter: Box<dyn SchemaAdapter>) -> Self {
        self.adapters.insert(adapter.source_version(), adapter);
        self
    }

    pub fn upgrade_to_current(&self, mut envelope: Value) -> Result<Value, AdapterError> {
        loop {
            let version = declared_version(&envelope)?;
            if version == ENVELOPE_VERSION {
                return Ok(envelope);
            }
            if version > ENVELOPE_VERSION {
                return Err(AdapterError::FutureVersion {
                    found: version,
                    current: ENVELOPE_VERSION,
                });
            }
            let adapter = self
                .adapters
                .get(&version)
                .ok_or(AdapterError::BrokenChain { version })?;
            let upgraded = adapter.apply(envelope)?;
            let next = declared_version(&upgraded)?;
            if next != version + 1 {
                return Err(AdapterError::BadStep {
                    from: version,
                    to: next,
                    expected: version + 1,
                });
            }
            tracing::debug!(from = version, to = next, "envelope upgraded");
            envelope = upgraded;
        }
    }
}

fn declared_version(envelope: &Value) -> Result<u32, AdapterError> {
    envelope
        .get("version")
        .and_then(Value::as_u64)
        .map(|version| version as u32)
        .ok_or(AdapterError::MissingVersion)
}

fn core_section(envelope: &mut Value) -> Result<&mut Map<String, Value>, AdapterError> {
    envelope
        .get_mut("core")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| AdapterError::MalformedSection {
            section: "core".to_owned(),
        })
}

pub struct V1ToV2;

impl SchemaAdapter for V1ToV2 {
    fn source_version(&self) -> u32 {
        1
    }

    fn apply(&self, mut envelope: Value) -> Result<Value, AdapterError> {
        let core = core_section(&mut envelope)?;

        if let Some(stats) = core.remove("stats") {
            let mut graph = match stats {
                Value::Object(map) => map,
                other => {
                    let mut map = Map::new();
                    map.insert("raw".to_owned(), other);
                    map
                }
            };
            graph
                .entry("reference_count".to_owned())
                .or_insert(json!(0));
            graph
                .entry("unresolved_reference_count".to_owned())
                .or_insert(json!(0));
            core.insert("graph".to_owned(), Value::Object(graph));
        }

        core.entry("cycles_truncated".to_owned()).or_insert(json!(false));

        let reasons = match core.remove("degraded_reason") {
            Some(Value::String(reason)) if !reason.is_empty() => json!([reason]),
            _ => json!([]),
        };
        core.entry("degraded_reasons".to_owned()).or_insert(reasons);

        envelope["version"] = json!(2);
        Ok(envelope)
    }
}

pub struct V2ToV3;

impl SchemaAdapter for V2ToV3 {
    fn source_version(&self) -> u32 {
        2
    }

    fn apply(&self, mut envelope: Value) -> Result<Value, AdapterError> {
        let core = core_section(&mut envelope)?;

        let legacy_count = core
            .remove("violation_count")
            .and_then(|count| count.as_u64())
            .unwrap_or(0) as u32;

        if !core.contains_key("violation_summary") {
            let violations = core
                .get("violations")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let mut by_severity: BTreeMap<String, u32> = BTreeMap::new();
            let mut by_namespace: BTreeMap<String, u32> = BTreeMap::new();
            for violation in &violations {
                if let Some(severity) = violation.get("severity").and_then(Value::as_str) {
                    *by_severity.entry(severity.to_owned()).or_default() += 1;
                }
                if let Some(namespace) = violation.get("namespace").and_then(Value::as_str) {
                    *by_namespace.entry(namespace.to_owned()).or_default() += 1;
                }
            }
            let total = if violations.is_empty() {
                legacy_count
            } else {
                violations.len() as u32
            };
            core.insert(
                "violation_summary".to_owned(),
                json!({
                    "total": total,
                    "by_severity": by_severity,
                    "by_namespace": by_namespace,
                }),
            );
        }

        core.entry("analyzers".to_owned()).or_insert(json!([]));

        envelope["version"] = json!(3);
        Ok(envelope)
    }
}
