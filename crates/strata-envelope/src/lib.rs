mod adapter;
mod drift;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_core::{
    CanonicalJsonError, UnitId, ViolationRecord, canonical_bytes, canonical_value,
};
use strata_graph::GraphStats;
use strata_rules::AnalyzerReport;
use thiserror::Error;

pub use adapter::{AdapterChain, AdapterError, SchemaAdapter, V1ToV2, V2ToV3};
pub use drift::{
    DriftArea, DriftClass, DriftClassifier, DriftDifference, DriftKind, DriftReport,
};

pub const ENVELOPE_VERSION: u32 = 3;

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Degraded,
    Error,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Degraded => "degraded",
            Self::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradedReason {
    AnalyzerBudgetExceeded,
    AnalyzerFailed,
    CycleBudgetExhausted,
    CycleListTruncated,
    EdgeLimitExceeded,
    NodeLimitExceeded,
}

impl DegradedReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AnalyzerBudgetExceeded => "analyzer_budget_exceeded",
            Self::AnalyzerFailed => "analyzer_failed",
            Self::CycleBudgetExhausted => "cycle_budget_exhausted",
            Self::CycleListTruncated => "cycle_list_truncated",
            Self::EdgeLimitExceeded => "edge_limit_exceeded",
            Self::NodeLimitExceeded => "node_limit_exceeded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    SnapshotInvalid,
    GraphInvariant,
    EnvelopeInvariant,
    SerializationFailed,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SnapshotInvalid => "snapshot_invalid",
            Self::GraphInvariant => "graph_invariant",
            Self::EnvelopeInvariant => "envelope_invariant",
            Self::SerializationFailed => "serialization_failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ViolationSummary {
    pub total: u32,
    pub by_severity: BTreeMap<String, u32>,
    pub by_namespace: BTreeMap<String, u32>,
}

impl ViolationSummary {
    pub fn from_violations(violations: &[ViolationRecord]) -> Self {
        let mut summary = Self {
            total: violations.len() as u32,
            ..Self::default()
        };
        for violation in violations {
            *summary
                .by_severity
                .entry(violation.severity.as_str().to_owned())
                .or_default() += 1;
            *summary
                .by_namespace
                .entry(violation.namespace.clone())
                .or_default() += 1;
        }
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoreSection {
    pub status: RunStatus,
    pub degraded_reasons: Vec<DegradedReason>,
    pub error_code: Option<ErrorCode>,
    pub graph: GraphStats,
    pub cycles: Vec<Vec<UnitId>>,
    pub cycles_truncated: bool,
    pub violations: Vec<ViolationRecord>,
    pub violation_summary: ViolationSummary,
    pub analyzers: Vec<AnalyzerReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetaSection {
    pub engine_version: String,
    pub snapshot_fingerprint: String,
    pub config_hash: String,
    pub generation_time: i64,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    pub identity: Value,
    pub core: CoreSection,
    pub extensions: BTreeMap<String, Value>,
    pub meta: MetaSection,
}

impl Envelope {
    pub fn to_value(&self) -> Result<Value, EnvelopeError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn canonical_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        Ok(canonical_bytes(self)?)
    }
}

#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("canonical serialization failed: {0}")]
    Canonical(#[from] CanonicalJsonError),
    #[error("unsupported envelope version {found} (current {current})")]
    UnsupportedVersion { found: u32, current: u32 },
    #[error("signature has invalid shape: {found}")]
    SignatureShape { found: String },
    #[error("signature mismatch: expected {expected}, found {found}")]
    SignatureMismatch { expected: String, found: String },
    #[error("envelope is not canonical: {detail}")]
    NotCanonical { detail: String },
    #[error("inconsistent status: {detail}")]
    InconsistentStatus { detail: String },
    #[error("violation summary mismatch: {detail}")]
    SummaryMismatch { detail: String },
}

#[derive(Debug, Clone, Default)]
pub struct EnvelopeParts {
    pub identity: Value,
    pub graph: GraphStats,
    pub cycles: Vec<Vec<UnitId>>,
    pub cycles_truncated: bool,
    pub degraded_reasons: Vec<DegradedReason>,
    pub violations: Vec<ViolationRecord>,
    pub analyzers: Vec<AnalyzerReport>,
    pub extensions: BTreeMap<String, Value>,
    pub snapshot_fingerprint: String,
    pub config_hash: String,
}

pub fn build_envelope(parts: EnvelopeParts, generation_time: i64) -> Envelope {
    if let Err(code) = check_invariants(&parts) {
        tracing::warn!(code = code.as_str(), "builder invariant failed");
        return error_envelope(
            parts.identity,
            code,
            parts.snapshot_fingerprint,
            parts.config_hash,
            generation_time,
        );
    }

    let mut degraded_reasons = parts.degraded_reasons;
    degraded_reasons.sort_unstable();
    degraded_reasons.dedup();

    let status = if degraded_reasons.is_empty() {
        RunStatus::Success
    } else {
        RunStatus::Degraded
    };
    let violation_summary = ViolationSummary::from_violations(&parts.violations);

    let envelope = Envelope {
        version: ENVELOPE_VERSION,
        identity: parts.identity,
        core: CoreSection {
            status,
            degraded_reasons,
            error_code: None,
            graph: parts.graph,
            cycles: parts.cycles,
            cycles_truncated: parts.cycles_truncated,
            violations: parts.violations,
            violation_summary,
            analyzers: parts.analyzers,
        },
        extensions: parts.extensions,
        meta: MetaSection {
            engine_version: ENGINE_VERSION.to_owned(),
            snapshot_fingerprint: parts.snapshot_fingerprint,
            config_hash: parts.config_hash,
            generation_time,
            signature: String::new(),
        },
    };
    seal(envelope)
}

pub fn error_envelope(
    identity: Value,
    code: ErrorCode,
    snapshot_fingerprint: String,
    config_hash: String,
    generation_time: i64,
) -> Envelope {
    let envelope = Envelope {
        version: ENVELOPE_VERSION,
        identity,
        core: CoreSection {
            status: RunStatus::Error,
            degraded_reasons: Vec::new(),
            error_code: Some(code),
            graph: GraphStats::default(),
            cycles: Vec::new(),
            cycles_truncated: false,
            violations: Vec::new(),
            violation_summary: ViolationSummary::default(),
            analyzers: Vec::new(),
        },
        extensions: BTreeMap::new(),
        meta: MetaSection {
            engine_version: ENGINE_VERSION.to_owned(),
            snapshot_fingerprint,
            config_hash,
            generation_time,
            signature: String::new(),
        },
    };
    seal(envelope)
}

fn seal(mut envelope: Envelope) -> Envelope {
    match compute_signature(&envelope) {
        Ok(signature) => {
            envelope.meta.signature = signature;
            envelope
        }
        Err(error) => {
            tracing::error!(error = %error, "failed to sign envelope");
            let mut fallback = Envelope {
                version: ENVELOPE_VERSION,
                identity: Value::Null,
                core: CoreSection {
                    status: RunStatus::Error,
                    degraded_reasons: Vec::new(),
                    error_code: Some(ErrorCode::SerializationFailed),
                    graph: GraphStats::default(),
                    cycles: Vec::new(),
                    cycles_truncated: false,
                    violations: Vec::new(),
                    violation_summary: ViolationSummary::default(),
                    analyzers: Vec::new(),
                },
                extensions: BTreeMap::new(),
                meta: MetaSection {
                    engine_version: ENGINE_VERSION.to_owned(),
                    snapshot_fingerprint: envelope.meta.snapshot_fingerprint,
                    config_hash: envelope.meta.config_hash,
                    generation_time: envelope.meta.generation_time,
                    signature: String::new(),
                },
            };
            fallback.meta.signature =
                compute_signature(&fallback).unwrap_or_else(|_| "0".repeat(64));
            fallback
        }
    }
}

fn check_invariants(parts: &EnvelopeParts) -> Result<(), ErrorCode> {
    for cycle in &parts.cycles {
        if cycle.len() < 2 {
            return Err(ErrorCode::GraphInvariant);
        }
        let Some(smallest) = cycle.iter().min() else {
            return Err(ErrorCode::GraphInvariant);
        };
        if cycle.first() != Some(smallest) {
            return Err(ErrorCode::GraphInvariant);
        }
    }
    for window in parts.cycles.windows(2) {
        let ordered = window[0].len() < window[1].len()
            || (window[0].len() == window[1].len() && window[0] < window[1]);
        if !ordered {
            return Err(ErrorCode::GraphInvariant);
        }
    }
    for window in parts.violations.windows(2) {
        if window[0].id >= window[1].id {
            return Err(ErrorCode::EnvelopeInvariant);
        }
    }
    Ok(())
}

pub fn compute_signature(envelope: &Envelope) -> Result<String, EnvelopeError> {
    let value = envelope.to_value()?;
    sign_value(&value)
}

pub fn sign_value(value: &Value) -> Result<String, EnvelopeError> {
    let mut material = value.clone();
    if let Some(meta) = material.get_mut("meta").and_then(Value::as_object_mut) {
        meta.remove("generation_time");
        meta.remove("signature");
    }
    let bytes = canonical_bytes(&canonical_value(material))?;
    Ok(strata_core::bytes_hash(&bytes))
}

pub fn validate(envelope: &Envelope) -> Result<(), EnvelopeError> {
    validate_structure(envelope)?;
    let expected = compute_signature(envelope)?;
    if expected != envelope.meta.signature {
        return Err(EnvelopeError::SignatureMismatch {
            expected,
            found: envelope.meta.signature.clone(),
        });
    }
    Ok(())
}

pub fn validate_structure(envelope: &Envelope) -> Result<(), EnvelopeError> {
    if envelope.version != ENVELOPE_VERSION {
        return Err(EnvelopeError::UnsupportedVersion {
            found: envelope.version,
            current: ENVELOPE_VERSION,
        });
    }

    let signature = &envelope.meta.signature;
    if signature.len() != 64
        || !signature
            .chars()
            .all(|ch| ch.is_ascii_digit() || ('a'..='f').contains(&ch))
    {
        return Err(EnvelopeError::SignatureShape {
            found: signature.clone(),
        });
    }

    let core = &envelope.core;
    match core.status {
        RunStatus::Success => {
            if !core.degraded_reasons.is_empty() || core.error_code.is_some() {
                return Err(EnvelopeError::InconsistentStatus {
                    detail: "success with degraded reasons or error code".to_owned(),
                });
            }
        }
        RunStatus::Degraded => {
            if core.degraded_reasons.is_empty() || core.error_code.is_some() {
                return Err(EnvelopeError::InconsistentStatus {
                    detail: "degraded without reasons, or with an error code".to_owned(),
                });
            }
        }
        RunStatus::Error => {
            if core.error_code.is_none() {
                return Err(EnvelopeError::InconsistentStatus {
                    detail: "error status without error code".to_owned(),
                });
            }
        }
    }

    for window in core.degraded_reasons.windows(2) {
        if window[0] >= window[1] {
            return Err(EnvelopeError::NotCanonical {
                detail: "degraded reasons not sorted unique".to_owned(),
            });
        }
    }
    for cycle in &core.cycles {
        if cycle.len() < 2 || cycle.first() != cycle.iter().min() {
            return Err(EnvelopeError::NotCanonical {
                detail: "cycle not rooted at smallest node".to_owned(),
            });
        }
    }
    for window in core.cycles.windows(2) {
        let ordered = window[0].len() < window[1].len()
            || (window[0].len() == window[1].len() && window[0] < window[1]);
        if !ordered {
            return Err(EnvelopeError::NotCanonical {
                detail: "cycle list not sorted by (length, sequence)".to_owned(),
            });
        }
    }
    for window in core.violations.windows(2) {
        if window[0].id >= window[1].id {
            return Err(EnvelopeError::NotCanonical {
                detail: "violations not sorted by id".to_owned(),
            });
        }
    }

    let expected_summary = ViolationSummary::from_violations(&core.violations);
    if expected_summary != core.violation_summary {
        return Err(EnvelopeError::SummaryMismatch {
            detail: format!(
                "summary total {} does not match {} violations",
                core.violation_summary.total, expected_summary.total
            ),
        });
    }

    Ok(())
}
