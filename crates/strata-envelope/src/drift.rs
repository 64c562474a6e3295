use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_core::canonical_value;

use crate::{AdapterChain, Envelope, RunStatus, validate_structure};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftClass {
    Benign,
    Warning,
    Blocker,
}

impl DriftClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Benign => "benign",
            Self::Warning => "warning",
            Self::Blocker => "blocker",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftArea {
    Identity,
    Core,
    Extensions,
    Meta,
    Structure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftKind {
    Added,
    Removed,
    Changed,
    ShapeChanged,
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftDifference {
    pub area: DriftArea,
    pub path: String,
    pub kind: DriftKind,
    pub classification: DriftClass,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftReport {
    pub classification: DriftClass,
    pub differences: Vec<DriftDifference>,
}

impl DriftReport {
    fn from_differences(differences: Vec<DriftDifference>) -> Self {
        let classification = differences
            .iter()
            .map(|difference| difference.classification)
            .max()
            .unwrap_or(DriftClass::Benign);
        Self {
            classification,
            differences,
        }
    }

    fn blocked(area: DriftArea, path: &str, detail: String) -> Self {
        Self::from_differences(vec![DriftDifference {
            area,
            path: path.to_owned(),
            kind: DriftKind::Invalid,
            classification: DriftClass::Blocker,
            detail,
        }])
    }
}

pub struct DriftClassifier {
    chain: AdapterChain,
    known_namespaces: BTreeSet<String>,
}

struct DiffPolicy {
    added: DriftClass,
    removed: DriftClass,
    changed: DriftClass,
}

impl DriftClassifier {
    pub fn new(chain: AdapterChain, known_namespaces: BTreeSet<String>) -> Self {
        Self {
            chain,
            known_namespaces,
        }
    }

    pub fn classify(&self, live: Value, candidate: Value) -> DriftReport {
        let live = match self.chain.upgrade_to_current(live) {
            Ok(value) => value,
            Err(error) => {
                return DriftReport::blocked(
                    DriftArea::Structure,
                    "live",
                    format!("live envelope failed upgrade: {error}"),
                );
            }
        };
        let candidate = match self.chain.upgrade_to_current(candidate) {
            Ok(value) => value,
            Err(error) => {
                return DriftReport::blocked(
                    DriftArea::Structure,
                    "candidate",
                    format!("candidate envelope failed upgrade: {error}"),
                );
            }
        };

        let live_envelope = match parse_and_validate(&live) {
            Ok(envelope) => envelope,
            Err(detail) => {
                return DriftReport::blocked(DriftArea::Structure, "live", detail);
            }
        };
        let candidate_envelope = match parse_and_validate(&candidate) {
            Ok(envelope) => envelope,
            Err(detail) => {
                return DriftReport::blocked(DriftArea::Structure, "candidate", detail);
            }
        };
        let live = canonical_value(strip_nondeterministic(live));
        let candidate = canonical_value(strip_nondeterministic(candidate));

        let mut differences = Vec::new();

        diff_opaque(
            DriftArea::Identity,
            "identity",
            live.get("identity").unwrap_or(&Value::Null),
            candidate.get("identity").unwrap_or(&Value::Null),
            &DiffPolicy {
                added: DriftClass::Blocker,
                removed: DriftClass::Blocker,
                changed: DriftClass::Blocker,
            },
            &mut differences,
        );

        diff_core(&live_envelope, &candidate_envelope, &mut differences);

        self.diff_extensions(
            live.get("extensions").unwrap_or(&Value::Null),
            candidate.get("extensions").unwrap_or(&Value::Null),
            &mut differences,
        );

        diff_meta(&live_envelope, &candidate_envelope, &mut differences);

        DriftReport::from_differences(differences)
    }

    fn diff_extensions(
        &self,
        live: &Value,
        candidate: &Value,
        differences: &mut Vec<DriftDifference>,
    ) {
        let empty = serde_json::Map::new();
        let live_map = live.as_object().unwrap_or(&empty);
        let candidate_map = candidate.as_object().unwrap_or(&empty);

        let namespaces: BTreeSet<&String> =
            live_map.keys().chain(candidate_map.keys()).collect();
        for namespace in namespaces {
            let path = format!("extensions.{namespace}");
            match (live_map.get(namespace), candidate_map.get(namespace)) {
                (Some(_), None) => differences.push(DriftDifference {
                    area: DriftArea::Extensions,
                    path,
                    kind: DriftKind::Removed,
                    classification: DriftClass::Blocker,
                    detail: format!("namespace '{namespace}' removed"),
                }),
                (None, Some(_)) => differences.push(DriftDifference {
                    area: DriftArea::Extensions,
                    path,
                    kind: DriftKind::Added,
                    classification: DriftClass::Benign,
                    detail: format!("namespace '{namespace}' added"),
                }),
                (Some(live_data), Some(candidate_data)) => {
                    if live_data == candidate_data {
                        continue;
                    }
                    if self.known_namespaces.contains(namespace.as_str()) {
                        let incremented =
                            namespace_version(candidate_data) > namespace_version(live_data);
                        diff_opaque(
                            DriftArea::Extensions,
                            &path,
                            live_data,
                            candidate_data,
                            &DiffPolicy {
                                added: DriftClass::Benign,
                                removed: DriftClass::Blocker,
                                changed: if incremented {
                                    DriftClass::Warning
                                } else {
                                    DriftClass::Blocker
                                },
                            },
                            differences,
                        );
                    } else {
                        diff_shape(&path, live_data, candidate_data, differences);
                    }
                }
                (None, None) => {}
            }
        }
    }
}

fn parse_and_validate(value: &Value) -> Result<Envelope, String> {
    let envelope = Envelope::from_value(value.clone())
        .map_err(|error| format!("envelope failed to parse: {error}"))?;
    validate_structure(&envelope)
        .map_err(|error| format!("envelope failed validation: {error}"))?;
    Ok(envelope)
}

fn strip_nondeterministic(mut value: Value) -> Value {
    if let Some(meta) = value.get_mut("meta").and_then(Value::as_object_mut) {
        meta.remove("generation_time");
        meta.remove("signature");
    }
    value
}

fn namespace_version(data: &Value) -> u64 {
    data.get("version").and_then(Value::as_u64).unwrap_or(0)
}

fn diff_opaque(
    area: DriftArea,
    path: &str,
    live: &Value,
    candidate: &Value,
    policy: &DiffPolicy,
    differences: &mut Vec<DriftDifference>,
) {
    match (live, candidate) {
        (Value::Object(live_map), Value::Object(candidate_map)) => {
            let keys: BTreeSet<&String> =
                live_map.keys().chain(candidate_map.keys()).collect();
            for key in keys {
                let child_path = format!("{path}.{key}");
                match (live_map.get(key), candidate_map.get(key)) {
                    (Some(_), None) => differences.push(DriftDifference {
                        area,
                        path: child_path,
                        kind: DriftKind::Removed,
                        classification: policy.removed,
                        detail: format!("field '{key}' removed"),
                    }),
                    (None, Some(_)) => differences.push(DriftDifference {
                        area,
                        path: child_path,
                        kind: DriftKind::Added,
                        classification: policy.added,
                        detail: format!("field '{key}' added"),
                    }),
                    (Some(live_child), Some(candidate_child)) => diff_opaque(
                        area,
                        &child_path,
                        live_child,
                        candidate_child,
                        policy,
                        differences,
                    ),
                    (None, None) => {}
                }
            }
        }
        (left, right) if left == right => {}
        _ => differences.push(DriftDifference {
            area,
            path: path.to_owned(),
            kind: DriftKind::Changed,
            classification: policy.changed,
            detail: "value changed".to_owned(),
        }),
    }
}

fn diff_shape(
    path: &str,
    live: &Value,
    candidate: &Value,
    differences: &mut Vec<DriftDifference>,
) {
    match (live, candidate) {
        (Value::Object(live_map), Value::Object(candidate_map)) => {
            let keys: BTreeSet<&String> =
                live_map.keys().chain(candidate_map.keys()).collect();
            for key in keys {
                let child_path = format!("{path}.{key}");
                match (live_map.get(key), candidate_map.get(key)) {
                    (Some(live_child), Some(candidate_child)) => {
                        diff_shape(&child_path, live_child, candidate_child, differences);
                    }
                    _ => differences.push(DriftDifference {
                        area: DriftArea::Extensions,
                        path: child_path,
                        kind: DriftKind::ShapeChanged,
                        classification: DriftClass::Blocker,
                        detail: format!("key '{key}' present on one side only"),
                    }),
                }
            }
        }
        (Value::Array(live_items), Value::Array(candidate_items)) => {
            if live_items.len() != candidate_items.len() {
                differences.push(DriftDifference {
                    area: DriftArea::Extensions,
                    path: path.to_owned(),
                    kind: DriftKind::ShapeChanged,
                    classification: DriftClass::Blocker,
                    detail: format!(
                        "array length {} -> {}",
                        live_items.len(),
                        candidate_items.len()
                    ),
                });
                return;
            }
            for (index, (live_item, candidate_item)) in
                live_items.iter().zip(candidate_items).enumerate()
            {
                diff_shape(
                    &format!("{path}[{index}]"),
                    live_item,
                    candidate_item,
                    differences,
                );
            }
        }
        (left, right) if same_scalar_kind(left, right) => {
            if left != right {
                differences.push(DriftDifference {
                    area: DriftArea::Extensions,
                    path: path.to_owned(),
                    kind: DriftKind::Changed,
                    classification: DriftClass::Warning,
                    detail: "scalar value changed in unknown namespace".to_owned(),
                });
            }
        }
        _ => differences.push(DriftDifference {
            area: DriftArea::Extensions,
            path: path.to_owned(),
            kind: DriftKind::ShapeChanged,
            classification: DriftClass::Blocker,
            detail: "value type changed".to_owned(),
        }),
    }
}

fn same_scalar_kind(left: &Value, right: &Value) -> bool {
    matches!(
        (left, right),
        (Value::Null, Value::Null)
            | (Value::Bool(_), Value::Bool(_))
            | (Value::Number(_), Value::Number(_))
            | (Value::String(_), Value::String(_))
    )
}

fn diff_core(live: &Envelope, candidate: &Envelope, differences: &mut Vec<DriftDifference>) {
    let blocker = |path: &str, detail: String| DriftDifference {
        area: DriftArea::Core,
        path: path.to_owned(),
        kind: DriftKind::Changed,
        classification: DriftClass::Blocker,
        detail,
    };

    if live.core.graph != candidate.core.graph {
        differences.push(blocker(
            "core.graph",
            "graph statistics differ on identical input".to_owned(),
        ));
    }
    if live.core.error_code != candidate.core.error_code {
        differences.push(blocker(
            "core.error_code",
            format!(
                "error code {:?} -> {:?}",
                live.core.error_code, candidate.core.error_code
            ),
        ));
    }

    diff_status(live, candidate, differences);
    let cycles_improved = diff_cycles(live, candidate, differences);
    let violations_improved = diff_violations(live, candidate, differences);
    diff_analyzers(live, candidate, violations_improved, differences);

    if live.core.cycles_truncated != candidate.core.cycles_truncated {
        if live.core.cycles_truncated && !candidate.core.cycles_truncated && cycles_improved {
            differences.push(DriftDifference {
                area: DriftArea::Core,
                path: "core.cycles_truncated".to_owned(),
                kind: DriftKind::Changed,
                classification: DriftClass::Warning,
                detail: "cycle list no longer truncated".to_owned(),
            });
        } else {
            differences.push(blocker(
                "core.cycles_truncated",
                format!(
                    "truncation flag {} -> {}",
                    live.core.cycles_truncated, candidate.core.cycles_truncated
                ),
            ));
        }
    }
}

fn diff_status(live: &Envelope, candidate: &Envelope, differences: &mut Vec<DriftDifference>) {
    let live_reasons: BTreeSet<_> = live.core.degraded_reasons.iter().collect();
    let candidate_reasons: BTreeSet<_> = candidate.core.degraded_reasons.iter().collect();
    let added_reasons = candidate_reasons
        .difference(&live_reasons)
        .collect::<Vec<_>>();
    let removed_reasons = live_reasons
        .difference(&candidate_reasons)
        .collect::<Vec<_>>();

    if !added_reasons.is_empty() {
        differences.push(DriftDifference {
            area: DriftArea::Core,
            path: "core.degraded_reasons".to_owned(),
            kind: DriftKind::Added,
            classification: DriftClass::Blocker,
            detail: format!("new degraded reasons: {added_reasons:?}"),
        });
    } else if !removed_reasons.is_empty() {
        differences.push(DriftDifference {
            area: DriftArea::Core,
            path: "core.degraded_reasons".to_owned(),
            kind: DriftKind::Removed,
            classification: DriftClass::Warning,
            detail: format!("degraded reasons resolved: {removed_reasons:?}"),
        });
    }

    if live.core.status == candidate.core.status {
        return;
    }
    let improved = live.core.status == RunStatus::Degraded
        && candidate.core.status == RunStatus::Success
        && added_reasons.is_empty();
    differences.push(DriftDifference {
        area: DriftArea::Core,
        path: "core.status".to_owned(),
        kind: DriftKind::Changed,
        classification: if improved {
            DriftClass::Warning
        } else {
            DriftClass::Blocker
        },
        detail: format!(
            "status {} -> {}",
            live.core.status.as_str(),
            candidate.core.status.as_str()
        ),
    });
}

fn diff_cycles(
    live: &Envelope,
    candidate: &Envelope,
    differences: &mut Vec<DriftDifference>,
) -> bool {
    let live_set: BTreeSet<_> = live.core.cycles.iter().collect();
    let candidate_set: BTreeSet<_> = candidate.core.cycles.iter().collect();
    if live_set == candidate_set {
        return false;
    }

    let new_cycles = candidate_set.difference(&live_set).collect::<Vec<_>>();
    if new_cycles.is_empty() {
        differences.push(DriftDifference {
            area: DriftArea::Core,
            path: "core.cycles".to_owned(),
            kind: DriftKind::Removed,
            classification: DriftClass::Warning,
            detail: format!(
                "{} cycle(s) resolved, none introduced",
                live_set.len() - candidate_set.len()
            ),
        });
        true
    } else {
        differences.push(DriftDifference {
            area: DriftArea::Core,
            path: "core.cycles".to_owned(),
            kind: DriftKind::Changed,
            classification: DriftClass::Blocker,
            detail: format!("{} new cycle(s) introduced", new_cycles.len()),
        });
        false
    }
}

fn diff_violations(
    live: &Envelope,
    candidate: &Envelope,
    differences: &mut Vec<DriftDifference>,
) -> bool {
    let live_by_id: std::collections::BTreeMap<_, _> = live
        .core
        .violations
        .iter()
        .map(|violation| (violation.id.as_str(), violation))
        .collect();
    let candidate_by_id: std::collections::BTreeMap<_, _> = candidate
        .core
        .violations
        .iter()
        .map(|violation| (violation.id.as_str(), violation))
        .collect();

    let mut new_ids = Vec::new();
    let mut changed_ids = Vec::new();
    for (id, candidate_violation) in &candidate_by_id {
        match live_by_id.get(id) {
            None => new_ids.push(*id),
            Some(live_violation) if live_violation != candidate_violation => {
                changed_ids.push(*id);
            }
            Some(_) => {}
        }
    }
    let removed_count = live_by_id
        .keys()
        .filter(|id| !candidate_by_id.contains_key(*id))
        .count();

    if !new_ids.is_empty() || !changed_ids.is_empty() {
        differences.push(DriftDifference {
            area: DriftArea::Core,
            path: "core.violations".to_owned(),
            kind: DriftKind::Changed,
            classification: DriftClass::Blocker,
            detail: format!(
                "{} new and {} rewritten violation(s)",
                new_ids.len(),
                changed_ids.len()
            ),
        });
        return false;
    }
    if removed_count > 0 {
        differences.push(DriftDifference {
            area: DriftArea::Core,
            path: "core.violations".to_owned(),
            kind: DriftKind::Removed,
            classification: DriftClass::Warning,
            detail: format!("{removed_count} violation(s) resolved, none introduced"),
        });
        return true;
    }
    false
}

fn diff_analyzers(
    live: &Envelope,
    candidate: &Envelope,
    violations_improved: bool,
    differences: &mut Vec<DriftDifference>,
) {
    use strata_rules::AnalyzerOutcome;

    let live_by_namespace: std::collections::BTreeMap<_, _> = live
        .core
        .analyzers
        .iter()
        .map(|report| (report.namespace.as_str(), report))
        .collect();
    let candidate_by_namespace: std::collections::BTreeMap<_, _> = candidate
        .core
        .analyzers
        .iter()
        .map(|report| (report.namespace.as_str(), report))
        .collect();

    let namespaces: BTreeSet<&str> = live_by_namespace
        .keys()
        .chain(candidate_by_namespace.keys())
        .copied()
        .collect();
    for namespace in namespaces {
        let path = format!("core.analyzers.{namespace}");
        match (
            live_by_namespace.get(namespace),
            candidate_by_namespace.get(namespace),
        ) {
            (Some(_), None) => differences.push(DriftDifference {
                area: DriftArea::Core,
                path,
                kind: DriftKind::Removed,
                classification: DriftClass::Blocker,
                detail: format!("analyzer '{namespace}' no longer reported"),
            }),
            (None, Some(_)) => differences.push(DriftDifference {
                area: DriftArea::Core,
                path,
                kind: DriftKind::Added,
                classification: DriftClass::Benign,
                detail: format!("analyzer '{namespace}' newly reported"),
            }),
            (Some(live_report), Some(candidate_report)) => {
                if live_report.outcome == candidate_report.outcome
                    && live_report.failure == candidate_report.failure
                {
                    continue;
                }
                let improved = violations_improved
                    && live_report.outcome == AnalyzerOutcome::Findings
                    && candidate_report.outcome == AnalyzerOutcome::NoFindings
                    && candidate_report.failure.is_none();
                differences.push(DriftDifference {
                    area: DriftArea::Core,
                    path,
                    kind: DriftKind::Changed,
                    classification: if improved {
                        DriftClass::Warning
                    } else {
                        DriftClass::Blocker
                    },
                    detail: format!(
                        "outcome {} -> {}",
                        live_report.outcome.as_str(),
                        candidate_report.outcome.as_str()
                    ),
                });
            }
            (None, None) => {}
        }
    }
}

fn diff_meta(live: &Envelope, candidate: &Envelope, differences: &mut Vec<DriftDifference>) {
    if live.meta.snapshot_fingerprint != candidate.meta.snapshot_fingerprint {
        differences.push(DriftDifference {
            area: DriftArea::Meta,
            path: "meta.snapshot_fingerprint".to_owned(),
            kind: DriftKind::Changed,
            classification: DriftClass::Blocker,
            detail: "snapshots differ; comparison requires identical input".to_owned(),
        });
    }
    if live.meta.config_hash != candidate.meta.config_hash {
        differences.push(DriftDifference {
            area: DriftArea::Meta,
            path: "meta.config_hash".to_owned(),
            kind: DriftKind::Changed,
            classification: DriftClass::Blocker,
            detail: "configurations differ; comparison requires identical input".to_owned(),
        });
    }
    if live.meta.engine_version != candidate.meta.engine_version {
        differences.push(DriftDifference {
            area: DriftArea::Meta,
            path: "meta.engine_version".to_owned(),
            kind: DriftKind::Changed,
            classification: DriftClass::Benign,
            detail: format!(
                "engine {} -> {}",
                live.meta.engine_version, candidate.meta.engine_version
            ),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::sample_parts;
    use crate::{DegradedReason, build_envelope};
    use serde_json::json;

    fn classifier() -> DriftClassifier {
        let known = ["deps.fan_in", "deps.orphan", "hygiene.file_size"]
            .into_iter()
            .map(str::to_owned)
            .collect();
        DriftClassifier::new(AdapterChain::published(), known)
    }

    fn value_of(envelope: &Envelope) -> Value {
        envelope.to_value().expect("value")
    }

    #[test]
    fn identical_envelopes_up_to_generation_time_are_benign() {
        let live = build_envelope(sample_parts(), 1_000);
        let candidate = build_envelope(sample_parts(), 99_000);

        let report = classifier().classify(value_of(&live), value_of(&candidate));
        assert_eq!(report.classification, DriftClass::Benign);
        assert!(report.differences.is_empty());
    }

    #[test]
    fn added_optional_extension_field_is_benign() {
        let live = build_envelope(sample_parts(), 1_000);
        let mut parts = sample_parts();
        if let Some(data) = parts.extensions.get_mut("deps.fan_in") {
            data["sampled"] = json!(true);
        }
        let candidate = build_envelope(parts, 1_000);

        let report = classifier().classify(value_of(&live), value_of(&candidate));
        assert_eq!(report.classification, DriftClass::Benign);
        assert_eq!(report.differences.len(), 1);
        assert_eq!(report.differences[0].kind, DriftKind::Added);
    }

    #[test]
    fn removed_known_extension_field_is_blocker() {
        let live = build_envelope(sample_parts(), 1_000);
        let mut parts = sample_parts();
        if let Some(data) = parts.extensions.get_mut("deps.fan_in") {
            data.as_object_mut().expect("object").remove("threshold");
        }
        let candidate = build_envelope(parts, 1_000);

        let report = classifier().classify(value_of(&live), value_of(&candidate));
        assert_eq!(report.classification, DriftClass::Blocker);
    }

    #[test]
    fn changed_extension_value_without_version_increment_is_blocker() {
        let live = build_envelope(sample_parts(), 1_000);
        let mut parts = sample_parts();
        if let Some(data) = parts.extensions.get_mut("deps.fan_in") {
            data["threshold"] = json!(9);
        }
        let candidate = build_envelope(parts, 1_000);

        let report = classifier().classify(value_of(&live), value_of(&candidate));
        assert_eq!(report.classification, DriftClass::Blocker);
    }

    #[test]
    fn changed_extension_value_with_version_increment_is_warning() {
        let live = build_envelope(sample_parts(), 1_000);
        let mut parts = sample_parts();
        if let Some(data) = parts.extensions.get_mut("deps.fan_in") {
            data["threshold"] = json!(9);
            data["version"] = json!(2);
        }
        let candidate = build_envelope(parts, 1_000);

        let report = classifier().classify(value_of(&live), value_of(&candidate));
        assert_eq!(report.classification, DriftClass::Warning);
    }

    #[test]
    fn unknown_namespace_shape_change_is_blocker_value_change_warning() {
        let mut live_parts = sample_parts();
        live_parts
            .extensions
            .insert("vendor.custom".to_owned(), json!({"score": 10, "tags": ["a"]}));
        let live = build_envelope(live_parts, 1_000);

        let mut scalar_parts = sample_parts();
        scalar_parts
            .extensions
            .insert("vendor.custom".to_owned(), json!({"score": 11, "tags": ["a"]}));
        let scalar_candidate = build_envelope(scalar_parts, 1_000);
        let report = classifier().classify(value_of(&live), value_of(&scalar_candidate));
        assert_eq!(report.classification, DriftClass::Warning);

        let mut shape_parts = sample_parts();
        shape_parts
            .extensions
            .insert("vendor.custom".to_owned(), json!({"score": "10", "tags": ["a"]}));
        let shape_candidate = build_envelope(shape_parts, 1_000);
        let report = classifier().classify(value_of(&live), value_of(&shape_candidate));
        assert_eq!(report.classification, DriftClass::Blocker);
    }

    #[test]
    fn identity_difference_is_blocker() {
        let live = build_envelope(sample_parts(), 1_000);
        let mut parts = sample_parts();
        parts.identity = json!({"repo": "demo", "revision": "other"});
        let candidate = build_envelope(parts, 1_000);

        let report = classifier().classify(value_of(&live), value_of(&candidate));
        assert_eq!(report.classification, DriftClass::Blocker);
    }

    #[test]
    fn missing_required_core_field_is_blocker() {
        let live = build_envelope(sample_parts(), 1_000);
        let mut candidate = value_of(&build_envelope(sample_parts(), 1_000));
        candidate["core"]
            .as_object_mut()
            .expect("core object")
            .remove("violation_summary");

        let report = classifier().classify(value_of(&live), candidate);
        assert_eq!(report.classification, DriftClass::Blocker);
        assert_eq!(report.differences[0].kind, DriftKind::Invalid);
    }

    #[test]
    fn strictly_fewer_cycles_without_new_ones_is_warning() {
        let live = build_envelope(sample_parts(), 1_000);
        let mut parts = sample_parts();
        parts.cycles = Vec::new();
        let candidate = build_envelope(parts, 1_000);

        let report = classifier().classify(value_of(&live), value_of(&candidate));
        assert_eq!(report.classification, DriftClass::Warning);
    }

    #[test]
    fn a_new_cycle_is_blocker() {
        let live = build_envelope(sample_parts(), 1_000);
        let mut parts = sample_parts();
        parts
            .cycles
            .push(vec!["c.rs".to_owned(), "d.rs".to_owned()]);
        let candidate = build_envelope(parts, 1_000);

        let report = classifier().classify(value_of(&live), value_of(&candidate));
        assert_eq!(report.classification, DriftClass::Blocker);
    }

    #[test]
    fn fewer_violations_without_new_ones_is_warning() {
        let live = build_envelope(sample_parts(), 1_000);
        let mut parts = sample_parts();
        parts.violations.pop();
        let candidate = build_envelope(parts, 1_000);

        let report = classifier().classify(value_of(&live), value_of(&candidate));
        assert_eq!(report.classification, DriftClass::Warning);
    }

    #[test]
    fn degraded_to_success_transition_is_warning() {
        let mut live_parts = sample_parts();
        live_parts.degraded_reasons = vec![DegradedReason::AnalyzerFailed];
        let live = build_envelope(live_parts, 1_000);
        let candidate = build_envelope(sample_parts(), 1_000);

        let report = classifier().classify(value_of(&live), value_of(&candidate));
        assert_eq!(report.classification, DriftClass::Warning);
    }

    #[test]
    fn success_to_degraded_transition_is_blocker() {
        let live = build_envelope(sample_parts(), 1_000);
        let mut candidate_parts = sample_parts();
        candidate_parts.degraded_reasons = vec![DegradedReason::AnalyzerFailed];
        let candidate = build_envelope(candidate_parts, 1_000);

        let report = classifier().classify(value_of(&live), value_of(&candidate));
        assert_eq!(report.classification, DriftClass::Blocker);
    }

    #[test]
    fn upgraded_v1_live_envelope_compares_against_current_candidate() {
        let current = build_envelope(sample_parts(), 1_000);
        let mut historical = value_of(&current);
        historical["version"] = json!(1);
        let core = historical["core"].as_object_mut().expect("core");
        let graph = core.remove("graph").expect("graph");
        core.insert("stats".to_owned(), graph);
        core.remove("cycles_truncated");
        core.remove("degraded_reasons");
        core.remove("violation_summary");
        core.remove("analyzers");
        core.insert("violation_count".to_owned(), json!(2));

        let report = classifier().classify(historical, value_of(&current));
        assert_eq!(report.classification, DriftClass::Benign);
    }
}
