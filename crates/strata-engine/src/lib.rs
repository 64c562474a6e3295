use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;
use strata_canon::{CanonError, RawFile, canonicalize, verify_canonical};
use strata_config::StrataConfig;
use strata_core::Snapshot;
use strata_envelope::{
    DegradedReason, Envelope, EnvelopeParts, ErrorCode, build_envelope, error_envelope,
};
use strata_graph::{build_graph, enumerate_cycles};
use strata_rules::AnalyzerRegistry;

#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub identity: Value,
    pub now_ms: Option<i64>,
}

pub fn run_analysis(
    snapshot: &Snapshot,
    config: &StrataConfig,
    registry: &AnalyzerRegistry,
    request: AnalysisRequest,
) -> Envelope {
    let generation_time = request.now_ms.unwrap_or_else(now_millis);

    let config_hash = match strata_config::config_hash(config) {
        Ok(hash) => hash,
        Err(error) => {
            tracing::error!(error = %error, "config hash failed");
            return error_envelope(
                request.identity,
                ErrorCode::SerializationFailed,
                snapshot.fingerprint.clone(),
                String::new(),
                generation_time,
            );
        }
    };

    if let Err(error) = verify_canonical(snapshot, &config.limits) {
        tracing::warn!(error = %error, "snapshot failed canonical verification");
        return error_envelope(
            request.identity,
            ErrorCode::SnapshotInvalid,
            snapshot.fingerprint.clone(),
            config_hash,
            generation_time,
        );
    }

    let mut degraded_reasons = Vec::new();

    let graph = build_graph(snapshot);
    let stats = graph.stats();
    if stats.node_count > config.limits.max_nodes {
        degraded_reasons.push(DegradedReason::NodeLimitExceeded);
    }
    if stats.edge_count > config.limits.max_edges {
        degraded_reasons.push(DegradedReason::EdgeLimitExceeded);
    }

    let cycle_analysis = enumerate_cycles(
        &graph,
        config.limits.max_cycles,
        config.limits.cycle_step_budget,
    );
    if cycle_analysis.truncated {
        degraded_reasons.push(DegradedReason::CycleListTruncated);
    }
    if cycle_analysis.budget_exhausted {
        degraded_reasons.push(DegradedReason::CycleBudgetExhausted);
    }

    let execution = strata_rules::execute(registry, snapshot, &graph, config);
    if execution.any_failed() {
        degraded_reasons.push(DegradedReason::AnalyzerFailed);
    }
    if execution.any_budget_exceeded() {
        degraded_reasons.push(DegradedReason::AnalyzerBudgetExceeded);
    }

    build_envelope(
        EnvelopeParts {
            identity: request.identity,
            graph: stats,
            cycles: cycle_analysis.cycles,
            cycles_truncated: cycle_analysis.truncated,
            degraded_reasons,
            violations: execution.violations,
            analyzers: execution.reports,
            extensions: execution.extensions,
            snapshot_fingerprint: snapshot.fingerprint.clone(),
            config_hash,
        },
        generation_time,
    )
}

pub fn run_analysis_from_raw(
    files: Vec<RawFile>,
    config: &StrataConfig,
    registry: &AnalyzerRegistry,
    request: AnalysisRequest,
) -> Result<Envelope, CanonError> {
    let snapshot = canonicalize(files, &config.limits)?;
    Ok(run_analysis(&snapshot, config, registry, request))
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|value| value.as_millis() as i64)
        .unwrap_or(0)
}
