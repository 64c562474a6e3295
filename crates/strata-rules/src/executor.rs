use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use serde_json::Value;
use strata_config::StrataConfig;
use strata_core::{Snapshot, ViolationRecord, sort_extension_value};
use strata_graph::DependencyGraph;

use crate::{
    Analyzer, AnalyzerContext, AnalyzerError, AnalyzerFailure, AnalyzerOutcome, AnalyzerRegistry,
    AnalyzerReport, FailureKind, InputConfidence,
};

#[derive(Debug, Clone, Default)]
pub struct ExecutionResult {
    pub violations: Vec<ViolationRecord>,
    pub extensions: BTreeMap<String, Value>,
    pub reports: Vec<AnalyzerReport>,
}

impl ExecutionResult {
    pub fn any_failed(&self) -> bool {
        self.reports.iter().any(|report| {
            matches!(
                report.failure,
                Some(AnalyzerFailure {
                    kind: FailureKind::Error | FailureKind::Panic,
                    ..
                })
            )
        })
    }

    pub fn any_budget_exceeded(&self) -> bool {
        self.reports.iter().any(|report| {
            matches!(
                report.failure,
                Some(AnalyzerFailure {
                    kind: FailureKind::StepBudgetExceeded,
                    ..
                })
            )
        })
    }
}

pub fn execute(
    registry: &AnalyzerRegistry,
    snapshot: &Snapshot,
    graph: &DependencyGraph,
    config: &StrataConfig,
) -> ExecutionResult {
    let input_confidence = if snapshot.file_count < config.analyzers.min_confident_file_count {
        InputConfidence::Low
    } else {
        InputConfidence::Normal
    };

    let mut result = ExecutionResult::default();
    for analyzer in registry.analyzers() {
        let namespace = analyzer.namespace();
        if !is_enabled(config, namespace) {
            continue;
        }

        if analyzer.confidence_gated() && input_confidence == InputConfidence::Low {
            tracing::debug!(namespace, "analyzer declined: low input confidence");
            result.reports.push(AnalyzerReport {
                namespace: namespace.to_owned(),
                outcome: AnalyzerOutcome::Declined,
                violation_count: 0,
                failure: None,
            });
            continue;
        }

        let context = AnalyzerContext {
            snapshot,
            graph,
            config: &config.analyzers,
            step_budget: config.limits.analyzer_step_budget,
            input_confidence,
        };
        let report = match run_isolated(analyzer.as_ref(), &context) {
            Ok(output) => {
                let violation_count = output.violations.len() as u32;
                result.violations.extend(output.violations);
                if let Some(data) = output.extension_data {
                    result
                        .extensions
                        .insert(namespace.to_owned(), sort_extension_value(data));
                }
                AnalyzerReport {
                    namespace: namespace.to_owned(),
                    outcome: if violation_count > 0 {
                        AnalyzerOutcome::Findings
                    } else {
                        AnalyzerOutcome::NoFindings
                    },
                    violation_count,
                    failure: None,
                }
            }
            Err(failure) => {
                tracing::warn!(namespace, detail = %failure.detail, "analyzer failed");
                AnalyzerReport {
                    namespace: namespace.to_owned(),
                    outcome: AnalyzerOutcome::Failed,
                    violation_count: 0,
                    failure: Some(failure),
                }
            }
        };
        result.reports.push(report);
    }

    result
        .violations
        .sort_by(|left, right| left.id.cmp(&right.id));
    result
}

fn is_enabled(config: &StrataConfig, namespace: &str) -> bool {
    config.analyzers.enabled.is_empty()
        || config
            .analyzers
            .enabled
            .iter()
            .any(|enabled| enabled == namespace)
}

fn run_isolated(
    analyzer: &dyn Analyzer,
    context: &AnalyzerContext<'_>,
) -> Result<crate::AnalyzerOutput, AnalyzerFailure> {
    match catch_unwind(AssertUnwindSafe(|| analyzer.run(context))) {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(AnalyzerError::StepBudgetExceeded)) => Err(AnalyzerFailure {
            kind: FailureKind::StepBudgetExceeded,
            detail: "step budget exceeded".to_owned(),
        }),
        Ok(Err(error)) => Err(AnalyzerFailure {
            kind: FailureKind::Error,
            detail: error.to_string(),
        }),
        Err(payload) => {
            let detail = payload
                .downcast_ref::<&str>()
                .map(|message| (*message).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "analyzer panicked".to_owned());
            Err(AnalyzerFailure {
                kind: FailureKind::Panic,
                detail,
            })
        }
    }
}
