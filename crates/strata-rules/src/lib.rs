mod analyzers;
mod executor;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strata_config::AnalyzersConfig;
use strata_core::{Snapshot, ViolationRecord};
use strata_graph::DependencyGraph;
use thiserror::Error;

pub use analyzers::{
    FAN_IN_NAMESPACE, FanInAnalyzer, FileSizeAnalyzer, HYGIENE_FILE_SIZE_NAMESPACE,
    ORPHAN_NAMESPACE, OrphanAnalyzer, builtin_registry,
};
pub use executor::{ExecutionResult, execute};

pub struct AnalyzerContext<'a> {
    pub snapshot: &'a Snapshot,
    pub graph: &'a DependencyGraph,
    pub config: &'a AnalyzersConfig,
    pub step_budget: u64,
    pub input_confidence: InputConfidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputConfidence {
    Low,
    Normal,
}

#[derive(Debug, Clone, Default)]
pub struct AnalyzerOutput {
    pub violations: Vec<ViolationRecord>,
    pub extension_data: Option<Value>,
}

#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("step budget exceeded")]
    StepBudgetExceeded,
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Message(String),
}

pub trait Analyzer: Send + Sync {
    fn namespace(&self) -> &'static str;

    fn confidence_gated(&self) -> bool {
        false
    }

    fn run(&self, context: &AnalyzerContext<'_>) -> Result<AnalyzerOutput, AnalyzerError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerOutcome {
    Findings,
    NoFindings,
    Declined,
    Failed,
}

impl AnalyzerOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Findings => "findings",
            Self::NoFindings => "no_findings",
            Self::Declined => "declined",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Error,
    Panic,
    StepBudgetExceeded,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzerFailure {
    pub kind: FailureKind,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerReport {
    pub namespace: String,
    pub outcome: AnalyzerOutcome,
    pub violation_count: u32,
    pub failure: Option<AnalyzerFailure>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("duplicate analyzer namespace '{namespace}'")]
    DuplicateNamespace { namespace: String },
    #[error("empty analyzer namespace")]
    EmptyNamespace,
}

pub struct AnalyzerRegistry {
    analyzers: Vec<Box<dyn Analyzer>>,
}

impl AnalyzerRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            analyzers: Vec::new(),
        }
    }

    pub fn analyzers(&self) -> &[Box<dyn Analyzer>] {
        &self.analyzers
    }

    pub fn namespaces(&self) -> Vec<&'static str> {
        self.analyzers
            .iter()
            .map(|analyzer| analyzer.namespace())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}

pub struct RegistryBuilder {
    analyzers: Vec<Box<dyn Analyzer>>,
}

impl RegistryBuilder {
    pub fn register(mut self, analyzer: Box<dyn Analyzer>) -> Result<Self, RegistryError> {
        let namespace = analyzer.namespace();
        if namespace.trim().is_empty() {
            return Err(RegistryError::EmptyNamespace);
        }
        if self
            .analyzers
            .iter()
            .any(|existing| existing.namespace() == namespace)
        {
            return Err(RegistryError::DuplicateNamespace {
                namespace: namespace.to_owned(),
            });
        }
        self.analyzers.push(analyzer);
        Ok(self)
    }

    pub fn build(mut self) -> AnalyzerRegistry {
        self.analyzers
            .sort_by(|left, right| left.namespace().cmp(right.namespace()));
        AnalyzerRegistry {
            analyzers: self.analyzers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopAnalyzer(&'static str);

    impl Analyzer for NoopAnalyzer {
        fn namespace(&self) -> &'static str {
            self.0
        }

        fn run(&self, _context: &AnalyzerContext<'_>) -> Result<AnalyzerOutput, AnalyzerError> {
            Ok(AnalyzerOutput::default())
        }
    }

    #[test]
    fn registry_orders_analyzers_by_namespace() {
        let registry = AnalyzerRegistry::builder()
            .register(Box::new(NoopAnalyzer("z.last")))
            .expect("register")
            .register(Box::new(NoopAnalyzer("a.first")))
            .expect("register")
            .build();
        assert_eq!(registry.namespaces(), vec!["a.first", "z.last"]);
    }

    #[test]
    fn duplicate_namespace_is_rejected_at_build_time() {
        let result = AnalyzerRegistry::builder()
            .register(Box::new(NoopAnalyzer("deps.fan_in")))
            .expect("register")
            .register(Box::new(NoopAnalyzer("deps.fan_in")));
        assert!(matches!(
            result,
            Err(RegistryError::DuplicateNamespace { .. })
        ));
    }
}
