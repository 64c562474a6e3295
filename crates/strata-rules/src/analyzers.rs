use serde_json::json;
use strata_core::{Severity, ViolationRecord, violation_id};

use crate::{
    Analyzer, AnalyzerContext, AnalyzerError, AnalyzerOutput, AnalyzerRegistry, RegistryError,
};

pub const FAN_IN_NAMESPACE: &str = "deps.fan_in";
pub const ORPHAN_NAMESPACE: &str = "deps.orphan";
pub const HYGIENE_FILE_SIZE_NAMESPACE: &str = "hygiene.file_size";

pub fn builtin_registry() -> Result<AnalyzerRegistry, RegistryError> {
    Ok(AnalyzerRegistry::builder()
        .register(Box::new(FanInAnalyzer))?
        .register(Box::new(OrphanAnalyzer))?
        .register(Box::new(FileSizeAnalyzer))?
        .build())
}

struct Steps {
    remaining: u64,
}

impl Steps {
    fn new(budget: u64) -> Self {
        Self { remaining: budget }
    }

    fn step(&mut self) -> Result<(), AnalyzerError> {
        if self.remaining == 0 {
            return Err(AnalyzerError::StepBudgetExceeded);
        }
        self.remaining -= 1;
        Ok(())
    }
}

pub struct FanInAnalyzer;

impl Analyzer for FanInAnalyzer {
    fn namespace(&self) -> &'static str {
        FAN_IN_NAMESPACE
    }

    fn run(&self, context: &AnalyzerContext<'_>) -> Result<AnalyzerOutput, AnalyzerError> {
        let threshold = context.config.fan_in_threshold;
        let mut steps = Steps::new(context.step_budget);
        let mut violations = Vec::new();
        let mut flagged = Vec::new();

        for unit in context.graph.nodes() {
            steps.step()?;
            let fan_in = context.graph.dependents_of(unit).len() as u32;
            if fan_in <= threshold {
                continue;
            }
            violations.push(ViolationRecord {
                id: violation_id(FAN_IN_NAMESPACE, "fan_in_exceeded", unit),
                namespace: FAN_IN_NAMESPACE.to_owned(),
                rule: "fan_in_exceeded".to_owned(),
                severity: Severity::Warning,
                location: unit.to_owned(),
                message: format!("unit has {fan_in} dependents (threshold {threshold})"),
                context: json!({"fan_in": fan_in, "threshold": threshold}),
            });
            flagged.push(json!({"unit": unit, "fan_in": fan_in}));
        }

        Ok(AnalyzerOutput {
            violations,
            extension_data: Some(json!({
                "version": 1,
                "threshold": threshold,
                "flagged": flagged,
            })),
        })
    }
}

pub struct OrphanAnalyzer;

impl Analyzer for OrphanAnalyzer {
    fn namespace(&self) -> &'static str {
        ORPHAN_NAMESPACE
    }

    fn confidence_gated(&self) -> bool {
        true
    }

    fn run(&self, context: &AnalyzerContext<'_>) -> Result<AnalyzerOutput, AnalyzerError> {
        let mut steps = Steps::new(context.step_budget);
        let mut violations = Vec::new();
        let mut orphans = Vec::new();

        for unit in context.graph.nodes() {
            steps.step()?;
            if !context.graph.dependents_of(unit).is_empty()
                || !context.graph.dependencies_of(unit).is_empty()
            {
                continue;
            }
            violations.push(ViolationRecord {
                id: violation_id(ORPHAN_NAMESPACE, "orphan_unit", unit),
                namespace: ORPHAN_NAMESPACE.to_owned(),
                rule: "orphan_unit".to_owned(),
                severity: Severity::Info,
                location: unit.to_owned(),
                message: "unit has no dependency edges in either direction".to_owned(),
                context: json!({}),
            });
            orphans.push(unit.to_owned());
        }

        Ok(AnalyzerOutput {
            violations,
            extension_data: Some(json!({
                "version": 1,
                "orphans": orphans,
            })),
        })
    }
}

pub struct FileSizeAnalyzer;

impl Analyzer for FileSizeAnalyzer {
    fn namespace(&self) -> &'static str {
        HYGIENE_FILE_SIZE_NAMESPACE
    }

    fn run(&self, context: &AnalyzerContext<'_>) -> Result<AnalyzerOutput, AnalyzerError> {
        let max_lines = context.config.max_unit_lines;
        let mut steps = Steps::new(context.step_budget);
        let mut violations = Vec::new();
        let mut measured = 0u32;

        for record in &context.snapshot.files {
            steps.step()?;
            let Some(content) = &record.content else {
                continue;
            };
            measured += 1;
            let line_count = content.lines().count() as u32;
            if line_count <= max_lines {
                continue;
            }
            violations.push(ViolationRecord {
                id: violation_id(HYGIENE_FILE_SIZE_NAMESPACE, "unit_too_long", &record.path),
                namespace: HYGIENE_FILE_SIZE_NAMESPACE.to_owned(),
                rule: "unit_too_long".to_owned(),
                severity: Severity::Warning,
                location: record.path.clone(),
                message: format!("unit is {line_count} lines long (maximum {max_lines})"),
                context: json!({"line_count": line_count, "max_lines": max_lines}),
            });
        }

        Ok(AnalyzerOutput {
            violations,
            extension_data: Some(json!({
                "version": 1,
                "max_lines": max_lines,
                "measured_units": measured,
            })),
        })
    }
}
