use serde_json::json;
use strata_canon::RawFile;
use strata_config::StrataConfig;
use strata_engine::{AnalysisRequest, run_analysis_from_raw};
use strata_envelope::{DegradedReason, RunStatus, validate};
use strata_rules::builtin_registry;

fn raw(path: &str, content: &str) -> RawFile {
    RawFile {
        path: path.to_owned(),
        bytes: content.as_bytes().to_vec(),
    }
}

fn three_cycle_workspace() -> Vec<RawFile> {
    vec![
        raw("a.ts", "import \"./b\";\n"),
        raw("b.ts", "import \"./a\";\n"),
        raw("c.ts", "import \"./d\";\n"),
        raw("d.ts", "import \"./c\";\n"),
        raw("x.ts", "import \"./y\";\n"),
        raw("y.ts", "import \"./z\";\n"),
        raw("z.ts", "import \"./x\";\n"),
    ]
}

fn request() -> AnalysisRequest {
    AnalysisRequest {
        identity: json!({"repo": "demo", "revision": "abc123"}),
        now_ms: Some(1_700_000_000_000),
    }
}

#[test]
fn identical_input_yields_byte_identical_envelopes() {
    let config = StrataConfig::default();
    let registry = builtin_registry().expect("registry");

    let first = run_analysis_from_raw(three_cycle_workspace(), &config, &registry, request())
        .expect("first run");
    let second = run_analysis_from_raw(three_cycle_workspace(), &config, &registry, request())
        .expect("second run");

    assert_eq!(first.meta.signature, second.meta.signature);
    assert_eq!(
        first.canonical_bytes().expect("bytes"),
        second.canonical_bytes().expect("bytes")
    );
}

#[test]
fn generation_time_is_the_only_field_allowed_to_differ() {
    let config = StrataConfig::default();
    let registry = builtin_registry().expect("registry");

    let pinned = run_analysis_from_raw(three_cycle_workspace(), &config, &registry, request())
        .expect("pinned run");
    let unpinned = run_analysis_from_raw(
        three_cycle_workspace(),
        &config,
        &registry,
        AnalysisRequest {
            identity: json!({"repo": "demo", "revision": "abc123"}),
            now_ms: None,
        },
    )
    .expect("unpinned run");

    assert_eq!(pinned.meta.signature, unpinned.meta.signature);

    let mut pinned_value = pinned.to_value().expect("value");
    let mut unpinned_value = unpinned.to_value().expect("value");
    for value in [&mut pinned_value, &mut unpinned_value] {
        value["meta"]
            .as_object_mut()
            .expect("meta")
            .remove("generation_time");
    }
    assert_eq!(pinned_value, unpinned_value);
}

#[test]
fn truncation_keeps_the_two_smallest_of_three_cycles() {
    let mut config = StrataConfig::default();
    config.limits.max_cycles = 2;
    let registry = builtin_registry().expect("registry");

    let envelope = run_analysis_from_raw(three_cycle_workspace(), &config, &registry, request())
        .expect("run");

    assert_eq!(envelope.core.status, RunStatus::Degraded);
    assert!(envelope.core.cycles_truncated);
    assert_eq!(
        envelope.core.degraded_reasons,
        vec![DegradedReason::CycleListTruncated]
    );
    assert_eq!(
        envelope.core.cycles,
        vec![
            vec!["a.ts".to_owned(), "b.ts".to_owned()],
            vec!["c.ts".to_owned(), "d.ts".to_owned()],
        ]
    );
    validate(&envelope).expect("valid degraded envelope");
}

#[test]
fn degraded_runs_repeat_with_identical_reason_and_cycle_list() {
    let mut config = StrataConfig::default();
    config.limits.max_nodes = 3;
    config.limits.max_cycles = 1;
    let registry = builtin_registry().expect("registry");

    let first = run_analysis_from_raw(three_cycle_workspace(), &config, &registry, request())
        .expect("first run");
    let second = run_analysis_from_raw(three_cycle_workspace(), &config, &registry, request())
        .expect("second run");

    assert_eq!(first.core.status, RunStatus::Degraded);
    assert_eq!(
        first.core.degraded_reasons,
        vec![
            DegradedReason::CycleListTruncated,
            DegradedReason::NodeLimitExceeded,
        ]
    );
    assert_eq!(first.core.cycles, second.core.cycles);
    assert_eq!(first.meta.signature, second.meta.signature);
}

#[test]
fn acyclic_chain_produces_an_empty_cycle_list() {
    let config = StrataConfig::default();
    let registry = builtin_registry().expect("registry");

    let envelope = run_analysis_from_raw(
        vec![
            raw("a.ts", "import \"./b\";\n"),
            raw("b.ts", "import \"./c\";\n"),
            raw("c.ts", ""),
        ],
        &config,
        &registry,
        request(),
    )
    .expect("run");

    assert!(envelope.core.cycles.is_empty());
    assert_eq!(envelope.core.status, RunStatus::Success);
}
