use forge_core::model::ExecutionContext;
use forge_core::{Artifact, ArtifactKind, CoreEngineError, FlowDefinition, FlowEngine, FlowEventKind,
                 StepDefinition, StepKind, StepRunResult};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

// Step neutro que cuenta cuántas veces se ejecutó
struct Counting {
    id: &'static str,
    kind: StepKind,
    fail: bool,
    runs: Arc<AtomicUsize>,
}

impl StepDefinition for Counting {
    fn id(&self) -> &str {
        self.id
    }
    fn base_params(&self) -> serde_json::Value {
        json!({"fail": self.fail})
    }
    fn run(&self, ctx: &ExecutionContext) -> StepRunResult {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return StepRunResult::Failure { error: CoreEngineError::step_failed("provisioning", "apt-get exited with 100") };
        }
        let prev = ctx.input.as_ref().map(|a| a.payload["n"].as_u64().unwrap_or(0)).unwrap_or(0);
        let art = Artifact { kind: ArtifactKind::GenericJson,
                             hash: String::new(),
                             payload: json!({"n": prev + 1, "schema_version": 1}),
                             metadata: None };
        StepRunResult::Success { outputs: vec![art] }
    }
    fn kind(&self) -> StepKind {
        self.kind
    }
}

fn step(id: &'static str, kind: StepKind, fail: bool, runs: &Arc<AtomicUsize>) -> Box<dyn StepDefinition> {
    Box::new(Counting { id, kind, fail, runs: runs.clone() })
}

#[test]
fn failing_first_step_prevents_every_later_step() {
    let runs = Arc::new(AtomicUsize::new(0));
    let def = FlowDefinition::from_steps(vec![step("provision", StepKind::Source, true, &runs),
                                              step("compile", StepKind::Transform, false, &runs),
                                              step("package", StepKind::Sink, false, &runs)]);
    let mut engine = FlowEngine::default();
    let flow_id = Uuid::new_v4();

    let err = engine.run_flow(flow_id, &def).unwrap_err();
    assert!(matches!(err, CoreEngineError::StepFailed { ref category, .. } if category == "provisioning"));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let events = engine.events_for(flow_id);
    let last = events.last().expect("events");
    assert!(matches!(&last.kind, FlowEventKind::StepFailed { step_id, .. } if step_id == "provision"));
    assert!(!events.iter().any(|e| matches!(e.kind, FlowEventKind::FlowCompleted { .. })));

    // Un segundo intento sobre el mismo flow queda bloqueado
    assert_eq!(engine.run_flow(flow_id, &def), Err(CoreEngineError::FlowHasFailed));
    assert_eq!(runs.load(Ordering::SeqCst), 1);
}

#[test]
fn outputs_are_chained_and_hashed() {
    let runs = Arc::new(AtomicUsize::new(0));
    let def = FlowDefinition::from_steps(vec![step("a", StepKind::Source, false, &runs),
                                              step("b", StepKind::Sink, false, &runs)]);
    let mut engine = FlowEngine::default();
    let flow_id = Uuid::new_v4();
    engine.run_flow(flow_id, &def).unwrap();

    let out = engine.outputs_of(flow_id, "b");
    assert_eq!(out[0].payload["n"], 2);
    assert_eq!(out[0].hash.len(), 64);
    assert!(engine.artifact(&out[0].hash).is_some());
}

#[test]
fn identical_flows_share_fingerprints() {
    let fingerprint = || {
        let runs = Arc::new(AtomicUsize::new(0));
        let def = FlowDefinition::from_steps(vec![step("a", StepKind::Source, false, &runs),
                                                  step("b", StepKind::Sink, false, &runs)]);
        let mut engine = FlowEngine::default();
        let flow_id = Uuid::new_v4();
        engine.run_flow(flow_id, &def).unwrap();
        engine.events_for(flow_id)
              .into_iter()
              .find_map(|e| match e.kind {
                  FlowEventKind::FlowCompleted { flow_fingerprint } => Some(flow_fingerprint),
                  _ => None,
              })
              .unwrap()
    };
    assert_eq!(fingerprint(), fingerprint());
}
