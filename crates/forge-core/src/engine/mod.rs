//! Motor de flujos y su builder tipado.

pub mod builder;
pub mod core;

pub use self::core::{FlowEngine, Progress};
pub use builder::{EngineBuilder, EngineBuilderInit, SameAs};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::CoreEngineError;
    use crate::event::{FlowEvent, FlowEventKind};
    use crate::step::{StepKind, StepRunResultTyped, TypedStep};
    use crate::typed_artifact;

    typed_artifact!(Note { text: String });

    #[derive(Debug)]
    struct Seed;

    impl TypedStep for Seed {
        type Params = ();
        type Input = Note;
        type Output = Note;
        fn id(&self) -> &'static str { "seed" }
        fn kind(&self) -> StepKind { StepKind::Source }
        fn run_typed(&self, _input: Option<Note>, _p: ()) -> StepRunResultTyped<Note> {
            StepRunResultTyped::Success { outputs: vec![Note { text: "seed".into(), schema_version: 1 }] }
        }
    }

    #[derive(Debug)]
    struct Upper;

    impl TypedStep for Upper {
        type Params = ();
        type Input = Note;
        type Output = Note;
        fn id(&self) -> &'static str { "upper" }
        fn kind(&self) -> StepKind { StepKind::Transform }
        fn run_typed(&self, input: Option<Note>, _p: ()) -> StepRunResultTyped<Note> {
            match input {
                Some(n) => StepRunResultTyped::Success { outputs: vec![Note { text: n.text.to_uppercase(), schema_version: 1 }] },
                None => StepRunResultTyped::Failure { error: CoreEngineError::MissingInputs },
            }
        }
    }

    #[derive(Debug)]
    struct Explode;

    #[test]
    fn first_step_must_be_a_source() {
        let mut engine = FlowEngine::default();
        let def = crate::repo::FlowDefinition::from_steps(vec![Box::new(Upper) as Box<dyn crate::step::StepDefinition>]);
        let err = engine.run_flow(uuid::Uuid::new_v4(), &def).unwrap_err();
        assert_eq!(err, CoreEngineError::FirstStepMustBeSource);
    }

    impl TypedStep for Explode {
        type Params = ();
        type Input = Note;
        type Output = Note;
        fn id(&self) -> &'static str { "explode" }
        fn kind(&self) -> StepKind { StepKind::Transform }
        fn run_typed(&self, _input: Option<Note>, _p: ()) -> StepRunResultTyped<Note> {
            StepRunResultTyped::Failure { error: CoreEngineError::step_failed("compilation", "boom") }
        }
    }

    fn letters(events: &[FlowEvent]) -> String {
        events.iter()
              .map(|e| match e.kind {
                  FlowEventKind::FlowInitialized { .. } => 'I',
                  FlowEventKind::StepStarted { .. } => 'S',
                  FlowEventKind::StepFinished { .. } => 'F',
                  FlowEventKind::StepFailed { .. } => 'X',
                  FlowEventKind::FlowCompleted { .. } => 'C',
              })
              .collect()
    }

    #[test]
    fn builder_runs_steps_in_order_and_completes() {
        let mut engine = FlowEngine::new().first_step(Seed).add_step(Upper).build();
        let flow_id = engine.run().expect("flow should complete");

        assert_eq!(letters(&engine.events_for(flow_id)), "ISFSFC");
        let out = engine.outputs_of(flow_id, "upper");
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].payload["text"], "SEED");
        assert!(engine.flow_fingerprint().is_some());
    }

    #[test]
    fn step_by_step_reports_completion() {
        let mut engine = FlowEngine::new().first_step(Seed).add_step(Upper).build();
        assert_eq!(engine.step(), Ok(Progress::Advanced { step_index: 0 }));
        assert_eq!(engine.step(), Ok(Progress::Completed));
        assert_eq!(engine.step(), Err(CoreEngineError::FlowCompleted));
    }

    #[test]
    fn failure_stops_the_flow() {
        let mut engine = FlowEngine::new().first_step(Seed).add_step(Explode).add_step(Upper).build();
        let err = engine.run().unwrap_err();
        assert_eq!(err, CoreEngineError::step_failed("compilation", "boom"));

        let flow_id = engine.default_flow_id().unwrap();
        assert_eq!(letters(&engine.events_for(flow_id)), "ISFSX");
        assert!(engine.flow_fingerprint().is_none());

        // Reintentar no ejecuta más pasos
        assert_eq!(engine.step(), Err(CoreEngineError::FlowHasFailed));
        let events = engine.events_for(flow_id);
        assert!(!events.iter().any(|e| matches!(&e.kind, FlowEventKind::StepStarted { step_id, .. } if step_id == "upper")));
    }
}
