//! Definición de un flujo y su estado reconstruido desde eventos.
//!
//! El repositorio no guarda nada: `load` recorre los eventos de un flujo en
//! orden y devuelve un `FlowInstance` con el estado de cada step. Los
//! artifacts quedan en el engine; aquí sólo viajan sus hashes.
use serde_json::Value;
use std::fmt;

use crate::event::{FlowEvent, FlowEventKind};
use crate::hashing::hash_value;
use crate::step::StepDefinition;

/// Estado de un step. Sólo avanza: `Pending` → `Running` → `Succeeded` o
/// `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

pub struct StepSlot {
    pub status: StepStatus,
    /// Hashes de los outputs; vacío salvo en `Succeeded`.
    pub outputs: Vec<String>,
}

pub struct FlowInstance {
    pub steps: Vec<StepSlot>,
    /// Índice del primer step pendiente (`steps.len()` si no queda ninguno).
    pub cursor: usize,
    pub completed: bool,
    pub failed: bool,
}

pub trait FlowRepository {
    fn load(&self, events: &[FlowEvent], definition: &FlowDefinition) -> FlowInstance;
}

/// Secuencia inmutable de steps más el hash que la identifica.
pub struct FlowDefinition {
    pub steps: Vec<Box<dyn StepDefinition>>,
    pub definition_hash: String,
}

impl FlowDefinition {
    /// El hash cubre, en orden, el `definition_hash` de cada step (id, kind y
    /// params base): dos flujos con la misma configuración comparten hash.
    pub fn from_steps(steps: Vec<Box<dyn StepDefinition>>) -> Self {
        let per_step: Vec<Value> = steps.iter()
                                        .map(|s| Value::String(s.definition_hash()))
                                        .collect();
        let definition_hash = hash_value(&Value::Array(per_step));
        FlowDefinition { steps, definition_hash }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_ids(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.id()).collect()
    }
}

impl fmt::Debug for FlowDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowDefinition")
         .field("steps", &self.step_ids())
         .field("definition_hash", &self.definition_hash)
         .finish()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct InMemoryFlowRepository;

impl FlowRepository for InMemoryFlowRepository {
    fn load(&self, events: &[FlowEvent], definition: &FlowDefinition) -> FlowInstance {
        let mut steps: Vec<StepSlot> = definition.steps
                                                 .iter()
                                                 .map(|_| StepSlot { status: StepStatus::Pending,
                                                                     outputs: Vec::new() })
                                                 .collect();
        let mut completed = false;
        let mut failed = false;
        for ev in events {
            let (index, status) = match &ev.kind {
                FlowEventKind::FlowInitialized { .. } => continue,
                FlowEventKind::FlowCompleted { .. } => {
                    completed = true;
                    continue;
                }
                FlowEventKind::StepStarted { step_index, .. } => (*step_index, StepStatus::Running),
                FlowEventKind::StepFinished { step_index, .. } => (*step_index, StepStatus::Succeeded),
                FlowEventKind::StepFailed { step_index, .. } => {
                    failed = true;
                    (*step_index, StepStatus::Failed)
                }
            };
            // eventos de un índice fuera de la definición se ignoran
            let Some(slot) = steps.get_mut(index) else { continue };
            slot.status = status;
            if let FlowEventKind::StepFinished { outputs, .. } = &ev.kind {
                slot.outputs = outputs.clone();
            }
        }
        let cursor = steps.iter()
                          .position(|s| s.status == StepStatus::Pending)
                          .unwrap_or(steps.len());
        FlowInstance { steps,
                       cursor,
                       completed,
                       failed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventStore, InMemoryEventStore};
    use crate::model::ExecutionContext;
    use crate::step::{StepKind, StepRunResult};
    use crate::CoreEngineError;
    use serde_json::json;
    use uuid::Uuid;

    struct Noop(&'static str);

    impl StepDefinition for Noop {
        fn id(&self) -> &str {
            self.0
        }
        fn base_params(&self) -> Value {
            json!({})
        }
        fn run(&self, _ctx: &ExecutionContext) -> StepRunResult {
            StepRunResult::Success { outputs: Vec::new() }
        }
        fn kind(&self) -> StepKind {
            StepKind::Source
        }
    }

    fn definition() -> FlowDefinition {
        FlowDefinition::from_steps(vec![Box::new(Noop("provision")) as Box<dyn StepDefinition>,
                                        Box::new(Noop("compile")),
                                        Box::new(Noop("package"))])
    }

    #[test]
    fn state_is_rebuilt_from_events() {
        let def = definition();
        let flow = Uuid::new_v4();
        let mut store = InMemoryEventStore::default();
        store.append_kind(flow,
                          FlowEventKind::FlowInitialized { definition_hash: def.definition_hash.clone(),
                                                           step_count: def.len() });
        store.append_kind(flow,
                          FlowEventKind::StepStarted { step_index: 0,
                                                       step_id: "provision".into() });
        store.append_kind(flow,
                          FlowEventKind::StepFinished { step_index: 0,
                                                        step_id: "provision".into(),
                                                        outputs: vec!["h0".into()],
                                                        fingerprint: "f0".into() });
        store.append_kind(flow,
                          FlowEventKind::StepStarted { step_index: 1,
                                                       step_id: "compile".into() });

        let running = InMemoryFlowRepository.load(&store.list(flow), &def);
        assert_eq!(running.cursor, 2);
        assert_eq!(running.steps[0].status, StepStatus::Succeeded);
        assert_eq!(running.steps[0].outputs, vec!["h0".to_string()]);
        assert_eq!(running.steps[1].status, StepStatus::Running);
        assert!(!running.failed && !running.completed);

        store.append_kind(flow,
                          FlowEventKind::StepFailed { step_index: 1,
                                                      step_id: "compile".into(),
                                                      error: CoreEngineError::step_failed("compilation", "exit 101"),
                                                      fingerprint: "f1".into() });
        let failed = InMemoryFlowRepository.load(&store.list(flow), &def);
        assert!(failed.failed);
        assert_eq!(failed.steps[1].status, StepStatus::Failed);
        assert!(failed.steps[1].outputs.is_empty());
        assert_eq!(failed.steps[2].status, StepStatus::Pending);
    }

    #[test]
    fn events_past_the_definition_are_ignored() {
        let def = definition();
        let mut store = InMemoryEventStore::default();
        let flow = Uuid::new_v4();
        store.append_kind(flow,
                          FlowEventKind::StepStarted { step_index: 7,
                                                       step_id: "extra".into() });
        let instance = InMemoryFlowRepository.load(&store.list(flow), &def);
        assert_eq!(instance.cursor, 0);
        assert!(instance.steps.iter().all(|s| s.status == StepStatus::Pending));
    }
}
