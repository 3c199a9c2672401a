//! `FlowEngine`: ejecuta una `FlowDefinition` en orden sobre un event store
//! append-only. El estado de cada flujo se reconstruye desde sus eventos
//! antes de cada paso; el primer fallo cierra el flujo para siempre.

use log::{debug, info, warn};
use serde_json::json;
use std::collections::HashMap;
use uuid::Uuid;

use crate::constants::ENGINE_VERSION;
use crate::engine::EngineBuilderInit;
use crate::errors::CoreEngineError;
use crate::event::{EventStore, FlowEvent, FlowEventKind, InMemoryEventStore};
use crate::hashing::hash_value;
use crate::model::{Artifact, ExecutionContext, StepFingerprintInput};
use crate::repo::{FlowDefinition, FlowRepository, InMemoryFlowRepository};
use crate::step::{StepDefinition, StepKind, StepRunResult};

/// Resultado de avanzar un paso.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    /// El step `step_index` terminó y quedan pasos pendientes.
    Advanced { step_index: usize },
    /// El último step terminó y se emitió `FlowCompleted`.
    Completed,
}

#[derive(Debug)]
pub struct FlowEngine<E, R>
    where E: EventStore,
          R: FlowRepository
{
    events: E,
    repository: R,
    /// Outputs indexados por hash canónico.
    artifacts: HashMap<String, Artifact>,
    flow_id: Option<Uuid>,
    definition: Option<FlowDefinition>,
}

impl FlowEngine<InMemoryEventStore, InMemoryFlowRepository> {
    /// Builder con stores en memoria.
    #[inline]
    pub fn new() -> EngineBuilderInit<InMemoryEventStore, InMemoryFlowRepository> {
        EngineBuilderInit { event_store: InMemoryEventStore::default(),
                            repository: InMemoryFlowRepository }
    }
}

impl Default for FlowEngine<InMemoryEventStore, InMemoryFlowRepository> {
    fn default() -> Self {
        Self::with_stores(InMemoryEventStore::default(), InMemoryFlowRepository)
    }
}

impl<E, R> FlowEngine<E, R>
    where E: EventStore,
          R: FlowRepository
{
    pub fn with_stores(events: E, repository: R) -> Self {
        Self { events,
               repository,
               artifacts: HashMap::new(),
               flow_id: None,
               definition: None }
    }

    pub(crate) fn set_definition(&mut self, definition: FlowDefinition) {
        self.definition = Some(definition);
    }

    pub fn event_store(&self) -> &E {
        &self.events
    }

    /// Fija el id del flujo que usan `run` y `step`. Sin llamarlo se genera
    /// uno aleatorio en la primera ejecución.
    pub fn set_default_flow_id(&mut self, flow_id: Uuid) {
        self.flow_id = Some(flow_id);
    }

    pub fn default_flow_id(&self) -> Option<Uuid> {
        self.flow_id
    }

    pub fn artifact(&self, hash: &str) -> Option<&Artifact> {
        self.artifacts.get(hash)
    }

    /// Artifacts emitidos por `step_id` en `flow_id`. Vacío si el step no
    /// terminó correctamente.
    pub fn outputs_of(&self, flow_id: Uuid, step_id: &str) -> Vec<&Artifact> {
        self.events
            .list(flow_id)
            .into_iter()
            .filter_map(|e| match e.kind {
                FlowEventKind::StepFinished { step_id: id, outputs, .. } if id == step_id => Some(outputs),
                _ => None,
            })
            .flatten()
            .filter_map(|h| self.artifacts.get(&h))
            .collect()
    }

    pub fn events_for(&self, flow_id: Uuid) -> Vec<FlowEvent> {
        self.events.list(flow_id)
    }

    /// Fingerprint del flujo por defecto; `None` mientras no haya terminado.
    pub fn flow_fingerprint(&self) -> Option<String> {
        let flow_id = self.flow_id?;
        self.events.list(flow_id).into_iter().rev().find_map(|e| match e.kind {
                                                         FlowEventKind::FlowCompleted { flow_fingerprint } => {
                                                             Some(flow_fingerprint)
                                                         }
                                                         _ => None,
                                                     })
    }

    /// Ejecuta la definición por defecto hasta el final.
    pub fn run(&mut self) -> Result<Uuid, CoreEngineError> {
        self.with_default(|engine, flow_id, def| engine.run_flow(flow_id, def))
    }

    /// Avanza un único paso de la definición por defecto.
    pub fn step(&mut self) -> Result<Progress, CoreEngineError> {
        self.with_default(|engine, flow_id, def| engine.advance(flow_id, def))
    }

    fn with_default<T>(&mut self,
                       f: impl FnOnce(&mut Self, Uuid, &FlowDefinition) -> Result<T, CoreEngineError>)
                       -> Result<T, CoreEngineError> {
        let flow_id = *self.flow_id.get_or_insert_with(Uuid::new_v4);
        let def = self.definition
                      .take()
                      .ok_or_else(|| CoreEngineError::Internal("engine built without a flow definition".into()))?;
        let result = f(self, flow_id, &def);
        self.definition = Some(def);
        result
    }

    pub fn run_flow(&mut self, flow_id: Uuid, definition: &FlowDefinition) -> Result<Uuid, CoreEngineError> {
        loop {
            match self.advance(flow_id, definition) {
                Ok(Progress::Advanced { .. }) => {}
                Ok(Progress::Completed) | Err(CoreEngineError::FlowCompleted) => return Ok(flow_id),
                Err(e) => return Err(e),
            }
        }
    }

    /// Ejecuta el siguiente step pendiente de `flow_id`.
    ///
    /// Un flujo con un `StepFailed` registrado devuelve `FlowHasFailed` sin
    /// ejecutar nada.
    pub fn advance(&mut self, flow_id: Uuid, definition: &FlowDefinition) -> Result<Progress, CoreEngineError> {
        let events = self.init_if_new(flow_id, definition);
        let instance = self.repository.load(&events, definition);
        if instance.failed {
            return Err(CoreEngineError::FlowHasFailed);
        }
        let index = instance.cursor;
        if instance.completed || index >= definition.len() {
            return Err(CoreEngineError::FlowCompleted);
        }

        let step = definition.steps[index].as_ref();
        if index == 0 && step.kind() != StepKind::Source {
            return Err(CoreEngineError::FirstStepMustBeSource);
        }
        // sólo se encadena el primer output del step anterior
        let input = index.checked_sub(1)
                         .and_then(|prev| instance.steps[prev].outputs.first())
                         .and_then(|h| self.artifacts.get(h).cloned());
        let ctx = ExecutionContext { input,
                                     params: step.base_params() };

        info!("flow {flow_id}: step {index} '{}' started", step.id());
        self.events.append_kind(flow_id,
                                FlowEventKind::StepStarted { step_index: index,
                                                             step_id: step.id().to_string() });

        match step.run(&ctx) {
            StepRunResult::Success { outputs } => {
                let hashes = self.store_outputs(outputs);
                let fingerprint = step_fingerprint(definition, index, step, &hashes);
                info!("flow {flow_id}: step {index} '{}' finished with {} output(s)", step.id(), hashes.len());
                self.events.append_kind(flow_id,
                                        FlowEventKind::StepFinished { step_index: index,
                                                                      step_id: step.id().to_string(),
                                                                      outputs: hashes,
                                                                      fingerprint });
                if index + 1 < definition.len() {
                    return Ok(Progress::Advanced { step_index: index });
                }
                self.complete(flow_id, definition);
                Ok(Progress::Completed)
            }
            StepRunResult::Failure { error } => {
                warn!("flow {flow_id}: step {index} '{}' failed: {error}", step.id());
                self.events.append_kind(flow_id,
                                        FlowEventKind::StepFailed { step_index: index,
                                                                    step_id: step.id().to_string(),
                                                                    error: error.clone(),
                                                                    fingerprint: step_fingerprint(definition,
                                                                                                  index,
                                                                                                  step,
                                                                                                  &[]) });
                Err(error)
            }
        }
    }

    fn init_if_new(&mut self, flow_id: Uuid, definition: &FlowDefinition) -> Vec<FlowEvent> {
        let mut events = self.events.list(flow_id);
        if events.is_empty() {
            debug!("flow {flow_id}: initialized with {} step(s)", definition.len());
            events.push(self.events
                            .append_kind(flow_id,
                                         FlowEventKind::FlowInitialized { definition_hash:
                                                                              definition.definition_hash.clone(),
                                                                          step_count: definition.len() }));
        }
        events
    }

    /// Asigna el hash canónico a cada output y lo guarda.
    fn store_outputs(&mut self, outputs: Vec<Artifact>) -> Vec<String> {
        outputs.into_iter()
               .map(|mut artifact| {
                   let hash = hash_value(&artifact.payload);
                   artifact.hash = hash.clone();
                   self.artifacts.insert(hash.clone(), artifact);
                   hash
               })
               .collect()
    }

    fn complete(&mut self, flow_id: Uuid, definition: &FlowDefinition) {
        let step_fingerprints: Vec<String> = self.events
                                                 .list(flow_id)
                                                 .into_iter()
                                                 .filter_map(|e| match e.kind {
                                                     FlowEventKind::StepFinished { fingerprint, .. } => Some(fingerprint),
                                                     _ => None,
                                                 })
                                                 .collect();
        let flow_fingerprint = hash_value(&json!({
                                              "engine_version": ENGINE_VERSION,
                                              "definition_hash": definition.definition_hash,
                                              "step_fingerprints": step_fingerprints,
                                          }));
        info!("flow {flow_id}: completed ({flow_fingerprint})");
        self.events.append_kind(flow_id, FlowEventKind::FlowCompleted { flow_fingerprint });
    }
}

fn step_fingerprint(definition: &FlowDefinition, index: usize, step: &dyn StepDefinition, outputs: &[String]) -> String {
    let params = step.base_params();
    let input = StepFingerprintInput { engine_version: ENGINE_VERSION,
                                       definition_hash: &definition.definition_hash,
                                       step_index: index,
                                       step_id: step.id(),
                                       output_hashes: outputs,
                                       params: &params };
    hash_value(&serde_json::to_value(&input).unwrap_or(serde_json::Value::Null))
}
