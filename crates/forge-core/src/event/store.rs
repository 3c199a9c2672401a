use chrono::Utc;
use std::collections::HashMap;
use uuid::Uuid;

use super::{FlowEvent, FlowEventKind};

/// Log de eventos append-only, particionado por flujo.
pub trait EventStore {
    /// Agrega `kind` al final del flujo y devuelve el evento sellado.
    fn append_kind(&mut self, flow_id: Uuid, kind: FlowEventKind) -> FlowEvent;
    /// Eventos de `flow_id` en orden de `seq`; vacío si no existe.
    fn list(&self, flow_id: Uuid) -> Vec<FlowEvent>;
}

#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    flows: HashMap<Uuid, Vec<FlowEvent>>,
}

impl EventStore for InMemoryEventStore {
    fn append_kind(&mut self, flow_id: Uuid, kind: FlowEventKind) -> FlowEvent {
        let log = self.flows.entry(flow_id).or_default();
        let event = FlowEvent { seq: log.len() as u64,
                                flow_id,
                                kind,
                                recorded_at: Utc::now() };
        log.push(event.clone());
        event
    }

    fn list(&self, flow_id: Uuid) -> Vec<FlowEvent> {
        self.flows.get(&flow_id).cloned().unwrap_or_default()
    }
}
