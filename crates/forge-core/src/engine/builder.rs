//! Builder tipado de `FlowEngine`: el primer step es la fuente y cada
//! `add_step` exige que su `Input` sea el `Output` del step anterior, así un
//! flujo mal encadenado no compila.
//!
//! ```ignore
//! let engine = FlowEngine::new()
//!     .first_step(ProvisionStep::new(ctx.clone()))
//!     .add_step(CompileStep::new(ctx.clone()))
//!     .add_step(PackageStep::new(ctx))
//!     .build();
//! ```

use std::fmt::Debug;
use std::marker::PhantomData;

use crate::engine::FlowEngine;
use crate::event::EventStore;
use crate::repo::FlowRepository;
use crate::repo::FlowDefinition;
use crate::step::{StepDefinition, TypedStep};

/// Igualdad de tipos como bound: `A: SameAs<B>` sólo se cumple si `A == B`.
pub trait SameAs<T> {}
impl<T> SameAs<T> for T {}

/// Estado inicial del builder.
#[derive(Debug)]
pub struct EngineBuilderInit<E: EventStore, R: FlowRepository> {
    /// Store de eventos que usará el engine.
    pub event_store: E,
    /// Repositorio de estado del flujo.
    pub repository: R,
}

impl<E: EventStore, R: FlowRepository> EngineBuilderInit<E, R> {
    /// Primer step del flujo. Si no es `Source` el engine lo rechaza al
    /// ejecutar con `FirstStepMustBeSource`.
    #[inline]
    pub fn first_step<S>(self, step: S) -> EngineBuilder<S, E, R>
        where S: TypedStep + Debug + 'static
    {
        EngineBuilder { event_store: self.event_store,
                        repository: self.repository,
                        steps: vec![Box::new(step)],
                        _out: PhantomData::<S::Output> }
    }
}

/// Builder principal que acumula pasos y garantiza compatibilidad de tipos.
pub struct EngineBuilder<S: TypedStep + Debug + 'static, E: EventStore, R: FlowRepository> {
    event_store: E,
    repository: R,
    steps: Vec<Box<dyn StepDefinition>>,
    /// Marcador de tipo para el output del último paso añadido.
    _out: PhantomData<S::Output>,
}

impl<S: TypedStep + Debug + 'static, E: EventStore, R: FlowRepository> EngineBuilder<S, E, R> {
    /// Añade un siguiente paso al flujo.
    ///
    /// La comprobación `N::Input: SameAs<S::Output>` asegura que la entrada del
    /// nuevo paso `N` es la salida del paso anterior `S`.
    #[inline]
    pub fn add_step<N>(mut self, next: N) -> EngineBuilder<N, E, R>
        where N: TypedStep + Debug + 'static,
              N::Input: SameAs<S::Output>
    {
        self.steps.push(Box::new(next));

        EngineBuilder { event_store: self.event_store,
                        repository: self.repository,
                        steps: self.steps,
                        _out: PhantomData }
    }

    /// Construye el `FlowEngine` final usando las stores y la lista de pasos.
    /// La definición generada queda como definición por defecto del engine.
    #[inline]
    pub fn build(self) -> FlowEngine<E, R> {
        let mut engine = FlowEngine::with_stores(self.event_store, self.repository);
        engine.set_definition(FlowDefinition::from_steps(self.steps));
        engine
    }
}
