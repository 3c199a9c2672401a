use serde::{de::DeserializeOwned, Serialize};

use super::{StepKind, StepRunResult};
use crate::errors::CoreEngineError;
use crate::model::ArtifactSpec;

/// Resultado tipado de ejecutar un `TypedStep`.
///
/// Permite trabajar con outputs fuertemente tipados durante la implementación
/// de pasos y convertirlos a la representación neutra que el engine usa.
pub enum StepRunResultTyped<Out: ArtifactSpec> {
    Success { outputs: Vec<Out> },
    Failure { error: CoreEngineError },
}

impl<Out: ArtifactSpec> StepRunResultTyped<Out> {
    /// Convierte a `StepRunResult` neutro serializando los outputs a
    /// `Artifact` usando `ArtifactSpec::into_artifact`.
    pub fn into_neutral(self) -> StepRunResult {
        match self {
            StepRunResultTyped::Success { outputs } => {
                match outputs.into_iter().map(ArtifactSpec::into_artifact).collect() {
                    Ok(outputs) => StepRunResult::Success { outputs },
                    Err(e) => StepRunResult::Failure { error: CoreEngineError::Internal(e.to_string()) },
                }
            }
            StepRunResultTyped::Failure { error } => StepRunResult::Failure { error },
        }
    }
}

/// Interfaz de alto nivel para definir Steps con tipos fuertes
/// (Params / Input / Output).
///
/// Implementadores escriben `run_typed` con tipos concretos; el adaptador de
/// abajo convierte esa ejecución a la interfaz neutra `StepDefinition`.
pub trait TypedStep {
    /// Parámetros deserializables y clonables.
    type Params: DeserializeOwned + Serialize + Clone + Default;
    /// Tipo concreto esperado como input. Para `Source` se ignora.
    type Input: ArtifactSpec;
    /// Tipo concreto producido como output.
    type Output: ArtifactSpec;

    /// Identificador estable del step dentro del flow.
    fn id(&self) -> &'static str;

    /// Tipo general del step.
    fn kind(&self) -> StepKind;

    /// Parámetros por defecto deterministas.
    fn params_default(&self) -> Self::Params {
        Default::default()
    }

    /// Ejecución tipada. Para `Source`, `input` será `None`.
    fn run_typed(&self, input: Option<Self::Input>, params: Self::Params) -> StepRunResultTyped<Self::Output>;
}

// -------------------------------------------------------------
// Adaptador: cualquier `TypedStep` implementa `StepDefinition` neutro.
// -------------------------------------------------------------
impl<T> crate::step::StepDefinition for T where T: TypedStep + 'static + std::fmt::Debug
{
    fn id(&self) -> &str {
        <Self as TypedStep>::id(self)
    }

    fn base_params(&self) -> serde_json::Value {
        serde_json::to_value(self.params_default()).unwrap_or(serde_json::Value::Null)
    }

    fn run(&self, ctx: &crate::model::ExecutionContext) -> StepRunResult {
        // Params inválidos caen a los defaults del step
        let params: <Self as TypedStep>::Params = ctx.params_as().unwrap_or_else(|_| self.params_default());

        let kind = <Self as TypedStep>::kind(self);
        let typed_in = match (&ctx.input, kind) {
            (_, StepKind::Source) => None,
            (None, _) => return StepRunResult::Failure { error: CoreEngineError::MissingInputs },
            (Some(a), _) => match <Self as TypedStep>::Input::from_artifact(a) {
                Ok(v) => Some(v),
                Err(e) => return StepRunResult::Failure { error: CoreEngineError::InvalidInput(e.to_string()) },
            },
        };

        <Self as TypedStep>::run_typed(self, typed_in, params).into_neutral()
    }

    fn kind(&self) -> StepKind {
        <Self as TypedStep>::kind(self)
    }

    fn definition_hash(&self) -> String {
        let hash_input = serde_json::json!({
            "id": <Self as TypedStep>::id(self),
            "kind": format!("{:?}", <Self as TypedStep>::kind(self)),
            "base_params": crate::step::StepDefinition::base_params(self),
            "type": std::any::type_name::<T>()
        });
        crate::hashing::hash_value(&hash_input)
    }
}
