//! Steps: la interfaz neutra que ve el engine (`StepDefinition`) y la tipada
//! con la que se escriben (`TypedStep`).

pub mod definition;
pub mod macros;
mod run_result;
pub mod typed;

pub use definition::{StepDefinition, StepKind};
pub use run_result::StepRunResult;
pub use typed::{StepRunResultTyped, TypedStep};
