// Pipeline phases for the two-stage image build
//
// Phases run strictly in order. Each one reads what the previous phases left
// in the `PipelineContext` and adds its own result.

#[path = "01_validate.rs"]
pub mod validate;
#[path = "02_context.rs"]
pub mod context;
#[path = "03_builder.rs"]
pub mod builder;
#[path = "04_production.rs"]
pub mod production;
#[path = "05_verify.rs"]
pub mod verify;
