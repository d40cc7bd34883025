pub mod schema;

pub use schema::PipelineSpec;
