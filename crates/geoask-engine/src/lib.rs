//! geoask engine
//!
//! Everything between a natural-language question and a result sentence,
//! except the model transport and the geometry kernel:
//! - `backend`: traits the host GIS implements (project, datasets, processing),
//! - `context`: the schema description shown to the model,
//! - `prompt`: prompt assembly and response cleanup,
//! - `executor`: the action-tree interpreter,
//! - `cache`: model response caching,
//! - `pipeline`: the request flow tying the above together,
//! - `config`: environment-driven settings.
//!
//! The libraries emit `tracing` events but never install a subscriber.

pub mod backend;
pub mod cache;
pub mod config;
pub mod context;
pub mod executor;
pub mod pipeline;
pub mod prompt;

pub use backend::{BackendError, Dataset, Processing, Project};
pub use cache::{MemoryResponseCache, ResponseCache};
pub use config::GeoaskConfig;
pub use context::{compute_context, Context, SchemaError};
pub use executor::{ExecError, Executor, VectorData};
pub use pipeline::{
    Answer, Assistant, Completer, CompletionError, NoopObserver, PipelineError, PipelineObserver,
};
