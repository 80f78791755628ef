pub mod config;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod stream;
pub mod tool;
pub mod trace;

pub use config::Config;
pub use envelope::{Envelope, EnvelopeSource};
pub use error::{Error, Result, SchemaError};
pub use executor::{BoxFuture, DeckExecutor, ExecutionContext, LogFn, SpawnFn, SpawnRequest};
pub use stream::{FinishReason, ResponseEvent, StreamEvent, Usage};
pub use tool::{Message, ToolCall, ToolDefinition};
pub use trace::{LogLevel, MemorySink, TraceEvent, TraceSink, TracingSink};
