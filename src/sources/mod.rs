pub mod manager;
pub mod orchestrator;
pub mod plugin;

pub use manager::SourceManager;
pub use orchestrator::ProviderOrchestrator;
pub use plugin::{BoxedSource, CallContext, DecodeFallback, StreamSource};
