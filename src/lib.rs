//! Resolves a content locator to a playable HLS stream URL by walking a
//! provider's relay pages, lifting the hidden payload and decoding it.

pub mod common;
pub mod configs;
pub mod decoders;
pub mod extractors;
pub mod protocol;
pub mod resolve;
pub mod sources;

pub use common::{errors::ErrorKind, tracer::CorrelationId};
pub use configs::Config;
pub use protocol::{CallOptions, ExtractionOutcome, ExtractionRequest};
pub use sources::SourceManager;
