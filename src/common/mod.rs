pub mod backoff;
pub mod errors;
pub mod http;
pub mod logger;
pub mod tracer;
pub mod types;

pub use errors::*;
pub use http::*;
pub use tracer::*;
pub use types::*;
