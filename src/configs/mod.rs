pub mod base;
pub mod extraction;
pub mod http;
pub mod logging;
pub mod providers;

pub use base::*;
pub use extraction::*;
pub use http::*;
pub use logging::*;
pub use providers::*;
