pub mod audit;
pub mod options;
pub mod outcome;
pub mod request;

pub use audit::*;
pub use options::*;
pub use outcome::*;
pub use request::*;
