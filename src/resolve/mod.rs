pub mod placeholder;
pub mod validator;

pub use placeholder::{PlaceholderResolver, ResolvedUrlSet};
pub use validator::{Check, StreamValidator, ValidationOutcome};
