pub mod acceptance;
pub mod hash;
pub mod pattern;
pub mod payload;
pub mod ranked;
pub mod relay;

pub use acceptance::Rejection;
pub use hash::HashExtractor;
pub use pattern::{CandidatePattern, Capture, PatternAttempt, PatternStats, PatternStore};
pub use payload::{HiddenPayload, PayloadExtractor};
pub use ranked::{ExtractContext, ExtractMatch, RankedExtractor};
pub use relay::{RelayExtractor, RelayTarget};
