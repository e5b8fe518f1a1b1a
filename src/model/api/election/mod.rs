mod desc;
mod roster;
mod spec;

pub use desc::{ElectionDescription, ElectionHeader};
pub use roster::{CandidateDescription, DelegateDescription, PositionDescription};
pub use spec::{CandidateSpec, DelegateSpec, ElectionSpec, PositionSpec};
