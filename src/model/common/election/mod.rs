mod status;

pub use status::ElectionStatus;

/// Our election IDs are positive integers.
pub type ElectionId = u32;
/// Position IDs are unique across all elections.
pub type PositionId = u32;
/// Candidate IDs are unique across all elections.
pub type CandidateId = u32;
/// District IDs come from the reference data and are only carried through.
pub type DistrictId = u32;
/// Delegate IDs are unique across all elections.
pub type DelegateId = u32;
