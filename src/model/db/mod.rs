//! DB-compatible (e.g. de/serialisable) types.
//!
//! The types in this module are serialised in an DB-friendly way, e.g.:
//!
//! - IDs are stored as `_id` integers allocated from per-collection counters.
//! - datetimes are serialised in MongoDB's own format.
//!
//! Each stored type `Foo` has a `FooCore` holding everything but the ID, which
//! doubles as the `NewFoo` handed to the store for insertion.

mod active;
pub use active::{ActiveElection, ACTIVE_ELECTION_ID};

mod audit;
pub use audit::{AuditAction, AuditEntry};

mod ballot;
pub use ballot::{Ballot, BallotCore, CastVote, NewBallot};

mod delegate;
pub use delegate::{generate_control_number, Delegate, DelegateCore, NewDelegate};

mod election;
pub use election::{Election, ElectionCore, NewElection};

mod position;
pub use position::{Candidate, CandidateCore, NewCandidate, NewPosition, Position, PositionCore};
