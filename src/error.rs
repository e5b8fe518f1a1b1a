use log::{debug, error};
use rocket::{http::Status, response::Responder, serde::json::Json, Request};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::common::election::{CandidateId, ElectionId, ElectionStatus, PositionId};
use crate::store::StoreError;

pub type Result<T> = std::result::Result<T, Error>;

/// Every way an engine operation can fail.
///
/// Guard, not-found and conflict variants are raised where they are detected
/// and reach the caller unchanged. Infrastructure failures are wrapped in
/// [`Error::System`], which keeps the cause for logging but shows the caller
/// nothing beyond "system error".
#[derive(Debug, Error)]
pub enum Error {
    // Validation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // State guards.
    #[error("Election {election} cannot move from {from} to {to}")]
    InvalidTransition {
        election: ElectionId,
        from: ElectionStatus,
        to: ElectionStatus,
    },
    #[error("Election {0} has no enrolled delegates")]
    NoDelegates(ElectionId),
    #[error("Election {0} is {1}; only scheduled elections can be edited")]
    ElectionLocked(ElectionId, ElectionStatus),
    #[error("Election {0} is {1}, not started")]
    ElectionNotStarted(ElectionId, ElectionStatus),

    // Not found.
    #[error("No active election")]
    NoActiveElection,
    #[error("No delegate with control number '{0}' in the active election")]
    DelegateNotFound(String),
    #[error("Delegate '{0}' has not voted")]
    NotVoted(String),
    #[error("Not found: {0}")]
    NotFound(String),

    // Conflicts.
    #[error("Delegate '{0}' has already voted")]
    DuplicateVote(String),
    #[error("Position {position} allows at most {max} selections, got {selected}")]
    TooManyCandidates {
        position: PositionId,
        max: u32,
        selected: usize,
    },
    #[error("Candidate {candidate} is not standing for position {position}")]
    InvalidCandidate {
        position: PositionId,
        candidate: CandidateId,
    },
    #[error("Position {0} is not part of the active election")]
    InvalidPosition(PositionId),
    #[error("Concurrent update, please retry: {0}")]
    Conflict(String),

    // Infrastructure.
    #[error("System error")]
    System(#[source] StoreError),
}

impl Error {
    /// A stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "INVALID_ARGUMENT",
            Self::InvalidTransition { .. } => "INVALID_TRANSITION",
            Self::NoDelegates(_) => "NO_DELEGATES",
            Self::ElectionLocked(..) => "ELECTION_LOCKED",
            Self::ElectionNotStarted(..) => "ELECTION_NOT_STARTED",
            Self::NoActiveElection => "NO_ACTIVE_ELECTION",
            Self::DelegateNotFound(_) => "DELEGATE_NOT_FOUND",
            Self::NotVoted(_) => "NOT_VOTED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::DuplicateVote(_) => "DUPLICATE_VOTE",
            Self::TooManyCandidates { .. } => "TOO_MANY_CANDIDATES",
            Self::InvalidCandidate { .. } => "INVALID_CANDIDATE",
            Self::InvalidPosition(_) => "INVALID_POSITION",
            Self::Conflict(_) => "CONFLICT",
            Self::System(_) => "SYSTEM_ERROR",
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Self::InvalidArgument(_) => Status::BadRequest,
            Self::InvalidTransition { .. }
            | Self::NoDelegates(_)
            | Self::ElectionLocked(..)
            | Self::ElectionNotStarted(..)
            | Self::DuplicateVote(_)
            | Self::Conflict(_) => Status::Conflict,
            Self::NoActiveElection
            | Self::DelegateNotFound(_)
            | Self::NotVoted(_)
            | Self::NotFound(_) => Status::NotFound,
            Self::TooManyCandidates { .. }
            | Self::InvalidCandidate { .. }
            | Self::InvalidPosition(_) => Status::UnprocessableEntity,
            Self::System(_) => Status::InternalServerError,
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Reinterpret a uniqueness violation as the delegate having voted already.
    ///
    /// On the casting path the only unique constraints that can fire guard the
    /// one-ballot-per-delegate rule, so a duplicate means another request won.
    pub fn duplicate_as_vote(self, control_number: &str) -> Self {
        match self {
            Self::System(StoreError::Duplicate(_)) => {
                Self::DuplicateVote(control_number.to_string())
            }
            other => other,
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(reason) => Self::Conflict(reason),
            other => Self::System(other),
        }
    }
}

/// The JSON body sent for any failed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

impl From<&Error> for ErrorBody {
    fn from(err: &Error) -> Self {
        Self {
            error: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        match &self {
            Self::System(cause) => error!("{self}: {cause}"),
            _ => debug!("Rejected request: {self}"),
        }
        (status, Json(ErrorBody::from(&self))).respond_to(req)
    }
}
