use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{
    common::election::{DistrictId, ElectionId, ElectionStatus, PositionId},
    db::{ElectionCore, NewCandidate, NewDelegate, NewElection, NewPosition},
};

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::InvalidArgument(format!("{field} must not be blank")));
    }
    Ok(())
}

/// The editable settings of an election, used both to create and to edit one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElectionSpec {
    /// Election name.
    pub name: String,
    /// Where the general assembly is held.
    pub address: String,
    /// Day of the election.
    pub date: NaiveDate,
    /// Planned start time.
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// Planned end time. Started elections close automatically at this time.
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Upper bound on the delegate roster.
    #[serde(default)]
    pub max_attendees: Option<u32>,
}

impl ElectionSpec {
    pub fn validate(&self) -> Result<()> {
        require("name", &self.name)?;
        require("address", &self.address)?;
        if let (Some(start), Some(end)) = (self.start_time, self.end_time) {
            if end <= start {
                return Err(Error::InvalidArgument(
                    "end_time must be after start_time".to_string(),
                ));
            }
        }
        if self.max_attendees == Some(0) {
            return Err(Error::InvalidArgument(
                "max_attendees must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Overwrite the editable fields of `election`, leaving its status alone.
    pub fn apply_to(self, election: &mut ElectionCore) {
        election.name = self.name;
        election.address = self.address;
        election.date = self.date;
        election.start_time = self.start_time;
        election.end_time = self.end_time;
        election.max_attendees = self.max_attendees;
    }
}

impl From<ElectionSpec> for NewElection {
    fn from(spec: ElectionSpec) -> Self {
        Self {
            name: spec.name,
            address: spec.address,
            date: spec.date,
            start_time: spec.start_time,
            end_time: spec.end_time,
            max_attendees: spec.max_attendees,
            status: ElectionStatus::Scheduled,
        }
    }
}

/// A new position on the ballot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionSpec {
    /// Office title.
    pub title: String,
    /// Maximum number of candidates a delegate may select.
    pub max_candidates: u32,
    /// Term of office, e.g. "2 years".
    #[serde(default)]
    pub term: Option<String>,
}

impl PositionSpec {
    pub fn validate(&self) -> Result<()> {
        require("title", &self.title)?;
        if self.max_candidates < 1 {
            return Err(Error::InvalidArgument(
                "max_candidates must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn into_position(self, election_id: ElectionId) -> NewPosition {
        NewPosition {
            election_id,
            title: self.title,
            max_candidates: self.max_candidates,
            term: self.term,
        }
    }
}

/// A new candidate for a position.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSpec {
    /// The position the candidate stands for.
    pub position_id: PositionId,
    /// The district the candidate represents, if positions are districted.
    #[serde(default)]
    pub district_id: Option<DistrictId>,
    /// Name as printed on the ballot.
    pub name: String,
}

impl CandidateSpec {
    pub fn validate(&self) -> Result<()> {
        require("name", &self.name)
    }

    pub fn into_candidate(self, election_id: ElectionId) -> NewCandidate {
        NewCandidate {
            election_id,
            position_id: self.position_id,
            district_id: self.district_id,
            name: self.name,
        }
    }
}

/// A delegate enrolment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateSpec {
    /// Display name.
    pub name: String,
    /// A pre-assigned control number. One is generated if absent.
    #[serde(default)]
    pub control_number: Option<String>,
}

impl DelegateSpec {
    pub fn validate(&self) -> Result<()> {
        require("name", &self.name)?;
        if let Some(control_number) = &self.control_number {
            require("control_number", control_number)?;
        }
        Ok(())
    }

    pub fn into_delegate(self, election_id: ElectionId, control_number: String) -> NewDelegate {
        NewDelegate {
            election_id,
            control_number,
            name: self.name,
            voted_at: None,
        }
    }
}
