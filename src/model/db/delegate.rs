use std::ops::{Deref, DerefMut};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::model::{
    common::election::{DelegateId, ElectionId},
    mongodb::optional_datetime,
};

/// Core delegate data, as stored in the database.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct DelegateCore {
    /// The election this delegate may vote in.
    pub election_id: ElectionId,
    /// Unique within the election; the only way a delegate is identified when voting.
    pub control_number: String,
    /// Display name, as printed on the roster.
    pub name: String,
    /// When the delegate's ballot was cast, if it has been.
    #[serde(default, with = "optional_datetime")]
    pub voted_at: Option<DateTime<Utc>>,
}

impl DelegateCore {
    pub fn has_voted(&self) -> bool {
        self.voted_at.is_some()
    }
}

/// A delegate without an ID.
pub type NewDelegate = DelegateCore;

/// A delegate from the database, with its unique ID.
#[derive(Debug, PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Delegate {
    #[serde(rename = "_id")]
    pub id: DelegateId,
    #[serde(flatten)]
    pub delegate: DelegateCore,
}

impl Deref for Delegate {
    type Target = DelegateCore;

    fn deref(&self) -> &Self::Target {
        &self.delegate
    }
}

impl DerefMut for Delegate {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.delegate
    }
}

/// Generate a random control number of the form `CN-123456`.
///
/// Uniqueness is not guaranteed here; the store rejects clashes within an election.
pub fn generate_control_number(rng: &mut impl Rng) -> String {
    format!("CN-{:06}", rng.gen_range(0..1_000_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_number_format() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let control_number = generate_control_number(&mut rng);
            assert_eq!(control_number.len(), 9);
            assert!(control_number.starts_with("CN-"));
            assert!(control_number[3..].chars().all(|c| c.is_ascii_digit()));
        }
    }
}
