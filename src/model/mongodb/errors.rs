//! For some reason, the mongodb crate doesn't provide error code constants.
//! This module fills in the gaps, and classifies driver errors for the store.

use mongodb::error::{
    Error as DbError, ErrorKind, WriteFailure, TRANSIENT_TRANSACTION_ERROR,
    UNKNOWN_TRANSACTION_COMMIT_RESULT,
};

use crate::store::StoreError;

pub const DUPLICATE_KEY: i32 = 11000;
pub const WRITE_CONFLICT: i32 = 112;

/// Return true if the given error is a duplicate key error, from a single or bulk write.
pub fn is_duplicate_key_error(err: &DbError) -> bool {
    match *err.kind {
        ErrorKind::Write(WriteFailure::WriteError(ref e)) => e.code == DUPLICATE_KEY,
        ErrorKind::BulkWrite(ref failure) => failure
            .write_errors
            .iter()
            .flatten()
            .any(|e| e.code == DUPLICATE_KEY),
        ErrorKind::Command(ref e) => e.code == DUPLICATE_KEY,
        _ => false,
    }
}

/// Return true if the commit may or may not have been applied.
pub fn is_unknown_commit_result(err: &DbError) -> bool {
    err.contains_label(UNKNOWN_TRANSACTION_COMMIT_RESULT)
}

fn is_write_conflict(err: &DbError) -> bool {
    matches!(*err.kind, ErrorKind::Command(ref e) if e.code == WRITE_CONFLICT)
}

/// How a failed driver call is reported to the engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Failure {
    Duplicate,
    Retryable,
    Other,
}

/// Classify by what the server says about the error.
///
/// An unknown commit result is never retryable from scratch: the transaction
/// may have been applied, and retrying it could apply it twice.
fn classify(duplicate: bool, has_label: impl Fn(&str) -> bool, write_conflict: bool) -> Failure {
    if duplicate {
        Failure::Duplicate
    } else if has_label(UNKNOWN_TRANSACTION_COMMIT_RESULT) {
        Failure::Other
    } else if has_label(TRANSIENT_TRANSACTION_ERROR) || write_conflict {
        Failure::Retryable
    } else {
        Failure::Other
    }
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        let failure = classify(
            is_duplicate_key_error(&err),
            |label| err.contains_label(label),
            is_write_conflict(&err),
        );
        match failure {
            Failure::Duplicate => StoreError::Duplicate(err.to_string()),
            Failure::Retryable => StoreError::Conflict(err.to_string()),
            Failure::Other => StoreError::backend(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labelled(labels: &'static [&'static str]) -> impl Fn(&str) -> bool {
        move |label| labels.iter().any(|l| *l == label)
    }

    #[test]
    fn transient_errors_and_write_conflicts_are_retryable() {
        assert_eq!(
            classify(false, labelled(&[TRANSIENT_TRANSACTION_ERROR]), false),
            Failure::Retryable
        );
        assert_eq!(classify(false, labelled(&[]), true), Failure::Retryable);
    }

    #[test]
    fn unknown_commit_results_are_not_retryable() {
        assert_eq!(
            classify(false, labelled(&[UNKNOWN_TRANSACTION_COMMIT_RESULT]), false),
            Failure::Other
        );
        assert_eq!(
            classify(
                false,
                labelled(&[UNKNOWN_TRANSACTION_COMMIT_RESULT, TRANSIENT_TRANSACTION_ERROR]),
                true
            ),
            Failure::Other
        );
    }

    #[test]
    fn duplicates_win_over_labels() {
        assert_eq!(
            classify(true, labelled(&[TRANSIENT_TRANSACTION_ERROR]), false),
            Failure::Duplicate
        );
        assert_eq!(classify(false, labelled(&[]), false), Failure::Other);
    }
}
