mod bson;
mod collection;
mod counter;
mod errors;
mod store;

pub use bson::{optional_datetime, u32_id_filter};
pub use collection::{ensure_indexes_exist, Coll, MongoCollection, StoredBallot, StoredVote};
pub use counter::{ensure_id_counters_exist, Counter};
pub use errors::{is_duplicate_key_error, is_unknown_commit_result};
pub use store::MongoStore;
#[cfg(test)]
pub use store::test_database;
