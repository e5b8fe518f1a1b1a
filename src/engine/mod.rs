//! The election lifecycle and vote-casting engine.
//!
//! Every public operation runs in exactly one [`UnitOfWork`]: reads, guard
//! checks, writes and the audit entry describing them either all commit or
//! all vanish. The engine keeps no state between calls beyond the store
//! handle, so the active election is resolved afresh by every operation.

mod active;
mod casting;
mod closer;
mod lifecycle;
mod registry;
mod reprint;
mod setup;

#[cfg(test)]
pub mod fixtures;

pub use casting::validate_selections;
pub use closer::{ElectionCloserFairing, ElectionClosers};
pub use lifecycle::{assert_mutable, check_cancel, check_close, check_start, transitioned};

use std::sync::Arc;

use crate::error::Result;
use crate::store::{Store, UnitOfWork};

/// Handle on the engine. Cheap to clone; all clones share one store.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn Store>,
}

impl Engine {
    pub fn new(store: impl Store + 'static) -> Self {
        Self {
            store: Arc::new(store),
        }
    }

    async fn begin(&self, label: &'static str) -> Result<UnitOfWork> {
        UnitOfWork::begin(self.store.as_ref(), label).await
    }
}
