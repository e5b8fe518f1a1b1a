use std::ops::{Deref, DerefMut};

use log::{debug, warn};

use crate::error::Result;

use super::{Store, Transaction};

/// A transaction scoped to one engine operation.
///
/// Exactly one of commit or rollback happens on every exit path:
/// [`UnitOfWork::complete`] commits an `Ok` and rolls back an `Err`, and a unit
/// of work dropped before completion rolls back when its transaction is dropped.
pub struct UnitOfWork {
    label: &'static str,
    tx: Option<Box<dyn Transaction>>,
}

impl UnitOfWork {
    pub async fn begin(store: &dyn Store, label: &'static str) -> Result<Self> {
        let tx = store.begin(label).await?;
        Ok(Self {
            label,
            tx: Some(tx),
        })
    }

    /// Commit if `result` is `Ok`, otherwise roll back, then hand `result` on.
    ///
    /// A failed commit replaces the result with the commit error.
    pub async fn complete<T>(mut self, result: Result<T>) -> Result<T> {
        let tx = self.tx.take().expect("unit of work completed twice");
        match result {
            Ok(value) => {
                tx.commit().await?;
                debug!("Committed '{}'", self.label);
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("Rollback of '{}' failed: {rollback_err}", self.label);
                }
                debug!("Rolled back '{}': {err}", self.label);
                Err(err)
            }
        }
    }
}

impl Deref for UnitOfWork {
    type Target = dyn Transaction;

    fn deref(&self) -> &Self::Target {
        self.tx.as_deref().expect("unit of work used after completion")
    }
}

impl DerefMut for UnitOfWork {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.tx
            .as_deref_mut()
            .expect("unit of work used after completion")
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.tx.take().is_some() {
            warn!("'{}' dropped before completion, rolling back", self.label);
        }
    }
}
