//! Ambient transactions and the two-phase-commit participant contract.
//!
//! The engine never owns a transaction. It enlists an [`Enlistment`] into
//! whatever [`TransactionContext`] is ambient on the calling thread, and the
//! coordinator behind that context later drives the enlistment through
//! [`Participant::prepare`] and then exactly one of
//! [`Participant::commit`], [`Participant::rollback`] or
//! [`Participant::in_doubt`], possibly from another thread.
//!
//! [`coordinator`] provides an in-process coordinator for callers that do
//! not bring their own.

pub mod ambient;
pub mod coordinator;
pub mod enlistment;
pub(crate) mod registry;

pub use ambient::{AmbientGuard, current, enter};
pub use coordinator::{Transaction, TransactionScope, TransactionStatus};
pub use enlistment::Enlistment;

use crate::error::Result;

use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Opaque identity of one ambient transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

/// A participant's answer to the prepare phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Vote {
    Prepared,
    ForceRollback,
}

/// Callbacks a coordinator invokes on an enlisted resource.
///
/// Implementations must tolerate being called from any thread.
pub trait Participant: Send + Sync {
    fn prepare(&self) -> Vote;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;

    /// Outcome unknown; the engine treats this as rollback.
    fn in_doubt(&self) -> Result<()>;
}

/// The capability an ambient transaction exposes to resources.
pub trait TransactionContext: Send + Sync {
    fn id(&self) -> TransactionId;

    /// Registers `participant` for the completion callbacks. Volatile: the
    /// coordinator keeps no recovery log for it.
    fn enlist_volatile(&self, participant: Arc<dyn Participant>) -> Result<()>;
}
