//! Process-wide map from transaction identity to its enlistment.
//!
//! Lookups that may insert and all removals happen under one lock. The
//! coordinator is never called while that lock is held.

use super::TransactionId;
use super::enlistment::Enlistment;

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

static ENLISTMENTS: LazyLock<Mutex<HashMap<TransactionId, Arc<Enlistment>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn lock() -> MutexGuard<'static, HashMap<TransactionId, Arc<Enlistment>>> {
    ENLISTMENTS
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Returns the enlistment for `id`, creating it with `create` if absent.
/// The flag is true when this call created it.
pub(crate) fn get_or_insert_with<F>(id: TransactionId, create: F) -> (Arc<Enlistment>, bool)
where
    F: FnOnce() -> Enlistment,
{
    let mut map = lock();
    if let Some(existing) = map.get(&id) {
        return (Arc::clone(existing), false);
    }
    let enlistment = Arc::new(create());
    map.insert(id, Arc::clone(&enlistment));
    log::debug!("Registered enlistment for transaction {}", id);
    (enlistment, true)
}

pub(crate) fn get(id: TransactionId) -> Option<Arc<Enlistment>> {
    lock().get(&id).cloned()
}

pub(crate) fn remove(id: TransactionId) {
    if lock().remove(&id).is_some() {
        log::debug!("Deregistered enlistment for transaction {}", id);
    }
}

pub(crate) fn contains(id: TransactionId) -> bool {
    lock().contains_key(&id)
}
