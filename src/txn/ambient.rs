//! Thread-scoped ambient transaction.
//!
//! Contexts nest: [`enter`] pushes, dropping the returned guard removes the
//! entry it pushed, even when that entry is no longer on top. The innermost
//! remaining context is the one operations enlist into.

use super::{TransactionContext, TransactionId};

use std::cell::RefCell;
use std::marker::PhantomData;
use std::sync::Arc;

thread_local! {
    static CURRENT: RefCell<Vec<Arc<dyn TransactionContext>>> = const { RefCell::new(Vec::new()) };
}

/// Returns the innermost ambient transaction on this thread.
pub fn current() -> Option<Arc<dyn TransactionContext>> {
    CURRENT.with(|stack| stack.borrow().last().cloned())
}

/// Makes `ctx` the ambient transaction until the guard is dropped.
pub fn enter(ctx: Arc<dyn TransactionContext>) -> AmbientGuard {
    let id = ctx.id();
    CURRENT.with(|stack| stack.borrow_mut().push(ctx));
    AmbientGuard {
        id,
        _not_send: PhantomData,
    }
}

/// Leaves the ambient scope on drop. Tied to the thread that entered it.
#[must_use = "the ambient transaction ends when the guard is dropped"]
pub struct AmbientGuard {
    id: TransactionId,
    _not_send: PhantomData<*const ()>,
}

impl Drop for AmbientGuard {
    fn drop(&mut self) {
        CURRENT.with(|stack| {
            let mut stack = stack.borrow_mut();
            match stack.iter().rposition(|ctx| ctx.id() == self.id) {
                Some(index) if index + 1 == stack.len() => {
                    stack.pop();
                }
                Some(index) => {
                    log::debug!("Leaving transaction {} out of order", self.id);
                    stack.remove(index);
                }
                None => log::warn!("Transaction {} was not ambient on this thread", self.id),
            }
        });
    }
}
