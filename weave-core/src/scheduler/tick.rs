//! Deferred callback queue.
//!
//! Callbacks registered during one synchronous turn are run together, in
//! registration order, by a single task handed to the host. The scheduler's
//! flush is just one of these callbacks, so user code that registers a
//! callback after mutating state observes the state after re-rendering.

use std::cell::RefCell;
use std::future::Future;

use tokio::sync::oneshot;

use crate::host::Task;
use crate::runtime::Runtime;

#[derive(Default)]
struct TickState {
    callbacks: Vec<Task>,
    pending: bool,
}

thread_local! {
    static TICK: RefCell<TickState> = RefCell::new(TickState::default());
}

/// Run `callback` after the current synchronous work, batched with every
/// other callback registered before the batch runs.
pub fn next_tick<F>(callback: F)
where
    F: FnOnce() + 'static,
{
    let schedule = TICK.with(|tick| {
        let mut tick = tick.borrow_mut();
        tick.callbacks.push(Box::new(callback));
        !std::mem::replace(&mut tick.pending, true)
    });

    if schedule {
        Runtime::host().defer(Box::new(flush_callbacks));
    }
}

/// A future that resolves once the next batch of callbacks has run.
pub fn tick() -> impl Future<Output = ()> {
    let (done, ran) = oneshot::channel();
    next_tick(move || {
        let _ = done.send(());
    });
    async move {
        let _ = ran.await;
    }
}

fn flush_callbacks() {
    let callbacks = TICK.with(|tick| {
        let mut tick = tick.borrow_mut();
        tick.pending = false;
        std::mem::take(&mut tick.callbacks)
    });

    for callback in callbacks {
        callback();
    }
}
