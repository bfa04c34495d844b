//! Host Integration
//!
//! The runtime never blocks and never owns an event loop. Whenever it needs
//! to run something later it asks the [`Host`]:
//!
//! - `defer` for the batched flush (a microtask in a browser),
//! - `set_timeout` for async component delays and timeouts,
//! - `spawn_local` for futures returned by async component factories.
//!
//! Three hosts are provided. [`ManualHost`] is deterministic and is what the
//! tests drive. [`TokioHost`] runs on a tokio `LocalSet`. [`ImmediateHost`]
//! runs deferred work inline, which is the synchronous fallback for
//! environments without a task queue.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::Context;
use std::time::Duration;

use futures_util::future::LocalBoxFuture;
use futures_util::task::noop_waker_ref;
use futures_util::FutureExt;

use crate::runtime::Runtime;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// Deferred scheduling provided by the embedding environment.
pub trait Host {
    /// Run `task` after the current synchronous work completes.
    fn defer(&self, task: Task);

    /// Run `task` once `delay` has elapsed.
    fn set_timeout(&self, delay: Duration, task: Task);

    /// Drive `future` to completion on the current thread.
    fn spawn_local(&self, future: Pin<Box<dyn Future<Output = ()>>>);
}

struct Timer {
    due: Duration,
    seq: u64,
    task: Task,
}

/// A host that only makes progress when told to.
///
/// Microtasks run on [`run_microtasks`](Self::run_microtasks). Timers use a
/// virtual clock moved forward with [`advance`](Self::advance). Spawned
/// futures are polled with a no-op waker every time microtasks are drained,
/// so a future that becomes ready because of a timer or a microtask is
/// picked up in the same drain.
#[derive(Default)]
pub struct ManualHost {
    microtasks: RefCell<VecDeque<Task>>,
    timers: RefCell<Vec<Timer>>,
    futures: RefCell<Vec<LocalBoxFuture<'static, ()>>>,
    now: Cell<Duration>,
    seq: Cell<u64>,
}

impl ManualHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a host and make it the current thread's runtime host.
    pub fn install() -> Rc<Self> {
        let host = Rc::new(Self::new());
        Runtime::set_host(host.clone());
        host
    }

    /// Time elapsed on the virtual clock.
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Number of queued microtasks.
    pub fn pending_microtasks(&self) -> usize {
        self.microtasks.borrow().len()
    }

    /// Number of timers that have not fired yet.
    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }

    /// Number of spawned futures still pending.
    pub fn pending_futures(&self) -> usize {
        self.futures.borrow().len()
    }

    /// Run microtasks and poll futures until neither makes progress.
    ///
    /// Returns the number of microtasks that ran.
    pub fn run_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let completed = self.poll_futures();
            let next = self.microtasks.borrow_mut().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None if completed == 0 => break,
                None => {}
            }
        }
        ran
    }

    /// Move the virtual clock forward, firing due timers in order.
    ///
    /// Microtasks are drained before the first timer and after each one.
    pub fn advance(&self, by: Duration) {
        let target = self.now.get() + by;
        self.run_microtasks();

        while let Some(timer) = self.pop_due(target) {
            self.now.set(timer.due);
            (timer.task)();
            self.run_microtasks();
        }

        self.now.set(target);
    }

    fn pop_due(&self, target: Duration) -> Option<Timer> {
        let mut timers = self.timers.borrow_mut();
        let index = timers
            .iter()
            .enumerate()
            .filter(|(_, timer)| timer.due <= target)
            .min_by_key(|(_, timer)| (timer.due, timer.seq))
            .map(|(index, _)| index)?;
        Some(timers.swap_remove(index))
    }

    fn poll_futures(&self) -> usize {
        let mut futures = std::mem::take(&mut *self.futures.borrow_mut());
        if futures.is_empty() {
            return 0;
        }

        let mut cx = Context::from_waker(noop_waker_ref());
        let before = futures.len();
        futures.retain_mut(|future| future.poll_unpin(&mut cx).is_pending());
        let completed = before - futures.len();

        // Futures spawned while polling land in the fresh vec.
        let mut slot = self.futures.borrow_mut();
        futures.append(&mut slot);
        *slot = futures;
        completed
    }
}

impl Host for ManualHost {
    fn defer(&self, task: Task) {
        self.microtasks.borrow_mut().push_back(task);
    }

    fn set_timeout(&self, delay: Duration, task: Task) {
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        self.timers.borrow_mut().push(Timer {
            due: self.now.get() + delay,
            seq,
            task,
        });
    }

    fn spawn_local(&self, future: Pin<Box<dyn Future<Output = ()>>>) {
        self.futures.borrow_mut().push(future);
    }
}

/// A host backed by the tokio current-thread scheduler.
///
/// Every method calls [`tokio::task::spawn_local`], so the runtime must be
/// driven from inside a [`tokio::task::LocalSet`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioHost;

impl TokioHost {
    /// Make a tokio host the current thread's runtime host.
    pub fn install() {
        Runtime::set_host(Rc::new(Self));
    }
}

impl Host for TokioHost {
    fn defer(&self, task: Task) {
        tokio::task::spawn_local(async move { task() });
    }

    fn set_timeout(&self, delay: Duration, task: Task) {
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            task();
        });
    }

    fn spawn_local(&self, future: Pin<Box<dyn Future<Output = ()>>>) {
        tokio::task::spawn_local(future);
    }
}

/// A host that runs deferred work immediately.
///
/// Flushes happen synchronously inside the write that caused them. Timers
/// and futures still need an event loop; they are queued on an inner
/// [`ManualHost`] reachable through [`manual`](Self::manual).
#[derive(Default)]
pub struct ImmediateHost {
    manual: ManualHost,
}

impl ImmediateHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a host and make it the current thread's runtime host.
    pub fn install() -> Rc<Self> {
        let host = Rc::new(Self::new());
        Runtime::set_host(host.clone());
        host
    }

    /// The host that owns timers and futures.
    pub fn manual(&self) -> &ManualHost {
        &self.manual
    }
}

impl Host for ImmediateHost {
    fn defer(&self, task: Task) {
        task();
    }

    fn set_timeout(&self, delay: Duration, task: Task) {
        self.manual.set_timeout(delay, task);
    }

    fn spawn_local(&self, future: Pin<Box<dyn Future<Output = ()>>>) {
        self.manual.spawn_local(future);
    }
}

/// Resolves once `flag` is set.
///
/// No waker is registered, so only a host that re-polls its futures, like
/// [`ManualHost`], drives it to completion.
#[cfg(test)]
pub(crate) fn when_set(flag: Rc<Cell<bool>>) -> impl Future<Output = ()> {
    std::future::poll_fn(move |_| {
        if flag.get() {
            std::task::Poll::Ready(())
        } else {
            std::task::Poll::Pending
        }
    })
}
