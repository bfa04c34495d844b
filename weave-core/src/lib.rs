//! Weave Core
//!
//! This crate provides the reactive core of the Weave UI runtime.
//! It implements:
//!
//! - Dependency tracking between observable state and watchers
//! - A batched update scheduler with parent-before-child ordering
//! - Component lifecycle hooks driven by a reconciler
//! - A keep-alive cache and async component resolution
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: deps, watchers, signals and reactive values
//! - `scheduler`: the watcher queue and `next_tick`
//! - `component`: definitions, instances, vnodes and the component hooks
//! - `host`: the deferred-execution primitives the scheduler runs on
//! - `runtime`: per-thread configuration, host and reconciler
//!
//! # Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use weave_core::host::ManualHost;
//! use weave_core::reactive::{Signal, WatchOptions, Watcher};
//!
//! let host = ManualHost::install();
//! let count = Signal::new(0);
//! let seen = Rc::new(RefCell::new(Vec::new()));
//!
//! let _watcher = {
//!     let count = count.clone();
//!     let seen = Rc::clone(&seen);
//!     Watcher::user(
//!         move || count.get() * 2,
//!         move |doubled: &i32, _| seen.borrow_mut().push(*doubled),
//!         WatchOptions::default(),
//!     )
//! };
//!
//! // Both writes land in one flush.
//! count.set(1);
//! count.set(5);
//! host.run_microtasks();
//! assert_eq!(*seen.borrow(), vec![10]);
//! ```

pub mod component;
pub mod config;
pub mod diagnostics;
pub mod host;
pub mod reactive;
pub mod runtime;
pub mod scheduler;
