//! Reactive Primitives
//!
//! This module implements the dependency graph that drives re-rendering:
//! deps, watchers and the values built on top of them.
//!
//! # Concepts
//!
//! ## Deps
//!
//! A [`Dep`] is a node that watchers can subscribe to. Every observable
//! location (a signal, an object field, an array) owns one. Reading the
//! location while a watcher is evaluating subscribes that watcher; writing
//! it notifies all subscribers.
//!
//! ## Watchers
//!
//! A [`Watcher`] is a tracked computation. Render functions, user watch
//! expressions and computed values are all watchers that differ only in
//! how they react to a notification.
//!
//! ## Values
//!
//! [`Signal`] holds a single value. [`Value`], [`ReactiveObject`] and
//! [`ReactiveArray`] model the nested state and props of components, with
//! one dep per field so that watchers only re-run for what they read.
//!
//! # Implementation Notes
//!
//! Everything here is single-threaded. Deps hold weak references to their
//! subscribers and watchers hold strong references to their deps, so
//! dropping the last handle to a watcher unsubscribes it.

mod computed;
mod context;
mod dep;
mod signal;
mod traverse;
mod value;
mod watcher;

pub use computed::Computed;
pub use context::{untracked, TrackingScope};
pub use dep::{Dep, DepId};
pub use signal::Signal;
pub use traverse::{traverse, Traverse};
pub use value::{ReactiveArray, ReactiveObject, Value};
pub use watcher::{WatchOptions, Watcher, WatcherId, WatcherOptions, WatcherOwner};
