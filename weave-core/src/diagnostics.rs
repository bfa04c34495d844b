//! Runtime diagnostics.
//!
//! Conditions the runtime recovers from on its own but that almost always
//! point at a bug in user code. They are logged through `tracing` and passed
//! to the warn handler installed with [`Runtime::set_warn_handler`].
//!
//! [`Runtime::set_warn_handler`]: crate::runtime::Runtime::set_warn_handler

use thiserror::Error;

use crate::reactive::WatcherId;
use crate::runtime::Runtime;

/// A non-fatal condition detected while running reactive code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Diagnostic {
    /// A watcher kept re-queuing itself during one flush and was dropped
    /// from the rest of that flush.
    #[error("You may have an infinite update loop in {target} ({count} re-queues)")]
    InfiniteUpdateLoop {
        watcher: WatcherId,
        target: String,
        count: u32,
    },

    /// An async component factory rejected or timed out.
    #[error("Failed to resolve async component: {factory}{}", reason_suffix(.reason))]
    AsyncComponentRejected {
        factory: String,
        reason: Option<String>,
    },

    /// A node handed to keep-alive carries an unusable cache key.
    #[error("Invalid keep-alive cache key for <{tag}>: {reason}")]
    InvalidCacheKey { tag: String, reason: String },

    /// A watcher was asked to evaluate while it was already evaluating.
    #[error("Re-entrant evaluation of {target} was skipped")]
    ReentrantEvaluation { watcher: WatcherId, target: String },

    /// A watcher panicked while the scheduler was running it. The rest of
    /// the flush still ran.
    #[error("Error in {target}: {message}")]
    WatcherPanicked {
        watcher: WatcherId,
        target: String,
        message: String,
    },

    /// A write to a frozen object was rejected.
    #[error("Cannot set \"{key}\" on a frozen object")]
    FrozenWrite { key: String },
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason
        .as_deref()
        .map(|r| format!("\nReason: {r}"))
        .unwrap_or_default()
}

/// Log `diagnostic` and forward it to the installed warn handler.
///
/// The handler is not called when the runtime is configured `silent`; the
/// `tracing` event is always emitted.
pub fn report(diagnostic: Diagnostic) {
    tracing::warn!(diagnostic = ?diagnostic, "{diagnostic}");

    if Runtime::config().silent {
        return;
    }
    Runtime::emit_warning(&diagnostic);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn capture() -> Rc<RefCell<Vec<Diagnostic>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        Runtime::set_warn_handler(move |d: &Diagnostic| sink.borrow_mut().push(d.clone()));
        seen
    }

    #[test]
    fn handler_receives_reports() {
        let seen = capture();
        report(Diagnostic::FrozenWrite { key: "x".into() });
        assert_eq!(seen.borrow().len(), 1);
        Runtime::clear_warn_handler();
    }

    #[test]
    fn silent_suppresses_handler() {
        let seen = capture();
        Runtime::configure(RuntimeConfig {
            silent: true,
            ..RuntimeConfig::default()
        });
        report(Diagnostic::FrozenWrite { key: "x".into() });
        assert!(seen.borrow().is_empty());
        Runtime::configure(RuntimeConfig::default());
        Runtime::clear_warn_handler();
    }

    #[test]
    fn messages_name_the_culprit() {
        let rejected = Diagnostic::AsyncComponentRejected {
            factory: "async#3".into(),
            reason: Some("timeout (50ms)".into()),
        };
        assert_eq!(
            rejected.to_string(),
            "Failed to resolve async component: async#3\nReason: timeout (50ms)"
        );

        let key = Diagnostic::InvalidCacheKey {
            tag: "component-1-a".into(),
            reason: "empty key".into(),
        };
        assert!(key.to_string().contains("component-1-a"));
    }
}
