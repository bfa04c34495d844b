//! Per-thread Runtime
//!
//! The runtime bundles the collaborators the reactive core reaches for
//! without having them passed in: the configuration, the [`Host`] that
//! defers work, the [`Reconciler`] that patches rendered trees and the warn
//! handler that receives diagnostics.
//!
//! # Thread Model
//!
//! All state here is thread-local. Watchers, instances and vnodes are
//! `Rc`-based and never cross threads, so each thread that renders
//! components owns an independent runtime. Nothing is shared and nothing
//! needs locking.

use std::cell::RefCell;
use std::rc::Rc;

use crate::component::{Reconciler, TreePatcher};
use crate::config::{ConfigError, RuntimeConfig};
use crate::diagnostics::Diagnostic;
use crate::host::{Host, ManualHost};

type WarnHandler = Rc<dyn Fn(&Diagnostic)>;

struct RuntimeState {
    config: RuntimeConfig,
    host: Rc<dyn Host>,
    reconciler: Rc<dyn Reconciler>,
    warn_handler: Option<WarnHandler>,
}

impl Default for RuntimeState {
    fn default() -> Self {
        Self {
            config: RuntimeConfig::default(),
            host: Rc::new(ManualHost::new()),
            reconciler: Rc::new(TreePatcher),
            warn_handler: None,
        }
    }
}

thread_local! {
    static STATE: RefCell<RuntimeState> = RefCell::new(RuntimeState::default());
}

/// Entry point to the current thread's runtime.
pub struct Runtime;

impl Runtime {
    /// Replace the configuration.
    pub fn configure(config: RuntimeConfig) {
        STATE.with(|state| state.borrow_mut().config = config);
    }

    /// Parse, validate and install a JSON configuration.
    pub fn configure_from_json(input: &str) -> Result<(), ConfigError> {
        let config = RuntimeConfig::from_json(input)?;
        Self::configure(config);
        Ok(())
    }

    /// The active configuration.
    pub fn config() -> RuntimeConfig {
        STATE.with(|state| state.borrow().config.clone())
    }

    /// Install the host used for deferred work.
    pub fn set_host(host: Rc<dyn Host>) {
        STATE.with(|state| state.borrow_mut().host = host);
    }

    /// The installed host. Defaults to a [`ManualHost`] nobody drives.
    pub fn host() -> Rc<dyn Host> {
        STATE.with(|state| Rc::clone(&state.borrow().host))
    }

    /// Install the reconciler that patches rendered trees.
    pub fn set_reconciler(reconciler: Rc<dyn Reconciler>) {
        STATE.with(|state| state.borrow_mut().reconciler = reconciler);
    }

    /// The installed reconciler. Defaults to [`TreePatcher`].
    pub fn reconciler() -> Rc<dyn Reconciler> {
        STATE.with(|state| Rc::clone(&state.borrow().reconciler))
    }

    /// Receive every diagnostic reported on this thread.
    pub fn set_warn_handler<F>(handler: F)
    where
        F: Fn(&Diagnostic) + 'static,
    {
        STATE.with(|state| state.borrow_mut().warn_handler = Some(Rc::new(handler)));
    }

    /// Remove the warn handler.
    pub fn clear_warn_handler() {
        STATE.with(|state| state.borrow_mut().warn_handler = None);
    }

    pub(crate) fn emit_warning(diagnostic: &Diagnostic) {
        // Cloned out so the handler may touch the runtime itself.
        let handler = STATE.with(|state| state.borrow().warn_handler.clone());
        if let Some(handler) = handler {
            handler(diagnostic);
        }
    }
}
