//! Deep Traversal
//!
//! Walks a value recursively and reads every nested field and element, so
//! that the active watcher subscribes to all of them. This is what a `deep`
//! watch uses.
//!
//! Frozen objects and virtual nodes are skipped. Cycles are broken by a
//! visited set keyed by the observer dep of each object or array, which is
//! cleared again at the end of every top-level call.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use super::dep::DepId;

thread_local! {
    static SEEN: RefCell<HashSet<DepId>> = RefCell::new(HashSet::new());
}

/// Values that can be deeply traversed.
pub trait Traverse {
    /// Read every nested observable reachable from `self`.
    fn traverse_into(&self, _seen: &mut HashSet<DepId>) {}

    /// Objects and arrays may change in place without changing identity.
    fn is_compound(&self) -> bool {
        false
    }
}

/// Touch every observable reachable from `value`.
pub fn traverse<T: Traverse + ?Sized>(value: &T) {
    let mut seen = SEEN.with(|seen| std::mem::take(&mut *seen.borrow_mut()));
    value.traverse_into(&mut seen);
    seen.clear();
    SEEN.with(|slot| *slot.borrow_mut() = seen);
}

macro_rules! impl_traverse_leaf {
    ($($ty:ty),* $(,)?) => {
        $(impl Traverse for $ty {})*
    };
}

impl_traverse_leaf!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    isize,
    u8,
    u16,
    u32,
    u64,
    usize,
    f32,
    f64,
    String,
    &'static str,
    Rc<str>,
);

impl<T: Traverse> Traverse for Option<T> {
    fn traverse_into(&self, seen: &mut HashSet<DepId>) {
        if let Some(value) = self {
            value.traverse_into(seen);
        }
    }

    fn is_compound(&self) -> bool {
        self.as_ref().is_some_and(Traverse::is_compound)
    }
}

impl<T: Traverse> Traverse for Vec<T> {
    fn traverse_into(&self, seen: &mut HashSet<DepId>) {
        for value in self.iter().rev() {
            value.traverse_into(seen);
        }
    }

    fn is_compound(&self) -> bool {
        self.iter().any(Traverse::is_compound)
    }
}
