//! Scoped ownership of runtime handles.
//!
//! A [`Scoped`] guard owns one handle obtained from the runtime and releases
//! it exactly once when dropped, on the normal path and on every early
//! return alike. Structs holding several guards declare them in release
//! order: Rust drops fields top to bottom.

use std::fmt;
use std::ops::{Deref, DerefMut};

use tracing::trace;

/// Owns a runtime handle of the given kind until the end of its scope.
pub struct Scoped<T> {
    kind: &'static str,
    handle: T,
}

impl<T> Scoped<T> {
    pub fn new(kind: &'static str, handle: T) -> Self {
        trace!("acquired {}", kind);
        Self { kind, handle }
    }

    /// What this guard holds ("context", "buffer", ...).
    pub fn kind(&self) -> &'static str {
        self.kind
    }
}

impl<T> Deref for Scoped<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.handle
    }
}

impl<T> DerefMut for Scoped<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.handle
    }
}

impl<T> Drop for Scoped<T> {
    fn drop(&mut self) {
        // The handle itself is released right after this body runs.
        trace!("releasing {}", self.kind);
    }
}

impl<T> fmt::Debug for Scoped<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scoped").field("kind", &self.kind).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Handle {
        name: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Drop for Handle {
        fn drop(&mut self) {
            self.log.borrow_mut().push(self.name);
        }
    }

    struct Pair {
        child: Scoped<Handle>,
        parent: Scoped<Handle>,
    }

    #[test]
    fn releases_once_on_drop() {
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let guard = Scoped::new("buffer", Handle { name: "buffer", log: log.clone() });
            assert_eq!(guard.kind(), "buffer");
            assert_eq!(guard.name, "buffer");
        }
        assert_eq!(*log.borrow(), ["buffer"]);
    }

    #[test]
    fn field_order_is_release_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let pair = Pair {
            child: Scoped::new("queue", Handle { name: "queue", log: log.clone() }),
            parent: Scoped::new("context", Handle { name: "context", log: log.clone() }),
        };
        drop(pair);
        assert_eq!(*log.borrow(), ["queue", "context"]);
    }

    #[test]
    fn early_return_releases_acquired_handles() {
        fn acquire_then_fail(log: &Rc<RefCell<Vec<&'static str>>>) -> Result<(), &'static str> {
            let _context = Scoped::new("context", Handle { name: "context", log: log.clone() });
            let _queue = Scoped::new("queue", Handle { name: "queue", log: log.clone() });
            Err("program creation failed")
        }

        let log = Rc::new(RefCell::new(Vec::new()));
        assert!(acquire_then_fail(&log).is_err());
        assert_eq!(*log.borrow(), ["queue", "context"]);
    }

    #[test]
    fn debug_shows_kind_only() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let guard = Scoped::new("kernel", Handle { name: "kernel", log });
        assert!(format!("{guard:?}").contains("kernel"));
    }
}
