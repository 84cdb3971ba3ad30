//! Patched-function registry.
//!
//! Tracks which host functions have already been intercepted, keyed by
//! identity, without touching the functions and without keeping them
//! alive. Installers consult it so a second injection into the same realm
//! does not stack wrappers.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

trait Liveness {
    fn is_alive(&self) -> bool;
}

impl<T: ?Sized> Liveness for Weak<T> {
    fn is_alive(&self) -> bool {
        self.strong_count() > 0
    }
}

/// Identity-keyed, non-owning set of patched functions.
#[derive(Default)]
pub struct PatchRegistry {
    entries: RefCell<HashMap<usize, Box<dyn Liveness>>>,
}

#[inline]
fn identity<T: ?Sized>(target: &Rc<T>) -> usize {
    Rc::as_ptr(target) as *const () as usize
}

impl PatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `target` was marked and is still alive.
    pub fn is_patched<T: ?Sized + 'static>(&self, target: &Rc<T>) -> bool {
        let key = identity(target);
        let mut entries = self.entries.borrow_mut();
        match entries.get(&key) {
            Some(entry) if entry.is_alive() => true,
            Some(_) => {
                // Target dropped since it was marked
                entries.remove(&key);
                false
            }
            None => false,
        }
    }

    /// Mark `target` as patched. Idempotent.
    pub fn mark_patched<T: ?Sized + 'static>(&self, target: &Rc<T>) {
        let mut entries = self.entries.borrow_mut();
        if entries.len() >= 64 {
            entries.retain(|_, entry| entry.is_alive());
        }
        entries.insert(identity(target), Box::new(Rc::downgrade(target)));
    }

    /// Drop entries whose targets are gone.
    pub fn prune(&self) {
        self.entries.borrow_mut().retain(|_, entry| entry.is_alive());
    }

    /// Number of tracked entries (live or not yet pruned).
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl std::fmt::Debug for PatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchRegistry")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_and_query() {
        let registry = PatchRegistry::new();
        let f: Rc<dyn Fn() -> u32> = Rc::new(|| 1);
        let g: Rc<dyn Fn() -> u32> = Rc::new(|| 2);

        assert!(!registry.is_patched(&f));
        registry.mark_patched(&f);
        assert!(registry.is_patched(&f));
        assert!(!registry.is_patched(&g));

        // Clones share identity
        let f2 = Rc::clone(&f);
        assert!(registry.is_patched(&f2));
    }

    #[test]
    fn test_marking_is_idempotent() {
        let registry = PatchRegistry::new();
        let f: Rc<dyn Fn()> = Rc::new(|| {});
        registry.mark_patched(&f);
        registry.mark_patched(&f);
        assert!(registry.is_patched(&f));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_does_not_keep_targets_alive() {
        let registry = PatchRegistry::new();
        let marker = Rc::new(());
        let held = Rc::clone(&marker);
        let f: Rc<dyn Fn()> = Rc::new(move || {
            let _ = Rc::strong_count(&held);
        });
        registry.mark_patched(&f);
        assert_eq!(Rc::strong_count(&marker), 2);

        drop(f);
        // The closure (and its capture) was dropped despite the mark
        assert_eq!(Rc::strong_count(&marker), 1);

        registry.prune();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dead_entry_never_reports_patched() {
        let registry = PatchRegistry::new();
        let first = Rc::new(5u64);
        registry.mark_patched(&first);
        drop(first);

        // Whatever lands at the same address is not patched
        let second = Rc::new(6u64);
        assert!(!registry.is_patched(&second));
    }

    #[test]
    fn test_works_for_any_type() {
        let registry = PatchRegistry::new();
        let value = Rc::new(String::from("navigator"));
        registry.mark_patched(&value);
        assert!(registry.is_patched(&value));
    }
}
