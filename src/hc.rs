
use std::borrow::Borrow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::ptr;
use std::rc::{Rc, Weak};

use ahash::AHashMap;

/// A hash-consed handle. Handles produced by the same factory point at the
/// canonical allocation for their contents, so equality and hashing are
/// pointer operations.
#[derive(Debug, Clone)]
pub struct Hc<T>(Rc<T>);

impl<T> Hc<T> {
    fn inner(&self) -> &Rc<T> {
        let Hc(inner) = self;
        inner
    }

    fn demote(&self) -> Weak<T> {
        Rc::downgrade(self.inner())
    }
}

impl<T: Clone> Hc<T> {
    pub fn cloned(&self) -> T {
        let borrowed: &T = self.inner().borrow();
        borrowed.clone()
    }
}

impl<T> PartialEq for Hc<T> {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(self.inner(), other.inner())
    }
}
impl<T> Eq for Hc<T> { }

impl<T> Hash for Hc<T> {
    #[inline]
    fn hash<H: Hasher>(&self, state: &mut H) {
        ptr::hash(Rc::as_ptr(self.inner()), state);
    }
}

impl<T> Deref for Hc<T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.inner()
    }
}

impl<T: fmt::Display> fmt::Display for Hc<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner().fmt(f)
    }
}

/// Canonicalizing allocator. The table holds weak handles, so nodes live
/// exactly as long as some strong handle does; `purge` reclaims the slots of
/// nodes that have already died.
#[derive(Debug)]
pub struct HcFactory<T: Hash + Eq + Clone> {
    table: AHashMap<T, Weak<T>>,
}

impl<T: Hash + Eq + Clone> HcFactory<T> {
    pub fn with_capacity(capacity: usize) -> HcFactory<T> {
        HcFactory {
            table: AHashMap::with_capacity(capacity)
        }
    }

    pub fn get(&self, element: &T) -> Option<Hc<T>> {
        self.table
            .get(element)
            .and_then(Weak::upgrade)
            .map(Hc)
    }

    pub fn make(&mut self, element: T) -> Hc<T> {
        if let Some(hc) = self.get(&element) {
            return hc;
        }
        let result = Hc(Rc::new(element.clone()));
        self.table.insert(element, result.demote());
        result
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn purge(&mut self) {
        self.table.retain(|_, weak| weak.strong_count() > 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structurally_equal_elements_share_one_allocation() {
        let mut factory: HcFactory<String> = HcFactory::with_capacity(4);
        let a = factory.make("kernel".to_string());
        let b = factory.make("kernel".to_string());
        let c = factory.make("elaborator".to_string());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(factory.len(), 2);
    }

    #[test]
    fn purge_reclaims_dead_slots() {
        let mut factory: HcFactory<String> = HcFactory::with_capacity(4);
        let keep = factory.make("keep".to_string());
        {
            let _dead = factory.make("dead".to_string());
        }
        factory.purge();
        assert_eq!(factory.len(), 1);
        assert_eq!(factory.get(&"keep".to_string()), Some(keep));
    }
}
