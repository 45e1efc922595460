//! Specialized collection types

use std::collections::HashMap;
use std::rc::Rc;

pub use slotmap::{new_key_type, SlotMap};

/// Reference-counted registry keyed by object identity.
///
/// Iteration follows first-reference order, which keeps the indices derived
/// from it deterministic between runs.
pub struct ResourceTracker<T: ?Sized> {
    counts: HashMap<*const (), usize>,
    items: Vec<Rc<T>>,
}

impl<T: ?Sized> ResourceTracker<T> {
    /// Create an empty tracker
    pub fn new() -> Self {
        Self {
            counts: HashMap::new(),
            items: Vec::new(),
        }
    }

    fn key(item: &Rc<T>) -> *const () {
        Rc::as_ptr(item).cast::<()>()
    }

    /// Add a reference. Returns true if this is the first one.
    pub fn add_ref(&mut self, item: &Rc<T>) -> bool {
        let count = self.counts.entry(Self::key(item)).or_insert(0);
        *count += 1;
        if *count == 1 {
            self.items.push(Rc::clone(item));
            true
        } else {
            false
        }
    }

    /// Drop a reference. Returns true if this was the last one.
    ///
    /// Releasing an untracked object is a no-op that returns false.
    pub fn release(&mut self, item: &Rc<T>) -> bool {
        let key = Self::key(item);
        let Some(count) = self.counts.get_mut(&key) else {
            return false;
        };
        *count -= 1;
        if *count > 0 {
            return false;
        }
        self.counts.remove(&key);
        self.items.retain(|existing| Self::key(existing) != key);
        true
    }

    /// Current reference count of an object
    pub fn ref_count(&self, item: &Rc<T>) -> usize {
        self.counts.get(&Self::key(item)).copied().unwrap_or(0)
    }

    /// True if the object has at least one reference
    pub fn contains(&self, item: &Rc<T>) -> bool {
        self.counts.contains_key(&Self::key(item))
    }

    /// Number of distinct tracked objects
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True if nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate tracked objects in first-reference order
    pub fn iter(&self) -> std::slice::Iter<'_, Rc<T>> {
        self.items.iter()
    }
}

impl<T: ?Sized> Default for ResourceTracker<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T: ?Sized> IntoIterator for &'a ResourceTracker<T> {
    type Item = &'a Rc<T>;
    type IntoIter = std::slice::Iter<'a, Rc<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Slot allocator that reuses released indices
pub struct FreeList<T> {
    items: Vec<Option<T>>,
    free_indices: Vec<usize>,
}

impl<T> FreeList<T> {
    /// Create a new free list
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            free_indices: Vec::new(),
        }
    }

    /// Store an item, returning its slot
    pub fn insert(&mut self, item: T) -> usize {
        if let Some(index) = self.free_indices.pop() {
            self.items[index] = Some(item);
            index
        } else {
            self.items.push(Some(item));
            self.items.len() - 1
        }
    }

    /// Free a slot, returning what it held
    pub fn remove(&mut self, index: usize) -> Option<T> {
        let item = self.items.get_mut(index)?.take()?;
        self.free_indices.push(index);
        Some(item)
    }

    /// Get an item by slot
    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)?.as_ref()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.items.len() - self.free_indices.len()
    }

    /// True if no slot is occupied
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for FreeList<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_and_last_reference_are_reported() {
        let mut tracker = ResourceTracker::new();
        let a = Rc::new(1);
        let b = Rc::new(1);

        assert!(tracker.add_ref(&a));
        assert!(!tracker.add_ref(&a));
        assert!(tracker.add_ref(&b));
        assert_eq!(tracker.len(), 2);
        assert_eq!(tracker.ref_count(&a), 2);

        assert!(!tracker.release(&a));
        assert!(tracker.release(&a));
        assert!(!tracker.contains(&a));
        assert!(!tracker.release(&a));
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_iteration_follows_first_reference_order() {
        let mut tracker = ResourceTracker::new();
        let items: Vec<_> = (0..4).map(Rc::new).collect();
        for item in items.iter().rev() {
            tracker.add_ref(item);
        }
        tracker.release(&items[2]);
        let order: Vec<i32> = tracker.iter().map(|rc| **rc).collect();
        assert_eq!(order, vec![3, 1, 0]);
    }

    #[test]
    fn test_free_list_reuses_released_slots() {
        let mut list = FreeList::new();
        let a = list.insert("a");
        let b = list.insert("b");
        assert_eq!(list.remove(a), Some("a"));
        assert_eq!(list.remove(a), None);
        assert_eq!(list.insert("c"), a);
        assert_eq!(list.get(b), Some(&"b"));
        assert_eq!(list.len(), 2);
    }
}
